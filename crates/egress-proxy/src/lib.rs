//! Transparent egress proxy for the egress-warden project.
//!
//! Outbound traffic from the CI job is redirected (by firewall rules outside
//! this crate) to the proxy's listener. Every connection is classified on its
//! first byte and decided by the [`policy_engine::EgressEngine`]:
//!
//! ```text
//!   job --TCP--> egress-proxy --+-- 0x16: ClientHello SNI --> evaluate_tls
//!                               |
//!                               +-- else: HTTP/1.x request --> evaluate_request
//! ```
//!
//! Every decision is appended to the shared [`audit_log::EventLog`]. In
//! active mode a blocked TLS connection gets a fatal `handshake_failure`
//! alert and a blocked HTTP request gets `403`; in audit mode traffic always
//! flows.
//!
//! TLS is never terminated, so path-scoped rules only take effect for
//! plaintext HTTP.

pub mod error;
mod http;
pub mod listener;
pub mod relay;
pub mod tls;

pub use error::ProxyError;
pub use http::{strip_port, ProxyBody};
pub use listener::{Proxy, ProxyConfig};
