//! Plain HTTP/1.x interception: one decision per request.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONNECTION, CONTENT_TYPE, HOST};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use policy_engine::{Decision, Scheme};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::ProxyError;
use crate::listener::Shared;

pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Serve HTTP/1.1 on an intercepted connection.
pub(crate) async fn serve(stream: TcpStream, shared: Arc<Shared>) -> Result<(), ProxyError> {
    let service = service_fn(move |req: Request<Incoming>| {
        let shared = Arc::clone(&shared);
        async move { Ok::<_, Infallible>(handle_request(req, &shared).await) }
    });

    http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .serve_connection(TokioIo::new(stream), service)
        .await
        .map_err(ProxyError::from)
}

async fn handle_request(req: Request<Incoming>, shared: &Shared) -> Response<ProxyBody> {
    let Some(authority) = request_authority(&req) else {
        warn!(uri = %req.uri(), "HTTP request without Host; rejecting");
        return text_response(StatusCode::BAD_REQUEST, "missing Host header\n");
    };
    let domain = strip_port(&authority).to_ascii_lowercase();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .to_string();

    let verdict = shared
        .config
        .engine
        .evaluate_request(&domain, Scheme::Http, &path);
    shared.config.log.record(&verdict.decision).await;

    if verdict.terminates() {
        info!(
            destination = %domain,
            %path,
            rule = %verdict.decision.rule_name,
            "blocking HTTP request"
        );
        return blocked_response(&verdict.decision);
    }
    if verdict.decision.is_block() {
        info!(
            destination = %domain,
            %path,
            rule = %verdict.decision.rule_name,
            "would block HTTP request (audit mode)"
        );
    }

    forward(req, &authority, &path, shared).await
}

async fn forward(
    req: Request<Incoming>,
    authority: &str,
    path: &str,
    shared: &Shared,
) -> Response<ProxyBody> {
    let uri: Uri = match format!("http://{authority}{path}").parse() {
        Ok(uri) => uri,
        Err(err) => {
            warn!(%authority, %path, %err, "cannot build upstream URI");
            return text_response(StatusCode::BAD_REQUEST, "invalid request target\n");
        }
    };

    let (mut parts, body) = req.into_parts();
    parts.uri = uri;
    parts.headers.remove("proxy-connection");

    match shared.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            debug!(%authority, status = %response.status(), "upstream responded");
            response.map(|body| body.boxed())
        }
        Err(err) => {
            warn!(%authority, %err, "upstream request failed");
            text_response(StatusCode::BAD_GATEWAY, "upstream request failed\n")
        }
    }
}

/// `Host` header, falling back to an absolute-form request URI.
fn request_authority<B>(req: &Request<B>) -> Option<String> {
    req.headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_owned)
        .or_else(|| req.uri().authority().map(|a| a.as_str().to_owned()))
}

/// Strip a trailing `:port` from a host, leaving IPv6 literals intact.
pub fn strip_port(authority: &str) -> &str {
    if authority.starts_with('[') {
        return match authority.find(']') {
            Some(end) => &authority[..=end],
            None => authority,
        };
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => host,
        _ => authority,
    }
}

fn full_body(content: impl Into<Bytes>) -> ProxyBody {
    Full::new(content.into())
        .map_err(|never| match never {})
        .boxed()
}

fn text_response(status: StatusCode, message: &'static str) -> Response<ProxyBody> {
    let mut response = Response::new(full_body(message));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

/// `403` that also closes the connection, so nothing more is read from it.
fn blocked_response(decision: &Decision) -> Response<ProxyBody> {
    let message = format!(
        "egress to {} blocked by '{}'\n",
        decision.destination, decision.rule_name
    );
    let mut response = Response::new(full_body(message));
    *response.status_mut() = StatusCode::FORBIDDEN;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_engine::{Action, DecisionSource};

    #[test]
    fn strips_ports() {
        assert_eq!(strip_port("example.com:8080"), "example.com");
        assert_eq!(strip_port("example.com"), "example.com");
        assert_eq!(strip_port("[::1]:80"), "[::1]");
        assert_eq!(strip_port("example.com:"), "example.com:");
    }

    #[test]
    fn authority_prefers_host_header() {
        let req = Request::builder()
            .uri("http://other.com/x")
            .header(HOST, "example.com:81")
            .body(())
            .unwrap();
        assert_eq!(request_authority(&req).as_deref(), Some("example.com:81"));

        let req = Request::builder().uri("http://other.com/x").body(()).unwrap();
        assert_eq!(request_authority(&req).as_deref(), Some("other.com"));

        let req = Request::builder().uri("/x").body(()).unwrap();
        assert_eq!(request_authority(&req), None);
    }

    #[test]
    fn blocked_response_closes_connection() {
        let decision = Decision {
            action: Action::Block,
            source: DecisionSource::HttpPolicy,
            rule_name: "allow_http is False".into(),
            destination: "example.com".into(),
            scheme: Scheme::Http,
        };
        let response = blocked_response(&decision);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()[CONNECTION], "close");
    }
}
