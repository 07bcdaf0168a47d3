use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use audit_log::{read_json_lines, DecisionRecord, DestinationReport, EventLog};
use egress_proxy::{Proxy, ProxyConfig};
use policy_engine::{DefaultPolicy, EgressEngine, EgressSettings, Mode};
use process_audit::{analyze, load_records, AttributionContext, AuditSummary, SensitivePaths};

use crate::cli::AttributeArgs;
use crate::config::Config;

// ---------------------------------------------------------------------------
// proxy
// ---------------------------------------------------------------------------

/// Run the interception proxy until shutdown or an enforcement failure.
pub async fn proxy(cfg: &Config, shutdown: impl std::future::Future<Output = ()>) -> Result<()> {
    let settings = cfg.settings();
    let engine = Arc::new(EgressEngine::new(settings, &cfg.egress_rules()));

    let listen_addr: SocketAddr = cfg
        .network
        .listen_addr
        .parse()
        .context("invalid listen address")?;

    let log = EventLog::open(&cfg.logging.decisions_path, settings.mode)
        .await
        .with_context(|| {
            format!(
                "failed to open decision log {}",
                cfg.logging.decisions_path.display()
            )
        })?;

    info!(
        mode = %settings.mode,
        default_policy = %settings.default_policy,
        allow_http = settings.allow_http,
        ?engine,
        decisions = %cfg.logging.decisions_path.display(),
        "egress engine ready"
    );

    let proxy = Proxy::new(ProxyConfig {
        listen_addr,
        connect_timeout: Duration::from_secs(cfg.network.connect_timeout_secs),
        tls_upstream_port: cfg.network.tls_upstream_port,
        engine,
        log: log.clone(),
    });

    tokio::select! {
        result = proxy.run() => {
            result.context("egress proxy stopped")?;
        }
        _ = shutdown => {
            info!(decisions = log.len().await, "shutdown requested; stopping egress proxy");
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// report
// ---------------------------------------------------------------------------

/// Summary printed by the `report` subcommand.
#[derive(Debug, Serialize)]
pub struct ReportSummary {
    pub mode: Mode,
    pub allow_http: bool,
    pub default_policy: DefaultPolicy,
    pub total_decisions: usize,
    pub known_count: usize,
    pub unknown_count: usize,
    pub deferred_count: usize,
    pub known: Vec<DecisionRecord>,
    pub unknown: Vec<DecisionRecord>,
    pub deferred: Vec<DecisionRecord>,
}

impl ReportSummary {
    pub fn new(settings: EgressSettings, records: &[DecisionRecord]) -> Self {
        let DestinationReport {
            known,
            unknown,
            deferred,
        } = DestinationReport::from_records(records);
        Self {
            mode: settings.mode,
            allow_http: settings.allow_http,
            default_policy: settings.default_policy,
            total_decisions: records.len(),
            known_count: known.len(),
            unknown_count: unknown.len(),
            deferred_count: deferred.len(),
            known,
            unknown,
            deferred,
        }
    }
}

pub fn report(cfg: &Config, decisions: &Path) -> Result<ReportSummary> {
    let records: Vec<DecisionRecord> = read_json_lines(decisions)
        .with_context(|| format!("failed to read decision log {}", decisions.display()))?;
    info!(path = %decisions.display(), records = records.len(), "decision log loaded");
    Ok(ReportSummary::new(cfg.settings(), &records))
}

// ---------------------------------------------------------------------------
// attribute
// ---------------------------------------------------------------------------

pub fn attribute(cfg: &Config, args: &AttributeArgs) -> Result<AuditSummary> {
    let records = load_records(&args.audit_log).context("failed to load audit log")?;

    let tool_home = args.tool_home.clone().or_else(|| cfg.tool.home_dir.clone());
    let sensitive =
        SensitivePaths::new(tool_home).context("failed to build sensitive path set")?;

    let ctx = AttributionContext {
        runner_pid: args.runner_pid,
        tool_pid: args.tool_pid,
        tool_name: args.tool_name.clone().unwrap_or_else(|| cfg.tool.name.clone()),
        sudo_exe: args.sudo_exe.clone().unwrap_or_else(|| cfg.sudo_exe.clone()),
    };

    let summary = analyze(&records, ctx, &sensitive);
    info!(
        records = records.len(),
        sudo_calls = summary.sudo_calls.len(),
        unattributed = summary.unattributed_sudo_calls,
        tampered = summary.tampered_paths.len(),
        "audit attribution complete"
    );
    Ok(summary)
}
