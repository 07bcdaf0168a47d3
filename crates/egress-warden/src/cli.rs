use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "egress-warden",
    version,
    about = "Egress firewall and sudo/tampering audit for CI jobs"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "egress-warden.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the interception proxy and record every egress decision
    Proxy(PolicyArgs),
    /// Summarise a decision log into known and unknown destinations
    Report {
        #[command(flatten)]
        policy: PolicyArgs,
        /// Decision log to read (overrides logging.decisions_path)
        #[arg(long)]
        decisions: Option<PathBuf>,
    },
    /// Attribute sudo calls and file tampering in an audit log
    Attribute(AttributeArgs),
}

/// Overrides for the policy section of the configuration file.
#[derive(Args, Debug, Default)]
pub struct PolicyArgs {
    /// Enforcement mode: audit or active
    #[arg(long)]
    pub mode: Option<String>,

    /// Fallback when no rule matches: allow-all or block-all
    #[arg(long)]
    pub default_policy: Option<String>,

    /// Whether plaintext HTTP is permitted at all: true or false
    #[arg(long)]
    pub allow_http: Option<String>,

    /// Path to the YAML egress rule list
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Listen address for the proxy
    #[arg(long)]
    pub listen: Option<String>,
}

#[derive(Args, Debug)]
pub struct AttributeArgs {
    /// Audit log (JSON lines or a JSON array)
    #[arg(long)]
    pub audit_log: PathBuf,

    /// PID of the CI runner process
    #[arg(long)]
    pub runner_pid: u32,

    /// PID of the egress-warden process started by the runner
    #[arg(long)]
    pub tool_pid: u32,

    /// Actor name for activity under the tool's own process (overrides tool.name)
    #[arg(long)]
    pub tool_name: Option<String>,

    /// Tool home directory to treat as sensitive (overrides tool.home_dir)
    #[arg(long)]
    pub tool_home: Option<PathBuf>,

    /// Path of the sudo binary (overrides sudo_exe)
    #[arg(long)]
    pub sudo_exe: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_proxy_overrides() {
        let cli = Cli::try_parse_from([
            "egress-warden",
            "proxy",
            "--mode",
            "active",
            "--default-policy",
            "allow-all",
            "--listen",
            "127.0.0.1:9000",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("egress-warden.yaml"));
        let Command::Proxy(args) = cli.command else {
            panic!("expected proxy subcommand");
        };
        assert_eq!(args.mode.as_deref(), Some("active"));
        assert_eq!(args.default_policy.as_deref(), Some("allow-all"));
        assert_eq!(args.listen.as_deref(), Some("127.0.0.1:9000"));
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from([
            "egress-warden",
            "report",
            "--config",
            "/etc/warden.yaml",
            "--decisions",
            "d.jsonl",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/warden.yaml"));
        assert!(matches!(cli.command, Command::Report { decisions: Some(_), .. }));
    }

    #[test]
    fn attribute_requires_pids() {
        assert!(Cli::try_parse_from(["egress-warden", "attribute", "--audit-log", "a.json"]).is_err());

        let cli = Cli::try_parse_from([
            "egress-warden",
            "attribute",
            "--audit-log",
            "a.json",
            "--runner-pid",
            "10",
            "--tool-pid",
            "11",
        ])
        .unwrap();
        let Command::Attribute(args) = cli.command else {
            panic!("expected attribute subcommand");
        };
        assert_eq!((args.runner_pid, args.tool_pid), (10, 11));
    }
}
