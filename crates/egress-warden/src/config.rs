use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use policy_engine::{loader, parse_flag, platform, DefaultPolicy, EgressSettings, Mode, RawRule};

use crate::cli::PolicyArgs;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub allow_http: FlagInput,
    #[serde(default = "default_policy")]
    pub default_policy: String,
    /// YAML rule list on disk.
    #[serde(default)]
    pub egress_rules_file: Option<PathBuf>,
    /// YAML rule list inline; appended after `egress_rules_file`.
    #[serde(default)]
    pub egress_rules: Option<String>,
    #[serde(default = "default_true")]
    pub include_platform_rules: bool,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub tool: ToolConfig,
    #[serde(default = "default_sudo_exe")]
    pub sudo_exe: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            allow_http: FlagInput::default(),
            default_policy: default_policy(),
            egress_rules_file: None,
            egress_rules: None,
            include_platform_rules: default_true(),
            network: NetworkConfig::default(),
            logging: LoggingConfig::default(),
            tool: ToolConfig::default(),
            sudo_exe: default_sudo_exe(),
        }
    }
}

/// A yes/no setting written either as a YAML bool or as a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FlagInput {
    Bool(bool),
    Text(String),
}

impl Default for FlagInput {
    fn default() -> Self {
        FlagInput::Bool(false)
    }
}

#[derive(Debug, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_listen")]
    pub listen_addr: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_tls_port")]
    pub tls_upstream_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen(),
            connect_timeout_secs: default_connect_timeout(),
            tls_upstream_port: default_tls_port(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_decisions_path")]
    pub decisions_path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            decisions_path: default_decisions_path(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ToolConfig {
    #[serde(default = "default_tool_name")]
    pub name: String,
    #[serde(default)]
    pub home_dir: Option<PathBuf>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            name: default_tool_name(),
            home_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Default-value functions used by serde
// ---------------------------------------------------------------------------

fn default_mode() -> String {
    "audit".to_string()
}

fn default_policy() -> String {
    "block-all".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sudo_exe() -> String {
    process_audit::attribution::DEFAULT_SUDO_EXE.to_string()
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_tls_port() -> u16 {
    443
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_decisions_path() -> PathBuf {
    PathBuf::from("egress-decisions.jsonl")
}

fn default_tool_name() -> String {
    "egress-warden".to_string()
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

impl Config {
    /// Apply command-line overrides on top of the file values.
    pub fn apply_overrides(&mut self, args: &PolicyArgs) {
        if let Some(ref mode) = args.mode {
            self.mode = mode.clone();
        }
        if let Some(ref policy) = args.default_policy {
            self.default_policy = policy.clone();
        }
        if let Some(ref allow_http) = args.allow_http {
            self.allow_http = FlagInput::Text(allow_http.clone());
        }
        if let Some(ref rules) = args.rules {
            self.egress_rules_file = Some(rules.clone());
        }
        if let Some(ref listen) = args.listen {
            self.network.listen_addr = listen.clone();
        }
    }

    /// Parse mode, default policy and the HTTP flag, substituting documented
    /// defaults (with a warning) for invalid values.
    pub fn settings(&self) -> EgressSettings {
        let allow_http = match &self.allow_http {
            FlagInput::Bool(value) => *value,
            FlagInput::Text(text) => parse_flag("allow_http", text, false),
        };
        EgressSettings {
            mode: Mode::from_input(&self.mode),
            default_policy: DefaultPolicy::from_input(&self.default_policy),
            allow_http,
        }
    }

    /// Ordered rule list: file rules, inline rules, then platform rules.
    ///
    /// An unreadable rules file contributes no rules; the default policy
    /// then governs everything it would have covered.
    pub fn egress_rules(&self) -> Vec<RawRule> {
        let mut rules = Vec::new();

        if let Some(ref path) = self.egress_rules_file {
            match loader::load_rules(path) {
                Ok(file_rules) => rules.extend(file_rules),
                Err(err) => error!(
                    path = %path.display(),
                    err = %format!("{err:#}"),
                    "skipping egress rules file"
                ),
            }
        }
        if let Some(ref inline) = self.egress_rules {
            rules.extend(loader::parse_rules(inline));
        }
        if self.include_platform_rules {
            rules.extend(platform::platform_rules());
        }

        info!(count = rules.len(), "egress rules loaded");
        rules
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load configuration from a YAML file.
///
/// Returns `Ok(None)` when the file does not exist, so the caller can fall
/// back to defaults once logging is up and say so.
pub fn load(path: &Path) -> anyhow::Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

    let config: Config = serde_yml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;

    Ok(Some(config))
}
