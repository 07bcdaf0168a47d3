//! Destinations the CI platform itself needs to run a job.

use crate::loader::parse_rules;
use crate::schema::RawRule;

const PLATFORM_RULES_YAML: &str = r#"
- name: "Required by CI platform"
  description: "Needed for essential operations"
  destination: "github.com"
  action: "allow"
- name: "Required by CI platform"
  description: "Needed for essential operations"
  destination: "api.github.com"
  action: "allow"
- name: "Required by CI platform"
  description: "Needed for essential operations and OIDC tokens"
  destination: "*.actions.githubusercontent.com"
  action: "allow"
- name: "Required by CI platform"
  description: "Needed for downloading actions"
  destination: "codeload.github.com"
  action: "allow"
- name: "Required by CI platform"
  description: "Needed for job summaries, logs, workflow artifacts and caches"
  destination: "results-receiver.actions.githubusercontent.com"
  action: "allow"
- name: "Required by CI platform"
  description: "Needed for job summaries, logs, workflow artifacts and caches"
  destination: "*.blob.core.windows.net"
  action: "allow"
- name: "Required by CI platform"
  description: "Needed for runner version updates"
  destination: "objects.githubusercontent.com"
  action: "allow"
- name: "Required by CI platform"
  description: "Needed for runner version updates"
  destination: "objects-origin.githubusercontent.com"
  action: "allow"
- name: "Required by CI platform"
  description: "Needed for runner version updates"
  destination: "github-releases.githubusercontent.com"
  action: "allow"
- name: "Required by CI platform"
  description: "Needed for runner version updates"
  destination: "github-registry-files.githubusercontent.com"
  action: "allow"
- name: "Required by CI platform"
  description: "Needed for packages and containers"
  destination: "*.pkg.github.com"
  action: "allow"
- name: "Required by CI platform"
  description: "Needed for packages and containers"
  destination: "ghcr.io"
  action: "allow"
- name: "Required by CI platform"
  description: "Needed for Git Large File Storage"
  destination: "github-cloud.githubusercontent.com"
  action: "allow"
- name: "Required by CI platform"
  description: "Needed for Git Large File Storage"
  destination: "github-cloud.s3.amazonaws.com"
  action: "allow"
- name: "Required by npm install"
  description: "Needed for npm install"
  destination: "registry.npmjs.org"
  action: "allow"
- name: "Required for instance metadata"
  description: "Needed for instance metadata"
  destination: "169.254.169.254"
  action: "allow"
"#;

/// Allow rules for destinations every CI job depends on.
///
/// Appended after the operator's rules, so an operator rule for the same
/// host still takes priority.
pub fn platform_rules() -> Vec<RawRule> {
    parse_rules(PLATFORM_RULES_YAML)
}
