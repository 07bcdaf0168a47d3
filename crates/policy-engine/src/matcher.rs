use regex::Regex;
use tracing::warn;

/// Convert a wildcard pattern into an anchored regular expression.
///
/// Every regex metacharacter in `pattern` is escaped, then each `*` becomes
/// "any run of characters". The result is anchored at both ends, so
/// `*.example.com` matches `a.example.com` and `a.b.example.com` but never
/// `example.com` or `evil-example.com.attacker.net`.
pub fn glob_to_regex(pattern: &str) -> String {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    format!("^{escaped}$")
}

/// Compile a wildcard pattern into an anchored [`Regex`].
pub fn compile_glob(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&glob_to_regex(pattern))
}

/// Reduce an operator-supplied destination to a bare lowercase host glob.
///
/// A leading `http://` / `https://` and any path suffix are removed, each with
/// a warning, since rules match hosts only.
pub fn normalize_destination(raw: &str) -> String {
    let mut destination = raw.trim().to_lowercase();

    for scheme in ["http://", "https://"] {
        if let Some(rest) = destination.strip_prefix(scheme) {
            warn!(destination = %raw, "removing scheme from egress rule destination");
            destination = rest.to_string();
            break;
        }
    }

    if let Some((host, _)) = destination.split_once('/') {
        warn!(destination = %raw, "removing path from egress rule destination");
        destination = host.to_string();
    }

    destination
}
