use std::sync::OnceLock;

use regex::Regex;

fn version_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"v(\d*\.\d*\.\d*)").ok())
        .as_ref()
}

/// Extracts `X.Y.Z` from the output of `agent -version`, e.g.
/// `agent, version v0.26.1 (branch: HEAD, revision: 2b88be37)`.
pub fn parse_agent_version(output: &str) -> Option<String> {
    version_pattern()?
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
