//! Profile data model: the listen binding and the ordered routing rule set
//! Loaded once at startup from a JSON file and never mutated afterwards

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// A single routing rule: destinations inside any of `patterns` are
/// forwarded through the SOCKS5 upstream at `proxy_ip:port`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoutingRule {
    pub name: String,
    /// Only "socks5" is understood; anything else is rejected when the
    /// rule is first used, not at load time.
    pub proxy_type: String,
    pub proxy_ip: String,
    pub port: String,
    /// Ordered CIDR strings, e.g. "10.0.0.0/8". An empty list never matches.
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Proxy configuration: where to listen plus the ordered rule set.
///
/// Rule order is significant (first match wins) and the whole profile is
/// read-only for the lifetime of the server, so it can be shared across
/// request tasks behind an `Arc` without locking.
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub host: String,
    pub port: String,
    #[serde(default)]
    pub rules: Vec<RoutingRule>,
}

impl Profile {
    /// Load a profile from a JSON file.
    ///
    /// Performs no validation of rules: malformed CIDR patterns, upstream
    /// ports, or proxy types surface per-request when the rule is used.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read profile {}", path.display()))?;
        let profile: Profile = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse profile {}", path.display()))?;
        Ok(profile)
    }

    /// The listen address in `host:port` form.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_profile(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("profile.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_profile() {
        let dir = tempdir().unwrap();
        let path = write_profile(
            &dir,
            r#"{
                "host": "127.0.0.1",
                "port": "8118",
                "rules": [
                    {
                        "name": "internal",
                        "proxy_type": "socks5",
                        "proxy_ip": "127.0.0.1",
                        "port": "1080",
                        "patterns": ["10.0.0.0/8"]
                    }
                ]
            }"#,
        );

        let profile = Profile::load(&path).unwrap();
        assert_eq!(profile.server_addr(), "127.0.0.1:8118");
        assert_eq!(profile.rules.len(), 1);
        assert_eq!(profile.rules[0].name, "internal");
        assert_eq!(profile.rules[0].patterns, vec!["10.0.0.0/8"]);
    }

    #[test]
    fn test_load_profile_without_rules() {
        let dir = tempdir().unwrap();
        let path = write_profile(&dir, r#"{"host": "0.0.0.0", "port": "8080"}"#);

        let profile = Profile::load(&path).unwrap();
        assert!(profile.rules.is_empty());
        assert_eq!(profile.server_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_load_does_not_validate_rules() {
        // Bad CIDRs, ports and proxy types load fine; they fail at use time.
        let dir = tempdir().unwrap();
        let path = write_profile(
            &dir,
            r#"{
                "host": "127.0.0.1",
                "port": "8118",
                "rules": [
                    {
                        "name": "broken",
                        "proxy_type": "http",
                        "proxy_ip": "127.0.0.1",
                        "port": "not-a-port",
                        "patterns": ["not-a-cidr"]
                    }
                ]
            }"#,
        );

        let profile = Profile::load(&path).unwrap();
        assert_eq!(profile.rules[0].patterns[0], "not-a-cidr");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.json");
        assert!(Profile::load(&path).is_err());
    }
}
