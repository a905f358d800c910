//! Routing rule evaluation
//! First-match-wins CIDR containment over the ordered rule set

use crate::profile::RoutingRule;
use ipnet::IpNet;
use std::net::IpAddr;
use thiserror::Error;

/// Failure of the match operation itself (as opposed to "no rule matched").
#[derive(Debug, Error)]
pub enum MatchError {
    /// A configured pattern is not valid CIDR notation. This is a
    /// configuration defect and fails the whole match attempt rather than
    /// being skipped, so traffic is never silently routed around a rule
    /// the operator meant to apply.
    #[error("invalid CIDR pattern {pattern:?} in rule {rule:?}")]
    InvalidCidr { rule: String, pattern: String },
}

/// Outcome of evaluating the rule set against a destination host.
///
/// `NoMatch` is the common case, not an error: it means the request is
/// routed directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome<'a> {
    Matched(&'a RoutingRule),
    NoMatch,
}

/// Find the first rule whose pattern set contains `host`.
///
/// Rules are evaluated in declared order, and patterns in declared order
/// within each rule. A `host` that is not an IP literal (a DNS name) can
/// never be contained by a CIDR block and yields `NoMatch` unless a
/// malformed pattern is reached first.
pub fn match_rule<'a>(
    rules: &'a [RoutingRule],
    host: &str,
) -> Result<MatchOutcome<'a>, MatchError> {
    let ip: Option<IpAddr> = host.parse().ok();

    for rule in rules {
        for pattern in &rule.patterns {
            let net: IpNet = pattern.parse().map_err(|_| MatchError::InvalidCidr {
                rule: rule.name.clone(),
                pattern: pattern.clone(),
            })?;

            if let Some(addr) = ip {
                if net.contains(&addr) {
                    return Ok(MatchOutcome::Matched(rule));
                }
            }
        }
    }

    Ok(MatchOutcome::NoMatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, patterns: &[&str]) -> RoutingRule {
        RoutingRule {
            name: name.to_string(),
            proxy_type: "socks5".to_string(),
            proxy_ip: "127.0.0.1".to_string(),
            port: "1080".to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn matched_name<'a>(outcome: MatchOutcome<'a>) -> Option<&'a str> {
        match outcome {
            MatchOutcome::Matched(rule) => Some(rule.name.as_str()),
            MatchOutcome::NoMatch => None,
        }
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let rules = vec![
            rule("first", &["10.0.0.0/8"]),
            rule("second", &["10.1.0.0/16"]),
        ];

        let outcome = match_rule(&rules, "10.1.2.3").unwrap();
        assert_eq!(matched_name(outcome), Some("first"));
    }

    #[test]
    fn test_rule_matches_on_any_pattern() {
        let rules = vec![rule("multi", &["192.168.0.0/16", "172.16.0.0/12"])];

        let outcome = match_rule(&rules, "172.20.0.1").unwrap();
        assert_eq!(matched_name(outcome), Some("multi"));
    }

    #[test]
    fn test_no_match_for_uncontained_host() {
        let rules = vec![rule("internal", &["10.0.0.0/8"])];

        let outcome = match_rule(&rules, "8.8.8.8").unwrap();
        assert_eq!(outcome, MatchOutcome::NoMatch);
    }

    #[test]
    fn test_dns_name_never_matches() {
        let rules = vec![rule("internal", &["10.0.0.0/8"])];

        let outcome = match_rule(&rules, "example.com").unwrap();
        assert_eq!(outcome, MatchOutcome::NoMatch);
    }

    #[test]
    fn test_empty_pattern_set_never_matches() {
        let rules = vec![rule("empty", &[]), rule("catch", &["0.0.0.0/0"])];

        let outcome = match_rule(&rules, "1.2.3.4").unwrap();
        assert_eq!(matched_name(outcome), Some("catch"));
    }

    #[test]
    fn test_malformed_cidr_fails_the_match() {
        // Strict behavior: a bad pattern reached during evaluation aborts
        // the whole match, even though a later pattern would have matched.
        let rules = vec![rule("broken", &["not-a-cidr", "10.0.0.0/8"])];

        let err = match_rule(&rules, "10.1.2.3").unwrap_err();
        let MatchError::InvalidCidr { rule, pattern } = err;
        assert_eq!(rule, "broken");
        assert_eq!(pattern, "not-a-cidr");
    }

    #[test]
    fn test_malformed_cidr_in_later_rule() {
        // The bad pattern is only reached if no earlier rule matched first.
        let rules = vec![
            rule("good", &["10.0.0.0/8"]),
            rule("broken", &["bogus/99"]),
        ];

        assert_eq!(
            matched_name(match_rule(&rules, "10.0.0.1").unwrap()),
            Some("good")
        );
        assert!(match_rule(&rules, "8.8.8.8").is_err());
    }

    #[test]
    fn test_ipv6_containment() {
        let rules = vec![rule("v6", &["fd00::/8"])];

        let outcome = match_rule(&rules, "fd12:3456::1").unwrap();
        assert_eq!(matched_name(outcome), Some("v6"));

        let outcome = match_rule(&rules, "2001:db8::1").unwrap();
        assert_eq!(outcome, MatchOutcome::NoMatch);
    }

    #[test]
    fn test_match_is_idempotent() {
        let rules = vec![rule("internal", &["10.0.0.0/8"])];

        for _ in 0..3 {
            let outcome = match_rule(&rules, "10.9.9.9").unwrap();
            assert_eq!(matched_name(outcome), Some("internal"));
        }
    }
}
