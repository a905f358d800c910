//! h2sproxy - A rule-based HTTP-to-SOCKS5 forward proxy server
//!
//! For each proxied request the destination host is matched against
//! CIDR routing rules, and the request is forwarded either directly or
//! through the matched rule's SOCKS5 upstream, with hop-by-hop header
//! sanitation in both directions.

pub mod error;
pub mod headers;
pub mod matcher;
pub mod profile;
pub mod proxy;
pub mod transport;

pub use error::ProxyError;
pub use matcher::{match_rule, MatchOutcome};
pub use profile::{Profile, RoutingRule};
pub use proxy::ProxyServer;
