//! Outbound transport construction
//! Direct TCP, SOCKS5-tunnelled, and TLS-wrapped streams for the relay

use crate::error::ProxyError;
use crate::matcher::MatchOutcome;
use crate::profile::RoutingRule;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_socks::tcp::Socks5Stream;

/// An established outbound byte stream, ready for an HTTP client handshake.
/// Unifies the direct, SOCKS5-tunnelled and TLS-wrapped shapes.
pub trait IoStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> IoStream for T {}

/// Connect to `host:port` according to the routing decision.
///
/// A fresh connection is made per request; nothing is pooled or reused.
/// When `use_tls` is set (https target) the stream is wrapped in a rustls
/// client session against `host` with the webpki root store.
pub async fn connect(
    matched: MatchOutcome<'_>,
    host: &str,
    port: u16,
    use_tls: bool,
) -> Result<Box<dyn IoStream>, ProxyError> {
    let stream: Box<dyn IoStream> = match matched {
        MatchOutcome::NoMatch => {
            let stream = TcpStream::connect((host, port)).await.map_err(|e| {
                ProxyError::Upstream(format!("failed to connect to {}:{}: {}", host, port, e))
            })?;
            Box::new(stream)
        }
        MatchOutcome::Matched(rule) => Box::new(socks5_connect(rule, host, port).await?),
    };

    if use_tls {
        wrap_tls(stream, host).await
    } else {
        Ok(stream)
    }
}

/// Tunnel to the target through the rule's SOCKS5 upstream (anonymous,
/// no timeout override). The rule's proxy type and upstream port are
/// validated here rather than at profile load time.
async fn socks5_connect(
    rule: &RoutingRule,
    host: &str,
    port: u16,
) -> Result<Socks5Stream<TcpStream>, ProxyError> {
    if !rule.proxy_type.eq_ignore_ascii_case("socks5") {
        return Err(ProxyError::TransportConstruction(format!(
            "unsupported proxy type {:?} in rule {:?}",
            rule.proxy_type, rule.name
        )));
    }

    let upstream_port: u16 = rule.port.parse().map_err(|_| {
        ProxyError::TransportConstruction(format!(
            "invalid upstream port {:?} in rule {:?}",
            rule.port, rule.name
        ))
    })?;

    Socks5Stream::connect((rule.proxy_ip.as_str(), upstream_port), (host, port))
        .await
        .map_err(|e| {
            ProxyError::Upstream(format!(
                "SOCKS5 connection via {}:{} failed: {}",
                rule.proxy_ip, upstream_port, e
            ))
        })
}

async fn wrap_tls(stream: Box<dyn IoStream>, host: &str) -> Result<Box<dyn IoStream>, ProxyError> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(|_| ProxyError::Upstream(format!("invalid TLS server name {:?}", host)))?;

    let connector = TlsConnector::from(Arc::new(config));
    let tls_stream = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| ProxyError::Upstream(format!("TLS handshake with {} failed: {}", host, e)))?;

    Ok(Box::new(tls_stream))
}
