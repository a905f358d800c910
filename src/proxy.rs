//! Proxy server implementation
//! Handles forward HTTP/HTTPS proxying with rule-based SOCKS5 routing

use crate::error::ProxyError;
use crate::headers::{append_forwarded_for, copy_headers, strip_hop_by_hop};
use crate::matcher::{match_rule, MatchOutcome};
use crate::profile::Profile;
use crate::transport;
use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::HOST;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, Uri, Version};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// Forward proxy server
///
/// Holds the immutable profile (listen binding + rule set) shared by all
/// request tasks. All per-request state lives on the task's stack.
pub struct ProxyServer {
    profile: Arc<Profile>,
}

impl ProxyServer {
    /// Create a new proxy server over a loaded profile
    pub fn new(profile: Arc<Profile>) -> Self {
        Self { profile }
    }

    /// Start the proxy server
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let addr: SocketAddr = self
            .profile
            .server_addr()
            .parse()
            .with_context(|| format!("invalid listen address {}", self.profile.server_addr()))?;

        let listener = TcpListener::bind(addr).await?;
        info!("Proxy server listening on {}", addr);

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let profile = self.profile.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, remote_addr, profile).await {
                    debug!("Connection error from {}: {}", remote_addr, e);
                }
            });
        }
    }

    /// Handle a single client connection
    async fn handle_connection(
        stream: TcpStream,
        remote_addr: SocketAddr,
        profile: Arc<Profile>,
    ) -> Result<()> {
        let io = TokioIo::new(stream);

        http1::Builder::new()
            .preserve_header_case(true)
            .serve_connection(
                io,
                service_fn(move |req| {
                    let profile = profile.clone();
                    async move { Self::handle_request(req, remote_addr, profile).await }
                }),
            )
            .await
            .map_err(|e| anyhow!("HTTP service error: {}", e))
    }

    /// Handle incoming request, converting pipeline failures to error
    /// responses for this client. No failure is fatal to the process.
    async fn handle_request(
        req: Request<Incoming>,
        remote_addr: SocketAddr,
        profile: Arc<Profile>,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Infallible> {
        match Self::process_request(req, remote_addr, &profile).await {
            Ok(response) => Ok(response),
            Err(e) => {
                error!("Request from {} failed: {}", remote_addr, e);
                Ok(Self::error_response(e.status_code()))
            }
        }
    }

    /// Process one proxied request: sanitize, match, connect, relay.
    async fn process_request(
        req: Request<Incoming>,
        remote_addr: SocketAddr,
        profile: &Profile,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, ProxyError> {
        debug!("{} {} from {}", req.method(), req.uri(), remote_addr);

        // Proxy-style requests carry an absolute-form target.
        let scheme = req.uri().scheme_str().unwrap_or("").to_string();
        if scheme != "http" && scheme != "https" {
            return Err(ProxyError::UnsupportedScheme(scheme));
        }
        let use_tls = scheme == "https";

        let authority = req
            .uri()
            .authority()
            .ok_or_else(|| ProxyError::MalformedTarget("missing authority".to_string()))?
            .clone();
        let host = authority.host().to_string();
        let port = authority.port_u16().ok_or_else(|| {
            ProxyError::MalformedTarget(format!("missing port in target {}", authority))
        })?;

        let (mut parts, body) = req.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        append_forwarded_for(&mut parts.headers, &remote_addr.ip().to_string());

        let outcome = match_rule(&profile.rules, &host)?;
        match outcome {
            MatchOutcome::Matched(rule) => info!(
                "Routing {} via rule {:?} (socks5 {}:{})",
                parts.uri, rule.name, rule.proxy_ip, rule.port
            ),
            MatchOutcome::NoMatch => info!("Routing {} via rule \"default\" (direct)", parts.uri),
        }

        // The outbound request line must be origin-form: the absolute
        // target is replaced and the authority moves to the Host header.
        let outbound_uri: Uri = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .parse()
            .map_err(|e| ProxyError::MalformedTarget(format!("invalid request path: {}", e)))?;

        let mut builder = Request::builder()
            .method(parts.method)
            .uri(outbound_uri)
            .version(Version::HTTP_11);

        for (name, value) in parts.headers.iter() {
            if name != HOST {
                builder = builder.header(name, value);
            }
        }
        builder = builder.header(HOST, authority.as_str());

        let outbound_req = builder
            .body(body)
            .map_err(|e| ProxyError::MalformedTarget(format!("invalid request: {}", e)))?;

        let stream = transport::connect(outcome, &host, port, use_tls).await?;
        let io = TokioIo::new(stream);

        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ProxyError::Upstream(format!("handshake failed: {}", e)))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("Upstream connection ended: {}", e);
            }
        });

        let upstream_res = sender
            .send_request(outbound_req)
            .await
            .map_err(|e| ProxyError::Upstream(format!("failed to send request: {}", e)))?;

        let (mut res_parts, res_body) = upstream_res.into_parts();
        strip_hop_by_hop(&mut res_parts.headers);

        // Stream the body through as-is. A mid-stream failure can only be
        // logged: the status and headers are already committed by then.
        let body = res_body
            .map_err(|e| {
                error!("Failed to stream response body: {}", e);
                e
            })
            .boxed();

        let mut response = Response::new(body);
        *response.status_mut() = res_parts.status;
        copy_headers(response.headers_mut(), &res_parts.headers);

        Ok(response)
    }

    /// Create error response
    fn error_response(status: StatusCode) -> Response<BoxBody<Bytes, hyper::Error>> {
        let message = status
            .canonical_reason()
            .unwrap_or("Unexpected Error")
            .to_string();

        Response::builder()
            .status(status)
            .header("Content-Type", "text/plain")
            .body(Self::full_body(Bytes::from(message)))
            .unwrap()
    }

    /// Create full body
    fn full_body(bytes: Bytes) -> BoxBody<Bytes, hyper::Error> {
        Full::new(bytes)
            .map_err(|never| match never {})
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_carries_status() {
        let response = ProxyServer::error_response(StatusCode::BAD_GATEWAY);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain"
        );
    }

    #[test]
    fn test_error_response_for_server_error() {
        let response = ProxyServer::error_response(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
