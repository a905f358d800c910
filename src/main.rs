//! h2sproxy - Main entry point
//!
//! Loads the routing profile, initializes logging and runs the proxy

use anyhow::Result;
use clap::Parser;
use h2sproxy::{Profile, ProxyServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const BANNER: &str = r#"
 _   _ ____  ____  ____
| | | |___ \/ ___||  _ \ _ __ _____  ___   _
| |_| | __) \___ \| |_) | '__/ _ \ \/ / | | |
|  _  |/ __/ ___) |  __/| | | (_) >  <| |_| |
|_| |_|_____|____/|_|   |_|  \___/_/\_\\__, |
                                       |___/
"#;

/// h2sproxy - A rule-based HTTP-to-SOCKS5 forward proxy server
#[derive(Parser, Debug)]
#[command(name = "h2sproxy")]
#[command(version = "1.0.0")]
#[command(about = "A rule-based HTTP-to-SOCKS5 forward proxy server")]
struct Args {
    /// Path to the JSON routing profile
    #[arg(long, env = "PROFILE_PATH", default_value = "./profile.json")]
    profile: PathBuf,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let profile = Arc::new(Profile::load(&args.profile)?);

    println!("{}", BANNER);
    info!("Profile loaded from {}", args.profile.display());
    info!(
        "Starting h2sproxy on [{}] with {} routing rule(s)",
        profile.server_addr(),
        profile.rules.len()
    );

    let server = Arc::new(ProxyServer::new(profile));
    server.run().await?;

    Ok(())
}
