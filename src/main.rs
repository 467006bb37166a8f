//! Preview Server command line
//!
//! Usage:
//!   preview-server serve --root <dir> [--https] [--port <n>] [--config <file>]
//!   preview-server expose --root <dir> --domain <host> [--https] [--minutes <n>]
//!   preview-server trust-status

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use preview_server::core::MAX_EXPOSE_DURATION_SECS;
use preview_server::logging::{LogLevel, LoggingSystem};
use preview_server::{
    CertificateProvider, ExposeController, ExposeOptions, ExposeStatus, PortAllocator, PortHint,
    PreviewConfig, PreviewServer, StartOptions,
};

#[derive(Parser)]
#[command(name = "preview-server")]
#[command(about = "Serve a web build on a private loopback address", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a directory on 127.0.0.1 until interrupted
    Serve {
        /// Directory to serve
        #[arg(long)]
        root: PathBuf,

        /// Serve over HTTPS with a locally issued certificate
        #[arg(long)]
        https: bool,

        /// Port to listen on (0 picks a free port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Expose a directory under a custom domain for a limited time
    Expose {
        /// Directory to serve
        #[arg(long)]
        root: PathBuf,

        /// Domain to publish, optionally with a port (preview.test:8443)
        #[arg(long)]
        domain: String,

        /// Serve over HTTPS with a locally issued certificate
        #[arg(long)]
        https: bool,

        /// Minutes before the exposure expires
        #[arg(long)]
        minutes: Option<u64>,
    },

    /// Report whether the local certificate authority is trusted
    TrustStatus,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PreviewConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PreviewConfig::default(),
    };

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging = logging.with_level(LogLevel::Debug);
    }
    let _logging_system = LoggingSystem::init(logging).context("initializing logging")?;

    let ports = Arc::new(PortAllocator::new(config.ports.clone()));
    let certificates = Arc::new(CertificateProvider::new(config.tls.clone()));

    match cli.command {
        Commands::Serve { root, https, port } => {
            let mut server = PreviewServer::new(config.server.clone(), ports, certificates);
            let mut options = StartOptions::new(root).with_https(https);
            if let Some(port) = port {
                options = options.with_port_hint(PortHint::Port(port));
            }

            let state = server.start(options).await?;
            println!("Serving on {}", state.url);

            tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
            server.stop().await;
        }

        Commands::Expose {
            root,
            domain,
            https,
            minutes,
        } => {
            let controller = ExposeController::new(&config, ports, certificates);
            let mut options = ExposeOptions::new(root).with_https(https).with_domain(domain);
            if let Some(minutes) = minutes {
                let secs = minutes
                    .checked_mul(60)
                    .filter(|secs| (1..=MAX_EXPOSE_DURATION_SECS).contains(secs))
                    .with_context(|| {
                        format!(
                            "--minutes must be between 1 and {}",
                            MAX_EXPOSE_DURATION_SECS / 60
                        )
                    })?;
                options = options.with_duration(Duration::from_secs(secs));
            }

            controller.expose(options).await?;
            if let ExposeStatus::Ready {
                public_url,
                expires_at,
                ..
            } = controller.status()
            {
                println!("Exposed at {} until {}", public_url, expires_at);
            }

            let mut status = controller.subscribe();
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("waiting for Ctrl-C")?;
                }
                _ = status.wait_for(|s| matches!(s, ExposeStatus::Expired | ExposeStatus::Stopped)) => {
                    println!("Exposure expired");
                }
            }
            controller.unexpose().await;
        }

        Commands::TrustStatus => {
            let report = serde_json::json!({
                "status": certificates.trust_status(),
                "trust_anchor": certificates.trust_anchor_path(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
