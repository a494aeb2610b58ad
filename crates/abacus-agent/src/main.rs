//! # abacus-agent
//!
//! Abacus calculator server binary: loads settings, initializes logging and
//! metrics, then serves MCP over HTTP (or over stdio with `--stdio`) until a
//! termination signal or a worker fault triggers the drain.

#![deny(unsafe_code)]

mod stdio;

use std::path::PathBuf;
use std::sync::Arc;

use abacus_core::logging::{self, LogFormat};
use abacus_rpc::{Dispatcher, RpcContext};
use abacus_server::ServerConfig;
use abacus_settings::AbacusSettings;
use anyhow::{Context, Result};
use clap::Parser;

/// Abacus calculator server.
#[derive(Parser, Debug)]
#[command(name = "abacus-agent", about = "MCP calculator server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.abacus/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Serve newline-delimited JSON-RPC on stdin/stdout instead of HTTP.
    #[arg(long)]
    stdio: bool,
}

impl Cli {
    fn load_settings(&self) -> Result<AbacusSettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(abacus_settings::settings_path);
        let mut settings = abacus_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.load_settings()?;

    let format = LogFormat::parse(&settings.logging.format).unwrap_or_default();
    logging::init_subscriber(&settings.logging.level, format);

    let dispatcher = Dispatcher::new(RpcContext::default());

    if args.stdio {
        tracing::info!("serving JSON-RPC on stdio");
        tokio::select! {
            result = stdio::serve(dispatcher) => result.context("stdio transport failed")?,
            reason = termination_signal() => tracing::info!(reason, "stdio mode stopped"),
        }
        return Ok(());
    }

    let metrics = match abacus_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics disabled");
            None
        }
    };

    let config = ServerConfig::from_settings(&settings);
    let handle = abacus_server::start(config, dispatcher, metrics)
        .await
        .context("Failed to bind server")?;
    tracing::info!("Abacus listening on http://{}", handle.local_addr());

    let coordinator = Arc::clone(handle.coordinator());
    let faults = coordinator.requested();
    tokio::select! {
        reason = termination_signal() => coordinator.request(reason),
        () = faults.cancelled() => {}
    }

    let report = handle.drain().await;
    coordinator.exit(report)
}

/// Resolve on SIGINT or SIGTERM with the signal's name.
async fn termination_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = term.recv() => "SIGTERM",
            },
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
                "SIGINT"
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abacus_settings::Environment;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["abacus-agent"]);
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(cli.settings.is_none());
        assert!(!cli.stdio);
    }

    #[test]
    fn cli_flags() {
        let cli = Cli::parse_from([
            "abacus-agent",
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
            "--stdio",
        ]);
        assert_eq!(cli.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(cli.port, Some(8080));
        assert!(cli.stdio);
    }

    #[test]
    fn cli_rejects_bad_port() {
        assert!(Cli::try_parse_from(["abacus-agent", "--port", "99999"]).is_err());
    }

    #[test]
    fn flags_override_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server":{"host":"10.0.0.1","port":4000,"environment":"production"}}"#,
        )
        .unwrap();

        let cli = Cli::parse_from([
            "abacus-agent",
            "--settings",
            path.to_str().unwrap(),
            "--port",
            "5000",
        ]);
        let settings = cli.load_settings().unwrap();
        assert_eq!(settings.server.port, 5000);
        assert_eq!(settings.server.environment, Environment::Production);
    }

    #[test]
    fn invalid_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ nope").unwrap();
        let cli = Cli::parse_from(["abacus-agent", "--settings", path.to_str().unwrap()]);
        assert!(cli.load_settings().is_err());
    }
}
