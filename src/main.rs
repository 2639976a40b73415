//! readwise-mcp: MCP server exposing a Readwise library to AI assistants
//!
//! Serves the built-in Readwise tools and prompts over line-delimited stdio,
//! Server-Sent Events or session-correlated HTTP.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use readwise_mcp::api::{HttpClient, ReadwiseApi};
use readwise_mcp::config::{self, Config, TransportKind};
use readwise_mcp::error::ServerError;
use readwise_mcp::transport::{self, AppState, StdioTransport};

/// MCP server exposing a Readwise library to AI assistants.
#[derive(Parser, Debug)]
#[command(name = "readwise-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Transport to serve (stdio, sse or http)
    #[arg(short, long)]
    transport: Option<TransportKind>,

    /// Host to bind the HTTP transports to
    #[arg(long)]
    host: Option<String>,

    /// Port to bind the HTTP transports to
    #[arg(short, long)]
    port: Option<u16>,

    /// Readwise access token
    #[arg(long, env = "READWISE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Shared secret required on the streaming endpoints
    #[arg(long, env = "MCP_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    /// Lets command-line flags and environment variables win over the file.
    fn apply_to(&self, cfg: &mut Config) {
        if let Some(transport) = self.transport {
            cfg.server.transport = transport;
        }
        if let Some(host) = &self.host {
            cfg.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            cfg.server.port = port;
        }
        if self.api_key.is_some() {
            cfg.api_key.clone_from(&self.api_key);
        }
        if self.auth_token.is_some() {
            cfg.server.auth_token.clone_from(&self.auth_token);
        }
    }
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
///
/// Logs go to stderr; stdout belongs to the stdio transport.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Logs panics instead of letting them print over the protocol stream.
///
/// A panicking request task is isolated by the runtime; the process keeps
/// serving.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic| {
        let location = panic
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        error!(location = %location, "Panic: {panic}");
    }));
}

async fn run(cfg: Config, api: Arc<dyn ReadwiseApi>) -> Result<(), ServerError> {
    let dispatcher = Arc::new(readwise_mcp::builtin_dispatcher(&api)?);

    info!(
        transport = %cfg.server.transport,
        tools = ?dispatcher.tools().names(),
        prompts = ?dispatcher.prompts().names(),
        "Operations registered"
    );

    match cfg.server.transport {
        TransportKind::Stdio => {
            info!("Serving on stdio, waiting for client connection...");
            StdioTransport::new(dispatcher).run().await?;
            Ok(())
        }
        TransportKind::Sse | TransportKind::Http => {
            let state = AppState::new(dispatcher, &cfg.server);
            transport::serve(state, &cfg.server.host).await
        }
    }
}

/// Entry point for the readwise-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let mut cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nExpected config at: {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };
    args.apply_to(&mut cfg);
    if let Err(e) = cfg.validate() {
        eprintln!("Configuration error: {e}");
        return ExitCode::FAILURE;
    }

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);
    install_panic_hook();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting readwise-mcp server"
    );

    let api: Arc<dyn ReadwiseApi> = match cfg
        .require_api_key()
        .map_err(|e| e.to_string())
        .and_then(|key| HttpClient::new(key, &cfg.api).map_err(|e| e.to_string()))
    {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "Cannot create Readwise API client");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg, api)) {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn log_level_resolution() {
        assert_eq!(get_log_level(0, true, "trace"), Level::ERROR);
        assert_eq!(get_log_level(2, false, "warn"), Level::DEBUG);
        assert_eq!(get_log_level(0, false, "Info"), Level::INFO);
        assert_eq!(get_log_level(0, false, "loud"), Level::WARN);
    }

    #[test]
    fn flags_override_file_values() {
        let args = Args::parse_from([
            "readwise-mcp",
            "--transport",
            "http",
            "--port",
            "8080",
            "--api-key",
            "k",
        ]);
        let mut cfg = Config::default();
        args.apply_to(&mut cfg);

        assert_eq!(cfg.server.transport, TransportKind::Http);
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.api_key.as_deref(), Some("k"));
    }
}
