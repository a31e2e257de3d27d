mod server_loop;

use clap::Parser;
use healthpass_daemon::config::parse_port;
use healthpass_daemon::{CorsPolicy, DaemonConfig, GrpcTransport};
use healthpass_probe::Passthrough;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// HTTP front door for gRPC health checks.
#[derive(Parser, Debug)]
#[command(name = "healthpassd", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Listen address (overrides config)
    #[arg(long)]
    bind: Option<String>,
    /// Listen port (overrides config and $PORT)
    #[arg(short, long)]
    port: Option<String>,
    /// Value of Access-Control-Allow-Origin (overrides config)
    #[arg(long)]
    allowed_origin: Option<String>,
}

fn resolve_config(args: &Args) -> Result<DaemonConfig, healthpass_daemon::ConfigError> {
    let mut config = match args.config.as_ref() {
        Some(path) => DaemonConfig::from_path(path)?,
        None => DaemonConfig::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    if let Some(bind) = args.bind.as_ref() {
        config.bind = bind.clone();
    }
    if let Some(port) = args.port.as_deref() {
        config.port = parse_port(port.trim())?;
    }
    if let Some(origin) = args.allowed_origin.as_ref() {
        config.allowed_origin = origin.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(err) => {
            log::error!("healthpassd: {err}");
            return ExitCode::FAILURE;
        }
    };
    let addr = match config.listen_addr() {
        Ok(addr) => addr,
        Err(err) => {
            log::error!("healthpassd: {err}");
            return ExitCode::FAILURE;
        }
    };
    let transport = match GrpcTransport::new(&config) {
        Ok(transport) => transport,
        Err(err) => {
            log::error!("healthpassd: {err}");
            return ExitCode::FAILURE;
        }
    };

    let probe = Arc::new(Passthrough::new(transport));
    let cors = Arc::new(CorsPolicy::new(config.allowed_origin.clone()));
    match server_loop::run_server_loop(addr, probe, cors).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("healthpassd: listener on {addr} failed: {err}");
            ExitCode::FAILURE
        }
    }
}
