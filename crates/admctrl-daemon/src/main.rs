//! authd: admission-control daemon.
//!
//! Usage: `authd [CONFIG]` (default `/etc/authd/authd.yaml`).

use std::process::ExitCode;

use tracing_subscriber::{fmt, EnvFilter};

use admctrl_daemon::{app_state, config, transport};

#[tokio::main]
async fn main() -> ExitCode {
    let path = std::env::args().nth(1).unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.into());
    let cfg = match config::load_from_file(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("authd: {e}");
            return ExitCode::FAILURE;
        }
    };

    let default_level = if cfg.daemon.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt().with_env_filter(filter).init();

    let state = match app_state::AppState::new(cfg).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "signal handler failed");
            std::future::pending::<()>().await;
        }
    };
    match transport::serve(state, shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server failed");
            ExitCode::FAILURE
        }
    }
}
