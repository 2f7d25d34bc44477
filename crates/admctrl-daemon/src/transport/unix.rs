//! Unix stream socket server.

use std::future::Future;
use std::io;
use std::path::Path;
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};

use admctrl_core::error::{AdmCtrlError, Result};

use super::codec::{read_frame, write_result};
use crate::app_state::AppState;

/// Serve requests on `state.cfg().daemon.socket` until `shutdown` resolves.
///
/// A stale socket file is replaced; the socket file is removed on exit.
pub async fn serve(state: AppState, shutdown: impl Future<Output = ()>) -> Result<()> {
    let path = state.cfg().daemon.socket.clone();
    let listener = bind(&path)?;
    tracing::info!(socket = %path.display(), "authd listening");

    tokio::pin!(shutdown);
    let outcome = loop {
        tokio::select! {
            _ = &mut shutdown => break Ok(()),
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let state = state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_conn(state, stream).await {
                            tracing::warn!(error = %e, "connection closed with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                    break Err(AdmCtrlError::Internal(format!("accept failed: {e}")));
                }
            },
        }
    };

    drop(listener);
    if let Err(e) = std::fs::remove_file(&path) {
        tracing::debug!(error = %e, "socket file not removed");
    }
    tracing::info!("authd stopped");
    outcome
}

fn bind(path: &Path) -> Result<UnixListener> {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(socket = %path.display(), "removed stale socket"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(AdmCtrlError::Internal(format!(
                "remove {} failed: {e}",
                path.display()
            )))
        }
    }
    UnixListener::bind(path)
        .map_err(|e| AdmCtrlError::Internal(format!("bind {} failed: {e}", path.display())))
}

async fn handle_conn(state: AppState, mut stream: UnixStream) -> io::Result<()> {
    let idle = Duration::from_millis(state.cfg().daemon.read_timeout_ms);
    loop {
        let frame = match tokio::time::timeout(idle, read_frame(&mut stream)).await {
            Err(_) => {
                tracing::debug!("idle timeout");
                return Ok(());
            }
            Ok(frame) => frame?,
        };
        let Some(raw) = frame else {
            return Ok(());
        };
        let result = state.handle_request(raw).await;
        write_result(&mut stream, &result).await?;
    }
}
