pub mod dispatch;
pub mod simulate;

use std::path::Path;

use blockpool_state::StateStore;
use tokio::sync::watch;
use tracing::{info, warn};

/// File name of the on-disk store inside `--data-dir`.
pub const STATE_FILE: &str = "blockpool.redb";

/// Open the store under `data_dir`, or an in-memory one without it.
pub fn open_state(data_dir: Option<&Path>) -> anyhow::Result<StateStore> {
    match data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(STATE_FILE);
            let state = StateStore::open(&path)?;
            info!(path = ?path, "state store opened");
            Ok(state)
        }
        None => Ok(StateStore::open_in_memory()?),
    }
}

/// Flip the returned receiver to `true` on Ctrl-C.
pub fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received, draining in-flight jobs");
                let _ = tx.send(true);
            }
            Err(e) => warn!(error = %e, "failed to install Ctrl-C handler"),
        }
    });
    rx
}
