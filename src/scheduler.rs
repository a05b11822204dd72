//! Periodic sync cycles with cooperative shutdown
//!
//! The core never sleeps and has no notion of "every hour". This module is
//! the thin loop around it: run a cycle on a blocking task, wait for the
//! interval, repeat. Shutdown is an explicit `watch` channel rather than a
//! global flag. It is honoured between cycles only; a cycle that has started
//! always runs to completion.
//!
//! ```rust,no_run
//! use backstop::{scheduler, MirrorBuilder};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio::sync::watch;
//!
//! # async fn example() {
//! let mirror = Arc::new(MirrorBuilder::new().build("/data", "/backup", "/deleted"));
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     let _ = shutdown_tx.send(true);
//! });
//!
//! let interval = Duration::from_secs(3600);
//! let cycles = scheduler::run_periodic(mirror, interval, shutdown_rx, |outcome| {
//!     if let Err(e) = outcome {
//!         eprintln!("cycle failed: {}", e);
//!     }
//! })
//! .await;
//! println!("ran {} cycles", cycles);
//! # }
//! ```

use crate::error::{BackstopError, Result};
use crate::mirror::Mirror;
use crate::types::SyncReport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Run sync cycles every `interval` until `shutdown` turns true
///
/// The first cycle starts immediately. `on_cycle` receives the outcome of
/// every cycle; a failed cycle does not stop the loop. Returns the number of
/// cycles that ran.
pub async fn run_periodic<F>(
    mirror: Arc<Mirror>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut on_cycle: F,
) -> usize
where
    F: FnMut(Result<SyncReport>),
{
    let mut cycles = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let worker = Arc::clone(&mirror);
        let outcome = tokio::task::spawn_blocking(move || worker.sync())
            .await
            .unwrap_or_else(|e| Err(BackstopError::internal(format!("sync task failed: {}", e))));
        cycles += 1;
        on_cycle(outcome);

        debug!("Next cycle in {}", humantime::format_duration(interval));
        tokio::select! {
            changed = shutdown.changed() => {
                // A dropped sender can never signal again; treat it as shutdown
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!("Stopped after {} cycles", cycles);
    cycles
}
