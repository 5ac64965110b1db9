//! Forwarding supervisor.
//!
//! Owns the input worker for the lifetime of a session. The worker reports
//! a disconnect by exiting; the supervisor then rediscovers devices and
//! starts a fresh worker, so hot-plugging a mouse or keyboard recovers on
//! its own.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};
use vdesk_input::{DeviceBackend, InputForwarder, RemoteSession, WorkerExit, WorkerHandle};

use crate::config::{Config, DaemonConfig};
use crate::error::DaemonError;

/// How often the supervisor checks whether the worker has exited.
const WATCH_INTERVAL: Duration = Duration::from_millis(50);

pub struct Daemon<B, S> {
    config: DaemonConfig,
    forwarder: InputForwarder,
    backend: Arc<B>,
    session: Arc<S>,
}

impl<B, S> Daemon<B, S>
where
    B: DeviceBackend,
    S: RemoteSession,
{
    pub fn new(config: &Config, backend: B, session: Arc<S>) -> Self {
        Self {
            config: config.daemon.clone(),
            forwarder: InputForwarder::new(config.input.forwarder_options()),
            backend: Arc::new(backend),
            session,
        }
    }

    /// Forward input until `stop` flips to `true` or the worker exits for a
    /// reason that restarting cannot fix.
    ///
    /// A failed initial start is returned as an error. A failed restart is
    /// also an error, since the device directory vanished under us.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) -> Result<WorkerExit, DaemonError> {
        let mut worker = self.start_worker().await?;
        let mut restarts = 0u64;

        loop {
            tokio::select! {
                _ = stop.changed() => break,
                () = tokio::time::sleep(WATCH_INTERVAL) => {}
            }
            if *stop.borrow() {
                break;
            }
            if !worker.is_finished() {
                continue;
            }

            let exit = worker.join();
            let forwarded = worker.stats().forwarded();
            match exit {
                WorkerExit::DeviceDisconnected { ref device } if self.config.restart_on_disconnect => {
                    restarts += 1;
                    warn!(
                        device = %device.name,
                        path = %device.path.display(),
                        forwarded,
                        restarts,
                        "device disconnected, rediscovering"
                    );
                    tokio::select! {
                        _ = stop.changed() => return Ok(WorkerExit::Requested),
                        () = tokio::time::sleep(self.config.restart_delay()) => {}
                    }
                    worker = self.start_worker().await?;
                }
                other => {
                    info!(exit = ?other, forwarded, "input worker exited");
                    return Ok(other);
                }
            }
        }

        let exit = tokio::task::spawn_blocking(move || worker.stop())
            .await
            .map_err(|e| DaemonError::Other(e.into()))?;
        info!(exit = ?exit, "input forwarding stopped");
        Ok(exit)
    }

    async fn start_worker(&self) -> Result<WorkerHandle, DaemonError> {
        let forwarder = self.forwarder.clone();
        let backend = Arc::clone(&self.backend);
        let session = Arc::clone(&self.session);
        let handle = tokio::task::spawn_blocking(move || forwarder.start(&*backend, session))
            .await
            .map_err(|e| DaemonError::Other(e.into()))??;
        Ok(handle)
    }
}
