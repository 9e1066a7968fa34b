//! Watch consumer and reconcile worker wiring.
//!
//! One control flow consumes the watch stream and feeds the debounce
//! scheduler; a single worker task drains the scheduler's channel, so at most
//! one reconcile pass is in flight at a time.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use copilot_core::{Completion, RetryPolicy};
use copilot_kube::{CompletionStore, CustomObjectsClient, KubeError, WatchEvent, WatchStream};
use copilot_provider::CompletionBackend;

use crate::artifact::ErrorArtifact;
use crate::config::ControllerSettings;
use crate::reconciler::{ReconcileEngine, ReconcileOutcome};
use crate::scheduler::DebounceScheduler;

const RECONCILE_QUEUE_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Giving up on watch connection after {attempts} attempts: {source}")]
    WatchConnect {
        attempts: u32,
        #[source]
        source: KubeError,
    },
}

pub struct Controller<S, P>
where
    S: CompletionStore + Send + Sync + 'static,
    P: CompletionBackend + Send + Sync + 'static,
{
    kube: Arc<CustomObjectsClient>,
    engine: Arc<ReconcileEngine<S, P>>,
    settings: ControllerSettings,
}

impl<S, P> Controller<S, P>
where
    S: CompletionStore + Send + Sync + 'static,
    P: CompletionBackend + Send + Sync + 'static,
{
    pub fn new(
        kube: Arc<CustomObjectsClient>,
        engine: Arc<ReconcileEngine<S, P>>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            kube,
            engine,
            settings,
        }
    }

    /// Run the controller until the watch connection is lost for good.
    ///
    /// Establishment failures back off exponentially with jitter; exhausting
    /// the configured ceiling returns the fatal error. A stream that ends
    /// after delivering events reconnects immediately.
    pub async fn run(self) -> Result<(), ControllerError> {
        let (tx, rx) = mpsc::channel(RECONCILE_QUEUE_DEPTH);
        let scheduler = DebounceScheduler::new(self.settings.debounce_window(), tx);

        let worker = ReconcileWorker {
            engine: Arc::clone(&self.engine),
            scheduler: scheduler.clone(),
            retry: self.settings.retry.clone(),
            artifact_dir: PathBuf::from(&self.settings.artifact_dir),
        };
        tokio::spawn(worker.run(rx));

        self.watch_loop(&scheduler).await
    }

    async fn watch_loop(&self, scheduler: &DebounceScheduler) -> Result<(), ControllerError> {
        let mut failures: u32 = 0;
        loop {
            match self.kube.watch().await {
                Ok(mut stream) => {
                    info!("watch subscription established");
                    if consume_stream(&mut stream, scheduler).await {
                        failures = 0;
                    }
                    info!("watch stream ended, resubscribing");
                }
                Err(e) => {
                    failures += 1;
                    if !self.settings.reconnect.allows(failures) {
                        error!(attempts = failures, error = %e, "watch connection failed for good");
                        return Err(ControllerError::WatchConnect {
                            attempts: failures,
                            source: e,
                        });
                    }
                    let delay = self.settings.reconnect.delay_for(failures);
                    warn!(
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "watch connection failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
            // A stream that never delivered anything keeps its failure
            // streak, so an instantly-dying connection still backs off.
            if failures > 0 {
                tokio::time::sleep(self.settings.reconnect.delay_for(failures)).await;
            }
        }
    }
}

/// Drain one watch stream; returns whether any event was delivered.
async fn consume_stream(stream: &mut WatchStream, scheduler: &DebounceScheduler) -> bool {
    let mut delivered = false;
    loop {
        match stream.next_event().await {
            Ok(Some(event)) => {
                delivered = true;
                handle_event(event, scheduler);
            }
            Ok(None) => return delivered,
            Err(e) if e.is_event_local() => {
                warn!(error = %e, "skipping undecodable watch event");
            }
            Err(e) => {
                warn!(error = %e, "watch stream failed");
                return delivered;
            }
        }
    }
}

fn handle_event(event: WatchEvent, scheduler: &DebounceScheduler) {
    match event {
        WatchEvent::Added(obj) => {
            debug!(name = obj.name().unwrap_or("<unnamed>"), "resource added");
            scheduler.schedule(obj);
        }
        WatchEvent::Modified(obj) => {
            debug!(name = obj.name().unwrap_or("<unnamed>"), "resource modified");
            scheduler.schedule(obj);
        }
        WatchEvent::Deleted(obj) => {
            info!(
                name = obj.name().unwrap_or("<unnamed>"),
                "resource deleted, nothing to reconcile"
            );
        }
        WatchEvent::Unknown(phase) => {
            warn!(phase = %phase, "ignoring unknown watch phase");
        }
    }
}

/// Serial consumer of debounced reconcile requests.
struct ReconcileWorker<S, P>
where
    S: CompletionStore + Send + Sync + 'static,
    P: CompletionBackend + Send + Sync + 'static,
{
    engine: Arc<ReconcileEngine<S, P>>,
    scheduler: DebounceScheduler,
    retry: RetryPolicy,
    artifact_dir: PathBuf,
}

impl<S, P> ReconcileWorker<S, P>
where
    S: CompletionStore + Send + Sync + 'static,
    P: CompletionBackend + Send + Sync + 'static,
{
    async fn run(self, mut rx: mpsc::Receiver<Completion>) {
        // Consecutive failures per resource; cleared on success or when the
        // retry budget runs out.
        let mut failures: HashMap<String, u32> = HashMap::new();

        while let Some(obj) = rx.recv().await {
            let Some(name) = obj.name().map(str::to_string) else {
                warn!("dropping unnamed object from reconcile queue");
                continue;
            };

            match self.engine.reconcile(obj.clone()).await {
                Ok(ReconcileOutcome::Converged) => {
                    failures.remove(&name);
                }
                Ok(ReconcileOutcome::Updated {
                    observed_generation,
                }) => {
                    failures.remove(&name);
                    debug!(name = %name, observed_generation, "reconcile pass complete");
                }
                Err(err) => {
                    if err.wants_artifact() {
                        let artifact = ErrorArtifact::new(&name, err.category(), err.to_string());
                        match artifact.write_to(&self.artifact_dir) {
                            Ok(path) => {
                                info!(name = %name, path = %path.display(), "error artifact written");
                            }
                            Err(io_err) => {
                                warn!(name = %name, error = %io_err, "failed to write error artifact");
                            }
                        }
                    }

                    if !err.is_retryable() {
                        warn!(name = %name, error = %err, "reconcile abandoned for this pass");
                        continue;
                    }

                    let attempt = failures.entry(name.clone()).or_insert(0);
                    *attempt += 1;
                    let attempt = *attempt;
                    if self.retry.allows(attempt) {
                        let delay = self.retry.delay_for(attempt);
                        warn!(
                            name = %name,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "reconcile failed, requeueing"
                        );
                        let scheduler = self.scheduler.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            scheduler.schedule(obj);
                        });
                    } else {
                        failures.remove(&name);
                        error!(
                            name = %name,
                            attempts = attempt,
                            error = %err,
                            "retry budget exhausted, waiting for the next watch event"
                        );
                    }
                }
            }
        }
    }
}
