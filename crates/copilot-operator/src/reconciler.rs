//! The reconcile state machine.
//!
//! One invocation drives a single resource through
//! NeedsInit -> Check -> Validate -> Reconciling -> Converged, starting fresh
//! every time; nothing is carried over between invocations. A pass either
//! performs zero external calls (already converged, or invalid spec) or
//! exactly one provider call followed by one whole-object replace.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use copilot_core::{Completion, CoreError};
use copilot_kube::{CompletionStore, KubeError};
use copilot_provider::{CompletionBackend, ProviderError, DEFAULT_MAX_TOKENS};

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The resource itself is unusable. Logged and abandoned; the next watch
    /// event re-triggers if anything changes.
    #[error("Invalid resource: {0}")]
    Validation(#[from] CoreError),

    #[error("Provider call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Persist failed: {0}")]
    Persist(#[from] KubeError),
}

impl ReconcileError {
    /// Whether requeueing the same snapshot can help. A stale-write conflict
    /// cannot: the snapshot is outdated and the watch delivers its successor.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Provider(_) => true,
            Self::Persist(KubeError::Conflict { .. }) => false,
            Self::Persist(_) => true,
        }
    }

    /// Validation failures are log-only; external-call failures also get an
    /// error artifact.
    pub fn wants_artifact(&self) -> bool {
        !matches!(self, Self::Validation(_))
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Provider(_) => "provider",
            Self::Persist(_) => "persist",
        }
    }
}

/// Result of one reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Observed state already matched desired state; no external calls made.
    Converged,
    /// A new completion was generated and persisted at this generation.
    Updated { observed_generation: i64 },
}

pub struct ReconcileEngine<S, P>
where
    S: CompletionStore,
    P: CompletionBackend,
{
    store: Arc<S>,
    provider: Arc<P>,
}

impl<S, P> ReconcileEngine<S, P>
where
    S: CompletionStore,
    P: CompletionBackend,
{
    pub fn new(store: Arc<S>, provider: Arc<P>) -> Self {
        Self { store, provider }
    }

    /// Run one reconcile pass over `obj`.
    ///
    /// On success the observed generation advances to exactly
    /// `generation + 1`, where `generation` is the value read here at the
    /// start of the pass. On any failure the mutated copy is dropped and the
    /// external object is left untouched.
    pub async fn reconcile(&self, mut obj: Completion) -> Result<ReconcileOutcome, ReconcileError> {
        let name = obj
            .name()
            .ok_or(CoreError::MissingName)?
            .to_string();
        let generation = obj.generation_or_default();

        // NeedsInit: first sight without status gets a baseline. The baseline
        // is the mutation target for this pass, not a convergence marker, so
        // the staleness check below only applies to pre-existing status.
        let synthesized = obj.ensure_status();
        if synthesized {
            debug!(name = %name, generation, "synthesized baseline status");
        } else if obj.is_converged() {
            debug!(name = %name, generation, "already converged, nothing to do");
            return Ok(ReconcileOutcome::Converged);
        }

        // Validate
        let (prompt, max_tokens) = {
            let spec = obj.spec.as_ref().ok_or(CoreError::MissingSpec)?;
            let prompt = spec
                .user_prompt
                .as_deref()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| CoreError::invalid_spec("userPrompt is missing or empty"))?
                .to_string();
            let max_tokens = match spec.max_tokens {
                None => DEFAULT_MAX_TOKENS,
                Some(n) if n > 0 => n,
                Some(n) => {
                    return Err(
                        CoreError::invalid_spec(format!("maxTokens must be positive, got {n}"))
                            .into(),
                    );
                }
            };
            (prompt, max_tokens)
        };

        // Reconciling
        info!(name = %name, generation, max_tokens, "generating completion");
        let text = self.provider.complete(&prompt, max_tokens).await?;

        if let Some(status) = obj.status.as_mut() {
            status.completion = text;
            status.observed_generation = generation + 1;
        }
        self.store.replace(&obj).await?;

        info!(
            name = %name,
            observed_generation = generation + 1,
            "status persisted"
        );
        Ok(ReconcileOutcome::Updated {
            observed_generation: generation + 1,
        })
    }
}
