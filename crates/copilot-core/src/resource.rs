//! Typed representation of the watched `Completion` custom resource.
//!
//! The object is decoded fresh from every watch event and discarded after the
//! reconcile pass that consumed it; nothing here caches state between events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const COMPLETION_GROUP: &str = "copilot.poc.com";
pub const COMPLETION_VERSION: &str = "v1";
pub const COMPLETION_PLURAL: &str = "completions";
pub const COMPLETION_KIND: &str = "Completion";

/// Generation assumed for a resource the API server has not stamped yet.
pub const DEFAULT_GENERATION: i64 = 1;

/// Object metadata as delivered by the API server.
///
/// Unknown fields (uid, creationTimestamp, labels, ...) are kept in `extra`
/// so a whole-object replace round-trips them unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ObjectMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<i64>,
    #[serde(rename = "resourceVersion", skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl ObjectMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_generation(mut self, generation: i64) -> Self {
        self.generation = Some(generation);
        self
    }

    pub fn with_resource_version(mut self, version: impl Into<String>) -> Self {
        self.resource_version = Some(version.into());
        self
    }
}

/// Desired input: prompt text and token budget. Immutable for the duration of
/// a reconcile pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CompletionSpec {
    #[serde(rename = "userPrompt", skip_serializing_if = "Option::is_none")]
    pub user_prompt: Option<String>,
    #[serde(rename = "maxTokens", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
}

/// Observed output: last generated completion and the generation it was
/// computed at. Absent until the first successful reconcile pass persists it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionStatus {
    pub completion: String,
    #[serde(rename = "observedGeneration")]
    pub observed_generation: i64,
}

/// The watched custom resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<CompletionSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CompletionStatus>,
}

impl Completion {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            api_version: format!("{COMPLETION_GROUP}/{COMPLETION_VERSION}"),
            kind: COMPLETION_KIND.to_string(),
            metadata: ObjectMeta::named(name),
            spec: None,
            status: None,
        }
    }

    pub fn with_spec(mut self, spec: CompletionSpec) -> Self {
        self.spec = Some(spec);
        self
    }

    pub fn with_status(mut self, status: CompletionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata.name.as_deref()
    }

    /// Generation as stamped by the API server; a resource seen before the
    /// server set one is treated as generation 1.
    pub fn generation_or_default(&self) -> i64 {
        self.metadata.generation.unwrap_or(DEFAULT_GENERATION)
    }

    /// Converged means the observed generation matches the current one.
    /// Absent status is never converged: the resource has not been
    /// reconciled at all yet.
    pub fn is_converged(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.observed_generation == self.generation_or_default())
    }

    /// Synthesize the baseline status for a resource seen without one.
    /// Returns `true` if a status was created. The baseline is a mutation
    /// target for the current pass, not a convergence marker.
    pub fn ensure_status(&mut self) -> bool {
        if self.status.is_some() {
            return false;
        }
        self.status = Some(CompletionStatus {
            completion: String::new(),
            observed_generation: self.generation_or_default(),
        });
        true
    }
}
