//! HTTP client for the completions custom-resource collection.

use async_trait::async_trait;
use tracing::debug;

use copilot_core::{Completion, COMPLETION_GROUP, COMPLETION_PLURAL, COMPLETION_VERSION};

use crate::error::KubeError;
use crate::watch::WatchStream;

/// Persistence seam used by the reconcile engine. The engine always hands
/// over the entire object, never a patch.
#[async_trait]
pub trait CompletionStore: Send + Sync {
    /// Replace the stored object with `obj`, atomically.
    async fn replace(&self, obj: &Completion) -> Result<(), KubeError>;
}

/// Client for the `copilot.poc.com/v1` completions collection.
pub struct CustomObjectsClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl CustomObjectsClient {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Use a pre-built `reqwest::Client`, e.g. one with custom timeouts.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    fn collection_url(&self) -> String {
        format!(
            "{}/apis/{}/{}/{}",
            self.base_url, COMPLETION_GROUP, COMPLETION_VERSION, COMPLETION_PLURAL
        )
    }

    fn object_url(&self, name: &str) -> String {
        format!("{}/{}", self.collection_url(), name)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.request(method, url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req.header("Accept", "application/json")
    }

    /// Open a watch subscription on the collection.
    ///
    /// An error here means the connection could not be established at all;
    /// errors after this returns surface through the stream itself.
    pub async fn watch(&self) -> Result<WatchStream, KubeError> {
        let url = self.collection_url();
        debug!(url = %url, "opening watch subscription");
        let resp = self
            .request(reqwest::Method::GET, &url)
            .query(&[("watch", "true")])
            .send()
            .await
            .map_err(KubeError::Connect)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(KubeError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(WatchStream::from_response(resp))
    }
}

#[async_trait]
impl CompletionStore for CustomObjectsClient {
    async fn replace(&self, obj: &Completion) -> Result<(), KubeError> {
        let name = obj.name().ok_or(KubeError::UnnamedObject)?;
        let url = self.object_url(name);
        debug!(name = %name, url = %url, "replacing object");

        let resp = self
            .request(reqwest::Method::PUT, &url)
            .header("Content-Type", "application/json")
            .json(obj)
            .send()
            .await
            .map_err(KubeError::Request)?;

        let status = resp.status();
        if status == reqwest::StatusCode::CONFLICT {
            return Err(KubeError::Conflict {
                name: name.to_string(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(KubeError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
