//! Watch-event decoding.
//!
//! The API server delivers a watch as newline-delimited JSON, one
//! `{"type": "...", "object": {...}}` envelope per line. Each line is decoded
//! exactly once, here at the stream boundary; everything downstream works
//! with the typed [`WatchEvent`].

use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tracing::trace;

use copilot_core::Completion;

use crate::error::KubeError;

/// A classified watch event carrying the decoded object.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Added(Completion),
    Modified(Completion),
    Deleted(Completion),
    /// A phase this controller does not know (BOOKMARK, ERROR, ...).
    Unknown(String),
}

/// Wire envelope for one watch line.
#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    phase: String,
    #[serde(default)]
    object: serde_json::Value,
}

impl WatchEvent {
    /// Decode a single watch line.
    pub fn from_line(line: &str) -> Result<Self, KubeError> {
        let raw: RawEvent = serde_json::from_str(line)?;
        let event = match raw.phase.as_str() {
            "ADDED" => Self::Added(serde_json::from_value(raw.object)?),
            "MODIFIED" => Self::Modified(serde_json::from_value(raw.object)?),
            "DELETED" => Self::Deleted(serde_json::from_value(raw.object)?),
            other => Self::Unknown(other.to_string()),
        };
        Ok(event)
    }
}

type ChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, KubeError>> + Send>>;

/// A live watch subscription: buffers the byte stream and yields one decoded
/// event per line.
pub struct WatchStream {
    inner: ChunkStream,
    buf: Vec<u8>,
}

impl std::fmt::Debug for WatchStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchStream")
            .field("buf_len", &self.buf.len())
            .finish_non_exhaustive()
    }
}

impl WatchStream {
    pub(crate) fn from_response(resp: reqwest::Response) -> Self {
        let inner = resp
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(KubeError::Stream));
        Self::from_chunks(inner)
    }

    /// Build a stream from raw chunks. Chunk boundaries need not align with
    /// line boundaries.
    pub fn from_chunks<S>(chunks: S) -> Self
    where
        S: Stream<Item = Result<Vec<u8>, KubeError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(chunks),
            buf: Vec::new(),
        }
    }

    /// Next event from the stream.
    ///
    /// `Ok(None)` means the server closed the stream normally; the caller
    /// decides whether to re-subscribe. A `Decode` error consumes only the
    /// offending line, so the caller can keep polling.
    pub async fn next_event(&mut self) -> Result<Option<WatchEvent>, KubeError> {
        loop {
            if let Some(line) = self.take_line() {
                if line.is_empty() {
                    continue;
                }
                trace!(len = line.len(), "watch line received");
                return WatchEvent::from_line(&line).map(Some);
            }
            match self.inner.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(e),
                None => {
                    // Flush a trailing line the server sent without a newline.
                    if self.buf.is_empty() {
                        return Ok(None);
                    }
                    let line = String::from_utf8_lossy(&self.buf).trim().to_string();
                    self.buf.clear();
                    if line.is_empty() {
                        return Ok(None);
                    }
                    return WatchEvent::from_line(&line).map(Some);
                }
            }
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buf.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use serde_json::json;

    fn event_line(phase: &str, name: &str, generation: i64) -> String {
        json!({
            "type": phase,
            "object": {
                "apiVersion": "copilot.poc.com/v1",
                "kind": "Completion",
                "metadata": {"name": name, "generation": generation},
                "spec": {"userPrompt": "create a pod"}
            }
        })
        .to_string()
    }

    fn chunked(parts: Vec<&[u8]>) -> WatchStream {
        let owned: Vec<Result<Vec<u8>, KubeError>> =
            parts.into_iter().map(|p| Ok(p.to_vec())).collect();
        WatchStream::from_chunks(stream::iter(owned))
    }

    #[tokio::test]
    async fn test_classifies_phases() {
        let body = format!(
            "{}\n{}\n{}\n",
            event_line("ADDED", "r1", 1),
            event_line("MODIFIED", "r1", 2),
            event_line("DELETED", "r1", 2),
        );
        let mut stream = chunked(vec![body.as_bytes()]);

        assert!(matches!(
            stream.next_event().await.unwrap(),
            Some(WatchEvent::Added(_))
        ));
        assert!(matches!(
            stream.next_event().await.unwrap(),
            Some(WatchEvent::Modified(_))
        ));
        assert!(matches!(
            stream.next_event().await.unwrap(),
            Some(WatchEvent::Deleted(_))
        ));
        assert!(stream.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_phase_is_tagged_not_an_error() {
        let line = json!({"type": "BOOKMARK", "object": {}}).to_string();
        let mut stream = chunked(vec![format!("{line}\n").as_bytes()]);

        match stream.next_event().await.unwrap() {
            Some(WatchEvent::Unknown(phase)) => assert_eq!(phase, "BOOKMARK"),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reassembles_lines_across_chunk_boundaries() {
        let line = event_line("ADDED", "r1", 1);
        let bytes = format!("{line}\n");
        let (a, b) = bytes.as_bytes().split_at(bytes.len() / 2);
        let mut stream = chunked(vec![a, b]);

        match stream.next_event().await.unwrap() {
            Some(WatchEvent::Added(obj)) => assert_eq!(obj.name(), Some("r1")),
            other => panic!("expected Added, got {other:?}"),
        }
        assert!(stream.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline_is_flushed() {
        let line = event_line("MODIFIED", "r2", 3);
        let mut stream = chunked(vec![line.as_bytes()]);

        match stream.next_event().await.unwrap() {
            Some(WatchEvent::Modified(obj)) => {
                assert_eq!(obj.name(), Some("r2"));
                assert_eq!(obj.metadata.generation, Some(3));
            }
            other => panic!("expected Modified, got {other:?}"),
        }
        assert!(stream.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_garbage_line_is_a_decode_error_stream_continues() {
        let body = format!("not json\n{}\n", event_line("ADDED", "r1", 1));
        let mut stream = chunked(vec![body.as_bytes()]);

        let err = stream.next_event().await.unwrap_err();
        assert!(err.is_event_local());

        // The stream is still usable after the bad line.
        assert!(matches!(
            stream.next_event().await.unwrap(),
            Some(WatchEvent::Added(_))
        ));
    }

    #[tokio::test]
    async fn test_non_string_user_prompt_fails_at_the_boundary() {
        let line = json!({
            "type": "ADDED",
            "object": {
                "apiVersion": "copilot.poc.com/v1",
                "kind": "Completion",
                "metadata": {"name": "r1", "generation": 1},
                "spec": {"userPrompt": 42}
            }
        })
        .to_string();
        let mut stream = chunked(vec![format!("{line}\n").as_bytes()]);

        let err = stream.next_event().await.unwrap_err();
        assert!(err.is_event_local());
    }

    #[tokio::test]
    async fn test_blank_lines_are_skipped() {
        let body = format!("\n\n{}\n\n", event_line("ADDED", "r1", 1));
        let mut stream = chunked(vec![body.as_bytes()]);

        assert!(matches!(
            stream.next_event().await.unwrap(),
            Some(WatchEvent::Added(_))
        ));
        assert!(stream.next_event().await.unwrap().is_none());
    }
}
