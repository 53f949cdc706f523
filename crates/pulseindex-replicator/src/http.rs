//! JSON export-service client backed by `reqwest`.
//!
//! - `POST {url}/records` `{pulse, record_number, count}` →
//!   `{records: [...], relocate: pulse?}`
//! - `POST {url}/pulses` `{after, count}` → `{pulses: [...]}`

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use pulseindex_core::{ExportedRecord, IndexerError, Position, PulseInfo, PulseNumber};

use crate::source::{PulseSource, RecordSource, RecordStream, SourceItem};

/// Export service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub url: String,
    pub timeout_secs: u64,
    /// Largest accepted response body, in bytes.
    pub max_message_size: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080".into(),
            timeout_secs: 30,
            max_message_size: 64 * 1024 * 1024,
        }
    }
}

#[derive(Serialize)]
struct RecordsRequest {
    pulse: PulseNumber,
    record_number: u32,
    count: u32,
}

#[derive(Deserialize)]
struct RecordsResponse {
    #[serde(default)]
    records: Vec<ExportedRecord>,
    #[serde(default)]
    relocate: Option<PulseNumber>,
}

#[derive(Serialize)]
struct PulsesRequest {
    after: Option<PulseNumber>,
    count: u32,
}

#[derive(Deserialize)]
struct PulsesResponse {
    #[serde(default)]
    pulses: Vec<PulseInfo>,
}

/// Record and pulse source over the export service's JSON API.
pub struct HttpExportClient {
    base: String,
    http: reqwest::Client,
    max_message_size: usize,
}

impl HttpExportClient {
    pub fn new(config: &SourceConfig) -> Result<Self, IndexerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IndexerError::Config(format!("http client: {e}")))?;
        Ok(Self {
            base: config.url.trim_end_matches('/').to_string(),
            http,
            max_message_size: config.max_message_size,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    async fn post<Req: Serialize + Sync, Resp: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, IndexerError> {
        let url = self.endpoint(path);
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| IndexerError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(IndexerError::Transport(format!("HTTP {status} from {url}: {body}")));
        }
        if let Some(len) = resp.content_length() {
            if len as usize > self.max_message_size {
                return Err(self.too_large(len as usize));
            }
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| IndexerError::Transport(e.to_string()))?;
        if bytes.len() > self.max_message_size {
            return Err(self.too_large(bytes.len()));
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| IndexerError::Transport(format!("malformed response from {url}: {e}")))
    }

    fn too_large(&self, len: usize) -> IndexerError {
        IndexerError::Transport(format!(
            "response of {len} bytes exceeds max_message_size {}",
            self.max_message_size
        ))
    }
}

#[async_trait]
impl RecordSource for HttpExportClient {
    async fn stream(&self, from: Position, count: u32) -> Result<RecordStream, IndexerError> {
        let resp: RecordsResponse = self
            .post(
                "records",
                &RecordsRequest {
                    pulse: from.pulse,
                    record_number: from.record_number,
                    count,
                },
            )
            .await?;
        tracing::debug!(%from, received = resp.records.len(), "Records fetched");

        let mut items: Vec<Result<SourceItem, IndexerError>> =
            resp.records.into_iter().map(|r| Ok(SourceItem::Record(r))).collect();
        if let Some(pulse) = resp.relocate {
            items.push(Ok(SourceItem::Relocate(pulse)));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

#[async_trait]
impl PulseSource for HttpExportClient {
    async fn pulses(
        &self,
        after: Option<PulseNumber>,
        count: u32,
    ) -> Result<Vec<PulseInfo>, IndexerError> {
        let resp: PulsesResponse = self.post("pulses", &PulsesRequest { after, count }).await?;
        Ok(resp.pulses)
    }
}
