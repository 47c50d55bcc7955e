//! REST Record Store Client
//!
//! Maps [`RecordStore`] onto a plain JSON collection API:
//!
//! | operation      | request                                      |
//! |----------------|----------------------------------------------|
//! | ensure_schema  | `GET    {base}/{scope}/{kind}/schema`         |
//! | query          | `POST   {base}/{scope}/{kind}/query`          |
//! | fetch          | `GET    {base}/{scope}/{kind}/{id}`           |
//! | create         | `POST   {base}/{scope}/{kind}`                |
//! | save           | `PUT    {base}/{scope}/{kind}/{id}`           |
//! | delete         | `DELETE {base}/{scope}/{kind}/{id}`           |
//! | create_batch   | `POST   {base}/{scope}/{kind}/batch`          |
//!
//! `scope` is `public` or `private` depending on the record kind.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Serialize;

use super::records::{Query, RawRecord, RecordKind};
use super::RecordStore;
use crate::constants;
use crate::logic::error::RecordError;

/// Record store server configuration
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    pub server_url: String,
    pub api_token: Option<String>,
    pub timeout_seconds: u64,
}

impl HttpStoreConfig {
    /// Read `TELEMETRY_SERVER_URL` / `TELEMETRY_API_TOKEN`
    pub fn from_env() -> Option<Self> {
        constants::get_server_url().map(|server_url| Self {
            server_url,
            api_token: constants::get_api_token(),
            timeout_seconds: 30,
        })
    }
}

pub struct HttpRecordStore {
    config: HttpStoreConfig,
    http_client: reqwest::Client,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    records: &'a [RawRecord],
}

impl HttpRecordStore {
    pub fn new(config: HttpStoreConfig) -> Result<Self, RecordError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| RecordError::Unavailable(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn collection_url(&self, kind: RecordKind) -> String {
        let scope = if kind.is_private() { "private" } else { "public" };
        format!(
            "{}/{}/{}",
            self.config.server_url.trim_end_matches('/'),
            scope,
            kind.as_str()
        )
    }

    fn record_url(&self, kind: RecordKind, id: &str) -> String {
        format!("{}/{}", self.collection_url(kind), id)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, id: &str) -> Result<Response, RecordError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| RecordError::Network(e.to_string()))?;

        match response.status() {
            s if s.is_success() => Ok(response),
            StatusCode::CONFLICT => Err(RecordError::AlreadyExists(id.to_string())),
            StatusCode::NOT_FOUND => Err(RecordError::NotFound(id.to_string())),
            s => {
                log::debug!("Record store returned {} for {}", s, id);
                Err(RecordError::Server(s.as_u16()))
            }
        }
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, RecordError> {
        response
            .json()
            .await
            .map_err(|e| RecordError::Network(format!("invalid response body: {}", e)))
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn ensure_schema(&self, kind: RecordKind) -> Result<(), RecordError> {
        let url = format!("{}/schema", self.collection_url(kind));
        match self.send(self.http_client.get(&url), kind.as_str()).await {
            Ok(_) => Ok(()),
            Err(RecordError::NotFound(_)) => Err(RecordError::Unavailable(format!(
                "collection {} does not exist",
                kind
            ))),
            Err(e) => Err(e),
        }
    }

    async fn query(&self, kind: RecordKind, query: &Query) -> Result<Vec<RawRecord>, RecordError> {
        let url = format!("{}/query", self.collection_url(kind));
        let response = self
            .send(self.http_client.post(&url).json(query), kind.as_str())
            .await?;
        Self::parse(response).await
    }

    async fn fetch(&self, kind: RecordKind, id: &str) -> Result<Option<RawRecord>, RecordError> {
        let url = self.record_url(kind, id);
        match self.send(self.http_client.get(&url), id).await {
            Ok(response) => Self::parse(response).await.map(Some),
            Err(RecordError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create(&self, record: RawRecord) -> Result<RawRecord, RecordError> {
        let url = self.collection_url(record.kind);
        let response = self
            .send(self.http_client.post(&url).json(&record), &record.id)
            .await?;
        Self::parse(response).await
    }

    async fn save(&self, record: RawRecord) -> Result<RawRecord, RecordError> {
        let url = self.record_url(record.kind, &record.id);
        let response = self
            .send(self.http_client.put(&url).json(&record), &record.id)
            .await?;
        Self::parse(response).await
    }

    async fn delete(&self, kind: RecordKind, id: &str) -> Result<(), RecordError> {
        let url = self.record_url(kind, id);
        self.send(self.http_client.delete(&url), id).await?;
        Ok(())
    }

    async fn create_batch(&self, records: Vec<RawRecord>) -> Result<(), RecordError> {
        let Some(kind) = records.first().map(|r| r.kind) else {
            return Ok(());
        };

        let url = format!("{}/batch", self.collection_url(kind));
        let body = BatchRequest { records: &records };
        self.send(self.http_client.post(&url).json(&body), kind.as_str())
            .await?;
        Ok(())
    }
}
