//! Remote report service.
//!
//! Endpoints:
//! - `POST /cenreport` submits a symptom report
//! - `GET /cenkeys/{timestamp}` lists keys published after `timestamp`
//! - `GET /cenreport/{key}` lists reports attached to one key
//!
//! `/cenkeys` answers with either bare key strings or `{key, publishedAt}`
//! objects. Bare strings are stamped with the time of the request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coepi_core::{Clock, PublishedKey, ServiceConfig, SymptomReport, Timestamp};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::NetworkError;

/// Remote collaborator holding published keys and reports.
#[async_trait]
pub trait ReportService: Send + Sync {
    /// Deliver a report. Success means the service accepted it.
    async fn submit_report(&self, report: &SymptomReport) -> Result<(), NetworkError>;

    /// Keys published after `watermark`.
    async fn published_keys_since(
        &self,
        watermark: Timestamp,
    ) -> Result<Vec<PublishedKey>, NetworkError>;

    /// Reports associated with an encoded key.
    async fn reports_for_key(&self, key: &str) -> Result<Vec<SymptomReport>, NetworkError>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireKey {
    Stamped(PublishedKey),
    Plain(String),
}

/// [`ReportService`] over HTTP/JSON.
pub struct HttpReportService {
    client: Client,
    base_url: Url,
    clock: Arc<dyn Clock>,
}

impl HttpReportService {
    pub fn new(config: &ServiceConfig, clock: Arc<dyn Clock>) -> Result<Self, NetworkError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| NetworkError::Config(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(NetworkError::Config(format!(
                "{} cannot be used as a base URL",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| NetworkError::Config(e.to_string()))?;

        info!(base_url = %base_url, "Report service client ready");

        Ok(Self {
            client,
            base_url,
            clock,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, NetworkError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| NetworkError::Config("base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: Url,
    ) -> Result<T, NetworkError> {
        debug!(%url, operation, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport(operation, e))?;
        let response = check_status(operation, response)?;

        response.json().await.map_err(|e| NetworkError::Decode {
            operation,
            message: e.to_string(),
        })
    }
}

fn transport(operation: &'static str, error: reqwest::Error) -> NetworkError {
    if error.is_timeout() {
        NetworkError::Timeout { operation }
    } else {
        NetworkError::Transport {
            operation,
            message: error.to_string(),
        }
    }
}

fn check_status(operation: &'static str, response: Response) -> Result<Response, NetworkError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(NetworkError::Status {
            operation,
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl ReportService for HttpReportService {
    async fn submit_report(&self, report: &SymptomReport) -> Result<(), NetworkError> {
        const OPERATION: &str = "submit_report";

        let url = self.endpoint(&["cenreport"])?;
        debug!(%url, report_id = %report.id, "POST");
        let response = self
            .client
            .post(url)
            .json(report)
            .send()
            .await
            .map_err(|e| transport(OPERATION, e))?;
        check_status(OPERATION, response)?;

        Ok(())
    }

    async fn published_keys_since(
        &self,
        watermark: Timestamp,
    ) -> Result<Vec<PublishedKey>, NetworkError> {
        let requested_at = self.clock.now_secs();
        let since = watermark.to_string();
        let url = self.endpoint(&["cenkeys", since.as_str()])?;
        let wire: Vec<WireKey> = self.get_json("published_keys_since", url).await?;

        Ok(wire
            .into_iter()
            .map(|key| match key {
                WireKey::Stamped(key) => key,
                WireKey::Plain(value) => PublishedKey::new(value, requested_at),
            })
            .collect())
    }

    async fn reports_for_key(&self, key: &str) -> Result<Vec<SymptomReport>, NetworkError> {
        let url = self.endpoint(&["cenreport", key])?;
        self.get_json("reports_for_key", url).await
    }
}
