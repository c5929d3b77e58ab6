//! HTTP client for the collector endpoint

use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use tracing::debug;

use super::wire::WireRecord;
use crate::config::CollectorConfig;
use crate::error::DeliveryError;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

pub struct CollectorClient {
    http: Client,
    url: String,
}

impl CollectorClient {
    pub fn new(config: &CollectorConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST one record as a form body. Only 2xx counts as delivered.
    pub async fn post(&self, record: &WireRecord) -> Result<(), DeliveryError> {
        let resp = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header(ACCEPT, "text/plain, application/json, */*")
            .body(record.as_str().to_owned())
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if status.is_success() {
            debug!("POST {}: {}", status, body);
            Ok(())
        } else {
            Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}
