//! SalesRabbit lead tracker client
//!
//! Pulls field leads with `If-Modified-Since` as the sync cursor. A 304
//! response is a successful no-op; on a 200 the response `Last-Modified`
//! header (or the current time when absent) becomes the next cursor.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{IF_MODIFIED_SINCE, LAST_MODIFIED};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tempo_core::{RecordConnector, RecordFetch, RemoteRecord};
use tempo_domain::{Result, TempoError};
use tracing::{debug, instrument};

use crate::errors::InfraError;
use crate::http::HttpClient;

/// SalesRabbit API client.
pub struct SalesRabbitClient {
    http: HttpClient,
    base_url: String,
}

impl SalesRabbitClient {
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }
}

#[async_trait]
impl RecordConnector for SalesRabbitClient {
    #[instrument(skip(self, access_token))]
    async fn fetch_records(
        &self,
        access_token: &str,
        since_cursor: Option<&str>,
    ) -> Result<RecordFetch> {
        let url = format!("{}/leads", self.base_url);
        let mut request = self.http.request(Method::GET, &url).bearer_auth(access_token);
        if let Some(cursor) = since_cursor {
            request = request.header(IF_MODIFIED_SINCE, cursor);
        }

        let response = self.http.send(request).await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            debug!("no lead changes since cursor");
            return Ok(RecordFetch::NotModified);
        }

        let next_cursor = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Utc::now().to_rfc2822());

        let response =
            response.error_for_status().map_err(|e| TempoError::from(InfraError::from(e)))?;
        let body: LeadsResponse = response
            .json()
            .await
            .map_err(|e| TempoError::Network(format!("failed to decode SalesRabbit response: {e}")))?;

        let records = body.data.into_iter().map(Lead::into_record).collect::<Vec<_>>();
        debug!(count = records.len(), "pulled SalesRabbit leads");
        Ok(RecordFetch::Changed { records, next_cursor: Some(next_cursor) })
    }
}

#[derive(Debug, Deserialize)]
struct LeadsResponse {
    #[serde(default)]
    data: Vec<Lead>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Lead {
    id: i64,
    first_name: Option<String>,
    last_name: Option<String>,
    status: Option<String>,
    phone_primary: Option<String>,
    address1: Option<String>,
    city: Option<String>,
    state: Option<String>,
    #[serde(default)]
    custom_fields: HashMap<String, String>,
}

impl Lead {
    fn into_record(self) -> RemoteRecord {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        let contact_name = (!name.is_empty()).then(|| name.clone());

        let address = [self.address1.as_deref(), self.city.as_deref(), self.state.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ");

        RemoteRecord {
            id: self.id.to_string(),
            title: if name.is_empty() { format!("Lead {}", self.id) } else { name },
            stage: self.status.unwrap_or_default(),
            contact_name,
            phone: self.phone_primary,
            address: (!address.is_empty()).then_some(address),
            custom_fields: self.custom_fields,
        }
    }
}
