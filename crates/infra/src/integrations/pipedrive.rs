//! Pipedrive CRM client
//!
//! Pulls open deals and creates callback deals. Pipedrive reports stages by
//! numeric id, so each pull fetches the stage catalogue first and resolves
//! names through it. The sync cursor is the highest `update_time` seen;
//! deals at or before the cursor are filtered out client-side.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tempo_core::{CrmConnector, DealWrite, RecordConnector, RecordFetch, RemoteRecord};
use tempo_domain::{Result, TempoError};
use tracing::{debug, instrument, warn};

use crate::errors::InfraError;
use crate::http::HttpClient;

/// Pipedrive API client.
pub struct PipedriveClient {
    http: HttpClient,
    base_url: String,
    /// Restrict pulls to deals owned by this user when set.
    owner_id: Option<String>,
}

impl PipedriveClient {
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into(), owner_id: None }
    }

    pub fn with_owner_filter(mut self, owner_id: Option<String>) -> Self {
        self.owner_id = owner_id;
        self
    }

    /// Create the contact person a callback deal is linked to. A failure
    /// here downgrades to an unlinked deal rather than failing the create.
    async fn create_person(&self, api_token: &str, deal: &DealWrite) -> Option<i64> {
        let name = deal.contact_name.clone()?;
        let url = format!("{}/persons", self.base_url);
        let body = PersonCreateBody { name, phone: deal.phone.clone() };

        let response = self
            .http
            .send(
                self.http
                    .request(Method::POST, &url)
                    .query(&[("api_token", api_token)])
                    .json(&body),
            )
            .await;

        match response {
            Ok(response) => match decode::<ApiResponse<CreatedPerson>>(response).await {
                Ok(created) => created.data.map(|p| p.id),
                Err(err) => {
                    warn!(error = %err, "person create response undecodable, deal stays unlinked");
                    None
                }
            },
            Err(err) => {
                warn!(error = %err, "person create failed, deal stays unlinked");
                None
            }
        }
    }

    /// Attach the lead's street address to the deal as a note.
    async fn attach_address_note(&self, api_token: &str, deal_id: i64, address: &str) {
        let url = format!("{}/notes", self.base_url);
        let body = NoteCreateBody { content: format!("Address: {address}"), deal_id };

        let result = self
            .http
            .send(
                self.http
                    .request(Method::POST, &url)
                    .query(&[("api_token", api_token)])
                    .json(&body),
            )
            .await;
        if let Err(err) = result {
            warn!(deal_id, error = %err, "address note failed, deal created without it");
        }
    }

    async fn fetch_stage_names(&self, api_token: &str) -> Result<HashMap<i64, String>> {
        let url = format!("{}/stages", self.base_url);
        let response = self
            .http
            .send(self.http.request(Method::GET, &url).query(&[("api_token", api_token)]))
            .await?;
        let body: ApiResponse<Vec<Stage>> = decode(response).await?;

        Ok(body
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|stage| (stage.id, stage.name))
            .collect())
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let response = response.error_for_status().map_err(|e| TempoError::from(InfraError::from(e)))?;
    response
        .json::<T>()
        .await
        .map_err(|e| TempoError::Network(format!("failed to decode Pipedrive response: {e}")))
}

#[async_trait]
impl RecordConnector for PipedriveClient {
    #[instrument(skip(self, access_token))]
    async fn fetch_records(
        &self,
        access_token: &str,
        since_cursor: Option<&str>,
    ) -> Result<RecordFetch> {
        let stages = self.fetch_stage_names(access_token).await?;

        let url = format!("{}/deals", self.base_url);
        let mut query = vec![
            ("api_token", access_token.to_string()),
            ("status", "open".to_string()),
            ("limit", "500".to_string()),
            ("sort", "update_time DESC".to_string()),
        ];
        if let Some(owner) = &self.owner_id {
            query.push(("user_id", owner.clone()));
        }

        let response =
            self.http.send(self.http.request(Method::GET, &url).query(&query)).await?;
        let body: ApiResponse<Vec<Deal>> = decode(response).await?;
        let deals = body.data.unwrap_or_default();

        let mut next_cursor = since_cursor.map(str::to_string);
        let mut records = Vec::new();
        for deal in deals {
            // Already-seen deals fall at or before the cursor watermark.
            if let Some(cursor) = since_cursor {
                if deal.update_time.as_deref().map_or(false, |t| t <= cursor) {
                    continue;
                }
            }
            if let Some(update_time) = &deal.update_time {
                if next_cursor.as_deref().map_or(true, |c| update_time.as_str() > c) {
                    next_cursor = Some(update_time.clone());
                }
            }

            let stage = match stages.get(&deal.stage_id) {
                Some(name) => name.clone(),
                None => {
                    warn!(deal_id = deal.id, stage_id = deal.stage_id, "deal in unknown stage");
                    continue;
                }
            };

            records.push(RemoteRecord {
                id: deal.id.to_string(),
                title: deal.title,
                stage,
                contact_name: deal.person_name,
                phone: None,
                address: None,
                custom_fields: HashMap::new(),
            });
        }

        debug!(count = records.len(), "pulled Pipedrive deals");
        Ok(RecordFetch::Changed { records, next_cursor })
    }
}

#[async_trait]
impl CrmConnector for PipedriveClient {
    #[instrument(skip(self, access_token, deal), fields(title = %deal.title))]
    async fn create_deal(&self, access_token: &str, deal: &DealWrite) -> Result<String> {
        let person_id = self.create_person(access_token, deal).await;

        let url = format!("{}/deals", self.base_url);
        let body = DealCreateBody { title: deal.title.clone(), person_id };

        let response = self
            .http
            .send(
                self.http
                    .request(Method::POST, &url)
                    .query(&[("api_token", access_token)])
                    .json(&body),
            )
            .await?;
        let created: ApiResponse<CreatedDeal> = decode(response).await?;

        let deal_id = created
            .data
            .map(|d| d.id)
            .ok_or_else(|| TempoError::Network("deal create returned no data".into()))?;

        if let Some(address) = &deal.address {
            self.attach_address_note(access_token, deal_id, address).await;
        }

        Ok(deal_id.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Stage {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Deal {
    id: i64,
    title: String,
    stage_id: i64,
    person_name: Option<String>,
    update_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedDeal {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct CreatedPerson {
    id: i64,
}

#[derive(Debug, Serialize)]
struct DealCreateBody {
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    person_id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct PersonCreateBody {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<String>,
}

#[derive(Debug, Serialize)]
struct NoteCreateBody {
    content: String,
    deal_id: i64,
}
