//! Redmine-style JSON REST client for the ticket store.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{TicketFilter, TicketStore, TicketUpdate};
use crate::models::{CustomFieldDef, NamedRef, Team, Ticket, TicketId, TicketingIdentity};
use crate::util::{compact_text, is_http_url, normalize_text_option};
use crate::{Error, Result};

const API_KEY_HEADER: &str = "X-Redmine-API-Key";
const SWITCH_USER_HEADER: &str = "X-Redmine-Switch-User";
const PAGE_SIZE: usize = 100;

#[derive(Clone)]
pub struct RestTicketStore {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for RestTicketStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RestTicketStore")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl RestTicketStore {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = normalize_text_option(Some(base_url.into()))
            .filter(|url| is_http_url(url))
            .ok_or_else(|| {
                Error::Config("ticket store URL must include http:// or https://".to_string())
            })?;
        let api_key = normalize_text_option(Some(api_key.into()))
            .ok_or_else(|| Error::Config("ticket store API key must not be empty".to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    fn request(&self, method: Method, path: &str, acting_login: Option<&str>) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(login) = acting_login {
            builder = builder.header(SWITCH_USER_HEADER, login);
        }
        builder
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<Option<T>> {
        let response = builder.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response).await?;
        Ok(Some(response.json::<T>().await?))
    }

    async fn put_issue(
        &self,
        id: TicketId,
        issue: serde_json::Value,
        acting_login: Option<&str>,
    ) -> Result<()> {
        let response = self
            .request(Method::PUT, &format!("/issues/{id}.json"), acting_login)
            .json(&serde_json::json!({ "issue": issue }))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn fetch_pages<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        list_key: &'static str,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut offset = 0usize;
        loop {
            let page = self
                .fetch::<serde_json::Value>(
                    self.request(Method::GET, path, None)
                        .query(query)
                        .query(&[("offset", offset), ("limit", PAGE_SIZE)]),
                )
                .await?
                .ok_or_else(|| Error::remote(404, format!("{path} not found")))?;

            let total = page
                .get("total_count")
                .and_then(serde_json::Value::as_u64)
                .and_then(|total| usize::try_from(total).ok());
            let batch: Vec<T> = serde_json::from_value(
                page.get(list_key)
                    .cloned()
                    .unwrap_or(serde_json::Value::Array(Vec::new())),
            )?;

            let fetched = batch.len();
            items.extend(batch);
            offset += fetched;
            if fetched < PAGE_SIZE || total.is_some_and(|total| offset >= total) {
                return Ok(items);
            }
        }
    }
}

#[async_trait]
impl TicketStore for RestTicketStore {
    async fn get_ticket(&self, id: TicketId, include_notes: bool) -> Result<Option<Ticket>> {
        let include = if include_notes {
            "journals,watchers"
        } else {
            "watchers"
        };
        let envelope = self
            .fetch::<IssueEnvelope>(
                self.request(Method::GET, &format!("/issues/{id}.json"), None)
                    .query(&[("include", include)]),
            )
            .await?;
        Ok(envelope.map(|envelope| envelope.issue))
    }

    async fn append_note(
        &self,
        id: TicketId,
        acting_login: Option<&str>,
        body: &str,
    ) -> Result<()> {
        self.put_issue(id, serde_json::json!({ "notes": body }), acting_login)
            .await
    }

    async fn update_custom_field(&self, id: TicketId, field_id: u64, value: &str) -> Result<Ticket> {
        self.put_issue(
            id,
            serde_json::json!({ "custom_fields": [{ "id": field_id, "value": value }] }),
            None,
        )
        .await?;
        self.get_ticket(id, false)
            .await?
            .ok_or(Error::TicketNotFound(id))
    }

    async fn update_ticket(
        &self,
        id: TicketId,
        update: &TicketUpdate,
        acting_login: Option<&str>,
    ) -> Result<()> {
        self.put_issue(id, serde_json::to_value(update)?, acting_login)
            .await
    }

    async fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>> {
        let tickets: Vec<Ticket> = self
            .fetch_pages("/issues.json", &issue_query(filter), "issues")
            .await?;
        // The query narrows server-side; priority names are matched here.
        Ok(tickets
            .into_iter()
            .filter(|ticket| filter.matches(ticket))
            .collect())
    }

    async fn custom_field_definitions(&self) -> Result<Vec<CustomFieldDef>> {
        let envelope = self
            .fetch::<CustomFieldsEnvelope>(self.request(Method::GET, "/custom_fields.json", None))
            .await?
            .ok_or_else(|| Error::remote(404, "custom field listing unavailable"))?;
        Ok(envelope.custom_fields)
    }

    async fn list_users(&self) -> Result<Vec<TicketingIdentity>> {
        self.fetch_pages("/users.json", &[("status", "1".to_string())], "users")
            .await
    }

    async fn list_groups(&self) -> Result<Vec<Team>> {
        let summaries: Vec<NamedRef> = self.fetch_pages("/groups.json", &[], "groups").await?;
        let mut teams = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let Some(envelope) = self
                .fetch::<GroupEnvelope>(
                    self.request(Method::GET, &format!("/groups/{}.json", summary.id), None)
                        .query(&[("include", "users")]),
                )
                .await?
            else {
                tracing::warn!(group = %summary.name, "Group disappeared while listing");
                continue;
            };
            teams.push(Team {
                id: envelope.group.id,
                name: envelope.group.name,
                members: envelope.group.users.iter().map(|user| user.id).collect(),
            });
        }
        Ok(teams)
    }
}

#[derive(Debug, Deserialize)]
struct IssueEnvelope {
    issue: Ticket,
}

#[derive(Debug, Deserialize)]
struct CustomFieldsEnvelope {
    custom_fields: Vec<CustomFieldDef>,
}

#[derive(Debug, Deserialize)]
struct GroupEnvelope {
    group: GroupDetail,
}

#[derive(Debug, Deserialize)]
struct GroupDetail {
    id: u64,
    name: String,
    #[serde(default)]
    users: Vec<NamedRef>,
}

#[derive(Debug, Deserialize)]
struct StoreErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

fn issue_query(filter: &TicketFilter) -> Vec<(&'static str, String)> {
    let mut query = vec![
        (
            "status_id",
            if filter.open_only { "open" } else { "*" }.to_string(),
        ),
        ("sort", "updated_on".to_string()),
    ];
    if let Some(cutoff) = filter.updated_before {
        query.push((
            "updated_on",
            format!("<={}", cutoff.format("%Y-%m-%dT%H:%M:%SZ")),
        ));
    }
    query
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(Error::remote(status.as_u16(), parse_api_error(status, &body)))
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<StoreErrorBody>(body) {
        if !payload.errors.is_empty() {
            return payload.errors.join(", ");
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed
    }
}
