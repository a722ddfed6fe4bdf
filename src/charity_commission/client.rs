//! Charity Commission register API client
//!
//! Rate-limited HTTP client for the Register of Charities API with retry and
//! an offline fallback for demos.

use super::types::{parse_charity_data, search_hits, CharityDetails, CharitySummary, Subsidiary};
use super::{mock, normalize_charity_number, RegistrySource};
use crate::config::Settings;
use crate::error::RegistryError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, warn};

const RATE_LIMIT_DELAY_MS: u64 = 200;
const MAX_ATTEMPTS: u32 = 3;
const RETRY_MIN_WAIT: Duration = Duration::from_secs(2);
const RETRY_MAX_WAIT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "CharityDataEnrichmentPlatform/1.0";

/// Register API client
pub struct CharityCommissionClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    last_request: Mutex<Instant>,
}

impl CharityCommissionClient {
    /// Create a client from application settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            settings.charity_commission_api_base_url.clone(),
            settings.charity_commission_api_key.clone(),
        )
    }

    /// Create a client for `base_url`; without an API key every call is served offline
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            last_request: Mutex::new(
                Instant::now()
                    .checked_sub(Duration::from_millis(RATE_LIMIT_DELAY_MS))
                    .unwrap_or_else(Instant::now),
            ),
        })
    }

    /// True when requests go to the live register
    pub fn is_live(&self) -> bool {
        self.api_key.is_some()
    }

    /// Enforce rate limiting between requests
    async fn rate_limit(&self) {
        let elapsed = {
            let last = self.last_request.lock().unwrap_or_else(|p| p.into_inner());
            last.elapsed()
        };

        if elapsed < Duration::from_millis(RATE_LIMIT_DELAY_MS) {
            sleep(Duration::from_millis(RATE_LIMIT_DELAY_MS) - elapsed).await;
        }

        let mut last = self.last_request.lock().unwrap_or_else(|p| p.into_inner());
        *last = Instant::now();
    }

    /// Single GET. `Ok(None)` on 404.
    async fn get_once(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Value>, RegistryError> {
        self.rate_limit().await;

        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .query(query);
        if let Some(key) = &self.api_key {
            request = request.header("Ocp-Apim-Subscription-Key", key);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RegistryError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| RegistryError::Decode(format!("{}: {}", path, e)))
    }

    /// GET with exponential backoff on transport errors and 5xx
    async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Value>, RegistryError> {
        let mut attempt = 1;
        loop {
            match self.get_once(path, query).await {
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let wait = backoff(attempt);
                    warn!(
                        path = path,
                        attempt = attempt,
                        wait_secs = wait.as_secs(),
                        error = %e,
                        "Register request failed, retrying"
                    );
                    sleep(wait).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Search by name. Falls back to offline data without credentials.
    pub async fn search_charities(
        &self,
        search_term: &str,
        status: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<CharitySummary>> {
        if !self.is_live() {
            debug!("Charity Commission API key not configured - using mock data");
            return Ok(to_summaries(mock::search(search_term)));
        }

        let mut query = vec![
            ("searchText", search_term.to_string()),
            ("page", page.to_string()),
            ("pageSize", page_size.to_string()),
        ];
        if let Some(status) = status {
            query.push(("status", status.to_string()));
        }

        match self.get("/allcharities", &query).await {
            Ok(Some(body)) => Ok(to_summaries(search_hits(body))),
            Ok(None) => {
                warn!(search_term = search_term, "Register search returned 404 - using mock data");
                Ok(to_summaries(mock::search(search_term)))
            }
            Err(RegistryError::Unauthorized(code)) => {
                warn!(status = code, "API authentication failed - using mock data for demo");
                Ok(to_summaries(mock::search(search_term)))
            }
            Err(e) => {
                error!(search_term = search_term, error = %e, "Charity Commission API error");
                Err(e).context("Charity search failed")
            }
        }
    }

    /// Raw `/charities/{n}` record
    pub async fn get_charity(&self, charity_number: &str) -> Result<Option<Value>> {
        let number = normalize_charity_number(charity_number);
        if number.is_empty() {
            return Ok(None);
        }
        if !self.is_live() {
            return Ok(mock::details(&number));
        }

        match self.get(&format!("/charities/{}", number), &[]).await {
            Ok(found) => Ok(found),
            Err(RegistryError::Unauthorized(code)) => {
                warn!(status = code, "API authentication failed - using mock data");
                Ok(mock::details(&number))
            }
            Err(e) => {
                error!(charity_number = %number, error = %e, "Charity Commission API error");
                Err(e).with_context(|| format!("Failed to fetch charity {}", number))
            }
        }
    }

    /// Raw list from `/charities/{n}/{resource}`; empty on 404 or offline
    async fn get_related(&self, charity_number: &str, resource: &str) -> Result<Vec<Value>> {
        let number = normalize_charity_number(charity_number);
        if !self.is_live() || number.is_empty() {
            return Ok(Vec::new());
        }

        match self
            .get(&format!("/charities/{}/{}", number, resource), &[])
            .await
        {
            Ok(Some(Value::Array(items))) => Ok(items),
            Ok(Some(_)) | Ok(None) | Err(RegistryError::Unauthorized(_)) => Ok(Vec::new()),
            Err(e) => {
                error!(charity_number = %number, resource = resource, error = %e, "Charity Commission API error");
                Err(e).with_context(|| format!("Failed to fetch {} for {}", resource, number))
            }
        }
    }

    pub async fn get_charity_trustees(&self, charity_number: &str) -> Result<Vec<Value>> {
        self.get_related(charity_number, "trustees").await
    }

    /// Annual return history from `/accounts`
    pub async fn get_charity_financial_history(&self, charity_number: &str) -> Result<Vec<Value>> {
        self.get_related(charity_number, "accounts").await
    }

    pub async fn get_charity_subsidiaries(&self, charity_number: &str) -> Result<Vec<Subsidiary>> {
        let raw = self.get_related(charity_number, "subsidiaries").await?;
        Ok(raw.iter().map(Subsidiary::from_raw).collect())
    }

    /// Details, trustees, accounts and subsidiaries fetched concurrently.
    ///
    /// Only the details request is mandatory; failures of the related lists
    /// degrade to empty lists.
    pub async fn get_full_charity_details(
        &self,
        charity_number: &str,
    ) -> Result<Option<CharityDetails>> {
        let (details, trustees, accounts, subsidiaries) = futures::join!(
            self.get_charity(charity_number),
            self.get_related(charity_number, "trustees"),
            self.get_related(charity_number, "accounts"),
            self.get_related(charity_number, "subsidiaries"),
        );

        let mut record = match details? {
            Some(Value::Object(map)) => map,
            Some(_) | None => return Ok(None),
        };

        for (key, related) in [
            ("trustees", trustees),
            ("accounts", accounts),
            ("subsidiaries", subsidiaries),
        ] {
            match related {
                Ok(items) if !items.is_empty() => {
                    record.insert(key.to_string(), Value::Array(items));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(charity_number = charity_number, related = key, error = %e, "Related register data unavailable");
                }
            }
        }

        let mut parsed = parse_charity_data(&Value::Object(record));
        if parsed.charity_number.is_empty() {
            parsed.charity_number = normalize_charity_number(charity_number);
        }
        Ok(Some(parsed))
    }
}

#[async_trait]
impl RegistrySource for CharityCommissionClient {
    async fn search_charities(&self, query: &str, page_size: u32) -> Result<Vec<CharitySummary>> {
        CharityCommissionClient::search_charities(self, query, None, 0, page_size).await
    }

    async fn get_full_charity_details(&self, charity_number: &str) -> Result<Option<CharityDetails>> {
        CharityCommissionClient::get_full_charity_details(self, charity_number).await
    }

    async fn get_charity_subsidiaries(&self, charity_number: &str) -> Result<Vec<Subsidiary>> {
        CharityCommissionClient::get_charity_subsidiaries(self, charity_number).await
    }
}

fn to_summaries(hits: Vec<Value>) -> Vec<CharitySummary> {
    hits.into_iter().filter_map(CharitySummary::from_raw).collect()
}

/// 2s, 4s, 8s ... capped at 10s
fn backoff(attempt: u32) -> Duration {
    let wait = RETRY_MIN_WAIT * 2u32.saturating_pow(attempt.saturating_sub(1));
    wait.min(RETRY_MAX_WAIT)
}
