use async_trait::async_trait;
use serde::Deserialize;

use crate::config::FetcherConfig;
use crate::db::models::opportunity::{OrderStatus, RawOpportunity};
use crate::error::AppError;

/// External collaborator boundary (§6.1): the analytics data source this
/// agent polls every tick. Swappable for tests / alternate transports.
#[async_trait]
pub trait OpportunityFetcher: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawOpportunity>, AppError>;
}

#[derive(Debug, Deserialize)]
struct RawOpportunityWire {
    order_num: String,
    customer_name: String,
    address: String,
    supervisor_name: String,
    org_name: String,
    create_time: Option<chrono::NaiveDateTime>,
    order_status: String,
}

impl RawOpportunityWire {
    /// §6.1 mapping rule: "missing `createTime` → skip (log a warning)" — a
    /// null `createTime` drops this one row rather than failing the whole
    /// fetch batch.
    fn into_raw_opportunity(self) -> Option<RawOpportunity> {
        let Some(create_time) = self.create_time else {
            tracing::warn!(order_num = %self.order_num, "opportunity missing createTime, skipping");
            return None;
        };

        Some(RawOpportunity {
            order_num: self.order_num,
            customer_name: self.customer_name,
            address: self.address,
            supervisor_name: self.supervisor_name,
            org_name: self.org_name,
            create_time,
            order_status: OrderStatus::parse(&self.order_status),
        })
    }
}

/// Reference `OpportunityFetcher`: polls a single configured endpoint,
/// retrying on 429/5xx with exponential backoff.
pub struct HttpOpportunityFetcher {
    client: reqwest::Client,
    endpoint_url: String,
    max_retries: u32,
    initial_backoff: std::time::Duration,
    max_backoff: std::time::Duration,
}

impl HttpOpportunityFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(AppError::Request)?;

        Ok(Self {
            client,
            endpoint_url: config.endpoint_url.clone(),
            max_retries: config.max_client_retries,
            initial_backoff: std::time::Duration::from_millis(config.initial_backoff_millis),
            max_backoff: std::time::Duration::from_millis(config.max_backoff_millis),
        })
    }

    async fn send_with_backoff(&self) -> Result<reqwest::Response, AppError> {
        let mut backoff = self.initial_backoff;

        for attempt in 0..self.max_retries {
            match self.client.get(&self.endpoint_url).send().await {
                Ok(resp) => {
                    if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS
                        || resp.status().is_server_error()
                    {
                        if attempt + 1 >= self.max_retries {
                            let status = resp.status();
                            return Err(AppError::FetchError(format!(
                                "opportunity source returned {} after {} attempts",
                                status,
                                attempt + 1
                            )));
                        }
                        tracing::warn!(
                            status = %resp.status(),
                            attempt = attempt + 1,
                            max_retries = self.max_retries,
                            "transient error fetching opportunities, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(self.max_backoff);
                        continue;
                    }
                    return Ok(resp);
                }
                Err(e) => {
                    if attempt + 1 >= self.max_retries {
                        return Err(AppError::FetchError(e.to_string()));
                    }
                    tracing::warn!(
                        error = %e,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        "network error fetching opportunities, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.max_backoff);
                    continue;
                }
            }
        }

        Err(AppError::FetchError(
            "exceeded opportunity-fetch retry attempts".to_string(),
        ))
    }
}

#[async_trait]
impl OpportunityFetcher for HttpOpportunityFetcher {
    async fn fetch(&self) -> Result<Vec<RawOpportunity>, AppError> {
        let resp = self.send_with_backoff().await?;

        if !resp.status().is_success() {
            return Err(AppError::FetchError(format!(
                "opportunity source returned {}",
                resp.status()
            )));
        }

        let wire: Vec<RawOpportunityWire> = resp
            .json()
            .await
            .map_err(|e| AppError::FetchError(format!("invalid response body: {e}")))?;

        Ok(wire
            .into_iter()
            .filter_map(RawOpportunityWire::into_raw_opportunity)
            .collect())
    }
}
