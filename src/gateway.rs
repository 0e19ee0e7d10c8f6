//! Remote statistics and trip resources.
//!
//! [`DataSource`] is the seam the controller fetches through; [`HttpGateway`]
//! is the production implementation on top of `reqwest`. Every failure comes
//! back as a [`FetchError`] value, the gateway never panics.
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use crate::error::FetchError;
use crate::types::StatDataset;

/// Optional constraints on the trips resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripFilter {
    /// Only used when both ends are set.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub pickup_zone: Option<String>,
    pub dropoff_zone: Option<String>,
    pub min_fare: Option<f64>,
    pub max_fare: Option<f64>,
}

impl TripFilter {
    pub fn is_empty(&self) -> bool {
        self.query_pairs().is_empty()
    }

    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            pairs.push(("start_date", start.format("%Y-%m-%d").to_string()));
            pairs.push(("end_date", end.format("%Y-%m-%d").to_string()));
        }
        if let Some(zone) = self.pickup_zone.as_deref().filter(|z| !z.is_empty()) {
            pairs.push(("pickup_zone", zone.to_string()));
        }
        if let Some(zone) = self.dropoff_zone.as_deref().filter(|z| !z.is_empty()) {
            pairs.push(("dropoff_zone", zone.to_string()));
        }
        if let Some(min) = self.min_fare {
            pairs.push(("min_fare", min.to_string()));
        }
        if let Some(max) = self.max_fare {
            pairs.push(("max_fare", max.to_string()));
        }
        pairs
    }
}

/// One page of trip records.
#[derive(Debug, Clone, PartialEq)]
pub struct TripQuery {
    pub limit: u32,
    pub offset: u64,
    pub filter: TripFilter,
}

/// The named resources the dashboard reads.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Summary,
    HourlyPatterns,
    BoroughRevenue,
    DailyRevenue,
    TimeCategories,
    TopRoutes,
    Trips(TripQuery),
}

impl Resource {
    /// Path relative to the API base.
    pub fn path(&self) -> &'static str {
        match self {
            Resource::Summary => "/stats/summary",
            Resource::HourlyPatterns => "/stats/hourly-patterns",
            Resource::BoroughRevenue => "/stats/borough-revenue",
            Resource::DailyRevenue => "/stats/daily-revenue",
            Resource::TimeCategories => "/stats/time-categories",
            Resource::TopRoutes => "/stats/top-routes",
            Resource::Trips(_) => "/trips",
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            Resource::Trips(query) => {
                let mut pairs = vec![
                    ("limit", query.limit.to_string()),
                    ("offset", query.offset.to_string()),
                ];
                pairs.extend(query.filter.query_pairs());
                pairs
            }
            _ => Vec::new(),
        }
    }

    /// Session cache key: the path plus its query string.
    pub fn cache_key(&self) -> String {
        let pairs = self.query_pairs();
        if pairs.is_empty() {
            return self.path().to_string();
        }
        let query: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{}?{}", self.path(), query.join("&"))
    }

    /// Everything but the summary is a list of rows.
    pub fn expects_list(&self) -> bool {
        !matches!(self, Resource::Summary)
    }

    fn validate(&self) -> Result<(), FetchError> {
        match self {
            Resource::Trips(query) if query.limit == 0 => Err(FetchError::InvalidQuery {
                resource: self.to_string(),
                message: "limit must be greater than zero".to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Check the top-level JSON shape of a response body.
    pub fn check_payload(&self, payload: &Value) -> Result<(), FetchError> {
        let ok = if self.expects_list() {
            payload.is_array()
        } else {
            payload.is_object()
        };
        if ok {
            return Ok(());
        }
        Err(FetchError::Malformed {
            resource: self.to_string(),
            message: if self.expects_list() {
                "expected a JSON array".to_string()
            } else {
                "expected a JSON object".to_string()
            },
        })
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Anything that can produce datasets for the controller.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch one resource. Single attempt, no retries.
    async fn fetch(&self, resource: &Resource) -> Result<StatDataset, FetchError>;
}

/// [`DataSource`] backed by the dashboard's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    /// `timeout` of `None` leaves requests unbounded.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, resource: &Resource) -> String {
        format!("{}{}", self.base_url, resource.path())
    }

    async fn request(&self, resource: &Resource) -> Result<StatDataset, FetchError> {
        resource.validate()?;

        let response = self
            .client
            .get(self.url(resource))
            .query(&resource.query_pairs())
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                resource: resource.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                resource: resource.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| FetchError::Transport {
            resource: resource.to_string(),
            message: e.to_string(),
        })?;
        let payload: Value =
            serde_json::from_slice(&body).map_err(|e| FetchError::Malformed {
                resource: resource.to_string(),
                message: e.to_string(),
            })?;
        resource.check_payload(&payload)?;

        Ok(StatDataset::new(resource.cache_key(), payload))
    }
}

#[async_trait]
impl DataSource for HttpGateway {
    async fn fetch(&self, resource: &Resource) -> Result<StatDataset, FetchError> {
        tracing::debug!("GET {}", resource.cache_key());
        let result = self.request(resource).await;
        if let Err(error) = &result {
            tracing::warn!("API error: {error}");
        }
        result
    }
}
