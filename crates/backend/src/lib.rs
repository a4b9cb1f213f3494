use std::{env, error, fmt, sync::Arc};

use async_trait::async_trait;
use model::delivery::{Delivery, DeliveryRecord};
use serde_json::Value;
use utility::id::Id;

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub token: Option<String>,
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// `BACKEND_URL` is required, `BACKEND_TOKEN` optional.
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("BACKEND_URL").ok()?;
        let config = Self::new(base_url);
        Some(match env::var("BACKEND_TOKEN").ok() {
            Some(token) if !token.is_empty() => config.with_token(token),
            _ => config,
        })
    }
}

#[derive(Debug, Clone)]
pub enum BackendError {
    RequestError(Arc<reqwest::Error>),
    JsonError(Arc<serde_json::Error>),
    NotFound(Id<Delivery>),
    InvalidResponse {
        status_code: reqwest::StatusCode,
        url: String,
        response: Option<String>,
    },
}

impl error::Error for BackendError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::RequestError(e) => Some(e.as_ref()),
            Self::JsonError(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::RequestError(e) => write!(f, "HTTP request error: {}", e),
            Self::JsonError(e) => write!(f, "JSON parse error: {}", e),
            Self::NotFound(id) => write!(f, "Delivery {} does not exist.", id),
            Self::InvalidResponse {
                status_code,
                url,
                response,
            } => match response {
                Some(text) => {
                    write!(f, "Invalid Response ({}) {}: {}", status_code, text, url)
                }
                None => write!(f, "Invalid Response ({}) {}", status_code, url),
            },
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        Self::RequestError(Arc::new(e))
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        Self::JsonError(Arc::new(e))
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Read-only client of the marketplace backend.
#[derive(Clone)]
pub struct BackendClient {
    config: BackendConfig,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Fetches the record of one delivery.
    pub async fn delivery(&self, id: Id<Delivery>) -> BackendResult<DeliveryRecord> {
        let url = format!("{}/deliveries/{}", self.config.base_url, id);
        log::debug!("Requesting '{}'.", url);

        let mut request = self.http.get(&url).header("accept", "application/json");
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        match response.status() {
            reqwest::StatusCode::OK => parse_delivery(&response.text().await?),
            reqwest::StatusCode::NOT_FOUND => Err(BackendError::NotFound(id)),
            other => Err(BackendError::InvalidResponse {
                status_code: other,
                url,
                response: response.text().await.ok(),
            }),
        }
    }
}

/// Where delivery records come from.
#[async_trait]
pub trait DeliverySource: Send + Sync + 'static {
    async fn delivery(&self, id: Id<Delivery>) -> BackendResult<DeliveryRecord>;
}

#[async_trait]
impl DeliverySource for BackendClient {
    async fn delivery(&self, id: Id<Delivery>) -> BackendResult<DeliveryRecord> {
        BackendClient::delivery(self, id).await
    }
}

/// Accepts the record itself or the record wrapped in `{"data": ...}`.
pub fn parse_delivery(body: &str) -> BackendResult<DeliveryRecord> {
    let value: Value = serde_json::from_str(body)?;
    let record = match value {
        Value::Object(mut object) if object.get("data").map_or(false, Value::is_object) => {
            object.remove("data").unwrap_or_default()
        }
        other => other,
    };
    Ok(serde_json::from_value(record)?)
}
