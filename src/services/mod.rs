//! External request/response services used by command handlers.
//!
//! Handlers never await these directly: they spawn the call and post the
//! reply back to the session worker. [`ServiceHub`] is the production
//! implementation; tests plug in their own [`ExternalServices`].

#[cfg(feature = "ai")]
pub mod ai;
#[cfg(feature = "weather")]
pub mod weather;

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};

use crate::config::{AiConfig, Config};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0} is not configured")]
    Unavailable(&'static str),
    #[error("{0}")]
    BadInput(String),
    #[error("request failed: {0}")]
    Request(String),
}

/// One turn of conversation history handed to the completion provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTurn {
    pub text: String,
    pub from_bot: bool,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub settings: AiConfig,
    pub history: Vec<HistoryTurn>,
    pub prompt: String,
}

#[async_trait]
pub trait ExternalServices: Send + Sync {
    async fn weather(&self, location: &str) -> Result<String, ServiceError>;
    async fn complete(&self, request: CompletionRequest) -> Result<String, ServiceError>;
    async fn list_models(&self, settings: &AiConfig) -> Result<Vec<String>, ServiceError>;
    async fn time_for(&self, location: &str) -> Result<String, ServiceError>;
    async fn news(&self, topic: &str) -> Result<String, ServiceError>;
    async fn shorten(&self, url: &str) -> Result<String, ServiceError>;
}

/// Production services. Weather and AI completions need their cargo
/// features; news and URL shortening have no provider and report
/// themselves unavailable.
pub struct ServiceHub {
    #[cfg(feature = "weather")]
    weather: tokio::sync::Mutex<weather::WeatherService>,
    #[cfg(feature = "ai")]
    ai: ai::AiClient,
}

impl ServiceHub {
    pub fn new(config: &Config) -> Self {
        #[cfg(not(feature = "weather"))]
        let _ = config;
        Self {
            #[cfg(feature = "weather")]
            weather: tokio::sync::Mutex::new(weather::WeatherService::new(config.weather.clone())),
            #[cfg(feature = "ai")]
            ai: ai::AiClient::new(),
        }
    }
}

#[async_trait]
impl ExternalServices for ServiceHub {
    async fn weather(&self, location: &str) -> Result<String, ServiceError> {
        #[cfg(feature = "weather")]
        {
            self.weather.lock().await.fetch_for_location(location).await
        }
        #[cfg(not(feature = "weather"))]
        {
            let _ = location;
            Err(ServiceError::Unavailable("Weather service"))
        }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, ServiceError> {
        #[cfg(feature = "ai")]
        {
            self.ai.complete(&request).await
        }
        #[cfg(not(feature = "ai"))]
        {
            let _ = request;
            Err(ServiceError::Unavailable("AI service"))
        }
    }

    async fn list_models(&self, settings: &AiConfig) -> Result<Vec<String>, ServiceError> {
        #[cfg(feature = "ai")]
        {
            self.ai.list_models(settings).await
        }
        #[cfg(not(feature = "ai"))]
        {
            let _ = settings;
            Err(ServiceError::Unavailable("AI service"))
        }
    }

    async fn time_for(&self, location: &str) -> Result<String, ServiceError> {
        let offset = parse_utc_offset(location).ok_or(ServiceError::Unavailable(
            "Time zone lookup (use UTC or an offset such as UTC+2)",
        ))?;
        let now = Utc::now().with_timezone(&offset);
        Ok(format!(
            "Current time in {}: {}",
            location.trim(),
            now.format("%Y-%m-%d %H:%M:%S (UTC%:z)")
        ))
    }

    async fn news(&self, _topic: &str) -> Result<String, ServiceError> {
        Err(ServiceError::Unavailable("News service"))
    }

    async fn shorten(&self, url: &str) -> Result<String, ServiceError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ServiceError::BadInput(
                "Please provide a full URL starting with http:// or https://".into(),
            ));
        }
        Err(ServiceError::Unavailable("URL shortener"))
    }
}

/// `UTC`, `GMT`, `UTC+2`, `+05:30`, `GMT-3` -> fixed offset.
pub fn parse_utc_offset(input: &str) -> Option<FixedOffset> {
    let s = input.trim().to_uppercase();
    let rest = s
        .strip_prefix("UTC")
        .or_else(|| s.strip_prefix("GMT"))
        .unwrap_or(&s);
    if rest.is_empty() {
        return if s == "UTC" || s == "GMT" {
            FixedOffset::east_opt(0)
        } else {
            None
        };
    }
    let (sign, digits) = match rest.chars().next()? {
        '+' => (1, &rest[1..]),
        '-' => (-1, &rest[1..]),
        _ => return None,
    };
    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None => (digits.parse::<i32>().ok()?, 0),
    };
    if hours > 14 || minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
