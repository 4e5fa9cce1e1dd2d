//! Current conditions from OpenWeatherMap.
//!
//! One cached answer per location; a failed refresh falls back to a stale
//! entry younger than two hours before giving up.

use log::{debug, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use super::ServiceError;
use crate::config::WeatherConfig;

const API_BASE: &str = "https://api.openweathermap.org/data/2.5/weather";
const STALE_LIMIT: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Deserialize)]
pub struct WeatherResponse {
    pub name: String,
    pub sys: WeatherSys,
    pub main: WeatherMain,
    pub weather: Vec<WeatherCondition>,
    pub wind: Option<WeatherWind>,
}

#[derive(Debug, Deserialize)]
pub struct WeatherSys {
    #[serde(default)]
    pub country: String,
}

#[derive(Debug, Deserialize)]
pub struct WeatherMain {
    pub temp: f64,
    pub feels_like: f64,
    pub humidity: i32,
}

#[derive(Debug, Deserialize)]
pub struct WeatherCondition {
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct WeatherWind {
    pub speed: f64,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    fetched_at: Instant,
    text: String,
}

pub struct WeatherService {
    config: WeatherConfig,
    cache: HashMap<String, CacheEntry>,
    client: reqwest::Client,
}

impl WeatherService {
    pub fn new(config: WeatherConfig) -> Self {
        Self {
            config,
            cache: HashMap::new(),
            client: reqwest::Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.enabled && !self.config.api_key.trim().is_empty()
    }

    pub async fn fetch_for_location(&mut self, location: &str) -> Result<String, ServiceError> {
        if !self.is_configured() {
            return Err(ServiceError::Unavailable("Weather service"));
        }
        let location = location.trim();
        if location.is_empty() {
            return Err(ServiceError::BadInput("Usage: w <location>".into()));
        }
        let key = location.to_lowercase();
        let ttl = Duration::from_secs(u64::from(self.config.cache_ttl_minutes) * 60);

        if let Some(entry) = self.cache.get(&key) {
            if entry.fetched_at.elapsed() < ttl {
                debug!("weather cache hit for {}", location);
                return Ok(entry.text.clone());
            }
        }

        match self.fetch_from_api(location).await {
            Ok(response) => {
                let text = self.format_response(&response);
                self.cache.insert(
                    key,
                    CacheEntry {
                        fetched_at: Instant::now(),
                        text: text.clone(),
                    },
                );
                Ok(text)
            }
            Err(e) => {
                warn!("weather lookup for {} failed: {}", location, e);
                match self.cache.get(&key) {
                    Some(entry) if entry.fetched_at.elapsed() < STALE_LIMIT => {
                        Ok(format!("{} (cached)", entry.text))
                    }
                    _ => Err(e),
                }
            }
        }
    }

    async fn fetch_from_api(&self, location: &str) -> Result<WeatherResponse, ServiceError> {
        let url = self.build_url(location);
        let limit = Duration::from_secs(u64::from(self.config.timeout_seconds.max(1)));
        let response = timeout(limit, self.client.get(&url).send())
            .await
            .map_err(|_| ServiceError::Request(format!("timed out after {}s", limit.as_secs())))?
            .map_err(|e| ServiceError::Request(e.to_string()))?;
        if response.status().as_u16() == 404 {
            return Err(ServiceError::BadInput(format!(
                "Could not find weather for '{}'.",
                location
            )));
        }
        if !response.status().is_success() {
            return Err(ServiceError::Request(format!("status {}", response.status())));
        }
        response
            .json::<WeatherResponse>()
            .await
            .map_err(|e| ServiceError::Request(format!("bad response: {}", e)))
    }

    pub fn build_url(&self, location: &str) -> String {
        format!(
            "{}?q={}&appid={}&units={}",
            API_BASE,
            urlencoding::encode(location),
            self.config.api_key,
            self.units()
        )
    }

    fn units(&self) -> &str {
        if self.config.units.eq_ignore_ascii_case("imperial") {
            "imperial"
        } else {
            "metric"
        }
    }

    fn format_response(&self, r: &WeatherResponse) -> String {
        let (temp_unit, speed_unit) = if self.units() == "imperial" {
            ("°F", "mph")
        } else {
            ("°C", "m/s")
        };
        let condition = r
            .weather
            .first()
            .map(|c| capitalize_words(&c.description))
            .unwrap_or_else(|| "Unknown".to_string());
        let place = if r.sys.country.is_empty() {
            r.name.clone()
        } else {
            format!("{}, {}", r.name, r.sys.country)
        };
        let mut out = format!(
            "Weather for {}: {}, {:.0}{} (feels like {:.0}{}), humidity {}%",
            place, condition, r.main.temp, temp_unit, r.main.feels_like, temp_unit, r.main.humidity
        );
        if let Some(wind) = &r.wind {
            out.push_str(&format!(", wind {:.1} {}", wind.speed, speed_unit));
        }
        out
    }
}

fn capitalize_words(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(units: &str) -> WeatherService {
        WeatherService::new(WeatherConfig {
            api_key: "k".into(),
            units: units.into(),
            enabled: true,
            ..WeatherConfig::default()
        })
    }

    #[test]
    fn url_encodes_location_and_units() {
        let url = service("imperial").build_url("New York");
        assert!(url.contains("q=New%20York"));
        assert!(url.ends_with("&units=imperial"));
        assert!(service("kelvin").build_url("x").ends_with("&units=metric"));
    }

    #[test]
    fn formats_conditions() {
        let body = r#"{"name":"Oslo","sys":{"country":"NO"},
            "main":{"temp":3.4,"feels_like":-1.2,"humidity":80},
            "weather":[{"description":"light snow"}],"wind":{"speed":4.3}}"#;
        let r: WeatherResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            service("metric").format_response(&r),
            "Weather for Oslo, NO: Light Snow, 3°C (feels like -1°C), humidity 80%, wind 4.3 m/s"
        );
    }

    #[tokio::test]
    async fn disabled_service_is_unavailable() {
        let mut svc = WeatherService::new(WeatherConfig::default());
        assert!(matches!(
            svc.fetch_for_location("Oslo").await,
            Err(ServiceError::Unavailable(_))
        ));
    }
}
