//! Current weather, used only to raise the congestion score.

use crate::error::{AppError, SourceError};
use crate::source::{ensure_success, http_client, transport_error};
use crate::state::AppState;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    /// Degrees Celsius.
    pub temp: f64,
    #[serde(default)]
    pub rain: bool,
    #[serde(default)]
    pub snow: bool,
}

pub trait WeatherSource: Send + Sync {
    fn fetch_weather(&self) -> impl Future<Output = Result<WeatherReading, SourceError>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpWeatherSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpWeatherSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: http_client(timeout)?,
            url: url.into(),
            timeout,
        })
    }
}

impl WeatherSource for HttpWeatherSource {
    async fn fetch_weather(&self) -> Result<WeatherReading, SourceError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| transport_error(err, self.timeout))?;
        let response = ensure_success(response).await?;
        let reading: WeatherReading = response
            .json()
            .await
            .map_err(|err| transport_error(err, self.timeout))?;
        if !reading.temp.is_finite() {
            return Err(SourceError::Payload("temperature is not finite".to_string()));
        }
        Ok(reading)
    }
}

/// Fetch one reading and publish it. On failure the held reading is left as is.
pub async fn run_weather_cycle<W: WeatherSource>(
    state: &Arc<RwLock<AppState>>,
    source: &W,
    timeout: Duration,
) -> Result<WeatherReading, AppError> {
    let reading = match tokio::time::timeout(timeout, source.fetch_weather()).await {
        Ok(result) => result?,
        Err(_) => return Err(SourceError::Timeout(timeout.as_secs()).into()),
    };

    let mut guard = state.write().map_err(|_| AppError::StateLock)?;
    let changed = guard.weather() != Some(&reading);
    guard.set_weather(Some(reading));
    drop(guard);

    if changed {
        info!(
            temp = reading.temp,
            rain = reading.rain,
            snow = reading.snow,
            "Weather updated"
        );
    } else {
        debug!("Weather unchanged");
    }
    Ok(reading)
}
