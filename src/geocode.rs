//! Free-text place lookup used by search when keywords match too little.

use crate::error::SourceError;
use crate::source::{ensure_success, http_client, transport_error};
use crate::state::Coordinates;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeResult {
    Found {
        coordinates: Coordinates,
        display_name: Option<String>,
    },
    NotFound,
}

impl GeocodeResult {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match self {
            GeocodeResult::Found { coordinates, .. } => Some(*coordinates),
            GeocodeResult::NotFound => None,
        }
    }
}

/// Wire shape of the geocoding function's answer.
#[derive(Debug, Deserialize)]
struct GeocodeAnswer {
    #[serde(default)]
    found: bool,
    lat: Option<f64>,
    lng: Option<f64>,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

impl From<GeocodeAnswer> for GeocodeResult {
    fn from(answer: GeocodeAnswer) -> Self {
        match (answer.found, answer.lat, answer.lng) {
            (true, Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => {
                GeocodeResult::Found {
                    coordinates: Coordinates { lat, lng },
                    display_name: answer.display_name,
                }
            }
            _ => GeocodeResult::NotFound,
        }
    }
}

#[derive(Debug, Serialize)]
struct GeocodeQuery<'a> {
    q: &'a str,
}

pub trait Geocoder: Send + Sync {
    fn geocode(&self, query: &str)
    -> impl Future<Output = Result<GeocodeResult, SourceError>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpGeocoder {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpGeocoder {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: http_client(timeout)?,
            url: url.into(),
            timeout,
        })
    }
}

impl Geocoder for HttpGeocoder {
    async fn geocode(&self, query: &str) -> Result<GeocodeResult, SourceError> {
        let response = self
            .client
            .post(&self.url)
            .json(&GeocodeQuery { q: query })
            .send()
            .await
            .map_err(|err| transport_error(err, self.timeout))?;
        let response = ensure_success(response).await?;
        let answer: GeocodeAnswer = response
            .json()
            .await
            .map_err(|err| transport_error(err, self.timeout))?;
        Ok(answer.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> GeocodeResult {
        serde_json::from_str::<GeocodeAnswer>(body)
            .expect("parse answer")
            .into()
    }

    #[test]
    fn found_answer_carries_coordinates() {
        let result = parse(r#"{"found": true, "lat": 45.42, "lng": -75.69, "displayName": "Ottawa"}"#);

        assert_eq!(
            result,
            GeocodeResult::Found {
                coordinates: Coordinates {
                    lat: 45.42,
                    lng: -75.69
                },
                display_name: Some("Ottawa".to_string()),
            }
        );
    }

    #[test]
    fn found_without_coordinates_is_not_found() {
        assert_eq!(parse(r#"{"found": true, "lat": 45.42}"#), GeocodeResult::NotFound);
        assert_eq!(parse(r#"{"found": false}"#), GeocodeResult::NotFound);
        assert_eq!(parse("{}"), GeocodeResult::NotFound);
    }

    #[test]
    fn query_body_uses_q_key() {
        let body = serde_json::to_value(GeocodeQuery { q: "rideau centre" }).expect("serialize");

        assert_eq!(body, serde_json::json!({"q": "rideau centre"}));
    }
}
