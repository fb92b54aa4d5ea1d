use crate::config::{Config, SourceMode};
use crate::error::SourceError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

pub mod fixture;
pub mod mock;
pub mod rest;

pub use fixture::FixtureLotSource;
pub use rest::RestLotSource;

/// One lot row as delivered by the upstream store.
///
/// Column aliasing happens here once. A row may carry several names for the
/// same column; the first non-null one in precedence order wins. Numeric
/// columns are lenient: numbers and numeric strings are accepted, anything else
/// becomes `None`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct RawLotRecord {
    pub id: String,
    pub source_lot_id: Option<String>,
    pub name: String,
    pub address: Option<String>,
    pub capacity: Option<f64>,
    pub available: Option<f64>,
    pub occupied: Option<f64>,
    pub virtual_occupied: Option<f64>,
    pub status: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub data_mode: Option<String>,
    pub updated_at: Option<String>,
}

const ID_COLUMNS: &[&str] = &["map_id", "id", "lot_id"];
const SOURCE_LOT_ID_COLUMNS: &[&str] = &["ottawa_lot_id", "source_lot_id"];
const NAME_COLUMNS: &[&str] = &["map_name", "name"];
const ADDRESS_COLUMNS: &[&str] = &["address"];
const CAPACITY_COLUMNS: &[&str] = &["map_capacity", "capacity", "total"];
const AVAILABLE_COLUMNS: &[&str] = &["map_available", "api_available", "available", "free"];
const OCCUPIED_COLUMNS: &[&str] = &["api_occupied", "occupied"];
const VIRTUAL_OCCUPIED_COLUMNS: &[&str] = &["virtual_occupied"];
const STATUS_COLUMNS: &[&str] = &["map_status", "api_status", "status"];
const LAT_COLUMNS: &[&str] = &["map_lat", "lat"];
const LNG_COLUMNS: &[&str] = &["map_lng", "lng"];
const DATA_MODE_COLUMNS: &[&str] = &["map_data_mode", "data_mode"];
const UPDATED_AT_COLUMNS: &[&str] = &["map_updated_at", "updated_at", "created_at"];

/// First non-null value among `columns`.
fn pick<'a>(row: &'a Map<String, Value>, columns: &[&str]) -> Option<&'a Value> {
    columns
        .iter()
        .filter_map(|column| row.get(*column))
        .find(|value| !value.is_null())
}

fn lenient_f64(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn lenient_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl From<Map<String, Value>> for RawLotRecord {
    fn from(row: Map<String, Value>) -> Self {
        Self {
            id: lenient_string(pick(&row, ID_COLUMNS)).unwrap_or_default(),
            source_lot_id: lenient_string(pick(&row, SOURCE_LOT_ID_COLUMNS)),
            name: lenient_string(pick(&row, NAME_COLUMNS)).unwrap_or_default(),
            address: lenient_string(pick(&row, ADDRESS_COLUMNS)),
            capacity: lenient_f64(pick(&row, CAPACITY_COLUMNS)),
            available: lenient_f64(pick(&row, AVAILABLE_COLUMNS)),
            occupied: lenient_f64(pick(&row, OCCUPIED_COLUMNS)),
            virtual_occupied: lenient_f64(pick(&row, VIRTUAL_OCCUPIED_COLUMNS)),
            status: lenient_string(pick(&row, STATUS_COLUMNS)),
            lat: lenient_f64(pick(&row, LAT_COLUMNS)),
            lng: lenient_f64(pick(&row, LNG_COLUMNS)),
            data_mode: lenient_string(pick(&row, DATA_MODE_COLUMNS)),
            updated_at: lenient_string(pick(&row, UPDATED_AT_COLUMNS)),
        }
    }
}

impl RawLotRecord {
    /// Rows without an id or a name cannot be shown or merged.
    pub fn is_identifiable(&self) -> bool {
        !self.id.trim().is_empty() && !self.name.trim().is_empty()
    }
}

/// Turn a JSON array payload into rows, skipping elements that cannot be used.
pub fn parse_rows(payload: Value) -> Result<Vec<RawLotRecord>, SourceError> {
    let Value::Array(items) = payload else {
        return Err(SourceError::Payload("expected a JSON array of lots".to_string()));
    };

    let mut rows = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<RawLotRecord>(item) {
            Ok(row) if row.is_identifiable() => rows.push(row),
            Ok(row) => {
                debug!(index, id = %row.id, "Skipping lot row without id or name");
            }
            Err(err) => {
                debug!(index, error = %err, "Skipping malformed lot row");
            }
        }
    }
    Ok(rows)
}

/// Upstream store of lot rows.
pub trait LotSource: Send + Sync {
    fn fetch_lots(&self) -> impl Future<Output = Result<Vec<RawLotRecord>, SourceError>> + Send;
}

/// The lot source picked by configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredSource {
    Rest(RestLotSource),
    Fixture(FixtureLotSource),
}

impl ConfiguredSource {
    /// Build the source named by `[source] mode`.
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        match config.source_mode() {
            SourceMode::Api => Ok(ConfiguredSource::Rest(RestLotSource::new(
                &config.source.url,
                config.source_api_key(),
                config.request_timeout(),
            )?)),
            SourceMode::Mock => {
                let fixture = match config.fixture_path() {
                    Some(path) => FixtureLotSource::from_path(path)?,
                    None => FixtureLotSource::demo(),
                };
                Ok(ConfiguredSource::Fixture(fixture))
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ConfiguredSource::Rest(source) => format!("rest {}", source.url()),
            ConfiguredSource::Fixture(source) => format!("fixture ({} rows)", source.rows().len()),
        }
    }
}

impl LotSource for ConfiguredSource {
    async fn fetch_lots(&self) -> Result<Vec<RawLotRecord>, SourceError> {
        match self {
            ConfiguredSource::Rest(source) => source.fetch_lots().await,
            ConfiguredSource::Fixture(source) => source.fetch_lots().await,
        }
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, SourceError> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("parkflow/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()?;
    Ok(client)
}

pub(crate) fn transport_error(err: reqwest::Error, timeout: Duration) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout(timeout.as_secs())
    } else {
        SourceError::Http(err)
    }
}

pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    Err(SourceError::Status(status.as_u16(), snippet))
}
