use crate::error::SourceError;
use crate::source::{LotSource, RawLotRecord, parse_rows};
use serde_json::{Value, json};
use std::path::Path;
use tracing::debug;

/// Serves a fixed set of lot rows instead of the hosted store.
///
/// Every fetch returns the same rows, so the live and virtual lots stay put
/// while heuristic lots keep ticking.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureLotSource {
    rows: Vec<RawLotRecord>,
}

impl FixtureLotSource {
    pub fn new(rows: Vec<RawLotRecord>) -> Self {
        Self { rows }
    }

    /// Built-in demo lots covering every estimate tier.
    pub fn demo() -> Self {
        Self::from_value(demo_rows()).unwrap_or_else(|_| Self::new(Vec::new()))
    }

    pub fn from_value(payload: Value) -> Result<Self, SourceError> {
        Ok(Self::new(parse_rows(payload)?))
    }

    /// Rows from a JSON file shaped like the REST payload.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let contents = std::fs::read_to_string(path)?;
        let payload: Value = serde_json::from_str(&contents)?;
        Self::from_value(payload)
    }

    pub fn rows(&self) -> &[RawLotRecord] {
        &self.rows
    }
}

impl LotSource for FixtureLotSource {
    async fn fetch_lots(&self) -> Result<Vec<RawLotRecord>, SourceError> {
        debug!(count = self.rows.len(), "Serving fixture lot rows");
        Ok(self.rows.clone())
    }
}

fn demo_rows() -> Value {
    json!([
        {
            "id": "demo-a",
            "name": "Demo Lot A",
            "address": "100 Rideau St",
            "total": 50,
            "free": 10,
            "status": "OPEN",
            "lat": 45.4258,
            "lng": -75.6918
        },
        {
            "id": "demo-b",
            "name": "Demo Lot B",
            "address": "110 Laurier Ave W",
            "total": 30,
            "free": 0,
            "status": "FULL",
            "lat": 45.4203,
            "lng": -75.6903
        },
        {
            "id": "demo-c",
            "name": "Lansdowne Counted Lot",
            "address": "1015 Bank St",
            "capacity": 120,
            "virtual_occupied": 45,
            "lat": 45.3980,
            "lng": -75.6840
        },
        {
            "id": "demo-d",
            "name": "Civic Hospital Visitor Parking",
            "address": "1053 Carling Ave",
            "capacity": 200,
            "lat": 45.3920,
            "lng": -75.7220
        },
        {
            "id": "demo-e",
            "name": "Tunney's Pasture Station Park and Ride",
            "capacity": 150,
            "lat": 45.4035,
            "lng": -75.7351
        }
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[tokio::test]
    async fn demo_rows_cover_every_tier() -> Result<(), SourceError> {
        let source = FixtureLotSource::demo();

        let rows = source.fetch_lots().await?;

        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].available, Some(10.0));
        assert_eq!(rows[1].capacity, Some(30.0));
        assert_eq!(rows[2].virtual_occupied, Some(45.0));
        assert!(rows[3].available.is_none() && rows[3].virtual_occupied.is_none());
        Ok(())
    }

    #[test]
    fn fixture_file_is_parsed_like_the_rest_payload() -> Result<(), Box<dyn std::error::Error>> {
        let unique = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
        let path = std::env::temp_dir().join(format!("parkflow-fixture-{unique}.json"));
        fs::write(
            &path,
            r#"[{"map_id": 7, "map_name": "Fixture Lot", "map_capacity": "40"}, {"id": "x"}]"#,
        )?;

        let source = FixtureLotSource::from_path(&path)?;
        let _ = fs::remove_file(&path);

        assert_eq!(source.rows().len(), 1);
        assert_eq!(source.rows()[0].id, "7");
        assert_eq!(source.rows()[0].capacity, Some(40.0));
        Ok(())
    }

    #[test]
    fn shipped_demo_file_parses() -> Result<(), SourceError> {
        let source = FixtureLotSource::from_path("config/demo_lots.json")?;

        assert_eq!(source.rows().len(), 4);
        Ok(())
    }

    #[test]
    fn missing_fixture_file_is_an_error() {
        let result = FixtureLotSource::from_path("/nonexistent/parkflow/lots.json");

        assert!(matches!(result, Err(SourceError::Io(_))));
    }
}
