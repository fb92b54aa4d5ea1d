use crate::error::SourceError;
use crate::geocode::{GeocodeResult, Geocoder};
use crate::source::{LotSource, RawLotRecord};
use crate::weather::{WeatherReading, WeatherSource};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MockFetchBehavior {
    pub rows: Vec<RawLotRecord>,
    pub fetch_ok: bool,
    pub delay: Duration,
}

impl MockFetchBehavior {
    pub fn ok(rows: Vec<RawLotRecord>) -> Self {
        Self {
            rows,
            fetch_ok: true,
            delay: Duration::ZERO,
        }
    }

    pub fn fail() -> Self {
        Self {
            rows: Vec::new(),
            fetch_ok: false,
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(delay: Duration, rows: Vec<RawLotRecord>) -> Self {
        Self {
            rows,
            fetch_ok: true,
            delay,
        }
    }
}

/// Plays back one behavior per fetch; the last one repeats once the list runs out.
pub struct MockLotSource {
    behaviors: Vec<MockFetchBehavior>,
    next_index: AtomicUsize,
}

impl MockLotSource {
    pub fn new(behaviors: Vec<MockFetchBehavior>) -> Self {
        Self {
            behaviors,
            next_index: AtomicUsize::new(0),
        }
    }

    pub fn with_rows(rows: Vec<RawLotRecord>) -> Self {
        Self::new(vec![MockFetchBehavior::ok(rows)])
    }

    pub fn fetch_count(&self) -> usize {
        self.next_index.load(Ordering::SeqCst)
    }

    fn next_behavior(&self) -> Option<MockFetchBehavior> {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        self.behaviors
            .get(index)
            .or_else(|| self.behaviors.last())
            .cloned()
    }
}

impl LotSource for MockLotSource {
    async fn fetch_lots(&self) -> Result<Vec<RawLotRecord>, SourceError> {
        let behavior = self.next_behavior().unwrap_or_else(MockFetchBehavior::fail);
        if !behavior.delay.is_zero() {
            tokio::time::sleep(behavior.delay).await;
        }
        if !behavior.fetch_ok {
            return Err(SourceError::Mock("fetch failed".to_string()));
        }
        Ok(behavior.rows)
    }
}

/// Replays queued weather answers; the last answer repeats.
pub struct MockWeatherSource {
    answers: Vec<Result<WeatherReading, String>>,
    next_index: AtomicUsize,
}

impl MockWeatherSource {
    pub fn new(answers: Vec<Result<WeatherReading, String>>) -> Self {
        Self {
            answers,
            next_index: AtomicUsize::new(0),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.next_index.load(Ordering::SeqCst)
    }
}

impl WeatherSource for MockWeatherSource {
    async fn fetch_weather(&self) -> Result<WeatherReading, SourceError> {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        match self.answers.get(index).or_else(|| self.answers.last()) {
            Some(Ok(reading)) => Ok(*reading),
            Some(Err(message)) => Err(SourceError::Mock(message.clone())),
            None => Err(SourceError::Mock("no weather configured".to_string())),
        }
    }
}

/// Answers from a fixed table keyed by lowercased query.
#[derive(Default)]
pub struct MockGeocoder {
    places: HashMap<String, GeocodeResult>,
    fail: bool,
    queries: Mutex<Vec<String>>,
}

impl MockGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_place(mut self, query: &str, result: GeocodeResult) -> Self {
        self.places.insert(query.trim().to_lowercase(), result);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .map(|queries| queries.clone())
            .unwrap_or_default()
    }
}

impl Geocoder for MockGeocoder {
    async fn geocode(&self, query: &str) -> Result<GeocodeResult, SourceError> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
        if self.fail {
            return Err(SourceError::Mock("geocoder unavailable".to_string()));
        }
        Ok(self
            .places
            .get(&query.trim().to_lowercase())
            .cloned()
            .unwrap_or(GeocodeResult::NotFound))
    }
}
