//! Keyword, address and postal-code search over the held lots.

use crate::estimation::classify::AvailabilityLevel;
use crate::estimation::merge::normalize_lot_name;
use crate::geocode::{GeocodeResult, Geocoder};
use crate::state::{Coordinates, ParkingLot};
use std::cmp::Reverse;
use std::collections::HashSet;
use tracing::{debug, warn};

const EARTH_RADIUS_KM: f64 = 6371.0;
/// Keyword searches with this many hits or fewer also ask the geocoder.
const GEOCODE_FALLBACK_MAX_HITS: usize = 2;

const STOPWORDS: &[&str] = &[
    "parking", "park", "lot", "garage", "parkade", "location", "spot", "near", "nearest", "find",
    "show", "me",
];

const NEIGHBOURHOOD_KEYWORDS: &[&str] = &[
    "downtown", "byward", "market", "rideau", "sparks", "bank", "somerset", "kent", "lyon",
    "elgin",
];

// Well known places, matched exactly first and then by containment.
const KNOWN_PLACES: &[(&str, f64, f64)] = &[
    ("819 dynes rd", 45.3234, -75.7845),
    ("819 dynes road", 45.3234, -75.7845),
    ("100 rideau st", 45.4258, -75.6918),
    ("100 rideau street", 45.4258, -75.6918),
    ("parliament hill", 45.4236, -75.7005),
    ("byward market", 45.4284, -75.6918),
    ("university of ottawa", 45.4217, -75.6832),
    ("carleton university", 45.3875, -75.6972),
    ("ottawa hospital", 45.3834, -75.6478),
    ("lansdowne park", 45.3948, -75.6821),
    ("td place", 45.3948, -75.6821),
    ("canadian tire centre", 45.2967, -75.9267),
    ("rideau centre", 45.4258, -75.6918),
    ("bayshore shopping centre", 45.3567, -75.7989),
    ("st laurent shopping centre", 45.4189, -75.6234),
    ("westboro beach", 45.3689, -75.7642),
    ("mooney bay beach", 45.3612, -75.6834),
    ("britannia beach", 45.3567, -75.7889),
    ("downtown ottawa", 45.4215, -75.6972),
    ("sparks street", 45.4214, -75.6981),
    ("elgin street", 45.4151, -75.6925),
    ("bank street", 45.4098, -75.6889),
    ("somerset street", 45.4175, -75.6972),
    ("preston street", 45.3989, -75.7012),
    ("wellington street", 45.4012, -75.7234),
    ("kanata", 45.3234, -75.8967),
    ("orleans", 45.4656, -75.5234),
    ("nepean", 45.3289, -75.7734),
    ("gloucester", 45.4189, -75.6234),
    ("vanier", 45.4356, -75.6645),
    ("hintonburg", 45.4012, -75.7234),
    ("westboro", 45.3689, -75.7642),
    ("glebe", 45.4009, -75.6890),
    ("sandy hill", 45.4156, -75.6812),
    ("centretown", 45.4175, -75.6972),
];

// Forward sortation areas (first three postal code characters).
const POSTAL_AREAS: &[(&str, f64, f64)] = &[
    ("k1p", 45.4215, -75.6972),
    ("k1n", 45.4284, -75.6918),
    ("k1r", 45.4175, -75.6972),
    ("k1s", 45.4009, -75.6890),
    ("k1g", 45.4156, -75.6812),
    ("k1h", 45.3948, -75.6821),
    ("k1j", 45.4189, -75.6234),
    ("k1k", 45.4356, -75.6645),
    ("k1l", 45.4656, -75.5234),
    ("k4a", 45.4756, -75.4834),
    ("k1e", 45.3989, -75.6234),
    ("k1y", 45.3689, -75.7642),
    ("k1z", 45.4012, -75.7234),
    ("k2p", 45.3567, -75.7989),
    ("k2h", 45.3289, -75.7734),
    ("k2j", 45.3234, -75.8967),
    ("k2k", 45.3534, -75.9167),
    ("k2l", 45.2967, -75.9267),
    ("k2g", 45.3612, -75.6834),
    ("k1v", 45.3456, -75.7123),
    ("k1t", 45.3289, -75.6567),
    ("k1w", 45.2967, -75.7234),
    ("k4m", 45.2734, -75.7567),
    ("k1a", 45.4567, -75.7234),
    ("k1m", 45.4789, -75.6789),
    ("k4b", 45.5234, -75.6567),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    /// Lowercased, trimmed input.
    pub term: String,
    /// Words left after plural folding and stop-word removal.
    pub words: Vec<String>,
}

fn normalize_word(word: &str) -> String {
    let word = word.trim().to_lowercase();
    if word.chars().count() > 3 && word.ends_with('s') {
        word[..word.len() - 1].to_string()
    } else {
        word
    }
}

pub fn normalize_query(input: &str) -> NormalizedQuery {
    let term = input.trim().to_lowercase();
    let words = term
        .split_whitespace()
        .map(normalize_word)
        .filter(|word| !word.is_empty() && !STOPWORDS.contains(&word.as_str()))
        .collect();
    NormalizedQuery { term, words }
}

/// Great-circle distance in kilometres, rounded to two decimals.
pub fn distance_km(from: Coordinates, to: Coordinates) -> f64 {
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lng = (to.lng - from.lng).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + from.lat.to_radians().cos() * to.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    (EARTH_RADIUS_KM * c * 100.0).round() / 100.0
}

pub fn lookup_place(term: &str) -> Option<Coordinates> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return None;
    }
    let to_coords = |&(_, lat, lng): &(&str, f64, f64)| Coordinates { lat, lng };

    KNOWN_PLACES
        .iter()
        .find(|(key, ..)| *key == term)
        .or_else(|| {
            KNOWN_PLACES
                .iter()
                .find(|(key, ..)| key.contains(term.as_str()) || term.contains(key))
        })
        .map(to_coords)
}

/// Letter, digit, letter at the start once spaces are removed.
pub fn is_postal_code(input: &str) -> bool {
    let compact: Vec<char> = input.chars().filter(|c| !c.is_whitespace()).collect();
    matches!(
        compact.as_slice(),
        [a, b, c, ..] if a.is_ascii_alphabetic() && b.is_ascii_digit() && c.is_ascii_alphabetic()
    )
}

pub fn lookup_postal_code(input: &str) -> Option<Coordinates> {
    let prefix: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .take(3)
        .collect::<String>()
        .to_lowercase();
    POSTAL_AREAS
        .iter()
        .find(|(area, ..)| *area == prefix)
        .map(|&(_, lat, lng)| Coordinates { lat, lng })
}

fn searchable_text(lot: &ParkingLot) -> String {
    format!("{} {}", lot.name, lot.address.as_deref().unwrap_or("")).to_lowercase()
}

fn usable_coordinates(lot: &ParkingLot) -> Option<Coordinates> {
    lot.coordinates
        .filter(|c| c.lat.is_finite() && c.lng.is_finite() && !c.is_zero())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LotFilters {
    pub query: String,
    pub only_available: bool,
}

/// Lots to list for the given filters, in their held order.
pub fn filter_lots(lots: &[ParkingLot], filters: &LotFilters) -> Vec<ParkingLot> {
    let sourced_names: HashSet<String> = lots
        .iter()
        .filter(|lot| lot.source_lot_id.is_some())
        .map(|lot| normalize_lot_name(&lot.name))
        .collect();
    let query = normalize_query(&filters.query);

    lots.iter()
        .filter(|lot| {
            let city_variant = lot.name.to_lowercase().contains("city parking");
            if lot.source_lot_id.is_none()
                && city_variant
                && sourced_names.contains(&normalize_lot_name(&lot.name))
            {
                return false;
            }

            if filters.only_available
                && !matches!(
                    lot.availability.level,
                    AvailabilityLevel::Available | AvailabilityLevel::Moderate
                )
            {
                return false;
            }

            if query.term.is_empty() || query.words.is_empty() {
                return true;
            }
            let text = searchable_text(lot);
            query.words.iter().all(|word| text.contains(word.as_str()))
        })
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub lot: ParkingLot,
    pub distance_km: Option<f64>,
}

fn by_free_descending(lots: impl IntoIterator<Item = ParkingLot>) -> Vec<SearchHit> {
    let mut lots: Vec<ParkingLot> = lots.into_iter().collect();
    lots.sort_by_key(|lot| Reverse(lot.free.map(i64::from).unwrap_or(-1)));
    lots.into_iter()
        .map(|lot| SearchHit {
            lot,
            distance_km: None,
        })
        .collect()
}

fn by_distance(lots: impl IntoIterator<Item = ParkingLot>, origin: Coordinates) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = lots
        .into_iter()
        .filter_map(|lot| {
            let coordinates = usable_coordinates(&lot)?;
            Some(SearchHit {
                distance_km: Some(distance_km(origin, coordinates)),
                lot,
            })
        })
        .collect();
    hits.sort_by(|a, b| a.distance_km.unwrap_or(0.0).total_cmp(&b.distance_km.unwrap_or(0.0)));
    hits
}

fn keyword_matches(lot: &ParkingLot, query: &NormalizedQuery) -> bool {
    let text = searchable_text(lot);
    let all_words = if query.words.is_empty() {
        text.contains(query.term.as_str())
    } else {
        query.words.iter().all(|word| text.contains(word.as_str()))
    };
    let partial = text.contains(query.term.as_str())
        || NEIGHBOURHOOD_KEYWORDS
            .iter()
            .any(|keyword| query.term.contains(keyword) && text.contains(keyword));
    all_words || partial
}

/// Search the held lots for `input`.
///
/// Known places and postal areas rank by distance without a network call.
/// Otherwise keywords decide, and a thin keyword result asks the geocoder to
/// rank every lot by distance instead.
pub async fn search_lots<G: Geocoder>(
    lots: &[ParkingLot],
    input: &str,
    geocoder: Option<&G>,
) -> Vec<SearchHit> {
    if input.trim().is_empty() {
        return Vec::new();
    }

    let query = normalize_query(input);
    let origin = lookup_place(&query.term).or_else(|| {
        if is_postal_code(input) {
            lookup_postal_code(input)
        } else {
            None
        }
    });

    if query.words.is_empty() && origin.is_none() {
        return by_free_descending(lots.iter().cloned());
    }

    let matches: Vec<ParkingLot> = lots
        .iter()
        .filter(|lot| keyword_matches(lot, &query))
        .cloned()
        .collect();

    if let Some(origin) = origin {
        // A place or postal code rarely appears in lot names: rank everything then.
        let candidates = if matches.is_empty() {
            lots.to_vec()
        } else {
            matches
        };
        return by_distance(candidates, origin);
    }

    if matches.len() <= GEOCODE_FALLBACK_MAX_HITS
        && let Some(geocoder) = geocoder
    {
        match geocoder.geocode(input.trim()).await {
            Ok(GeocodeResult::Found {
                coordinates,
                display_name,
            }) => {
                debug!(query = %input.trim(), place = ?display_name, "Geocoded search input");
                return by_distance(lots.iter().cloned(), coordinates);
            }
            Ok(GeocodeResult::NotFound) => {
                debug!(query = %input.trim(), "Geocoder found nothing");
            }
            Err(err) => {
                warn!(error = %err, "Geocoding failed, using keyword results");
            }
        }
    }

    by_free_descending(matches)
}
