//! Domain types and cache key grammar

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Date format used in slot cache keys
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A club as returned by the upstream provider
///
/// Only `id` is interpreted; every other field is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Club {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Club {
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
            attributes: Map::new(),
        }
    }
}

/// A court belonging to a club
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Court {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Court {
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self {
            id,
            name: None,
            attributes: Map::new(),
        }
    }
}

/// A bookable time slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub datetime: String,
    pub price: f64,
    pub duration: u32,
    pub start: String,
    pub end: String,
}

impl Slot {
    /// Calendar date the slot falls on
    ///
    /// Accepts RFC 3339 timestamps, naive `YYYY-MM-DDTHH:MM:SS` /
    /// `YYYY-MM-DD HH:MM:SS`, or a bare `YYYY-MM-DD` prefix.
    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        let raw = self.datetime.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.date_naive());
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
                return Some(dt.date());
            }
        }
        raw.get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, DATE_FORMAT).ok())
    }
}

/// One aggregation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityQuery {
    pub place_id: String,
    pub date: NaiveDate,
}

impl AvailabilityQuery {
    pub fn new(place_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            place_id: place_id.into(),
            date,
        }
    }
}

/// Court with the slots still free on the queried date
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourtWithAvailability {
    #[serde(flatten)]
    pub court: Court,
    pub available: Vec<Slot>,
}

/// Club with all its courts and their availability, built fresh per request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClubWithAvailability {
    #[serde(flatten)]
    pub club: Club,
    pub courts: Vec<CourtWithAvailability>,
}

/// Cache key builders
pub mod keys {
    use super::{DATE_FORMAT, NaiveDate};

    pub const CLUBS_PREFIX: &str = "clubs:";
    pub const COURTS_PREFIX: &str = "courts:";
    pub const SLOTS_PREFIX: &str = "slots:";
    pub const RATE_LIMIT_PREFIX: &str = "rate_limit:";

    #[must_use]
    pub fn clubs(place_id: &str) -> String {
        format!("{CLUBS_PREFIX}{place_id}")
    }

    #[must_use]
    pub fn courts(club_id: i64) -> String {
        format!("{COURTS_PREFIX}{club_id}")
    }

    #[must_use]
    pub fn slots(club_id: i64, court_id: i64, date: NaiveDate) -> String {
        format!("{SLOTS_PREFIX}{club_id}:{court_id}:{}", date.format(DATE_FORMAT))
    }

    /// Every cached date for one court
    #[must_use]
    pub fn court_slots_pattern(club_id: i64, court_id: i64) -> String {
        format!("{SLOTS_PREFIX}{club_id}:{court_id}:*")
    }

    /// Every cached slot list for a club
    #[must_use]
    pub fn club_slots_pattern(club_id: i64) -> String {
        format!("{SLOTS_PREFIX}{club_id}:*")
    }

    #[must_use]
    pub fn rate_limit(identifier: &str) -> String {
        format!("{RATE_LIMIT_PREFIX}{identifier}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(datetime: &str) -> Slot {
        Slot {
            datetime: datetime.to_string(),
            price: 20.0,
            duration: 60,
            start: "10:00".to_string(),
            end: "11:00".to_string(),
        }
    }

    #[test]
    fn test_slot_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 1);
        assert_eq!(slot("2024-05-01T10:00:00Z").date(), expected);
        assert_eq!(slot("2024-05-01T23:30:00+02:00").date(), expected);
        assert_eq!(slot("2024-05-01T10:00:00").date(), expected);
        assert_eq!(slot("2024-05-01 10:00:00").date(), expected);
        assert_eq!(slot("2024-05-01").date(), expected);
        assert_eq!(slot("tomorrow").date(), None);
    }

    #[test]
    fn test_key_grammar() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
        assert_eq!(keys::clubs("place-1"), "clubs:place-1");
        assert_eq!(keys::courts(7), "courts:7");
        assert_eq!(keys::slots(7, 3, date), "slots:7:3:2024-01-09");
        assert_eq!(keys::court_slots_pattern(7, 3), "slots:7:3:*");
        assert_eq!(keys::club_slots_pattern(7), "slots:7:*");
        assert_eq!(keys::rate_limit("http-client"), "rate_limit:http-client");
    }

    #[test]
    fn test_club_attributes_round_trip_through_flatten() {
        let json = serde_json::json!({"id": 5, "name": "Padel Centre", "city": "Valencia"});
        let club: Club = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(club.id, 5);
        assert_eq!(club.attributes.get("city"), Some(&Value::from("Valencia")));
        assert_eq!(serde_json::to_value(&club).unwrap(), json);
    }
}
