//! Log event records and their ordering.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// One entry of an event log, as returned by the API.
///
/// Reference shape:
///
/// ```json
/// { "id": "evt-0193", "ts": 1700000000123, "category": "access",
///   "payload": { "user": "alice", "app": "wiki", "status": "200" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Server-assigned identifier. Numeric identifiers are kept as text.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    /// Event time in milliseconds since the Unix epoch.
    #[serde(rename = "ts")]
    pub timestamp: i64,

    /// Event category (e.g. `access`, `admin`).
    #[serde(default)]
    pub category: String,

    /// Free-form fields of the event.
    #[serde(default)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}

/// Delivery watermark: the newest timestamp delivered, plus the
/// identifiers already delivered at exactly that timestamp.
///
/// Only timestamps order events. Identifiers are opaque and compared for
/// equality, so events sharing a millisecond are told apart whatever
/// their identifiers look like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPosition {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    ids: BTreeSet<String>,
}

impl EventPosition {
    /// Position preceding every event stamped `timestamp` or later.
    pub fn floor(timestamp: i64) -> Self {
        EventPosition {
            timestamp,
            ids: BTreeSet::new(),
        }
    }

    /// Position covering event `id` at `timestamp` and everything older.
    pub fn at(timestamp: i64, id: impl Into<String>) -> Self {
        EventPosition {
            timestamp,
            ids: BTreeSet::from([id.into()]),
        }
    }

    /// Whether `event` is at or below this position: older than its
    /// timestamp, or one of the identifiers delivered at it.
    pub fn covers(&self, event: &LogEvent) -> bool {
        event.timestamp < self.timestamp
            || (event.timestamp == self.timestamp && self.ids.contains(&event.id))
    }

    /// Records `event` as delivered. A newer timestamp starts a fresh
    /// identifier set; an older one is ignored.
    pub fn advance(&mut self, event: &LogEvent) {
        if event.timestamp > self.timestamp {
            self.timestamp = event.timestamp;
            self.ids.clear();
        }
        if event.timestamp == self.timestamp {
            self.ids.insert(event.id.clone());
        }
    }

    /// Identifiers delivered at [`EventPosition::timestamp`].
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

impl fmt::Display for EventPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.timestamp)?;
        if !self.ids.is_empty() {
            let ids: Vec<&str> = self.ids().collect();
            write!(f, "/{}", ids.join("+"))?;
        }
        Ok(())
    }
}
