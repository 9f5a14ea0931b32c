//! Listening events: the behavioral telemetry the aggregator consumes

use super::track::TrackId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Kind of listening event
///
/// The instrumentation vocabulary is open-ended; kinds this engine does not
/// weight are carried as `Other` and ignored by the extractor rather than
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A track started playing
    PlayStart,
    /// A track survived its first ten seconds
    Play10s,
    /// The listener asked the radio for the next track
    RadioNext,
    /// The listener skipped the current track
    Skip,
    /// The listener liked the current track (reserved for future weighting)
    Like,
    /// Any other instrumentation kind
    #[serde(untagged)]
    Other(String),
}

impl EventType {
    /// Parse from the wire name; unknown names become `Other`
    pub fn parse(s: &str) -> Self {
        match s {
            "play_start" => Self::PlayStart,
            "play_10s" => Self::Play10s,
            "radio_next" => Self::RadioNext,
            "skip" => Self::Skip,
            "like" => Self::Like,
            other => Self::Other(other.to_string()),
        }
    }

    /// The wire name
    pub fn as_str(&self) -> &str {
        match self {
            Self::PlayStart => "play_start",
            Self::Play10s => "play_10s",
            Self::RadioNext => "radio_next",
            Self::Skip => "skip",
            Self::Like => "like",
            Self::Other(s) => s,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque event metadata: a tagged key/value map with defaulting accessors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventMeta(HashMap<String, serde_json::Value>);

impl EventMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key, builder-style
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Raw value lookup
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Milliseconds elapsed into the track when the event fired.
    /// Absent or non-numeric values read as 0.
    pub fn elapsed_ms(&self) -> i64 {
        self.0
            .get("elapsed_ms")
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One immutable listening event, as read from the append-only log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier (UUID)
    pub id: String,
    /// Listening session this event belongs to
    pub session_id: String,
    /// Track the event refers to
    pub track: TrackId,
    /// Kind of event
    pub event_type: EventType,
    /// When the event fired; non-decreasing across the log
    pub timestamp: DateTime<Utc>,
    /// Position in the log; strictly increasing, assigned by the log
    pub sequence: i64,
    /// Opaque instrumentation payload
    #[serde(default)]
    pub meta: EventMeta,
}

impl Event {
    /// Create a new event with a fresh id and the current time.
    /// The log assigns `sequence` on append; until then it is 0.
    pub fn new(
        session_id: impl Into<String>,
        track: impl Into<TrackId>,
        event_type: EventType,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            track: track.into(),
            event_type,
            timestamp: Utc::now(),
            sequence: 0,
            meta: EventMeta::new(),
        }
    }

    /// Attach metadata, builder-style
    pub fn with_meta(mut self, meta: EventMeta) -> Self {
        self.meta = meta;
        self
    }

    /// An event with no session or track id cannot be attributed and is
    /// skipped by the extractor.
    pub fn is_attributable(&self) -> bool {
        !self.session_id.is_empty() && !self.track.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_type_parses_known_and_unknown_kinds() {
        assert_eq!(EventType::parse("play_start"), EventType::PlayStart);
        assert_eq!(EventType::parse("radio_next"), EventType::RadioNext);
        assert_eq!(
            EventType::parse("scrubbed"),
            EventType::Other("scrubbed".to_string())
        );
        assert_eq!(EventType::parse("scrubbed").as_str(), "scrubbed");
    }

    #[test]
    fn event_type_round_trips_through_wire_name() {
        for name in ["play_start", "play_10s", "radio_next", "skip", "like"] {
            assert_eq!(EventType::parse(name).as_str(), name);
        }
    }

    #[test]
    fn meta_elapsed_ms_defaults_to_zero() {
        assert_eq!(EventMeta::new().elapsed_ms(), 0);
        let meta = EventMeta::new().with("elapsed_ms", json!("not a number"));
        assert_eq!(meta.elapsed_ms(), 0);
        let meta = EventMeta::new().with("elapsed_ms", 2000);
        assert_eq!(meta.elapsed_ms(), 2000);
    }

    #[test]
    fn attributable_requires_session_and_track() {
        let ok = Event::new("s1", "t1", EventType::PlayStart);
        assert!(ok.is_attributable());
        let no_session = Event::new("", "t1", EventType::PlayStart);
        assert!(!no_session.is_attributable());
        let no_track = Event::new("s1", "", EventType::PlayStart);
        assert!(!no_track.is_attributable());
    }
}
