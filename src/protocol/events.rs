use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    common::{
        Severity,
        errors::{LavaError, Result},
    },
    protocol::tracks::{Track, deserialize_event_track},
};

/// Why the node stopped a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackEndReason {
    #[serde(alias = "finished")]
    Finished,
    #[serde(alias = "loadFailed")]
    LoadFailed,
    #[serde(alias = "stopped")]
    Stopped,
    #[serde(alias = "replaced")]
    Replaced,
    #[serde(alias = "cleanup")]
    Cleanup,
}

impl TrackEndReason {
    /// Whether a queue owner should start the next track.
    pub fn may_start_next(self) -> bool {
        matches!(self, Self::Finished | Self::LoadFailed)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackException {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub cause: Option<String>,
}

impl TrackException {
    pub fn describe(&self) -> &str {
        self.message
            .as_deref()
            .or(self.cause.as_deref())
            .unwrap_or("unknown error")
    }
}

/// Event kinds the node reports under `op: "event"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    TrackStart,
    TrackEnd,
    TrackException,
    TrackStuck,
    WebSocketClosed,
}

impl EventType {
    /// Accepts `TrackEndEvent`, `TrackEnd` and `TRACK_END` spellings.
    pub fn parse(tag: &str) -> Option<Self> {
        let normalized: String = tag
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let name = normalized
            .strip_suffix("event")
            .unwrap_or(normalized.as_str());

        match name {
            "trackstart" => Some(Self::TrackStart),
            "trackend" => Some(Self::TrackEnd),
            "trackexception" => Some(Self::TrackException),
            "trackstuck" => Some(Self::TrackStuck),
            "websocketclosed" => Some(Self::WebSocketClosed),
            _ => None,
        }
    }
}

/// A decoded `op: "event"` payload.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackEvent {
    TrackStart {
        track: Option<Track>,
    },
    TrackEnd {
        track: Option<Track>,
        reason: TrackEndReason,
    },
    TrackException {
        track: Option<Track>,
        exception: TrackException,
    },
    TrackStuck {
        track: Option<Track>,
        threshold_ms: u64,
    },
    /// The node's own voice websocket to the platform closed.
    WebSocketClosed {
        code: u16,
        reason: String,
        by_remote: bool,
    },
}

#[derive(Deserialize)]
struct TrackOnly {
    #[serde(default, deserialize_with = "deserialize_event_track")]
    track: Option<Track>,
}

#[derive(Deserialize)]
struct TrackEndBody {
    #[serde(default, deserialize_with = "deserialize_event_track")]
    track: Option<Track>,
    reason: TrackEndReason,
}

#[derive(Deserialize)]
struct TrackExceptionBody {
    #[serde(default, deserialize_with = "deserialize_event_track")]
    track: Option<Track>,
    #[serde(default)]
    exception: Option<TrackException>,
    /// Older nodes send a bare message here instead of `exception`.
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackStuckBody {
    #[serde(default, deserialize_with = "deserialize_event_track")]
    track: Option<Track>,
    #[serde(default)]
    threshold_ms: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebSocketClosedBody {
    code: u16,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    by_remote: bool,
}

impl TrackEvent {
    /// Decodes the event body. `Ok(None)` for event types this client does
    /// not know about.
    pub fn from_json(kind: &str, body: Value) -> Result<Option<Self>> {
        let Some(event_type) = EventType::parse(kind) else {
            return Ok(None);
        };

        let event = match event_type {
            EventType::TrackStart => {
                let TrackOnly { track } = from_body::<TrackOnly>(body)?;
                Self::TrackStart { track }
            }
            EventType::TrackEnd => {
                let TrackEndBody { track, reason } = from_body::<TrackEndBody>(body)?;
                Self::TrackEnd { track, reason }
            }
            EventType::TrackException => {
                let TrackExceptionBody {
                    track,
                    exception,
                    error,
                } = from_body::<TrackExceptionBody>(body)?;
                let exception = exception.unwrap_or_else(|| TrackException {
                    message: error,
                    ..TrackException::default()
                });
                Self::TrackException { track, exception }
            }
            EventType::TrackStuck => {
                let TrackStuckBody {
                    track,
                    threshold_ms,
                } = from_body::<TrackStuckBody>(body)?;
                Self::TrackStuck {
                    track,
                    threshold_ms,
                }
            }
            EventType::WebSocketClosed => {
                let WebSocketClosedBody {
                    code,
                    reason,
                    by_remote,
                } = from_body::<WebSocketClosedBody>(body)?;
                Self::WebSocketClosed {
                    code,
                    reason,
                    by_remote,
                }
            }
        };

        Ok(Some(event))
    }

    pub fn event_type(&self) -> EventType {
        match self {
            Self::TrackStart { .. } => EventType::TrackStart,
            Self::TrackEnd { .. } => EventType::TrackEnd,
            Self::TrackException { .. } => EventType::TrackException,
            Self::TrackStuck { .. } => EventType::TrackStuck,
            Self::WebSocketClosed { .. } => EventType::WebSocketClosed,
        }
    }

    pub fn track(&self) -> Option<&Track> {
        match self {
            Self::TrackStart { track }
            | Self::TrackEnd { track, .. }
            | Self::TrackException { track, .. }
            | Self::TrackStuck { track, .. } => track.as_ref(),
            Self::WebSocketClosed { .. } => None,
        }
    }
}

fn from_body<T: serde::de::DeserializeOwned>(body: Value) -> Result<T> {
    serde_json::from_value(body).map_err(|e| LavaError::ProtocolParse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_type_spellings() {
        for tag in ["TrackEndEvent", "TrackEnd", "TRACK_END", "track_end"] {
            assert_eq!(EventType::parse(tag), Some(EventType::TrackEnd), "{tag}");
        }
        assert_eq!(
            EventType::parse("WebSocketClosedEvent"),
            Some(EventType::WebSocketClosed)
        );
        assert_eq!(EventType::parse("SegmentsLoaded"), None);
    }

    #[test]
    fn end_reason_spellings() {
        let upper: TrackEndReason = serde_json::from_value(json!("FINISHED")).unwrap();
        let camel: TrackEndReason = serde_json::from_value(json!("loadFailed")).unwrap();
        assert_eq!(upper, TrackEndReason::Finished);
        assert_eq!(camel, TrackEndReason::LoadFailed);
        assert!(upper.may_start_next());
        assert!(!TrackEndReason::Replaced.may_start_next());
    }

    #[test]
    fn legacy_exception_uses_error_field() {
        let event = TrackEvent::from_json(
            "TrackExceptionEvent",
            json!({ "track": "opaque", "error": "Video unavailable" }),
        )
        .unwrap()
        .unwrap();
        match event {
            TrackEvent::TrackException { track, exception } => {
                assert_eq!(track.map(|t| t.encoded).as_deref(), Some("opaque"));
                assert_eq!(exception.describe(), "Video unavailable");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn stuck_threshold_is_read() {
        let event = TrackEvent::from_json("TrackStuckEvent", json!({ "thresholdMs": 10000 }))
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            TrackEvent::TrackStuck {
                track: None,
                threshold_ms: 10000
            }
        );
    }

    #[test]
    fn unknown_event_type_is_not_an_error() {
        assert!(TrackEvent::from_json("PlayerPaused", json!({})).unwrap().is_none());
    }

    #[test]
    fn end_without_reason_is_malformed() {
        let err = TrackEvent::from_json("TrackEndEvent", json!({})).unwrap_err();
        assert!(matches!(err, LavaError::ProtocolParse(_)));
    }
}
