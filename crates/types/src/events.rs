//! Event log entry types.
//!
//! Every successful mutation appends exactly one [`EventRecord`] to the
//! durable log. The log assigns each entry an [`EventId`] — the typed
//! form of the backing stream's native entry id — which is strictly
//! increasing across the whole stream and doubles as the resume cursor
//! for watchers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Kind of change an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Node was created.
    Created,
    /// Node fields changed.
    Updated,
    /// Node was removed; the event snapshot is the pre-deletion record.
    Deleted,
}

impl EventKind {
    /// Integer coding used in the persisted stream and on the wire.
    #[inline]
    pub const fn code(self) -> i32 {
        match self {
            EventKind::Created => 1,
            EventKind::Updated => 2,
            EventKind::Deleted => 3,
        }
    }

    /// Decodes the integer coding. Returns `None` for the unspecified
    /// sentinel (0) and unknown values.
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(EventKind::Created),
            2 => Some(EventKind::Updated),
            3 => Some(EventKind::Deleted),
            _ => None,
        }
    }

    /// Lowercase name for log lines.
    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Deleted => "deleted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed log entry id: `(millis, seq)` with lexicographic ordering.
///
/// Matches the backing stream's native id namespace — a wall-clock
/// milliseconds component plus a per-millisecond counter — so a cursor
/// handed to a client stays directly usable against the stream. The
/// in-memory backend synthesizes ids as `(0, n)`.
///
/// # Display
///
/// Formats as `millis-seq`, e.g. `1718051054739-0`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EventId {
    millis: u64,
    seq: u64,
}

impl EventId {
    /// Creates an id from its raw components.
    #[inline]
    pub const fn new(millis: u64, seq: u64) -> Self {
        Self { millis, seq }
    }

    /// Milliseconds component.
    #[inline]
    pub const fn millis(self) -> u64 {
        self.millis
    }

    /// Per-millisecond counter component.
    #[inline]
    pub const fn seq(self) -> u64 {
        self.seq
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.seq)
    }
}

/// Error parsing an [`EventId`] from its `millis-seq` string form.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(display("Invalid event id {input:?}: expected \"millis-seq\""))]
pub struct ParseEventIdError {
    /// The rejected input.
    pub input: String,
}

impl FromStr for EventId {
    type Err = ParseEventIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseEventIdError { input: s.to_string() };
        let (millis, seq) = s.split_once('-').ok_or_else(err)?;
        let millis = millis.parse::<u64>().map_err(|_| err())?;
        let seq = seq.parse::<u64>().map_err(|_| err())?;
        Ok(EventId { millis, seq })
    }
}

/// One durable log entry, as read back from the stream.
///
/// The stream stores only the node id, not a snapshot; consumers that
/// need the record re-fetch it by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Log-assigned sequence identifier.
    pub id: EventId,
    /// Kind of change.
    pub kind: EventKind,
    /// Id of the affected node.
    pub node_id: String,
    /// Field names changed by an update; empty for created/deleted.
    pub changed_fields: Vec<String>,
    /// Server clock at append time.
    pub ts: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn kind_codes_round_trip() {
        for k in [EventKind::Created, EventKind::Updated, EventKind::Deleted] {
            assert_eq!(EventKind::from_code(k.code()), Some(k));
        }
        assert_eq!(EventKind::from_code(0), None);
    }

    #[test]
    fn event_id_display_parse_round_trip() {
        let id = EventId::new(1_718_051_054_739, 7);
        assert_eq!(id.to_string(), "1718051054739-7");
        assert_eq!("1718051054739-7".parse::<EventId>().unwrap(), id);
    }

    #[test]
    fn event_id_rejects_malformed_input() {
        for input in ["", "12345", "a-b", "1-2-3", "-1", "1-"] {
            assert!(
                input.parse::<EventId>().is_err(),
                "{input:?} should not parse"
            );
        }
    }

    #[test]
    fn event_id_ordering_is_lexicographic_on_components() {
        let a = EventId::new(1, 9);
        let b = EventId::new(2, 0);
        let c = EventId::new(2, 1);
        assert!(a < b);
        assert!(b < c);

        // Numeric, not string, ordering within a component
        assert!(EventId::new(9, 0) < EventId::new(10, 0));
    }
}
