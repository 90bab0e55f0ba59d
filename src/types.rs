//! Core types for the visibility layer.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A point in the global log: the (commit, prepare) position pair.
///
/// Total order is primarily by commit position; positions increase
/// monotonically across the log.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub commit: i64,
    pub prepare: i64,
}

impl Position {
    /// Beginning of the log.
    pub const START: Position = Position {
        commit: 0,
        prepare: 0,
    };

    pub fn new(commit: i64, prepare: i64) -> Self {
        Position { commit, prepare }
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        self.commit
            .cmp(&other.commit)
            .then(self.prepare.cmp(&other.prepare))
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C:{}/P:{}", self.commit, self.prepare)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C:{}/P:{}", self.commit, self.prepare)
    }
}

/// Opaque 16-byte event identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub [u8; 16]);

impl EventId {
    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(EventId(arr))
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// An immutable, committed event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventRecord {
    /// Stream the event belongs to.
    pub stream_id: String,

    /// Per-stream event number.
    pub event_number: i64,

    /// Unique event identifier.
    pub id: EventId,

    /// Application-defined type.
    pub event_type: String,

    /// Application-defined payload.
    pub data: Vec<u8>,

    /// Application-defined metadata.
    pub metadata: Vec<u8>,
}

/// An event record plus its position, with the link event resolved if the
/// original referenced one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolvedEvent {
    /// The resolved event (the link target, when a link was followed).
    pub event: EventRecord,

    /// Commit/prepare position of `event`.
    pub position: Position,

    /// The link event, when the original was a link.
    pub link: Option<EventRecord>,

    /// Commit/prepare position of `link`, when present.
    pub link_position: Option<Position>,
}

impl ResolvedEvent {
    /// A plain event with no link indirection.
    pub fn from_record(event: EventRecord, position: Position) -> Self {
        ResolvedEvent {
            event,
            position,
            link: None,
            link_position: None,
        }
    }

    /// The event as it appeared in the read: the link if one was followed,
    /// otherwise the event itself.
    pub fn original_event(&self) -> &EventRecord {
        self.link.as_ref().unwrap_or(&self.event)
    }

    /// Position of the original event. This is the ordering key for
    /// delivery and duplicate suppression.
    pub fn original_position(&self) -> Position {
        self.link_position.unwrap_or(self.position)
    }

    /// Per-stream number of the original event.
    pub fn original_event_number(&self) -> i64 {
        self.original_event().event_number
    }
}
