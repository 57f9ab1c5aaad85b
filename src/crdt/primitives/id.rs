//! Identifiers for replicas and logical timestamps.
//!
//! # Identifier Hierarchy
//!
//! - `ActorId`: identifies a replica (12 opaque bytes, shown as hex)
//! - `TimeTicket`: identifies an event (lamport, delimiter, actor)
//!
//! Tickets are totally ordered: lamport first, then delimiter, then actor.
//! Every element, text run and tree node is named by the ticket that
//! created it, so the order decides every tie in the document.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rand_core::OsRng;
use rand_core::RngCore;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use crate::Error;
use crate::Result;

/// Width of an actor id in bytes.
pub const ACTOR_ID_LEN: usize = 12;

/// Size of a ticket when accounting document size: lamport + delimiter + actor.
pub const TIME_TICKET_SIZE: usize = 8 + 4 + ACTOR_ID_LEN;

/// An opaque replica identifier.
///
/// Compared byte-wise, which matches the lexicographic order of the hex form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId([u8; ACTOR_ID_LEN]);

impl ActorId {
    /// Placeholder actor used before the replica learns its identity.
    pub const INITIAL: ActorId = ActorId([0; ACTOR_ID_LEN]);

    /// The greatest actor id, used by `TimeTicket::MAX`.
    pub const MAX: ActorId = ActorId([0xff; ACTOR_ID_LEN]);

    /// Create an actor id from raw bytes.
    pub const fn new(bytes: [u8; ACTOR_ID_LEN]) -> ActorId {
        return ActorId(bytes);
    }

    /// Generate a random actor id.
    pub fn generate() -> ActorId {
        let mut bytes = [0u8; ACTOR_ID_LEN];
        OsRng.fill_bytes(&mut bytes);
        return ActorId(bytes);
    }

    /// Parse an actor id from its 24 character hex form.
    pub fn from_hex(hex_str: &str) -> Result<ActorId> {
        let decoded = hex::decode(hex_str).map_err(|_| Error::InvalidActorId(hex_str.to_string()))?;
        let bytes: [u8; ACTOR_ID_LEN] = decoded
            .try_into()
            .map_err(|_| Error::InvalidActorId(hex_str.to_string()))?;
        return Ok(ActorId(bytes));
    }

    /// The hex form of this actor id.
    pub fn to_hex(&self) -> String {
        return hex::encode(self.0);
    }

    pub fn as_bytes(&self) -> &[u8; ACTOR_ID_LEN] {
        return &self.0;
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(&self.to_hex());
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "ActorId({})", self.to_hex());
    }
}

impl FromStr for ActorId {
    type Err = Error;

    fn from_str(s: &str) -> Result<ActorId> {
        return ActorId::from_hex(s);
    }
}

impl Serialize for ActorId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        return serializer.serialize_str(&self.to_hex());
    }
}

impl<'de> Deserialize<'de> for ActorId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<ActorId, D::Error> {
        let text = String::deserialize(deserializer)?;
        return ActorId::from_hex(&text).map_err(serde::de::Error::custom);
    }
}

/// A logical timestamp naming one event of one replica.
///
/// All tickets issued within one change share the change's lamport value
/// and are told apart by an increasing delimiter.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeTicket {
    lamport: u64,
    delimiter: u32,
    actor: ActorId,
}

impl TimeTicket {
    /// The smallest ticket. Names sentinel nodes such as list heads.
    pub const INITIAL: TimeTicket = TimeTicket {
        lamport: 0,
        delimiter: 0,
        actor: ActorId::INITIAL,
    };

    /// The greatest ticket.
    pub const MAX: TimeTicket = TimeTicket {
        lamport: u64::MAX,
        delimiter: u32::MAX,
        actor: ActorId::MAX,
    };

    pub const fn new(lamport: u64, delimiter: u32, actor: ActorId) -> TimeTicket {
        return TimeTicket { lamport, delimiter, actor };
    }

    #[inline]
    pub fn lamport(&self) -> u64 {
        return self.lamport;
    }

    #[inline]
    pub fn delimiter(&self) -> u32 {
        return self.delimiter;
    }

    #[inline]
    pub fn actor(&self) -> ActorId {
        return self.actor;
    }

    /// True when this ticket is strictly greater than `other`.
    #[inline]
    pub fn after(&self, other: &TimeTicket) -> bool {
        return self > other;
    }

    /// Copy of this ticket with the actor replaced.
    pub fn with_actor(&self, actor: ActorId) -> TimeTicket {
        return TimeTicket { actor, ..*self };
    }

    /// Compact string form `lamport:actor:delimiter`.
    pub fn to_id_string(&self) -> String {
        return format!("{}:{}:{}", self.lamport, self.actor, self.delimiter);
    }

    /// Parse the form produced by `to_id_string`.
    pub fn parse(text: &str) -> Result<TimeTicket> {
        let invalid = || Error::InvalidTicket(text.to_string());
        let mut parts = text.split(':');
        let lamport = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let actor = parts.next().ok_or_else(invalid).and_then(|p| ActorId::from_hex(p).map_err(|_| invalid()))?;
        let delimiter = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        return Ok(TimeTicket { lamport, delimiter, actor });
    }
}

impl PartialOrd for TimeTicket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        return Some(self.cmp(other));
    }
}

impl Ord for TimeTicket {
    fn cmp(&self, other: &Self) -> Ordering {
        return self
            .lamport
            .cmp(&other.lamport)
            .then(self.delimiter.cmp(&other.delimiter))
            .then(self.actor.cmp(&other.actor));
    }
}

impl fmt::Debug for TimeTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "{}:{}:{}", self.lamport, &self.actor.to_hex()[20..], self.delimiter);
    }
}

impl fmt::Display for TimeTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(&self.to_id_string());
    }
}

impl Serialize for TimeTicket {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        return serializer.serialize_str(&self.to_id_string());
    }
}

impl<'de> Deserialize<'de> for TimeTicket {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<TimeTicket, D::Error> {
        let text = String::deserialize(deserializer)?;
        return TimeTicket::parse(&text).map_err(serde::de::Error::custom);
    }
}
