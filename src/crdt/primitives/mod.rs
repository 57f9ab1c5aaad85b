//! Identifiers and clocks shared by every CRDT in the document.
//!
//! ## IDs
//! - `ActorId`: replica identifier
//! - `TimeTicket`: totally ordered logical timestamp
//!
//! ## Clocks
//! - `VersionVector`: per-actor lamport high-water marks
//! - `GcBoundary`: what every replica has seen, for purging tombstones
//!
//! The lamport counter itself lives in `change::ChangeId`, which owns the
//! per-document clock.

pub mod clock;
pub mod id;

pub use clock::GcBoundary;
pub use clock::VersionVector;
pub use id::ACTOR_ID_LEN;
pub use id::ActorId;
pub use id::TIME_TICKET_SIZE;
pub use id::TimeTicket;
