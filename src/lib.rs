//! Tandem - a JSON document model that replicas edit concurrently and merge
//! without coordination.
//!
//! # Quick Start
//!
//! ```
//! use tandem::ActorId;
//! use tandem::Document;
//!
//! let mut alice = Document::new("doc");
//! alice.set_actor(ActorId::generate());
//! let mut bob = Document::new("doc");
//! bob.set_actor(ActorId::generate());
//!
//! alice
//!     .update(|root, _| {
//!         let mut text = root.set_new_text("body")?;
//!         text.edit(0, 0, "Hello")?;
//!         return Ok(());
//!     })
//!     .unwrap();
//!
//! // Ship alice's pending changes to bob.
//! bob.apply_change_pack(&alice.create_change_pack(false)).unwrap();
//! assert_eq!(bob.to_json(), alice.to_json());
//! ```
//!
//! # Layout
//!
//! - [`crdt`]: elements, the conflict-resolving containers and operations
//! - [`change`]: changes, checkpoints and the packs replicas exchange
//! - [`document`]: the update transaction, typed proxies, presence and undo
//! - [`config`]: per-document options and schema validation

pub mod change;
pub mod config;
pub mod crdt;
pub mod document;
mod error;

pub use change::Change;
pub use change::ChangePack;
pub use change::Checkpoint;
pub use config::DocumentOptions;
pub use config::SchemaValidator;
pub use crdt::primitive::Primitive;
pub use crdt::primitives::ActorId;
pub use crdt::primitives::TimeTicket;
pub use crdt::primitives::VersionVector;
pub use crdt::tree::TreeValue;
pub use document::Document;
pub use document::DocumentStatus;
pub use document::presence::Presence;
pub use document::value::Value;
pub use error::Error;
pub use error::Result;
