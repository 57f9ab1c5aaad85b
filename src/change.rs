//! Changes: one committed local update, and the packs that carry them.
//!
//! A `ChangeId` is also the document's logical clock. Each local update
//! takes `next()`; every ticket the update issues shares that lamport value
//! and is told apart by its delimiter. Applying a remote change folds the
//! remote clock in with `sync_clocks`.

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::crdt::op::Operation;
use crate::crdt::op::OperationInfo;
use crate::crdt::primitives::ActorId;
use crate::crdt::primitives::TimeTicket;
use crate::crdt::primitives::VersionVector;
use crate::crdt::root::CrdtRoot;
use crate::document::presence::PresenceChange;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeId {
    client_seq: u32,
    lamport: u64,
    actor: ActorId,
    version_vector: VersionVector,
}

impl ChangeId {
    /// The clock of a document that has done nothing yet.
    pub fn initial() -> ChangeId {
        return ChangeId::new(0, 0, ActorId::INITIAL, VersionVector::new());
    }

    pub fn new(client_seq: u32, lamport: u64, actor: ActorId, version_vector: VersionVector) -> ChangeId {
        return ChangeId {
            client_seq,
            lamport,
            actor,
            version_vector,
        };
    }

    pub fn client_seq(&self) -> u32 {
        return self.client_seq;
    }

    pub fn lamport(&self) -> u64 {
        return self.lamport;
    }

    pub fn actor(&self) -> ActorId {
        return self.actor;
    }

    pub fn version_vector(&self) -> &VersionVector {
        return &self.version_vector;
    }

    /// The id of the next local change.
    pub fn next(&self) -> ChangeId {
        let lamport = self.lamport + 1;
        let mut version_vector = self.version_vector.clone();
        version_vector.set(self.actor, lamport);
        return ChangeId::new(self.client_seq + 1, lamport, self.actor, version_vector);
    }

    /// Advance past a change seen from elsewhere.
    pub fn sync_clocks(&self, other: &ChangeId) -> ChangeId {
        let lamport = self.lamport.max(other.lamport) + 1;
        let mut version_vector = self.version_vector.max(&other.version_vector);
        version_vector.set(self.actor, lamport);
        return ChangeId::new(self.client_seq, lamport, self.actor, version_vector);
    }

    /// Catch up with a snapshot taken at `version_vector`.
    pub fn set_clocks(&self, version_vector: &VersionVector) -> ChangeId {
        let lamport = self.lamport.max(version_vector.max_lamport());
        let mut merged = self.version_vector.max(version_vector);
        merged.set(self.actor, lamport);
        return ChangeId::new(self.client_seq, lamport, self.actor, merged);
    }

    /// The same clock position, owned by `actor`.
    pub fn set_actor(&self, actor: ActorId) -> ChangeId {
        let mut version_vector = self.version_vector.clone();
        if let Some(lamport) = version_vector.get(&self.actor) {
            version_vector.unset(&self.actor);
            version_vector.update(actor, lamport);
        }
        return ChangeId::new(self.client_seq, self.lamport, actor, version_vector);
    }

    pub fn create_time_ticket(&self, delimiter: u32) -> TimeTicket {
        return TimeTicket::new(self.lamport, delimiter, self.actor);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Change {
    id: ChangeId,
    operations: Vec<Operation>,
    message: Option<String>,
    presence_change: Option<PresenceChange>,
}

impl Change {
    pub fn new(
        id: ChangeId,
        operations: Vec<Operation>,
        message: Option<String>,
        presence_change: Option<PresenceChange>,
    ) -> Change {
        return Change {
            id,
            operations,
            message,
            presence_change,
        };
    }

    pub fn id(&self) -> &ChangeId {
        return &self.id;
    }

    pub fn operations(&self) -> &[Operation] {
        return &self.operations;
    }

    pub fn message(&self) -> Option<&str> {
        return self.message.as_deref();
    }

    pub fn presence_change(&self) -> Option<&PresenceChange> {
        return self.presence_change.as_ref();
    }

    pub fn has_operations(&self) -> bool {
        return !self.operations.is_empty();
    }

    pub fn set_actor(&mut self, actor: ActorId) {
        for op in &mut self.operations {
            op.set_actor(actor);
        }
        self.id = self.id.set_actor(actor);
    }

    /// Replay every operation against `root`.
    ///
    /// An operation that cannot be applied is logged and skipped; the rest
    /// of the change still lands.
    pub fn execute(&self, root: &mut CrdtRoot) -> Vec<OperationInfo> {
        let mut infos = Vec::new();
        for op in &self.operations {
            let mut op = op.clone();
            match op.execute(root, Some(&self.id.version_vector)) {
                Ok(op_infos) => infos.extend(op_infos),
                Err(err) => {
                    warn!(
                        op = op.kind.name(),
                        executed_at = %op.executed_at,
                        actor = %self.id.actor,
                        error = %err,
                        "skipping operation that does not apply"
                    );
                }
            }
        }
        return infos;
    }
}

/// How far each side of a sync has acknowledged the other.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub server_seq: u64,
    pub client_seq: u32,
}

impl Checkpoint {
    pub const INITIAL: Checkpoint = Checkpoint {
        server_seq: 0,
        client_seq: 0,
    };

    pub fn new(server_seq: u64, client_seq: u32) -> Checkpoint {
        return Checkpoint { server_seq, client_seq };
    }

    pub fn increase_client_seq(&self, inc: u32) -> Checkpoint {
        return Checkpoint::new(self.server_seq, self.client_seq + inc);
    }

    /// Pointwise maximum.
    pub fn forward(&self, other: &Checkpoint) -> Checkpoint {
        return Checkpoint::new(
            self.server_seq.max(other.server_seq),
            self.client_seq.max(other.client_seq),
        );
    }
}

/// The unit exchanged with a peer or server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangePack {
    pub document_key: String,
    pub checkpoint: Checkpoint,
    pub changes: Vec<Change>,
    /// Serialized root replacing the receiver's, when the sender skipped
    /// sending history.
    pub snapshot: Option<Vec<u8>>,
    /// What every replica has seen; bounds garbage collection.
    pub version_vector: Option<VersionVector>,
    /// Older form of `version_vector`.
    pub min_synced_ticket: Option<TimeTicket>,
    pub is_removed: bool,
}

impl ChangePack {
    pub fn new(document_key: &str, checkpoint: Checkpoint, changes: Vec<Change>) -> ChangePack {
        return ChangePack {
            document_key: document_key.to_string(),
            checkpoint,
            changes,
            snapshot: None,
            version_vector: None,
            min_synced_ticket: None,
            is_removed: false,
        };
    }

    pub fn has_changes(&self) -> bool {
        return !self.changes.is_empty();
    }

    pub fn changes_len(&self) -> usize {
        return self.changes.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(who: u8) -> ActorId {
        let mut bytes = [0u8; 12];
        bytes[11] = who;
        return ActorId::new(bytes);
    }

    #[test]
    fn next_advances_the_clock() {
        let id = ChangeId::initial().set_actor(actor(1)).next();
        assert_eq!(id.client_seq(), 1);
        assert_eq!(id.lamport(), 1);
        assert_eq!(id.version_vector().get(&actor(1)), Some(1));
        assert_eq!(id.create_time_ticket(3), TimeTicket::new(1, 3, actor(1)));
    }

    #[test]
    fn sync_takes_the_max() {
        let mine = ChangeId::initial().set_actor(actor(1)).next();
        let theirs = ChangeId::initial().set_actor(actor(2)).next().next().next();
        let synced = mine.sync_clocks(&theirs);
        assert_eq!(synced.lamport(), 4);
        assert_eq!(synced.client_seq(), 1);
        assert_eq!(synced.version_vector().get(&actor(1)), Some(4));
        assert_eq!(synced.version_vector().get(&actor(2)), Some(3));
    }

    #[test]
    fn set_actor_moves_the_vector_entry() {
        let id = ChangeId::initial().next().set_actor(actor(5));
        assert_eq!(id.version_vector().get(&ActorId::INITIAL), None);
        assert_eq!(id.version_vector().get(&actor(5)), Some(1));
    }

    #[test]
    fn checkpoints() {
        let a = Checkpoint::new(3, 1);
        let b = Checkpoint::new(1, 4);
        assert_eq!(a.forward(&b), Checkpoint::new(3, 4));
        assert_eq!(a.increase_client_seq(2), Checkpoint::new(3, 3));
    }

    #[test]
    fn packs_serialize() {
        let pack = ChangePack::new("doc", Checkpoint::new(1, 2), Vec::new());
        let json = serde_json::to_string(&pack).unwrap();
        let parsed: ChangePack = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, pack);
        assert!(!parsed.has_changes());
    }
}
