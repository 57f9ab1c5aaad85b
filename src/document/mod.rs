//! The document: one replica of a shared JSON tree.
//!
//! Local edits go through [`Document::update`], which runs a closure
//! against a working copy of the root and commits the result as one
//! [`Change`]. Remote edits arrive in a [`ChangePack`] and are replayed with
//! [`Document::apply_change_pack`]. Both paths are the only writers of the
//! root.
//!
//! ```
//! use tandem::Document;
//!
//! let mut doc = Document::new("notes");
//! doc.update(|root, _| {
//!     root.set("title", "draft")?;
//!     let mut tags = root.set_new_array("tags")?;
//!     tags.push("crdt")?;
//!     return Ok(());
//! })
//! .unwrap();
//! assert_eq!(doc.to_json(), r#"{"tags":["crdt"],"title":"draft"}"#);
//! ```

pub mod context;
pub mod history;
pub mod json;
pub mod presence;
pub mod value;

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::Error;
use crate::Result;
use crate::change::Change;
use crate::change::ChangeId;
use crate::change::ChangePack;
use crate::change::Checkpoint;
use crate::config::DocumentOptions;
use crate::config::SchemaValidator;
use crate::crdt::primitives::ActorId;
use crate::crdt::primitives::GcBoundary;
use crate::crdt::primitives::TimeTicket;
use crate::crdt::primitives::VersionVector;
use crate::crdt::root::CrdtRoot;
use crate::crdt::size::DocSize;
use crate::document::context::ChangeContext;
use crate::document::history::History;
use crate::document::history::Reverse;
use crate::document::json::JsonObject;
use crate::document::presence::Presence;
use crate::document::presence::PresenceChange;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    /// Not yet attached to any peer; the actor may still be unknown.
    Detached,
    Attached,
    /// Removed elsewhere. Local updates fail.
    Removed,
}

/// What travels in `ChangePack::snapshot`.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    root: CrdtRoot,
    version_vector: VersionVector,
    #[serde(default)]
    presences: BTreeMap<ActorId, Presence>,
}

/// Where the reversals of a committed change go.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Commit {
    Local,
    Undo,
    Redo,
}

pub struct Document {
    key: String,
    status: DocumentStatus,
    options: DocumentOptions,
    root: CrdtRoot,
    change_id: ChangeId,
    checkpoint: Checkpoint,
    local_changes: Vec<Change>,
    presences: BTreeMap<ActorId, Presence>,
    history: History,
    validator: Option<Box<dyn SchemaValidator>>,
}

impl Document {
    pub fn new(key: &str) -> Document {
        return Document::with_options(key, DocumentOptions::default());
    }

    pub fn with_options(key: &str, options: DocumentOptions) -> Document {
        return Document {
            key: key.to_string(),
            status: DocumentStatus::Detached,
            options,
            root: CrdtRoot::new(),
            change_id: ChangeId::initial(),
            checkpoint: Checkpoint::INITIAL,
            local_changes: Vec::new(),
            presences: BTreeMap::new(),
            history: History::new(),
            validator: None,
        };
    }

    pub fn key(&self) -> &str {
        return &self.key;
    }

    pub fn status(&self) -> DocumentStatus {
        return self.status;
    }

    pub fn set_status(&mut self, status: DocumentStatus) {
        self.status = status;
    }

    pub fn options(&self) -> &DocumentOptions {
        return &self.options;
    }

    pub fn actor(&self) -> ActorId {
        return self.change_id.actor();
    }

    pub fn change_id(&self) -> &ChangeId {
        return &self.change_id;
    }

    pub fn version_vector(&self) -> &VersionVector {
        return self.change_id.version_vector();
    }

    pub fn checkpoint(&self) -> Checkpoint {
        return self.checkpoint;
    }

    /// Changes committed here that no peer has acknowledged.
    pub fn local_changes(&self) -> &[Change] {
        return &self.local_changes;
    }

    pub fn has_local_changes(&self) -> bool {
        return !self.local_changes.is_empty();
    }

    pub fn root(&self) -> &CrdtRoot {
        return &self.root;
    }

    pub fn set_validator(&mut self, validator: impl SchemaValidator + 'static) {
        self.validator = Some(Box::new(validator));
    }

    // ---- Local updates ----

    /// Run `updater` as one transaction.
    ///
    /// Returns the committed change, or `None` when the closure changed
    /// nothing. On any error the document is left untouched.
    pub fn update<F>(&mut self, updater: F) -> Result<Option<Change>>
    where
        F: FnOnce(&mut JsonObject<'_>, &mut Presence) -> Result<()>,
    {
        return self.update_with_message(None, updater);
    }

    pub fn update_with_message<F>(&mut self, message: Option<&str>, updater: F) -> Result<Option<Change>>
    where
        F: FnOnce(&mut JsonObject<'_>, &mut Presence) -> Result<()>,
    {
        return self.transact(message, Commit::Local, |ctx, presence| {
            let root_id = ctx.root().root_created_at();
            let mut root = JsonObject::new(ctx, root_id);
            return updater(&mut root, presence);
        });
    }

    pub fn can_undo(&self) -> bool {
        return self.history.can_undo();
    }

    pub fn can_redo(&self) -> bool {
        return self.history.can_redo();
    }

    /// Reverse the most recent local change still on the undo stack.
    pub fn undo(&mut self) -> Result<Option<Change>> {
        let entry = self.history.pop_undo().ok_or(Error::EmptyHistory("undo"))?;
        return self.replay_history(entry, Commit::Undo);
    }

    pub fn redo(&mut self) -> Result<Option<Change>> {
        let entry = self.history.pop_redo().ok_or(Error::EmptyHistory("redo"))?;
        return self.replay_history(entry, Commit::Redo);
    }

    fn replay_history(&mut self, entry: Vec<Reverse>, mode: Commit) -> Result<Option<Change>> {
        let result = self.transact(None, mode, |ctx, _| ctx.apply_reverses(&entry));
        if result.is_err() {
            // Nothing was committed; keep the entry where it was.
            match mode {
                Commit::Undo => self.history.push_undo(entry),
                Commit::Redo => self.history.push_redo(entry),
                Commit::Local => {}
            }
        }
        return result;
    }

    fn transact<F>(&mut self, message: Option<&str>, mode: Commit, body: F) -> Result<Option<Change>>
    where
        F: FnOnce(&mut ChangeContext, &mut Presence) -> Result<()>,
    {
        if self.status == DocumentStatus::Removed {
            return Err(Error::DocumentRemoved);
        }

        let mut ctx = ChangeContext::new(self.change_id.next(), self.root.deep_copy());
        let before = self.my_presence();
        let mut presence = before.clone();
        body(&mut ctx, &mut presence)?;

        let presence_change = presence.change_since(&before);
        if !ctx.has_operations() && presence_change.is_none() {
            return Ok(None);
        }

        if let Some(limit) = self.options.size_limit() {
            let size = ctx.root().doc_size().live.total();
            if size > limit {
                return Err(Error::DocumentSizeExceeded { size, limit });
            }
        }
        if let Some(validator) = &self.validator {
            validator.validate(ctx.root()).map_err(Error::SchemaViolation)?;
        }

        let (id, root, operations, reverses) = ctx.into_parts();
        let change = Change::new(
            id.clone(),
            operations,
            message.map(str::to_string),
            presence_change,
        );
        self.root = root;
        self.change_id = id;
        if let Some(presence_change) = change.presence_change() {
            self.apply_presence(self.change_id.actor(), presence_change);
        }
        match mode {
            Commit::Local => {
                self.history.push_undo(reverses);
                self.history.clear_redo();
            }
            Commit::Undo => self.history.push_redo(reverses),
            Commit::Redo => self.history.push_undo(reverses),
        }

        debug!(
            key = %self.key,
            lamport = change.id().lamport(),
            ops = change.operations().len(),
            "committed local change"
        );
        self.local_changes.push(change.clone());
        return Ok(Some(change));
    }

    // ---- Sync ----

    /// Replay changes from other actors, in causal order. A change the
    /// version vector already covers, including our own, is skipped.
    pub fn apply_changes(&mut self, changes: &[Change]) {
        for change in changes {
            let seen = self.change_id.version_vector().get(&change.id().actor());
            if seen.is_some_and(|lamport| lamport >= change.id().lamport()) {
                continue;
            }
            let infos = change.execute(&mut self.root);
            self.change_id = self.change_id.sync_clocks(change.id());
            if let Some(presence_change) = change.presence_change() {
                self.apply_presence(change.id().actor(), presence_change);
            }
            debug!(
                key = %self.key,
                actor = %change.id().actor(),
                lamport = change.id().lamport(),
                infos = infos.len(),
                "applied remote change"
            );
        }
    }

    /// Apply what a peer sent: its changes or a snapshot, then its view of
    /// what has been acknowledged and what every replica has seen.
    pub fn apply_change_pack(&mut self, pack: &ChangePack) -> Result<()> {
        match &pack.snapshot {
            Some(bytes) => self.apply_snapshot(bytes, pack.checkpoint.client_seq)?,
            None => self.apply_changes(&pack.changes),
        }

        self.local_changes
            .retain(|change| change.id().client_seq() > pack.checkpoint.client_seq);
        self.checkpoint = self.checkpoint.forward(&pack.checkpoint);

        if let Some(version_vector) = &pack.version_vector {
            self.garbage_collect(version_vector);
        } else if let Some(min_synced) = &pack.min_synced_ticket {
            self.garbage_collect(min_synced);
        }

        if pack.is_removed {
            self.status = DocumentStatus::Removed;
        }
        return Ok(());
    }

    fn apply_snapshot(&mut self, bytes: &[u8], client_seq: u32) -> Result<()> {
        let snapshot: Snapshot = serde_json::from_slice(bytes)?;
        self.root = snapshot.root;
        self.presences = snapshot.presences;
        self.change_id = self.change_id.set_clocks(&snapshot.version_vector);

        // Pending changes the snapshot does not contain go back on top.
        self.local_changes.retain(|change| change.id().client_seq() > client_seq);
        for change in &self.local_changes {
            change.execute(&mut self.root);
        }
        debug!(
            key = %self.key,
            elements = self.root.element_count(),
            pending = self.local_changes.len(),
            "applied snapshot"
        );
        return Ok(());
    }

    /// Serialize the current state for `ChangePack::snapshot`.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let snapshot = Snapshot {
            root: self.root.deep_copy(),
            version_vector: self.change_id.version_vector().clone(),
            presences: self.presences.clone(),
        };
        return Ok(serde_json::to_vec(&snapshot)?);
    }

    /// Everything not yet acknowledged, ready to send.
    pub fn create_change_pack(&self, force_remove: bool) -> ChangePack {
        let checkpoint = self
            .checkpoint
            .increase_client_seq(self.local_changes.len() as u32);
        let mut pack = ChangePack::new(&self.key, checkpoint, self.local_changes.clone());
        pack.version_vector = Some(self.change_id.version_vector().clone());
        pack.is_removed = force_remove;
        return pack;
    }

    /// Adopt the actor id assigned on attach. Pending changes are rebound
    /// to it.
    pub fn set_actor(&mut self, actor: ActorId) {
        let previous = self.change_id.actor();
        for change in &mut self.local_changes {
            change.set_actor(actor);
        }
        self.change_id = self.change_id.set_actor(actor);

        // Nothing has been shared yet, so the root can be rebuilt with the
        // new tickets.
        if self.checkpoint == Checkpoint::INITIAL {
            let mut root = CrdtRoot::new();
            for change in &self.local_changes {
                change.execute(&mut root);
            }
            self.root = root;
            self.history.clear();
        }

        if let Some(presence) = self.presences.remove(&previous) {
            self.presences.insert(actor, presence);
        }
    }

    // ---- Presence ----

    fn apply_presence(&mut self, actor: ActorId, change: &PresenceChange) {
        match change {
            PresenceChange::Put(presence) => {
                self.presences.insert(actor, presence.clone());
            }
            PresenceChange::Clear => {
                self.presences.remove(&actor);
            }
        }
    }

    fn my_presence(&self) -> Presence {
        return self.presences.get(&self.change_id.actor()).cloned().unwrap_or_default();
    }

    pub fn presence(&self, actor: &ActorId) -> Option<&Presence> {
        return self.presences.get(actor);
    }

    pub fn presences(&self) -> &BTreeMap<ActorId, Presence> {
        return &self.presences;
    }

    // ---- Garbage collection ----

    /// Purge tombstones every replica has seen. A no-op returning `0` when
    /// collection is disabled.
    pub fn garbage_collect(&mut self, boundary: &dyn GcBoundary) -> usize {
        if self.options.disable_gc {
            return 0;
        }
        let collected = self.root.garbage_collect(boundary);
        debug!(key = %self.key, collected, "garbage collected");
        return collected;
    }

    pub fn garbage_length(&self) -> usize {
        return self.root.garbage_length();
    }

    pub fn doc_size(&self) -> DocSize {
        return self.root.doc_size();
    }

    // ---- Reads ----

    pub fn to_json(&self) -> String {
        return self.root.to_json();
    }

    pub fn to_json_value(&self) -> JsonValue {
        return self.root.to_json_value();
    }

    /// Look up a live element by a path like `$.a.0.b`.
    pub fn get_value_by_path(&self, path: &str) -> Option<JsonValue> {
        let created_at: TimeTicket = self.root.find_by_path(path).ok()?;
        if self.root.is_garbage(&created_at) {
            return None;
        }
        return Some(self.root.element_json(&created_at));
    }
}
