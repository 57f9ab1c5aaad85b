//! Document options and the schema validation hook.

use serde::Deserialize;
use serde::Serialize;

use crate::crdt::root::CrdtRoot;

/// Options fixed when a document is created.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentOptions {
    /// Turn `garbage_collect` into a no-op.
    pub disable_gc: bool,
    /// Upper bound on the live size of the document in bytes, `0` for none.
    ///
    /// Only local updates are checked.
    pub max_size_per_document: usize,
}

impl DocumentOptions {
    pub fn new() -> DocumentOptions {
        return DocumentOptions::default();
    }

    pub fn with_disable_gc(mut self, disable_gc: bool) -> DocumentOptions {
        self.disable_gc = disable_gc;
        return self;
    }

    pub fn with_max_size_per_document(mut self, max_size: usize) -> DocumentOptions {
        self.max_size_per_document = max_size;
        return self;
    }

    /// The size limit, if one is configured.
    pub fn size_limit(&self) -> Option<usize> {
        return match self.max_size_per_document {
            0 => None,
            limit => Some(limit),
        };
    }
}

/// Checks the root produced by a local update before it is committed.
///
/// Returning `Err` rolls the update back and surfaces the message as
/// `Error::SchemaViolation`.
pub trait SchemaValidator {
    fn validate(&self, root: &CrdtRoot) -> Result<(), String>;
}

impl<F> SchemaValidator for F
where
    F: Fn(&CrdtRoot) -> Result<(), String>,
{
    fn validate(&self, root: &CrdtRoot) -> Result<(), String> {
        return self(root);
    }
}
