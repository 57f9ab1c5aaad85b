//! Per-actor presence: small string maps that ride along with changes.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    data: BTreeMap<String, String>,
    #[serde(skip)]
    cleared: bool,
}

impl Presence {
    pub fn new() -> Presence {
        return Presence::default();
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.cleared = false;
        self.data.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        return self.data.get(key).map(String::as_str);
    }

    /// Drop every entry. Peers forget this actor's presence.
    pub fn clear(&mut self) {
        self.data.clear();
        self.cleared = true;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        return self.data.iter().map(|(k, v)| (k.as_str(), v.as_str()));
    }

    pub fn is_empty(&self) -> bool {
        return self.data.is_empty();
    }

    /// What changed between `before` and `self`, if anything.
    pub(crate) fn change_since(&self, before: &Presence) -> Option<PresenceChange> {
        if self.cleared {
            return Some(PresenceChange::Clear);
        }
        if self.data == before.data {
            return None;
        }
        return Some(PresenceChange::Put(Presence {
            data: self.data.clone(),
            cleared: false,
        }));
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresenceChange {
    Put(Presence),
    Clear,
}
