//! Reference registry
//!
//! Gives every object that leaves the worker by reference a stable integer id.
//! Keys are allocated per `register` call from a monotonically increasing
//! counter, never derived from the target, so registering one object twice
//! yields two entries. Entries live until an explicit `release`.

use std::collections::HashMap;

use super::exception::{Exception, Raised};
use super::object::ObjectRef;

/// One registry entry
pub struct Reference {
    pub id: u64,
    pub target: ObjectRef,
}

/// Owner of every object currently referenced by the client
pub struct Registry {
    entries: HashMap<u64, Reference>,
    next_id: u64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 1,
        }
    }

    /// Store `target` under a fresh id
    pub fn register(&mut self, target: ObjectRef) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        tracing::trace!(id, type_name = target.type_name(), "Registered reference");
        self.entries.insert(id, Reference { id, target });
        id
    }

    /// Look up the object behind `id`
    pub fn resolve(&self, id: u64) -> Raised<ObjectRef> {
        self.entries
            .get(&id)
            .map(|r| r.target.clone())
            .ok_or_else(|| Exception::unknown_reference(id))
    }

    /// Drop the entry for `id`; releasing an absent id is an error
    pub fn release(&mut self, id: u64) -> Raised<()> {
        match self.entries.remove(&id) {
            Some(reference) => {
                tracing::trace!(id = reference.id, "Released reference");
                Ok(())
            }
            None => Err(Exception::unknown_reference(id)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
