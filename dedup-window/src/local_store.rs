use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;

use super::Backend;
use super::Id;
use super::MembershipStore;
use super::StoreError;

/// An in-process membership set.
///
/// Backed by a sharded concurrent set. Check-and-insert happens under the lock of a
/// single shard, so callers with different ids rarely contend and callers with the
/// same id are serialised.
#[derive(Debug, Default)]
pub struct LocalStore {
    members: DashSet<Id>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `id`, returning `true` if it was not already a member.
    #[inline]
    pub fn insert(&self, id: Id) -> bool {
        self.members.insert(id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[async_trait]
impl MembershipStore for LocalStore {
    async fn try_add(&self, id: Id) -> Result<bool, StoreError> {
        Ok(self.insert(id))
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.len() as u64)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.members.clear();
        Ok(())
    }
}

/// Opens a new [`LocalStore`] for every window.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalBackend;

impl Backend for LocalBackend {
    fn open(&self, _window: u64) -> Arc<dyn MembershipStore> {
        Arc::new(LocalStore::new())
    }
}
