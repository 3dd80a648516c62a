use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use foodtrust_batch::Batch;
use foodtrust_core::{AggregateRoot, BatchId};

/// Memoized batch snapshots keyed by batch id.
///
/// Never authoritative: every entry must equal the fold of its batch's event
/// log, and any entry may be dropped and rebuilt at any time.
pub trait SnapshotCache: Send + Sync {
    fn get(&self, batch_id: &BatchId) -> Option<Batch>;
    fn put(&self, snapshot: Batch);
    fn invalidate(&self, batch_id: &BatchId);
    fn list(&self) -> Vec<Batch>;
    /// Drop every entry (rebuild support).
    fn clear(&self);
}

impl<S> SnapshotCache for Arc<S>
where
    S: SnapshotCache + ?Sized,
{
    fn get(&self, batch_id: &BatchId) -> Option<Batch> {
        (**self).get(batch_id)
    }

    fn put(&self, snapshot: Batch) {
        (**self).put(snapshot)
    }

    fn invalidate(&self, batch_id: &BatchId) {
        (**self).invalidate(batch_id)
    }

    fn list(&self) -> Vec<Batch> {
        (**self).list()
    }

    fn clear(&self) {
        (**self).clear()
    }
}

#[derive(Debug, Default)]
pub struct InMemorySnapshotCache {
    inner: RwLock<HashMap<BatchId, Batch>>,
}

impl InMemorySnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotCache for InMemorySnapshotCache {
    fn get(&self, batch_id: &BatchId) -> Option<Batch> {
        let map = self.inner.read().ok()?;
        map.get(batch_id).cloned()
    }

    /// Older versions never overwrite newer ones.
    fn put(&self, snapshot: Batch) {
        if let Ok(mut map) = self.inner.write() {
            let newer = map
                .get(snapshot.batch_id())
                .is_none_or(|existing| existing.version() <= snapshot.version());
            if newer {
                map.insert(snapshot.batch_id().clone(), snapshot);
            }
        }
    }

    fn invalidate(&self, batch_id: &BatchId) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(batch_id);
        }
    }

    fn list(&self) -> Vec<Batch> {
        match self.inner.read() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => vec![],
        }
    }

    fn clear(&self) {
        if let Ok(mut map) = self.inner.write() {
            map.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_invalidate() {
        let cache = InMemorySnapshotCache::new();
        let id = BatchId::parse("B1").unwrap();
        assert!(cache.get(&id).is_none());

        cache.put(Batch::empty(id.clone()));
        assert_eq!(cache.get(&id).map(|b| b.version()), Some(0));
        assert_eq!(cache.list().len(), 1);

        cache.invalidate(&id);
        assert!(cache.get(&id).is_none());
    }
}
