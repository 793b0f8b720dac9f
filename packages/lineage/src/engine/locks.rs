use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{
    Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock,
};

/// Identity of one lineage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineageKey {
    pub project_id: i32,
    pub logical_name: String,
}

impl LineageKey {
    pub fn new(project_id: i32, logical_name: impl Into<String>) -> Self {
        Self {
            project_id,
            logical_name: logical_name.into(),
        }
    }
}

/// Held critical sections; released on drop.
///
/// Dropping the guard also removes the table entries nobody else holds or
/// waits on.
#[must_use]
pub struct LineageGuard {
    locks: LineageLocks,
    exclusive: Option<(i32, OwnedRwLockWriteGuard<()>)>,
    shared: Vec<(i32, OwnedRwLockReadGuard<()>)>,
    lineages: Vec<(LineageKey, OwnedMutexGuard<()>)>,
}

impl LineageGuard {
    fn new(locks: &LineageLocks) -> Self {
        Self {
            locks: locks.clone(),
            exclusive: None,
            shared: Vec::new(),
            lineages: Vec::new(),
        }
    }
}

impl Drop for LineageGuard {
    fn drop(&mut self) {
        for (key, held) in self.lineages.drain(..) {
            drop(held);
            self.locks
                .lineages
                .remove_if(&key, |_, slot| Arc::strong_count(slot) == 1);
        }
        let mut released: Vec<i32> = Vec::with_capacity(self.shared.len() + 1);
        for (project_id, held) in self.shared.drain(..) {
            drop(held);
            released.push(project_id);
        }
        if let Some((project_id, held)) = self.exclusive.take() {
            drop(held);
            released.push(project_id);
        }
        for project_id in released {
            self.locks
                .projects
                .remove_if(&project_id, |_, slot| Arc::strong_count(slot) == 1);
        }
    }
}

/// In-process locks per project and per lineage.
///
/// Lineage operations hold their project shared and each touched lineage
/// exclusively. Project deletion holds the project exclusively, which
/// excludes every lineage operation in it, including uploads of new names.
/// Entries are created on demand and removed when the last guard using them
/// drops.
#[derive(Clone, Default)]
pub struct LineageLocks {
    projects: Arc<DashMap<i32, Arc<RwLock<()>>>>,
    lineages: Arc<DashMap<LineageKey, Arc<Mutex<()>>>>,
}

impl LineageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn project_slot(&self, project_id: i32) -> Arc<RwLock<()>> {
        self.projects.entry(project_id).or_default().clone()
    }

    fn lineage_slot(&self, key: &LineageKey) -> Arc<Mutex<()>> {
        self.lineages.entry(key.clone()).or_default().clone()
    }

    pub async fn acquire(&self, key: LineageKey) -> LineageGuard {
        self.acquire_many(vec![key]).await
    }

    /// Locks every key, always in sorted order, so callers taking
    /// overlapping sets cannot deadlock. Duplicates are locked once. The
    /// projects of the keys are held shared before any lineage is locked.
    pub async fn acquire_many(&self, mut keys: Vec<LineageKey>) -> LineageGuard {
        keys.sort();
        keys.dedup();

        let mut project_ids: Vec<i32> = keys.iter().map(|k| k.project_id).collect();
        project_ids.dedup();

        let mut guard = LineageGuard::new(self);
        for project_id in project_ids {
            let held = self.project_slot(project_id).read_owned().await;
            guard.shared.push((project_id, held));
        }
        for key in keys {
            let held = self.lineage_slot(&key).lock_owned().await;
            guard.lineages.push((key, held));
        }
        guard
    }

    /// Holds the whole project, waiting for every lineage operation in it to
    /// finish first.
    pub async fn acquire_project(&self, project_id: i32) -> LineageGuard {
        let mut guard = LineageGuard::new(self);
        guard.exclusive = Some((project_id, self.project_slot(project_id).write_owned().await));
        guard
    }

    /// Number of projects and lineages with a live entry.
    pub fn len(&self) -> usize {
        self.projects.len() + self.lineages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty() && self.lineages.is_empty()
    }
}
