use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{MetadataStore, StoreError};
use crate::models::{AudioArtifact, NewArtifact, Project};

#[derive(Default)]
struct State {
    next_project_id: i32,
    next_artifact_id: i32,
    projects: BTreeMap<i32, Project>,
    artifacts: BTreeMap<i32, AudioArtifact>,
    /// (project_id, artifact_id)
    links: BTreeSet<(i32, i32)>,
}

impl State {
    fn is_linked(&self, artifact_id: i32) -> bool {
        self.links.iter().any(|&(_, a)| a == artifact_id)
    }

    fn linked_to(&self, project_id: i32) -> impl Iterator<Item = &AudioArtifact> {
        self.links
            .iter()
            .filter(move |&&(p, _)| p == project_id)
            .filter_map(move |(_, a)| self.artifacts.get(a))
    }

    fn insert_artifact(&mut self, artifact: NewArtifact) -> Result<AudioArtifact, StoreError> {
        if self
            .artifacts
            .values()
            .any(|a| a.stored_name == artifact.stored_name)
        {
            return Err(StoreError::Conflict(format!(
                "stored name '{}' is taken",
                artifact.stored_name
            )));
        }
        self.next_artifact_id += 1;
        let row = AudioArtifact {
            id: self.next_artifact_id,
            logical_name: artifact.logical_name,
            stored_name: artifact.stored_name,
            path: artifact.path,
            duration_seconds: artifact.duration_seconds,
            generation: artifact.generation,
            created_at: Utc::now(),
        };
        self.artifacts.insert(row.id, row.clone());
        Ok(row)
    }
}

/// Metadata store held in process memory.
///
/// Writes can be made to fail on demand to exercise the engine's cleanup
/// paths.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    state: Mutex<State>,
    fail_inserts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `insert_linked` fail until reset.
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Makes `delete_linked` and `delete_project` fail until reset.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Inserts an artifact without linking it to any project.
    pub async fn insert_orphan(&self, artifact: NewArtifact) -> Result<AudioArtifact, StoreError> {
        self.state.lock().await.insert_artifact(artifact)
    }

    /// Number of artifact rows, linked or not.
    pub async fn artifact_count(&self) -> usize {
        self.state.lock().await.artifacts.len()
    }

    fn check(&self, flag: &AtomicBool, what: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{what} rejected")));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn create_project(&self, name: &str, owner_id: i32) -> Result<Project, StoreError> {
        let mut state = self.state.lock().await;
        state.next_project_id += 1;
        let project = Project {
            id: state.next_project_id,
            name: name.to_string(),
            owner_id,
            created_at: Utc::now(),
        };
        state.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn find_project(&self, project_id: i32) -> Result<Option<Project>, StoreError> {
        Ok(self.state.lock().await.projects.get(&project_id).cloned())
    }

    async fn list_projects(&self, owner_id: i32) -> Result<Vec<Project>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .projects
            .values()
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn delete_project(&self, project_id: i32) -> Result<(), StoreError> {
        self.check(&self.fail_deletes, "delete")?;
        let mut state = self.state.lock().await;
        if state.projects.remove(&project_id).is_none() {
            return Err(StoreError::NotFound(format!("project {project_id}")));
        }
        let linked: Vec<i32> = state
            .links
            .iter()
            .filter(|&&(p, _)| p == project_id)
            .map(|&(_, a)| a)
            .collect();
        state.links.retain(|&(p, _)| p != project_id);
        for id in linked {
            state.artifacts.remove(&id);
        }
        Ok(())
    }

    async fn lineage_versions(
        &self,
        project_id: i32,
        logical_name: &str,
    ) -> Result<Vec<AudioArtifact>, StoreError> {
        let state = self.state.lock().await;
        let mut versions: Vec<AudioArtifact> = state
            .linked_to(project_id)
            .filter(|a| a.logical_name == logical_name)
            .cloned()
            .collect();
        versions.sort_by(AudioArtifact::lineage_order);
        Ok(versions)
    }

    async fn project_artifacts(&self, project_id: i32) -> Result<Vec<AudioArtifact>, StoreError> {
        let state = self.state.lock().await;
        let mut artifacts: Vec<AudioArtifact> = state.linked_to(project_id).cloned().collect();
        artifacts.sort_by(|a, b| {
            a.logical_name
                .cmp(&b.logical_name)
                .then(AudioArtifact::lineage_order(a, b))
        });
        Ok(artifacts)
    }

    async fn find_by_stored_name(
        &self,
        project_id: i32,
        stored_name: &str,
    ) -> Result<Option<AudioArtifact>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .linked_to(project_id)
            .find(|a| a.stored_name == stored_name)
            .cloned())
    }

    async fn stored_name_exists(&self, stored_name: &str) -> Result<bool, StoreError> {
        let state = self.state.lock().await;
        Ok(state.artifacts.values().any(|a| a.stored_name == stored_name))
    }

    async fn insert_linked(
        &self,
        project_id: i32,
        artifact: NewArtifact,
    ) -> Result<AudioArtifact, StoreError> {
        self.check(&self.fail_inserts, "insert")?;
        let mut state = self.state.lock().await;
        if !state.projects.contains_key(&project_id) {
            return Err(StoreError::NotFound(format!("project {project_id}")));
        }
        let row = state.insert_artifact(artifact)?;
        state.links.insert((project_id, row.id));
        Ok(row)
    }

    async fn delete_linked(&self, project_id: i32, artifact_id: i32) -> Result<(), StoreError> {
        self.check(&self.fail_deletes, "delete")?;
        let mut state = self.state.lock().await;
        if !state.links.remove(&(project_id, artifact_id)) {
            return Err(StoreError::NotFound(format!(
                "artifact {artifact_id} in project {project_id}"
            )));
        }
        state.artifacts.remove(&artifact_id);
        Ok(())
    }

    async fn orphaned_artifacts(&self) -> Result<Vec<AudioArtifact>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .artifacts
            .values()
            .filter(|a| !state.is_linked(a.id))
            .cloned()
            .collect())
    }

    async fn delete_unlinked(&self, artifact_id: i32) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.is_linked(artifact_id) {
            return Err(StoreError::Conflict(format!(
                "artifact {artifact_id} is still linked"
            )));
        }
        state
            .artifacts
            .remove(&artifact_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("artifact {artifact_id}")))
    }
}
