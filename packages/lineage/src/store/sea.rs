use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Query as SeaQuery;
use sea_orm::*;
use tracing::instrument;

use super::{MetadataStore, StoreError};
use crate::entity::{audio_artifact, project, project_artifact};
use crate::models::{AudioArtifact, NewArtifact, Project};

impl From<audio_artifact::Model> for AudioArtifact {
    fn from(m: audio_artifact::Model) -> Self {
        Self {
            id: m.id,
            logical_name: m.logical_name,
            stored_name: m.stored_name,
            path: m.path,
            duration_seconds: m.duration_seconds,
            generation: m.generation,
            created_at: m.created_at,
        }
    }
}

impl From<project::Model> for Project {
    fn from(m: project::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            owner_id: m.owner_id,
            created_at: m.created_at,
        }
    }
}

fn linked_ids(project_id: i32) -> sea_orm::sea_query::SelectStatement {
    SeaQuery::select()
        .column(project_artifact::Column::ArtifactId)
        .from(project_artifact::Entity)
        .and_where(project_artifact::Column::ProjectId.eq(project_id))
        .to_owned()
}

fn in_lineage_order(select: Select<audio_artifact::Entity>) -> Select<audio_artifact::Entity> {
    select
        .order_by_asc(audio_artifact::Column::Generation)
        .order_by_asc(audio_artifact::Column::CreatedAt)
        .order_by_asc(audio_artifact::Column::Id)
}

fn into_store_error(err: DbErr) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => StoreError::Conflict(detail),
        _ => StoreError::Db(err),
    }
}

/// Metadata store backed by a relational database.
#[derive(Clone)]
pub struct SeaOrmMetadataStore {
    db: DatabaseConnection,
}

impl SeaOrmMetadataStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl MetadataStore for SeaOrmMetadataStore {
    #[instrument(skip(self))]
    async fn create_project(&self, name: &str, owner_id: i32) -> Result<Project, StoreError> {
        let model = project::ActiveModel {
            name: Set(name.to_string()),
            owner_id: Set(owner_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(model.into())
    }

    async fn find_project(&self, project_id: i32) -> Result<Option<Project>, StoreError> {
        Ok(project::Entity::find_by_id(project_id)
            .one(&self.db)
            .await?
            .map(Into::into))
    }

    async fn list_projects(&self, owner_id: i32) -> Result<Vec<Project>, StoreError> {
        let models = project::Entity::find()
            .filter(project::Column::OwnerId.eq(owner_id))
            .order_by_asc(project::Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn delete_project(&self, project_id: i32) -> Result<(), StoreError> {
        let txn = self.db.begin().await?;

        let artifact_ids: Vec<i32> = project_artifact::Entity::find()
            .filter(project_artifact::Column::ProjectId.eq(project_id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|link| link.artifact_id)
            .collect();

        project_artifact::Entity::delete_many()
            .filter(project_artifact::Column::ProjectId.eq(project_id))
            .exec(&txn)
            .await?;
        if !artifact_ids.is_empty() {
            audio_artifact::Entity::delete_many()
                .filter(audio_artifact::Column::Id.is_in(artifact_ids))
                .exec(&txn)
                .await?;
        }
        let result = project::Entity::delete_by_id(project_id).exec(&txn).await?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(format!("project {project_id}")));
        }

        txn.commit().await?;
        Ok(())
    }

    async fn lineage_versions(
        &self,
        project_id: i32,
        logical_name: &str,
    ) -> Result<Vec<AudioArtifact>, StoreError> {
        let rows = in_lineage_order(
            audio_artifact::Entity::find()
                .filter(audio_artifact::Column::LogicalName.eq(logical_name))
                .filter(audio_artifact::Column::Id.in_subquery(linked_ids(project_id))),
        )
        .all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn project_artifacts(&self, project_id: i32) -> Result<Vec<AudioArtifact>, StoreError> {
        let rows = in_lineage_order(
            audio_artifact::Entity::find()
                .filter(audio_artifact::Column::Id.in_subquery(linked_ids(project_id)))
                .order_by_asc(audio_artifact::Column::LogicalName),
        )
        .all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_by_stored_name(
        &self,
        project_id: i32,
        stored_name: &str,
    ) -> Result<Option<AudioArtifact>, StoreError> {
        Ok(audio_artifact::Entity::find()
            .filter(audio_artifact::Column::StoredName.eq(stored_name))
            .filter(audio_artifact::Column::Id.in_subquery(linked_ids(project_id)))
            .one(&self.db)
            .await?
            .map(Into::into))
    }

    async fn stored_name_exists(&self, stored_name: &str) -> Result<bool, StoreError> {
        let count = audio_artifact::Entity::find()
            .filter(audio_artifact::Column::StoredName.eq(stored_name))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    #[instrument(skip(self, artifact), fields(stored_name = %artifact.stored_name))]
    async fn insert_linked(
        &self,
        project_id: i32,
        artifact: NewArtifact,
    ) -> Result<AudioArtifact, StoreError> {
        let txn = self.db.begin().await?;

        if project::Entity::find_by_id(project_id)
            .one(&txn)
            .await?
            .is_none()
        {
            return Err(StoreError::NotFound(format!("project {project_id}")));
        }

        let model = audio_artifact::ActiveModel {
            logical_name: Set(artifact.logical_name),
            stored_name: Set(artifact.stored_name),
            path: Set(artifact.path),
            duration_seconds: Set(artifact.duration_seconds),
            generation: Set(artifact.generation),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(into_store_error)?;

        project_artifact::ActiveModel {
            project_id: Set(project_id),
            artifact_id: Set(model.id),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok(model.into())
    }

    #[instrument(skip(self))]
    async fn delete_linked(&self, project_id: i32, artifact_id: i32) -> Result<(), StoreError> {
        let txn = self.db.begin().await?;

        let unlinked = project_artifact::Entity::delete_by_id((project_id, artifact_id))
            .exec(&txn)
            .await?;
        if unlinked.rows_affected == 0 {
            return Err(StoreError::NotFound(format!(
                "artifact {artifact_id} in project {project_id}"
            )));
        }
        audio_artifact::Entity::delete_by_id(artifact_id)
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(())
    }

    async fn orphaned_artifacts(&self) -> Result<Vec<AudioArtifact>, StoreError> {
        let rows = audio_artifact::Entity::find()
            .filter(
                audio_artifact::Column::Id.not_in_subquery(
                    SeaQuery::select()
                        .column(project_artifact::Column::ArtifactId)
                        .from(project_artifact::Entity)
                        .to_owned(),
                ),
            )
            .order_by_asc(audio_artifact::Column::Id)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_unlinked(&self, artifact_id: i32) -> Result<(), StoreError> {
        let txn = self.db.begin().await?;

        let links = project_artifact::Entity::find()
            .filter(project_artifact::Column::ArtifactId.eq(artifact_id))
            .count(&txn)
            .await?;
        if links > 0 {
            return Err(StoreError::Conflict(format!(
                "artifact {artifact_id} is still linked"
            )));
        }
        let result = audio_artifact::Entity::delete_by_id(artifact_id)
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(format!("artifact {artifact_id}")));
        }

        txn.commit().await?;
        Ok(())
    }
}
