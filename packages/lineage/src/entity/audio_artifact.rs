use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One stored version of an audio file.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audio_artifact")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Version-prefix-free name shared by every version in the lineage.
    pub logical_name: String,

    /// Blob name. Unique across the whole store since blobs share one directory.
    #[sea_orm(unique)]
    pub stored_name: String,

    pub path: String,
    pub duration_seconds: f64,

    #[sea_orm(default_value = 0)]
    pub generation: i32,

    #[sea_orm(has_many, via = "project_artifact")]
    pub projects: HasMany<super::project::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
