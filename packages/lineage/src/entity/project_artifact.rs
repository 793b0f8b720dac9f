use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "project_artifact")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub project_id: i32,
    #[sea_orm(primary_key)]
    pub artifact_id: i32,
    #[sea_orm(belongs_to, from = "project_id", to = "id")]
    pub project: Option<super::project::Entity>,
    #[sea_orm(belongs_to, from = "artifact_id", to = "id")]
    pub artifact: Option<super::audio_artifact::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
