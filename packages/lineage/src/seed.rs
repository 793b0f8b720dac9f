use sea_orm::*;
use sea_orm::sea_query::{
    Index, IndexCreateStatement, MysqlQueryBuilder, PostgresQueryBuilder, SqliteQueryBuilder,
};
use tracing::info;

use crate::entity::{audio_artifact, project_artifact};

fn render(db: &DatabaseConnection, stmt: &IndexCreateStatement) -> String {
    match db.get_database_backend() {
        DbBackend::Postgres => stmt.to_string(PostgresQueryBuilder),
        DbBackend::Sqlite => stmt.to_string(SqliteQueryBuilder),
        _ => stmt.to_string(MysqlQueryBuilder),
    }
}

async fn ensure(db: &DatabaseConnection, name: &str, stmt: IndexCreateStatement) {
    match db.execute_unprepared(&render(db, &stmt)).await {
        Ok(_) => {
            info!("Ensured index {} exists", name);
        }
        Err(e) => {
            tracing::warn!("Failed to create index {}: {}", name, e);
        }
    }
}

/// Ensure required database indexes exist.
///
/// SeaORM's schema-sync doesn't support composite non-unique indexes,
/// so we create them manually on startup.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    // Head resolution:
    // SELECT ... FROM audio_artifact WHERE logical_name = ? ORDER BY generation, created_at, id
    ensure(
        db,
        "idx_audio_artifact_lineage",
        Index::create()
            .if_not_exists()
            .name("idx_audio_artifact_lineage")
            .table(audio_artifact::Entity)
            .col(audio_artifact::Column::LogicalName)
            .col(audio_artifact::Column::Generation)
            .col(audio_artifact::Column::CreatedAt)
            .to_owned(),
    )
    .await;

    // Orphan sweep and reverse link lookups
    ensure(
        db,
        "idx_project_artifact_artifact",
        Index::create()
            .if_not_exists()
            .name("idx_project_artifact_artifact")
            .table(project_artifact::Entity)
            .col(project_artifact::Column::ArtifactId)
            .to_owned(),
    )
    .await;

    Ok(())
}
