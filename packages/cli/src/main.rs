mod args;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use common::storage::{BoxReader, StorageError};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use lineage::config::AppConfig;
use lineage::state::AppState;
use lineage::{LineageEngine, LineageError, OpContext};

use crate::args::{Cli, Command, scope};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "lineage=info,warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load().context("Failed to load configuration")?;
    debug!(blob_dir = %config.storage.base_path, "Loaded configuration");
    let state = AppState::init(config).await?;

    let mut ctx = OpContext::new(cli.user);
    if let Some(secs) = cli.timeout {
        ctx = ctx.with_timeout(Duration::from_secs(secs));
    }

    let err = match run(&state.engine, &ctx, cli.command).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(ExitCode::SUCCESS);
        }
        Err(err) => err,
    };

    match err.downcast_ref::<LineageError>() {
        Some(err) => {
            error!(code = err.code(), "{err}");
            let body = json!({
                "error": err.code(),
                "outcome": err.outcome(),
                "message": err.to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(ExitCode::FAILURE)
        }
        None => Err(err),
    }
}

fn render<T: Serialize>(value: T) -> anyhow::Result<serde_json::Value> {
    serde_json::to_value(value).context("Failed to render result")
}

async fn run(
    engine: &LineageEngine,
    ctx: &OpContext,
    command: Command,
) -> anyhow::Result<serde_json::Value> {
    match command {
        Command::CreateProject { name } => render(engine.create_project(ctx, &name).await?),
        Command::Projects { owner } => {
            render(engine.list_projects(owner.unwrap_or(ctx.user_id)).await?)
        }
        Command::Upload {
            project,
            file,
            name,
        } => {
            let filename = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| {
                        LineageError::InvalidParameters(format!(
                            "{} has no file name",
                            file.display()
                        ))
                    })?,
            };
            let reader: BoxReader = Box::new(
                tokio::fs::File::open(&file)
                    .await
                    .map_err(|err| LineageError::from(StorageError::Io(err)))?,
            );
            render(
                engine
                    .ingest_original(ctx, project, &filename, reader)
                    .await?,
            )
        }
        Command::Edit { project, name, op } => render(
            engine
                .apply_edit(ctx, project, &name, op.into_operation())
                .await?,
        ),
        Command::Merge { project, a, b } => render(engine.merge(ctx, project, &a, &b).await?),
        Command::Undo { project, name } => render(engine.undo(ctx, project, &name).await?),
        Command::Delete { project, name } => {
            render(engine.delete_artifact(ctx, project, &name).await?)
        }
        Command::List { project, name, all } => render(
            engine
                .list_versions_or_head(project, &name, scope(all))
                .await?,
        ),
        Command::Heads { project } => render(engine.list_project_heads(project).await?),
        Command::FindVersion {
            project,
            stored_name,
        } => render(engine.find_version(project, &stored_name).await?),
        Command::DeleteProject { project } => {
            render(engine.delete_project(ctx, project).await?)
        }
        Command::Gc => render(engine.collect_orphans().await?),
        Command::Check { project } => render(engine.check_consistency(project).await?),
    }
}
