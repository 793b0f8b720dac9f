use std::io::Cursor;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::common::{TestEngine, audio};
use common::storage::{BlobKey, BlobStore, BoxReader};
use lineage::{LineageError, OpContext};
use lineage::models::{EditOperation, NewArtifact};

mod creation {
    use super::*;

    #[tokio::test]
    async fn name_is_trimmed_and_owned_by_caller() {
        let t = TestEngine::spawn().await;
        let project = t
            .engine
            .create_project(&t.ctx, "  Mixtape  ")
            .await
            .unwrap();
        assert_eq!(project.name, "Mixtape");
        assert_eq!(project.owner_id, t.ctx.user_id);
    }

    #[tokio::test]
    async fn empty_or_long_names_are_rejected() {
        let t = TestEngine::spawn().await;
        let too_long = "x".repeat(256);
        for name in ["", "   ", too_long.as_str()] {
            let err = t.engine.create_project(&t.ctx, name).await.unwrap_err();
            assert!(matches!(err, LineageError::InvalidParameters(_)));
        }
        assert!(t.engine.create_project(&t.ctx, &"x".repeat(255)).await.is_ok());
    }
}

mod listing {
    use super::*;

    #[tokio::test]
    async fn project_view_shows_one_head_per_lineage() {
        let t = TestEngine::spawn().await;
        t.upload("b.mp3", 10.0).await;
        t.upload("a.mp3", 20.0).await;
        let edited = t
            .engine
            .apply_edit(
                &t.ctx,
                t.project_id,
                "b.mp3",
                EditOperation::Trim { start: 0.0, end: 5.0 },
            )
            .await
            .unwrap();

        let heads = t.engine.list_project_heads(t.project_id).await.unwrap();
        let names: Vec<&str> = heads.iter().map(|a| a.logical_name.as_str()).collect();
        assert_eq!(names, ["a.mp3", "b.mp3"]);
        assert_eq!(heads[1].id, edited.id);
    }

    #[tokio::test]
    async fn owner_sees_own_projects_with_files() {
        let t = TestEngine::spawn().await;
        t.upload("a.mp3", 20.0).await;
        let second = t.engine.create_project(&t.ctx, "Second").await.unwrap();
        t.upload_to(second.id, "b.mp3", 10.0).await;
        let stranger = OpContext::new(99);
        t.engine.create_project(&stranger, "Theirs").await.unwrap();

        let listings = t.engine.list_projects(t.ctx.user_id).await.unwrap();
        let names: Vec<&str> = listings.iter().map(|l| l.project.name.as_str()).collect();
        assert_eq!(names, ["Demo", "Second"]);
        assert_eq!(listings[0].files[0].logical_name, "a.mp3");
        assert_eq!(listings[1].files[0].logical_name, "b.mp3");

        assert_eq!(t.engine.list_projects(99).await.unwrap().len(), 1);
        assert!(t.engine.list_projects(1234).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn projects_do_not_see_each_other() {
        let t = TestEngine::spawn().await;
        let other = t.engine.create_project(&t.ctx, "Other").await.unwrap();
        t.upload("a.mp3", 20.0).await;

        assert!(t.engine.list_project_heads(other.id).await.unwrap().is_empty());
    }
}

mod deletion {
    use super::*;

    #[tokio::test]
    async fn delete_project_removes_every_version() {
        let t = TestEngine::spawn().await;
        t.upload("a.mp3", 20.0).await;
        t.upload("b.mp3", 30.0).await;
        t.engine
            .apply_edit(
                &t.ctx,
                t.project_id,
                "a.mp3",
                EditOperation::Trim { start: 0.0, end: 5.0 },
            )
            .await
            .unwrap();

        let removed = t.engine.delete_project(&t.ctx, t.project_id).await.unwrap();
        assert_eq!(removed.len(), 3);
        assert!(t.blob_names().is_empty());
        assert_eq!(t.metadata.artifact_count().await, 0);

        let err = t
            .engine
            .list_project_heads(t.project_id)
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::ProjectNotFound(_)));
        assert!(t.engine.locks().is_empty());
        assert!(t.history_kinds().await.contains(&"project_deleted"));
    }

    #[tokio::test]
    async fn upload_during_deletion_fails_without_leftovers() {
        let t = TestEngine::spawn().await;
        t.upload("a.mp3", 20.0).await;
        *t.blobs.delete_delay.lock().await = Some(Duration::from_millis(300));

        let deletion = {
            let engine = t.engine.clone();
            let ctx = t.ctx;
            let project_id = t.project_id;
            tokio::spawn(async move { engine.delete_project(&ctx, project_id).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let reader: BoxReader = Box::new(Cursor::new(audio(5.0)));
        let err = t
            .engine
            .ingest_original(&t.ctx, t.project_id, "new.mp3", reader)
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::ProjectNotFound(_)), "{err:?}");

        let removed = deletion.await.unwrap().unwrap();
        assert_eq!(removed.len(), 1);
        assert!(t.blob_names().is_empty());
        assert_eq!(t.metadata.artifact_count().await, 0);
        assert!(t.engine.locks().is_empty());
    }

    #[tokio::test]
    async fn deletion_waits_for_running_edit() {
        let t = TestEngine::spawn().await;
        t.upload("a.mp3", 20.0).await;
        *t.transcoder.stall.lock().await = Some(Duration::from_millis(200));

        let edit = {
            let engine = t.engine.clone();
            let ctx = t.ctx;
            let project_id = t.project_id;
            tokio::spawn(async move {
                engine
                    .apply_edit(
                        &ctx,
                        project_id,
                        "a.mp3",
                        EditOperation::Trim { start: 0.0, end: 5.0 },
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let removed = t.engine.delete_project(&t.ctx, t.project_id).await.unwrap();
        assert!(edit.await.unwrap().is_ok());
        assert_eq!(removed.len(), 2);
        assert!(t.blob_names().is_empty());
        assert!(t.staging_is_empty());
        assert_eq!(t.metadata.artifact_count().await, 0);
    }

    #[tokio::test]
    async fn first_blob_failure_aborts_without_changes() {
        let t = TestEngine::spawn().await;
        t.upload("a.mp3", 20.0).await;
        t.upload("b.mp3", 30.0).await;

        t.blobs.fail_deletes_after(0);
        let err = t
            .engine
            .delete_project(&t.ctx, t.project_id)
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::Storage(_)));
        assert_eq!(t.blob_names(), ["a.mp3", "b.mp3"]);
        assert_eq!(t.metadata.artifact_count().await, 2);
    }

    #[tokio::test]
    async fn midway_blob_failure_purges_rows_and_reports() {
        let t = TestEngine::spawn().await;
        t.upload("a.mp3", 20.0).await;
        t.upload("b.mp3", 30.0).await;

        t.blobs.fail_deletes_after(1);
        let err = t
            .engine
            .delete_project(&t.ctx, t.project_id)
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::StorageInconsistency(_)));
        assert_eq!(t.blob_names().len(), 1);
        assert_eq!(t.metadata.artifact_count().await, 0);
    }
}

mod maintenance {
    use super::*;

    #[tokio::test]
    async fn orphans_are_collected() {
        let t = TestEngine::spawn().await;
        t.upload("kept.mp3", 20.0).await;

        let key = BlobKey::new("stray.mp3").unwrap();
        t.blobs.put(&key, &audio(3.0)).await.unwrap();
        t.metadata
            .insert_orphan(NewArtifact {
                logical_name: "stray.mp3".into(),
                stored_name: "stray.mp3".into(),
                path: t.blobs.locate(&key).to_string_lossy().into_owned(),
                duration_seconds: 3.0,
                generation: 0,
            })
            .await
            .unwrap();

        let removed = t.engine.collect_orphans().await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].stored_name, "stray.mp3");
        assert_eq!(t.blob_names(), ["kept.mp3"]);
        assert_eq!(t.metadata.artifact_count().await, 1);

        assert!(t.engine.collect_orphans().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn orphan_with_stuck_blob_is_kept_for_next_run() {
        let t = TestEngine::spawn().await;
        t.metadata
            .insert_orphan(NewArtifact {
                logical_name: "stray.mp3".into(),
                stored_name: "stray.mp3".into(),
                path: String::new(),
                duration_seconds: 3.0,
                generation: 0,
            })
            .await
            .unwrap();

        t.blobs.fail_deletes.store(true, Ordering::SeqCst);
        assert!(t.engine.collect_orphans().await.unwrap().is_empty());
        assert_eq!(t.metadata.artifact_count().await, 1);

        t.blobs.fail_deletes.store(false, Ordering::SeqCst);
        assert_eq!(t.engine.collect_orphans().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn consistency_report_lists_missing_blobs() {
        let t = TestEngine::spawn().await;
        t.upload("a.mp3", 20.0).await;
        t.upload("b.mp3", 30.0).await;

        let report = t.engine.check_consistency(t.project_id).await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.checked, 2);

        std::fs::remove_file(t.blob_dir().join("b.mp3")).unwrap();
        let report = t.engine.check_consistency(t.project_id).await.unwrap();
        assert_eq!(report.missing_blobs.len(), 1);
        assert_eq!(report.missing_blobs[0].stored_name, "b.mp3");
    }

    #[tokio::test]
    async fn consistency_report_lists_blobs_without_rows() {
        let t = TestEngine::spawn().await;
        t.upload("a.mp3", 20.0).await;

        t.blobs
            .put(&BlobKey::new("20240101000000_lost.mp3").unwrap(), &audio(3.0))
            .await
            .unwrap();
        let leftover = t.blob_dir().join(".tmp").join("half-written.mp3");
        std::fs::write(&leftover, b"partial").unwrap();

        let report = t.engine.check_consistency(t.project_id).await.unwrap();
        assert!(!report.is_consistent());
        assert!(report.missing_blobs.is_empty());
        assert_eq!(report.unreferenced_blobs, ["20240101000000_lost.mp3"]);
        assert_eq!(report.stale_staging, [leftover]);
    }

    #[tokio::test]
    async fn stuck_rollback_shows_up_in_consistency_report() {
        let t = TestEngine::spawn().await;
        t.upload("a.mp3", 20.0).await;
        t.metadata.fail_inserts(true);
        t.blobs.fail_deletes.store(true, Ordering::SeqCst);

        let err = t
            .engine
            .apply_edit(
                &t.ctx,
                t.project_id,
                "a.mp3",
                EditOperation::Trim { start: 0.0, end: 5.0 },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::StorageInconsistency(_)));

        let report = t.engine.check_consistency(t.project_id).await.unwrap();
        assert_eq!(report.unreferenced_blobs.len(), 1);
        assert_ne!(report.unreferenced_blobs[0], "a.mp3");
        assert!(report.stale_staging.is_empty());
    }

    #[tokio::test]
    async fn history_failure_does_not_fail_operations() {
        let t = TestEngine::spawn().await;
        t.history.fail.store(true, Ordering::SeqCst);

        let artifact = t.upload("a.mp3", 20.0).await;
        assert_eq!(artifact.duration_seconds, 20.0);
        assert!(
            t.engine
                .apply_edit(
                    &t.ctx,
                    t.project_id,
                    "a.mp3",
                    EditOperation::Trim { start: 0.0, end: 5.0 },
                )
                .await
                .is_ok()
        );
    }
}
