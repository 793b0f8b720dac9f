use std::io::Cursor;
use std::sync::atomic::Ordering;

use common::storage::BoxReader;

use crate::common::{TestEngine, audio};
use lineage::LineageError;

fn reader(duration: f64) -> BoxReader {
    Box::new(Cursor::new(audio(duration)))
}

mod naming {
    use super::*;

    #[tokio::test]
    async fn upload_name_is_folded_to_ascii() {
        let t = TestEngine::spawn().await;
        let artifact = t
            .engine
            .ingest_original(&t.ctx, t.project_id, "Café Del Mar.mp3", reader(61.0))
            .await
            .unwrap();

        assert_eq!(artifact.logical_name, "Cafe_Del_Mar.mp3");
        assert_eq!(artifact.stored_name, "Cafe_Del_Mar.mp3");
        assert_eq!(artifact.generation, 0);
        assert_eq!(artifact.duration_seconds, 61.0);
        assert!(artifact.is_original());
        assert!(t.blob_exists("Cafe_Del_Mar.mp3"));
    }

    #[tokio::test]
    async fn invalid_names_are_rejected() {
        let t = TestEngine::spawn().await;
        for name in [
            "",
            "../escape.mp3",
            "dir/file.mp3",
            ".hidden.mp3",
            "no_extension",
            "20240101120000_song.mp3",
        ] {
            let err = t
                .engine
                .ingest_original(&t.ctx, t.project_id, name, reader(1.0))
                .await
                .unwrap_err();
            assert!(
                matches!(err, LineageError::InvalidParameters(_)),
                "{name:?} gave {err:?}"
            );
        }
        assert!(t.blob_names().is_empty());
    }
}

mod duplicates {
    use super::*;

    #[tokio::test]
    async fn same_name_twice_in_project_is_rejected() {
        let t = TestEngine::spawn().await;
        t.upload("song.mp3", 10.0).await;

        let err = t
            .engine
            .ingest_original(&t.ctx, t.project_id, "song.mp3", reader(20.0))
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::AlreadyExists(_)));
        assert_eq!(err.code(), "ALREADY_EXISTS");
        assert_eq!(t.metadata.artifact_count().await, 1);
    }

    #[tokio::test]
    async fn name_taken_in_another_project_is_rejected() {
        let t = TestEngine::spawn().await;
        let other = t.engine.create_project(&t.ctx, "Other").await.unwrap();
        t.upload("song.mp3", 10.0).await;

        let err = t
            .engine
            .ingest_original(&t.ctx, other.id, "song.mp3", reader(20.0))
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn unknown_project_is_rejected() {
        let t = TestEngine::spawn().await;
        let err = t
            .engine
            .ingest_original(&t.ctx, 404, "song.mp3", reader(20.0))
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::ProjectNotFound(404)));
        assert!(t.blob_names().is_empty());
    }
}

mod cleanup {
    use super::*;

    #[tokio::test]
    async fn probe_failure_removes_blob() {
        let t = TestEngine::spawn().await;
        t.transcoder.fail_probe.store(true, Ordering::SeqCst);

        let err = t
            .engine
            .ingest_original(&t.ctx, t.project_id, "song.mp3", reader(10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::TranscodeFailure(_)));
        assert!(t.blob_names().is_empty());
        assert_eq!(t.metadata.artifact_count().await, 0);
    }

    #[tokio::test]
    async fn insert_failure_removes_blob() {
        let t = TestEngine::spawn().await;
        t.metadata.fail_inserts(true);

        let err = t
            .engine
            .ingest_original(&t.ctx, t.project_id, "song.mp3", reader(10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::Metadata(_)));
        assert!(t.blob_names().is_empty());
    }

    #[tokio::test]
    async fn insert_failure_with_stuck_blob_is_inconsistency() {
        let t = TestEngine::spawn().await;
        t.metadata.fail_inserts(true);
        t.blobs.fail_deletes.store(true, Ordering::SeqCst);

        let err = t
            .engine
            .ingest_original(&t.ctx, t.project_id, "song.mp3", reader(10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::StorageInconsistency(_)));
        assert!(t.blob_exists("song.mp3"));
    }
}
