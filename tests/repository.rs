//! Repository behaviour against both object store backends.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pleme_depot::config::RepositoryConfig;
use pleme_depot::domain::{
    AppDeploymentStatus, AppIdentity, ConflictResolutionMode, DeploymentConfig, DeploymentStatus,
};
use pleme_depot::storage::{FsObjectStore, MemoryObjectStore, ObjectStore};
use pleme_depot::{DepotError, DeploymentRepository, UpdateOutcome};

/// Runs one scenario against the in-memory store and a filesystem store
/// rooted in a fresh temp directory.
macro_rules! on_each_backend {
    (multi_thread: $($name:ident),* $(,)?) => {
        $(
            mod $name {
                use super::*;

                #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
                async fn memory() {
                    super::$name(Arc::new(MemoryObjectStore::new())).await;
                }

                #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
                async fn filesystem() {
                    let dir = tempfile::tempdir().unwrap();
                    super::$name(Arc::new(FsObjectStore::new(dir.path().join("store")))).await;
                }
            }
        )*
    };
    ($($name:ident),* $(,)?) => {
        $(
            mod $name {
                use super::*;

                #[tokio::test]
                async fn memory() {
                    super::$name(Arc::new(MemoryObjectStore::new())).await;
                }

                #[tokio::test]
                async fn filesystem() {
                    let dir = tempfile::tempdir().unwrap();
                    super::$name(Arc::new(FsObjectStore::new(dir.path().join("store")))).await;
                }
            }
        )*
    };
}

on_each_backend!(
    first_status_update_creates_document,
    status_update_skips_while_lease_is_held,
    nodes_sharing_a_store_see_each_other,
    config_publish_and_fetch,
    config_fetch_fails_hard_while_locked,
    upload_fail_if_exists_keeps_artifacts,
    upload_do_nothing_if_exists_keeps_artifacts,
    upload_overwrite_replaces_artifacts,
    upload_without_files_is_not_found,
    download_missing_set_leaves_nothing_behind,
    download_into_occupied_destination,
    delete_binaries,
);

on_each_backend!(
    multi_thread: concurrent_updates_on_existing_document,
    concurrent_updates_on_absent_document,
);

fn repository(store: &Arc<dyn ObjectStore>) -> DeploymentRepository {
    DeploymentRepository::new(store.clone(), &RepositoryConfig::default())
}

fn svc_a() -> AppIdentity {
    AppIdentity::parse("svc-a", "1.2.0").unwrap()
}

fn write_files(dir: &Path, files: &[(&str, &str)]) {
    for (name, content) in files {
        let path = dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}

fn report(app: AppIdentity, cluster: &str, instance: &str) -> AppDeploymentStatus {
    AppDeploymentStatus::new(app, cluster, instance, Utc::now())
}

async fn first_status_update_creates_document(store: Arc<dyn ObjectStore>) {
    let repo = repository(&store);
    assert!(!store.exists(repo.status_key()).await.unwrap());

    let entry = report(svc_a(), "c1", "i1");
    let outcome = repo
        .update_status_atomically(move |mut status| {
            assert!(status.is_empty());
            status.set_app_deployment_status(entry);
            status
        })
        .await;
    assert_eq!(outcome, UpdateOutcome::Applied);

    let status = repo.fetch_status().await.unwrap();
    assert_eq!(status.len(), 1);
    assert!(status.get_app_deployment_status("c1", "i1", &svc_a()).is_some());

    // The lease was released: an immediate acquire succeeds.
    let lease = store
        .acquire_lease(repo.status_key(), Duration::from_secs(5))
        .await
        .unwrap();
    assert!(lease.is_some());
}

async fn status_update_skips_while_lease_is_held(store: Arc<dyn ObjectStore>) {
    let repo = repository(&store);
    repo.update_status_atomically(|status| status).await;

    let held = store
        .acquire_lease(repo.status_key(), Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();

    let entry = report(svc_a(), "c1", "i1");
    let outcome = repo
        .update_status_atomically(move |mut status| {
            status.set_app_deployment_status(entry);
            status
        })
        .await;
    assert_eq!(outcome, UpdateOutcome::Skipped);
    assert!(repo.fetch_status().await.unwrap().is_empty());

    store.release_lease(repo.status_key(), &held).await.unwrap();
    let entry = report(svc_a(), "c1", "i1");
    let outcome = repo
        .update_status_atomically(move |mut status| {
            status.set_app_deployment_status(entry);
            status
        })
        .await;
    assert_eq!(outcome, UpdateOutcome::Applied);
}

async fn nodes_sharing_a_store_see_each_other(store: Arc<dyn ObjectStore>) {
    let node_a = repository(&store);
    let node_b = repository(&store);

    let a = report(svc_a(), "c1", "i1");
    assert_eq!(
        node_a
            .update_status_atomically(move |mut s| {
                s.set_app_deployment_status(a);
                s
            })
            .await,
        UpdateOutcome::Applied
    );
    let b = report(AppIdentity::parse("svc-b", "0.3.1").unwrap(), "c2", "i7");
    assert_eq!(
        node_b
            .update_status_atomically(move |mut s| {
                s.set_app_deployment_status(b);
                s
            })
            .await,
        UpdateOutcome::Applied
    );

    let seen_by_a = node_a.fetch_status().await.unwrap();
    assert_eq!(seen_by_a.len(), 2);
    assert_eq!(seen_by_a.list_matching(Some("c2"), None).count(), 1);
    assert_eq!(
        seen_by_a.cluster_ids().collect::<Vec<_>>(),
        vec!["c1", "c2"]
    );
}

/// Two nodes race one update each per round; at least one must land.
async fn race_two_nodes(store: Arc<dyn ObjectStore>, seed_document: bool) {
    let status_key = repository(&store).status_key().to_string();

    for round in 0..20 {
        if seed_document {
            repository(&store)
                .publish_status(&DeploymentStatus::new())
                .await
                .unwrap();
        } else if store.exists(&status_key).await.unwrap() {
            store.delete(&status_key).await.unwrap();
        }

        let app = AppIdentity::parse(format!("svc-{round}"), "1.0.0").unwrap();
        let tasks: Vec<_> = ["node-1", "node-2"]
            .into_iter()
            .map(|instance| {
                let repo = repository(&store);
                let entry = report(app.clone(), "c1", instance);
                tokio::spawn(async move {
                    let outcome = repo
                        .update_status_atomically(move |mut status| {
                            status.set_app_deployment_status(entry);
                            status
                        })
                        .await;
                    (instance, outcome)
                })
            })
            .collect();

        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.unwrap());
        }

        assert!(
            outcomes.iter().any(|(_, o)| *o == UpdateOutcome::Applied),
            "round {round}: {outcomes:?}"
        );
        assert!(
            outcomes.iter().all(|(_, o)| *o != UpdateOutcome::Failed),
            "round {round}: {outcomes:?}"
        );

        // With the document in place every applied update is serialized by
        // the lease, so none can be lost.
        if seed_document {
            let status = repository(&store).fetch_status().await.unwrap();
            for (instance, outcome) in &outcomes {
                let present = status
                    .get_app_deployment_status("c1", instance, &app)
                    .is_some();
                assert_eq!(present, *outcome == UpdateOutcome::Applied, "round {round}");
            }
        }
    }
}

async fn concurrent_updates_on_existing_document(store: Arc<dyn ObjectStore>) {
    race_two_nodes(store, true).await;
}

async fn concurrent_updates_on_absent_document(store: Arc<dyn ObjectStore>) {
    race_two_nodes(store, false).await;
}

async fn config_publish_and_fetch(store: Arc<dyn ObjectStore>) {
    let repo = repository(&store);
    assert!(repo.fetch_config().await.unwrap().is_empty());

    let raw = r#"{"clusters":["c1","c2"]}"#;
    repo.publish_config(&DeploymentConfig::new(raw)).await.unwrap();
    assert_eq!(repo.fetch_config().await.unwrap().raw_data(), raw);

    // Republishing takes the lease again, so the first one was released.
    repo.publish_config(&DeploymentConfig::new("{}")).await.unwrap();
    assert_eq!(repository(&store).fetch_config().await.unwrap().raw_data(), "{}");
}

async fn config_fetch_fails_hard_while_locked(store: Arc<dyn ObjectStore>) {
    let repo = repository(&store);
    repo.publish_config(&DeploymentConfig::new("{}")).await.unwrap();

    let held = store
        .acquire_lease(repo.config_key(), Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(repo.fetch_config().await, Err(DepotError::ConfigLocked)));
    assert!(matches!(
        repo.publish_config(&DeploymentConfig::new("{\"x\":1}")).await,
        Err(DepotError::ConfigLocked)
    ));

    store.release_lease(repo.config_key(), &held).await.unwrap();
    assert_eq!(repo.fetch_config().await.unwrap().raw_data(), "{}");
}

async fn upload_fail_if_exists_keeps_artifacts(store: Arc<dyn ObjectStore>) {
    let repo = repository(&store);
    let local = tempfile::tempdir().unwrap();
    write_files(local.path(), &[("bin/svc", "v1"), ("README", "first")]);
    repo.upload_binaries(&svc_a(), local.path(), ConflictResolutionMode::FailIfExists)
        .await
        .unwrap();
    assert!(repo.has_binaries(&svc_a()).await.unwrap());

    let other = tempfile::tempdir().unwrap();
    write_files(other.path(), &[("bin/svc", "v2")]);
    let err = repo
        .upload_binaries(&svc_a(), other.path(), ConflictResolutionMode::FailIfExists)
        .await
        .unwrap_err();
    assert!(matches!(err, DepotError::DuplicateBinaries(_)));

    assert_eq!(store.read_text("svc-a/1.2.0/bin/svc").await.unwrap(), "v1");
    assert_eq!(store.read_text("svc-a/1.2.0/README").await.unwrap(), "first");
}

async fn upload_do_nothing_if_exists_keeps_artifacts(store: Arc<dyn ObjectStore>) {
    let repo = repository(&store);
    let local = tempfile::tempdir().unwrap();
    write_files(local.path(), &[("bin/svc", "v1")]);
    repo.upload_binaries(&svc_a(), local.path(), ConflictResolutionMode::DoNothingIfExists)
        .await
        .unwrap();

    write_files(local.path(), &[("bin/svc", "v2")]);
    repo.upload_binaries(&svc_a(), local.path(), ConflictResolutionMode::DoNothingIfExists)
        .await
        .unwrap();
    assert_eq!(store.read_text("svc-a/1.2.0/bin/svc").await.unwrap(), "v1");
}

async fn upload_overwrite_replaces_artifacts(store: Arc<dyn ObjectStore>) {
    let repo = repository(&store);
    let first = tempfile::tempdir().unwrap();
    write_files(first.path(), &[("bin/svc", "v1"), ("stale.txt", "old")]);
    repo.upload_binaries(&svc_a(), first.path(), ConflictResolutionMode::Overwrite)
        .await
        .unwrap();

    let second = tempfile::tempdir().unwrap();
    write_files(second.path(), &[("bin/svc", "v2")]);
    repo.upload_binaries(&svc_a(), second.path(), ConflictResolutionMode::Overwrite)
        .await
        .unwrap();

    assert_eq!(store.read_text("svc-a/1.2.0/bin/svc").await.unwrap(), "v2");
    assert!(!store.exists("svc-a/1.2.0/stale.txt").await.unwrap());
}

async fn upload_without_files_is_not_found(store: Arc<dyn ObjectStore>) {
    let repo = repository(&store);
    let local = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(local.path().join("bin/lib")).unwrap();

    let err = repo
        .upload_binaries(&svc_a(), local.path(), ConflictResolutionMode::FailIfExists)
        .await
        .unwrap_err();
    assert!(matches!(err, DepotError::BinariesNotFound(_)));
    assert!(!repo.has_binaries(&svc_a()).await.unwrap());

    write_files(local.path(), &[("bin/lib/dep.so", "dep")]);
    repo.upload_binaries(&svc_a(), local.path(), ConflictResolutionMode::FailIfExists)
        .await
        .unwrap();
    assert!(repo.has_binaries(&svc_a()).await.unwrap());
}

async fn download_missing_set_leaves_nothing_behind(store: Arc<dyn ObjectStore>) {
    let repo = repository(&store);
    let local = tempfile::tempdir().unwrap();
    let destination = local.path().join("svc-a");

    let err = repo
        .download_binaries(&svc_a(), &destination, ConflictResolutionMode::FailIfExists)
        .await
        .unwrap_err();
    assert!(matches!(err, DepotError::BinariesNotFound(_)));
    assert!(!destination.exists());
}

async fn download_into_occupied_destination(store: Arc<dyn ObjectStore>) {
    let repo = repository(&store);
    let source = tempfile::tempdir().unwrap();
    write_files(source.path(), &[("bin/svc", "remote"), ("lib/dep.so", "dep")]);
    repo.upload_binaries(&svc_a(), source.path(), ConflictResolutionMode::FailIfExists)
        .await
        .unwrap();

    let local = tempfile::tempdir().unwrap();
    write_files(local.path(), &[("bin/svc", "local")]);

    let err = repo
        .download_binaries(&svc_a(), local.path(), ConflictResolutionMode::FailIfExists)
        .await
        .unwrap_err();
    assert!(matches!(err, DepotError::DuplicateBinaries(_)));

    repo.download_binaries(&svc_a(), local.path(), ConflictResolutionMode::DoNothingIfExists)
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(local.path().join("bin/svc")).unwrap(), "local");
    assert!(!local.path().join("lib/dep.so").exists());

    repo.download_binaries(&svc_a(), local.path(), ConflictResolutionMode::Overwrite)
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(local.path().join("bin/svc")).unwrap(), "remote");
    assert_eq!(std::fs::read_to_string(local.path().join("lib/dep.so")).unwrap(), "dep");

    // A fresh destination is created and filled.
    let fresh = local.path().join("fresh");
    repo.download_binaries(&svc_a(), &fresh, ConflictResolutionMode::FailIfExists)
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(fresh.join("bin/svc")).unwrap(), "remote");
}

async fn delete_binaries(store: Arc<dyn ObjectStore>) {
    let repo = repository(&store);
    let err = repo.delete_binaries(&svc_a()).await.unwrap_err();
    assert!(matches!(err, DepotError::BinariesNotFound(_)));

    let local = tempfile::tempdir().unwrap();
    write_files(local.path(), &[("bin/svc", "v1")]);
    repo.upload_binaries(&svc_a(), local.path(), ConflictResolutionMode::FailIfExists)
        .await
        .unwrap();

    repo.delete_binaries(&svc_a()).await.unwrap();
    assert!(!repo.has_binaries(&svc_a()).await.unwrap());
    assert!(!store.exists("svc-a/1.2.0/bin/svc").await.unwrap());
}
