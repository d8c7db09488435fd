// tests/supervisor_lifecycle.rs
mod common;
use crate::common::{
    LONG_RUNNING_SCRIPT, builders::ConfigFileBuilder, fake_launcher::FailingLauncher,
    init_tracing, sh_config, start_real, start_with, with_timeout,
};

use std::error::Error;
use std::sync::Arc;

use botkeeper::errors::BotkeeperError;
use botkeeper::fs::RealFileSystem;
use botkeeper::store::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
use botkeeper::supervisor::Supervisor;
use botkeeper::types::BotStatus;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn deploy_writes_source_spawns_child_and_persists() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let cfg = sh_config(dir.path());
    let work_dir = cfg.supervisor.work_dir.clone();
    let snapshot_path = cfg.supervisor.snapshot_file.clone();
    let sup = start_real(cfg).await;

    let deployed = sup.deploy(42, LONG_RUNNING_SCRIPT).await?;
    assert_eq!(deployed.id, 1);
    assert_eq!(deployed.name, "Script 1");

    let file = work_dir.join("bot_1_42.sh");
    assert_eq!(std::fs::read_to_string(&file)?, LONG_RUNNING_SCRIPT);

    let details = sup.describe(1).await.expect("record exists");
    assert_eq!(details.status, BotStatus::Running);
    assert_eq!(details.owner, 42);
    assert_eq!(details.file, file);
    assert!(details.pid.is_some());

    let snapshot = FileSnapshotStore::new(&snapshot_path)
        .load()
        .expect("snapshot written");
    assert_eq!(snapshot.next_id, 2);
    let bot = snapshot.bots.get("1").expect("bot 1 in snapshot");
    assert_eq!(bot.user_id, 42);
    assert_eq!(bot.name, "Script 1");
    assert_eq!(bot.file, file);

    sup.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn source_footer_is_appended() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let cfg = ConfigFileBuilder::new()
        .with_root(dir.path())
        .with_shell_launcher()
        .with_source_footer("# managed by botkeeper")
        .build();
    let work_dir = cfg.supervisor.work_dir.clone();
    let sup = start_real(cfg).await;

    sup.deploy(5, "exec sleep 30").await?;
    let written = std::fs::read_to_string(work_dir.join("bot_1_5.sh"))?;
    assert_eq!(written, "exec sleep 30\n\n# managed by botkeeper\n");

    sup.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn empty_content_is_rejected_without_side_effects() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let sup = start_real(sh_config(dir.path())).await;

    let err = sup.deploy(42, "   \n").await.unwrap_err();
    assert!(matches!(err, BotkeeperError::Validation(_)), "{err:?}");
    assert!(sup.list().is_empty());
    assert_eq!(sup.next_id().await, 1);
    Ok(())
}

#[tokio::test]
async fn stop_removes_record_file_and_process() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let cfg = sh_config(dir.path());
    let work_dir = cfg.supervisor.work_dir.clone();
    let snapshot_path = cfg.supervisor.snapshot_file.clone();
    let sup = start_real(cfg).await;

    let id = sup.deploy(42, LONG_RUNNING_SCRIPT).await?.id;
    let pid = sup.describe(id).await.and_then(|d| d.pid).expect("pid");

    with_timeout(sup.stop(id, 42)).await?;

    assert!(sup.get(id).is_none());
    assert!(sup.list().is_empty());
    assert!(sup.describe(id).await.is_none());
    assert!(!work_dir.join("bot_1_42.sh").exists());
    #[cfg(unix)]
    assert!(!common::pid_alive(pid), "child {pid} should be gone");

    let snapshot = FileSnapshotStore::new(&snapshot_path).load().expect("snapshot");
    assert!(snapshot.bots.is_empty());
    assert_eq!(snapshot.next_id, 2);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn stop_kills_a_child_that_ignores_sigterm() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let sup = start_real(sh_config(dir.path())).await;

    let id = sup
        .deploy(1, "trap '' TERM\nwhile true; do sleep 1; done\n")
        .await?
        .id;
    let pid = sup.describe(id).await.and_then(|d| d.pid).expect("pid");
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    with_timeout(sup.stop(id, 1)).await?;
    assert!(!common::pid_alive(pid));
    Ok(())
}

#[tokio::test]
async fn unknown_ids_are_not_found() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let sup = start_real(sh_config(dir.path())).await;

    assert!(matches!(sup.stop(99, 1).await, Err(BotkeeperError::NotFound(99))));
    assert!(matches!(sup.restart(99, 1).await, Err(BotkeeperError::NotFound(99))));
    Ok(())
}

#[tokio::test]
async fn non_owner_cannot_stop_or_restart() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let sup = start_real(sh_config(dir.path())).await;

    let id = sup.deploy(42, LONG_RUNNING_SCRIPT).await?.id;
    let before = sup.describe(id).await.expect("record");

    match sup.stop(id, 7).await {
        Err(BotkeeperError::Permission { id: denied, caller }) => {
            assert_eq!(denied, id);
            assert_eq!(caller, 7);
        }
        other => panic!("expected Permission error, got {other:?}"),
    }
    assert!(matches!(
        sup.restart(id, 7).await,
        Err(BotkeeperError::Permission { .. })
    ));

    let after = sup.describe(id).await.expect("record still there");
    assert_eq!(before, after);
    assert!(after.file.exists());

    sup.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn restart_keeps_identity_and_replaces_process() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let sup = start_real(sh_config(dir.path())).await;

    let id = sup.deploy(42, LONG_RUNNING_SCRIPT).await?.id;
    let before = sup.describe(id).await.expect("record");

    with_timeout(sup.restart(id, 42)).await?;

    let after = sup.describe(id).await.expect("record");
    assert_eq!(after.id, before.id);
    assert_eq!(after.owner, before.owner);
    assert_eq!(after.name, before.name);
    assert_eq!(after.file, before.file);
    assert_eq!(after.status, BotStatus::Running);
    assert_ne!(after.pid, before.pid);
    #[cfg(unix)]
    assert!(!common::pid_alive(before.pid.expect("old pid")));

    sup.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn restart_after_source_removal_leaves_bot_crashed() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let sup = start_real(sh_config(dir.path())).await;

    let id = sup.deploy(42, LONG_RUNNING_SCRIPT).await?.id;
    let file = sup.describe(id).await.expect("record").file;
    std::fs::remove_file(&file)?;

    let err = with_timeout(sup.restart(id, 42)).await.unwrap_err();
    assert!(matches!(err, BotkeeperError::Process(_)), "{err:?}");

    let details = sup.describe(id).await.expect("record kept");
    assert_eq!(details.status, BotStatus::Crashed);
    assert!(details.pid.is_none());
    assert_eq!(sup.get(id).map(|s| s.status), Some(BotStatus::Crashed));

    // Stopping a crashed bot still cleans up the record.
    sup.stop(id, 42).await?;
    assert!(sup.list().is_empty());
    Ok(())
}

#[tokio::test]
async fn ids_are_never_reused_after_stop() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let sup = start_real(sh_config(dir.path())).await;

    let first = sup.deploy(1, LONG_RUNNING_SCRIPT).await?.id;
    sup.stop(first, 1).await?;
    let second = sup.deploy(1, LONG_RUNNING_SCRIPT).await?.id;
    let third = sup.deploy(2, LONG_RUNNING_SCRIPT).await?.id;

    assert_eq!((first, second, third), (1, 2, 3));

    sup.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn list_is_ordered_and_visible_to_everyone() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let sup = start_real(sh_config(dir.path())).await;

    for owner in [3, 1, 2] {
        sup.deploy(owner, LONG_RUNNING_SCRIPT).await?;
    }

    let listing = sup.list();
    let ids: Vec<_> = listing.iter().map(|s| s.id).collect();
    let owners: Vec<_> = listing.iter().map(|s| s.owner).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(owners, vec![3, 1, 2]);
    assert!(listing.iter().all(|s| s.status == BotStatus::Running));
    assert_eq!(sup.get(2).map(|s| s.name), Some("Script 2".to_string()));

    sup.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn concurrent_stop_and_restart_leave_a_consistent_record() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let sup = start_real(sh_config(dir.path())).await;

    let id = sup.deploy(42, LONG_RUNNING_SCRIPT).await?.id;

    let (stop, restart) =
        with_timeout(async { tokio::join!(sup.stop(id, 42), sup.restart(id, 42)) }).await;

    match (stop, restart) {
        // stop won the lock: restart sees the record gone.
        (Ok(()), Err(BotkeeperError::NotFound(missing))) => assert_eq!(missing, id),
        // restart ran first, then stop removed the fresh process.
        (Ok(()), Ok(())) => {}
        other => panic!("inconsistent outcome: {other:?}"),
    }
    assert!(sup.get(id).is_none());
    assert!(sup.describe(id).await.is_none());
    Ok(())
}

#[tokio::test]
async fn failed_spawn_cleans_up_the_written_file() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let cfg = sh_config(dir.path());
    let work_dir = cfg.supervisor.work_dir.clone();
    let store = MemorySnapshotStore::new();

    let sup = Supervisor::start(
        cfg,
        Arc::new(FailingLauncher::new()),
        Box::new(store.clone()),
        Arc::new(RealFileSystem),
    )
    .await?;

    let err = sup.deploy(42, LONG_RUNNING_SCRIPT).await.unwrap_err();
    assert!(matches!(err, BotkeeperError::Process(_)), "{err:?}");

    assert!(!work_dir.join("bot_1_42.sh").exists());
    assert!(sup.list().is_empty());
    assert_eq!(store.save_count(), 0);
    Ok(())
}

#[tokio::test]
async fn shutdown_terminates_children_and_keeps_records_for_recovery() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let cfg = sh_config(dir.path());
    let store = MemorySnapshotStore::new();
    let sup = start_with(cfg, Box::new(store.clone())).await;

    sup.deploy(1, LONG_RUNNING_SCRIPT).await?;
    sup.deploy(2, LONG_RUNNING_SCRIPT).await?;
    let mut pids = Vec::new();
    for id in [1, 2] {
        pids.extend(sup.describe(id).await.and_then(|d| d.pid));
    }

    let report = with_timeout(sup.shutdown()).await;
    assert_eq!(report.terminated, 2);
    assert_eq!(report.leaked, 0);
    assert!(report.snapshot_saved);

    #[cfg(unix)]
    for pid in pids {
        assert!(!common::pid_alive(pid));
    }
    #[cfg(not(unix))]
    let _ = pids;

    assert!(sup.list().iter().all(|s| s.status == BotStatus::Stopped));
    let snapshot = store.current().expect("final snapshot");
    assert_eq!(snapshot.bots.len(), 2);
    assert_eq!(snapshot.next_id, 3);

    assert!(matches!(sup.deploy(1, LONG_RUNNING_SCRIPT).await, Err(BotkeeperError::ShutDown)));
    assert!(matches!(sup.stop(1, 1).await, Err(BotkeeperError::ShutDown)));

    let again = sup.shutdown().await;
    assert_eq!((again.terminated, again.leaked), (0, 0));
    Ok(())
}

#[tokio::test]
async fn failed_save_keeps_the_mutation_and_is_retried() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let store = MemorySnapshotStore::new();
    store.set_fail_saves(true);
    let sup = start_with(sh_config(dir.path()), Box::new(store.clone())).await;

    let id = sup.deploy(42, LONG_RUNNING_SCRIPT).await?.id;
    assert_eq!(sup.get(id).map(|s| s.status), Some(BotStatus::Running));
    assert!(sup.snapshot_dirty().await);
    assert!(store.current().is_none());

    store.set_fail_saves(false);
    sup.check_children().await;

    assert!(!sup.snapshot_dirty().await);
    let snapshot = store.current().expect("saved on retry");
    assert!(snapshot.bots.contains_key("1"));

    sup.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn listing_updates_are_published() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let sup = start_real(sh_config(dir.path())).await;
    let mut rx = sup.subscribe();

    sup.deploy(9, LONG_RUNNING_SCRIPT).await?;
    assert!(rx.has_changed()?);
    assert_eq!(rx.borrow_and_update().len(), 1);

    sup.shutdown().await;
    Ok(())
}
