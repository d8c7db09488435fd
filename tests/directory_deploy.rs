// tests/directory_deploy.rs
mod common;
use crate::common::{
    LONG_RUNNING_SCRIPT,
    builders::ConfigFileBuilder,
    fake_launcher::{FailingLauncher, RecordingLauncher},
    init_tracing, sh_config, start_real, write_script,
};

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use botkeeper::config::ConfigFile;
use botkeeper::errors::BotkeeperError;
use botkeeper::fs::FileSystem;
use botkeeper::fs::mock::MockFileSystem;
use botkeeper::launcher::Launcher;
use botkeeper::store::MemorySnapshotStore;
use botkeeper::supervisor::Supervisor;

type TestResult = Result<(), Box<dyn Error>>;

fn py_config() -> ConfigFile {
    ConfigFileBuilder::new()
        .with_work_dir(&PathBuf::from("bots"))
        .with_extension("py")
        .with_package_markers(&["__init__.py"])
        .build()
}

/// A small package tree:
///
/// ```text
/// scripts/
///   main.py
///   helper.txt
///   pkg/__init__.py
///   pkg/worker.py
///   .hidden/secret.py
/// ```
fn scripts_tree() -> MockFileSystem {
    let fs = MockFileSystem::new();
    fs.add_file("scripts/main.py", "print('main')");
    fs.add_file("scripts/helper.txt", "notes");
    fs.add_file("scripts/pkg/__init__.py", "");
    fs.add_file("scripts/pkg/worker.py", "print('worker')");
    fs.add_file("scripts/.hidden/secret.py", "print('nope')");
    fs
}

async fn start(
    fs: MockFileSystem,
    launcher: Arc<dyn Launcher>,
    store: MemorySnapshotStore,
) -> Arc<Supervisor> {
    Supervisor::start(py_config(), launcher, Box::new(store), Arc::new(fs))
        .await
        .expect("supervisor should start")
}

#[tokio::test]
async fn deploys_every_script_except_package_markers() -> TestResult {
    init_tracing();
    let launcher = RecordingLauncher::new();
    let store = MemorySnapshotStore::new();
    let sup = start(scripts_tree(), Arc::new(launcher.clone()), store.clone()).await;

    let count = sup.deploy_from_directory(42, "scripts").await?;
    assert_eq!(count, 2);

    // The bots run from copies in the work directory.
    assert_eq!(
        launcher.launched(),
        vec![
            PathBuf::from("bots/repo_scripts/main.py"),
            PathBuf::from("bots/repo_scripts/pkg/worker.py"),
        ]
    );

    let names: Vec<_> = sup.list().into_iter().map(|s| (s.id, s.name, s.owner)).collect();
    assert_eq!(
        names,
        vec![
            (1, "scripts/main.py".to_string(), 42),
            (2, "scripts/pkg/worker.py".to_string(), 42),
        ]
    );

    // One save for the whole batch.
    assert_eq!(store.save_count(), 1);
    let snapshot = store.current().expect("saved");
    assert_eq!(snapshot.next_id, 3);
    assert_eq!(snapshot.bots["2"].file, PathBuf::from("bots/repo_scripts/pkg/worker.py"));

    sup.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn whole_tree_is_copied_but_hidden_entries_are_not() -> TestResult {
    init_tracing();
    let fs = scripts_tree();
    let sup = start(fs.clone(), Arc::new(RecordingLauncher::new()), MemorySnapshotStore::new()).await;

    sup.deploy_from_directory(1, "scripts").await?;

    assert_eq!(fs.contents("bots/repo_scripts/helper.txt"), Some(b"notes".to_vec()));
    assert!(fs.contents("bots/repo_scripts/pkg/__init__.py").is_some());
    assert!(fs.contents("bots/repo_scripts/.hidden/secret.py").is_none());
    assert!(fs.contents("scripts/main.py").is_some());

    sup.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn files_already_deployed_are_skipped() -> TestResult {
    init_tracing();
    let launcher = RecordingLauncher::new();
    let store = MemorySnapshotStore::new();
    let sup = start(scripts_tree(), Arc::new(launcher.clone()), store.clone()).await;

    assert_eq!(sup.deploy_from_directory(1, "scripts").await?, 2);
    assert_eq!(sup.deploy_from_directory(1, "scripts").await?, 0);
    assert_eq!(sup.deploy_from_directory(1, "./scripts/pkg/..").await?, 0);

    assert_eq!(launcher.launched().len(), 2);
    assert_eq!(sup.list().len(), 2);
    assert_eq!(store.save_count(), 1);

    sup.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn missing_directory_is_a_validation_error() -> TestResult {
    init_tracing();
    let sup = start(
        MockFileSystem::new(),
        Arc::new(RecordingLauncher::new()),
        MemorySnapshotStore::new(),
    )
    .await;

    let err = sup.deploy_from_directory(1, "nowhere").await.unwrap_err();
    assert!(matches!(err, BotkeeperError::Validation(_)), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn partial_failures_still_deploy_the_rest() -> TestResult {
    init_tracing();
    let store = MemorySnapshotStore::new();
    let sup = start(
        scripts_tree(),
        Arc::new(FailingLauncher::only_for("worker")),
        store.clone(),
    )
    .await;

    assert_eq!(sup.deploy_from_directory(3, "scripts").await?, 1);
    let listing = sup.list();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name, "scripts/main.py");

    sup.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn all_failures_is_a_process_error_and_nothing_is_saved() -> TestResult {
    init_tracing();
    let fs = scripts_tree();
    let store = MemorySnapshotStore::new();
    let sup = start(fs.clone(), Arc::new(FailingLauncher::new()), store.clone()).await;

    let err = sup.deploy_from_directory(3, "scripts").await.unwrap_err();
    assert!(matches!(err, BotkeeperError::Process(_)), "{err:?}");
    assert!(sup.list().is_empty());
    assert_eq!(store.save_count(), 0);
    assert!(!fs.exists(Path::new("bots/repo_scripts")));
    Ok(())
}

#[tokio::test]
async fn directory_without_scripts_deploys_nothing() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file("docs/readme.md", "# hi");
    let store = MemorySnapshotStore::new();
    let sup = start(fs.clone(), Arc::new(RecordingLauncher::new()), store.clone()).await;

    assert_eq!(sup.deploy_from_directory(1, "docs").await?, 0);
    assert_eq!(store.save_count(), 0);
    assert!(!fs.exists(Path::new("bots/repo_docs")));
    Ok(())
}

#[tokio::test]
async fn stop_removes_the_copy_and_keeps_the_source() -> TestResult {
    init_tracing();
    let fs = scripts_tree();
    let sup = start(fs.clone(), Arc::new(RecordingLauncher::new()), MemorySnapshotStore::new()).await;

    sup.deploy_from_directory(8, "scripts").await?;
    sup.stop(1, 8).await?;

    assert!(fs.contents("bots/repo_scripts/main.py").is_none());
    assert!(fs.contents("bots/repo_scripts/pkg/worker.py").is_some());
    assert_eq!(fs.contents("scripts/main.py"), Some(b"print('main')".to_vec()));

    sup.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn same_directory_under_another_spelling_is_not_deployed_twice() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let scripts = root.path().join("scripts");
    write_script(&scripts, "main.sh", LONG_RUNNING_SCRIPT);
    std::fs::create_dir_all(scripts.join("sub"))?;

    let sup = start_real(sh_config(root.path())).await;

    assert_eq!(sup.deploy_from_directory(1, &scripts).await?, 1);
    assert_eq!(sup.deploy_from_directory(1, scripts.join("sub/..")).await?, 0);

    #[cfg(unix)]
    {
        let link = root.path().join("scripts-link");
        std::os::unix::fs::symlink(&scripts, &link)?;
        assert_eq!(sup.deploy_from_directory(1, &link).await?, 0);
    }

    let listing = sup.list();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name, "scripts/main.sh");

    sup.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn stopping_a_directory_bot_leaves_the_operator_tree_alone() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let operator = tempfile::tempdir()?;
    let source = write_script(operator.path(), "main.sh", LONG_RUNNING_SCRIPT);

    let cfg = sh_config(root.path());
    let configured_work_dir = cfg.supervisor.work_dir.clone();
    let sup = start_real(cfg).await;
    let work_dir = std::fs::canonicalize(&configured_work_dir)?;

    assert_eq!(sup.deploy_from_directory(1, operator.path()).await?, 1);
    let backing = sup.describe(1).await.expect("record").file;
    let backing_resolved = std::fs::canonicalize(&backing)?;
    assert!(backing_resolved.starts_with(&work_dir), "{backing:?}");

    sup.stop(1, 1).await?;
    assert!(!backing.exists());
    assert_eq!(std::fs::read_to_string(&source)?, LONG_RUNNING_SCRIPT);

    sup.shutdown().await;
    Ok(())
}
