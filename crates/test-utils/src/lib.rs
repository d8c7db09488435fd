pub mod builders;
pub mod fake_launcher;

use std::path::Path;
use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 10-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(10), f)
        .await
        .expect("Test timed out after 10 seconds")
}

/// Config that runs `.sh` bots with `sh` out of `root`, with short timeouts.
pub fn sh_config(root: &Path) -> botkeeper::config::ConfigFile {
    builders::ConfigFileBuilder::new()
        .with_root(root)
        .with_shell_launcher()
        .build()
}

/// A bot body that stays alive until signalled.
pub const LONG_RUNNING_SCRIPT: &str = "exec sleep 30\n";

/// A bot body that exits immediately with status 3.
pub const CRASHING_SCRIPT: &str = "exit 3\n";
