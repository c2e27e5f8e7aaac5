//! Teardown Contract Tests
//!
//! Disposal must release every resource exactly once, never stall, and
//! report locked directories according to the caller's choice.

use sitestage_core::staging::{remove_with_retry, DirectoryRemover, RetryPolicy, TreeRemover};
use sitestage_core::supervisor::{
    launch_promise, LaunchCommand, LaunchOutcome, ProcessEntry, ProcessInspector, ProcessSupervisor,
    SupervisorState, TeardownPlan,
};
use sitestage_core::{Result, SiteError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Always fails, as if another process held the directory open
#[derive(Default)]
struct HeldOpenRemover {
    calls: AtomicU32,
}

impl DirectoryRemover for HeldOpenRemover {
    fn remove_all(&self, path: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SiteError::IoError(format!(
            "The process cannot access '{}' because it is being used by another process",
            path.display()
        )))
    }
}

#[derive(Default)]
struct CountingInspector {
    listings: AtomicU32,
    kills: Mutex<Vec<u32>>,
}

impl ProcessInspector for CountingInspector {
    fn processes(&self) -> Result<Vec<ProcessEntry>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    fn kill(&self, pid: u32) -> Result<bool> {
        self.kills.lock().unwrap().push(pid);
        Ok(true)
    }
}

fn staged_instance(temp: &TempDir) -> (PathBuf, PathBuf) {
    let staged = temp.path().join("staged");
    fs::create_dir_all(&staged).unwrap();
    fs::write(staged.join("Web.config"), "<configuration />").unwrap();
    let config = temp.path().join("config_45000/applicationhost.config");
    fs::create_dir_all(config.parent().unwrap()).unwrap();
    fs::write(&config, "<configuration />").unwrap();
    (staged, config)
}

fn supervisor(
    staged: &Path,
    config: &Path,
    ignore: bool,
    inspector: Arc<CountingInspector>,
    remover: Arc<dyn DirectoryRemover>,
) -> ProcessSupervisor {
    ProcessSupervisor::with_collaborators(
        LaunchCommand::new("iisexpress", config, "SiteStage_45000", staged),
        TeardownPlan::new(staged)
            .with_temp_config(config)
            .ignore_teardown_errors(ignore)
            .with_retry(RetryPolicy::new(10, Duration::from_millis(1))),
        inspector,
        remover,
    )
}

/// WHY: A held-open staged directory is retried up to the bound, then raised
/// REASON: Silent leftovers fill the temp drive over many runs
/// BREAKS: Callers relying on an error to detect leaked directories
#[test]
fn held_open_directory_raises_io_after_bounded_retries() {
    let temp = TempDir::new().unwrap();
    let (staged, config) = staged_instance(&temp);
    let remover = Arc::new(HeldOpenRemover::default());
    let instance = supervisor(&staged, &config, false, Arc::new(CountingInspector::default()), remover.clone());

    let err = instance.dispose().unwrap_err();

    assert!(err.is_io(), "Expected IO family error, got {:?}", err);
    assert_eq!(remover.calls.load(Ordering::SeqCst), 10);
    assert_eq!(instance.state(), SupervisorState::Stopped);
    assert!(!config.exists());
}

/// WHY: ignore_teardown_errors downgrades the failure to a log line
/// REASON: Test suites on locked-down CI agents must not fail on cleanup
/// BREAKS: Suites that opted in to tolerant teardown
#[test]
fn held_open_directory_is_ignored_when_requested() {
    let temp = TempDir::new().unwrap();
    let (staged, config) = staged_instance(&temp);
    let remover = Arc::new(HeldOpenRemover::default());
    let instance = supervisor(&staged, &config, true, Arc::new(CountingInspector::default()), remover.clone());

    instance.dispose().unwrap();

    assert_eq!(remover.calls.load(Ordering::SeqCst), 10);
    assert_eq!(instance.state(), SupervisorState::Stopped);
}

/// WHY: A second dispose performs no OS actions
/// REASON: Dispose runs from explicit calls and from Drop
/// BREAKS: Double kills hitting a reused process id
#[test]
fn dispose_twice_equals_dispose_once() {
    let temp = TempDir::new().unwrap();
    let (staged, config) = staged_instance(&temp);
    let inspector = Arc::new(CountingInspector::default());
    let remover = Arc::new(HeldOpenRemover::default());
    let instance = supervisor(&staged, &config, true, inspector.clone(), remover.clone());

    instance.dispose().unwrap();
    let listings = inspector.listings.load(Ordering::SeqCst);
    let removals = remover.calls.load(Ordering::SeqCst);

    instance.dispose().unwrap();
    drop(instance);

    assert_eq!(inspector.listings.load(Ordering::SeqCst), listings);
    assert_eq!(remover.calls.load(Ordering::SeqCst), removals);
}

/// WHY: Disposing an instance that never launched must not wait for a pid
/// REASON: The pid hand-off resolves to "not launched" once nobody can publish
/// BREAKS: Test runs hanging forever in teardown
#[test]
fn dispose_without_launch_does_not_stall() {
    let temp = TempDir::new().unwrap();
    let (staged, config) = staged_instance(&temp);
    let inspector = Arc::new(CountingInspector::default());
    let instance = supervisor(&staged, &config, false, inspector.clone(), Arc::new(TreeRemover));

    instance.dispose().unwrap();

    assert!(matches!(instance.wait_for_launch(), LaunchOutcome::NotLaunched(_)));
    assert!(inspector.kills.lock().unwrap().is_empty());
    assert!(!staged.exists());
}

/// WHY: The pid promise is single-assignment
/// REASON: The publisher is consumed by its only use
/// BREAKS: Teardown killing a pid that was overwritten
#[test]
fn pid_is_published_once() {
    let (publisher, promise) = launch_promise();
    publisher.publish(LaunchOutcome::Launched { pid: 1234 });

    assert_eq!(promise.wait().pid(), Some(1234));
    assert_eq!(promise.wait().pid(), Some(1234));
}

/// WHY: Retries stop at the first success
/// REASON: A directory released after a moment must not cost the full bound
/// BREAKS: Slow teardown for every instance
#[test]
fn retry_stops_on_first_success() {
    struct ReleasedAfter(AtomicU32);

    impl DirectoryRemover for ReleasedAfter {
        fn remove_all(&self, _path: &Path) -> Result<()> {
            if self.0.fetch_add(1, Ordering::SeqCst) < 2 {
                return Err(SiteError::IoError("in use".to_string()));
            }
            Ok(())
        }
    }

    let remover = ReleasedAfter(AtomicU32::new(0));
    let attempts = remove_with_retry(&remover, Path::new("/tmp/x"), &RetryPolicy::new(10, Duration::from_millis(1)))
        .unwrap();
    assert_eq!(attempts, 3);
}
