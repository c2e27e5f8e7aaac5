//! Server process launch and teardown
//!
//! A supervisor owns one server process and every on-disk resource created
//! for it. The process runs on a dedicated worker thread; teardown is
//! ordered, idempotent, and runs from `dispose`, from `Drop`, or from the
//! worker itself when the launch fails.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::errors::{Result, SiteError};
use crate::staging::{remove_tree, remove_with_retry, DirectoryRemover, RetryPolicy, TreeRemover};
use crate::supervisor::inspector::{find_orphans, ProcessInspector, SystemInspector};
use crate::supervisor::promise::{launch_promise, LaunchOutcome, LaunchPromise, LaunchPublisher};
use crate::supervisor::state::SupervisorState;

/// Upper bound on waiting for the worker to observe a killed server
const WORKER_EXIT_TIMEOUT: Duration = Duration::from_secs(10);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Server executable invocation for one site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub executable: PathBuf,
    pub config_file: PathBuf,
    pub site_name: String,
    pub working_dir: PathBuf,
    pub environment: BTreeMap<String, String>,
}

impl LaunchCommand {
    pub fn new<E, C, W>(executable: E, config_file: C, site_name: &str, working_dir: W) -> Self
    where
        E: Into<PathBuf>,
        C: Into<PathBuf>,
        W: Into<PathBuf>,
    {
        Self {
            executable: executable.into(),
            config_file: config_file.into(),
            site_name: site_name.to_string(),
            working_dir: working_dir.into(),
            environment: BTreeMap::new(),
        }
    }

    pub fn with_environment(mut self, environment: BTreeMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    /// `/config:<file> /site:<name>`
    pub fn arguments(&self) -> Vec<String> {
        vec![
            format!("/config:{}", self.config_file.display()),
            format!("/site:{}", self.site_name),
        ]
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.executable);
        command
            .args(self.arguments())
            .current_dir(&self.working_dir)
            .envs(&self.environment)
            .stdin(Stdio::null());
        command
    }
}

/// Resources released at teardown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownPlan {
    pub staged_path: PathBuf,
    /// Deleted together with its directory
    pub temp_config_path: Option<PathBuf>,
    /// Remove the config directory with all its contents; otherwise only when empty
    pub owns_config_dir: bool,
    pub remove_on_exit: bool,
    pub ignore_teardown_errors: bool,
    pub retry: RetryPolicy,
}

impl TeardownPlan {
    pub fn new<P: Into<PathBuf>>(staged_path: P) -> Self {
        Self {
            staged_path: staged_path.into(),
            temp_config_path: None,
            owns_config_dir: false,
            remove_on_exit: true,
            ignore_teardown_errors: false,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_temp_config<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.temp_config_path = Some(path.into());
        self
    }

    /// Config directory was created for this instance alone
    pub fn owns_config_dir(mut self, owned: bool) -> Self {
        self.owns_config_dir = owned;
        self
    }

    pub fn remove_on_exit(mut self, remove: bool) -> Self {
        self.remove_on_exit = remove;
        self
    }

    pub fn ignore_teardown_errors(mut self, ignore: bool) -> Self {
        self.ignore_teardown_errors = ignore;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// How the server process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitRecord {
    pub code: Option<i32>,
    pub success: bool,
    /// True when the exit happened before teardown began
    pub natural: bool,
}

struct SupervisorInner {
    command: LaunchCommand,
    plan: TeardownPlan,
    inspector: Arc<dyn ProcessInspector>,
    remover: Arc<dyn DirectoryRemover>,
    state: Mutex<SupervisorState>,
    teardown: Mutex<()>,
    publisher: Mutex<Option<LaunchPublisher>>,
    promise: LaunchPromise,
    worker_done: Mutex<Option<Receiver<()>>>,
    exit: OnceCell<ExitRecord>,
}

/// Owns one server process and its staged resources
pub struct ProcessSupervisor {
    inner: Arc<SupervisorInner>,
}

impl ProcessSupervisor {
    /// Supervisor using the OS process table and filesystem
    pub fn new(command: LaunchCommand, plan: TeardownPlan) -> Self {
        Self::with_collaborators(command, plan, Arc::new(SystemInspector), Arc::new(TreeRemover))
    }

    pub fn with_collaborators(
        command: LaunchCommand,
        plan: TeardownPlan,
        inspector: Arc<dyn ProcessInspector>,
        remover: Arc<dyn DirectoryRemover>,
    ) -> Self {
        let (publisher, promise) = launch_promise();
        Self {
            inner: Arc::new(SupervisorInner {
                command,
                plan,
                inspector,
                remover,
                state: Mutex::new(SupervisorState::NotStarted),
                teardown: Mutex::new(()),
                publisher: Mutex::new(Some(publisher)),
                promise,
                worker_done: Mutex::new(None),
                exit: OnceCell::new(),
            }),
        }
    }

    /// Launch the server on a dedicated thread and return immediately
    ///
    /// # Errors
    /// - `SiteError::Process` if already started or disposed, or if the
    ///   worker thread cannot be created
    pub fn start(&self) -> Result<()> {
        let publisher = {
            let mut state = lock(&self.inner.state);
            if *state != SupervisorState::NotStarted {
                return Err(SiteError::Process(format!(
                    "Cannot start site '{}' in state {}",
                    self.inner.command.site_name, *state
                )));
            }

            let publisher = lock(&self.inner.publisher).take().ok_or_else(|| {
                SiteError::Process(format!("Site '{}' was already launched", self.inner.command.site_name))
            })?;
            *state = SupervisorState::Starting;
            publisher
        };

        let (done_tx, done_rx) = mpsc::sync_channel::<()>(0);
        *lock(&self.inner.worker_done) = Some(done_rx);

        let inner = Arc::clone(&self.inner);
        thread::Builder::new()
            .name(format!("sitestage-{}", self.inner.command.site_name))
            .spawn(move || run_worker(inner, publisher, done_tx))
            .map_err(|e| SiteError::Process(format!("Failed to start launch worker: {}", e)))?;

        tracing::debug!(
            site = %self.inner.command.site_name,
            executable = %self.inner.command.executable.display(),
            "Launch worker started"
        );
        Ok(())
    }

    pub fn state(&self) -> SupervisorState {
        *lock(&self.inner.state)
    }

    /// Process id if the launch has already resolved
    pub fn pid(&self) -> Option<u32> {
        self.inner.promise.try_get().and_then(LaunchOutcome::pid)
    }

    /// Block until the launch resolves
    pub fn wait_for_launch(&self) -> LaunchOutcome {
        self.inner.promise.wait().clone()
    }

    /// Exit of the server process, once the worker has observed it
    pub fn exit_status(&self) -> Option<ExitRecord> {
        self.inner.exit.get().copied()
    }

    pub fn command(&self) -> &LaunchCommand {
        &self.inner.command
    }

    pub fn plan(&self) -> &TeardownPlan {
        &self.inner.plan
    }

    /// Release everything this supervisor owns
    ///
    /// Later calls are no-ops. Concurrent callers wait for the first.
    ///
    /// # Errors
    /// `SiteError::Removal` when the staged directory could not be deleted
    /// and teardown errors are not ignored. The instance is `Stopped` either way.
    pub fn dispose(&self) -> Result<()> {
        self.inner.dispose()
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if let Err(e) = self.inner.dispose() {
            tracing::error!(site = %self.inner.command.site_name, error = %e, "Teardown failed on drop");
        }
    }
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("site", &self.inner.command.site_name)
            .field("state", &self.state())
            .field("pid", &self.pid())
            .finish()
    }
}

fn run_worker(inner: Arc<SupervisorInner>, publisher: LaunchPublisher, done: SyncSender<()>) {
    let site = inner.command.site_name.clone();

    let mut child = match inner.command.to_command().spawn() {
        Ok(child) => child,
        Err(e) => {
            let reason = format!(
                "Failed to launch '{}': {}",
                inner.command.executable.display(),
                e
            );
            tracing::error!(site = %site, error = %e, "Server launch failed");
            publisher.publish(LaunchOutcome::NotLaunched(reason));
            drop(done);

            if let Err(e) = inner.dispose() {
                tracing::error!(site = %site, error = %e, "Teardown after failed launch failed");
            }
            return;
        }
    };

    let pid = child.id();
    {
        let mut state = lock(&inner.state);
        if *state == SupervisorState::Starting {
            *state = SupervisorState::Running;
        }
    }
    publisher.publish(LaunchOutcome::Launched { pid });
    tracing::info!(site = %site, pid, "Server process started");

    match child.wait() {
        Ok(status) => {
            let natural = !lock(&inner.state).is_disposing();
            let _ = inner.exit.set(exit_record(status, natural));
            tracing::info!(site = %site, pid, code = ?status.code(), natural, "Server process exited");
        }
        Err(e) => tracing::warn!(site = %site, pid, error = %e, "Failed waiting for server process"),
    }

    drop(done);
}

fn exit_record(status: ExitStatus, natural: bool) -> ExitRecord {
    ExitRecord {
        code: status.code(),
        success: status.success(),
        natural,
    }
}

impl SupervisorInner {
    fn dispose(&self) -> Result<()> {
        let _teardown = lock(&self.teardown);
        {
            let mut state = lock(&self.state);
            if state.is_disposing() {
                return Ok(());
            }
            *state = SupervisorState::Stopping;
        }

        let site = &self.command.site_name;
        tracing::info!(site = %site, staged = %self.plan.staged_path.display(), "Tearing down server instance");

        // Never started: resolve the promise as not launched
        lock(&self.publisher).take();
        let outcome = self.promise.wait().clone();

        self.kill_orphans();

        if let LaunchOutcome::Launched { pid } = outcome {
            self.kill_primary(pid);
            self.wait_for_worker();
        }

        let removal = self.remove_staged_directory();
        self.remove_temp_config();

        *lock(&self.state) = SupervisorState::Stopped;
        tracing::info!(site = %site, "Server instance stopped");
        removal
    }

    fn kill_orphans(&self) {
        let entries = match self.inspector.processes() {
            Ok(entries) => entries,
            Err(e) => {
                let err = SiteError::OrphanCleanup(format!("Could not list processes: {}", e));
                tracing::warn!(error = %err, "Orphan cleanup skipped");
                return;
            }
        };

        for orphan in find_orphans(&entries, &self.plan.staged_path, std::process::id()) {
            match self.inspector.kill(orphan.pid) {
                Ok(true) => tracing::info!(pid = orphan.pid, exe = ?orphan.exe, "Killed orphaned process"),
                Ok(false) => tracing::debug!(pid = orphan.pid, "Orphaned process already exited"),
                Err(e) => {
                    let err = SiteError::OrphanCleanup(format!("Could not kill process {}: {}", orphan.pid, e));
                    tracing::warn!(error = %err, "Orphan cleanup failed");
                }
            }
        }
    }

    fn kill_primary(&self, pid: u32) {
        if self.exit.get().is_some() {
            tracing::debug!(pid, "Server process already exited");
            return;
        }

        match self.inspector.kill(pid) {
            Ok(true) => tracing::info!(pid, "Killed server process"),
            Ok(false) => tracing::debug!(pid, "Server process already exited"),
            Err(e) => tracing::error!(pid, error = %e, "Could not kill server process"),
        }
    }

    fn wait_for_worker(&self) {
        let Some(done) = lock(&self.worker_done).take() else {
            return;
        };

        match done.recv_timeout(WORKER_EXIT_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => tracing::warn!(
                site = %self.command.site_name,
                timeout_secs = WORKER_EXIT_TIMEOUT.as_secs(),
                "Server process did not exit after kill"
            ),
        }
    }

    fn remove_staged_directory(&self) -> Result<()> {
        let path = &self.plan.staged_path;
        if !self.plan.remove_on_exit {
            tracing::debug!(path = %path.display(), "Keeping staged directory");
            return Ok(());
        }
        if fs::symlink_metadata(path).is_err() {
            return Ok(());
        }

        match remove_with_retry(self.remover.as_ref(), path, &self.plan.retry) {
            Ok(attempts) => {
                tracing::debug!(path = %path.display(), attempts, "Removed staged directory");
                Ok(())
            }
            Err(e) if self.plan.ignore_teardown_errors => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring staged directory removal failure");
                Ok(())
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Could not remove staged directory");
                Err(e)
            }
        }
    }

    fn remove_temp_config(&self) {
        let Some(config) = &self.plan.temp_config_path else {
            return;
        };

        if let Err(e) = fs::remove_file(config) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %config.display(), error = %e, "Could not delete temp configuration");
            }
        }

        let Some(dir) = config.parent().filter(|p| !p.as_os_str().is_empty()) else {
            return;
        };
        if !self.plan.owns_config_dir {
            remove_empty_dir(dir);
            return;
        }

        match remove_tree(dir) {
            Ok(()) => tracing::debug!(path = %dir.display(), "Removed temp configuration directory"),
            Err(e) => tracing::warn!(path = %dir.display(), error = %e, "Could not delete temp configuration directory"),
        }
    }
}

fn remove_empty_dir(dir: &Path) {
    match fs::remove_dir(dir) {
        Ok(()) => tracing::debug!(path = %dir.display(), "Removed temp configuration directory"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %dir.display(), error = %e, "Could not delete temp configuration directory"),
    }
}
