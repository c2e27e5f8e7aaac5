//! Instance Lifecycle Integration Tests
//!
//! Tests the full provisioning path: allocate, stage, transform, generate,
//! launch, dispose. The admin tool is replaced by a recorder that appends
//! each edit to the instance's configuration file; the server is a shell
//! script, so launch tests are unix only.
//!
//! Uses tempfile for isolation - NO /tmp pollution

use sitestage_core::exec::CapturedOutput;
use sitestage_core::port::{PortAllocator, PortPoolRange, StaticConnectionTable};
use sitestage_core::siteconfig::AdminTool;
use sitestage_core::staging::DirectoryRemover;
use sitestage_core::{Result, SiteError, SiteHost, SiteHostConfig, SupervisorState, WebsiteOptions};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Appends the mutation argument of each call to the `/AppHostConfig:` file
struct AppendingAdminTool;

impl AdminTool for AppendingAdminTool {
    fn run(&self, args: &[String]) -> Result<CapturedOutput> {
        let file = args
            .iter()
            .find_map(|a| a.strip_prefix("/AppHostConfig:"))
            .map(PathBuf::from)
            .ok_or_else(|| SiteError::Argument("missing /AppHostConfig".to_string()))?;

        let mut handle = fs::OpenOptions::new().append(true).open(file)?;
        writeln!(handle, "{}", args[3])?;

        Ok(CapturedOutput {
            exit_code: Some(0),
            stdout: vec!["APPHOST object changed".to_string()],
            stderr: vec![],
        })
    }
}

struct HeldOpenRemover;

impl DirectoryRemover for HeldOpenRemover {
    fn remove_all(&self, path: &Path) -> Result<()> {
        Err(SiteError::IoError(format!("{} is in use", path.display())))
    }
}

struct TestEnv {
    temp: TempDir,
    website: PathBuf,
    template: PathBuf,
}

impl TestEnv {
    fn temp_root(&self) -> PathBuf {
        self.temp.path().join("tmp")
    }

    fn options(&self) -> WebsiteOptions {
        WebsiteOptions::new(&self.website, &self.template).temp_root(self.temp_root())
    }
}

/// Helper to create a website and template
fn create_env() -> TestEnv {
    let temp = TempDir::new().unwrap();
    let website = temp.path().join("MySite");
    fs::create_dir_all(website.join("bin")).unwrap();
    fs::create_dir_all(website.join("obj")).unwrap();
    fs::write(website.join("Web.config"), "<configuration />").unwrap();
    fs::write(website.join("MySite.csproj"), "<Project />").unwrap();
    fs::write(website.join("bin/MySite.dll"), "MZ").unwrap();
    fs::write(website.join("obj/MySite.dll"), "MZ").unwrap();

    let template = temp.path().join("applicationhost.template.config");
    fs::write(&template, "<configuration>\n").unwrap();

    TestEnv {
        temp,
        website,
        template,
    }
}

/// Helper to build a host with a fake port table and admin tool
fn create_host(server: &Path) -> SiteHost {
    let mut config = SiteHostConfig::default();
    config.server.executable = server.to_path_buf();
    config.ports.http = PortPoolRange::new(46000, 10).unwrap();
    config.ports.https = PortPoolRange::new(46000, 10).unwrap();
    config.teardown.attempts = 3;
    config.teardown.delay_ms = 5;

    SiteHost::new(config)
        .unwrap()
        .with_allocator(PortAllocator::new(Arc::new(StaticConnectionTable::new([46000]))))
        .with_admin_tool(Arc::new(AppendingAdminTool))
}

fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(25));
    }
    false
}

#[cfg(unix)]
fn write_server_script(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    fs::create_dir_all(dir).unwrap();
    let script = dir.join("fake-server.sh");
    fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    script
}

#[test]
fn test_equal_ports_create_nothing() {
    let env = create_env();
    let host = create_host(Path::new("/nonexistent/iisexpress"));

    let result = host.start_website_blocking(env.options().http_port(46005).https(Some(46005)));

    assert!(matches!(result, Err(SiteError::Argument(_))));
    assert!(!env.temp_root().exists());
}

#[test]
fn test_missing_server_leaves_nothing_behind() {
    let env = create_env();
    let host = create_host(&env.temp.path().join("no-server"));

    let instance = host.start_website_blocking(env.options()).unwrap();
    assert!(instance.wait_for_launch().pid().is_none());
    assert!(wait_until(|| instance.state() == SupervisorState::Stopped));

    assert!(!instance.staged_website_path().exists());
    assert!(!instance.temp_config_path().exists());
    instance.dispose().unwrap();
}

#[cfg(unix)]
#[test]
fn test_full_lifecycle() {
    let env = create_env();
    let server = write_server_script(&env.temp.path().join("server"), "exec sleep 30");
    let host = create_host(&server);

    let instance = host
        .start_website_blocking(env.options().https(None).host_name("mysite.test").transform("Release"))
        .unwrap();

    assert_eq!(instance.http_port(), 46001);
    assert_eq!(instance.https_port(), Some(46002));
    let pid = instance.wait_for_launch().pid().expect("server should launch");
    assert!(wait_until(|| instance.state() == SupervisorState::Running));
    assert_eq!(instance.process_id(), Some(pid));

    let staged = instance.staged_website_path().to_path_buf();
    assert!(staged.join("Web.config").exists());
    assert!(staged.join("bin/MySite.dll").exists());
    assert!(!staged.join("MySite.csproj").exists());
    assert!(!staged.join("obj").exists());

    let config = fs::read_to_string(instance.temp_config_path()).unwrap();
    assert!(config.starts_with("<configuration>\n"));
    assert!(config.contains("bindingInformation='*:46001:mysite.test'"));
    assert!(config.contains("protocol='https',bindingInformation='*:46002:mysite.test'"));
    assert!(config.contains(&format!("physicalPath='{}'", staged.display())));

    let summary = serde_json::to_value(instance.summary()).unwrap();
    assert_eq!(summary["siteName"], "SiteStage_46001");
    assert_eq!(summary["processId"], pid);

    instance.dispose().unwrap();

    assert_eq!(instance.state(), SupervisorState::Stopped);
    assert!(!staged.exists());
    assert!(!instance.temp_config_path().exists());
    assert!(!instance.exit_status().unwrap().natural);
}

#[cfg(unix)]
#[test]
fn test_environment_and_working_directory() {
    let env = create_env();
    let server = write_server_script(
        &env.temp.path().join("server"),
        "echo \"$SITESTAGE_TEST_VALUE\" > env.txt\nexec sleep 30",
    );
    let host = create_host(&server);

    let instance = host
        .start_website_blocking(env.options().env("SITESTAGE_TEST_VALUE", "42").remove_on_exit(false))
        .unwrap();
    let staged = instance.staged_website_path().to_path_buf();

    assert!(wait_until(|| staged.join("env.txt").exists()));
    instance.dispose().unwrap();

    assert_eq!(fs::read_to_string(staged.join("env.txt")).unwrap().trim(), "42");
    assert!(!instance.temp_config_path().exists());
}

#[cfg(unix)]
#[test]
fn test_orphaned_processes_are_killed() {
    use sitestage_core::supervisor::{ProcessInspector, SystemInspector};

    let env = create_env();
    let server = write_server_script(
        &env.temp.path().join("server"),
        "cp \"$(command -v sleep)\" bin/sleep\n./bin/sleep 60 &\necho $! > orphan.pid\nexec sleep 60",
    );
    let host = create_host(&server);

    let instance = host
        .start_website_blocking(env.options().remove_on_exit(false))
        .unwrap();
    let staged = instance.staged_website_path().to_path_buf();
    assert!(wait_until(|| fs::read_to_string(staged.join("orphan.pid"))
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false)));
    let orphan: u32 = fs::read_to_string(staged.join("orphan.pid")).unwrap().trim().parse().unwrap();

    instance.dispose().unwrap();

    let orphan_alive = || {
        SystemInspector
            .processes()
            .unwrap()
            .iter()
            .any(|p| p.pid == orphan && !p.exited)
    };
    assert!(wait_until(|| !orphan_alive()), "orphan {} still running", orphan);
}

#[cfg(unix)]
#[test]
fn test_held_open_staged_directory() {
    let env = create_env();
    let server = write_server_script(&env.temp.path().join("server"), "exec sleep 30");

    let strict = create_host(&server).with_remover(Arc::new(HeldOpenRemover));
    let instance = strict.start_website_blocking(env.options()).unwrap();
    instance.wait_for_launch();

    let err = instance.dispose().unwrap_err();
    assert!(err.is_io());
    assert_eq!(instance.state(), SupervisorState::Stopped);
    assert!(!instance.temp_config_path().exists());
    instance.dispose().unwrap();

    let tolerant = create_host(&server).with_remover(Arc::new(HeldOpenRemover));
    let instance = tolerant
        .start_website_blocking(env.options().ignore_teardown_errors(true))
        .unwrap();
    instance.wait_for_launch();
    instance.dispose().unwrap();
    assert_eq!(instance.state(), SupervisorState::Stopped);
}

#[cfg(unix)]
#[test]
fn test_drop_disposes_instance() {
    let env = create_env();
    let server = write_server_script(&env.temp.path().join("server"), "exec sleep 30");
    let host = create_host(&server);

    let staged;
    {
        let instance = host.start_website_blocking(env.options()).unwrap();
        instance.wait_for_launch();
        staged = instance.staged_website_path().to_path_buf();
        assert!(staged.exists());
    }

    assert!(!staged.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_start_website_async() {
    let env = create_env();
    let server = write_server_script(&env.temp.path().join("server"), "exec sleep 30");
    let host = create_host(&server);

    let instance = host.start_website(env.options()).await.unwrap();
    assert_eq!(instance.http_port(), 46001);

    let instance = tokio::task::spawn_blocking(move || {
        instance.wait_for_launch();
        instance.dispose().map(|_| instance)
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(instance.state(), SupervisorState::Stopped);
}
