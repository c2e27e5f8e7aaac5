//! Staging Integration Tests
//!
//! Stages realistic website trees through the configured exclusions,
//! applies transforms to the staged copy, and removes the result.
//!
//! Uses tempfile for isolation - NO /tmp pollution

use sitestage_core::staging::{remove_tree, DirectoryStager};
use sitestage_core::transform::{apply_staged_transform, ConfigTransformer, TransformOutcome};
use sitestage_core::{Result, SiteHostConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper to create an ASP.NET style website tree
fn create_website(root: &Path) {
    let dirs = ["bin", "obj/Release", ".vs/config", "Content/css", "Views/Home", ".git/objects"];
    for dir in dirs {
        fs::create_dir_all(root.join(dir)).unwrap();
    }

    let files = [
        ("Web.config", "<configuration><appSettings><add key=\"env\" value=\"dev\" /></appSettings></configuration>"),
        ("Web.Release.config", "<configuration xmlns:xdt=\"http://schemas.microsoft.com/XML-Document-Transform\" />"),
        ("Global.asax", "<%@ Application Codebehind=\"Global.asax.cs\" %>"),
        ("Global.asax.cs", "public class MvcApplication {}"),
        ("MySite.csproj", "<Project />"),
        ("MySite.csproj.user", "<Project />"),
        ("packages.config", "<packages />"),
        ("bin/MySite.dll", "MZ"),
        ("obj/Release/MySite.dll", "MZ"),
        (".vs/config/applicationhost.config", "<configuration />"),
        ("Content/css/site.css", "body {}"),
        ("Views/Home/Index.cshtml", "<h1>Hello</h1>"),
        (".git/objects/pack", "PACK"),
    ];
    for (path, content) in files {
        fs::write(root.join(path), content).unwrap();
    }
}

fn relative_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

struct ReleaseTransformer;

impl ConfigTransformer for ReleaseTransformer {
    fn apply(&self, base_config: &Path, _transform: &Path) -> Result<Option<Vec<u8>>> {
        Ok(Some(fs::read_to_string(base_config)?.replace("dev", "release").into_bytes()))
    }
}

#[test]
fn test_stage_website_with_configured_defaults() {
    let temp = TempDir::new().unwrap();
    let website = temp.path().join("MySite");
    create_website(&website);
    let staged = temp.path().join("staged");

    let config = SiteHostConfig::default();
    let stager = DirectoryStager::new(config.staging.file_policy().unwrap(), config.staging.directory_policy());
    let copied = stager.stage(&website, &staged).unwrap();

    assert_eq!(
        relative_files(&staged),
        vec![
            "Content/css/site.css",
            "Global.asax",
            "Views/Home/Index.cshtml",
            "Web.Release.config",
            "Web.config",
            "bin/MySite.dll",
        ]
    );
    // staged, bin, Content, Content/css, Views, Views/Home + 6 files
    assert_eq!(copied, 12);
}

#[test]
fn test_stage_then_transform_then_remove() {
    let temp = TempDir::new().unwrap();
    let website = temp.path().join("MySite");
    create_website(&website);
    let staged = temp.path().join("staged");

    DirectoryStager::with_defaults().stage(&website, &staged).unwrap();
    let outcome = apply_staged_transform(&staged, "Web.config", Some("Release"), &ReleaseTransformer).unwrap();

    assert_eq!(outcome, TransformOutcome::Applied(staged.join("Web.config")));
    assert!(fs::read_to_string(staged.join("Web.config"))
        .unwrap()
        .contains("value=\"release\""));
    // Source tree is never modified
    assert!(fs::read_to_string(website.join("Web.config"))
        .unwrap()
        .contains("value=\"dev\""));
    assert_eq!(relative_files(&staged).len(), 6);

    remove_tree(&staged).unwrap();
    assert!(!staged.exists());
    assert!(website.join("Web.config").exists());
}

#[test]
fn test_custom_directory_rule() {
    let temp = TempDir::new().unwrap();
    let website = temp.path().join("MySite");
    create_website(&website);
    fs::create_dir_all(website.join("node_modules/left-pad")).unwrap();
    fs::write(website.join("node_modules/left-pad/index.js"), "module.exports = 1").unwrap();
    let staged = temp.path().join("staged");

    let mut config = SiteHostConfig::default();
    config.staging.excluded_directories.push("node_modules".to_string());
    config.staging.excluded_patterns.push(r"\.cshtml$".to_string());
    let stager = DirectoryStager::new(config.staging.file_policy().unwrap(), config.staging.directory_policy());

    stager.stage(&website, &staged).unwrap();

    let files = relative_files(&staged);
    assert!(!files.iter().any(|f| f.starts_with("node_modules")));
    assert!(!files.iter().any(|f| f.ends_with(".cshtml")));
    assert!(staged.join("Views/Home").is_dir());
}

#[test]
fn test_deep_tree_stage_and_remove() {
    let temp = TempDir::new().unwrap();
    let website = temp.path().join("deep");
    let mut leaf: PathBuf = website.clone();
    for depth in 0..48 {
        leaf = leaf.join(format!("level{}", depth));
    }
    fs::create_dir_all(&leaf).unwrap();
    fs::write(leaf.join("deep.txt"), "bottom").unwrap();
    let staged = temp.path().join("staged");

    let copied = DirectoryStager::with_defaults().stage(&website, &staged).unwrap();

    // staged + 48 levels + 1 file
    assert_eq!(copied, 50);
    assert_eq!(relative_files(&staged).len(), 1);

    remove_tree(&staged).unwrap();
    assert!(!staged.exists());
}
