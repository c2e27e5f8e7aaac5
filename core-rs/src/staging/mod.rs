// staging/mod.rs - Website staging and staged tree removal

pub mod exclusion;
pub mod remove;
pub mod stager;

pub use exclusion::{
    DirectoryExclusionPolicy, DirectoryRule, FileExclusionPolicy, FileRule, DEFAULT_EXCLUDED_DIRECTORIES,
    DEFAULT_EXCLUDED_EXTENSIONS, DEFAULT_EXCLUDED_FILE_NAMES,
};
pub use remove::{remove_tree, remove_with_retry, DirectoryRemover, RetryPolicy, TreeRemover};
pub use stager::{stage, DirectoryStager};
