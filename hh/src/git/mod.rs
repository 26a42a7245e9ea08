//! Repository and branch resolution for changed files
//!
//! Both lookups are recomputed for every event: a multi-repo tree can route
//! consecutive events to different repositories, and the branch can change
//! between saves.

mod branch;
mod root;

pub use branch::{Branch, BranchError, BranchResolver, DEFAULT_GIT_TIMEOUT};
pub use root::{GIT_ENTRY, GitRoot, find_git_root, find_git_root_within};
