use std::{ffi::OsString, path::PathBuf};

use clap::ArgMatches;

pub(crate) const DEFAULT_POSTS_MARKER: &str = "dev-blog/_posts";

/// Settings of one run.
#[derive(Debug, Clone)]
pub(crate) struct Context {
    /// Directory the candidate paths are relative to.
    pub base_dir: PathBuf,
    /// Only paths containing this are treated as posts.
    pub posts_marker: String,
    pub git: OsString,
    pub dry_run: bool,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            posts_marker: DEFAULT_POSTS_MARKER.to_string(),
            git: "git".into(),
            dry_run: false,
        }
    }
}

impl Context {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let defaults = Self::default();
        Self {
            base_dir: matches
                .get_one::<PathBuf>("base_dir")
                .cloned()
                .unwrap_or(defaults.base_dir),
            posts_marker: matches
                .get_one::<String>("posts_marker")
                .cloned()
                .unwrap_or(defaults.posts_marker),
            git: matches
                .get_one::<OsString>("git")
                .cloned()
                .unwrap_or(defaults.git),
            dry_run: matches.get_flag("dry_run"),
        }
    }
}
