use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use anyhow::bail;
use clap::{command, value_parser, Arg, ArgAction, ArgMatches, Command};
use context::{Context, DEFAULT_POSTS_MARKER};
use history::Git;
use log::info;

mod context;
mod history;
mod post;
mod updater;

fn cli() -> Command {
    command!()
        .about("Stamps blog posts with the date of their latest commit")
        .args([
            Arg::new("paths")
                .help("Changed file paths, relative to base_dir. Only posts are updated.")
                .num_args(1..)
                .value_parser(value_parser!(PathBuf))
                .conflicts_with("posts_dir"),
            Arg::new("base_dir")
                .short('b')
                .long("base-dir")
                .help("Directory the paths are relative to")
                .value_parser(value_parser!(PathBuf))
                .default_value("."),
            Arg::new("posts_marker")
                .short('m')
                .long("posts-marker")
                .help("Only paths containing this are treated as posts")
                .default_value(DEFAULT_POSTS_MARKER),
            Arg::new("posts_dir")
                .short('d')
                .long("posts-dir")
                .help("Update every markdown file in this directory instead of the given paths")
                .value_parser(value_parser!(PathBuf)),
            Arg::new("git")
                .long("git")
                .help("git executable")
                .value_parser(value_parser!(OsString))
                .default_value("git"),
            Arg::new("dry_run")
                .short('n')
                .long("dry-run")
                .help("Look up dates without writing any file")
                .action(ArgAction::SetTrue),
        ])
}

/// Returns the posts that were updated.
fn run(matches: &ArgMatches) -> anyhow::Result<Vec<PathBuf>> {
    let ctx = Context::from_matches(matches);
    if !ctx.base_dir.is_dir() {
        bail!("base_dir must be a directory.");
    }
    let git = Git::new(ctx.git.clone());

    if let Some(dir) = matches.get_one::<PathBuf>("posts_dir") {
        return updater::update_posts_in_dir(&ctx, &git, dir);
    }
    let paths: Vec<PathBuf> = matches
        .get_many::<PathBuf>("paths")
        .map(|p| p.cloned().collect())
        .unwrap_or_default();
    if paths.is_empty() {
        info!("no paths given. nothing to do.");
    }
    updater::update_posts_last_modified(&ctx, &git, &paths)
}

/// Joins `paths` with spaces, relative to `base_dir` as they were given.
fn format_updated(paths: &[PathBuf], base_dir: &Path) -> String {
    paths
        .iter()
        .map(|p| p.strip_prefix(base_dir).unwrap_or(p.as_path()).to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = cli().get_matches();
    let updated = run(&matches)?;
    if !updated.is_empty() {
        let base_dir = Context::from_matches(&matches).base_dir;
        println!("{}", format_updated(&updated, &base_dir));
    }

    Ok(())
}
