use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use chrono::DateTime;
use log::{debug, info, warn};

use crate::{context::Context, history::Lookup, post::Post};

pub(crate) const LAST_MODIFIED_KEY: &str = "last_modified_at";

/// Stamps every post in `paths` with its last commit date.
///
/// Paths not containing `ctx.posts_marker` are skipped. The rest are resolved
/// against `ctx.base_dir` and processed in order; the first failure aborts the
/// run, leaving posts saved before it as they are. Returns the resolved paths
/// of the posts that were stamped.
pub(crate) fn update_posts_last_modified<L: Lookup + ?Sized>(
    ctx: &Context,
    lookup: &L,
    paths: &[PathBuf],
) -> anyhow::Result<Vec<PathBuf>> {
    let posts = paths
        .iter()
        .filter(|path| is_post(ctx, path))
        .map(|path| ctx.base_dir.join(path));
    update_all(ctx, lookup, posts)
}

/// Same as [`update_posts_last_modified`] for every markdown file in `dir`.
pub(crate) fn update_posts_in_dir<L: Lookup + ?Sized>(
    ctx: &Context,
    lookup: &L,
    dir: &Path,
) -> anyhow::Result<Vec<PathBuf>> {
    let posts = posts_in_dir(&ctx.base_dir.join(dir))?;
    update_all(ctx, lookup, posts)
}

/// Markdown files directly under `dir`, sorted by name.
pub(crate) fn posts_in_dir(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut posts = vec![];
    for entry in std::fs::read_dir(dir).with_context(|| format!("while listing {dir:?}"))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if matches!(
            path.extension().and_then(OsStr::to_str),
            Some("md" | "markdown")
        ) {
            posts.push(path);
        }
    }
    posts.sort();

    Ok(posts)
}

fn is_post(ctx: &Context, path: &Path) -> bool {
    let matched = path.to_string_lossy().contains(ctx.posts_marker.as_str());
    if !matched {
        debug!("{path:?} is not a post. ignoring...");
    }
    matched
}

fn update_all<L: Lookup + ?Sized>(
    ctx: &Context,
    lookup: &L,
    posts: impl IntoIterator<Item = PathBuf>,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut updated = vec![];
    for path in posts {
        if update_post(ctx, lookup, &path).with_context(|| format!("while updating {path:?}"))? {
            updated.push(path);
        }
    }

    Ok(updated)
}

fn update_post<L: Lookup + ?Sized>(ctx: &Context, lookup: &L, path: &Path) -> anyhow::Result<bool> {
    let mut post = Post::parse(path)?;

    let time = lookup.last_modified_time(post.file_path())?;
    if time.is_empty() {
        warn!("{path:?} has no commit history. skipping...");
        return Ok(false);
    }
    DateTime::parse_from_rfc3339(&time)
        .with_context(|| format!("invalid commit date {time:?}"))?;

    post.add_front_matter(LAST_MODIFIED_KEY, time.as_str());

    if ctx.dry_run {
        info!("{path:?}: would set {LAST_MODIFIED_KEY} to {time}");
    } else {
        post.save()?;
        info!("{path:?}: {LAST_MODIFIED_KEY} = {time}");
    }

    Ok(true)
}
