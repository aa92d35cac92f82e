//! Filesystem actions: `mkdir`, `copy`, `delete` and `clean`

use crate::actions::ActionOptions;
use crate::runner::BuildContext;
use crate::utils::normalize_path;
use anyhow::{bail, Context as _};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// A transient artifact that could not be removed. Reported, never fatal.
#[derive(Debug)]
pub struct CleanupWarning {
    pub path: PathBuf,
    pub error: std::io::Error,
}

impl fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not remove {}: {}", self.path.display(), self.error)
    }
}

/// `mkdir` action: create `path` and its parents
pub fn mkdir(ctx: &BuildContext, options: &ActionOptions) -> anyhow::Result<()> {
    let path = ctx.path(options.get_str("path")?);
    fs::create_dir_all(&path).with_context(|| format!("creating {}", path.display()))?;
    Ok(())
}

/// `copy` action: copy every match of `from` into `to`, keeping each match's
/// path relative to `cwd` (the project dir by default)
pub fn copy(ctx: &BuildContext, options: &ActionOptions) -> anyhow::Result<()> {
    let cwd = match options.opt_str("cwd")? {
        Some(dir) => ctx.path(dir),
        None => ctx.project_dir.clone(),
    };
    let to = ctx.path(options.get_str("to")?);

    let mut copied = 0;
    for pattern in options.get_list("from")? {
        let matches = expand_glob(&cwd, &pattern)?;
        if matches.is_empty() {
            log::warn!("copy: '{}' matched nothing under {}", pattern, cwd.display());
        }
        for source in matches {
            let rel = match source.strip_prefix(&cwd) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => source.file_name().map(PathBuf::from).unwrap_or_default(),
            };
            copied += copy_tree(&source, &to.join(rel))?;
        }
    }

    log::debug!("copied {} file(s) into {}", copied, to.display());
    Ok(())
}

/// `delete` action: remove a transient artifact. Failure only warns.
pub fn delete(ctx: &BuildContext, options: &ActionOptions) -> anyhow::Result<()> {
    let path = ctx.path(options.get_str("path")?);
    if let Err(warning) = remove(&path) {
        ctx.reporter.warn(&warning.to_string());
        log::warn!("{}", warning);
    }
    Ok(())
}

/// `clean` action: remove produced artifacts matching `paths`. Refuses any
/// match outside the project dir, the project dir itself, and anything under
/// or containing a `protect` path.
pub fn clean(ctx: &BuildContext, options: &ActionOptions) -> anyhow::Result<()> {
    let protected: Vec<PathBuf> = options
        .opt_list("protect")
        .iter()
        .map(|p| ctx.path(p))
        .collect();

    let mut targets = Vec::new();
    for pattern in options.get_list("paths")? {
        for target in expand_glob(&ctx.project_dir, &pattern)? {
            if !target.starts_with(&ctx.project_dir) || target == ctx.project_dir {
                bail!(
                    "refusing to clean {}: outside the project directory",
                    target.display()
                );
            }
            if let Some(guard) = protected
                .iter()
                .find(|p| target.starts_with(p) || p.starts_with(&target))
            {
                bail!(
                    "refusing to clean {}: protected path {}",
                    target.display(),
                    guard.display()
                );
            }
            targets.push(target);
        }
    }

    for target in targets {
        ctx.reporter.debug(&format!("clean {}", target.display()));
        if let Err(warning) = remove(&target) {
            ctx.reporter.warn(&warning.to_string());
            log::warn!("{}", warning);
        }
    }
    Ok(())
}

/// Matches of `pattern` (relative to `base` unless absolute), normalized
fn expand_glob(base: &Path, pattern: &str) -> anyhow::Result<Vec<PathBuf>> {
    let full = normalize_path(&base.join(pattern));
    let full = full.to_string_lossy();
    let mut matches = Vec::new();
    for entry in glob::glob(&full).with_context(|| format!("invalid glob '{}'", pattern))? {
        match entry {
            Ok(path) => matches.push(normalize_path(&path)),
            Err(e) => log::warn!("skipping unreadable path: {}", e),
        }
    }
    Ok(matches)
}

/// Copy a file or a directory tree; returns the number of files copied
fn copy_tree(source: &Path, dest: &Path) -> anyhow::Result<usize> {
    if source.is_dir() {
        fs::create_dir_all(dest).with_context(|| format!("creating {}", dest.display()))?;
        let mut count = 0;
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            count += copy_tree(&entry.path(), &dest.join(entry.file_name()))?;
        }
        return Ok(count);
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::copy(source, dest)
        .with_context(|| format!("copying {} to {}", source.display(), dest.display()))?;
    Ok(1)
}

fn remove(path: &Path) -> Result<(), CleanupWarning> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
    };
    result.map_err(|error| CleanupWarning {
        path: path.to_path_buf(),
        error,
    })
}
