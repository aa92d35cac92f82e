//! Launcher shims for built command-line entry points

use crate::actions::ActionOptions;
use crate::runner::BuildContext;
use crate::utils::relative_path;
use anyhow::Context as _;
use std::fs;
use std::path::{Path, PathBuf};

/// `launcher` action: options `src`, `dest` and optional `interpreter`
pub fn launcher(ctx: &BuildContext, options: &ActionOptions) -> anyhow::Result<()> {
    let src = ctx.path(options.get_str("src")?);
    let dest = ctx.path(options.get_str("dest")?);
    let interpreter = options.opt_str("interpreter")?.filter(|s| !s.is_empty());

    if write_launcher(&src, &dest, interpreter)? {
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        ctx.reporter.info(&format!("Created launcher {}", name));
    } else {
        log::debug!("launcher {} already exists", dest.display());
    }
    Ok(())
}

/// Write a shim at `dest` that runs `src`. Returns false without touching
/// anything when `dest` or `dest.bat` already exists.
pub fn write_launcher(src: &Path, dest: &Path, interpreter: Option<&str>) -> anyhow::Result<bool> {
    if dest.exists() || batch_path(dest).exists() {
        return Ok(false);
    }

    let dest_dir = dest.parent().unwrap_or_else(|| Path::new("/"));
    fs::create_dir_all(dest_dir).with_context(|| format!("creating {}", dest_dir.display()))?;
    let rel = relative_path(dest_dir, src);

    write_shim(dest, &rel, interpreter)
        .with_context(|| format!("could not create launcher {}", dest.display()))?;
    Ok(true)
}

fn batch_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".bat");
    PathBuf::from(name)
}

#[cfg(unix)]
fn write_shim(dest: &Path, rel: &Path, interpreter: Option<&str>) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let prefix = interpreter.map(|i| format!("{} ", i)).unwrap_or_default();
    let script = format!(
        "#!/bin/sh\n{}\"$(dirname \"$0\")/{}\" \"$@\"\n",
        prefix,
        rel.display()
    );
    fs::write(dest, script)?;
    fs::set_permissions(dest, fs::Permissions::from_mode(0o755))
}

#[cfg(windows)]
fn write_shim(dest: &Path, rel: &Path, interpreter: Option<&str>) -> std::io::Result<()> {
    let prefix = interpreter.map(|i| format!("{} ", i)).unwrap_or_default();
    let script = format!("@{}\"%~dp0\\{}\" %*\r\n", prefix, rel.display());
    fs::write(batch_path(dest), script)
}
