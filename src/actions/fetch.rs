//! Archive download and extraction

use crate::actions::ActionOptions;
use crate::runner::BuildContext;
use anyhow::{bail, Context as _};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tar::Archive;

/// `download` action: fetch `url` into the directory `dest` (the scratch
/// directory when omitted), named after the last segment of the URL
pub fn download(ctx: &BuildContext, options: &ActionOptions) -> anyhow::Result<()> {
    let url = options.get_str("url")?;
    let dest = download_target(ctx, options)?;

    ctx.reporter.info(&format!("Downloading {}", url));
    fetch_url(url, &dest, ctx.action_timeout)?;
    Ok(())
}

fn download_target(ctx: &BuildContext, options: &ActionOptions) -> anyhow::Result<PathBuf> {
    let url = options.get_str("url")?;
    let dest_dir = match options.opt_str("dest")? {
        Some(dest) => ctx.path(dest),
        None => ctx.scratch_dir().to_path_buf(),
    };
    Ok(dest_dir.join(url_to_filename(url)))
}

/// `extract` action: unpack `archive` into `dest`, dropping `strip` leading
/// path components from every entry
pub fn extract(ctx: &BuildContext, options: &ActionOptions) -> anyhow::Result<()> {
    let archive = ctx.path(options.get_str("archive")?);
    let dest = ctx.path(options.get_str("dest")?);
    let strip = options.opt_u64("strip")?.unwrap_or(0) as usize;

    unpack_archive(&archive, &dest, strip)
}

/// Fetch a URL and save to the given path
pub fn fetch_url(url: &str, dest: &Path, timeout: Duration) -> anyhow::Result<()> {
    log::info!("Fetching {}", url);

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()?;
    let response = client
        .get(url)
        .send()
        .with_context(|| format!("requesting {}", url))?
        .error_for_status()
        .with_context(|| format!("downloading {}", url))?;

    let bytes = response.bytes()?;

    let mut file = File::create(dest).with_context(|| format!("creating {}", dest.display()))?;
    file.write_all(&bytes)?;

    log::info!("Downloaded {} bytes to {}", bytes.len(), dest.display());
    Ok(())
}

/// Unpack an archive to the destination directory
///
/// Supports:
/// - `.tar.gz` / `.tgz`
/// - `.tar`
pub fn unpack_archive(archive_path: &Path, dest: &Path, strip: usize) -> anyhow::Result<()> {
    let name = archive_path.to_string_lossy();

    fs::create_dir_all(dest)?;

    let file = File::open(archive_path)
        .with_context(|| format!("opening {}", archive_path.display()))?;
    let reader = BufReader::new(file);

    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        unpack_tar(Archive::new(GzDecoder::new(reader)), dest, strip)?;
    } else if name.ends_with(".tar") {
        unpack_tar(Archive::new(reader), dest, strip)?;
    } else {
        bail!("unsupported archive format: {}", name);
    }

    log::info!("Unpacked to {}", dest.display());
    Ok(())
}

fn unpack_tar<R: Read>(mut archive: Archive<R>, dest: &Path, strip: usize) -> anyhow::Result<()> {
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?;

        let stripped: PathBuf = path.components().skip(strip).collect();

        if stripped.as_os_str().is_empty() {
            continue;
        }
        if stripped
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!("archive entry '{}' escapes {}", path.display(), dest.display());
        }

        let dest_path = dest.join(&stripped);

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }

        entry.unpack(&dest_path)?;
    }

    Ok(())
}

/// Last path segment of a URL without its query string, sanitized
fn url_to_filename(url: &str) -> String {
    let last = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();

    let sanitized: String = last
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        "download".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::Verbosity;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    fn write_tar_gz(path: &Path) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let data = b"#!/bin/sh\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, "jdk-8u/bin/java", &data[..])
            .unwrap();

        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_url_to_filename() {
        assert_eq!(
            url_to_filename("https://example.com/java_home.tar.gz?raw=1"),
            "java_home.tar.gz"
        );
        assert_eq!(url_to_filename("https://example.com/dl/"), "dl");
        assert_eq!(url_to_filename("https://example.com/a b.tgz"), "a_b.tgz");
    }

    #[test]
    fn test_download_target_defaults_to_scratch_dir() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = BuildContext::new().with_project_dir(temp_dir.path().to_path_buf());

        let opts = ActionOptions::default().with("url", "https://example.com/jh.tar.gz");
        assert_eq!(
            download_target(&ctx, &opts).unwrap(),
            ctx.scratch_dir().join("jh.tar.gz")
        );

        let opts = opts.with("dest", "vendor");
        assert_eq!(
            download_target(&ctx, &opts).unwrap(),
            temp_dir.path().join("vendor/jh.tar.gz")
        );
    }

    #[test]
    fn test_extract_strips_leading_components() {
        let temp_dir = TempDir::new().unwrap();
        write_tar_gz(&temp_dir.path().join("java_home.tar.gz"));

        let ctx = BuildContext::new()
            .with_project_dir(temp_dir.path().to_path_buf())
            .with_verbosity(Verbosity::Silent);
        let opts = ActionOptions::default()
            .with("archive", "java_home.tar.gz")
            .with("dest", "vendor/java_home")
            .with("strip", "1");
        extract(&ctx, &opts).unwrap();

        assert!(temp_dir.path().join("vendor/java_home/bin/java").exists());
    }

    #[test]
    fn test_extract_keeps_paths_without_strip() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("jdk.tgz");
        write_tar_gz(&archive);

        unpack_archive(&archive, &temp_dir.path().join("out"), 0).unwrap();
        assert!(temp_dir.path().join("out/jdk-8u/bin/java").exists());
    }

    #[test]
    fn test_extract_rejects_entries_outside_dest() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("evil.tar");

        // Builder::append_data refuses `..`, so write the name into the raw header
        let data = b"escaped";
        let mut header = tar::Header::new_old();
        let name = b"../escaped.txt";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        let mut builder = tar::Builder::new(File::create(&archive).unwrap());
        builder.append(&header, &data[..]).unwrap();
        builder.into_inner().unwrap();

        let dest = temp_dir.path().join("vendor");
        assert!(unpack_archive(&archive, &dest, 0).is_err());
        assert!(!temp_dir.path().join("escaped.txt").exists());
    }

    #[test]
    fn test_extract_rejects_unknown_format() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("jdk.zip");
        fs::write(&archive, "").unwrap();
        assert!(unpack_archive(&archive, &temp_dir.path().join("out"), 0).is_err());
    }
}
