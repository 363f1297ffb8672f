//! Package installer backed by gzip tarballs.
//!
//! A package `NAME` is described by the context keys `NAME_PACKAGE` (archive
//! file name), `NAME_DOWNLOAD_URL` and `NAME_STRIP`, all of which may be
//! `{KEY}` templates. It is unpacked into `<BUILD_DIR>/<name>`.

use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use anyhow::{Context as _, Result as AResult, bail};
use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, info};
use xhprof_ext::prelude::{Context, PackageInstaller};

/// Where package archives come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    /// Download from `NAME_DOWNLOAD_URL`.
    Remote,
    /// Read `NAME_PACKAGE` from a local directory.
    Local(PathBuf),
}

/// Fetches package archives and unpacks them into the build directory.
#[derive(Debug)]
pub struct ArchiveInstaller {
    source: PackageSource,
}

impl ArchiveInstaller {
    /// Creates an installer reading archives from `source`.
    #[must_use]
    pub fn new(source: PackageSource) -> Self {
        Self { source }
    }
}

impl PackageInstaller for ArchiveInstaller {
    fn package(&mut self, ctx: &Context, name: &str) -> AResult<()> {
        let build_dir = ctx.build_dir()?;
        let archive = ctx.format(&format!("{{{name}_PACKAGE}}"))?;

        let bytes = match &self.source {
            PackageSource::Remote => {
                let url = ctx.format(&format!("{{{name}_DOWNLOAD_URL}}"))?;
                fetch(&url)?
            }
            PackageSource::Local(dir) => {
                let path = dir.join(&archive);
                info!(path = %path.display(), "Using local package");
                fs::read(&path)
                    .with_context(|| format!("Failed to read package {}", path.display()))?
            }
        };

        let strip = ctx
            .get(&format!("{name}_STRIP"))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        let dest = build_dir.join(name.to_lowercase());
        let count = unpack(&bytes, &dest, strip)
            .with_context(|| format!("Failed to unpack {archive}"))?;
        info!(entries = count, dest = %dest.display(), "Installed package {name}");
        Ok(())
    }
}

fn fetch(url: &str) -> AResult<Vec<u8>> {
    info!(%url, "Downloading package");
    let mut response = ureq::get(url)
        .call()
        .with_context(|| format!("Failed to download {url}"))?;
    response
        .body_mut()
        .read_to_vec()
        .with_context(|| format!("Failed to read response body from {url}"))
}

/// Unpacks a gzip tarball into `dest`, dropping each entry's first path
/// component when `strip` is set.
///
/// Returns the number of entries written.
///
/// # Errors
///
/// Returns an error if the archive is malformed, an entry would land outside
/// `dest`, or a file cannot be written.
pub fn unpack(bytes: &[u8], dest: &Path, strip: bool) -> AResult<usize> {
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let mut count = 0;

    for entry in archive.entries().context("Bad tar.gz archive")? {
        let mut entry = entry.context("Bad tar.gz entry")?;
        let path = entry.path().context("Bad tar.gz entry path")?.into_owned();
        let relative: PathBuf = path
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .skip(usize::from(strip))
            .collect();
        if relative.as_os_str().is_empty() {
            continue;
        }
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            bail!("Refusing to unpack {} outside of {}", path.display(), dest.display());
        }

        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        debug!(path = %relative.display(), "unpacking");
        entry
            .unpack(&target)
            .with_context(|| format!("Failed to unpack {}", target.display()))?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compression, write::GzEncoder};

    fn tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn unpacks_with_strip() {
        let dest = tempfile::tempdir().unwrap();
        let bytes = tarball(&[
            ("xhprof-0.9.5/xhprof-20121212.so", b"elf"),
            ("xhprof-0.9.5/LICENSE", b"apache"),
        ]);
        assert_eq!(unpack(&bytes, dest.path(), true).unwrap(), 2);
        assert_eq!(fs::read(dest.path().join("xhprof-20121212.so")).unwrap(), b"elf");
        assert!(dest.path().join("LICENSE").is_file());
    }

    #[test]
    fn unpacks_without_strip() {
        let dest = tempfile::tempdir().unwrap();
        let bytes = tarball(&[("./xhprof-20100525.so", b"elf")]);
        assert_eq!(unpack(&bytes, dest.path(), false).unwrap(), 1);
        assert!(dest.path().join("xhprof-20100525.so").is_file());
    }

    #[test]
    fn rejects_garbage() {
        let dest = tempfile::tempdir().unwrap();
        assert!(unpack(b"not a tarball", dest.path(), false).is_err());
    }

    #[test]
    fn local_source_installs_into_build_dir() {
        let build = tempfile::tempdir().unwrap();
        let packages = tempfile::tempdir().unwrap();
        fs::write(
            packages.path().join("xhprof-0.9.5.tar.gz"),
            tarball(&[("xhprof-0.9.5/xhprof-20121212.so", b"elf")]),
        )
        .unwrap();

        let mut ctx = Context::new();
        ctx.insert("BUILD_DIR", build.path().to_str().unwrap());
        ctx.insert("XHPROF_VERSION", "0.9.5");
        ctx.insert("XHPROF_PACKAGE", "xhprof-{XHPROF_VERSION}.tar.gz");
        ctx.insert("XHPROF_STRIP", true);

        let mut installer = ArchiveInstaller::new(PackageSource::Local(packages.path().into()));
        installer.package(&ctx, "XHPROF").unwrap();
        assert!(build.path().join("xhprof").join("xhprof-20121212.so").is_file());
    }

    #[test]
    fn missing_local_archive_fails() {
        let build = tempfile::tempdir().unwrap();
        let mut ctx = Context::new();
        ctx.insert("BUILD_DIR", build.path().to_str().unwrap());
        ctx.insert("XHPROF_PACKAGE", "xhprof.tar.gz");
        let mut installer = ArchiveInstaller::new(PackageSource::Local(build.path().into()));
        assert!(installer.package(&ctx, "XHPROF").is_err());
    }
}
