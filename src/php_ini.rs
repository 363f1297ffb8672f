//! Registration of an extension in `php.ini`.
//!
//! Lines are kept as raw bytes with their terminators, so a file in any
//! ASCII-compatible encoding is rewritten byte for byte apart from the
//! insertion.

use std::{
    fs::{self, File},
    io::Write,
    path::Path,
};

use tracing::debug;

use crate::error::{Error, Result};

/// Placeholder line the buildpack's `php.ini` template keeps where
/// extensions are listed.
pub const EXTENSIONS_PLACEHOLDER: &str = "#{PHP_EXTENSIONS}";

const EXTENSION_DIRECTIVE: &[u8] = b"extension=";

/// Splits `contents` into lines, each keeping its `\n`.
#[must_use]
pub fn split_lines(contents: &[u8]) -> Vec<Vec<u8>> {
    contents
        .split_inclusive(|b| *b == b'\n')
        .map(<[u8]>::to_vec)
        .collect()
}

fn is_placeholder(line: &[u8]) -> bool {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    line == EXTENSIONS_PLACEHOLDER.as_bytes()
}

/// Finds where a new `extension=` line goes: right after the last existing
/// one, else right after the placeholder.
#[must_use]
pub fn insertion_point(lines: &[Vec<u8>]) -> Option<usize> {
    lines
        .iter()
        .rposition(|line| line.starts_with(EXTENSION_DIRECTIVE))
        .or_else(|| lines.iter().position(|line| is_placeholder(line)))
        .map(|pos| pos + 1)
}

/// Inserts `extension=<extension>` and appends a trailing blank line.
///
/// Returns the index of the inserted line, or `None` when the file has no
/// anchor for it.
pub fn insert_extension(lines: &mut Vec<Vec<u8>>, extension: &str) -> Option<usize> {
    let pos = insertion_point(lines)?;
    if let Some(anchor) = lines.get_mut(pos - 1) {
        if !anchor.ends_with(b"\n") {
            anchor.push(b'\n');
        }
    }
    lines.insert(pos, format!("extension={extension}\n").into_bytes());
    lines.push(b"\n".to_vec());
    Some(pos)
}

/// Registers `extension` in the `php.ini` at `path`.
///
/// The whole file is read, patched in memory and written back through a
/// temporary sibling that replaces the original.
///
/// # Errors
///
/// Returns an error if the file cannot be read or replaced, or if it has
/// neither an `extension=` line nor the [`EXTENSIONS_PLACEHOLDER`].
pub fn add_extension(path: &Path, extension: &str) -> Result<()> {
    let contents = fs::read(path).map_err(|err| Error::io(path, err))?;
    let mut lines = split_lines(&contents);
    let pos = insert_extension(&mut lines, extension).ok_or_else(|| Error::PlaceholderNotFound {
        path: path.to_path_buf(),
    })?;
    debug!(line = pos + 1, path = %path.display(), "inserting extension directive");

    let tmp_path = path.with_extension("ini.tmp");
    let write = || -> std::io::Result<()> {
        let mut tmp_file = File::create(&tmp_path)?;
        for line in &lines {
            tmp_file.write_all(line)?;
        }
        tmp_file.sync_all()
    };
    if let Err(err) = write() {
        let _ = fs::remove_file(&tmp_path);
        return Err(Error::io(&tmp_path, err));
    }
    fs::rename(&tmp_path, path).map_err(|err| Error::io(path, err))
}
