//! Introspection of the staged PHP runtime through its `php.ini`.

use std::{
    fs,
    path::{Path, PathBuf},
};

use xhprof_ext_build::ExtensionDir;

use crate::error::{Error, Result};

/// Directive naming the directory PHP loads extensions from.
pub const EXTENSION_DIR_DIRECTIVE: &[u8] = b"extension_dir";

/// Location of `php.ini` below a build directory.
#[must_use]
pub fn php_ini_path(build_dir: &Path) -> PathBuf {
    build_dir.join("php").join("etc").join("php.ini")
}

/// Returns the value of the first line starting with `extension_dir`.
///
/// The value is whatever follows `=`, trimmed and stripped of quotes.
#[must_use]
pub fn find_extension_dir(contents: &[u8]) -> Option<String> {
    contents
        .split(|b| *b == b'\n')
        .find(|line| line.starts_with(EXTENSION_DIR_DIRECTIVE))
        .and_then(|line| {
            let eq = line.iter().position(|b| *b == b'=')?;
            let value = String::from_utf8_lossy(&line[eq + 1..]);
            Some(value.trim().trim_matches('"').to_owned())
        })
}

/// Facts read from the staged runtime's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhpRuntime {
    php_ini: PathBuf,
    extension_dir: ExtensionDir,
}

impl PhpRuntime {
    /// Reads `<build_dir>/php/etc/php.ini` and parses its extension directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, has no `extension_dir`
    /// directive, or the directory name carries no API tag.
    pub fn load(build_dir: &Path) -> Result<Self> {
        let php_ini = php_ini_path(build_dir);
        let contents = fs::read(&php_ini).map_err(|err| Error::io(&php_ini, err))?;
        let dir = find_extension_dir(&contents).ok_or_else(|| Error::ExtensionDirNotFound {
            path: php_ini.clone(),
        })?;
        let extension_dir =
            ExtensionDir::parse(&dir).map_err(|err| Error::InvalidExtensionDir {
                reason: format!("{err:#}"),
                dir,
            })?;

        Ok(Self {
            php_ini,
            extension_dir,
        })
    }

    /// Path of the `php.ini` that was read.
    #[must_use]
    pub fn php_ini(&self) -> &Path {
        &self.php_ini
    }

    /// The parsed extension directory.
    #[must_use]
    pub fn extension_dir(&self) -> &ExtensionDir {
        &self.extension_dir
    }
}
