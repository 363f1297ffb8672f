//! Error and result types returned by the installer.

use std::{error::Error as StdError, fmt, io, path::PathBuf};

/// The main result type which is passed by the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while inspecting or patching the staged runtime.
///
/// None of these ever reach the hook's caller: [`crate::extension::Xhprof`]
/// logs them and skips the install.
#[derive(Debug)]
pub enum Error {
    /// `BUILD_DIR` is absent from the context or not a string.
    MissingBuildDir,
    /// Reading or writing a file failed.
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// `php.ini` has no `extension_dir` directive.
    ExtensionDirNotFound {
        /// Path of the `php.ini` that was scanned.
        path: PathBuf,
    },
    /// The `extension_dir` value does not end in an API tag.
    InvalidExtensionDir {
        /// Value of the directive.
        dir: String,
        /// Why it could not be parsed.
        reason: String,
    },
    /// `php.ini` has neither an `extension=` line nor the extensions
    /// placeholder to anchor the new directive.
    PlaceholderNotFound {
        /// Path of the `php.ini` being patched.
        path: PathBuf,
    },
    /// A `{KEY}` template refers to a key missing from the context.
    UnresolvedKey(String),
    /// Template expansion did not settle, most likely a self reference.
    TemplateTooDeep(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingBuildDir => write!(f, "BUILD_DIR is not set in the context"),
            Error::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Error::ExtensionDirNotFound { path } => {
                write!(f, "no extension_dir directive in {}", path.display())
            }
            Error::InvalidExtensionDir { dir, reason } => {
                write!(f, "invalid extension_dir `{dir}`: {reason}")
            }
            Error::PlaceholderNotFound { path } => write!(
                f,
                "no extension= line or {} placeholder in {}",
                crate::php_ini::EXTENSIONS_PLACEHOLDER,
                path.display()
            ),
            Error::UnresolvedKey(key) => write!(f, "unknown context key `{key}` in template"),
            Error::TemplateTooDeep(template) => {
                write!(f, "template `{template}` nests too deeply")
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
