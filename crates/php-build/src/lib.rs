//! PHP runtime detection utilities for the Xhprof buildpack extension.
//!
//! A staged PHP runtime is never executed during staging, so everything this
//! crate knows about it is read off the name of its extension directory,
//! e.g. `/app/php/lib/php/extensions/no-debug-non-zts-20121212`.
//!
//! # Example
//!
//! ```
//! use xhprof_ext_build::{ApiVersion, ExtensionDir};
//!
//! fn main() -> anyhow::Result<()> {
//!     let dir = ExtensionDir::parse("/opt/php/ext/no-debug-non-zts-20121212")?;
//!     assert_eq!(dir.api(), 20_121_212);
//!     assert!(!dir.thread_safety());
//!     assert_eq!(ApiVersion::try_from(dir.api())?, ApiVersion::Php55);
//!     Ok(())
//! }
//! ```

use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Error, Result, bail};

/// Marker present in the extension directory name of non thread-safe builds.
pub const NON_ZTS_MARKER: &str = "non-zts";

/// Marker present in the extension directory name of release builds.
pub const NO_DEBUG_MARKER: &str = "no-debug";

/// A PHP extension directory and the build facts encoded in its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionDir {
    path: PathBuf,
    api: u32,
    zts: bool,
    debug: bool,
}

impl ExtensionDir {
    /// Parses the final segment of an extension directory path.
    ///
    /// The API tag is whatever follows the last hyphen. Thread safety is
    /// assumed unless the segment carries the [`NON_ZTS_MARKER`].
    ///
    /// # Errors
    ///
    /// Returns an error if the path has no final segment or the API tag is
    /// not an unsigned integer.
    pub fn parse(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("Extension directory has no name: {}", path.display()))?;
        let tag = name.rsplit('-').next().unwrap_or(name);
        let api = u32::from_str(tag)
            .with_context(|| format!("Failed to convert PHP API tag `{tag}` to integer"))?;

        Ok(Self {
            path: path.to_path_buf(),
            api,
            zts: !name.contains(NON_ZTS_MARKER),
            debug: !name.contains(NO_DEBUG_MARKER),
        })
    }

    /// Full path of the directory as written in `php.ini`.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Zend API number the runtime's extensions are built against.
    #[must_use]
    pub fn api(&self) -> u32 {
        self.api
    }

    /// Checks if thread safety is enabled.
    #[must_use]
    pub fn thread_safety(&self) -> bool {
        self.zts
    }

    /// Checks if PHP was built with debug.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }
}

/// Target architecture of a staged runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    /// 32-bit x86
    X86,
    /// 64-bit x86_64
    X64,
    /// 64-bit ARM
    AArch64,
}

impl TryFrom<&str> for Arch {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "x86" => Ok(Self::X86),
            "x64" => Ok(Self::X64),
            "arm64" => Ok(Self::AArch64),
            arch => bail!("Unknown architecture: {}", arch),
        }
    }
}

impl Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arch::X86 => write!(f, "x86"),
            Arch::X64 => write!(f, "x64"),
            Arch::AArch64 => write!(f, "arm64"),
        }
    }
}

/// PHP API version enum.
///
/// Each variant's discriminant is the Zend API number first shipped by that
/// PHP release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[allow(clippy::inconsistent_digit_grouping)]
pub enum ApiVersion {
    /// PHP 5.3
    Php53 = 2009_06_26,
    /// PHP 5.4
    Php54 = 2010_05_25,
    /// PHP 5.5
    Php55 = 2012_12_12,
    /// PHP 5.6
    Php56 = 2013_12_26,
    /// PHP 7.0
    Php70 = 2015_10_12,
    /// PHP 7.1
    Php71 = 2016_03_03,
    /// PHP 7.2
    Php72 = 2017_07_18,
    /// PHP 7.3
    Php73 = 2018_07_31,
    /// PHP 7.4
    Php74 = 2019_09_02,
    /// PHP 8.0
    Php80 = 2020_09_30,
}

impl ApiVersion {
    /// Returns all known API versions, oldest first.
    #[must_use]
    pub fn versions() -> Vec<Self> {
        vec![
            ApiVersion::Php53,
            ApiVersion::Php54,
            ApiVersion::Php55,
            ApiVersion::Php56,
            ApiVersion::Php70,
            ApiVersion::Php71,
            ApiVersion::Php72,
            ApiVersion::Php73,
            ApiVersion::Php74,
            ApiVersion::Php80,
        ]
    }

    /// Returns the Zend API number of this version.
    #[must_use]
    pub const fn api(self) -> u32 {
        self as u32
    }

    /// Checks if `api` falls in `[from, until)`.
    #[must_use]
    pub fn in_range(api: u32, from: ApiVersion, until: ApiVersion) -> bool {
        (from.api()..until.api()).contains(&api)
    }

    /// Returns the `major.minor` release name, e.g. `5.5`.
    #[must_use]
    pub fn release(self) -> &'static str {
        match self {
            ApiVersion::Php53 => "5.3",
            ApiVersion::Php54 => "5.4",
            ApiVersion::Php55 => "5.5",
            ApiVersion::Php56 => "5.6",
            ApiVersion::Php70 => "7.0",
            ApiVersion::Php71 => "7.1",
            ApiVersion::Php72 => "7.2",
            ApiVersion::Php73 => "7.3",
            ApiVersion::Php74 => "7.4",
            ApiVersion::Php80 => "8.0",
        }
    }
}

impl TryFrom<u32> for ApiVersion {
    type Error = Error;

    fn try_from(version: u32) -> Result<Self, Self::Error> {
        ApiVersion::versions()
            .into_iter()
            .rev()
            .find(|v| v.api() <= version)
            .with_context(|| {
                format!(
                    "Unknown PHP API version {version}, the oldest known is {}",
                    ApiVersion::Php53.api()
                )
            })
    }
}

impl Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PHP {} (API {})", self.release(), self.api())
    }
}
