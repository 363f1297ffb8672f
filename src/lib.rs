#![doc = include_str!("../README.md")]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod context;
pub mod defaults;
pub mod error;
pub mod extension;
pub mod installer;
pub mod php_ini;
pub mod runtime;
pub mod services;

/// A module typically glob-imported containing the types a host needs to
/// run the extension.
pub mod prelude {
    pub use crate::context::{Context, ServiceBinding, keys};
    pub use crate::error::{Error, Result};
    pub use crate::extension::{Extension, PackageInstaller, SUCCESS, Xhprof};
    pub use crate::installer::InstallerState;
}

pub use xhprof_ext_build as build;

/// `xhprof-ext` version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
