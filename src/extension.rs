//! Buildpack extension hooks.
//!
//! The host calls every registered [`Extension`] at fixed points of staging.
//! Hooks receive the shared [`Context`] explicitly; the keys each one reads
//! and writes are listed on its implementation.

use std::collections::BTreeMap;

use tracing::{error, info};

use crate::{context::Context, installer::InstallerState};

/// Value `compile` hooks return to the host on success.
pub const SUCCESS: i32 = 0;

/// Package key the host installer resolves `<KEY>_*` settings from.
pub const XHPROF_PACKAGE: &str = "XHPROF";

/// The host's package mechanism.
pub trait PackageInstaller {
    /// Fetches and unpacks the package configured under `name` in `ctx`.
    ///
    /// # Errors
    ///
    /// Returns an error if the package could not be fetched or unpacked.
    fn package(&mut self, ctx: &Context, name: &str) -> anyhow::Result<()>;
}

/// A staging hook contributed to the buildpack.
pub trait Extension {
    /// Name used in host logs.
    fn name(&self) -> &'static str;

    /// Commands to run before the application starts.
    fn preprocess_commands(&self, _ctx: &Context) -> Vec<Vec<String>> {
        Vec::new()
    }

    /// Long-running processes to start alongside the application, by name.
    fn service_commands(&self, _ctx: &Context) -> BTreeMap<String, Vec<String>> {
        BTreeMap::new()
    }

    /// Environment variables to export to the application.
    fn service_environment(&self, _ctx: &Context) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Installs whatever the extension contributes into the staged build.
    ///
    /// Returns a status code for the host, [`SUCCESS`] when staging may go
    /// on.
    fn compile(&self, ctx: &mut Context, installer: &mut dyn PackageInstaller) -> i32;
}

/// Installs the Xhprof profiler when a Codizy or Xhprof service is bound.
///
/// Reads `BUILD_DIR`, `VCAP_SERVICES`, `CODIZY_INSTALL` and `XHPROF_ARCH`.
/// Writes the `XHPROF_*` package defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct Xhprof;

impl Extension for Xhprof {
    fn name(&self) -> &'static str {
        "xhprof"
    }

    /// Never fails staging: every problem is logged and the install skipped.
    fn compile(&self, ctx: &mut Context, installer: &mut dyn PackageInstaller) -> i32 {
        let state = match InstallerState::load(ctx) {
            Ok(state) => state,
            Err(err) => {
                error!(%err, "Error installing Xhprof module! Xhprof module will not be available.");
                return SUCCESS;
            }
        };

        // x64 and PHP 5.4/5.5 only
        if !state.should_install() {
            info!("Xhprof is not supported on your platform");
            return SUCCESS;
        }

        info!("Installing Xhprof module");
        if let Err(err) = installer.package(ctx, XHPROF_PACKAGE) {
            error!("Failed to install Xhprof package, php.ini left unchanged: {err:#}");
            return SUCCESS;
        }

        info!("Configuring Xhprof module in php.ini");
        match state.modify_php_ini() {
            Ok(()) => info!("Xhprof module Installed."),
            Err(err) => error!(%err, "Failed to register Xhprof module in php.ini."),
        }
        SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::keys;
    use std::{fs, path::PathBuf};
    use tracing_test::traced_test;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(String, Option<String>)>,
        fail: bool,
    }

    impl PackageInstaller for Recorder {
        fn package(&mut self, ctx: &Context, name: &str) -> anyhow::Result<()> {
            let url = ctx.format(&format!("{{{name}_DOWNLOAD_URL}}")).ok();
            self.calls.push((name.to_owned(), url));
            if self.fail {
                anyhow::bail!("connection refused");
            }
            Ok(())
        }
    }

    const PHP_INI: &str = "[PHP]\n\
        extension_dir = \"/app/php/lib/php/extensions/no-debug-non-zts-20121212\"\n\
        #{PHP_EXTENSIONS}\n\
        extension=bz2.so\n\
        extension=zlib.so\n\
        ; end\n";

    fn staged(ctx: &mut Context) -> (tempfile::TempDir, PathBuf) {
        let build = tempfile::tempdir().unwrap();
        let etc = build.path().join("php").join("etc");
        fs::create_dir_all(&etc).unwrap();
        let php_ini = etc.join("php.ini");
        fs::write(&php_ini, PHP_INI).unwrap();
        ctx.insert(keys::BUILD_DIR, build.path().to_str().unwrap());
        (build, php_ini)
    }

    #[traced_test]
    #[test]
    fn installs_and_registers_when_bound() {
        let mut ctx = Context::new();
        ctx.insert(
            keys::VCAP_SERVICES,
            serde_json::json!({"codizy": [{"name": "profiler"}]}),
        );
        let (_build, php_ini) = staged(&mut ctx);
        let mut installer = Recorder::default();

        assert_eq!(Xhprof.compile(&mut ctx, &mut installer), SUCCESS);

        assert_eq!(
            installer.calls,
            vec![(
                "XHPROF".to_owned(),
                Some("https://www.codizy.com/download/module/xhprof-0.9.5.tar.gz".to_owned())
            )]
        );
        assert_eq!(
            fs::read_to_string(&php_ini).unwrap(),
            "[PHP]\n\
             extension_dir = \"/app/php/lib/php/extensions/no-debug-non-zts-20121212\"\n\
             #{PHP_EXTENSIONS}\n\
             extension=bz2.so\n\
             extension=zlib.so\n\
             extension=@{HOME}/xhprof/xhprof-20121212.so\n\
             ; end\n\
             \n"
        );
        assert!(logs_contain("Xhprof module Installed."));
    }

    #[traced_test]
    #[test]
    fn skips_without_services() {
        let mut ctx = Context::new();
        let (_build, php_ini) = staged(&mut ctx);
        let mut installer = Recorder::default();

        assert_eq!(Xhprof.compile(&mut ctx, &mut installer), SUCCESS);
        assert!(installer.calls.is_empty());
        assert_eq!(fs::read_to_string(&php_ini).unwrap(), PHP_INI);
        assert!(logs_contain("Xhprof is not supported on your platform"));
    }

    #[traced_test]
    #[test]
    fn missing_php_ini_is_logged_not_fatal() {
        let mut ctx = Context::new();
        ctx.insert(keys::CODIZY_INSTALL, true);
        let build = tempfile::tempdir().unwrap();
        ctx.insert(keys::BUILD_DIR, build.path().to_str().unwrap());
        let mut installer = Recorder::default();

        assert_eq!(Xhprof.compile(&mut ctx, &mut installer), SUCCESS);
        assert!(installer.calls.is_empty());
        assert!(logs_contain("Xhprof module will not be available."));
    }

    #[traced_test]
    #[test]
    fn failed_package_leaves_php_ini_alone() {
        let mut ctx = Context::new();
        ctx.insert(keys::CODIZY_INSTALL, true);
        let (_build, php_ini) = staged(&mut ctx);
        let mut installer = Recorder {
            fail: true,
            ..Recorder::default()
        };

        assert_eq!(Xhprof.compile(&mut ctx, &mut installer), SUCCESS);
        assert_eq!(installer.calls.len(), 1);
        assert_eq!(fs::read_to_string(&php_ini).unwrap(), PHP_INI);
        assert!(logs_contain("connection refused"));
    }

    #[test]
    fn contributes_no_commands_or_environment() {
        let ctx = Context::new();
        assert!(Xhprof.preprocess_commands(&ctx).is_empty());
        assert!(Xhprof.service_commands(&ctx).is_empty());
        assert!(Xhprof.service_environment(&ctx).is_empty());
        assert_eq!(Xhprof.name(), "xhprof");
    }
}
