//! Facts gathered once per staging run and the install decision drawn from
//! them.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;
use xhprof_ext_build::{ApiVersion, Arch, ExtensionDir};

use crate::{
    context::{Context, keys},
    defaults::merge_defaults,
    error::Result,
    php_ini,
    runtime::PhpRuntime,
    services::Detection,
};

/// Architecture assumed when `XHPROF_ARCH` is absent. Any value present,
/// string or not, is taken as is.
pub const DEFAULT_ARCH: &str = "x64";

/// Oldest runtime ABI the packaged binaries are built for.
pub const MIN_API: ApiVersion = ApiVersion::Php54;

/// First runtime ABI the packaged binaries no longer support.
pub const UNSUPPORTED_API: ApiVersion = ApiVersion::Php56;

/// Per-run state of the Xhprof installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerState {
    detection: Detection,
    php_ini: PathBuf,
    extension_dir: ExtensionDir,
    arch: String,
    extension: String,
}

impl InstallerState {
    /// Merges the package defaults into `ctx`, then gathers every fact the
    /// install decision needs.
    ///
    /// Defaults stay merged even when loading fails afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if `BUILD_DIR` is missing or the runtime's `php.ini`
    /// cannot be read or parsed.
    pub fn load(ctx: &mut Context) -> Result<Self> {
        info!("Initializing");
        merge_defaults(ctx);
        let detection = Detection::detect(ctx);

        let runtime = PhpRuntime::load(&ctx.build_dir()?)?;
        let extension_dir = runtime.extension_dir().clone();
        let arch = match ctx.get(keys::XHPROF_ARCH) {
            None => DEFAULT_ARCH.to_owned(),
            Some(Value::String(arch)) => arch.clone(),
            Some(other) => other.to_string(),
        };
        info!("PHP API [{}] Arch [{arch}]", extension_dir.api());

        let extension = extension_path(extension_dir.api());
        info!("PHP Extension [{extension}]");

        Ok(Self {
            detection,
            php_ini: runtime.php_ini().to_path_buf(),
            extension_dir,
            arch,
            extension,
        })
    }

    /// Whether the profiler should be installed into this runtime.
    #[must_use]
    pub fn should_install(&self) -> bool {
        self.detection.detected()
            && self.arch().is_some_and(|arch| arch == Arch::X64)
            && ApiVersion::in_range(self.api(), MIN_API, UNSUPPORTED_API)
    }

    /// Registers the extension in the runtime's `php.ini`.
    ///
    /// # Errors
    ///
    /// See [`php_ini::add_extension`].
    pub fn modify_php_ini(&self) -> Result<()> {
        php_ini::add_extension(&self.php_ini, &self.extension)
    }

    /// Which sources asked for the install.
    #[must_use]
    pub fn detection(&self) -> Detection {
        self.detection
    }

    /// Zend API number of the staged runtime.
    #[must_use]
    pub fn api(&self) -> u32 {
        self.extension_dir.api()
    }

    /// Whether the staged runtime is thread safe. Not part of the decision.
    #[must_use]
    pub fn thread_safety(&self) -> bool {
        self.extension_dir.thread_safety()
    }

    /// Target architecture as configured.
    #[must_use]
    pub fn arch_name(&self) -> &str {
        &self.arch
    }

    /// Target architecture, if it is a known one.
    #[must_use]
    pub fn arch(&self) -> Option<Arch> {
        Arch::try_from(self.arch.as_str()).ok()
    }

    /// The runtime's extension directory.
    #[must_use]
    pub fn extension_dir(&self) -> &ExtensionDir {
        &self.extension_dir
    }

    /// Path of the patched `php.ini`.
    #[must_use]
    pub fn php_ini(&self) -> &Path {
        &self.php_ini
    }

    /// Value written after `extension=`.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

/// Location of the shared object as seen by the running application.
///
/// `@{HOME}` is rewritten by the buildpack when the app starts.
#[must_use]
pub fn extension_path(api: u32) -> String {
    format!("@{{HOME}}/xhprof/xhprof-{api}.so")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::fs;

    struct Staged {
        build: tempfile::TempDir,
        ctx: Context,
    }

    fn staged(ext_dir: &str) -> Staged {
        let build = tempfile::tempdir().unwrap();
        let etc = build.path().join("php").join("etc");
        fs::create_dir_all(&etc).unwrap();
        fs::write(
            etc.join("php.ini"),
            format!("[PHP]\nextension_dir = \"{ext_dir}\"\n#{{PHP_EXTENSIONS}}\n"),
        )
        .unwrap();
        let mut ctx = Context::new();
        ctx.insert(keys::BUILD_DIR, build.path().to_str().unwrap());
        Staged { build, ctx }
    }

    fn state(api: u32, arch: Option<&str>, manual: bool) -> InstallerState {
        let mut staged = staged(&format!("/opt/php/ext/no-debug-non-zts-{api}"));
        if let Some(arch) = arch {
            staged.ctx.insert(keys::XHPROF_ARCH, arch);
        }
        if manual {
            staged.ctx.insert(keys::CODIZY_INSTALL, true);
        }
        InstallerState::load(&mut staged.ctx).unwrap()
    }

    #[test]
    fn loads_runtime_facts() {
        let mut staged = staged("/opt/php/ext/no-debug-non-zts-20121212");
        let state = InstallerState::load(&mut staged.ctx).unwrap();
        assert_eq!(state.api(), 20_121_212);
        assert!(!state.thread_safety());
        assert_eq!(state.arch_name(), "x64");
        assert_eq!(state.arch(), Some(Arch::X64));
        assert_eq!(state.extension(), "@{HOME}/xhprof/xhprof-20121212.so");
        assert_eq!(
            state.php_ini(),
            staged.build.path().join("php").join("etc").join("php.ini")
        );
        assert!(staged.ctx.contains_key(keys::XHPROF_DOWNLOAD_URL));
    }

    #[test]
    fn applicability_boundaries() {
        assert!(state(20_100_525, None, true).should_install());
        assert!(state(20_121_212, Some("x64"), true).should_install());
        assert!(state(20_131_225, None, true).should_install());
        assert!(!state(20_131_226, None, true).should_install());
        assert!(!state(20_100_524, None, true).should_install());
        assert!(!state(20_121_212, Some("x86"), true).should_install());
        assert!(!state(20_121_212, Some("amd64"), true).should_install());
        assert!(!state(20_121_212, None, false).should_install());
    }

    #[test]
    fn non_string_arch_is_not_x64() {
        for arch in [Value::Null, Value::from(64), Value::from(true)] {
            let mut staged = staged("/opt/php/ext/no-debug-non-zts-20121212");
            staged.ctx.insert(keys::CODIZY_INSTALL, true);
            staged.ctx.insert(keys::XHPROF_ARCH, arch.clone());
            let state = InstallerState::load(&mut staged.ctx).unwrap();
            assert_eq!(state.arch_name(), arch.to_string());
            assert_eq!(state.arch(), None);
            assert!(!state.should_install());
        }
    }

    #[test]
    fn service_binding_enables_install() {
        let mut staged = staged("/opt/php/ext/no-debug-non-zts-20100525");
        staged.ctx.insert(
            keys::VCAP_SERVICES,
            serde_json::json!({"xhprof": [{"name": "a"}, {"name": "b"}]}),
        );
        let state = InstallerState::load(&mut staged.ctx).unwrap();
        assert!(state.detection().xhprof);
        assert!(state.should_install());
    }

    #[test]
    fn defaults_survive_a_failed_load() {
        let mut ctx = Context::new();
        assert!(matches!(
            InstallerState::load(&mut ctx),
            Err(Error::MissingBuildDir)
        ));
        assert!(ctx.contains_key(keys::XHPROF_VERSION));
    }

    #[test]
    fn patches_php_ini() {
        let mut staged = staged("/opt/php/ext/no-debug-non-zts-20121212");
        staged.ctx.insert(keys::CODIZY_INSTALL, true);
        let state = InstallerState::load(&mut staged.ctx).unwrap();
        state.modify_php_ini().unwrap();
        let ini = fs::read_to_string(state.php_ini()).unwrap();
        assert!(ini.ends_with("#{PHP_EXTENSIONS}\nextension=@{HOME}/xhprof/xhprof-20121212.so\n\n"));
    }
}
