#![doc = include_str!("../README.md")]

mod package;

use anyhow::{Context as _, Result as AResult, bail};
use clap::Parser;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;
use xhprof_ext::{
    build::ApiVersion,
    prelude::*,
};

use std::{fs, path::PathBuf};

pub use package::{ArchiveInstaller, PackageSource, unpack};

/// Result type returned from the [`run`] function.
pub type CrateResult = AResult<()>;

/// Runs the CLI application. Returns nothing in a result on success.
///
/// # Errors
///
/// Returns an error if the arguments or the context are invalid. Problems
/// met by the extension itself are logged and never fail the run.
pub fn run() -> CrateResult {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    Args::parse().handle()
}

#[derive(Parser)]
#[clap(
    about = "Installs the Xhprof profiler into a staged PHP application.",
    version = env!("CARGO_PKG_VERSION")
)]
enum Args {
    /// Runs the extension's compile step.
    ///
    /// Downloads the Xhprof package into `<build-dir>/xhprof` and registers
    /// it in `<build-dir>/php/etc/php.ini` when a Codizy or Xhprof service is
    /// bound and the runtime is supported. Unsupported runtimes are skipped
    /// with a log line.
    Compile(Compile),
    /// Prints the facts the install decision is drawn from as JSON.
    ///
    /// Nothing in the build directory is modified.
    Detect(Detect),
}

/// Options shared by every subcommand that stages into a build directory.
#[derive(Parser)]
struct Staging {
    /// Root of the application being staged.
    #[arg(long)]
    build_dir: PathBuf,
    /// JSON object whose keys seed the staging context.
    #[arg(long)]
    context: Option<PathBuf>,
    /// Target architecture, overriding `XHPROF_ARCH` from the context.
    #[arg(long)]
    arch: Option<String>,
    /// Installs regardless of bound services.
    #[arg(long)]
    manual_install: bool,
}

#[derive(Parser)]
struct Compile {
    #[command(flatten)]
    staging: Staging,
    /// Reads package archives from this directory instead of downloading
    /// them.
    #[arg(long)]
    package_dir: Option<PathBuf>,
}

#[derive(Parser)]
struct Detect {
    #[command(flatten)]
    staging: Staging,
}

impl Args {
    fn handle(self) -> CrateResult {
        match self {
            Args::Compile(compile) => compile.handle(),
            Args::Detect(detect) => detect.handle(),
        }
    }
}

impl Staging {
    /// Assembles the context: file first, then the environment's service
    /// catalog, then command-line overrides.
    fn context(&self) -> AResult<Context> {
        let mut ctx = match &self.context {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read context file {}", path.display()))?;
                Context::from_json_str(&json)
                    .with_context(|| format!("Context file {} is not a JSON object", path.display()))?
            }
            None => Context::new(),
        };

        if !ctx.contains_key(keys::VCAP_SERVICES) {
            if let Ok(services) = std::env::var(keys::VCAP_SERVICES) {
                ctx.insert(keys::VCAP_SERVICES, services);
            }
        }

        let Some(build_dir) = self.build_dir.to_str() else {
            bail!("Build directory is not valid UTF-8: {}", self.build_dir.display());
        };
        ctx.insert(keys::BUILD_DIR, build_dir);
        if let Some(arch) = &self.arch {
            ctx.insert(keys::XHPROF_ARCH, arch.as_str());
        }
        if self.manual_install {
            ctx.insert(keys::CODIZY_INSTALL, true);
        }
        Ok(ctx)
    }
}

impl Compile {
    fn handle(self) -> CrateResult {
        let mut ctx = self.staging.context()?;
        let source = match self.package_dir {
            Some(dir) => PackageSource::Local(dir),
            None => PackageSource::Remote,
        };
        let mut installer = ArchiveInstaller::new(source);

        let extension = Xhprof;
        info!("Running {} extension", extension.name());
        let status = extension.compile(&mut ctx, &mut installer);
        if status != SUCCESS {
            bail!("Extension {} failed with status {status}", extension.name());
        }
        Ok(())
    }
}

impl Detect {
    fn handle(self) -> CrateResult {
        let mut ctx = self.staging.context()?;
        let state = InstallerState::load(&mut ctx).context("Failed to inspect the staged runtime")?;
        let detection = state.detection();
        let release = ApiVersion::try_from(state.api()).ok().map(ApiVersion::release);

        let report = json!({
            "detected": detection.detected(),
            "codizy": detection.codizy,
            "xhprof": detection.xhprof,
            "manual": detection.manual,
            "api": state.api(),
            "php": release,
            "thread_safe": state.thread_safety(),
            "debug": state.extension_dir().debug(),
            "arch": state.arch_name(),
            "extension": state.extension(),
            "php_ini": state.php_ini().display().to_string(),
            "should_install": state.should_install(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}
