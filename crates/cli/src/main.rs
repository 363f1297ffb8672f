//! # `xhprof-ext` CLI
//!
//! Runs the Xhprof buildpack extension against a staged application. Use
//! `xhprof-ext --help` for more information.

fn main() -> xhprof_ext_cli::CrateResult {
    xhprof_ext_cli::run()
}
