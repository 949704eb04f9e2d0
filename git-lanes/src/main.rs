//! Browse Git history one reference at a time.
//!
//! Each branch, tag or detached `HEAD` gets its own commit history, loaded
//! once and then patched in place as the reference moves.

#![warn(missing_docs)]
#![warn(
    clippy::all,
    clippy::as_conversions,
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro
)]
#![allow(clippy::too_many_arguments)]

mod commands;
mod opts;

use std::ffi::OsString;

use clap::Parser;
use eyre::Context;
use tracing::level_filters::LevelFilter;
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::commands::ExitCode;
use crate::opts::Opts;

fn install_tracing() -> eyre::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse(std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_|
                // Limit to first-party logs by default in case third-party
                // packages log spuriously.
                "git_lanes=warn,lanes=warn".to_string()))?;
    let fmt_layer = tracing_fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(fmt_layer.with_filter(env_filter))
        .try_init()?;
    Ok(())
}

/// Wrapper function for `main` to ensure that `Drop` is called for local
/// variables, since `std::process::exit` will skip them. In particular, the
/// update worker is only joined when the repository data is dropped.
fn do_main_and_drop_locals(args: Vec<OsString>) -> eyre::Result<i32> {
    let opts = Opts::parse_from(args);
    if let Some(working_directory) = &opts.global_args.working_directory {
        std::env::set_current_dir(working_directory).wrap_err_with(|| {
            format!("Could not set working directory to: {working_directory:?}")
        })?;
    }

    install_tracing()?;

    let exit_code: i32 = match commands::command_main(opts)? {
        Ok(()) => 0,
        Err(ExitCode(exit_code)) => exit_code.try_into()?,
    };
    Ok(exit_code)
}

fn main() -> eyre::Result<()> {
    // Install panic handler.
    color_eyre::install()?;
    let args = std::env::args_os().collect();
    let exit_code = do_main_and_drop_locals(args)?;
    std::process::exit(exit_code);
}
