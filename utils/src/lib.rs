/*!

`cloud-utils` holds the pieces shared by the xstrapolate binary and the provider bindings.
`aws` sets up the AWS SDK configuration, the rest covers logging, printing and running external
commands.

!*/

use constants::DEFAULT_LEVEL_FILTER;
use env_logger::Builder;
pub use error::{Error, Result};
use log::LevelFilter;
use serde::Serialize;
use snafu::ResultExt;
use std::env;
use std::process::{Command, Output};

pub mod aws;
pub mod constants;
mod error;

/// Extract the value of `RUST_LOG` if it exists, otherwise log our crates at `log_level` (or
/// `DEFAULT_LEVEL_FILTER`) and everything else, the AWS SDK included, at `Error`.
pub fn init_logger(bin_crate: &str, log_level: Option<LevelFilter>) {
    match env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        Some(_) => {
            // RUST_LOG exists; env_logger will use it.
            Builder::from_default_env().init();
        }
        None => {
            let log_level = log_level.unwrap_or(DEFAULT_LEVEL_FILTER);
            Builder::new()
                .filter_level(LevelFilter::Error)
                .filter(Some(bin_crate), log_level)
                .filter(Some("orchestrator"), log_level)
                .filter(Some("provider_aws"), log_level)
                .filter(Some("cloud_utils"), log_level)
                .init();
        }
    }
}

/// Print a value using `serde_json` `to_string_pretty` for types that implement Serialize.
pub fn json_display<T: Serialize>(object: T) -> String {
    serde_json::to_string_pretty(&object).unwrap_or_else(|e| format!("Serialization failed: {}", e))
}

/// If the command was successful (exit code zero), returns the command's `stdout`. Otherwise
/// returns an error carrying both output streams.
/// - `output`: the `Output` object from a `std::process::Command`
/// - `hint`: the command that was executed, e.g. `flux check --pre`
pub fn check_command_output(output: Output, hint: &str) -> Result<String> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    if output.status.success() {
        Ok(stdout.to_string())
    } else {
        error::CommandFailedSnafu {
            hint,
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr),
            stdout,
        }
        .fail()
    }
}

/// Run `command` to completion and return its `stdout`; see [`check_command_output`].
pub fn run_command(command: &mut Command, hint: &str) -> Result<String> {
    log::debug!("Running '{}'", hint);
    let output = command
        .output()
        .context(error::CommandStartSnafu { hint })?;
    check_command_output(output, hint)
}
