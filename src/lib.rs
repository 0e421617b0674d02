pub mod cli;
pub mod commands;
pub mod db;
pub mod error;
pub mod recognition;
pub mod session;
pub mod settings;
pub mod utils;

use std::process::ExitCode;

use clap::Parser;

use cli::Cli;

/// Exit status for command-line usage errors (sysexits `EX_USAGE`).
const EXIT_USAGE: u8 = 64;

pub fn run() -> ExitCode {
    let debug_mode = std::env::var("ROLLCALL_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::new()
        .filter_level(if debug_mode {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { EXIT_USAGE } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(commands::dispatch(cli)) {
        Ok(code) => code,
        Err(err) => {
            if err.is_fatal_setup() {
                log::error!("cannot start: {err}");
            } else {
                log::error!("{err}");
            }
            eprintln!("rollcall: {err}");
            ExitCode::FAILURE
        }
    }
}
