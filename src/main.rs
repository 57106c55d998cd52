// src/main.rs

use clap::Parser;
use std::process::ExitCode;

use recon_rs_scanner::cli::{self, Cli, EXIT_INVALID_ARGS};
use recon_rs_scanner::logging::{self, Verbosity};

#[tokio::main]
async fn main() -> ExitCode {
    // clap exits with 2 on bad arguments, which would read as "timed out".
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_INVALID_ARGS)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(e) = color_eyre::install() {
        eprintln!("warning: could not install error reporter: {}", e);
    }
    if let Err(e) = logging::initialize_logging(Verbosity::from_flags(cli.verbose, cli.quiet)) {
        eprintln!("warning: logging disabled: {}", e);
    }

    ExitCode::from(cli::execute(cli).await)
}
