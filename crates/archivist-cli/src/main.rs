use archivist_core::logging;

mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    if let Err(e) = logging::init_logging() {
        logging::init_logging_stderr();
        tracing::debug!("log file unavailable ({e:#}), logging to stderr");
    }

    if let Err(err) = CliCommand::run_from_args().await {
        eprintln!("archivist error: {:#}", err);
        std::process::exit(1);
    }
}
