use std::process::ExitCode;

use academy::cli::{Cli, report_error, run};
use academy_config::LogConfig;
use academy_observability::init_tracing;
use clap::Parser;
use dotenvy::dotenv;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    let cli = Cli::parse();
    let _guard = init_tracing(&LogConfig::from_env());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}
