use clickmig::MigrationSet;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    clickmig_cli::run(std::env::args_os(), MigrationSet::default()).await
}
