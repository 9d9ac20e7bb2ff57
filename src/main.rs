use clap::Parser;
use tunnelmesh::cli::{Cli, Command, Role};
use tunnelmesh::config::AppConfig;
use tunnelmesh::error::Error;
use tunnelmesh::process::main_process;

#[tokio::main]
pub async fn main() -> Result<(), Error> {
    env_logger::init();
    let cli = Cli::parse();

    if matches!(cli.command, Some(Command::Reload)) {
        log::warn!("reload requested from the CLI, but inter-process signalling is out of scope; restart the process instead");
        return Ok(());
    }

    let config = AppConfig::load(&cli.config)?;

    match cli.role {
        Role::Main => main_process::run(config).await,
        Role::Worker | Role::Other => {
            log::warn!(
                "role {:?} is driven by the main process in this build; starting it standalone is not supported",
                cli.role
            );
            main_process::run(config).await
        }
    }
}
