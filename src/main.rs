use clap::Parser;
use voxgate::cli::{self, Cli, Command, ConfigCommand};
use voxgate::{config, logging, server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();
    let config_path = config::get_config_path(args.config_path.as_deref());

    match args.command.unwrap_or(Command::Start) {
        Command::Start => {
            let cfg = config::load_config(&config_path)?;
            logging::init_logging(&cfg.logging)?;
            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                config = %config_path.display(),
                "starting voxgate"
            );
            server::run_server(cfg).await?;
        }
        Command::Config(ConfigCommand::Show) => cli::handle_config_show(&config_path)?,
        Command::Config(ConfigCommand::Path) => cli::handle_config_path(&config_path),
        Command::Status { port, host } => cli::handle_status(&host, port, &config_path).await?,
        Command::Version => cli::handle_version(),
    }

    Ok(())
}
