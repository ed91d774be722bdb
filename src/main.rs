//! AIAnalysis CLI entry point.

use clap::Parser;

use aianalysis::cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args, config, cli.json).await,
        Commands::Submit(args) => commands::submit::execute(args, config, cli.json).await,
        Commands::Status(args) => commands::status::execute(args, config, cli.json).await,
        Commands::Audit(args) => commands::audit::execute(args, config, cli.json).await,
        Commands::Policy(args) => commands::policy::execute(args, config, cli.json).await,
    };

    if let Err(err) = result {
        aianalysis::cli::handle_error(err, cli.json);
    }
}
