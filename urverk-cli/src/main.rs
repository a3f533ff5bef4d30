pub mod commands;

use clap::Parser;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = commands::Cli::parse();
    commands::run_command(cli)
}
