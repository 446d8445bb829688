mod commands;
mod config;

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing_subscriber::EnvFilter;

use commands::Commands;

#[derive(Parser, Debug)]
#[clap(name = "rtcemuctl")]
#[clap(author, version, about, long_about = None)]
/// Build and impair local multi-node network labs
struct Cli {
    /// Config file to use instead of the per-user one
    #[clap(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[clap(long, global = true)]
    json: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Use color_eyre for application error handling
    color_eyre::install()?;

    // Logs go to stderr so --json output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Cli::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => config::default_path()?,
    };

    // Pass control the commanded subcommand
    match args.command {
        Commands::Lab(lab) => commands::lab::exec(&config_path, args.json, lab).await,
        Commands::Config(config) => commands::config::exec(&config_path, args.json, config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "rtcemuctl",
            "lab",
            "show",
            "--json",
            "--config",
            "/tmp/rtcemu.toml",
        ])
        .unwrap();

        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/rtcemu.toml")));
    }
}
