pub mod config;
pub mod lab;

use clap::Subcommand;

use config::ConfigCommand;
use lab::LabCommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create, impair, inspect and destroy the local lab
    Lab(LabCommand),

    /// Manage the rtcemuctl config file
    Config(ConfigCommand),
}
