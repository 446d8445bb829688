use std::path::Path;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use comfy_table::{
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Attribute, Cell, Color, Table,
};
use toml_edit::{value, Item, Value};

use crate::config::{Config, Manifest};

/// Keys accepted in the [lab] table.
const LAB_KEYS: &[&str] = &[
    "bridge",
    "gateway",
    "prefix_len",
    "state_path",
    "probe_target",
    "probe_timeout_secs",
];

#[derive(Debug, Parser)]
pub struct ConfigCommand {
    #[clap(subcommand)]
    command: ConfigCommands,
}

#[derive(Debug, clap::Subcommand)]
enum ConfigCommands {
    /// Print the config file location
    Path,

    /// Show the effective lab settings
    Show,

    /// Set a [lab] setting
    Set {
        #[clap(required = true, possible_values = LAB_KEYS)]
        /// Setting to change
        key: String,

        /// New value; numbers are stored as numbers
        value: String,
    },

    /// Remove a [lab] setting so its default applies again
    Unset {
        #[clap(required = true, possible_values = LAB_KEYS)]
        /// Setting to remove
        key: String,
    },
}

pub fn exec(config_path: &Path, json: bool, cmd: ConfigCommand) -> Result<()> {
    match cmd.command {
        ConfigCommands::Path => {
            println!("{}", config_path.display());
        }

        ConfigCommands::Show => {
            let config = Config::load(config_path)?;
            let settings = serde_json::to_value(&config.lab)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
                return Ok(());
            }

            let explicit = Manifest::open(config_path.to_path_buf())?;
            let mut table = Table::new();

            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_content_arrangement(comfy_table::ContentArrangement::Dynamic)
                .set_header(vec![
                    Cell::new("Setting").add_attribute(Attribute::Bold),
                    Cell::new("Value").add_attribute(Attribute::Bold),
                ]);

            if let Some(settings) = settings.as_object() {
                for (key, setting) in settings {
                    let shown = match setting.as_str() {
                        Some(s) => s.to_owned(),
                        None => setting.to_string(),
                    };

                    // Settings from the file stand out from defaults
                    let cell_key = if explicit.contains("lab", key) {
                        Cell::new(format!("{key}*"))
                            .fg(Color::Green)
                            .add_attribute(Attribute::Bold)
                    } else {
                        Cell::new(key)
                    };

                    table.add_row(vec![cell_key, Cell::new(shown)]);
                }
            }

            println!("{table}");
        }

        ConfigCommands::Set { key, value: raw } => {
            let mut m = Manifest::open(config_path.to_path_buf())?;

            m.get_table_mut("lab")?.insert(&key, parse_value(&raw));

            // Refuse to write a file that would not load
            Config::try_from(&m)?;

            m.save()?;
        }

        ConfigCommands::Unset { key } => {
            let mut m = Manifest::open(config_path.to_path_buf())?;

            if m.get_table_mut("lab")?.remove(&key).is_none() {
                return Err(eyre!("Setting '{key}' is not set."));
            }

            m.save()?;
        }
    };

    Ok(())
}

/// TOML literals (numbers, booleans, quoted strings) are kept as typed;
/// anything else becomes a string.
fn parse_value(raw: &str) -> Item {
    match raw.parse::<Value>() {
        Ok(v) if !v.is_str() || raw.trim_start().starts_with('"') => Item::Value(v),
        _ => value(raw),
    }
}
