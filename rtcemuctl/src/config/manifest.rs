use color_eyre::eyre::{eyre, Context, Result};
use std::{
    fs::{create_dir_all, read_to_string, write},
    path::PathBuf,
};
use toml_edit::{table, Document, Table};

use super::Config;

/// A wraper around `toml_edit` to factor out oft repeated code.
///
/// Edits keep comments and ordering of the file intact.
pub struct Manifest {
    path: PathBuf,
    doc: Document,
}

impl Manifest {
    /// Open `path`, or start an empty document if it does not exist yet.
    pub fn open(path: PathBuf) -> Result<Self> {
        let doc = if path.exists() {
            read_to_string(&path)?
                .parse::<Document>()
                .wrap_err_with(|| format!("Invalid TOML in {}", path.display()))?
        } else {
            Document::new()
        };

        Ok(Self { path, doc })
    }

    pub fn save(&self) -> Result<()> {
        if !self.path.exists() {
            create_dir_all(
                self.path
                    .parent()
                    .ok_or_else(|| eyre!("{path} has no parent?", path = self.path.display()))?,
            )?;
        }

        write(&self.path, self.doc.to_string())?;

        Ok(())
    }

    /// Whether `key` is set explicitly in the `[name]` table.
    pub fn contains(&self, name: &str, key: &str) -> bool {
        self.doc
            .as_table()
            .get(name)
            .and_then(|item| item.as_table())
            .map_or(false, |table| table.contains_key(key))
    }

    pub fn get_table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.doc
            .as_table_mut()
            .entry(name)
            .or_insert_with(table)
            .as_table_mut()
            .ok_or_else(|| eyre!("[{name}] is not a table"))
    }
}

impl TryFrom<&Manifest> for Config {
    type Error = color_eyre::Report;

    fn try_from(manifest: &Manifest) -> Result<Config> {
        toml_edit::de::from_str(&manifest.doc.to_string()).wrap_err("Invalid config file.")
    }
}
