use color_eyre::eyre::{eyre, Context, Result};
use directories::ProjectDirs;
use rtcemu::LabConfig;
use serde_derive::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::path::{Path, PathBuf};

mod manifest;

pub use manifest::*;

/// Location of the per-user config file.
pub fn default_path() -> Result<PathBuf> {
    ProjectDirs::from("org", "rtcemu", "rtcemu")
        .ok_or_else(|| eyre!("Can not compute project config path"))
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// The rtcemuctl config file
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// The [lab] table
    pub lab: LabConfig,
}

impl Config {
    /// A missing file is not an error; it means every default applies.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = read_to_string(path)
                .wrap_err_with(|| format!("Can not read {}", path.display()))?;
            toml_edit::de::from_str(&raw)
                .wrap_err_with(|| format!("Invalid config file {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::write;
    use std::net::Ipv4Addr;

    #[test]
    fn test_missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.toml")).unwrap();

        assert_eq!(config.lab, LabConfig::default());
    }

    #[test]
    fn test_partial_lab_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        write(
            &path,
            "[lab]\nbridge = \"rtclab1\"\ngateway = \"10.201.0.1\"\nprobe_timeout_secs = 3\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.lab.bridge, "rtclab1");
        assert_eq!(config.lab.gateway, Ipv4Addr::new(10, 201, 0, 1));
        assert_eq!(config.lab.probe_timeout_secs, 3);
        assert_eq!(config.lab.prefix_len, 24);
        assert_eq!(config.lab.probe_target, "1.1.1.1");
    }

    #[test]
    fn test_invalid_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        write(&path, "[lab]\ngateway = \"not-an-address\"\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(format!("{err}").contains("Invalid config file"));
    }
}
