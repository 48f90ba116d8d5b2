//! Configuration file handling

use std::path::{Path, PathBuf};

use eyre::OptionExt;
use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use tapsign_card::ProtocolConfig;
use tapsign_wallet::Chain;

/// Name of the configuration file inside [`config_dir`]
pub(crate) const CONFIG_FILE: &str = "tapsign.toml";

/// Settings read from `tapsign.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Config {
    /// Card protocol settings
    pub(crate) protocol: ProtocolConfig,
    /// Chain used when a command does not name one
    pub(crate) chain: Chain,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            protocol: ProtocolConfig::default(),
            chain: Chain::Bitcoin,
        }
    }
}

/// Returns the base config directory for tapsign
pub(crate) fn config_dir() -> eyre::Result<PathBuf> {
    Ok(std::env::home_dir()
        .ok_or_eyre("home directory not found")?
        .join(".tapsign"))
}

/// Load the config from `path`, or from the default location
///
/// A missing file yields the defaults.
pub(crate) fn load_config(path: Option<&Path>) -> eyre::Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config_dir()?.join(CONFIG_FILE),
    };
    Ok(Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .extract()?)
}
