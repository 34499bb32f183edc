use anyhow::{anyhow, Context, Result};
use cloud_utils::constants::DEFAULT_REGION;
use log::{debug, info};
use orchestrator::cluster::{
    DEFAULT_INSTANCE_TYPE, DEFAULT_KUBERNETES_VERSION, DEFAULT_NETWORK_CIDR,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = ".xstrapolate.yaml";

/// Defaults for the command line, read from `~/.xstrapolate.yaml` or the file given with
/// `--config`. Flags always win over the file.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) region: Option<String>,
    /// A role arn to assume on top of the ambient credentials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) assume_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) kubernetes_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) instance_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) network_cidr: Option<String>,
    /// Extra shell commands appended to a single node's bootstrap script.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) bootstrap_commands: Vec<String>,
}

impl Config {
    /// The file `init` writes: every default spelled out so it can be edited in place.
    pub(crate) fn starter() -> Self {
        Self {
            region: Some(DEFAULT_REGION.to_string()),
            assume_role: None,
            kubernetes_version: Some(DEFAULT_KUBERNETES_VERSION.to_string()),
            instance_type: Some(DEFAULT_INSTANCE_TYPE.to_string()),
            network_cidr: Some(DEFAULT_NETWORK_CIDR.to_string()),
            bootstrap_commands: Vec::new(),
        }
    }

    pub(crate) fn default_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(CONFIG_FILE_NAME))
            .ok_or_else(|| anyhow!("Unable to determine the home directory"))
    }

    /// Read the config. A missing default file means an empty config; a missing file that was
    /// named explicitly is an error.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (Self::default_path()?, false),
        };
        if !explicit && !path.exists() {
            debug!("No config file at '{}'", path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow!("Unable to read config file '{}': {}", path.display(), e))?;
        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file '{}'", path.display()))?;
        info!("Using config file '{}'", path.display());
        Ok(config)
    }

    pub(crate) fn from_yaml(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(|e| anyhow!("{}", e))
    }

    /// Write this config to `path`. An existing file is never overwritten.
    pub(crate) fn write_new(&self, path: &Path) -> Result<()> {
        if path.exists() {
            return Err(anyhow!(
                "'{}' already exists, refusing to overwrite it",
                path.display()
            ));
        }
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| anyhow!("Unable to create '{}': {}", parent.display(), e))?;
        }
        let contents = serde_yaml::to_string(self).context("Unable to serialize the config")?;
        fs::write(path, contents)
            .map_err(|e| anyhow!("Unable to write '{}': {}", path.display(), e))
    }
}
