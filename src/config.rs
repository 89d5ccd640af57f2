use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use reqwest::Url;
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "GLOBUS_CONDOR_";
const CONFIG_PATH_ENV: &str = "GLOBUS_CONDOR_CONFIG";

/// Public client id of the native app registered with Globus Auth.
pub const DEFAULT_CLIENT_ID: &str = "fbb557b2-aa0b-42e9-9a07-04c5c4f01474";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub client_id: String,
    pub refresh_token: Option<String>,
    pub auth_url: String,
    pub transfer_url: String,
    /// Web file manager; manual activation links point here.
    pub web_app_url: String,
    /// Short names usable anywhere an endpoint id is expected.
    pub bookmarks: BTreeMap<String, String>,
    pub condor: CondorConfig,
    pub simulation: bool,
    pub verbose: u8,
    pub json_logs: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CondorConfig {
    /// Job attribute that marks a job as belonging to this tool.
    pub owner_attribute: String,
    /// Directory holding the condor command line tools, `PATH` lookup if unset.
    pub bin_dir: Option<PathBuf>,
}

impl Default for CondorConfig {
    fn default() -> Self {
        Self {
            owner_attribute: "IsGlobusJob".to_string(),
            bin_dir: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            refresh_token: None,
            auth_url: "https://auth.globus.org/v2/oauth2/token".to_string(),
            transfer_url: "https://transfer.api.globus.org/v0.10/".to_string(),
            web_app_url: "https://app.globus.org/file-manager".to_string(),
            bookmarks: BTreeMap::new(),
            condor: CondorConfig::default(),
            simulation: false,
            verbose: 0,
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Load defaults, the config file, `GLOBUS_CONDOR_*` variables and then
    /// `overrides` (usually the global CLI flags), later sources winning.
    pub fn new<T: Serialize>(overrides: Option<&T>) -> Result<Self> {
        Self::load_from(&config_path(), overrides, true)
    }

    pub fn load_from<T: Serialize>(
        path: &Path,
        overrides: Option<&T>,
        with_env: bool,
    ) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path));

        if with_env {
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }
        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        figment
            .extract()
            .with_context(|| format!("Failed to load configuration (file {})", path.display()))
    }

    /// Map a bookmark to its endpoint id; anything else is taken as an id.
    pub fn resolve_endpoint(&self, name: &str) -> String {
        match self.bookmarks.get(name) {
            Some(endpoint) => {
                tracing::debug!(bookmark = name, endpoint = %endpoint, "Resolved bookmark");
                endpoint.clone()
            }
            None => name.to_string(),
        }
    }

    pub fn file_manager_url(&self) -> Result<Url> {
        Url::parse(&self.web_app_url)
            .with_context(|| format!("Invalid web_app_url '{}'", self.web_app_url))
    }

    /// Copy safe to print: the refresh token is masked.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.refresh_token.is_some() {
            config.refresh_token = Some("<redacted>".to_string());
        }
        config
    }
}

/// `$GLOBUS_CONDOR_CONFIG`, else `$XDG_CONFIG_HOME/globus-condor/config.toml`,
/// else `~/.config/globus-condor/config.toml`.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }

    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join("globus-condor").join("config.toml")
}
