/// `load_config` module: loads the static YAML config and layers environment secrets and
/// overrides on top of it.
///
/// This module is the only place where untrusted YAML is parsed. The YAML file never holds
/// secrets; tokens and the store API key come from the environment (a `.env` file is loaded by
/// `main`).
///
/// # Environment
/// - `ANYL_API_KEY`: store API key, required by every command that talks to the store
/// - `ANYL_BASE_URL`, `ANYL_WORKSPACE`: override `store.base_url` / `store.workspace`
/// - `INSECURE_SSL` (`1`/`true`/`yes`), `CA_BUNDLE`: override `store.tls`
/// - `REDMINE_TOKEN`, `WIKIJS_TOKEN`: injected into every source of that type
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary. Validation happens
/// here, before any network call.
use anyhow::{anyhow, bail, Result};
use rag_ingest_core::export::{ExportConfig, SourceAction};
use rag_ingest_core::http::TlsSettings;
use rag_ingest_core::store::StoreSettings;
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const ENV_API_KEY: &str = "ANYL_API_KEY";
pub const ENV_BASE_URL: &str = "ANYL_BASE_URL";
pub const ENV_WORKSPACE: &str = "ANYL_WORKSPACE";
pub const ENV_INSECURE_SSL: &str = "INSECURE_SSL";
pub const ENV_CA_BUNDLE: &str = "CA_BUNDLE";
pub const ENV_REDMINE_TOKEN: &str = "REDMINE_TOKEN";
pub const ENV_WIKIJS_TOKEN: &str = "WIKIJS_TOKEN";

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    pub export: ExportConfig,
    #[serde(default)]
    pub store: StoreSection,
}

#[derive(Deserialize)]
pub struct StoreSection {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_workspace")]
    pub workspace: String,
    #[serde(default)]
    pub tls: TlsSettings,
    /// Injected from `ANYL_API_KEY`.
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_workspace() -> String {
    "default".to_string()
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            base_url: None,
            workspace: default_workspace(),
            tls: TlsSettings::default(),
            api_key: None,
        }
    }
}

impl fmt::Debug for StoreSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSection")
            .field("base_url", &self.base_url)
            .field("workspace", &self.workspace)
            .field("tls", &self.tls)
            .field("api_key_set", &self.api_key.is_some())
            .finish()
    }
}

impl CliConfig {
    /// Connection settings for the document store. Fails without an API key or base URL.
    pub fn store_settings(&self) -> Result<StoreSettings> {
        let api_key = self
            .store
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("{ENV_API_KEY} must be set to talk to the document store"))?;
        let base_url = self.store.base_url.clone().ok_or_else(|| {
            anyhow!("store.base_url must be set in the config file or via {ENV_BASE_URL}")
        })?;
        Ok(StoreSettings {
            base_url,
            api_key,
            workspace: self.store.workspace.clone(),
            tls: self.store.tls.clone(),
        })
    }

    /// Every configured source must have its token before an export starts.
    pub fn require_source_tokens(&self) -> Result<()> {
        for source in &self.export.sources {
            let (token, var) = match source {
                SourceAction::Redmine(s) => (&s.token, ENV_REDMINE_TOKEN),
                SourceAction::WikiJs(s) => (&s.token, ENV_WIKIJS_TOKEN),
            };
            if token.is_none() {
                bail!("{var} must be set to export {}", source.logical_name());
            }
        }
        Ok(())
    }
}

/// Loads a static YAML config file (no secrets), applies environment overrides and validates it.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    let mut config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    apply_env(&mut config);
    validate(&config)?;

    info!(
        sources = config.export.sources.len(),
        output_dir = ?config.export.output_dir,
        store_base_url = ?config.store.base_url,
        workspace = %config.store.workspace,
        api_key_set = config.store.api_key.is_some(),
        "Configuration loaded"
    );
    Ok(config)
}

fn env_value(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// `1`, `true` and `yes` (any case) switch a flag on.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

fn apply_env(config: &mut CliConfig) {
    let store = &mut config.store;
    store.api_key = env_value(ENV_API_KEY);
    if let Some(base_url) = env_value(ENV_BASE_URL) {
        store.base_url = Some(base_url);
    }
    if let Some(workspace) = env_value(ENV_WORKSPACE) {
        store.workspace = workspace;
    }
    if let Some(flag) = env_value(ENV_INSECURE_SSL) {
        store.tls.insecure = is_truthy(&flag);
    }
    if let Some(bundle) = env_value(ENV_CA_BUNDLE) {
        store.tls.ca_bundle = Some(PathBuf::from(bundle));
    }
    config.export.tls = store.tls.clone();

    let redmine_token = env_value(ENV_REDMINE_TOKEN);
    let wikijs_token = env_value(ENV_WIKIJS_TOKEN);
    for source in &mut config.export.sources {
        match source {
            SourceAction::Redmine(s) => s.token = redmine_token.clone(),
            SourceAction::WikiJs(s) => s.token = wikijs_token.clone(),
        }
    }
}

fn is_http_url(url: &str) -> bool {
    let url = url.trim();
    url.starts_with("http://") || url.starts_with("https://")
}

fn validate(config: &CliConfig) -> Result<()> {
    if let Some(base_url) = &config.store.base_url {
        if !is_http_url(base_url) {
            bail!("store.base_url must be an http(s) URL, got {base_url:?}");
        }
    }
    if config.store.workspace.trim().is_empty() {
        bail!("store.workspace must not be empty");
    }
    for source in &config.export.sources {
        if !is_http_url(source.base_url()) {
            bail!(
                "source base_url must be an http(s) URL, got {:?}",
                source.base_url()
            );
        }
    }
    let mut dirs = HashSet::new();
    for source in &config.export.sources {
        let dir = source.local_path(&config.export.output_dir);
        if !dirs.insert(dir.clone()) {
            bail!(
                "source {} shares export directory {} with another source; merge them into one entry",
                source.logical_name(),
                dir.display()
            );
        }
    }
    if let Some(bundle) = &config.store.tls.ca_bundle {
        if !bundle.is_file() {
            bail!("CA bundle {} does not exist", bundle.display());
        }
    }
    Ok(())
}
