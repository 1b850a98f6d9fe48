use std::path::Path;

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use node_store::{NodeStoreConfig, OpenSearchConfig};
use serde::{Deserialize, Serialize};

const LOCAL_ENV: &str = "local";
const ENV_PREFIX: &str = "NODESTORE_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default)]
    pub opensearch: OpenSearchConfig,
    #[serde(default)]
    pub node_store: NodeStoreConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            env: default_env(),
            opensearch: Default::default(),
            node_store: Default::default(),
        }
    }
}

fn default_env() -> String {
    LOCAL_ENV.to_string()
}

impl AppConfig {
    /// Defaults, overlaid by the YAML file if given, overlaid by
    /// `NODESTORE_*` environment variables (`__` separates nested keys, e.g.
    /// `NODESTORE_OPENSEARCH__URL`).
    pub fn load(path: Option<&Path>) -> Result<AppConfig> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = path {
            let config_str = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            figment = figment.merge(Yaml::string(&config_str));
        }
        let config: AppConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(test)]
    fn from_yaml_str(config_str: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Yaml::string(config_str))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.node_store.validate()?;
        if self.opensearch.timeout_secs == 0 {
            return Err(anyhow::anyhow!("opensearch timeout_secs must be positive"));
        }
        Ok(())
    }

    pub fn structured_logging(&self) -> bool {
        self.env != LOCAL_ENV
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use node_store::DuplicatePolicy;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_yaml_str("env: local\n").unwrap();
        assert_eq!(config.env, "local");
        assert!(!config.structured_logging());
        assert_eq!(config.opensearch.url, "http://localhost:9200");
        assert_eq!(config.node_store.index, "sentry-{date}");
        assert_eq!(config.node_store.alias_name, "sentry");
    }

    #[test]
    fn test_yaml_overrides() {
        let config = AppConfig::from_yaml_str(
            r#"
env: production
opensearch:
  url: https://search.internal:9200
  username: sentry
  password: secret
node_store:
  index: nodes-{date}
  refresh: true
  duplicate_policy: fail
"#,
        )
        .unwrap();
        assert!(config.structured_logging());
        assert_eq!(config.opensearch.username.as_deref(), Some("sentry"));
        assert_eq!(config.opensearch.timeout_secs, 30);
        assert_eq!(config.node_store.index, "nodes-{date}");
        assert!(config.node_store.refresh);
        assert_eq!(config.node_store.template_name, "sentry");
        assert_eq!(config.node_store.duplicate_policy, DuplicatePolicy::Fail);
    }

    #[test]
    fn test_invalid_index_template() {
        let result = AppConfig::from_yaml_str("node_store:\n  index: nodes\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "node_store:\n  alias_name: nodes").unwrap();
        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.node_store.alias_name, "nodes");
    }

    #[test]
    fn test_load_missing_file() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/nodestore.yaml")));
        assert!(result.is_err());
    }
}
