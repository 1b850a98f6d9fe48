//! Node store configuration.

use serde::{Deserialize, Serialize};

use crate::{naming::PartitionNaming, NodeStoreError, NodeStoreResult};

/// What a read does when the same id is found in more than one partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Read from the partition with the most recent date, logging a warning.
    #[default]
    PreferNewest,
    /// Surface `NodeStoreError::MultipleMatches`.
    Fail,
    /// Treat the id as missing, as a lookup that expects a single hit does.
    NotFound,
}

/// Configuration for the partitioned node store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStoreConfig {
    /// Physical index name template, must contain `{date}` once.
    #[serde(default = "default_index")]
    pub index: String,

    /// Make every write visible to reads immediately.
    #[serde(default)]
    pub refresh: bool,

    #[serde(default = "default_template_name")]
    pub template_name: String,

    #[serde(default = "default_alias_name")]
    pub alias_name: String,

    /// Index pattern the template applies to. Derived from `index` when
    /// unset (`sentry-{date}` gives `sentry-*`).
    #[serde(default)]
    pub index_pattern: Option<String>,

    #[serde(default = "default_number_of_shards")]
    pub number_of_shards: u32,

    #[serde(default)]
    pub number_of_replicas: u32,

    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for NodeStoreConfig {
    fn default() -> Self {
        Self {
            index: default_index(),
            refresh: false,
            template_name: default_template_name(),
            alias_name: default_alias_name(),
            index_pattern: None,
            number_of_shards: default_number_of_shards(),
            number_of_replicas: 0,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl NodeStoreConfig {
    pub fn validate(&self) -> NodeStoreResult<()> {
        PartitionNaming::new(&self.index)?;
        if self.template_name.is_empty() {
            return Err(NodeStoreError::InvalidConfig {
                reason: "template_name must not be empty".to_string(),
            });
        }
        if self.alias_name.is_empty() {
            return Err(NodeStoreError::InvalidConfig {
                reason: "alias_name must not be empty".to_string(),
            });
        }
        if self.number_of_shards == 0 {
            return Err(NodeStoreError::InvalidConfig {
                reason: "number_of_shards must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn naming(&self) -> NodeStoreResult<PartitionNaming> {
        PartitionNaming::new(&self.index)
    }

    pub fn index_pattern(&self) -> NodeStoreResult<String> {
        match &self.index_pattern {
            Some(pattern) => Ok(pattern.clone()),
            None => Ok(self.naming()?.index_pattern()),
        }
    }
}

fn default_index() -> String {
    "sentry-{date}".to_string()
}

fn default_template_name() -> String {
    "sentry".to_string()
}

fn default_alias_name() -> String {
    "sentry".to_string()
}

fn default_number_of_shards() -> u32 {
    3
}

/// Connection settings for an OpenSearch cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSearchConfig {
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Per-request timeout. Applies to every remote call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for OpenSearchConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
            accept_invalid_certs: false,
        }
    }
}

fn default_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeStoreConfig::default();
        assert_eq!(config.index, "sentry-{date}");
        assert!(!config.refresh);
        assert_eq!(config.template_name, "sentry");
        assert_eq!(config.alias_name, "sentry");
        assert_eq!(config.number_of_shards, 3);
        assert_eq!(config.number_of_replicas, 0);
        assert_eq!(config.index_pattern().unwrap(), "sentry-*");
        config.validate().unwrap();
    }

    #[test]
    fn test_deserialize_partial() {
        let config: NodeStoreConfig = serde_json::from_str(
            r#"{"index": "nodes-{date}", "refresh": true, "duplicate_policy": "fail"}"#,
        )
        .unwrap();
        assert_eq!(config.index_pattern().unwrap(), "nodes-*");
        assert!(config.refresh);
        assert_eq!(config.alias_name, "sentry");
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Fail);

        let config: NodeStoreConfig =
            serde_json::from_str(r#"{"duplicate_policy": "not_found"}"#).unwrap();
        assert_eq!(config.duplicate_policy, DuplicatePolicy::NotFound);
    }

    #[test]
    fn test_validate_rejects_bad_template() {
        let config = NodeStoreConfig {
            index: "sentry".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(NodeStoreError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_explicit_index_pattern_wins() {
        let config = NodeStoreConfig {
            index_pattern: Some("sentry-*-v2".to_string()),
            ..Default::default()
        };
        assert_eq!(config.index_pattern().unwrap(), "sentry-*-v2");
    }
}
