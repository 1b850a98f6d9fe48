//! The node store facade: key-value put/get/delete over date-partitioned
//! indices reachable through one alias.

use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    client::{DocumentStoreClient, IdQuery, IndexTemplateBody, StoredDocument, DATA_FIELD},
    clock::{document_timestamp, Clock, SystemClock},
    codec,
    config::NodeStoreConfig,
    metrics::NodeStoreMetrics,
    naming::PartitionNaming,
    resolver::Resolver,
    retention::{RetentionSweep, SweepReport},
    template::{ensure_template, TemplateStatus},
    NodeStoreError,
    NodeStoreResult,
};

pub struct NodeStorage {
    client: Arc<dyn DocumentStoreClient>,
    config: NodeStoreConfig,
    naming: PartitionNaming,
    clock: Arc<dyn Clock>,
    metrics: NodeStoreMetrics,
}

impl NodeStorage {
    pub fn new(
        client: Arc<dyn DocumentStoreClient>,
        config: NodeStoreConfig,
    ) -> NodeStoreResult<Self> {
        config.validate()?;
        let naming = config.naming()?;
        Ok(Self {
            client,
            config,
            naming,
            clock: Arc::new(SystemClock),
            metrics: NodeStoreMetrics::new(),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &NodeStoreConfig {
        &self.config
    }

    pub fn naming(&self) -> &PartitionNaming {
        &self.naming
    }

    /// A fresh random node id (32 lowercase hex characters).
    pub fn generate_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Partition that writes go to right now.
    pub fn write_partition(&self) -> String {
        self.naming.write_partition_for(self.clock.today())
    }

    fn observe<T>(
        &self,
        operation: &'static str,
        result: NodeStoreResult<T>,
    ) -> NodeStoreResult<T> {
        if result.is_err() {
            self.metrics.record_error(operation);
        }
        result
    }

    /// Make sure the index template (and through it the alias) exists.
    pub async fn bootstrap(&self) -> NodeStoreResult<TemplateStatus> {
        let _timer = self.metrics.timer("bootstrap");
        let result = self.ensure_node_template().await;
        self.observe("bootstrap", result)
    }

    async fn ensure_node_template(&self) -> NodeStoreResult<TemplateStatus> {
        let body = IndexTemplateBody::for_nodes(
            &self.config.index_pattern()?,
            self.config.number_of_shards,
            self.config.number_of_replicas,
            &self.config.alias_name,
        );
        ensure_template(self.client.as_ref(), &self.config.template_name, &body).await
    }

    /// Fetch the payload stored under `id`, wherever it lives. A missing id
    /// is `Ok(None)`.
    pub async fn get(&self, id: &str) -> NodeStoreResult<Option<Bytes>> {
        let _timer = self.metrics.timer("get");
        let result = self.get_bytes(id).await;
        self.observe("get", result)
    }

    async fn get_bytes(&self, id: &str) -> NodeStoreResult<Option<Bytes>> {
        let resolver = Resolver::new(self.client.as_ref(), &self.config.alias_name, &self.naming);
        let Some(partition) = resolver.resolve(id, self.config.duplicate_policy).await? else {
            warn!(doc_id = %id, error = "index containing doc_id not found", "document get");
            return Ok(None);
        };

        let Some(fields) = self
            .client
            .get_document(&partition, id, &[DATA_FIELD])
            .await?
        else {
            // Deleted between resolve and fetch.
            debug!(doc_id = %id, index = %partition, "document vanished after resolve");
            return Ok(None);
        };

        let encoded = fields
            .get(DATA_FIELD)
            .and_then(|values| values.first())
            .and_then(|value| value.as_str())
            .ok_or_else(|| NodeStoreError::CorruptData {
                reason: format!("document '{}' in '{}' has no stored data field", id, partition),
            })?;
        Ok(Some(Bytes::from(codec::decode(encoded)?)))
    }

    /// Fetch several payloads; ids that do not exist are absent from the map.
    pub async fn get_multi(&self, ids: &[&str]) -> NodeStoreResult<HashMap<String, Bytes>> {
        let _timer = self.metrics.timer("get_multi");
        let result = self.get_multi_bytes(ids).await;
        self.observe("get_multi", result)
    }

    async fn get_multi_bytes(&self, ids: &[&str]) -> NodeStoreResult<HashMap<String, Bytes>> {
        let mut found = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(data) = self.get_bytes(id).await? {
                found.insert(id.to_string(), data);
            }
        }
        Ok(found)
    }

    /// Store `data` under `id` in today's partition. Last write wins.
    pub async fn set(&self, id: &str, data: &[u8]) -> NodeStoreResult<()> {
        let _timer = self.metrics.timer("set");
        let result = self.set_bytes(id, data).await;
        self.observe("set", result)
    }

    async fn set_bytes(&self, id: &str, data: &[u8]) -> NodeStoreResult<()> {
        let partition = self.write_partition();
        let document = StoredDocument {
            data: codec::encode(data)?,
            timestamp: document_timestamp(self.clock.now_utc()),
        };
        self.client
            .index_document(&partition, id, &document, self.config.refresh)
            .await?;
        debug!(doc_id = %id, index = %partition, size = data.len(), "document set");
        Ok(())
    }

    /// Store a node value serialized as JSON.
    pub async fn set_node<T: Serialize>(&self, id: &str, node: &T) -> NodeStoreResult<()> {
        let data = serde_json::to_vec(node)?;
        self.set(id, &data).await
    }

    /// Read a node value stored with [`set_node`](Self::set_node).
    pub async fn get_node<T: DeserializeOwned>(&self, id: &str) -> NodeStoreResult<Option<T>> {
        let Some(data) = self.get(id).await? else {
            return Ok(None);
        };
        let node = serde_json::from_slice(&data).map_err(|e| NodeStoreError::CorruptData {
            reason: format!("node '{}' is not valid json: {}", id, e),
        })?;
        Ok(Some(node))
    }

    /// Best-effort delete of `id` from every partition behind the alias.
    /// Missing ids and concurrent modifications are not errors.
    pub async fn delete(&self, id: &str) -> NodeStoreResult<()> {
        let _timer = self.metrics.timer("delete");
        info!(doc_id = %id, "document delete");
        let result = self
            .delete_matching(&IdQuery::Term(id.to_string()))
            .await
            .map(|_| ());
        self.observe("delete", result)
    }

    /// Best-effort delete of several ids. Not atomic: some ids may be gone
    /// and others not when this returns.
    pub async fn delete_multi(&self, ids: &[&str]) -> NodeStoreResult<()> {
        let _timer = self.metrics.timer("delete_multi");
        if ids.is_empty() {
            return Ok(());
        }
        let query = IdQuery::Ids(ids.iter().map(|id| id.to_string()).collect());
        let result = self.delete_matching(&query).await.map(|deleted| {
            if let Some(deleted) = deleted {
                info!(
                    docs_to_delete = ids.len(),
                    docs_deleted = deleted,
                    "document delete_multi"
                );
            }
        });
        self.observe("delete_multi", result)
    }

    /// Returns the deleted count, or `None` when the store reported the
    /// target missing or a conflict.
    async fn delete_matching(&self, query: &IdQuery) -> NodeStoreResult<Option<u64>> {
        match self
            .client
            .delete_by_query(&self.config.alias_name, query)
            .await
        {
            Ok(deleted) => Ok(Some(deleted)),
            Err(e) if e.is_not_found() || e.is_conflict() => {
                debug!(alias = %self.config.alias_name, error = %e, "ignoring delete failure");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Delete every partition dated before `cutoff`.
    pub async fn cleanup(&self, cutoff: DateTime<Utc>) -> NodeStoreResult<SweepReport> {
        let _timer = self.metrics.timer("cleanup");
        let sweep =
            RetentionSweep::new(self.client.as_ref(), &self.config.alias_name, &self.naming);
        let result = sweep.run(cutoff).await;
        self.observe("cleanup", result)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::{client::memory::InMemoryDocumentStore, clock::ManualClock};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_generate_id() {
        let a = NodeStorage::generate_id();
        let b = NodeStorage::generate_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let config = NodeStoreConfig {
            index: "no-placeholder".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            NodeStorage::new(store, config),
            Err(NodeStoreError::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn test_set_writes_to_todays_partition() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let clock = Arc::new(ManualClock::at_day(day(2024, 5, 1)));
        let nodes = NodeStorage::new(store.clone(), NodeStoreConfig::default())
            .unwrap()
            .with_clock(clock.clone());

        nodes.set("a", b"first").await.unwrap();
        clock.set_day(day(2024, 5, 2));
        nodes.set("b", b"second").await.unwrap();

        assert_eq!(
            store.index_names(),
            vec!["sentry-2024-05-01", "sentry-2024-05-02"]
        );
        let stored = store.document("sentry-2024-05-01", "a").unwrap();
        assert_eq!(codec::decode(&stored.data).unwrap(), b"first");
        assert_eq!(stored.timestamp, "2024-05-01T00:00:00.000000");
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_corrupt() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let clock = Arc::new(ManualClock::at_day(day(2024, 5, 1)));
        let nodes = NodeStorage::new(store.clone(), NodeStoreConfig::default())
            .unwrap()
            .with_clock(clock);
        nodes.bootstrap().await.unwrap();
        store
            .index_document(
                "sentry-2024-05-01",
                "a",
                &StoredDocument {
                    data: "%%%".to_string(),
                    timestamp: String::new(),
                },
                true,
            )
            .await
            .unwrap();

        assert!(matches!(
            nodes.get("a").await,
            Err(NodeStoreError::CorruptData { .. })
        ));
    }
}
