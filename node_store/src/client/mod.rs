//! Document-store client abstraction.
//!
//! [`DocumentStoreClient`] is the complete set of remote calls the node store
//! makes. [`OpenSearchClient`](http::OpenSearchClient) talks to a real
//! cluster over its REST API; [`InMemoryDocumentStore`](memory::InMemoryDocumentStore)
//! is a process-local stand-in with the same index/alias/template semantics.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::NodeStoreResult;

pub mod http;
pub mod memory;

/// Stored field holding the encoded payload.
pub const DATA_FIELD: &str = "data";
/// Stored field holding the write timestamp.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Document body sent to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Codec-encoded payload.
    pub data: String,
    /// ISO-8601 write time, no zone designator.
    pub timestamp: String,
}

/// Body of a composable index template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexTemplateBody {
    pub index_patterns: Vec<String>,
    pub template: TemplateDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub settings: Value,
    pub mappings: Value,
    /// Alias name to alias options.
    pub aliases: BTreeMap<String, Value>,
}

impl IndexTemplateBody {
    /// Template for node partitions: `_source` and dynamic mapping disabled,
    /// `data` stored but not indexed, `timestamp` stored and searchable.
    pub fn for_nodes(index_pattern: &str, shards: u32, replicas: u32, alias: &str) -> Self {
        Self {
            index_patterns: vec![index_pattern.to_string()],
            template: TemplateDefinition {
                settings: json!({
                    "index": {
                        "number_of_shards": shards,
                        "number_of_replicas": replicas,
                    }
                }),
                mappings: json!({
                    "_source": { "enabled": false },
                    "dynamic": "false",
                    "dynamic_templates": [],
                    "properties": {
                        DATA_FIELD: {
                            "type": "text",
                            "index": false,
                            "store": true,
                        },
                        TIMESTAMP_FIELD: {
                            "type": "date",
                            "store": true,
                        },
                    }
                }),
                aliases: BTreeMap::from([(alias.to_string(), json!({}))]),
            },
        }
    }
}

/// Query selecting documents by `_id` for delete-by-query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdQuery {
    /// Exact match on a single id.
    Term(String),
    /// Any of the listed ids.
    Ids(Vec<String>),
}

impl IdQuery {
    pub fn to_json(&self) -> Value {
        match self {
            IdQuery::Term(id) => json!({ "query": { "term": { "_id": id } } }),
            IdQuery::Ids(ids) => json!({ "query": { "ids": { "values": ids } } }),
        }
    }

    pub fn matches(&self, id: &str) -> bool {
        match self {
            IdQuery::Term(term) => term == id,
            IdQuery::Ids(ids) => ids.iter().any(|candidate| candidate == id),
        }
    }
}

/// Remote calls used by the node store.
///
/// Absence on the read side (`get_index_template`, `get_document`) is
/// reported as `None`. Mutating calls report a missing target as
/// `NodeStoreError::NotFound` and concurrent modification as
/// `NodeStoreError::Conflict`; deciding whether those matter is left to the
/// caller. Retries and timeouts belong to the implementation.
#[async_trait]
pub trait DocumentStoreClient: Send + Sync {
    /// Fetch an index template by name.
    async fn get_index_template(&self, name: &str) -> NodeStoreResult<Option<Value>>;

    /// Create an index template. Fails with `Conflict` if one with this name
    /// already exists; never overwrites.
    async fn create_index_template(&self, name: &str, body: &IndexTemplateBody)
        -> NodeStoreResult<()>;

    /// Index or overwrite document `id` in `index`, creating the index on
    /// first use.
    async fn index_document(
        &self,
        index: &str,
        id: &str,
        document: &StoredDocument,
        refresh: bool,
    ) -> NodeStoreResult<()>;

    /// Fetch the requested stored fields of document `id` in `index`.
    async fn get_document(
        &self,
        index: &str,
        id: &str,
        stored_fields: &[&str],
    ) -> NodeStoreResult<Option<BTreeMap<String, Vec<Value>>>>;

    /// Names of the indices behind `alias` holding a document with `_id ==
    /// id`, one entry per hit. A missing alias yields no hits.
    async fn search_by_id(&self, alias: &str, id: &str) -> NodeStoreResult<Vec<String>>;

    /// Delete every document matching `query` across `index` (an index or an
    /// alias). Returns the number of deleted documents.
    async fn delete_by_query(&self, index: &str, query: &IdQuery) -> NodeStoreResult<u64>;

    /// Names of the indices currently bound to `alias`.
    async fn get_alias(&self, alias: &str) -> NodeStoreResult<Vec<String>>;

    /// Delete a whole index.
    async fn delete_index(&self, index: &str) -> NodeStoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_template_shape() {
        let body = IndexTemplateBody::for_nodes("sentry-*", 3, 0, "sentry");
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["index_patterns"], json!(["sentry-*"]));
        assert_eq!(
            value["template"]["settings"]["index"]["number_of_shards"],
            json!(3)
        );
        assert_eq!(
            value["template"]["settings"]["index"]["number_of_replicas"],
            json!(0)
        );
        let mappings = &value["template"]["mappings"];
        assert_eq!(mappings["_source"]["enabled"], json!(false));
        assert_eq!(mappings["dynamic"], json!("false"));
        assert_eq!(mappings["properties"]["data"]["index"], json!(false));
        assert_eq!(mappings["properties"]["data"]["store"], json!(true));
        assert_eq!(mappings["properties"]["timestamp"]["type"], json!("date"));
        assert_eq!(
            mappings["properties"].as_object().unwrap().len(),
            2,
            "only data and timestamp are mapped"
        );
        assert_eq!(value["template"]["aliases"], json!({ "sentry": {} }));
    }

    #[test]
    fn test_id_queries() {
        let term = IdQuery::Term("a".to_string());
        assert_eq!(term.to_json(), json!({ "query": { "term": { "_id": "a" } } }));
        assert!(term.matches("a"));
        assert!(!term.matches("b"));

        let ids = IdQuery::Ids(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            ids.to_json(),
            json!({ "query": { "ids": { "values": ["a", "b"] } } })
        );
        assert!(ids.matches("b"));
        assert!(!ids.matches("c"));
    }
}
