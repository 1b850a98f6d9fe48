//! Node storage on top of date-partitioned OpenSearch indices.
//!
//! Opaque payloads are stored under caller-supplied ids in one index per
//! day (`sentry-2024-05-01`, `sentry-2024-05-02`, ...). Every partition is
//! bound to a single alias through an index template, so reads and deletes
//! never need to know which day a document was written on, and retention is
//! a matter of dropping whole partitions.
//!
//! - Writes go to today's partition, named from the `{date}` template.
//! - Reads search the alias for the id, then fetch the stored `data` field
//!   from the partition that holds it.
//! - Deletes run a delete-by-query against the alias and are best-effort.
//! - [`NodeStorage::cleanup`] drops partitions whose date precedes a cutoff,
//!   tolerating operator-renamed partitions such as
//!   `sentry-2024-05-01-reindex`.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chrono::{Duration, Utc};
//! use node_store::{NodeStorage, NodeStoreConfig, OpenSearchClient, OpenSearchConfig};
//!
//! # async fn example() -> Result<(), node_store::NodeStoreError> {
//! let client = OpenSearchClient::new(&OpenSearchConfig::default())?;
//! let nodes = NodeStorage::new(Arc::new(client), NodeStoreConfig::default())?;
//! nodes.bootstrap().await?;
//!
//! let id = NodeStorage::generate_id();
//! nodes.set(&id, br#"{"message": "hello world"}"#).await?;
//! assert!(nodes.get(&id).await?.is_some());
//!
//! // Drop partitions older than 90 days.
//! nodes.cleanup(Utc::now() - Duration::days(90)).await?;
//! # Ok(())
//! # }
//! ```

mod client;
pub mod clock;
pub mod codec;
mod config;
mod error;
mod metrics;
pub mod naming;
mod resolver;
mod retention;
mod storage;
mod template;

pub use client::{
    http::OpenSearchClient,
    memory::{Fault, InMemoryDocumentStore, Operation},
    DocumentStoreClient,
    IdQuery,
    IndexTemplateBody,
    StoredDocument,
    TemplateDefinition,
    DATA_FIELD,
    TIMESTAMP_FIELD,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DuplicatePolicy, NodeStoreConfig, OpenSearchConfig};
pub use error::{NodeStoreError, NodeStoreResult};
pub use metrics::{NodeStoreMetrics, Timer};
pub use naming::PartitionNaming;
pub use resolver::{Resolution, Resolver};
pub use retention::{RetentionSweep, SweepReport};
pub use storage::NodeStorage;
pub use template::{ensure_template, TemplateStatus};
