//! Maps a document id to the partition holding it, through the alias.

use tracing::warn;

use crate::{
    client::DocumentStoreClient,
    config::DuplicatePolicy,
    naming::PartitionNaming,
    NodeStoreError,
    NodeStoreResult,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(String),
    NotFound,
    /// The id is present in several partitions, sorted by name.
    Multiple(Vec<String>),
}

pub struct Resolver<'a> {
    client: &'a dyn DocumentStoreClient,
    alias: &'a str,
    naming: &'a PartitionNaming,
}

impl<'a> Resolver<'a> {
    pub fn new(
        client: &'a dyn DocumentStoreClient,
        alias: &'a str,
        naming: &'a PartitionNaming,
    ) -> Self {
        Self {
            client,
            alias,
            naming,
        }
    }

    /// Exact-id lookup across every partition behind the alias.
    pub async fn find_partition(&self, id: &str) -> NodeStoreResult<Resolution> {
        let mut partitions = self.client.search_by_id(self.alias, id).await?;
        partitions.sort();
        partitions.dedup();
        Ok(match partitions.len() {
            0 => Resolution::NotFound,
            1 => Resolution::Found(partitions.remove(0)),
            _ => Resolution::Multiple(partitions),
        })
    }

    /// Resolve to a single partition, applying `policy` to duplicates.
    pub async fn resolve(
        &self,
        id: &str,
        policy: DuplicatePolicy,
    ) -> NodeStoreResult<Option<String>> {
        match self.find_partition(id).await? {
            Resolution::Found(partition) => Ok(Some(partition)),
            Resolution::NotFound => Ok(None),
            Resolution::Multiple(partitions) => match policy {
                DuplicatePolicy::Fail => Err(NodeStoreError::MultipleMatches {
                    id: id.to_string(),
                    partitions,
                }),
                DuplicatePolicy::PreferNewest => {
                    let newest = self.newest(&partitions);
                    warn!(
                        doc_id = %id,
                        partitions = ?partitions,
                        chosen = ?newest,
                        "document found in multiple partitions, reading newest"
                    );
                    Ok(newest)
                }
                DuplicatePolicy::NotFound => {
                    warn!(
                        doc_id = %id,
                        partitions = ?partitions,
                        "document found in multiple partitions, treating as missing"
                    );
                    Ok(None)
                }
            },
        }
    }

    /// Latest parsed date wins; names that do not parse rank below any that
    /// do, and ties fall back to name order.
    fn newest(&self, partitions: &[String]) -> Option<String> {
        partitions
            .iter()
            .max_by(|a, b| {
                let date_a = self.naming.parse_date(a).ok();
                let date_b = self.naming.parse_date(b).ok();
                date_a.cmp(&date_b).then_with(|| a.cmp(b))
            })
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{memory::InMemoryDocumentStore, StoredDocument};

    async fn store_with(id: &str, partitions: &[&str]) -> InMemoryDocumentStore {
        let store = InMemoryDocumentStore::new();
        let doc = StoredDocument {
            data: String::new(),
            timestamp: String::new(),
        };
        for partition in partitions {
            store.create_index(partition, &["sentry"]);
            store
                .index_document(partition, id, &doc, false)
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_find_partition() {
        let naming = PartitionNaming::new("sentry-{date}").unwrap();
        let store = store_with("a", &["sentry-2024-05-01"]).await;
        store.create_index("sentry-2024-05-02", &["sentry"]);
        let resolver = Resolver::new(&store, "sentry", &naming);

        assert_eq!(
            resolver.find_partition("a").await.unwrap(),
            Resolution::Found("sentry-2024-05-01".to_string())
        );
        assert_eq!(
            resolver.find_partition("b").await.unwrap(),
            Resolution::NotFound
        );
    }

    #[tokio::test]
    async fn test_missing_alias_resolves_to_not_found() {
        let naming = PartitionNaming::new("sentry-{date}").unwrap();
        let store = InMemoryDocumentStore::new();
        let resolver = Resolver::new(&store, "sentry", &naming);
        assert_eq!(
            resolver
                .resolve("a", DuplicatePolicy::PreferNewest)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_duplicates_prefer_newest() {
        let naming = PartitionNaming::new("sentry-{date}").unwrap();
        let store = store_with(
            "a",
            &[
                "sentry-2024-06-01",
                "sentry-2024-05-01-reindex",
                "sentry-badname",
            ],
        )
        .await;
        let resolver = Resolver::new(&store, "sentry", &naming);

        assert!(matches!(
            resolver.find_partition("a").await.unwrap(),
            Resolution::Multiple(p) if p.len() == 3
        ));
        assert_eq!(
            resolver
                .resolve("a", DuplicatePolicy::PreferNewest)
                .await
                .unwrap(),
            Some("sentry-2024-06-01".to_string())
        );
    }

    #[tokio::test]
    async fn test_duplicates_fail() {
        let naming = PartitionNaming::new("sentry-{date}").unwrap();
        let store = store_with("a", &["sentry-2024-05-01", "sentry-2024-05-02"]).await;
        let resolver = Resolver::new(&store, "sentry", &naming);

        let err = resolver
            .resolve("a", DuplicatePolicy::Fail)
            .await
            .unwrap_err();
        match err {
            NodeStoreError::MultipleMatches { id, partitions } => {
                assert_eq!(id, "a");
                assert_eq!(partitions, vec!["sentry-2024-05-01", "sentry-2024-05-02"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_duplicates_not_found() {
        let naming = PartitionNaming::new("sentry-{date}").unwrap();
        let store = store_with("a", &["sentry-2024-05-01", "sentry-2024-05-02"]).await;
        store.create_index("sentry-2024-05-03", &["sentry"]);
        store
            .index_document(
                "sentry-2024-05-03",
                "b",
                &StoredDocument {
                    data: String::new(),
                    timestamp: String::new(),
                },
                false,
            )
            .await
            .unwrap();
        let resolver = Resolver::new(&store, "sentry", &naming);

        assert_eq!(
            resolver.resolve("a", DuplicatePolicy::NotFound).await.unwrap(),
            None
        );
        assert_eq!(
            resolver.resolve("b", DuplicatePolicy::NotFound).await.unwrap(),
            Some("sentry-2024-05-03".to_string())
        );
    }
}
