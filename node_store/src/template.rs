//! Idempotent bootstrap of the index template and the alias it binds.

use tracing::info;

use crate::{
    client::{DocumentStoreClient, IndexTemplateBody},
    NodeStoreResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateStatus {
    /// A template with this name was already present and left untouched.
    Existing,
    /// The template was created by this call.
    Created,
}

/// Create the index template `name` unless one already exists.
///
/// An existing template is never compared or updated, so operator edits made
/// after creation survive. Losing a creation race to another process counts
/// as `Existing`.
pub async fn ensure_template(
    client: &dyn DocumentStoreClient,
    name: &str,
    body: &IndexTemplateBody,
) -> NodeStoreResult<TemplateStatus> {
    if client.get_index_template(name).await?.is_some() {
        info!(template = %name, status = "exists", "index template check");
        return Ok(TemplateStatus::Existing);
    }
    info!(template = %name, status = "not found", "index template check");

    match client.create_index_template(name, body).await {
        Ok(()) => {
            info!(
                template = %name,
                index_patterns = ?body.index_patterns,
                aliases = ?body.template.aliases.keys().collect::<Vec<_>>(),
                "index template created"
            );
            Ok(TemplateStatus::Created)
        }
        Err(e) if e.is_conflict() => {
            info!(template = %name, "index template created concurrently, keeping it");
            Ok(TemplateStatus::Existing)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::InMemoryDocumentStore;

    #[tokio::test]
    async fn test_ensure_template_creates_once() {
        let store = InMemoryDocumentStore::new();
        let body = IndexTemplateBody::for_nodes("sentry-*", 3, 0, "sentry");

        let first = ensure_template(&store, "sentry", &body).await.unwrap();
        let second = ensure_template(&store, "sentry", &body).await.unwrap();

        assert_eq!(first, TemplateStatus::Created);
        assert_eq!(second, TemplateStatus::Existing);
        assert_eq!(store.template_creations(), 1);
    }

    #[tokio::test]
    async fn test_existing_template_is_not_overwritten() {
        let store = InMemoryDocumentStore::new();
        let operator = IndexTemplateBody::for_nodes("sentry-*", 5, 1, "sentry");
        store
            .create_index_template("sentry", &operator)
            .await
            .unwrap();

        let ours = IndexTemplateBody::for_nodes("sentry-*", 3, 0, "sentry");
        let status = ensure_template(&store, "sentry", &ours).await.unwrap();

        assert_eq!(status, TemplateStatus::Existing);
        assert_eq!(store.template("sentry"), Some(operator));
    }
}
