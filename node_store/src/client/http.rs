//! OpenSearch REST client.

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::{DocumentStoreClient, IdQuery, IndexTemplateBody, StoredDocument};
use crate::{config::OpenSearchConfig, NodeStoreError, NodeStoreResult};

/// Hits requested when resolving an id; more than one already means a
/// duplicate, the extra room only makes the duplicate set visible.
const SEARCH_BY_ID_SIZE: usize = 10;

pub struct OpenSearchClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Option<(String, Option<String>)>,
}

impl OpenSearchClient {
    pub fn new(config: &OpenSearchConfig) -> NodeStoreResult<Self> {
        let base_url = Url::parse(&config.url)?;
        if base_url.cannot_be_a_base() {
            return Err(NodeStoreError::InvalidConfig {
                reason: format!("opensearch url '{}' cannot be a base url", config.url),
            });
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;
        let credentials = config
            .username
            .clone()
            .map(|username| (username, config.password.clone()));
        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> NodeStoreResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| NodeStoreError::InvalidConfig {
                reason: format!("opensearch url '{}' cannot be a base url", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.credentials {
            Some((username, password)) => builder.basic_auth(username, password.as_ref()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, resource: &str) -> NodeStoreResult<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(resource = %resource, status = %status, body = %body, "opensearch request failed");
        Err(error_for_status(status, resource, &body))
    }
}

/// Map an unsuccessful response onto the error taxonomy.
fn error_for_status(status: StatusCode, resource: &str, body: &str) -> NodeStoreError {
    let error_type = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["type"].as_str().map(str::to_string))
        .unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => NodeStoreError::NotFound {
            resource: resource.to_string(),
        },
        StatusCode::CONFLICT => NodeStoreError::Conflict {
            resource: resource.to_string(),
        },
        _ if error_type == "resource_already_exists_exception"
            || (error_type == "illegal_argument_exception" && body.contains("already exists")) =>
        {
            NodeStoreError::Conflict {
                resource: resource.to_string(),
            }
        }
        _ => NodeStoreError::Transport {
            source: anyhow::anyhow!("{} returned {}: {}", resource, status, body),
        },
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_index")]
    index: String,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    found: bool,
    #[serde(default)]
    fields: BTreeMap<String, Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct DeleteByQueryResponse {
    #[serde(default)]
    deleted: u64,
}

#[async_trait]
impl DocumentStoreClient for OpenSearchClient {
    async fn get_index_template(&self, name: &str) -> NodeStoreResult<Option<Value>> {
        let url = self.endpoint(&["_index_template", name])?;
        match self.send(self.request(Method::GET, url), name).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(NodeStoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_index_template(
        &self,
        name: &str,
        body: &IndexTemplateBody,
    ) -> NodeStoreResult<()> {
        let mut url = self.endpoint(&["_index_template", name])?;
        url.query_pairs_mut().append_pair("create", "true");
        self.send(self.request(Method::PUT, url).json(body), name)
            .await?;
        Ok(())
    }

    async fn index_document(
        &self,
        index: &str,
        id: &str,
        document: &StoredDocument,
        refresh: bool,
    ) -> NodeStoreResult<()> {
        let mut url = self.endpoint(&[index, "_doc", id])?;
        url.query_pairs_mut()
            .append_pair("refresh", if refresh { "true" } else { "false" });
        self.send(self.request(Method::PUT, url).json(document), index)
            .await?;
        Ok(())
    }

    async fn get_document(
        &self,
        index: &str,
        id: &str,
        stored_fields: &[&str],
    ) -> NodeStoreResult<Option<BTreeMap<String, Vec<Value>>>> {
        let mut url = self.endpoint(&[index, "_doc", id])?;
        url.query_pairs_mut()
            .append_pair("stored_fields", &stored_fields.join(","));
        let response = match self.send(self.request(Method::GET, url), index).await {
            Ok(response) => response,
            Err(NodeStoreError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let response: GetResponse = response.json().await?;
        Ok(response.found.then_some(response.fields))
    }

    async fn search_by_id(&self, alias: &str, id: &str) -> NodeStoreResult<Vec<String>> {
        let url = self.endpoint(&[alias, "_search"])?;
        let mut body = IdQuery::Term(id.to_string()).to_json();
        body["_source"] = json!(false);
        body["size"] = json!(SEARCH_BY_ID_SIZE);
        let response = match self
            .send(self.request(Method::POST, url).json(&body), alias)
            .await
        {
            Ok(response) => response,
            Err(NodeStoreError::NotFound { .. }) => return Ok(vec![]),
            Err(e) => return Err(e),
        };
        let response: SearchResponse = response.json().await?;
        Ok(response.hits.hits.into_iter().map(|hit| hit.index).collect())
    }

    async fn delete_by_query(&self, index: &str, query: &IdQuery) -> NodeStoreResult<u64> {
        let url = self.endpoint(&[index, "_delete_by_query"])?;
        let response = self
            .send(self.request(Method::POST, url).json(&query.to_json()), index)
            .await?;
        let response: DeleteByQueryResponse = response.json().await?;
        Ok(response.deleted)
    }

    async fn get_alias(&self, alias: &str) -> NodeStoreResult<Vec<String>> {
        let url = self.endpoint(&["_alias", alias])?;
        let response = self.send(self.request(Method::GET, url), alias).await?;
        let indices: BTreeMap<String, Value> = response.json().await?;
        Ok(indices.into_keys().collect())
    }

    async fn delete_index(&self, index: &str) -> NodeStoreResult<()> {
        let url = self.endpoint(&[index])?;
        self.send(self.request(Method::DELETE, url), index).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> OpenSearchClient {
        OpenSearchClient::new(&OpenSearchConfig {
            url: url.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let client = client("http://localhost:9200");
        let url = client
            .endpoint(&["sentry-2024-05-01", "_doc", "a/b c"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:9200/sentry-2024-05-01/_doc/a%2Fb%20c"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = client("https://search.internal/opensearch/");
        let url = client.endpoint(&["_alias", "sentry"]).unwrap();
        assert_eq!(url.as_str(), "https://search.internal/opensearch/_alias/sentry");
    }

    #[test]
    fn test_invalid_url() {
        let result = OpenSearchClient::new(&OpenSearchConfig {
            url: "not a url".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(NodeStoreError::InvalidConfig { .. })));
    }

    #[test]
    fn test_error_for_status() {
        assert!(error_for_status(StatusCode::NOT_FOUND, "sentry", "").is_not_found());
        assert!(error_for_status(StatusCode::CONFLICT, "sentry", "").is_conflict());
        let exists = r#"{"error":{"type":"illegal_argument_exception","reason":"index template [sentry] already exists"},"status":400}"#;
        assert!(error_for_status(StatusCode::BAD_REQUEST, "sentry", exists).is_conflict());
        assert!(matches!(
            error_for_status(StatusCode::INTERNAL_SERVER_ERROR, "sentry", "boom"),
            NodeStoreError::Transport { .. }
        ));
        assert!(matches!(
            error_for_status(StatusCode::BAD_REQUEST, "sentry", "{}"),
            NodeStoreError::Transport { .. }
        ));
    }

    #[test]
    fn test_parse_responses() {
        let search: SearchResponse = serde_json::from_value(json!({
            "took": 1,
            "hits": {
                "total": { "value": 1, "relation": "eq" },
                "hits": [{ "_index": "sentry-2024-05-01", "_id": "a", "_score": 1.0 }]
            }
        }))
        .unwrap();
        assert_eq!(search.hits.hits[0].index, "sentry-2024-05-01");

        let found: GetResponse = serde_json::from_value(json!({
            "_index": "sentry-2024-05-01",
            "_id": "a",
            "found": true,
            "fields": { "data": ["eJwDAAAAAAE="] }
        }))
        .unwrap();
        assert!(found.found);
        assert_eq!(found.fields["data"][0], json!("eJwDAAAAAAE="));

        let missing: GetResponse = serde_json::from_value(json!({
            "_index": "sentry-2024-05-01",
            "_id": "a",
            "found": false
        }))
        .unwrap();
        assert!(!missing.found);

        let deleted: DeleteByQueryResponse =
            serde_json::from_value(json!({ "took": 3, "deleted": 2, "failures": [] })).unwrap();
        assert_eq!(deleted.deleted, 2);
    }
}
