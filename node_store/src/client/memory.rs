//! In-memory document store with OpenSearch-like index, alias and template
//! semantics.
//!
//! Indices are created implicitly on first write and pick up the aliases of
//! every template whose pattern matches their name, mirroring what the
//! cluster does with composable index templates.
//!
//! Failures can be queued per remote call with
//! [`InMemoryDocumentStore::fail_next`] to exercise error handling.

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{
    DocumentStoreClient,
    IdQuery,
    IndexTemplateBody,
    StoredDocument,
    DATA_FIELD,
    TIMESTAMP_FIELD,
};
use crate::{NodeStoreError, NodeStoreResult};

/// Remote call of [`DocumentStoreClient`], used to target injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Operation {
    GetIndexTemplate,
    CreateIndexTemplate,
    IndexDocument,
    GetDocument,
    SearchById,
    DeleteByQuery,
    GetAlias,
    DeleteIndex,
}

/// Failure returned by an injected fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    NotFound,
    Conflict,
    /// Stands in for a connection failure or 5xx.
    Transport,
}

impl Fault {
    fn into_error(self, resource: &str) -> NodeStoreError {
        let resource = resource.to_string();
        match self {
            Fault::NotFound => NodeStoreError::NotFound { resource },
            Fault::Conflict => NodeStoreError::Conflict { resource },
            Fault::Transport => NodeStoreError::Transport {
                source: anyhow::anyhow!("{} returned 503 Service Unavailable", resource),
            },
        }
    }
}

#[derive(Debug, Default)]
struct Index {
    aliases: BTreeSet<String>,
    documents: BTreeMap<String, StoredDocument>,
}

#[derive(Debug, Default)]
struct State {
    templates: BTreeMap<String, IndexTemplateBody>,
    indices: BTreeMap<String, Index>,
    template_creations: usize,
    faults: BTreeMap<Operation, VecDeque<Fault>>,
}

impl State {
    fn take_fault(&mut self, operation: Operation, resource: &str) -> NodeStoreResult<()> {
        match self.faults.get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(fault) => Err(fault.into_error(resource)),
            None => Ok(()),
        }
    }

    /// Indices addressed by `name`: the index itself, or the members of the
    /// alias with that name.
    fn resolve(&self, name: &str) -> Vec<String> {
        if self.indices.contains_key(name) {
            return vec![name.to_string()];
        }
        self.indices
            .iter()
            .filter(|(_, index)| index.aliases.contains(name))
            .map(|(index_name, _)| index_name.clone())
            .collect()
    }

    fn create_index(&mut self, name: &str) -> &mut Index {
        if !self.indices.contains_key(name) {
            let aliases = self
                .templates
                .values()
                .filter(|t| t.index_patterns.iter().any(|p| glob_matches(p, name)))
                .flat_map(|t| t.template.aliases.keys().cloned())
                .collect();
            self.indices.insert(
                name.to_string(),
                Index {
                    aliases,
                    documents: BTreeMap::new(),
                },
            );
        }
        self.indices.entry(name.to_string()).or_default()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    state: Mutex<State>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create an empty index bound to `aliases`, as an operator would.
    pub fn create_index(&self, name: &str, aliases: &[&str]) {
        let mut state = self.state();
        let index = state.create_index(name);
        index.aliases.extend(aliases.iter().map(|a| a.to_string()));
    }

    pub fn index_names(&self) -> Vec<String> {
        self.state().indices.keys().cloned().collect()
    }

    pub fn aliases_of(&self, index: &str) -> Vec<String> {
        self.state()
            .indices
            .get(index)
            .map(|i| i.aliases.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn template(&self, name: &str) -> Option<IndexTemplateBody> {
        self.state().templates.get(name).cloned()
    }

    /// Number of successful template creations so far.
    pub fn template_creations(&self) -> usize {
        self.state().template_creations
    }

    pub fn document(&self, index: &str, id: &str) -> Option<StoredDocument> {
        self.state()
            .indices
            .get(index)
            .and_then(|i| i.documents.get(id).cloned())
    }

    /// Make the next call of `operation` fail with `fault`. Faults queue up
    /// per operation and are consumed in order.
    ///
    /// `get_document` reports an injected `NotFound` as absence, the way the
    /// REST client treats a 404.
    pub fn fail_next(&self, operation: Operation, fault: Fault) {
        self.state()
            .faults
            .entry(operation)
            .or_default()
            .push_back(fault);
    }
}

#[async_trait]
impl DocumentStoreClient for InMemoryDocumentStore {
    async fn get_index_template(&self, name: &str) -> NodeStoreResult<Option<Value>> {
        let mut state = self.state();
        state.take_fault(Operation::GetIndexTemplate, name)?;
        match state.templates.get(name) {
            Some(body) => Ok(Some(json!({
                "index_templates": [{ "name": name, "index_template": body }]
            }))),
            None => Ok(None),
        }
    }

    async fn create_index_template(
        &self,
        name: &str,
        body: &IndexTemplateBody,
    ) -> NodeStoreResult<()> {
        let mut state = self.state();
        state.take_fault(Operation::CreateIndexTemplate, name)?;
        if state.templates.contains_key(name) {
            return Err(NodeStoreError::Conflict {
                resource: name.to_string(),
            });
        }
        state.templates.insert(name.to_string(), body.clone());
        state.template_creations += 1;
        Ok(())
    }

    async fn index_document(
        &self,
        index: &str,
        id: &str,
        document: &StoredDocument,
        _refresh: bool,
    ) -> NodeStoreResult<()> {
        let mut state = self.state();
        state.take_fault(Operation::IndexDocument, index)?;
        state
            .create_index(index)
            .documents
            .insert(id.to_string(), document.clone());
        Ok(())
    }

    async fn get_document(
        &self,
        index: &str,
        id: &str,
        stored_fields: &[&str],
    ) -> NodeStoreResult<Option<BTreeMap<String, Vec<Value>>>> {
        let mut state = self.state();
        match state.take_fault(Operation::GetDocument, index) {
            Err(e) if e.is_not_found() => return Ok(None),
            other => other?,
        }
        let Some(document) = state.indices.get(index).and_then(|i| i.documents.get(id)) else {
            return Ok(None);
        };
        let fields = stored_fields
            .iter()
            .filter_map(|field| {
                let value = match *field {
                    DATA_FIELD => &document.data,
                    TIMESTAMP_FIELD => &document.timestamp,
                    _ => return None,
                };
                Some((field.to_string(), vec![Value::String(value.clone())]))
            })
            .collect();
        Ok(Some(fields))
    }

    async fn search_by_id(&self, alias: &str, id: &str) -> NodeStoreResult<Vec<String>> {
        let mut state = self.state();
        state.take_fault(Operation::SearchById, alias)?;
        Ok(state
            .resolve(alias)
            .into_iter()
            .filter(|index| state.indices[index].documents.contains_key(id))
            .collect())
    }

    async fn delete_by_query(&self, index: &str, query: &IdQuery) -> NodeStoreResult<u64> {
        let mut state = self.state();
        state.take_fault(Operation::DeleteByQuery, index)?;
        let targets = state.resolve(index);
        if targets.is_empty() {
            return Err(NodeStoreError::NotFound {
                resource: index.to_string(),
            });
        }
        let mut deleted = 0;
        for target in targets {
            if let Some(entry) = state.indices.get_mut(&target) {
                let before = entry.documents.len();
                entry.documents.retain(|id, _| !query.matches(id));
                deleted += (before - entry.documents.len()) as u64;
            }
        }
        Ok(deleted)
    }

    async fn get_alias(&self, alias: &str) -> NodeStoreResult<Vec<String>> {
        let mut state = self.state();
        state.take_fault(Operation::GetAlias, alias)?;
        let members: Vec<String> = state
            .indices
            .iter()
            .filter(|(_, index)| index.aliases.contains(alias))
            .map(|(name, _)| name.clone())
            .collect();
        if members.is_empty() {
            return Err(NodeStoreError::NotFound {
                resource: alias.to_string(),
            });
        }
        Ok(members)
    }

    async fn delete_index(&self, index: &str) -> NodeStoreResult<()> {
        let mut state = self.state();
        state.take_fault(Operation::DeleteIndex, index)?;
        match state.indices.remove(index) {
            Some(_) => Ok(()),
            None => Err(NodeStoreError::NotFound {
                resource: index.to_string(),
            }),
        }
    }
}

/// Match `name` against a pattern where `*` stands for any run of
/// characters.
fn glob_matches(pattern: &str, name: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return name.is_empty();
    };
    let Some(mut rest) = name.strip_prefix(first) else {
        return false;
    };
    let parts: Vec<&str> = parts.collect();
    let Some((last, middle)) = parts.split_last() else {
        // No wildcard at all.
        return rest.is_empty();
    };
    for part in middle {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}
