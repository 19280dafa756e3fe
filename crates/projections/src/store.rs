//! View persistence contract and the in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{AggregateIdentifier, state};
use domain::ConcurrencyError;
use message::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::view::{View, ViewData};

/// Filter for [`ViewStore::query`].
///
/// Unset fields match any view; `state` matches partially.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewQuery {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub destroyed: Option<bool>,
    #[serde(default)]
    pub state: Option<Value>,
}

impl ViewQuery {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn destroyed(mut self, destroyed: bool) -> Self {
        self.destroyed = Some(destroyed);
        self
    }

    pub fn state(mut self, pattern: Value) -> Self {
        self.state = Some(pattern);
        self
    }

    pub fn matches(&self, view: &ViewData) -> bool {
        view.name == self.name
            && self.id.as_ref().is_none_or(|id| &view.id == id)
            && self
                .context
                .as_ref()
                .is_none_or(|context| &view.context == context)
            && self
                .destroyed
                .is_none_or(|destroyed| view.destroyed == destroyed)
            && self
                .state
                .as_ref()
                .is_none_or(|pattern| state::is_match(&view.state, pattern))
    }
}

/// An index over view state paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewIndex {
    pub paths: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl ViewIndex {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Values of the indexed paths, or `None` when any path is unset.
    fn values<'a>(&self, state: &'a Value) -> Option<Vec<&'a Value>> {
        self.paths
            .iter()
            .map(|path| state::get(state, path))
            .collect()
    }
}

/// Where a view is stored and which indices its collection carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewStoreOptions {
    /// Defaults to the view name.
    #[serde(default)]
    pub collection_name: Option<String>,
    #[serde(default)]
    pub indices: Vec<ViewIndex>,
}

impl ViewStoreOptions {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection_name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn index(mut self, index: ViewIndex) -> Self {
        self.indices.push(index);
        self
    }

    /// Name of the collection holding views named `view`.
    pub fn collection_for<'a>(&'a self, view: &'a str) -> &'a str {
        self.collection_name.as_deref().unwrap_or(view)
    }
}

/// Storage for view snapshots.
///
/// Views live in collections chosen by [`ViewStoreOptions`]. Writes are
/// conditional on the view's revision: the revision carried by the view
/// must equal the stored one (0 when absent), and each successful write
/// increments it.
#[async_trait]
pub trait ViewStore: Send + Sync {
    /// Persists the view, recording `causation` as handled.
    ///
    /// Saving an already-recorded causation returns the stored view
    /// unchanged.
    async fn save(
        &self,
        view: &View,
        causation: &Message,
        options: &ViewStoreOptions,
    ) -> Result<View>;

    /// Returns the stored view, or `None` if it was never saved.
    async fn load(
        &self,
        identifier: &AggregateIdentifier,
        options: &ViewStoreOptions,
    ) -> Result<Option<View>>;

    /// Returns every view in the collection matching `query`.
    async fn query(&self, query: &ViewQuery, options: &ViewStoreOptions) -> Result<Vec<View>>;
}

/// A recorded call to [`ViewStore::save`].
#[derive(Debug, Clone, PartialEq)]
pub struct SaveAttempt {
    pub view: ViewData,
    pub causation: Message,
    pub options: ViewStoreOptions,
}

#[derive(Debug, Clone, Default)]
struct Collection {
    views: HashMap<String, ViewData>,
    indices: Vec<ViewIndex>,
}

impl Collection {
    fn ensure_indices(&mut self, indices: &[ViewIndex]) {
        for index in indices {
            if !self.indices.contains(index) {
                self.indices.push(index.clone());
            }
        }
    }

    /// First unique index whose values `data` shares with another view.
    fn duplicate_index(&self, key: &str, data: &ViewData) -> Option<&ViewIndex> {
        self.indices.iter().filter(|index| index.unique).find(|index| {
            let Some(values) = index.values(&data.state) else {
                return false;
            };
            self.views
                .iter()
                .filter(|(other, _)| other.as_str() != key)
                .any(|(_, other)| index.values(&other.state).as_ref() == Some(&values))
        })
    }
}

/// In-memory view store for testing.
#[derive(Clone, Default)]
pub struct InMemoryViewStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
    save_attempts: Arc<RwLock<Vec<SaveAttempt>>>,
}

impl InMemoryViewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every `save` call received, including rejected ones.
    pub async fn save_attempts(&self) -> Vec<SaveAttempt> {
        self.save_attempts.read().await.clone()
    }

    /// Number of views across all collections.
    pub async fn view_count(&self) -> usize {
        self.collections
            .read()
            .await
            .values()
            .map(|collection| collection.views.len())
            .sum()
    }

    /// Names of the collections created so far, sorted.
    pub async fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Indices declared on `collection`.
    pub async fn indices(&self, collection: &str) -> Vec<ViewIndex> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|collection| collection.indices.clone())
            .unwrap_or_default()
    }

    pub async fn clear(&self) {
        self.collections.write().await.clear();
        self.save_attempts.write().await.clear();
    }
}

#[async_trait]
impl ViewStore for InMemoryViewStore {
    async fn save(
        &self,
        view: &View,
        causation: &Message,
        options: &ViewStoreOptions,
    ) -> Result<View> {
        self.save_attempts.write().await.push(SaveAttempt {
            view: view.to_data(),
            causation: causation.clone(),
            options: options.clone(),
        });

        let name = options.collection_for(view.name()).to_string();
        let key = View::identifier(view.view_identifier());
        let mut collections = self.collections.write().await;
        let collection = collections.entry(name.clone()).or_default();
        collection.ensure_indices(&options.indices);

        let stored = collection.views.get(&key);
        if let Some(data) = stored
            && data.causation_list.iter().any(|id| id == causation.id())
        {
            tracing::debug!(%key, causation_id = %causation.id(), "causation already recorded");
            return View::from_data(data.clone());
        }

        let actual = stored.map_or(0, |data| data.revision);
        if view.revision() != actual {
            return Err(ConcurrencyError::ViewRevision {
                view: view.view_identifier().clone(),
                expected: view.revision(),
                actual,
            }
            .into());
        }

        let mut data = view.to_data();
        data.causation_list.push(causation.id().to_string());
        data.revision += 1;

        if let Some(index) = collection.duplicate_index(&key, &data) {
            return Err(ConcurrencyError::ViewDuplicateKey {
                view: view.view_identifier().clone(),
                collection: name,
                index: index.paths.join(", "),
            }
            .into());
        }

        collection.views.insert(key, data.clone());
        View::from_data(data)
    }

    async fn load(
        &self,
        identifier: &AggregateIdentifier,
        options: &ViewStoreOptions,
    ) -> Result<Option<View>> {
        let collections = self.collections.read().await;
        collections
            .get(options.collection_for(&identifier.name))
            .and_then(|collection| collection.views.get(&View::identifier(identifier)))
            .cloned()
            .map(View::from_data)
            .transpose()
    }

    async fn query(&self, query: &ViewQuery, options: &ViewStoreOptions) -> Result<Vec<View>> {
        let collections = self.collections.read().await;
        let Some(collection) = collections.get(options.collection_for(&query.name)) else {
            return Ok(Vec::new());
        };

        let mut matching: Vec<&ViewData> = collection
            .views
            .values()
            .filter(|data| query.matches(data))
            .collect();
        matching.sort_by(|a, b| (&a.context, &a.id).cmp(&(&b.context, &b.id)));

        matching
            .into_iter()
            .cloned()
            .map(View::from_data)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ViewError;

    fn defaults() -> ViewStoreOptions {
        ViewStoreOptions::default()
    }

    fn identifier(id: &str) -> AggregateIdentifier {
        AggregateIdentifier::new(id, "greeting", "default")
    }

    fn event(name: &str) -> Message {
        Message::event(name, AggregateIdentifier::new("A", "greeting", "default"))
            .build()
            .unwrap()
    }

    async fn stored_view(store: &InMemoryViewStore, id: &str, value: Value) -> View {
        let created = event("created");
        let mut view = View::new(identifier(id)).unwrap();
        view.set_state(&created, "greeting", value).unwrap();
        store.save(&view, &created, &defaults()).await.unwrap()
    }

    #[tokio::test]
    async fn test_save_increments_revision_and_records_causation() {
        let store = InMemoryViewStore::new();
        let created = event("created");
        let view = View::new(identifier("A")).unwrap();

        let saved = store.save(&view, &created, &defaults()).await.unwrap();

        assert_eq!(saved.revision(), 1);
        assert!(saved.has_handled(created.id()));
        assert_eq!(
            store.load(&identifier("A"), &defaults()).await.unwrap(),
            Some(saved)
        );
    }

    #[tokio::test]
    async fn test_stale_revision_is_rejected() {
        let store = InMemoryViewStore::new();
        let view = View::new(identifier("A")).unwrap();
        store.save(&view, &event("created"), &defaults()).await.unwrap();

        let err = store.save(&view, &event("updated"), &defaults()).await.unwrap_err();

        assert!(matches!(
            err,
            ViewError::Concurrency(ConcurrencyError::ViewRevision {
                expected: 0,
                actual: 1,
                ..
            })
        ));
        assert_eq!(store.save_attempts().await.len(), 2);
    }

    #[tokio::test]
    async fn test_recorded_causation_returns_stored_view() {
        let store = InMemoryViewStore::new();
        let created = event("created");
        let saved = store
            .save(&View::new(identifier("A")).unwrap(), &created, &defaults())
            .await
            .unwrap();

        let again = store.save(&saved, &created, &defaults()).await.unwrap();

        assert_eq!(again, saved);
        assert_eq!(store.view_count().await, 1);
    }

    #[tokio::test]
    async fn test_query_filters_by_fields_and_state() {
        let store = InMemoryViewStore::new();
        stored_view(&store, "A", json!({"hello": "world"})).await;
        stored_view(&store, "B", json!({"hello": "there"})).await;

        let all = store.query(&ViewQuery::new("greeting"), &defaults()).await.unwrap();
        assert_eq!(
            all.iter().map(View::id).collect::<Vec<_>>(),
            vec!["A", "B"]
        );

        let by_state = store
            .query(&ViewQuery::new("greeting").state(json!({"greeting": {"hello": "there"}})), &defaults())
            .await
            .unwrap();
        assert_eq!(by_state.len(), 1);
        assert_eq!(by_state[0].id(), "B");

        let by_id = store
            .query(&ViewQuery::new("greeting").id("A").context("default").destroyed(false), &defaults())
            .await
            .unwrap();
        assert_eq!(by_id.len(), 1);

        assert!(store
            .query(&ViewQuery::new("greeting").context("billing"), &defaults())
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .query(&ViewQuery::new("farewell"), &defaults())
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_query_deserializes_with_optional_fields() {
        let query: ViewQuery = serde_json::from_value(json!({"name": "greeting", "destroyed": false}))
            .unwrap();
        assert_eq!(query, ViewQuery::new("greeting").destroyed(false));
    }

    #[tokio::test]
    async fn test_collections_are_kept_apart() {
        let store = InMemoryViewStore::new();
        let archive = ViewStoreOptions::collection("greetingArchive");
        let created = event("created");

        let mut live = View::new(identifier("A")).unwrap();
        live.set_state(&created, "greeting", json!("live")).unwrap();
        store.save(&live, &created, &defaults()).await.unwrap();

        let mut archived = View::new(identifier("A")).unwrap();
        archived.set_state(&created, "greeting", json!("archived")).unwrap();
        store.save(&archived, &created, &archive).await.unwrap();

        assert_eq!(store.collection_names().await, vec!["greeting", "greetingArchive"]);
        assert_eq!(store.view_count().await, 2);

        let loaded = store.load(&identifier("A"), &defaults()).await.unwrap().unwrap();
        assert_eq!(loaded.state(), &json!({"greeting": "live"}));
        let loaded = store.load(&identifier("A"), &archive).await.unwrap().unwrap();
        assert_eq!(loaded.state(), &json!({"greeting": "archived"}));

        let found = store
            .query(&ViewQuery::new("greeting"), &archive)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].state(), &json!({"greeting": "archived"}));

        assert!(store
            .load(&identifier("A"), &ViewStoreOptions::collection("elsewhere"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unique_index_rejects_duplicate_values() {
        let store = InMemoryViewStore::new();
        let options =
            ViewStoreOptions::default().index(ViewIndex::new(["greeting.hello"]).unique());

        let created = event("created");
        let mut first = View::new(identifier("A")).unwrap();
        first.set_state(&created, "greeting", json!({"hello": "world"})).unwrap();
        store.save(&first, &created, &options).await.unwrap();

        let mut second = View::new(identifier("B")).unwrap();
        second.set_state(&created, "greeting", json!({"hello": "world"})).unwrap();
        let err = store.save(&second, &created, &options).await.unwrap_err();

        assert!(matches!(
            err,
            ViewError::Concurrency(ConcurrencyError::ViewDuplicateKey { ref index, .. })
                if index == "greeting.hello"
        ));
        assert_eq!(store.indices("greeting").await.len(), 1);
        assert_eq!(store.view_count().await, 1);

        let mut third = View::new(identifier("C")).unwrap();
        third.set_state(&created, "greeting", json!({"hello": "there"})).unwrap();
        store.save(&third, &created, &options).await.unwrap();
    }
}
