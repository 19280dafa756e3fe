//! View entity: a read model with last-writer-wins field updates.

use common::{AggregateIdentifier, is_camel_case, state};
use domain::{DomainError, Lifecycle};
use message::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ViewError};
use crate::meta::MetaRecord;

/// Serializable snapshot of a view, as kept by view stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewData {
    pub id: String,
    pub name: String,
    pub context: String,
    #[serde(default)]
    pub causation_list: Vec<String>,
    #[serde(default)]
    pub destroyed: bool,
    #[serde(default = "empty_object")]
    pub meta_state: Value,
    #[serde(default)]
    pub revision: u64,
    #[serde(default = "empty_object")]
    pub state: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// A read model built from domain events.
///
/// Every write records the causing event's timestamp in `meta_state` at
/// the same path, so an update delivered late never overwrites one that
/// happened after it.
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    identifier: AggregateIdentifier,
    causation_list: Vec<String>,
    lifecycle: Lifecycle,
    meta_state: Value,
    revision: u64,
    state: Value,
}

impl View {
    /// Creates a view that has never been stored.
    pub fn new(identifier: AggregateIdentifier) -> Result<Self> {
        if !is_camel_case(&identifier.name) {
            return Err(ViewError::InvalidName(identifier.name));
        }

        Ok(Self {
            identifier,
            causation_list: Vec::new(),
            lifecycle: Lifecycle::Active,
            meta_state: empty_object(),
            revision: 0,
            state: empty_object(),
        })
    }

    /// Restores a view from a stored snapshot.
    pub fn from_data(data: ViewData) -> Result<Self> {
        let mut view = Self::new(AggregateIdentifier::new(data.id, data.name, data.context))?;
        view.causation_list = data.causation_list;
        view.lifecycle = if data.destroyed {
            Lifecycle::Destroyed
        } else {
            Lifecycle::Active
        };
        view.meta_state = data.meta_state;
        view.revision = data.revision;
        view.state = data.state;
        Ok(view)
    }

    pub fn to_data(&self) -> ViewData {
        ViewData {
            id: self.identifier.id.clone(),
            name: self.identifier.name.clone(),
            context: self.identifier.context.clone(),
            causation_list: self.causation_list.clone(),
            destroyed: self.destroyed(),
            meta_state: self.meta_state.clone(),
            revision: self.revision,
            state: self.state.clone(),
        }
    }

    /// Returns the storage key `"{context}.{name}.{id}"`.
    pub fn identifier(identifier: &AggregateIdentifier) -> String {
        identifier.key()
    }

    pub fn view_identifier(&self) -> &AggregateIdentifier {
        &self.identifier
    }

    pub fn id(&self) -> &str {
        &self.identifier.id
    }

    pub fn name(&self) -> &str {
        &self.identifier.name
    }

    pub fn context(&self) -> &str {
        &self.identifier.context
    }

    pub fn causation_list(&self) -> &[String] {
        &self.causation_list
    }

    pub fn has_handled(&self, causation_id: &str) -> bool {
        self.causation_list.iter().any(|id| id == causation_id)
    }

    pub fn destroyed(&self) -> bool {
        self.lifecycle.is_terminal()
    }

    pub fn meta_state(&self) -> &Value {
        &self.meta_state
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn destroy(&mut self) -> Result<()> {
        tracing::debug!(view = %self.identifier, "destroying view");

        self.lifecycle = self
            .lifecycle
            .transition(Lifecycle::Destroyed)
            .ok_or_else(DomainError::view_destroyed)?;
        Ok(())
    }

    /// Sets `path` to `value` unless a later write to it was already seen.
    pub fn set_state(&mut self, causation: &Message, path: &str, value: Value) -> Result<()> {
        self.ensure_active()?;

        let timestamp = causation.timestamp();
        let newer = state::get(&self.meta_state, path)
            .and_then(MetaRecord::from_value)
            .is_some_and(|record| record.is_newer_than(timestamp));
        if newer {
            tracing::debug!(view = %self.identifier, path, "ignoring stale state update");
            return Ok(());
        }

        let record = serde_json::to_value(MetaRecord::written(timestamp, value.clone()))?;
        state::set(&mut self.state, path, value);
        state::set(&mut self.meta_state, path, record);
        Ok(())
    }

    /// Adds `value` to the array at `path`, at most once.
    pub fn add_field(&mut self, causation: &Message, path: &str, value: Value) -> Result<()> {
        self.ensure_active()?;

        let timestamp = causation.timestamp();
        let mut meta = MetaRecord::list_from_value(state::get(&self.meta_state, path));
        let mut field = self.array_at(path)?;

        if meta
            .iter()
            .any(|record| record.value == value && record.is_newer_than(timestamp))
        {
            tracing::debug!(view = %self.identifier, path, "ignoring stale field addition");
            return Ok(());
        }

        meta.retain(|record| record.value != value);
        meta.push(MetaRecord::written(timestamp, value.clone()));
        if !field.contains(&value) {
            field.push(value);
        }

        self.write_array(path, field, meta)
    }

    /// Removes every element of the array at `path` equal to `value`.
    ///
    /// Fails if no element is equal to `value`.
    pub fn remove_field_where_equal(
        &mut self,
        causation: &Message,
        path: &str,
        value: &Value,
    ) -> Result<()> {
        self.remove_where(causation, path, "No existing value can be found", |item| {
            item == value
        })
    }

    /// Removes every element of the array at `path` that `pattern` partially matches.
    ///
    /// Fails if no element matches.
    pub fn remove_field_where_match(
        &mut self,
        causation: &Message,
        path: &str,
        pattern: &Value,
    ) -> Result<()> {
        self.remove_where(causation, path, "No matching value can be found", |item| {
            state::is_match(item, pattern)
        })
    }

    fn remove_where<F>(
        &mut self,
        causation: &Message,
        path: &str,
        not_found: &str,
        matches: F,
    ) -> Result<()>
    where
        F: Fn(&Value) -> bool,
    {
        self.ensure_active()?;

        let timestamp = causation.timestamp();
        let mut meta = MetaRecord::list_from_value(state::get(&self.meta_state, path));
        let mut field = self.array_at(path)?;

        let Some(existing) = field.iter().find(|item| matches(item)).cloned() else {
            return Err(ViewError::FieldNotFound {
                path: path.to_string(),
                message: not_found.to_string(),
            });
        };

        if meta
            .iter()
            .any(|record| matches(&record.value) && record.is_newer_than(timestamp))
        {
            tracing::debug!(view = %self.identifier, path, "ignoring stale field removal");
            return Ok(());
        }

        meta.retain(|record| !matches(&record.value));
        field.retain(|item| !matches(item));
        meta.push(MetaRecord::removed(timestamp, existing));

        self.write_array(path, field, meta)
    }

    fn array_at(&self, path: &str) -> Result<Vec<Value>> {
        match state::get(&self.state, path) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(_) => Err(ViewError::NotAnArray(path.to_string())),
        }
    }

    fn write_array(&mut self, path: &str, field: Vec<Value>, meta: Vec<MetaRecord>) -> Result<()> {
        let meta = serde_json::to_value(meta)?;
        state::set(&mut self.state, path, Value::Array(field));
        state::set(&mut self.meta_state, path, meta);
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        if self.destroyed() {
            return Err(DomainError::view_destroyed().into());
        }
        Ok(())
    }
}
