use serde::{Deserialize, Serialize};

/// Identity triple of an entity: the instance id, the entity name and the
/// bounded context it lives in.
///
/// Aggregates, sagas and views share this shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateIdentifier {
    pub id: String,
    pub name: String,
    pub context: String,
}

impl AggregateIdentifier {
    pub fn new(id: impl Into<String>, name: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            context: context.into(),
        }
    }

    /// Returns the storage key `"{context}.{name}.{id}"`.
    pub fn key(&self) -> String {
        format!("{}.{}.{}", self.context, self.name, self.id)
    }

    /// Returns the name/context pair without the instance id.
    pub fn handler(&self) -> HandlerIdentifier {
        HandlerIdentifier::new(self.name.clone(), self.context.clone())
    }
}

impl std::fmt::Display for AggregateIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.context, self.name, self.id)
    }
}

/// Name/context pair identifying an entity kind (not an instance).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerIdentifier {
    pub name: String,
    pub context: String,
}

impl HandlerIdentifier {
    pub fn new(name: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context: context.into(),
        }
    }

    /// Binds an instance id to this kind.
    pub fn with_id(&self, id: impl Into<String>) -> AggregateIdentifier {
        AggregateIdentifier::new(id, self.name.clone(), self.context.clone())
    }
}

impl std::fmt::Display for HandlerIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.context, self.name)
    }
}

/// Aggregate kind a saga or view listens to, possibly across several contexts.
///
/// A registration against a target with N contexts expands into N handler
/// entries and N bus subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateTarget {
    pub name: String,
    pub contexts: Vec<String>,
}

impl AggregateTarget {
    pub fn new(name: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contexts: vec![context.into()],
        }
    }

    pub fn with_contexts<I, S>(name: impl Into<String>, contexts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            contexts: contexts.into_iter().map(Into::into).collect(),
        }
    }

    /// Expands the target into one identifier per context.
    pub fn handlers(&self) -> impl Iterator<Item = HandlerIdentifier> + '_ {
        self.contexts
            .iter()
            .map(|context| HandlerIdentifier::new(self.name.clone(), context.clone()))
    }
}

impl From<HandlerIdentifier> for AggregateTarget {
    fn from(identifier: HandlerIdentifier) -> Self {
        Self {
            name: identifier.name,
            contexts: vec![identifier.context],
        }
    }
}
