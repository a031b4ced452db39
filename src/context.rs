//! Context identity: the conversational or workspace scope a tab is bound to.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Kind of scope a context represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    Room,
    DirectMessage,
    Workspace,
    Agent,
}

impl ContextKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKind::Room => "room",
            ContextKind::DirectMessage => "direct_message",
            ContextKind::Workspace => "workspace",
            ContextKind::Agent => "agent",
        }
    }

    /// Parse from string, `None` for unknown kinds
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "room" => Some(ContextKind::Room),
            "dm" | "direct_message" => Some(ContextKind::DirectMessage),
            "workspace" => Some(ContextKind::Workspace),
            "agent" => Some(ContextKind::Agent),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ContextKind::Room => "Room",
            ContextKind::DirectMessage => "Direct Message",
            ContextKind::Workspace => "Workspace",
            ContextKind::Agent => "Agent",
        }
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifier of a context, also the key for its push stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ContextId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A conversational or workspace scope.
///
/// Equality and hashing consider only `kind` and `id`; `name` is for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    kind: ContextKind,
    id: ContextId,
    name: String,
}

impl Context {
    pub fn new(kind: ContextKind, id: impl Into<ContextId>, name: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn room(id: impl Into<ContextId>, name: impl Into<String>) -> Self {
        Self::new(ContextKind::Room, id, name)
    }

    pub fn workspace(id: impl Into<ContextId>, name: impl Into<String>) -> Self {
        Self::new(ContextKind::Workspace, id, name)
    }

    pub fn agent(id: impl Into<ContextId>, name: impl Into<String>) -> Self {
        Self::new(ContextKind::Agent, id, name)
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn id(&self) -> &ContextId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Label for tab strips: the name, or `kind:id` when unnamed
    pub fn title(&self) -> String {
        if self.name.trim().is_empty() {
            format!("{}:{}", self.kind, self.id)
        } else {
            self.name.clone()
        }
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.id == other.id
    }
}

impl Eq for Context {}

impl Hash for Context {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.id.hash(state);
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
