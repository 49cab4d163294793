// Symbol model

use crate::ast::Span;
use crate::grammar::LanguageId;
use crate::shape::ShapeTree;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of extracted symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    /// Function or method definition
    Function,
    /// Class, struct, enum, trait or interface definition
    Class,
    /// One imported target
    Import,
    /// One call site
    Call,
    /// Module- or class-level variable
    Variable,
}

impl SymbolKind {
    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Import => "import",
            SymbolKind::Call => "call",
            SymbolKind::Variable => "variable",
        }
    }

    /// Definitions (as opposed to references)
    pub fn is_definition(&self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::Class | SymbolKind::Variable)
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SymbolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "function" | "func" | "fn" | "method" | "def" => Ok(SymbolKind::Function),
            "class" | "struct" | "type" | "interface" | "trait" | "enum" => Ok(SymbolKind::Class),
            "import" | "use" => Ok(SymbolKind::Import),
            "call" => Ok(SymbolKind::Call),
            "variable" | "var" | "const" | "constant" | "field" => Ok(SymbolKind::Variable),
            other => Err(format!("unknown symbol kind '{}'", other)),
        }
    }
}

/// Stable symbol identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolId(pub String);

impl SymbolId {
    /// Derive an id from (path, kind, qualified name, ordinal)
    pub fn derive(path: &str, kind: SymbolKind, qualified_name: &str, ordinal: usize) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(path.as_bytes());
        hasher.update(&[0]);
        hasher.update(kind.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(qualified_name.as_bytes());
        hasher.update(&[0]);
        hasher.update(&(ordinal as u64).to_le_bytes());
        let hex = hasher.finalize().to_hex();
        Self(hex.as_str()[..32].to_string())
    }

    /// Borrow as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SymbolId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SymbolId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Reference to the source unit version a symbol was extracted from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitRef {
    /// File path
    pub path: String,
    /// Unit version
    pub version: u64,
}

/// Relation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    /// Calls a function or method
    Calls,
    /// Imports a module or item
    Imports,
    /// Extends / implements / embeds a type
    Extends,
}

/// Relation target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationTarget {
    /// Resolved to a symbol id
    Resolved(SymbolId),
    /// Not resolved yet; deferred cross-file resolution by name
    Unresolved {
        /// Referenced name
        name: String,
    },
}

/// Relation from one symbol to another
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    /// Relation kind
    pub kind: RelationKind,
    /// Target
    pub target: RelationTarget,
}

impl Relation {
    /// Unresolved relation by name
    pub fn unresolved(kind: RelationKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            target: RelationTarget::Unresolved { name: name.into() },
        }
    }

    /// Resolved relation
    pub fn resolved(kind: RelationKind, id: SymbolId) -> Self {
        Self {
            kind,
            target: RelationTarget::Resolved(id),
        }
    }

    /// Target id when resolved
    pub fn target_id(&self) -> Option<&SymbolId> {
        match &self.target {
            RelationTarget::Resolved(id) => Some(id),
            RelationTarget::Unresolved { .. } => None,
        }
    }

    /// Target name when unresolved
    pub fn target_name(&self) -> Option<&str> {
        match &self.target {
            RelationTarget::Resolved(_) => None,
            RelationTarget::Unresolved { name } => Some(name),
        }
    }
}

/// A named code entity extracted from a syntax tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    /// Stable id
    pub id: SymbolId,
    /// Simple name
    pub name: String,
    /// Scope-qualified name (`Outer::inner`)
    pub qualified_name: String,
    /// Kind
    pub kind: SymbolKind,
    /// Source language
    pub language: LanguageId,
    /// Owning source unit version
    pub unit: UnitRef,
    /// Span in the source
    pub span: Span,
    /// First line of the declaration
    pub signature: String,
    /// blake3 hex digest of the symbol's full text
    pub body_hash: String,
    /// Leading portion of the symbol's text
    pub snippet: String,
    /// Enclosing symbol
    pub parent: Option<SymbolId>,
    /// Outgoing relations
    pub relations: Vec<Relation>,
    /// Normalized shape for functions and classes
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub shape: Option<ShapeTree>,
    /// Last-modified time of the owning unit
    pub modified_at: DateTime<Utc>,
    /// Author of the owning unit
    pub author: Option<String>,
}

impl Symbol {
    /// Unresolved relation names of a kind
    pub fn unresolved(&self, kind: RelationKind) -> impl Iterator<Item = &str> {
        self.relations
            .iter()
            .filter(move |r| r.kind == kind)
            .filter_map(Relation::target_name)
    }

    /// Resolved relation targets of a kind
    pub fn resolved(&self, kind: RelationKind) -> impl Iterator<Item = &SymbolId> {
        self.relations
            .iter()
            .filter(move |r| r.kind == kind)
            .filter_map(Relation::target_id)
    }
}
