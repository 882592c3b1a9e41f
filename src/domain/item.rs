//! Scanned declarations and the items built from them.

use std::{collections::BTreeMap, fmt};

use borsh::BorshSerialize;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::identifier::ItemId;

/// The identifier of a source document.
///
/// Every item belongs to exactly one document, and documents are the unit of
/// replacement: re-scanning a document replaces everything it contributed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Creates a document identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// An item declaration as produced by a document scanner.
///
/// Values are kept exactly as written; nothing is checked against the schema
/// until the item is built into a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize)]
pub struct RawItem {
    /// Explicit identifier. Items without one are allocated an identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The object type.
    #[serde(rename = "type")]
    pub kind: String,

    /// The abstraction level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// The lifecycle status. Items without one get the schema default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Free-form attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,

    /// Outgoing links: option name → target identifiers, in declaration
    /// order.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, Vec<String>>,
}

impl RawItem {
    /// Creates a declaration of the given type with no other fields set.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Sets the explicit identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the level.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Appends a link target under the given option.
    #[must_use]
    pub fn with_link(mut self, option: impl Into<String>, target: impl Into<String>) -> Self {
        self.links
            .entry(option.into())
            .or_default()
            .push(target.into());
        self
    }

    /// The explicit identifier, ignoring blank values.
    pub(crate) fn explicit_id(&self) -> Option<ItemId> {
        self.id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ItemId::from)
    }
}

/// Calculates the fingerprint of a document's declarations.
///
/// The fingerprint is a SHA256 hash of the Borsh-serialized records. Two scans
/// of a document that yield the same records have the same fingerprint.
///
/// # Panics
///
/// Panics if borsh serialization fails (which should never happen for this
/// data structure).
#[must_use]
pub fn fingerprint(items: &[RawItem]) -> String {
    #[derive(BorshSerialize)]
    struct FingerprintData<'a> {
        items: &'a [RawItem],
    }

    // encode using [borsh](https://borsh.io/)
    let encoded = borsh::to_vec(&FingerprintData { items }).expect("this should never fail");

    let hash = Sha256::digest(encoded);
    format!("{hash:x}")
}

/// A directed, typed edge between two items.
///
/// Edges are stored once, on the declaring item. The reverse reading is
/// derived from the graph's reverse index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Link {
    /// The link option.
    pub option: String,
    /// The declaring item.
    pub from: ItemId,
    /// The target item. It may not exist.
    pub to: ItemId,
}

/// An item in the traceability graph.
///
/// Type, level and status are kept literally, even when the schema does not
/// declare them, so that tooling can still inspect malformed items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub(crate) id: ItemId,
    pub(crate) document: DocumentId,
    pub(crate) position: usize,
    #[serde(rename = "type")]
    pub(crate) kind: String,
    pub(crate) level: Option<String>,
    pub(crate) status: String,
    pub(crate) attributes: BTreeMap<String, String>,
    pub(crate) links: Vec<Link>,
    pub(crate) allocated: bool,
}

impl Item {
    /// The item's identifier.
    #[must_use]
    pub const fn id(&self) -> &ItemId {
        &self.id
    }

    /// The document that declared the item.
    #[must_use]
    pub const fn document(&self) -> &DocumentId {
        &self.document
    }

    /// The item's position within its document.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// The object type, as declared.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The level, as declared.
    #[must_use]
    pub fn level(&self) -> Option<&str> {
        self.level.as_deref()
    }

    /// The status, as declared or defaulted.
    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    /// The free-form attributes.
    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Looks up a single attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// The outgoing links, in declaration order.
    #[must_use]
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Whether the identifier was allocated rather than declared.
    #[must_use]
    pub const fn is_allocated(&self) -> bool {
        self.allocated
    }
}
