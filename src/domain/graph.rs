//! In-memory traceability graph
//!
//! The [`Graph`] does not interpret the schema and knows nothing about how
//! documents are scanned. It stores items grouped by the document that
//! declared them, and maintains two indexes over them:
//!
//! - identifier → every item claiming that identifier (`BTreeMap`, so that
//!   iteration is ordered and duplicates are kept side by side)
//! - target identifier → every edge pointing at it (the reverse index, which
//!   also records edges whose target does not exist)
//!
//! Each edge is stored exactly once, on its declaring item. "Incoming" views
//! are derived from the reverse index.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{
    identifier::ItemId,
    item::{DocumentId, Item, Link, RawItem},
    schema::Schema,
    validate::Defect,
};

/// The address of an item: its document and its position within it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct ItemKey {
    pub(crate) document: DocumentId,
    pub(crate) position: usize,
}

/// The address of an edge: its declaring item and its index among that
/// item's links.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct EdgeKey {
    pub(crate) item: ItemKey,
    pub(crate) link: usize,
}

/// Everything one document contributed to the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DocumentEntry {
    /// Fingerprint of the records the items were built from.
    pub(crate) fingerprint: String,
    /// The records as scanned, kept so the graph can be rebuilt against a new
    /// schema.
    pub(crate) records: Vec<RawItem>,
    pub(crate) items: Vec<Item>,
    /// Defects found while building this document's items. They depend only
    /// on the items and the schema.
    pub(crate) pending: Vec<Defect>,
}

/// A traceability graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    documents: BTreeMap<DocumentId, DocumentEntry>,
    by_id: BTreeMap<ItemId, BTreeSet<ItemKey>>,
    incoming: BTreeMap<ItemId, BTreeSet<EdgeKey>>,
}

impl Graph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of items, counting every claimant of a duplicated
    /// identifier.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.documents.values().map(|entry| entry.items.len()).sum()
    }

    /// The number of stored edges, including dangling ones.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.items().map(|item| item.links.len()).sum()
    }

    /// The documents that contributed to the graph, in order.
    pub fn documents(&self) -> impl Iterator<Item = &DocumentId> {
        self.documents.keys()
    }

    /// The items a document contributed, in declaration order.
    #[must_use]
    pub fn document_items(&self, document: &DocumentId) -> &[Item] {
        self.documents
            .get(document)
            .map_or(&[], |entry| entry.items.as_slice())
    }

    /// The records a document was built from.
    #[must_use]
    pub fn document_records(&self, document: &DocumentId) -> &[RawItem] {
        self.documents
            .get(document)
            .map_or(&[], |entry| entry.records.as_slice())
    }

    /// The fingerprint of a document's records.
    #[must_use]
    pub fn fingerprint(&self, document: &DocumentId) -> Option<&str> {
        self.documents
            .get(document)
            .map(|entry| entry.fingerprint.as_str())
    }

    /// Iterates over all items in document order.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.documents.values().flat_map(|entry| entry.items.iter())
    }

    /// Iterates over all items in identifier order.
    ///
    /// Items sharing an identifier are yielded in document order.
    pub fn items_by_id(&self) -> impl Iterator<Item = &Item> {
        self.by_id
            .values()
            .flat_map(|keys| keys.iter().filter_map(|key| self.item_at(key)))
    }

    /// The distinct identifiers in the graph, in order.
    pub fn ids(&self) -> impl Iterator<Item = &ItemId> {
        self.by_id.keys()
    }

    /// Whether any item claims the identifier.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// The first item (in document order) claiming the identifier.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Item> {
        self.claimants(id).next()
    }

    /// Every item claiming the identifier, in document order.
    pub fn claimants(&self, id: &str) -> impl Iterator<Item = &Item> {
        self.by_id
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|key| self.item_at(key))
    }

    /// Outgoing edges of every item claiming `id`, optionally restricted to
    /// one option.
    pub fn outgoing<'a>(
        &'a self,
        id: &str,
        option: Option<&str>,
    ) -> impl Iterator<Item = &'a Link> {
        self.claimants(id)
            .flat_map(|item| item.links.iter())
            .filter(move |link| option.is_none_or(|option| link.option == option))
    }

    /// Edges pointing at `id`, optionally restricted to one option.
    ///
    /// Edges are returned whether or not `id` exists.
    pub fn incoming<'a>(
        &'a self,
        id: &str,
        option: Option<&str>,
    ) -> impl Iterator<Item = &'a Link> {
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|key| self.link_at(key))
            .filter(move |link| option.is_none_or(|option| link.option == option))
    }

    /// Iterates over every stored edge, in document order.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.items().flat_map(|item| item.links.iter())
    }

    pub(crate) fn item_at(&self, key: &ItemKey) -> Option<&Item> {
        self.documents.get(&key.document)?.items.get(key.position)
    }

    pub(crate) fn link_at(&self, key: &EdgeKey) -> Option<&Link> {
        self.item_at(&key.item)?.links.get(key.link)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&DocumentId, &DocumentEntry)> {
        self.documents.iter()
    }

    pub(crate) fn entry(&self, document: &DocumentId) -> Option<&DocumentEntry> {
        self.documents.get(document)
    }

    /// Edge keys pointing at `id`.
    pub(crate) fn incoming_keys(&self, id: &str) -> impl Iterator<Item = &EdgeKey> {
        self.incoming.get(id).into_iter().flatten()
    }

    /// Edge keys declared by the items of a document.
    pub(crate) fn document_edge_keys(&self, document: &DocumentId) -> Vec<EdgeKey> {
        self.document_items(document)
            .iter()
            .flat_map(|item| {
                (0..item.links.len()).map(move |link| EdgeKey {
                    item: ItemKey {
                        document: item.document.clone(),
                        position: item.position,
                    },
                    link,
                })
            })
            .collect()
    }

    /// Removes a document and everything it contributed.
    pub(crate) fn remove_document(&mut self, document: &DocumentId) -> Option<DocumentEntry> {
        let entry = self.documents.remove(document)?;
        for item in &entry.items {
            let key = ItemKey {
                document: document.clone(),
                position: item.position,
            };
            if let Some(keys) = self.by_id.get_mut(&item.id) {
                keys.remove(&key);
                if keys.is_empty() {
                    self.by_id.remove(&item.id);
                }
            }
            for (link, edge) in item.links.iter().enumerate() {
                if let Some(keys) = self.incoming.get_mut(&edge.to) {
                    keys.remove(&EdgeKey {
                        item: key.clone(),
                        link,
                    });
                    if keys.is_empty() {
                        self.incoming.remove(&edge.to);
                    }
                }
            }
        }
        Some(entry)
    }

    /// Inserts a document's contribution.
    ///
    /// # Panics
    ///
    /// Panics if the document is already present; callers remove it first.
    pub(crate) fn insert_document(&mut self, document: DocumentId, entry: DocumentEntry) {
        assert!(
            !self.documents.contains_key(&document),
            "document {document} inserted twice"
        );
        for item in &entry.items {
            let key = ItemKey {
                document: document.clone(),
                position: item.position,
            };
            self.by_id
                .entry(item.id.clone())
                .or_default()
                .insert(key.clone());
            for (link, edge) in item.links.iter().enumerate() {
                self.incoming
                    .entry(edge.to.clone())
                    .or_default()
                    .insert(EdgeKey {
                        item: key.clone(),
                        link,
                    });
            }
        }
        self.documents.insert(document, entry);
    }

    /// Builds a graph from scratch out of the given documents.
    #[must_use]
    pub fn from_documents(
        schema: &Schema,
        documents: impl IntoIterator<Item = (DocumentId, Vec<RawItem>)>,
    ) -> Self {
        let changes = documents.into_iter().collect();
        crate::domain::builder::build(schema, &Self::default(), &changes).0
    }
}
