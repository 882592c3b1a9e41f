//! Turning scanned declarations into graph nodes and edges.
//!
//! The builder performs no cross-document checks. It replaces the items of
//! each changed document, records defects that can be decided from a single
//! item, and allocates identifiers. Resolving link targets is left to the
//! validator, so rebuilding one document never requires the rest of the
//! corpus to be re-scanned.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, instrument, trace, warn};

use crate::domain::{
    graph::{DocumentEntry, Graph},
    identifier::{Allocator, ItemId},
    item::{DocumentId, Item, Link, RawItem, fingerprint},
    schema::Schema,
    validate::{Defect, DefectKind},
};

/// A batch of re-scanned documents.
///
/// Each document maps to its complete new list of declarations. An empty list
/// removes the document. Inserting a document twice keeps the later version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    documents: BTreeMap<DocumentId, Vec<RawItem>>,
}

impl ChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the new declarations of a document, replacing any earlier
    /// version in this change set.
    pub fn insert(&mut self, document: DocumentId, items: Vec<RawItem>) -> Option<Vec<RawItem>> {
        self.documents.insert(document, items)
    }

    /// Records that a document no longer exists.
    pub fn remove(&mut self, document: DocumentId) {
        self.documents.insert(document, Vec::new());
    }

    /// Merges a newer change set into this one. Documents present in both
    /// take the newer version.
    pub fn merge(&mut self, newer: Self) {
        self.documents.extend(newer.documents);
    }

    /// Whether the change set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// The number of documents in the change set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Iterates over the documents, in order.
    pub fn iter(&self) -> impl Iterator<Item = (&DocumentId, &[RawItem])> {
        self.documents
            .iter()
            .map(|(document, items)| (document, items.as_slice()))
    }
}

impl FromIterator<(DocumentId, Vec<RawItem>)> for ChangeSet {
    fn from_iter<T: IntoIterator<Item = (DocumentId, Vec<RawItem>)>>(iter: T) -> Self {
        let mut changes = Self::new();
        for (document, items) in iter {
            changes.insert(document, items);
        }
        changes
    }
}

/// What a build changed.
///
/// Incremental validation uses this to limit its work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Documents whose contribution was replaced or removed, including
    /// documents whose anonymous items were renumbered.
    pub changed: BTreeSet<DocumentId>,
    /// Documents submitted with unchanged content.
    pub unchanged: BTreeSet<DocumentId>,
    /// Identifiers claimed by items of changed documents after the build.
    pub added: BTreeSet<ItemId>,
    /// Identifiers claimed by items of changed documents before the build.
    pub removed: BTreeSet<ItemId>,
    /// Link options of every edge that was added, removed, or whose target
    /// was added or removed.
    pub options: BTreeSet<String>,
    /// Identifiers allocated to the items of changed documents.
    pub allocated: Vec<ItemId>,
}

impl BuildReport {
    /// Whether the build changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    /// Identifiers whose set of claimants may have changed.
    pub fn touched_ids(&self) -> impl Iterator<Item = &ItemId> {
        self.added.union(&self.removed)
    }

    fn note_removed(&mut self, items: &[Item]) {
        for item in items {
            self.removed.insert(item.id.clone());
            self.options
                .extend(item.links.iter().map(|link| link.option.clone()));
        }
    }
}

/// Builds a new graph from `previous` and a set of changed documents.
///
/// `previous` is left untouched. Documents are processed in ascending
/// identifier order, so the result does not depend on the order in which the
/// documents were scanned.
///
/// Items that declare no identifier are numbered afresh over the whole corpus
/// whenever any document changes, in document and position order, skipping
/// every declared identifier. The resulting graph is therefore the same as a
/// build from scratch of the same documents. Documents whose anonymous items
/// end up with different identifiers are rebuilt and reported as changed.
#[must_use]
#[instrument(level = "debug", skip_all, fields(documents = changes.len()))]
pub fn build(schema: &Schema, previous: &Graph, changes: &ChangeSet) -> (Graph, BuildReport) {
    let mut graph = previous.clone();
    let mut report = BuildReport::default();

    let mut replaced = BTreeMap::new();
    for (document, records) in changes.iter() {
        let new_fingerprint = fingerprint(records);
        let unchanged = match graph.fingerprint(document) {
            Some(old) => old == new_fingerprint,
            None => records.is_empty(),
        };
        if unchanged {
            trace!(%document, "unchanged, skipping");
            report.unchanged.insert(document.clone());
            continue;
        }

        if let Some(old) = graph.remove_document(document) {
            report.note_removed(&old.items);
        }
        report.changed.insert(document.clone());
        if records.is_empty() {
            debug!(%document, "removed");
        } else {
            replaced.insert(document.clone(), (records.to_vec(), new_fingerprint));
        }
    }

    if report.is_empty() {
        return (graph, report);
    }

    let mut numbering = number(
        schema,
        graph
            .entries()
            .map(|(document, entry)| (document, entry.records.as_slice()))
            .chain(
                replaced
                    .iter()
                    .map(|(document, (records, _))| (document, records.as_slice())),
            ),
    );

    let renumbered: Vec<DocumentId> = graph
        .entries()
        .filter(|(document, entry)| {
            numbering.get(*document).is_some_and(|assigned| {
                !entry
                    .items
                    .iter()
                    .map(|item| &item.id)
                    .eq(assigned.iter().map(Assigned::id))
            })
        })
        .map(|(document, _)| document.clone())
        .collect();
    for document in renumbered {
        if let Some(old) = graph.remove_document(&document) {
            debug!(%document, "renumbered");
            report.note_removed(&old.items);
            report.unchanged.remove(&document);
            report.changed.insert(document.clone());
            replaced.insert(document, (old.records, old.fingerprint));
        }
    }

    for (document, (records, fingerprint)) in replaced {
        let assigned = numbering.remove(&document).unwrap_or_default();

        let mut items = Vec::with_capacity(records.len());
        let mut pending = Vec::new();
        for (position, (record, assigned)) in records.iter().zip(assigned).enumerate() {
            let item = build_item(schema, &document, position, record, &assigned);
            if item.allocated {
                report.allocated.push(item.id.clone());
            }
            pending.extend(local_defects(schema, &item));
            if matches!(assigned, Assigned::Exhausted(_)) {
                pending.push(Defect::new(
                    DefectKind::IdentifierExhausted,
                    &item,
                    "no identifier left to allocate".to_string(),
                ));
            }
            report.added.insert(item.id.clone());
            report
                .options
                .extend(item.links.iter().map(|link| link.option.clone()));
            items.push(item);
        }

        debug!(%document, items = items.len(), defects = pending.len(), "rebuilt");
        graph.insert_document(
            document,
            DocumentEntry {
                fingerprint,
                records,
                items,
                pending,
            },
        );
    }

    // Edges elsewhere in the graph whose target appeared or disappeared.
    let retargeted: Vec<String> = report
        .touched_ids()
        .flat_map(|id| graph.incoming(id, None).map(|link| link.option.clone()))
        .collect();
    report.options.extend(retargeted);

    (graph, report)
}

/// The identifier a record is built with.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Assigned {
    Declared(ItemId),
    Allocated(ItemId),
    /// Nothing was left to allocate; the item gets a placeholder built from
    /// its document and position.
    Exhausted(ItemId),
}

impl Assigned {
    const fn id(&self) -> &ItemId {
        match self {
            Self::Declared(id) | Self::Allocated(id) | Self::Exhausted(id) => id,
        }
    }
}

/// Assigns an identifier to every record of every document.
fn number<'r>(
    schema: &Schema,
    documents: impl IntoIterator<Item = (&'r DocumentId, &'r [RawItem])>,
) -> BTreeMap<DocumentId, Vec<Assigned>> {
    let documents: BTreeMap<&DocumentId, &[RawItem]> = documents.into_iter().collect();
    let declared: Vec<ItemId> = documents
        .values()
        .flat_map(|records| records.iter().filter_map(RawItem::explicit_id))
        .collect();
    let mut allocator = Allocator::seeded(schema.id_format(), &declared);

    let mut numbering = BTreeMap::new();
    for (document, records) in documents {
        let mut assigned = Vec::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            assigned.push(match record.explicit_id() {
                Some(id) => Assigned::Declared(id),
                None => match allocator.next_id() {
                    Some(id) => {
                        trace!(%document, position, %id, "allocated identifier");
                        Assigned::Allocated(id)
                    }
                    None => {
                        warn!(%document, position, "no identifier left to allocate");
                        Assigned::Exhausted(ItemId::new(format!("{document}#{position}")))
                    }
                },
            });
        }
        numbering.insert(document.clone(), assigned);
    }
    numbering
}

fn build_item(
    schema: &Schema,
    document: &DocumentId,
    position: usize,
    record: &RawItem,
    assigned: &Assigned,
) -> Item {
    let id = assigned.id().clone();
    let allocated = matches!(assigned, Assigned::Allocated(_));

    let status = record
        .status
        .as_deref()
        .map(str::trim)
        .filter(|status| !status.is_empty())
        .map_or_else(
            || schema.default_status().name.to_string(),
            ToString::to_string,
        );

    let links = record
        .links
        .iter()
        .flat_map(|(option, targets)| {
            targets.iter().map(|target| Link {
                option: option.clone(),
                from: id.clone(),
                to: ItemId::from(target.trim()),
            })
        })
        .collect();

    Item {
        id,
        document: document.clone(),
        position,
        kind: record.kind.trim().to_string(),
        level: record.level.as_deref().map(|level| level.trim().to_string()),
        status,
        attributes: record.attributes.clone(),
        links,
        allocated,
    }
}

/// Defects that can be decided from one item and the schema alone.
fn local_defects(schema: &Schema, item: &Item) -> Vec<Defect> {
    let mut defects = Vec::new();
    let mut report = |kind: DefectKind, detail: String| {
        defects.push(Defect::new(kind, item, detail));
    };

    if schema.object_type(&item.kind).is_none() {
        report(
            DefectKind::UnknownType,
            format!("type '{}' is not declared", item.kind),
        );
    }
    if let Some(level) = item.level() {
        if schema.level(level).is_none() {
            report(
                DefectKind::UnknownLevel,
                format!("level '{level}' is not declared"),
            );
        }
    }
    if schema.status(&item.status).is_none() {
        report(
            DefectKind::UnknownStatus,
            format!("status '{}' is not declared", item.status),
        );
    }
    for name in item.attributes.keys() {
        if !schema.is_attribute_allowed(name) {
            report(
                DefectKind::UnknownAttribute,
                format!("attribute '{name}' is not a declared option"),
            );
        }
    }
    for link in &item.links {
        if schema.link_type(&link.option).is_none() {
            report(
                DefectKind::UnknownLinkOption,
                format!("link option '{}' (to {}) is not declared", link.option, link.to),
            );
        }
    }

    defects
}
