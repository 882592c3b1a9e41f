//! Structural checks over a built graph.
//!
//! Findings are reported as [`Defect`]s. Defects never abort a build: the
//! graph stays queryable with its defects listed alongside it.
//!
//! Checks, in reporting order:
//!
//! 1. unknown type, level, status or attribute, and identifiers that could
//!    not be allocated (decided by the builder)
//! 2. duplicate identifiers
//! 3. undeclared link options (decided by the builder)
//! 4. dangling link targets
//! 5. cycles among the edges of required-acyclic options

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
};

use nonempty::NonEmpty;
use petgraph::{algo::tarjan_scc, graphmap::DiGraphMap};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::domain::{
    builder::BuildReport,
    graph::{EdgeKey, Graph},
    identifier::ItemId,
    item::{DocumentId, Item},
    schema::Schema,
};

/// What kind of structural problem a [`Defect`] describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum DefectKind {
    /// The item's type is not declared in the schema.
    UnknownType,
    /// The item's level is not declared in the schema.
    UnknownLevel,
    /// The item's status is not declared in the schema.
    UnknownStatus,
    /// The item carries an attribute that is not a declared extra option.
    UnknownAttribute,
    /// The item declares no identifier and none was left to allocate. It is
    /// kept under a placeholder identifier.
    IdentifierExhausted,
    /// More than one item claims the identifier.
    DuplicateId,
    /// The item declares a link under an undeclared option.
    UnknownLinkOption,
    /// The item links to an identifier no item claims.
    DanglingTarget {
        /// The link option.
        option: String,
        /// The missing target.
        target: ItemId,
    },
    /// Edges of a required-acyclic option form a cycle.
    CycleDetected {
        /// The link option.
        option: String,
        /// The items on the cycle, in edge order, starting at the lowest
        /// identifier.
        cycle: NonEmpty<ItemId>,
    },
}

impl DefectKind {
    /// The name of the kind, without any payload.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::UnknownType => "UnknownType",
            Self::UnknownLevel => "UnknownLevel",
            Self::UnknownStatus => "UnknownStatus",
            Self::UnknownAttribute => "UnknownAttribute",
            Self::IdentifierExhausted => "IdentifierExhausted",
            Self::DuplicateId => "DuplicateId",
            Self::UnknownLinkOption => "UnknownLinkOption",
            Self::DanglingTarget { .. } => "DanglingTarget",
            Self::CycleDetected { .. } => "CycleDetected",
        }
    }

    /// The position of the check that produces this kind.
    const fn check(&self) -> u8 {
        match self {
            Self::UnknownType
            | Self::UnknownLevel
            | Self::UnknownStatus
            | Self::UnknownAttribute
            | Self::IdentifierExhausted => 1,
            Self::DuplicateId => 2,
            Self::UnknownLinkOption => 3,
            Self::DanglingTarget { .. } => 4,
            Self::CycleDetected { .. } => 5,
        }
    }

    /// The order of kinds reported by the same check against the same item.
    const fn rank(&self) -> u8 {
        match self {
            Self::UnknownType => 0,
            Self::UnknownLevel => 1,
            Self::UnknownStatus => 2,
            Self::UnknownAttribute => 3,
            Self::IdentifierExhausted => 4,
            Self::DuplicateId
            | Self::UnknownLinkOption
            | Self::DanglingTarget { .. }
            | Self::CycleDetected { .. } => 0,
        }
    }
}

impl fmt::Display for DefectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A recoverable structural finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Defect {
    /// What is wrong.
    #[serde(flatten)]
    pub kind: DefectKind,
    /// The item the defect is reported against.
    pub item: ItemId,
    /// The document that declared that item.
    pub document: DocumentId,
    /// A human-readable description.
    pub detail: String,
}

impl Defect {
    pub(crate) fn new(kind: DefectKind, item: &Item, detail: String) -> Self {
        Self {
            kind,
            item: item.id.clone(),
            document: item.document.clone(),
            detail,
        }
    }
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.document, self.kind, self.item, self.detail
        )
    }
}

/// Groups defects by the document that produced them.
#[must_use]
pub fn by_document(defects: &[Defect]) -> BTreeMap<&DocumentId, Vec<&Defect>> {
    let mut grouped: BTreeMap<_, Vec<_>> = BTreeMap::new();
    for defect in defects {
        grouped.entry(&defect.document).or_default().push(defect);
    }
    grouped
}

/// Runs the structural checks.
#[derive(Debug, Clone)]
pub struct Validator<'s> {
    schema: &'s Schema,
    acyclic: BTreeSet<String>,
}

impl<'s> Validator<'s> {
    /// Creates a validator that checks the options marked acyclic in the
    /// schema for cycles.
    #[must_use]
    pub fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            acyclic: schema.acyclic_options().map(ToString::to_string).collect(),
        }
    }

    /// Additionally requires edges of `option` to be acyclic.
    #[must_use]
    pub fn require_acyclic(mut self, option: impl Into<String>) -> Self {
        self.acyclic.insert(option.into());
        self
    }

    /// The options checked for cycles.
    pub fn acyclic_options(&self) -> impl Iterator<Item = &str> {
        self.acyclic.iter().map(String::as_str)
    }

    /// The schema the validator checks against.
    #[must_use]
    pub const fn schema(&self) -> &'s Schema {
        self.schema
    }

    /// Validates the whole graph.
    #[must_use]
    #[instrument(level = "debug", skip_all, fields(items = graph.item_count()))]
    pub fn validate(&self, graph: &Graph) -> Vec<Defect> {
        let mut defects: Vec<Defect> = graph
            .entries()
            .flat_map(|(_, entry)| entry.pending.iter().cloned())
            .collect();

        defects.extend(duplicates(graph, graph.ids()));

        let edges: Vec<EdgeKey> = graph
            .documents()
            .flat_map(|document| graph.document_edge_keys(document))
            .collect();
        defects.extend(dangling(graph, &edges));

        for option in &self.acyclic {
            defects.extend(cycles(graph, option));
        }

        sort(&mut defects);
        debug!(defects = defects.len(), "validated");
        defects
    }

    /// Re-validates a graph after a build, reusing the defects of the
    /// previous validation.
    ///
    /// `previous` must be the result of validating the graph the build
    /// started from, with a validator configured like this one. The result is
    /// identical to [`Self::validate`] on the new graph.
    #[must_use]
    #[instrument(level = "debug", skip_all, fields(changed = report.changed.len()))]
    pub fn revalidate(
        &self,
        graph: &Graph,
        previous: &[Defect],
        report: &BuildReport,
    ) -> Vec<Defect> {
        if report.is_empty() {
            return previous.to_vec();
        }

        let touched: BTreeSet<&ItemId> = report.touched_ids().collect();
        let rechecked_options: Vec<&String> = self
            .acyclic
            .iter()
            .filter(|option| report.options.contains(*option))
            .collect();

        let mut defects: Vec<Defect> = previous
            .iter()
            .filter(|defect| match &defect.kind {
                DefectKind::DuplicateId => !touched.contains(&defect.item),
                DefectKind::DanglingTarget { target, .. } => {
                    !report.changed.contains(&defect.document) && !touched.contains(&target)
                }
                DefectKind::CycleDetected { option, .. } => !report.options.contains(option),
                _ => !report.changed.contains(&defect.document),
            })
            .cloned()
            .collect();

        for document in &report.changed {
            if let Some(entry) = graph.entry(document) {
                defects.extend(entry.pending.iter().cloned());
            }
        }

        defects.extend(duplicates(graph, touched.iter().copied()));

        let mut edges: BTreeSet<EdgeKey> = report
            .changed
            .iter()
            .flat_map(|document| graph.document_edge_keys(document))
            .collect();
        for id in &touched {
            edges.extend(graph.incoming_keys(id).cloned());
        }
        defects.extend(dangling(graph, edges.iter()));

        for option in rechecked_options {
            defects.extend(cycles(graph, option));
        }

        sort(&mut defects);
        debug!(
            defects = defects.len(),
            reused = previous.len(),
            "revalidated"
        );
        defects
    }
}

/// Canonical defect order: check, then item, then document, then kind, then
/// detail.
fn sort(defects: &mut [Defect]) {
    defects.sort_by(|a, b| {
        (
            a.kind.check(),
            &a.item,
            &a.document,
            a.kind.rank(),
            &a.detail,
        )
            .cmp(&(
                b.kind.check(),
                &b.item,
                &b.document,
                b.kind.rank(),
                &b.detail,
            ))
    });
}

fn duplicates<'g>(graph: &Graph, ids: impl IntoIterator<Item = &'g ItemId>) -> Vec<Defect> {
    let mut defects = Vec::new();
    for id in ids {
        let claimants: Vec<&Item> = graph.claimants(id).collect();
        if claimants.len() < 2 {
            continue;
        }
        let documents: Vec<&str> = claimants.iter().map(|item| item.document.as_str()).collect();
        for item in &claimants {
            defects.push(Defect::new(
                DefectKind::DuplicateId,
                item,
                format!(
                    "identifier '{id}' is claimed {} times (in {})",
                    claimants.len(),
                    documents.join(", ")
                ),
            ));
        }
    }
    defects
}

fn dangling<'e>(graph: &Graph, edges: impl IntoIterator<Item = &'e EdgeKey>) -> Vec<Defect> {
    edges
        .into_iter()
        .filter_map(|key| {
            let item = graph.item_at(&key.item)?;
            let link = item.links.get(key.link)?;
            if graph.contains(&link.to) {
                return None;
            }
            Some(Defect::new(
                DefectKind::DanglingTarget {
                    option: link.option.clone(),
                    target: link.to.clone(),
                },
                item,
                format!("'{}' target '{}' does not exist", link.option, link.to),
            ))
        })
        .collect()
}

/// Reports one cycle per cyclic strongly connected component among the
/// resolved edges of `option`.
fn cycles(graph: &Graph, option: &str) -> Vec<Defect> {
    let mut edges: DiGraphMap<&str, ()> = DiGraphMap::new();
    for item in graph.items_by_id() {
        for link in item.links.iter().filter(|link| link.option == option) {
            if graph.contains(&link.to) {
                edges.add_edge(item.id.as_str(), link.to.as_str(), ());
            }
        }
    }

    let mut defects = Vec::new();
    for component in tarjan_scc(&edges) {
        let members: BTreeSet<&str> = component.into_iter().collect();
        let Some(mut cycle) = find_cycle(&edges, &members) else {
            continue;
        };

        if let Some(lowest) = cycle
            .iter()
            .enumerate()
            .min_by_key(|(_, id)| **id)
            .map(|(index, _)| index)
        {
            cycle.rotate_left(lowest);
        }

        let Some(item) = cycle.first().and_then(|id| graph.get(id)) else {
            continue;
        };
        let mut path = cycle.join(" -> ");
        path.push_str(" -> ");
        path.push_str(cycle[0]);
        let detail = format!("'{option}' cycle: {path}");

        let ids = cycle.iter().map(|id| ItemId::from(*id)).collect();
        if let Some(cycle) = NonEmpty::from_vec(ids) {
            defects.push(Defect::new(
                DefectKind::CycleDetected {
                    option: option.to_string(),
                    cycle,
                },
                item,
                detail,
            ));
        }
    }
    defects
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Grey,
    Black,
}

/// Depth-first search for a cycle within one component.
///
/// The search starts at the lowest identifier and visits successors in
/// ascending order. The first back edge found closes the reported cycle.
fn find_cycle<'g>(
    edges: &DiGraphMap<&'g str, ()>,
    members: &BTreeSet<&'g str>,
) -> Option<Vec<&'g str>> {
    let successors = |node: &'g str| {
        let mut next: Vec<&'g str> = edges
            .neighbors(node)
            .filter(|n| members.contains(n))
            .collect();
        next.sort_unstable();
        next.into_iter()
    };

    let mut color: HashMap<&str, Color> = members.iter().map(|n| (*n, Color::White)).collect();

    for &root in members {
        if color.get(root) != Some(&Color::White) {
            continue;
        }
        color.insert(root, Color::Grey);
        let mut path = vec![root];
        let mut frames = vec![successors(root)];

        loop {
            let Some(frame) = frames.last_mut() else {
                break;
            };
            if let Some(next) = frame.next() {
                match color.get(next) {
                    Some(Color::Grey) => {
                        let start = path.iter().position(|n| *n == next)?;
                        return Some(path[start..].to_vec());
                    }
                    Some(Color::White) => {
                        color.insert(next, Color::Grey);
                        path.push(next);
                        frames.push(successors(next));
                    }
                    _ => {}
                }
            } else {
                frames.pop();
                if let Some(done) = path.pop() {
                    color.insert(done, Color::Black);
                }
            }
        }
    }
    None
}
