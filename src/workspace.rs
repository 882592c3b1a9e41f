//! The owner of the published graph.
//!
//! A [`Workspace`] holds the latest fully validated [`Snapshot`] behind an
//! [`Arc`]. Readers clone the `Arc` and keep working against it while the
//! next snapshot is built; they never observe a partially built graph.
//!
//! Rebuilds are serialized. Change sets submitted while a rebuild is running
//! are merged into a pending set (the latest version of a document wins). A
//! rebuild that finds newer pending changes before it starts validating
//! abandons its work and starts over with the merged set. Once validation has
//! started, the rebuild always completes and publishes.

use std::{
    collections::BTreeSet,
    mem,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use tracing::{debug, info, instrument};

use crate::domain::{
    BuildReport, ChangeSet, Defect, DocumentId, Graph, Query, Schema, Validator, build,
};

/// An immutable, validated graph state.
#[derive(Debug)]
pub struct Snapshot {
    generation: u64,
    schema: Arc<Schema>,
    graph: Graph,
    defects: Vec<Defect>,
    report: BuildReport,
}

impl Snapshot {
    /// The number of builds published before this one.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The schema the graph was built with.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The graph.
    #[must_use]
    pub const fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Every defect, in canonical order.
    #[must_use]
    pub fn defects(&self) -> &[Defect] {
        &self.defects
    }

    /// The defects reported against items of one document.
    pub fn defects_in<'a>(&'a self, document: &'a DocumentId) -> impl Iterator<Item = &'a Defect> {
        self.defects
            .iter()
            .filter(move |defect| &defect.document == document)
    }

    /// Whether the graph has no defects.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.defects.is_empty()
    }

    /// What the build that produced this snapshot changed.
    #[must_use]
    pub const fn last_build(&self) -> &BuildReport {
        &self.report
    }

    /// Queries against this snapshot.
    #[must_use]
    pub fn query(&self) -> Query<'_> {
        Query::new(&self.schema, &self.graph)
    }
}

/// Owns the latest snapshot and rebuilds it as documents change.
#[derive(Debug)]
pub struct Workspace {
    acyclic: BTreeSet<String>,
    current: RwLock<Arc<Snapshot>>,
    pending: Mutex<ChangeSet>,
    build_lock: Mutex<()>,
}

impl Workspace {
    /// Creates a workspace with an empty graph.
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        let snapshot = Snapshot {
            generation: 0,
            schema: Arc::new(schema),
            graph: Graph::new(),
            defects: Vec::new(),
            report: BuildReport::default(),
        };
        Self {
            acyclic: BTreeSet::new(),
            current: RwLock::new(Arc::new(snapshot)),
            pending: Mutex::new(ChangeSet::new()),
            build_lock: Mutex::new(()),
        }
    }

    /// Additionally requires edges of `option` to be acyclic.
    ///
    /// Takes effect from the next published snapshot on. Call it before the
    /// first build so that incremental validation starts from a consistent
    /// defect list.
    #[must_use]
    pub fn with_acyclic(mut self, option: impl Into<String>) -> Self {
        self.acyclic.insert(option.into());
        self
    }

    fn validator<'s>(&self, schema: &'s Schema) -> Validator<'s> {
        self.acyclic
            .iter()
            .fold(Validator::new(schema), |validator, option| {
                validator.require_acyclic(option.clone())
            })
    }

    /// The latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Queues re-scanned documents for the next rebuild.
    pub fn submit(&self, changes: ChangeSet) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(documents = changes.len(), "submitted");
        pending.merge(changes);
    }

    fn take_pending(&self) -> ChangeSet {
        mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);
        info!(
            generation = snapshot.generation,
            items = snapshot.graph.item_count(),
            defects = snapshot.defects.len(),
            "published snapshot"
        );
        snapshot
    }

    /// Builds and publishes a snapshot incorporating every pending change.
    ///
    /// Returns the current snapshot unchanged if there is nothing to do, or if
    /// every pending document is identical to what the graph already holds.
    #[must_use]
    #[instrument(level = "debug", skip_all)]
    pub fn rebuild(&self) -> Arc<Snapshot> {
        let _build = self
            .build_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let base = self.snapshot();

        let mut changes = self.take_pending();
        loop {
            if changes.is_empty() {
                return base;
            }

            let (graph, report) = build(&base.schema, &base.graph, &changes);

            let newer = self.take_pending();
            if !newer.is_empty() {
                debug!(
                    newer = newer.len(),
                    "newer changes arrived, restarting build"
                );
                changes.merge(newer);
                continue;
            }

            if report.is_empty() {
                debug!("no document changed");
                return base;
            }

            let defects = self
                .validator(&base.schema)
                .revalidate(&graph, &base.defects, &report);
            return self.publish(Snapshot {
                generation: base.generation + 1,
                schema: Arc::clone(&base.schema),
                graph,
                defects,
                report,
            });
        }
    }

    /// Submits the changes and rebuilds.
    #[must_use]
    pub fn apply(&self, changes: ChangeSet) -> Arc<Snapshot> {
        self.submit(changes);
        self.rebuild()
    }

    /// Replaces the schema and rebuilds the whole graph from the stored
    /// declarations, together with any pending changes.
    ///
    /// Identifiers allocated under the previous schema are allocated afresh.
    #[must_use]
    #[instrument(level = "debug", skip_all)]
    pub fn reload_schema(&self, schema: Schema) -> Arc<Snapshot> {
        let _build = self
            .build_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let base = self.snapshot();

        let mut changes: ChangeSet = base
            .graph
            .documents()
            .map(|document| {
                (
                    document.clone(),
                    base.graph.document_records(document).to_vec(),
                )
            })
            .collect();
        changes.merge(self.take_pending());

        let (graph, report) = build(&schema, &Graph::new(), &changes);
        let defects = self.validator(&schema).validate(&graph);
        self.publish(Snapshot {
            generation: base.generation + 1,
            schema: Arc::new(schema),
            graph,
            defects,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::domain::{RawItem, schema::tests::example};

    fn req(id: &str) -> RawItem {
        RawItem::new("requirement").with_id(id)
    }

    fn changes(documents: impl IntoIterator<Item = (&'static str, Vec<RawItem>)>) -> ChangeSet {
        documents
            .into_iter()
            .map(|(name, items)| (DocumentId::from(name), items))
            .collect()
    }

    #[test]
    fn starts_empty() {
        let workspace = Workspace::new(example());
        let snapshot = workspace.snapshot();
        assert_eq!(snapshot.generation(), 0);
        assert_eq!(snapshot.graph().item_count(), 0);
        assert!(snapshot.is_clean());
    }

    #[test]
    fn publishes_a_new_generation_per_change() {
        let workspace = Workspace::new(example());

        let first = workspace.apply(changes([(
            "a",
            vec![req("A").with_link("satisfies", "B")],
        )]));
        assert_eq!(first.generation(), 1);
        assert_eq!(first.defects().len(), 1);

        let second = workspace.apply(changes([("b", vec![req("B")])]));
        assert_eq!(second.generation(), 2);
        assert!(second.is_clean());

        // readers holding the old snapshot are unaffected
        assert_eq!(first.defects().len(), 1);
        assert!(!first.graph().contains("B"));
    }

    #[test]
    fn identical_resubmission_keeps_the_snapshot() {
        let workspace = Workspace::new(example());
        let documents = [("a", vec![RawItem::new("requirement"), req("X")])];

        let first = workspace.apply(changes(documents.clone()));
        let allocated = first.last_build().allocated.clone();
        assert_eq!(allocated.len(), 1);

        let second = workspace.apply(changes(documents));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.generation(), 1);
        assert!(second.graph().contains(&allocated[0]));
    }

    #[test]
    fn pending_changes_are_merged_newest_first() {
        let workspace = Workspace::new(example());
        workspace.submit(changes([("a", vec![req("OLD")])]));
        workspace.submit(changes([("a", vec![req("NEW")]), ("b", vec![req("B")])]));

        let snapshot = workspace.rebuild();
        assert_eq!(snapshot.generation(), 1);
        assert!(snapshot.graph().contains("NEW"));
        assert!(!snapshot.graph().contains("OLD"));
        assert!(snapshot.graph().contains("B"));
    }

    #[test]
    fn defects_are_namespaced_by_document() {
        let workspace = Workspace::new(example());
        let snapshot = workspace.apply(changes([
            ("a", vec![req("A").with_link("satisfies", "GONE")]),
            ("b", vec![RawItem::new("widget").with_id("B")]),
        ]));

        let a = DocumentId::from("a");
        let in_a: Vec<_> = snapshot.defects_in(&a).map(|d| d.kind.name()).collect();
        assert_eq!(in_a, ["DanglingTarget"]);
    }

    #[test]
    fn caller_can_require_acyclic_options() {
        let workspace = Workspace::new(example()).with_acyclic("satisfies");
        let snapshot = workspace.apply(changes([(
            "a",
            vec![
                req("A").with_link("satisfies", "B"),
                req("B").with_link("satisfies", "A"),
            ],
        )]));
        assert_eq!(snapshot.defects()[0].kind.name(), "CycleDetected");
    }

    #[test]
    fn reloading_the_schema_revalidates_everything() {
        let workspace = Workspace::new(example());
        let first = workspace.apply(changes([(
            "a",
            vec![req("A").with_attribute("owner", "me")],
        )]));
        assert_eq!(first.defects().len(), 1);

        let relaxed = example_with_extra_option("owner");
        let snapshot = workspace.reload_schema(relaxed);
        assert_eq!(snapshot.generation(), 2);
        assert!(snapshot.is_clean());
        assert!(snapshot.schema().is_attribute_allowed("owner"));
    }

    fn example_with_extra_option(option: &str) -> Schema {
        let source = crate::domain::schema::tests::EXAMPLE.replace(
            "\"baseline\"",
            &format!("\"baseline\", \"{option}\""),
        );
        Schema::from_toml(&source).unwrap()
    }

    #[test]
    fn concurrent_submissions_converge() {
        let workspace = Workspace::new(example());

        thread::scope(|scope| {
            for writer in 0..4 {
                let workspace = &workspace;
                scope.spawn(move || {
                    for round in 0..10 {
                        let document = format!("doc-{writer}");
                        let id = format!("W{writer}-R{round}");
                        workspace.submit(
                            [(
                                DocumentId::new(document),
                                vec![req(&id).with_link("satisfies", "W0-R9")],
                            )]
                            .into_iter()
                            .collect(),
                        );
                        let snapshot = workspace.rebuild();
                        assert!(snapshot.generation() >= 1);
                    }
                });
            }
            for _ in 0..4 {
                let workspace = &workspace;
                scope.spawn(move || {
                    for _ in 0..20 {
                        let snapshot = workspace.snapshot();
                        // a published snapshot is always fully validated
                        let full = Validator::new(snapshot.schema()).validate(snapshot.graph());
                        assert_eq!(snapshot.defects(), full.as_slice());
                    }
                });
            }
        });

        let snapshot = workspace.rebuild();
        let graph = snapshot.graph();
        assert_eq!(graph.item_count(), 4);
        for writer in 0..4 {
            assert!(graph.contains(&format!("W{writer}-R9")));
        }
        assert!(snapshot.is_clean());
    }
}
