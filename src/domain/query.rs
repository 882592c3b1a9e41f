//! Read-only traceability views over a built graph.
//!
//! Queries never modify the graph and never trigger a rebuild. Only
//! resolved edges (whose target exists) are counted; dangling edges are the
//! validator's business.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::{algo::astar, graphmap::DiGraphMap};
use serde::Serialize;

use crate::domain::{
    graph::Graph,
    identifier::ItemId,
    item::{Item, Link},
    schema::{Direction, Schema},
};

/// A query referred to something the schema does not declare.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// The level is not declared.
    #[error("unknown level '{0}'")]
    UnknownLevel(String),

    /// The link option is not declared.
    #[error("unknown link option '{0}'")]
    UnknownOption(String),

    /// No link type uses the label for either reading.
    #[error("unknown link label '{0}'")]
    UnknownLabel(String),
}

/// One row of a traceability [`Matrix`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixRow {
    /// The source-level item.
    pub source: ItemId,
    /// Target-level items connected to it, in ascending order.
    pub targets: Vec<ItemId>,
}

impl MatrixRow {
    /// Whether the source item is connected to at least one target.
    #[must_use]
    pub fn is_covered(&self) -> bool {
        !self.targets.is_empty()
    }
}

/// Coverage of one level by another through one link option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Matrix {
    /// The level the rows are drawn from.
    pub source_level: String,
    /// The level the targets are drawn from.
    pub target_level: String,
    /// The link option that connects them.
    pub option: String,
    /// One row per source item, in ascending identifier order.
    pub rows: Vec<MatrixRow>,
}

impl Matrix {
    /// Rows without any target.
    pub fn uncovered(&self) -> impl Iterator<Item = &MatrixRow> {
        self.rows.iter().filter(|row| !row.is_covered())
    }

    /// The number of rows with at least one target.
    #[must_use]
    pub fn covered(&self) -> usize {
        self.rows.iter().filter(|row| row.is_covered()).count()
    }
}

/// A resolved edge with its renderer hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyledEdge {
    /// The declaring item.
    pub from: ItemId,
    /// The target item.
    pub to: ItemId,
    /// The configured style, verbatim.
    pub style: Option<String>,
}

/// An item reached from another through a labelled reading of a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Related {
    /// The item on the other end.
    pub id: ItemId,
    /// The link option of the stored edge.
    pub option: String,
    /// Which reading of the edge matched the label.
    pub direction: Direction,
}

/// An item together with both readings of its links.
#[derive(Debug, Clone, Serialize)]
pub struct ItemView<'a> {
    /// The item.
    #[serde(flatten)]
    pub item: &'a Item,
    /// The colour hint configured for the item's status.
    pub status_color: Option<&'a str>,
    /// Edges pointing at the item, including those declared by other
    /// documents.
    pub incoming: Vec<&'a Link>,
}

/// Aggregate counts over a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Number of documents.
    pub documents: usize,
    /// Number of items, counting every claimant of a duplicated identifier.
    pub items: usize,
    /// Number of stored edges.
    pub links: usize,
    /// Number of edges whose target does not exist.
    pub dangling: usize,
    /// Items per status.
    pub by_status: BTreeMap<String, usize>,
    /// Items per object type.
    pub by_type: BTreeMap<String, usize>,
}

/// Traceability queries against one graph and the schema it was built with.
#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    schema: &'a Schema,
    graph: &'a Graph,
}

impl<'a> Query<'a> {
    /// Creates a query context.
    #[must_use]
    pub const fn new(schema: &'a Schema, graph: &'a Graph) -> Self {
        Self { schema, graph }
    }

    fn check_level(&self, level: &str) -> Result<(), QueryError> {
        self.schema
            .level(level)
            .map(|_| ())
            .ok_or_else(|| QueryError::UnknownLevel(level.to_string()))
    }

    fn check_option(&self, option: &str) -> Result<(), QueryError> {
        self.schema
            .link_type(option)
            .map(|_| ())
            .ok_or_else(|| QueryError::UnknownOption(option.to_string()))
    }

    /// Every item at `level`, in identifier order.
    ///
    /// # Errors
    ///
    /// Returns an error if the level is not declared.
    pub fn items_at_level(&self, level: &str) -> Result<Vec<&'a Item>, QueryError> {
        self.check_level(level)?;
        Ok(self
            .graph
            .items_by_id()
            .filter(|item| item.level() == Some(level))
            .collect())
    }

    /// The distinct identifiers claimed by an item at `level`.
    fn ids_at_level(&self, level: &str) -> Result<BTreeSet<&'a ItemId>, QueryError> {
        Ok(self
            .items_at_level(level)?
            .into_iter()
            .map(Item::id)
            .collect())
    }

    /// Identifiers connected to `id` by one resolved edge of `option`, in
    /// either stored direction.
    fn neighbours(&self, id: &str, option: &str) -> BTreeSet<&'a ItemId> {
        let graph = self.graph;
        let forward = graph
            .outgoing(id, Some(option))
            .map(|link| &link.to)
            .filter(|to| graph.contains(to));
        let backward = graph.incoming(id, Some(option)).map(|link| &link.from);
        forward.chain(backward).collect()
    }

    /// Builds the traceability matrix of `source_level` against
    /// `target_level` through `option`.
    ///
    /// # Errors
    ///
    /// Returns an error if either level or the option is not declared.
    pub fn matrix(
        &self,
        source_level: &str,
        target_level: &str,
        option: &str,
    ) -> Result<Matrix, QueryError> {
        self.check_option(option)?;
        let sources = self.ids_at_level(source_level)?;
        let targets = self.ids_at_level(target_level)?;

        let rows = sources
            .into_iter()
            .map(|source| MatrixRow {
                source: source.clone(),
                targets: self
                    .neighbours(source, option)
                    .into_iter()
                    .filter(|id| targets.contains(id))
                    .cloned()
                    .collect(),
            })
            .collect();

        Ok(Matrix {
            source_level: source_level.to_string(),
            target_level: target_level.to_string(),
            option: option.to_string(),
            rows,
        })
    }

    /// Items at `level` with no resolved edge of `option` in `direction`.
    ///
    /// # Errors
    ///
    /// Returns an error if the level or the option is not declared.
    pub fn orphans(
        &self,
        level: &str,
        option: &str,
        direction: Direction,
    ) -> Result<Vec<ItemId>, QueryError> {
        self.check_option(option)?;
        let graph = self.graph;
        Ok(self
            .ids_at_level(level)?
            .into_iter()
            .filter(|id| match direction {
                Direction::Outgoing => !graph
                    .outgoing(id, Some(option))
                    .any(|link| graph.contains(&link.to)),
                Direction::Incoming => graph.incoming(id, Some(option)).next().is_none(),
            })
            .cloned()
            .collect())
    }

    /// Resolved edges of `option` annotated with the configured style.
    ///
    /// Edges are listed by source identifier, then in declaration order.
    ///
    /// # Errors
    ///
    /// Returns an error if the option is not declared.
    pub fn styled_edges(&self, option: &str) -> Result<Vec<StyledEdge>, QueryError> {
        let style = self
            .schema
            .link_type(option)
            .ok_or_else(|| QueryError::UnknownOption(option.to_string()))?
            .style
            .clone();

        Ok(self
            .graph
            .items_by_id()
            .flat_map(|item| item.links())
            .filter(|link| link.option == option && self.graph.contains(&link.to))
            .map(|link| StyledEdge {
                from: link.from.clone(),
                to: link.to.clone(),
                style: style.clone(),
            })
            .collect())
    }

    /// Items related to `id` through the reading(s) labelled `label`.
    ///
    /// Outgoing readings come first. Within a reading, items are listed in
    /// ascending order. An identifier no item claims has no related items.
    ///
    /// # Errors
    ///
    /// Returns an error if no link type uses the label.
    pub fn related(&self, id: &str, label: &str) -> Result<Vec<Related>, QueryError> {
        let readings = self.schema.resolve_label(label);
        if readings.is_empty() {
            return Err(QueryError::UnknownLabel(label.to_string()));
        }
        let graph = self.graph;
        if !graph.contains(id) {
            return Ok(Vec::new());
        }

        let mut related = Vec::new();
        for (link_type, direction) in readings {
            let option = link_type.option.as_str();
            let ids: BTreeSet<&ItemId> = match direction {
                Direction::Outgoing => graph
                    .outgoing(id, Some(option))
                    .map(|link| &link.to)
                    .filter(|to| graph.contains(to))
                    .collect(),
                Direction::Incoming => graph
                    .incoming(id, Some(option))
                    .map(|link| &link.from)
                    .collect(),
            };
            related.extend(ids.into_iter().map(|other| Related {
                id: other.clone(),
                option: option.to_string(),
                direction,
            }));
        }
        Ok(related)
    }

    /// The shortest directed path from `from` to `to` over resolved edges of
    /// the given options (all options when empty).
    ///
    /// Returns `None` if either item is missing or no path exists.
    ///
    /// # Errors
    ///
    /// Returns an error if one of the options is not declared.
    pub fn path(
        &self,
        from: &str,
        to: &str,
        options: &[&str],
    ) -> Result<Option<Vec<ItemId>>, QueryError> {
        for option in options {
            self.check_option(option)?;
        }
        let graph = self.graph;
        if !graph.contains(from) || !graph.contains(to) {
            return Ok(None);
        }
        if from == to {
            return Ok(Some(vec![ItemId::from(from)]));
        }

        let mut edges: DiGraphMap<&str, ()> = DiGraphMap::new();
        for link in graph.items_by_id().flat_map(Item::links) {
            if (options.is_empty() || options.contains(&link.option.as_str()))
                && graph.contains(&link.to)
            {
                edges.add_edge(link.from.as_str(), link.to.as_str(), ());
            }
        }
        if !edges.contains_node(from) {
            return Ok(None);
        }

        let path = astar(&edges, from, |node| node == to, |_| 1_usize, |_| 0)
            .map(|(_, nodes)| nodes.into_iter().map(ItemId::from).collect());
        Ok(path)
    }

    /// The first item claiming `id`, with both readings of its links.
    #[must_use]
    pub fn item_view(&self, id: &str) -> Option<ItemView<'a>> {
        let item = self.graph.get(id)?;
        Some(ItemView {
            item,
            status_color: self.schema.status_color(item.status()),
            incoming: self.graph.incoming(id, None).collect(),
        })
    }

    /// Aggregate counts over the whole graph.
    #[must_use]
    pub fn summary(&self) -> Summary {
        let graph = self.graph;
        let mut summary = Summary {
            documents: graph.documents().count(),
            items: graph.item_count(),
            links: graph.link_count(),
            dangling: graph.links().filter(|link| !graph.contains(&link.to)).count(),
            ..Summary::default()
        };
        for item in graph.items() {
            *summary
                .by_status
                .entry(item.status().to_string())
                .or_default() += 1;
            *summary.by_type.entry(item.kind().to_string()).or_default() += 1;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::domain::{
        item::{DocumentId, RawItem},
        schema::tests::example,
    };

    fn item(id: &str, level: &str) -> RawItem {
        RawItem::new("requirement").with_id(id).with_level(level)
    }

    /// S1, S2 stakeholder; Y1, Y2 system; C1 component.
    ///
    /// Y1 satisfies S1, Y2 satisfies S1, C1 satisfies Y1, C1 depends on Y2,
    /// and Y2 also satisfies a missing S9.
    fn graph() -> Graph {
        Graph::from_documents(
            &example(),
            [
                (
                    DocumentId::from("stakeholder"),
                    vec![item("S1", "stakeholder"), item("S2", "stakeholder")],
                ),
                (
                    DocumentId::from("system"),
                    vec![
                        item("Y1", "system").with_link("satisfies", "S1"),
                        item("Y2", "system")
                            .with_link("satisfies", "S1")
                            .with_link("satisfies", "S9"),
                    ],
                ),
                (
                    DocumentId::from("component"),
                    vec![
                        item("C1", "component")
                            .with_link("satisfies", "Y1")
                            .with_link("depends_on", "Y2")
                            .with_status("approved"),
                    ],
                ),
            ],
        )
    }

    fn ids(ids: &[ItemId]) -> Vec<&str> {
        ids.iter().map(ItemId::as_str).collect()
    }

    #[test]
    fn matrix_rows_cover_every_source_item() {
        let schema = example();
        let graph = graph();
        let matrix = Query::new(&schema, &graph)
            .matrix("stakeholder", "system", "satisfies")
            .unwrap();

        let rows: Vec<_> = matrix
            .rows
            .iter()
            .map(|row| (row.source.as_str(), ids(&row.targets)))
            .collect();
        assert_eq!(rows, [("S1", vec!["Y1", "Y2"]), ("S2", vec![])]);
        assert_eq!(matrix.covered(), 1);
        assert_eq!(
            matrix
                .uncovered()
                .map(|row| row.source.as_str())
                .collect::<Vec<_>>(),
            ["S2"]
        );
    }

    #[test]
    fn matrix_follows_either_stored_direction() {
        let schema = example();
        let graph = graph();
        let matrix = Query::new(&schema, &graph)
            .matrix("system", "stakeholder", "satisfies")
            .unwrap();
        let rows: Vec<_> = matrix
            .rows
            .iter()
            .map(|row| (row.source.as_str(), ids(&row.targets)))
            .collect();
        assert_eq!(rows, [("Y1", vec!["S1"]), ("Y2", vec!["S1"])]);
    }

    #[test_case("galaxy", "system", "satisfies", QueryError::UnknownLevel("galaxy".into()); "source level")]
    #[test_case("system", "galaxy", "satisfies", QueryError::UnknownLevel("galaxy".into()); "target level")]
    #[test_case("system", "stakeholder", "nope", QueryError::UnknownOption("nope".into()); "option")]
    fn matrix_rejects_undeclared_names(source: &str, target: &str, option: &str, expected: QueryError) {
        let schema = example();
        let graph = graph();
        assert_eq!(
            Query::new(&schema, &graph).matrix(source, target, option),
            Err(expected)
        );
    }

    #[test_case("stakeholder", Direction::Incoming, &["S2"]; "unsatisfied stakeholder needs")]
    #[test_case("system", Direction::Incoming, &["Y2"]; "systems nothing satisfies")]
    #[test_case("system", Direction::Outgoing, &[]; "systems satisfy something")]
    #[test_case("component", Direction::Outgoing, &[]; "components satisfy something")]
    #[test_case("component", Direction::Incoming, &["C1"]; "leaf components")]
    fn orphans(level: &str, direction: Direction, expected: &[&str]) {
        let schema = example();
        let graph = graph();
        let orphans = Query::new(&schema, &graph)
            .orphans(level, "satisfies", direction)
            .unwrap();
        assert_eq!(ids(&orphans), expected);
    }

    #[test]
    fn dangling_edges_do_not_count() {
        let schema = example();
        let graph = Graph::from_documents(
            &example(),
            [(
                DocumentId::from("a"),
                vec![item("A", "system").with_link("satisfies", "B")],
            )],
        );
        let query = Query::new(&schema, &graph);
        assert_eq!(
            ids(&query
                .orphans("system", "satisfies", Direction::Outgoing)
                .unwrap()),
            ["A"]
        );
        assert!(query.styled_edges("satisfies").unwrap().is_empty());
        assert!(query.related("B", "satisfied_by").unwrap().is_empty());
    }

    #[test]
    fn styled_edges_pass_style_through() {
        let schema = example();
        let graph = graph();
        let query = Query::new(&schema, &graph);

        let edges = query.styled_edges("satisfies").unwrap();
        let pairs: Vec<_> = edges
            .iter()
            .map(|edge| (edge.from.as_str(), edge.to.as_str()))
            .collect();
        assert_eq!(pairs, [("C1", "Y1"), ("Y1", "S1"), ("Y2", "S1")]);
        assert!(
            edges
                .iter()
                .all(|edge| edge.style.as_deref() == Some("#0000AA"))
        );

        let unstyled = query.styled_edges("depends_on").unwrap();
        assert_eq!(unstyled.len(), 1);
        assert_eq!(unstyled[0].style, None);
    }

    #[test]
    fn related_reads_both_directions() {
        let schema = example();
        let graph = graph();
        let query = Query::new(&schema, &graph);

        let satisfied_by: Vec<_> = query
            .related("S1", "satisfied_by")
            .unwrap()
            .into_iter()
            .map(|related| (related.id.to_string(), related.direction))
            .collect();
        assert_eq!(
            satisfied_by,
            [
                ("Y1".to_string(), Direction::Incoming),
                ("Y2".to_string(), Direction::Incoming)
            ]
        );

        let satisfies = query.related("Y2", "satisfies").unwrap();
        assert_eq!(satisfies.len(), 1);
        assert_eq!(satisfies[0].id.as_str(), "S1");

        assert_eq!(
            query.related("S1", "frobs"),
            Err(QueryError::UnknownLabel("frobs".into()))
        );
    }

    #[test]
    fn every_edge_is_visible_from_its_target() {
        let schema = example();
        let graph = graph();
        let query = Query::new(&schema, &graph);

        for link in graph.links().filter(|link| graph.contains(&link.to)) {
            let link_type = schema.link_type(&link.option).unwrap();
            let related = query.related(&link.to, link_type.incoming.as_str()).unwrap();
            assert!(
                related
                    .iter()
                    .any(|r| r.id == link.from && r.direction == Direction::Incoming),
                "{} -{}-> {}",
                link.from,
                link.option,
                link.to
            );
        }
    }

    #[test]
    fn symmetric_label_matches_both_readings() {
        let schema = example();
        let graph = Graph::from_documents(
            &example(),
            [(
                DocumentId::from("a"),
                vec![
                    RawItem::new("information").with_id("A").with_link("links", "B"),
                    RawItem::new("information").with_id("B").with_link("links", "C"),
                    RawItem::new("information").with_id("C"),
                ],
            )],
        );
        let related = Query::new(&schema, &graph).related("B", "links").unwrap();
        let readings: Vec<_> = related
            .iter()
            .map(|r| (r.id.as_str(), r.direction))
            .collect();
        assert_eq!(
            readings,
            [("C", Direction::Outgoing), ("A", Direction::Incoming)]
        );
    }

    #[test]
    fn shortest_path() {
        let schema = example();
        let graph = graph();
        let query = Query::new(&schema, &graph);

        let path = query.path("C1", "S1", &[]).unwrap().unwrap();
        assert_eq!(ids(&path), ["C1", "Y1", "S1"]);

        let via_dependency = query
            .path("C1", "Y2", &["depends_on"])
            .unwrap()
            .unwrap();
        assert_eq!(ids(&via_dependency), ["C1", "Y2"]);

        assert_eq!(query.path("C1", "Y2", &["satisfies"]).unwrap(), None);
        assert_eq!(query.path("S1", "C1", &[]).unwrap(), None);
        assert_eq!(query.path("C1", "S9", &[]).unwrap(), None);
        assert_eq!(
            ids(&query.path("S2", "S2", &[]).unwrap().unwrap()),
            ["S2"]
        );
        assert_eq!(
            query.path("C1", "S1", &["nope"]),
            Err(QueryError::UnknownOption("nope".into()))
        );
    }

    #[test]
    fn item_view_carries_both_readings() {
        let schema = example();
        let graph = graph();
        let query = Query::new(&schema, &graph);

        let view = query.item_view("Y1").unwrap();
        assert_eq!(view.item.links().len(), 1);
        assert_eq!(view.incoming.len(), 1);
        assert_eq!(view.incoming[0].from.as_str(), "C1");
        assert_eq!(view.status_color, Some("#FFEB3B"));

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["id"], "Y1");
        assert_eq!(json["type"], "requirement");
        assert_eq!(json["incoming"][0]["from"], "C1");

        assert!(query.item_view("NOPE").is_none());
    }

    #[test]
    fn summary_counts() {
        let schema = example();
        let graph = graph();
        let summary = Query::new(&schema, &graph).summary();

        assert_eq!(summary.documents, 3);
        assert_eq!(summary.items, 5);
        assert_eq!(summary.links, 5);
        assert_eq!(summary.dangling, 1);
        assert_eq!(summary.by_status["draft"], 4);
        assert_eq!(summary.by_status["approved"], 1);
        assert_eq!(summary.by_type["requirement"], 5);
    }
}
