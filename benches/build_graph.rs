//! This bench simulates building a large corpus, and then re-scanning a single
//! document of it the way an editor does on save.

#![allow(missing_docs)]

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use rigr::{ChangeSet, DocumentId, Graph, RawItem, Schema, Validator, Workspace, domain::build};

const SCHEMA: &str = r#"
objectTypes = [{ type = "requirement", title = "Requirement" }]
levels = [
    { level = "stakeholder", title = "Stakeholder" },
    { level = "system", title = "System" },
]
statuses = [{ status = "draft" }]

[idConfig]
prefix = "REQ"
separator = "-"
padding = 5
start = 1

[[linkTypes]]
option = "satisfies"
incoming = "satisfied_by"
outgoing = "satisfies"
acyclic = true
"#;

const DOCUMENTS: usize = 200;
const ITEMS_PER_DOCUMENT: usize = 25;

fn id(document: usize, item: usize) -> String {
    format!("REQ-{:05}", document * ITEMS_PER_DOCUMENT + item + 1)
}

/// Every system item satisfies two stakeholder items of the previous
/// document.
fn document(index: usize, revision: usize) -> (DocumentId, Vec<RawItem>) {
    let items = (0..ITEMS_PER_DOCUMENT)
        .map(|item| {
            let mut record = RawItem::new("requirement")
                .with_id(id(index, item))
                .with_attribute("title", format!("Item {item} revision {revision}"));
            if index == 0 {
                record = record.with_level("stakeholder");
            } else {
                record = record
                    .with_level("system")
                    .with_link("satisfies", id(index - 1, item))
                    .with_link("satisfies", id(index - 1, (item + 1) % ITEMS_PER_DOCUMENT));
            }
            record
        })
        .collect();
    (DocumentId::new(format!("doc-{index:03}.yaml")), items)
}

fn corpus() -> ChangeSet {
    (0..DOCUMENTS).map(|index| document(index, 0)).collect()
}

fn full_build(c: &mut Criterion) {
    let schema = Schema::from_toml(SCHEMA).unwrap();
    let changes = corpus();

    c.bench_function("full build and validate", |b| {
        b.iter(|| {
            let (graph, _) = build(&schema, &Graph::new(), &changes);
            Validator::new(&schema).validate(&graph)
        });
    });
}

fn incremental_rebuild(c: &mut Criterion) {
    c.bench_function("rebuild one document", |b| {
        b.iter_batched(
            || {
                let workspace = Workspace::new(Schema::from_toml(SCHEMA).unwrap());
                let initial = workspace.apply(corpus());
                assert!(initial.is_clean());
                workspace
            },
            |workspace| {
                let changes: ChangeSet = [document(DOCUMENTS / 2, 1)].into_iter().collect();
                workspace.apply(changes)
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, full_build, incremental_rebuild);
criterion_main!(benches);
