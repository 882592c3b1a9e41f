//! End-to-end scenarios: record files on disk, scanned into a workspace, and
//! rebuilt as they change.

use std::{fs, path::Path};

use rigr::{
    ChangeSet, Defect, Direction, Directory, DocumentId, Graph, RawItem, Schema, Validator,
    Workspace,
};
use tempfile::TempDir;

const SCHEMA: &str = r##"
defaultStatus = "draft"
extraOptions = ["priority"]

objectTypes = [
    { type = "requirement", title = "Requirement" },
    { type = "specification", title = "Specification" },
]
levels = [
    { level = "stakeholder", title = "Stakeholder Requirements" },
    { level = "system", title = "System Requirements" },
]
statuses = [
    { status = "draft", color = "#FFEB3B" },
    { status = "approved", color = "#4CAF50" },
]

[idConfig]
prefix = "REQ"
separator = "-"
padding = 4
start = 1

[[linkTypes]]
option = "satisfies"
incoming = "satisfied_by"
outgoing = "satisfies"
style = "#0000AA"

[[linkTypes]]
option = "depends_on"
incoming = "blocks"
outgoing = "depends_on"
acyclic = true
"##;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn setup() -> (TempDir, Schema, Directory) {
    let tmp = TempDir::new().expect("failed to create temp dir");
    write(tmp.path(), "rigr.toml", SCHEMA);
    write(
        tmp.path(),
        "stakeholder.yaml",
        "
- id: REQ-0001
  type: requirement
  level: stakeholder
  attributes:
    title: Measure temperature
- id: REQ-0002
  type: requirement
  level: stakeholder
",
    );
    write(
        tmp.path(),
        "system/sensors.yaml",
        "
- id: REQ-0010
  type: specification
  level: system
  status: approved
  links:
    satisfies: [REQ-0001]
- type: specification
  level: system
  links:
    satisfies: [REQ-0001]
    depends_on: [REQ-0010]
",
    );

    let schema = Schema::load(&tmp.path().join("rigr.toml")).unwrap();
    let directory = Directory::new(tmp.path().to_path_buf());
    (tmp, schema, directory)
}

fn kinds(defects: &[Defect]) -> Vec<(&'static str, &str)> {
    defects
        .iter()
        .map(|defect| (defect.kind.name(), defect.item.as_str()))
        .collect()
}

#[test]
fn scanned_corpus_is_queryable() {
    let (_tmp, schema, directory) = setup();
    let workspace = Workspace::new(schema);
    let snapshot = workspace.apply(directory.scan().unwrap());

    assert!(snapshot.is_clean(), "{:?}", snapshot.defects());
    assert_eq!(snapshot.graph().item_count(), 4);

    // the unnamed item is allocated past the highest existing number
    let allocated = &snapshot.last_build().allocated;
    assert_eq!(allocated.len(), 1);
    assert_eq!(allocated[0].as_str(), "REQ-0011");

    let query = snapshot.query();
    let matrix = query.matrix("stakeholder", "system", "satisfies").unwrap();
    assert_eq!(matrix.covered(), 1);
    assert_eq!(matrix.rows[0].targets.len(), 2);
    assert_eq!(
        query
            .orphans("stakeholder", "satisfies", Direction::Incoming)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>(),
        ["REQ-0002"]
    );

    let satisfied_by: Vec<_> = query
        .related("REQ-0001", "satisfied_by")
        .unwrap()
        .into_iter()
        .map(|related| related.id.to_string())
        .collect();
    assert_eq!(satisfied_by, ["REQ-0010", "REQ-0011"]);
}

#[test]
fn saving_a_file_rebuilds_incrementally() {
    let (tmp, schema, directory) = setup();
    let workspace = Workspace::new(schema);
    let first = workspace.apply(directory.scan().unwrap());

    // REQ-0001 is dropped; both specifications now point at nothing
    write(
        tmp.path(),
        "stakeholder.yaml",
        "- { id: REQ-0002, type: requirement, level: stakeholder }\n",
    );
    let changes = directory
        .rescan(&[tmp.path().join("stakeholder.yaml")])
        .unwrap();
    let second = workspace.apply(changes);

    assert_eq!(second.generation(), first.generation() + 1);
    assert_eq!(
        kinds(second.defects()),
        [
            ("DanglingTarget", "REQ-0010"),
            ("DanglingTarget", "REQ-0011")
        ]
    );
    assert_eq!(
        second.defects(),
        Validator::new(second.schema())
            .validate(second.graph())
            .as_slice()
    );

    // saving again without changes is a no-op
    let unchanged = directory
        .rescan(&[tmp.path().join("stakeholder.yaml")])
        .unwrap();
    let third = workspace.apply(unchanged);
    assert_eq!(third.generation(), second.generation());
}

#[test]
fn deleting_a_file_removes_its_items() {
    let (tmp, schema, directory) = setup();
    let workspace = Workspace::new(schema);
    let first = workspace.apply(directory.scan().unwrap());
    assert!(first.is_clean());

    let path = tmp.path().join("system/sensors.yaml");
    fs::remove_file(&path).unwrap();
    let snapshot = workspace.apply(directory.rescan(&[path]).unwrap());

    assert_eq!(snapshot.graph().item_count(), 2);
    assert!(!snapshot.graph().documents().any(|d| d.as_str() == "system/sensors.yaml"));
    assert!(snapshot.is_clean());
}

#[test]
fn introducing_a_cycle_is_reported() {
    let (tmp, schema, directory) = setup();
    let workspace = Workspace::new(schema);
    let first = workspace.apply(directory.scan().unwrap());
    assert!(first.is_clean());

    write(
        tmp.path(),
        "system/sensors.yaml",
        "
- id: REQ-0010
  type: specification
  level: system
  links:
    depends_on: [REQ-0011]
- id: REQ-0011
  type: specification
  level: system
  links:
    depends_on: [REQ-0010]
",
    );
    let snapshot = workspace.apply(
        directory
            .rescan(&[tmp.path().join("system/sensors.yaml")])
            .unwrap(),
    );

    assert_eq!(kinds(snapshot.defects()), [("CycleDetected", "REQ-0010")]);
    assert_eq!(
        snapshot.defects()[0].detail,
        "'depends_on' cycle: REQ-0010 -> REQ-0011 -> REQ-0010"
    );
}

#[test]
fn document_order_does_not_matter() {
    let (_tmp, schema, directory) = setup();
    let changes = directory.scan().unwrap();

    let forward: Vec<(DocumentId, Vec<RawItem>)> = changes
        .iter()
        .map(|(document, items)| (document.clone(), items.to_vec()))
        .collect();
    let mut backward = forward.clone();
    backward.reverse();

    let one = Graph::from_documents(&schema, forward);
    let two = Graph::from_documents(&schema, backward);
    assert_eq!(one, two);

    let validator = Validator::new(&schema);
    assert_eq!(validator.validate(&one), validator.validate(&two));
}

#[test]
fn one_document_at_a_time_matches_all_at_once() {
    let (tmp, schema, directory) = setup();
    write(
        tmp.path(),
        "notes.yaml",
        "
- type: requirement
  level: stakeholder
- type: requirement
  level: stakeholder
",
    );
    let changes = directory.scan().unwrap();
    let documents: Vec<(DocumentId, Vec<RawItem>)> = changes
        .iter()
        .map(|(document, items)| (document.clone(), items.to_vec()))
        .collect();

    let all_at_once = Workspace::new(schema.clone());
    let expected = all_at_once.apply(changes);

    let forward = documents.iter();
    let backward = documents.iter().rev();
    for order in [forward.collect::<Vec<_>>(), backward.collect()] {
        let incremental = Workspace::new(schema.clone());
        for (document, items) in order {
            let single: ChangeSet = [(document.clone(), items.clone())].into_iter().collect();
            let snapshot = incremental.apply(single);
            assert!(snapshot.graph().documents().any(|d| d == document));
        }

        let actual = incremental.snapshot();
        assert_eq!(actual.defects(), expected.defects());
        assert_eq!(actual.graph(), expected.graph());
    }
}
