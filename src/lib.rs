//! Traceability graph engine
//!
//! Requirement-like items are declared in documents and linked to each other
//! through link options defined by a [`Schema`]. The engine builds them into a
//! directed [`Graph`], reports structural [`Defect`]s, and answers
//! traceability [`Query`]s. A [`Workspace`] keeps the latest validated
//! snapshot and rebuilds it incrementally as documents change.

pub mod domain;
pub use domain::{
    BuildReport, ChangeSet, ConfigError, Defect, DefectKind, Direction, DocumentId, Graph, Item,
    ItemId, Link, Query, QueryError, RawItem, Schema, Validator,
};

/// Loading item declarations from disk.
pub mod storage;
pub use storage::{Directory, DirectoryLoadError};

pub mod workspace;
pub use workspace::{Snapshot, Workspace};
