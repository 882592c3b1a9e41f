//! Domain models for the traceability graph.
//!
//! This module contains the schema, identifiers, items and the graph built
//! from them, together with the builder, validator and queries that operate
//! on that graph.

/// Schema loading and lookups.
pub mod schema;
pub use schema::{
    ConfigError, ConfigErrorKind, Direction, Level, LinkType, ObjectType, Schema, Status,
};

/// Item identifiers, their format, and allocation of new ones.
pub mod identifier;
pub use identifier::{Allocator, IdFormat, ItemId};

/// Item declarations and built items.
pub mod item;
pub use item::{DocumentId, Item, Link, RawItem};

pub mod graph;
pub use graph::Graph;

pub mod builder;
pub use builder::{BuildReport, ChangeSet, build};

pub mod validate;
pub use validate::{Defect, DefectKind, Validator};

pub mod query;
pub use query::{Query, QueryError};
