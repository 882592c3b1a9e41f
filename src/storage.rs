//! Filesystem adapters that feed declarations into the engine.

pub mod directory;

pub use directory::{Directory, DirectoryLoadError};
