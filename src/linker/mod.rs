pub mod elf;
pub mod search;

use std::path::Path;

use crate::error::Error;
use crate::graph::LinkGraph;

/// Source of link graphs for root files.
///
/// Implementations may keep a library cache across calls so that a batch
/// of roots does not re-resolve shared dependencies; hence `&mut self`.
pub trait LinkGraphProvider {
    /// Build the graph rooted at `path`, keyed by library name, with the
    /// root node keyed by `path` itself.
    fn build_graph(&mut self, path: &Path) -> Result<LinkGraph, Error>;
}
