//! Link graph data structures.
//!
//! A [`LinkGraph`] is an arena of [`LibraryNode`]s keyed by library name.
//! Edges are the `needs` lists of each node, stored as names rather than
//! references: shared dependencies converge on one entry and cycles need no
//! special handling in the graph itself.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// Name of the virtual node that heads a merged multi-root graph.
///
/// Angle brackets never appear in a `DT_NEEDED` entry or an input path we
/// accept, so this cannot collide with a real library.
pub const SYNTHETIC_ROOT: &str = "<roots>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryNode {
    /// `DT_NEEDED` value, or the input path for a root file.
    pub name: String,
    /// Path the dynamic linker would open. None if it could not be found.
    pub path: Option<PathBuf>,
    /// Symlink-resolved file behind `path`.
    pub canonical_path: Option<PathBuf>,
    /// Declared dependency names, in declaration order, without duplicates.
    pub needs: Vec<String>,
}

impl LibraryNode {
    pub fn new(
        name: impl Into<String>,
        path: PathBuf,
        canonical_path: PathBuf,
        needs: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: Some(path),
            canonical_path: Some(canonical_path),
            needs,
        }
    }

    /// A declared dependency that could not be located on disk.
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            canonical_path: None,
            needs: Vec::new(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.path.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct LinkGraph {
    root: String,
    synthetic_root: bool,
    libs: HashMap<String, LibraryNode>,
}

impl LinkGraph {
    /// Create a graph rooted at a real file.
    pub fn new(root: LibraryNode) -> Self {
        let mut libs = HashMap::new();
        let name = root.name.clone();
        libs.insert(name.clone(), root);
        Self {
            root: name,
            synthetic_root: false,
            libs,
        }
    }

    /// Merge per-root graphs into one.
    ///
    /// A single graph is returned unchanged. Otherwise the result is headed
    /// by a [`SYNTHETIC_ROOT`] node whose `needs` are the roots of the input
    /// graphs, in order. Nodes are merged by name; the first graph to define
    /// a name wins.
    pub fn merge(mut graphs: Vec<LinkGraph>) -> Self {
        if graphs.len() == 1
            && let Some(graph) = graphs.pop()
        {
            return graph;
        }

        let mut needs: Vec<String> = Vec::with_capacity(graphs.len());
        for g in &graphs {
            if !needs.contains(&g.root) {
                needs.push(g.root.clone());
            }
        }
        let mut merged = Self {
            root: SYNTHETIC_ROOT.to_string(),
            synthetic_root: true,
            libs: HashMap::new(),
        };
        merged.libs.insert(
            SYNTHETIC_ROOT.to_string(),
            LibraryNode {
                name: SYNTHETIC_ROOT.to_string(),
                path: None,
                canonical_path: None,
                needs,
            },
        );
        for g in graphs {
            for (name, node) in g.libs {
                merged.libs.entry(name).or_insert(node);
            }
        }
        merged
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Names of the input files: the synthetic root's `needs` in a merged
    /// graph, otherwise the root itself.
    pub fn input_roots(&self) -> Vec<&str> {
        if !self.synthetic_root {
            return vec![self.root.as_str()];
        }
        self.libs
            .get(&self.root)
            .map(|node| node.needs.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// True for the virtual head of a merged graph, which is never a file.
    pub fn is_synthetic_root(&self, name: &str) -> bool {
        self.synthetic_root && name == self.root
    }

    /// Insert a node unless its name is already present. Returns whether
    /// the node was inserted.
    pub fn insert(&mut self, node: LibraryNode) -> bool {
        if self.libs.contains_key(&node.name) {
            return false;
        }
        self.libs.insert(node.name.clone(), node);
        true
    }

    pub fn get(&self, name: &str) -> Option<&LibraryNode> {
        self.libs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.libs.contains_key(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &LibraryNode> {
        self.libs.values()
    }

    /// Fix nodes whose canonical path was left equal to a path that is
    /// itself a symlink (providers do this for the queried top-level file).
    ///
    /// If the link cannot be resolved, e.g. it dangles, the provider's values
    /// are kept as they are.
    pub fn normalize_canonical_paths(&mut self) {
        for node in self.libs.values_mut() {
            let (Some(path), Some(canonical)) = (&node.path, &node.canonical_path) else {
                continue;
            };
            if path != canonical || !is_symlink(path) {
                continue;
            }
            match fs::canonicalize(path) {
                Ok(real) => {
                    tracing::debug!(
                        "canonical path of {} corrected to {}",
                        path.display(),
                        real.display()
                    );
                    node.canonical_path = Some(real);
                }
                Err(e) => {
                    tracing::debug!("cannot resolve symlink {}: {e}", path.display());
                }
            }
        }
    }
}

fn is_symlink(path: &std::path::Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}
