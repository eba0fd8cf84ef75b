//! Dependency closure: which loose files and which packages a set of
//! binaries needs at run time.
//!
//! The traversal is a breadth-first walk over the [`LinkGraph`] from its
//! root. A library owned by a package ends the walk along that branch: the
//! package's own dependencies are the package manager's business. The input
//! files themselves are never pruned.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::graph::LinkGraph;
use crate::linker::LinkGraphProvider;
use crate::loader;
use crate::packages::{PackageDatabase, PackageIndex};
use crate::symlink;

#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Ask the package database who owns each library.
    pub lookup_packages: bool,
    /// Packages to treat as not installed. `name` also matches `name:arch`.
    pub ignore_packages: Vec<String>,
    /// Files under this prefix are never looked up or reported, but their
    /// dependencies are still followed.
    pub skip_prefix: Option<PathBuf>,
}

impl ResolveOptions {
    fn skips(&self, path: &Path) -> bool {
        self.skip_prefix.as_deref().is_some_and(|p| path.starts_with(p))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Packages that provide part of the closure.
    pub packages: BTreeSet<String>,
    /// Files to ship, symlinks included.
    pub files: BTreeSet<PathBuf>,
    /// Declared dependencies that could not be found, sorted.
    pub missing: Vec<String>,
    /// Non-fatal inconsistencies noticed during the walk, in walk order.
    pub warnings: Vec<String>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Resolve the closure of `roots`.
///
/// Builds the merged link graph through `provider`, queries `db` once when
/// package lookup is enabled, then classifies the graph.
pub fn resolve(
    roots: &[PathBuf],
    provider: &mut dyn LinkGraphProvider,
    db: &dyn PackageDatabase,
    opts: &ResolveOptions,
) -> Result<Resolution, Error> {
    let graph = loader::build_link_graph(provider, roots)?;
    let index = if opts.lookup_packages {
        PackageIndex::build(&graph, db, &opts.ignore_packages, opts.skip_prefix.as_deref())?
    } else {
        PackageIndex::empty()
    };
    Ok(classify(&graph, &index, opts))
}

/// Walk `graph` breadth-first and sort every reachable library into a
/// package, loose files, or missing.
pub fn classify(graph: &LinkGraph, index: &PackageIndex, opts: &ResolveOptions) -> Resolution {
    let mut result = Resolution::default();
    let inputs: HashSet<&str> = graph.input_roots().into_iter().collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    queue.push_back(graph.root());

    while let Some(name) = queue.pop_front() {
        // Several dependents may enqueue a name before it is processed.
        if !seen.insert(name) {
            continue;
        }
        let Some(node) = graph.get(name) else {
            result.missing.push(name.to_string());
            continue;
        };
        if !node.is_resolved() && !graph.is_synthetic_root(name) {
            result.missing.push(name.to_string());
        }

        // Input files are always shipped and walked, even when a package owns them.
        if opts.lookup_packages
            && !inputs.contains(name)
            && let Some(package) = index.owner(node)
        {
            tracing::debug!("{name}: provided by {package}");
            result.packages.insert(package.to_string());
            continue;
        }

        let chain = symlink::chain_for(node);
        if let Some(warning) = symlink::check_chain(node, &chain) {
            result.warnings.push(warning);
        }
        for path in chain {
            if !opts.skips(&path) {
                result.files.insert(path);
            }
        }

        for need in &node.needs {
            if !seen.contains(need.as_str()) {
                queue.push_back(need.as_str());
            }
        }
    }

    result.missing.sort();
    result
}
