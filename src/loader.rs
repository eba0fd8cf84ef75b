//! Input validation and link graph construction for a set of roots.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::graph::LinkGraph;
use crate::linker::LinkGraphProvider;
use crate::linker::elf::ElfInfo;
use crate::walker;

/// Validated command-line inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inputs {
    /// Absolute paths of the files to resolve.
    pub roots: Vec<PathBuf>,
    /// Set in directory mode: the scanned directory, excluded from output.
    pub directory: Option<PathBuf>,
}

impl Inputs {
    /// Prefix whose files are neither looked up nor reported.
    pub fn skip_prefix(&self) -> Option<&Path> {
        self.directory.as_deref()
    }
}

/// Check the input paths and pick the mode.
///
/// One or more files select file-list mode; every file must parse as ELF.
/// A single directory selects directory mode and is scanned for shared
/// libraries. A directory mixed with other inputs is an error. All checks
/// happen before any dependency resolution.
pub fn load_inputs(paths: &[PathBuf]) -> Result<Inputs, Error> {
    if paths.is_empty() {
        return Err(Error::NoInputs);
    }

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let meta = fs::metadata(path).map_err(|e| Error::InputNotFound(path.clone(), e))?;
        let absolute =
            std::path::absolute(path).map_err(|e| Error::InputNotFound(path.clone(), e))?;
        if meta.is_dir() {
            if paths.len() > 1 {
                return Err(Error::DirectoryWithOtherInputs(path.clone()));
            }
            let roots = walker::discover_libraries(&absolute);
            if roots.is_empty() {
                tracing::warn!("no shared libraries found under {}", absolute.display());
            }
            return Ok(Inputs {
                roots,
                directory: Some(absolute),
            });
        }
        ElfInfo::parse(&absolute).map_err(|e| Error::NotElf(path.clone(), e.to_string()))?;
        if !files.contains(&absolute) {
            files.push(absolute);
        }
    }

    Ok(Inputs {
        roots: files,
        directory: None,
    })
}

/// Build one graph per root and merge them.
///
/// A single root yields its own graph; several roots are joined under a
/// synthetic root. Top-level canonical paths are normalized afterwards.
pub fn build_link_graph(
    provider: &mut dyn LinkGraphProvider,
    roots: &[PathBuf],
) -> Result<LinkGraph, Error> {
    let mut graphs = Vec::with_capacity(roots.len());
    for root in roots {
        let graph = provider.build_graph(root)?;
        tracing::debug!("{}: {} libraries", root.display(), graph.nodes().count());
        graphs.push(graph);
    }
    let mut graph = LinkGraph::merge(graphs);
    graph.normalize_canonical_paths();
    Ok(graph)
}
