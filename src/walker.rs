//! ELF-backed link graph provider and shared-library discovery.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use rayon::prelude::*;

use crate::error::Error;
use crate::graph::{LibraryNode, LinkGraph};
use crate::linker::LinkGraphProvider;
use crate::linker::elf::{ElfClass, ElfInfo};
use crate::linker::search::{SearchPaths, split_search_path};
use crate::symlink;

/// Where to look for the dependencies of one object.
#[derive(Debug, Clone)]
struct Scope {
    class: ElfClass,
    /// Own `DT_RPATH` followed by the loaders' (empty if `DT_RUNPATH` is set).
    rpath: Vec<PathBuf>,
    runpath: Vec<PathBuf>,
}

impl Scope {
    fn for_object(info: &ElfInfo, origin: &Path, inherited_rpath: &[PathBuf]) -> Self {
        let runpath: Vec<PathBuf> = info
            .runpath
            .iter()
            .flat_map(|r| split_search_path(r, Some(origin)))
            .collect();
        // DT_RUNPATH disables DT_RPATH, including the one inherited from loaders.
        let rpath = if runpath.is_empty() {
            info.rpath
                .iter()
                .flat_map(|r| split_search_path(r, Some(origin)))
                .chain(inherited_rpath.iter().cloned())
                .collect()
        } else {
            Vec::new()
        };
        Self {
            class: info.class,
            rpath,
            runpath,
        }
    }
}

/// A library resolved once and reused for every later request by name.
#[derive(Debug, Clone)]
struct CachedLib {
    node: LibraryNode,
    /// None when the library was not found.
    scope: Option<Scope>,
}

/// [`LinkGraphProvider`] that reads ELF files from disk and searches for
/// dependencies the way the dynamic linker does.
///
/// The library cache is shared across [`build_graph`](LinkGraphProvider::build_graph)
/// calls; the first resolution of a name wins.
#[derive(Debug)]
pub struct ElfWalker {
    search: SearchPaths,
    cache: HashMap<String, CachedLib>,
}

impl ElfWalker {
    pub fn new(search: SearchPaths) -> Self {
        Self {
            search,
            cache: HashMap::new(),
        }
    }

    pub fn from_system() -> Self {
        Self::new(SearchPaths::from_system())
    }

    /// Number of distinct library names resolved so far.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn lookup(&mut self, name: &str, requester: &Scope) -> CachedLib {
        if let Some(hit) = self.cache.get(name) {
            return hit.clone();
        }
        let lib = match self.locate(name, requester) {
            Some((path, info)) => {
                let chain = symlink::resolve_chain(&path);
                let canonical = chain.last().cloned().unwrap_or_else(|| path.clone());
                let origin = origin_of(&canonical);
                let scope = Scope::for_object(&info, &origin, &requester.rpath);
                match info.soname.as_deref() {
                    Some(soname) if soname != name => {
                        tracing::debug!("{name} => {} (soname {soname})", path.display());
                    }
                    _ => tracing::debug!("{name} => {}", path.display()),
                }
                CachedLib {
                    node: LibraryNode::new(name, path, canonical, info.needs()),
                    scope: Some(scope),
                }
            }
            None => {
                tracing::debug!("{name} => not found");
                CachedLib {
                    node: LibraryNode::missing(name),
                    scope: None,
                }
            }
        };
        self.cache.insert(name.to_string(), lib.clone());
        lib
    }

    /// Find the file the dynamic linker would load for `name`.
    fn locate(&self, name: &str, requester: &Scope) -> Option<(PathBuf, ElfInfo)> {
        if name.contains('/') {
            let path = PathBuf::from(name);
            return compatible(&path, requester.class).map(|info| (path, info));
        }
        requester
            .rpath
            .iter()
            .chain(&self.search.env)
            .chain(&requester.runpath)
            .chain(&self.search.system)
            .find_map(|dir| {
                let candidate = dir.join(name);
                compatible(&candidate, requester.class).map(|info| (candidate, info))
            })
    }
}

impl LinkGraphProvider for ElfWalker {
    fn build_graph(&mut self, path: &Path) -> Result<LinkGraph, Error> {
        let info = ElfInfo::parse(path)
            .map_err(|e| Error::NotElf(path.to_path_buf(), e.to_string()))?;
        let chain = symlink::resolve_chain(path);
        let canonical = chain.last().cloned().unwrap_or_else(|| path.to_path_buf());
        let root_scope = Scope::for_object(&info, &origin_of(&canonical), &[]);
        let root_name = path.to_string_lossy().into_owned();

        let mut graph = LinkGraph::new(LibraryNode::new(
            root_name.clone(),
            path.to_path_buf(),
            canonical,
            info.needs(),
        ));
        let mut scopes: HashMap<String, Scope> = HashMap::new();
        scopes.insert(root_name.clone(), root_scope);

        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(root_name);

        while let Some(name) = queue.pop_front() {
            let (Some(node), Some(scope)) = (graph.get(&name), scopes.get(&name)) else {
                continue;
            };
            let needs = node.needs.clone();
            let scope = scope.clone();
            for need in needs {
                if graph.contains(&need) {
                    continue;
                }
                let lib = self.lookup(&need, &scope);
                if let Some(s) = lib.scope {
                    scopes.insert(need.clone(), s);
                }
                graph.insert(lib.node);
                queue.push_back(need);
            }
        }

        Ok(graph)
    }
}

/// Parse `path` and accept it only if it matches the requester's ABI.
fn compatible(path: &Path, class: ElfClass) -> Option<ElfInfo> {
    if !path.is_file() {
        return None;
    }
    match ElfInfo::parse(path) {
        Ok(info) if info.class == class => Some(info),
        Ok(_) => {
            tracing::debug!("skipping {}: incompatible ELF class", path.display());
            None
        }
        Err(e) => {
            tracing::debug!("skipping {}: {e}", path.display());
            None
        }
    }
}

fn origin_of(path: &Path) -> PathBuf {
    path.parent().unwrap_or(Path::new("/")).to_path_buf()
}

/// File names the linker conventions use for shared objects:
/// `libfoo.so`, `libfoo.so.1`, `libfoo.so.1.2.3`.
pub fn looks_like_shared_object(name: &str) -> bool {
    name.ends_with(".so") || name.contains(".so.")
}

/// Find every shared library under `dir`.
///
/// Candidates are chosen by file name and then confirmed by parsing them as
/// ELF in parallel. Ignore files and hidden-ness are not honored: every
/// file under `dir` is a candidate. The result is sorted.
pub fn discover_libraries(dir: &Path) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(dir).standard_filters(false).build();

    let mut candidates = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("{e}");
                continue;
            }
        };
        let path = entry.into_path();
        let named_like_lib = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(looks_like_shared_object);
        if named_like_lib && path.is_file() {
            candidates.push(path);
        }
    }

    let mut libs: Vec<PathBuf> = candidates
        .into_par_iter()
        .filter(|path| match ElfInfo::parse(path) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("ignoring {}: {e}", path.display());
                false
            }
        })
        .collect();
    libs.sort();
    tracing::debug!("found {} shared libraries under {}", libs.len(), dir.display());
    libs
}
