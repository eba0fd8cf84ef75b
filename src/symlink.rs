//! Symlink chains from a library's linker-visible path to its real file.
//!
//! Shipping a library means shipping every link on the way to it: the
//! loader opens `libfoo.so.1`, not `libfoo.so.1.2.3`.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::graph::LibraryNode;

/// Matches the kernel's limit on nested symlinks during path lookup.
const MAX_HOPS: usize = 40;

/// Walk the symlink chain starting at `path`.
///
/// Returns every path visited in order: each symlink encountered, followed
/// by the final non-symlink path. A path that is not a symlink yields a
/// one-element chain. Relative link targets are resolved against the
/// directory containing the link. Only the final component is followed;
/// symlinked parent directories are left as they are.
pub fn resolve_chain(path: &Path) -> Vec<PathBuf> {
    let mut chain = Vec::new();
    let mut current = path.to_path_buf();

    loop {
        let is_link = fs::symlink_metadata(&current).is_ok_and(|m| m.file_type().is_symlink());
        if !is_link {
            break;
        }
        if chain.len() >= MAX_HOPS {
            tracing::warn!("too many levels of symbolic links at {}", path.display());
            break;
        }
        let target = match fs::read_link(&current) {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!("cannot read link {}: {e}", current.display());
                break;
            }
        };
        let next = link_target(&current, target);
        chain.push(current);
        current = next;
    }

    chain.push(current);
    chain
}

/// Path a link named `link` points at.
///
/// A `..` steps out of the directory it is applied to after that directory
/// is resolved, the way the kernel walks it: through an aliased directory
/// `..` leaves the real directory, not the alias.
fn link_target(link: &Path, target: PathBuf) -> PathBuf {
    let joined = if target.is_absolute() {
        target
    } else {
        link.parent().unwrap_or(Path::new("/")).join(target)
    };
    if !joined.components().any(|c| c == Component::ParentDir) {
        return normalize_lexically(&joined);
    }

    let mut out = PathBuf::new();
    for comp in joined.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if let Ok(real) = fs::canonicalize(&out) {
                    out = real;
                }
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Symlink chain for a graph node. Unresolved nodes have an empty chain.
pub fn chain_for(node: &LibraryNode) -> Vec<PathBuf> {
    node.path.as_deref().map(resolve_chain).unwrap_or_default()
}

/// Compare the walked chain against the canonical path the provider reported.
///
/// Returns a warning message when they disagree. A mismatch that is only a
/// directory alias (both resolve to the same real file) is not reported.
pub fn check_chain(node: &LibraryNode, chain: &[PathBuf]) -> Option<String> {
    let (Some(expected), Some(end)) = (node.canonical_path.as_deref(), chain.last()) else {
        return None;
    };
    if end == expected {
        return None;
    }
    if let (Ok(a), Ok(b)) = (fs::canonicalize(end), fs::canonicalize(expected))
        && a == b
    {
        tracing::debug!(
            "{}: chain ends at {}, provider reports alias {}",
            node.name,
            end.display(),
            expected.display()
        );
        return None;
    }
    Some(format!(
        "{}: symlink chain ends at '{}' but canonical path is '{}'",
        node.name,
        end.display(),
        expected.display()
    ))
}

/// Collapse `.` and `..` components without touching the filesystem.
/// `..` at the root stays at the root.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(comp),
            },
            other => out.push(other),
        }
    }
    out
}
