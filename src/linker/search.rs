//! Library search directories, in the order the dynamic linker uses them.

use std::fs;
use std::path::{Path, PathBuf};

use crate::symlink;

const LD_SO_CONF: &str = "/etc/ld.so.conf";
/// Guards against `include` cycles in ld.so.conf.
const MAX_INCLUDE_DEPTH: usize = 8;

/// System-wide search directories. Per-object `DT_RPATH`/`DT_RUNPATH` are
/// handled by the walker because they depend on the requesting object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPaths {
    /// `LD_LIBRARY_PATH`.
    pub env: Vec<PathBuf>,
    /// ld.so.conf directories, then the built-in defaults.
    pub system: Vec<PathBuf>,
}

impl SearchPaths {
    /// Read `LD_LIBRARY_PATH` and `/etc/ld.so.conf` of the running host.
    pub fn from_system() -> Self {
        let env = std::env::var("LD_LIBRARY_PATH")
            .map(|v| split_search_path(&v, None))
            .unwrap_or_default();

        let mut system = parse_ld_so_conf(Path::new(LD_SO_CONF));
        for dir in default_dirs() {
            if !system.contains(&dir) {
                system.push(dir);
            }
        }
        tracing::debug!("library search path: env={env:?} system={system:?}");
        Self { env, system }
    }
}

/// Built-in directories searched after ld.so.conf.
fn default_dirs() -> Vec<PathBuf> {
    let triplet = format!("{}-linux-gnu", std::env::consts::ARCH);
    let candidates = [
        PathBuf::from("/lib").join(&triplet),
        PathBuf::from("/usr/lib").join(&triplet),
        PathBuf::from("/lib64"),
        PathBuf::from("/usr/lib64"),
        PathBuf::from("/lib"),
        PathBuf::from("/usr/lib"),
    ];
    candidates.into_iter().filter(|d| d.is_dir()).collect()
}

/// Split a `:`-separated path list, expanding `$ORIGIN` and `${ORIGIN}` to
/// `origin` when given. Empty entries are dropped.
pub fn split_search_path(value: &str, origin: Option<&Path>) -> Vec<PathBuf> {
    value
        .split(':')
        .filter(|s| !s.is_empty())
        .map(|s| expand_origin(s, origin))
        .collect()
}

/// Expand `$ORIGIN`/`${ORIGIN}` in one search path entry and collapse `.`
/// and `..` lexically, so `$ORIGIN/../lib` names `lib` beside `bin`.
pub fn expand_origin(entry: &str, origin: Option<&Path>) -> PathBuf {
    let expanded = match origin {
        Some(origin) => {
            let origin = origin.to_string_lossy();
            entry.replace("${ORIGIN}", &origin).replace("$ORIGIN", &origin)
        }
        None => entry.to_string(),
    };
    symlink::normalize_lexically(Path::new(&expanded))
}

/// Directories listed in an ld.so.conf file, following `include` lines.
/// A missing file yields no directories.
pub fn parse_ld_so_conf(path: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    parse_conf_into(path, 0, &mut dirs);
    dirs
}

fn parse_conf_into(path: &Path, depth: usize, dirs: &mut Vec<PathBuf>) {
    if depth > MAX_INCLUDE_DEPTH {
        tracing::warn!("ld.so.conf includes nested too deeply at {}", path.display());
        return;
    }
    let Ok(content) = fs::read_to_string(path) else {
        tracing::debug!("cannot read {}", path.display());
        return;
    };
    let base = path.parent().unwrap_or(Path::new("/"));

    for raw in content.lines() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() || line.starts_with("hwcap ") {
            continue;
        }
        if let Some(pattern) = line
            .strip_prefix("include")
            .filter(|rest| rest.starts_with(char::is_whitespace))
        {
            for included in expand_include(base, pattern.trim()) {
                parse_conf_into(&included, depth + 1, dirs);
            }
            continue;
        }
        // Entries may be separated by whitespace, commas or colons.
        for entry in line.split(|c: char| c.is_whitespace() || c == ',' || c == ':') {
            if entry.is_empty() {
                continue;
            }
            let dir = PathBuf::from(entry);
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
    }
}

fn expand_include(base: &Path, pattern: &str) -> Vec<PathBuf> {
    let full = if Path::new(pattern).is_absolute() {
        PathBuf::from(pattern)
    } else {
        base.join(pattern)
    };
    let Ok(paths) = glob::glob(&full.to_string_lossy()) else {
        tracing::debug!("invalid include pattern {pattern}");
        return Vec::new();
    };
    let mut matches: Vec<PathBuf> = paths.flatten().collect();
    matches.sort();
    matches
}
