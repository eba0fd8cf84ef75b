//! Package ownership lookup.
//!
//! The host package database is asked once per run, with every candidate
//! path in a single batch, which file belongs to which installed package.
//! [`PackageIndex`] holds the answer for the rest of the run.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::Error;
use crate::graph::{LibraryNode, LinkGraph};

/// Result of one batched reverse lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOutput {
    /// `(package, path)` pairs reported by the database.
    pub owned: Vec<(String, PathBuf)>,
    /// Inputs the database did not report an owner for.
    pub not_found: Vec<PathBuf>,
}

/// Reverse file index of the host package manager.
pub trait PackageDatabase {
    fn query(&self, paths: &[PathBuf]) -> Result<QueryOutput, Error>;
}

/// `dpkg -S` backed [`PackageDatabase`].
#[derive(Debug, Clone)]
pub struct Dpkg {
    program: PathBuf,
    timeout: Duration,
}

impl Dpkg {
    pub const DEFAULT_PROGRAM: &'static str = "/usr/bin/dpkg";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Program from `LDDCOLLECT_DPKG`, timeout (seconds) from
    /// `LDDCOLLECT_DPKG_TIMEOUT`, each falling back to the default.
    pub fn from_env() -> Self {
        let program = std::env::var_os("LDDCOLLECT_DPKG")
            .filter(|p| !p.is_empty())
            .map_or_else(|| PathBuf::from(Self::DEFAULT_PROGRAM), PathBuf::from);
        let timeout = std::env::var("LDDCOLLECT_DPKG_TIMEOUT")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map_or(Self::DEFAULT_TIMEOUT, Duration::from_secs);
        Self::new(program).with_timeout(timeout)
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the query. Returns `None` if it did not finish in time.
    fn run(&self, paths: &[PathBuf]) -> Result<Option<(bool, String)>, Error> {
        let mut child = Command::new(&self.program)
            .arg("-S")
            // diversion notices are translated; parsing needs the C locale
            .env("LC_ALL", "C")
            .args(paths)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::PackageQuerySpawn(self.program.clone(), e))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait().map_err(Error::PackageQueryIo)? {
                break status;
            }
            if Instant::now() >= deadline {
                // kill fails only if the child already exited
                let _ = child.kill();
                let _ = child.wait();
                // A forked grandchild may still hold the pipes open, so the
                // reader threads are left detached instead of joined.
                return Ok(None);
            }
            thread::sleep(Duration::from_millis(10));
        };

        let out = join_output(stdout)?;
        let err = join_output(stderr)?;
        for line in err.lines().filter(|l| !l.is_empty()) {
            tracing::debug!("{}: {line}", self.program.display());
        }

        Ok(Some((status.success(), out)))
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<io::Result<String>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut p) = pipe {
            p.read_to_end(&mut buf)?;
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

fn join_output(handle: thread::JoinHandle<io::Result<String>>) -> Result<String, Error> {
    handle
        .join()
        .map_err(|_| Error::PackageQueryIo(io::Error::other("output reader panicked")))?
        .map_err(Error::PackageQueryIo)
}

impl PackageDatabase for Dpkg {
    fn query(&self, paths: &[PathBuf]) -> Result<QueryOutput, Error> {
        if paths.is_empty() {
            return Ok(QueryOutput::default());
        }
        tracing::debug!("querying {} for {} paths", self.program.display(), paths.len());
        match self.run(paths)? {
            Some((success, stdout)) => parse_query_output(&stdout, paths, success),
            None => {
                tracing::warn!(
                    "{} did not finish within {}s; treating all libraries as unowned",
                    self.program.display(),
                    self.timeout.as_secs()
                );
                Ok(QueryOutput {
                    owned: Vec::new(),
                    not_found: paths.to_vec(),
                })
            }
        }
    }
}

/// Parse one line of `dpkg -S` output.
///
/// Returns `None` for diversion notices (`diversion by ...`,
/// `local diversion from/to: ...`), which carry no ownership.
pub fn parse_query_line(line: &str) -> Result<Option<(String, PathBuf)>, Error> {
    if line.starts_with("diversion by ") || line.starts_with("local diversion ") {
        return Ok(None);
    }
    let (packages, path) = line
        .split_once(": ")
        .ok_or_else(|| Error::MalformedQueryOutput(line.to_string()))?;
    // "libc6:amd64, libc6:i386: /path" lists every owner; the first wins.
    let package = packages.split(", ").next().unwrap_or(packages).trim();
    if package.is_empty() || path.is_empty() {
        return Err(Error::MalformedQueryOutput(line.to_string()));
    }
    Ok(Some((package.to_string(), PathBuf::from(path))))
}

/// Parse the whole stdout of a query over `inputs`.
///
/// When the tool reported failure, every input without an exact match in
/// the parsed output is listed in `not_found`.
pub fn parse_query_output(
    stdout: &str,
    inputs: &[PathBuf],
    success: bool,
) -> Result<QueryOutput, Error> {
    let mut owned = Vec::new();
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        if let Some(pair) = parse_query_line(line)? {
            owned.push(pair);
        }
    }
    let not_found = if success {
        Vec::new()
    } else {
        inputs
            .iter()
            .filter(|input| !owned.iter().any(|(_, p)| p == *input))
            .cloned()
            .collect()
    };
    Ok(QueryOutput { owned, not_found })
}

/// True if `package` is named by the ignore list, either exactly or by its
/// base name before an `:arch` qualifier.
pub fn is_ignored(package: &str, ignore: &[String]) -> bool {
    let base = package.split_once(':').map_or(package, |(b, _)| b);
    ignore.iter().any(|i| i == package || i == base)
}

/// Paths to look a canonical path up under: the path itself, plus its fully
/// resolved form when a directory alias makes the two differ.
pub fn lookup_keys(canonical: &Path) -> Vec<PathBuf> {
    let mut keys = vec![canonical.to_path_buf()];
    if let Ok(real) = fs::canonicalize(canonical)
        && real != canonical
    {
        keys.push(real);
    }
    keys
}

/// Ownership of every library in one link graph, from a single query.
#[derive(Debug, Default)]
pub struct PackageIndex {
    owners: HashMap<PathBuf, String>,
    ignore: Vec<String>,
    skip_prefix: Option<PathBuf>,
}

impl PackageIndex {
    /// Index that owns nothing. Used when package lookup is disabled.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Query `db` once for every resolved library in `graph`.
    ///
    /// Libraries under `skip_prefix` are left out of the query and are
    /// never reported as owned.
    pub fn build(
        graph: &LinkGraph,
        db: &dyn PackageDatabase,
        ignore: &[String],
        skip_prefix: Option<&Path>,
    ) -> Result<Self, Error> {
        let mut keys: BTreeSet<PathBuf> = BTreeSet::new();
        for node in graph.nodes() {
            let Some(canonical) = node.canonical_path.as_deref() else {
                continue;
            };
            if skip_prefix.is_some_and(|p| canonical.starts_with(p)) {
                continue;
            }
            keys.extend(lookup_keys(canonical));
        }

        let mut owners = HashMap::new();
        if !keys.is_empty() {
            let paths: Vec<PathBuf> = keys.into_iter().collect();
            let result = db.query(&paths)?;
            tracing::debug!(
                "{} paths owned by packages, {} unowned",
                result.owned.len(),
                result.not_found.len()
            );
            for (package, path) in result.owned {
                owners.entry(path).or_insert(package);
            }
        }

        Ok(Self {
            owners,
            ignore: ignore.to_vec(),
            skip_prefix: skip_prefix.map(Path::to_path_buf),
        })
    }

    /// Owning package of `node`, unless it is unowned, ignored, or skipped.
    pub fn owner(&self, node: &LibraryNode) -> Option<&str> {
        let canonical = node.canonical_path.as_deref()?;
        if self.skip_prefix.as_deref().is_some_and(|p| canonical.starts_with(p)) {
            return None;
        }
        let package = lookup_keys(canonical)
            .iter()
            .find_map(|k| self.owners.get(k))?;
        if is_ignored(package, &self.ignore) {
            tracing::debug!("{}: owner {package} is ignored", node.name);
            return None;
        }
        Some(package)
    }
}
