//! Error types for the lddcollect CLI.

use std::path::PathBuf;

/// Fatal errors: invalid input and package-tool contract violations.
///
/// Missing dependencies and other non-fatal conditions are not errors; they
/// are collected in [`crate::closure::Resolution`].
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// No input paths were given.
    NoInputs,
    /// Input path does not exist or cannot be inspected.
    InputNotFound(PathBuf, std::io::Error),
    /// A directory was given together with other inputs.
    DirectoryWithOtherInputs(PathBuf),
    /// Input file could not be parsed as an ELF object.
    NotElf(PathBuf, String),
    /// The package query tool could not be started.
    PackageQuerySpawn(PathBuf, std::io::Error),
    /// Reading from or waiting on the package query tool failed.
    PackageQueryIo(std::io::Error),
    /// The package query tool printed a line we cannot split into package and path.
    MalformedQueryOutput(String),
}

impl Error {
    /// User-facing hint to accompany the error message.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::NoInputs => Some("pass one or more ELF files, or a single directory"),
            Self::DirectoryWithOtherInputs(_) => {
                Some("directory mode takes exactly one directory and no other paths")
            }
            Self::NotElf(..) => {
                Some("only dynamically linked ELF executables and libraries are supported")
            }
            Self::PackageQuerySpawn(..) => {
                Some("install dpkg, set LDDCOLLECT_DPKG, or run with --no-dpkg")
            }
            _ => None,
        }
    }
}

// Display: lowercase, no trailing punctuation, so it composes into
// larger error messages.
impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoInputs => write!(f, "no input paths given"),
            Self::InputNotFound(path, source) => {
                write!(f, "cannot find input '{}': {source}", path.display())
            }
            Self::DirectoryWithOtherInputs(path) => {
                write!(
                    f,
                    "'{}' is a directory and cannot be combined with other inputs",
                    path.display()
                )
            }
            Self::NotElf(path, reason) => {
                write!(f, "'{}' is not a valid ELF file: {reason}", path.display())
            }
            Self::PackageQuerySpawn(program, source) => {
                write!(f, "cannot run '{}': {source}", program.display())
            }
            Self::PackageQueryIo(source) => write!(f, "package query failed: {source}"),
            Self::MalformedQueryOutput(line) => {
                write!(f, "unexpected output from package query: '{line}'")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InputNotFound(_, e) | Self::PackageQuerySpawn(_, e) | Self::PackageQueryIo(e) => {
                Some(e)
            }
            _ => None,
        }
    }
}
