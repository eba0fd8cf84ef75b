use std::fmt::Write as _;

use serde::Serialize;

use crate::closure::Resolution;

/// Printed between loose files and package names in text output.
pub const SEPARATOR: &str = "------------------------------------------";

/// Loose files one per line, then, when packages were looked up, the
/// separator and package names one per line. Both lists are sorted.
pub fn render_text(result: &Resolution, show_packages: bool) -> String {
    let mut out = String::new();
    for file in &result.files {
        let _ = writeln!(out, "{}", file.display());
    }
    if show_packages {
        let _ = writeln!(out, "{SEPARATOR}");
        for package in &result.packages {
            let _ = writeln!(out, "{package}");
        }
    }
    out
}

pub fn print_text(result: &Resolution, show_packages: bool) {
    print!("{}", render_text(result, show_packages));
}

// JSON output types

#[derive(Serialize)]
struct JsonResolution {
    files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    packages: Option<Vec<String>>,
}

pub fn render_json(result: &Resolution, show_packages: bool) -> String {
    let json = JsonResolution {
        files: result
            .files
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect(),
        packages: show_packages.then(|| result.packages.iter().cloned().collect()),
    };
    // Only strings and lists: serialization cannot fail.
    serde_json::to_string_pretty(&json).unwrap_or_default()
}

pub fn print_json(result: &Resolution, show_packages: bool) {
    println!("{}", render_json(result, show_packages));
}

/// Report missing dependencies on stderr, never on stdout.
pub fn print_missing(result: &Resolution) {
    for name in &result.missing {
        eprintln!("missing: {name}");
    }
    if !result.missing.is_empty() {
        eprintln!(
            "error: {} dependenc{} could not be found",
            result.missing.len(),
            if result.missing.len() == 1 { "y" } else { "ies" }
        );
    }
}
