//! The parts of an ELF object the dynamic linker cares about.

use std::fs;
use std::path::Path;

use goblin::elf::Elf;

/// Opaque ELF parse failure.
///
/// Callers only log it or turn it into [`crate::error::Error::NotElf`], so
/// the cause is kept as a message.
#[derive(Debug, Clone)]
pub struct ElfError(String);

impl ElfError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl std::fmt::Display for ElfError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ElfError {}

/// ABI identity of an object. A library can only satisfy a dependency of an
/// object with the same class, byte order and machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElfClass {
    pub is_64: bool,
    pub little_endian: bool,
    pub machine: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfInfo {
    pub class: ElfClass,
    /// `PT_INTERP`, e.g. `/lib64/ld-linux-x86-64.so.2`.
    pub interpreter: Option<String>,
    pub soname: Option<String>,
    /// `DT_RPATH` entries, split on `:`.
    pub rpath: Vec<String>,
    /// `DT_RUNPATH` entries, split on `:`.
    pub runpath: Vec<String>,
    /// `DT_NEEDED` entries in declaration order.
    pub needed: Vec<String>,
}

impl ElfInfo {
    pub fn parse(path: &Path) -> Result<Self, ElfError> {
        let bytes = fs::read(path).map_err(|e| ElfError::new(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ElfError> {
        let elf = Elf::parse(bytes).map_err(|e| ElfError::new(e.to_string()))?;
        Ok(Self {
            class: ElfClass {
                is_64: elf.is_64,
                little_endian: elf.little_endian,
                machine: elf.header.e_machine,
            },
            interpreter: elf.interpreter.map(str::to_string),
            soname: elf.soname.map(str::to_string),
            rpath: split_paths(&elf.rpaths),
            runpath: split_paths(&elf.runpaths),
            needed: elf.libraries.iter().map(|s| (*s).to_string()).collect(),
        })
    }

    /// Everything the dynamic linker must load for this object: the
    /// interpreter followed by each `DT_NEEDED`, without duplicates.
    pub fn needs(&self) -> Vec<String> {
        let mut needs: Vec<String> = Vec::with_capacity(self.needed.len() + 1);
        for name in self.interpreter.iter().chain(&self.needed) {
            if !name.is_empty() && !needs.contains(name) {
                needs.push(name.clone());
            }
        }
        needs
    }
}

fn split_paths(entries: &[&str]) -> Vec<String> {
    entries
        .iter()
        .flat_map(|e| e.split(':'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
