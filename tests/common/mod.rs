#![allow(dead_code)]

use std::path::{Path, PathBuf};

const EHDR_SIZE: usize = 64;
const PHDR_SIZE: usize = 56;
const DYN_SIZE: usize = 16;

const PT_LOAD: u32 = 1;
const PT_DYNAMIC: u32 = 2;
const DT_NULL: u64 = 0;
const DT_NEEDED: u64 = 1;
const DT_STRTAB: u64 = 5;
const DT_STRSZ: u64 = 10;
const DT_RPATH: u64 = 15;
const DT_RUNPATH: u64 = 29;

/// What to put in the dynamic section of a fixture object.
#[derive(Default)]
pub struct ElfLayout<'a> {
    pub needed: &'a [&'a str],
    pub runpath: Option<&'a str>,
    pub rpath: Option<&'a str>,
}

/// Assemble a minimal little-endian ELF64 x86-64 shared object.
///
/// Layout: header, one `PT_LOAD` covering the whole file at vaddr 0 (so
/// addresses equal file offsets), one `PT_DYNAMIC`, the dynamic entries,
/// then the string table. No sections, no symbols.
pub fn elf_bytes(layout: &ElfLayout<'_>) -> Vec<u8> {
    let mut strtab = vec![0u8];
    let mut dyns: Vec<(u64, u64)> = Vec::new();
    let mut add_str = |tag: u64, s: &str, dyns: &mut Vec<(u64, u64)>| {
        dyns.push((tag, strtab.len() as u64));
        strtab.extend_from_slice(s.as_bytes());
        strtab.push(0);
    };
    for name in layout.needed {
        add_str(DT_NEEDED, name, &mut dyns);
    }
    if let Some(rp) = layout.rpath {
        add_str(DT_RPATH, rp, &mut dyns);
    }
    if let Some(rp) = layout.runpath {
        add_str(DT_RUNPATH, rp, &mut dyns);
    }

    let dyn_off = EHDR_SIZE + 2 * PHDR_SIZE;
    let dyn_count = dyns.len() + 3;
    let str_off = dyn_off + dyn_count * DYN_SIZE;
    dyns.push((DT_STRTAB, str_off as u64));
    dyns.push((DT_STRSZ, strtab.len() as u64));
    dyns.push((DT_NULL, 0));
    let total = (str_off + strtab.len()) as u64;

    let mut b: Vec<u8> = Vec::with_capacity(total as usize);
    // e_ident: magic, ELFCLASS64, ELFDATA2LSB, EV_CURRENT, SYSV ABI, padding
    b.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
    b.extend_from_slice(&[0u8; 8]);
    b.extend_from_slice(&3u16.to_le_bytes()); // ET_DYN
    b.extend_from_slice(&62u16.to_le_bytes()); // EM_X86_64
    b.extend_from_slice(&1u32.to_le_bytes()); // e_version
    b.extend_from_slice(&0u64.to_le_bytes()); // e_entry
    b.extend_from_slice(&(EHDR_SIZE as u64).to_le_bytes()); // e_phoff
    b.extend_from_slice(&0u64.to_le_bytes()); // e_shoff
    b.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    b.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
    b.extend_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
    b.extend_from_slice(&2u16.to_le_bytes()); // e_phnum
    b.extend_from_slice(&64u16.to_le_bytes()); // e_shentsize
    b.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
    b.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx

    push_phdr(&mut b, PT_LOAD, 4, 0, total, 0x1000);
    push_phdr(&mut b, PT_DYNAMIC, 6, dyn_off as u64, (dyn_count * DYN_SIZE) as u64, 8);

    for (tag, val) in dyns {
        b.extend_from_slice(&tag.to_le_bytes());
        b.extend_from_slice(&val.to_le_bytes());
    }
    b.extend_from_slice(&strtab);
    assert_eq!(b.len() as u64, total);
    b
}

fn push_phdr(b: &mut Vec<u8>, p_type: u32, flags: u32, offset: u64, size: u64, align: u64) {
    b.extend_from_slice(&p_type.to_le_bytes());
    b.extend_from_slice(&flags.to_le_bytes());
    b.extend_from_slice(&offset.to_le_bytes()); // p_offset
    b.extend_from_slice(&offset.to_le_bytes()); // p_vaddr
    b.extend_from_slice(&offset.to_le_bytes()); // p_paddr
    b.extend_from_slice(&size.to_le_bytes()); // p_filesz
    b.extend_from_slice(&size.to_le_bytes()); // p_memsz
    b.extend_from_slice(&align.to_le_bytes());
}

pub fn write_elf(path: &Path, layout: &ElfLayout<'_>) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, elf_bytes(layout)).unwrap();
}

/// A self-contained binary distribution for integration tests.
///
/// Structure:
///   bin/app                       -> needs libfoo.so.1, RUNPATH $ORIGIN/../lib
///   lib/libfoo.so.1               -> symlink to libfoo.so.1.2.3
///   lib/libfoo.so.1.2.3           -> needs libbase-lddcollect.so
///   lib/libbase-lddcollect.so     -> no dependencies
///   bin/broken                    -> needs libbar.so.9 (nowhere on disk)
///
/// Properties:
///   - Full closure of app: app, both libfoo names, libbase
///   - libfoo resolves through a symlink chain of length 2
///   - libbase is only reachable through libfoo
pub struct TestDist {
    pub dir: tempfile::TempDir,
    pub root: PathBuf,
}

impl TestDist {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();

        write_elf(
            &root.join("bin/app"),
            &ElfLayout {
                needed: &["libfoo.so.1"],
                runpath: Some("$ORIGIN/../lib"),
                ..ElfLayout::default()
            },
        );
        write_elf(
            &root.join("lib/libfoo.so.1.2.3"),
            &ElfLayout {
                needed: &["libbase-lddcollect.so"],
                runpath: Some("$ORIGIN"),
                ..ElfLayout::default()
            },
        );
        std::os::unix::fs::symlink("libfoo.so.1.2.3", root.join("lib/libfoo.so.1")).unwrap();
        write_elf(&root.join("lib/libbase-lddcollect.so"), &ElfLayout::default());
        write_elf(
            &root.join("bin/broken"),
            &ElfLayout {
                needed: &["libbar.so.9"],
                ..ElfLayout::default()
            },
        );

        Self { dir, root }
    }

    pub fn app(&self) -> PathBuf {
        self.root.join("bin/app")
    }

    pub fn broken(&self) -> PathBuf {
        self.root.join("bin/broken")
    }

    pub fn lib(&self, name: &str) -> PathBuf {
        self.root.join("lib").join(name)
    }

    /// Write an executable shell script standing in for `dpkg -S`.
    /// Every queried path containing `pattern` is owned by `package`;
    /// any other path makes the script exit 1 like dpkg does.
    pub fn fake_dpkg(&self, pattern: &str, package: &str) -> PathBuf {
        self.fake_dpkg_owning(&[(pattern, package)])
    }

    /// Like [`fake_dpkg`](Self::fake_dpkg) with several owners; the first
    /// matching pattern wins.
    pub fn fake_dpkg_owning(&self, owners: &[(&str, &str)]) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = self.root.join("fake-dpkg");
        let arms: String = owners
            .iter()
            .map(|(pattern, package)| format!("    *{pattern}*) echo \"{package}: $p\" ;;\n"))
            .collect();
        let body = format!(
            concat!(
                "#!/bin/sh\nshift\nstatus=0\n",
                "for p in \"$@\"; do\n  case \"$p\" in\n{arms}",
                "    *) echo \"dpkg-query: no path found matching pattern $p\" >&2; status=1 ;;\n",
                "  esac\ndone\nexit $status\n",
            ),
            arms = arms
        );
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}
