//! Register alias table.
//!
//! Maps architectural registers to physical tags with per-file free lists.
//! Each allocation records the previous mapping so a destination can be
//! either committed (free the superseded tag) or rewound (restore it).
//! Invariant: every architectural tag maps to an allocated physical tag.

use std::collections::VecDeque;

use crate::arch::ArchRegisterFile;
use crate::common::reg::{Register, RegisterFileKind};

struct FileAliasing {
    kind: RegisterFileKind,
    /// Architectural tag -> current physical tag.
    mapping: Vec<u16>,
    /// Physical tag -> physical tag it superseded (valid while allocated).
    history: Vec<u16>,
    /// Physical tag -> architectural tag it was allocated for.
    arch_of: Vec<u16>,
    free: VecDeque<u16>,
    /// Files with no surplus physical registers pass registers through.
    renamed: bool,
}

impl FileAliasing {
    fn new(kind: RegisterFileKind, arch_count: u16, phys_count: u16) -> Self {
        let renamed = phys_count > arch_count;
        let total = phys_count.max(arch_count);
        Self {
            kind,
            mapping: (0..arch_count).collect(),
            history: vec![0; total as usize],
            arch_of: vec![0; total as usize],
            free: (arch_count..total).collect(),
            renamed,
        }
    }
}

/// The register alias table across all register files.
pub struct RegisterAliasTable {
    files: Vec<FileAliasing>,
}

impl RegisterAliasTable {
    /// Creates a RAT for the architecture's files with `phys_counts[kind]`
    /// physical registers per file.
    ///
    /// A file whose physical count does not exceed its architectural count is
    /// left unrenamed (identity mapping, no allocation).
    pub fn new(arch_files: &[ArchRegisterFile], phys_counts: &[u16; RegisterFileKind::COUNT]) -> Self {
        let files = arch_files
            .iter()
            .map(|f| FileAliasing::new(f.kind, f.count, phys_counts[f.kind.index()]))
            .collect();
        Self { files }
    }

    fn file(&self, kind: RegisterFileKind) -> &FileAliasing {
        self.files
            .iter()
            .find(|f| f.kind == kind)
            .expect("register file kind not declared by the architecture")
    }

    fn file_mut(&mut self, kind: RegisterFileKind) -> &mut FileAliasing {
        self.files
            .iter_mut()
            .find(|f| f.kind == kind)
            .expect("register file kind not declared by the architecture")
    }

    /// Physical register quantities per file kind, for sizing the register
    /// file set and scoreboard. Unrenamed files report their architectural
    /// count.
    pub fn physical_counts(&self) -> [u16; RegisterFileKind::COUNT] {
        let mut counts = [0u16; RegisterFileKind::COUNT];
        for file in &self.files {
            counts[file.kind.index()] = file.history.len() as u16;
        }
        counts
    }

    /// Free physical registers available in a file.
    pub fn free_registers(&self, kind: RegisterFileKind) -> usize {
        let file = self.file(kind);
        if file.renamed {
            file.free.len()
        } else {
            usize::MAX // never a rename bottleneck
        }
    }

    /// Current physical mapping for an architectural source register.
    pub fn rename_source(&self, reg: Register) -> Register {
        let file = self.file(reg.file);
        Register::new(reg.file, file.mapping[reg.tag as usize])
    }

    /// Allocates a fresh physical tag for an architectural destination,
    /// recording the superseded mapping for commit/rewind.
    ///
    /// Precondition: `free_registers(reg.file) > 0` for renamed files.
    pub fn allocate(&mut self, reg: Register) -> Register {
        let file = self.file_mut(reg.file);
        if !file.renamed {
            return reg;
        }
        let phys = file
            .free
            .pop_front()
            .expect("allocation attempted with an empty free list");
        file.history[phys as usize] = file.mapping[reg.tag as usize];
        file.arch_of[phys as usize] = reg.tag;
        file.mapping[reg.tag as usize] = phys;
        Register::new(reg.file, phys)
    }

    /// Retires a destination's rename: the superseded tag returns to the
    /// free list.
    pub fn commit(&mut self, phys: Register) {
        let file = self.file_mut(phys.file);
        if !file.renamed {
            return;
        }
        file.free.push_back(file.history[phys.tag as usize]);
    }

    /// Rolls back a destination's rename: the previous mapping is restored
    /// and the allocated tag freed.
    pub fn rewind(&mut self, phys: Register) {
        let file = self.file_mut(phys.file);
        if !file.renamed {
            return;
        }
        let arch = file.arch_of[phys.tag as usize];
        file.mapping[arch as usize] = file.history[phys.tag as usize];
        file.free.push_back(phys.tag);
    }

    /// Restores the reset identity mapping. Used at context switches.
    pub fn reset(&mut self) {
        for file in &mut self.files {
            if !file.renamed {
                continue;
            }
            let arch_count = file.mapping.len() as u16;
            for (arch, slot) in file.mapping.iter_mut().enumerate() {
                *slot = arch as u16;
            }
            file.free = (arch_count..file.history.len() as u16).collect();
        }
    }
}
