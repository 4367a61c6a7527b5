//! Configuration for the simulator core.
//!
//! This module defines the configuration tree used to construct a CPU. It
//! provides:
//! 1. **Defaults:** baseline geometry constants for the small reference machine.
//! 2. **Structures:** hierarchical config for TLBs, memory layers, and the core.
//! 3. **Enums:** TLB and memory-layer kinds and access disciplines.
//!
//! Configuration is supplied as JSON (`serde_json`) by an embedding driver or
//! via `Config::default()` for tests and tools.

use serde::Deserialize;

/// Default configuration constants.
///
/// These describe the small reference machine used when nothing is
/// overridden: split 4-entry-set TLBs, split direct-mapped L1 caches, no L2,
/// and one megabyte of physical memory.
pub mod defaults {
    /// Entries per TLB.
    pub const TLB_ENTRIES: u32 = 64;

    /// TLB insert latency in clocks.
    pub const TLB_LATENCY: u32 = 1;

    /// Block entries per L1 cache.
    pub const L1_BLOCK_ENTRIES: u32 = 256;

    /// L1 block size in bytes.
    pub const L1_BLOCK_SIZE: u32 = 16;

    /// L1 associativity.
    pub const L1_BLOCK_SETS: u32 = 2;

    /// L1 miss-path latency in clocks.
    pub const L1_LATENCY: u32 = 1;

    /// L2 block entries (when an L2 is configured).
    pub const L2_BLOCK_ENTRIES: u32 = 1024;

    /// L2 block size in bytes.
    pub const L2_BLOCK_SIZE: u32 = 32;

    /// L2 associativity.
    pub const L2_BLOCK_SETS: u32 = 4;

    /// L2 latency in clocks.
    pub const L2_LATENCY: u32 = 4;

    /// Physical memory size in bytes (1 MiB).
    pub const PHYS_MEM_SIZE: u32 = 0x10_0000;

    /// Physical memory latency in clocks.
    pub const PHYS_MEM_LATENCY: u32 = 10;

    /// Start of the PDC ROM address range.
    pub const PDC_START_ADR: u32 = 0xF000_0000;

    /// PDC ROM size in bytes (64 KiB).
    pub const PDC_SIZE: u32 = 0x1_0000;

    /// PDC access latency in clocks.
    pub const PDC_LATENCY: u32 = 2;

    /// Start of the memory-mapped I/O range.
    pub const IO_START_ADR: u32 = 0xFF00_0000;

    /// I/O range size in bytes.
    pub const IO_SIZE: u32 = 0x10_0000;

    /// I/O access latency in clocks.
    pub const IO_LATENCY: u32 = 4;

    /// Arbitration priority of the instruction cache (higher value wins).
    pub const ICACHE_PRIORITY: u32 = 2;

    /// Arbitration priority of the data cache.
    pub const DCACHE_PRIORITY: u32 = 1;

    /// Seed for the L1 victim-set selector.
    pub const VICTIM_SEED: u32 = 0x5EED_CAFE;
}

/// TLB organisation options.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TlbKind {
    /// Separate instruction and data TLBs.
    #[default]
    Split,
    /// One dual-ported TLB serving both paths.
    DualPorted,
}

/// TLB indexing disciplines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TlbAccess {
    /// Hash of (segment, page) selects a single candidate entry.
    #[default]
    DirectMapped,
    /// Linear scan of all entries.
    FullyAssociative,
}

/// Memory-layer kinds, top of the hierarchy first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemKind {
    /// L1 instruction cache, virtually indexed, physically tagged.
    L1Instr,
    /// L1 data cache, virtually indexed, physically tagged.
    L1Data,
    /// Unified L2 cache, physically indexed and tagged.
    L2Unified,
    /// Physical memory.
    PhysMem,
    /// Processor-dependent-code ROM.
    PdcMem,
    /// Memory-mapped I/O range.
    IoMem,
}

/// Memory-layer indexing disciplines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemAccess {
    /// Address bits index the data array directly (memories).
    #[default]
    DirectIndexed,
    /// Address bits select a block whose tag must match (caches).
    DirectMapped,
}

/// Geometry and timing of one memory layer.
#[derive(Clone, Debug, Deserialize)]
pub struct MemLayerConfig {
    /// What this layer is.
    pub kind: MemKind,
    /// How it is indexed.
    #[serde(default)]
    pub access: MemAccess,
    /// Number of blocks per set.
    pub block_entries: u32,
    /// Block size in bytes (16, 32, or 64; rounded up to a power of two).
    pub block_size: u32,
    /// Associativity (rounded up to a power of two).
    #[serde(default = "one")]
    pub block_sets: u32,
    /// First byte address covered by this layer.
    #[serde(default)]
    pub start_adr: u32,
    /// Clocks per operation.
    pub latency: u32,
    /// Arbitration weight; the numerically higher value wins.
    #[serde(default)]
    pub priority: u32,
}

fn one() -> u32 {
    1
}

/// Geometry and timing of one TLB.
#[derive(Clone, Debug, Deserialize)]
pub struct TlbConfig {
    /// Indexing discipline.
    #[serde(default)]
    pub access: TlbAccess,
    /// Entry count (rounded up to a power of two).
    pub entries: u32,
    /// Insert latency in clocks.
    pub latency: u32,
}

/// Top-level configuration for a CPU core.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// TLB organisation.
    #[serde(default)]
    pub tlb_kind: TlbKind,
    /// Instruction TLB (also the unified TLB in dual-ported mode).
    pub itlb: TlbConfig,
    /// Data TLB (ignored in dual-ported mode).
    pub dtlb: TlbConfig,
    /// L1 instruction cache.
    pub icache: MemLayerConfig,
    /// L1 data cache.
    pub dcache: MemLayerConfig,
    /// Optional unified L2 cache.
    pub l2: Option<MemLayerConfig>,
    /// Physical memory.
    pub mem: MemLayerConfig,
    /// PDC ROM range.
    pub pdc: MemLayerConfig,
    /// Memory-mapped I/O range.
    pub io: MemLayerConfig,
    /// Seed for the L1 victim-set selector; part of the reset inputs so runs
    /// reproduce exactly.
    #[serde(default = "default_seed")]
    pub victim_seed: u32,
}

fn default_seed() -> u32 {
    defaults::VICTIM_SEED
}

impl Default for Config {
    fn default() -> Self {
        use defaults as d;
        Self {
            tlb_kind: TlbKind::Split,
            itlb: TlbConfig {
                access: TlbAccess::DirectMapped,
                entries: d::TLB_ENTRIES,
                latency: d::TLB_LATENCY,
            },
            dtlb: TlbConfig {
                access: TlbAccess::DirectMapped,
                entries: d::TLB_ENTRIES,
                latency: d::TLB_LATENCY,
            },
            icache: MemLayerConfig {
                kind: MemKind::L1Instr,
                access: MemAccess::DirectMapped,
                block_entries: d::L1_BLOCK_ENTRIES,
                block_size: d::L1_BLOCK_SIZE,
                block_sets: d::L1_BLOCK_SETS,
                start_adr: 0,
                latency: d::L1_LATENCY,
                priority: d::ICACHE_PRIORITY,
            },
            dcache: MemLayerConfig {
                kind: MemKind::L1Data,
                access: MemAccess::DirectMapped,
                block_entries: d::L1_BLOCK_ENTRIES,
                block_size: d::L1_BLOCK_SIZE,
                block_sets: d::L1_BLOCK_SETS,
                start_adr: 0,
                latency: d::L1_LATENCY,
                priority: d::DCACHE_PRIORITY,
            },
            l2: None,
            mem: MemLayerConfig {
                kind: MemKind::PhysMem,
                access: MemAccess::DirectIndexed,
                block_entries: d::PHYS_MEM_SIZE / 64,
                block_size: 64,
                block_sets: 1,
                start_adr: 0,
                latency: d::PHYS_MEM_LATENCY,
                priority: 0,
            },
            pdc: MemLayerConfig {
                kind: MemKind::PdcMem,
                access: MemAccess::DirectIndexed,
                block_entries: d::PDC_SIZE / 64,
                block_size: 64,
                block_sets: 1,
                start_adr: d::PDC_START_ADR,
                latency: d::PDC_LATENCY,
                priority: 0,
            },
            io: MemLayerConfig {
                kind: MemKind::IoMem,
                access: MemAccess::DirectIndexed,
                block_entries: d::IO_SIZE / 64,
                block_size: 64,
                block_sets: 1,
                start_adr: d::IO_START_ADR,
                latency: d::IO_LATENCY,
                priority: 0,
            },
            victim_seed: d::VICTIM_SEED,
        }
    }
}

impl Config {
    /// Parses a configuration from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error for malformed input.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// A configuration with a unified L2 between the L1s and memory.
    pub fn with_l2() -> Self {
        use defaults as d;
        let mut cfg = Self::default();
        cfg.l2 = Some(MemLayerConfig {
            kind: MemKind::L2Unified,
            access: MemAccess::DirectMapped,
            block_entries: d::L2_BLOCK_ENTRIES,
            block_size: d::L2_BLOCK_SIZE,
            block_sets: d::L2_BLOCK_SETS,
            start_adr: 0,
            latency: d::L2_LATENCY,
            priority: 0,
        });
        cfg
    }
}
