//! Hardware units below the pipeline: TLBs, the memory hierarchy, and the
//! seeded victim selector.

/// The layered memory model (L1, L2, physical, PDC, I/O).
pub mod mem;
/// Seeded pseudo-random victim selection.
pub mod rng;
/// Translation lookaside buffers.
pub mod tlb;
