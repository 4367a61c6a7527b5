//! Shared test fixtures.

use segsim_core::Simulator;
use segsim_core::config::Config;
use segsim_core::core::units::tlb::{PageType, make_a_info, make_p_info};
use segsim_core::sim::UnitSel;

/// A fresh simulator over the default machine.
pub fn sim() -> Simulator {
    Simulator::with_defaults()
}

/// A fresh simulator over a custom configuration.
pub fn sim_with(cfg: &Config) -> Simulator {
    Simulator::new(cfg)
}

/// Assembles `lines` and writes them as the program starting at physical 0.
pub fn load_program(sim: &mut Simulator, lines: &[&str]) {
    for (i, line) in lines.iter().enumerate() {
        let word = sim
            .assemble_line(line)
            .unwrap_or_else(|e| panic!("{}", e.render(line)));
        sim.write_abs_mem((i * 4) as u32, &word.to_le_bytes()).unwrap();
    }
}

/// Primes a TLB with an identity mapping for the page containing `ofs`,
/// readable and writable from user mode.
pub fn map_identity(sim: &mut Simulator, which: UnitSel, seg: u32, ofs: u32) {
    let p_info = make_p_info(ofs >> 12, PageType::ReadWrite, false);
    let a_info = make_a_info(0, 3, 3);
    sim.insert_tlb(which, seg, ofs, a_info, p_info);
}
