//! Driver operation tests.
//!
//! Breakpoints, TLB and cache maintenance from the host side, the PDC
//! image, I/O dispatch from simulated code, and the optional L2.

use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use segsim_core::config::Config;
use segsim_core::core::arch::RegClass;
use segsim_core::core::units::mem::IoDevice;
use segsim_core::sim::UnitSel;

use crate::common::{load_program, map_identity, sim, sim_with};

// ══════════════════════════════════════════════════════════
// 1. TLB maintenance round-trips
// ══════════════════════════════════════════════════════════

#[test]
fn insert_then_lookup_returns_the_entry() {
    let mut s = sim();
    s.insert_tlb(UnitSel::Data, 2, 0x9000, 0x1234, 0x8000_5000);
    let e = s.lookup_tlb(UnitSel::Data, 2, 0x9000).expect("present");
    assert_eq!(e.a_info, 0x1234);
    assert!(e.valid());
}

#[test]
fn purge_then_lookup_misses() {
    let mut s = sim();
    map_identity(&mut s, UnitSel::Instr, 1, 0x3000);
    assert!(s.purge_tlb(UnitSel::Instr, 1, 0x3000));
    assert_eq!(s.lookup_tlb(UnitSel::Instr, 1, 0x3000), None);
}

#[test]
fn hash_adr_is_exposed_and_stable() {
    let s = sim();
    assert_eq!(s.hash_adr(3, 0x7000), s.hash_adr(3, 0x7000));
    assert_eq!(s.hash_adr(3, 0x7000), s.hash_adr(3, 0x7FFF), "same page");
}

// ══════════════════════════════════════════════════════════
// 2. Cache maintenance
// ══════════════════════════════════════════════════════════

#[test]
fn flush_cache_writes_back_and_is_then_a_nop() {
    let mut s = sim();
    load_program(&mut s, &["STW 0(R2),R1"]);
    s.set_reg(RegClass::Gen, 1, 0x7777_7777);
    s.set_reg(RegClass::Gen, 2, 0x2000);
    s.instr_step(1);

    // The store is sitting dirty in the data cache.
    let before = s.read_abs_mem(0x2000, 4).unwrap();
    assert_eq!(before, vec![0, 0, 0, 0]);

    s.flush_cache(UnitSel::Data, 0, 0x2000);
    let after = s.read_abs_mem(0x2000, 4).unwrap();
    assert_eq!(u32::from_le_bytes([after[0], after[1], after[2], after[3]]), 0x7777_7777);

    // Flushing the now-clean block changes nothing.
    s.write_abs_mem(0x2000, &[9, 9, 9, 9]).unwrap();
    s.flush_cache(UnitSel::Data, 0, 0x2000);
    assert_eq!(s.read_abs_mem(0x2000, 4).unwrap(), vec![9, 9, 9, 9]);
}

#[test]
fn purge_cache_invalidates_by_index_and_set() {
    let mut s = sim();
    load_program(&mut s, &["LDW R1,0(R2)"]);
    s.set_reg(RegClass::Gen, 2, 0x2000);
    s.instr_step(1);

    let index = (0x2000 / s.cpu.dcache.block_size()) % s.cpu.dcache.block_entries();
    let set = s.cpu.dcache.match_tag(index, 0x2000);
    assert!(set < s.cpu.dcache.block_sets(), "block resident after the load");

    s.purge_cache(UnitSel::Data, index, set);
    assert_eq!(
        s.cpu.dcache.match_tag(index, 0x2000),
        segsim_core::core::units::mem::MAX_BLOCK_SETS
    );
}

// ══════════════════════════════════════════════════════════
// 3. Breakpoints
// ══════════════════════════════════════════════════════════

#[test]
fn breakpoint_stops_instruction_stepping() {
    let mut s = sim();
    load_program(&mut s, &["ADD R1,1", "ADD R1,1", "ADD R1,1", "ADD R1,1"]);
    s.set_breakpoint(0, 8);

    s.instr_step(4);

    assert_eq!(s.get_reg(RegClass::Gen, 1), 2, "stopped before the third ADD");
    assert_eq!(s.get_reg(RegClass::FdStage, 2), 8);
}

#[test]
fn breakpoint_list_and_clear() {
    let mut s = sim();
    s.set_breakpoint(0, 8);
    s.set_breakpoint(1, 16);
    s.set_breakpoint(0, 8); // duplicate ignored
    assert_eq!(s.list_breakpoints(), &[(0, 8), (1, 16)]);
    assert!(s.clear_breakpoint(0, 8));
    assert!(!s.clear_breakpoint(0, 8));
    assert_eq!(s.list_breakpoints(), &[(1, 16)]);
}

// ══════════════════════════════════════════════════════════
// 4. PDC ROM and I/O from simulated code
// ══════════════════════════════════════════════════════════

#[test]
fn pdc_image_is_readable_and_immutable() {
    let cfg = Config::default();
    let mut s = sim_with(&cfg);
    let base = cfg.pdc.start_adr;
    s.load_pdc_image(&0xFEED_C0DEu32.to_le_bytes());

    load_program(&mut s, &["LDA R1,0(R2)", "STA 0(R2),R3", "LDA R4,0(R2)"]);
    s.set_reg(RegClass::Gen, 2, base);
    s.set_reg(RegClass::Gen, 3, 0x1111_1111);
    s.instr_step(3);

    assert_eq!(s.get_reg(RegClass::Gen, 1), 0xFEED_C0DE);
    assert_eq!(s.get_reg(RegClass::Gen, 4), 0xFEED_C0DE, "the store had no effect");
}

struct Port(Rc<RefCell<Vec<(u32, u32)>>>);

impl IoDevice for Port {
    fn read(&mut self, ofs: u32, _len: u32) -> u32 {
        0xAB00 | ofs
    }

    fn write(&mut self, ofs: u32, _len: u32, val: u32) {
        self.0.borrow_mut().push((ofs, val));
    }
}

#[test]
fn io_space_dispatches_from_simulated_stores_and_loads() {
    let cfg = Config::default();
    let mut s = sim_with(&cfg);
    let writes = Rc::new(RefCell::new(Vec::new()));
    s.set_io_device(Box::new(Port(Rc::clone(&writes))));

    load_program(&mut s, &["STA 4(R2),R1", "LDA R3,8(R2)"]);
    s.set_reg(RegClass::Gen, 1, 0x99);
    s.set_reg(RegClass::Gen, 2, cfg.io.start_adr);
    s.instr_step(2);

    assert_eq!(*writes.borrow(), vec![(4, 0x99)]);
    assert_eq!(s.get_reg(RegClass::Gen, 3), 0xAB08);
}

// ══════════════════════════════════════════════════════════
// 5. Optional L2
// ══════════════════════════════════════════════════════════

#[test]
fn l2_holds_every_valid_l1_block() {
    let cfg = Config::with_l2();
    let mut s = sim_with(&cfg);
    load_program(&mut s, &["LDW R1,0(R2)", "LDW R3,0(R4)"]);
    s.write_abs_mem(0x2000, &5u32.to_le_bytes()).unwrap();
    s.write_abs_mem(0x4000, &6u32.to_le_bytes()).unwrap();
    s.set_reg(RegClass::Gen, 2, 0x2000);
    s.set_reg(RegClass::Gen, 4, 0x4000);
    s.instr_step(2);

    assert_eq!(s.get_reg(RegClass::Gen, 1), 5);
    assert_eq!(s.get_reg(RegClass::Gen, 3), 6);

    // Inclusion: each block valid in L1 is valid in L2 under the same tag.
    let l2 = s.cpu.l2.as_ref().expect("configured with an L2");
    for paddr in [0x2000u32, 0x4000] {
        let l1_index = (paddr / s.cpu.dcache.block_size()) % s.cpu.dcache.block_entries();
        assert!(s.cpu.dcache.match_tag(l1_index, paddr) < s.cpu.dcache.block_sets());
        let l2_index = (paddr / l2.block_size()) % l2.block_entries();
        assert!(l2.match_tag(l2_index, paddr) < l2.block_sets(), "L2 holds {paddr:#x}");
    }
}

#[test]
fn dual_ported_tlb_serves_both_paths() {
    use segsim_core::config::TlbKind;
    use segsim_core::core::arch::psw;

    let mut cfg = Config::default();
    cfg.tlb_kind = TlbKind::DualPorted;
    let mut s = sim_with(&cfg);

    load_program(&mut s, &["LDW R5,0(R0)"]);
    s.write_abs_mem(0x1000, &0x1234u32.to_le_bytes()).unwrap();
    // One insert in the shared TLB covers the data-side lookup.
    map_identity(&mut s, UnitSel::Instr, 0, 0x1000);
    s.cpu.set_status_bit(psw::ST_DATA_XLATE, true);
    s.set_reg(RegClass::Gen, 0, 0x1000);

    s.instr_step(1);
    assert_eq!(s.get_reg(RegClass::Gen, 5), 0x1234);
}
