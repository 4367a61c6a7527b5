//! TLB tests.
//!
//! Covers lookup and miss counting, the two-phase insert state machine,
//! aborting a partial insert, purging, uniqueness, and the hash function.

use segsim_core::config::{TlbAccess, TlbConfig};
use segsim_core::core::units::tlb::{PageType, Tlb, make_a_info, make_p_info};

fn tlb(access: TlbAccess) -> Tlb {
    Tlb::new(&TlbConfig {
        access,
        entries: 16,
        latency: 1,
    })
}

/// Drives the insert state machine until the operation completes.
fn drive<F: FnMut(&mut Tlb) -> bool>(t: &mut Tlb, mut op: F) {
    for _ in 0..16 {
        t.tick();
        if op(t) {
            return;
        }
        t.process();
    }
    panic!("TLB insert did not complete");
}

// ══════════════════════════════════════════════════════════
// 1. Lookup basics
// ══════════════════════════════════════════════════════════

#[test]
fn lookup_misses_on_empty() {
    let mut t = tlb(TlbAccess::DirectMapped);
    assert_eq!(t.lookup(1, 0x4000), None);
    assert_eq!(t.stats().access, 1);
    assert_eq!(t.stats().miss, 1);
}

#[test]
fn insert_data_then_lookup_hits() {
    let mut t = tlb(TlbAccess::DirectMapped);
    let p = make_p_info(0x123, PageType::ReadWrite, false);
    let a = make_a_info(7, 3, 0);
    t.insert_data(2, 0x5000, a, p);

    let e = t.lookup(2, 0x5000).expect("hit after insert");
    assert_eq!(e.phys_page(), 0x123);
    assert_eq!(e.protect_id(), 7);
    assert_eq!(e.priv_l1(), 3);
    assert!(e.valid());
    assert!(!e.uncacheable());
}

#[test]
fn lookup_within_same_page_hits() {
    let mut t = tlb(TlbAccess::DirectMapped);
    t.insert_data(0, 0x3000, 0, make_p_info(3, PageType::Execute, false));
    assert!(t.lookup(0, 0x3FFC).is_some(), "same 4K page");
    assert!(t.lookup(0, 0x4000).is_none(), "next page");
}

// ══════════════════════════════════════════════════════════
// 2. Two-phase insert
// ══════════════════════════════════════════════════════════

#[test]
fn entry_invalid_between_the_phases() {
    let mut t = tlb(TlbAccess::DirectMapped);
    let p = make_p_info(0x44, PageType::ReadWrite, false);

    drive(&mut t, |t| t.insert_adr(1, 0x2000, p));
    assert_eq!(t.lookup(1, 0x2000), None, "address phase alone is invalid");

    drive(&mut t, |t| t.insert_prot(1, 0x2000, make_a_info(9, 1, 1)));
    let e = t.lookup(1, 0x2000).expect("valid after both phases");
    assert_eq!(e.phys_page(), 0x44);
    assert_eq!(e.protect_id(), 9);
}

#[test]
fn abort_restores_idle_with_no_entry() {
    let mut t = tlb(TlbAccess::DirectMapped);
    let claimed = t.insert_adr(1, 0x2000, 0xAAAA);
    assert!(!claimed, "insert takes latency");
    t.abort_op();
    assert_eq!(t.lookup(1, 0x2000), None);

    // The machine accepts a fresh insert immediately after the abort.
    drive(&mut t, |t| t.insert_adr(1, 0x2000, 0x1));
    drive(&mut t, |t| t.insert_prot(1, 0x2000, 0x2));
    assert!(t.lookup(1, 0x2000).is_some());
}

#[test]
fn insert_wait_cycles_are_counted() {
    let mut t = tlb(TlbAccess::DirectMapped);
    drive(&mut t, |t| t.insert_adr(0, 0, 0));
    assert!(t.stats().wait_cycles >= 1);
}

// ══════════════════════════════════════════════════════════
// 3. Purge and uniqueness
// ══════════════════════════════════════════════════════════

#[test]
fn purge_removes_the_entry() {
    let mut t = tlb(TlbAccess::DirectMapped);
    t.insert_data(3, 0x7000, 0, make_p_info(7, PageType::ReadWrite, false));
    assert!(t.purge(3, 0x7000));
    assert_eq!(t.lookup(3, 0x7000), None);
    assert_eq!(t.stats().deletes, 1);
}

#[test]
fn purge_of_absent_entry_reports_false() {
    let mut t = tlb(TlbAccess::DirectMapped);
    assert!(!t.purge(3, 0x7000));
}

#[test]
fn reinsert_replaces_rather_than_duplicates() {
    // At most one entry may be valid for a virtual page.
    for access in [TlbAccess::DirectMapped, TlbAccess::FullyAssociative] {
        let mut t = tlb(access);
        t.insert_data(1, 0x8000, 0, make_p_info(0x10, PageType::ReadWrite, false));
        t.insert_data(1, 0x8000, 0, make_p_info(0x20, PageType::ReadWrite, false));
        let e = t.lookup(1, 0x8000).expect("entry present");
        assert_eq!(e.phys_page(), 0x20);
        assert!(t.purge(1, 0x8000));
        assert_eq!(t.lookup(1, 0x8000), None, "purge eliminates the mapping");
    }
}

// ══════════════════════════════════════════════════════════
// 4. Indexing
// ══════════════════════════════════════════════════════════

#[test]
fn hash_is_stable_and_in_range() {
    let t = tlb(TlbAccess::DirectMapped);
    for (seg, ofs) in [(0, 0), (1, 0x1000), (7, 0xFFFF_F000), (3, 0x8_2000)] {
        let h = t.hash_adr(seg, ofs);
        assert_eq!(h, t.hash_adr(seg, ofs));
        assert!(u32::from(h) < t.size());
    }
}

#[test]
fn direct_mapped_aliasing_evicts() {
    let mut t = tlb(TlbAccess::DirectMapped);
    // Two pages in different segments that share a hash slot.
    let h0 = t.hash_adr(0, 0);
    let alias = (0..64u32)
        .map(|p| p << 12)
        .find(|&ofs| ofs != 0 && t.hash_adr(0, ofs) == h0);
    if let Some(alias) = alias {
        t.insert_data(0, 0, 0, make_p_info(1, PageType::ReadWrite, false));
        t.insert_data(0, alias, 0, make_p_info(2, PageType::ReadWrite, false));
        assert_eq!(t.lookup(0, 0), None, "alias evicted the first entry");
        assert!(t.lookup(0, alias).is_some());
    }
}

#[test]
fn fully_associative_keeps_aliases_apart() {
    let mut t = tlb(TlbAccess::FullyAssociative);
    t.insert_data(0, 0x0000, 0, make_p_info(1, PageType::ReadWrite, false));
    t.insert_data(0, 0x1000, 0, make_p_info(2, PageType::ReadWrite, false));
    t.insert_data(5, 0x0000, 0, make_p_info(3, PageType::ReadWrite, false));
    assert_eq!(t.lookup(0, 0x0000).map(|e| e.phys_page()), Some(1));
    assert_eq!(t.lookup(0, 0x1000).map(|e| e.phys_page()), Some(2));
    assert_eq!(t.lookup(5, 0x0000).map(|e| e.phys_page()), Some(3));
}
