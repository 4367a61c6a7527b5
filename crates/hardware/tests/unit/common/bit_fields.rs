//! MSB-0 bit-field helper tests.

use proptest::prelude::*;
use segsim_core::common::bits::{
    fits_signed, fits_unsigned, get_bit, get_bit_field, get_imm_val, set_bit, set_bit_field,
    set_imm_val,
};

#[test]
fn bit_zero_is_the_sign_position() {
    assert!(get_bit(0x8000_0000, 0));
    assert!(!get_bit(0x7FFF_FFFF, 0));
    assert!(get_bit(0x0000_0001, 31));
}

#[test]
fn field_occupies_pos_minus_len_plus_one_through_pos() {
    let mut w = 0;
    set_bit_field(&mut w, 15, 2, 0b10);
    assert_eq!(w, 0x0002_0000);
    assert_eq!(get_bit_field(w, 15, 2), 0b10);

    let mut w = 0;
    set_bit_field(&mut w, 9, 4, 0xF);
    assert_eq!(w, 0x03C0_0000);
}

#[test]
fn set_bit_clears_too() {
    let mut w = u32::MAX;
    set_bit(&mut w, 10, false);
    assert!(!get_bit(w, 10));
    set_bit(&mut w, 10, true);
    assert_eq!(w, u32::MAX);
}

#[test]
fn range_checks_are_exact_at_the_boundaries() {
    assert!(fits_signed(2047, 12));
    assert!(!fits_signed(2048, 12));
    assert!(fits_signed(-2048, 12));
    assert!(!fits_signed(-2049, 12));
    assert!(fits_unsigned(31, 5));
    assert!(!fits_unsigned(32, 5));
    assert!(fits_unsigned((1 << 22) - 1, 22));
    assert!(!fits_unsigned(1 << 22, 22));
}

proptest! {
    #[test]
    fn signed_immediates_round_trip(val in -2048i32..=2047) {
        let mut w = 0;
        set_imm_val(&mut w, 27, 12, val);
        prop_assert_eq!(get_imm_val(w, 27, 12), val);
    }

    #[test]
    fn fields_do_not_disturb_neighbours(
        base in any::<u32>(),
        val in 0u32..32,
    ) {
        let mut w = base;
        set_bit_field(&mut w, 21, 5, val);
        prop_assert_eq!(get_bit_field(w, 21, 5), val);
        // Bits outside the field are untouched.
        let mask: u32 = 0x1F << (31 - 21);
        prop_assert_eq!(w & !mask, base & !mask);
    }
}
