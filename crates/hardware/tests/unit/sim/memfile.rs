//! Memory dump format tests.

use pretty_assertions::assert_eq;
use segsim_core::sim::memfile::{parse_dump, to_dump_string};

use crate::common::sim;

#[test]
fn all_zero_lines_are_omitted() {
    let words = [0u32; 16];
    assert_eq!(to_dump_string(0, &words), "");
}

#[test]
fn one_line_per_eight_words() {
    let mut words = [0u32; 16];
    words[0] = 0x11;
    words[9] = 0x22;
    let text = to_dump_string(0x100, &words);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("MA 0x00000100 0x00000011"));
    assert!(lines[1].starts_with("MA 0x00000120 0x00000000 0x00000022"));
}

#[test]
fn parse_inverts_formatting() {
    let words: Vec<u32> = (0..24).map(|i| i * 0x111).collect();
    let text = to_dump_string(0x40, &words);
    let cells = parse_dump(&text).unwrap();
    for (ofs, val) in cells {
        let idx = ((ofs - 0x40) / 4) as usize;
        assert_eq!(val, words[idx], "word at {ofs:#x}");
    }
}

#[test]
fn malformed_lines_report_their_position() {
    let err = parse_dump("MA 0x0 0x1\nBOGUS 1 2\n").unwrap_err();
    assert!(err.to_string().contains("line 2"), "{err}");

    let err = parse_dump("MA zzz 0x1\n").unwrap_err();
    assert!(err.to_string().contains("line 1"), "{err}");

    let err = parse_dump("MA 0x0\n").unwrap_err();
    assert!(err.to_string().contains("line 1"), "{err}");
}

#[test]
fn blank_lines_are_skipped() {
    let cells = parse_dump("\n  \nMA 0x0 0x7\n\n").unwrap();
    assert_eq!(cells, vec![(0, 7)]);
}

#[test]
fn dump_and_reload_restores_memory_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("m");

    let mut s = sim();
    for (i, byte) in (0x11..=0x88).step_by(0x11).enumerate() {
        let word: u32 = byte;
        s.write_abs_mem((i * 4) as u32, &word.to_le_bytes()).unwrap();
    }
    s.save_mem_to_file(&path, 0, 64).unwrap();

    // Zero the region, replay the dump, expect the original bytes back
    // and everything else untouched.
    s.write_abs_mem(0, &[0u8; 64]).unwrap();
    s.load_mem_from_file(&path).unwrap();

    for (i, byte) in (0x11u32..=0x88).step_by(0x11).enumerate() {
        let got = s.read_abs_mem((i * 4) as u32, 4).unwrap();
        assert_eq!(u32::from_le_bytes([got[0], got[1], got[2], got[3]]), byte);
    }
    let rest = s.read_abs_mem(32, 64).unwrap();
    assert!(rest.iter().all(|b| *b == 0), "untouched words stay zero");
}

#[test]
fn save_rejects_out_of_range_requests() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("m");
    let s = sim();
    assert!(s.save_mem_to_file(&path, 0xFFFF_0000, 64).is_err());
}
