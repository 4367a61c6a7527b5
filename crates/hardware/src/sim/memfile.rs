//! Textual memory dump format.
//!
//! A dump is a sequence of `MA <ofs> <v0> … <v7>` lines: the byte offset
//! followed by eight words, all in `0x%08x` form. Lines whose eight words
//! are all zero are omitted, so replaying a dump into zeroed memory
//! reconstructs the original contents exactly.

use std::fs;
use std::path::Path;

use crate::common::error::SimError;

/// Words emitted per dump line.
const WORDS_PER_LINE: usize = 8;

/// Serialises `words` (starting at byte offset `start_ofs`) into dump text.
pub fn to_dump_string(start_ofs: u32, words: &[u32]) -> String {
    let mut out = String::new();
    for (chunk_idx, chunk) in words.chunks(WORDS_PER_LINE).enumerate() {
        if chunk.iter().all(|w| *w == 0) {
            continue;
        }
        let ofs = start_ofs + (chunk_idx * WORDS_PER_LINE * 4) as u32;
        out.push_str(&format!("MA 0x{ofs:08x}"));
        for w in chunk {
            out.push_str(&format!(" 0x{w:08x}"));
        }
        out.push('\n');
    }
    out
}

/// Parses dump text into `(byte-offset, word)` pairs.
///
/// # Errors
///
/// Reports the one-based line number and reason for any malformed line.
pub fn parse_dump(text: &str) -> Result<Vec<(u32, u32)>, SimError> {
    let mut cells = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        if fields.next() != Some("MA") {
            return Err(SimError::DumpFormat {
                line: line_no,
                reason: "expected an MA command".to_string(),
            });
        }
        let parse_num = |s: &str| -> Option<u32> {
            s.strip_prefix("0x")
                .or_else(|| s.strip_prefix("0X"))
                .map_or_else(|| s.parse().ok(), |h| u32::from_str_radix(h, 16).ok())
        };
        let Some(ofs) = fields.next().and_then(parse_num) else {
            return Err(SimError::DumpFormat {
                line: line_no,
                reason: "missing offset".to_string(),
            });
        };
        let mut count = 0;
        for (i, f) in fields.enumerate() {
            let Some(w) = parse_num(f) else {
                return Err(SimError::DumpFormat {
                    line: line_no,
                    reason: format!("bad word value {f:?}"),
                });
            };
            cells.push((ofs + (i * 4) as u32, w));
            count += 1;
        }
        if count == 0 || count > WORDS_PER_LINE {
            return Err(SimError::DumpFormat {
                line: line_no,
                reason: format!("expected 1..{WORDS_PER_LINE} words, got {count}"),
            });
        }
    }
    Ok(cells)
}

/// Writes dump text to a file.
pub fn save(path: &Path, text: &str) -> Result<(), SimError> {
    fs::write(path, text)?;
    Ok(())
}

/// Reads dump text from a file.
pub fn load(path: &Path) -> Result<String, SimError> {
    Ok(fs::read_to_string(path)?)
}
