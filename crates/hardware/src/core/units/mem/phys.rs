//! Physical memory.
//!
//! The bottom of the hierarchy: one data array, no tags. Serves word and
//! block reads and writes at the configured latency; flush and purge are
//! accepted and complete as no-ops. Indexing is the byte offset relative to
//! the layer's start address.

use super::{MemLayer, MemOpState};

fn in_range(layer: &MemLayer, ofs: u32, len: u32) -> bool {
    layer.valid_adr(ofs) && layer.valid_adr(ofs + len.saturating_sub(1))
}

pub(super) fn process(layer: &mut MemLayer) {
    match layer.op_state() {
        MemOpState::ReadWord => {
            if layer.latency_elapsed() {
                let (ofs, len) = (layer.req.ofs, layer.req.len);
                layer.req.word = if in_range(layer, ofs, len) {
                    let base = (ofs - layer.start_adr()) as usize;
                    let d = &layer.data_array[0];
                    match len {
                        1 => u32::from(d[base]),
                        2 => u32::from(u16::from_le_bytes([d[base], d[base + 1]])),
                        _ => u32::from_le_bytes([d[base], d[base + 1], d[base + 2], d[base + 3]]),
                    }
                } else {
                    0
                };
                layer.stats.access += 1;
                layer.commit();
            }
        }

        MemOpState::WriteWord => {
            if layer.latency_elapsed() {
                let (ofs, len, word) = (layer.req.ofs, layer.req.len, layer.req.word);
                if in_range(layer, ofs, len) {
                    let base = (ofs - layer.start_adr()) as usize;
                    let d = &mut layer.data_array[0];
                    match len {
                        1 => d[base] = word as u8,
                        2 => d[base..base + 2].copy_from_slice(&(word as u16).to_le_bytes()),
                        _ => d[base..base + 4].copy_from_slice(&word.to_le_bytes()),
                    }
                }
                layer.stats.access += 1;
                layer.commit();
            }
        }

        MemOpState::ReadBlock => {
            if layer.latency_elapsed() {
                let (ofs, len) = (layer.req.ofs, layer.req.len);
                layer.req.buf = if in_range(layer, ofs, len) {
                    let base = (ofs - layer.start_adr()) as usize;
                    layer.data_array[0][base..base + len as usize].to_vec()
                } else {
                    vec![0; len as usize]
                };
                layer.stats.access += 1;
                layer.commit();
            }
        }

        MemOpState::WriteBlock => {
            if layer.latency_elapsed() {
                let (ofs, len) = (layer.req.ofs, layer.req.len);
                if in_range(layer, ofs, len) {
                    let base = (ofs - layer.start_adr()) as usize;
                    let data = layer.req.buf.clone();
                    layer.data_array[0][base..base + len as usize].copy_from_slice(&data);
                }
                layer.stats.access += 1;
                layer.commit();
            }
        }

        // No tags here: nothing to flush or purge.
        MemOpState::FlushBlock | MemOpState::PurgeBlock => layer.commit(),

        _ => {}
    }
}
