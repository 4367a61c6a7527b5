//! Processor-dependent-code ROM.
//!
//! A read-only leaf layer. The image is loaded by the driver at reset; word
//! and block reads are served at the configured latency. Writes are accepted
//! by the state machine and commit without touching the array, so a stray
//! store has no effect.

use super::{MemLayer, MemOpState};

pub(super) fn process(layer: &mut MemLayer) {
    match layer.op_state() {
        MemOpState::ReadWord => {
            if layer.latency_elapsed() {
                let (ofs, len) = (layer.req.ofs, layer.req.len);
                layer.req.word = if layer.valid_adr(ofs) {
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

        MemOpState::ReadBlock => {
            if layer.latency_elapsed() {
                let (ofs, len) = (layer.req.ofs, layer.req.len);
                layer.req.buf = if layer.valid_adr(ofs) && layer.valid_adr(ofs + len - 1) {
                    let base = (ofs - layer.start_adr()) as usize;
                    layer.data_array[0][base..base + len as usize].to_vec()
                } else {
                    vec![0; len as usize]
                };
                layer.stats.access += 1;
                layer.commit();
            }
        }

        // ROM: writes complete without effect.
        MemOpState::WriteWord | MemOpState::WriteBlock => {
            if layer.latency_elapsed() {
                layer.stats.access += 1;
                layer.commit();
            }
        }

        MemOpState::FlushBlock | MemOpState::PurgeBlock => layer.commit(),

        _ => {}
    }
}
