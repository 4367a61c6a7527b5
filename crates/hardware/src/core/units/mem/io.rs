//! Memory-mapped I/O range.
//!
//! No data array: reads and writes dispatch to a registered [`IoDevice`]
//! with the offset relative to the range start, after the configured latency
//! has elapsed. Without a device, reads return zero and writes vanish.

use tracing::trace;

use super::{MemLayer, MemOpState};

/// A side-effecting handler behind the I/O address range.
pub trait IoDevice {
    /// Services a read of `len` bytes at `ofs` (relative to the range start).
    fn read(&mut self, ofs: u32, len: u32) -> u32;

    /// Services a write of `len` bytes at `ofs`.
    fn write(&mut self, ofs: u32, len: u32, val: u32);
}

pub(super) fn process(layer: &mut MemLayer) {
    match layer.op_state() {
        MemOpState::ReadWord => {
            if layer.latency_elapsed() {
                let ofs = layer.req.ofs - layer.start_adr();
                let len = layer.req.len;
                layer.req.word = match layer.io_device.as_mut() {
                    Some(dev) => dev.read(ofs, len),
                    None => 0,
                };
                trace!(ofs, len, val = layer.req.word, "io read");
                layer.stats.access += 1;
                layer.commit();
            }
        }

        MemOpState::WriteWord => {
            if layer.latency_elapsed() {
                let ofs = layer.req.ofs - layer.start_adr();
                let (len, word) = (layer.req.len, layer.req.word);
                if let Some(dev) = layer.io_device.as_mut() {
                    dev.write(ofs, len, word);
                }
                trace!(ofs, len, val = word, "io write");
                layer.stats.access += 1;
                layer.commit();
            }
        }

        // Block and maintenance operations have no meaning here.
        _ => {
            if layer.op_state() != MemOpState::Idle {
                layer.commit();
            }
        }
    }
}
