//! Unified L2 cache block server.
//!
//! The L2 sits between the two L1 caches and physical memory. It is
//! physically indexed and physically tagged, so the offset of a request is
//! both the index source and the tag. Requests arrive as block transfers
//! from the L1s; the L2 block size may be larger than the L1 block size,
//! never smaller. A miss is serviced inside the ALLOCATE_BLOCK state by
//! filling the full L2 block from memory, after which the machine returns to
//! the original serve state.

use tracing::trace;

use super::{MAX_BLOCK_SETS, MemLayer, MemOpState, MemTagEntry};

#[inline]
fn block_index(layer: &MemLayer, ofs: u32) -> u32 {
    (ofs / layer.block_size()) % layer.block_entries()
}

/// Byte range of the requested sub-block within the indexed L2 block.
fn sub_range(layer: &MemLayer, ofs: u32, len: u32) -> (usize, usize) {
    let index = block_index(layer, ofs);
    let base = index * layer.block_size() + (ofs & layer.block_mask());
    (base as usize, (base + len) as usize)
}

pub(super) fn process(layer: &mut MemLayer, lower: &mut MemLayer) {
    match layer.op_state() {
        MemOpState::ReadBlock => {
            if !layer.latency_elapsed() {
                return;
            }
            let ofs = layer.req.ofs;
            let index = block_index(layer, ofs);
            let set = layer.match_tag(index, ofs);
            if set < layer.block_sets() {
                layer.stats.access += 1;
                let (lo, hi) = sub_range(layer, ofs, layer.req.len);
                layer.req.buf = layer.data_array[set as usize][lo..hi].to_vec();
                layer.commit();
            } else {
                layer.stats.access += 1;
                layer.stats.miss += 1;
                layer.req.target_block_index = index;
                layer.req.target_set = MAX_BLOCK_SETS;
                layer.op_state.load(MemOpState::AllocateBlock as u32);
            }
        }

        MemOpState::WriteBlock => {
            if !layer.latency_elapsed() {
                return;
            }
            let ofs = layer.req.ofs;
            let index = block_index(layer, ofs);
            let set = layer.match_tag(index, ofs);
            if set < layer.block_sets() {
                layer.stats.access += 1;
                let (lo, hi) = sub_range(layer, ofs, layer.req.len);
                let data = layer.req.buf.clone();
                layer.data_array[set as usize][lo..hi].copy_from_slice(&data);
                layer.tag_array[set as usize][index as usize].dirty = true;
                layer.commit();
            } else {
                // Write-allocate: fill the block, then serve the write.
                layer.stats.access += 1;
                layer.stats.miss += 1;
                layer.req.target_block_index = index;
                layer.req.target_set = MAX_BLOCK_SETS;
                layer.op_state.load(MemOpState::AllocateBlock as u32);
            }
        }

        MemOpState::AllocateBlock => {
            let index = layer.req.target_block_index as usize;

            if layer.req.target_set >= layer.block_sets() {
                let invalid = (0..layer.block_sets())
                    .find(|&s| !layer.tag_array[s as usize][index].valid);
                layer.req.target_set = invalid.unwrap_or_else(|| {
                    let sets = layer.block_sets();
                    layer.victim_rng.next_below(sets)
                });
            }

            let set = layer.req.target_set as usize;
            let victim = layer.tag_array[set][index];
            if victim.valid && victim.dirty {
                layer.stats.dirty_miss += 1;
                layer.op_state.load(MemOpState::WriteBackBlock as u32);
                return;
            }

            // Fill the whole L2 block from memory, then return to the serve
            // state that took the miss.
            let size = layer.block_size();
            let block_adr = layer.req.ofs & !layer.block_mask();
            if lower.read_block(0, block_adr, block_adr, size, layer.req.pri) {
                let base = index * size as usize;
                let incoming = lower.block_buf().to_vec();
                layer.data_array[set][base..base + size as usize].copy_from_slice(&incoming);
                layer.tag_array[set][index] = MemTagEntry {
                    valid: true,
                    dirty: false,
                    tag: block_adr,
                };
                trace!(index, set, tag = block_adr, "l2 block filled");
                layer.req.latency = 0;
                layer.op_state.load(layer.req.op);
            } else {
                layer.stats.wait_cycles += 1;
            }
        }

        MemOpState::WriteBackBlock => {
            let set = layer.req.target_set as usize;
            let index = layer.req.target_block_index;
            let size = layer.block_size();
            let victim_tag = layer.tag_array[set][index as usize].tag & !layer.block_mask();
            let base = (index * size) as usize;
            let data = layer.data_array[set][base..base + size as usize].to_vec();

            if lower.write_block(0, victim_tag, victim_tag, &data, layer.req.pri) {
                let e = &mut layer.tag_array[set][index as usize];
                e.valid = false;
                e.dirty = false;
                layer.op_state.load(MemOpState::AllocateBlock as u32);
            } else {
                layer.stats.wait_cycles += 1;
            }
        }

        MemOpState::FlushBlock => {
            let set = layer.req.target_set as usize;
            let index = layer.req.target_block_index;
            let size = layer.block_size();
            let block_tag = layer.tag_array[set][index as usize].tag & !layer.block_mask();
            let base = (index * size) as usize;
            let data = layer.data_array[set][base..base + size as usize].to_vec();

            if lower.write_block(0, block_tag, block_tag, &data, layer.req.pri) {
                layer.tag_array[set][index as usize].dirty = false;
                layer.commit();
            } else {
                layer.stats.wait_cycles += 1;
            }
        }

        MemOpState::PurgeBlock => {
            if layer.latency_elapsed() {
                let set = layer.req.target_set as usize;
                let index = layer.req.target_block_index as usize;
                let e = &mut layer.tag_array[set][index];
                e.valid = false;
                e.dirty = false;
                layer.commit();
            }
        }

        _ => {}
    }
}
