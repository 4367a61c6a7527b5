//! L1 cache hit path and miss-service state machine.
//!
//! The L1 caches are virtually indexed and physically tagged: the pipeline
//! hands them the segment:offset pair for indexing and the translated
//! physical address as the tag. A hit is served in the same cycle with no
//! penalty; a miss claims the layer and walks
//! `ALLOCATE_BLOCK → [WRITE_BACK_BLOCK →] READ_BLOCK → IDLE`, after which the
//! retrying access hits. Write policy is write-back with a dirty bit.

use tracing::trace;

use super::{MAX_BLOCK_SETS, MemLayer, MemOpState, MemTagEntry};

#[inline]
fn block_index(layer: &MemLayer, ofs: u32) -> u32 {
    (ofs / layer.block_size()) % layer.block_entries()
}

fn read_from_block(layer: &MemLayer, set: u32, index: u32, ofs: u32, len: u32) -> u32 {
    let base = (index * layer.block_size() + (ofs & layer.block_mask())) as usize;
    let d = &layer.data_array[set as usize];
    match len {
        1 => u32::from(d[base]),
        2 => u32::from(u16::from_le_bytes([d[base], d[base + 1]])),
        _ => u32::from_le_bytes([d[base], d[base + 1], d[base + 2], d[base + 3]]),
    }
}

fn write_to_block(layer: &mut MemLayer, set: u32, index: u32, ofs: u32, len: u32, word: u32) {
    let base = (index * layer.block_size() + (ofs & layer.block_mask())) as usize;
    let d = &mut layer.data_array[set as usize];
    match len {
        1 => d[base] = word as u8,
        2 => d[base..base + 2].copy_from_slice(&(word as u16).to_le_bytes()),
        _ => d[base..base + 4].copy_from_slice(&word.to_le_bytes()),
    }
}

fn claim_miss(layer: &mut MemLayer, seg: u32, ofs: u32, tag: u32, pri: u32, index: u32) {
    if layer.try_claim(MemOpState::AllocateBlock, seg, ofs, tag, 0, pri) {
        layer.req.target_block_index = index;
        layer.req.target_set = MAX_BLOCK_SETS;
        layer.stats.access += 1;
        layer.stats.miss += 1;
    }
}

/// Word read with the zero-penalty hit path.
pub(super) fn read_word(
    layer: &mut MemLayer,
    seg: u32,
    ofs: u32,
    tag: u32,
    len: u32,
    pri: u32,
) -> Option<u32> {
    let index = block_index(layer, ofs);
    let returning = layer.take_completed(MemOpState::AllocateBlock, ofs);

    if layer.op_state() != MemOpState::Idle {
        return None;
    }

    let set = layer.match_tag(index, tag);
    if set < layer.block_sets() {
        // The poll that completes a miss was already counted when it missed.
        if !returning {
            layer.stats.access += 1;
        }
        return Some(read_from_block(layer, set, index, ofs, len));
    }

    claim_miss(layer, seg, ofs, tag, pri, index);
    None
}

/// Word write with the zero-penalty hit path; marks the block dirty.
pub(super) fn write_word(
    layer: &mut MemLayer,
    seg: u32,
    ofs: u32,
    tag: u32,
    len: u32,
    word: u32,
    pri: u32,
) -> bool {
    let index = block_index(layer, ofs);
    let returning = layer.take_completed(MemOpState::AllocateBlock, ofs);

    if layer.op_state() != MemOpState::Idle {
        return false;
    }

    let set = layer.match_tag(index, tag);
    if set < layer.block_sets() {
        if !returning {
            layer.stats.access += 1;
        }
        write_to_block(layer, set, index, ofs, len, word);
        layer.tag_array[set as usize][index as usize].dirty = true;
        return true;
    }

    claim_miss(layer, seg, ofs, tag, pri, index);
    false
}

/// Explicit flush: a dirty hit is written back and marked clean; a miss or a
/// clean hit completes immediately.
pub(super) fn flush_block(layer: &mut MemLayer, seg: u32, ofs: u32, tag: u32, pri: u32) -> bool {
    if layer.take_completed(MemOpState::FlushBlock, ofs) {
        return true;
    }
    if layer.op_state() != MemOpState::Idle {
        return false;
    }

    let index = block_index(layer, ofs);
    let set = layer.match_tag(index, tag);
    if set >= layer.block_sets() || !layer.tag_array[set as usize][index as usize].dirty {
        return true;
    }
    if layer.try_claim(MemOpState::FlushBlock, seg, ofs, tag, 0, pri) {
        layer.req.target_block_index = index;
        layer.req.target_set = set;
    }
    false
}

/// Explicit purge: a hit is invalidated; a miss completes immediately.
pub(super) fn purge_block(layer: &mut MemLayer, seg: u32, ofs: u32, tag: u32, pri: u32) -> bool {
    if layer.take_completed(MemOpState::PurgeBlock, ofs) {
        return true;
    }
    if layer.op_state() != MemOpState::Idle {
        return false;
    }

    let index = block_index(layer, ofs);
    let set = layer.match_tag(index, tag);
    if set >= layer.block_sets() {
        return true;
    }
    if layer.try_claim(MemOpState::PurgeBlock, seg, ofs, tag, 0, pri) {
        layer.req.target_block_index = index;
        layer.req.target_set = set;
    }
    false
}

/// The miss-service state machine, invoked once per cycle.
pub(super) fn process(layer: &mut MemLayer, lower: &mut MemLayer) {
    match layer.op_state() {
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
            } else {
                layer.op_state.load(MemOpState::ReadBlock as u32);
            }
        }

        MemOpState::ReadBlock => {
            let set = layer.req.target_set as usize;
            let index = layer.req.target_block_index;
            let block_adr = layer.req.tag & !layer.block_mask();
            let size = layer.block_size();

            if lower.read_block(0, block_adr, block_adr, size, layer.req.pri) {
                let base = (index * size) as usize;
                let incoming = lower.block_buf().to_vec();
                layer.data_array[set][base..base + size as usize].copy_from_slice(&incoming);
                layer.tag_array[set][index as usize] = MemTagEntry {
                    valid: true,
                    dirty: false,
                    tag: block_adr,
                };
                trace!(kind = ?layer.kind, index, set, tag = block_adr, "block filled");
                layer.commit();
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
