//! TMEM load replay: moving texture bytes from RDRAM into TMEM with the
//! hardware's swizzles intact.
//!
//! Every load is derived twice from the same tile/texture snapshot: once at
//! command time for coherency bookkeeping, and again whenever the TMEM view
//! has to be reproduced (renderer hashing, tests). Keeping the parameter
//! derivation here guarantees both sides agree byte for byte.

use gbi_registers::formats::{G_IM_FMT_RGBA, G_IM_SIZ_32B};
use gbi_registers::{TMEM_BYTES, TMEM_MASK16, TMEM_MASK8};

use crate::rdram::Rdram;
use crate::workload::{LoadOperation, LoadOperationKind};

use super::{TextureImage, TileDescriptor};

pub const TMEM_SIZE: usize = TMEM_BYTES as usize;

/// Copy one 64-bit word (or one 16-bit TLUT entry repeated) from RDRAM into
/// TMEM. RGBA32 splits each word's halves into the lower and upper 2 KiB.
fn load_word(
    tmem: &mut [u8; TMEM_SIZE],
    tmem_address: u32,
    tmem_xor_mask: u32,
    rdram: &Rdram,
    texture_address: u32,
    rgba32: bool,
    tlut: bool,
) {
    // TLUT loads fetch only the first two bytes of each word.
    let offset_mask: u32 = if tlut { 0x1 } else { 0x7 };
    let write = |tmem: &mut [u8; TMEM_SIZE], index: u32, value: u8| {
        tmem[(index as usize) & (TMEM_SIZE - 1)] = value;
    };

    if rgba32 {
        let upper = (TMEM_BYTES >> 1) as u32;
        let fetch = |i: u32| rdram.read_u8(texture_address + (i & offset_mask));
        write(tmem, (tmem_address) ^ tmem_xor_mask, fetch(0));
        write(tmem, (tmem_address + 1) ^ tmem_xor_mask, fetch(1));
        write(tmem, (tmem_address + 2) ^ tmem_xor_mask, fetch(4));
        write(tmem, (tmem_address + 3) ^ tmem_xor_mask, fetch(5));
        write(tmem, ((tmem_address) ^ tmem_xor_mask) | upper, fetch(2));
        write(tmem, ((tmem_address + 1) ^ tmem_xor_mask) | upper, fetch(3));
        write(tmem, ((tmem_address + 2) ^ tmem_xor_mask) | upper, fetch(6));
        write(tmem, ((tmem_address + 3) ^ tmem_xor_mask) | upper, fetch(7));
    } else {
        for i in 0..8 {
            let value = rdram.read_u8(texture_address + (i & offset_mask));
            write(tmem, (tmem_address + i) ^ tmem_xor_mask, value);
        }
    }
}

/// The shared row/word walk of every load flavor. Block loads run a DXT
/// accumulator that advances the TMEM row every time it crosses 2048.
#[allow(clippy::too_many_arguments)]
pub fn load_to_tmem(
    tmem: &mut [u8; TMEM_SIZE],
    rdram: &Rdram,
    texture_start: u32,
    texture_stride: u32,
    tmem_start: u32,
    tmem_stride: u32,
    words_per_row: u32,
    mut row_count: u32,
    dxt_increment: u32,
    rgba32: bool,
    block: bool,
    tlut: bool,
) {
    debug_assert!(!block || (row_count == 1));

    const DXT_SWAP: u32 = 0x800;
    let (tmem_mask, tmem_advance) = if rgba32 { (TMEM_MASK16, 0x4) } else { (TMEM_MASK8, 0x8) };
    let texture_advance: u32 = if tlut { 0x2 } else { 0x8 };

    let mut tmem_xor_mask = 0u32;
    let mut dxt_counter = 0u32;
    let mut texture_address_row = texture_start;
    let mut tmem_address_row = tmem_start & tmem_mask;

    while row_count > 0 {
        let mut texture_address = texture_address_row;
        let mut tmem_address = tmem_address_row;
        let mut word_count = words_per_row;
        while word_count > 0 {
            load_word(tmem, tmem_address, tmem_xor_mask, rdram, texture_address, rgba32, tlut);

            if block {
                dxt_counter += dxt_increment;
                while dxt_counter >= DXT_SWAP {
                    tmem_address = (tmem_address + tmem_stride) & tmem_mask;
                    dxt_counter -= DXT_SWAP;
                    tmem_xor_mask ^= 0x4;
                }
            }

            texture_address += texture_advance;
            tmem_address = (tmem_address + tmem_advance) & tmem_mask;
            word_count -= 1;
        }

        tmem_address_row = (tmem_address_row + tmem_stride) & tmem_mask;
        texture_address_row += texture_stride;
        tmem_xor_mask ^= 0x4;
        row_count -= 1;
    }
}

/// Parameters derived from a tile-load snapshot.
#[derive(Clone, Copy, Debug)]
pub struct TileLoadParams {
    pub texture_start: u32,
    pub texture_end: u32,
    pub bytes_per_row: u32,
    pub row_count: u32,
    pub words_per_row: u32,
    /// TMEM byte addresses.
    pub tmem_start: u32,
    pub tmem_stride: u32,
    pub tmem_bytes: u32,
    /// Word-address mask for the region bookkeeping.
    pub tmem_word_mask: u32,
    pub line_width: u32,
    pub rgba32: bool,
}

pub fn tile_load_params(tile: &TileDescriptor, texture: &TextureImage) -> TileLoadParams {
    let siz = texture.siz as u32;
    let bytes_offset = (((tile.uls as u32) >> 2) << siz) >> 1;
    let bytes_per_row = ((texture.width as u32) << siz) >> 1;
    let texture_start = texture.address + bytes_offset + bytes_per_row * ((tile.ult as u32) >> 2);
    let row_count = 1 + ((tile.lrt as u32) >> 2).saturating_sub((tile.ult as u32) >> 2);
    let tile_width = ((tile.lrs as u32) >> 2).saturating_sub((tile.uls as u32) >> 2);
    let words_per_row = (tile_width >> (4 - tile.siz as u32)) + 1;
    let tmem_start = (tile.tmem as u32) << 3;
    let tmem_stride = (tile.line as u32) << 3;
    let texture_end = texture_start + (row_count - 1) * bytes_per_row + (words_per_row << 3);
    let rgba32 = (tile.siz == G_IM_SIZ_32B) && (tile.fmt == G_IM_FMT_RGBA);
    let word_shift = if rgba32 { 2 } else { 3 };
    let tmem_word_mask = if rgba32 { gbi_registers::TMEM_MASK128 } else { gbi_registers::TMEM_MASK64 };
    let tmem_bytes = (row_count - 1) * tmem_stride + (words_per_row << word_shift);
    let line_shift = u32::from(rgba32);
    let line_width = (tile.line as u32) << ((4 + line_shift) - tile.siz as u32);
    TileLoadParams {
        texture_start,
        texture_end,
        bytes_per_row,
        row_count,
        words_per_row,
        tmem_start,
        tmem_stride,
        tmem_bytes,
        tmem_word_mask,
        line_width,
        rgba32,
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BlockLoadParams {
    pub texture_start: u32,
    pub texture_end: u32,
    pub bytes_per_row: u32,
    pub word_count: u32,
    pub tmem_start: u32,
    pub tmem_stride: u32,
    pub tmem_bytes: u32,
    pub tmem_word_mask: u32,
    pub rgba32: bool,
}

pub fn block_load_params(tile: &TileDescriptor, texture: &TextureImage) -> BlockLoadParams {
    let siz = texture.siz as u32;
    let bytes_offset = ((tile.uls as u32) << siz) >> 1;
    let bytes_per_row = ((texture.width as u32) << siz) >> 1;
    let texture_start = texture.address + bytes_offset + bytes_per_row * (tile.ult as u32);
    let word_count = ((tile.lrs as u32).saturating_sub(tile.uls as u32) >> (4 - tile.siz as u32)) + 1;
    let tmem_start = (tile.tmem as u32) << 3;
    let tmem_stride = (tile.line as u32) << 3;
    let texture_end = texture_start + (word_count << 3);
    let rgba32 = (tile.siz == G_IM_SIZ_32B) && (tile.fmt == G_IM_FMT_RGBA);
    let word_shift = if rgba32 { 2 } else { 3 };
    let tmem_word_mask = if rgba32 { gbi_registers::TMEM_MASK128 } else { gbi_registers::TMEM_MASK64 };
    let tmem_bytes = word_count << word_shift;
    BlockLoadParams {
        texture_start,
        texture_end,
        bytes_per_row,
        word_count,
        tmem_start,
        tmem_stride,
        tmem_bytes,
        tmem_word_mask,
        rgba32,
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TlutLoadParams {
    pub texture_start: u32,
    pub texture_end: u32,
    pub bytes_per_row: u32,
    pub row_count: u32,
    pub words_per_row: u32,
    pub tmem_start: u32,
    pub tmem_stride: u32,
    pub tmem_bytes: u32,
    pub tmem_word_mask: u32,
    pub rgba32: bool,
}

pub fn tlut_load_params(tile: &TileDescriptor, texture: &TextureImage) -> TlutLoadParams {
    let siz = texture.siz as u32;
    let bytes_offset = (((tile.uls as u32) >> 2) << siz) >> 1;
    let bytes_per_row = ((texture.width as u32) << siz) >> 1;
    let texture_start = texture.address + bytes_offset + bytes_per_row * ((tile.ult as u32) >> 2);
    let row_count = 1 + ((tile.lrt as u32) >> 2).saturating_sub((tile.ult as u32) >> 2);
    let words_per_row = ((tile.lrs as u32) >> 2).saturating_sub((tile.uls as u32) >> 2) + 1;
    let tmem_start = (tile.tmem as u32) << 3;
    // Each palette entry occupies a full TMEM word; rows stride by 4 words.
    let tmem_stride = (tile.line as u32) << 5;
    let rgba32 = (tile.siz == G_IM_SIZ_32B) && (tile.fmt == G_IM_FMT_RGBA);
    let word_shift = if rgba32 { 0 } else { 1 };
    let tmem_word_mask = if rgba32 { gbi_registers::TMEM_MASK128 } else { gbi_registers::TMEM_MASK64 };
    let tmem_bytes = (row_count - 1) * tmem_stride + (words_per_row << word_shift);
    let texture_end = texture_start + (row_count - 1) * bytes_per_row + (words_per_row << 3);
    TlutLoadParams {
        texture_start,
        texture_end,
        bytes_per_row,
        row_count,
        words_per_row,
        tmem_start,
        tmem_stride,
        tmem_bytes,
        tmem_word_mask,
        rgba32,
    }
}

/// Replay a recorded load against an RDRAM image. Reproduces the TMEM view
/// the coherency engine and renderer reasoned about, byte for byte.
pub fn replay_load(tmem: &mut [u8; TMEM_SIZE], rdram: &Rdram, op: &LoadOperation) {
    match op.kind {
        LoadOperationKind::Tile { .. } => {
            let p = tile_load_params(&op.tile, &op.texture);
            load_to_tmem(
                tmem,
                rdram,
                p.texture_start,
                p.bytes_per_row,
                p.tmem_start,
                p.tmem_stride,
                p.words_per_row,
                p.row_count,
                0,
                p.rgba32,
                false,
                false,
            );
        }
        LoadOperationKind::Block { dxt, .. } => {
            let p = block_load_params(&op.tile, &op.texture);
            load_to_tmem(
                tmem,
                rdram,
                p.texture_start,
                p.bytes_per_row,
                p.tmem_start,
                p.tmem_stride,
                p.word_count,
                1,
                dxt as u32,
                p.rgba32,
                true,
                false,
            );
        }
        LoadOperationKind::Tlut { .. } => {
            let p = tlut_load_params(&op.tile, &op.texture);
            load_to_tmem(
                tmem,
                rdram,
                p.texture_start,
                p.bytes_per_row,
                p.tmem_start,
                p.tmem_stride,
                p.words_per_row,
                p.row_count,
                0,
                p.rgba32,
                false,
                true,
            );
        }
    }
}
