//! Framebuffer coherency engine.
//!
//! Bridges the RDP's RDRAM-centric view of framebuffers with the renderer's
//! GPU-texture view: tracks which RDRAM ranges hold rendered pixels, tags
//! TMEM spans whose bytes came from a live framebuffer, and emits the
//! operations the renderer must replay (tile copies, reinterpretations,
//! CPU-change uploads) to keep both sides agreeing.

use std::collections::{BTreeMap, HashMap, VecDeque};

use gbi_registers::formats::{image_row_bytes, G_IM_FMT_DEPTH, G_IM_FMT_RGBA, G_IM_SIZ_16B, G_IM_SIZ_4B, G_IM_SIZ_8B};
use rcp_fixed::FixedRect;
use xxhash_rust::xxh3::xxh3_64;

use crate::rdram::Rdram;

const TMEM_WORDS: u32 = gbi_registers::TMEM_WORDS;

/// Snap texture dimensions up to the allocation granularity.
fn fix_size_to_multiple(width: &mut u32, height: &mut u32) {
    const SIZE_MULTIPLE: u32 = 32;
    *width = width.div_ceil(SIZE_MULTIPLE) * SIZE_MULTIPLE;
    *height = height.div_ceil(SIZE_MULTIPLE) * SIZE_MULTIPLE;
}

/// What kind of pixels a framebuffer last received.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FbWriteType {
    #[default]
    None,
    Color,
    Depth,
    /// Only the CPU has touched the range since tracking began.
    RamOnly,
}

/// Rectangle of a framebuffer that a texture load sampled, in pixels of the
/// framebuffer's own format.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FramebufferTile {
    pub address: u32,
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub line_width: u32,
    pub siz: u8,
    pub fmt: u8,
    pub dither_pattern: u32,
}

impl FramebufferTile {
    pub fn valid(&self) -> bool {
        (self.right > self.left) && (self.bottom > self.top)
    }
}

/// Half-open TMEM word interval whose bytes are owned by a framebuffer.
#[derive(Clone, Debug, Default)]
pub struct RegionTmem {
    pub tmem_start: u32,
    pub tmem_end: u32,
    /// No usable rectangle could be formed; sampling needs a full flush.
    pub sync_required: bool,
    pub fb_tile: FramebufferTile,
    pub tile_copy_id: u64,
}

/// CPU-side record of a GPU texture snapshot of a framebuffer rectangle.
#[derive(Clone, Debug, Default)]
pub struct TileCopy {
    pub id: u64,
    pub address: u32,
    pub texture_width: u32,
    pub texture_height: u32,
    pub used_width: u32,
    pub used_height: u32,
    pub left: u32,
    pub top: u32,
    pub texel_shift: [u32; 2],
    pub texel_mask: [u32; 2],
    pub sample_scale: f32,
    pub dither_pattern: u32,
    pub used_timestamp: u64,
    /// Source framebuffer no longer exists; render from raw TMEM instead.
    pub ignore: bool,
}

/// Per-RDRAM-address framebuffer record.
#[derive(Clone, Debug, Default)]
pub struct Framebuffer {
    pub address_start: u32,
    pub address_end: u32,
    pub width: u32,
    pub height: u32,
    pub max_height: u32,
    pub read_height: u32,
    pub siz: u8,
    pub last_write_fmt: u8,
    pub last_write_type: FbWriteType,
    pub last_write_rect: FixedRect,
    pub last_write_timestamp: u64,
    pub ram_hash: u64,
    pub ram_snapshot: Vec<u8>,
    pub modified_bytes: u32,
    pub rdram_changed: bool,
    pub ever_used_as_depth: bool,
    pub width_changed: bool,
    pub siz_changed: bool,
    pub dither_patterns: [u32; 4],
}

impl Framebuffer {
    pub fn image_row_bytes(&self, width: u32) -> u32 {
        image_row_bytes(width, self.siz)
    }

    pub fn ram_bytes(&self) -> u32 {
        self.address_end.saturating_sub(self.address_start)
    }

    pub fn overlaps(&self, address_start: u32, address_end: u32) -> bool {
        (self.address_start < address_end) && (self.address_end > address_start)
    }

    pub fn contains(&self, address_start: u32, address_end: u32) -> bool {
        (address_start >= self.address_start) && (address_end <= self.address_end)
    }

    pub fn record_dither_pattern(&mut self, pattern: u32) {
        let slot = (pattern as usize) & 3;
        self.dither_patterns[slot] += 1;
    }

    pub fn best_dither_pattern(&self) -> u32 {
        let mut best = 0;
        for (pattern, &count) in self.dither_patterns.iter().enumerate() {
            if count > self.dither_patterns[best as usize] {
                best = pattern as u32;
            }
        }
        best
    }

    pub fn discard_last_write(&mut self) {
        self.last_write_type = FbWriteType::None;
        self.last_write_rect.reset();
    }
}

/// Deferred framebuffer work the renderer replays in order.
#[derive(Clone, Debug, PartialEq)]
pub enum FramebufferOperation {
    /// Upload CPU-written pixels from a change staging resource.
    WriteChanges { address: u32, id: u64 },
    /// Draw the framebuffer's current pixels into the tile-copy texture.
    CreateTileCopy {
        id: u64,
        address: u32,
        fb_tile: FramebufferTile,
    },
    /// Convert one tile copy to another pixel size/format on the GPU.
    ReinterpretTile {
        src_id: u64,
        src_siz: u8,
        src_fmt: u8,
        dst_id: u64,
        dst_siz: u8,
        dst_fmt: u8,
        ul_scale_s: bool,
        ul_scale_t: bool,
        texel_shift: [u32; 2],
        texel_mask: [u32; 2],
    },
}

/// Outcome of resolving a sampled tile against the TMEM region map.
#[derive(Clone, Copy, Debug, Default)]
pub struct CheckCopyResult {
    /// Non-zero when a tile copy serves this tile's TMEM bytes.
    pub tile_id: u64,
    pub tile_width: u32,
    pub line_width: u32,
    pub tile_height: u32,
    pub fmt: u8,
    pub siz: u8,
    pub reinterpret: bool,
    pub sync_required: bool,
}

#[derive(Default)]
pub struct FramebufferManager {
    framebuffers: HashMap<u32, Framebuffer>,
    tile_copies: BTreeMap<u64, TileCopy>,
    /// Non-overlapping, most recent first.
    active_regions_tmem: VecDeque<RegionTmem>,
    write_timestamp: u64,
    used_timestamp: u64,
    change_id_counter: u64,
}

impl FramebufferManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch or create the framebuffer record at `address`. Width or pixel
    /// size changes restart the read/modified tracking.
    pub fn get(&mut self, address: u32, siz: u8, width: u32, height: u32) -> &mut Framebuffer {
        let fb = self.framebuffers.entry(address).or_default();
        fb.width_changed = fb.width != width;
        fb.siz_changed = fb.siz != siz;
        if fb.width_changed || fb.siz_changed {
            fb.max_height = height;
            fb.read_height = 0;
            fb.modified_bytes = 0;
        } else {
            fb.max_height = fb.max_height.max(height);
        }

        fb.height = fb.max_height;
        fb.siz = siz;
        fb.width = width;
        fb.address_start = address;
        fb.address_end = address + image_row_bytes(width, siz) * fb.height;
        fb
    }

    pub fn find(&self, address: u32) -> Option<&Framebuffer> {
        self.framebuffers.get(&address)
    }

    pub fn find_mut(&mut self, address: u32) -> Option<&mut Framebuffer> {
        self.framebuffers.get_mut(&address)
    }

    pub fn framebuffers(&self) -> impl Iterator<Item = &Framebuffer> {
        self.framebuffers.values()
    }

    /// Most recently written framebuffer overlapping the range, ties broken
    /// in favor of full containment.
    pub fn find_most_recent_containing(&self, address_start: u32, address_end: u32) -> Option<&Framebuffer> {
        let mut most_recent: Option<&Framebuffer> = None;
        for fb in self.framebuffers.values() {
            if !fb.overlaps(address_start, address_end) {
                continue;
            }
            match most_recent {
                Some(best) => {
                    if fb.last_write_timestamp > best.last_write_timestamp {
                        most_recent = Some(fb);
                    } else if (fb.last_write_timestamp == best.last_write_timestamp)
                        && fb.contains(address_start, address_end)
                        && !best.contains(address_start, address_end)
                    {
                        most_recent = Some(fb);
                    }
                }
                None => most_recent = Some(fb),
            }
        }
        most_recent
    }

    /// Fit the byte range of a load onto the framebuffer's row geometry.
    /// Returns `None` when no direct rectangle copy is possible.
    pub fn make_framebuffer_tile(
        &self,
        fb: &Framebuffer,
        mut address_start: u32,
        address_end: u32,
        line_width: u32,
        tile_height: u32,
        rgba32: bool,
    ) -> Option<FramebufferTile> {
        let _ = rgba32;
        let fb_stride = fb.image_row_bytes(fb.width);
        if fb_stride == 0 {
            return None;
        }

        // A load can start before the framebuffer; walk forward row by row.
        while address_start < fb.address_start {
            address_start += fb_stride;
        }
        if address_start >= fb.address_end {
            return None;
        }

        let min_end_address = address_end.min(fb.address_end);
        if min_end_address <= address_start {
            return None;
        }

        let fb_bytes = min_end_address - fb.address_start;
        let fb_min_row = (address_start - fb.address_start) / fb_stride;
        let fb_max_row = (fb_bytes / fb_stride) + u32::from((fb_bytes % fb_stride) > 0);

        let offset = address_start - fb.address_start;

        // Same byte count for the 4-bit and 8-bit cases.
        let pixel_size = (1u32 << fb.siz) >> 1;
        let pixel_size = pixel_size.max(1);
        if (offset % pixel_size) != 0 {
            return None;
        }

        let row = offset / fb_stride;
        let row_offset = offset % fb_stride;
        let pixel_shift = u32::from(fb.siz == G_IM_SIZ_4B);
        let mut tile = FramebufferTile {
            left: (row_offset / pixel_size) << pixel_shift,
            top: row,
            ..FramebufferTile::default()
        };

        if line_width > 0 {
            tile.right = tile.left + line_width;
        } else {
            let row_right_pixels = ((fb_stride - row_offset) / pixel_size) << pixel_shift;
            tile.right = tile.left + row_right_pixels;
        }

        if tile_height > 0 {
            tile.bottom = tile.top + tile_height;
        } else {
            let row_end = ((address_end - address_start) / fb_stride).max(1);
            tile.bottom = tile.top + row_end;

            // A block load spanning rows only forms a rectangle when it
            // starts exactly on a row boundary.
            let from_load_block = tile_height == 0;
            if from_load_block && (row_end > 1) && (row_offset > 0) {
                return None;
            }
        }

        tile.top = tile.top.max(fb_min_row);
        tile.right = tile.right.min(fb.width);
        tile.bottom = tile.bottom.min(fb.height).min(fb_max_row);

        if (tile.bottom <= tile.top) || (tile.right <= tile.left) {
            return None;
        }

        tile.line_width = if line_width > 0 { line_width } else { tile.right - tile.left };
        tile.address = fb.address_start;
        tile.siz = fb.siz;
        tile.fmt = fb.last_write_fmt;
        tile.dither_pattern = fb.best_dither_pattern();
        Some(tile)
    }

    pub fn make_tile_copy_operation(dst_tile_id: u64, fb_tile: FramebufferTile) -> FramebufferOperation {
        FramebufferOperation::CreateTileCopy {
            id: dst_tile_id,
            address: fb_tile.address,
            fb_tile,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn make_tile_reinterpretation(
        src_id: u64,
        src_siz: u8,
        src_fmt: u8,
        dst_id: u64,
        dst_siz: u8,
        dst_fmt: u8,
        texel_shift: [u32; 2],
        texel_mask: [u32; 2],
    ) -> FramebufferOperation {
        FramebufferOperation::ReinterpretTile {
            src_id,
            src_siz,
            src_fmt,
            dst_id,
            dst_siz,
            dst_fmt,
            ul_scale_s: true,
            ul_scale_t: true,
            texel_shift,
            texel_mask,
        }
    }

    /// Tag `[tmem_start, +tmem_words)` (wrapped around `tmem_mask`) as owned
    /// by the framebuffer at `address_start`. RGBA32 loads mirror into the
    /// upper TMEM half. Returns how many regions were inserted; they occupy
    /// the front of the region list.
    pub fn insert_regions_tmem(
        &mut self,
        address_start: u32,
        tmem_start: u32,
        tmem_words: u32,
        tmem_mask: u32,
        rgba32: bool,
        sync_required: bool,
    ) -> usize {
        let mut inserted = 0;

        let mut insert_half = |regions: &mut VecDeque<RegionTmem>, upper: bool| {
            let tmem_add = if upper { TMEM_WORDS >> 1 } else { 0 };
            let tmem_end = (tmem_start & tmem_mask) + tmem_words;
            let tmem_barrier = tmem_end;
            let mut tmem_cursor = tmem_end;
            let mut words_left = tmem_words;
            while words_left > 0 {
                let mut region = RegionTmem {
                    sync_required,
                    fb_tile: FramebufferTile {
                        address: address_start,
                        ..FramebufferTile::default()
                    },
                    ..RegionTmem::default()
                };

                if (tmem_cursor > tmem_barrier) && ((tmem_cursor - tmem_barrier) > words_left) {
                    region.tmem_start = tmem_barrier + tmem_add;
                    region.tmem_end = tmem_cursor + tmem_add;
                    words_left = 0;
                } else if words_left > tmem_cursor {
                    words_left -= tmem_cursor;
                    region.tmem_start = tmem_add;
                    region.tmem_end = tmem_cursor + tmem_add;
                    tmem_cursor = tmem_mask + 1;
                } else {
                    tmem_cursor -= words_left;
                    region.tmem_start = tmem_cursor + tmem_add;
                    region.tmem_end = tmem_cursor + words_left + tmem_add;
                    words_left = 0;
                }

                regions.push_front(region);
                inserted += 1;
            }
        };

        insert_half(&mut self.active_regions_tmem, false);
        if rgba32 {
            insert_half(&mut self.active_regions_tmem, true);
        }

        inserted
    }

    /// Bind a framebuffer tile and tile-copy id to the `count` regions most
    /// recently inserted.
    pub fn bind_front_regions(&mut self, count: usize, fb_tile: &FramebufferTile, tile_copy_id: u64) {
        for region in self.active_regions_tmem.iter_mut().take(count) {
            region.fb_tile = *fb_tile;
            region.tile_copy_id = tile_copy_id;
        }
    }

    /// Remove `[tmem_start, +tmem_words)` from every region, splitting or
    /// shrinking as needed so regions never overlap.
    pub fn discard_regions_tmem(&mut self, tmem_start: u32, tmem_words: u32, tmem_mask: u32) {
        let tmem_start = tmem_start & tmem_mask;
        let word_limit = tmem_mask + 1;
        if (tmem_start + tmem_words) > word_limit {
            let left_words = word_limit - tmem_start;
            self.discard_regions_tmem(tmem_start, left_words, tmem_mask);

            let right_words = tmem_words - left_words;
            self.discard_regions_tmem(0, tmem_start.min(right_words), tmem_mask);
            return;
        }

        let tmem_end = tmem_start + tmem_words;
        let mut i = 0;
        while i < self.active_regions_tmem.len() {
            let region = &mut self.active_regions_tmem[i];
            let intersects = (region.tmem_start < tmem_end) && (region.tmem_end > tmem_start);
            if !intersects {
                i += 1;
                continue;
            }

            let mut split_off: Option<RegionTmem> = None;
            if (region.tmem_start >= tmem_start) && (region.tmem_end <= tmem_end) {
                // Fully covered by the discard.
                region.tmem_end = region.tmem_start;
            } else if (region.tmem_start <= tmem_start) && (region.tmem_end < tmem_end) {
                // Right side covered.
                region.fb_tile = FramebufferTile::default();
                region.tmem_end = tmem_start;
            } else if (region.tmem_start > tmem_start) && (region.tmem_end >= tmem_end) {
                // Left side covered.
                region.fb_tile = FramebufferTile::default();
                region.tmem_start = tmem_end;
            } else {
                // Discard strictly inside: shrink left, split off the right.
                region.fb_tile = FramebufferTile::default();
                if region.tmem_end != tmem_end {
                    let mut right = region.clone();
                    right.tmem_start = tmem_end;
                    split_off = Some(right);
                }
                region.tmem_end = tmem_start;
            }

            let empty = region.tmem_start == region.tmem_end;
            if let Some(right) = split_off {
                self.active_regions_tmem.push_back(right);
            }
            if empty {
                self.active_regions_tmem.remove(i);
            } else {
                i += 1;
            }
        }
    }

    pub fn regions_tmem(&self) -> impl Iterator<Item = &RegionTmem> {
        self.active_regions_tmem.iter()
    }

    /// Resolve a sampled tile against the region map.
    pub fn check_tile_copy_tmem(&self, tmem: u32, line_width: u32, siz: u8, fmt: u8) -> CheckCopyResult {
        let rgba32 = (siz == gbi_registers::formats::G_IM_SIZ_32B) && (fmt == G_IM_FMT_RGBA);
        let tmem = if rgba32 { tmem & gbi_registers::TMEM_MASK128 } else { tmem };

        let mut result = CheckCopyResult::default();
        for region in &self.active_regions_tmem {
            if (tmem < region.tmem_start) || (tmem >= region.tmem_end) {
                continue;
            }
            if region.sync_required {
                result.sync_required = true;
            }
            if !region.fb_tile.valid() {
                continue;
            }

            let mut valid_copy = false;
            let mut reinterpret = false;
            let mut tile_width = region.fb_tile.right - region.fb_tile.left;
            let mut tile_line_width = region.fb_tile.line_width;

            // RGBA16 and depth copies convert without a reinterpretation
            // pass, which preserves depth precision.
            let depth_exchange = (region.fb_tile.siz == G_IM_SIZ_16B)
                && (siz == G_IM_SIZ_16B)
                && (((region.fb_tile.fmt == G_IM_FMT_RGBA) && (fmt == G_IM_FMT_DEPTH))
                    || ((region.fb_tile.fmt == G_IM_FMT_DEPTH) && (fmt == G_IM_FMT_RGBA)));
            if depth_exchange {
                // No reinterpretation needed.
            } else if region.fb_tile.siz == G_IM_SIZ_8B {
                // 8-bit sources always need special sampling and decoding.
                reinterpret = true;
            } else if region.fb_tile.fmt != fmt {
                reinterpret = true;
            }

            if (tile_line_width == line_width) && (region.fb_tile.siz == siz) {
                valid_copy = true;
            } else if (tile_line_width < line_width) && (region.fb_tile.siz > siz) {
                let siz_difference = region.fb_tile.siz - siz;
                let siz_multiplier = 1u32 << siz_difference;
                if (tile_line_width * siz_multiplier) == line_width {
                    tile_width *= siz_multiplier;
                    tile_line_width *= siz_multiplier;
                    valid_copy = true;
                    reinterpret = true;
                }
            } else if (tile_line_width > line_width) && (region.fb_tile.siz < siz) {
                let siz_difference = siz - region.fb_tile.siz;
                let siz_multiplier = 1u32 << siz_difference;
                if (line_width * siz_multiplier) == tile_line_width {
                    tile_width /= siz_multiplier;
                    tile_line_width /= siz_multiplier;
                    valid_copy = true;
                    reinterpret = true;
                }
            }

            // RGBA32 needs the mirrored region in the upper TMEM half.
            if valid_copy && rgba32 {
                let upper = TMEM_WORDS >> 1;
                let mirrored = self.active_regions_tmem.iter().any(|other| {
                    !std::ptr::eq(other, region)
                        && (other.tile_copy_id == region.tile_copy_id)
                        && (other.tmem_start == region.tmem_start + upper)
                        && (other.tmem_end == region.tmem_end + upper)
                });
                if !mirrored {
                    valid_copy = false;
                }
            }

            if valid_copy {
                result.tile_id = region.tile_copy_id;
                result.tile_width = tile_width;
                result.line_width = tile_line_width;
                result.tile_height = region.fb_tile.bottom - region.fb_tile.top;
                result.fmt = region.fb_tile.fmt;
                result.siz = region.fb_tile.siz;
                result.reinterpret = reinterpret;
            }

            return result;
        }

        result
    }

    /// Start a new frame of tile-copy reuse tracking.
    pub fn clear_used_tile_copies(&mut self) {
        self.used_timestamp += 1;
    }

    /// Allocate (or reuse) a tile copy with the given used dimensions.
    pub fn find_tile_copy_id(&mut self, width: u32, height: u32) -> u64 {
        debug_assert!(width > 0);
        debug_assert!(height > 0);

        let mut texture_width = width;
        let mut texture_height = height;
        fix_size_to_multiple(&mut texture_width, &mut texture_height);

        let mut new_id = 0;
        for (&id, tile_copy) in self.tile_copies.iter_mut() {
            new_id = new_id.max(id);
            if tile_copy.used_timestamp == self.used_timestamp {
                continue;
            }
            // Only reuse exact matches.
            if (tile_copy.texture_width == texture_width) && (tile_copy.texture_height == texture_height) {
                tile_copy.used_width = width;
                tile_copy.used_height = height;
                tile_copy.used_timestamp = self.used_timestamp;
                return id;
            }
        }

        new_id += 1;
        self.tile_copies.insert(
            new_id,
            TileCopy {
                id: new_id,
                texture_width,
                texture_height,
                used_width: width,
                used_height: height,
                texel_mask: [u32::MAX; 2],
                sample_scale: 1.0,
                used_timestamp: self.used_timestamp,
                ..TileCopy::default()
            },
        );
        new_id
    }

    pub fn tile_copy(&self, id: u64) -> Option<&TileCopy> {
        self.tile_copies.get(&id)
    }

    pub fn tile_copy_mut(&mut self, id: u64) -> Option<&mut TileCopy> {
        self.tile_copies.get_mut(&id)
    }

    pub fn destroy_all_tile_copies(&mut self) {
        self.tile_copies.clear();
    }

    /// Rehash every tracked framebuffer's RDRAM range and return the
    /// addresses whose contents no longer match, updating stored hashes.
    pub fn check_ram(&mut self, rdram: &Rdram) -> Vec<u32> {
        let mut different = Vec::new();
        for (&address, fb) in self.framebuffers.iter_mut() {
            let bytes = fb.ram_bytes() as usize;
            let start = address as usize;
            let Some(ram) = rdram.bytes().get(start..start + bytes) else {
                continue;
            };
            let current_hash = xxh3_64(ram);
            if current_hash != fb.ram_hash {
                fb.ram_hash = current_hash;
                different.push(address);
            }
        }
        different.sort_unstable();
        different
    }

    /// Record the known-good hash and snapshot of every tracked range.
    pub fn hash_tracking(&mut self, rdram: &Rdram) {
        for (&address, fb) in self.framebuffers.iter_mut() {
            if (fb.max_height == 0) || (fb.ram_bytes() == 0) {
                continue;
            }
            let bytes = fb.ram_bytes() as usize;
            let start = address as usize;
            if let Some(ram) = rdram.bytes().get(start..start + bytes) {
                fb.ram_hash = xxh3_64(ram);
                fb.ram_snapshot.clear();
                fb.ram_snapshot.extend_from_slice(ram);
            }
        }
    }

    /// A write landed on `[address_start, address_end)`; mark every other
    /// overlapping framebuffer as stale.
    pub fn change_ram(&mut self, changed_address: u32, address_start: u32, address_end: u32) {
        for (&address, fb) in self.framebuffers.iter_mut() {
            if (address != changed_address) && fb.overlaps(address_start, address_end) {
                fb.rdram_changed = true;
            }
        }
    }

    /// Turn CPU-side differences into upload operations. Framebuffers where
    /// more than a quarter of the bytes changed are considered irrecoverable
    /// and queued for discard instead.
    pub fn upload_ram(
        &mut self,
        rdram: &Rdram,
        different: &[u32],
        can_discard: bool,
        fb_ops: &mut Vec<FramebufferOperation>,
        fb_discards: &mut Vec<u32>,
    ) {
        const DIFFERENCE_FRACTION_NUM: u32 = 1;
        const DIFFERENCE_FRACTION_DIV: u32 = 4;

        for &address in different {
            let change_id = {
                self.change_id_counter += 1;
                self.change_id_counter
            };
            let Some(fb) = self.framebuffers.get_mut(&address) else {
                continue;
            };
            let bytes = fb.ram_bytes() as usize;
            let start = address as usize;
            let Some(ram) = rdram.bytes().get(start..start + bytes) else {
                continue;
            };

            let mut different_bytes = 0u32;
            if fb.ram_snapshot.len() == ram.len() {
                for (a, b) in fb.ram_snapshot.iter().zip(ram.iter()) {
                    if a != b {
                        different_bytes += 1;
                    }
                }
            } else {
                different_bytes = ram.len() as u32;
            }
            fb.ram_snapshot.clear();
            fb.ram_snapshot.extend_from_slice(ram);
            fb.modified_bytes += different_bytes;

            let different_bytes_limit = (fb.ram_bytes() * DIFFERENCE_FRACTION_NUM) / DIFFERENCE_FRACTION_DIV;
            if can_discard && (fb.modified_bytes >= different_bytes_limit) {
                fb_discards.push(address);
            } else {
                fb_ops.push(FramebufferOperation::WriteChanges { address, id: change_id });
            }
        }
    }

    pub fn reset_tracking(&mut self) {
        for fb in self.framebuffers.values_mut() {
            fb.max_height = 0;
            fb.dither_patterns = [0; 4];
        }
    }

    pub fn perform_discards(&mut self, discards: &[u32]) {
        for &address in discards {
            self.framebuffers.remove(&address);
        }
        for tile_copy in self.tile_copies.values_mut() {
            if discards.contains(&tile_copy.address) {
                tile_copy.ignore = true;
            }
        }
    }

    pub fn next_write_timestamp(&mut self) -> u64 {
        self.write_timestamp += 1;
        self.write_timestamp
    }
}
