//! RDP state machine: tile descriptors, TMEM loads, color registers,
//! scissor and the rectangle/triangle submission paths.

pub mod tmem;

use gbi_registers::ex::{G_EX_ORIGIN_NONE, G_EX_ORIGIN_RIGHT};
use gbi_registers::formats::G_IM_SIZ_16B;
use gbi_registers::modes::{G_CYC_COPY, G_CYC_FILL};
use gbi_registers::{OtherMode, RDP_ADDRESS_MASK, TILE_COUNT, TMEM_WORDS};
use rcp_fixed::FixedRect;

use crate::draw::{ColorCombiner, DrawStatus};
use crate::fb::FramebufferManager;
use crate::stack::StateStack;
use crate::state::State;
use crate::workload::{
    CommandWarning, FlushReason, LoadOperation, LoadOperationKind, ProjectionKind, WarningIndex,
};

pub use tmem::TMEM_SIZE;

/// One of the eight RDP tile descriptors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TileDescriptor {
    pub fmt: u8,
    pub siz: u8,
    /// Line stride in 64-bit TMEM words.
    pub line: u16,
    /// TMEM address in 64-bit words.
    pub tmem: u16,
    pub palette: u8,
    pub cms: u8,
    pub cmt: u8,
    pub masks: u8,
    pub maskt: u8,
    pub shifts: u8,
    pub shiftt: u8,
    /// Bounds in 10.2 subtexels.
    pub uls: u16,
    pub ult: u16,
    pub lrs: u16,
    pub lrt: u16,
}

/// The texture image binding loads read from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureImage {
    pub address: u32,
    pub fmt: u8,
    pub siz: u8,
    pub width: u16,
}

/// Origin-relative offsets and bounds applied to rectangles, the scissor
/// and the viewport by the extended command set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtendedAlignment {
    pub left_origin: u16,
    pub right_origin: u16,
    pub left_offset: i32,
    pub top_offset: i32,
    pub right_offset: i32,
    pub bottom_offset: i32,
    pub left_bound: i32,
    pub top_bound: i32,
    pub right_bound: i32,
    pub bottom_bound: i32,
}

impl Default for ExtendedAlignment {
    fn default() -> Self {
        Self {
            left_origin: G_EX_ORIGIN_NONE,
            right_origin: G_EX_ORIGIN_NONE,
            left_offset: 0,
            top_offset: 0,
            right_offset: 0,
            bottom_offset: 0,
            left_bound: i32::MIN,
            top_bound: i32::MIN,
            right_bound: i32::MAX,
            bottom_bound: i32::MAX,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ColorImageState {
    pub address: u32,
    pub fmt: u8,
    pub siz: u8,
    pub width: u16,
    pub changed: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DepthImageState {
    pub address: u32,
    pub changed: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RdpExtendedState {
    pub global_rect: ExtendedAlignment,
    pub global_scissor: ExtendedAlignment,
    pub scissor_left_origin: u16,
    pub scissor_right_origin: u16,
    pub draw_extended_flags: crate::draw::DrawExtendedFlags,
}

pub struct Rdp {
    pub tmem: Box<[u8; TMEM_SIZE]>,
    pub texture: TextureImage,
    pub tiles: [TileDescriptor; TILE_COUNT],
    pub color_image: ColorImageState,
    pub depth_image: DepthImageState,
    pub combine_stack: StateStack<ColorCombiner, 16>,
    pub env_color_stack: StateStack<[f32; 4], 16>,
    pub prim_color_stack: StateStack<[f32; 4], 16>,
    pub prim_lod_stack: StateStack<[f32; 2], 16>,
    pub prim_depth_stack: StateStack<[f32; 2], 16>,
    pub blend_color_stack: StateStack<[f32; 4], 16>,
    pub fog_color_stack: StateStack<[f32; 4], 16>,
    pub fill_color_stack: StateStack<u32, 16>,
    pub scissor_rect_stack: StateStack<FixedRect, 16>,
    pub scissor_mode_stack: StateStack<u8, 16>,
    pub other_mode: OtherMode,
    pub convert_k: [i32; 6],
    pub key_center: [f32; 3],
    pub key_scale: [f32; 3],
    pub extended: RdpExtendedState,
}

impl Rdp {
    pub fn new() -> Self {
        Self {
            tmem: Box::new([0; TMEM_SIZE]),
            texture: TextureImage::default(),
            tiles: [TileDescriptor::default(); TILE_COUNT],
            color_image: ColorImageState::default(),
            depth_image: DepthImageState::default(),
            combine_stack: StateStack::new(ColorCombiner::default()),
            env_color_stack: StateStack::new([0.0; 4]),
            prim_color_stack: StateStack::new([0.0; 4]),
            prim_lod_stack: StateStack::new([0.0; 2]),
            prim_depth_stack: StateStack::new([0.0; 2]),
            blend_color_stack: StateStack::new([0.0; 4]),
            fog_color_stack: StateStack::new([0.0; 4]),
            fill_color_stack: StateStack::new(0),
            scissor_rect_stack: StateStack::new(FixedRect::new(0, 0, 8192, 8192)),
            scissor_mode_stack: StateStack::new(0),
            other_mode: OtherMode::default(),
            convert_k: [0; 6],
            key_center: [0.0; 3],
            key_scale: [0.0; 3],
            extended: RdpExtendedState::default(),
        }
    }

    pub fn reset(&mut self) {
        self.combine_stack.reset_to(ColorCombiner::default());
        self.env_color_stack.reset_to([0.0; 4]);
        self.prim_color_stack.reset_to([0.0; 4]);
        self.prim_lod_stack.reset_to([0.0; 2]);
        self.prim_depth_stack.reset_to([0.0; 2]);
        self.blend_color_stack.reset_to([0.0; 4]);
        self.fog_color_stack.reset_to([0.0; 4]);
        self.fill_color_stack.reset_to(0);
        self.scissor_rect_stack.reset_to(FixedRect::new(0, 0, 8192, 8192));
        self.scissor_mode_stack.reset_to(0);
        self.other_mode = OtherMode::default();
        self.convert_k = [0; 6];
        self.key_center = [0.0; 3];
        self.key_scale = [0.0; 3];
        self.extended = RdpExtendedState::default();
    }

    pub fn scissor_rect(&self) -> &FixedRect {
        self.scissor_rect_stack.top()
    }

    /// Sampled line width in texels for a tile, from its TMEM line stride.
    pub fn tile_line_width(tile: &TileDescriptor) -> u32 {
        let rgba32 = (tile.siz == gbi_registers::formats::G_IM_SIZ_32B)
            && (tile.fmt == gbi_registers::formats::G_IM_FMT_RGBA);
        let line_shift = u32::from(rgba32);
        (tile.line as u32) << ((4 + line_shift) - tile.siz as u32)
    }
}

impl Default for Rdp {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    /// Map an origin-relative X coordinate onto the current color image.
    pub fn moved_from_origin(&self, x: i32, ori: u16) -> i32 {
        if ori < G_EX_ORIGIN_NONE {
            x + ((ori as i32 * self.rdp.color_image.width as i32 * 4) / G_EX_ORIGIN_RIGHT as i32)
        } else {
            x
        }
    }

    /// Apply the RDP's physical address masking.
    pub fn mask_address(&self, address: u32) -> u32 {
        if self.extended.extend_rdram && ((address & 0xF000_0000) == 0x8000_0000) {
            return address - 0x8000_0000;
        }
        address & RDP_ADDRESS_MASK
    }

    /// Open a new framebuffer pair if the image bindings changed since the
    /// last draw (or none exists yet).
    pub fn check_framebuffer_pair(&mut self) {
        let no_pair = self.workload.fb_pairs.is_empty();
        if self.rdp.color_image.changed || self.rdp.depth_image.changed || no_pair {
            if !no_pair {
                self.flush();
                let reason = if self.rdp.color_image.changed {
                    FlushReason::ColorImageChanged
                } else {
                    FlushReason::DepthImageChanged
                };
                self.submit_framebuffer_pair(reason);
            }

            let color = crate::workload::ColorImage {
                address: self.rdp.color_image.address,
                fmt: self.rdp.color_image.fmt,
                siz: self.rdp.color_image.siz,
                width: self.rdp.color_image.width,
            };
            let depth = crate::workload::DepthImage {
                address: self.rdp.depth_image.address,
            };
            self.workload.add_framebuffer_pair(color, depth);
            self.rdp.color_image.changed = false;
            self.rdp.depth_image.changed = false;
            self.update_draw_status_attribute(DrawStatus::FRAMEBUFFER_PAIR);
        }
    }

    /// A texture load is about to read `[address_start, address_end)`. If
    /// that range intersects the pixels the current pair has drawn, the pair
    /// must be emitted first so the GPU holds the finished image.
    pub fn check_image_overlap(&mut self, address_start: u32, address_end: u32) {
        let Some(pair) = self.workload.current_pair() else {
            return;
        };
        let Some((color_start, color_end)) = pair.color_write_range() else {
            return;
        };

        let mut overlap_detected = false;
        if (address_start < color_end) && (address_end > color_start) {
            self.rdp.color_image.changed = true;
            overlap_detected = true;
        } else if pair.depth_write {
            let Some((depth_start, depth_end)) = pair.depth_write_range() else {
                return;
            };
            if (address_start < depth_end) && (address_end > depth_start) {
                self.rdp.depth_image.changed = true;
                overlap_detected = true;
            }
        }

        if overlap_detected {
            let reason = if self.rdp.color_image.changed {
                FlushReason::SamplingFromColorImage
            } else {
                FlushReason::SamplingFromDepthImage
            };
            self.flush();
            self.submit_framebuffer_pair(reason);
        }
    }

    /// A texture load landed on TMEM words that may belong to a live
    /// framebuffer. Tag the affected regions; when a rectangle copy is
    /// possible, allocate a tile copy and queue the operation that fills it.
    #[allow(clippy::too_many_arguments)]
    pub fn check_framebuffer_overlap(
        &mut self,
        tmem_start: u32,
        tmem_words: u32,
        tmem_mask: u32,
        address_start: u32,
        address_end: u32,
        tile_width: u32,
        tile_height: u32,
        rgba32: bool,
        make_tile_copy: bool,
    ) {
        let Some(fb) = self.fb_manager.find_most_recent_containing(address_start, address_end) else {
            return;
        };
        if !self.config.copy_with_gpu {
            return;
        }

        let fb_address = fb.address_start;
        let fb_end = fb.address_start + fb.image_row_bytes(fb.width) * fb.max_height;
        let fb_tile = if make_tile_copy {
            self.fb_manager
                .make_framebuffer_tile(fb, address_start, address_end, tile_width, tile_height, rgba32)
        } else {
            None
        };

        // Regions are tagged whether or not a copy could be formed.
        let sync_required = (fb_address < address_end) && (fb_end > address_start);
        let inserted = self.fb_manager.insert_regions_tmem(
            fb_address,
            tmem_start,
            tmem_words.min(TMEM_WORDS),
            tmem_mask,
            rgba32,
            sync_required,
        );

        if let Some(tile) = fb_tile {
            let new_tile_width = tile.right - tile.left;
            let new_tile_height = tile.bottom - tile.top;
            let new_tile_id = self.fb_manager.find_tile_copy_id(new_tile_width, new_tile_height);
            self.fb_manager.bind_front_regions(inserted, &tile, new_tile_id);
            self.draw_fb_operations
                .push(FramebufferManager::make_tile_copy_operation(new_tile_id, tile));
        }
    }

    pub fn set_color_image(&mut self, fmt: u8, siz: u8, width: u16, address: u32) {
        // Some games rebind the same image; only a real change flushes.
        let new_address = self.mask_address(address);
        let ci = &mut self.rdp.color_image;
        if (ci.fmt != fmt) || (ci.siz != siz) || (ci.width != width) || (ci.address != new_address) {
            ci.fmt = fmt;
            ci.siz = siz;
            ci.width = width;
            ci.address = new_address;
            ci.changed = true;
        }
    }

    pub fn set_depth_image(&mut self, address: u32) {
        let new_address = self.mask_address(address);
        if self.rdp.depth_image.address != new_address {
            self.rdp.depth_image.address = new_address;
            self.rdp.depth_image.changed = true;
        }
    }

    pub fn set_texture_image(&mut self, fmt: u8, siz: u8, width: u16, address: u32) {
        self.rdp.texture = TextureImage {
            address: self.mask_address(address),
            fmt,
            siz,
            width,
        };
        self.update_draw_status_attribute(DrawStatus::TEXTURE);
    }

    pub fn set_combine(&mut self, combine: u64) {
        let combiner = self.rdp.combine_stack.top_mut();
        combiner.l = combine as u32;
        combiner.h = (combine >> 32) as u32;
        self.update_draw_status_attribute(DrawStatus::COMBINE);
    }

    pub fn push_combine(&mut self) {
        self.rdp.combine_stack.push();
    }

    pub fn pop_combine(&mut self) {
        if self.rdp.combine_stack.pop() {
            self.update_draw_status_attribute(DrawStatus::COMBINE);
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_tile(
        &mut self,
        tile: u8,
        fmt: u8,
        siz: u8,
        line: u16,
        tmem: u16,
        palette: u8,
        cmt: u8,
        cms: u8,
        maskt: u8,
        masks: u8,
        shiftt: u8,
        shifts: u8,
    ) {
        let t = &mut self.rdp.tiles[(tile as usize) & (TILE_COUNT - 1)];
        t.fmt = fmt;
        t.siz = siz;
        t.line = line;
        t.tmem = tmem;
        t.palette = palette;
        t.cmt = cmt;
        t.cms = cms;
        t.masks = masks;
        t.maskt = maskt;
        t.shifts = shifts;
        t.shiftt = shiftt;
        self.update_draw_status_attribute(DrawStatus::TEXTURE);
    }

    pub fn set_tile_size(&mut self, tile: u8, uls: u16, ult: u16, lrs: u16, lrt: u16) {
        let t = &mut self.rdp.tiles[(tile as usize) & (TILE_COUNT - 1)];
        t.uls = uls;
        t.ult = ult;
        t.lrs = lrs;
        t.lrt = lrt;
        self.update_draw_status_attribute(DrawStatus::TEXTURE);
    }

    fn warn_size_mismatch(&mut self, op: &str, tile: u8, tile_siz: u8) {
        if !self.config.developer_mode {
            return;
        }
        let load_index = self.workload.draw_data.load_operations.len() as u32;
        if tile_siz != self.rdp.texture.siz {
            self.workload.command_warnings.push(CommandWarning {
                message: format!(
                    "Load operation #{}: {} with texture image siz {} and tile descriptor #{} with siz {}. \
                     Pixel size mismatch might not work correctly.",
                    load_index, op, self.rdp.texture.siz, tile, tile_siz
                ),
                index: WarningIndex::Load(load_index),
            });
        }
    }

    pub fn load_tile(&mut self, tile: u8, uls: u16, ult: u16, lrs: u16, lrt: u16) {
        let index = (tile as usize) & (TILE_COUNT - 1);
        {
            let t = &mut self.rdp.tiles[index];
            t.uls = uls;
            t.ult = ult;
            t.lrs = lrs;
            t.lrt = lrt;
        }

        // Ignored by the hardware.
        if self.rdp.tiles[index].uls > self.rdp.tiles[index].lrs {
            return;
        }

        self.warn_size_mismatch("load tile", tile, self.rdp.tiles[index].siz);

        let t = self.rdp.tiles[index];
        let texture = self.rdp.texture;
        let p = tmem::tile_load_params(&t, &texture);
        self.check_image_overlap(p.texture_start, p.texture_end);
        self.fb_manager
            .discard_regions_tmem(p.tmem_start >> 3, p.tmem_bytes >> 3, p.tmem_word_mask);
        self.check_framebuffer_overlap(
            p.tmem_start >> 3,
            p.tmem_bytes >> 3,
            p.tmem_word_mask,
            p.texture_start,
            p.texture_end,
            p.line_width,
            p.row_count,
            p.rgba32,
            true,
        );

        tmem::load_to_tmem(
            &mut self.rdp.tmem,
            &self.rdram,
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

        self.workload.draw_data.load_operations.push(LoadOperation {
            kind: LoadOperationKind::Tile { tile, uls, ult, lrs, lrt },
            tile: t,
            texture,
        });
        self.update_draw_status_attribute(DrawStatus::TEXTURE);
    }

    pub fn load_block(&mut self, tile: u8, uls: u16, ult: u16, lrs: u16, dxt: u16) {
        let index = (tile as usize) & (TILE_COUNT - 1);
        {
            let t = &mut self.rdp.tiles[index];
            t.uls = uls;
            t.ult = ult;
            t.lrs = lrs;
            t.lrt = dxt;
        }

        // Ignored by the hardware.
        if (self.rdp.tiles[index].uls > self.rdp.tiles[index].lrs) || (self.rdp.tiles[index].lrs >= 0x800) {
            return;
        }

        self.warn_size_mismatch("load block", tile, self.rdp.tiles[index].siz);

        let t = self.rdp.tiles[index];
        let texture = self.rdp.texture;
        let p = tmem::block_load_params(&t, &texture);
        self.check_image_overlap(p.texture_start, p.texture_end);
        self.fb_manager
            .discard_regions_tmem(p.tmem_start >> 3, p.tmem_bytes >> 3, p.tmem_word_mask);
        self.check_framebuffer_overlap(
            p.tmem_start >> 3,
            p.tmem_bytes >> 3,
            p.tmem_word_mask,
            p.texture_start,
            p.texture_end,
            0,
            0,
            p.rgba32,
            true,
        );

        tmem::load_to_tmem(
            &mut self.rdp.tmem,
            &self.rdram,
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

        self.workload.draw_data.load_operations.push(LoadOperation {
            kind: LoadOperationKind::Block { tile, uls, ult, lrs, dxt },
            tile: t,
            texture,
        });
        self.update_draw_status_attribute(DrawStatus::TEXTURE);
    }

    pub fn load_tlut(&mut self, tile: u8, uls: u16, ult: u16, lrs: u16, lrt: u16) {
        let index = (tile as usize) & (TILE_COUNT - 1);
        {
            let t = &mut self.rdp.tiles[index];
            t.uls = uls;
            t.ult = ult;
            t.lrs = lrs;
            t.lrt = lrt;
        }

        if self.config.developer_mode {
            let load_index = self.workload.draw_data.load_operations.len() as u32;
            if self.rdp.texture.siz != G_IM_SIZ_16B {
                self.workload.command_warnings.push(CommandWarning {
                    message: format!(
                        "Load operation #{}: palette load from a texture image with siz {}. \
                         Palettes that don't use 16-bit formats might not work correctly.",
                        load_index, self.rdp.texture.siz
                    ),
                    index: WarningIndex::Load(load_index),
                });
            }
        }

        let t = self.rdp.tiles[index];
        let texture = self.rdp.texture;
        let p = tmem::tlut_load_params(&t, &texture);
        self.check_image_overlap(p.texture_start, p.texture_end);
        self.fb_manager
            .discard_regions_tmem(p.tmem_start >> 3, p.tmem_bytes >> 3, p.tmem_word_mask);
        self.check_framebuffer_overlap(
            p.tmem_start >> 3,
            p.tmem_bytes >> 3,
            p.tmem_word_mask,
            p.texture_start,
            p.texture_end,
            0,
            0,
            p.rgba32,
            false,
        );

        tmem::load_to_tmem(
            &mut self.rdp.tmem,
            &self.rdram,
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

        self.workload.draw_data.load_operations.push(LoadOperation {
            kind: LoadOperationKind::Tlut { tile, uls, ult, lrs, lrt },
            tile: t,
            texture,
        });
        self.update_draw_status_attribute(DrawStatus::TEXTURE);
    }

    fn unpack_color(color: u32) -> [f32; 4] {
        [
            ((color >> 24) & 0xFF) as f32 / 255.0,
            ((color >> 16) & 0xFF) as f32 / 255.0,
            ((color >> 8) & 0xFF) as f32 / 255.0,
            (color & 0xFF) as f32 / 255.0,
        ]
    }

    pub fn set_env_color(&mut self, color: u32) {
        *self.rdp.env_color_stack.top_mut() = Self::unpack_color(color);
        self.update_draw_status_attribute(DrawStatus::ENV_COLOR);
    }

    pub fn push_env_color(&mut self) {
        self.rdp.env_color_stack.push();
    }

    pub fn pop_env_color(&mut self) {
        if self.rdp.env_color_stack.pop() {
            self.update_draw_status_attribute(DrawStatus::ENV_COLOR);
        }
    }

    pub fn set_prim_color(&mut self, lod_frac: u8, lod_min: u8, color: u32) {
        *self.rdp.prim_lod_stack.top_mut() = [lod_frac as f32 / 256.0, lod_min as f32 / 32.0];
        *self.rdp.prim_color_stack.top_mut() = Self::unpack_color(color);
        self.update_draw_status_attribute(DrawStatus::PRIM_COLOR);
    }

    pub fn push_prim_color(&mut self) {
        self.rdp.prim_color_stack.push();
        self.rdp.prim_lod_stack.push();
    }

    pub fn pop_prim_color(&mut self) {
        let popped = self.rdp.prim_color_stack.pop();
        self.rdp.prim_lod_stack.pop();
        if popped {
            self.update_draw_status_attribute(DrawStatus::PRIM_COLOR);
        }
    }

    pub fn set_blend_color(&mut self, color: u32) {
        *self.rdp.blend_color_stack.top_mut() = Self::unpack_color(color);
        self.update_draw_status_attribute(DrawStatus::BLEND_COLOR);
    }

    pub fn push_blend_color(&mut self) {
        self.rdp.blend_color_stack.push();
    }

    pub fn pop_blend_color(&mut self) {
        if self.rdp.blend_color_stack.pop() {
            self.update_draw_status_attribute(DrawStatus::BLEND_COLOR);
        }
    }

    pub fn set_fog_color(&mut self, color: u32) {
        *self.rdp.fog_color_stack.top_mut() = Self::unpack_color(color);
        self.update_draw_status_attribute(DrawStatus::FOG_COLOR);
    }

    pub fn push_fog_color(&mut self) {
        self.rdp.fog_color_stack.push();
    }

    pub fn pop_fog_color(&mut self) {
        if self.rdp.fog_color_stack.pop() {
            self.update_draw_status_attribute(DrawStatus::FOG_COLOR);
        }
    }

    pub fn set_fill_color(&mut self, color: u32) {
        *self.rdp.fill_color_stack.top_mut() = color;
        self.update_draw_status_attribute(DrawStatus::FILL_COLOR);
    }

    pub fn push_fill_color(&mut self) {
        self.rdp.fill_color_stack.push();
    }

    pub fn pop_fill_color(&mut self) {
        if self.rdp.fill_color_stack.pop() {
            self.update_draw_status_attribute(DrawStatus::FILL_COLOR);
        }
    }

    pub fn rdp_set_other_mode(&mut self, hi: u32, lo: u32) {
        self.rdp.other_mode = OtherMode::new(hi, lo);
        self.update_draw_status_attribute(DrawStatus::OTHER_MODE);
    }

    pub fn set_prim_depth(&mut self, z: u16, dz: u16) {
        const FIXED15_TO_FLOAT: f32 = 1.0 / 32767.0;
        const FIXED16_TO_FLOAT: f32 = 1.0 / 65535.0;
        *self.rdp.prim_depth_stack.top_mut() = [
            (z & 0x7FFF) as f32 * FIXED15_TO_FLOAT,
            dz as f32 * FIXED16_TO_FLOAT,
        ];
        self.update_draw_status_attribute(DrawStatus::PRIM_DEPTH);
    }

    pub fn set_scissor(&mut self, mode: u8, ulx: i32, uly: i32, lrx: i32, lry: i32) {
        let alignment = self.rdp.extended.global_scissor;
        self.set_scissor_aligned(mode, ulx, uly, lrx, lry, &alignment);
    }

    pub fn set_scissor_aligned(
        &mut self,
        mode: u8,
        ulx: i32,
        uly: i32,
        lrx: i32,
        lry: i32,
        alignment: &ExtendedAlignment,
    ) {
        let left = self
            .moved_from_origin(ulx + alignment.left_offset, alignment.left_origin)
            .clamp(alignment.left_bound, alignment.right_bound);
        let right = self
            .moved_from_origin(lrx + alignment.right_offset, alignment.right_origin)
            .clamp(alignment.left_bound, alignment.right_bound);
        let rect = self.rdp.scissor_rect_stack.top_mut();
        rect.ulx = left;
        rect.uly = (uly + alignment.top_offset).clamp(alignment.top_bound, alignment.bottom_bound);
        rect.lrx = right;
        rect.lry = (lry + alignment.bottom_offset).clamp(alignment.top_bound, alignment.bottom_bound);
        *self.rdp.scissor_mode_stack.top_mut() = mode;
        self.rdp.extended.scissor_left_origin = alignment.left_origin;
        self.rdp.extended.scissor_right_origin = alignment.right_origin;
        self.update_draw_status_attribute(DrawStatus::SCISSOR);
    }

    pub fn push_scissor(&mut self) {
        self.rdp.scissor_rect_stack.push();
        self.rdp.scissor_mode_stack.push();
    }

    pub fn pop_scissor(&mut self) {
        let popped = self.rdp.scissor_rect_stack.pop();
        self.rdp.scissor_mode_stack.pop();
        if popped {
            self.update_draw_status_attribute(DrawStatus::SCISSOR);
        }
    }

    pub fn set_convert(&mut self, k: [i32; 6]) {
        self.rdp.convert_k = k;
        self.update_draw_status_attribute(DrawStatus::CONVERT);
    }

    pub fn set_key_r(&mut self, c_r: u32, s_r: u32, _w_r: u32) {
        self.rdp.key_center[0] = c_r as f32 / 255.0;
        self.rdp.key_scale[0] = s_r as f32 / 255.0;
        self.update_draw_status_attribute(DrawStatus::KEY);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_key_gb(&mut self, c_g: u32, s_g: u32, _w_g: u32, c_b: u32, s_b: u32, _w_b: u32) {
        self.rdp.key_center[1] = c_g as f32 / 255.0;
        self.rdp.key_center[2] = c_b as f32 / 255.0;
        self.rdp.key_scale[1] = s_g as f32 / 255.0;
        self.rdp.key_scale[2] = s_b as f32 / 255.0;
        self.update_draw_status_attribute(DrawStatus::KEY);
    }

    pub fn fill_rect(&mut self, ulx: i32, uly: i32, lrx: i32, lry: i32) {
        let alignment = self.rdp.extended.global_rect;
        self.fill_rect_aligned(ulx, uly, lrx, lry, &alignment);
    }

    pub fn fill_rect_aligned(&mut self, ulx: i32, uly: i32, mut lrx: i32, mut lry: i32, alignment: &ExtendedAlignment) {
        if (lrx < ulx) || (lry < uly) {
            return;
        }

        let cycle = self.rdp.other_mode.cycle_type();
        if (cycle == G_CYC_COPY) || (cycle == G_CYC_FILL) {
            lrx |= 3;
            lry |= 3;
        }

        self.draw_rect_aligned(ulx, uly, lrx, lry, 0, 0, 0, 0, false, alignment);
    }

    pub fn set_rect_align(&mut self, alignment: ExtendedAlignment) {
        self.rdp.extended.global_rect = alignment;
    }

    pub fn set_scissor_align(&mut self, alignment: ExtendedAlignment) {
        self.rdp.extended.global_scissor = alignment;
    }

    pub fn force_upscale_2d(&mut self, force: bool) {
        self.rdp.extended.draw_extended_flags.force_upscale_2d = force;
        self.update_draw_status_attribute(DrawStatus::EXTENDED_FLAGS);
    }

    pub fn force_true_bilerp(&mut self, mode: u8) {
        self.rdp.extended.draw_extended_flags.force_true_bilerp = mode;
        self.update_draw_status_attribute(DrawStatus::EXTENDED_FLAGS);
    }

    pub fn force_scale_lod(&mut self, force: bool) {
        self.rdp.extended.draw_extended_flags.force_scale_lod = force;
        self.update_draw_status_attribute(DrawStatus::EXTENDED_FLAGS);
    }

    /// Raw screen-space triangles from the low-level triangle path.
    ///
    /// `pos` is `tri_count * 12` floats of (X, Y, Z, W), `tc` is
    /// `tri_count * 6` floats of (U, V) and `col` is `tri_count * 12`
    /// floats of (R, G, B, A).
    pub fn draw_tris(&mut self, tri_count: u32, pos: &[f32], tc: &[f32], col: &[f32], tile: u8, levels: u8) {
        // Levels arrives zero-based.
        let levels = levels + 1;

        if (self.draw_call.texture_on == 0)
            || (self.draw_call.texture_tile != tile)
            || (self.draw_call.texture_levels != levels)
        {
            self.draw_call.texture_on = 1;
            self.draw_call.texture_tile = tile;
            self.draw_call.texture_levels = levels;
            self.update_draw_status_attribute(DrawStatus::TEXTURE);
        }

        self.check_framebuffer_pair();

        let in_triangle_projection = self
            .workload
            .current_pair()
            .map(|pair| pair.in_projection(0, ProjectionKind::Triangle))
            .unwrap_or(false);
        if !in_triangle_projection {
            self.flush();
            if let Some(pair) = self.workload.current_pair_mut() {
                pair.change_projection(0, ProjectionKind::Triangle);
            }
        }

        let flushed_state = self.check_draw_state();
        self.draw_call.min_world_matrix = 0;
        self.draw_call.max_world_matrix = 0;
        if flushed_state {
            self.load_draw_state();
        }

        const POS_FLOATS_PER_VERTEX: usize = 4;
        let vertex_count = (tri_count * 3) as usize;
        let draw_data = &mut self.workload.draw_data;
        draw_data.tri_pos_floats.extend_from_slice(&pos[..vertex_count * 4]);
        draw_data.tri_tc_floats.extend_from_slice(&tc[..vertex_count * 2]);
        draw_data.tri_color_floats.extend_from_slice(&col[..vertex_count * 4]);
        self.draw_call.triangle_count += tri_count;

        let scissor_rect = *self.rdp.scissor_rect_stack.top();
        if !scissor_rect.is_null() {
            if let Some(pair) = self.workload.current_pair_mut() {
                pair.scissor_rect.merge(&scissor_rect);

                let mut draw_rect = FixedRect::null();
                for i in 0..vertex_count {
                    let x = pos[i * POS_FLOATS_PER_VERTEX];
                    let y = pos[i * POS_FLOATS_PER_VERTEX + 1];
                    draw_rect.ulx = draw_rect.ulx.min((x * 4.0) as i32);
                    draw_rect.uly = draw_rect.uly.min((y * 4.0) as i32);
                    draw_rect.lrx = draw_rect.lrx.max((x.ceil() * 4.0) as i32);
                    draw_rect.lry = draw_rect.lry.max((y.ceil() * 4.0) as i32);
                }

                let int_rect = scissor_rect.intersection(&draw_rect);
                if !int_rect.is_null() {
                    pair.draw_color_rect.merge(&int_rect);
                    if self.rdp.other_mode.z_upd() {
                        pair.draw_depth_rect.merge(&int_rect);
                    }
                }
            }
        }
    }

    pub fn draw_tex_rect(
        &mut self,
        ulx: i32,
        uly: i32,
        lrx: i32,
        lry: i32,
        tile: u8,
        uls: i16,
        ult: i16,
        dsdx: i16,
        dtdy: i16,
        flip: bool,
    ) {
        let alignment = self.rdp.extended.global_rect;
        self.draw_tex_rect_aligned(ulx, uly, lrx, lry, tile, uls, ult, dsdx, dtdy, flip, &alignment);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn draw_tex_rect_aligned(
        &mut self,
        ulx: i32,
        uly: i32,
        mut lrx: i32,
        mut lry: i32,
        tile: u8,
        uls: i16,
        ult: i16,
        mut dsdx: i16,
        dtdy: i16,
        flip: bool,
        alignment: &ExtendedAlignment,
    ) {
        if (self.draw_call.texture_on == 0)
            || (self.draw_call.texture_tile != tile)
            || (self.draw_call.texture_levels != 1)
        {
            self.draw_call.texture_on = 1;
            self.draw_call.texture_tile = tile;
            self.draw_call.texture_levels = 1;
            self.update_draw_status_attribute(DrawStatus::TEXTURE);
        }

        // Copy mode steps a whole texel per pixel pair and draws the extra
        // edge pixel.
        if self.rdp.other_mode.cycle_type() == G_CYC_COPY {
            dsdx >>= 2;
            lrx |= 3;
            lry |= 3;
        }

        self.draw_rect_aligned(ulx, uly, lrx, lry, uls, ult, dsdx, dtdy, flip, alignment);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn draw_rect_aligned(
        &mut self,
        mut ulx: i32,
        mut uly: i32,
        mut lrx: i32,
        mut lry: i32,
        uls: i16,
        ult: i16,
        dsdx: i16,
        dtdy: i16,
        flip: bool,
        alignment: &ExtendedAlignment,
    ) {
        // Fill and copy cycles truncate the upper-left to whole pixels.
        let cycle = self.rdp.other_mode.cycle_type();
        if (cycle == G_CYC_FILL) || (cycle == G_CYC_COPY) {
            ulx &= !3;
            uly &= !3;
        }

        ulx += alignment.left_offset;
        uly += alignment.top_offset;
        lrx += alignment.right_offset;
        lry += alignment.bottom_offset;

        let draw_rect = FixedRect::new(
            self.moved_from_origin(ulx, alignment.left_origin),
            uly,
            self.moved_from_origin(lrx, alignment.right_origin),
            lry,
        );
        if draw_rect.is_empty() {
            return;
        }

        self.check_framebuffer_pair();

        // Every rectangle is its own call.
        self.flush();

        if let Some(pair) = self.workload.current_pair_mut() {
            if !pair.in_projection(0, ProjectionKind::Rectangle) {
                pair.change_projection(0, ProjectionKind::Rectangle);
            }
        }

        let scissor_rect = *self.rdp.scissor_rect_stack.top();
        if !scissor_rect.is_null() {
            let z_upd = self.rdp.other_mode.z_upd();
            if let Some(pair) = self.workload.current_pair_mut() {
                pair.scissor_rect.merge(&scissor_rect);
                let int_rect = scissor_rect.intersection(&draw_rect);
                if !int_rect.is_null() {
                    pair.draw_color_rect.merge(&int_rect);
                    if z_upd {
                        pair.draw_depth_rect.merge(&int_rect);
                    }
                }
            }
        }

        let flushed_state = self.check_draw_state();

        self.draw_call.min_world_matrix = 0;
        self.draw_call.max_world_matrix = 0;
        self.draw_call.rect = draw_rect;
        self.draw_call.rect_dsdx = dsdx;
        self.draw_call.rect_dtdy = dtdy;
        self.draw_call.rect_left_origin = alignment.left_origin;
        self.draw_call.rect_right_origin = alignment.right_origin;

        if flushed_state {
            self.load_draw_state();
        }

        const RECT_POS_FLOATS: [f32; 24] = [
            -1.0, 1.0, 0.0, 1.0, //
            1.0, 1.0, 0.0, 1.0, //
            -1.0, -1.0, 0.0, 1.0, //
            1.0, -1.0, 0.0, 1.0, //
            1.0, 1.0, 0.0, 1.0, //
            -1.0, -1.0, 0.0, 1.0,
        ];
        const RECT_COLOR_FLOATS: [f32; 24] = [0.0; 24];

        let draw_data = &mut self.workload.draw_data;
        draw_data.tri_pos_floats.extend_from_slice(&RECT_POS_FLOATS);
        draw_data.tri_color_floats.extend_from_slice(&RECT_COLOR_FLOATS);

        let rect_width = draw_rect.width(true, true);
        let rect_height = draw_rect.height(true, true);
        let uv_width = (if flip { rect_height } else { rect_width }) << 2;
        let uv_height = (if flip { rect_width } else { rect_height }) << 2;
        let lrs = (((uls as i32) << 7) + (dsdx as i32) * uv_width) >> 7;
        let lrt = (((ult as i32) << 7) + (dtdy as i32) * uv_height) >> 7;
        let v_fraction_offset = if (uly & 0x3) != 0 {
            ((dtdy >> 5) as f32) / 32.0
        } else {
            0.0
        };
        let u1 = uls as f32 / 32.0;
        let v1 = ult as f32 / 32.0 + v_fraction_offset;
        let u2 = lrs as f32 / 32.0;
        let v2 = lrt as f32 / 32.0 + v_fraction_offset;
        let uv = [
            (u1, v1),
            (if flip { u1 } else { u2 }, if flip { v2 } else { v1 }),
            (if flip { u2 } else { u1 }, if flip { v1 } else { v2 }),
            (u2, v2),
            (if flip { u1 } else { u2 }, if flip { v2 } else { v1 }),
            (if flip { u2 } else { u1 }, if flip { v1 } else { v2 }),
        ];
        for (u, v) in uv {
            draw_data.tri_tc_floats.push(u);
            draw_data.tri_tc_floats.push(v);
        }
        self.draw_call.triangle_count += 2;

        // Track the texcoords the rectangle can actually sample; clip by the
        // scissor when it cuts into the rectangle.
        let compute_intersection = !scissor_rect.is_null() && !scissor_rect.fully_inside(&draw_rect);
        if compute_intersection {
            let intersection = scissor_rect.intersection(&draw_rect);
            if !intersection.is_null() {
                let left_pixels = intersection.left(true) - draw_rect.left(true);
                let top_pixels = intersection.top(true) - draw_rect.top(true);
                let right_pixels = intersection.right(true) - draw_rect.left(true);
                let bottom_pixels = intersection.bottom(true) - draw_rect.top(true);
                let ramp = |base: i16, step: i16, pixels: i32| {
                    ((((base as i32) << 7) + (step as i32) * (pixels << 2)) >> 7) as f32 / 32.0
                };
                let int_u1 = ramp(uls, dsdx, if flip { top_pixels } else { left_pixels });
                let int_v1 = ramp(ult, dtdy, if flip { left_pixels } else { top_pixels }) + v_fraction_offset;
                let int_u2 = ramp(uls, dsdx, if flip { bottom_pixels } else { right_pixels });
                let int_v2 = ramp(ult, dtdy, if flip { right_pixels } else { bottom_pixels }) + v_fraction_offset;
                self.update_call_texcoords(int_u1, int_v1);
                self.update_call_texcoords(int_u2, int_v2);
            }
        } else {
            self.update_call_texcoords(u1, v1);
            self.update_call_texcoords(u2, v2);
        }
    }

    /// Widen the sampled-texcoord bounds of the current call's tiles.
    pub fn update_call_texcoords(&mut self, u: f32, v: f32) {
        let start = self.draw_call.tile_index as usize;
        let count = self.draw_call.tile_count as usize;
        for call_tile in self
            .workload
            .draw_data
            .call_tiles
            .iter_mut()
            .skip(start)
            .take(count)
        {
            call_tile.min_texcoord[0] = call_tile.min_texcoord[0].min(u as i32);
            call_tile.min_texcoord[1] = call_tile.min_texcoord[1].min(v as i32);
            call_tile.max_texcoord[0] = call_tile.max_texcoord[0].max(u.ceil() as i32);
            call_tile.max_texcoord[1] = call_tile.max_texcoord[1].max(v.ceil() as i32);
        }
    }
}
