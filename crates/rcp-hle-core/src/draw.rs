//! Draw-call accumulation: the rolling call builder and its dirty tracking.

use bitflags::bitflags;
use gbi_registers::OtherMode;
use rcp_fixed::FixedRect;

use crate::rdp::TileDescriptor;

/// The two halves of the color combiner pattern register.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColorCombiner {
    pub l: u32,
    pub h: u32,
}

bitflags! {
    /// Dirty bits for the state a draw call snapshots. Any set bit forces a
    /// flush of the accumulated call before more geometry is added.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct DrawStatus: u32 {
        const FRAMEBUFFER_PAIR = 1 << 0;
        const TEXTURE = 1 << 1;
        const COMBINE = 1 << 2;
        const OTHER_MODE = 1 << 3;
        const GEOMETRY_MODE = 1 << 4;
        const OBJ_RENDER_MODE = 1 << 5;
        const ENV_COLOR = 1 << 6;
        const PRIM_COLOR = 1 << 7;
        const BLEND_COLOR = 1 << 8;
        const FOG_COLOR = 1 << 9;
        const FILL_COLOR = 1 << 10;
        const PRIM_DEPTH = 1 << 11;
        const SCISSOR = 1 << 12;
        const CONVERT = 1 << 13;
        const KEY = 1 << 14;
        const LIGHTS = 1 << 15;
        const EXTENDED_TYPE = 1 << 16;
        const EXTENDED_FLAGS = 1 << 17;
    }
}

/// Extra behavior attached to a draw call by the extended command set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DrawExtended {
    #[default]
    None,
    /// Occlusion probe: test the vertex's screen Z against the depth buffer.
    VertexTestZ {
        vertex_index: u32,
    },
    /// Close the probe opened by the matching VertexTestZ.
    EndVertexTestZ {
        vertex_index: u32,
    },
}

/// Rendering overrides toggled by extended commands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawExtendedFlags {
    pub force_upscale_2d: bool,
    pub force_true_bilerp: u8,
    pub force_scale_lod: bool,
}

/// Per-call tile snapshot, resolved against the TMEM region map at the
/// moment the call was loaded.
#[derive(Clone, Copy, Debug, Default)]
pub struct DrawCallTile {
    pub tile: TileDescriptor,
    /// Tile copy serving this tile's TMEM bytes, zero when sampling raw TMEM.
    pub tile_copy_id: u64,
    /// The copy needs a compute-pass reinterpretation before sampling.
    pub reinterpret: bool,
    /// The TMEM bytes came from a framebuffer no copy could be formed for.
    pub sync_required: bool,
    pub min_texcoord: [i32; 2],
    pub max_texcoord: [i32; 2],
}

impl DrawCallTile {
    pub fn new(tile: TileDescriptor) -> Self {
        Self {
            tile,
            tile_copy_id: 0,
            reinterpret: false,
            sync_required: false,
            min_texcoord: [i32::MAX; 2],
            max_texcoord: [i32::MIN; 2],
        }
    }
}

/// Geometry range of one call inside the workload's draw data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshDescriptor {
    /// Face indices into the workload-wide vertex stream.
    Indexed { start: u32, count: u32 },
    /// Raw screen-space vertices (rectangle and RDP triangle projections).
    Raw { start: u32, count: u32 },
}

/// A finished call: the state snapshot plus its geometry range.
#[derive(Clone, Debug)]
pub struct GameCall {
    pub desc: DrawCall,
    pub mesh: MeshDescriptor,
}

/// The rolling draw-call builder. Fields mirror the RDP/RSP state that was
/// live when the call's geometry was submitted.
#[derive(Clone, Debug)]
pub struct DrawCall {
    pub texture_on: u8,
    pub texture_tile: u8,
    pub texture_levels: u8,
    /// Range into the workload's call-tile vector.
    pub tile_index: u32,
    pub tile_count: u32,
    pub color_combiner: ColorCombiner,
    pub other_mode: OtherMode,
    pub geometry_mode: u32,
    pub obj_render_mode: u32,
    pub fill_color: u32,
    pub prim_color: [f32; 4],
    pub prim_lod: [f32; 2],
    pub prim_depth: [f32; 2],
    pub env_color: [f32; 4],
    pub fog_color: [f32; 4],
    pub blend_color: [f32; 4],
    pub convert_k: [i32; 6],
    pub key_center: [f32; 3],
    pub key_scale: [f32; 3],
    pub scissor_rect: FixedRect,
    pub scissor_mode: u8,
    pub scissor_left_origin: u16,
    pub scissor_right_origin: u16,
    pub rect: FixedRect,
    pub rect_dsdx: i16,
    pub rect_dtdy: i16,
    pub rect_left_origin: u16,
    pub rect_right_origin: u16,
    pub min_world_matrix: u16,
    pub max_world_matrix: u16,
    pub triangle_count: u32,
    pub extended: DrawExtended,
    pub extended_flags: DrawExtendedFlags,
}

impl Default for DrawCall {
    fn default() -> Self {
        Self {
            texture_on: 0,
            texture_tile: 0,
            texture_levels: 0,
            tile_index: 0,
            tile_count: 0,
            color_combiner: ColorCombiner::default(),
            other_mode: OtherMode::default(),
            geometry_mode: 0,
            obj_render_mode: 0,
            fill_color: 0,
            prim_color: [0.0; 4],
            prim_lod: [0.0; 2],
            prim_depth: [0.0; 2],
            env_color: [0.0; 4],
            fog_color: [0.0; 4],
            blend_color: [0.0; 4],
            convert_k: [0; 6],
            key_center: [0.0; 3],
            key_scale: [0.0; 3],
            scissor_rect: FixedRect::null(),
            scissor_mode: 0,
            scissor_left_origin: gbi_registers::ex::G_EX_ORIGIN_NONE,
            scissor_right_origin: gbi_registers::ex::G_EX_ORIGIN_NONE,
            rect: FixedRect::null(),
            rect_dsdx: 0,
            rect_dtdy: 0,
            rect_left_origin: gbi_registers::ex::G_EX_ORIGIN_NONE,
            rect_right_origin: gbi_registers::ex::G_EX_ORIGIN_NONE,
            min_world_matrix: u16::MAX,
            max_world_matrix: 0,
            triangle_count: 0,
            extended: DrawExtended::None,
            extended_flags: DrawExtendedFlags::default(),
        }
    }
}

impl DrawCall {
    /// Reset the per-call accumulation counters after a flush.
    pub fn reset_accumulation(&mut self) {
        self.triangle_count = 0;
        self.min_world_matrix = u16::MAX;
        self.max_world_matrix = 0;
        self.rect = FixedRect::null();
        self.rect_dsdx = 0;
        self.rect_dtdy = 0;
    }
}
