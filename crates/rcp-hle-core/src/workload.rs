//! The per-frame workload: everything the renderer needs, batched.
//!
//! A workload is built by the HLE thread while it walks display lists and
//! published whole. Draw data is columnar so the renderer can upload one
//! buffer per attribute kind.

use std::collections::HashMap;

use crossbeam_channel::{bounded, Receiver, Sender};
use glam::{Mat4, Vec3, Vec4};
use rcp_fixed::FixedRect;

use crate::draw::GameCall;
use crate::fb::FramebufferOperation;
use crate::rdp::{TextureImage, TileDescriptor};

/// Screen mapping decoded from the RSP viewport record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RspViewport {
    pub scale: Vec3,
    pub translate: Vec3,
}

impl RspViewport {
    pub fn identity() -> Self {
        Self {
            scale: Vec3::ONE,
            translate: Vec3::ZERO,
        }
    }

    pub fn min_depth(&self) -> f32 {
        self.translate.z - self.scale.z
    }

    pub fn max_depth(&self) -> f32 {
        self.translate.z + self.scale.z
    }
}

impl Default for RspViewport {
    fn default() -> Self {
        Self {
            scale: Vec3::ZERO,
            translate: Vec3::ZERO,
        }
    }
}

/// Linear fog coefficients.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RspFog {
    pub mul: f32,
    pub offset: f32,
}

/// Decoded light record. Directional lights keep zero attenuation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RspLight {
    pub col: [f32; 3],
    pub colc: [f32; 3],
    pub pos_dir: [f32; 3],
    pub kc: f32,
    pub kl: f32,
    pub kq: f32,
}

/// Texture-generation basis vectors.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RspLookAt {
    pub x: Vec3,
    pub y: Vec3,
}

/// Look-at index encoding for the vertex stream.
pub const LOOKAT_INDEX_ENABLED: u16 = 0x1;
pub const LOOKAT_INDEX_LINEAR: u16 = 0x2;
pub const LOOKAT_INDEX_SHIFT: u16 = 2;

/// Interpolation directives attached to a matrix id by the extended
/// matrix-group commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransformGroup {
    pub matrix_id: u32,
    pub decompose: bool,
    pub position_interpolation: u8,
    pub rotation_interpolation: u8,
    pub scale_interpolation: u8,
    pub skew_interpolation: u8,
    pub perspective_interpolation: u8,
    pub vertex_interpolation: u8,
    pub tile_interpolation: u8,
    pub ordering: u8,
    pub editable: u8,
}

impl Default for TransformGroup {
    fn default() -> Self {
        use gbi_registers::ex::{G_EX_COMPONENT_AUTO, G_EX_EDIT_NONE, G_EX_ID_AUTO, G_EX_ORDER_AUTO};
        Self {
            matrix_id: G_EX_ID_AUTO,
            decompose: false,
            position_interpolation: G_EX_COMPONENT_AUTO,
            rotation_interpolation: G_EX_COMPONENT_AUTO,
            scale_interpolation: G_EX_COMPONENT_AUTO,
            skew_interpolation: G_EX_COMPONENT_AUTO,
            perspective_interpolation: G_EX_COMPONENT_AUTO,
            vertex_interpolation: G_EX_COMPONENT_AUTO,
            tile_interpolation: G_EX_COMPONENT_AUTO,
            ordering: G_EX_ORDER_AUTO,
            editable: G_EX_EDIT_NONE,
        }
    }
}

/// A texture load captured at command time, replayable against an RDRAM
/// snapshot to reproduce the TMEM bytes.
#[derive(Clone, Copy, Debug)]
pub struct LoadOperation {
    pub kind: LoadOperationKind,
    pub tile: TileDescriptor,
    pub texture: TextureImage,
}

#[derive(Clone, Copy, Debug)]
pub enum LoadOperationKind {
    Tile {
        tile: u8,
        uls: u16,
        ult: u16,
        lrs: u16,
        lrt: u16,
    },
    Block {
        tile: u8,
        uls: u16,
        ult: u16,
        lrs: u16,
        dxt: u16,
    },
    Tlut {
        tile: u8,
        uls: u16,
        ult: u16,
        lrs: u16,
        lrt: u16,
    },
}

/// Developer-mode diagnostic attached to the workload.
#[derive(Clone, Debug)]
pub struct CommandWarning {
    pub message: String,
    pub index: WarningIndex,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WarningIndex {
    Call(u32),
    Load(u32),
    Tile(u32),
}

/// Columnar vertex and transform data shared by every draw call in the
/// workload. Vectors prefixed `tri_` hold raw screen-space triangles from
/// rectangle and low-level triangle paths.
#[derive(Default)]
pub struct DrawData {
    pub pos_shorts: Vec<i16>,
    pub tc_floats: Vec<f32>,
    pub norm_col_bytes: Vec<u8>,
    pub view_proj_indices: Vec<u16>,
    pub world_indices: Vec<u16>,
    pub fog_indices: Vec<u16>,
    pub light_indices: Vec<u16>,
    pub light_counts: Vec<u8>,
    pub look_at_indices: Vec<u16>,
    pub pos_transformed: Vec<Vec4>,
    pub pos_screen: Vec<Vec3>,
    /// Pairs of (encoded index, packed value) from vertex modifications.
    pub modify_pos_words: Vec<u32>,
    pub face_indices: Vec<u32>,

    pub tri_pos_floats: Vec<f32>,
    pub tri_tc_floats: Vec<f32>,
    pub tri_color_floats: Vec<f32>,

    pub view_transforms: Vec<Mat4>,
    pub proj_transforms: Vec<Mat4>,
    pub view_proj_transforms: Vec<Mat4>,
    pub view_proj_transform_groups: Vec<u32>,
    pub world_transforms: Vec<Mat4>,
    pub world_transform_groups: Vec<u32>,
    pub world_transform_segmented_addresses: Vec<u32>,
    pub world_transform_physical_addresses: Vec<u32>,
    pub world_transform_vertex_indices: Vec<u32>,
    pub transform_groups: Vec<TransformGroup>,

    pub rsp_viewports: Vec<RspViewport>,
    pub viewport_origins: Vec<u16>,
    pub rsp_fog: Vec<RspFog>,
    pub rsp_lights: Vec<RspLight>,
    pub rsp_look_at: Vec<RspLookAt>,

    pub load_operations: Vec<LoadOperation>,
    pub call_tiles: Vec<crate::draw::DrawCallTile>,
}

impl DrawData {
    pub fn vertex_count(&self) -> u32 {
        (self.pos_shorts.len() / 3) as u32
    }

    pub fn raw_vertex_count(&self) -> u32 {
        (self.tri_pos_floats.len() / 4) as u32
    }

    pub fn clear(&mut self) {
        let Self {
            pos_shorts,
            tc_floats,
            norm_col_bytes,
            view_proj_indices,
            world_indices,
            fog_indices,
            light_indices,
            light_counts,
            look_at_indices,
            pos_transformed,
            pos_screen,
            modify_pos_words,
            face_indices,
            tri_pos_floats,
            tri_tc_floats,
            tri_color_floats,
            view_transforms,
            proj_transforms,
            view_proj_transforms,
            view_proj_transform_groups,
            world_transforms,
            world_transform_groups,
            world_transform_segmented_addresses,
            world_transform_physical_addresses,
            world_transform_vertex_indices,
            transform_groups,
            rsp_viewports,
            viewport_origins,
            rsp_fog,
            rsp_lights,
            rsp_look_at,
            load_operations,
            call_tiles,
        } = self;
        pos_shorts.clear();
        tc_floats.clear();
        norm_col_bytes.clear();
        view_proj_indices.clear();
        world_indices.clear();
        fog_indices.clear();
        light_indices.clear();
        light_counts.clear();
        look_at_indices.clear();
        pos_transformed.clear();
        pos_screen.clear();
        modify_pos_words.clear();
        face_indices.clear();
        tri_pos_floats.clear();
        tri_tc_floats.clear();
        tri_color_floats.clear();
        view_transforms.clear();
        proj_transforms.clear();
        view_proj_transforms.clear();
        view_proj_transform_groups.clear();
        world_transforms.clear();
        world_transform_groups.clear();
        world_transform_segmented_addresses.clear();
        world_transform_physical_addresses.clear();
        world_transform_vertex_indices.clear();
        transform_groups.clear();
        rsp_viewports.clear();
        viewport_origins.clear();
        rsp_fog.clear();
        rsp_lights.clear();
        rsp_look_at.clear();
        load_operations.clear();
        call_tiles.clear();
    }
}

/// Projection bucket inside a framebuffer pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectionKind {
    Perspective,
    Orthographic,
    Rectangle,
    Triangle,
}

pub struct Projection {
    pub kind: ProjectionKind,
    /// Index into the workload's view-proj transform pool.
    pub transforms_index: u32,
    pub game_calls: Vec<GameCall>,
}

/// Color image binding of a framebuffer pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColorImage {
    pub address: u32,
    pub fmt: u8,
    pub siz: u8,
    pub width: u16,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DepthImage {
    pub address: u32,
}

/// Why a framebuffer pair was closed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlushReason {
    #[default]
    None,
    SamplingFromColorImage,
    SamplingFromDepthImage,
    ColorImageChanged,
    DepthImageChanged,
    ProcessDisplayListsEnd,
}

/// All the work aimed at one color+depth target pair between flush points.
#[derive(Default)]
pub struct FramebufferPair {
    pub color_image: ColorImage,
    pub depth_image: DepthImage,
    pub scissor_rect: FixedRect,
    pub draw_color_rect: FixedRect,
    pub draw_depth_rect: FixedRect,
    pub depth_read: bool,
    pub depth_write: bool,
    pub projections: Vec<Projection>,
    pub start_fb_operations: Vec<FramebufferOperation>,
    pub end_fb_operations: Vec<FramebufferOperation>,
    pub flush_reason: FlushReason,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            kind: ProjectionKind::Rectangle,
            transforms_index: 0,
            game_calls: Vec::new(),
        }
    }
}

impl FramebufferPair {
    pub fn reset(&mut self, color_image: ColorImage, depth_image: DepthImage) {
        self.color_image = color_image;
        self.depth_image = depth_image;
        self.scissor_rect.reset();
        self.draw_color_rect.reset();
        self.draw_depth_rect.reset();
        self.depth_read = false;
        self.depth_write = false;
        self.projections.clear();
        self.start_fb_operations.clear();
        self.end_fb_operations.clear();
        self.flush_reason = FlushReason::None;
    }

    /// Whether the current (last) projection matches the given transforms
    /// index and kind.
    pub fn in_projection(&self, transforms_index: u32, kind: ProjectionKind) -> bool {
        match self.projections.last() {
            Some(p) => (p.transforms_index == transforms_index) && (p.kind == kind),
            None => false,
        }
    }

    /// Open a new projection bucket, returning its index.
    pub fn change_projection(&mut self, transforms_index: u32, kind: ProjectionKind) -> i32 {
        self.projections.push(Projection {
            kind,
            transforms_index,
            game_calls: Vec::new(),
        });
        (self.projections.len() - 1) as i32
    }

    pub fn call_count(&self) -> usize {
        self.projections.iter().map(|p| p.game_calls.len()).sum()
    }

    /// Byte range of the color image rows the accumulated draws touched.
    pub fn color_write_range(&self) -> Option<(u32, u32)> {
        if self.draw_color_rect.is_empty() {
            return None;
        }
        let bpr = gbi_registers::formats::image_row_bytes(self.color_image.width as u32, self.color_image.siz);
        let row_start = self.draw_color_rect.top(false) as u32;
        let row_end = self.draw_color_rect.bottom(true) as u32;
        let start = self.color_image.address + row_start * bpr;
        Some((start, start + (row_end - row_start) * bpr))
    }

    /// Byte range of the depth image rows the accumulated draws touched.
    pub fn depth_write_range(&self) -> Option<(u32, u32)> {
        if self.draw_depth_rect.is_empty() {
            return None;
        }
        let bpr = gbi_registers::formats::image_row_bytes(
            self.color_image.width as u32,
            gbi_registers::formats::G_IM_SIZ_16B,
        );
        let row_start = self.draw_depth_rect.top(false) as u32;
        let row_end = self.draw_depth_rect.bottom(true) as u32;
        let start = self.depth_image.address + row_start * bpr;
        Some((start, start + (row_end - row_start) * bpr))
    }
}

/// The immutable per-frame product.
#[derive(Default)]
pub struct Workload {
    pub fb_pairs: Vec<FramebufferPair>,
    pub draw_data: DrawData,
    pub command_warnings: Vec<CommandWarning>,
    /// Physical matrix address to transform index, for group edits.
    pub physical_address_transform_map: HashMap<u32, Vec<u32>>,
    /// Set when the interpreter abandoned the frame mid-stream.
    pub faulted: bool,
}

impl Workload {
    pub fn reset(&mut self) {
        self.fb_pairs.clear();
        self.draw_data.clear();
        self.command_warnings.clear();
        self.physical_address_transform_map.clear();
        self.faulted = false;
    }

    pub fn current_pair_index(&self) -> Option<usize> {
        self.fb_pairs.len().checked_sub(1)
    }

    pub fn current_pair(&self) -> Option<&FramebufferPair> {
        self.fb_pairs.last()
    }

    pub fn current_pair_mut(&mut self) -> Option<&mut FramebufferPair> {
        self.fb_pairs.last_mut()
    }

    /// Open a framebuffer pair for the given bindings. Reuses the current
    /// pair when it never received a draw, so empty pairs are not emitted.
    pub fn add_framebuffer_pair(&mut self, color_image: ColorImage, depth_image: DepthImage) -> usize {
        if let Some(last) = self.fb_pairs.last_mut() {
            if last.call_count() == 0 && last.start_fb_operations.is_empty() && last.end_fb_operations.is_empty() {
                last.reset(color_image, depth_image);
                return self.fb_pairs.len() - 1;
            }
        }
        let mut pair = FramebufferPair::default();
        pair.reset(color_image, depth_image);
        self.fb_pairs.push(pair);
        self.fb_pairs.len() - 1
    }
}

/// Producer side of the workload ring. Publishing blocks when the ring is
/// full; spent workloads come back for reuse through the recycle channel.
pub struct WorkloadQueue {
    tx: Sender<Workload>,
    recycle_rx: Receiver<Workload>,
}

/// Consumer side of the workload ring, owned by the render thread.
pub struct WorkloadConsumer {
    rx: Receiver<Workload>,
    recycle_tx: Sender<Workload>,
}

/// Build the single-producer/single-consumer workload ring.
pub fn workload_queue(capacity: usize) -> (WorkloadQueue, WorkloadConsumer) {
    let (tx, rx) = bounded(capacity);
    let (recycle_tx, recycle_rx) = bounded(capacity);
    (
        WorkloadQueue { tx, recycle_rx },
        WorkloadConsumer { rx, recycle_tx },
    )
}

impl WorkloadQueue {
    /// Publish a finished workload. Blocks while the ring is full; returns
    /// false when the consumer is gone.
    pub fn publish(&self, workload: Workload) -> bool {
        self.tx.send(workload).is_ok()
    }

    /// A fresh workload to build into, recycled when one is available.
    pub fn acquire(&self) -> Workload {
        match self.recycle_rx.try_recv() {
            Ok(mut workload) => {
                workload.reset();
                workload
            }
            Err(_) => Workload::default(),
        }
    }
}

impl WorkloadConsumer {
    /// The next published workload. Blocks while the ring is empty; `None`
    /// when the producer is gone.
    pub fn next(&self) -> Option<Workload> {
        self.rx.recv().ok()
    }

    /// Hand a consumed workload back for reuse.
    pub fn release(&self, workload: Workload) {
        let _ = self.recycle_tx.try_send(workload);
    }
}
