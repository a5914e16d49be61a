//! RSP state machine: matrix stacks, the vertex cache with transform,
//! lighting, fog and texgen capture, and indexed triangle submission.

use glam::{Mat4, Vec3, Vec4};
use rcp_fixed::{FixedMatrix, FixedRect};

use gbi_registers::modes::{
    G_CLIPPING, G_FOG, G_LIGHTING, G_POINT_LIGHTING, G_TEXTURE_GEN, G_TEXTURE_GEN_LINEAR,
};
use gbi_registers::{OtherMode, RSP_DMA_MASK, RSP_DMA_MASK4, SEGMENT_COUNT};

use crate::draw::{DrawExtended, DrawStatus};
use crate::gbi::Gbi;
use crate::math;
use crate::rdram::{LightRecord, VertexRecord};
use crate::stack::StateStack;
use crate::state::State;
use crate::workload::{
    ProjectionKind, RspFog, RspLight, RspLookAt, RspViewport, TransformGroup,
    LOOKAT_INDEX_ENABLED, LOOKAT_INDEX_LINEAR, LOOKAT_INDEX_SHIFT,
};

pub const RSP_MAX_LIGHTS: usize = 7;
pub const RSP_MATRIX_STACK_SIZE: usize = 32;
pub const RSP_MAX_VERTICES: usize = 64;
pub const RSP_EXTENDED_STACK_SIZE: usize = 16;
pub const RSP_MATRIX_ID_STACK_SIZE: usize = 256;

const DEPTH_RANGE: f32 = 1024.0;

/// Modelview stack entry: the matrix plus where it came from.
#[derive(Clone, Copy, Debug)]
pub struct ModelMatrixEntry {
    pub matrix: Mat4,
    pub segmented_address: u32,
    pub physical_address: u32,
}

impl Default for ModelMatrixEntry {
    fn default() -> Self {
        Self {
            matrix: Mat4::ZERO,
            segmented_address: 0,
            physical_address: 0,
        }
    }
}

/// Projection stack entry: the view/projection split alongside the combined
/// matrix and its cached inverse.
#[derive(Clone, Copy, Debug)]
pub struct ProjectionEntry {
    pub view: Mat4,
    pub proj: Mat4,
    pub view_proj: Mat4,
    pub inv_view_proj: Mat4,
    pub segmented_address: u32,
    pub physical_address: u32,
}

impl Default for ProjectionEntry {
    fn default() -> Self {
        Self {
            view: Mat4::ZERO,
            proj: Mat4::ZERO,
            view_proj: Mat4::ZERO,
            inv_view_proj: Mat4::ZERO,
            segmented_address: 0,
            physical_address: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TextureState {
    pub tile: u8,
    pub levels: u8,
    pub on: u8,
    pub sc: u16,
    pub tc: u16,
}

pub struct RspExtendedState {
    pub draw_extended: DrawExtended,
    /// Vertex index captured by the last vertex-z-test begin.
    pub vertex_test_z_index: u32,
    pub viewport_origin: u16,
    pub global_viewport_origin: u16,
    pub global_viewport_offset_x: i16,
    pub global_viewport_offset_y: i16,
    pub model_matrix_id_stack: StateStack<TransformGroup, RSP_MATRIX_ID_STACK_SIZE>,
    pub model_matrix_id_stack_changed: bool,
    pub cur_model_matrix_id_group_index: u32,
    pub view_proj_matrix_id_stack: StateStack<TransformGroup, RSP_MATRIX_ID_STACK_SIZE>,
    pub view_proj_matrix_id_stack_changed: bool,
    pub cur_view_proj_matrix_id_group_index: u32,
    pub force_branch: bool,
}

impl Default for RspExtendedState {
    fn default() -> Self {
        Self {
            draw_extended: DrawExtended::None,
            vertex_test_z_index: 0,
            viewport_origin: gbi_registers::ex::G_EX_ORIGIN_NONE,
            global_viewport_origin: gbi_registers::ex::G_EX_ORIGIN_NONE,
            global_viewport_offset_x: 0,
            global_viewport_offset_y: 0,
            model_matrix_id_stack: StateStack::new(TransformGroup::default()),
            model_matrix_id_stack_changed: false,
            cur_model_matrix_id_group_index: 0,
            view_proj_matrix_id_stack: StateStack::new(TransformGroup::default()),
            view_proj_matrix_id_stack_changed: false,
            cur_view_proj_matrix_id_group_index: 0,
            force_branch: false,
        }
    }
}

pub struct Rsp {
    pub segments: [u32; SEGMENT_COUNT],
    pub model_stack: StateStack<ModelMatrixEntry, RSP_MATRIX_STACK_SIZE>,
    pub projection_stack: StateStack<ProjectionEntry, RSP_EXTENDED_STACK_SIZE>,
    pub viewport_stack: StateStack<RspViewport, RSP_EXTENDED_STACK_SIZE>,
    pub geometry_mode_stack: StateStack<u32, RSP_EXTENDED_STACK_SIZE>,
    pub other_mode_stack: StateStack<OtherMode, RSP_EXTENDED_STACK_SIZE>,
    pub model_view_proj: Mat4,
    pub projection_matrix_changed: bool,
    pub projection_matrix_inversed: bool,
    pub viewport_changed: bool,
    pub model_view_proj_changed: bool,
    pub model_view_proj_inserted: bool,
    pub cur_view_proj_index: u16,
    pub cur_transform_index: u16,
    pub cur_fog_index: u16,
    pub cur_light_index: u16,
    pub cur_light_count: u8,
    pub cur_look_at_index: u16,
    /// Index of the open projection inside the current pair, -1 when none.
    pub projection_index: i32,
    pub vertices: [VertexRecord; RSP_MAX_VERTICES],
    /// Per-slot global vertex index in the workload stream.
    pub indices: [u32; RSP_MAX_VERTICES],
    /// Slots consumed by a triangle since their load.
    pub used: u64,
    pub lights: [LightRecord; RSP_MAX_LIGHTS + 1],
    pub light_count: i32,
    pub lights_changed: bool,
    pub vertex_fog_index: u32,
    pub vertex_light_index: u32,
    pub vertex_light_count: u32,
    pub vertex_look_at_index: u32,
    pub vertex_color_pd_address: u32,
    pub fog: RspFog,
    pub fog_changed: bool,
    pub look_at: RspLookAt,
    pub look_at_changed: bool,
    pub texture: TextureState,
    pub obj_render_mode: u32,
    pub extended: RspExtendedState,

    // Microcode-dependent constants, owned by the active GBI.
    pub no_n: bool,
    pub point_lighting: bool,
    pub cull_both_mask: u32,
    pub cull_front_mask: u32,
    pub proj_mask: u32,
    pub load_mask: u32,
    pub push_mask: u32,
    pub shading_smooth_mask: u32,
}

impl Rsp {
    pub fn new() -> Self {
        let mut rsp = Self {
            segments: [0; SEGMENT_COUNT],
            model_stack: StateStack::new(ModelMatrixEntry::default()),
            projection_stack: StateStack::new(ProjectionEntry::default()),
            viewport_stack: StateStack::new(RspViewport::default()),
            geometry_mode_stack: StateStack::new(G_CLIPPING),
            other_mode_stack: StateStack::new(OtherMode::new(0x080CFF, 0x0)),
            model_view_proj: Mat4::ZERO,
            projection_matrix_changed: false,
            projection_matrix_inversed: false,
            viewport_changed: false,
            model_view_proj_changed: false,
            model_view_proj_inserted: false,
            cur_view_proj_index: 0,
            cur_transform_index: 0,
            cur_fog_index: 0,
            cur_light_index: 0,
            cur_light_count: 0,
            cur_look_at_index: 0,
            projection_index: -1,
            vertices: [VertexRecord::default(); RSP_MAX_VERTICES],
            indices: [0; RSP_MAX_VERTICES],
            used: 0,
            lights: [LightRecord::default(); RSP_MAX_LIGHTS + 1],
            light_count: 0,
            lights_changed: false,
            vertex_fog_index: 0,
            vertex_light_index: 0,
            vertex_light_count: 0,
            vertex_look_at_index: 0,
            vertex_color_pd_address: 0,
            fog: RspFog::default(),
            fog_changed: true,
            look_at: RspLookAt::default(),
            look_at_changed: true,
            texture: TextureState::default(),
            obj_render_mode: 0,
            extended: RspExtendedState::default(),
            no_n: false,
            point_lighting: false,
            cull_both_mask: 0,
            cull_front_mask: 0,
            proj_mask: 0,
            load_mask: 0,
            push_mask: 0,
            shading_smooth_mask: 0,
        };
        rsp.reset();
        rsp
    }

    pub fn reset(&mut self) {
        self.model_stack.reset_to(ModelMatrixEntry::default());
        self.projection_stack.reset_to(ProjectionEntry::default());
        self.viewport_stack.reset_to(RspViewport::default());
        self.geometry_mode_stack.reset_to(G_CLIPPING);
        self.other_mode_stack.reset_to(OtherMode::new(0x080CFF, 0x0));
        self.model_view_proj = Mat4::ZERO;
        self.projection_matrix_changed = false;
        self.projection_matrix_inversed = false;
        self.viewport_changed = false;
        self.model_view_proj_changed = false;
        self.model_view_proj_inserted = false;
        self.cur_view_proj_index = 0;
        self.cur_transform_index = 0;
        self.cur_fog_index = 0;
        self.cur_light_index = 0;
        self.cur_light_count = 0;
        self.cur_look_at_index = 0;
        self.projection_index = -1;
        self.vertices = [VertexRecord::default(); RSP_MAX_VERTICES];
        self.indices = [0; RSP_MAX_VERTICES];
        self.used = 0;
        self.lights = [LightRecord::default(); RSP_MAX_LIGHTS + 1];
        self.light_count = 0;
        self.lights_changed = false;
        self.vertex_fog_index = 0;
        self.vertex_light_index = 0;
        self.vertex_light_count = 0;
        self.vertex_look_at_index = 0;
        self.vertex_color_pd_address = 0;
        self.fog = RspFog::default();
        self.fog_changed = true;
        self.look_at = RspLookAt::default();
        self.look_at_changed = true;
        self.texture = TextureState::default();
        self.obj_render_mode = 0;
        self.extended = RspExtendedState::default();
        self.segments = [0; SEGMENT_COUNT];
    }

    pub fn apply_gbi(&mut self, gbi: &Gbi) {
        self.no_n = gbi.flags.no_n;
        self.point_lighting = gbi.flags.point_lighting;
        self.cull_both_mask = gbi.constants.cull_both;
        self.cull_front_mask = gbi.constants.cull_front;
        self.proj_mask = gbi.constants.mtx_projection;
        self.load_mask = gbi.constants.mtx_load;
        self.push_mask = gbi.constants.mtx_push;
        self.shading_smooth_mask = gbi.constants.shading_smooth;
    }

    pub fn geometry_mode(&self) -> u32 {
        *self.geometry_mode_stack.top()
    }
}

impl Default for Rsp {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    /// Segment table lookup.
    pub fn from_segmented(&self, seg_address: u32) -> u32 {
        if self.extended.extend_rdram && ((seg_address & 0xF000_0000) == 0x8000_0000) {
            return seg_address;
        }
        self.rsp.segments[((seg_address >> 24) & 0x0F) as usize] + (seg_address & 0x00FF_FFFF)
    }

    fn mask_physical(&self, address: u32, mask: u32) -> u32 {
        if self.extended.extend_rdram && ((address & 0xF000_0000) == 0x8000_0000) {
            return address - 0x8000_0000;
        }
        address & mask
    }

    /// Segment lookup plus the RSP DMA address mask.
    pub fn from_segmented_masked(&self, seg_address: u32) -> u32 {
        self.mask_physical(self.from_segmented(seg_address), RSP_DMA_MASK)
    }

    pub fn from_segmented_masked_pd(&self, seg_address: u32) -> u32 {
        self.mask_physical(self.from_segmented(seg_address), RSP_DMA_MASK4)
    }

    pub fn set_segment(&mut self, seg: u32, address: u32) {
        if (seg as usize) < SEGMENT_COUNT {
            self.rsp.segments[seg as usize] = address;
        }
    }

    pub fn rsp_matrix(&mut self, address: u32, params: u8) {
        let rdram_address = self.from_segmented_masked(address);
        let fixed = self.rdram.read_fixed_matrix(rdram_address);
        let float_matrix = math::fixed_matrix_to_mat4(&fixed);
        let params = params as u32;
        let (proj_mask, load_mask, push_mask) = (self.rsp.proj_mask, self.rsp.load_mask, self.rsp.push_mask);

        if (params & proj_mask) != 0 {
            let top = self.rsp.projection_stack.top_mut();
            if (params & load_mask) != 0 {
                top.view_proj = float_matrix;
                if math::is_matrix_view_proj(&float_matrix) {
                    let (view, proj) = math::decompose_view_proj(&float_matrix);
                    top.view = view;
                    top.proj = proj;
                } else {
                    top.proj = float_matrix;
                    top.view = Mat4::IDENTITY;
                }
            } else {
                top.view_proj = math::mul_rm(&float_matrix, &top.view_proj);
                if math::is_matrix_affine(&float_matrix) && !math::is_matrix_identity(&float_matrix) {
                    top.view = math::mul_rm(&float_matrix, &top.view);
                } else {
                    top.proj = math::mul_rm(&float_matrix, &top.proj);
                }
            }

            top.segmented_address = address;
            top.physical_address = rdram_address;
            self.rsp.projection_matrix_changed = true;
            self.rsp.projection_matrix_inversed = false;
        } else {
            if (params & push_mask) != 0 {
                self.rsp.model_stack.push();
            }

            let top = self.rsp.model_stack.top_mut();
            if (params & load_mask) != 0 {
                top.matrix = float_matrix;
            } else {
                top.matrix = math::mul_rm(&float_matrix, &top.matrix);
            }

            top.segmented_address = address;
            top.physical_address = rdram_address;
        }

        self.rsp.model_view_proj_changed = true;
    }

    pub fn pop_matrix(&mut self, mut count: u32) {
        while count > 0 {
            count -= 1;
            if self.rsp.model_stack.pop() {
                self.rsp.model_view_proj_changed = true;
            }
        }
    }

    pub fn push_projection_matrix(&mut self) {
        self.rsp.projection_stack.push();
    }

    pub fn pop_projection_matrix(&mut self) {
        if self.rsp.projection_stack.pop() {
            self.rsp.model_view_proj_changed = true;
            self.rsp.projection_matrix_changed = true;
            self.rsp.projection_matrix_inversed = false;
        }
    }

    /// Patch two consecutive 16-bit lanes of the integer or fractional half
    /// of the modelview, view-proj or MVP matrix. This is how billboards
    /// rotate on the microcode.
    pub fn insert_matrix(&mut self, address: u32, value: u32) {
        if (address & 0x3) != 0 {
            log::warn!("insert matrix with unaligned address {address:#06x} rejected");
            return;
        }

        const MATRIX_SIZE: u32 = 0x40;
        const FRACTIONAL_OFFSET: u32 = MATRIX_SIZE / 2;
        const MODEL_ADDRESS: u32 = 0x0;
        const VIEW_PROJ_ADDRESS: u32 = MODEL_ADDRESS + MATRIX_SIZE;
        const MODEL_VIEW_PROJ_ADDRESS: u32 = VIEW_PROJ_ADDRESS + MATRIX_SIZE;

        // The microcode wraps the destination around its matrix scratch.
        let dst_addr = (address + MODEL_VIEW_PROJ_ADDRESS) & 0xFFFF;
        if dst_addr >= (MODEL_VIEW_PROJ_ADDRESS + MATRIX_SIZE) {
            log::warn!("insert matrix destination {dst_addr:#06x} outside the matrix scratch");
            return;
        }

        enum Target {
            Model,
            ViewProj,
            Mvp,
        }
        let (target, mut rel_addr) = if dst_addr >= MODEL_VIEW_PROJ_ADDRESS {
            self.rsp.model_view_proj_inserted = true;
            (Target::Mvp, dst_addr - MODEL_VIEW_PROJ_ADDRESS)
        } else if dst_addr >= VIEW_PROJ_ADDRESS {
            self.rsp.projection_matrix_changed = true;
            self.rsp.projection_matrix_inversed = false;
            (Target::ViewProj, dst_addr - VIEW_PROJ_ADDRESS)
        } else {
            (Target::Model, dst_addr)
        };

        let modify_fractional = rel_addr >= FRACTIONAL_OFFSET;
        if modify_fractional {
            rel_addr -= FRACTIONAL_OFFSET;
        }

        let index = rel_addr / 2;
        let row = (index / 4) as usize;
        let column = (index % 4) as usize;
        let matrix = match target {
            Target::Mvp => &mut self.rsp.model_view_proj,
            Target::ViewProj => &mut self.rsp.projection_stack.top_mut().view_proj,
            Target::Model => &mut self.rsp.model_stack.top_mut().matrix,
        };

        if modify_fractional {
            let hi = FixedMatrix::modify_fraction(math::mat_get(matrix, row, column), (value >> 16) as u16);
            math::mat_set(matrix, row, column, hi);
            let lo = FixedMatrix::modify_fraction(math::mat_get(matrix, row, column + 1), value as u16);
            math::mat_set(matrix, row, column + 1, lo);
        } else {
            let hi = FixedMatrix::modify_integer(math::mat_get(matrix, row, column), (value >> 16) as i16);
            math::mat_set(matrix, row, column, hi);
            let lo = FixedMatrix::modify_integer(math::mat_get(matrix, row, column + 1), value as i16);
            math::mat_set(matrix, row, column + 1, lo);
        }
    }

    /// Overwrite the MVP directly from RDRAM, bypassing its derivation.
    pub fn force_matrix(&mut self, address: u32) {
        let rdram_address = self.from_segmented_masked(address);
        let fixed = self.rdram.read_fixed_matrix(rdram_address);
        self.rsp.model_view_proj = math::fixed_matrix_to_mat4(&fixed);
        self.rsp.model_view_proj_inserted = true;
        self.rsp.model_view_proj_changed = false;
    }

    pub fn compute_model_view_proj(&mut self) {
        let view_proj = self.rsp.projection_stack.top().view_proj;
        let model = self.rsp.model_stack.top().matrix;
        self.rsp.model_view_proj = math::mul_rm(&model, &view_proj);
        self.rsp.model_view_proj_inserted = false;
        self.rsp.model_view_proj_changed = false;
    }

    pub fn set_model_view_proj_changed(&mut self, changed: bool) {
        self.rsp.model_view_proj_changed = changed;
    }

    pub fn current_projection_kind(&self) -> ProjectionKind {
        let proj = &self.rsp.projection_stack.top().proj;
        let persp = (math::mat_get(proj, 3, 3) == 0.0) && (math::mat_get(proj, 1, 1).abs() > 1e-6);
        if persp {
            ProjectionKind::Perspective
        } else {
            ProjectionKind::Orthographic
        }
    }

    /// Open a projection bucket for the current view-proj and viewport,
    /// registering them in the workload pools if they changed.
    pub fn add_current_projection(&mut self, kind: ProjectionKind) {
        if self.rsp.extended.view_proj_matrix_id_stack_changed {
            let group = *self.rsp.extended.view_proj_matrix_id_stack.top();
            self.rsp.extended.cur_view_proj_matrix_id_group_index =
                self.workload.draw_data.transform_groups.len() as u32;
            self.workload.draw_data.transform_groups.push(group);
            self.rsp.extended.view_proj_matrix_id_stack_changed = false;
        }

        self.check_framebuffer_pair();

        if self.rsp.projection_matrix_changed || self.rsp.viewport_changed {
            let transforms_index = self.workload.draw_data.view_transforms.len() as u16;
            self.rsp.cur_view_proj_index = transforms_index;

            let entry = *self.rsp.projection_stack.top();
            let group_index = self.workload.draw_data.view_proj_transform_groups.len() as u32;
            self.workload
                .physical_address_transform_map
                .entry(entry.physical_address)
                .or_default()
                .push(group_index);
            self.workload.draw_data.view_transforms.push(entry.view);
            self.workload.draw_data.proj_transforms.push(entry.proj);
            self.workload.draw_data.view_proj_transforms.push(entry.view_proj);
            self.workload
                .draw_data
                .view_proj_transform_groups
                .push(self.rsp.extended.cur_view_proj_matrix_id_group_index);
            let viewport = *self.rsp.viewport_stack.top();
            self.workload.draw_data.rsp_viewports.push(viewport);
            self.workload
                .draw_data
                .viewport_origins
                .push(self.rsp.extended.viewport_origin);
            self.rsp.projection_matrix_changed = false;
            self.rsp.viewport_changed = false;
        }

        let transforms_index = self.rsp.cur_view_proj_index as u32;
        if let Some(pair) = self.workload.current_pair_mut() {
            self.rsp.projection_index = pair.change_projection(transforms_index, kind);
        }
    }

    pub fn set_vertex(&mut self, address: u32, vtx_count: u8, dst_index: u8) {
        let dst = dst_index as usize;
        let count = vtx_count as usize;
        if (dst >= RSP_MAX_VERTICES) || ((dst + count) > RSP_MAX_VERTICES) {
            log::warn!("vertex load with invalid range (dst {dst}, count {count}) rejected");
            return;
        }

        let rdram_address = self.from_segmented_masked(address);
        for i in 0..count {
            self.rsp.vertices[dst + i] = self.rdram.read_vertex(rdram_address + (i as u32) * 16);
        }

        self.set_vertex_common(dst, dst + count);
    }

    pub fn set_vertex_pd(&mut self, address: u32, vtx_count: u8, dst_index: u8) {
        let dst = dst_index as usize;
        let count = vtx_count as usize;
        if (dst >= RSP_MAX_VERTICES) || ((dst + count) > RSP_MAX_VERTICES) {
            log::warn!("vertex load with invalid range (dst {dst}, count {count}) rejected");
            return;
        }

        let rdram_address = self.from_segmented_masked_pd(address);
        for i in 0..count {
            let (mut v, ci) = self.rdram.read_vertex_pd(rdram_address + (i as u32) * 12);
            let color_address = self.rsp.vertex_color_pd_address + (ci & 0xFF) as u32;
            v.norm_col = [
                self.rdram.read_u8(color_address),
                self.rdram.read_u8(color_address + 1),
                self.rdram.read_u8(color_address + 2),
                self.rdram.read_u8(color_address + 3),
            ];
            self.rsp.vertices[dst + i] = v;
        }

        self.set_vertex_common(dst, dst + count);
    }

    pub fn set_vertex_color_pd(&mut self, address: u32) {
        self.rsp.vertex_color_pd_address = self.from_segmented_masked(address);
    }

    /// Capture the current state for the freshly loaded slots and append
    /// them to the workload's columnar vertex stream.
    fn set_vertex_common(&mut self, dst_index: usize, dst_max: usize) {
        if self.rsp.extended.model_matrix_id_stack_changed {
            let group = *self.rsp.extended.model_matrix_id_stack.top();
            self.rsp.extended.cur_model_matrix_id_group_index =
                self.workload.draw_data.transform_groups.len() as u32;
            self.workload.draw_data.transform_groups.push(group);
            self.rsp.extended.model_matrix_id_stack_changed = false;
        }

        // The MVP only materializes when a vertex actually uses it.
        let add_world_transform = self.rsp.model_view_proj_changed || self.rsp.model_view_proj_inserted;
        if self.rsp.model_view_proj_changed {
            self.compute_model_view_proj();
            self.rsp.cur_transform_index = self.workload.draw_data.world_transforms.len() as u16;
            let model = self.rsp.model_stack.top().matrix;
            self.workload.draw_data.world_transforms.push(model);
        } else if self.rsp.model_view_proj_inserted {
            self.rsp.model_view_proj_inserted = false;

            if !self.rsp.projection_matrix_inversed {
                let inverse = self.rsp.projection_stack.top().view_proj.inverse();
                self.rsp.projection_stack.top_mut().inv_view_proj = inverse;
                self.rsp.projection_matrix_inversed = true;
            }

            self.rsp.cur_transform_index = self.workload.draw_data.world_transforms.len() as u16;
            let world = math::mul_rm(&self.rsp.model_view_proj, &self.rsp.projection_stack.top().inv_view_proj);
            self.workload.draw_data.world_transforms.push(world);
        }

        if add_world_transform {
            let top = *self.rsp.model_stack.top();
            let group_index = self.workload.draw_data.world_transform_groups.len() as u32;
            self.workload
                .physical_address_transform_map
                .entry(top.physical_address)
                .or_default()
                .push(group_index);
            self.workload
                .draw_data
                .world_transform_groups
                .push(self.rsp.extended.cur_model_matrix_id_group_index);
            self.workload
                .draw_data
                .world_transform_segmented_addresses
                .push(top.segmented_address);
            self.workload
                .draw_data
                .world_transform_physical_addresses
                .push(top.physical_address);
            let vertex_count = self.workload.draw_data.vertex_count();
            self.workload
                .draw_data
                .world_transform_vertex_indices
                .push(vertex_count);
        }

        // Push a new projection if it changed.
        if (self.rsp.projection_index < 0) || self.rsp.projection_matrix_changed || self.rsp.viewport_changed {
            self.flush();
            let kind = self.current_projection_kind();
            self.add_current_projection(kind);
        }

        // Lights are flushed to the workload by the first vertex that uses
        // them, not by the state-change command itself.
        let geometry_mode = self.rsp.geometry_mode();
        let uses_lighting = (geometry_mode & G_LIGHTING) != 0;
        let uses_point_lighting = self.rsp.point_lighting && ((geometry_mode & G_POINT_LIGHTING) != 0);
        if uses_lighting {
            if self.rsp.lights_changed {
                self.rsp.vertex_light_index = self.workload.draw_data.rsp_lights.len() as u32;
                self.rsp.vertex_light_count = (self.rsp.light_count + 1) as u32;
                for l in 0..=(self.rsp.light_count as usize) {
                    let light = self.rsp.lights[l.min(RSP_MAX_LIGHTS)];
                    let col = light.col();
                    let colc = light.colc();
                    let mut rsp_light = RspLight {
                        col: [col[0] as f32 / 255.0, col[1] as f32 / 255.0, col[2] as f32 / 255.0],
                        colc: [colc[0] as f32 / 255.0, colc[1] as f32 / 255.0, colc[2] as f32 / 255.0],
                        ..RspLight::default()
                    };

                    if uses_point_lighting && (light.kc() > 0) {
                        let pos = light.pos();
                        rsp_light.pos_dir = [pos[0] as f32, pos[1] as f32, pos[2] as f32];
                        rsp_light.kc = light.kc() as f32;
                        rsp_light.kl = light.kl() as f32;
                        rsp_light.kq = light.kq() as f32;
                    } else {
                        let dir = light.dir();
                        rsp_light.pos_dir = [dir[0] as f32, dir[1] as f32, dir[2] as f32];
                    }

                    self.workload.draw_data.rsp_lights.push(rsp_light);
                }

                self.update_draw_status_attribute(DrawStatus::LIGHTS);
                self.rsp.lights_changed = false;
            }

            self.rsp.cur_light_index = self.rsp.vertex_light_index as u16;
            self.rsp.cur_light_count = self.rsp.vertex_light_count as u8;
        } else {
            self.rsp.cur_light_index = 0;
            self.rsp.cur_light_count = 0;
        }

        let uses_fog = (geometry_mode & G_FOG) != 0;
        if uses_fog {
            if self.rsp.fog_changed {
                self.rsp.vertex_fog_index = self.workload.draw_data.rsp_fog.len() as u32;
                let fog = self.rsp.fog;
                self.workload.draw_data.rsp_fog.push(fog);
                self.rsp.fog_changed = false;
            }

            // Stored +1 so zero reads as fog disabled.
            self.rsp.cur_fog_index = (self.rsp.vertex_fog_index + 1) as u16;
        } else {
            self.rsp.cur_fog_index = 0;
        }

        let texture_gen_mask = G_LIGHTING | G_TEXTURE_GEN;
        let uses_texture_gen = (geometry_mode & texture_gen_mask) == texture_gen_mask;
        if uses_texture_gen {
            if self.rsp.look_at_changed {
                self.rsp.vertex_look_at_index = self.workload.draw_data.rsp_look_at.len() as u32;
                let look_at = self.rsp.look_at;
                self.workload.draw_data.rsp_look_at.push(look_at);
                self.rsp.look_at_changed = false;
            }

            let mut index = LOOKAT_INDEX_ENABLED;
            if (geometry_mode & G_TEXTURE_GEN_LINEAR) != 0 {
                index |= LOOKAT_INDEX_LINEAR;
            }
            index |= (self.rsp.vertex_look_at_index as u16) << LOOKAT_INDEX_SHIFT;
            self.rsp.cur_look_at_index = index;
        } else {
            self.rsp.cur_look_at_index = 0;
        }

        let global_index = self.workload.draw_data.vertex_count();
        for i in dst_index..dst_max {
            let v = self.rsp.vertices[i];
            let draw_data = &mut self.workload.draw_data;
            draw_data.pos_shorts.extend_from_slice(&[v.x, v.y, v.z]);
            draw_data.norm_col_bytes.extend_from_slice(&v.norm_col);
            draw_data.view_proj_indices.push(self.rsp.cur_view_proj_index);
            draw_data.world_indices.push(self.rsp.cur_transform_index);
            draw_data.fog_indices.push(self.rsp.cur_fog_index);
            draw_data.light_indices.push(self.rsp.cur_light_index);
            draw_data.light_counts.push(self.rsp.cur_light_count);
            draw_data.look_at_indices.push(self.rsp.cur_look_at_index);
            self.rsp.indices[i] = global_index + (i - dst_index) as u32;
            self.rsp.used &= !(1u64 << i);
        }

        let viewport = *self.rsp.viewport_stack.top();
        let mvp = self.rsp.model_view_proj;
        for i in dst_index..dst_max {
            let v = self.rsp.vertices[i];
            let transformed = math::transform(Vec4::new(v.x as f32, v.y as f32, v.z as f32, 1.0), &mvp);
            let draw_data = &mut self.workload.draw_data;
            draw_data.pos_transformed.push(transformed);
            draw_data
                .pos_screen
                .push(math::screen_position(transformed, viewport.scale, viewport.translate));
        }

        if uses_texture_gen {
            let texture_sc = self.rsp.texture.sc as f32;
            let texture_tc = self.rsp.texture.tc as f32;
            for _ in dst_index..dst_max {
                self.workload.draw_data.tc_floats.push(texture_sc);
                self.workload.draw_data.tc_floats.push(texture_tc);
            }
        } else {
            let texture_sc = self.rsp.texture.sc as i32;
            let texture_tc = self.rsp.texture.tc as i32;
            const DIVISOR: f64 = 65536.0 * 32.0;
            for i in dst_index..dst_max {
                let v = self.rsp.vertices[i];
                let s = ((v.s as i32 * texture_sc) as f64 / DIVISOR) as f32;
                let t = ((v.t as i32 * texture_tc) as f64 / DIVISOR) as f32;
                self.workload.draw_data.tc_floats.push(s);
                self.workload.draw_data.tc_floats.push(t);
            }
        }
    }

    /// Patch an attribute of an already-loaded vertex. Slots a triangle has
    /// consumed get a fresh columnar entry so drawn geometry stays intact.
    pub fn modify_vertex(&mut self, dst_index: u16, dst_attribute: u32, value: u32) {
        let slot = dst_index as usize;
        if slot >= RSP_MAX_VERTICES {
            log::warn!("vertex modify with invalid slot {slot} rejected");
            return;
        }

        let mut global_index = self.rsp.indices[slot] as usize;
        if (self.rsp.used & (1u64 << slot)) != 0 {
            let draw_data = &mut self.workload.draw_data;
            let new_index = draw_data.vertex_count() as usize;
            for k in 0..3 {
                let value = draw_data.pos_shorts[global_index * 3 + k];
                draw_data.pos_shorts.push(value);
            }
            for k in 0..4 {
                let value = draw_data.norm_col_bytes[global_index * 4 + k];
                draw_data.norm_col_bytes.push(value);
            }
            for k in 0..2 {
                let value = draw_data.tc_floats[global_index * 2 + k];
                draw_data.tc_floats.push(value);
            }
            let vp = draw_data.view_proj_indices[global_index];
            draw_data.view_proj_indices.push(vp);
            let world = draw_data.world_indices[global_index];
            draw_data.world_indices.push(world);
            let fog = draw_data.fog_indices[global_index];
            draw_data.fog_indices.push(fog);
            let light = draw_data.light_indices[global_index];
            draw_data.light_indices.push(light);
            let light_count = draw_data.light_counts[global_index];
            draw_data.light_counts.push(light_count);
            let look_at = draw_data.look_at_indices[global_index];
            draw_data.look_at_indices.push(look_at);
            let transformed = draw_data.pos_transformed[global_index];
            draw_data.pos_transformed.push(transformed);
            let screen = draw_data.pos_screen[global_index];
            draw_data.pos_screen.push(screen);
            self.rsp.indices[slot] = new_index as u32;
            self.rsp.used &= !(1u64 << slot);
            global_index = new_index;
        }

        let draw_data = &mut self.workload.draw_data;
        match dst_attribute {
            gbi_registers::G_MWO_POINT_RGBA => {
                draw_data.norm_col_bytes[global_index * 4] = (value >> 24) as u8;
                draw_data.norm_col_bytes[global_index * 4 + 1] = (value >> 16) as u8;
                draw_data.norm_col_bytes[global_index * 4 + 2] = (value >> 8) as u8;
                draw_data.norm_col_bytes[global_index * 4 + 3] = value as u8;
                draw_data.fog_indices[global_index] = 0;
                draw_data.light_indices[global_index] = 0;
                draw_data.light_counts[global_index] = 0;
            }
            gbi_registers::G_MWO_POINT_ST => {
                let s = ((value >> 16) as u16 as i16) as f32 / 32.0;
                let t = (value as u16 as i16) as f32 / 32.0;
                draw_data.tc_floats[global_index * 2] = s;
                draw_data.tc_floats[global_index * 2 + 1] = t;
                draw_data.look_at_indices[global_index] = 0;
            }
            gbi_registers::G_MWO_POINT_XYSCREEN => {
                // Low bit clear selects the XY half on the GPU side.
                draw_data.modify_pos_words.push((global_index as u32) << 1);
                draw_data.modify_pos_words.push(value);

                // Decoded here too, for draw-area tracking and branch tests.
                let ext_x = ((value >> 16) as u16 as i16) as f32 / 4.0;
                let ext_y = (value as u16 as i16) as f32 / 4.0;
                draw_data.pos_screen[global_index].x = ext_x;
                draw_data.pos_screen[global_index].y = ext_y;
            }
            gbi_registers::G_MWO_POINT_ZSCREEN => {
                // Low bit set selects the Z half on the GPU side.
                draw_data.modify_pos_words.push(((global_index as u32) << 1) | 0x1);
                draw_data.modify_pos_words.push(value);
                draw_data.pos_screen[global_index].z = value as f32 / 65536.0;
            }
            _ => {
                log::warn!("unsupported vertex modify attribute {dst_attribute:#x}");
            }
        }
    }

    /// Branch target if the cached vertex's screen Z is below the threshold
    /// (or a force-branch override is active).
    pub fn branch_z_target(&mut self, branch_dl: u32, vtx_index: u16, z_value: u32) -> Option<u32> {
        let force = self.config.force_branch || self.rsp.extended.force_branch;
        let global_index = self.rsp.indices[(vtx_index as usize).min(RSP_MAX_VERTICES - 1)] as usize;
        let screen_z = self
            .workload
            .draw_data
            .pos_screen
            .get(global_index)
            .map(|p| p.z)
            .unwrap_or(0.0)
            * DEPTH_RANGE;
        let z_float = z_value as f32 / 65536.0;
        if force || (screen_z < z_float) {
            Some(self.from_segmented_masked(branch_dl))
        } else {
            None
        }
    }

    /// Branch target if the cached vertex's clip-space W is below the value.
    pub fn branch_w_target(&mut self, branch_dl: u32, vtx_index: u16, w_value: u32) -> Option<u32> {
        let force = self.config.force_branch || self.rsp.extended.force_branch;
        let global_index = self.rsp.indices[(vtx_index as usize).min(RSP_MAX_VERTICES - 1)] as usize;
        let pos_w = self
            .workload
            .draw_data
            .pos_transformed
            .get(global_index)
            .map(|p| p.w)
            .unwrap_or(0.0);
        if force || (pos_w < w_value as f32) {
            Some(self.from_segmented_masked(branch_dl))
        } else {
            None
        }
    }

    pub fn set_geometry_mode(&mut self, mask: u32) {
        *self.rsp.geometry_mode_stack.top_mut() |= mask;
        self.update_draw_status_attribute(DrawStatus::GEOMETRY_MODE);
    }

    pub fn clear_geometry_mode(&mut self, mask: u32) {
        *self.rsp.geometry_mode_stack.top_mut() &= !mask;
        self.update_draw_status_attribute(DrawStatus::GEOMETRY_MODE);
    }

    pub fn modify_geometry_mode(&mut self, off_mask: u32, on_mask: u32) {
        let geometry_mode = self.rsp.geometry_mode_stack.top_mut();
        *geometry_mode &= off_mask;
        *geometry_mode |= on_mask;
        self.update_draw_status_attribute(DrawStatus::GEOMETRY_MODE);
    }

    pub fn push_geometry_mode(&mut self) {
        self.rsp.geometry_mode_stack.push();
    }

    pub fn pop_geometry_mode(&mut self) {
        if self.rsp.geometry_mode_stack.pop() {
            self.update_draw_status_attribute(DrawStatus::GEOMETRY_MODE);
        }
    }

    pub fn set_obj_render_mode(&mut self, value: u32) {
        self.rsp.obj_render_mode = value;
        self.update_draw_status_attribute(DrawStatus::OBJ_RENDER_MODE);
    }

    pub fn set_viewport(&mut self, address: u32) {
        let ori = self.rsp.extended.global_viewport_origin;
        let offx = self.rsp.extended.global_viewport_offset_x;
        let offy = self.rsp.extended.global_viewport_offset_y;
        self.set_viewport_aligned(address, ori, offx, offy);
    }

    pub fn set_viewport_aligned(&mut self, address: u32, ori: u16, offx: i16, offy: i16) {
        let rdram_address = self.from_segmented_masked(address);
        let record = self.rdram.read_viewport(rdram_address);
        let translate_x = self.moved_from_origin(record.translate_x_raw as i32, ori) + offx as i32;
        let translate_y = record.translate_y_raw as i32 + offy as i32;
        let viewport = self.rsp.viewport_stack.top_mut();
        viewport.scale = Vec3::new(record.scale[0], record.scale[1], record.scale[2]);
        viewport.translate = Vec3::new(translate_x as f32 / 4.0, translate_y as f32 / 4.0, record.translate_z);
        self.rsp.extended.viewport_origin = ori;
        self.rsp.viewport_changed = true;
    }

    pub fn push_viewport(&mut self) {
        self.rsp.viewport_stack.push();
    }

    pub fn pop_viewport(&mut self) {
        if self.rsp.viewport_stack.pop() {
            self.rsp.viewport_changed = true;
        }
    }

    pub fn set_light(&mut self, index: u8, address: u32) {
        if (index as usize) > RSP_MAX_LIGHTS {
            return;
        }
        let rdram_address = self.from_segmented_masked(address);
        self.rsp.lights[index as usize] = self.rdram.read_light(rdram_address);
        self.rsp.lights_changed = true;
    }

    pub fn set_light_color(&mut self, index: u8, value: u32) {
        if (index as usize) > RSP_MAX_LIGHTS {
            return;
        }
        let light = &mut self.rsp.lights[index as usize];
        light.words[0] = value;
        light.words[1] = value;
        self.rsp.lights_changed = true;
    }

    pub fn set_light_count(&mut self, count: u8) {
        self.rsp.light_count = (count as i32).min(RSP_MAX_LIGHTS as i32);
        self.rsp.lights_changed = true;
    }

    pub fn set_look_at(&mut self, index: u8, address: u32) {
        let rdram_address = self.from_segmented_masked(address);
        let x = self.rdram.read_i8(rdram_address + 8) as f32;
        let y = self.rdram.read_i8(rdram_address + 9) as f32;
        let z = self.rdram.read_i8(rdram_address + 10) as f32;
        let direction = Vec3::new(x, y, z).normalize_or_zero();
        if index == 1 {
            self.rsp.look_at.y = direction;
        } else {
            self.rsp.look_at.x = direction;
        }
        self.rsp.look_at_changed = true;
    }

    pub fn set_look_at_vectors(&mut self, x: Vec3, y: Vec3) {
        self.rsp.look_at = RspLookAt { x, y };
        self.rsp.look_at_changed = true;
    }

    pub fn set_fog(&mut self, mul: i16, offset: i16) {
        self.rsp.fog = RspFog {
            mul: mul as f32,
            offset: offset as f32,
        };
        self.rsp.fog_changed = true;
    }

    pub fn set_texture(&mut self, tile: u8, level: u8, on: u8, sc: u16, tc: u16) {
        self.rsp.texture = TextureState {
            tile,
            levels: level + 1,
            on,
            sc,
            tc,
        };
    }

    pub fn rsp_set_other_mode(&mut self, hi: u32, lo: u32) {
        *self.rsp.other_mode_stack.top_mut() = OtherMode::new(hi, lo);
        self.rdp_set_other_mode(hi, lo);
    }

    pub fn push_other_mode(&mut self) {
        self.rsp.other_mode_stack.push();
    }

    pub fn pop_other_mode(&mut self) {
        if self.rsp.other_mode_stack.pop() {
            let other_mode = *self.rsp.other_mode_stack.top();
            self.rdp_set_other_mode(other_mode.hi, other_mode.lo);
        }
    }

    pub fn set_other_mode_l(&mut self, size: u32, off: u32, data: u32) {
        let mask = (((1u64 << size) - 1) << off) as u32;
        let other_mode = self.rsp.other_mode_stack.top_mut();
        other_mode.lo = (other_mode.lo & !mask) | data;
        let (hi, lo) = (other_mode.hi, other_mode.lo);
        self.rdp_set_other_mode(hi, lo);
    }

    pub fn set_other_mode_h(&mut self, size: u32, off: u32, data: u32) {
        let mask = (((1u64 << size) - 1) << off) as u32;
        let other_mode = self.rsp.other_mode_stack.top_mut();
        other_mode.hi = (other_mode.hi & !mask) | data;
        let (hi, lo) = (other_mode.hi, other_mode.lo);
        self.rdp_set_other_mode(hi, lo);
    }

    pub fn draw_indexed_tri(&mut self, a: u32, b: u32, c: u32) {
        self.draw_indexed_tri_impl(a, b, c, false);
    }

    fn draw_indexed_tri_impl(&mut self, a: u32, b: u32, c: u32, raw_global_indices: bool) {
        // Both cull bits set rejects the triangle outright.
        let geometry_mode = self.rsp.geometry_mode();
        let cull_both = self.rsp.cull_both_mask;
        if (cull_both != 0) && ((geometry_mode & cull_both) == cull_both) {
            return;
        }

        self.check_framebuffer_pair();

        // Re-add the projection if the pair is not in the right bucket.
        let kind = self.current_projection_kind();
        let transforms_index = self.rsp.cur_view_proj_index as u32;
        let in_projection = self
            .workload
            .current_pair()
            .map(|pair| pair.in_projection(transforms_index, kind))
            .unwrap_or(false);
        if !in_projection {
            self.flush();
            self.add_current_projection(kind);
        }

        let texture = self.rsp.texture;
        if (self.draw_call.texture_on != texture.on)
            || (self.draw_call.texture_tile != texture.tile)
            || (self.draw_call.texture_levels != texture.levels)
        {
            self.draw_call.texture_on = texture.on;
            self.draw_call.texture_tile = texture.tile;
            self.draw_call.texture_levels = texture.levels;
            self.update_draw_status_attribute(DrawStatus::TEXTURE);
        }

        if self.check_draw_state() {
            self.load_draw_state();
        }

        // Front-face culling swaps the winding order.
        let (a, c) = if (geometry_mode & cull_both) == self.rsp.cull_front_mask && (self.rsp.cull_front_mask != 0) {
            (c, a)
        } else {
            (a, c)
        };

        let global_indices = if raw_global_indices {
            [a, b, c]
        } else {
            let ia = self.rsp.indices[(a as usize) % RSP_MAX_VERTICES];
            let ib = self.rsp.indices[(b as usize) % RSP_MAX_VERTICES];
            let ic = self.rsp.indices[(c as usize) % RSP_MAX_VERTICES];
            // Whatever modifies these slots afterwards must reindex.
            self.rsp.used |= 1u64 << ((a as usize) % RSP_MAX_VERTICES);
            self.rsp.used |= 1u64 << ((b as usize) % RSP_MAX_VERTICES);
            self.rsp.used |= 1u64 << ((c as usize) % RSP_MAX_VERTICES);
            [ia, ib, ic]
        };

        for &global_index in &global_indices {
            let gi = global_index as usize;
            let u = self.workload.draw_data.tc_floats[gi * 2];
            let v = self.workload.draw_data.tc_floats[gi * 2 + 1];
            self.update_call_texcoords(u, v);
            self.workload.draw_data.face_indices.push(global_index);
            let world_index = self.workload.draw_data.world_indices[gi];
            self.draw_call.min_world_matrix = self.draw_call.min_world_matrix.min(world_index);
            self.draw_call.max_world_matrix = self.draw_call.max_world_matrix.max(world_index);
        }

        // Early backface test, only to keep the draw rect tight; the GPU
        // culls for real.
        let mut visible_tri = true;
        let uses_culling = (geometry_mode & cull_both) != 0;
        if uses_culling {
            let p0 = self.workload.draw_data.pos_screen[global_indices[0] as usize];
            let p1 = self.workload.draw_data.pos_screen[global_indices[1] as usize];
            let p2 = self.workload.draw_data.pos_screen[global_indices[2] as usize];
            let u = p1 - p0;
            let v = p2 - p0;
            let normal = v.cross(u);
            visible_tri = normal.z >= 0.0;
        }

        let scissor_rect = *self.rdp.scissor_rect_stack.top();
        if visible_tri && !scissor_rect.is_null() {
            let z_upd = self.rsp.other_mode_stack.top().z_upd();
            let mut draw_rect = FixedRect::null();
            for &global_index in &global_indices {
                let v = self.workload.draw_data.pos_screen[global_index as usize];
                draw_rect.ulx = draw_rect.ulx.min((v.x * 4.0) as i32);
                draw_rect.uly = draw_rect.uly.min((v.y * 4.0) as i32);
                draw_rect.lrx = draw_rect.lrx.max((v.x.ceil() * 4.0) as i32);
                draw_rect.lry = draw_rect.lry.max((v.y.ceil() * 4.0) as i32);
            }

            if let Some(pair) = self.workload.current_pair_mut() {
                pair.scissor_rect.merge(&scissor_rect);
                let draw_rect = scissor_rect.intersection(&draw_rect);
                if !draw_rect.is_null() {
                    pair.draw_color_rect.merge(&draw_rect);
                    if z_upd {
                        pair.draw_depth_rect.merge(&draw_rect);
                    }
                }
            }
        }

        self.draw_call.triangle_count += 1;
    }

    pub fn set_viewport_align(&mut self, ori: u16, offx: i16, offy: i16) {
        self.rsp.extended.global_viewport_origin = ori;
        self.rsp.extended.global_viewport_offset_x = offx;
        self.rsp.extended.global_viewport_offset_y = offy;
    }

    /// Draw a degenerate probe triangle that asks the renderer to test the
    /// vertex's depth; draws until the matching end are discarded when the
    /// test fails.
    pub fn vertex_test_z(&mut self, vtx_index: u8) {
        let slot = (vtx_index as usize) % RSP_MAX_VERTICES;
        let vertex_index = self.rsp.indices[slot];
        self.rsp.extended.vertex_test_z_index = vertex_index;
        self.rsp.extended.draw_extended = DrawExtended::VertexTestZ { vertex_index };
        self.update_draw_status_attribute(DrawStatus::EXTENDED_TYPE);
        self.draw_indexed_tri_impl(vtx_index as u32, vtx_index as u32, vtx_index as u32, false);
        self.rsp.extended.draw_extended = DrawExtended::None;
        self.update_draw_status_attribute(DrawStatus::EXTENDED_TYPE);
    }

    pub fn end_vertex_test_z(&mut self) {
        let vertex_index = self.rsp.extended.vertex_test_z_index;
        self.rsp.extended.draw_extended = DrawExtended::EndVertexTestZ { vertex_index };
        self.update_draw_status_attribute(DrawStatus::EXTENDED_TYPE);
        self.draw_indexed_tri_impl(vertex_index, vertex_index, vertex_index, true);
        self.rsp.extended.draw_extended = DrawExtended::None;
        self.update_draw_status_attribute(DrawStatus::EXTENDED_TYPE);
    }

    /// Attach interpolation directives to the current matrix id stack top.
    #[allow(clippy::too_many_arguments)]
    pub fn matrix_id(
        &mut self,
        id: u32,
        push: bool,
        proj: bool,
        decompose: bool,
        components: [u8; 7],
        order: u8,
        editable: u8,
    ) {
        let stack = if proj {
            &mut self.rsp.extended.view_proj_matrix_id_stack
        } else {
            &mut self.rsp.extended.model_matrix_id_stack
        };
        if push {
            stack.push();
        }

        let group = stack.top_mut();
        group.matrix_id = id;
        group.decompose = decompose;
        group.position_interpolation = components[0];
        group.rotation_interpolation = components[1];
        group.scale_interpolation = components[2];
        group.skew_interpolation = components[3];
        group.perspective_interpolation = components[4];
        group.vertex_interpolation = components[5];
        group.tile_interpolation = components[6];
        group.ordering = order;
        group.editable = editable;

        if proj {
            self.rsp.extended.view_proj_matrix_id_stack_changed = true;
        } else {
            self.rsp.extended.model_matrix_id_stack_changed = true;
        }
    }

    /// Edit the group properties of transforms already registered for a
    /// matrix at the given address, where the group allows edits.
    #[allow(clippy::too_many_arguments)]
    pub fn edit_group_by_address(
        &mut self,
        address: u32,
        proj: bool,
        decompose: bool,
        components: [u8; 7],
        order: u8,
    ) {
        let rdram_address = self.from_segmented_masked(address);
        let Some(matrix_ids) = self.workload.physical_address_transform_map.get(&rdram_address) else {
            return;
        };
        let matrix_ids = matrix_ids.clone();

        for matrix_id in matrix_ids {
            let group_index = if proj {
                self.workload
                    .draw_data
                    .view_proj_transform_groups
                    .get(matrix_id as usize)
                    .copied()
            } else {
                self.workload
                    .draw_data
                    .world_transform_groups
                    .get(matrix_id as usize)
                    .copied()
            };
            let Some(group_index) = group_index else {
                continue;
            };
            let Some(group) = self.workload.draw_data.transform_groups.get_mut(group_index as usize) else {
                continue;
            };
            if group.editable != gbi_registers::ex::G_EX_EDIT_ALLOW {
                continue;
            }
            group.decompose = decompose;
            group.position_interpolation = components[0];
            group.rotation_interpolation = components[1];
            group.scale_interpolation = components[2];
            group.skew_interpolation = components[3];
            group.perspective_interpolation = components[4];
            group.vertex_interpolation = components[5];
            group.tile_interpolation = components[6];
            group.ordering = order;
        }
    }

    pub fn pop_matrix_id(&mut self, mut count: u8, proj: bool) {
        let (stack, changed) = if proj {
            (
                &mut self.rsp.extended.view_proj_matrix_id_stack,
                &mut self.rsp.extended.view_proj_matrix_id_stack_changed,
            )
        } else {
            (
                &mut self.rsp.extended.model_matrix_id_stack,
                &mut self.rsp.extended.model_matrix_id_stack_changed,
            )
        };
        while count > 0 {
            count -= 1;
            if stack.pop() {
                *changed = true;
            }
        }
    }

    pub fn set_force_branch(&mut self, force: bool) {
        self.rsp.extended.force_branch = force;
    }
}
