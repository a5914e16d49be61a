//! The shared interpreter state and the draw-call flush protocol.

use thiserror::Error;

use gbi_registers::formats::{G_IM_FMT_DEPTH, G_IM_SIZ_16B};

use crate::draw::{DrawCall, DrawCallTile, DrawStatus, GameCall, MeshDescriptor};
use crate::fb::{FbWriteType, FramebufferManager, FramebufferOperation};
use crate::rdp::Rdp;
use crate::rdram::Rdram;
use crate::rsp::Rsp;
use crate::workload::{FlushReason, ProjectionKind, Workload};

/// Depth of the display-list call stack.
pub const DL_STACK_SIZE: usize = 18;

/// Faults that abort display-list interpretation. Everything else recovers
/// in place.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("display list ran past the end of RDRAM at {address:#010x}")]
    DisplayListOutOfBounds { address: u32 },
    #[error("workload consumer disconnected")]
    QueueDisconnected,
}

/// Behavior switches owned by the embedder.
#[derive(Clone, Copy, Debug)]
pub struct EmulatorConfig {
    /// Attach command warnings to the workload.
    pub developer_mode: bool,
    /// Serve framebuffer reads from GPU tile copies instead of RAM.
    pub copy_with_gpu: bool,
    /// Take conditional display-list branches unconditionally.
    pub force_branch: bool,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            developer_mode: false,
            copy_with_gpu: true,
            force_branch: false,
        }
    }
}

/// State shared by the out-of-band command set.
#[derive(Clone, Copy, Debug)]
pub struct ExtendedGlobalState {
    pub enabled: bool,
    pub opcode: u8,
    pub extend_rdram: bool,
    pub render_to_ram: bool,
    pub dither_noise_strength: f32,
    pub refresh_rate: u16,
}

impl Default for ExtendedGlobalState {
    fn default() -> Self {
        Self {
            enabled: false,
            opcode: gbi_registers::ex::DEFAULT_EXTENDED_OPCODE,
            extend_rdram: false,
            render_to_ram: false,
            dither_noise_strength: 1.0,
            refresh_rate: 0,
        }
    }
}

/// Everything a display-list walk mutates: the RSP and RDP machines, the
/// framebuffer tracker, the workload under construction and the rolling
/// draw call.
pub struct State {
    pub config: EmulatorConfig,
    pub rdram: Rdram,
    pub rsp: Rsp,
    pub rdp: Rdp,
    pub fb_manager: FramebufferManager,
    pub workload: Workload,
    pub draw_call: DrawCall,
    pub draw_status: DrawStatus,
    /// Framebuffer operations waiting to be claimed by the next draw.
    pub draw_fb_operations: Vec<FramebufferOperation>,
    pub extended: ExtendedGlobalState,
    /// Spill words written by the RDP-half commands.
    pub microcode_half1: u32,
    pub microcode_half2: u32,

    pub(crate) return_stack: heapless::Vec<u32, DL_STACK_SIZE>,
    pub(crate) interpreter_fault: bool,
    pub(crate) unknown_opcode_logged: [bool; 256],
    face_index_cursor: u32,
    raw_vertex_cursor: u32,
}

impl State {
    pub fn new(rdram: Rdram, config: EmulatorConfig) -> Self {
        Self {
            config,
            rdram,
            rsp: Rsp::new(),
            rdp: Rdp::new(),
            fb_manager: FramebufferManager::new(),
            workload: Workload::default(),
            draw_call: DrawCall::default(),
            draw_status: DrawStatus::empty(),
            draw_fb_operations: Vec::new(),
            extended: ExtendedGlobalState::default(),
            microcode_half1: 0,
            microcode_half2: 0,
            return_stack: heapless::Vec::new(),
            interpreter_fault: false,
            unknown_opcode_logged: [false; 256],
            face_index_cursor: 0,
            raw_vertex_cursor: 0,
        }
    }

    pub fn interpreter_fault(&self) -> bool {
        self.interpreter_fault
    }

    /// Mark one piece of snapshot state as changed since the last call.
    pub fn update_draw_status_attribute(&mut self, attribute: DrawStatus) {
        self.draw_status |= attribute;
    }

    /// If anything the next call would snapshot has changed, flush the
    /// accumulated call. Returns whether the snapshot must be reloaded.
    pub fn check_draw_state(&mut self) -> bool {
        if self.draw_status.is_empty() {
            return false;
        }
        self.flush();
        true
    }

    /// Snapshot the live RSP/RDP state into the rolling draw call and
    /// resolve its tiles against the TMEM region map.
    pub fn load_draw_state(&mut self) {
        self.draw_call.color_combiner = *self.rdp.combine_stack.top();
        self.draw_call.other_mode = self.rdp.other_mode;
        self.draw_call.geometry_mode = self.rsp.geometry_mode();
        self.draw_call.obj_render_mode = self.rsp.obj_render_mode;
        self.draw_call.fill_color = *self.rdp.fill_color_stack.top();
        self.draw_call.prim_color = *self.rdp.prim_color_stack.top();
        self.draw_call.prim_lod = *self.rdp.prim_lod_stack.top();
        self.draw_call.prim_depth = *self.rdp.prim_depth_stack.top();
        self.draw_call.env_color = *self.rdp.env_color_stack.top();
        self.draw_call.fog_color = *self.rdp.fog_color_stack.top();
        self.draw_call.blend_color = *self.rdp.blend_color_stack.top();
        self.draw_call.convert_k = self.rdp.convert_k;
        self.draw_call.key_center = self.rdp.key_center;
        self.draw_call.key_scale = self.rdp.key_scale;
        self.draw_call.scissor_rect = *self.rdp.scissor_rect_stack.top();
        self.draw_call.scissor_mode = *self.rdp.scissor_mode_stack.top();
        self.draw_call.scissor_left_origin = self.rdp.extended.scissor_left_origin;
        self.draw_call.scissor_right_origin = self.rdp.extended.scissor_right_origin;
        self.draw_call.extended = self.rsp.extended.draw_extended;
        self.draw_call.extended_flags = self.rdp.extended.draw_extended_flags;

        let other_mode = self.rdp.other_mode;
        if let Some(pair) = self.workload.current_pair_mut() {
            pair.depth_read |= other_mode.z_cmp();
            pair.depth_write |= other_mode.z_upd();
        }

        self.load_call_tiles();

        // Pending coherency work runs before the draws that rely on it.
        if !self.draw_fb_operations.is_empty() {
            if let Some(pair) = self.workload.current_pair_mut() {
                pair.start_fb_operations.append(&mut self.draw_fb_operations);
            }
        }

        self.draw_status = DrawStatus::empty();
    }

    /// Resolve the call's tile slots, routing TMEM spans that live on the
    /// GPU through their tile copies (reinterpreting when the pixel size
    /// disagrees by a power of two).
    fn load_call_tiles(&mut self) {
        self.draw_call.tile_index = self.workload.draw_data.call_tiles.len() as u32;
        self.draw_call.tile_count = 0;
        if self.draw_call.texture_on == 0 {
            return;
        }

        let base_tile = self.draw_call.texture_tile as usize;
        let levels = self.draw_call.texture_levels.max(1) as usize;
        for t in 0..levels {
            let tile = self.rdp.tiles[(base_tile + t) & (gbi_registers::TILE_COUNT - 1)];
            let line_width = Rdp::tile_line_width(&tile);
            let result = self
                .fb_manager
                .check_tile_copy_tmem(tile.tmem as u32, line_width, tile.siz, tile.fmt);

            let mut call_tile = DrawCallTile::new(tile);
            call_tile.sync_required = result.sync_required;
            if result.tile_id != 0 {
                if result.reinterpret {
                    let dst_id = self
                        .fb_manager
                        .find_tile_copy_id(result.tile_width.max(1), result.tile_height.max(1));
                    self.draw_fb_operations.push(FramebufferManager::make_tile_reinterpretation(
                        result.tile_id,
                        result.siz,
                        result.fmt,
                        dst_id,
                        tile.siz,
                        tile.fmt,
                        [0; 2],
                        [u32::MAX; 2],
                    ));
                    call_tile.tile_copy_id = dst_id;
                    call_tile.reinterpret = true;
                } else {
                    call_tile.tile_copy_id = result.tile_id;
                }
            }

            self.workload.draw_data.call_tiles.push(call_tile);
            self.draw_call.tile_count += 1;
        }
    }

    /// Emit the accumulated draw call into the current projection.
    pub fn flush(&mut self) {
        if self.draw_call.triangle_count == 0 {
            return;
        }

        if self.draw_call.min_world_matrix > self.draw_call.max_world_matrix {
            self.draw_call.min_world_matrix = 0;
            self.draw_call.max_world_matrix = 0;
        }

        let face_end = self.workload.draw_data.face_indices.len() as u32;
        let raw_end = self.workload.draw_data.raw_vertex_count();
        let face_start = self.face_index_cursor;
        let raw_start = self.raw_vertex_cursor;
        let desc = self.draw_call.clone();

        if let Some(pair) = self.workload.current_pair_mut() {
            if let Some(projection) = pair.projections.last_mut() {
                let mesh = match projection.kind {
                    ProjectionKind::Rectangle | ProjectionKind::Triangle => MeshDescriptor::Raw {
                        start: raw_start,
                        count: raw_end - raw_start,
                    },
                    ProjectionKind::Perspective | ProjectionKind::Orthographic => MeshDescriptor::Indexed {
                        start: face_start,
                        count: face_end - face_start,
                    },
                };
                projection.game_calls.push(GameCall { desc, mesh });
            }
        }

        self.face_index_cursor = face_end;
        self.raw_vertex_cursor = raw_end;
        self.draw_call.reset_accumulation();
    }

    /// Close the current framebuffer pair: record why, and register what it
    /// drew with the framebuffer tracker so later loads can find it.
    pub fn submit_framebuffer_pair(&mut self, reason: FlushReason) {
        let Some(pair_index) = self.workload.current_pair_index() else {
            return;
        };

        let (color_image, depth_image, color_rect, depth_rect, color_range, depth_range, submitted) = {
            let pair = &self.workload.fb_pairs[pair_index];
            (
                pair.color_image,
                pair.depth_image,
                pair.draw_color_rect,
                pair.draw_depth_rect,
                pair.color_write_range(),
                pair.depth_write_range(),
                pair.flush_reason != FlushReason::None,
            )
        };
        if submitted {
            return;
        }
        self.workload.fb_pairs[pair_index].flush_reason = reason;

        let dither = self.rdp.other_mode.rgb_dither();
        if let Some((start, end)) = color_range {
            let timestamp = self.fb_manager.next_write_timestamp();
            let height = color_rect.bottom(true).max(0) as u32;
            let fb = self.fb_manager.get(
                color_image.address,
                color_image.siz,
                color_image.width as u32,
                height,
            );
            fb.last_write_type = FbWriteType::Color;
            fb.last_write_fmt = color_image.fmt;
            fb.last_write_rect = color_rect;
            fb.last_write_timestamp = timestamp;
            fb.record_dither_pattern(dither);
            self.fb_manager.change_ram(color_image.address, start, end);
        }

        if let Some((start, end)) = depth_range {
            let timestamp = self.fb_manager.next_write_timestamp();
            let height = depth_rect.bottom(true).max(0) as u32;
            let fb = self.fb_manager.get(
                depth_image.address,
                G_IM_SIZ_16B,
                color_image.width as u32,
                height,
            );
            fb.last_write_type = FbWriteType::Depth;
            fb.last_write_fmt = G_IM_FMT_DEPTH;
            fb.last_write_rect = depth_rect;
            fb.last_write_timestamp = timestamp;
            fb.ever_used_as_depth = true;
            self.fb_manager.change_ram(depth_image.address, start, end);
        }
    }

    /// Full-pipe sync: emit everything accumulated for this frame so far.
    pub fn full_sync(&mut self) {
        self.flush();
        self.submit_framebuffer_pair(FlushReason::ProcessDisplayListsEnd);
    }

    /// End of a display-list chain: close out the pending pair.
    pub fn end_frame(&mut self) {
        self.flush();
        let has_calls = self
            .workload
            .current_pair()
            .map(|pair| pair.call_count() > 0)
            .unwrap_or(false);
        if has_calls {
            self.submit_framebuffer_pair(FlushReason::ProcessDisplayListsEnd);
        }
    }

    /// Compare tracked framebuffer ranges against RDRAM and queue upload
    /// operations for the ones the CPU wrote; heavily-rewritten buffers are
    /// dropped from tracking instead.
    pub fn check_ram_changes(&mut self) {
        let different = self.fb_manager.check_ram(&self.rdram);
        if different.is_empty() {
            return;
        }
        let mut discards = Vec::new();
        let mut ops = Vec::new();
        self.fb_manager
            .upload_ram(&self.rdram, &different, true, &mut ops, &mut discards);
        self.draw_fb_operations.append(&mut ops);
        self.fb_manager.perform_discards(&discards);
    }

    /// Detach the finished workload and prepare the state for the next
    /// frame's indices.
    pub fn take_workload(&mut self) -> Workload {
        self.fb_manager.hash_tracking(&self.rdram);
        self.fb_manager.clear_used_tile_copies();
        self.fb_manager.reset_tracking();

        let mut workload = std::mem::take(&mut self.workload);
        workload.faulted = self.interpreter_fault;

        self.face_index_cursor = 0;
        self.raw_vertex_cursor = 0;
        self.draw_call = DrawCall::default();
        self.draw_status = DrawStatus::empty();
        self.interpreter_fault = false;

        // Pool indices restart with the new workload; force everything to
        // re-register on first use.
        self.rsp.projection_index = -1;
        self.rsp.projection_matrix_changed = true;
        self.rsp.viewport_changed = true;
        self.rsp.model_view_proj_changed = true;
        self.rsp.fog_changed = true;
        self.rsp.lights_changed = true;
        self.rsp.look_at_changed = true;
        self.rsp.extended.model_matrix_id_stack_changed = true;
        self.rsp.extended.view_proj_matrix_id_stack_changed = true;

        workload
    }

    pub(crate) fn push_return_address(&mut self, address: u32) -> bool {
        self.return_stack.push(address).is_ok()
    }

    pub(crate) fn pop_return_address(&mut self) -> Option<u32> {
        self.return_stack.pop()
    }
}
