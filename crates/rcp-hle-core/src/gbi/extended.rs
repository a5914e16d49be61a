//! The out-of-band command set spoken through the reserved no-op hook.
//!
//! The hook opcode carries a magic number and a small sub-op vocabulary;
//! once enabled, a second opcode byte dispatches the extended table:
//! origin-aligned rectangles, state push/pop, matrix interpolation groups
//! and assorted overrides.

use gbi_registers::ex;

use super::DlCursor;
use crate::rdp::ExtendedAlignment;
use crate::state::State;

/// Handler for the family's reserved no-op: either a hook command carrying
/// the magic number, or nothing.
pub fn hook_or_noop(state: &mut State, cursor: &mut DlCursor) {
    if cursor.p0(0, 24) != ex::HOOK_MAGIC {
        return;
    }

    match cursor.p1(28, 4) {
        ex::HOOK_OP_GETVERSION => {
            let address = state.from_segmented(cursor.p1(0, 28));
            state.rdram.write_u32(address, ex::G_EX_VERSION);
        }
        ex::HOOK_OP_ENABLE => {
            let opcode = cursor.p1(0, 8) as u8;
            state.extended.enabled = true;
            state.extended.opcode = if opcode != 0 { opcode } else { ex::DEFAULT_EXTENDED_OPCODE };
        }
        ex::HOOK_OP_DISABLE => {
            state.extended.enabled = false;
        }
        ex::HOOK_OP_DL => {
            if !state.push_return_address(cursor.next_pc()) {
                log::warn!("display list call stack overflow, abandoning the frame");
                cursor.terminate();
                return;
            }
            let target = state.from_segmented_masked(cursor.p1(0, 28));
            cursor.branch(target);
        }
        ex::HOOK_OP_BRANCH => {
            let target = state.from_segmented_masked(cursor.p1(0, 28));
            cursor.branch(target);
        }
        _ => {}
    }
}

fn signed16(value: u32) -> i32 {
    value as u16 as i16 as i32
}

fn matrix_group_components(word: u32) -> (bool, bool, bool, [u8; 7], u8, u8) {
    let push = (word & 0x1) != 0;
    let proj = (word & 0x2) != 0;
    let decompose = ((word >> 2) & 0x1) != 0;
    let components = [
        ((word >> 3) & 0x3) as u8,
        ((word >> 5) & 0x3) as u8,
        ((word >> 7) & 0x3) as u8,
        ((word >> 9) & 0x3) as u8,
        ((word >> 11) & 0x3) as u8,
        ((word >> 13) & 0x3) as u8,
        ((word >> 15) & 0x3) as u8,
    ];
    let order = ((word >> 17) & 0x3) as u8;
    let editable = ((word >> 19) & 0x1) as u8;
    (push, proj, decompose, components, order, editable)
}

/// Dispatch one extended command (the opcode byte already matched).
pub fn dispatch(state: &mut State, cursor: &mut DlCursor) {
    let selector = cursor.p0(0, 24);
    match selector {
        ex::G_EX_NOOP | ex::G_EX_PRINT => {}
        ex::G_EX_TEXRECT_V1 => {
            let tile = cursor.p1(0, 3) as u8;
            let alignment = ExtendedAlignment {
                left_origin: cursor.p1(3, 12) as u16,
                right_origin: cursor.p1(15, 12) as u16,
                ..ExtendedAlignment::default()
            };
            let coords = cursor.next_command(&state.rdram);
            let ulx = signed16(coords.p0(16, 16));
            let uly = signed16(coords.p0(0, 16));
            let lrx = signed16(coords.p1(16, 16));
            let lry = signed16(coords.p1(0, 16));
            let uv = cursor.next_command(&state.rdram);
            let uls = signed16(uv.p0(16, 16)) as i16;
            let ult = signed16(uv.p0(0, 16)) as i16;
            let dsdx = signed16(uv.p1(16, 16)) as i16;
            let dtdy = signed16(uv.p1(0, 16)) as i16;
            state.draw_tex_rect_aligned(ulx, uly, lrx, lry, tile, uls, ult, dsdx, dtdy, false, &alignment);
        }
        ex::G_EX_FILLRECT_V1 => {
            let alignment = ExtendedAlignment {
                left_origin: cursor.p1(0, 12) as u16,
                right_origin: cursor.p1(12, 12) as u16,
                ..ExtendedAlignment::default()
            };
            let coords = cursor.next_command(&state.rdram);
            let ulx = signed16(coords.p0(16, 16));
            let uly = signed16(coords.p0(0, 16));
            let lrx = signed16(coords.p1(16, 16));
            let lry = signed16(coords.p1(0, 16));
            state.fill_rect_aligned(ulx, uly, lrx, lry, &alignment);
        }
        ex::G_EX_SETVIEWPORT_V1 => {
            let origin = cursor.p1(0, 12) as u16;
            let payload = cursor.next_command(&state.rdram);
            state.set_viewport_aligned(payload.w1, origin, 0, 0);
        }
        ex::G_EX_SETSCISSOR_V1 => {
            let mode = cursor.p1(0, 2) as u8;
            let alignment = ExtendedAlignment {
                left_origin: cursor.p1(2, 12) as u16,
                right_origin: cursor.p1(14, 12) as u16,
                ..ExtendedAlignment::default()
            };
            let coords = cursor.next_command(&state.rdram);
            state.set_scissor_aligned(
                mode,
                signed16(coords.p0(16, 16)),
                signed16(coords.p0(0, 16)),
                signed16(coords.p1(16, 16)),
                signed16(coords.p1(0, 16)),
                &alignment,
            );
        }
        ex::G_EX_SETRECTALIGN_V1 => {
            let left_origin = cursor.p1(0, 12) as u16;
            let right_origin = cursor.p1(12, 12) as u16;
            let offsets = cursor.next_command(&state.rdram);
            state.set_rect_align(ExtendedAlignment {
                left_origin,
                right_origin,
                left_offset: signed16(offsets.p0(16, 16)),
                top_offset: signed16(offsets.p0(0, 16)),
                right_offset: signed16(offsets.p1(16, 16)),
                bottom_offset: signed16(offsets.p1(0, 16)),
                ..ExtendedAlignment::default()
            });
        }
        ex::G_EX_SETVIEWPORTALIGN_V1 => {
            let origin = cursor.p1(0, 12) as u16;
            let offsets = cursor.next_command(&state.rdram);
            state.set_viewport_align(
                origin,
                signed16(offsets.p0(16, 16)) as i16,
                signed16(offsets.p0(0, 16)) as i16,
            );
        }
        ex::G_EX_SETSCISSORALIGN_V1 => {
            let left_origin = cursor.p1(0, 12) as u16;
            let right_origin = cursor.p1(12, 12) as u16;
            let offsets = cursor.next_command(&state.rdram);
            let bounds = cursor.next_command(&state.rdram);
            state.set_scissor_align(ExtendedAlignment {
                left_origin,
                right_origin,
                left_offset: signed16(offsets.p0(16, 16)),
                top_offset: signed16(offsets.p0(0, 16)),
                right_offset: signed16(offsets.p1(16, 16)),
                bottom_offset: signed16(offsets.p1(0, 16)),
                left_bound: signed16(bounds.p0(16, 16)),
                top_bound: signed16(bounds.p0(0, 16)),
                right_bound: signed16(bounds.p1(16, 16)),
                bottom_bound: signed16(bounds.p1(0, 16)),
            });
        }
        ex::G_EX_SETREFRESHRATE_V1 => {
            state.extended.refresh_rate = cursor.p1(0, 16) as u16;
        }
        ex::G_EX_VERTEXZTEST_V1 => {
            state.vertex_test_z(cursor.p1(0, 8) as u8);
        }
        ex::G_EX_ENDVERTEXZTEST_V1 => {
            state.end_vertex_test_z();
        }
        ex::G_EX_MATRIXGROUP_V1 => {
            let id = cursor.cmd.w1;
            let params = cursor.next_command(&state.rdram);
            let (push, proj, decompose, components, order, editable) = matrix_group_components(params.w0);
            state.matrix_id(id, push, proj, decompose, components, order, editable);
        }
        ex::G_EX_POPMATRIXGROUP_V1 => {
            let count = cursor.p1(0, 8) as u8;
            let proj = cursor.p1(8, 1) != 0;
            state.pop_matrix_id(count, proj);
        }
        ex::G_EX_FORCEUPSCALE2D_V1 => state.force_upscale_2d(cursor.p1(0, 1) != 0),
        ex::G_EX_FORCETRUEBILERP_V1 => state.force_true_bilerp(cursor.p1(0, 2) as u8),
        ex::G_EX_FORCESCALELOD_V1 => state.force_scale_lod(cursor.p1(0, 1) != 0),
        ex::G_EX_FORCEBRANCH_V1 => state.set_force_branch(cursor.p1(0, 1) != 0),
        ex::G_EX_SETRENDERTORAM_V1 => {
            state.extended.render_to_ram = cursor.p1(0, 1) != 0;
        }
        ex::G_EX_EDITGROUPBYADDRESS_V1 => {
            let address = cursor.cmd.w1;
            let params = cursor.next_command(&state.rdram);
            let (_push, proj, decompose, components, order, _editable) = matrix_group_components(params.w0);
            state.edit_group_by_address(address, proj, decompose, components, order);
        }
        ex::G_EX_VERTEX_V1 => {
            let count = cursor.p1(12, 8) as u8;
            let end = cursor.p1(1, 7) as u8;
            let dst = end.wrapping_sub(count);
            let payload = cursor.next_command(&state.rdram);
            state.set_vertex(payload.w1, count, dst);
        }
        ex::G_EX_PUSHVIEWPORT_V1 => state.push_viewport(),
        ex::G_EX_POPVIEWPORT_V1 => state.pop_viewport(),
        ex::G_EX_PUSHSCISSOR_V1 => state.push_scissor(),
        ex::G_EX_POPSCISSOR_V1 => state.pop_scissor(),
        ex::G_EX_PUSHOTHERMODE_V1 => state.push_other_mode(),
        ex::G_EX_POPOTHERMODE_V1 => state.pop_other_mode(),
        ex::G_EX_PUSHCOMBINE_V1 => state.push_combine(),
        ex::G_EX_POPCOMBINE_V1 => state.pop_combine(),
        ex::G_EX_PUSHPROJMATRIX_V1 => state.push_projection_matrix(),
        ex::G_EX_POPPROJMATRIX_V1 => state.pop_projection_matrix(),
        ex::G_EX_PUSHENVCOLOR_V1 => state.push_env_color(),
        ex::G_EX_POPENVCOLOR_V1 => state.pop_env_color(),
        ex::G_EX_PUSHBLENDCOLOR_V1 => state.push_blend_color(),
        ex::G_EX_POPBLENDCOLOR_V1 => state.pop_blend_color(),
        ex::G_EX_PUSHFOGCOLOR_V1 => state.push_fog_color(),
        ex::G_EX_POPFOGCOLOR_V1 => state.pop_fog_color(),
        ex::G_EX_PUSHFILLCOLOR_V1 => state.push_fill_color(),
        ex::G_EX_POPFILLCOLOR_V1 => state.pop_fill_color(),
        ex::G_EX_PUSHPRIMCOLOR_V1 => state.push_prim_color(),
        ex::G_EX_POPPRIMCOLOR_V1 => state.pop_prim_color(),
        ex::G_EX_PUSHGEOMETRYMODE_V1 => state.push_geometry_mode(),
        ex::G_EX_POPGEOMETRYMODE_V1 => state.pop_geometry_mode(),
        ex::G_EX_SETDITHERNOISESTRENGTH_V1 => {
            state.extended.dither_noise_strength = cursor.p1(0, 16) as f32 / 1024.0;
        }
        ex::G_EX_SETRDRAMEXTENDED_V1 => {
            state.extended.extend_rdram = cursor.p1(0, 1) != 0;
        }
        _ => {
            log::debug!("unknown extended command selector {selector:#08x}");
        }
    }
}
