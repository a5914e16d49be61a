//! F3D (Fast3D) command handlers and table setup.

use gbi_registers::f3d::{self, G_MWO_aLIGHT_STEP, G_MW_POINTS_STRIDE};
use gbi_registers::{
    G_MW_CLIP, G_MW_FOG, G_MW_LIGHTCOL, G_MW_MATRIX, G_MW_NUMLIGHT, G_MW_PERSPNORM, G_MW_POINTS,
    G_MW_SEGMENT,
};

use super::{extended, DlCursor, Gbi, GbiConstants, GbiFlags};
use crate::state::State;

pub fn matrix(state: &mut State, cursor: &mut DlCursor) {
    state.rsp_matrix(cursor.cmd.w1, cursor.p0(16, 8) as u8);
}

pub fn pop_matrix(state: &mut State, cursor: &mut DlCursor) {
    if cursor.cmd.w1 == 0 {
        state.pop_matrix(1);
    }
}

pub fn move_mem(state: &mut State, cursor: &mut DlCursor) {
    let index = cursor.p0(16, 8) as u8;
    let address = cursor.cmd.w1;
    match index {
        f3d::G_MV_VIEWPORT => state.set_viewport(address),
        f3d::G_MV_MATRIX_1 => {
            state.force_matrix(address);
            cursor.skip(3);
        }
        f3d::G_MV_L0 => state.set_light(0, address),
        f3d::G_MV_L1 => state.set_light(1, address),
        f3d::G_MV_L2 => state.set_light(2, address),
        f3d::G_MV_L3 => state.set_light(3, address),
        f3d::G_MV_L4 => state.set_light(4, address),
        f3d::G_MV_L5 => state.set_light(5, address),
        f3d::G_MV_L6 => state.set_light(6, address),
        f3d::G_MV_L7 => state.set_light(7, address),
        f3d::G_MV_LOOKATX => state.set_look_at(0, address),
        f3d::G_MV_LOOKATY => state.set_look_at(1, address),
        _ => log::debug!("unimplemented move mem index {index:#04x}"),
    }
}

pub fn vertex(state: &mut State, cursor: &mut DlCursor) {
    let count = (cursor.p0(20, 4) + 1) as u8;
    let dst = cursor.p0(16, 4) as u8;
    state.set_vertex(cursor.cmd.w1, count, dst);
}

pub fn run_dl(state: &mut State, cursor: &mut DlCursor) {
    if cursor.p0(16, 1) == 0 {
        if !state.push_return_address(cursor.next_pc()) {
            log::warn!("display list call stack overflow, abandoning the frame");
            cursor.terminate();
            return;
        }
    }

    let rdram_address = state.from_segmented_masked(cursor.cmd.w1);
    cursor.branch(rdram_address);
}

pub fn end_dl(state: &mut State, cursor: &mut DlCursor) {
    match state.pop_return_address() {
        Some(address) => cursor.branch(address),
        None => cursor.terminate(),
    }
}

pub fn sprite_2d_base(_state: &mut State, _cursor: &mut DlCursor) {
    // Sprite microcode state is not consumed by anything downstream.
}

pub fn tri1(state: &mut State, cursor: &mut DlCursor) {
    state.draw_indexed_tri(
        cursor.p1(16, 8) / 10,
        cursor.p1(8, 8) / 10,
        cursor.p1(0, 8) / 10,
    );
}

pub fn quad(state: &mut State, cursor: &mut DlCursor) {
    let v0 = cursor.p1(24, 8) / 10;
    let v1 = cursor.p1(16, 8) / 10;
    let v2 = cursor.p1(8, 8) / 10;
    let v3 = cursor.p1(0, 8) / 10;
    state.draw_indexed_tri(v0, v1, v2);
    state.draw_indexed_tri(v0, v2, v3);
}

pub fn cull_dl(_state: &mut State, _cursor: &mut DlCursor) {
    // Bounding-volume culling is an RSP-side optimization only.
}

pub fn move_word(state: &mut State, cursor: &mut DlCursor) {
    let kind = cursor.p0(0, 8) as u8;
    match kind {
        G_MW_MATRIX => {}
        G_MW_NUMLIGHT => {
            let count = ((cursor.cmd.w1.wrapping_sub(0x8000_0000)) >> 5).wrapping_sub(1);
            state.set_light_count(count as u8);
        }
        G_MW_CLIP => {}
        G_MW_SEGMENT => state.set_segment(cursor.p0(10, 4), cursor.cmd.w1),
        G_MW_FOG => state.set_fog(cursor.p1(16, 16) as u16 as i16, cursor.p1(0, 16) as u16 as i16),
        G_MW_LIGHTCOL => {
            let offset = cursor.p0(8, 16);
            let index = offset / G_MWO_aLIGHT_STEP;
            state.set_light_color(index as u8, cursor.cmd.w1);
        }
        G_MW_POINTS => {
            let value = cursor.p0(8, 16);
            state.modify_vertex(
                (value / G_MW_POINTS_STRIDE) as u16,
                value % G_MW_POINTS_STRIDE,
                cursor.cmd.w1,
            );
        }
        G_MW_PERSPNORM => {}
        _ => {}
    }
}

pub fn texture(state: &mut State, cursor: &mut DlCursor) {
    let tile = cursor.p0(8, 3) as u8;
    let level = cursor.p0(11, 3) as u8;
    let on = cursor.p0(0, 8) as u8;
    let sc = cursor.p1(16, 16) as u16;
    let tc = cursor.p1(0, 16) as u16;
    state.set_texture(tile, level, on, sc, tc);
}

pub fn set_other_mode_h(state: &mut State, cursor: &mut DlCursor) {
    state.set_other_mode_h(cursor.p0(0, 8), cursor.p0(8, 8), cursor.cmd.w1);
}

pub fn set_other_mode_l(state: &mut State, cursor: &mut DlCursor) {
    state.set_other_mode_l(cursor.p0(0, 8), cursor.p0(8, 8), cursor.cmd.w1);
}

pub fn set_geometry_mode(state: &mut State, cursor: &mut DlCursor) {
    state.set_geometry_mode(cursor.cmd.w1);
}

pub fn clear_geometry_mode(state: &mut State, cursor: &mut DlCursor) {
    state.clear_geometry_mode(cursor.cmd.w1);
}

pub fn rdp_half_1(state: &mut State, cursor: &mut DlCursor) {
    state.microcode_half1 = cursor.cmd.w1;
}

pub fn rdp_half_2(state: &mut State, cursor: &mut DlCursor) {
    state.microcode_half2 = cursor.cmd.w1;
}

fn set_color_image(state: &mut State, cursor: &mut DlCursor) {
    let fmt = cursor.p0(21, 3) as u8;
    let siz = cursor.p0(19, 2) as u8;
    let width = (cursor.p0(0, 12) + 1) as u16;
    let address = state.from_segmented(cursor.cmd.w1);
    state.set_color_image(fmt, siz, width, address);
}

fn set_depth_image(state: &mut State, cursor: &mut DlCursor) {
    let address = state.from_segmented(cursor.cmd.w1);
    state.set_depth_image(address);
}

fn set_texture_image(state: &mut State, cursor: &mut DlCursor) {
    let fmt = cursor.p0(21, 3) as u8;
    let siz = cursor.p0(19, 2) as u8;
    let width = (cursor.p0(0, 12) + 1) as u16;
    let address = state.from_segmented(cursor.cmd.w1);
    state.set_texture_image(fmt, siz, width, address);
}

pub fn setup(gbi: &mut Gbi) {
    gbi.constants = GbiConstants {
        mtx_projection: f3d::G_MTX_PROJECTION,
        mtx_load: f3d::G_MTX_LOAD,
        mtx_push: f3d::G_MTX_PUSH,
        cull_front: f3d::G_CULL_FRONT,
        cull_back: f3d::G_CULL_BACK,
        cull_both: f3d::G_CULL_BOTH,
        shading_smooth: f3d::G_SHADING_SMOOTH,
        texture_enable: f3d::G_TEXTURE_ENABLE,
    };
    gbi.flags = GbiFlags {
        no_n: false,
        point_lighting: false,
    };

    let map = &mut gbi.map;
    map[f3d::G_SPNOOP as usize] = extended::hook_or_noop;
    map[f3d::G_MTX as usize] = matrix;
    map[f3d::G_MOVEMEM as usize] = move_mem;
    map[f3d::G_VTX as usize] = vertex;
    map[f3d::G_DL as usize] = run_dl;
    map[f3d::G_ENDDL as usize] = end_dl;
    map[f3d::G_SPRITE2D_BASE as usize] = sprite_2d_base;
    map[f3d::G_TRI1 as usize] = tri1;
    map[f3d::G_QUAD as usize] = quad;
    map[f3d::G_CULLDL as usize] = cull_dl;
    map[f3d::G_POPMTX as usize] = pop_matrix;
    map[f3d::G_MOVEWORD as usize] = move_word;
    map[f3d::G_TEXTURE as usize] = texture;
    map[f3d::G_SETOTHERMODE_H as usize] = set_other_mode_h;
    map[f3d::G_SETOTHERMODE_L as usize] = set_other_mode_l;
    map[f3d::G_SETGEOMETRYMODE as usize] = set_geometry_mode;
    map[f3d::G_CLEARGEOMETRYMODE as usize] = clear_geometry_mode;
    map[f3d::G_RDPHALF_1 as usize] = rdp_half_1;
    map[f3d::G_RDPHALF_2 as usize] = rdp_half_2;
    map[gbi_registers::rdp::G_SETCIMG as usize] = set_color_image;
    map[gbi_registers::rdp::G_SETZIMG as usize] = set_depth_image;
    map[gbi_registers::rdp::G_SETTIMG as usize] = set_texture_image;
}
