//! F3DEX2 command handlers and table setup.

use gbi_registers::f3dex2::{self, G_MV_LIGHT_STRIDE};
use gbi_registers::{
    G_MW_CLIP, G_MW_FOG, G_MW_FORCEMTX, G_MW_LIGHTCOL, G_MW_MATRIX, G_MW_NUMLIGHT, G_MW_PERSPNORM,
    G_MW_SEGMENT,
};

use super::f3d::{end_dl, rdp_half_1, rdp_half_2, run_dl};
use super::{extended, DlCursor, Gbi, GbiConstants, GbiFlags};
use crate::state::State;

pub fn matrix(state: &mut State, cursor: &mut DlCursor) {
    // The command encodes push inverted.
    let params = (cursor.p0(0, 8) ^ f3dex2::G_MTX_PUSH) as u8;
    state.rsp_matrix(cursor.cmd.w1, params);
}

pub fn pop_matrix(state: &mut State, cursor: &mut DlCursor) {
    state.pop_matrix(cursor.cmd.w1 / 64);
}

pub fn move_mem(state: &mut State, cursor: &mut DlCursor) {
    let index = cursor.p0(0, 8) as u8;
    let offset = cursor.p0(8, 8) * 8;
    let address = cursor.cmd.w1;
    match index {
        f3dex2::G_MV_VIEWPORT => state.set_viewport(address),
        f3dex2::G_MV_MATRIX => state.force_matrix(address),
        f3dex2::G_MV_LIGHT => {
            let slot = offset / G_MV_LIGHT_STRIDE;
            if slot < 2 {
                state.set_look_at(slot as u8, address);
            } else {
                state.set_light((slot - 2) as u8, address);
            }
        }
        _ => log::debug!("unimplemented move mem index {index:#04x}"),
    }
}

pub fn vertex(state: &mut State, cursor: &mut DlCursor) {
    let count = cursor.p0(12, 8) as u8;
    let end = cursor.p0(1, 7) as u8;
    let dst = end.wrapping_sub(count);
    state.set_vertex(cursor.cmd.w1, count, dst);
}

pub fn modify_vertex(state: &mut State, cursor: &mut DlCursor) {
    let attribute = cursor.p0(16, 8);
    let slot = (cursor.p0(0, 16) / 2) as u16;
    state.modify_vertex(slot, attribute, cursor.cmd.w1);
}

pub fn branch_z(state: &mut State, cursor: &mut DlCursor) {
    let vtx_index = (cursor.p0(12, 12) / 5) as u16;
    let branch_dl = state.microcode_half1;
    if let Some(target) = state.branch_z_target(branch_dl, vtx_index, cursor.cmd.w1) {
        cursor.branch(target);
    }
}

pub fn tri1(state: &mut State, cursor: &mut DlCursor) {
    state.draw_indexed_tri(cursor.p0(16, 8) / 2, cursor.p0(8, 8) / 2, cursor.p0(0, 8) / 2);
}

pub fn tri2(state: &mut State, cursor: &mut DlCursor) {
    state.draw_indexed_tri(cursor.p0(16, 8) / 2, cursor.p0(8, 8) / 2, cursor.p0(0, 8) / 2);
    state.draw_indexed_tri(cursor.p1(16, 8) / 2, cursor.p1(8, 8) / 2, cursor.p1(0, 8) / 2);
}

pub fn cull_dl(_state: &mut State, _cursor: &mut DlCursor) {
    // Bounding-volume culling is an RSP-side optimization only.
}

pub fn move_word(state: &mut State, cursor: &mut DlCursor) {
    let kind = cursor.p0(16, 8) as u8;
    let offset = cursor.p0(0, 16);
    match kind {
        G_MW_MATRIX => {}
        G_MW_NUMLIGHT => state.set_light_count((cursor.cmd.w1 / 24) as u8),
        G_MW_CLIP => {}
        G_MW_SEGMENT => state.set_segment(offset / 4, cursor.cmd.w1),
        G_MW_FOG => state.set_fog(cursor.p1(16, 16) as u16 as i16, cursor.p1(0, 16) as u16 as i16),
        G_MW_LIGHTCOL => {
            let index = offset / 0x18;
            state.set_light_color(index as u8, cursor.cmd.w1);
        }
        G_MW_FORCEMTX => state.set_model_view_proj_changed(false),
        G_MW_PERSPNORM => {}
        _ => {}
    }
}

pub fn texture(state: &mut State, cursor: &mut DlCursor) {
    let level = cursor.p0(11, 3) as u8;
    let tile = cursor.p0(8, 3) as u8;
    let on = cursor.p0(1, 7) as u8;
    let sc = cursor.p1(16, 16) as u16;
    let tc = cursor.p1(0, 16) as u16;
    state.set_texture(tile, level, on, sc, tc);
}

pub fn geometry_mode(state: &mut State, cursor: &mut DlCursor) {
    state.modify_geometry_mode(cursor.p0(0, 24), cursor.cmd.w1);
}

pub fn set_other_mode_h(state: &mut State, cursor: &mut DlCursor) {
    let length = cursor.p0(0, 8) + 1;
    let shift = 32 - cursor.p0(8, 8) - length;
    state.set_other_mode_h(length, shift, cursor.cmd.w1);
}

pub fn set_other_mode_l(state: &mut State, cursor: &mut DlCursor) {
    let length = cursor.p0(0, 8) + 1;
    let shift = 32 - cursor.p0(8, 8) - length;
    state.set_other_mode_l(length, shift, cursor.cmd.w1);
}

pub fn load_ucode(_state: &mut State, _cursor: &mut DlCursor) {
    log::debug!("microcode switch ignored");
}

pub fn dma_io(_state: &mut State, _cursor: &mut DlCursor) {}

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
        mtx_projection: f3dex2::G_MTX_PROJECTION,
        mtx_load: f3dex2::G_MTX_LOAD,
        mtx_push: f3dex2::G_MTX_PUSH,
        cull_front: f3dex2::G_CULL_FRONT,
        cull_back: f3dex2::G_CULL_BACK,
        cull_both: f3dex2::G_CULL_BOTH,
        shading_smooth: f3dex2::G_SHADING_SMOOTH,
        texture_enable: f3dex2::G_TEXTURE_ENABLE,
    };
    gbi.flags = GbiFlags {
        no_n: false,
        point_lighting: true,
    };

    let map = &mut gbi.map;
    map[f3dex2::G_VTX as usize] = vertex;
    map[f3dex2::G_MODIFYVTX as usize] = modify_vertex;
    map[f3dex2::G_CULLDL as usize] = cull_dl;
    map[f3dex2::G_BRANCH_Z as usize] = branch_z;
    map[f3dex2::G_TRI1 as usize] = tri1;
    map[f3dex2::G_TRI2 as usize] = tri2;
    map[f3dex2::G_QUAD as usize] = tri2;
    map[f3dex2::G_DMA_IO as usize] = dma_io;
    map[f3dex2::G_TEXTURE as usize] = texture;
    map[f3dex2::G_POPMTX as usize] = pop_matrix;
    map[f3dex2::G_GEOMETRYMODE as usize] = geometry_mode;
    map[f3dex2::G_MTX as usize] = matrix;
    map[f3dex2::G_MOVEWORD as usize] = move_word;
    map[f3dex2::G_MOVEMEM as usize] = move_mem;
    map[f3dex2::G_LOAD_UCODE as usize] = load_ucode;
    map[f3dex2::G_DL as usize] = run_dl;
    map[f3dex2::G_ENDDL as usize] = end_dl;
    map[f3dex2::G_NOOP as usize] = extended::hook_or_noop;
    map[f3dex2::G_RDPHALF_1 as usize] = rdp_half_1;
    map[f3dex2::G_RDPHALF_2 as usize] = rdp_half_2;
    map[f3dex2::G_SETOTHERMODE_L as usize] = set_other_mode_l;
    map[f3dex2::G_SETOTHERMODE_H as usize] = set_other_mode_h;
    map[gbi_registers::rdp::G_SETCIMG as usize] = set_color_image;
    map[gbi_registers::rdp::G_SETZIMG as usize] = set_depth_image;
    map[gbi_registers::rdp::G_SETTIMG as usize] = set_texture_image;
}
