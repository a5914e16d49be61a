//! RDP command handlers shared by every microcode family, plus the
//! low-level triangle decoder used by the 6-bit RDP opcode table.

use gbi_registers::rdp::{
    G_FILLRECT, G_LOADBLOCK, G_LOADTILE, G_LOADTLUT, G_NOOP, G_RDPFULLSYNC, G_RDPLOADSYNC,
    G_RDPPIPESYNC, G_RDPSETOTHERMODE, G_RDPTILESYNC, G_RDPTRI_BASE, G_RDPTRI_DEPTH, G_RDPTRI_MAX,
    G_RDPTRI_SHADED, G_RDPTRI_TEXTURED, G_SETBLENDCOLOR, G_SETCIMG, G_SETCOMBINE, G_SETCONVERT,
    G_SETENVCOLOR, G_SETFILLCOLOR, G_SETFOGCOLOR, G_SETKEYGB, G_SETKEYR, G_SETPRIMCOLOR,
    G_SETPRIMDEPTH, G_SETSCISSOR, G_SETTILE, G_SETTILESIZE, G_SETTIMG, G_SETZIMG, G_TEXRECT,
    G_TEXRECTFLIP, TRI_BASE_WORDS, TRI_DEPTH_WORDS, TRI_SHADE_WORDS, TRI_TEX_WORDS,
};

use super::{no_op, DisplayList, DlCursor, GbiFn};
use crate::state::State;

/// Length in 8-byte words of an RDP command by its 6-bit id.
pub fn command_word_length(command_id: u8) -> u8 {
    if (command_id == (G_TEXRECT & 0x3F)) || (command_id == (G_TEXRECTFLIP & 0x3F)) {
        return 2;
    }
    if (command_id >= G_RDPTRI_BASE) && (command_id <= G_RDPTRI_MAX) {
        let mut length = TRI_BASE_WORDS;
        if (command_id & G_RDPTRI_SHADED) != 0 {
            length += TRI_SHADE_WORDS;
        }
        if (command_id & G_RDPTRI_TEXTURED) != 0 {
            length += TRI_TEX_WORDS;
        }
        if (command_id & G_RDPTRI_DEPTH) != 0 {
            length += TRI_DEPTH_WORDS;
        }
        return length as u8;
    }
    1
}

pub fn set_color_image(state: &mut State, cursor: &mut DlCursor) {
    let fmt = cursor.p0(21, 3) as u8;
    let siz = cursor.p0(19, 2) as u8;
    let width = (cursor.p0(0, 12) + 1) as u16;
    state.set_color_image(fmt, siz, width, cursor.cmd.w1);
}

pub fn set_depth_image(state: &mut State, cursor: &mut DlCursor) {
    state.set_depth_image(cursor.cmd.w1);
}

pub fn set_texture_image(state: &mut State, cursor: &mut DlCursor) {
    let fmt = cursor.p0(21, 3) as u8;
    let siz = cursor.p0(19, 2) as u8;
    let width = (cursor.p0(0, 12) + 1) as u16;
    state.set_texture_image(fmt, siz, width, cursor.cmd.w1);
}

pub fn set_combine(state: &mut State, cursor: &mut DlCursor) {
    let combine = ((cursor.cmd.w1 as u64) << 32) | cursor.cmd.w0 as u64;
    state.set_combine(combine);
}

pub fn set_tile(state: &mut State, cursor: &mut DlCursor) {
    let tile = cursor.p1(24, 3) as u8;
    let fmt = cursor.p0(21, 3) as u8;
    let siz = cursor.p0(19, 2) as u8;
    let line = cursor.p0(9, 9) as u16;
    let tmem = cursor.p0(0, 9) as u16;
    let palette = cursor.p1(20, 4) as u8;
    let cmt = cursor.p1(18, 2) as u8;
    let cms = cursor.p1(8, 2) as u8;
    let maskt = cursor.p1(14, 4) as u8;
    let masks = cursor.p1(4, 4) as u8;
    let shiftt = cursor.p1(10, 4) as u8;
    let shifts = cursor.p1(0, 4) as u8;
    state.set_tile(tile, fmt, siz, line, tmem, palette, cmt, cms, maskt, masks, shiftt, shifts);
}

pub fn set_tile_size(state: &mut State, cursor: &mut DlCursor) {
    let tile = cursor.p1(24, 3) as u8;
    state.set_tile_size(
        tile,
        cursor.p0(12, 12) as u16,
        cursor.p0(0, 12) as u16,
        cursor.p1(12, 12) as u16,
        cursor.p1(0, 12) as u16,
    );
}

pub fn load_tile(state: &mut State, cursor: &mut DlCursor) {
    let tile = cursor.p1(24, 3) as u8;
    state.load_tile(
        tile,
        cursor.p0(12, 12) as u16,
        cursor.p0(0, 12) as u16,
        cursor.p1(12, 12) as u16,
        cursor.p1(0, 12) as u16,
    );
}

pub fn load_block(state: &mut State, cursor: &mut DlCursor) {
    let tile = cursor.p1(24, 3) as u8;
    state.load_block(
        tile,
        cursor.p0(12, 12) as u16,
        cursor.p0(0, 12) as u16,
        cursor.p1(12, 12) as u16,
        cursor.p1(0, 12) as u16,
    );
}

pub fn load_tlut(state: &mut State, cursor: &mut DlCursor) {
    let tile = cursor.p1(24, 3) as u8;
    state.load_tlut(
        tile,
        cursor.p0(12, 12) as u16,
        cursor.p0(0, 12) as u16,
        cursor.p1(12, 12) as u16,
        cursor.p1(0, 12) as u16,
    );
}

pub fn set_env_color(state: &mut State, cursor: &mut DlCursor) {
    state.set_env_color(cursor.cmd.w1);
}

pub fn set_prim_color(state: &mut State, cursor: &mut DlCursor) {
    // The manual gives lodMin eight bits but the hardware uses five.
    let lod_frac = cursor.p0(0, 8) as u8;
    let lod_min = cursor.p0(8, 5) as u8;
    state.set_prim_color(lod_frac, lod_min, cursor.cmd.w1);
}

pub fn set_blend_color(state: &mut State, cursor: &mut DlCursor) {
    state.set_blend_color(cursor.cmd.w1);
}

pub fn set_fog_color(state: &mut State, cursor: &mut DlCursor) {
    state.set_fog_color(cursor.cmd.w1);
}

pub fn set_fill_color(state: &mut State, cursor: &mut DlCursor) {
    state.set_fill_color(cursor.cmd.w1);
}

pub fn set_other_mode(state: &mut State, cursor: &mut DlCursor) {
    state.rdp_set_other_mode(cursor.p0(0, 24), cursor.cmd.w1);
}

pub fn set_prim_depth(state: &mut State, cursor: &mut DlCursor) {
    state.set_prim_depth(cursor.p1(16, 16) as u16, cursor.p1(0, 16) as u16);
}

pub fn set_scissor(state: &mut State, cursor: &mut DlCursor) {
    let mode = cursor.p1(24, 2) as u8;
    state.set_scissor(
        mode,
        cursor.p0(12, 12) as i32,
        cursor.p0(0, 12) as i32,
        cursor.p1(12, 12) as i32,
        cursor.p1(0, 12) as i32,
    );
}

pub fn set_convert(state: &mut State, cursor: &mut DlCursor) {
    let k = [
        cursor.p0(13, 9) as i32,
        cursor.p0(4, 9) as i32,
        ((cursor.p0(0, 4) << 5) | cursor.p1(27, 5)) as i32,
        cursor.p1(18, 9) as i32,
        cursor.p1(9, 9) as i32,
        cursor.p1(0, 9) as i32,
    ];
    state.set_convert(k);
}

pub fn set_key_r(state: &mut State, cursor: &mut DlCursor) {
    state.set_key_r(cursor.p1(8, 8), cursor.p1(0, 8), cursor.p1(16, 12));
}

pub fn set_key_gb(state: &mut State, cursor: &mut DlCursor) {
    state.set_key_gb(
        cursor.p1(24, 8),
        cursor.p1(16, 8),
        cursor.p0(12, 12),
        cursor.p1(8, 8),
        cursor.p1(0, 8),
        cursor.p0(0, 12),
    );
}

fn texrect_common(state: &mut State, cursor: &mut DlCursor, flip: bool) {
    let ulx = cursor.p1(12, 12) as i32;
    let uly = cursor.p1(0, 12) as i32;
    let lrx = cursor.p0(12, 12) as i32;
    let lry = cursor.p0(0, 12) as i32;
    let tile = cursor.p1(24, 3) as u8;

    let uv = cursor.next_command(&state.rdram);
    let uls = uv.p1(16, 16) as u16 as i16;
    let ult = uv.p1(0, 16) as u16 as i16;

    let step = cursor.next_command(&state.rdram);
    let dsdx = step.p1(16, 16) as u16 as i16;
    let dtdy = step.p1(0, 16) as u16 as i16;

    state.draw_tex_rect(ulx, uly, lrx, lry, tile, uls, ult, dsdx, dtdy, flip);
}

pub fn texrect(state: &mut State, cursor: &mut DlCursor) {
    texrect_common(state, cursor, false);
}

pub fn texrect_flip(state: &mut State, cursor: &mut DlCursor) {
    texrect_common(state, cursor, true);
}

/// The low-level variants carry the UV words inline via the half spills.
fn texrect_lle_common(state: &mut State, cursor: &mut DlCursor, flip: bool) {
    let ulx = cursor.p1(12, 12) as i32;
    let uly = cursor.p1(0, 12) as i32;
    let lrx = cursor.p0(12, 12) as i32;
    let lry = cursor.p0(0, 12) as i32;
    let tile = cursor.p1(24, 3) as u8;

    let coeff = cursor.next_command(&state.rdram);
    let uls = coeff.p0(16, 16) as u16 as i16;
    let ult = coeff.p0(0, 16) as u16 as i16;
    let dsdx = coeff.p1(16, 16) as u16 as i16;
    let dtdy = coeff.p1(0, 16) as u16 as i16;

    state.draw_tex_rect(ulx, uly, lrx, lry, tile, uls, ult, dsdx, dtdy, flip);
}

pub fn texrect_lle(state: &mut State, cursor: &mut DlCursor) {
    texrect_lle_common(state, cursor, false);
}

pub fn texrect_flip_lle(state: &mut State, cursor: &mut DlCursor) {
    texrect_lle_common(state, cursor, true);
}

pub fn fill_rect(state: &mut State, cursor: &mut DlCursor) {
    state.fill_rect(
        cursor.p1(12, 12) as i32,
        cursor.p1(0, 12) as i32,
        cursor.p0(12, 12) as i32,
        cursor.p0(0, 12) as i32,
    );
}

pub fn full_sync(state: &mut State, _cursor: &mut DlCursor) {
    state.full_sync();
}

fn sign_extend_14(value: u32) -> f32 {
    let fixed = ((value << 18) as i32) >> 18;
    fixed as f32 / 4.0
}

fn combine_fixed(hi: u32, lo: u32) -> f32 {
    ((((hi >> 16) << 16) | (lo >> 16)) as i32) as f32 / 65536.0
}

fn combine_fixed_low(hi: u32, lo: u32) -> f32 {
    ((((hi & 0xFFFF) << 16) | (lo & 0xFFFF)) as i32) as f32 / 65536.0
}

/// Decode one low-level triangle coefficient block into three screen-space
/// vertices and submit it. Packed sequences are conservatively taken one
/// triangle per command.
pub fn tri(state: &mut State, cursor: &mut DlCursor) {
    let command_id = (cursor.cmd.w0 >> 24) & 0x3F;
    let shaded = (command_id as u8 & G_RDPTRI_SHADED) != 0;
    let textured = (command_id as u8 & G_RDPTRI_TEXTURED) != 0;
    let has_depth = (command_id as u8 & G_RDPTRI_DEPTH) != 0;

    let word_count = command_word_length(command_id as u8) as usize;
    let mut words: Vec<DisplayList> = Vec::with_capacity(word_count);
    words.push(cursor.cmd);
    for _ in 1..word_count {
        words.push(cursor.next_command(&state.rdram));
    }

    let tile = ((cursor.cmd.w0 >> 16) & 0x7) as u8;
    let level = ((cursor.cmd.w0 >> 19) & 0x7) as u8;
    let texture_persp = state.rdp.other_mode.text_persp();

    // Edge coefficients reconstruct the vertices by walking the major edge.
    let yl = sign_extend_14(words[0].w0);
    let ym = sign_extend_14(words[0].w1 >> 16);
    let yh = sign_extend_14(words[0].w1);

    let xl = words[1].w0 as i32 as f32 / 65536.0;
    let dxldy = words[1].w1 as i32 as f32 / 65536.0;
    let xh = words[2].w0 as i32 as f32 / 65536.0;
    let dxhdy = words[2].w1 as i32 as f32 / 65536.0;
    let xm = words[3].w0 as i32 as f32 / 65536.0;
    let dxmdy = words[3].w1 as i32 as f32 / 65536.0;
    let _ = (dxldy, xm);

    let y1 = yh;
    let y2 = yl;

    // The base coefficients sit at the scanline above YH.
    let y_floor = yh.floor();
    let h_intercept = xh - dxhdy * y_floor;
    let x1 = dxhdy * y1 + h_intercept;
    let x2 = dxhdy * y2 + h_intercept;
    let x3 = xl;
    let y3 = ym;

    let mut pos = [[0.0f32; 4]; 3];
    let mut col = [[0.0f32; 4]; 3];
    let mut tc = [[0.0f32; 2]; 3];
    pos[0][0] = x1;
    pos[0][1] = y1;
    pos[1][0] = x2;
    pos[1][1] = y2;
    pos[2][0] = x3;
    pos[2][1] = y3;

    // Distances used to evaluate the attribute planes at each vertex.
    let dy_1 = y1 - y_floor;
    let dy_2 = y2 - y_floor;
    let dy_3 = y3 - y_floor;
    let x3_opposite = dxhdy * y3 + h_intercept;
    let dx_3 = x3 - x3_opposite;

    let mut offset = TRI_BASE_WORDS as usize;
    if shaded {
        let w = &words[offset..offset + TRI_SHADE_WORDS as usize];
        let base = [
            combine_fixed(w[0].w0, w[2].w0),
            combine_fixed_low(w[0].w0, w[2].w0),
            combine_fixed(w[0].w1, w[2].w1),
            combine_fixed_low(w[0].w1, w[2].w1),
        ];
        let dx = [
            combine_fixed(w[1].w0, w[3].w0),
            combine_fixed_low(w[1].w0, w[3].w0),
            combine_fixed(w[1].w1, w[3].w1),
            combine_fixed_low(w[1].w1, w[3].w1),
        ];
        let de = [
            combine_fixed(w[4].w0, w[6].w0),
            combine_fixed_low(w[4].w0, w[6].w0),
            combine_fixed(w[4].w1, w[6].w1),
            combine_fixed_low(w[4].w1, w[6].w1),
        ];
        for k in 0..4 {
            let v1 = base[k] + de[k] * dy_1;
            let v2 = base[k] + de[k] * dy_2;
            let v3 = (base[k] + de[k] * dy_3) + dx[k] * dx_3;
            col[0][k] = v1 / 255.0;
            col[1][k] = v2 / 255.0;
            col[2][k] = v3 / 255.0;
        }
        offset += TRI_SHADE_WORDS as usize;
    }

    if textured {
        let w = &words[offset..offset + TRI_TEX_WORDS as usize];
        let base = [
            combine_fixed(w[0].w0, w[2].w0),
            combine_fixed_low(w[0].w0, w[2].w0),
            combine_fixed(w[0].w1, w[2].w1),
        ];
        let dx = [
            combine_fixed(w[1].w0, w[3].w0),
            combine_fixed_low(w[1].w0, w[3].w0),
            combine_fixed(w[1].w1, w[3].w1),
        ];
        let de = [
            combine_fixed(w[4].w0, w[6].w0),
            combine_fixed_low(w[4].w0, w[6].w0),
            combine_fixed(w[4].w1, w[6].w1),
        ];

        let w_base = base[2];
        let w1 = w_base + de[2] * dy_1;
        let w2 = w_base + de[2] * dy_2;
        let w3 = (w_base + de[2] * dy_3) + dx[2] * dx_3;

        let eval = |k: usize, dy: f32, with_dx: bool| {
            let plane = base[k] + de[k] * dy;
            if with_dx {
                plane + dx[k] * dx_3
            } else {
                plane
            }
        };
        let v1_uv = [eval(0, dy_1, false), eval(1, dy_1, false)];
        let v2_uv = [eval(0, dy_2, false), eval(1, dy_2, false)];
        let v3_uv = [eval(0, dy_3, true), eval(1, dy_3, true)];

        if texture_persp {
            pos[0][3] = 65_536_000.0 / w1;
            pos[1][3] = 65_536_000.0 / w2;
            pos[2][3] = 65_536_000.0 / w3;
            tc[0] = [(v1_uv[0] / w1) * 1024.0, (v1_uv[1] / w1) * 1024.0];
            tc[1] = [(v2_uv[0] / w2) * 1024.0, (v2_uv[1] / w2) * 1024.0];
            tc[2] = [(v3_uv[0] / w3) * 1024.0, (v3_uv[1] / w3) * 1024.0];
        } else {
            pos[0][3] = 1.0;
            pos[1][3] = 1.0;
            pos[2][3] = 1.0;
            tc[0] = [(v1_uv[0] * 1024.0) / 16384.0, (v1_uv[1] * 1024.0) / 16384.0];
            tc[1] = [(v2_uv[0] * 1024.0) / 16384.0, (v2_uv[1] * 1024.0) / 16384.0];
            tc[2] = [(v3_uv[0] * 1024.0) / 16384.0, (v3_uv[1] * 1024.0) / 16384.0];
        }

        offset += TRI_TEX_WORDS as usize;
    } else {
        pos[0][3] = 1.0;
        pos[1][3] = 1.0;
        pos[2][3] = 1.0;
    }

    if has_depth {
        let w = &words[offset..offset + TRI_DEPTH_WORDS as usize];
        const DEPTH_SCALE: f32 = 1.0 / 65536.0 / 32768.0;
        let base = w[0].w0 as i32 as f32 * DEPTH_SCALE;
        let ddx = w[0].w1 as i32 as f32 * DEPTH_SCALE;
        let dde = w[1].w0 as i32 as f32 * DEPTH_SCALE;
        pos[0][2] = base + dde * dy_1;
        pos[1][2] = base + dde * dy_2;
        pos[2][2] = (base + dde * dy_3) + ddx * dx_3;
    }

    let pos_flat: Vec<f32> = pos.iter().flatten().copied().collect();
    let tc_flat: Vec<f32> = tc.iter().flatten().copied().collect();
    let col_flat: Vec<f32> = col.iter().flatten().copied().collect();
    state.draw_tris(1, &pos_flat, &tc_flat, &col_flat, tile, level);
}

/// Install the RDP block. The HLE tables use full opcode bytes and the
/// spill-word texrect forms; the low-level table masks to 6 bits and maps
/// the triangle commands.
pub fn setup(map: &mut [GbiFn; 256], hle: bool) {
    let mask = if hle { 0xFF } else { 0x3F };
    let m = |op: u8| (op & mask) as usize;
    map[m(G_NOOP)] = no_op;
    map[m(G_SETCIMG)] = set_color_image;
    map[m(G_SETZIMG)] = set_depth_image;
    map[m(G_SETTIMG)] = set_texture_image;
    map[m(G_SETCOMBINE)] = set_combine;
    map[m(G_SETTILE)] = set_tile;
    map[m(G_SETTILESIZE)] = set_tile_size;
    map[m(G_LOADTILE)] = load_tile;
    map[m(G_LOADBLOCK)] = load_block;
    map[m(G_LOADTLUT)] = load_tlut;
    map[m(G_SETENVCOLOR)] = set_env_color;
    map[m(G_SETPRIMCOLOR)] = set_prim_color;
    map[m(G_SETBLENDCOLOR)] = set_blend_color;
    map[m(G_SETFOGCOLOR)] = set_fog_color;
    map[m(G_SETFILLCOLOR)] = set_fill_color;
    map[m(G_RDPSETOTHERMODE)] = set_other_mode;
    map[m(G_SETPRIMDEPTH)] = set_prim_depth;
    map[m(G_SETSCISSOR)] = set_scissor;
    map[m(G_SETCONVERT)] = set_convert;
    map[m(G_SETKEYR)] = set_key_r;
    map[m(G_SETKEYGB)] = set_key_gb;
    map[m(G_TEXRECT)] = if hle { texrect } else { texrect_lle };
    map[m(G_TEXRECTFLIP)] = if hle { texrect_flip } else { texrect_flip_lle };
    map[m(G_FILLRECT)] = fill_rect;
    map[m(G_RDPLOADSYNC)] = no_op;
    map[m(G_RDPPIPESYNC)] = no_op;
    map[m(G_RDPTILESYNC)] = no_op;
    map[m(G_RDPFULLSYNC)] = full_sync;

    if !hle {
        for command_id in G_RDPTRI_BASE..(G_RDPTRI_BASE + 8) {
            map[command_id as usize] = tri;
        }
    }
}
