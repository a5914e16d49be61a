//! Shared helpers: an RDRAM image builder with the word-swap write
//! conventions, display-list encoders and state construction.
#![allow(dead_code)]

use rcp_hle_core::gbi::GbiFamily;
use rcp_hle_core::rdram::Rdram;
use rcp_hle_core::state::{EmulatorConfig, State};
use rcp_hle_core::Interpreter;

pub const RDRAM_SIZE: usize = 1024 * 1024;

/// RDRAM image under construction. Writes mirror the core's read
/// conventions: bytes through `addr ^ 3`, halfwords through `addr ^ 2`,
/// aligned words little-endian.
pub struct RdramBuilder {
    pub bytes: Vec<u8>,
}

impl RdramBuilder {
    pub fn new() -> Self {
        Self {
            bytes: vec![0; RDRAM_SIZE],
        }
    }

    pub fn write_u8(&mut self, addr: u32, value: u8) {
        self.bytes[(addr ^ 3) as usize] = value;
    }

    pub fn write_u16(&mut self, addr: u32, value: u16) {
        let swapped = (addr ^ 2) as usize;
        self.bytes[swapped..swapped + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, addr: u32, value: u32) {
        let addr = addr as usize;
        self.bytes[addr..addr + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Write a 16-byte vertex record.
    #[allow(clippy::too_many_arguments)]
    pub fn write_vertex(&mut self, addr: u32, x: i16, y: i16, z: i16, s: i16, t: i16, col: [u8; 4]) {
        self.write_u16(addr, x as u16);
        self.write_u16(addr + 2, y as u16);
        self.write_u16(addr + 4, z as u16);
        self.write_u16(addr + 6, 0);
        self.write_u16(addr + 8, s as u16);
        self.write_u16(addr + 10, t as u16);
        for (k, byte) in col.iter().enumerate() {
            self.write_u8(addr + 12 + k as u32, *byte);
        }
    }

    /// Write a 64-byte split fixed-point matrix from float elements.
    pub fn write_matrix(&mut self, addr: u32, elements: &[[f32; 4]; 4]) {
        let addr = addr as usize;
        for i in 0..4 {
            for j in 0..4 {
                let fixed = (elements[i][j] * 65536.0) as i64 as u32;
                let lane = i * 4 + (j ^ 1);
                let int_bytes = ((fixed >> 16) as u16).to_le_bytes();
                let frac_bytes = (fixed as u16).to_le_bytes();
                self.bytes[addr + lane * 2..addr + lane * 2 + 2].copy_from_slice(&int_bytes);
                self.bytes[addr + 32 + lane * 2..addr + 32 + lane * 2 + 2].copy_from_slice(&frac_bytes);
            }
        }
    }

    pub fn write_identity_matrix(&mut self, addr: u32) {
        let mut elements = [[0.0f32; 4]; 4];
        for (i, row) in elements.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        self.write_matrix(addr, &elements);
    }

    /// Write a 16-byte viewport record from pixel scales and translates.
    pub fn write_viewport(&mut self, addr: u32, scale: [f32; 3], translate: [f32; 3]) {
        self.write_u16(addr, (scale[0] * 4.0) as i16 as u16);
        self.write_u16(addr + 2, (scale[1] * 4.0) as i16 as u16);
        self.write_u16(addr + 4, (scale[2] * 1024.0) as i16 as u16);
        self.write_u16(addr + 6, 0);
        self.write_u16(addr + 8, (translate[0] * 4.0) as i16 as u16);
        self.write_u16(addr + 10, (translate[1] * 4.0) as i16 as u16);
        self.write_u16(addr + 12, (translate[2] * 1024.0) as i16 as u16);
        self.write_u16(addr + 14, 0);
    }

    pub fn into_state(self, config: EmulatorConfig) -> State {
        State::new(Rdram::from_bytes(self.bytes), config)
    }
}

impl Default for RdramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Display-list writer appending 8-byte commands into the builder.
pub struct DlWriter<'a> {
    pub ram: &'a mut RdramBuilder,
    pub cursor: u32,
}

impl<'a> DlWriter<'a> {
    pub fn new(ram: &'a mut RdramBuilder, start: u32) -> Self {
        Self { ram, cursor: start }
    }

    pub fn cmd(&mut self, w0: u32, w1: u32) -> &mut Self {
        self.ram.write_u32(self.cursor, w0);
        self.ram.write_u32(self.cursor + 4, w1);
        self.cursor += 8;
        self
    }

    // --- Shared RDP commands ---

    pub fn set_color_image(&mut self, fmt: u32, siz: u32, width: u32, address: u32) -> &mut Self {
        self.cmd((0xFF << 24) | (fmt << 21) | (siz << 19) | (width - 1), address)
    }

    pub fn set_texture_image(&mut self, fmt: u32, siz: u32, width: u32, address: u32) -> &mut Self {
        self.cmd((0xFD << 24) | (fmt << 21) | (siz << 19) | (width - 1), address)
    }

    pub fn set_depth_image(&mut self, address: u32) -> &mut Self {
        self.cmd(0xFE << 24, address)
    }

    pub fn set_scissor(&mut self, ulx: u32, uly: u32, lrx: u32, lry: u32) -> &mut Self {
        self.cmd((0xED << 24) | (ulx << 12) | uly, (lrx << 12) | lry)
    }

    pub fn set_other_mode(&mut self, hi: u32, lo: u32) -> &mut Self {
        self.cmd((0xEF << 24) | (hi & 0x00FF_FFFF), lo)
    }

    pub fn set_fill_color(&mut self, color: u32) -> &mut Self {
        self.cmd(0xF7 << 24, color)
    }

    pub fn fill_rect(&mut self, ulx: u32, uly: u32, lrx: u32, lry: u32) -> &mut Self {
        self.cmd((0xF6 << 24) | (lrx << 12) | lry, (ulx << 12) | uly)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_tile(&mut self, tile: u32, fmt: u32, siz: u32, line: u32, tmem: u32) -> &mut Self {
        self.cmd((0xF5 << 24) | (fmt << 21) | (siz << 19) | (line << 9) | tmem, tile << 24)
    }

    pub fn load_tile(&mut self, tile: u32, uls: u32, ult: u32, lrs: u32, lrt: u32) -> &mut Self {
        self.cmd((0xF4 << 24) | (uls << 12) | ult, (tile << 24) | (lrs << 12) | lrt)
    }

    pub fn load_block(&mut self, tile: u32, uls: u32, ult: u32, lrs: u32, dxt: u32) -> &mut Self {
        self.cmd((0xF3 << 24) | (uls << 12) | ult, (tile << 24) | (lrs << 12) | dxt)
    }

    /// HLE texture rectangle: the base command plus the two spill words.
    #[allow(clippy::too_many_arguments)]
    pub fn tex_rect(
        &mut self,
        ulx: u32,
        uly: u32,
        lrx: u32,
        lry: u32,
        tile: u32,
        s: u16,
        t: u16,
        dsdx: u16,
        dtdy: u16,
    ) -> &mut Self {
        self.cmd((0xE4 << 24) | (lrx << 12) | lry, (tile << 24) | (ulx << 12) | uly);
        self.cmd(0xE1 << 24, ((s as u32) << 16) | t as u32);
        self.cmd(0xF1 << 24, ((dsdx as u32) << 16) | dtdy as u32)
    }

    pub fn full_sync(&mut self) -> &mut Self {
        self.cmd(0xE9 << 24, 0)
    }

    // --- F3DEX2 commands ---

    pub fn ex2_vertex(&mut self, address: u32, count: u32, dst: u32) -> &mut Self {
        let end = dst + count;
        self.cmd((0x01 << 24) | (count << 12) | (end << 1), address)
    }

    pub fn ex2_tri1(&mut self, a: u32, b: u32, c: u32) -> &mut Self {
        self.cmd((0x05 << 24) | ((a * 2) << 16) | ((b * 2) << 8) | (c * 2), 0)
    }

    pub fn ex2_matrix(&mut self, address: u32, params: u32) -> &mut Self {
        self.cmd((0xDA << 24) | (params ^ 0x01), address)
    }

    pub fn ex2_pop_matrix(&mut self, count: u32) -> &mut Self {
        self.cmd(0xD8 << 24, count * 64)
    }

    pub fn ex2_geometry_mode(&mut self, clear: u32, set: u32) -> &mut Self {
        self.cmd((0xD9 << 24) | (!clear & 0x00FF_FFFF), set)
    }

    pub fn ex2_move_word(&mut self, kind: u32, offset: u32, value: u32) -> &mut Self {
        self.cmd((0xDB << 24) | (kind << 16) | offset, value)
    }

    pub fn ex2_move_mem(&mut self, index: u32, offset: u32, address: u32) -> &mut Self {
        self.cmd((0xDC << 24) | ((offset / 8) << 8) | index, address)
    }

    pub fn ex2_texture(&mut self, tile: u32, level: u32, on: u32, sc: u32, tc: u32) -> &mut Self {
        self.cmd(
            (0xD7 << 24) | (level << 11) | (tile << 8) | (on << 1),
            (sc << 16) | tc,
        )
    }

    pub fn ex2_dl(&mut self, address: u32, push: bool) -> &mut Self {
        let no_push = u32::from(!push);
        self.cmd((0xDE << 24) | (no_push << 16), address)
    }

    pub fn ex2_end_dl(&mut self) -> &mut Self {
        self.cmd(0xDF << 24, 0)
    }

    pub fn ex2_rdp_half_1(&mut self, value: u32) -> &mut Self {
        self.cmd(0xE1 << 24, value)
    }

    pub fn ex2_branch_z(&mut self, vtx: u32, z: u32) -> &mut Self {
        self.cmd((0x04 << 24) | ((vtx * 5) << 12) | (vtx * 2), z)
    }

    // --- Extended hook ---

    pub fn hook_enable(&mut self, hook_opcode: u32, extended_opcode: u32) -> &mut Self {
        self.cmd((hook_opcode << 24) | 0x0052_5464, (0x1 << 28) | extended_opcode)
    }

    pub fn ex_command(&mut self, extended_opcode: u32, selector: u32, w1: u32) -> &mut Self {
        self.cmd((extended_opcode << 24) | selector, w1)
    }
}

pub fn make_state() -> State {
    RdramBuilder::new().into_state(EmulatorConfig::default())
}

pub fn make_interpreter() -> Interpreter {
    Interpreter::new(GbiFamily::F3DEX2)
}

/// Apply the F3DEX2 constants to a state used without the interpreter loop.
pub fn apply_f3dex2(state: &mut State) {
    let interpreter = make_interpreter();
    state.rsp.apply_gbi(&interpreter.gbi);
}
