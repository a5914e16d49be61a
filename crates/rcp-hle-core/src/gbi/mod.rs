//! Microcode dispatch: per-family opcode tables and the display-list cursor
//! handlers drive.

pub mod extended;
pub mod f3d;
pub mod f3dex2;
pub mod rdp;

use glam::Vec3;

use crate::rdram::Rdram;
use crate::state::State;

/// One 8-byte display-list command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisplayList {
    pub w0: u32,
    pub w1: u32,
}

impl DisplayList {
    /// Extract `bits` bits of the first word starting at `pos`.
    pub fn p0(&self, pos: u8, bits: u8) -> u32 {
        (self.w0 >> pos) & (((1u64 << bits) - 1) as u32)
    }

    /// Extract `bits` bits of the second word starting at `pos`.
    pub fn p1(&self, pos: u8, bits: u8) -> u32 {
        (self.w1 >> pos) & (((1u64 << bits) - 1) as u32)
    }
}

/// Where the walk goes after the current command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Advance,
    Branch(u32),
    Terminate,
}

/// The interpreter's view of the current command. Handlers read packed
/// fields, pull extra command words, and redirect the walk.
pub struct DlCursor {
    pub cmd: DisplayList,
    pc: u32,
    extra_words: u32,
    pub(crate) flow: Flow,
}

impl DlCursor {
    pub fn new(cmd: DisplayList, pc: u32) -> Self {
        Self {
            cmd,
            pc,
            extra_words: 0,
            flow: Flow::Advance,
        }
    }

    pub fn opcode(&self) -> u8 {
        (self.cmd.w0 >> 24) as u8
    }

    pub fn p0(&self, pos: u8, bits: u8) -> u32 {
        self.cmd.p0(pos, bits)
    }

    pub fn p1(&self, pos: u8, bits: u8) -> u32 {
        self.cmd.p1(pos, bits)
    }

    /// Consume and return the next 8-byte command word.
    pub fn next_command(&mut self, rdram: &Rdram) -> DisplayList {
        let address = self.next_pc();
        self.extra_words += 1;
        DisplayList {
            w0: rdram.read_u32(address),
            w1: rdram.read_u32(address + 4),
        }
    }

    /// Skip `words` extra command words without reading them.
    pub fn skip(&mut self, words: u32) {
        self.extra_words += words;
    }

    /// Address of the command after this one (and its consumed extras).
    pub fn next_pc(&self) -> u32 {
        self.pc + 8 * (1 + self.extra_words)
    }

    /// Continue the walk at `address` instead of the next command.
    pub fn branch(&mut self, address: u32) {
        self.flow = Flow::Branch(address);
    }

    /// Stop walking display lists entirely.
    pub fn terminate(&mut self) {
        self.flow = Flow::Terminate;
    }
}

pub type GbiFn = fn(&mut State, &mut DlCursor);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GbiFamily {
    F3D,
    F3DEX2,
}

/// Microcode-specific constant values the RSP consults.
#[derive(Clone, Copy, Debug, Default)]
pub struct GbiConstants {
    pub mtx_projection: u32,
    pub mtx_load: u32,
    pub mtx_push: u32,
    pub cull_front: u32,
    pub cull_back: u32,
    pub cull_both: u32,
    pub shading_smooth: u32,
    pub texture_enable: u32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct GbiFlags {
    /// Near clipping disabled (NoN microcode variants).
    pub no_n: bool,
    pub point_lighting: bool,
}

/// An opcode table plus the constants and flags of one microcode.
pub struct Gbi {
    pub family: GbiFamily,
    pub map: [GbiFn; 256],
    pub constants: GbiConstants,
    pub flags: GbiFlags,
    pub reset: fn(&mut State),
}

impl Gbi {
    pub fn for_family(family: GbiFamily) -> Self {
        let mut gbi = Self {
            family,
            map: [unknown as GbiFn; 256],
            constants: GbiConstants::default(),
            flags: GbiFlags::default(),
            reset: reset_common,
        };

        rdp::setup(&mut gbi.map, true);
        match family {
            GbiFamily::F3D => f3d::setup(&mut gbi),
            GbiFamily::F3DEX2 => f3dex2::setup(&mut gbi),
        }
        gbi
    }

    /// The low-level RDP table: 6-bit opcode space with the eight triangle
    /// commands decoding coefficient blocks.
    pub fn rdp_lle() -> Self {
        let mut gbi = Self {
            family: GbiFamily::F3D,
            map: [unknown as GbiFn; 256],
            constants: GbiConstants::default(),
            flags: GbiFlags::default(),
            reset: reset_common,
        };
        rdp::setup(&mut gbi.map, false);
        gbi
    }

    /// The hook opcode byte for this family's reserved no-op.
    pub fn hook_opcode(&self) -> u8 {
        match self.family {
            GbiFamily::F3D => gbi_registers::ex::HOOK_OPCODE_F3D,
            GbiFamily::F3DEX2 => gbi_registers::ex::HOOK_OPCODE_F3DEX2,
        }
    }
}

fn reset_common(state: &mut State) {
    state.set_look_at_vectors(Vec3::new(0.0, 1.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
    state.set_fog(0x0100, 0x0000);
}

/// Unmapped opcodes are skipped and logged once per session.
pub fn unknown(state: &mut State, cursor: &mut DlCursor) {
    let opcode = cursor.opcode() as usize;
    if !state.unknown_opcode_logged[opcode] {
        state.unknown_opcode_logged[opcode] = true;
        log::warn!("unknown display list opcode {opcode:#04x}, skipping");
    }
}

/// Shared no-op handler.
pub fn no_op(_state: &mut State, _cursor: &mut DlCursor) {}
