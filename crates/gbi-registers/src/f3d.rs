//! F3D (Fast3D) opcode bytes and family-specific constants.

// --- RSP commands ---

pub const G_SPNOOP: u8 = 0x00;
pub const G_MTX: u8 = 0x01;
pub const G_MOVEMEM: u8 = 0x03;
pub const G_VTX: u8 = 0x04;
pub const G_DL: u8 = 0x06;
pub const G_SPRITE2D_BASE: u8 = 0x09;
pub const G_RDPHALF_CONT: u8 = 0xB2;
pub const G_RDPHALF_2: u8 = 0xB3;
pub const G_RDPHALF_1: u8 = 0xB4;
pub const G_QUAD: u8 = 0xB5;
pub const G_CLEARGEOMETRYMODE: u8 = 0xB6;
pub const G_SETGEOMETRYMODE: u8 = 0xB7;
pub const G_ENDDL: u8 = 0xB8;
pub const G_SETOTHERMODE_L: u8 = 0xB9;
pub const G_SETOTHERMODE_H: u8 = 0xBA;
pub const G_TEXTURE: u8 = 0xBB;
pub const G_MOVEWORD: u8 = 0xBC;
pub const G_POPMTX: u8 = 0xBD;
pub const G_CULLDL: u8 = 0xBE;
pub const G_TRI1: u8 = 0xBF;

// --- Matrix params ---

pub const G_MTX_MODELVIEW: u32 = 0x00;
pub const G_MTX_PROJECTION: u32 = 0x01;
pub const G_MTX_MUL: u32 = 0x00;
pub const G_MTX_LOAD: u32 = 0x02;
pub const G_MTX_NOPUSH: u32 = 0x00;
pub const G_MTX_PUSH: u32 = 0x04;

// --- Family-specific geometry mode bits ---

pub const G_TEXTURE_ENABLE: u32 = 0x0000_0002;
pub const G_SHADING_SMOOTH: u32 = 0x0000_0200;
pub const G_CULL_FRONT: u32 = 0x0000_1000;
pub const G_CULL_BACK: u32 = 0x0000_2000;
pub const G_CULL_BOTH: u32 = 0x0000_3000;

// --- Movemem indices ---

pub const G_MV_VIEWPORT: u8 = 0x80;
pub const G_MV_LOOKATY: u8 = 0x82;
pub const G_MV_LOOKATX: u8 = 0x84;
pub const G_MV_L0: u8 = 0x86;
pub const G_MV_L1: u8 = 0x88;
pub const G_MV_L2: u8 = 0x8A;
pub const G_MV_L3: u8 = 0x8C;
pub const G_MV_L4: u8 = 0x8E;
pub const G_MV_L5: u8 = 0x90;
pub const G_MV_L6: u8 = 0x92;
pub const G_MV_L7: u8 = 0x94;
/// Force-matrix load; the command is followed by three spill words.
pub const G_MV_MATRIX_1: u8 = 0x9E;

// --- Moveword offsets ---

/// Light color offsets step by 0x20 starting at aLIGHT_1 = 0.
pub const G_MWO_aLIGHT_STEP: u32 = 0x20;
/// modifyVertex packs slot * 40 + attribute offset.
pub const G_MW_POINTS_STRIDE: u32 = 40;
