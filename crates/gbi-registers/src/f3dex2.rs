//! F3DEX2 opcode bytes and family-specific constants.

// --- RSP commands (low block) ---

pub const G_VTX: u8 = 0x01;
pub const G_MODIFYVTX: u8 = 0x02;
pub const G_CULLDL: u8 = 0x03;
pub const G_BRANCH_Z: u8 = 0x04;
pub const G_TRI1: u8 = 0x05;
pub const G_TRI2: u8 = 0x06;
pub const G_QUAD: u8 = 0x07;

// --- RSP commands (high block) ---

pub const G_DMA_IO: u8 = 0xD6;
pub const G_TEXTURE: u8 = 0xD7;
pub const G_POPMTX: u8 = 0xD8;
pub const G_GEOMETRYMODE: u8 = 0xD9;
pub const G_MTX: u8 = 0xDA;
pub const G_MOVEWORD: u8 = 0xDB;
pub const G_MOVEMEM: u8 = 0xDC;
pub const G_LOAD_UCODE: u8 = 0xDD;
pub const G_DL: u8 = 0xDE;
pub const G_ENDDL: u8 = 0xDF;
pub const G_NOOP: u8 = 0xE0;
pub const G_RDPHALF_1: u8 = 0xE1;
pub const G_SETOTHERMODE_L: u8 = 0xE2;
pub const G_SETOTHERMODE_H: u8 = 0xE3;
pub const G_RDPHALF_2: u8 = 0xF1;

// --- Matrix params (the command XORs the push bit) ---

pub const G_MTX_MODELVIEW: u32 = 0x00;
pub const G_MTX_PROJECTION: u32 = 0x04;
pub const G_MTX_MUL: u32 = 0x00;
pub const G_MTX_LOAD: u32 = 0x02;
pub const G_MTX_NOPUSH: u32 = 0x00;
pub const G_MTX_PUSH: u32 = 0x01;

// --- Family-specific geometry mode bits ---

pub const G_TEXTURE_ENABLE: u32 = 0x0000_0000;
pub const G_SHADING_SMOOTH: u32 = 0x0020_0000;
pub const G_CULL_FRONT: u32 = 0x0000_0200;
pub const G_CULL_BACK: u32 = 0x0000_0400;
pub const G_CULL_BOTH: u32 = 0x0000_0600;

// --- Movemem indices ---

pub const G_MV_MMTX: u8 = 2;
pub const G_MV_PMTX: u8 = 6;
pub const G_MV_VIEWPORT: u8 = 8;
pub const G_MV_LIGHT: u8 = 10;
pub const G_MV_POINT: u8 = 12;
pub const G_MV_MATRIX: u8 = 14;

/// Light block layout: offsets 0 and 24 are the look-at pair, lights follow.
pub const G_MV_LIGHT_STRIDE: u32 = 24;
