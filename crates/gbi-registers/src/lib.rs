//! GBI opcode numbers and bit-field constants (single source of truth).
//!
//! Covers the F3D and F3DEX2 microcode families, the shared RDP command
//! block, the other-mode register fields and the extended command
//! vocabulary spoken through the display-list hook.
#![no_std]

pub mod ex;
pub mod f3d;
pub mod f3dex2;
pub mod formats;
pub mod modes;
pub mod rdp;

pub use modes::OtherMode;

// --- TMEM geometry ---

/// TMEM size in 64-bit words.
pub const TMEM_WORDS: u32 = 512;
/// TMEM size in bytes.
pub const TMEM_BYTES: u32 = 4096;
/// Byte address mask for 4/8/16-bit loads.
pub const TMEM_MASK8: u32 = 4095;
/// Byte address mask for the RGBA32 half-TMEM path.
pub const TMEM_MASK16: u32 = 2047;
/// Word address mask for regular loads.
pub const TMEM_MASK64: u32 = 511;
/// Word address mask for the RGBA32 half-TMEM path.
pub const TMEM_MASK128: u32 = 255;
/// Number of tile descriptors.
pub const TILE_COUNT: usize = 8;

// --- Moveword types (shared ids; the payload layout is per family) ---

pub const G_MW_MATRIX: u8 = 0x00;
pub const G_MW_NUMLIGHT: u8 = 0x02;
pub const G_MW_CLIP: u8 = 0x04;
pub const G_MW_SEGMENT: u8 = 0x06;
pub const G_MW_FOG: u8 = 0x08;
pub const G_MW_LIGHTCOL: u8 = 0x0A;
/// F3DEX2 meaning of id 0x0C.
pub const G_MW_FORCEMTX: u8 = 0x0C;
/// F3D meaning of id 0x0C.
pub const G_MW_POINTS: u8 = 0x0C;
pub const G_MW_PERSPNORM: u8 = 0x0E;

// --- Vertex modify attribute offsets ---

pub const G_MWO_POINT_RGBA: u32 = 0x10;
pub const G_MWO_POINT_ST: u32 = 0x14;
pub const G_MWO_POINT_XYSCREEN: u32 = 0x18;
pub const G_MWO_POINT_ZSCREEN: u32 = 0x1C;

// --- Address handling ---

/// RDP physical address mask (24-bit RDRAM space).
pub const RDP_ADDRESS_MASK: u32 = 0x00FF_FFFF;
/// RSP DMA address mask: bits 3-23, 8-byte aligned.
pub const RSP_DMA_MASK: u32 = 0x00FF_FFF8;
/// RSP DMA address mask for 4-byte aligned color DMAs.
pub const RSP_DMA_MASK4: u32 = 0x00FF_FFFC;
/// Number of segment table entries.
pub const SEGMENT_COUNT: usize = 16;
