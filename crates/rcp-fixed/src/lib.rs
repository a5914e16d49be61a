//! Fixed-point primitives shared by the RCP HLE core.
//!
//! The RDP addresses the screen in 10.2 signed subpixels and the RSP loads
//! matrices as split 16.16 fixed-point lanes. Both representations are kept
//! bit-faithful here so the rest of the core can reason about rounding the
//! same way the hardware does.

mod matrix;
mod rect;

pub use matrix::FixedMatrix;
pub use rect::FixedRect;
