//! High-level emulation core for the N64 RCP.
//!
//! Walks the display-list command stream a game wrote into RDRAM, runs the
//! RSP and RDP state machines over it, keeps the emulated framebuffers
//! coherent with what the GPU has actually rendered, and batches everything
//! into per-frame [`workload::Workload`]s for an external renderer.
//!
//! The core never talks to a GPU. Framebuffer reads that need GPU pixels are
//! expressed as [`workload::FramebufferOperation`] records the renderer
//! replays in order.

pub mod draw;
pub mod fb;
pub mod gbi;
pub mod interp;
pub mod math;
pub mod rdp;
pub mod rdram;
pub mod rsp;
pub mod stack;
pub mod state;
pub mod workload;

pub use interp::Interpreter;
pub use state::{CoreError, EmulatorConfig, State};
pub use workload::{Workload, WorkloadConsumer, WorkloadQueue};
