//! The display-list walker.
//!
//! Walks 8-byte commands from a physical RDRAM address until the call stack
//! empties, dispatching each opcode through the active microcode table. The
//! extended opcode byte (when enabled) is routed before the table so games
//! can register it anywhere.

use crate::gbi::{extended, DisplayList, DlCursor, Flow, Gbi, GbiFamily};
use crate::state::{CoreError, State};

pub struct Interpreter {
    pub gbi: Gbi,
}

impl Interpreter {
    pub fn new(family: GbiFamily) -> Self {
        Self {
            gbi: Gbi::for_family(family),
        }
    }

    /// Walk the display-list chain rooted at `address` (already physical).
    ///
    /// A walk past the RDRAM boundary abandons the chain: the frame keeps
    /// the work accumulated so far and the fault is reported.
    pub fn process_display_lists(&self, state: &mut State, address: u32) -> Result<(), CoreError> {
        state.rsp.apply_gbi(&self.gbi);
        (self.gbi.reset)(state);
        state.return_stack.clear();

        let mut pc = address;
        let result = loop {
            if !state.rdram.in_range(pc, 8) {
                state.interpreter_fault = true;
                break Err(CoreError::DisplayListOutOfBounds { address: pc });
            }

            let cmd = DisplayList {
                w0: state.rdram.read_u32(pc),
                w1: state.rdram.read_u32(pc + 4),
            };
            let mut cursor = DlCursor::new(cmd, pc);
            let opcode = cursor.opcode();
            if state.extended.enabled && (opcode == state.extended.opcode) {
                extended::dispatch(state, &mut cursor);
            } else {
                (self.gbi.map[opcode as usize])(state, &mut cursor);
            }

            match cursor.flow {
                Flow::Advance => pc = cursor.next_pc(),
                Flow::Branch(target) => pc = target,
                Flow::Terminate => break Ok(()),
            }
        };

        state.end_frame();
        result
    }
}
