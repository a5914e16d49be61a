//! TMEM load semantics: swizzles, the block DXT accumulator, palette
//! replication and the load-operation round trip.

mod common;

use common::RdramBuilder;
use rcp_hle_core::rdp::tmem::{replay_load, TMEM_SIZE};
use rcp_hle_core::state::EmulatorConfig;

const TEXTURE_ADDR: u32 = 0x30000;

/// State with a counting byte pattern at the texture address.
fn textured_state() -> rcp_hle_core::State {
    let mut ram = RdramBuilder::new();
    for i in 0..0x1000u32 {
        ram.write_u8(TEXTURE_ADDR + i, (i & 0xFF) as u8);
    }
    ram.into_state(EmulatorConfig::default())
}

// ============================================================================
// Tile loads
// ============================================================================

mod tile_load_tests {
    use super::*;

    #[test]
    fn first_row_loads_straight() {
        let mut state = textured_state();
        state.set_texture_image(0, 2, 8, TEXTURE_ADDR);
        state.set_tile(0, 0, 2, 2, 0, 0, 0, 0, 0, 0, 0, 0);
        // Two rows of eight 16-bit texels.
        state.load_tile(0, 0, 0, 7 << 2, 1 << 2);

        for i in 0..16 {
            assert_eq!(state.rdp.tmem[i], i as u8, "row 0 byte {i}");
        }
    }

    #[test]
    fn odd_rows_swap_nibble_words() {
        let mut state = textured_state();
        state.set_texture_image(0, 2, 8, TEXTURE_ADDR);
        state.set_tile(0, 0, 2, 2, 0, 0, 0, 0, 0, 0, 0, 0);
        state.load_tile(0, 0, 0, 7 << 2, 1 << 2);

        // Row 1 lands at the line stride with its addresses xor 4.
        for i in 0..16u32 {
            let tmem_index = (16 + i) ^ 4;
            assert_eq!(
                state.rdp.tmem[tmem_index as usize],
                (16 + i) as u8,
                "row 1 byte {i}"
            );
        }
    }

    #[test]
    fn rgba32_splits_across_the_halves() {
        let mut state = textured_state();
        state.set_texture_image(0, 3, 4, TEXTURE_ADDR);
        state.set_tile(0, 0, 3, 1, 0, 0, 0, 0, 0, 0, 0, 0);
        // One row of four 32-bit texels: 16 source bytes.
        state.load_tile(0, 0, 0, 3 << 2, 0);

        // Each 8-byte word: RG pairs to the lower half, BA to the upper.
        assert_eq!(state.rdp.tmem[0], 0);
        assert_eq!(state.rdp.tmem[1], 1);
        assert_eq!(state.rdp.tmem[2], 4);
        assert_eq!(state.rdp.tmem[3], 5);
        assert_eq!(state.rdp.tmem[2048], 2);
        assert_eq!(state.rdp.tmem[2049], 3);
        assert_eq!(state.rdp.tmem[2050], 6);
        assert_eq!(state.rdp.tmem[2051], 7);
    }

    #[test]
    fn reversed_bounds_are_ignored() {
        let mut state = textured_state();
        state.set_texture_image(0, 2, 8, TEXTURE_ADDR);
        state.set_tile(0, 0, 2, 2, 0, 0, 0, 0, 0, 0, 0, 0);
        state.load_tile(0, 8 << 2, 0, 4 << 2, 0);
        assert!(state.workload.draw_data.load_operations.is_empty());
        assert!(state.rdp.tmem.iter().all(|&b| b == 0));
    }
}

// ============================================================================
// Block loads
// ============================================================================

mod block_load_tests {
    use super::*;

    #[test]
    fn zero_dxt_loads_contiguously() {
        let mut state = textured_state();
        state.set_texture_image(0, 2, 64, TEXTURE_ADDR);
        state.set_tile(0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0);
        // Eight words, no row stepping.
        state.load_block(0, 0, 0, 31, 0);

        for i in 0..64 {
            assert_eq!(state.rdp.tmem[i], i as u8, "byte {i}");
        }
    }

    #[test]
    fn dxt_advances_the_row_and_toggles_the_swizzle() {
        let mut state = textured_state();
        state.set_texture_image(0, 2, 64, TEXTURE_ADDR);
        // Line stride of one word per row.
        state.set_tile(0, 0, 2, 1, 0, 0, 0, 0, 0, 0, 0, 0);
        // DXT of 2048 crosses the accumulator on every word.
        state.load_block(0, 0, 0, 15, 2048);

        // Word 0 lands straight at its slot.
        for i in 0..8usize {
            assert_eq!(state.rdp.tmem[i], i as u8, "word 0 byte {i}");
        }
        // Word 1 stepped one line (8 bytes) plus the word advance, with the
        // odd-row swizzle applied.
        for i in 0..8u32 {
            let tmem_index = (16 + i) ^ 4;
            assert_eq!(
                state.rdp.tmem[tmem_index as usize],
                (8 + i) as u8,
                "word 1 byte {i}"
            );
        }
    }
}

// ============================================================================
// Palette loads
// ============================================================================

mod tlut_load_tests {
    use super::*;

    #[test]
    fn palette_entries_replicate_four_times() {
        let mut ram = RdramBuilder::new();
        ram.write_u16(TEXTURE_ADDR, 0xAABB);
        ram.write_u16(TEXTURE_ADDR + 2, 0xCCDD);
        let mut state = ram.into_state(EmulatorConfig::default());

        state.set_texture_image(0, 2, 64, TEXTURE_ADDR);
        // Palettes land in the upper half of TMEM.
        state.set_tile(0, 0, 0, 0, 256, 0, 0, 0, 0, 0, 0, 0);
        state.load_tlut(0, 0, 0, 1 << 2, 0);

        let base = 256 * 8;
        for k in 0..4 {
            assert_eq!(state.rdp.tmem[base + k * 2], 0xAA, "entry 0 copy {k}");
            assert_eq!(state.rdp.tmem[base + k * 2 + 1], 0xBB, "entry 0 copy {k}");
        }
        for k in 0..4 {
            assert_eq!(state.rdp.tmem[base + 8 + k * 2], 0xCC, "entry 1 copy {k}");
            assert_eq!(state.rdp.tmem[base + 8 + k * 2 + 1], 0xDD, "entry 1 copy {k}");
        }
    }
}

// ============================================================================
// Developer warnings
// ============================================================================

mod warning_tests {
    use super::*;
    use rcp_hle_core::workload::WarningIndex;

    #[test]
    fn size_mismatch_warns_in_developer_mode() {
        let config = EmulatorConfig {
            developer_mode: true,
            ..EmulatorConfig::default()
        };
        let mut state = RdramBuilder::new().into_state(config);
        state.set_texture_image(0, 2, 8, TEXTURE_ADDR);
        // Tile descriptor disagrees with the texture image's pixel size.
        state.set_tile(0, 0, 1, 2, 0, 0, 0, 0, 0, 0, 0, 0);
        state.load_tile(0, 0, 0, 7 << 2, 0);

        assert_eq!(state.workload.command_warnings.len(), 1);
        assert_eq!(state.workload.command_warnings[0].index, WarningIndex::Load(0));
    }

    #[test]
    fn no_warnings_outside_developer_mode() {
        let mut state = textured_state();
        state.set_texture_image(0, 2, 8, TEXTURE_ADDR);
        state.set_tile(0, 0, 1, 2, 0, 0, 0, 0, 0, 0, 0, 0);
        state.load_tile(0, 0, 0, 7 << 2, 0);
        assert!(state.workload.command_warnings.is_empty());
    }
}

// ============================================================================
// Round trip
// ============================================================================

mod round_trip_tests {
    use super::*;

    #[test]
    fn replaying_the_recorded_loads_reproduces_tmem() {
        let mut state = textured_state();
        state.set_texture_image(0, 2, 64, TEXTURE_ADDR);
        state.set_tile(0, 0, 2, 8, 0, 0, 0, 0, 0, 0, 0, 0);
        state.load_tile(0, 0, 0, 31 << 2, 7 << 2);
        state.set_tile(1, 0, 2, 0, 128, 0, 0, 0, 0, 0, 0, 0);
        state.load_block(1, 0, 0, 63, 0);
        state.set_tile(2, 0, 0, 0, 320, 0, 0, 0, 0, 0, 0, 0);
        state.load_tlut(2, 0, 0, 15 << 2, 0);

        assert_eq!(state.workload.draw_data.load_operations.len(), 3);

        let mut replayed = Box::new([0u8; TMEM_SIZE]);
        for op in &state.workload.draw_data.load_operations {
            replay_load(&mut replayed, &state.rdram, op);
        }
        assert_eq!(&replayed[..], &state.rdp.tmem[..], "replayed TMEM differs");
    }
}
