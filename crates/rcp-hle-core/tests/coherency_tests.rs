//! Framebuffer coherency: TMEM region algebra, live-framebuffer texture
//! reads and CPU-write detection.

mod common;

use common::{make_interpreter, DlWriter, RdramBuilder};
use rcp_hle_core::fb::{FramebufferManager, FramebufferOperation};
use rcp_hle_core::rdram::Rdram;
use rcp_hle_core::state::EmulatorConfig;
use rcp_hle_core::workload::FlushReason;

const DL_START: u32 = 0x1000;

// ============================================================================
// TMEM region algebra
// ============================================================================

mod region_tests {
    use super::*;

    fn assert_invariants(manager: &FramebufferManager) {
        let regions: Vec<_> = manager.regions_tmem().collect();
        for (i, region) in regions.iter().enumerate() {
            assert!(
                region.tmem_start < region.tmem_end,
                "region {i} is empty: [{}, {})",
                region.tmem_start,
                region.tmem_end
            );
            for (j, other) in regions.iter().enumerate().skip(i + 1) {
                let overlap = (region.tmem_start < other.tmem_end) && (region.tmem_end > other.tmem_start);
                assert!(!overlap, "regions {i} and {j} overlap");
            }
        }
    }

    #[test]
    fn insert_creates_one_region() {
        let mut manager = FramebufferManager::new();
        manager.insert_regions_tmem(0x10000, 0, 64, 511, false, false);
        assert_eq!(manager.regions_tmem().count(), 1);
        assert_invariants(&manager);
    }

    #[test]
    fn rgba32_inserts_mirror_in_the_upper_half() {
        let mut manager = FramebufferManager::new();
        let inserted = manager.insert_regions_tmem(0x10000, 0, 32, 255, true, false);
        assert_eq!(inserted, 2);
        let starts: Vec<u32> = manager.regions_tmem().map(|r| r.tmem_start).collect();
        assert!(starts.contains(&0));
        assert!(starts.contains(&256));
        assert_invariants(&manager);
    }

    #[test]
    fn insert_near_the_wrap_point_covers_all_words() {
        let mut manager = FramebufferManager::new();
        // 32 words starting 16 below the wrap point.
        manager.insert_regions_tmem(0x10000, 496, 32, 511, false, false);
        assert_invariants(&manager);
        let total: u32 = manager.regions_tmem().map(|r| r.tmem_end - r.tmem_start).sum();
        assert_eq!(total, 32);
    }

    #[test]
    fn discard_middle_splits_the_region() {
        let mut manager = FramebufferManager::new();
        manager.insert_regions_tmem(0x10000, 0, 64, 511, false, false);
        manager.discard_regions_tmem(16, 16, 511);
        assert_invariants(&manager);

        let mut spans: Vec<(u32, u32)> = manager.regions_tmem().map(|r| (r.tmem_start, r.tmem_end)).collect();
        spans.sort_unstable();
        assert_eq!(spans, vec![(0, 16), (32, 64)]);
    }

    #[test]
    fn discard_edges_shrink_the_region() {
        let mut manager = FramebufferManager::new();
        manager.insert_regions_tmem(0x10000, 8, 24, 511, false, false);
        manager.discard_regions_tmem(0, 16, 511);
        assert_invariants(&manager);
        let spans: Vec<(u32, u32)> = manager.regions_tmem().map(|r| (r.tmem_start, r.tmem_end)).collect();
        assert_eq!(spans, vec![(16, 32)]);

        manager.discard_regions_tmem(24, 64, 511);
        assert_invariants(&manager);
        let spans: Vec<(u32, u32)> = manager.regions_tmem().map(|r| (r.tmem_start, r.tmem_end)).collect();
        assert_eq!(spans, vec![(16, 24)]);
    }

    #[test]
    fn discard_covering_everything_empties_the_list() {
        let mut manager = FramebufferManager::new();
        manager.insert_regions_tmem(0x10000, 0, 64, 511, false, false);
        manager.insert_regions_tmem(0x20000, 128, 32, 511, false, false);
        manager.discard_regions_tmem(0, 512, 511);
        assert_eq!(manager.regions_tmem().count(), 0);
    }

    #[test]
    fn random_walk_preserves_the_invariant() {
        let mut manager = FramebufferManager::new();
        // Deterministic pseudo-random sequence.
        let mut seed = 0x2545_F491u32;
        let mut next = || {
            seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
            seed >> 16
        };
        for step in 0..200 {
            let start = next() % 512;
            let words = (next() % 128) + 1;
            if step % 3 == 0 {
                manager.discard_regions_tmem(start, words, 511);
            } else {
                manager.discard_regions_tmem(start, words, 511);
                manager.insert_regions_tmem(0x10000 + step, start, words, 511, false, false);
            }
            assert_invariants(&manager);
        }
    }
}

// ============================================================================
// Live framebuffer feedback (render to texture)
// ============================================================================

mod feedback_tests {
    use super::*;

    const FB_ADDRESS: u32 = 0x20000;

    fn render_then_sample(sample_siz: u32) -> rcp_hle_core::Workload {
        let mut ram = RdramBuilder::new();
        {
            let mut dl = DlWriter::new(&mut ram, DL_START);
            // Render a full-screen fill into the framebuffer.
            dl.set_color_image(0, 2, 320, FB_ADDRESS);
            dl.set_scissor(0, 0, 320 << 2, 240 << 2);
            dl.set_other_mode(gbi_registers::modes::G_CYC_FILL, 0);
            dl.set_fill_color(0xF800_F800);
            dl.fill_rect(0, 0, 319 << 2, 239 << 2);

            // Sample it back as a texture.
            dl.set_other_mode(0, 0);
            dl.set_texture_image(0, 2, 320, FB_ADDRESS);
            dl.set_tile(0, 0, 2, 16, 0);
            dl.load_tile(0, 0, 0, 63 << 2, 15 << 2);
            dl.set_tile(0, 0, sample_siz, 16, 0);
            dl.tex_rect(0, 0, 63 << 2, 15 << 2, 0, 0, 0, 1 << 10, 1 << 10);
            dl.full_sync();
            dl.ex2_end_dl();
        }

        let mut state = ram.into_state(EmulatorConfig::default());
        let interpreter = make_interpreter();
        interpreter
            .process_display_lists(&mut state, DL_START)
            .expect("walk should succeed");
        state.take_workload()
    }

    #[test]
    fn sampling_the_render_target_flushes_and_copies() {
        let workload = render_then_sample(2);

        // The render pair was flushed because the load sampled its pixels.
        let first = &workload.fb_pairs[0];
        assert_eq!(first.flush_reason, FlushReason::SamplingFromColorImage);

        // The sampling pair starts by creating the tile copy.
        let second = &workload.fb_pairs[1];
        let copy_id = second
            .start_fb_operations
            .iter()
            .find_map(|op| match op {
                FramebufferOperation::CreateTileCopy { id, address, .. } => {
                    assert_eq!(*address, FB_ADDRESS);
                    Some(*id)
                }
                _ => None,
            })
            .expect("a tile copy operation");

        // The draw resolves its tile through that copy, no reinterpretation.
        let call = &second.projections.last().expect("projection").game_calls[0];
        let call_tile = &workload.draw_data.call_tiles[call.desc.tile_index as usize];
        assert_eq!(call_tile.tile_copy_id, copy_id);
        assert!(!call_tile.reinterpret);
    }

    #[test]
    fn size_mismatch_reinterprets_the_copy() {
        let workload = render_then_sample(1);

        let second = &workload.fb_pairs[1];
        let (src_id, dst_id) = second
            .start_fb_operations
            .iter()
            .find_map(|op| match op {
                FramebufferOperation::ReinterpretTile {
                    src_id,
                    src_siz,
                    dst_id,
                    dst_siz,
                    ..
                } => {
                    assert_eq!(*src_siz, 2);
                    assert_eq!(*dst_siz, 1);
                    Some((*src_id, *dst_id))
                }
                _ => None,
            })
            .expect("a reinterpretation operation");
        assert_ne!(src_id, dst_id);

        let call = &second.projections.last().expect("projection").game_calls[0];
        let call_tile = &workload.draw_data.call_tiles[call.desc.tile_index as usize];
        assert_eq!(call_tile.tile_copy_id, dst_id);
        assert!(call_tile.reinterpret);
    }

    #[test]
    fn reinterpreted_copy_doubles_the_width_axis() {
        let mut ram = RdramBuilder::new();
        {
            let mut dl = DlWriter::new(&mut ram, DL_START);
            dl.set_color_image(0, 2, 320, FB_ADDRESS);
            dl.set_scissor(0, 0, 320 << 2, 240 << 2);
            dl.set_other_mode(gbi_registers::modes::G_CYC_FILL, 0);
            dl.fill_rect(0, 0, 319 << 2, 239 << 2);
            dl.set_other_mode(0, 0);
            dl.set_texture_image(0, 2, 320, FB_ADDRESS);
            dl.set_tile(0, 0, 2, 16, 0);
            dl.load_tile(0, 0, 0, 63 << 2, 15 << 2);
            dl.set_tile(0, 0, 1, 16, 0);
            dl.tex_rect(0, 0, 63 << 2, 15 << 2, 0, 0, 0, 1 << 10, 1 << 10);
            dl.full_sync();
            dl.ex2_end_dl();
        }

        let mut state = ram.into_state(EmulatorConfig::default());
        let interpreter = make_interpreter();
        interpreter
            .process_display_lists(&mut state, DL_START)
            .expect("walk should succeed");

        let workload = state.workload;
        let second = &workload.fb_pairs[1];
        let mut src_dst = None;
        for op in &second.start_fb_operations {
            if let FramebufferOperation::ReinterpretTile { src_id, dst_id, .. } = op {
                src_dst = Some((*src_id, *dst_id));
            }
        }
        let (src_id, dst_id) = src_dst.expect("a reinterpretation operation");

        let src = state.fb_manager.tile_copy(src_id).expect("source copy");
        let dst = state.fb_manager.tile_copy(dst_id).expect("destination copy");
        assert_eq!(dst.used_width, src.used_width * 2);
        assert_eq!(dst.used_height, src.used_height);
    }
}

// ============================================================================
// CPU write detection
// ============================================================================

mod ram_tests {
    use super::*;

    #[test]
    fn hash_mismatch_reports_the_framebuffer() {
        let mut manager = FramebufferManager::new();
        let mut rdram = Rdram::new(0x40000);
        manager.get(0x10000, 2, 64, 16);
        manager.hash_tracking(&rdram);
        assert!(manager.check_ram(&rdram).is_empty());

        rdram.write_u32(0x10010, 0xDEAD_BEEF);
        let different = manager.check_ram(&rdram);
        assert_eq!(different, vec![0x10000]);

        // Hashes were refreshed, so the same contents no longer differ.
        assert!(manager.check_ram(&rdram).is_empty());
    }

    #[test]
    fn small_changes_upload_and_large_changes_discard() {
        let mut manager = FramebufferManager::new();
        let mut rdram = Rdram::new(0x40000);
        manager.get(0x10000, 2, 64, 16);
        manager.hash_tracking(&rdram);

        // A handful of bytes: upload path.
        rdram.write_u32(0x10000, 0x1234_5678);
        let different = manager.check_ram(&rdram);
        let mut ops = Vec::new();
        let mut discards = Vec::new();
        manager.upload_ram(&rdram, &different, true, &mut ops, &mut discards);
        assert_eq!(ops.len(), 1);
        assert!(matches!(ops[0], FramebufferOperation::WriteChanges { address: 0x10000, .. }));
        assert!(discards.is_empty());

        // Rewrite most of the buffer: discard path.
        for offset in (0..0x800).step_by(4) {
            rdram.write_u32(0x10000 + offset, 0xFFFF_FFFF);
        }
        let different = manager.check_ram(&rdram);
        ops.clear();
        manager.upload_ram(&rdram, &different, true, &mut ops, &mut discards);
        assert_eq!(discards, vec![0x10000]);

        manager.perform_discards(&discards);
        assert!(manager.find(0x10000).is_none());
    }

    #[test]
    fn writes_mark_other_overlapping_framebuffers_stale() {
        let mut manager = FramebufferManager::new();
        manager.get(0x10000, 2, 64, 16);
        manager.get(0x10400, 2, 64, 16);
        manager.change_ram(0x10000, 0x10000, 0x10800);
        assert!(manager.find(0x10400).expect("tracked").rdram_changed);
        assert!(!manager.find(0x10000).expect("tracked").rdram_changed);
    }

    #[test]
    fn most_recent_containing_prefers_newer_timestamps() {
        let mut manager = FramebufferManager::new();
        manager.get(0x10000, 2, 64, 16);
        manager.get(0x10400, 2, 64, 16);
        let t0 = manager.next_write_timestamp();
        manager.find_mut(0x10000).expect("tracked").last_write_timestamp = t0;
        let t1 = manager.next_write_timestamp();
        manager.find_mut(0x10400).expect("tracked").last_write_timestamp = t1;

        let found = manager
            .find_most_recent_containing(0x10400, 0x10500)
            .expect("an overlap");
        assert_eq!(found.address_start, 0x10400);
    }
}
