//! RSP state machine: vertex pipeline capture, lazy light/fog flushes,
//! vertex modification and the matrix patch paths.

mod common;

use common::{apply_f3dex2, RdramBuilder};
use gbi_registers::modes::{G_FOG, G_LIGHTING};
use rcp_hle_core::math;
use rcp_hle_core::state::EmulatorConfig;

const MATRIX_ADDR: u32 = 0x8000;
const VIEWPORT_ADDR: u32 = 0x8100;
const VERTEX_ADDR: u32 = 0x8200;
const LIGHT_ADDR: u32 = 0x8300;

fn assert_close(actual: f32, expected: f32, what: &str) {
    assert!(
        (actual - expected).abs() < 1e-3,
        "{what}: expected {expected}, got {actual}"
    );
}

/// State with identity projection/model matrices and a known viewport.
fn pipeline_state() -> rcp_hle_core::State {
    let mut ram = RdramBuilder::new();
    ram.write_identity_matrix(MATRIX_ADDR);
    ram.write_viewport(VIEWPORT_ADDR, [2.0, 2.0, 0.25], [10.0, 20.0, 0.0]);
    ram.write_vertex(VERTEX_ADDR, 100, -50, 2, 64, 32, [0x10, 0x20, 0x30, 0xFF]);
    ram.write_vertex(VERTEX_ADDR + 16, 0, 0, 2, 0, 0, [1, 2, 3, 4]);
    ram.write_vertex(VERTEX_ADDR + 32, 10, 10, 2, 0, 0, [5, 6, 7, 8]);

    let mut state = ram.into_state(EmulatorConfig::default());
    apply_f3dex2(&mut state);
    // Projection load, then modelview load (F3DEX2 parameter values).
    state.rsp_matrix(MATRIX_ADDR, 0x04 | 0x02);
    state.rsp_matrix(MATRIX_ADDR, 0x02);
    state.set_viewport(VIEWPORT_ADDR);
    state
}

// ============================================================================
// Vertex pipeline
// ============================================================================

mod vertex_tests {
    use super::*;

    #[test]
    fn vertex_capture_transforms_and_maps_to_screen() {
        let mut state = pipeline_state();
        state.set_texture(0, 0, 1, 0x8000, 0x8000);
        state.set_vertex(VERTEX_ADDR, 1, 0);

        let draw_data = &state.workload.draw_data;
        assert_eq!(draw_data.vertex_count(), 1);
        assert_eq!(&draw_data.pos_shorts[..], &[100, -50, 2]);
        assert_eq!(&draw_data.norm_col_bytes[..], &[0x10, 0x20, 0x30, 0xFF]);

        // Identity MVP: transformed equals object space.
        let transformed = draw_data.pos_transformed[0];
        assert_close(transformed.x, 100.0, "transformed x");
        assert_close(transformed.w, 1.0, "transformed w");

        // Screen: (x, -y, z) * scale + translate.
        let screen = draw_data.pos_screen[0];
        assert_close(screen.x, 100.0 * 2.0 + 10.0, "screen x");
        assert_close(screen.y, 50.0 * 2.0 + 20.0, "screen y");
        assert_close(screen.z, 2.0 * 0.25, "screen z");

        // Texcoords scale by sc/tc in s10.5.
        assert_close(draw_data.tc_floats[0], 1.0, "s");
        assert_close(draw_data.tc_floats[1], 0.5, "t");

        // One view-proj and one world transform were registered.
        assert_eq!(draw_data.view_transforms.len(), 1);
        assert_eq!(draw_data.world_transforms.len(), 1);
        assert_eq!(draw_data.view_proj_indices[0], 0);
        assert_eq!(draw_data.world_indices[0], 0);
    }

    #[test]
    fn unchanged_state_registers_no_new_transforms() {
        let mut state = pipeline_state();
        state.set_vertex(VERTEX_ADDR, 1, 0);
        state.set_vertex(VERTEX_ADDR + 16, 1, 1);
        let draw_data = &state.workload.draw_data;
        assert_eq!(draw_data.vertex_count(), 2);
        assert_eq!(draw_data.world_transforms.len(), 1);
        assert_eq!(draw_data.view_transforms.len(), 1);
    }

    #[test]
    fn invalid_vertex_range_is_rejected() {
        let mut state = pipeline_state();
        state.set_vertex(VERTEX_ADDR, 40, 40);
        assert_eq!(state.workload.draw_data.vertex_count(), 0);
    }

    #[test]
    fn modifying_a_used_vertex_clones_its_entry() {
        let mut state = pipeline_state();
        state.set_vertex(VERTEX_ADDR, 3, 0);
        state.draw_indexed_tri(0, 1, 2);
        assert_eq!(state.workload.draw_data.vertex_count(), 3);

        let original_index = state.rsp.indices[0] as usize;
        let original_s = state.workload.draw_data.tc_floats[original_index * 2];

        state.modify_vertex(0, gbi_registers::G_MWO_POINT_ST, 0x0040_0040);

        let draw_data = &state.workload.draw_data;
        assert_eq!(draw_data.vertex_count(), 4, "a clone was appended");
        let new_index = state.rsp.indices[0] as usize;
        assert_ne!(new_index, original_index);
        // The triangle's vertex still reads the old texcoord.
        assert_close(draw_data.tc_floats[original_index * 2], original_s, "original s");
        assert_close(draw_data.tc_floats[new_index * 2], 2.0, "patched s");
    }

    #[test]
    fn pd_vertices_fetch_colors_from_the_table() {
        let mut ram = RdramBuilder::new();
        ram.write_identity_matrix(MATRIX_ADDR);
        ram.write_viewport(VIEWPORT_ADDR, [1.0, 1.0, 1.0], [0.0, 0.0, 0.0]);
        // 12-byte vertex with color index 4.
        ram.write_u16(VERTEX_ADDR, 25);
        ram.write_u16(VERTEX_ADDR + 2, 50_u16);
        ram.write_u16(VERTEX_ADDR + 4, 75);
        ram.write_u16(VERTEX_ADDR + 6, 4);
        ram.write_u16(VERTEX_ADDR + 8, 0);
        ram.write_u16(VERTEX_ADDR + 10, 0);
        // Color table entry 4.
        let color_table = 0x8400;
        ram.write_u8(color_table + 4, 0x11);
        ram.write_u8(color_table + 5, 0x22);
        ram.write_u8(color_table + 6, 0x33);
        ram.write_u8(color_table + 7, 0x44);

        let mut state = ram.into_state(EmulatorConfig::default());
        apply_f3dex2(&mut state);
        state.rsp_matrix(MATRIX_ADDR, 0x04 | 0x02);
        state.rsp_matrix(MATRIX_ADDR, 0x02);
        state.set_viewport(VIEWPORT_ADDR);

        state.set_vertex_color_pd(color_table);
        state.set_vertex_pd(VERTEX_ADDR, 1, 0);

        let draw_data = &state.workload.draw_data;
        assert_eq!(draw_data.vertex_count(), 1);
        assert_eq!(&draw_data.pos_shorts[..], &[25, 50, 75]);
        assert_eq!(&draw_data.norm_col_bytes[..], &[0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn modifying_an_unused_vertex_patches_in_place() {
        let mut state = pipeline_state();
        state.set_vertex(VERTEX_ADDR, 1, 0);
        state.modify_vertex(0, gbi_registers::G_MWO_POINT_RGBA, 0xAABB_CCDD);
        let draw_data = &state.workload.draw_data;
        assert_eq!(draw_data.vertex_count(), 1);
        assert_eq!(&draw_data.norm_col_bytes[..4], &[0xAA, 0xBB, 0xCC, 0xDD]);
    }
}

// ============================================================================
// Lazy light and fog capture
// ============================================================================

mod deferred_state_tests {
    use super::*;

    #[test]
    fn fog_is_flushed_by_the_first_vertex_that_uses_it() {
        let mut state = pipeline_state();
        state.set_fog(0x0100, 0x0020);

        state.set_vertex(VERTEX_ADDR, 1, 0);
        assert!(state.workload.draw_data.rsp_fog.is_empty());
        assert_eq!(state.workload.draw_data.fog_indices[0], 0);

        state.set_geometry_mode(G_FOG);
        state.set_vertex(VERTEX_ADDR + 16, 1, 1);
        let draw_data = &state.workload.draw_data;
        assert_eq!(draw_data.rsp_fog.len(), 1);
        // Stored plus one so zero reads as disabled.
        assert_eq!(draw_data.fog_indices[1], 1);
        assert_close(draw_data.rsp_fog[0].mul, 256.0, "fog mul");
    }

    #[test]
    fn lights_decode_when_lighting_is_on() {
        let mut ram = RdramBuilder::new();
        ram.write_identity_matrix(MATRIX_ADDR);
        ram.write_viewport(VIEWPORT_ADDR, [1.0, 1.0, 1.0], [0.0, 0.0, 0.0]);
        ram.write_vertex(VERTEX_ADDR, 0, 0, 0, 0, 0, [0; 4]);
        // Directional light: color (255, 128, 64), direction (127, 0, 0).
        ram.write_u8(LIGHT_ADDR, 255);
        ram.write_u8(LIGHT_ADDR + 1, 128);
        ram.write_u8(LIGHT_ADDR + 2, 64);
        ram.write_u8(LIGHT_ADDR + 4, 255);
        ram.write_u8(LIGHT_ADDR + 5, 128);
        ram.write_u8(LIGHT_ADDR + 6, 64);
        ram.write_u8(LIGHT_ADDR + 8, 127);

        let mut state = ram.into_state(EmulatorConfig::default());
        apply_f3dex2(&mut state);
        state.rsp_matrix(MATRIX_ADDR, 0x04 | 0x02);
        state.rsp_matrix(MATRIX_ADDR, 0x02);
        state.set_viewport(VIEWPORT_ADDR);

        state.set_light(0, LIGHT_ADDR);
        state.set_light_count(1);
        state.set_geometry_mode(G_LIGHTING);
        state.set_vertex(VERTEX_ADDR, 1, 0);

        let draw_data = &state.workload.draw_data;
        // One diffuse plus the ambient slot.
        assert_eq!(draw_data.rsp_lights.len(), 2);
        assert_eq!(draw_data.light_counts[0], 2);
        let light = &draw_data.rsp_lights[0];
        assert_close(light.col[0], 1.0, "light r");
        assert_close(light.col[1], 128.0 / 255.0, "light g");
        assert_close(light.pos_dir[0], 127.0, "light dir x");
        assert_close(light.kc, 0.0, "directional kc");
    }

    #[test]
    fn lights_are_ignored_without_the_geometry_bit() {
        let mut state = pipeline_state();
        state.set_light_count(1);
        state.set_vertex(VERTEX_ADDR, 1, 0);
        assert!(state.workload.draw_data.rsp_lights.is_empty());
        assert_eq!(state.workload.draw_data.light_indices[0], 0);
        assert_eq!(state.workload.draw_data.light_counts[0], 0);
    }
}

// ============================================================================
// Conditional branches
// ============================================================================

mod branch_tests {
    use super::*;

    #[test]
    fn branch_z_compares_screen_depth() {
        let mut state = pipeline_state();
        state.set_vertex(VERTEX_ADDR, 1, 0);
        // Screen z is 0.5, scaled to 512 for the compare.

        let taken = state.branch_z_target(0x2000, 0, 1024 << 16);
        assert!(taken.is_some(), "512 < 1024 takes the branch");

        let not_taken = state.branch_z_target(0x2000, 0, 256 << 16);
        assert!(not_taken.is_none(), "512 >= 256 falls through");
    }

    #[test]
    fn branch_w_compares_clip_w() {
        let mut state = pipeline_state();
        state.set_vertex(VERTEX_ADDR, 1, 0);
        // Orthographic identity: w is 1.
        assert!(state.branch_w_target(0x2000, 0, 10).is_some());
        assert!(state.branch_w_target(0x2000, 0, 0).is_none());
    }

    #[test]
    fn force_branch_overrides_the_compare() {
        let mut state = pipeline_state();
        state.set_vertex(VERTEX_ADDR, 1, 0);
        state.set_force_branch(true);
        assert!(state.branch_z_target(0x2000, 0, 0).is_some());
        state.set_force_branch(false);
        assert!(state.branch_z_target(0x2000, 0, 0).is_none());
    }
}

// ============================================================================
// Matrix patches
// ============================================================================

mod matrix_patch_tests {
    use super::*;

    #[test]
    fn unaligned_insert_is_rejected() {
        let mut state = pipeline_state();
        state.set_vertex(VERTEX_ADDR, 1, 0);
        let before = state.rsp.model_view_proj;
        state.insert_matrix(0x2, 0x1234_5678);
        assert_eq!(state.rsp.model_view_proj, before);
        assert!(!state.rsp.model_view_proj_inserted);
    }

    #[test]
    fn insert_patches_two_integer_lanes_of_the_mvp() {
        let mut state = pipeline_state();
        // Materialize the MVP.
        state.set_vertex(VERTEX_ADDR, 1, 0);

        // Offset 0 addresses the MVP's first two integer lanes.
        state.insert_matrix(0x0, (7 << 16) | 3);
        assert!(state.rsp.model_view_proj_inserted);
        assert_close(math::mat_get(&state.rsp.model_view_proj, 0, 0), 7.0, "lane 0");
        assert_close(math::mat_get(&state.rsp.model_view_proj, 0, 1), 3.0, "lane 1");
    }

    #[test]
    fn force_matrix_overwrites_the_mvp() {
        let mut ram = RdramBuilder::new();
        ram.write_identity_matrix(MATRIX_ADDR);
        let mut elements = [[0.0f32; 4]; 4];
        elements[0][0] = 2.0;
        elements[3][3] = 1.0;
        ram.write_matrix(0x9000, &elements);

        let mut state = ram.into_state(EmulatorConfig::default());
        apply_f3dex2(&mut state);
        state.force_matrix(0x9000);
        assert!(state.rsp.model_view_proj_inserted);
        assert!(!state.rsp.model_view_proj_changed);
        assert_close(math::mat_get(&state.rsp.model_view_proj, 0, 0), 2.0, "forced element");
    }
}

// ============================================================================
// Extended state stacks
// ============================================================================

mod stack_tests {
    use super::*;

    #[test]
    fn scissor_push_pop_restores_the_rect() {
        let mut state = pipeline_state();
        state.set_scissor(0, 0, 0, 1280, 960);
        state.push_scissor();
        state.set_scissor(0, 40, 40, 80, 80);
        assert_eq!(state.rdp.scissor_rect_stack.top().lrx, 80);
        state.pop_scissor();
        assert_eq!(state.rdp.scissor_rect_stack.top().lrx, 1280);
    }

    #[test]
    fn other_mode_push_pop_restores_both_halves() {
        let mut state = pipeline_state();
        state.rsp_set_other_mode(0x1234, 0x5678);
        state.push_other_mode();
        state.rsp_set_other_mode(0x1111, 0x2222);
        state.pop_other_mode();
        assert_eq!(state.rsp.other_mode_stack.top().hi, 0x1234);
        assert_eq!(state.rdp.other_mode.hi, 0x1234);
        assert_eq!(state.rdp.other_mode.lo, 0x5678);
    }

    #[test]
    fn pops_never_drop_the_base_entry() {
        let mut state = pipeline_state();
        for _ in 0..20 {
            state.pop_scissor();
            state.pop_other_mode();
            state.pop_geometry_mode();
            state.pop_viewport();
        }
        assert_eq!(state.rdp.scissor_rect_stack.len(), 1);
        assert_eq!(state.rsp.other_mode_stack.len(), 1);
    }

    #[test]
    fn projection_stack_isolates_nested_projections() {
        let mut state = pipeline_state();
        let top_before = *state.rsp.projection_stack.top();
        state.push_projection_matrix();
        state.rsp_matrix(MATRIX_ADDR, 0x04 | 0x02);
        state.pop_projection_matrix();
        let top_after = *state.rsp.projection_stack.top();
        assert_eq!(top_before.view_proj, top_after.view_proj);
        assert!(state.rsp.projection_matrix_changed);
    }
}
