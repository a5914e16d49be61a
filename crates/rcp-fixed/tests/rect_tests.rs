//! FixedRect behavior: null/empty semantics, merge/intersection algebra and
//! the floor/ceil edge bias.

use rcp_fixed::FixedRect;

// ============================================================================
// Null and empty semantics
// ============================================================================

mod null_tests {
    use super::*;

    #[test]
    fn default_is_null() {
        let rect = FixedRect::default();
        assert!(rect.is_null());
        assert!(rect.is_empty());
    }

    #[test]
    fn zero_sized_is_empty_but_not_null() {
        let rect = FixedRect::new(4, 4, 4, 8);
        assert!(!rect.is_null());
        assert!(rect.is_empty());
    }

    #[test]
    fn reset_restores_null() {
        let mut rect = FixedRect::new(0, 0, 8, 8);
        rect.reset();
        assert!(rect.is_null());
    }

    #[test]
    fn contains_on_null_is_false() {
        assert!(!FixedRect::null().contains(0, 0));
    }
}

// ============================================================================
// Merge and intersection algebra
// ============================================================================

mod algebra_tests {
    use super::*;

    #[test]
    fn intersection_with_self_is_identity() {
        let rect = FixedRect::new(4, 8, 64, 128);
        assert_eq!(rect.intersection(&rect), rect);
    }

    #[test]
    fn intersection_is_commutative() {
        let a = FixedRect::new(0, 0, 100, 100);
        let b = FixedRect::new(50, 25, 150, 75);
        assert_eq!(a.intersection(&b), b.intersection(&a));
    }

    #[test]
    fn disjoint_intersection_is_null() {
        let a = FixedRect::new(0, 0, 10, 10);
        let b = FixedRect::new(20, 20, 30, 30);
        assert!(a.intersection(&b).is_null());
    }

    #[test]
    fn merge_contains_both_inputs() {
        let mut a = FixedRect::new(0, 0, 10, 10);
        let b = FixedRect::new(40, -8, 60, 4);
        let a_before = a;
        a.merge(&b);
        assert!(a.fully_inside(&a_before));
        assert!(a.fully_inside(&b));
        assert!(a.contains(0, 0));
        assert!(a.contains(60, 4));
    }

    #[test]
    fn merge_into_null_adopts_the_rect() {
        let mut acc = FixedRect::null();
        let rect = FixedRect::new(8, 8, 16, 16);
        acc.merge(&rect);
        assert_eq!(acc, rect);
    }

    #[test]
    fn fully_inside_detects_partial_overlap() {
        let outer = FixedRect::new(0, 0, 100, 100);
        let partial = FixedRect::new(50, 50, 150, 150);
        assert!(!outer.fully_inside(&partial));
    }
}

// ============================================================================
// Subpixel edge helpers
// ============================================================================

mod edge_tests {
    use super::*;

    #[test]
    fn edges_floor_without_ceil_bias() {
        let rect = FixedRect::new(5, 6, 9, 11);
        assert_eq!(rect.left(false), 1);
        assert_eq!(rect.top(false), 1);
        assert_eq!(rect.right(false), 2);
        assert_eq!(rect.bottom(false), 2);
    }

    #[test]
    fn edges_ceil_with_bias() {
        let rect = FixedRect::new(5, 6, 9, 11);
        assert_eq!(rect.left(true), 2);
        assert_eq!(rect.top(true), 2);
        assert_eq!(rect.right(true), 3);
        assert_eq!(rect.bottom(true), 3);
    }

    #[test]
    fn exact_subpixel_boundaries_do_not_move() {
        let rect = FixedRect::new(8, 8, 16, 16);
        assert_eq!(rect.left(true), rect.left(false));
        assert_eq!(rect.right(true), rect.right(false));
    }

    #[test]
    fn hardware_rounded_fill_covers_whole_pixels() {
        // A 320x240 fill arrives as (0, 0, 1276 | 3, 956 | 3).
        let rect = FixedRect::new(0, 0, 1279, 959);
        assert_eq!(rect.right(true), 320);
        assert_eq!(rect.bottom(true), 240);
        assert_eq!(rect.width(false, true), 320);
        assert_eq!(rect.height(false, true), 240);
    }

    #[test]
    fn scaled_expands_outward() {
        let rect = FixedRect::new(4, 4, 12, 12);
        let scaled = rect.scaled(1.5, 1.5);
        assert_eq!(scaled.ulx, 4);
        assert_eq!(scaled.uly, 4);
        assert_eq!(scaled.lrx, 20);
        assert_eq!(scaled.lry, 20);
    }
}
