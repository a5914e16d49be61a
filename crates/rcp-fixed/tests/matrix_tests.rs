//! FixedMatrix decode: lane swap, 16.16 reconstruction and lane patching.

use rcp_fixed::FixedMatrix;

/// Build the 64-byte record with element (i, j) = value, remembering that
/// element (i, j) lives in lane (i, j ^ 1).
fn encode(elements: &[(usize, usize, f32)]) -> [u8; 64] {
    let mut bytes = [0u8; 64];
    for &(i, j, value) in elements {
        let fixed = (value * 65536.0) as i64 as u32;
        let lane = i * 4 + (j ^ 1);
        let int_bytes = ((fixed >> 16) as u16).to_le_bytes();
        let frac_bytes = (fixed as u16).to_le_bytes();
        bytes[lane * 2..lane * 2 + 2].copy_from_slice(&int_bytes);
        bytes[32 + lane * 2..32 + lane * 2 + 2].copy_from_slice(&frac_bytes);
    }
    bytes
}

// ============================================================================
// Decode
// ============================================================================

mod decode_tests {
    use super::*;

    #[test]
    fn identity_round_trips() {
        let bytes = encode(&[(0, 0, 1.0), (1, 1, 1.0), (2, 2, 1.0), (3, 3, 1.0)]);
        let m = FixedMatrix::from_bytes(&bytes);
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_eq!(m.to_float(i, j), expected, "element ({i}, {j})");
            }
        }
    }

    #[test]
    fn fractional_values_decode() {
        let bytes = encode(&[(1, 2, -2.5), (3, 0, 0.25)]);
        let m = FixedMatrix::from_bytes(&bytes);
        assert_eq!(m.to_float(1, 2), -2.5);
        assert_eq!(m.to_float(3, 0), 0.25);
    }

    #[test]
    fn lane_swap_is_applied() {
        // Raw lane (0, 0) holds element (0, 1).
        let mut bytes = [0u8; 64];
        bytes[0..2].copy_from_slice(&3i16.to_le_bytes());
        let m = FixedMatrix::from_bytes(&bytes);
        assert_eq!(m.to_float(0, 1), 3.0);
        assert_eq!(m.to_float(0, 0), 0.0);
    }

    #[test]
    fn fixed_to_float_combines_halves() {
        assert_eq!(FixedMatrix::fixed_to_float(1, 0x8000), 1.5);
        assert_eq!(FixedMatrix::fixed_to_float(-2, 0x8000), -1.5);
        assert_eq!(FixedMatrix::fixed_to_float(0, 0), 0.0);
    }
}

// ============================================================================
// Lane patches
// ============================================================================

mod modify_tests {
    use super::*;

    #[test]
    fn modify_integer_keeps_fraction() {
        let patched = FixedMatrix::modify_integer(1.5, 7);
        assert_eq!(patched, 7.5);
    }

    #[test]
    fn modify_fraction_keeps_integer() {
        let patched = FixedMatrix::modify_fraction(7.0, 0x4000);
        assert_eq!(patched, 7.25);
    }

    #[test]
    fn patches_compose_into_a_full_value() {
        let with_int = FixedMatrix::modify_integer(0.0, 2);
        let with_frac = FixedMatrix::modify_fraction(with_int, 0x8000);
        assert_eq!(with_frac, 2.5);
    }
}
