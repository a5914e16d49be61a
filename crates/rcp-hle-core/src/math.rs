//! Float matrix helpers for the RSP's row-vector convention.
//!
//! The RSP multiplies row vectors on the left: `pos' = pos * M`. A matrix in
//! that convention is represented here as a `glam::Mat4` holding its
//! transpose, so `mat * vec` applies it and [`mul_rm`] composes in
//! display-list order. [`mat_get`]/[`mat_set`] address elements by the
//! abstract row-major `(i, j)`.

use glam::{Mat4, Vec3, Vec4};
use rcp_fixed::FixedMatrix;

/// Element `(row, col)` of the abstract row-major matrix.
pub fn mat_get(m: &Mat4, i: usize, j: usize) -> f32 {
    m.col(i)[j]
}

pub fn mat_set(m: &mut Mat4, i: usize, j: usize, value: f32) {
    m.col_mut(i)[j] = value;
}

/// Row-major product `a * b`: apply `a` first, then `b`.
pub fn mul_rm(a: &Mat4, b: &Mat4) -> Mat4 {
    *b * *a
}

/// `pos * m` for a row vector.
pub fn transform(pos: Vec4, m: &Mat4) -> Vec4 {
    *m * pos
}

/// Build the row-vector-convention matrix from four rows.
pub fn mat_from_rows(r0: Vec4, r1: Vec4, r2: Vec4, r3: Vec4) -> Mat4 {
    Mat4::from_cols(r0, r1, r2, r3)
}

/// Convert the RSP's split fixed-point matrix to floats.
pub fn fixed_matrix_to_mat4(fm: &FixedMatrix) -> Mat4 {
    let row = |i: usize| {
        Vec4::new(
            fm.to_float(i, 0),
            fm.to_float(i, 1),
            fm.to_float(i, 2),
            fm.to_float(i, 3),
        )
    };
    mat_from_rows(row(0), row(1), row(2), row(3))
}

pub fn matrix_is_nan(m: &Mat4) -> bool {
    m.is_nan()
}

pub fn is_matrix_affine(m: &Mat4) -> bool {
    (mat_get(m, 0, 3) == 0.0)
        && (mat_get(m, 1, 3) == 0.0)
        && (mat_get(m, 2, 3) == 0.0)
        && (mat_get(m, 3, 3) == 1.0)
}

pub fn is_matrix_identity(m: &Mat4) -> bool {
    *m == Mat4::IDENTITY
}

/// Whether the last element looks like neither an orthographic (1) nor a
/// bare perspective (0) matrix, i.e. a combined view * projection.
pub fn is_matrix_view_proj(m: &Mat4) -> bool {
    let w = mat_get(m, 3, 3);
    (w.abs() >= 1e-6) && ((1.0 - w).abs() >= 1e-6)
}

fn sqr(x: f32) -> f32 {
    x * x
}

/// Split a combined view * projection matrix into its two factors so they
/// can be interpolated independently. Falls back to identity view when the
/// split degenerates.
pub fn decompose_view_proj(vp: &Mat4) -> (Mat4, Mat4) {
    let mut v = Mat4::IDENTITY;
    let mut p = Mat4::IDENTITY;

    mat_set(&mut p, 2, 3, -1.0);
    mat_set(&mut p, 3, 3, 0.0);
    mat_set(&mut v, 0, 2, -mat_get(vp, 0, 3));
    mat_set(&mut v, 1, 2, -mat_get(vp, 1, 3));
    mat_set(&mut v, 2, 2, -mat_get(vp, 2, 3));
    mat_set(&mut v, 3, 2, -mat_get(vp, 3, 3));

    let p22 = mat_get(vp, 0, 2) / mat_get(&v, 0, 2);
    mat_set(&mut p, 2, 2, p22);
    mat_set(&mut p, 3, 2, mat_get(vp, 3, 2) - p22 * mat_get(&v, 3, 2));

    let p00 = (sqr(mat_get(vp, 0, 0)) + sqr(mat_get(vp, 1, 0)) + sqr(mat_get(vp, 2, 0))).sqrt();
    let p11 = (sqr(mat_get(vp, 0, 1)) + sqr(mat_get(vp, 1, 1)) + sqr(mat_get(vp, 2, 1))).sqrt();
    mat_set(&mut p, 0, 0, p00);
    mat_set(&mut p, 1, 1, p11);

    for i in 0..4 {
        mat_set(&mut v, i, 0, mat_get(vp, i, 0) / p00);
        mat_set(&mut v, i, 1, mat_get(vp, i, 1) / p11);
    }

    if matrix_is_nan(&v) || matrix_is_nan(&p) {
        (Mat4::IDENTITY, *vp)
    } else {
        (v, p)
    }
}

/// Map a transformed position to the screen the way the RSP does: divide by
/// `(w, -w, w)`, then scale and translate by the viewport.
pub fn screen_position(transformed: Vec4, scale: Vec3, translate: Vec3) -> Vec3 {
    let w = transformed.w;
    let ndc = Vec3::new(
        transformed.x / w,
        transformed.y / -w,
        transformed.z / w,
    );
    ndc * scale + translate
}
