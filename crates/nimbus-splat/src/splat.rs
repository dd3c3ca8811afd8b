//! The in-memory splat record and the dataset that owns them.

use std::path::Path;

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Quat, Vec3};

use crate::error::FormatError;
use crate::ply::PlyFile;

/// Number of spherical-harmonic coefficient triples per splat (degree 3).
pub const SH_COEFFS: usize = 16;

/// One anisotropic 3D Gaussian.
///
/// Layout must match the `Splat` struct in the WGSL shader: every `vec3`
/// field sits on a 16-byte boundary and the SH triples are padded out to
/// `vec4`. The record is uploaded verbatim as a read-only storage buffer,
/// so the padding fields are part of the contract, not an implementation
/// detail. 304 bytes per splat.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct Splat {
    /// World-space mean.
    pub center: [f32; 3],
    /// Sigmoid-activated opacity in [0, 1].
    pub alpha: f32,
    /// Upper triangle of the covariance matrix, rows 0: (xx, xy, xz).
    pub cov_a: [f32; 3],
    pub _pad0: f32,
    /// Upper triangle continued: (yy, yz, zz).
    pub cov_b: [f32; 3],
    pub _pad1: f32,
    /// SH coefficients; `sh[0]` is the DC color, the rest are directional.
    /// Fourth component of each triple is padding.
    pub sh: [[f32; 4]; SH_COEFFS],
}

/// Immutable array of splats.
///
/// Constructed once by [`from_ply`], then shared read-only between the sort
/// worker and the GPU upload path for the rest of the run. No splat is ever
/// mutated, inserted, or removed after construction.
pub struct SplatDataset {
    splats: Vec<Splat>,
}

impl SplatDataset {
    pub fn new(splats: Vec<Splat>) -> Self {
        Self { splats }
    }

    pub fn len(&self) -> usize {
        self.splats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splats.is_empty()
    }

    pub fn splats(&self) -> &[Splat] {
        &self.splats
    }

    /// The raw buffer handed to the GPU as a structured/storage buffer.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.splats)
    }
}

/// Loads a Gaussian-splat PLY file into a [`SplatDataset`].
///
/// Expects the property layout produced by the reference 3DGS training code:
/// position (`x`/`y`/`z`), `opacity`, log-space `scale_0..2`, rotation
/// quaternion `rot_0..3` (w first), DC color `f_dc_0..2`, and 45 higher-order
/// SH values `f_rest_0..44` laid out channel-major.
pub fn from_ply(path: impl AsRef<Path>) -> Result<SplatDataset, FormatError> {
    let ply = PlyFile::open(path.as_ref())?;

    let x = ply.accessor_f32("x")?;
    let y = ply.accessor_f32("y")?;
    let z = ply.accessor_f32("z")?;
    let opacity = ply.accessor_f32("opacity")?;
    let scale_0 = ply.accessor_f32("scale_0")?;
    let scale_1 = ply.accessor_f32("scale_1")?;
    let scale_2 = ply.accessor_f32("scale_2")?;
    let rot_qw = ply.accessor_f32("rot_0")?;
    let rot_qx = ply.accessor_f32("rot_1")?;
    let rot_qy = ply.accessor_f32("rot_2")?;
    let rot_qz = ply.accessor_f32("rot_3")?;

    let f_dc_0 = ply.accessor_f32("f_dc_0")?;
    let f_dc_1 = ply.accessor_f32("f_dc_1")?;
    let f_dc_2 = ply.accessor_f32("f_dc_2")?;
    let mut rest = Vec::with_capacity(45);
    for i in 0..45 {
        rest.push(ply.accessor_f32(&format!("f_rest_{i}"))?);
    }

    let mut splats = Vec::with_capacity(ply.num_vertices());
    for row in 0..ply.num_vertices() {
        let mut splat = Splat::zeroed();

        splat.center = [x.get(row), y.get(row), z.get(row)];

        // Covariance = M·Mᵗ where M = R·S, S = diag(exp(scale)).
        let scale = Mat3::from_diagonal(Vec3::new(
            scale_0.get(row).exp(),
            scale_1.get(row).exp(),
            scale_2.get(row).exp(),
        ));
        let quat = Quat::from_xyzw(
            rot_qx.get(row),
            rot_qy.get(row),
            rot_qz.get(row),
            rot_qw.get(row),
        )
        .normalize();
        let m = Mat3::from_quat(quat) * scale;
        let (r0, r1, r2) = (m.row(0), m.row(1), m.row(2));
        splat.cov_a = [r0.dot(r0), r0.dot(r1), r0.dot(r2)];
        splat.cov_b = [r1.dot(r1), r1.dot(r2), r2.dot(r2)];

        splat.alpha = 1.0 / (1.0 + (-opacity.get(row)).exp());

        splat.sh[0] = [f_dc_0.get(row), f_dc_1.get(row), f_dc_2.get(row), 0.0];
        // f_rest is stored channel-major: all 15 red values, then green, then blue.
        for i in 1..SH_COEFFS {
            splat.sh[i] = [
                rest[i - 1].get(row),
                rest[i + 14].get(row),
                rest[i + 29].get(row),
                0.0,
            ];
        }

        splats.push(splat);
    }

    log::info!(
        "loaded {} splats ({} MiB)",
        splats.len(),
        splats.len() * std::mem::size_of::<Splat>() / (1024 * 1024),
    );

    Ok(SplatDataset::new(splats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn splat_layout_matches_gpu_contract() {
        assert_eq!(std::mem::size_of::<Splat>(), 304);
        assert_eq!(std::mem::offset_of!(Splat, center), 0);
        assert_eq!(std::mem::offset_of!(Splat, alpha), 12);
        assert_eq!(std::mem::offset_of!(Splat, cov_a), 16);
        assert_eq!(std::mem::offset_of!(Splat, cov_b), 32);
        assert_eq!(std::mem::offset_of!(Splat, sh), 48);
    }

    /// Builds a one-splat PLY with the full 3DGS property set.
    fn one_splat_ply(
        center: [f32; 3],
        scale: [f32; 3],
        rot_wxyz: [f32; 4],
        opacity: f32,
    ) -> Vec<u8> {
        let mut header = String::from("ply\nformat binary_little_endian 1.0\nelement vertex 1\n");
        let mut values: Vec<f32> = Vec::new();
        let mut push = |name: &str, v: f32| {
            header.push_str(&format!("property float {name}\n"));
            values.push(v);
        };

        push("x", center[0]);
        push("y", center[1]);
        push("z", center[2]);
        push("opacity", opacity);
        for (i, s) in scale.iter().enumerate() {
            push(&format!("scale_{i}"), *s);
        }
        for (i, q) in rot_wxyz.iter().enumerate() {
            push(&format!("rot_{i}"), *q);
        }
        for (i, c) in [0.5f32, 0.25, 0.125].iter().enumerate() {
            push(&format!("f_dc_{i}"), *c);
        }
        for i in 0..45 {
            push(&format!("f_rest_{i}"), i as f32);
        }

        let mut bytes = header.into_bytes();
        bytes.extend_from_slice(b"end_header\n");
        for v in values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    fn load(bytes: &[u8], name: &str) -> SplatDataset {
        let path =
            std::env::temp_dir().join(format!("nimbus-splat-{}-{name}", std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        from_ply(&path).unwrap()
    }

    #[test]
    fn identity_rotation_gives_diagonal_covariance() {
        // Unit quaternion (w=1), scales ln(1)=0 → covariance is identity.
        let d = load(
            &one_splat_ply([1.0, 2.0, 3.0], [0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0], 0.0),
            "diag",
        );
        let s = &d.splats()[0];
        assert_eq!(s.center, [1.0, 2.0, 3.0]);
        let eps = 1e-6;
        assert!((s.cov_a[0] - 1.0).abs() < eps);
        assert!(s.cov_a[1].abs() < eps && s.cov_a[2].abs() < eps);
        assert!((s.cov_b[0] - 1.0).abs() < eps);
        assert!(s.cov_b[1].abs() < eps);
        assert!((s.cov_b[2] - 1.0).abs() < eps);
        // sigmoid(0) = 0.5
        assert!((s.alpha - 0.5).abs() < eps);
    }

    #[test]
    fn anisotropic_scale_lands_on_the_diagonal() {
        // scale_1 = ln(2) → yy = 4, others 1.
        let d = load(
            &one_splat_ply(
                [0.0; 3],
                [0.0, std::f32::consts::LN_2, 0.0],
                [1.0, 0.0, 0.0, 0.0],
                0.0,
            ),
            "aniso",
        );
        let s = &d.splats()[0];
        let eps = 1e-5;
        assert!((s.cov_a[0] - 1.0).abs() < eps);
        assert!((s.cov_b[0] - 4.0).abs() < eps);
        assert!((s.cov_b[2] - 1.0).abs() < eps);
    }

    #[test]
    fn sh_channels_are_deinterleaved() {
        let d = load(
            &one_splat_ply([0.0; 3], [0.0; 3], [1.0, 0.0, 0.0, 0.0], 0.0),
            "sh",
        );
        let s = &d.splats()[0];
        assert_eq!(s.sh[0][..3], [0.5, 0.25, 0.125]);
        // Coefficient i takes rest values i-1 / i+14 / i+29.
        assert_eq!(s.sh[1][..3], [0.0, 15.0, 30.0]);
        assert_eq!(s.sh[15][..3], [14.0, 29.0, 44.0]);
    }
}
