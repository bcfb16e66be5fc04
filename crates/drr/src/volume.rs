//! Attenuation volumes sampled by the ray-march renderer.
//!
//! A [`VoxelVolume`] is a regular grid of linear attenuation coefficients
//! (per scene unit of path length) with trilinear interpolation between grid
//! points and air everywhere outside. Volumes are centered on the isocenter
//! when built, matching how the imaging scene positions its anatomy.

use glam::DVec3;

/// A dense grid of attenuation samples in scene space.
///
/// Grid points are node-centered: index `(i, j, k)` sits at
/// `origin + (i, j, k) * spacing`, and the sampled domain spans
/// `(dims - 1) * spacing` per axis. Every axis needs at least two grid
/// points.
#[derive(Clone, Debug)]
pub struct VoxelVolume {
    dims: [usize; 3],
    spacing: DVec3,
    origin: DVec3,
    voxels: Vec<f32>,
}

impl VoxelVolume {
    /// Builds a volume by evaluating `f` at every grid point position.
    ///
    /// The volume is centered so the midpoint of its domain lands on the
    /// scene origin.
    pub fn from_fn(
        dims: [usize; 3],
        spacing: DVec3,
        mut f: impl FnMut(DVec3) -> f32,
    ) -> Self {
        debug_assert!(dims.iter().all(|&d| d >= 2));

        let extent = DVec3::new(
            (dims[0] - 1) as f64 * spacing.x,
            (dims[1] - 1) as f64 * spacing.y,
            (dims[2] - 1) as f64 * spacing.z,
        );
        let origin = -0.5 * extent;

        let mut voxels = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
        for k in 0..dims[2] {
            for j in 0..dims[1] {
                for i in 0..dims[0] {
                    let position = origin
                        + DVec3::new(
                            i as f64 * spacing.x,
                            j as f64 * spacing.y,
                            k as f64 * spacing.z,
                        );
                    voxels.push(f(position));
                }
            }
        }

        Self {
            dims,
            spacing,
            origin,
            voxels,
        }
    }

    /// The synthetic anatomy used when no host volume is supplied.
    ///
    /// A soft-tissue torso ellipsoid with a segmented spinal column and one
    /// dense spherical lesion, all attenuation in units of 1/mm:
    /// - soft tissue 0.008 (roughly water at diagnostic energies)
    /// - vertebral bone 0.3 with softer 0.05 disc gaps every 24 mm
    /// - lesion 0.5
    pub fn phantom() -> Self {
        Self::from_fn([65, 65, 97], DVec3::new(2.0, 2.0, 2.0), |p| {
            let in_torso =
                (p.x / 55.0).powi(2) + (p.y / 45.0).powi(2) + (p.z / 90.0).powi(2) <= 1.0;
            if !in_torso {
                return 0.0;
            }

            let mut mu = 0.008f32;

            let in_spine = (p.x / 12.0).powi(2) + ((p.y - 15.0) / 12.0).powi(2) <= 1.0
                && p.z.abs() <= 90.0;
            if in_spine {
                let phase = (p.z + 96.0).rem_euclid(24.0);
                mu = if phase < 19.0 { 0.3 } else { 0.05 };
            }

            if (p - DVec3::new(20.0, -10.0, 30.0)).length() <= 8.0 {
                mu = 0.5;
            }

            mu
        })
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn spacing(&self) -> DVec3 {
        self.spacing
    }

    /// Lower corner of the sampled domain
    pub fn min_corner(&self) -> DVec3 {
        self.origin
    }

    /// Upper corner of the sampled domain
    pub fn max_corner(&self) -> DVec3 {
        self.origin
            + DVec3::new(
                (self.dims[0] - 1) as f64 * self.spacing.x,
                (self.dims[1] - 1) as f64 * self.spacing.y,
                (self.dims[2] - 1) as f64 * self.spacing.z,
            )
    }

    fn at(&self, i: usize, j: usize, k: usize) -> f64 {
        self.voxels[(k * self.dims[1] + j) * self.dims[0] + i] as f64
    }

    /// Trilinearly interpolated attenuation at a scene-space point; air
    /// (zero) outside the sampled domain.
    pub fn sample(&self, point: DVec3) -> f64 {
        let rel = (point - self.origin) / self.spacing;

        let max = DVec3::new(
            (self.dims[0] - 1) as f64,
            (self.dims[1] - 1) as f64,
            (self.dims[2] - 1) as f64,
        );
        if rel.x < 0.0 || rel.y < 0.0 || rel.z < 0.0 {
            return 0.0;
        }
        if rel.x > max.x || rel.y > max.y || rel.z > max.z {
            return 0.0;
        }

        // Lower cell corner, clamped so the upper boundary still has a cell
        let i = (rel.x.floor() as usize).min(self.dims[0] - 2);
        let j = (rel.y.floor() as usize).min(self.dims[1] - 2);
        let k = (rel.z.floor() as usize).min(self.dims[2] - 2);
        let fx = rel.x - i as f64;
        let fy = rel.y - j as f64;
        let fz = rel.z - k as f64;

        let lerp = |a: f64, b: f64, t: f64| a + (b - a) * t;

        let c00 = lerp(self.at(i, j, k), self.at(i + 1, j, k), fx);
        let c10 = lerp(self.at(i, j + 1, k), self.at(i + 1, j + 1, k), fx);
        let c01 = lerp(self.at(i, j, k + 1), self.at(i + 1, j, k + 1), fx);
        let c11 = lerp(self.at(i, j + 1, k + 1), self.at(i + 1, j + 1, k + 1), fx);

        lerp(lerp(c00, c10, fy), lerp(c01, c11, fy), fz)
    }
}
