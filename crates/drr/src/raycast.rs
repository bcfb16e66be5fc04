//! Software ray-march renderer.
//!
//! [`RayMarchRenderer`] satisfies [`OffscreenRenderer`] with nothing but CPU
//! math: one perspective ray per pixel, a midpoint-rule march through the
//! attenuation volume, and Beer-Lambert transmission mapped to luminance.
//! Air renders white and dense material renders dark, matching the
//! fluoroscopic convention of the frame type.
//!
//! The tracked instrument is modeled as a thin radio-opaque pin lying along
//! the patient's long axis; its lateral offset comes in through
//! [`OffscreenRenderer::set_instrument_offset`].

use glam::DVec3;
use kinematics::camera::CameraPose;

use crate::frame::{FrameBuffer, FrameSize};
use crate::pipeline::{OffscreenRenderer, RenderError};
use crate::volume::VoxelVolume;

/// Radius of the instrument pin, in scene units
const INSTRUMENT_RADIUS: f64 = 2.0;
/// Half the pin's length along the patient axis
const INSTRUMENT_HALF_LENGTH: f64 = 60.0;
/// Attenuation of the pin material, per scene unit of path length
const INSTRUMENT_ATTENUATION: f64 = 2.0;

/// CPU renderer for digitally reconstructed radiographs.
pub struct RayMarchRenderer {
    volume: VoxelVolume,
    pose: CameraPose,
    instrument_offset: f64,
    target: Option<FrameBuffer>,
    /// Full vertical view angle in degrees
    view_angle: f64,
    /// March step along each ray, in scene units
    step: f64,
}

impl RayMarchRenderer {
    pub fn new(volume: VoxelVolume) -> Self {
        Self {
            volume,
            pose: CameraPose {
                position: DVec3::new(0.0, -400.0, 0.0),
                focal_point: DVec3::ZERO,
                view_up: DVec3::Z,
            },
            instrument_offset: 0.0,
            target: None,
            view_angle: 30.0,
            step: 1.0,
        }
    }

    /// Overrides the vertical view angle (degrees)
    pub fn with_view_angle(mut self, view_angle: f64) -> Self {
        self.view_angle = view_angle;
        self
    }

    /// Overrides the march step (scene units)
    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    /// Optical depth accumulated through the volume along one ray
    fn volume_depth(&self, origin: DVec3, direction: DVec3) -> f64 {
        let (t0, t1) = match slab_intersect(
            origin,
            direction,
            self.volume.min_corner(),
            self.volume.max_corner(),
        ) {
            Some(range) => range,
            None => return 0.0,
        };

        let t0 = t0.max(0.0);
        if t1 <= t0 {
            return 0.0;
        }

        // Midpoint rule: sample the center of each step interval
        let mut sum = 0.0;
        let mut t = t0 + 0.5 * self.step;
        while t < t1 {
            sum += self.volume.sample(origin + direction * t);
            t += self.step;
        }
        sum * self.step
    }

    /// Optical depth through the instrument pin along one ray.
    ///
    /// The pin is a cylinder of radius [`INSTRUMENT_RADIUS`] about the line
    /// `x = offset, y = 0`, clipped to its half-length along Z. The chord is
    /// exact, no marching involved.
    fn instrument_depth(&self, origin: DVec3, direction: DVec3) -> f64 {
        let dx = origin.x - self.instrument_offset;
        let dy = origin.y;

        let a = direction.x * direction.x + direction.y * direction.y;
        if a < 1e-12 {
            // Ray runs along the pin axis; outside the radius it misses
            if dx * dx + dy * dy > INSTRUMENT_RADIUS * INSTRUMENT_RADIUS {
                return 0.0;
            }
            return 2.0 * INSTRUMENT_HALF_LENGTH * INSTRUMENT_ATTENUATION;
        }

        let b = 2.0 * (dx * direction.x + dy * direction.y);
        let c = dx * dx + dy * dy - INSTRUMENT_RADIUS * INSTRUMENT_RADIUS;
        let disc = b * b - 4.0 * a * c;
        if disc <= 0.0 {
            return 0.0;
        }

        let sqrt_disc = disc.sqrt();
        let mut lo = (-b - sqrt_disc) / (2.0 * a);
        let mut hi = (-b + sqrt_disc) / (2.0 * a);

        // Clip to the pin's extent along Z
        if direction.z.abs() < 1e-12 {
            if origin.z.abs() > INSTRUMENT_HALF_LENGTH {
                return 0.0;
            }
        } else {
            let z0 = (-INSTRUMENT_HALF_LENGTH - origin.z) / direction.z;
            let z1 = (INSTRUMENT_HALF_LENGTH - origin.z) / direction.z;
            lo = lo.max(z0.min(z1));
            hi = hi.min(z0.max(z1));
        }

        lo = lo.max(0.0);
        let chord = (hi - lo).max(0.0);
        chord * INSTRUMENT_ATTENUATION
    }
}

impl OffscreenRenderer for RayMarchRenderer {
    fn allocate_target(&mut self, size: FrameSize) -> Result<(), RenderError> {
        if size.width == 0 || size.height == 0 {
            return Err(RenderError::TargetAllocation(format!(
                "target size {} has a zero dimension",
                size
            )));
        }
        self.target = Some(FrameBuffer::new(size));
        Ok(())
    }

    fn set_camera_pose(&mut self, pose: &CameraPose) {
        self.pose = *pose;
    }

    fn set_instrument_offset(&mut self, offset: f64) {
        self.instrument_offset = offset;
    }

    fn render(&mut self) -> Result<(), RenderError> {
        let size = match &self.target {
            Some(frame) => frame.size(),
            None => return Err(RenderError::Render("no render target allocated".into())),
        };

        let forward = self.pose.forward();
        if !forward.is_finite() {
            return Err(RenderError::Render(
                "camera position coincides with its focal point".into(),
            ));
        }
        let right = forward
            .cross(self.pose.view_up)
            .try_normalize()
            .ok_or_else(|| {
                RenderError::Render("view-up vector is parallel to the view direction".into())
            })?;
        let up = right.cross(forward);

        // Image plane through the focal point, sized by the view angle
        let distance = (self.pose.focal_point - self.pose.position).length();
        let half_height = distance * (0.5 * self.view_angle.to_radians()).tan();
        let half_width = half_height * size.width as f64 / size.height as f64;

        let mut frame = FrameBuffer::new(size);
        for py in 0..size.height {
            // +1 at the top row, -1 at the bottom
            let v = 1.0 - 2.0 * (py as f64 + 0.5) / size.height as f64;
            for px in 0..size.width {
                let u = 2.0 * (px as f64 + 0.5) / size.width as f64 - 1.0;

                let image_point =
                    self.pose.focal_point + right * (u * half_width) + up * (v * half_height);
                let direction = (image_point - self.pose.position).normalize();

                let depth = self.volume_depth(self.pose.position, direction)
                    + self.instrument_depth(self.pose.position, direction);
                let transmission = (-depth).exp();
                frame.set_pixel(px, py, (transmission * 255.0).round() as u8);
            }
        }

        self.target = Some(frame);
        Ok(())
    }

    fn capture_frame(&self) -> Result<FrameBuffer, RenderError> {
        self.target
            .clone()
            .ok_or_else(|| RenderError::Capture("no render target allocated".into()))
    }
}

/// Entry and exit distances of a ray through an axis-aligned box, if it hits.
fn slab_intersect(origin: DVec3, direction: DVec3, min: DVec3, max: DVec3) -> Option<(f64, f64)> {
    let inv = direction.recip();
    let t_min = (min - origin) * inv;
    let t_max = (max - origin) * inv;

    let lo = t_min.min(t_max);
    let hi = t_min.max(t_max);

    let t0 = lo.max_element();
    let t1 = hi.min_element();
    (t1 >= t0).then_some((t0, t1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_pose() -> CameraPose {
        CameraPose {
            position: DVec3::new(0.0, -400.0, 0.0),
            focal_point: DVec3::ZERO,
            view_up: DVec3::Z,
        }
    }

    fn air_volume() -> VoxelVolume {
        VoxelVolume::from_fn([3, 3, 3], DVec3::splat(100.0), |_| 0.0)
    }

    fn rendered_frame(renderer: &mut RayMarchRenderer, size: FrameSize) -> FrameBuffer {
        renderer.allocate_target(size).unwrap();
        renderer.render().unwrap();
        renderer.capture_frame().unwrap()
    }

    #[test]
    fn zero_sized_target_is_rejected() {
        let mut renderer = RayMarchRenderer::new(air_volume());

        let result = renderer.allocate_target(FrameSize::new(0, 64));
        assert!(matches!(result, Err(RenderError::TargetAllocation(_))));
    }

    #[test]
    fn render_without_target_fails() {
        let mut renderer = RayMarchRenderer::new(air_volume());

        assert!(matches!(renderer.render(), Err(RenderError::Render(_))));
        assert!(matches!(
            renderer.capture_frame(),
            Err(RenderError::Capture(_))
        ));
    }

    #[test]
    fn degenerate_view_up_is_an_error() {
        let mut renderer = RayMarchRenderer::new(air_volume());
        renderer.allocate_target(FrameSize::new(8, 8)).unwrap();

        // Up along the view direction leaves no image plane basis
        renderer.set_camera_pose(&CameraPose {
            position: DVec3::new(0.0, -400.0, 0.0),
            focal_point: DVec3::ZERO,
            view_up: DVec3::Y,
        });
        assert!(matches!(renderer.render(), Err(RenderError::Render(_))));
    }

    #[test]
    fn reference_view_shows_anatomy() {
        let mut renderer = RayMarchRenderer::new(VoxelVolume::phantom());
        renderer.set_camera_pose(&reference_pose());
        let frame = rendered_frame(&mut renderer, FrameSize::new(33, 33));

        // The center ray passes through the torso and the spinal column;
        // corner rays miss the phantom entirely
        assert!(frame.pixel(16, 16).unwrap() < 50);
        assert!(frame.pixel(0, 0).unwrap() > 200);
        assert!(frame.pixel(32, 32).unwrap() > 200);
    }

    #[test]
    fn render_is_deterministic() {
        let mut renderer = RayMarchRenderer::new(VoxelVolume::phantom());
        renderer.set_camera_pose(&reference_pose());

        let first = rendered_frame(&mut renderer, FrameSize::new(17, 17));
        renderer.render().unwrap();
        let second = renderer.capture_frame().unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn instrument_shadow_tracks_its_offset() {
        let darkest_column = |offset: f64| -> u32 {
            let mut renderer = RayMarchRenderer::new(air_volume());
            renderer.set_camera_pose(&reference_pose());
            renderer.set_instrument_offset(offset);
            let frame = rendered_frame(&mut renderer, FrameSize::new(33, 33));

            (0..33)
                .min_by_key(|&x| (0..33).map(|y| frame.pixel(x, y).unwrap() as u32).sum::<u32>())
                .unwrap()
        };

        // The pin draws a vertical shadow left or right of center depending
        // on the sign of its offset
        assert!(darkest_column(30.0) > 16);
        assert!(darkest_column(-30.0) < 16);
    }

    #[test]
    fn closer_camera_magnifies_the_anatomy() {
        let dark_pixels = |source_y: f64| -> usize {
            let mut renderer = RayMarchRenderer::new(VoxelVolume::phantom());
            renderer.set_camera_pose(&CameraPose {
                position: DVec3::new(0.0, source_y, 0.0),
                focal_point: DVec3::ZERO,
                view_up: DVec3::Z,
            });
            let frame = rendered_frame(&mut renderer, FrameSize::new(33, 33));
            frame.pixels().iter().filter(|&&p| p < 128).count()
        };

        // Zooming in (shorter source distance) makes the anatomy fill more
        // of the frame
        assert!(dark_pixels(-200.0) > dark_pixels(-400.0));
    }
}
