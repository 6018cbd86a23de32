//! Per-sample shading shared by the host raycaster. The GPU kernel mirrors
//! these functions in WGSL, so changes here must be made there too.

use crate::scene::Hit;
use glam::{Vec2, Vec3, Vec4};

/// How a primary hit is turned into a colour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShadingMode {
    /// Face-forwarded geometric normal mapped to RGB.
    #[default]
    Normal,
    /// Grey level from the cosine between the view ray and the normal.
    EyeLight,
}

impl ShadingMode {
    /// Value of the `shading` field in the GPU frame uniform.
    pub fn as_u32(self) -> u32 {
        match self {
            Self::Normal => 0,
            Self::EyeLight => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::EyeLight => "eye-light",
        }
    }
}

/// Colour of one primary sample; misses are transparent black.
pub fn shade(mode: ShadingMode, hit: Option<&Hit>, dir: Vec3) -> Vec4 {
    let Some(hit) = hit else {
        return Vec4::ZERO;
    };
    let n = if hit.normal.dot(dir) > 0.0 {
        -hit.normal
    } else {
        hit.normal
    };
    match mode {
        ShadingMode::Normal => (n * 0.5 + 0.5).extend(1.0),
        ShadingMode::EyeLight => Vec3::splat(n.dot(dir).abs()).extend(1.0),
    }
}

/// sRGB transfer function for one linear channel in [0, 1].
pub fn linear_to_srgb(v: f32) -> f32 {
    if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

/// Pack a linear colour into sRGB-encoded RGBA8, red in the low byte.
/// Alpha stays linear.
pub fn pack_rgba(c: Vec4) -> u32 {
    let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
    let e = |v: f32| q(linear_to_srgb(v.clamp(0.0, 1.0)));
    e(c.x) | (e(c.y) << 8) | (e(c.z) << 16) | (q(c.w) << 24)
}

/// PCG hash, matching `pcg_hash` in the compute kernel.
pub fn pcg_hash(v: u32) -> u32 {
    let state = v.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28).wrapping_add(4))) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Sub-pixel offset of sample `sample` for pixel (x, y). The first sample
/// goes through the pixel centre.
pub fn sample_jitter(x: u32, y: u32, sample: u32) -> Vec2 {
    if sample == 0 {
        return Vec2::splat(0.5);
    }
    let seed = pcg_hash(x ^ pcg_hash(y ^ pcg_hash(sample)));
    let a = pcg_hash(seed);
    let b = pcg_hash(a);
    Vec2::new(unit_float(a), unit_float(b))
}

/// Map the top 24 bits to [0, 1).
fn unit_float(v: u32) -> f32 {
    (v >> 8) as f32 / (1u32 << 24) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(normal: Vec3) -> Hit {
        Hit {
            t: 1.0,
            normal,
            prim: 0,
        }
    }

    #[test]
    fn miss_is_transparent_black() {
        assert_eq!(shade(ShadingMode::Normal, None, Vec3::NEG_Z), Vec4::ZERO);
        assert_eq!(shade(ShadingMode::EyeLight, None, Vec3::NEG_Z), Vec4::ZERO);
    }

    #[test]
    fn normal_is_face_forwarded() {
        let facing = shade(ShadingMode::Normal, Some(&hit(Vec3::Z)), Vec3::NEG_Z);
        let away = shade(ShadingMode::Normal, Some(&hit(Vec3::NEG_Z)), Vec3::NEG_Z);
        assert_eq!(facing, Vec4::new(0.5, 0.5, 1.0, 1.0));
        assert_eq!(facing, away);
    }

    #[test]
    fn eye_light_is_cosine() {
        let head_on = shade(ShadingMode::EyeLight, Some(&hit(Vec3::Z)), Vec3::NEG_Z);
        assert_eq!(head_on, Vec4::ONE);
        let grazing = shade(
            ShadingMode::EyeLight,
            Some(&hit(Vec3::Z)),
            Vec3::new(1.0, 0.0, -1.0).normalize(),
        );
        assert!((grazing.x - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn packing() {
        assert_eq!(pack_rgba(Vec4::new(1.0, 0.0, 0.0, 1.0)), 0xff00_00ff);
        assert_eq!(pack_rgba(Vec4::new(0.5, 0.5, 1.0, 1.0)), 0xffff_bcbc);
        // Alpha is not encoded.
        assert_eq!(pack_rgba(Vec4::new(0.0, 0.0, 0.0, 0.5)) >> 24, 128);
        assert_eq!(pack_rgba(Vec4::splat(2.0)), u32::MAX);
        assert_eq!(pack_rgba(Vec4::splat(-1.0)), 0);
    }

    #[test]
    fn srgb_encoding() {
        assert_eq!(linear_to_srgb(0.0), 0.0);
        assert!((linear_to_srgb(1.0) - 1.0).abs() < 1e-6);
        assert!((linear_to_srgb(0.002) - 0.02584).abs() < 1e-6);
        // Mid grey brightens.
        assert!((linear_to_srgb(0.5) - 0.735_357).abs() < 1e-5);
        let mut prev = 0.0;
        for i in 1..=100 {
            let v = linear_to_srgb(i as f32 / 100.0);
            assert!(v > prev);
            prev = v;
        }
    }

    #[test]
    fn jitter_is_in_pixel_and_deterministic() {
        assert_eq!(sample_jitter(3, 4, 0), Vec2::splat(0.5));
        for s in 1..64 {
            let j = sample_jitter(7, 11, s);
            assert!(j.cmpge(Vec2::ZERO).all() && j.cmplt(Vec2::ONE).all());
            assert_eq!(j, sample_jitter(7, 11, s));
        }
        assert_ne!(sample_jitter(7, 11, 1), sample_jitter(7, 11, 2));
    }
}
