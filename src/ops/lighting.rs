use image::RgbaImage;
use rayon::prelude::*;

/// Time-of-day look applied to displayed / exported output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LightingPreset {
    #[default]
    Daylight,
    Evening,
}

impl LightingPreset {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "daylight" | "day" | "none" => Some(LightingPreset::Daylight),
            "evening" | "dusk" => Some(LightingPreset::Evening),
            _ => None,
        }
    }

    /// Return a copy of `image` with the preset applied.  Daylight is the
    /// identity.
    pub fn apply(self, image: &RgbaImage) -> RgbaImage {
        match self {
            LightingPreset::Daylight => image.clone(),
            LightingPreset::Evening => apply_chain(image, &evening_chain()),
        }
    }
}

type Matrix = [[f32; 3]; 3];

fn brightness(amount: f32) -> Matrix {
    [[amount, 0.0, 0.0], [0.0, amount, 0.0], [0.0, 0.0, amount]]
}

fn saturate(s: f32) -> Matrix {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

fn sepia(amount: f32) -> Matrix {
    let k = 1.0 - amount.clamp(0.0, 1.0);
    [
        [0.393 + 0.607 * k, 0.769 - 0.769 * k, 0.189 - 0.189 * k],
        [0.349 - 0.349 * k, 0.686 + 0.314 * k, 0.168 - 0.168 * k],
        [0.272 - 0.272 * k, 0.534 - 0.534 * k, 0.131 + 0.869 * k],
    ]
}

fn hue_rotate(degrees: f32) -> Matrix {
    let (sin, cos) = degrees.to_radians().sin_cos();
    [
        [
            0.213 + cos * 0.787 - sin * 0.213,
            0.715 - cos * 0.715 - sin * 0.715,
            0.072 - cos * 0.072 + sin * 0.928,
        ],
        [
            0.213 - cos * 0.213 + sin * 0.143,
            0.715 + cos * 0.285 + sin * 0.140,
            0.072 - cos * 0.072 - sin * 0.283,
        ],
        [
            0.213 - cos * 0.213 - sin * 0.787,
            0.715 - cos * 0.715 + sin * 0.715,
            0.072 + cos * 0.928 + sin * 0.072,
        ],
    ]
}

/// brightness(0.6) saturate(0.85) sepia(0.25) hue-rotate(-5deg)
fn evening_chain() -> Vec<Matrix> {
    vec![brightness(0.6), saturate(0.85), sepia(0.25), hue_rotate(-5.0)]
}

/// Apply each matrix in order, clamping to [0, 1] between steps.  Alpha is
/// left untouched.
fn apply_chain(image: &RgbaImage, chain: &[Matrix]) -> RgbaImage {
    let mut out = image.clone();
    let stride = image.width() as usize * 4;
    if stride == 0 {
        return out;
    }
    let raw: &mut [u8] = out.as_mut();
    raw.par_chunks_mut(stride).for_each(|row| {
        for px in row.chunks_exact_mut(4) {
            let mut c = [px[0] as f32 / 255.0, px[1] as f32 / 255.0, px[2] as f32 / 255.0];
            for m in chain {
                let r = m[0][0] * c[0] + m[0][1] * c[1] + m[0][2] * c[2];
                let g = m[1][0] * c[0] + m[1][1] * c[1] + m[1][2] * c[2];
                let b = m[2][0] * c[0] + m[2][1] * c[1] + m[2][2] * c[2];
                c = [r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0)];
            }
            px[0] = (c[0] * 255.0).round() as u8;
            px[1] = (c[1] * 255.0).round() as u8;
            px[2] = (c[2] * 255.0).round() as u8;
        }
    });
    out
}
