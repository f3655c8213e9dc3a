use serde::{Deserialize, Serialize};

/// How a panoramic texture is projected onto directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextureMapping {
    EquirectangularReflection,
}

/// Linear-light panoramic image used as background and reflection source.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentMap {
    pub width: u32,
    pub height: u32,
    /// Row-major linear RGB texels, `width * height` entries.
    pub texels: Vec<[f32; 3]>,
    pub mapping: TextureMapping,
}

impl EnvironmentMap {
    pub fn new(width: u32, height: u32, texels: Vec<[f32; 3]>) -> Self {
        Self {
            width,
            height,
            texels,
            mapping: TextureMapping::EquirectangularReflection,
        }
    }

    /// Mean radiance, used by backends that approximate diffuse irradiance.
    pub fn average_radiance(&self) -> [f32; 3] {
        if self.texels.is_empty() {
            return [0.0; 3];
        }
        let sum = self.texels.iter().fold([0.0f64; 3], |acc, t| {
            [
                acc[0] + t[0] as f64,
                acc[1] + t[1] as f64,
                acc[2] + t[2] as f64,
            ]
        });
        let n = self.texels.len() as f64;
        [(sum[0] / n) as f32, (sum[1] / n) as f32, (sum[2] / n) as f32]
    }

    /// Expand to RGBA with an opaque alpha channel.
    pub fn to_rgba(&self) -> Vec<f32> {
        self.texels
            .iter()
            .flat_map(|t| [t[0], t[1], t[2], 1.0])
            .collect()
    }
}

/// 8-bit sRGB RGBA image sampled by a material.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA, `width * height * 4` bytes.
    pub pixels: Vec<u8>,
}

impl TextureImage {
    pub fn new(name: impl Into<String>, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            pixels,
        }
    }

    /// Non-empty with exactly one RGBA texel per pixel.
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.pixels.len() == self.width as usize * self.height as usize * 4
    }
}
