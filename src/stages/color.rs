//! Maps the committed fields to a displayable image.
//!
//! Strictly an observer: nothing here writes simulation state.

use glam::{Vec2, Vec3};
use image::RgbaImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{FluidError, Result, Stage};
use crate::field::Field;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    /// Hue from flow direction, saturation from speed.
    #[default]
    Direction,
    /// Greyscale speed.
    Speed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferFunction {
    pub mode: ColorMode,
    /// Speed that maps to full intensity is `1 / speed_gain`.
    pub speed_gain: f32,
    /// Colour dye is blended towards.
    pub dye_tint: [f32; 3],
}

impl Default for TransferFunction {
    fn default() -> Self {
        Self {
            mode: ColorMode::Direction,
            speed_gain: 1.0,
            dye_tint: [1.0, 0.45, 0.1],
        }
    }
}

impl TransferFunction {
    /// Colour of one texel, clamped to the displayable range.
    pub fn color(&self, velocity: Vec2, dye: f32) -> [u8; 4] {
        let speed = (velocity.length() * self.speed_gain).clamp(0.0, 1.0);
        let base = match self.mode {
            ColorMode::Direction => {
                let dir = velocity * 0.5 + Vec2::splat(0.5);
                Vec3::ONE.lerp(Vec3::new(dir.x, dir.y, 1.0), speed)
            }
            ColorMode::Speed => Vec3::splat(speed),
        };
        let tint = Vec3::from_array(self.dye_tint);
        let c = base.lerp(tint, dye.clamp(0.0, 1.0)).clamp(Vec3::ZERO, Vec3::ONE);
        let to_u8 = |v: f32| (v * 255.0).round() as u8;
        [to_u8(c.x), to_u8(c.y), to_u8(c.z), 255]
    }
}

/// Renders a grid-sized image. Image row 0 is the top grid row.
pub fn render(
    velocity: &Field<Vec2>,
    dye: Option<&Field<f32>>,
    transfer: &TransferFunction,
) -> Result<RgbaImage> {
    let (w, h) = (velocity.width(), velocity.height());
    let mut pixels = vec![0u8; w as usize * h as usize * 4];
    pixels
        .par_chunks_mut(w as usize * 4)
        .enumerate()
        .for_each(|(row, line)| {
            let y = h - 1 - row as u32;
            for (x, px) in line.chunks_exact_mut(4).enumerate() {
                let x = x as u32;
                let d = dye.map_or(0.0, |f| f.get(x, y));
                px.copy_from_slice(&transfer.color(velocity.get(x, y), d));
            }
        });
    RgbaImage::from_raw(w, h, pixels)
        .ok_or_else(|| FluidError::stage(Stage::Color, "pixel buffer does not match image size"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::GridSize;

    #[test]
    fn still_fluid_is_white() {
        let tf = TransferFunction::default();
        assert_eq!(tf.color(Vec2::ZERO, 0.0), [255, 255, 255, 255]);
    }

    #[test]
    fn output_is_clamped() {
        let tf = TransferFunction::default();
        let c = tf.color(Vec2::new(50.0, -50.0), 7.0);
        assert_eq!(c, [255, 115, 26, 255]);
        let speed = TransferFunction {
            mode: ColorMode::Speed,
            ..TransferFunction::default()
        };
        assert_eq!(speed.color(Vec2::new(10.0, 0.0), 0.0), [255, 255, 255, 255]);
    }

    #[test]
    fn image_is_flipped_vertically() {
        let size = GridSize::new(2, 2);
        let velocity = Field::zeroed(size).unwrap();
        let mut dye = Field::zeroed(size).unwrap();
        dye.set(0, 0, 1.0);
        let img = render(&velocity, Some(&dye), &TransferFunction::default()).unwrap();
        assert_eq!(img.dimensions(), (2, 2));
        // Grid (0, 0) is bottom-left, so it lands on the last image row.
        assert_eq!(img.get_pixel(0, 1).0, [255, 115, 26, 255]);
        assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255, 255]);
    }
}
