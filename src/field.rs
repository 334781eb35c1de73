//! Grid dimensions and the 2D field storage the stages operate on.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::AllocError;

/// Size of the host surface, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Simulation grid dimensions. Both sides are at least one texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSize {
    pub width: u32,
    pub height: u32,
}

impl GridSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// `floor(viewport * resolution)` per side. A degenerate viewport yields
    /// `None`; a non-degenerate one never rounds below one texel.
    pub fn from_viewport(viewport: Viewport, resolution: f32) -> Option<Self> {
        if viewport.is_degenerate() {
            return None;
        }
        let scale = f64::from(resolution);
        let width = (f64::from(viewport.width) * scale).floor() as u32;
        let height = (f64::from(viewport.height) * scale).floor() as u32;
        Some(Self::new(width, height))
    }

    pub fn cells(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Cells per domain unit; one domain unit spans the longer side.
    pub fn cell_scale(&self) -> f32 {
        self.width.max(self.height) as f32
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width as f32 - 1.0, self.height as f32 - 1.0) * 0.5
    }
}

/// A dense row-major 2D grid of texels, row 0 at the bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct Field<T> {
    size: GridSize,
    data: Vec<T>,
}

impl<T: Copy + Default> Field<T> {
    /// Allocates a zero-filled field, reporting allocation failure instead of
    /// aborting.
    pub fn zeroed(size: GridSize) -> Result<Self, AllocError> {
        let cells = size.cells();
        if cells.checked_mul(std::mem::size_of::<T>()).is_none() {
            return Err(AllocError::Overflow(cells));
        }
        let mut data = Vec::new();
        data.try_reserve_exact(cells)?;
        data.resize(cells, T::default());
        Ok(Self { size, data })
    }

    pub fn from_fn(size: GridSize, mut f: impl FnMut(u32, u32) -> T) -> Result<Self, AllocError> {
        let mut field = Self::zeroed(size)?;
        for y in 0..size.height {
            for x in 0..size.width {
                let idx = field.index(x, y);
                field.data[idx] = f(x, y);
            }
        }
        Ok(field)
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

impl<T> Field<T> {
    #[inline]
    pub fn size(&self) -> GridSize {
        self.size
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.size.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.size.height
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.size.width as usize + x as usize
    }

    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Releases the backing storage, leaving an empty field.
    pub fn release(&mut self) {
        self.data = Vec::new();
    }
}

impl<T: Copy> Field<T> {
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> T {
        self.data[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: T) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }
}

/// Texel types the stages know how to evaluate.
pub trait Texel: Copy + Default + Send + Sync + PartialEq + std::fmt::Debug + 'static {
    fn is_finite(&self) -> bool;
}

impl Texel for f32 {
    #[inline]
    fn is_finite(&self) -> bool {
        f32::is_finite(*self)
    }
}

impl Texel for Vec2 {
    #[inline]
    fn is_finite(&self) -> bool {
        Vec2::is_finite(*self)
    }
}

impl<T: Texel> Field<T> {
    /// Location of the first non-finite texel, if any.
    pub fn first_non_finite(&self) -> Option<(u32, u32)> {
        let w = self.size.width as usize;
        self.data
            .iter()
            .position(|t| !t.is_finite())
            .map(|i| ((i % w) as u32, (i / w) as u32))
    }

    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|t| *t == T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_size_floors_viewport_times_resolution() {
        let size = GridSize::from_viewport(Viewport::new(320, 180), 0.4).unwrap();
        assert_eq!(size, GridSize::new(128, 72));

        let full = GridSize::from_viewport(Viewport::new(320, 180), 1.0).unwrap();
        assert_eq!(full, GridSize::new(320, 180));
    }

    #[test]
    fn grid_size_never_drops_below_one_texel() {
        let size = GridSize::from_viewport(Viewport::new(3, 1), 0.1).unwrap();
        assert_eq!(size, GridSize::new(1, 1));
        assert!(GridSize::from_viewport(Viewport::new(0, 0), 0.5).is_none());
        assert!(GridSize::from_viewport(Viewport::new(640, 0), 0.5).is_none());
    }

    #[test]
    fn zeroed_field_is_zero() {
        let field: Field<Vec2> = Field::zeroed(GridSize::new(4, 3)).unwrap();
        assert_eq!(field.data().len(), 12);
        assert!(field.is_zero());
    }

    #[test]
    fn reports_first_non_finite_texel() {
        let mut field: Field<f32> = Field::zeroed(GridSize::new(4, 3)).unwrap();
        assert_eq!(field.first_non_finite(), None);
        field.set(2, 1, f32::NAN);
        assert_eq!(field.first_non_finite(), Some((2, 1)));
    }
}
