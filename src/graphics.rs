//! A 64x32 monochrome framebuffer and the interface renderers draw it through
use fixedbitset::FixedBitSet;
use std::fmt;
use std::ops::Index;

pub const WIDTH: usize = 64;
pub const HEIGHT: usize = 32;

/// Display memory. Pixels are stored row-major, one bit per pixel. Only the
/// clear and draw instructions mutate it.
#[derive(Clone, PartialEq, Eq)]
pub struct Framebuffer {
    buffer: FixedBitSet,
}

impl Framebuffer {
    pub fn new() -> Self {
        Framebuffer {
            buffer: FixedBitSet::with_capacity(WIDTH * HEIGHT),
        }
    }

    pub fn len(&self) -> usize {
        WIDTH * HEIGHT
    }

    /// Given x and y coordinate for a pixel, return the corresponding
    /// index of that pixel in the buffer. Coordinates wrap around the edges.
    pub fn get_graphics_idx(x: usize, y: usize) -> usize {
        (y % HEIGHT) * WIDTH + (x % WIDTH)
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// XOR `enabled` into the pixel at (x, y), wrapping both coordinates.
    /// Returns true if a lit pixel got switched off.
    pub fn xor_set(&mut self, x: usize, y: usize, enabled: bool) -> bool {
        if !enabled {
            return false;
        }
        let idx = Self::get_graphics_idx(x, y);
        let collided = self.buffer[idx];
        self.buffer.set(idx, !collided);
        collided
    }

    /// XOR an 8 pixel wide sprite row by row with its top left corner at (x, y).
    /// Returns true if any pixel was erased.
    pub fn draw_sprite(&mut self, x: usize, y: usize, rows: &[u8]) -> bool {
        let mut collision = false;
        for (j, row) in rows.iter().enumerate() {
            for i in 0..8 {
                let bit = (row >> (7 - i)) & 1 == 1;
                collision |= self.xor_set(x + i, y + j, bit);
            }
        }
        collision
    }

    pub fn pixel(&self, x: usize, y: usize) -> bool {
        self.buffer[Self::get_graphics_idx(x, y)]
    }

    /// Each row of the display, top to bottom
    pub fn rows(&self) -> impl Iterator<Item = Vec<bool>> + '_ {
        (0..HEIGHT).map(move |y| (0..WIDTH).map(|x| self.pixel(x, y)).collect())
    }

    pub fn lit(&self) -> usize {
        self.buffer.count_ones(..)
    }
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<usize> for Framebuffer {
    type Output = bool;

    #[inline]
    fn index(&self, idx: usize) -> &Self::Output {
        &self.buffer[idx]
    }
}

impl fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Framebuffer").field("lit", &self.lit()).finish()
    }
}

/// Anything that can put a framebuffer in front of a user. `scale` is the
/// edge length in device pixels (or cells) each logical pixel is drawn as.
/// Colours and pixel formats are the renderer's business.
pub trait Renderer {
    type Error;

    fn render(&mut self, frame: &Framebuffer, scale: usize) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_blank() {
        let fb = Framebuffer::new();
        assert_eq!(fb.len(), 2048);
        for i in 0..fb.len() {
            assert!(!fb[i]);
        }
    }

    #[test]
    fn xor_set_toggles_and_reports_collision() {
        let mut fb = Framebuffer::new();
        assert!(!fb.xor_set(3, 4, true));
        assert!(fb.pixel(3, 4));
        assert!(fb.xor_set(3, 4, true));
        assert!(!fb.pixel(3, 4));
        // unset bits never touch the display
        assert!(!fb.xor_set(3, 4, false));
        assert!(!fb.pixel(3, 4));
    }

    #[test]
    fn coordinates_wrap() {
        assert_eq!(Framebuffer::get_graphics_idx(WIDTH, 0), 0);
        assert_eq!(Framebuffer::get_graphics_idx(0, HEIGHT), 0);
        assert_eq!(Framebuffer::get_graphics_idx(WIDTH + 1, HEIGHT + 2), 2 * WIDTH + 1);
    }

    #[test]
    fn sprite_wraps_right_to_left() {
        let mut fb = Framebuffer::new();
        fb.draw_sprite(WIDTH - 4, 0, &[0xFF]);

        for x in 0..4 {
            assert!(fb.pixel(x, 0));
            assert!(fb.pixel(WIDTH - 4 + x, 0));
        }
        assert_eq!(fb.lit(), 8);
    }

    #[test]
    fn clear() {
        let mut fb = Framebuffer::new();
        fb.draw_sprite(0, 0, &[0xFF, 0xFF]);
        assert_eq!(fb.lit(), 16);
        fb.clear();
        assert_eq!(fb.lit(), 0);
    }

    #[test]
    fn rows() {
        let mut fb = Framebuffer::new();
        fb.xor_set(5, 1, true);
        let rows: Vec<Vec<bool>> = fb.rows().collect();
        assert_eq!(rows.len(), HEIGHT);
        assert_eq!(rows[1].len(), WIDTH);
        assert!(rows[1][5]);
        assert!(!rows[0][5]);
    }
}
