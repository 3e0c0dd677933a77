//! Fiducial glyph rendering.
//!
//! [`GlyphRenderer`] is the boundary to whatever dictionary prints the
//! markers. [`BitGridRenderer`] is a self-contained implementation: a black
//! border around a 7x7 payload grid, one deterministic code per id. No code
//! is a rotation of another or of itself, so a rotated photograph can never
//! turn one id into another.

use image::{GrayImage, Luma};

use crate::config::MarkerConfig;

const PAYLOAD_SIDE: usize = 7;
const BORDER_CELLS: usize = 1;
const CODE_SEED: u64 = 0x7A3C_91E5_4D2B_0F68;

/// Errors raised by a glyph renderer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GlyphError {
    #[error("marker id {marker_id} is not in the dictionary (size {dictionary_size})")]
    UnknownMarker {
        marker_id: usize,
        dictionary_size: usize,
    },
    #[error("glyph size {size_px}px is too small for a {cells}x{cells} grid")]
    TooSmall { size_px: u32, cells: usize },
}

/// Renders the square bitmap for a marker id.
///
/// Implementations must be deterministic: the same id and size always
/// produce the same pixels.
pub trait GlyphRenderer {
    /// Render `marker_id` as a `size_px` x `size_px` grayscale glyph.
    fn render(&self, marker_id: usize, size_px: u32) -> Result<GrayImage, GlyphError>;
}

/// Bordered bit-grid dictionary with `dictionary_size` distinct codes.
#[derive(Debug, Clone)]
pub struct BitGridRenderer {
    codes: Vec<u64>,
}

impl BitGridRenderer {
    /// Dictionary with one code per id in `0..dictionary_size`.
    pub fn new(dictionary_size: usize) -> Self {
        Self {
            codes: generate_codes(dictionary_size),
        }
    }

    /// Dictionary sized for `config`.
    pub fn for_config(config: &MarkerConfig) -> Self {
        Self::new(config.dictionary_size())
    }

    pub fn dictionary_size(&self) -> usize {
        self.codes.len()
    }

    /// Number of grid cells per side, border included.
    pub fn grid_cells(&self) -> usize {
        PAYLOAD_SIDE + 2 * BORDER_CELLS
    }

    /// Payload bits for `marker_id`, if it is in the dictionary.
    pub fn code(&self, marker_id: usize) -> Option<u64> {
        self.codes.get(marker_id).copied()
    }
}

impl GlyphRenderer for BitGridRenderer {
    fn render(&self, marker_id: usize, size_px: u32) -> Result<GrayImage, GlyphError> {
        let code = self.code(marker_id).ok_or(GlyphError::UnknownMarker {
            marker_id,
            dictionary_size: self.codes.len(),
        })?;
        let cells = self.grid_cells();
        if (size_px as usize) < cells {
            return Err(GlyphError::TooSmall { size_px, cells });
        }
        Ok(draw_bits(code, size_px))
    }
}

fn draw_bits(code: u64, size_px: u32) -> GrayImage {
    let grid = PAYLOAD_SIDE + 2 * BORDER_CELLS;
    let size = size_px as usize;
    GrayImage::from_fn(size_px, size_px, |x, y| {
        // Nearest-cell scaling keeps glyph edges sharp at any pixel size.
        let gx = x as usize * grid / size;
        let gy = y as usize * grid / size;
        let is_border = gx < BORDER_CELLS
            || gy < BORDER_CELLS
            || gx >= grid - BORDER_CELLS
            || gy >= grid - BORDER_CELLS;
        let is_black = is_border || {
            let bit = (gy - BORDER_CELLS) * PAYLOAD_SIDE + (gx - BORDER_CELLS);
            (code >> bit) & 1 == 1
        };
        Luma([if is_black { 0 } else { 255 }])
    })
}

fn rotate_code_90(code: u64) -> u64 {
    let side = PAYLOAD_SIDE;
    let mut out = 0u64;
    for y in 0..side {
        for x in 0..side {
            if (code >> (y * side + x)) & 1 != 0 {
                let nx = side - 1 - y;
                let ny = x;
                out |= 1u64 << (ny * side + nx);
            }
        }
    }
    out
}

/// The code and its three quarter-turn rotations.
fn rotations(code: u64) -> [u64; 4] {
    let r1 = rotate_code_90(code);
    let r2 = rotate_code_90(r1);
    let r3 = rotate_code_90(r2);
    [code, r1, r2, r3]
}

fn generate_codes(count: usize) -> Vec<u64> {
    let bits = PAYLOAD_SIDE * PAYLOAD_SIDE;
    let mask = (1u64 << bits) - 1;
    let mut out: Vec<u64> = Vec::with_capacity(count);
    // Smallest rotation of every accepted code.
    let mut seen = std::collections::HashSet::with_capacity(count);
    let mut state = CODE_SEED;
    while out.len() < count {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let code = (state >> 15) & mask;
        let ones = code.count_ones() as usize;
        if ones < bits / 4 || ones > bits * 3 / 4 {
            continue;
        }
        let rots = rotations(code);
        // Rotationally symmetric codes have no readable orientation.
        if rots[1..].contains(&code) {
            continue;
        }
        let canonical = rots.iter().copied().min().unwrap_or(code);
        if seen.insert(canonical) {
            out.push(code);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_and_balanced() {
        let renderer = BitGridRenderer::new(1000);
        assert_eq!(renderer.dictionary_size(), 1000);
        let unique: std::collections::HashSet<u64> =
            (0..1000).filter_map(|id| renderer.code(id)).collect();
        assert_eq!(unique.len(), 1000);
    }

    #[test]
    fn no_code_is_a_rotation_of_another() {
        let renderer = BitGridRenderer::new(1000);
        let mut canonical = std::collections::HashSet::new();
        for id in 0..1000 {
            let code = renderer.code(id).unwrap();
            let rots = rotations(code);
            assert!(!rots[1..].contains(&code), "id {id} is rotationally symmetric");
            assert!(canonical.insert(*rots.iter().min().unwrap()), "id {id} repeats a rotation");
        }
    }

    #[test]
    fn quarter_turn_moves_corner_bit_clockwise() {
        // Bit (x=0, y=0) lands at (x=6, y=0) after one clockwise quarter turn.
        assert_eq!(rotate_code_90(1), 1 << 6);
        assert_eq!(rotations(1)[2], 1 << 48);
        assert_eq!(rotate_code_90(rotations(0b1011)[3]), 0b1011);
    }

    #[test]
    fn glyph_has_requested_size_and_black_border() {
        let renderer = BitGridRenderer::new(10);
        let glyph = renderer.render(7, 90).expect("render");
        assert_eq!(glyph.dimensions(), (90, 90));
        // 9 cells of 10 px: the first and last cell rows/cols are border.
        for i in 0..90 {
            assert_eq!(glyph.get_pixel(i, 0)[0], 0);
            assert_eq!(glyph.get_pixel(i, 89)[0], 0);
            assert_eq!(glyph.get_pixel(0, i)[0], 0);
            assert_eq!(glyph.get_pixel(89, i)[0], 0);
        }
    }

    #[test]
    fn rendering_is_deterministic_and_id_specific() {
        let a = BitGridRenderer::new(50);
        let b = BitGridRenderer::new(50);
        assert_eq!(a.render(3, 45).unwrap(), b.render(3, 45).unwrap());
        assert_ne!(a.render(3, 45).unwrap(), a.render(4, 45).unwrap());
    }

    #[test]
    fn rejects_unknown_ids_and_tiny_sizes() {
        let renderer = BitGridRenderer::new(1000);
        assert_eq!(
            renderer.render(1000, 90),
            Err(GlyphError::UnknownMarker {
                marker_id: 1000,
                dictionary_size: 1000,
            })
        );
        assert!(matches!(
            renderer.render(0, 8),
            Err(GlyphError::TooSmall { .. })
        ));
    }
}
