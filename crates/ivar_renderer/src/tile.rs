//! Tile-based work decomposition.
//!
//! Divides the image into tiles that are rendered independently by the
//! engine's workers, ordered from the centre outward.

/// A rectangular region of the image to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// X coordinate of the tile's top-left corner
    pub x: u32,
    /// Y coordinate of the tile's top-left corner
    pub y: u32,
    /// Width of the tile in pixels
    pub width: u32,
    /// Height of the tile in pixels
    pub height: u32,
    /// Index of this tile in the render order
    pub index: usize,
}

impl Tile {
    /// Create a new tile.
    pub fn new(x: u32, y: u32, width: u32, height: u32, index: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
            index,
        }
    }

    /// Get the total number of pixels in this tile.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Default tile size in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 32;

/// Generate tiles for an image, sorted in spiral order from the centre.
///
/// Edge tiles are clipped to the image. A zero-sized image yields no tiles.
pub fn generate_tiles(width: u32, height: u32, tile_size: u32) -> Vec<Tile> {
    let tile_size = tile_size.max(1);
    let mut tiles = Vec::new();

    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            let tw = tile_size.min(width - x);
            let th = tile_size.min(height - y);
            tiles.push(Tile::new(x, y, tw, th, tiles.len()));
            x = x.saturating_add(tile_size);
        }
        y = y.saturating_add(tile_size);
    }

    sort_spiral(&mut tiles, width, height);

    // Update indices after sorting
    for (i, tile) in tiles.iter_mut().enumerate() {
        tile.index = i;
    }

    tiles
}

/// Sort tiles by distance from the image centre.
///
/// The sort is stable, so equidistant tiles keep their row-major order.
fn sort_spiral(tiles: &mut [Tile], width: u32, height: u32) {
    let center_x = width as f64 / 2.0;
    let center_y = height as f64 / 2.0;

    let distance = |t: &Tile| {
        let x = t.x as f64 + t.width as f64 / 2.0;
        let y = t.y as f64 + t.height as f64 / 2.0;
        (x - center_x).powi(2) + (y - center_y).powi(2)
    };

    tiles.sort_by(|a, b| distance(a).total_cmp(&distance(b)));
}
