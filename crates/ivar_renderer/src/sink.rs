//! Image sinks receiving rendered tiles.

use crate::Color;
use parking_lot::{Condvar, Mutex};

/// Destination for the pixels of a render job.
///
/// `set_pixels` is called concurrently from worker threads, once per
/// finished tile. `imaging_done` is called exactly once per submitted job.
pub trait ImageSink: Send + Sync {
    /// Image size in pixels as `(width, height)`.
    fn resolution(&self) -> (u32, u32);

    /// Called once when a job is submitted, before any tile is queued.
    fn imaging_started(&self) {}

    /// Deliver a `width` x `height` block at `(x, y)` as row-major RGB triples.
    fn set_pixels(&self, x: u32, y: u32, width: u32, height: u32, pixels: &[f32]);

    /// Called once when every tile of the job has finished or been cancelled.
    fn imaging_done(&self) {}
}

/// Apply gamma correction (gamma = 2.0).
#[inline]
pub fn linear_to_gamma(linear: f64) -> f64 {
    if linear > 0.0 {
        linear.sqrt()
    } else {
        0.0
    }
}

/// Convert a linear color to 8-bit RGBA.
pub fn color_to_rgba(color: Color) -> [u8; 4] {
    let to_byte = |c: f64| (255.0 * linear_to_gamma(c).clamp(0.0, 1.0)) as u8;
    [to_byte(color.x), to_byte(color.y), to_byte(color.z), 255]
}

/// Simple image buffer for storing render output.
#[derive(Debug, Clone)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Color>,
}

impl ImageBuffer {
    /// Create a new image buffer filled with black.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Color::ZERO; width as usize * height as usize],
        }
    }

    /// Get the pixel at (x, y).
    pub fn get(&self, x: u32, y: u32) -> Color {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Set the pixel at (x, y).
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        self.pixels[y as usize * self.width as usize + x as usize] = color;
    }

    /// Copy a block of row-major RGB triples into the image.
    pub fn write_block(&mut self, x: u32, y: u32, width: u32, height: u32, rgb: &[f32]) {
        for row in 0..height {
            for col in 0..width {
                let i = (row * width + col) as usize * 3;
                let color = Color::new(rgb[i] as f64, rgb[i + 1] as f64, rgb[i + 2] as f64);
                self.set(x + col, y + row, color);
            }
        }
    }

    /// Average of all pixels.
    pub fn mean(&self) -> Color {
        if self.pixels.is_empty() {
            return Color::ZERO;
        }
        self.pixels.iter().copied().sum::<Color>() / self.pixels.len() as f64
    }

    /// Convert to RGBA bytes (for display or saving).
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.pixels.len() * 4);
        for color in &self.pixels {
            bytes.extend_from_slice(&color_to_rgba(*color));
        }
        bytes
    }
}

#[derive(Debug)]
struct FrameState {
    image: ImageBuffer,
    done: bool,
    blocks_written: usize,
    done_count: usize,
}

/// In-memory sink that collects tiles into an [`ImageBuffer`].
#[derive(Debug)]
pub struct FrameBuffer {
    state: Mutex<FrameState>,
    done: Condvar,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Mutex::new(FrameState {
                image: ImageBuffer::new(width, height),
                done: false,
                blocks_written: 0,
                done_count: 0,
            }),
            done: Condvar::new(),
        }
    }

    /// Copy of the image as it currently stands.
    pub fn snapshot(&self) -> ImageBuffer {
        self.state.lock().image.clone()
    }

    /// Block until the current job has called `imaging_done`.
    pub fn wait_done(&self) {
        let mut state = self.state.lock();
        while !state.done {
            self.done.wait(&mut state);
        }
    }

    pub fn is_done(&self) -> bool {
        self.state.lock().done
    }

    /// Number of `set_pixels` calls received.
    pub fn blocks_written(&self) -> usize {
        self.state.lock().blocks_written
    }

    /// Number of `imaging_done` calls received.
    pub fn done_count(&self) -> usize {
        self.state.lock().done_count
    }
}

impl ImageSink for FrameBuffer {
    fn resolution(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.image.width, state.image.height)
    }

    fn imaging_started(&self) {
        self.state.lock().done = false;
    }

    fn set_pixels(&self, x: u32, y: u32, width: u32, height: u32, pixels: &[f32]) {
        let mut state = self.state.lock();
        state.image.write_block(x, y, width, height, pixels);
        state.blocks_written += 1;
    }

    fn imaging_done(&self) {
        let mut state = self.state.lock();
        state.done = true;
        state.done_count += 1;
        self.done.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_linear_to_gamma() {
        assert_eq!(linear_to_gamma(0.0), 0.0);
        assert!((linear_to_gamma(1.0) - 1.0).abs() < 1e-12);
        assert!((linear_to_gamma(0.25) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_color_to_rgba_clamps() {
        assert_eq!(color_to_rgba(Color::new(0.25, 4.0, -1.0)), [127, 255, 0, 255]);
    }

    #[test]
    fn test_write_block() {
        let mut image = ImageBuffer::new(4, 3);
        let rgb: Vec<f32> = (0..2 * 2 * 3).map(|i| i as f32).collect();
        image.write_block(1, 1, 2, 2, &rgb);

        assert_eq!(image.get(0, 0), Color::ZERO);
        assert_eq!(image.get(1, 1), Color::new(0.0, 1.0, 2.0));
        assert_eq!(image.get(2, 1), Color::new(3.0, 4.0, 5.0));
        assert_eq!(image.get(1, 2), Color::new(6.0, 7.0, 8.0));
        assert_eq!(image.get(2, 2), Color::new(9.0, 10.0, 11.0));
    }

    #[test]
    fn test_frame_buffer_wait_done() {
        let frame = Arc::new(FrameBuffer::new(2, 2));
        frame.imaging_started();
        assert!(!frame.is_done());

        let writer = Arc::clone(&frame);
        let handle = thread::spawn(move || {
            writer.set_pixels(0, 0, 1, 1, &[1.0, 0.5, 0.25]);
            writer.imaging_done();
        });

        frame.wait_done();
        handle.join().unwrap();

        assert_eq!(frame.done_count(), 1);
        assert_eq!(frame.blocks_written(), 1);
        assert_eq!(frame.snapshot().get(0, 0), Color::new(1.0, 0.5, 0.25));
    }
}
