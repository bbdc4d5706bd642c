#![allow(dead_code)]

use image::{Rgb, RgbImage};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;
const CELL: i64 = 8;
/// Spare cell columns on the left so shifted scenes stay defined
const MARGIN: i64 = 4;

/// A checkerboard of random-intensity cells, sampled at any integer offset
pub struct Scene {
    cols: i64,
    rows: i64,
    cells: Vec<u8>,
}

impl Scene {
    pub fn new(seed: u64) -> Self {
        let cols = WIDTH as i64 / CELL + 2 * MARGIN;
        let rows = HEIGHT as i64 / CELL + 1;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let cells = (0..cols * rows).map(|_| rng.random::<u8>()).collect();
        Self { cols, rows, cells }
    }

    fn at(&self, x: i64, y: i64) -> u8 {
        let cx = (x.div_euclid(CELL) + MARGIN).clamp(0, self.cols - 1);
        let cy = y.div_euclid(CELL).clamp(0, self.rows - 1);
        self.cells[(cy * self.cols + cx) as usize]
    }

    /// The scene as seen by a camera panned `dx` pixels to the left
    pub fn frame(&self, dx: i64) -> RgbImage {
        RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
            let v = self.at(x as i64 - dx, y as i64);
            // Keep the blue channel spread so the histogram stays clean
            Rgb([v, v / 2 + 64, v])
        })
    }
}

/// Binary block noise, the look of a lost analogue signal
pub fn snow(block: u32, seed: u64) -> RgbImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let bw = WIDTH.div_ceil(block);
    let bh = HEIGHT.div_ceil(block);
    let blocks: Vec<bool> = (0..bw * bh).map(|_| rng.random_bool(0.5)).collect();
    RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
        let on = blocks[((y / block) * bw + x / block) as usize];
        Rgb([if on { 255 } else { 0 }; 3])
    })
}

pub fn black() -> RgbImage {
    RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([0, 0, 0]))
}
