use std::fmt;

use crate::geo::PixelPoint;
use crate::render::{FillRule, RenderPath, RenderTarget};

/// Braille Unicode canvas for high-resolution terminal graphics.
/// Each character cell represents a 2x4 pixel grid (8 dots).
/// Unicode Braille patterns: U+2800 to U+28FF
pub struct BrailleCanvas {
    width: usize,  // Characters
    height: usize, // Characters
    pixels: Vec<Vec<u8>>, // Bit patterns per char
}

impl BrailleCanvas {
    /// Create a new canvas with the given character dimensions.
    /// Effective pixel resolution: width*2 x height*4
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![vec![0u8; width]; height],
        }
    }

    pub fn pixel_width(&self) -> usize {
        self.width * 2
    }

    pub fn pixel_height(&self) -> usize {
        self.height * 4
    }

    pub fn clear(&mut self) {
        for row in &mut self.pixels {
            row.fill(0);
        }
    }

    /// Braille dot layout per character:
    /// ```text
    /// (0,0) (1,0)   bits: 0x01 0x08
    /// (0,1) (1,1)   bits: 0x02 0x10
    /// (0,2) (1,2)   bits: 0x04 0x20
    /// (0,3) (1,3)   bits: 0x40 0x80
    /// ```
    #[inline(always)]
    fn dot(x: usize, y: usize) -> u8 {
        match (x % 2, y % 4) {
            (0, 0) => 0x01,
            (1, 0) => 0x08,
            (0, 1) => 0x02,
            (1, 1) => 0x10,
            (0, 2) => 0x04,
            (1, 2) => 0x20,
            (0, 3) => 0x40,
            (1, 3) => 0x80,
            _ => 0,
        }
    }

    /// Set a pixel at the given coordinates. Out of range pixels are ignored.
    pub fn set_pixel(&mut self, x: usize, y: usize) {
        let cx = x / 2;
        let cy = y / 4;

        if cx >= self.width || cy >= self.height {
            return;
        }

        self.pixels[cy][cx] |= Self::dot(x, y);
    }

    /// Set a pixel using signed coordinates (ignores negative values)
    pub fn set_pixel_signed(&mut self, x: i32, y: i32) {
        if x >= 0 && y >= 0 {
            self.set_pixel(x as usize, y as usize);
        }
    }

    pub fn get_pixel(&self, x: usize, y: usize) -> bool {
        let cx = x / 2;
        let cy = y / 4;
        if cx >= self.width || cy >= self.height {
            return false;
        }
        self.pixels[cy][cx] & Self::dot(x, y) != 0
    }

    /// Draw a line using Bresenham's algorithm
    pub fn line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        let mut x = x0;
        let mut y = y0;

        loop {
            self.set_pixel_signed(x, y);

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;

            if e2 >= dy {
                if x == x1 {
                    break;
                }
                err += dy;
                x += sx;
            }

            if e2 <= dx {
                if y == y1 {
                    break;
                }
                err += dx;
                y += sy;
            }
        }
    }

    /// Get a specific row as a string (for line-by-line rendering)
    pub fn row_to_string(&self, row: usize) -> String {
        if row >= self.height {
            return String::new();
        }
        self.pixels[row]
            .iter()
            .map(|&b| char::from_u32(0x2800 + b as u32).unwrap_or(' '))
            .collect()
    }

    /// Get all rows as an iterator of strings
    pub fn rows(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.height).map(|i| self.row_to_string(i))
    }

    /// Fill the spans of one pixel row whose centres are inside the path.
    fn fill_row(&mut self, y: usize, path: &RenderPath, rule: FillRule, crossings: &mut Vec<(f64, i32)>) {
        let yc = y as f64 + 0.5;
        crossings.clear();

        // Every sub-path is implicitly closed for filling
        for sub in path.subpaths() {
            let n = sub.points.len();
            if n < 2 {
                continue;
            }
            for i in 0..n {
                let p = sub.points[i];
                let q = sub.points[(i + 1) % n];
                if p.y == q.y {
                    continue;
                }
                let (lo, hi, dir) = if p.y < q.y { (p.y, q.y, 1) } else { (q.y, p.y, -1) };
                if yc < lo || yc >= hi {
                    continue;
                }
                let x = p.x + (yc - p.y) * (q.x - p.x) / (q.y - p.y);
                crossings.push((x, dir));
            }
        }
        crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut winding = 0;
        for pair in crossings.windows(2) {
            winding += pair[0].1;
            let inside = match rule {
                FillRule::NonZero => winding != 0,
                FillRule::EvenOdd => winding % 2 != 0,
            };
            if !inside {
                continue;
            }
            // Pixel centres in [x0, x1)
            let start = (pair[0].0 - 0.5).ceil().max(0.0);
            let end = (pair[1].0 - 0.5).ceil().min(self.pixel_width() as f64);
            let mut x = start;
            while x < end {
                self.set_pixel(x as usize, y);
                x += 1.0;
            }
        }
    }
}

#[inline(always)]
fn to_pixel(p: PixelPoint) -> (i32, i32) {
    (p.x.round() as i32, p.y.round() as i32)
}

impl RenderTarget for BrailleCanvas {
    fn stroke(&mut self, path: &RenderPath) {
        for sub in path.subpaths() {
            match sub.points.as_slice() {
                [] => {}
                [only] => {
                    let (x, y) = to_pixel(*only);
                    self.set_pixel_signed(x, y);
                }
                points => {
                    for seg in points.windows(2) {
                        let (x0, y0) = to_pixel(seg[0]);
                        let (x1, y1) = to_pixel(seg[1]);
                        self.line(x0, y0, x1, y1);
                    }
                    if sub.closed {
                        let (x0, y0) = to_pixel(points[points.len() - 1]);
                        let (x1, y1) = to_pixel(points[0]);
                        self.line(x0, y0, x1, y1);
                    }
                }
            }
        }
    }

    fn fill(&mut self, path: &RenderPath, rule: FillRule) {
        let mut crossings = Vec::new();
        for y in 0..self.pixel_height() {
            self.fill_row(y, path, rule, &mut crossings);
        }
    }
}

impl fmt::Display for BrailleCanvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.rows().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            f.write_str(&row)?;
        }
        Ok(())
    }
}
