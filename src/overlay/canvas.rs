// Minimal raster drawing on packed 24-bit buffers
//
// Colors are always given as RGB and packed into the canvas channel order on write.
// Everything clips to the canvas, so callers can draw partially off-screen.

use font8x8::{UnicodeFonts, BASIC_FONTS};

use crate::video::{ChannelOrder, Frame, CHANNELS};

pub const BLACK: [u8; 3] = [0, 0, 0];
pub const WHITE: [u8; 3] = [255, 255, 255];
pub const RED: [u8; 3] = [230, 30, 30];
pub const GREEN: [u8; 3] = [40, 220, 90];
pub const AMBER: [u8; 3] = [255, 190, 0];

/// Glyph cell size of the bitmap font
pub const GLYPH_SIZE: u32 = 8;

pub struct Canvas {
    width: u32,
    height: u32,
    order: ChannelOrder,
    data: Vec<u8>,
}

impl Canvas {
    /// Private copy of the frame's pixels
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            width: frame.width(),
            height: frame.height(),
            order: frame.order(),
            data: frame.data().to_vec(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn into_frame(self) -> Frame {
        match Frame::new(self.width, self.height, self.order, self.data) {
            Ok(frame) => frame,
            // Size never changes after from_frame
            Err(_) => Frame::solid(self.width, self.height, self.order, BLACK),
        }
    }

    fn put(&mut self, x: i32, y: i32, px: [u8; 3]) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        self.data[i..i + CHANNELS].copy_from_slice(&px);
    }

    pub fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, rgb: [u8; 3]) {
        let px = self.order.pack(rgb);
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + w as i32).min(self.width as i32);
        let y1 = (y + h as i32).min(self.height as i32);
        for yy in y0..y1 {
            for xx in x0..x1 {
                self.put(xx, yy, px);
            }
        }
    }

    /// Darken a rectangle so text on top stays readable
    pub fn shade_rect(&mut self, x: i32, y: i32, w: u32, h: u32) {
        let x0 = x.clamp(0, self.width as i32) as usize;
        let y0 = y.max(0) as usize;
        let x1 = (x + w as i32).clamp(0, self.width as i32) as usize;
        let y1 = (y + h as i32).clamp(0, self.height as i32) as usize;
        for yy in y0..y1 {
            let row = yy * self.width as usize * CHANNELS;
            for byte in &mut self.data[row + x0 * CHANNELS..row + x1 * CHANNELS] {
                *byte /= 3;
            }
        }
    }

    pub fn fill_circle(&mut self, cx: i32, cy: i32, radius: i32, rgb: [u8; 3]) {
        let px = self.order.pack(rgb);
        let r2 = radius * radius;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= r2 {
                    self.put(cx + dx, cy + dy, px);
                }
            }
        }
    }

    fn draw_glyphs(&mut self, x: i32, y: i32, text: &str, scale: u32, px: [u8; 3]) {
        let scale = scale.max(1) as i32;
        let advance = GLYPH_SIZE as i32 * scale;
        for (n, ch) in text.chars().enumerate() {
            let Some(glyph) = BASIC_FONTS.get(ch) else {
                continue;
            };
            let gx = x + n as i32 * advance;
            for (row, bits) in glyph.iter().enumerate() {
                for col in 0..GLYPH_SIZE as i32 {
                    if bits & (1 << col) == 0 {
                        continue;
                    }
                    for sy in 0..scale {
                        for sx in 0..scale {
                            self.put(gx + col * scale + sx, y + row as i32 * scale + sy, px);
                        }
                    }
                }
            }
        }
    }

    /// Text with a 1-px black drop shadow; (x, y) is the top-left of the first glyph
    pub fn draw_text(&mut self, x: i32, y: i32, text: &str, scale: u32, rgb: [u8; 3]) {
        let shadow = self.order.pack(BLACK);
        let px = self.order.pack(rgb);
        self.draw_glyphs(x + 1, y + 1, text, scale, shadow);
        self.draw_glyphs(x, y, text, scale, px);
    }
}

/// Width in pixels of `text` at `scale`
pub fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * GLYPH_SIZE * scale.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_clips_and_respects_order() {
        let frame = Frame::solid(10, 10, ChannelOrder::Bgr, BLACK);
        let mut canvas = Canvas::from_frame(&frame);
        canvas.fill_rect(-5, 8, 100, 100, RED);
        let out = canvas.into_frame();

        assert_eq!(out.rgb_at(0, 9), Some(RED));
        assert_eq!(out.rgb_at(9, 8), Some(RED));
        assert_eq!(out.rgb_at(0, 7), Some(BLACK));
        // Stored as BGR
        let i = (9 * 10) * 3;
        assert_eq!(&out.data()[i..i + 3], &[RED[2], RED[1], RED[0]]);
    }

    #[test]
    fn text_draws_glyph_pixels_and_shadow() {
        let frame = Frame::solid(40, 20, ChannelOrder::Rgb, [128, 128, 128]);
        let mut canvas = Canvas::from_frame(&frame);
        canvas.draw_text(2, 2, "I", 1, WHITE);
        let out = canvas.into_frame();

        let lit = (0..40)
            .flat_map(|x| (0..20).map(move |y| (x, y)))
            .filter(|&(x, y)| out.rgb_at(x, y) == Some(WHITE))
            .count();
        let shadow = (0..40)
            .flat_map(|x| (0..20).map(move |y| (x, y)))
            .filter(|&(x, y)| out.rgb_at(x, y) == Some(BLACK))
            .count();
        assert!(lit > 5);
        assert!(shadow > 0);
        assert_eq!(text_width("ABC", 2), 48);
    }
}
