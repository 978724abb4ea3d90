//! Status overlay compositing
//!
//! `compose` burns the UI snapshot onto a private copy of a frame. It is a pure function
//! of its inputs: no locks, no clocks (the snapshot carries `now`), no I/O.
//!
//! Draw order, back to front:
//! 1. welcome banner during the first seconds after start
//! 2. recording dot, label and elapsed time
//! 3. transient message
//! 4. relocation progress or relocation failure banner
//! 5. stats block when enabled
//!
//! Positions are laid out for 720 lines and scaled to the frame height.

pub mod canvas;

use std::time::Duration;

use canvas::{text_width, Canvas, AMBER, BLACK, GREEN, RED, WHITE};

use crate::pipeline::ui_state::{MessageKind, UiSnapshot};
use crate::video::{ChannelOrder, Frame};

/// How long the welcome banner stays up
pub const WELCOME_DURATION: Duration = Duration::from_secs(5);

const WELCOME_TEXT: &str = "LENSCAST";

/// Reference-layout coordinates scaled to a frame
#[derive(Debug, Clone, Copy)]
struct Layout {
    height: u32,
    text_scale: u32,
}

impl Layout {
    fn new(height: u32) -> Self {
        Self {
            height,
            text_scale: (height / 240).max(1),
        }
    }

    /// Scale a coordinate from the 720-line reference
    fn px(&self, v: u32) -> i32 {
        ((v as u64 * self.height as u64 + 360) / 720) as i32
    }

    fn line_height(&self) -> u32 {
        canvas::GLYPH_SIZE * self.text_scale
    }

    fn dot_radius(&self) -> i32 {
        self.px(10).max(2)
    }

    fn dot_center(&self) -> (i32, i32) {
        let r = self.dot_radius();
        (self.px(30) + r, self.px(30) + r)
    }
}

/// Burn the overlay described by `snapshot` onto a copy of `frame`
pub fn compose(frame: &Frame, snapshot: &UiSnapshot) -> Frame {
    let mut canvas = Canvas::from_frame(frame);
    let layout = Layout::new(canvas.height());

    if snapshot.uptime() < WELCOME_DURATION {
        draw_welcome(&mut canvas, &layout);
    }
    if snapshot.is_recording {
        draw_recording(&mut canvas, &layout, &snapshot.elapsed_label);
    }
    if let Some(message) = snapshot.visible_message() {
        let color = match message.kind {
            MessageKind::Info => GREEN,
            MessageKind::Error => RED,
        };
        canvas.draw_text(layout.px(30), layout.px(120), &message.text, layout.text_scale, color);
    }
    if let Some(relocation) = &snapshot.relocation {
        if relocation.in_flight() {
            let lines = [
                "SAVING, DO NOT UNPLUG USB DRIVE".to_string(),
                format!("PROGRESS: {:.2}%", relocation.percent()),
            ];
            draw_banner(&mut canvas, &layout, &lines, AMBER);
        } else if let Some(error) = &relocation.error {
            let lines = [
                "SAVE FAILED, RECORDING KEPT LOCALLY".to_string(),
                truncate_upper(error, 40),
            ];
            draw_banner(&mut canvas, &layout, &lines, RED);
        }
    }
    if snapshot.show_stats {
        draw_stats(&mut canvas, &layout, snapshot);
    }

    canvas.into_frame()
}

fn draw_welcome(canvas: &mut Canvas, layout: &Layout) {
    let scale = layout.text_scale * 2;
    let w = text_width(WELCOME_TEXT, scale) as i32;
    let x = (canvas.width() as i32 - w) / 2;
    let y = (canvas.height() as i32 - (canvas::GLYPH_SIZE * scale) as i32) / 2;
    canvas.draw_text(x, y, WELCOME_TEXT, scale, WHITE);
}

fn draw_recording(canvas: &mut Canvas, layout: &Layout, elapsed: &str) {
    let (cx, cy) = layout.dot_center();
    let r = layout.dot_radius();
    canvas.fill_circle(cx, cy, r, RED);

    let text_y = cy - layout.line_height() as i32 / 2;
    canvas.draw_text(cx + r + layout.px(12), text_y, "RECORDING", layout.text_scale, RED);
    canvas.draw_text(layout.px(30), layout.px(80), elapsed, layout.text_scale, WHITE);
}

fn draw_banner(canvas: &mut Canvas, layout: &Layout, lines: &[String], color: [u8; 3]) {
    let line_h = layout.line_height() as i32;
    let gap = layout.px(12);
    let pad = layout.px(10);
    let block_h = lines.len() as i32 * (line_h + gap) + pad;
    let top = canvas.height() as i32 - block_h - layout.px(20);

    canvas.shade_rect(0, top - pad, canvas.width(), (block_h + pad) as u32);
    for (i, line) in lines.iter().enumerate() {
        let y = top + i as i32 * (line_h + gap);
        canvas.draw_text(layout.px(30), y, line, layout.text_scale, color);
    }
}

fn draw_stats(canvas: &mut Canvas, layout: &Layout, snapshot: &UiSnapshot) {
    let (w, h) = snapshot.resolution;
    let lines = [
        format!("RES: {}x{}", w, h),
        format!(
            "DISK: {:.1}/{:.1} GB",
            snapshot.storage.used_gb(),
            snapshot.storage.total_gb()
        ),
        format!(
            "MEM: {:.0}/{:.0} MB",
            snapshot.memory.used_mb(),
            snapshot.memory.total_mb()
        ),
    ];
    for (i, line) in lines.iter().enumerate() {
        let y = layout.px(200) + i as i32 * layout.px(40);
        canvas.draw_text(layout.px(30), y, line, layout.text_scale, WHITE);
    }
}

fn truncate_upper(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out.to_uppercase()
}

/// Frame shown and relayed while no camera is delivering
pub fn placeholder(width: u32, height: u32, device: &str) -> Frame {
    let frame = Frame::solid(width, height, ChannelOrder::Bgr, BLACK);
    let mut canvas = Canvas::from_frame(&frame);
    let layout = Layout::new(height);

    let title = "NO SIGNAL";
    let title_scale = layout.text_scale * 2;
    let title_w = text_width(title, title_scale) as i32;
    let title_y = height as i32 / 2 - (canvas::GLYPH_SIZE * title_scale) as i32;
    canvas.draw_text((width as i32 - title_w) / 2, title_y, title, title_scale, WHITE);

    let label = format!("'{}'", device);
    let label_w = text_width(&label, layout.text_scale) as i32;
    let label_y = height as i32 / 2 + layout.px(20);
    canvas.draw_text((width as i32 - label_w) / 2, label_y, &label, layout.text_scale, RED);

    canvas.into_frame()
}
