use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::{DynamicImage, ImageFormat, imageops::FilterType};
use ratatui::{
  buffer::Buffer,
  layout::Rect,
  style::{Color, Style},
  widgets::Widget,
};
use std::io::{Cursor, Write};

use crate::display::DisplayMode;

/// Draws a pre-scaled thumbnail with character cells (half-block or ASCII).
/// Kitty images are placed separately after the frame is drawn.
pub struct ThumbnailWidget<'a> {
  pub image: &'a DynamicImage,
  pub display_mode: DisplayMode,
}

const ASCII_RAMP: &[u8] = b" .:-=+*#%@";

impl Widget for ThumbnailWidget<'_> {
  fn render(self, area: Rect, buf: &mut Buffer) {
    if area.is_empty() {
      return;
    }
    match self.display_mode {
      DisplayMode::HalfBlock => render_half_blocks(self.image, area, buf),
      DisplayMode::Ascii => render_ascii(self.image, area, buf),
      DisplayMode::Kitty => {}
    }
  }
}

/// Scale `image` to the pixel grid a `cols` x `rows` cell area can show in `mode`,
/// keeping its aspect ratio.
pub fn scale_for_cells(image: &DynamicImage, cols: u16, rows: u16, mode: DisplayMode) -> DynamicImage {
  let max_w = u32::from(cols).max(1);
  let max_h = match mode {
    DisplayMode::Ascii => u32::from(rows).max(1),
    _ => (u32::from(rows) * mode.pixels_per_row()).max(1),
  };
  let (w, h) = (image.width().max(1), image.height().max(1));
  // ASCII cells are about twice as tall as wide.
  let (w, h) = match mode {
    DisplayMode::Ascii => (w, h.div_ceil(2)),
    _ => (w, h),
  };
  let scale = (max_w as f64 / w as f64).min(max_h as f64 / h as f64);
  let target_w = ((w as f64 * scale).round() as u32).clamp(1, max_w);
  let target_h = ((h as f64 * scale).round() as u32).clamp(1, max_h);
  image.resize_exact(target_w, target_h, FilterType::Triangle)
}

/// Centered placement of a `w` x `h` cell block inside `area`.
fn centered(area: Rect, w: u32, h: u32) -> (u16, u16) {
  let dx = u32::from(area.width).saturating_sub(w) / 2;
  let dy = u32::from(area.height).saturating_sub(h) / 2;
  (area.x.saturating_add(dx as u16), area.y.saturating_add(dy as u16))
}

fn render_half_blocks(image: &DynamicImage, area: Rect, buf: &mut Buffer) {
  let rgb = image.to_rgb8();
  let cols = rgb.width().min(u32::from(area.width));
  let rows = rgb.height().div_ceil(2).min(u32::from(area.height));
  let (x0, y0) = centered(area, cols, rows);

  for row in 0..rows {
    for col in 0..cols {
      let top = rgb.get_pixel(col, row * 2);
      let bottom = if row * 2 + 1 < rgb.height() {
        let p = rgb.get_pixel(col, row * 2 + 1);
        Color::Rgb(p[0], p[1], p[2])
      } else {
        Color::Reset
      };
      if let Some(cell) = buf.cell_mut((x0 + col as u16, y0 + row as u16)) {
        cell.set_symbol("▀").set_style(Style::default().fg(Color::Rgb(top[0], top[1], top[2])).bg(bottom));
      }
    }
  }
}

fn ascii_char(luma: u8) -> char {
  let idx = (usize::from(luma) * (ASCII_RAMP.len() - 1) + 127) / 255;
  char::from(ASCII_RAMP[idx.min(ASCII_RAMP.len() - 1)])
}

fn render_ascii(image: &DynamicImage, area: Rect, buf: &mut Buffer) {
  let luma = image.to_luma8();
  let cols = luma.width().min(u32::from(area.width));
  let rows = luma.height().min(u32::from(area.height));
  let (x0, y0) = centered(area, cols, rows);

  for row in 0..rows {
    for col in 0..cols {
      let ch = ascii_char(luma.get_pixel(col, row)[0]);
      if let Some(cell) = buf.cell_mut((x0 + col as u16, y0 + row as u16)) {
        cell.set_char(ch);
      }
    }
  }
}

// --- Kitty graphics protocol ---
//
//   first chunk: ESC _G a=T,f=100,t=d,i=1,p=1,c=<cols>,r=<rows>,q=2,m=1;<base64> ESC \
//   next chunks: ESC _G m=1;<base64> ESC \   (m=0 on the last one)
//
// Image id 1 / placement id 1 is reused, so sending a new thumbnail replaces the old one in place.

const KITTY_CHUNK_SIZE: usize = 4096;

/// Escape sequence that places `image` (PNG) over `area`, scaled by the terminal.
pub fn kitty_sequence(image: &DynamicImage, area: Rect) -> Result<String> {
  let mut png = Vec::new();
  image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png).context("Failed to encode thumbnail as PNG")?;
  let b64 = BASE64.encode(&png);
  let chunks: Vec<&str> = b64
    .as_bytes()
    .chunks(KITTY_CHUNK_SIZE)
    .map(std::str::from_utf8)
    .collect::<std::result::Result<_, _>>()
    .context("base64 chunk was not valid UTF-8")?;

  let mut out = format!("\x1B[{};{}H", area.y.saturating_add(1), area.x.saturating_add(1));
  let last = chunks.len().saturating_sub(1);
  for (i, data) in chunks.iter().enumerate() {
    let more = u8::from(i < last);
    if i == 0 {
      out.push_str(&format!(
        "\x1B_Ga=T,f=100,t=d,i=1,p=1,c={},r={},q=2,m={};{}\x1B\\",
        area.width, area.height, more, data
      ));
    } else {
      out.push_str(&format!("\x1B_Gm={};{}\x1B\\", more, data));
    }
  }
  Ok(out)
}

fn write_stdout(seq: &str) -> Result<()> {
  let mut stdout = std::io::stdout();
  stdout.write_all(seq.as_bytes()).context("Failed to write kitty sequence")?;
  stdout.flush().context("Failed to flush kitty sequence")
}

pub fn kitty_render_image(image: &DynamicImage, area: Rect) -> Result<()> {
  if area.is_empty() {
    return Ok(());
  }
  write_stdout(&kitty_sequence(image, area)?)
}

/// Remove the thumbnail placement (a new item is loading or the frame went away).
pub fn kitty_delete_placement() -> Result<()> {
  write_stdout("\x1B_Ga=d,d=i,i=1,q=2\x1B\\")
}

/// Remove every image we placed; called on exit.
pub fn kitty_delete_all() -> Result<()> {
  write_stdout("\x1B_Ga=d,d=a,q=2\x1B\\")
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  fn solid(w: u32, h: u32, color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(color)))
  }

  #[test]
  fn scaling_respects_cell_grid() {
    let img = solid(320, 180, [0, 0, 0]);
    let half = scale_for_cells(&img, 40, 40, DisplayMode::HalfBlock);
    assert_eq!((half.width(), half.height()), (40, 23));
    let ascii = scale_for_cells(&img, 40, 40, DisplayMode::Ascii);
    assert_eq!((ascii.width(), ascii.height()), (40, 11));
  }

  #[test]
  fn half_blocks_carry_both_pixels() {
    let mut img = RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]));
    img.put_pixel(0, 1, Rgb([0, 0, 255]));
    let img = DynamicImage::ImageRgb8(img);
    let area = Rect::new(0, 0, 2, 1);
    let mut buf = Buffer::empty(area);
    ThumbnailWidget { image: &img, display_mode: DisplayMode::HalfBlock }.render(area, &mut buf);
    let cell = &buf[(0u16, 0u16)];
    assert_eq!(cell.symbol(), "▀");
    assert_eq!(cell.fg, Color::Rgb(255, 0, 0));
    assert_eq!(cell.bg, Color::Rgb(0, 0, 255));
  }

  #[test]
  fn ascii_ramp_ends() {
    assert_eq!(ascii_char(0), ' ');
    assert_eq!(ascii_char(255), '@');
    let img = solid(3, 1, [255, 255, 255]);
    let area = Rect::new(0, 0, 5, 1);
    let mut buf = Buffer::empty(area);
    ThumbnailWidget { image: &img, display_mode: DisplayMode::Ascii }.render(area, &mut buf);
    assert_eq!(buf[(0u16, 0u16)].symbol(), " ");
    assert_eq!(buf[(1u16, 0u16)].symbol(), "@");
    assert_eq!(buf[(3u16, 0u16)].symbol(), "@");
  }

  #[test]
  fn kitty_mode_draws_no_cells() {
    let img = solid(4, 4, [255, 255, 255]);
    let area = Rect::new(0, 0, 4, 2);
    let mut buf = Buffer::empty(area);
    ThumbnailWidget { image: &img, display_mode: DisplayMode::Kitty }.render(area, &mut buf);
    assert_eq!(buf, Buffer::empty(area));
  }

  #[test]
  fn kitty_sequence_places_image() {
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(200, 120, |x, y| Rgb([x as u8, y as u8, (x ^ y) as u8])));
    let seq = kitty_sequence(&img, Rect::new(2, 3, 30, 10)).unwrap();
    assert!(seq.starts_with("\x1B[4;3H\x1B_Ga=T,f=100,t=d,i=1,p=1,c=30,r=10,q=2,m="));
    assert!(seq.ends_with("\x1B\\"));
    assert_eq!(seq.matches("m=0;").count(), 1);
  }
}
