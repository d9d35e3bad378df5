//! Minimal drawing helpers for annotated output frames.

use crate::core::types::{Point, Rect, Scalar};
use crate::core::Frame;
use crate::error::Result;

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn put_pixel(img: &mut Frame, x: i32, y: i32, color: Scalar) {
    if x < 0 || y < 0 || x >= img.cols() as i32 || y >= img.rows() as i32 {
        return;
    }
    let channels = img.channels().min(4);
    if let Ok(pixel) = img.at_mut(y as usize, x as usize) {
        for ch in 0..channels {
            pixel[ch] = color.val[ch].clamp(0.0, 255.0) as u8;
        }
    }
}

/// Draw a line using Bresenham's algorithm
pub fn line(img: &mut Frame, pt1: Point, pt2: Point, color: Scalar) -> Result<()> {
    let mut x0 = pt1.x;
    let mut y0 = pt1.y;
    let x1 = pt2.x;
    let y1 = pt2.y;

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put_pixel(img, x0, y0, color);

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }

    Ok(())
}

/// Draw a rectangle outline
pub fn rectangle(img: &mut Frame, rect: Rect, color: Scalar) -> Result<()> {
    if rect.is_empty() {
        return Ok(());
    }
    let tl = rect.top_left();
    let tr = Point::new(rect.x + rect.width - 1, rect.y);
    let br = Point::new(rect.x + rect.width - 1, rect.y + rect.height - 1);
    let bl = Point::new(rect.x, rect.y + rect.height - 1);

    line(img, tl, tr, color)?;
    line(img, tr, br, color)?;
    line(img, br, bl, color)?;
    line(img, bl, tl, color)?;
    Ok(())
}

/// Draw connected line segments through a point sequence
pub fn polylines(img: &mut Frame, pts: &[Point], color: Scalar) -> Result<()> {
    for pair in pts.windows(2) {
        line(img, pair[0], pair[1], color)?;
    }
    Ok(())
}
