//! Thick line rasterization over bounded images.
//!
//! Row lines are extended thousands of pixels past the raster, so every line is
//! clipped to the image (grown by the brush radius) before it is walked with
//! imageproc's Bresenham iterator.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::drawing::BresenhamLineIter;
use std::ops::ControlFlow;
use vineyard_core::PixelPoint;

/// Brush offsets for a square brush `thickness` pixels wide
fn brush_extent(thickness: u32) -> (i64, i64) {
    let thickness = thickness.max(1) as i64;
    (-(thickness / 2), (thickness - 1) / 2)
}

/// Clip a segment to `[min, max]` on both axes (Liang–Barsky)
pub fn clip_segment(
    start: PixelPoint,
    end: PixelPoint,
    min: PixelPoint,
    max: PixelPoint,
) -> Option<(PixelPoint, PixelPoint)> {
    if !start.is_finite() || !end.is_finite() {
        return None;
    }

    let delta = end - start;
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;

    let edges = [
        (-delta.x, start.x - min.x),
        (delta.x, max.x - start.x),
        (-delta.y, start.y - min.y),
        (delta.y, max.y - start.y),
    ];

    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    Some((start + delta * t0, start + delta * t1))
}

/// Visit every in-bounds pixel covered by a thick segment.
///
/// Pixels may be visited more than once. Returns `ControlFlow::Break` as soon
/// as the visitor breaks.
pub fn for_each_line_pixel<F>(
    start: PixelPoint,
    end: PixelPoint,
    thickness: u32,
    width: u32,
    height: u32,
    mut visit: F,
) -> ControlFlow<()>
where
    F: FnMut(u32, u32) -> ControlFlow<()>,
{
    if width == 0 || height == 0 {
        return ControlFlow::Continue(());
    }

    let (lo, hi) = brush_extent(thickness);
    let margin = lo.unsigned_abs().max(hi.unsigned_abs()) as f64 + 1.0;
    let min = PixelPoint::new(-margin, -margin);
    let max = PixelPoint::new(width as f64 - 1.0 + margin, height as f64 - 1.0 + margin);

    let Some((a, b)) = clip_segment(start, end, min, max) else {
        return ControlFlow::Continue(());
    };

    let (w, h) = (width as i64, height as i64);
    let line = BresenhamLineIter::new((a.x as f32, a.y as f32), (b.x as f32, b.y as f32));
    for (cx, cy) in line {
        for dy in lo..=hi {
            let y = cy as i64 + dy;
            if y < 0 || y >= h {
                continue;
            }
            for dx in lo..=hi {
                let x = cx as i64 + dx;
                if x < 0 || x >= w {
                    continue;
                }
                visit(x as u32, y as u32)?;
            }
        }
    }

    ControlFlow::Continue(())
}

/// Draw a thick segment onto `image`
pub fn draw_line(image: &mut GrayImage, start: PixelPoint, end: PixelPoint, thickness: u32, value: u8) {
    let (width, height) = image.dimensions();
    let _ = for_each_line_pixel(start, end, thickness, width, height, |x, y| {
        image.put_pixel(x, y, Luma([value]));
        ControlFlow::Continue(())
    });
}

/// True when any pixel under the thick segment is non-zero in `mask`
pub fn line_touches_mask(mask: &GrayImage, start: PixelPoint, end: PixelPoint, thickness: u32) -> bool {
    let (width, height) = mask.dimensions();
    for_each_line_pixel(start, end, thickness, width, height, |x, y| {
        if mask.get_pixel(x, y)[0] > 0 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })
    .is_break()
}

/// Keep `image` pixels only where `mask` is non-zero (bitwise AND)
pub fn and_mask(image: &GrayImage, mask: &GrayImage) -> GrayImage {
    ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        Luma([image.get_pixel(x, y)[0] & mask.get_pixel(x, y)[0]])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_segment_inside_and_outside() {
        let min = PixelPoint::new(0.0, 0.0);
        let max = PixelPoint::new(10.0, 10.0);

        let (a, b) = clip_segment(PixelPoint::new(-100.0, 5.0), PixelPoint::new(100.0, 5.0), min, max).unwrap();
        assert!(a.distance_to(&PixelPoint::new(0.0, 5.0)) < 1e-9);
        assert!(b.distance_to(&PixelPoint::new(10.0, 5.0)) < 1e-9);

        assert!(clip_segment(PixelPoint::new(-100.0, 50.0), PixelPoint::new(100.0, 50.0), min, max).is_none());
    }

    #[test]
    fn test_draw_thick_line() {
        let mut image = GrayImage::new(20, 20);
        draw_line(&mut image, PixelPoint::new(-500.0, 10.0), PixelPoint::new(500.0, 10.0), 3, 255);
        for x in 0..20 {
            assert_eq!(image.get_pixel(x, 9)[0], 255);
            assert_eq!(image.get_pixel(x, 10)[0], 255);
            assert_eq!(image.get_pixel(x, 11)[0], 255);
            assert_eq!(image.get_pixel(x, 12)[0], 0);
            assert_eq!(image.get_pixel(x, 8)[0], 0);
        }
    }

    #[test]
    fn test_line_touches_mask() {
        let mut mask = GrayImage::new(30, 30);
        mask.put_pixel(15, 20, Luma([1]));
        assert!(line_touches_mask(&mask, PixelPoint::new(0.0, 20.0), PixelPoint::new(29.0, 20.0), 1));
        assert!(!line_touches_mask(&mask, PixelPoint::new(0.0, 5.0), PixelPoint::new(29.0, 5.0), 2));
        assert!(!line_touches_mask(&GrayImage::new(0, 0), PixelPoint::ORIGIN, PixelPoint::new(5.0, 5.0), 2));
    }

    #[test]
    fn test_and_mask() {
        let mut lines = GrayImage::new(4, 1);
        lines.put_pixel(0, 0, Luma([255]));
        lines.put_pixel(1, 0, Luma([255]));
        let mut mask = GrayImage::new(4, 1);
        mask.put_pixel(1, 0, Luma([200]));
        mask.put_pixel(2, 0, Luma([200]));

        let masked = and_mask(&lines, &mask);
        assert_eq!(masked.get_pixel(0, 0)[0], 0);
        assert_eq!(masked.get_pixel(1, 0)[0], 200);
        assert_eq!(masked.get_pixel(2, 0)[0], 0);
    }
}
