use std::collections::HashSet;

use image::{Luma, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, Canvas};

use super::{pack_rgb, Affine2, DrawingSurface};
use crate::pose::Position;

/// Widest stroke drawn, in canvas pixels either side of the centre line.
const MAX_HALF_WIDTH: f32 = 64.0;

const COVERED: Luma<u8> = Luma([255]);

/// Pixels touched by one primitive. imageproc may visit a pixel more than
/// once; collecting first keeps translucent colours blended exactly once.
struct Coverage {
    width: u32,
    height: u32,
    pixels: HashSet<(u32, u32)>,
}

impl Coverage {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: HashSet::new(),
        }
    }
}

impl Canvas for Coverage {
    type Pixel = Luma<u8>;

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn get_pixel(&self, x: u32, y: u32) -> Luma<u8> {
        if self.pixels.contains(&(x, y)) {
            COVERED
        } else {
            Luma([0])
        }
    }

    fn draw_pixel(&mut self, x: u32, y: u32, _color: Luma<u8>) {
        self.pixels.insert((x, y));
    }
}

/// Liang-Barsky: the part of `from`..`to` inside the box, if any.
fn clip_segment(
    from: Position,
    to: Position,
    min: (f64, f64),
    max: (f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
    let (x0, y0) = (from.x as f64, from.y as f64);
    let (dx, dy) = (to.x as f64 - x0, to.y as f64 - y0);
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
    for (p, q) in [
        (-dx, x0 - min.0),
        (dx, max.0 - x0),
        (-dy, y0 - min.1),
        (dy, max.1 - y0),
    ] {
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
    Some((
        (x0 + t0 * dx, y0 + t0 * dy),
        (x0 + t1 * dx, y0 + t1 * dy),
    ))
}

/// In-memory RGBA canvas.
pub struct RasterCanvas {
    pixels: RgbaImage,
    background: Rgba<u8>,
    current: Affine2,
    stack: Vec<Affine2>,
}

impl RasterCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_background(width, height, Rgba([0, 0, 0, 0]))
    }

    pub fn with_background(width: u32, height: u32, background: Rgba<u8>) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width, height, background),
            background,
            current: Affine2::IDENTITY,
            stack: Vec::new(),
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        if x < self.pixels.width() && y < self.pixels.height() {
            Some(*self.pixels.get_pixel(x, y))
        } else {
            None
        }
    }

    /// Saved states not yet restored.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Fill `out` with `0x00RRGGBB` pixels, as window buffers expect.
    pub fn write_rgb_buffer(&self, out: &mut Vec<u32>) {
        out.clear();
        out.extend(
            self.pixels
                .pixels()
                .map(|p| pack_rgb(Rgb([p[0], p[1], p[2]]))),
        );
    }

    fn blend(&mut self, x: i64, y: i64, color: Rgba<u8>) {
        if x < 0 || y < 0 || x >= self.pixels.width() as i64 || y >= self.pixels.height() as i64
        {
            return;
        }
        let dst = self.pixels.get_pixel_mut(x as u32, y as u32);
        let sa = color[3] as f32 / 255.0;
        if sa >= 1.0 {
            *dst = color;
            return;
        }
        let da = dst[3] as f32 / 255.0;
        let out_a = sa + da * (1.0 - sa);
        if out_a <= 0.0 {
            return;
        }
        for i in 0..3 {
            let s = color[i] as f32 * sa;
            let d = dst[i] as f32 * da * (1.0 - sa);
            dst[i] = ((s + d) / out_a).round().clamp(0.0, 255.0) as u8;
        }
        dst[3] = (out_a * 255.0).round() as u8;
    }

    fn paint(&mut self, coverage: Coverage, color: Rgba<u8>) {
        for (x, y) in coverage.pixels {
            self.blend(x as i64, y as i64, color);
        }
    }

    fn disc(&mut self, cx: f32, cy: f32, radius: f32, color: Rgba<u8>) {
        let (w, h) = self.pixels.dimensions();
        let (cx, cy, radius) = (cx as f64, cy as f64, radius as f64);
        let nx = cx.clamp(0.0, w as f64) - cx;
        let ny = cy.clamp(0.0, h as f64) - cy;
        if nx * nx + ny * ny > radius * radius {
            return;
        }

        let mut coverage = Coverage::new(w, h);
        let diagonal = ((w as f64).powi(2) + (h as f64).powi(2)).sqrt();
        if radius > diagonal {
            // Centre may be far off canvas; test each pixel instead of walking rows.
            for y in 0..h {
                for x in 0..w {
                    let dx = x as f64 + 0.5 - cx;
                    let dy = y as f64 + 0.5 - cy;
                    if dx * dx + dy * dy <= radius * radius {
                        coverage.pixels.insert((x, y));
                    }
                }
            }
        } else {
            draw_filled_circle_mut(
                &mut coverage,
                (cx.floor() as i32, cy.floor() as i32),
                radius.round() as i32,
                COVERED,
            );
        }
        self.paint(coverage, color);
    }

    fn line(&mut self, from: Position, to: Position, half_width: f32, color: Rgba<u8>) {
        let (w, h) = self.pixels.dimensions();
        let half = half_width.min(MAX_HALF_WIDTH);
        let pad = half.max(0.5) as f64 + 1.0;
        let Some((a, b)) = clip_segment(
            from,
            to,
            (-pad, -pad),
            (w as f64 + pad, h as f64 + pad),
        ) else {
            return;
        };

        let mut coverage = Coverage::new(w, h);
        let (dx, dy) = (b.0 - a.0, b.1 - a.1);
        let length = (dx * dx + dy * dy).sqrt();
        let (nx, ny) = if length > 0.0 {
            (-dy / length, dx / length)
        } else {
            (0.0, 0.0)
        };
        // Thick strokes are parallel passes half a pixel apart.
        let passes = if half > 0.5 { (half * 2.0).round() as i32 } else { 0 };
        for k in -passes..=passes {
            let offset = k as f64 * 0.5;
            draw_line_segment_mut(
                &mut coverage,
                ((a.0 + nx * offset) as f32, (a.1 + ny * offset) as f32),
                ((b.0 + nx * offset) as f32, (b.1 + ny * offset) as f32),
                COVERED,
            );
        }
        if passes > 0 {
            let r = half.round() as i32;
            for (x, y) in [a, b] {
                draw_filled_circle_mut(&mut coverage, (x.floor() as i32, y.floor() as i32), r, COVERED);
            }
        }
        self.paint(coverage, color);
    }

    fn linear_scale(&self) -> f32 {
        self.current.determinant().abs().sqrt()
    }
}

impl DrawingSurface for RasterCanvas {
    fn width(&self) -> u32 {
        self.pixels.width()
    }

    fn height(&self) -> u32 {
        self.pixels.height()
    }

    fn clear(&mut self) {
        let background = self.background;
        self.pixels.pixels_mut().for_each(|p| *p = background);
    }

    fn draw_video(&mut self, frame: &RgbImage) {
        let (w, h) = self.pixels.dimensions();
        let (fw, fh) = frame.dimensions();
        if fw == 0 || fh == 0 {
            return;
        }
        for (x, y, dst) in self.pixels.enumerate_pixels_mut() {
            let sx = (x as u64 * fw as u64 / w as u64) as u32;
            let sy = (y as u64 * fh as u64 / h as u64) as u32;
            let src = frame.get_pixel(sx, sy);
            *dst = Rgba([src[0], src[1], src[2], 255]);
        }
    }

    fn fill_circle(&mut self, center: Position, radius: f32, color: Rgba<u8>) {
        let c = self.current.apply(center);
        let r = radius * self.linear_scale();
        if !(c.x.is_finite() && c.y.is_finite() && r.is_finite()) || r <= 0.0 {
            return;
        }
        self.disc(c.x, c.y, r, color);
    }

    fn stroke_polyline(&mut self, points: &[Position], color: Rgba<u8>, line_width: f32) {
        let half = line_width * self.linear_scale() / 2.0;
        let mapped: Vec<Position> = points.iter().map(|p| self.current.apply(*p)).collect();
        if mapped.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
            return;
        }
        for pair in mapped.windows(2) {
            self.line(pair[0], pair[1], half, color);
        }
    }

    fn draw_image(&mut self, image: &RgbaImage, x: f32, y: f32, width: f32, height: f32) {
        let (iw, ih) = image.dimensions();
        if iw == 0 || ih == 0 || width <= 0.0 || height <= 0.0 {
            return;
        }
        let Some(inverse) = self.current.inverse() else {
            return;
        };
        let corners = [
            Position::new(x, y),
            Position::new(x + width, y),
            Position::new(x, y + height),
            Position::new(x + width, y + height),
        ]
        .map(|p| self.current.apply(p));
        let min_x = corners.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
        let max_x = corners.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max);
        let min_y = corners.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
        let max_y = corners.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);
        if !(min_x.is_finite() && max_x.is_finite() && min_y.is_finite() && max_y.is_finite()) {
            return;
        }

        let x0 = min_x.floor().max(0.0) as i64;
        let y0 = min_y.floor().max(0.0) as i64;
        let x1 = (max_x.ceil() as i64).min(self.pixels.width() as i64);
        let y1 = (max_y.ceil() as i64).min(self.pixels.height() as i64);

        for py in y0..y1 {
            for px in x0..x1 {
                let user = inverse.apply(Position::new(px as f32 + 0.5, py as f32 + 0.5));
                let u = (user.x - x) / width;
                let v = (user.y - y) / height;
                if !(0.0..1.0).contains(&u) || !(0.0..1.0).contains(&v) {
                    continue;
                }
                let sx = ((u * iw as f32) as u32).min(iw - 1);
                let sy = ((v * ih as f32) as u32).min(ih - 1);
                let src = *image.get_pixel(sx, sy);
                if src[3] > 0 {
                    self.blend(px, py, src);
                }
            }
        }
    }

    fn save(&mut self) {
        self.stack.push(self.current);
    }

    fn restore(&mut self) {
        if let Some(previous) = self.stack.pop() {
            self.current = previous;
        }
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        self.current = self.current.multiply(&Affine2::translation(dx, dy));
    }

    fn rotate(&mut self, radians: f32) {
        self.current = self.current.multiply(&Affine2::rotation(radians));
    }

    fn scale(&mut self, sx: f32, sy: f32) {
        self.current = self.current.multiply(&Affine2::scaling(sx, sy));
    }

    fn transform(&self) -> Affine2 {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{draw_point, draw_polyline, HIGHLIGHT};

    const OPAQUE_BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    #[test]
    fn restore_on_empty_stack_is_noop() {
        let mut canvas = RasterCanvas::new(4, 4);
        canvas.translate(1.0, 1.0);
        canvas.restore();
        assert_eq!(canvas.transform(), Affine2::translation(1.0, 1.0));
        assert_eq!(canvas.depth(), 0);
    }

    #[test]
    fn point_is_drawn_through_transform() {
        let mut canvas = RasterCanvas::new(40, 40);
        canvas.translate(20.0, 20.0);
        draw_point(&mut canvas, Position::new(0.0, 0.0));
        let center = canvas.pixel(20, 20).unwrap();
        assert_eq!(center[0], 255);
        assert_eq!(center[3], HIGHLIGHT[3]);
        assert_eq!(canvas.pixel(2, 2).unwrap()[3], 0);
    }

    #[test]
    fn polyline_touches_every_vertex() {
        let mut canvas = RasterCanvas::new(20, 20);
        let points = [
            Position::new(1.0, 1.0),
            Position::new(10.0, 1.0),
            Position::new(10.0, 15.0),
        ];
        draw_polyline(&mut canvas, &points);
        for p in points {
            assert_ne!(canvas.pixel(p.x as u32, p.y as u32).unwrap()[3], 0);
        }
        assert_ne!(canvas.pixel(5, 1).unwrap()[3], 0);
        assert_eq!(canvas.pixel(5, 10).unwrap()[3], 0);
    }

    #[test]
    fn far_endpoint_is_clipped_not_walked() {
        let mut canvas = RasterCanvas::new(40, 40);
        draw_polyline(
            &mut canvas,
            &[Position::new(5.0, 5.0), Position::new(1e19, -1e19)],
        );
        assert_ne!(canvas.pixel(5, 5).unwrap()[3], 0);
        assert_ne!(canvas.pixel(8, 2).unwrap()[3], 0);
        assert_eq!(canvas.pixel(20, 20).unwrap()[3], 0);

        let mut canvas = RasterCanvas::new(40, 40);
        let started = std::time::Instant::now();
        draw_polyline(
            &mut canvas,
            &[Position::new(0.0, 10.0), Position::new(2e8, 10.0)],
        );
        assert!(started.elapsed() < std::time::Duration::from_millis(100));
        assert_ne!(canvas.pixel(39, 10).unwrap()[3], 0);
        assert_eq!(canvas.pixel(39, 11).unwrap()[3], 0);
    }

    #[test]
    fn segment_outside_canvas_draws_nothing() {
        let mut canvas = RasterCanvas::new(20, 20);
        draw_polyline(
            &mut canvas,
            &[Position::new(-50.0, -5.0), Position::new(70.0, -5.0)],
        );
        assert!(canvas.pixels().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn thick_stroke_blends_each_pixel_once() {
        let mut canvas = RasterCanvas::new(30, 30);
        let red = Rgba([255, 0, 0, 128]);
        canvas.stroke_polyline(
            &[Position::new(5.0, 5.0), Position::new(25.0, 20.0)],
            red,
            6.0,
        );
        let touched: Vec<Rgba<u8>> = canvas
            .pixels()
            .pixels()
            .copied()
            .filter(|p| p[3] != 0)
            .collect();
        assert!(touched.len() > 60);
        assert!(touched.iter().all(|p| *p == red));
    }

    #[test]
    fn huge_circle_covers_canvas() {
        let mut canvas = RasterCanvas::new(16, 16);
        canvas.fill_circle(Position::new(-1e8, 8.0), 2e8, OPAQUE_BLUE);
        assert!(canvas.pixels().pixels().all(|p| *p == OPAQUE_BLUE));

        let mut canvas = RasterCanvas::new(16, 16);
        canvas.fill_circle(Position::new(-1e8, 8.0), 10.0, OPAQUE_BLUE);
        assert!(canvas.pixels().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn image_follows_rotation() {
        let sprite = RgbaImage::from_pixel(4, 2, OPAQUE_BLUE);
        let mut canvas = RasterCanvas::new(20, 20);
        canvas.translate(10.0, 10.0);
        canvas.rotate(std::f32::consts::FRAC_PI_2);
        canvas.draw_image(&sprite, 0.0, 0.0, 8.0, 2.0);
        // A horizontal 8x2 strip rotated a quarter turn hangs downward.
        assert_eq!(canvas.pixel(9, 14), Some(OPAQUE_BLUE));
        assert_eq!(canvas.pixel(14, 10).unwrap()[3], 0);
    }

    #[test]
    fn clear_and_video_blit_cover_canvas() {
        let mut canvas = RasterCanvas::new(4, 4);
        let frame = RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]));
        canvas.draw_video(&frame);
        assert_eq!(canvas.pixel(3, 3), Some(Rgba([1, 2, 3, 255])));
        let mut buffer = Vec::new();
        canvas.write_rgb_buffer(&mut buffer);
        assert_eq!(buffer.len(), 16);
        assert_eq!(buffer[0], 0x010203);
        canvas.clear();
        assert_eq!(canvas.pixel(3, 3), Some(Rgba([0, 0, 0, 0])));
    }
}
