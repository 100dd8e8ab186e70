//! 2D drawing surface with a canvas-style transform stack.

mod raster;

use std::ops::{Deref, DerefMut};

use image::{Rgb, RgbImage, Rgba, RgbaImage};

use crate::pose::Position;

pub use raster::RasterCanvas;

/// Radius of keypoint dots.
pub const POINT_RADIUS: f32 = 5.0;
/// Default stroke width for polylines.
pub const LINE_WIDTH: f32 = 1.0;
/// rgba(255, 0, 0, 0.8)
pub const HIGHLIGHT: Rgba<u8> = Rgba([255, 0, 0, 204]);

/// 2D affine matrix in canvas order: `x' = a*x + c*y + e`, `y' = b*x + d*y + f`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine2 {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Affine2 {
    pub const IDENTITY: Affine2 = Affine2 {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    /// `self × other`: `other` is applied to points first.
    pub fn multiply(&self, other: &Affine2) -> Affine2 {
        Affine2 {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    pub fn translation(dx: f32, dy: f32) -> Affine2 {
        Affine2 {
            e: dx,
            f: dy,
            ..Affine2::IDENTITY
        }
    }

    pub fn rotation(radians: f32) -> Affine2 {
        let (sin, cos) = radians.sin_cos();
        Affine2 {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            e: 0.0,
            f: 0.0,
        }
    }

    pub fn scaling(sx: f32, sy: f32) -> Affine2 {
        Affine2 {
            a: sx,
            d: sy,
            ..Affine2::IDENTITY
        }
    }

    pub fn apply(&self, p: Position) -> Position {
        Position::new(
            self.a * p.x + self.c * p.y + self.e,
            self.b * p.x + self.d * p.y + self.f,
        )
    }

    pub fn determinant(&self) -> f32 {
        self.a * self.d - self.b * self.c
    }

    pub fn inverse(&self) -> Option<Affine2> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        Some(Affine2 {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            e: (self.c * self.f - self.d * self.e) / det,
            f: (self.b * self.e - self.a * self.f) / det,
        })
    }

    pub fn is_finite(&self) -> bool {
        [self.a, self.b, self.c, self.d, self.e, self.f]
            .iter()
            .all(|v| v.is_finite())
    }
}

impl Default for Affine2 {
    fn default() -> Self {
        Affine2::IDENTITY
    }
}

/// Drawing context the renderer targets.
///
/// Shapes and images pass through the current transform. `save`/`restore`
/// push and pop that transform; `restore` with nothing saved does nothing.
pub trait DrawingSurface {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Reset every pixel to the background.
    fn clear(&mut self);

    /// Copy a video frame over the whole surface, ignoring the transform.
    fn draw_video(&mut self, frame: &RgbImage);

    fn fill_circle(&mut self, center: Position, radius: f32, color: Rgba<u8>);
    fn stroke_polyline(&mut self, points: &[Position], color: Rgba<u8>, line_width: f32);

    /// Draw `image` stretched into the rectangle at (`x`, `y`) of the given size.
    fn draw_image(&mut self, image: &RgbaImage, x: f32, y: f32, width: f32, height: f32);

    fn save(&mut self);
    fn restore(&mut self);
    fn translate(&mut self, dx: f32, dy: f32);
    fn rotate(&mut self, radians: f32);
    fn scale(&mut self, sx: f32, sy: f32);
    fn transform(&self) -> Affine2;
}

/// Saves the surface state on creation and restores it when dropped.
pub struct SavedState<'a, S: DrawingSurface + ?Sized> {
    surface: &'a mut S,
}

impl<'a, S: DrawingSurface + ?Sized> SavedState<'a, S> {
    pub fn new(surface: &'a mut S) -> Self {
        surface.save();
        Self { surface }
    }
}

impl<S: DrawingSurface + ?Sized> Deref for SavedState<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.surface
    }
}

impl<S: DrawingSurface + ?Sized> DerefMut for SavedState<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.surface
    }
}

impl<S: DrawingSurface + ?Sized> Drop for SavedState<'_, S> {
    fn drop(&mut self) {
        self.surface.restore();
    }
}

/// Filled dot at `position`.
pub fn draw_point<S: DrawingSurface + ?Sized>(surface: &mut S, position: Position) {
    surface.fill_circle(position, POINT_RADIUS, HIGHLIGHT);
}

/// Open polyline through `points`. Fewer than two points draw nothing.
pub fn draw_polyline<S: DrawingSurface + ?Sized>(surface: &mut S, points: &[Position]) {
    if points.len() < 2 {
        return;
    }
    surface.stroke_polyline(points, HIGHLIGHT, LINE_WIDTH);
}

/// Pack an RGB pixel as `0x00RRGGBB`.
pub fn pack_rgb(pixel: Rgb<u8>) -> u32 {
    let [r, g, b] = pixel.0;
    ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn close(a: Position, b: Position) -> bool {
        (a.x - b.x).abs() < 1e-4 && (a.y - b.y).abs() < 1e-4
    }

    #[test]
    fn composes_in_canvas_order() {
        // translate, then scale, then rotate: points are rotated first.
        let m = Affine2::translation(10.0, 20.0)
            .multiply(&Affine2::scaling(2.0, 2.0))
            .multiply(&Affine2::rotation(FRAC_PI_2));
        let p = m.apply(Position::new(1.0, 0.0));
        assert!(close(p, Position::new(10.0, 22.0)));
    }

    #[test]
    fn inverse_round_trips_points() {
        let m = Affine2::translation(5.0, -3.0).multiply(&Affine2::rotation(0.7));
        let inv = m.inverse().unwrap();
        let p = Position::new(12.5, -4.0);
        assert!(close(inv.apply(m.apply(p)), p));
        assert!(Affine2::scaling(0.0, 1.0).inverse().is_none());
    }

    #[test]
    fn saved_state_restores_on_drop() {
        let mut canvas = RasterCanvas::new(10, 10);
        {
            let mut guard = SavedState::new(&mut canvas);
            guard.translate(3.0, 4.0);
            guard.rotate(1.0);
            assert_ne!(guard.transform(), Affine2::IDENTITY);
        }
        assert_eq!(canvas.transform(), Affine2::IDENTITY);
    }

    #[test]
    fn packs_rgb() {
        assert_eq!(pack_rgb(Rgb([0x12, 0x34, 0x56])), 0x123456);
    }
}
