//! Coordinate mapping between two views of the same page
//!
//! A view's origin is the top-left of its visible region, in pixels of that
//! view's *current* resolution. Moving a point to another view normalizes it
//! to a page fraction and rescales by the target's page size and resolution.

use crate::error::ViewError;
use crate::raster::{Point, RasterBuffer};

/// Native page size, i.e. pixels at resolution 1
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

/// Where a view looks and at which resolution
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewGeometry {
    pub origin_x: f64,
    pub origin_y: f64,
    pub resolution: f64,
    /// Unknown until the view completed its first production
    pub base: Option<PageSize>,
}

impl ViewGeometry {
    pub fn new(resolution: f64) -> Result<Self, ViewError> {
        check_resolution(resolution)?;
        Ok(Self {
            origin_x: 0.0,
            origin_y: 0.0,
            resolution,
            base: None,
        })
    }

    #[must_use]
    pub fn origin(&self) -> Point {
        Point::new(self.origin_x, self.origin_y)
    }

    pub fn reset_origin(&mut self) {
        self.origin_x = 0.0;
        self.origin_y = 0.0;
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.base.is_some()
    }

    /// Learn the page size from a completed raster
    pub fn adopt_page_size(&mut self, raster: &RasterBuffer) {
        let (width, height) = raster.base_size();
        self.base = Some(PageSize { width, height });
    }

    fn page_size(&self) -> Result<PageSize, ViewError> {
        self.base.ok_or(ViewError::NotReady)
    }
}

/// Rectangle in some view's pixel space, used for the zoom box
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl OverlayRect {
    /// Both sides strictly positive
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// Resolutions travel to the rasterizer as `f32`, so they must survive
/// the narrowing as well
fn check_resolution(resolution: f64) -> Result<(), ViewError> {
    let narrowed = resolution as f32;
    if resolution.is_finite() && resolution > 0.0 && narrowed.is_finite() && narrowed > 0.0 {
        Ok(())
    } else {
        Err(ViewError::invalid("resolution", resolution))
    }
}

/// Convert `point` from `from`'s pixel space into `to`'s pixel space
pub fn map_point_to_other_resolution(
    point: Point,
    from: &ViewGeometry,
    to: &ViewGeometry,
) -> Result<Point, ViewError> {
    let from_base = from.page_size()?;
    let to_base = to.page_size()?;
    Ok(Point::new(
        point.x / from_base.width / from.resolution * to_base.width * to.resolution,
        point.y / from_base.height / from.resolution * to_base.height * to.resolution,
    ))
}

/// Pan: move the origin back by `(dx, dy)`
pub fn translate(geometry: &mut ViewGeometry, dx: f64, dy: f64) {
    geometry.origin_x -= dx;
    geometry.origin_y -= dy;
}

/// Switch resolution, keeping the page fraction at the origin in place
pub fn zoom_to_resolution(geometry: &mut ViewGeometry, resolution: f64) -> Result<(), ViewError> {
    check_resolution(resolution)?;
    let ratio = resolution / geometry.resolution;
    geometry.origin_x *= ratio;
    geometry.origin_y *= ratio;
    geometry.resolution = resolution;
    Ok(())
}

/// Multiply the resolution by `factor`
pub fn zoom_in(geometry: &mut ViewGeometry, factor: f64) -> Result<(), ViewError> {
    if !(factor.is_finite() && factor > 1.0) {
        return Err(ViewError::invalid("zoom factor", factor));
    }
    zoom_to_resolution(geometry, geometry.resolution * factor)
}

/// Divide the resolution by `factor`
pub fn zoom_out(geometry: &mut ViewGeometry, factor: f64) -> Result<(), ViewError> {
    if !(factor.is_finite() && factor > 1.0) {
        return Err(ViewError::invalid("zoom factor", factor));
    }
    zoom_to_resolution(geometry, geometry.resolution / factor)
}

/// The part of the page a `viewport_width` x `viewport_height` window on
/// `geometry` shows, expressed in `other`'s pixel space.
pub fn visible_region_rect(
    geometry: &ViewGeometry,
    other: &ViewGeometry,
    viewport_width: f64,
    viewport_height: f64,
) -> Result<OverlayRect, ViewError> {
    let origin = map_point_to_other_resolution(geometry.origin(), geometry, other)?;
    let ratio = other.resolution / geometry.resolution;
    Ok(OverlayRect {
        x: origin.x,
        y: origin.y,
        width: viewport_width * ratio,
        height: viewport_height * ratio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn geometry(resolution: f64) -> ViewGeometry {
        let mut geometry = ViewGeometry::new(resolution).unwrap();
        geometry.base = Some(PageSize {
            width: 8.5,
            height: 11.0,
        });
        geometry
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < EPS, "{a} != {b}");
    }

    #[test]
    fn maps_by_resolution_ratio() {
        let overview = geometry(72.0);
        let detail = geometry(288.0);
        let mapped =
            map_point_to_other_resolution(Point::new(10.0, 25.0), &overview, &detail).unwrap();
        assert_close(mapped.x, 40.0);
        assert_close(mapped.y, 100.0);
    }

    #[test]
    fn mapping_accounts_for_differing_page_sizes() {
        let from = geometry(100.0);
        let mut to = geometry(100.0);
        to.base = Some(PageSize {
            width: 17.0,
            height: 11.0,
        });
        let mapped = map_point_to_other_resolution(Point::new(85.0, 0.0), &from, &to).unwrap();
        assert_close(mapped.x, 170.0);
    }

    #[test]
    fn mapping_round_trips() {
        for (r1, r2) in [(72.0, 288.0), (50.0, 75.5), (600.0, 1.5)] {
            let g1 = geometry(r1);
            let g2 = geometry(r2);
            for p in [Point::new(0.0, 0.0), Point::new(13.25, -7.0), Point::new(612.0, 792.0)] {
                let there = map_point_to_other_resolution(p, &g1, &g2).unwrap();
                let back = map_point_to_other_resolution(there, &g2, &g1).unwrap();
                assert_close(back.x, p.x);
                assert_close(back.y, p.y);
            }
        }
    }

    #[test]
    fn mapping_before_first_production_is_not_ready() {
        let ready = geometry(72.0);
        let fresh = ViewGeometry::new(288.0).unwrap();
        assert_eq!(
            map_point_to_other_resolution(Point::default(), &ready, &fresh),
            Err(ViewError::NotReady)
        );
        assert_eq!(
            visible_region_rect(&fresh, &ready, 10.0, 10.0),
            Err(ViewError::NotReady)
        );
    }

    #[test]
    fn translate_subtracts_delta() {
        let mut g = geometry(72.0);
        translate(&mut g, 10.0, -4.0);
        assert_eq!(g.origin(), Point::new(-10.0, 4.0));
    }

    #[test]
    fn zoom_scales_origin_and_restores() {
        let mut g = geometry(100.0);
        g.origin_x = 30.0;
        g.origin_y = -12.0;
        zoom_to_resolution(&mut g, 250.0).unwrap();
        assert_close(g.origin_x, 75.0);
        assert_close(g.origin_y, -30.0);
        zoom_to_resolution(&mut g, 100.0).unwrap();
        assert_close(g.origin_x, 30.0);
        assert_close(g.origin_y, -12.0);
    }

    #[test]
    fn invalid_zoom_changes_nothing() {
        let mut g = geometry(100.0);
        g.origin_x = 5.0;
        let before = g;
        assert!(zoom_to_resolution(&mut g, 0.0).is_err());
        assert!(zoom_to_resolution(&mut g, f64::NAN).is_err());
        assert!(zoom_in(&mut g, 1.0).is_err());
        assert_eq!(g, before);
    }

    #[test]
    fn zoom_steps_use_factor() {
        let mut g = geometry(100.0);
        zoom_in(&mut g, 2.0).unwrap();
        assert_close(g.resolution, 200.0);
        zoom_out(&mut g, 4.0).unwrap();
        assert_close(g.resolution, 50.0);
    }

    #[test]
    fn overlay_is_viewport_scaled_by_resolution_ratio() {
        let overview = geometry(72.0);
        let mut detail = geometry(288.0);
        detail.origin_x = 40.0;
        detail.origin_y = 80.0;
        let rect = visible_region_rect(&detail, &overview, 200.0, 200.0).unwrap();
        assert_close(rect.x, 10.0);
        assert_close(rect.y, 20.0);
        assert_close(rect.width, 50.0);
        assert_close(rect.height, 50.0);
        assert!(!rect.is_degenerate());
    }

    #[test]
    fn geometry_rejects_bad_resolution() {
        assert!(ViewGeometry::new(0.0).is_err());
        assert!(ViewGeometry::new(-72.0).is_err());
    }

    #[test]
    fn resolution_must_fit_in_f32() {
        assert!(ViewGeometry::new(1e-50).is_err());
        assert!(ViewGeometry::new(1e40).is_err());

        let mut g = geometry(288.0);
        g.origin_x = 12.0;
        let before = g;
        assert!(zoom_to_resolution(&mut g, 1e-50).is_err());
        assert!(zoom_to_resolution(&mut g, 1e40).is_err());
        assert_eq!(g, before);

        let mut huge = geometry(1e38);
        assert!(zoom_in(&mut huge, 10.0).is_err());
        assert_close(huge.resolution, 1e38);
    }
}
