//! Scan window geometry.
//!
//! The scan window is a centred square inside the viewport. The same
//! rectangle is used for the transparent hole of the dimmed mask and, once
//! converted into the capture device's normalized output space, for the
//! output's rect of interest. Keeping a single source for both guarantees
//! the visible hole always matches the decodable area.
//!
//! Normalized space runs `0..1` on both axes over the full device frame. The
//! preview fills the viewport with aspect-fill, so parts of the frame may be
//! cropped off screen; the conversion accounts for that.

/// A point in viewport units or normalized units, depending on context.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Negative and NaN extents collapse to zero.
    pub fn sanitized(self) -> Self {
        Self {
            width: non_negative(self.width),
            height: non_negative(self.height),
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    /// The `[0,1] x [0,1]` square.
    pub fn unit() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    pub fn min_x(&self) -> f64 {
        self.origin.x
    }

    pub fn min_y(&self) -> f64 {
        self.origin.y
    }

    pub fn max_x(&self) -> f64 {
        self.origin.x + self.size.width
    }

    pub fn max_y(&self) -> f64 {
        self.origin.y + self.size.height
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.origin.x + self.size.width / 2.0,
            self.origin.y + self.size.height / 2.0,
        )
    }

    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.min_x() && p.x <= self.max_x() && p.y >= self.min_y() && p.y <= self.max_y()
    }

    /// Containment with a tolerance for floating point noise.
    pub fn contains_rect(&self, other: &Rect, tolerance: f64) -> bool {
        other.min_x() >= self.min_x() - tolerance
            && other.min_y() >= self.min_y() - tolerance
            && other.max_x() <= self.max_x() + tolerance
            && other.max_y() <= self.max_y() + tolerance
    }

    /// Intersect with `bounds`. Disjoint rectangles collapse to an empty
    /// rectangle on the nearest edge.
    pub fn clamped_to(&self, bounds: &Rect) -> Rect {
        let x0 = self.min_x().clamp(bounds.min_x(), bounds.max_x());
        let y0 = self.min_y().clamp(bounds.min_y(), bounds.max_y());
        let x1 = self.max_x().clamp(bounds.min_x(), bounds.max_x());
        let y1 = self.max_y().clamp(bounds.min_y(), bounds.max_y());
        Rect::new(x0, y0, (x1 - x0).max(0.0), (y1 - y0).max(0.0))
    }

    /// Same rectangle in pixel coordinates of a `width x height` frame.
    /// Only meaningful for normalized rectangles.
    pub fn to_pixels(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let w = f64::from(width);
        let h = f64::from(height);
        let x0 = (self.min_x() * w).floor().clamp(0.0, w);
        let y0 = (self.min_y() * h).floor().clamp(0.0, h);
        let x1 = (self.max_x() * w).ceil().clamp(0.0, w);
        let y1 = (self.max_y() * h).ceil().clamp(0.0, h);
        (x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
    }
}

/// The scan window for one viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionOfInterest {
    viewport: Size,
    hole_side: f64,
    corner_radius: f64,
    rect: Rect,
}

impl RegionOfInterest {
    /// Centre a square of side `hole_side` in `viewport`. A viewport smaller
    /// than the square shrinks it to fit.
    pub fn new(viewport: Size, hole_side: f64, corner_radius: f64) -> Self {
        let viewport = viewport.sanitized();
        let side = non_negative(hole_side)
            .min(viewport.width)
            .min(viewport.height);
        let rect = Rect::new(
            (viewport.width - side) / 2.0,
            (viewport.height - side) / 2.0,
            side,
            side,
        );

        Self {
            viewport,
            hole_side: non_negative(hole_side),
            corner_radius: non_negative(corner_radius),
            rect,
        }
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn hole_side(&self) -> f64 {
        self.hole_side
    }

    pub fn corner_radius(&self) -> f64 {
        self.corner_radius
    }

    /// The scan window in viewport units.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// The scan window in the normalized output space of a device producing
    /// frames of `frame` size.
    pub fn normalized_rect(&self, frame: Size) -> Rect {
        layer_rect_to_normalized(self.viewport, frame, &self.rect)
    }

    /// Centre of the scan window in normalized device coordinates.
    pub fn focus_point(&self, frame: Size) -> Point {
        self.normalized_rect(frame).center()
    }

    /// Geometry of the dimmed overlay whose hole is this region.
    pub fn mask(&self, opacity: f32) -> MaskOverlay {
        MaskOverlay {
            bounds: Rect::new(0.0, 0.0, self.viewport.width, self.viewport.height),
            hole: self.rect,
            corner_radius: self.corner_radius,
            opacity: opacity.clamp(0.0, 1.0),
        }
    }
}

/// Dimmed overlay with a rounded transparent hole (even-odd fill).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskOverlay {
    pub bounds: Rect,
    pub hole: Rect,
    pub corner_radius: f64,
    pub opacity: f32,
}

impl MaskOverlay {
    /// Whether `p` is drawn dimmed: inside the viewport but outside the hole.
    pub fn is_dimmed(&self, p: Point) -> bool {
        self.bounds.contains_point(p) && !self.hole_contains(p)
    }

    fn hole_contains(&self, p: Point) -> bool {
        if !self.hole.contains_point(p) {
            return false;
        }
        let r = self
            .corner_radius
            .min(self.hole.size.width / 2.0)
            .min(self.hole.size.height / 2.0);
        if r <= 0.0 {
            return true;
        }
        // Nearest point on the inner rectangle whose corners are the arc centres.
        let cx = p.x.clamp(self.hole.min_x() + r, self.hole.max_x() - r);
        let cy = p.y.clamp(self.hole.min_y() + r, self.hole.max_y() - r);
        let (dx, dy) = (p.x - cx, p.y - cy);
        dx * dx + dy * dy <= r * r
    }
}

/// Placement of the device frame inside the viewport under aspect-fill:
/// offset of the frame's top-left corner and its displayed size.
fn aspect_fill(viewport: Size, frame: Size) -> Option<(Point, Size)> {
    let viewport = viewport.sanitized();
    if viewport.is_empty() {
        return None;
    }
    let frame = frame.sanitized();
    let frame = if frame.is_empty() { viewport } else { frame };

    let scale = (viewport.width / frame.width).max(viewport.height / frame.height);
    let displayed = Size::new(frame.width * scale, frame.height * scale);
    let offset = Point::new(
        (viewport.width - displayed.width) / 2.0,
        (viewport.height - displayed.height) / 2.0,
    );
    Some((offset, displayed))
}

/// Viewport point to normalized device coordinates (unclamped).
pub fn layer_to_normalized(viewport: Size, frame: Size, p: Point) -> Point {
    match aspect_fill(viewport, frame) {
        Some((offset, displayed)) => Point::new(
            (p.x - offset.x) / displayed.width,
            (p.y - offset.y) / displayed.height,
        ),
        None => Point::new(0.5, 0.5),
    }
}

/// Normalized device coordinates to a viewport point.
pub fn normalized_to_layer(viewport: Size, frame: Size, p: Point) -> Point {
    match aspect_fill(viewport, frame) {
        Some((offset, displayed)) => Point::new(
            offset.x + p.x * displayed.width,
            offset.y + p.y * displayed.height,
        ),
        None => Point::default(),
    }
}

/// Viewport rectangle to normalized device space, clamped to `[0,1]`.
pub fn layer_rect_to_normalized(viewport: Size, frame: Size, rect: &Rect) -> Rect {
    let min = layer_to_normalized(viewport, frame, rect.origin);
    let max = layer_to_normalized(
        viewport,
        frame,
        Point::new(rect.max_x(), rect.max_y()),
    );
    Rect::new(min.x, min.y, max.x - min.x, max.y - min.y).clamped_to(&Rect::unit())
}

/// Normalized device rectangle back to viewport units.
pub fn normalized_rect_to_layer(viewport: Size, frame: Size, rect: &Rect) -> Rect {
    let min = normalized_to_layer(viewport, frame, rect.origin);
    let max = normalized_to_layer(
        viewport,
        frame,
        Point::new(rect.max_x(), rect.max_y()),
    );
    Rect::new(min.x, min.y, max.x - min.x, max.y - min.y)
}

fn non_negative(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.max(0.0) }
}
