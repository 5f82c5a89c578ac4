use std::f64::consts::PI;

/// Equal-moment ellipse of a shape, in pixel units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    pub center: [f64; 2],
    /// Full major axis length
    pub major_axis: f64,
    /// Full minor axis length
    pub minor_axis: f64,
    /// Major axis angle in radians, clockwise from +x in image coordinates,
    /// normalised to (-π/2, π/2]
    pub angle: f64,
}

impl Ellipse {
    /// Ellipse with the same second central moments (normalised by area)
    pub fn from_central_moments(center: [f64; 2], mu20: f64, mu02: f64, mu11: f64) -> Option<Self> {
        let half_sum = (mu20 + mu02) / 2.0;
        let spread = (((mu20 - mu02) / 2.0).powi(2) + mu11 * mu11).sqrt();
        let (l1, l2) = (half_sum + spread, half_sum - spread);
        if !l1.is_finite() || !l2.is_finite() || l2 <= 0.0 {
            return None;
        }

        let mut angle = 0.5 * (2.0 * mu11).atan2(mu20 - mu02);
        if angle <= -PI / 2.0 {
            angle += PI;
        }
        Some(Self {
            center,
            major_axis: 4.0 * l1.sqrt(),
            minor_axis: 4.0 * l2.sqrt(),
            angle,
        })
    }

    /// Moments of a set of unit pixels
    pub fn from_pixels(pixels: impl IntoIterator<Item = [i64; 2]>) -> Option<Self> {
        let (mut n, mut sx, mut sy) = (0usize, 0.0f64, 0.0f64);
        let (mut sxx, mut syy, mut sxy) = (0.0f64, 0.0f64, 0.0f64);
        let mut origin: Option<[f64; 2]> = None;
        for [x, y] in pixels {
            let o = *origin.get_or_insert([x as f64, y as f64]);
            let (dx, dy) = (x as f64 - o[0], y as f64 - o[1]);
            n += 1;
            sx += dx;
            sy += dy;
            sxx += dx * dx;
            syy += dy * dy;
            sxy += dx * dy;
        }
        let o = origin?;
        let n = n as f64;
        let (cx, cy) = (sx / n, sy / n);
        // Each pixel is a unit square, which adds 1/12 of variance per axis
        let mu20 = sxx / n - cx * cx + 1.0 / 12.0;
        let mu02 = syy / n - cy * cy + 1.0 / 12.0;
        let mu11 = sxy / n - cx * cy;
        Self::from_central_moments([cx + o[0], cy + o[1]], mu20, mu02, mu11)
    }

    /// Moments of the region enclosed by a closed polygon (Green's theorem)
    pub fn from_polygon(points: &[[f64; 2]]) -> Option<Self> {
        let o = *points.first()?;
        let (mut a, mut cx, mut cy) = (0.0f64, 0.0f64, 0.0f64);
        let (mut ixx, mut iyy, mut ixy) = (0.0f64, 0.0f64, 0.0f64);
        for (i, p) in points.iter().enumerate() {
            let q = points[(i + 1) % points.len()];
            let (x0, y0) = (p[0] - o[0], p[1] - o[1]);
            let (x1, y1) = (q[0] - o[0], q[1] - o[1]);
            let cross = x0 * y1 - x1 * y0;
            a += cross;
            cx += (x0 + x1) * cross;
            cy += (y0 + y1) * cross;
            ixx += (x0 * x0 + x0 * x1 + x1 * x1) * cross;
            iyy += (y0 * y0 + y0 * y1 + y1 * y1) * cross;
            ixy += (x0 * y1 + 2.0 * x0 * y0 + 2.0 * x1 * y1 + x1 * y0) * cross;
        }
        a /= 2.0;
        if a.abs() < 1e-9 {
            return None;
        }
        cx /= 6.0 * a;
        cy /= 6.0 * a;
        // Orientation-independent once divided by the signed area
        let mu20 = ixx / (12.0 * a) - cx * cx;
        let mu02 = iyy / (12.0 * a) - cy * cy;
        let mu11 = ixy / (24.0 * a) - cx * cy;
        Self::from_central_moments([cx + o[0], cy + o[1]], mu20, mu02, mu11)
    }

    /// Grow both full axes by `px`
    pub fn widened(self, px: f64) -> Self {
        Self {
            major_axis: self.major_axis + px,
            minor_axis: self.minor_axis + px,
            ..self
        }
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.major_axis / self.minor_axis
    }

    /// π · semi-major · semi-minor
    pub fn area(&self) -> f64 {
        PI * (self.major_axis / 2.0) * (self.minor_axis / 2.0)
    }

    /// `n` points evenly spaced in parameter around the ellipse
    pub fn sample_boundary(&self, n: usize) -> Vec<[f64; 2]> {
        let (a, b) = (self.major_axis / 2.0, self.minor_axis / 2.0);
        let (sin, cos) = self.angle.sin_cos();
        (0..n)
            .map(|i| {
                let t = 2.0 * PI * i as f64 / n as f64;
                let (u, v) = (a * t.cos(), b * t.sin());
                [self.center[0] + u * cos - v * sin, self.center[1] + u * sin + v * cos]
            })
            .collect()
    }
}
