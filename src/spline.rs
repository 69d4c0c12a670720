// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Fritsch-Carlson monotone cubic spline interpolation.
//!
//! Used at table-build time to model the measured op-amp transfer curves of
//! both chip models. Evaluation returns the interpolated value together with
//! its first derivative, which the op-amp solver needs for Newton steps.

use alloc::vec::Vec;
use core::cell::Cell;

/// A 2D point for spline interpolation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    /// Abscissa.
    pub x: f64,
    /// Ordinate.
    pub y: f64,
}

impl Point {
    /// Shorthand constructor.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Cubic polynomial coefficients for one spline segment.
#[derive(Clone, Copy, Debug)]
struct Segment {
    x1: f64,
    x2: f64,
    a: f64,
    b: f64,
    c: f64,
    d: f64,
}

/// Monotone cubic spline interpolator.
///
/// The last segment extends to `f64::MAX`, so values past the final input
/// point extrapolate along the last cubic. Values below the first point use
/// the first cubic.
#[derive(Clone, Debug)]
pub struct MonotoneSpline {
    segments: Vec<Segment>,
    /// Index of the segment hit by the previous lookup.
    current: Cell<usize>,
}

impl MonotoneSpline {
    /// Constructs a monotone cubic spline from input points.
    ///
    /// Points must be sorted by x coordinate in ascending order and there
    /// must be at least three of them.
    pub fn new(input: &[Point]) -> Self {
        debug_assert!(input.len() > 2, "spline requires at least 3 points");

        let n = input.len() - 1;
        let dxs: Vec<f64> = (0..n).map(|i| input[i + 1].x - input[i].x).collect();
        let ms: Vec<f64> = (0..n)
            .map(|i| (input[i + 1].y - input[i].y) / dxs[i])
            .collect();

        // Tangents: zero at extrema, weighted harmonic mean elsewhere.
        let mut cs = Vec::with_capacity(n + 1);
        cs.push(ms[0]);
        for i in 1..n {
            let m = ms[i - 1];
            let m_next = ms[i];
            if m * m_next <= 0.0 {
                cs.push(0.0);
            } else {
                let dx = dxs[i - 1];
                let dx_next = dxs[i];
                let common = dx + dx_next;
                cs.push(3.0 * common / ((common + dx_next) / m + (common + dx) / m_next));
            }
        }
        cs.push(ms[n - 1]);

        let segments = (0..n)
            .map(|i| {
                let c1 = cs[i];
                let m = ms[i];
                let inv_dx = 1.0 / dxs[i];
                let common = c1 + cs[i + 1] - m - m;
                Segment {
                    x1: input[i].x,
                    x2: if i == n - 1 { f64::MAX } else { input[i + 1].x },
                    a: common * inv_dx * inv_dx,
                    b: (m - c1 - common) * inv_dx,
                    c: c1,
                    d: input[i].y,
                }
            })
            .collect();

        MonotoneSpline {
            segments,
            current: Cell::new(0),
        }
    }

    /// Evaluates the spline at x, returning `(y, dy/dx)`.
    pub fn evaluate(&self, x: f64) -> (f64, f64) {
        let mut index = self.current.get();
        let cached = &self.segments[index];
        if x < cached.x1 || x > cached.x2 {
            index = self
                .segments
                .iter()
                .position(|s| x <= s.x2)
                .unwrap_or(self.segments.len() - 1);
            self.current.set(index);
        }
        let seg = &self.segments[index];

        let diff = x - seg.x1;
        let y = ((seg.a * diff + seg.b) * diff + seg.c) * diff + seg.d;
        let dy = (3.0 * seg.a * diff + 2.0 * seg.b) * diff + seg.c;
        (y, dy)
    }
}
