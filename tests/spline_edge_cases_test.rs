// Spline interpolation of the measured op-amp transfer curve.
//
// Verify monotonicity, exact control points and flat extrapolation.

use resid_tracker::spline::{MonotoneSpline, Point};

/// Hardware-measured opamp voltage response for 6581 filter.
const OPAMP_VOLTAGE: [(f64, f64); 33] = [
    (0.81, 10.31), // Approximate start of actual range
    (2.40, 10.31),
    (2.60, 10.30),
    (2.70, 10.29),
    (2.80, 10.26),
    (2.90, 10.17),
    (3.00, 10.04),
    (3.10, 9.83),
    (3.20, 9.58),
    (3.30, 9.32),
    (3.50, 8.69),
    (3.70, 8.00),
    (4.00, 6.89),
    (4.40, 5.21),
    (4.54, 4.54), // Working point (vi = vo)
    (4.60, 4.19),
    (4.80, 3.00),
    (4.90, 2.30), // Change of curvature
    (4.95, 2.03),
    (5.00, 1.88),
    (5.05, 1.77),
    (5.10, 1.69),
    (5.20, 1.58),
    (5.40, 1.44),
    (5.60, 1.33),
    (5.80, 1.26),
    (6.00, 1.21),
    (6.40, 1.12),
    (7.00, 1.02),
    (7.50, 0.97),
    (8.50, 0.89),
    (10.00, 0.81),
    (10.31, 0.81), // Approximate end of actual range
];

fn opamp_spline() -> MonotoneSpline {
    let points: Vec<Point> = OPAMP_VOLTAGE.iter().map(|&p| Point::from(p)).collect();
    MonotoneSpline::new(&points)
}

/// Opamp curve must be monotonically decreasing (inverting amplifier behavior).
/// Non-monotonic splines would cause filter instability.
#[test]
fn monotonicity() {
    let spline = opamp_spline();
    let (x_start, x_end) = (OPAMP_VOLTAGE[0].0, OPAMP_VOLTAGE[32].0);

    let mut prev = spline.evaluate(x_start).0;
    let mut x = x_start;
    while x <= x_end {
        let (y, dy) = spline.evaluate(x);
        assert!(y <= prev + 1e-9, "increase at x={}: {} > {}", x, y, prev);
        assert!(dy <= 1e-9, "positive slope at x={}: {}", x, dy);
        prev = y;
        x += 0.001;
    }
}

/// Spline must pass through measured control points to match real hardware.
#[test]
fn control_points() {
    let spline = opamp_spline();
    for &(x, expected) in OPAMP_VOLTAGE.iter() {
        let (y, _) = spline.evaluate(x);
        assert!((y - expected).abs() < 1e-9, "({}, {}) not on spline: {}", x, expected, y);
    }
}

/// Flat end segments extrapolate as constants.
#[test]
fn flat_ends_extrapolate() {
    let spline = opamp_spline();
    assert!((spline.evaluate(0.0).0 - 10.31).abs() < 1e-9);
    assert!((spline.evaluate(12.0).0 - 0.81).abs() < 1e-9);
    assert_eq!(spline.evaluate(12.0).1, 0.0);
}

/// Lookups in random order agree with lookups in ascending order.
#[test]
fn lookup_order_is_irrelevant() {
    let ascending = opamp_spline();
    let shuffled = opamp_spline();
    let xs: Vec<f64> = (0..200).map(|i| 0.81 + f64::from(i) * 0.05).collect();
    let expected: Vec<(f64, f64)> = xs.iter().map(|&x| ascending.evaluate(x)).collect();
    for i in (0..xs.len()).rev().step_by(3).chain((0..xs.len()).step_by(7)) {
        assert_eq!(shuffled.evaluate(xs[i]), expected[i]);
    }
}
