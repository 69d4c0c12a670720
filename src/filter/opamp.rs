// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Op-amp equation solver.
//!
//! Finds the output voltage of an inverting op-amp with gain `n` by solving
//!
//! ```text
//! (n + 1) * (Vddt - vx)^2 = n * (Vddt - vi)^2 + (Vddt - vo)^2
//! ```
//!
//! where `vo = f(vx)` is the measured transfer curve. Newton-Raphson is used,
//! falling back to bisection whenever a step leaves the current bracket.

use crate::spline::{MonotoneSpline, Point};

const EPSILON: f64 = 1e-8;

#[derive(Clone, Debug)]
pub struct OpAmp {
    spline: MonotoneSpline,
    vddt: f64,
    vmin: f64,
    vmax: f64,
    /// Last solution, used as starting point for the next solve.
    x: f64,
}

impl OpAmp {
    /// Creates a solver from the raw voltage transfer points and `Vdd - Vth`.
    pub fn new(opamp: &[Point], vddt: f64) -> Self {
        let vmin = opamp[0].x;
        let vmax = opamp[opamp.len() - 1].x;
        OpAmp {
            spline: MonotoneSpline::new(opamp),
            vddt,
            vmin,
            vmax,
            x: vmin,
        }
    }

    /// Restarts the iteration from the bottom of the curve.
    pub fn reset(&mut self) {
        self.x = self.vmin;
    }

    /// Solves the op-amp equation for gain `n` and input voltage `vi`.
    ///
    /// Consecutive calls with slowly varying input converge in a few steps
    /// since the previous solution is kept as the starting point.
    pub fn solve(&mut self, n: f64, vi: f64) -> f64 {
        let mut ak = self.vmin;
        let mut bk = self.vmax;

        let a = n + 1.0;
        let b = self.vddt;
        let b_vi = if b > vi { b - vi } else { 0.0 };
        let c = n * (b_vi * b_vi);

        loop {
            let xk = self.x;

            let (vo, dvo) = self.spline.evaluate(self.x);

            let b_vx = if b > self.x { b - self.x } else { 0.0 };
            let b_vo = if b > vo { b - vo } else { 0.0 };

            let f = a * (b_vx * b_vx) - c - (b_vo * b_vo);
            let df = 2.0 * (b_vo * dvo - a * b_vx);

            self.x -= f / df;
            if libm::fabs(self.x - xk) < EPSILON {
                return self.spline.evaluate(self.x).0;
            }

            if f < 0.0 {
                bk = xk;
            } else {
                ak = xk;
            }

            if self.x <= ak || self.x >= bk {
                self.x = (ak + bk) * 0.5;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::config::OPAMP_VOLTAGE_6581;
    use alloc::vec::Vec;

    fn opamp_6581() -> OpAmp {
        let points: Vec<Point> = OPAMP_VOLTAGE_6581.iter().map(|&p| Point::from(p)).collect();
        OpAmp::new(&points, 12.18 - 1.31)
    }

    /// Unity gain inverting stage has its fixed point at the working point.
    #[test]
    fn unity_gain_crosses_working_point() {
        let mut opamp = opamp_6581();
        let vo = opamp.solve(1.0, 4.54);
        assert!((vo - 4.54).abs() < 0.05, "vo = {}", vo);
    }

    #[test]
    fn output_stays_within_curve() {
        let mut opamp = opamp_6581();
        let mut vi = 0.81;
        while vi < 10.31 {
            let vo = opamp.solve(2.0, vi);
            assert!(vo > 0.7 && vo < 10.4, "vi = {}: vo = {}", vi, vo);
            vi += 0.25;
        }
    }

    /// The stage inverts, so a rising input gives a falling output.
    #[test]
    fn output_is_decreasing() {
        let mut opamp = opamp_6581();
        let mut prev = f64::MAX;
        let mut vi = 3.0;
        while vi < 6.0 {
            let vo = opamp.solve(1.0, vi);
            assert!(vo <= prev + 1e-9, "vi = {}: {} > {}", vi, vo, prev);
            prev = vo;
            vi += 0.05;
        }
    }

    #[test]
    fn reset_does_not_change_solution() {
        let mut warm = opamp_6581();
        warm.solve(3.0, 2.0);
        let a = warm.solve(3.0, 5.0);
        let mut cold = opamp_6581();
        cold.reset();
        let b = cold.solve(3.0, 5.0);
        assert!((a - b).abs() < 1e-6, "{} vs {}", a, b);
    }
}
