// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

// External filter circuit component values.
// The C64 audio output stage uses two STC networks:
//
// 1. Low-pass RC filter: R = 10kOhm, C = 1000pF
//    Cutoff = 1/(2*PI*RC) = 15.9kHz
//
// 2. High-pass (DC blocker): R = 10kOhm, C = 10uF
//    Cutoff = 1/(2*PI*RC) = 1.6Hz
//    (assumes 10kOhm audio equipment input impedance)
//
// A BJT voltage follower (2SC1815) connects these stages but its
// effect requires MHz-level sampling to model accurately.
const R_LP: f64 = 10e3;
const C_LP: f64 = 1000e-12;
const R_HP: f64 = 10e3;
const C_HP: f64 = 10e-6;

/// Default clock frequency (PAL C64)
const DEFAULT_CLOCK_FREQ: f64 = 985248.0;

/// C64 audio output stage filter.
///
/// Takes the 16 bit unsigned filter output, removes its midpoint and returns
/// a signed sample. Models a ~16kHz low-pass followed by a ~1.6Hz high-pass.
#[derive(Clone, Copy, Debug)]
pub struct ExternalFilter {
    /// Low-pass coefficient, scaled by 2^7.
    w0lp_1_s7: i32,
    /// High-pass coefficient, scaled by 2^17.
    w0hp_1_s17: i32,
    vlp: i32,
    vhp: i32,
}

impl Default for ExternalFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// First order IIR coefficient, `dt / (dt + RC)`.
#[inline]
fn rate(frequency: f64, resistance: f64, capacitance: f64) -> f64 {
    let dt = 1.0 / frequency;
    dt / (dt + resistance * capacitance)
}

impl ExternalFilter {
    pub fn new() -> Self {
        let mut filter = Self {
            w0lp_1_s7: 0,
            w0hp_1_s17: 0,
            vlp: 0,
            vhp: 0,
        };
        filter.set_clock_frequency(DEFAULT_CLOCK_FREQ);
        filter
    }

    /// Recalculates the coefficients for a new clock frequency.
    pub fn set_clock_frequency(&mut self, frequency: f64) {
        self.w0lp_1_s7 = (rate(frequency, R_LP, C_LP) * f64::from(1 << 7) + 0.5) as i32;
        self.w0hp_1_s17 = (rate(frequency, R_HP, C_HP) * f64::from(1 << 17) + 0.5) as i32;
    }

    #[inline]
    pub fn clock(&mut self, input: u16) -> i32 {
        let vi = (i32::from(input) << 11) - (1 << 26);
        let dvlp = ((i64::from(self.w0lp_1_s7) * i64::from(vi - self.vlp)) >> 7) as i32;
        let dvhp = ((i64::from(self.w0hp_1_s17) * i64::from(self.vlp - self.vhp)) >> 17) as i32;
        self.vlp += dvlp;
        self.vhp += dvhp;
        (self.vlp - self.vhp) >> 11
    }

    pub fn reset(&mut self) {
        self.vlp = 0;
        self.vhp = 0;
    }
}
