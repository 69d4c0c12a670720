// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Kaiser-windowed sinc resampling.
//!
//! A single pass converts one rate to another with a FIR filter table of
//! several phases, interpolating linearly between adjacent phases. Two
//! passes are chained through an intermediate frequency which keeps both
//! filters short.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use core::f64::consts::PI;

use super::{soft_clip, Resampler};

const RING_SIZE: usize = 2048;
const RING_MASK: usize = RING_SIZE - 1;

const FIXP_SHIFT: i32 = 10;
const FIXP_SCALE: i32 = 1 << FIXP_SHIFT;
const FIXP_MASK: i32 = FIXP_SCALE - 1;

/// Compute the 0th order modified Bessel function of the first kind.
fn i0(x: f64) -> f64 {
    const I0E: f64 = 1e-6;
    let halfx = x / 2.0;
    let mut sum = 1.0;
    let mut u = 1.0;
    let mut n = 1;
    loop {
        let temp = halfx / f64::from(n);
        n += 1;
        u *= temp * temp;
        sum += u;
        if u < I0E * sum {
            break;
        }
    }
    sum
}

#[derive(Clone, Debug)]
struct Fir {
    data: Vec<i16>,
    n: usize,
    res: i32,
}

impl Fir {
    /// Designs the filter for one conversion.
    ///
    /// `highest_accurate_frequency` sets the end of the passband.
    fn new(input_freq: f64, output_freq: f64, highest_accurate_frequency: f64) -> Self {
        let cycles_per_sample = input_freq / output_freq;
        let samples_per_cycle = output_freq / input_freq;

        // 16 bits -> -96dB stopband attenuation.
        let atten = -20.0 * libm::log10(1.0 / f64::from(1 << 16));
        // Transition band, doubled since the filter transitions at Nyquist.
        let dw = (1.0 - 2.0 * highest_accurate_frequency / output_freq) * PI * 2.0;

        // For calculation of beta and N see the reference for the kaiserord
        // function in the MATLAB Signal Processing Toolbox.
        let beta = 0.1102 * (atten - 8.7);
        let i0_beta = i0(beta);

        // The filter order is the number of zero crossings and must be even.
        let mut order = ((atten - 7.95) / (2.285 * dw) + 0.5) as usize;
        order += order & 1;

        // The filter length is odd, sinc is symmetric about x = 0.
        let n = ((order as f64 * cycles_per_sample) as usize + 1) | 1;

        // The interpolation error is bounded by 1.234/L^2.
        let res = libm::ceil(libm::sqrt(1.234 * f64::from(1 << 16)) * samples_per_cycle) as i32;
        let res = res.max(1);

        let mut data = vec![0i16; n * res as usize];
        let half = (n / 2) as f64;
        let scale = 32768.0 * samples_per_cycle;

        for phase in 0..res as usize {
            let phase_offset = phase as f64 / f64::from(res) + half;
            for tap in 0..n {
                let x = tap as f64 - phase_offset;
                let pos = x / half;
                let kaiser = if libm::fabs(pos) < 1.0 {
                    i0(beta * libm::sqrt(1.0 - pos * pos)) / i0_beta
                } else {
                    0.0
                };
                let wt = x * samples_per_cycle * PI;
                let sinc = if libm::fabs(wt) >= 1e-8 {
                    libm::sin(wt) / wt
                } else {
                    1.0
                };
                data[phase * n + tap] = (scale * sinc * kaiser) as i16;
            }
        }

        Fir { data, n, res }
    }
}

/// Single-pass sinc resampler.
#[derive(Clone, Debug)]
pub struct SincResampler {
    fir: Fir,
    /// Ring buffer, duplicated so a window never wraps.
    sample: Box<[i32]>,
    index: usize,
    sample_offset: i32,
    cycles_per_sample: i32,
    output_value: i32,
}

impl SincResampler {
    pub fn new(input_freq: f64, output_freq: f64, highest_accurate_frequency: f64) -> Self {
        SincResampler {
            fir: Fir::new(input_freq, output_freq, highest_accurate_frequency),
            sample: vec![0; RING_SIZE * 2].into_boxed_slice(),
            index: 0,
            sample_offset: 0,
            cycles_per_sample: (input_freq / output_freq * f64::from(FIXP_SCALE)) as i32,
            output_value: 0,
        }
    }

    /// Filter length in taps.
    pub fn filter_length(&self) -> usize {
        self.fir.n
    }

    /// Unclipped output of the last conversion.
    #[inline]
    pub fn raw_output(&self) -> i32 {
        self.output_value
    }

    #[inline]
    fn input_sample(&mut self, input: i32) -> bool {
        self.sample[self.index] = input;
        self.sample[self.index + RING_SIZE] = input;
        self.index = (self.index + 1) & RING_MASK;

        let mut ready = false;
        if self.sample_offset < FIXP_SCALE {
            self.output_value = self.fir_convolve(self.sample_offset);
            ready = true;
            self.sample_offset += self.cycles_per_sample;
        }
        self.sample_offset -= FIXP_SCALE;
        ready
    }

    /// Convolution with linear interpolation between adjacent filter phases.
    fn fir_convolve(&self, subcycle: i32) -> i32 {
        let fir = &self.fir;
        let mut table = (subcycle * fir.res) >> FIXP_SHIFT;
        let frac = (subcycle * fir.res) & FIXP_MASK;

        let mut start = self.index + RING_SIZE - fir.n;
        let v1 = dot(&self.sample[start..start + fir.n], &fir.data[table as usize * fir.n..]);

        // Next phase; wrapping to the first phase shifts the sample window.
        table += 1;
        if table == fir.res {
            table = 0;
            start += 1;
        }
        let v2 = dot(&self.sample[start..start + fir.n], &fir.data[table as usize * fir.n..]);

        v1 + ((frac * (v2 - v1)) >> FIXP_SHIFT)
    }

    fn clear(&mut self) {
        self.sample.fill(0);
        self.index = 0;
        self.sample_offset = 0;
        self.output_value = 0;
    }
}

#[inline]
fn dot(samples: &[i32], coeffs: &[i16]) -> i32 {
    let acc: i64 = samples
        .iter()
        .zip(coeffs)
        .map(|(&s, &c)| i64::from(s) * i64::from(c))
        .sum();
    ((acc + (1 << 14)) >> 15) as i32
}

impl Resampler for SincResampler {
    #[inline]
    fn input(&mut self, sample: i32) -> bool {
        self.input_sample(sample)
    }

    #[inline]
    fn output(&self) -> i16 {
        soft_clip(self.output_value)
    }

    fn reset(&mut self) {
        self.clear();
    }
}

/// Two chained sinc passes through an intermediate frequency.
#[derive(Clone, Debug)]
pub struct TwoPassSincResampler {
    s1: SincResampler,
    s2: SincResampler,
}

impl TwoPassSincResampler {
    pub fn new(clock_frequency: f64, sample_frequency: f64, highest_accurate_frequency: f64) -> Self {
        let intermediate = Self::intermediate_frequency(
            clock_frequency,
            sample_frequency,
            highest_accurate_frequency,
        );
        TwoPassSincResampler {
            s1: SincResampler::new(clock_frequency, intermediate, highest_accurate_frequency),
            s2: SincResampler::new(intermediate, sample_frequency, highest_accurate_frequency),
        }
    }

    /// Intermediate frequency minimizing the summed filter orders.
    pub fn intermediate_frequency(
        clock_frequency: f64,
        sample_frequency: f64,
        highest_accurate_frequency: f64,
    ) -> f64 {
        let h2 = 2.0 * highest_accurate_frequency;
        h2 + libm::sqrt(h2 * clock_frequency * (sample_frequency - h2) / sample_frequency)
    }
}

impl Resampler for TwoPassSincResampler {
    #[inline]
    fn input(&mut self, sample: i32) -> bool {
        self.s1.input_sample(sample) && self.s2.input_sample(self.s1.raw_output())
    }

    #[inline]
    fn output(&self) -> i16 {
        soft_clip(self.s2.raw_output())
    }

    fn reset(&mut self) {
        self.s1.clear();
        self.s2.clear();
    }
}
