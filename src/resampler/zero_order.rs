// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use super::{soft_clip, Resampler};

const FIXP_SHIFT: i32 = 10;
const FIXP_SCALE: i32 = 1 << FIXP_SHIFT;

/// Decimating resampler with linear interpolation between the cached
/// previous sample and the current one.
#[derive(Clone, Debug)]
pub struct ZeroOrderResampler {
    cached_sample: i32,
    cycles_per_sample: i32,
    sample_offset: i32,
    output_value: i32,
}

impl ZeroOrderResampler {
    pub fn new(clock_frequency: f64, sample_frequency: f64) -> Self {
        ZeroOrderResampler {
            cached_sample: 0,
            cycles_per_sample: (clock_frequency / sample_frequency * f64::from(FIXP_SCALE))
                as i32,
            sample_offset: 0,
            output_value: 0,
        }
    }
}

impl Resampler for ZeroOrderResampler {
    #[inline]
    fn input(&mut self, sample: i32) -> bool {
        let mut ready = false;

        if self.sample_offset < FIXP_SCALE {
            let delta = i64::from(sample) - i64::from(self.cached_sample);
            self.output_value = self.cached_sample
                + ((i64::from(self.sample_offset) * delta) >> FIXP_SHIFT) as i32;
            ready = true;
            self.sample_offset += self.cycles_per_sample;
        }

        self.sample_offset -= FIXP_SCALE;
        self.cached_sample = sample;

        ready
    }

    #[inline]
    fn output(&self) -> i16 {
        soft_clip(self.output_value)
    }

    fn reset(&mut self) {
        self.sample_offset = 0;
        self.cached_sample = 0;
        self.output_value = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_one_sample_per_period() {
        let mut resampler = ZeroOrderResampler::new(1_000_000.0, 10_000.0);
        let ready = (0..10_000).filter(|_| resampler.input(0)).count();
        assert_eq!(ready, 100);
    }

    #[test]
    fn interpolates_toward_current_sample() {
        let mut resampler = ZeroOrderResampler::new(2048.0, 1024.0);
        assert!(resampler.input(0));
        assert!(!resampler.input(1000));
        assert!(resampler.input(2000));
        assert_eq!(resampler.output(), 1000);
    }

    #[test]
    fn reset_restarts_phase() {
        let mut resampler = ZeroOrderResampler::new(3000.0, 1000.0);
        resampler.input(500);
        resampler.reset();
        assert!(resampler.input(0));
        assert_eq!(resampler.output(), 0);
    }
}
