// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Conversion from the chip clock to the output sample rate.
//!
//! The chip produces one sample per cycle. A resampler consumes those and
//! signals when an output sample is ready. Two strategies are provided:
//! zero-order hold decimation with linear interpolation, and two-pass
//! Kaiser-windowed sinc resampling.

mod sinc;
mod soft_clip;
mod zero_order;

pub use sinc::{SincResampler, TwoPassSincResampler};
pub use soft_clip::soft_clip;
pub use zero_order::ZeroOrderResampler;

use alloc::boxed::Box;

/// Sample rate converter fed with one sample per chip cycle.
pub trait Resampler {
    /// Feeds one input sample. Returns true when an output sample is ready.
    fn input(&mut self, sample: i32) -> bool;
    /// Last output sample, soft clipped to 16 bits.
    fn output(&self) -> i16;
    fn reset(&mut self);
}

/// Resampler selected by [`SamplingMethod`](crate::SamplingMethod).
#[derive(Clone, Debug)]
pub enum SidResampler {
    ZeroOrder(ZeroOrderResampler),
    TwoPassSinc(Box<TwoPassSincResampler>),
}

impl Resampler for SidResampler {
    #[inline]
    fn input(&mut self, sample: i32) -> bool {
        match self {
            SidResampler::ZeroOrder(r) => r.input(sample),
            SidResampler::TwoPassSinc(r) => r.input(sample),
        }
    }

    #[inline]
    fn output(&self) -> i16 {
        match self {
            SidResampler::ZeroOrder(r) => r.output(),
            SidResampler::TwoPassSinc(r) => r.output(),
        }
    }

    fn reset(&mut self) {
        match self {
            SidResampler::ZeroOrder(r) => r.reset(),
            SidResampler::TwoPassSinc(r) => r.reset(),
        }
    }
}
