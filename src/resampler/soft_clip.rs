// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Soft clipping into the 16 bit sample range.
//!
//! Values below the threshold pass unchanged; above it a tanh curve
//! saturates smoothly toward full scale.

/// Soft clipping threshold - values below pass unchanged
const THRESHOLD: i32 = 28000;

#[inline]
fn soft_clip_positive(x: i32, max_val: i32) -> i32 {
    if x < THRESHOLD {
        return x;
    }

    let max_f = f64::from(max_val);
    let t = f64::from(THRESHOLD) / max_f;
    let a = 1.0 - t;
    let b = 1.0 / a;

    let value = f64::from(x - THRESHOLD) / max_f;
    let result = t + a * libm::tanh(b * value);
    (result * max_f) as i32
}

/// Soft clip into `[i16::MIN, i16::MAX]`.
#[inline]
pub fn soft_clip(x: i32) -> i16 {
    if x < 0 {
        let abs_x = x.checked_neg().unwrap_or(i32::MAX);
        (-soft_clip_positive(abs_x, -i32::from(i16::MIN))) as i16
    } else {
        soft_clip_positive(x, i32::from(i16::MAX)) as i16
    }
}
