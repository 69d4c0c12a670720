// Soft clipping and decimation ratios of the output resamplers.
//
// Verify soft clipping behavior for 16-bit saturation.

use resid_tracker::resampler::{soft_clip, Resampler, TwoPassSincResampler, ZeroOrderResampler};

/// Soft clipping threshold - values below pass unchanged.
const THRESHOLD: i32 = 28000;

/// Peak value for testing compression region.
const PEAK: i32 = 38000;

const PAL: f64 = 985_248.0;

/// Values within threshold pass unchanged (linear region).
#[test]
fn soft_clip_linear_region() {
    for i in -THRESHOLD..=THRESHOLD {
        assert_eq!(soft_clip(i), i as i16, "value {} in linear region", i);
    }
}

/// Values beyond the threshold are compressed but stay in range.
#[test]
fn soft_clip_compression() {
    for i in THRESHOLD..=PEAK {
        let pos = i32::from(soft_clip(i));
        let neg = i32::from(soft_clip(-i));
        assert!(pos <= i && pos <= i32::from(i16::MAX), "{} -> {}", i, pos);
        assert!(neg >= -i && neg >= i32::from(i16::MIN), "{} -> {}", -i, neg);
    }
    assert!(soft_clip(i32::MAX) <= i16::MAX);
    assert!(soft_clip(i32::MIN) >= i16::MIN);
}

/// Soft clipping is monotonic (larger input -> larger or equal output).
#[test]
fn soft_clip_monotonic() {
    let mut prev = soft_clip(-100_000);
    for i in -100_000..=100_000 {
        let curr = soft_clip(i);
        assert!(curr >= prev, "f({}) = {} < f({}) = {}", i, curr, i - 1, prev);
        prev = curr;
    }
}

/// Counts the outputs produced by `cycles` inputs of `value`.
fn outputs<R: Resampler>(resampler: &mut R, cycles: u32, value: i32) -> (u32, i16) {
    let mut count = 0;
    let mut last = 0;
    for _ in 0..cycles {
        if resampler.input(value) {
            count += 1;
            last = resampler.output();
        }
    }
    (count, last)
}

/// One output per `clock / sample` inputs.
#[test]
fn zero_order_rate() {
    for sample_frequency in [22050.0, 44100.0, 48000.0, 96000.0] {
        let mut resampler = ZeroOrderResampler::new(PAL, sample_frequency);
        let (count, last) = outputs(&mut resampler, 985_248, 1000);
        let expected = sample_frequency as i64;
        assert!(
            (i64::from(count) - expected).abs() <= expected / 1000 + 1,
            "{} Hz: {} outputs",
            sample_frequency,
            count
        );
        assert_eq!(last, 1000);
    }
}

/// The two-pass filter keeps the rate and passes DC.
#[test]
fn two_pass_rate_and_dc() {
    for sample_frequency in [44100.0, 48000.0, 96000.0] {
        let mut resampler = TwoPassSincResampler::new(PAL, sample_frequency, 20000.0);
        let (count, last) = outputs(&mut resampler, 985_248, 8000);
        let expected = sample_frequency as i64;
        assert!(
            (i64::from(count) - expected).abs() <= expected / 100,
            "{} Hz: {} outputs",
            sample_frequency,
            count
        );
        assert!((i32::from(last) - 8000).abs() < 200, "{} Hz: dc {}", sample_frequency, last);
    }
}

#[test]
fn reset_clears_history() {
    let mut resampler = TwoPassSincResampler::new(PAL, 48000.0, 20000.0);
    outputs(&mut resampler, 50_000, 20000);
    resampler.reset();
    let (_, last) = outputs(&mut resampler, 10_000, 0);
    assert_eq!(last, 0);
}
