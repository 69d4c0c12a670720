//! Pitch lookup tables.

use alloc::sync::Arc;

#[cfg(feature = "std")]
use std::sync::OnceLock;

use core::f64::consts::PI;

/// Notes covered by the period table, octaves 1 to 8.
pub const PERIOD_NOTES: usize = 8 * 12;
/// Fine tunes per octave.
pub const FINE_TUNES: usize = 96;
/// Highest speed a `SetTempo` command can select.
pub const MAX_SPEED: usize = 31;

/// ProTracker periods of octave 5, C to B. Octave 1 is 16 times longer.
const PROTRACKER_OCTAVE: [i32; 12] = [856, 808, 762, 720, 678, 640, 604, 570, 538, 508, 480, 453];

#[derive(Clone, Debug)]
pub struct PitchTables {
    /// Amiga periods from C-1 to B-8.
    pub periods: [i32; PERIOD_NOTES],
    /// One vibrato cycle, amplitude 255.
    pub vibrato: [i32; 64],
    /// `2^(i/96)` with 16 fractional bits.
    pub music_scale: [u32; FINE_TUNES],
    /// `smooth_porta[speed][step] = 2^(step/(96*speed))` with 16 fractional
    /// bits, interpolating between fine tunes over the ticks of a row.
    pub smooth_porta: [[u32; MAX_SPEED + 1]; MAX_SPEED + 1],
}

#[cfg(feature = "std")]
static PITCH_TABLES: OnceLock<Arc<PitchTables>> = OnceLock::new();

impl Default for PitchTables {
    fn default() -> Self {
        Self::new()
    }
}

impl PitchTables {
    pub fn new() -> Self {
        let mut periods = [0; PERIOD_NOTES];
        for (i, period) in periods.iter_mut().enumerate() {
            let octave = i / 12;
            let rounding = (1 << octave) >> 1;
            *period = ((PROTRACKER_OCTAVE[i % 12] << 4) + rounding) >> octave;
        }

        let mut vibrato = [0; 64];
        for (i, v) in vibrato.iter_mut().enumerate() {
            *v = libm::round(255.0 * libm::sin(2.0 * PI * i as f64 / 64.0)) as i32;
        }

        let mut music_scale = [0; FINE_TUNES];
        for (i, m) in music_scale.iter_mut().enumerate() {
            *m = scale(i as f64 / FINE_TUNES as f64);
        }

        let mut smooth_porta = [[0; MAX_SPEED + 1]; MAX_SPEED + 1];
        for (speed, row) in smooth_porta.iter_mut().enumerate().skip(1) {
            for (step, s) in row.iter_mut().enumerate().take(speed) {
                *s = scale(step as f64 / (FINE_TUNES * speed) as f64);
            }
        }

        PitchTables {
            periods,
            vibrato,
            music_scale,
            smooth_porta,
        }
    }

    /// Tables built once per process.
    #[cfg(feature = "std")]
    pub fn shared() -> Arc<PitchTables> {
        PITCH_TABLES.get_or_init(|| Arc::new(Self::new())).clone()
    }
}

#[inline]
fn scale(octaves: f64) -> u32 {
    libm::round(65536.0 * libm::exp2(octaves)) as u32
}
