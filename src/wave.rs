// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Waveform generator and combined waveform tables.
//!
//! A 24 bit accumulator is the basis for waveform generation. FREQ is added
//! to the lower 16 bits of the accumulator each cycle. The accumulator is
//! set to zero when TEST is set, and starts counting when TEST is cleared.
//!
//! - No waveform: the DAC input is floating and fades out over time.
//! - Triangle: the upper 12 bits of the accumulator, with the MSB used to
//!   invert the lower 11 bits which are then left-shifted. Ring modulation
//!   substitutes the MSB with MSB EOR NOT sync_source MSB.
//! - Sawtooth: the upper 12 bits of the accumulator.
//! - Pulse: the upper 12 bits of the accumulator compared against the
//!   pulse width register, delayed one cycle. TEST holds the output high.
//! - Noise: intermediate bits of a 23-bit shift register clocked by bit 19
//!   of the accumulator, with the shift delayed 2 cycles.
//!
//! ```text
//!                    reset  +--------------------------------------------+
//!                      |    |                                            |
//!               test--OR-->EOR<--+                                       |
//!                      |         |                                       |
//!                      2 2 2 1 1 1 1 1 1 1 1 1 1                         |
//!     Register bits:   2 1 0 9 8 7 6 5 4 3 2 1 0 9 8 7 6 5 4 3 2 1 0 <---+
//!                          |   |       |     |   |       |     |   |
//!     Waveform bits:       1   1       9     8   7       6     5   4
//!                          1   0
//! ```
//!
//! Combining waveforms short circuits their bits: a zero bit in one waveform
//! zeroes the output bit and may also pull down neighboring bits. The pull
//! down effect is modeled per chip with tables from [`WaveformCalculator`].

use alloc::sync::Arc;
use alloc::vec;

use bit_field::BitField;

#[cfg(feature = "std")]
use std::sync::OnceLock;

use log::debug;

use crate::ChipModel;

// Floating DAC fade times, measured on warm chips checking OSC3.
// ~95ms
const FLOATING_OUTPUT_TTL_6581R3: u32 = 54000;
const FLOATING_OUTPUT_FADE_6581R3: u32 = 1400;
// ~1s
const FLOATING_OUTPUT_TTL_8580R5: u32 = 800000;
const FLOATING_OUTPUT_FADE_8580R5: u32 = 50000;

// Shift register reset times while TEST is held.
// ~210ms
const SHIFT_REGISTER_RESET_6581R3: u32 = 50000;
const SHIFT_REGISTER_FADE_6581R3: u32 = 15000;
// ~2.8s
const SHIFT_REGISTER_RESET_8580R5: u32 = 986000;
const SHIFT_REGISTER_FADE_8580R5: u32 = 314300;

/// Shift register bits that are tapped for the noise output.
const NOISE_TAPS: u32 = (1 << 2) // Bit 20
    | (1 << 4) // Bit 18
    | (1 << 8) // Bit 14
    | (1 << 11) // Bit 11
    | (1 << 13) // Bit 9
    | (1 << 17) // Bit 5
    | (1 << 20) // Bit 2
    | (1 << 22); // Bit 0

pub type WaveRow = [u16; 4096];

/// Distance weighting between a bit and its neighbors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DistanceFn {
    Exponential,
    Linear,
    Quadratic,
}

impl DistanceFn {
    fn weight(self, distance: f32, i: i32) -> f32 {
        match self {
            DistanceFn::Exponential => libm::powf(distance, -i as f32),
            DistanceFn::Linear => 1.0 / (1.0 + i as f32 * distance),
            DistanceFn::Quadratic => 1.0 / (1.0 + (i * i) as f32 * distance),
        }
    }
}

/// Pull down model of one combined waveform.
///
/// Parameters are fitted against samples from real machines.
#[derive(Clone, Copy, Debug)]
pub struct CombinedWaveformConfig {
    pub dist_func: DistanceFn,
    pub threshold: f32,
    /// Weight of the top bit, truncated to a whole bit. Below 1.0 the top
    /// accumulator bit takes no part in the pull down.
    pub top_bit: f32,
    pub pulse_strength: f32,
    /// Weight falloff towards lower bits.
    pub distance1: f32,
    /// Weight falloff towards higher bits.
    pub distance2: f32,
}

const fn cfg(
    dist_func: DistanceFn,
    threshold: f32,
    top_bit: f32,
    pulse_strength: f32,
    distance1: f32,
    distance2: f32,
) -> CombinedWaveformConfig {
    CombinedWaveformConfig {
        dist_func,
        threshold,
        top_bit,
        pulse_strength,
        distance1,
        distance2,
    }
}

use DistanceFn::{Exponential, Linear, Quadratic};

/// Rows: TS, PT, PS, PTS, NP.
const COMBINED_6581: [CombinedWaveformConfig; 5] = [
    // 6581 R3 4785
    cfg(Exponential, 0.776678205, 1.18439901, 0.0, 2.25732255, 5.12803745),
    cfg(Linear, 1.01866758, 1.0, 2.69177628, 0.0233543925, 0.0850229636),
    cfg(Linear, 2.20329857, 1.04501438, 10.5146885, 0.277294368, 0.143747061),
    cfg(Linear, 1.35652959, 1.09051275, 3.21098137, 0.16658926, 0.370252877),
    // guessed
    cfg(Exponential, 0.96, 1.0, 2.5, 1.1, 1.2),
];

const COMBINED_8580: [CombinedWaveformConfig; 5] = [
    // 8580 R5 5092 25
    cfg(Exponential, 0.684999049, 0.916620493, 0.0, 1.14715648, 2.02339816),
    cfg(Exponential, 0.940367579, 1.0, 1.26695442, 0.976729453, 1.57954705),
    cfg(Quadratic, 0.963866293, 1.22095084, 1.01380754, 0.0110885892, 0.381492466),
    cfg(Linear, 0.976761818, 0.202727556, 0.988633931, 0.939373314, 9.37139416),
    // guessed
    cfg(Exponential, 0.95, 1.0, 1.15, 1.0, 1.45),
];

/// Base waveforms and per-model pull down tables.
#[derive(Clone, Debug)]
pub struct WaveformTables {
    /// None (all ones), triangle, sawtooth, sawtooth & sawtooth << 1.
    pub wave: [WaveRow; 4],
    /// TS, PT, PS, PTS, NP.
    pub pulldown: [WaveRow; 5],
}

/// Builder for [`WaveformTables`].
pub struct WaveformCalculator;

#[cfg(feature = "std")]
static TABLES_6581: OnceLock<Arc<WaveformTables>> = OnceLock::new();
#[cfg(feature = "std")]
static TABLES_8580: OnceLock<Arc<WaveformTables>> = OnceLock::new();

impl WaveformCalculator {
    /// Tables for `chip_model`, built once per process.
    #[cfg(feature = "std")]
    pub fn shared(chip_model: ChipModel) -> Arc<WaveformTables> {
        let cell = match chip_model {
            ChipModel::Mos6581 => &TABLES_6581,
            ChipModel::Mos8580 => &TABLES_8580,
        };
        cell.get_or_init(|| Arc::new(Self::build(chip_model))).clone()
    }

    pub fn build(chip_model: ChipModel) -> WaveformTables {
        debug!("building combined waveform tables for {:?}", chip_model);
        WaveformTables {
            wave: Self::wave_table(),
            pulldown: Self::build_pulldown_table(chip_model),
        }
    }

    pub fn wave_table() -> [WaveRow; 4] {
        let mut table = [[0u16; 4096]; 4];
        for idx in 0..4096u16 {
            let saw = idx;
            let tri = (if idx & 0x800 == 0 { idx } else { idx ^ 0xfff }) << 1;
            table[0][usize::from(idx)] = 0xfff;
            table[1][usize::from(idx)] = tri & 0xfff;
            table[2][usize::from(idx)] = saw;
            table[3][usize::from(idx)] = saw & (saw << 1);
        }
        table
    }

    pub fn build_pulldown_table(chip_model: ChipModel) -> [WaveRow; 5] {
        let configs = match chip_model {
            ChipModel::Mos6581 => &COMBINED_6581,
            ChipModel::Mos8580 => &COMBINED_8580,
        };

        let mut table = [[0u16; 4096]; 5];
        for (row, config) in table.iter_mut().zip(configs.iter()) {
            let distance = distance_table(config);
            for (idx, value) in row.iter_mut().enumerate() {
                *value = calculate_pulldown(&distance, config, idx as u32);
            }
        }
        table
    }
}

fn distance_table(config: &CombinedWaveformConfig) -> [f32; 25] {
    let mut distance = [0f32; 25];
    distance[12] = 1.0;
    for i in 1..=12 {
        distance[12 - i] = config.dist_func.weight(config.distance1, i as i32);
        distance[12 + i] = config.dist_func.weight(config.distance2, i as i32);
    }
    distance
}

fn calculate_pulldown(distance: &[f32; 25], config: &CombinedWaveformConfig, accumulator: u32) -> u16 {
    let mut bit = [0f32; 12];
    for (i, b) in bit.iter_mut().enumerate() {
        *b = if accumulator.get_bit(i) { 1.0 } else { 0.0 };
    }
    bit[11] = libm::truncf(bit[11] * config.top_bit);

    let mut pulldown = [0f32; 12];
    for (sb, pd) in pulldown.iter_mut().enumerate() {
        let mut avg = 0.0;
        let mut n = 0.0;
        for (cb, &b) in bit.iter().enumerate() {
            if cb == sb {
                continue;
            }
            let weight = distance[sb + 12 - cb];
            avg += (1.0 - b) * weight;
            n += weight;
        }
        avg -= config.pulse_strength;
        *pd = avg / n;
    }

    let mut value = 0;
    for i in 0..12 {
        let bit_value = if bit[i] != 0.0 { 1.0 - pulldown[i] } else { 0.0 };
        if bit_value > config.threshold {
            value |= 1 << i;
        }
    }
    value
}

/// Combinations with noise behave like the same combination without it.
fn pulldown_row(waveform: u32) -> Option<usize> {
    match waveform & 0x7 {
        3 => Some(0),
        4 if waveform & 0x8 != 0 => Some(4),
        5 => Some(1),
        6 => Some(2),
        7 => Some(3),
        _ => None,
    }
}

#[derive(Clone, Debug)]
pub struct WaveformGenerator {
    tables: Option<Arc<WaveformTables>>,
    dac: Arc<[f32]>,
    wave_row: usize,
    pulldown_row: Option<usize>,
    pw: u32,
    shift_register: u32,
    shift_pipeline: u32,
    ring_msb_mask: u32,
    no_noise: u32,
    noise_output: u32,
    no_noise_or_noise_output: u32,
    no_pulse: u32,
    pulse_output: u32,
    waveform: u32,
    waveform_output: u32,
    accumulator: u32,
    freq: u32,
    tri_saw_pipeline: u32,
    osc3: u32,
    shift_register_reset: u32,
    floating_output_ttl: u32,
    test: bool,
    sync: bool,
    msb_rising: bool,
    is6581: bool,
}

impl Default for WaveformGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl WaveformGenerator {
    pub fn new() -> Self {
        WaveformGenerator {
            tables: None,
            dac: Arc::from(vec![0.0f32; 4096]),
            wave_row: 0,
            pulldown_row: None,
            pw: 0,
            shift_register: 0,
            shift_pipeline: 0,
            ring_msb_mask: 0,
            no_noise: 0,
            noise_output: 0,
            no_noise_or_noise_output: 0,
            no_pulse: 0,
            pulse_output: 0,
            waveform: 0,
            waveform_output: 0,
            // Even bits are high on powerup.
            accumulator: 0x555555,
            freq: 0,
            tri_saw_pipeline: 0x555,
            osc3: 0,
            shift_register_reset: 0,
            floating_output_ttl: 0,
            test: false,
            sync: false,
            msb_rising: false,
            is6581: false,
        }
    }

    pub fn set_waveform_models(&mut self, tables: Arc<WaveformTables>) {
        self.tables = Some(tables);
    }

    /// Sets the oscillator DAC, 4096 entries with the zero level subtracted.
    pub fn set_dac(&mut self, dac: Arc<[f32]>) {
        self.dac = dac;
    }

    pub fn set_model(&mut self, is6581: bool) {
        self.is6581 = is6581;
    }

    /// Syncs `dest` when this oscillator's MSB rose.
    ///
    /// When the sync source is itself synced on the same cycle its MSB rises,
    /// the destination is not synced. Verified by sampling OSC3.
    pub fn synchronize(&self, dest: &mut WaveformGenerator, source: &WaveformGenerator) {
        if self.msb_rising && dest.sync && !(self.sync && source.msb_rising) {
            dest.accumulator = 0;
        }
    }

    pub fn write_freq_lo(&mut self, freq_lo: u8) {
        self.freq = (self.freq & 0xff00) | u32::from(freq_lo);
    }

    pub fn write_freq_hi(&mut self, freq_hi: u8) {
        self.freq = (u32::from(freq_hi) << 8) | (self.freq & 0x00ff);
    }

    pub fn write_pw_lo(&mut self, pw_lo: u8) {
        self.pw = (self.pw & 0xf00) | u32::from(pw_lo);
    }

    pub fn write_pw_hi(&mut self, pw_hi: u8) {
        self.pw = ((u32::from(pw_hi) << 8) & 0xf00) | (self.pw & 0x0ff);
    }

    pub fn write_control_reg(&mut self, control: u8) {
        let waveform_prev = self.waveform;
        let test_prev = self.test;

        self.waveform = u32::from(control.get_bits(4..8));
        self.test = control.get_bit(3);
        self.sync = control.get_bit(1);

        // Substitution of accumulator MSB when sawtooth = 0, ring_mod = 1.
        self.ring_msb_mask = u32::from(!control.get_bit(5) && control.get_bit(2)) << 23;

        if self.waveform != waveform_prev {
            self.wave_row = (self.waveform & 0x3) as usize;
            self.pulldown_row = pulldown_row(self.waveform);

            // Only let noise or pulse influence the output when selected.
            self.no_noise = if self.waveform & 0x8 != 0 { 0x000 } else { 0xfff };
            self.set_no_noise_or_noise_output();
            self.no_pulse = if self.waveform & 0x4 != 0 { 0x000 } else { 0xfff };

            if self.waveform == 0 {
                self.floating_output_ttl = if self.is6581 {
                    FLOATING_OUTPUT_TTL_6581R3
                } else {
                    FLOATING_OUTPUT_TTL_8580R5
                };
            }
        }

        if self.test != test_prev {
            if self.test {
                self.accumulator = 0;
                self.shift_pipeline = 0;
                self.shift_register_reset = if self.is6581 {
                    SHIFT_REGISTER_RESET_6581R3
                } else {
                    SHIFT_REGISTER_RESET_8580R5
                };
            } else {
                // Falling test bit completes the second phase of the shift.
                if do_pre_writeback(waveform_prev, self.waveform, self.is6581) {
                    self.shift_register &= self.noise_writeback();
                }
                let bit0 = (!self.shift_register << 17) & (1 << 22);
                self.clock_shift_register(bit0);
            }
        }
    }

    /// Resets the registers. The accumulator is not changed.
    pub fn reset(&mut self) {
        self.freq = 0;
        self.pw = 0;
        self.msb_rising = false;
        self.waveform = 0;
        self.osc3 = 0;
        self.test = false;
        self.sync = false;
        self.wave_row = 0;
        self.pulldown_row = None;
        self.ring_msb_mask = 0;
        self.no_noise = 0xfff;
        self.no_pulse = 0xfff;
        self.pulse_output = 0xfff;
        self.shift_register_reset = 0;
        self.shift_register = 0x7fffff;
        // Releasing reset clocks the shift register once, zeroing bit 0.
        self.clock_shift_register(0);
        self.shift_pipeline = 0;
        self.waveform_output = 0;
        self.floating_output_ttl = 0;
    }

    #[inline]
    pub fn clock(&mut self) {
        if self.test {
            if self.shift_register_reset != 0 {
                self.shift_register_reset -= 1;
                if self.shift_register_reset == 0 {
                    self.shift_reg_bit_fade();
                    self.set_noise_output();
                }
            }
            // The test bit sets pulse high.
            self.pulse_output = 0xfff;
        } else {
            let accumulator_old = self.accumulator;
            self.accumulator = (self.accumulator + self.freq) & 0xffffff;

            let accumulator_bits_set = !accumulator_old & self.accumulator;
            self.msb_rising = accumulator_bits_set & 0x800000 != 0;

            // Shift noise register once for each time accumulator bit 19 is
            // set high, delayed 2 cycles.
            if accumulator_bits_set & 0x080000 != 0 {
                self.shift_pipeline = 2;
            } else if self.shift_pipeline != 0 {
                self.shift_pipeline -= 1;
                if self.shift_pipeline == 0 {
                    let sr = self.shift_register;
                    self.clock_shift_register(((sr << 22) ^ (sr << 17)) & (1 << 22));
                }
            }
        }
    }

    /// Computes the waveform output and returns its DAC level.
    #[inline]
    pub fn output(&mut self, ring_modulator: &WaveformGenerator) -> f32 {
        if self.waveform != 0 {
            let ix = ((self.accumulator ^ (!ring_modulator.accumulator & self.ring_msb_mask)) >> 12)
                as usize;
            let mask = (self.no_pulse | self.pulse_output) & self.no_noise_or_noise_output;

            if let Some(tables) = self.tables.as_deref() {
                let pulldown = |value: u32| match self.pulldown_row {
                    Some(row) => u32::from(tables.pulldown[row][value as usize]),
                    None => value,
                };
                let wave = u32::from(tables.wave[self.wave_row][ix]);
                let waveform_output = pulldown(wave & mask);

                // Triangle/sawtooth output is delayed half a cycle on the
                // 8580, showing up as a one cycle delay on OSC3.
                let osc3 = if self.waveform & 3 != 0 && !self.is6581 {
                    let delayed = pulldown(self.tri_saw_pipeline & mask);
                    self.tri_saw_pipeline = wave;
                    delayed
                } else {
                    waveform_output
                };
                self.waveform_output = waveform_output;
                self.osc3 = osc3;
            }

            // In the 6581 the top bit of the accumulator may be driven low by
            // combined waveforms when the sawtooth is selected.
            if self.waveform & 2 != 0 && self.waveform & 0xd != 0 && self.is6581 {
                self.accumulator &= (self.waveform_output << 12) | 0x7fffff;
            }

            self.write_shift_register();
        } else if self.floating_output_ttl != 0 {
            self.floating_output_ttl -= 1;
            if self.floating_output_ttl == 0 {
                self.wave_bit_fade();
            }
        }

        // The result of the pulse width compare is delayed one cycle.
        self.pulse_output = if (self.accumulator >> 12) >= self.pw { 0xfff } else { 0x000 };

        self.dac[self.waveform_output as usize]
    }

    /// OSC3 readback, upper 8 bits of the last waveform output.
    pub fn read_osc(&self) -> u8 {
        (self.osc3 >> 4) as u8
    }

    pub fn read_accumulator(&self) -> u32 {
        self.accumulator
    }

    pub fn read_freq(&self) -> u32 {
        self.freq
    }

    pub fn read_test(&self) -> bool {
        self.test
    }

    pub fn read_sync(&self) -> bool {
        self.sync
    }

    pub fn read_shift_register(&self) -> u32 {
        self.shift_register
    }

    pub fn read_waveform_output(&self) -> u32 {
        self.waveform_output
    }

    fn clock_shift_register(&mut self, bit0: u32) {
        self.shift_register = (self.shift_register >> 1) | bit0;
        self.set_noise_output();
    }

    /// Mask that writes the waveform output back into the noise taps.
    fn noise_writeback(&self) -> u32 {
        let wo = self.waveform_output;
        !NOISE_TAPS
            | ((wo & (1 << 11)) >> 9) // Bit 11 -> bit 20
            | ((wo & (1 << 10)) >> 6) // Bit 10 -> bit 18
            | ((wo & (1 << 9)) >> 1) // Bit 9 -> bit 14
            | ((wo & (1 << 8)) << 3) // Bit 8 -> bit 11
            | ((wo & (1 << 7)) << 6) // Bit 7 -> bit 9
            | ((wo & (1 << 6)) << 11) // Bit 6 -> bit 5
            | ((wo & (1 << 5)) << 15) // Bit 5 -> bit 2
            | ((wo & (1 << 4)) << 18) // Bit 4 -> bit 0
    }

    /// Combined waveforms with noise pull down the shift register bits.
    fn write_shift_register(&mut self) {
        if self.waveform > 0x8 && !self.test && self.shift_pipeline != 1 {
            self.shift_register &= self.noise_writeback();
            self.noise_output &= self.waveform_output;
            self.set_no_noise_or_noise_output();
        }
    }

    fn set_noise_output(&mut self) {
        let sr = self.shift_register;
        self.noise_output = ((sr & (1 << 2)) << 9) // Bit 20 -> bit 11
            | ((sr & (1 << 4)) << 6) // Bit 18 -> bit 10
            | ((sr & (1 << 8)) << 1) // Bit 14 -> bit 9
            | ((sr & (1 << 11)) >> 3) // Bit 11 -> bit 8
            | ((sr & (1 << 13)) >> 6) // Bit 9 -> bit 7
            | ((sr & (1 << 17)) >> 11) // Bit 5 -> bit 6
            | ((sr & (1 << 20)) >> 15) // Bit 2 -> bit 5
            | ((sr & (1 << 22)) >> 18); // Bit 0 -> bit 4
        self.set_no_noise_or_noise_output();
    }

    fn set_no_noise_or_noise_output(&mut self) {
        self.no_noise_or_noise_output = self.no_noise | self.noise_output;
    }

    fn wave_bit_fade(&mut self) {
        self.waveform_output &= self.waveform_output >> 1;
        self.osc3 = self.waveform_output;
        if self.waveform_output != 0 {
            self.floating_output_ttl = if self.is6581 {
                FLOATING_OUTPUT_FADE_6581R3
            } else {
                FLOATING_OUTPUT_FADE_8580R5
            };
        }
    }

    fn shift_reg_bit_fade(&mut self) {
        self.shift_register |= self.shift_register >> 1;
        self.shift_register |= 0x400000;
        if self.shift_register != 0x7fffff {
            self.shift_register_reset = if self.is6581 {
                SHIFT_REGISTER_FADE_6581R3
            } else {
                SHIFT_REGISTER_FADE_8580R5
            };
        }
    }
}

/// Whether clearing TEST writes the waveform back into the shift register
/// before the final shift.
fn do_pre_writeback(waveform_prev: u32, waveform: u32, is6581: bool) -> bool {
    if waveform_prev <= 0x8 {
        return false;
    }
    if waveform == 8 {
        return false;
    }
    if is6581
        && ((waveform_prev & 0x3 == 0x1 && waveform & 0x3 == 0x2)
            || (waveform_prev & 0x3 == 0x2 && waveform & 0x3 == 0x1))
    {
        return false;
    }
    if waveform_prev == 0xc {
        if is6581 {
            return false;
        }
        if waveform != 0x9 && waveform != 0xe {
            return false;
        }
    }
    true
}
