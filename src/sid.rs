// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use alloc::sync::Arc;

use log::debug;

use super::clock;
use super::dac::Dac;
use super::external_filter::ExternalFilter;
use super::filter::{Filter, Filter6581, Filter8580, FilterModelConfig6581, FilterModelConfig8580};
use super::resampler::{Resampler, SidResampler, TwoPassSincResampler, ZeroOrderResampler};
use super::voice::Voice;
use super::wave::{WaveformCalculator, WaveformTables};
use super::{ChipModel, SamplingMethod, SidError};

const ENV_DAC_BITS: usize = 8;
const OSC_DAC_BITS: usize = 12;

/// Bus value time-to-live in cycles, measured on real chips.
const BUS_TTL_6581: i32 = 0x01d00;
const BUS_TTL_8580: i32 = 0xa2000;

const DEFAULT_SAMPLE_FREQ: f64 = 44100.0;
const DEFAULT_PASSBAND: f64 = 20000.0;

pub mod reg {
    pub const FREQLO1: u8 = 0x00;
    pub const FREQHI1: u8 = 0x01;
    pub const PWLO1: u8 = 0x02;
    pub const PWHI1: u8 = 0x03;
    pub const CR1: u8 = 0x04;
    pub const AD1: u8 = 0x05;
    pub const SR1: u8 = 0x06;
    pub const FREQLO2: u8 = 0x07;
    pub const FREQHI2: u8 = 0x08;
    pub const PWLO2: u8 = 0x09;
    pub const PWHI2: u8 = 0x0a;
    pub const CR2: u8 = 0x0b;
    pub const AD2: u8 = 0x0c;
    pub const SR2: u8 = 0x0d;
    pub const FREQLO3: u8 = 0x0e;
    pub const FREQHI3: u8 = 0x0f;
    pub const PWLO3: u8 = 0x10;
    pub const PWHI3: u8 = 0x11;
    pub const CR3: u8 = 0x12;
    pub const AD3: u8 = 0x13;
    pub const SR3: u8 = 0x14;
    pub const FCLO: u8 = 0x15;
    pub const FCHI: u8 = 0x16;
    pub const RESFILT: u8 = 0x17;
    pub const MODVOL: u8 = 0x18;
    pub const POTX: u8 = 0x19;
    pub const POTY: u8 = 0x1a;
    pub const OSC3: u8 = 0x1b;
    pub const ENV3: u8 = 0x1c;
}

/// Paddle input. Nothing is connected, so reads return 0xff.
#[derive(Clone, Copy, Debug, Default)]
pub struct Potentiometer;

impl Potentiometer {
    pub fn read(&self) -> u8 {
        0xff
    }
}

/// Configuration for constructing a [`Sid`].
#[derive(Clone, Debug, PartialEq)]
pub struct SidConfig {
    /// SID chip model to emulate (default: MOS 8580).
    pub chip_model: ChipModel,
    /// Audio sampling method (default: `SamplingMethod::Decimate`).
    pub sampling_method: SamplingMethod,
    /// SID clock frequency in Hz (default: PAL C64 clock).
    pub clock_frequency: f64,
    /// Output sample rate in Hz (default: 44.1kHz).
    pub sample_frequency: f64,
    /// End of the resampler passband in Hz (default: 20kHz).
    pub highest_accurate_frequency: f64,
}

impl Default for SidConfig {
    fn default() -> Self {
        SidConfig {
            chip_model: ChipModel::Mos8580,
            sampling_method: SamplingMethod::Decimate,
            clock_frequency: f64::from(clock::PAL),
            sample_frequency: DEFAULT_SAMPLE_FREQ,
            highest_accurate_frequency: DEFAULT_PASSBAND,
        }
    }
}

#[cfg(feature = "std")]
fn waveform_tables(chip_model: ChipModel) -> Arc<WaveformTables> {
    WaveformCalculator::shared(chip_model)
}

#[cfg(not(feature = "std"))]
fn waveform_tables(chip_model: ChipModel) -> Arc<WaveformTables> {
    Arc::new(WaveformCalculator::build(chip_model))
}

/// MOS 6581/8580 SID chip emulator.
///
/// Owns three voices, both filter models and the C64 output stage. The chip
/// model selects which filter is clocked; register writes reach both so a
/// model switch keeps the filter settings.
///
/// # Example
/// ```
/// use resid_tracker::{ChipModel, Sid};
///
/// let mut sid = Sid::new();
/// sid.set_chip_model(ChipModel::Mos6581);
/// sid.write(0x18, 0x0f); // Volume
/// sid.write(0x01, 0x10); // Voice 1 frequency high
/// sid.write(0x04, 0x11); // Voice 1 control: gate + triangle
///
/// let mut buffer = [0i16; 1024];
/// let samples = sid.clock(20000, &mut buffer);
/// assert!(samples > 0);
/// ```
#[derive(Clone, Debug)]
pub struct Sid {
    model: ChipModel,
    filter6581: Filter6581,
    filter8580: Filter8580,
    external_filter: ExternalFilter,
    resampler: SidResampler,
    pot_x: Potentiometer,
    pot_y: Potentiometer,
    voices: [Voice; 3],
    muted: [bool; 3],
    bus_value: u8,
    bus_value_ttl: i32,
    model_ttl: i32,
    /// Cycles until the next oscillator sync.
    next_voice_sync: u32,
}

impl Default for Sid {
    fn default() -> Self {
        Self::new()
    }
}

impl Sid {
    /// MOS 8580 at the PAL clock, decimating to 44.1kHz.
    #[cfg(feature = "std")]
    pub fn new() -> Self {
        Self::with_filter_models(FilterModelConfig6581::shared(), FilterModelConfig8580::shared())
    }

    /// MOS 8580 at the PAL clock, decimating to 44.1kHz.
    #[cfg(not(feature = "std"))]
    pub fn new() -> Self {
        Self::with_filter_models(
            Arc::new(FilterModelConfig6581::new()),
            Arc::new(FilterModelConfig8580::new()),
        )
    }

    /// Builds a chip around explicit filter model tables.
    pub fn with_filter_models(
        config6581: Arc<FilterModelConfig6581>,
        config8580: Arc<FilterModelConfig8580>,
    ) -> Self {
        let defaults = SidConfig::default();
        let mut sid = Sid {
            model: defaults.chip_model,
            filter6581: Filter6581::new(config6581),
            filter8580: Filter8580::new(config8580),
            external_filter: ExternalFilter::new(),
            resampler: SidResampler::ZeroOrder(ZeroOrderResampler::new(
                defaults.clock_frequency,
                defaults.sample_frequency,
            )),
            pot_x: Potentiometer,
            pot_y: Potentiometer,
            voices: [Voice::new(), Voice::new(), Voice::new()],
            muted: [false; 3],
            bus_value: 0,
            bus_value_ttl: 0,
            model_ttl: BUS_TTL_8580,
            next_voice_sync: 0,
        };
        sid.reset();
        sid.set_chip_model(defaults.chip_model);
        sid
    }

    /// Builds a chip from a full configuration.
    ///
    /// # Errors
    /// Fails when the sampling parameters are invalid.
    pub fn from_config(config: &SidConfig) -> Result<Self, SidError> {
        let mut sid = Self::new();
        sid.set_chip_model(config.chip_model);
        sid.set_sampling_parameters(
            config.clock_frequency,
            config.sampling_method,
            config.sample_frequency,
            config.highest_accurate_frequency,
        )?;
        Ok(sid)
    }

    pub fn chip_model(&self) -> ChipModel {
        self.model
    }

    /// Switches the chip model, rebuilding the DAC and waveform tables.
    pub fn set_chip_model(&mut self, model: ChipModel) {
        debug!("setting chip model {:?}", model);

        self.model = model;
        self.model_ttl = match model {
            ChipModel::Mos6581 => BUS_TTL_6581,
            ChipModel::Mos8580 => BUS_TTL_8580,
        };

        let tables = waveform_tables(model);

        let env_dac = Dac::kinked(ENV_DAC_BITS, model);
        let env_scale = f64::from(1u32 << ENV_DAC_BITS);
        let env_table: Arc<[f32]> = (0..1u32 << ENV_DAC_BITS)
            .map(|i| (env_dac.output(i) * env_scale) as f32)
            .collect();

        // The oscillator "zero" level is where the DAC sits at silence.
        let is6581 = model == ChipModel::Mos6581;
        let osc_dac = Dac::kinked(OSC_DAC_BITS, model);
        let osc_scale = f64::from(1u32 << OSC_DAC_BITS);
        let offset = osc_dac.output(if is6581 { 0x380 } else { 0x9c0 });
        let osc_table: Arc<[f32]> = (0..1u32 << OSC_DAC_BITS)
            .map(|i| ((osc_dac.output(i) - offset) * osc_scale) as f32)
            .collect();

        for voice in &mut self.voices {
            voice.envelope.set_dac(env_table.clone());
            voice.wave.set_dac(osc_table.clone());
            voice.wave.set_model(is6581);
            voice.wave.set_waveform_models(tables.clone());
        }
    }

    /// Switches the chip model from its numeric code (0 = 6581, 1 = 8580).
    ///
    /// # Errors
    /// Returns [`SidError::UnknownChipModel`] for other values.
    pub fn set_chip_model_raw(&mut self, model: u8) -> Result<(), SidError> {
        self.set_chip_model(ChipModel::try_from(model)?);
        Ok(())
    }

    /// Configures clock and output rates.
    ///
    /// # Errors
    /// Frequencies must be non-zero; resampling needs the passband to end
    /// below half the sample frequency.
    pub fn set_sampling_parameters(
        &mut self,
        clock_frequency: f64,
        method: SamplingMethod,
        sample_frequency: f64,
        highest_accurate_frequency: f64,
    ) -> Result<(), SidError> {
        if clock_frequency <= 0.0 {
            return Err(SidError::ZeroClockFrequency);
        }
        if sample_frequency <= 0.0 {
            return Err(SidError::ZeroSampleFrequency);
        }

        self.resampler = match method {
            SamplingMethod::Decimate => SidResampler::ZeroOrder(ZeroOrderResampler::new(
                clock_frequency,
                sample_frequency,
            )),
            SamplingMethod::Resample => {
                if highest_accurate_frequency <= 0.0
                    || 2.0 * highest_accurate_frequency >= sample_frequency
                {
                    return Err(SidError::InvalidPassband);
                }
                SidResampler::TwoPassSinc(alloc::boxed::Box::new(TwoPassSincResampler::new(
                    clock_frequency,
                    sample_frequency,
                    highest_accurate_frequency,
                )))
            }
        };
        self.external_filter.set_clock_frequency(clock_frequency);

        debug!(
            "sampling {:?} at {} Hz from {} Hz clock",
            method, sample_frequency, clock_frequency
        );
        Ok(())
    }

    pub fn reset(&mut self) {
        for voice in &mut self.voices {
            voice.reset();
        }
        self.filter6581.reset();
        self.filter8580.reset();
        self.external_filter.reset();
        self.resampler.reset();

        self.bus_value = 0;
        self.bus_value_ttl = 0;

        self.voice_sync(false);
    }

    /// Feeds the external audio input (EXT IN) to both filters.
    pub fn input(&mut self, value: i32) {
        self.filter6581.input(value);
        self.filter8580.input(value);
    }

    /// Mutes a voice. A muted voice sees control register writes as 0.
    pub fn mute(&mut self, channel: usize, enable: bool) {
        if let Some(muted) = self.muted.get_mut(channel) {
            *muted = enable;
        }
    }

    /// Enables or bypasses the filter on both models.
    pub fn enable_filter(&mut self, enable: bool) {
        self.filter6581.enable(enable);
        self.filter8580.enable(enable);
    }

    /// Adjusts the cutoff curve of both filter models, 0.0 - 1.0.
    pub fn set_filter_curve(&mut self, curve: f64) {
        self.filter6581.set_filter_curve(curve);
        self.filter8580.set_filter_curve(curve);
    }

    /// Filter model tables in use, 6581 then 8580.
    pub fn filter_models(&self) -> (&Arc<FilterModelConfig6581>, &Arc<FilterModelConfig8580>) {
        (self.filter6581.config(), self.filter8580.config())
    }

    pub fn voice(&self, index: usize) -> Option<&Voice> {
        self.voices.get(index)
    }

    /// Reads a register. Write-only registers return the fading bus value.
    pub fn read(&mut self, offset: u8) -> u8 {
        match offset {
            reg::POTX => {
                self.bus_value = self.pot_x.read();
                self.bus_value_ttl = self.model_ttl;
            }
            reg::POTY => {
                self.bus_value = self.pot_y.read();
                self.bus_value_ttl = self.model_ttl;
            }
            reg::OSC3 => {
                self.bus_value = self.voices[2].wave.read_osc();
                self.bus_value_ttl = self.model_ttl;
            }
            reg::ENV3 => {
                self.bus_value = self.voices[2].envelope.read_env();
                self.bus_value_ttl = self.model_ttl;
            }
            _ => {
                self.bus_value_ttl /= 2;
            }
        }
        self.bus_value
    }

    pub fn write(&mut self, offset: u8, value: u8) {
        self.bus_value = value;
        self.bus_value_ttl = self.model_ttl;

        if offset < reg::FCLO {
            let index = usize::from(offset / 7);
            let voice = &mut self.voices[index];
            match offset % 7 {
                0 => voice.wave.write_freq_lo(value),
                1 => voice.wave.write_freq_hi(value),
                2 => voice.wave.write_pw_lo(value),
                3 => voice.wave.write_pw_hi(value),
                4 => voice.write_control_reg(if self.muted[index] { 0 } else { value }),
                5 => voice.envelope.write_attack_decay(value),
                _ => voice.envelope.write_sustain_release(value),
            }
        } else {
            match offset {
                reg::FCLO => {
                    self.filter6581.write_fc_lo(value);
                    self.filter8580.write_fc_lo(value);
                }
                reg::FCHI => {
                    self.filter6581.write_fc_hi(value);
                    self.filter8580.write_fc_hi(value);
                }
                reg::RESFILT => {
                    self.filter6581.write_res_filt(value);
                    self.filter8580.write_res_filt(value);
                }
                reg::MODVOL => {
                    self.filter6581.write_mode_vol(value);
                    self.filter8580.write_mode_vol(value);
                }
                _ => {}
            }
        }

        // Update voice sync just in case.
        self.voice_sync(false);
    }

    /// Clocks the chip `cycles` cycles, writing output samples to `buf`.
    ///
    /// Returns the number of samples written. Samples that do not fit in
    /// `buf` are discarded.
    pub fn clock(&mut self, cycles: u32, buf: &mut [i16]) -> usize {
        self.age_bus_value(cycles);

        let mut written = 0;
        let mut cycles = cycles;
        while cycles != 0 {
            let delta_t = self.next_voice_sync.min(cycles);
            if delta_t > 0 {
                for _ in 0..delta_t {
                    // Clock waveform generators
                    for voice in &mut self.voices {
                        voice.wave.clock();
                    }
                    // Clock envelope generators
                    for voice in &mut self.voices {
                        voice.envelope.clock();
                    }

                    let sample = self.output();
                    if self.resampler.input(sample) {
                        if let Some(slot) = buf.get_mut(written) {
                            *slot = self.resampler.output();
                            written += 1;
                        }
                    }
                }
                cycles -= delta_t;
                self.next_voice_sync -= delta_t;
            }

            if self.next_voice_sync == 0 {
                self.voice_sync(true);
            }
        }
        written
    }

    /// Mixes the voices through the active filter and the output stage.
    #[inline]
    fn output(&mut self) -> i32 {
        let [v1, v2, v3] = &mut self.voices;
        let o1 = v1.output(&v3.wave);
        let o2 = v2.output(&v1.wave);
        let o3 = v3.output(&v2.wave);

        let filtered = match self.model {
            ChipModel::Mos6581 => self.filter6581.clock(o1, o2, o3),
            ChipModel::Mos8580 => self.filter8580.clock(o1, o2, o3),
        };
        self.external_filter.clock(filtered)
    }

    /// Hard-syncs the oscillators when `sync` is set and schedules the next
    /// point where an accumulator MSB may rise into a synced voice.
    fn voice_sync(&mut self, sync: bool) {
        if sync {
            let [v1, v2, v3] = &mut self.voices;
            v1.wave.synchronize(&mut v2.wave, &v3.wave);
            v2.wave.synchronize(&mut v3.wave, &v1.wave);
            v3.wave.synchronize(&mut v1.wave, &v2.wave);
        }

        self.next_voice_sync = i32::MAX as u32;

        for i in 0..3 {
            let wave = &self.voices[i].wave;
            let freq = wave.read_freq();

            if wave.read_test() || freq == 0 || !self.voices[(i + 1) % 3].wave.read_sync() {
                continue;
            }

            let accumulator = wave.read_accumulator();
            let this_voice_sync = (0x7fffff_u32.wrapping_sub(accumulator) & 0xffffff) / freq + 1;
            self.next_voice_sync = self.next_voice_sync.min(this_voice_sync);
        }
    }

    fn age_bus_value(&mut self, n: u32) {
        if self.bus_value_ttl != 0 {
            self.bus_value_ttl = self
                .bus_value_ttl
                .saturating_sub(i32::try_from(n).unwrap_or(i32::MAX));
            if self.bus_value_ttl <= 0 {
                self.bus_value = 0;
                self.bus_value_ttl = 0;
            }
        }
    }
}
