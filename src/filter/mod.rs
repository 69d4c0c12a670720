// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Two-integrator-loop biquadratic SID filter.
//!
//! The SID filter is modeled with a two-integrator-loop biquadratic filter,
//! which has been confirmed by Bob Yannes to be the actual circuit used in
//! the SID chip. Vhp is the output of the summer, Vbp is the output of the
//! first integrator and Vlp is the output of the second integrator.
//!
//! ```text
//!                 +---------------------------------------+
//!                 |                                       |
//!                 +--[res]--+                             |
//!                           |                             |
//!   vi ---[summer]----------o--[Int]--o--[Int]--o--+      |
//!                       vhp |     vbp |     vlp |  |      |
//!                           |         +-----------------+ |
//!                           |                   +-------+ |
//!                           +-----[mixer]--[volume]---- vo
//! ```
//!
//! The summer, mixer and volume stages are op-amps with "resistor" ladders,
//! evaluated through lookup tables built by [`config`]. Each stage table is
//! selected by how many inputs are routed to it.

pub mod config;
pub mod integrator;
pub mod opamp;

use alloc::boxed::Box;
use alloc::sync::Arc;

use bit_field::BitField;

pub use self::config::{FilterModelConfig6581, FilterModelConfig8580, FilterTables};
use self::integrator::{Integrator6581, Integrator8580};

/// Register interface shared by both filter models.
pub trait Filter {
    /// Clocks the filter one cycle and returns the 16 bit mixer output.
    fn clock(&mut self, voice1: i32, voice2: i32, voice3: i32) -> u16;
    /// Sets the external audio input (EXT IN).
    fn input(&mut self, sample: i32);
    /// Enables or bypasses voice routing through the filter.
    fn enable(&mut self, enable: bool);
    fn reset(&mut self);
    fn write_fc_lo(&mut self, fc_lo: u8);
    fn write_fc_hi(&mut self, fc_hi: u8);
    fn write_res_filt(&mut self, res_filt: u8);
    fn write_mode_vol(&mut self, mode_vol: u8);
    /// Adjusts the cutoff curve, 0.0 - 1.0.
    fn set_filter_curve(&mut self, curve: f64);
}

#[inline]
fn lookup(table: &[u16], index: i32) -> i32 {
    let index = (index.max(0) as usize).min(table.len() - 1);
    i32::from(table[index])
}

/// Register state and voice routing common to both models.
#[derive(Clone, Debug)]
pub struct FilterState {
    vhp: i32,
    vbp: i32,
    vlp: i32,
    /// Scaled external input.
    ve: i32,
    /// Cutoff frequency, 11 bits.
    fc: u16,
    filt: u8,
    filt1: bool,
    filt2: bool,
    filt3: bool,
    filt_e: bool,
    voice3_off: bool,
    hp: bool,
    bp: bool,
    lp: bool,
    vol: u8,
    res: u8,
    enabled: bool,
    /// Number of inputs on the summer (0 - 4).
    summer_inputs: usize,
    /// Number of inputs on the mixer (0 - 7).
    mixer_inputs: usize,
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterState {
    pub fn new() -> Self {
        FilterState {
            vhp: 0,
            vbp: 0,
            vlp: 0,
            ve: 0,
            fc: 0,
            filt: 0,
            filt1: false,
            filt2: false,
            filt3: false,
            filt_e: false,
            voice3_off: false,
            hp: false,
            bp: false,
            lp: false,
            vol: 0,
            res: 0,
            enabled: true,
            summer_inputs: 0,
            mixer_inputs: 4,
        }
    }

    pub fn fc(&self) -> u16 {
        self.fc
    }

    pub fn res(&self) -> u8 {
        self.res
    }

    pub fn vol(&self) -> u8 {
        self.vol
    }

    fn write_fc_lo(&mut self, fc_lo: u8) {
        self.fc = (self.fc & 0x7f8) | u16::from(fc_lo & 0x07);
    }

    fn write_fc_hi(&mut self, fc_hi: u8) {
        self.fc = ((u16::from(fc_hi) << 3) & 0x7f8) | (self.fc & 0x007);
    }

    fn write_res_filt(&mut self, res_filt: u8) {
        self.filt = res_filt;
        self.res = res_filt.get_bits(4..8);
        if self.enabled {
            self.filt1 = res_filt.get_bit(0);
            self.filt2 = res_filt.get_bit(1);
            self.filt3 = res_filt.get_bit(2);
            self.filt_e = res_filt.get_bit(3);
        }
        self.update_mixing();
    }

    fn write_mode_vol(&mut self, mode_vol: u8) {
        self.vol = mode_vol.get_bits(0..4);
        self.lp = mode_vol.get_bit(4);
        self.bp = mode_vol.get_bit(5);
        self.hp = mode_vol.get_bit(6);
        self.voice3_off = mode_vol.get_bit(7);
        self.update_mixing();
    }

    fn enable(&mut self, enable: bool) {
        self.enabled = enable;
        if enable {
            self.write_res_filt(self.filt);
        } else {
            self.filt1 = false;
            self.filt2 = false;
            self.filt3 = false;
            self.filt_e = false;
            self.update_mixing();
        }
    }

    fn reset(&mut self) {
        self.write_fc_lo(0);
        self.write_fc_hi(0);
        self.write_mode_vol(0);
        self.write_res_filt(0);
    }

    /// Counts the inputs routed to the summer and the mixer.
    fn update_mixing(&mut self) {
        let mut ni = 0;
        let mut no = 0;

        if self.filt1 {
            ni += 1;
        } else {
            no += 1;
        }
        if self.filt2 {
            ni += 1;
        } else {
            no += 1;
        }
        if self.filt3 {
            ni += 1;
        } else if !self.voice3_off {
            no += 1;
        }
        if self.filt_e {
            ni += 1;
        } else {
            no += 1;
        }
        self.summer_inputs = ni;

        no += usize::from(self.lp) + usize::from(self.bp) + usize::from(self.hp);
        self.mixer_inputs = no;
    }

    fn input<T: FilterTables>(&mut self, tables: &T, sample: i32) {
        self.ve = (sample * tables.voice_scale_s11() * 3 >> 11) + i32::from(tables.mixer(0)[0]);
    }

    fn clock<T, H, B>(&mut self, tables: &T, voices: [i32; 3], mut hp: H, mut bp: B) -> u16
    where
        T: FilterTables,
        H: FnMut(i32) -> i32,
        B: FnMut(i32) -> i32,
    {
        let scale = tables.voice_scale_s11();
        let dc = tables.voice_dc();

        let voice1 = (voices[0] * scale >> 15) + dc;
        let voice2 = (voices[1] * scale >> 15) + dc;
        // Voice 3 is silenced by voice3off if it is not routed through the filter.
        let voice3 = if self.filt3 || !self.voice3_off {
            (voices[2] * scale >> 15) + dc
        } else {
            0
        };

        let mut vi = 0;
        let mut vo = 0;
        for (routed, v) in [
            (self.filt1, voice1),
            (self.filt2, voice2),
            (self.filt3, voice3),
            (self.filt_e, self.ve),
        ] {
            if routed {
                vi += v;
            } else {
                vo += v;
            }
        }

        let resonance = lookup(tables.resonance(self.res), self.vbp);
        self.vhp = lookup(tables.summer(self.summer_inputs), resonance + self.vlp + vi);
        self.vbp = hp(self.vhp);
        self.vlp = bp(self.vbp);

        if self.lp {
            vo += self.vlp;
        }
        if self.bp {
            vo += self.vbp;
        }
        if self.hp {
            vo += self.vhp;
        }

        let mixed = lookup(tables.mixer(self.mixer_inputs), vo);
        lookup(tables.volume(self.vol), mixed) as u16
    }
}

/// MOS 6581 filter.
#[derive(Clone, Debug)]
pub struct Filter6581 {
    config: Arc<FilterModelConfig6581>,
    f0_dac: Box<[u16]>,
    hp_integrator: Integrator6581,
    bp_integrator: Integrator6581,
    state: FilterState,
}

impl Filter6581 {
    pub fn new(config: Arc<FilterModelConfig6581>) -> Self {
        let mut filter = Filter6581 {
            f0_dac: config.f0_dac(0.5),
            hp_integrator: config.build_integrator(),
            bp_integrator: config.build_integrator(),
            config,
            state: FilterState::new(),
        };
        filter.reset();
        filter.input(0);
        filter
    }

    pub fn config(&self) -> &Arc<FilterModelConfig6581> {
        &self.config
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    fn update_center_frequency(&mut self) {
        let vw = self.f0_dac[usize::from(self.state.fc)];
        self.hp_integrator.set_vw(vw);
        self.bp_integrator.set_vw(vw);
    }
}

impl Filter for Filter6581 {
    fn clock(&mut self, voice1: i32, voice2: i32, voice3: i32) -> u16 {
        let config = &*self.config;
        let hp = &mut self.hp_integrator;
        let bp = &mut self.bp_integrator;
        self.state.clock(
            config,
            [voice1, voice2, voice3],
            |vi| hp.solve(vi, config),
            |vi| bp.solve(vi, config),
        )
    }

    fn input(&mut self, sample: i32) {
        self.state.input(&*self.config, sample);
    }

    fn enable(&mut self, enable: bool) {
        self.state.enable(enable);
    }

    fn reset(&mut self) {
        self.state.reset();
        self.update_center_frequency();
    }

    fn write_fc_lo(&mut self, fc_lo: u8) {
        self.state.write_fc_lo(fc_lo);
        self.update_center_frequency();
    }

    fn write_fc_hi(&mut self, fc_hi: u8) {
        self.state.write_fc_hi(fc_hi);
        self.update_center_frequency();
    }

    fn write_res_filt(&mut self, res_filt: u8) {
        self.state.write_res_filt(res_filt);
    }

    fn write_mode_vol(&mut self, mode_vol: u8) {
        self.state.write_mode_vol(mode_vol);
    }

    /// Rebuilds the cutoff DAC table with a shifted zero point.
    fn set_filter_curve(&mut self, curve: f64) {
        self.f0_dac = self.config.f0_dac(curve.clamp(0.0, 1.0));
        self.update_center_frequency();
    }
}

/// Base W/L of one cutoff DAC bit on the 8580, doubling per bit.
const DAC_WL_8580: f64 = 0.00615;

/// CSG 8580 filter.
#[derive(Clone, Debug)]
pub struct Filter8580 {
    config: Arc<FilterModelConfig8580>,
    hp_integrator: Integrator8580,
    bp_integrator: Integrator8580,
    state: FilterState,
    cp: f64,
}

impl Filter8580 {
    pub fn new(config: Arc<FilterModelConfig8580>) -> Self {
        let mut filter = Filter8580 {
            hp_integrator: config.build_integrator(),
            bp_integrator: config.build_integrator(),
            config,
            state: FilterState::new(),
            cp: 0.5,
        };
        filter.set_filter_curve(0.5);
        filter.reset();
        filter.input(0);
        filter
    }

    pub fn config(&self) -> &Arc<FilterModelConfig8580> {
        &self.config
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn filter_curve(&self) -> f64 {
        self.cp
    }

    fn update_center_frequency(&mut self) {
        let fc = self.state.fc;
        let wl = if fc != 0 {
            (0..11)
                .filter(|&bit| fc.get_bit(bit))
                .map(|bit| DAC_WL_8580 * f64::from(1u32 << bit))
                .sum::<f64>()
        } else {
            DAC_WL_8580 / 2.0
        };
        self.hp_integrator.set_fc(wl);
        self.bp_integrator.set_fc(wl);
    }
}

impl Filter for Filter8580 {
    fn clock(&mut self, voice1: i32, voice2: i32, voice3: i32) -> u16 {
        let config = &*self.config;
        let hp = &mut self.hp_integrator;
        let bp = &mut self.bp_integrator;
        self.state.clock(
            config,
            [voice1, voice2, voice3],
            |vi| hp.solve(vi, config),
            |vi| bp.solve(vi, config),
        )
    }

    fn input(&mut self, sample: i32) {
        self.state.input(&*self.config, sample);
    }

    fn enable(&mut self, enable: bool) {
        self.state.enable(enable);
    }

    fn reset(&mut self) {
        self.state.reset();
        self.update_center_frequency();
    }

    fn write_fc_lo(&mut self, fc_lo: u8) {
        self.state.write_fc_lo(fc_lo);
        self.update_center_frequency();
    }

    fn write_fc_hi(&mut self, fc_hi: u8) {
        self.state.write_fc_hi(fc_hi);
        self.update_center_frequency();
    }

    fn write_res_filt(&mut self, res_filt: u8) {
        self.state.write_res_filt(res_filt);
    }

    fn write_mode_vol(&mut self, mode_vol: u8) {
        self.state.write_mode_vol(mode_vol);
    }

    /// Maps the curve position onto the gate voltage divider, 1.2 - 1.8.
    fn set_filter_curve(&mut self, curve: f64) {
        self.cp = curve.clamp(0.0, 1.0);
        let v = 1.8 - self.cp * 3.0 / 5.0;
        self.hp_integrator.set_v(v);
        self.bp_integrator.set_v(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fc_registers_combine_to_11_bits() {
        let mut state = FilterState::new();
        state.write_fc_lo(0xff);
        assert_eq!(state.fc(), 0x007);
        state.write_fc_hi(0xff);
        assert_eq!(state.fc(), 0x7ff);
        state.write_fc_lo(0x00);
        assert_eq!(state.fc(), 0x7f8);
    }

    #[test]
    fn routing_counts_inputs() {
        let mut state = FilterState::new();
        state.write_res_filt(0xf3);
        assert_eq!(state.res(), 0xf);
        assert_eq!(state.summer_inputs, 2);
        assert_eq!(state.mixer_inputs, 2);

        state.write_mode_vol(0x7f);
        assert_eq!(state.vol(), 0xf);
        assert_eq!(state.mixer_inputs, 5);
    }

    /// Voice 3 off only removes voice 3 when it bypasses the filter.
    #[test]
    fn voice3_off_only_affects_unfiltered_voice() {
        let mut state = FilterState::new();
        state.write_mode_vol(0x80);
        assert_eq!(state.mixer_inputs, 3);
        state.write_res_filt(0x04);
        assert_eq!(state.summer_inputs, 1);
        assert_eq!(state.mixer_inputs, 3);
    }

    #[test]
    fn disabled_filter_routes_nothing() {
        let mut state = FilterState::new();
        state.write_res_filt(0x0f);
        assert_eq!(state.summer_inputs, 4);
        state.enable(false);
        assert_eq!(state.summer_inputs, 0);
        assert_eq!(state.mixer_inputs, 4);
        state.enable(true);
        assert_eq!(state.summer_inputs, 4);
    }

    #[test]
    fn lookup_clamps_index() {
        let table = [1u16, 2, 3];
        assert_eq!(lookup(&table, -5), 1);
        assert_eq!(lookup(&table, 1), 2);
        assert_eq!(lookup(&table, 100), 3);
    }
}
