// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Filter model configuration for both chip models.
//!
//! Lookup tables for the summer, mixer and gain op-amps are generated at
//! runtime from measured op-amp voltage transfer curves. Generation solves
//! the op-amp equation for every input code of every resistor combination,
//! several million root finds in total, so the tables are meant to be built
//! once and shared through an [`Arc`].
//!
//! ```ignore
//! let a = FilterModelConfig8580::shared();
//! let b = FilterModelConfig8580::shared();
//! assert!(Arc::ptr_eq(&a, &b));
//! ```

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

#[cfg(feature = "std")]
use std::sync::OnceLock;

use log::debug;

use super::integrator::{Integrator6581, Integrator8580};
use super::opamp::OpAmp;
use crate::dac::Dac;
use crate::spline::{MonotoneSpline, Point};
use crate::ChipModel;

#[cfg(feature = "std")]
static CONFIG_6581: OnceLock<Arc<FilterModelConfig6581>> = OnceLock::new();
#[cfg(feature = "std")]
static CONFIG_8580: OnceLock<Arc<FilterModelConfig8580>> = OnceLock::new();

/// Thermal voltage: Ut = kT/q ~ 26mV.
const UT: f64 = 26.0e-3;

/// Bits of the 6581 cutoff frequency DAC.
const DAC_BITS: usize = 11;

/// MOS 6581R4AR op-amp voltage transfer function, measured on CAP1B/CAP1A.
/// All measured chips stay within 0.81V - 10.31V.
pub(crate) const OPAMP_VOLTAGE_6581: [(f64, f64); 33] = [
    (0.81, 10.31), // Approximate start of actual range
    (2.40, 10.31),
    (2.60, 10.30),
    (2.70, 10.29),
    (2.80, 10.26),
    (2.90, 10.17),
    (3.00, 10.04),
    (3.10, 9.83),
    (3.20, 9.58),
    (3.30, 9.32),
    (3.50, 8.69),
    (3.70, 8.00),
    (4.00, 6.89),
    (4.40, 5.21),
    (4.54, 4.54), // Working point (vi = vo)
    (4.60, 4.19),
    (4.80, 3.00),
    (4.90, 2.30), // Change of curvature
    (4.95, 2.03),
    (5.00, 1.88),
    (5.05, 1.77),
    (5.10, 1.69),
    (5.20, 1.58),
    (5.40, 1.44),
    (5.60, 1.33),
    (5.80, 1.26),
    (6.00, 1.21),
    (6.40, 1.12),
    (7.00, 1.02),
    (7.50, 0.97),
    (8.50, 0.89),
    (10.00, 0.81),
    (10.31, 0.81), // Approximate end of actual range
];

/// CSG 8580R5 op-amp voltage transfer function, measured on CAP1B/CAP1A.
pub(crate) const OPAMP_VOLTAGE_8580: [(f64, f64); 21] = [
    (1.30, 8.91), // Approximate start of actual range
    (4.76, 8.91),
    (4.77, 8.90),
    (4.78, 8.88),
    (4.785, 8.86),
    (4.79, 8.80),
    (4.795, 8.60),
    (4.80, 8.25),
    (4.805, 7.50),
    (4.81, 6.10),
    (4.815, 4.05), // Change of curvature
    (4.82, 2.27),
    (4.825, 1.65),
    (4.83, 1.55),
    (4.84, 1.47),
    (4.85, 1.43),
    (4.87, 1.37),
    (4.90, 1.34),
    (5.00, 1.30),
    (5.10, 1.30),
    (8.91, 1.30), // Approximate end of actual range
];

// 8580 resonance gain from the feedback/input "resistor" pairs.
//
// R1 = 15.3*Ri, R2 = 7.3*Ri, R3 = 4.7*Ri, Rf = 1.4*Ri, R4 = 1.4*Ri,
// R8 = 2.0*Ri, RC = 2.8*Ri
//
// Bits 0-1 of res select the feedback (Rf, Rf|R1, Rf|R2, Rf|R3), bits 2-3
// select the input (Ri, R4, R8, RC).
const RF_R1: f64 = (1.4 * 15.3) / (1.4 + 15.3);
const RF_R2: f64 = (1.4 * 7.3) / (1.4 + 7.3);
const RF_R3: f64 = (1.4 * 4.7) / (1.4 + 4.7);
const RES_GAIN_8580: [f64; 16] = [
    1.4 / 1.0,
    RF_R1 / 1.0,
    RF_R2 / 1.0,
    RF_R3 / 1.0,
    1.4 / 1.4,
    RF_R1 / 1.4,
    RF_R2 / 1.4,
    RF_R3 / 1.4,
    1.4 / 2.0,
    RF_R1 / 2.0,
    RF_R2 / 2.0,
    RF_R3 / 2.0,
    1.4 / 2.8,
    RF_R1 / 2.8,
    RF_R2 / 2.8,
    RF_R3 / 2.8,
];

/// Runs two table builds, concurrently when threads are available.
#[cfg(feature = "std")]
fn join<A, B, RA, RB>(a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    rayon::join(a, b)
}

#[cfg(not(feature = "std"))]
fn join<A, B, RA, RB>(a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA,
    B: FnOnce() -> RB,
{
    (a(), b())
}

/// Rounds to the nearest u16, saturating at both ends.
#[inline]
fn to_u16(x: f64) -> u16 {
    (x + 0.5) as u16
}

fn points(curve: &[(f64, f64)]) -> Vec<Point> {
    curve.iter().map(|&p| Point::from(p)).collect()
}

/// Voltage normalization of one chip model.
///
/// Voltages in `vmin..vmax` map onto the 16 bit range `0..65535`.
#[derive(Clone, Copy, Debug)]
struct Scale {
    vmin: f64,
    vddt: f64,
    denorm: f64,
    norm: f64,
    n16: f64,
}

impl Scale {
    fn new(curve: &[(f64, f64)], vddt: f64) -> Self {
        let vmin = curve[0].0;
        let vmax = if vddt < curve[0].1 { curve[0].1 } else { vddt };
        let denorm = vmax - vmin;
        let norm = 1.0 / denorm;
        Scale {
            vmin,
            vddt,
            denorm,
            norm,
            n16: norm * 65535.0,
        }
    }

    #[inline]
    fn normalize(&self, v: f64) -> u16 {
        to_u16((v - self.vmin) * self.n16)
    }

    /// Maps capacitor voltage to op-amp input voltage.
    ///
    /// Interpolation below the curve may go negative; `clamp` pins it to 0
    /// first instead of letting the cast saturate.
    fn opamp_rev(&self, curve: &[(f64, f64)], clamp: bool) -> Box<[u16]> {
        let scaled: Vec<Point> = curve
            .iter()
            .map(|&(x, y)| Point {
                x: self.n16 * (x - y + self.denorm) / 2.0,
                y: self.n16 * (x - self.vmin),
            })
            .collect();
        let spline = MonotoneSpline::new(&scaled);
        (0..1 << 16)
            .map(|x| {
                let (out, _) = spline.evaluate(x as f64);
                let tmp = if clamp && out < 0.0 { 0.0 } else { out };
                to_u16(tmp)
            })
            .collect()
    }

    /// Filter summer with 2 - 6 input "resistors", n ~ 1.
    ///
    /// All "on" transistors are modeled as one.
    fn summer(&self, opamp: &mut OpAmp) -> Vec<Box<[u16]>> {
        (0..5)
            .map(|i| {
                let idiv = 2 + i;
                let n = idiv as f64;
                opamp.reset();
                (0..idiv << 16)
                    .map(|vi| {
                        let vin = self.vmin + vi as f64 / self.n16 / idiv as f64;
                        self.normalize(opamp.solve(n, vin))
                    })
                    .collect()
            })
            .collect()
    }

    /// Audio mixer with 0 - 7 input "resistors" at gain `ratio` per input.
    fn mixer(&self, opamp: &mut OpAmp, ratio: f64) -> Vec<Box<[u16]>> {
        (0..8)
            .map(|i| {
                let idiv = if i == 0 { 1 } else { i };
                let size = if i == 0 { 1 } else { i << 16 };
                let n = i as f64 * ratio;
                opamp.reset();
                (0..size)
                    .map(|vi| {
                        let vin = self.vmin + vi as f64 / self.n16 / idiv as f64;
                        self.normalize(opamp.solve(n, vin))
                    })
                    .collect()
            })
            .collect()
    }

    /// 16 gain tables for a 4 bit "resistor" ladder.
    fn gain(&self, opamp: &mut OpAmp, gain: impl Fn(usize) -> f64) -> Vec<Box<[u16]>> {
        (0..16)
            .map(|n8| {
                let n = gain(n8);
                opamp.reset();
                (0..1 << 16)
                    .map(|vi| {
                        let vin = self.vmin + vi as f64 / self.n16;
                        self.normalize(opamp.solve(n, vin))
                    })
                    .collect()
            })
            .collect()
    }
}

/// Table access needed by the filter output stage.
pub trait FilterTables {
    /// Summer table for `inputs` filtered inputs (0 - 4).
    fn summer(&self, inputs: usize) -> &[u16];
    /// Mixer table for `inputs` unfiltered inputs (0 - 7).
    fn mixer(&self, inputs: usize) -> &[u16];
    /// Master volume gain.
    fn volume(&self, vol: u8) -> &[u16];
    /// Bandpass feedback gain.
    fn resonance(&self, res: u8) -> &[u16];
    fn voice_scale_s11(&self) -> i32;
    fn voice_dc(&self) -> i32;
}

/// MOS 6581 filter model.
#[derive(Debug)]
pub struct FilterModelConfig6581 {
    scale: Scale,
    vth: f64,
    u_cox: f64,
    wl_snake: f64,
    c: f64,
    dac_zero: f64,
    dac_scale: f64,
    voice_scale_s11: i32,
    voice_dc: i32,
    summer: Vec<Box<[u16]>>,
    mixer: Vec<Box<[u16]>>,
    gain: Vec<Box<[u16]>>,
    opamp_rev: Box<[u16]>,
    vcr_vg: Box<[u16]>,
    vcr_n_ids_term: Box<[u16]>,
    dac: Dac,
}

impl FilterModelConfig6581 {
    /// Returns the process-wide tables, building them on first use.
    #[cfg(feature = "std")]
    pub fn shared() -> Arc<Self> {
        CONFIG_6581.get_or_init(|| Arc::new(Self::new())).clone()
    }

    /// Builds a fresh set of tables.
    pub fn new() -> Self {
        debug!("building filter model tables for {:?}", ChipModel::Mos6581);

        let vdd = 12.18;
        let vth = 1.31;
        let vddt = vdd - vth;
        let u_cox = 20e-6;
        let wl_vcr = 9.0;
        let c = 470e-12;
        let voice_voltage_range = 1.5;
        let voice_dc_voltage = 5.0;

        let scale = Scale::new(&OPAMP_VOLTAGE_6581, vddt);
        let curve = points(&OPAMP_VOLTAGE_6581);

        let ((summer, mixer), gain) = join(
            || {
                join(
                    || scale.summer(&mut OpAmp::new(&curve, vddt)),
                    || scale.mixer(&mut OpAmp::new(&curve, vddt), 8.0 / 6.0),
                )
            },
            // gain ~ vol/8 and 1/Q ~ ~res/8
            || scale.gain(&mut OpAmp::new(&curve, vddt), |n8| n8 as f64 / 8.0),
        );

        let n_vddt = scale.n16 * (vddt - scale.vmin);
        let vcr_vg = (0..1u64 << 16)
            .map(|i| to_u16(n_vddt - libm::sqrt((i << 16) as f64)))
            .collect();

        // EKV model:
        //
        //   Ids = Is * (if - ir)
        //   Is = 2 * u*Cox * Ut^2 / k * W/L
        //   if = ln^2(1 + e^((k*(Vg - Vt) - Vs) / (2*Ut))
        //   ir = ln^2(1 + e^((k*(Vg - Vt) - Vd) / (2*Ut))
        let is = 2.0 * u_cox * UT * UT * wl_vcr;
        let n15 = scale.norm * 32767.0;
        let n_is = n15 * 1.0e-6 / c * is;
        let vcr_n_ids_term = (0..1 << 16)
            .map(|k| {
                let log_term = libm::log1p(libm::exp((k as f64 / scale.n16) / (2.0 * UT)));
                to_u16(n_is * log_term * log_term)
            })
            .collect();

        FilterModelConfig6581 {
            scale,
            vth,
            u_cox,
            wl_snake: 1.0 / 115.0,
            c,
            dac_zero: 6.65,
            dac_scale: 2.63,
            voice_scale_s11: (scale.norm * 2047.0 * voice_voltage_range) as i32,
            voice_dc: (scale.n16 * (voice_dc_voltage - scale.vmin)) as i32,
            summer,
            mixer,
            gain,
            opamp_rev: scale.opamp_rev(&OPAMP_VOLTAGE_6581, true),
            vcr_vg,
            vcr_n_ids_term,
            dac: Dac::kinked(DAC_BITS, ChipModel::Mos6581),
        }
    }

    /// Cutoff DAC table. `adjustment` 0.0 - 1.0 lowers the DAC zero point
    /// from 7.65V to 6.65V.
    pub fn f0_dac(&self, adjustment: f64) -> Box<[u16]> {
        let dac_zero = self.dac_zero + (1.0 - adjustment);
        (0..1u32 << DAC_BITS)
            .map(|i| {
                let fcd = self.dac.output(i);
                to_u16(self.scale.n16 * (dac_zero + fcd * self.dac_scale / 2048.0 - self.scale.vmin))
            })
            .collect()
    }

    pub fn build_integrator(&self) -> Integrator6581 {
        let scale = &self.scale;
        // Normalized snake current factor, 1 cycle at 1MHz.
        let n_snake =
            to_u16(scale.denorm * 8192.0 * (self.u_cox / 2.0 * self.wl_snake * 1.0e-6 / self.c));
        Integrator6581::new(
            to_u16(scale.n16 * (scale.vddt - scale.vmin)),
            to_u16(scale.n16 * (self.vth - scale.vmin)),
            to_u16(scale.n16 * scale.vmin),
            n_snake,
        )
    }

    #[inline]
    pub fn opamp_rev(&self, i: usize) -> u16 {
        self.opamp_rev[i]
    }

    #[inline]
    pub fn vcr_vg(&self, i: usize) -> u16 {
        self.vcr_vg[i]
    }

    #[inline]
    pub fn vcr_n_ids_term(&self, i: usize) -> u16 {
        self.vcr_n_ids_term[i]
    }
}

impl Default for FilterModelConfig6581 {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterTables for FilterModelConfig6581 {
    fn summer(&self, inputs: usize) -> &[u16] {
        &self.summer[inputs]
    }

    fn mixer(&self, inputs: usize) -> &[u16] {
        &self.mixer[inputs]
    }

    fn volume(&self, vol: u8) -> &[u16] {
        &self.gain[usize::from(vol & 0x0f)]
    }

    // 1/Q is controlled linearly by res.
    fn resonance(&self, res: u8) -> &[u16] {
        &self.gain[usize::from(!res & 0x0f)]
    }

    fn voice_scale_s11(&self) -> i32 {
        self.voice_scale_s11
    }

    fn voice_dc(&self) -> i32 {
        self.voice_dc
    }
}

/// CSG 8580 filter model.
#[derive(Debug)]
pub struct FilterModelConfig8580 {
    scale: Scale,
    vth: f64,
    u_cox: f64,
    c: f64,
    voice_scale_s11: i32,
    voice_dc: i32,
    summer: Vec<Box<[u16]>>,
    mixer: Vec<Box<[u16]>>,
    gain_vol: Vec<Box<[u16]>>,
    gain_res: Vec<Box<[u16]>>,
    opamp_rev: Box<[u16]>,
}

impl FilterModelConfig8580 {
    /// Returns the process-wide tables, building them on first use.
    #[cfg(feature = "std")]
    pub fn shared() -> Arc<Self> {
        CONFIG_8580.get_or_init(|| Arc::new(Self::new())).clone()
    }

    /// Builds a fresh set of tables.
    pub fn new() -> Self {
        debug!("building filter model tables for {:?}", ChipModel::Mos8580);

        let vdd = 9.09;
        let vth = 0.80;
        let vddt = vdd - vth;
        let voice_voltage_range = 0.25;
        let voice_dc_voltage = 4.80;

        let scale = Scale::new(&OPAMP_VOLTAGE_8580, vddt);
        let curve = points(&OPAMP_VOLTAGE_8580);

        // The four table families share nothing but the input curve.
        let ((summer, mixer), (gain_vol, gain_res)) = join(
            || {
                join(
                    || scale.summer(&mut OpAmp::new(&curve, vddt)),
                    || scale.mixer(&mut OpAmp::new(&curve, vddt), 8.0 / 5.0),
                )
            },
            || {
                join(
                    // gain ~ vol/16
                    || scale.gain(&mut OpAmp::new(&curve, vddt), |n8| n8 as f64 / 16.0),
                    || scale.gain(&mut OpAmp::new(&curve, vddt), |n8| RES_GAIN_8580[n8]),
                )
            },
        );

        FilterModelConfig8580 {
            scale,
            vth,
            u_cox: 100e-6,
            c: 22e-9,
            voice_scale_s11: (scale.norm * 2047.0 * voice_voltage_range) as i32,
            voice_dc: (scale.n16 * (voice_dc_voltage - scale.vmin)) as i32,
            summer,
            mixer,
            gain_vol,
            gain_res,
            opamp_rev: scale.opamp_rev(&OPAMP_VOLTAGE_8580, false),
        }
    }

    pub fn build_integrator(&self) -> Integrator8580 {
        let n_kp = self.scale.denorm * (self.u_cox / 2.0 * 1.0e-6 / self.c);
        Integrator8580::new(self.vth, n_kp, self.scale.vmin, self.scale.n16)
    }

    #[inline]
    pub fn opamp_rev(&self, i: usize) -> u16 {
        self.opamp_rev[i]
    }
}

impl Default for FilterModelConfig8580 {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterTables for FilterModelConfig8580 {
    fn summer(&self, inputs: usize) -> &[u16] {
        &self.summer[inputs]
    }

    fn mixer(&self, inputs: usize) -> &[u16] {
        &self.mixer[inputs]
    }

    fn volume(&self, vol: u8) -> &[u16] {
        &self.gain_vol[usize::from(vol & 0x0f)]
    }

    fn resonance(&self, res: u8) -> &[u16] {
        &self.gain_res[usize::from(res & 0x0f)]
    }

    fn voice_scale_s11(&self) -> i32 {
        self.voice_scale_s11
    }

    fn voice_dc(&self) -> i32 {
        self.voice_dc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_covers_curve() {
        let scale = Scale::new(&OPAMP_VOLTAGE_6581, 12.18 - 1.31);
        assert_eq!(scale.normalize(scale.vmin), 0);
        assert_eq!(scale.normalize(scale.vmin + scale.denorm), 65535);
    }

    #[test]
    fn opamp_rev_is_monotone() {
        let scale = Scale::new(&OPAMP_VOLTAGE_6581, 12.18 - 1.31);
        let table = scale.opamp_rev(&OPAMP_VOLTAGE_6581, true);
        assert_eq!(table.len(), 65536);
        for i in 1..table.len() {
            assert!(table[i] >= table[i - 1], "opamp_rev[{}] decreases", i);
        }
    }

    #[test]
    fn resonance_gains_decrease_with_input_resistor() {
        for feedback in 0..4 {
            for input in 1..4 {
                assert!(
                    RES_GAIN_8580[input * 4 + feedback] < RES_GAIN_8580[(input - 1) * 4 + feedback]
                );
            }
        }
        assert!((RES_GAIN_8580[1] - 1.28263).abs() < 1e-5);
        assert!((RES_GAIN_8580[15] - 0.385246).abs() < 1e-5);
    }

    #[test]
    fn config_6581_table_shapes() {
        let config = FilterModelConfig6581::new();
        for i in 0..5 {
            assert_eq!(config.summer(i).len(), (2 + i) << 16);
        }
        assert_eq!(config.mixer(0).len(), 1);
        for i in 1..8 {
            assert_eq!(config.mixer(i).len(), i << 16);
        }
        assert_eq!(config.volume(15).len(), 65536);
        assert!(config.voice_scale_s11() > 0);
        assert!(config.voice_dc() > 0);

        let f0_dac = config.f0_dac(0.5);
        assert_eq!(f0_dac.len(), 2048);
        let brighter = config.f0_dac(1.0);
        assert!(brighter[1024] < f0_dac[1024]);
    }

    /// Resonance register is inverted relative to the volume ladder.
    #[test]
    fn config_6581_resonance_mirrors_volume() {
        let config = FilterModelConfig6581::new();
        for res in 0..16u8 {
            assert_eq!(config.resonance(res).as_ptr(), config.volume(15 - res).as_ptr());
        }
    }

    #[test]
    fn config_8580_volume_zero_is_silent() {
        let config = FilterModelConfig8580::new();
        let vol0 = config.volume(0);
        let first = i32::from(vol0[0]);
        assert!(vol0.iter().all(|&v| (i32::from(v) - first).abs() <= 1));
        let vol15 = config.volume(15);
        assert!(vol15[0] != vol15[65535]);
    }

    #[cfg(feature = "std")]
    #[test]
    fn shared_configs_are_reused() {
        let a = FilterModelConfig8580::shared();
        let b = FilterModelConfig8580::shared();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
