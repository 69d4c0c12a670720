// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Filter integrators.
//!
//! Each filter stage is an op-amp integrator:
//!
//! ```text
//!                    +---C---+
//!                    |       |
//!      vi --o--Rw--o-o--[A>--o-- vo
//!           |      | vx
//!           +--Rs--+
//! ```
//!
//! On the 6581, Rw is a voltage controlled resistor (VCR) driven by the
//! cutoff DAC and Rs is the "snake" resistor, both modeled with the EKV
//! transistor equations. On the 8580 the resistor is a switched capacitor
//! network whose W/L is set directly by the cutoff register bits.
//!
//! All voltages are 16 bit normalized. The capacitor charge `vc` is kept
//! with 15 extra bits of precision.

use super::config::{FilterModelConfig6581, FilterModelConfig8580};

#[inline]
fn opamp_index(vc: i32) -> usize {
    ((vc >> 15) + (1 << 15)).clamp(0, 65535) as usize
}

/// 6581 integrator state.
///
/// Tables are passed to [`solve`](Self::solve) so the integrator does not
/// borrow its config.
#[derive(Clone, Debug)]
pub struct Integrator6581 {
    vx: u16,
    vc: i32,
    /// (nVddt - Vw)^2 / 2
    n_vddt_vw_2: u32,
    n_vddt: u16,
    n_vt: u16,
    n_vmin: u16,
    n_snake: u16,
}

impl Integrator6581 {
    pub fn new(n_vddt: u16, n_vt: u16, n_vmin: u16, n_snake: u16) -> Self {
        Integrator6581 {
            vx: 0,
            vc: 0,
            n_vddt_vw_2: 0,
            n_vddt,
            n_vt,
            n_vmin,
            n_snake,
        }
    }

    /// Sets the VCR gate control voltage from the cutoff DAC.
    #[inline]
    pub fn set_vw(&mut self, vw: u16) {
        let diff = u32::from(self.n_vddt.saturating_sub(vw));
        self.n_vddt_vw_2 = (diff * diff) >> 1;
    }

    #[inline]
    pub fn solve(&mut self, vi: i32, config: &FilterModelConfig6581) -> i32 {
        let n_vddt = u32::from(self.n_vddt);

        // "Snake" voltages for triode mode calculation.
        let vgst = n_vddt.wrapping_sub(u32::from(self.vx));
        let vgdt = n_vddt.wrapping_sub(vi as u32);

        let vgst_2 = vgst.wrapping_mul(vgst);
        let vgdt_2 = vgdt.wrapping_mul(vgdt);

        // Snake current, scaled by m*2^30.
        let n_i_snake =
            i32::from(self.n_snake).wrapping_mul(vgst_2.wrapping_sub(vgdt_2) as i32 >> 15);

        // VCR gate voltage: Vg = Vddt - sqrt(((Vddt - Vw)^2 + Vgdt^2) / 2)
        let vg_index = (self.n_vddt_vw_2.wrapping_add(vgdt_2 >> 1) >> 16).min(65535);
        let n_vg = i32::from(config.vcr_vg(vg_index as usize));
        let k_vgt = n_vg - i32::from(self.n_vt) - i32::from(self.n_vmin);

        // VCR voltages for EKV model table lookup.
        let vgs = (k_vgt - i32::from(self.vx)).clamp(0, 65535) as usize;
        let vgd = k_vgt.wrapping_sub(vi).clamp(0, 65535) as usize;

        // VCR current, scaled by m*2^15*2^15 = m*2^30.
        let n_i_vcr = (i32::from(config.vcr_n_ids_term(vgs))
            - i32::from(config.vcr_n_ids_term(vgd)))
            << 15;

        self.vc = self.vc.wrapping_add(n_i_snake).wrapping_add(n_i_vcr);

        // vx = g(vc)
        self.vx = config.opamp_rev(opamp_index(self.vc));

        i32::from(self.vx) - (self.vc >> 14)
    }
}

/// 8580 integrator state.
#[derive(Clone, Debug)]
pub struct Integrator8580 {
    vx: u16,
    vc: i32,
    n_vgt: u16,
    n_dac: u16,
    vth: f64,
    n_kp: f64,
    vmin: f64,
    n16: f64,
}

impl Integrator8580 {
    pub fn new(vth: f64, n_kp: f64, vmin: f64, n16: f64) -> Self {
        let mut integrator = Integrator8580 {
            vx: 0,
            vc: 0,
            n_vgt: 0,
            n_dac: 0,
            vth,
            n_kp,
            vmin,
            n16,
        };
        integrator.set_v(1.5);
        integrator
    }

    /// Sets the normalized current factor from the cutoff W/L, 1 cycle at 1MHz.
    pub fn set_fc(&mut self, wl: f64) {
        self.n_dac = (8192.0 * self.n_kp * wl + 0.5) as u16;
    }

    /// Sets the gate voltage divider ratio, `Vg = 4.76 * v`.
    pub fn set_v(&mut self, v: f64) {
        let vgt = 4.76 * v - self.vth;
        self.n_vgt = (self.n16 * (vgt - self.vmin) + 0.5) as u16;
    }

    #[inline]
    pub fn solve(&mut self, vi: i32, config: &FilterModelConfig8580) -> i32 {
        let n_vgt = u32::from(self.n_vgt);

        let vgst = n_vgt.wrapping_sub(u32::from(self.vx));
        // Saturation mode once vi reaches the gate voltage.
        let vgdt = if vi < i32::from(self.n_vgt) {
            n_vgt.wrapping_sub(vi as u32)
        } else {
            0
        };

        let vgst_2 = vgst.wrapping_mul(vgst);
        let vgdt_2 = vgdt.wrapping_mul(vgdt);

        // DAC current, scaled by m*2^30.
        let n_i_dac =
            i32::from(self.n_dac).wrapping_mul(vgst_2.wrapping_sub(vgdt_2) as i32 >> 15);

        self.vc = self.vc.wrapping_add(n_i_dac);
        self.vx = config.opamp_rev(opamp_index(self.vc));

        i32::from(self.vx) - (self.vc >> 14)
    }
}
