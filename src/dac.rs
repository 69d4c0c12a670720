// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! R-2R ladder DAC model.
//!
//! The 6581 ladders have 2R/R ~ 2.20 and lack the termination resistor at
//! bit 0, so their output is not monotonic. The 8580 ladders are terminated
//! and matched. Both leak a little current through "off" transistors.
//!
//! The same model drives the 8-bit envelope DACs, the 12-bit oscillator DACs
//! and the 11-bit filter cutoff DAC.

use alloc::vec::Vec;

use crate::ChipModel;

/// Stands in for the missing termination resistor.
const R_INFINITY: f64 = 1e6;

impl ChipModel {
    const fn dac_leakage(self) -> f64 {
        match self {
            ChipModel::Mos6581 => 0.0075,
            ChipModel::Mos8580 => 0.0035,
        }
    }

    const fn dac_2r_ratio(self) -> f64 {
        match self {
            ChipModel::Mos6581 => 2.20,
            ChipModel::Mos8580 => 2.00,
        }
    }
}

fn parallel(r1: f64, r2: f64) -> f64 {
    (r1 * r2) / (r1 + r2)
}

/// Normalized voltage contribution of one bit of the ladder.
fn bit_voltage(set_bit: usize, bits: usize, r2: f64, terminated: bool) -> f64 {
    let r = 1.0;
    let mut vn = 1.0;
    let mut rn = if terminated { r2 } else { R_INFINITY };

    for _ in 0..set_bit {
        rn = if rn == R_INFINITY {
            r + r2
        } else {
            r + parallel(r2, rn)
        };
    }

    if rn == R_INFINITY {
        rn = r2;
    } else {
        rn = parallel(r2, rn);
        vn *= rn / r2;
    }

    for _ in (set_bit + 1)..bits {
        rn += r;
        let i = vn / rn;
        rn = parallel(r2, rn);
        vn = rn * i;
    }

    vn
}

/// Nonlinear DAC with per-bit weights.
#[derive(Clone, Debug)]
pub struct Dac {
    bits: Vec<f64>,
    leakage: f64,
}

impl Dac {
    /// Builds the ladder of `bits` bits as found in `chip_model`.
    pub fn kinked(bits: usize, chip_model: ChipModel) -> Self {
        let r2 = chip_model.dac_2r_ratio();
        let terminated = chip_model == ChipModel::Mos8580;

        let mut weights: Vec<f64> = (0..bits)
            .map(|bit| bit_voltage(bit, bits, r2, terminated))
            .collect();
        let total: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= total;
        }

        Dac {
            bits: weights,
            leakage: chip_model.dac_leakage(),
        }
    }

    /// Output for a digital input, normalized so all-ones gives ~1.0.
    pub fn output(&self, input: u32) -> f64 {
        self.bits
            .iter()
            .enumerate()
            .map(|(i, &w)| {
                if input & (1 << i) != 0 {
                    w
                } else {
                    w * self.leakage
                }
            })
            .sum()
    }

    /// Evaluates every possible input.
    pub fn table(&self) -> Vec<f64> {
        (0..1u32 << self.bits.len()).map(|i| self.output(i)).collect()
    }
}
