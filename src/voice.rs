// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use super::envelope::EnvelopeGenerator;
use super::wave::WaveformGenerator;

/// A single SID voice combining waveform and envelope generators.
///
/// Both generators look their outputs up in DAC tables, so the product is
/// the amplitude modulated voice level with the oscillator DC offset already
/// removed. Range is roughly +-2^20.
#[derive(Clone, Debug, Default)]
pub struct Voice {
    pub(crate) wave: WaveformGenerator,
    pub(crate) envelope: EnvelopeGenerator,
}

impl Voice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wave(&self) -> &WaveformGenerator {
        &self.wave
    }

    pub fn envelope(&self) -> &EnvelopeGenerator {
        &self.envelope
    }

    /// Control register goes to both generators.
    pub fn write_control_reg(&mut self, control: u8) {
        self.wave.write_control_reg(control);
        self.envelope.write_control_reg(control);
    }

    /// Amplitude modulated waveform output.
    #[inline]
    pub fn output(&mut self, ring_modulator: &WaveformGenerator) -> i32 {
        (self.wave.output(ring_modulator) * self.envelope.output()) as i32
    }

    pub fn reset(&mut self) {
        self.wave.reset();
        self.envelope.reset();
    }
}
