// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use alloc::sync::Arc;
use alloc::vec;

use bit_field::BitField;

// The rate counter is a 15 bit LFSR. Instead of counting cycles, the
// register is compared against the ADSR table entry for the current rate;
// on a match the LFSR is reset to 0x7fff and the envelope steps. The table
// holds the LFSR states reached after the rate period minus one shifts.
//
// Rate periods, measured by sampling ENV3:
//
//     9     // 2ms*1.0MHz/256 = 7.81
//     32    // 8ms*1.0MHz/256 = 31.25
//     63    // 16ms*1.0MHz/256 = 62.50
//     95    // 24ms*1.0MHz/256 = 93.75
//     149   // 38ms*1.0MHz/256 = 148.44
//     220   // 56ms*1.0MHz/256 = 218.75
//     267   // 68ms*1.0MHz/256 = 265.63
//     313   // 80ms*1.0MHz/256 = 312.50
//     392   // 100ms*1.0MHz/256 = 390.63
//     977   // 250ms*1.0MHz/256 = 976.56
//     1954  // 500ms*1.0MHz/256 = 1953.13
//     3126  // 800ms*1.0MHz/256 = 3125.00
//     3907  // 1 s*1.0MHz/256 =  3906.25
//     11720 // 3 s*1.0MHz/256 = 11718.75
//     19532 // 5 s*1.0MHz/256 = 19531.25
//     31251 // 8 s*1.0MHz/256 = 31250.00
//
// Lowering the rate below the current LFSR position makes the LFSR run its
// full period of 32767 states before the next match (the ADSR delay bug).
const ADSR_TABLE: [u16; 16] = [
    0x007f, 0x3000, 0x1e00, 0x0660, 0x0182, 0x5573, 0x000e, 0x3805, 0x2424, 0x2220, 0x090c,
    0x0ecd, 0x010e, 0x23f7, 0x5237, 0x64a8,
];

/// Envelope generator state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Attack phase ramping up toward 0xff.
    Attack,
    /// Decay toward sustain, then hold.
    DecaySustain,
    /// Release toward zero after gate off.
    Release,
}

/// SID ADSR envelope generator.
///
/// A 15 bit LFSR divides the clock to the envelope counter by the selected
/// rate. Another counter implements exponential decay, with periods
/// 1, 2, 4, 8, 16, 30 at envelope values 255, 93, 54, 26, 14, 6.
///
/// State switches, envelope steps and exponential steps all pass through
/// short pipelines which reproduce the chip's cycle timing.
#[derive(Clone, Debug)]
pub struct EnvelopeGenerator {
    dac: Arc<[f32]>,
    lfsr: u16,
    rate: u16,
    exponential_counter: u8,
    exponential_counter_period: u8,
    new_exponential_counter_period: u8,
    state_pipeline: u8,
    envelope_pipeline: u8,
    exponential_pipeline: u8,
    state: State,
    next_state: State,
    counter_enabled: bool,
    gate: bool,
    reset_lfsr: bool,
    envelope_counter: u8,
    attack: u8,
    decay: u8,
    sustain: u8,
    release: u8,
    /// Counter value sampled at the start of the cycle, as seen on ENV3.
    env3: u8,
}

impl Default for EnvelopeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvelopeGenerator {
    pub fn new() -> Self {
        EnvelopeGenerator {
            dac: Arc::from(vec![0.0f32; 256]),
            lfsr: 0x7fff,
            rate: 0,
            exponential_counter: 0,
            exponential_counter_period: 1,
            new_exponential_counter_period: 0,
            state_pipeline: 0,
            envelope_pipeline: 0,
            exponential_pipeline: 0,
            state: State::Release,
            next_state: State::Release,
            counter_enabled: true,
            gate: false,
            reset_lfsr: false,
            envelope_counter: 0xaa,
            attack: 0,
            decay: 0,
            sustain: 0,
            release: 0,
            env3: 0,
        }
    }

    /// Sets the envelope DAC, 256 entries.
    pub fn set_dac(&mut self, dac: Arc<[f32]>) {
        self.dac = dac;
    }

    /// Current state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Raw envelope counter.
    pub fn counter(&self) -> u8 {
        self.envelope_counter
    }

    /// DAC level of the envelope counter.
    #[inline]
    pub fn output(&self) -> f32 {
        self.dac[usize::from(self.envelope_counter)]
    }

    /// ENV3 readback.
    pub fn read_env(&self) -> u8 {
        self.env3
    }

    /// Resets the registers and pipelines. The envelope counter is not changed.
    pub fn reset(&mut self) {
        self.envelope_pipeline = 0;
        self.state_pipeline = 0;
        self.attack = 0;
        self.decay = 0;
        self.sustain = 0;
        self.release = 0;
        self.gate = false;
        self.reset_lfsr = true;
        self.exponential_counter = 0;
        self.exponential_counter_period = 1;
        self.new_exponential_counter_period = 0;
        self.state = State::Release;
        self.counter_enabled = true;
        self.rate = ADSR_TABLE[usize::from(self.release)];
    }

    pub fn write_control_reg(&mut self, control: u8) {
        let gate_next = control.get_bit(0);
        if gate_next == self.gate {
            return;
        }
        self.gate = gate_next;

        if gate_next {
            // Gate bit on: start attack, decay, sustain.
            self.next_state = State::Attack;
            self.state_pipeline = 2;
            if self.reset_lfsr || self.exponential_pipeline == 2 {
                self.envelope_pipeline =
                    if self.exponential_counter_period == 1 || self.exponential_pipeline == 2 {
                        2
                    } else {
                        4
                    };
            } else if self.exponential_pipeline == 1 {
                self.state_pipeline = 3;
            }
        } else {
            // Gate bit off: start release.
            self.next_state = State::Release;
            self.state_pipeline = if self.envelope_pipeline > 0 { 3 } else { 2 };
        }
    }

    pub fn write_attack_decay(&mut self, attack_decay: u8) {
        self.attack = attack_decay.get_bits(4..8);
        self.decay = attack_decay.get_bits(0..4);
        match self.state {
            State::Attack => self.rate = ADSR_TABLE[usize::from(self.attack)],
            State::DecaySustain => self.rate = ADSR_TABLE[usize::from(self.decay)],
            State::Release => {}
        }
    }

    pub fn write_sustain_release(&mut self, sustain_release: u8) {
        // Both nibbles of the counter are compared against the sustain value.
        self.sustain = (sustain_release & 0xf0) | (sustain_release >> 4);
        self.release = sustain_release.get_bits(0..4);
        if self.state == State::Release {
            self.rate = ADSR_TABLE[usize::from(self.release)];
        }
    }

    #[inline]
    pub fn clock(&mut self) {
        self.env3 = self.envelope_counter;

        if self.new_exponential_counter_period > 0 {
            self.exponential_counter_period = self.new_exponential_counter_period;
            self.new_exponential_counter_period = 0;
        }

        if self.state_pipeline != 0 {
            self.state_change();
        }

        if self.envelope_pipeline != 0 && decrement(&mut self.envelope_pipeline) {
            if self.counter_enabled {
                if self.state == State::Attack {
                    self.envelope_counter = self.envelope_counter.wrapping_add(1);
                    if self.envelope_counter == 0xff {
                        self.next_state = State::DecaySustain;
                        self.state_pipeline = 3;
                    }
                } else {
                    self.envelope_counter = self.envelope_counter.wrapping_sub(1);
                    // Frozen at zero until the next attack.
                    if self.envelope_counter == 0x00 {
                        self.counter_enabled = false;
                    }
                }
                self.set_exponential_counter();
            }
        } else if self.exponential_pipeline != 0 && decrement(&mut self.exponential_pipeline) {
            self.exponential_counter = 0;
            if (self.state == State::DecaySustain && self.envelope_counter != self.sustain)
                || self.state == State::Release
            {
                // Step down on the next cycle.
                self.envelope_pipeline = 1;
            }
        } else if self.reset_lfsr {
            self.lfsr = 0x7fff;
            self.reset_lfsr = false;

            if self.state == State::Attack {
                // The first attack step also clears the exponential counter.
                self.exponential_counter = 0;
                self.envelope_pipeline = 2;
            } else if self.counter_enabled {
                self.exponential_counter = self.exponential_counter.wrapping_add(1);
                if self.exponential_counter == self.exponential_counter_period {
                    self.exponential_pipeline = if self.exponential_counter_period != 1 {
                        2
                    } else {
                        1
                    };
                }
            }
        }

        // Advance the LFSR unless it matched the rate, in which case it
        // resets on the next cycle.
        if self.lfsr != self.rate {
            let feedback = ((self.lfsr << 14) ^ (self.lfsr << 13)) & 0x4000;
            self.lfsr = (self.lfsr >> 1) | feedback;
        } else {
            self.reset_lfsr = true;
        }
    }

    fn state_change(&mut self) {
        self.state_pipeline -= 1;

        match self.next_state {
            State::Attack => {
                if self.state_pipeline == 1 {
                    // The decay rate is briefly active before attack.
                    self.rate = ADSR_TABLE[usize::from(self.decay)];
                } else if self.state_pipeline == 0 {
                    self.state = State::Attack;
                    self.rate = ADSR_TABLE[usize::from(self.attack)];
                    self.counter_enabled = true;
                }
            }
            State::DecaySustain => {
                if self.state_pipeline == 0 {
                    self.state = State::DecaySustain;
                    self.rate = ADSR_TABLE[usize::from(self.decay)];
                }
            }
            State::Release => {
                if (self.state == State::Attack && self.state_pipeline == 0)
                    || (self.state == State::DecaySustain && self.state_pipeline == 1)
                {
                    self.state = State::Release;
                    self.rate = ADSR_TABLE[usize::from(self.release)];
                }
            }
        }
    }

    /// Period changes take effect on the next cycle.
    fn set_exponential_counter(&mut self) {
        let period = match self.envelope_counter {
            0xff | 0x00 => 1,
            0x5d => 2,
            0x36 => 4,
            0x1a => 8,
            0x0e => 16,
            0x06 => 30,
            _ => return,
        };
        self.new_exponential_counter_period = period;
    }
}

/// Decrements a non-zero pipeline, returning true when it reaches zero.
#[inline]
fn decrement(pipeline: &mut u8) -> bool {
    *pipeline -= 1;
    *pipeline == 0
}
