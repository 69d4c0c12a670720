//! Row decoding and position changes at tick 0.

use log::trace;

use super::channel::LoopType;
use super::effects::Effect;
use super::module::{Creator, Entry, InstrumentLoop, Module};
use super::state::{ModuleSynth, IDLE_COUNTER};
use super::tables::PitchTables;

/// Speeds below this value set ticks per row, others set the tempo.
const TEMPO_THRESHOLD: u8 = 0x20;

impl ModuleSynth {
    /// Applies the row changes requested by the previous row.
    ///
    /// A position jump picks the order, a pattern break the row inside it.
    /// A pattern loop overrides both. Jumping backwards or past the last
    /// order ends the module.
    pub(crate) fn apply_delayed(&mut self, module: &Module) {
        let orders = module.orders(self.song);
        let delayed = core::mem::take(&mut self.delayed);
        let mut module_end = delayed.module_end;

        if let Some(jump) = delayed.pattern_jump {
            if jump < orders {
                if jump < self.order {
                    module_end = true;
                }
                self.order = jump;
            } else {
                self.order = 0;
                module_end = true;
            }
            self.update_pattern(module);
            self.row = 0;
        }

        if let Some(row) = delayed.pattern_break {
            if delayed.pattern_jump.is_none() && self.row > 0 {
                self.order += 1;
                if self.order >= orders {
                    self.order = 0;
                    module_end = true;
                }
            }
            self.update_pattern(module);
            let rows = module.patterns.get(self.pattern).map_or(1, |p| p.rows());
            self.row = row.min(rows.saturating_sub(1));
        }

        if let Some(track) = delayed.loop_track {
            if let Some(mt) = self.tracks.get(track) {
                self.order = mt.loop_order;
                self.row = mt.loop_row;
                self.update_pattern(module);
            }
        } else if module_end {
            self.end_reached = true;
        }
    }

    fn update_pattern(&mut self, module: &Module) {
        if let Some(&pattern) = module
            .songs
            .get(self.song)
            .and_then(|s| s.play_list.get(self.order))
        {
            self.pattern = pattern;
        }
    }

    /// Advances to the next order, wrapping at the song end.
    pub(crate) fn next_pattern(&mut self, module: &Module) {
        self.order += 1;
        if self.order >= module.orders(self.song) {
            self.order = 0;
            self.delayed.module_end = true;
        }
        self.update_pattern(module);
        self.row = 0;
        trace!("order {} pattern {}", self.order, self.pattern);
    }

    /// Picks up speed and tempo changes of the coming row before its other
    /// effects are evaluated.
    pub(crate) fn scan_for_speed(&mut self, module: &Module) {
        let Some(pattern) = module.patterns.get(self.pattern) else {
            return;
        };
        for track in 0..module.num_tracks {
            let entry = pattern.entry(self.row, track);
            for (cmd, parameter) in entry.effects() {
                if cmd != Effect::SetTempo as u8 {
                    continue;
                }
                match parameter {
                    // F00 stops the song.
                    0 => self.pattern_delay = i32::MAX,
                    p if p < TEMPO_THRESHOLD => self.speed = i32::from(p),
                    p => self.tempo = i32::from(p),
                }
            }
        }
    }

    /// Decodes the current row for every track and advances the row.
    ///
    /// | note | instrument | instrument | retrigger | pitch | default volume |
    /// |------|------------|------------|-----------|-------|----------------|
    /// |  no  |     no     |     -      |    no     |  no   |       no       |
    /// |  no  |    yes     |  change    |    no     |  no   |      yes       |
    /// | yes  |     no     |     -      |   yes     | yes*  |       no       |
    /// | yes  |    yes     |  change    |   yes     | yes*  |      yes       |
    ///
    /// (*) a portamento to note in either effect column turns the note into
    /// the portamento target instead.
    pub(crate) fn next_row(&mut self, module: &Module, tables: &PitchTables) {
        let Some(pattern) = module.patterns.get(self.pattern) else {
            self.next_pattern(module);
            return;
        };
        let rows = pattern.rows();

        for track in 0..self.tracks.len() {
            let entry = pattern.entry(self.row, track);
            {
                let mt = &mut self.tracks[track];
                mt.trigger_counter = IDLE_COUNTER;
                mt.cut_counter = IDLE_COUNTER;
                mt.retrigger = 0;
                mt.play_backwards = false;
            }

            let instrument = i32::from(entry.instrument);
            if instrument != 0 && instrument != self.tracks[track].instrument {
                self.select_instrument(module, track, instrument);
            }

            if entry.octave != 0 {
                if entry.note < 12 {
                    self.note(module, tables, track, &entry);
                } else {
                    self.key_off(track);
                }
            }

            if instrument != 0 {
                self.default_volume(module, track);
                self.tracks[track].trigger_offset = 0;
            }

            for (cmd, parameter) in entry.effects() {
                if cmd != 0 || parameter != 0 {
                    self.effect(module, track, cmd, parameter);
                }
            }
        }

        self.row += 1;
        if self.row >= rows {
            self.next_pattern(module);
        }
    }

    fn note(&mut self, module: &Module, tables: &PitchTables, track: usize, entry: &Entry) {
        let porta = entry
            .effects()
            .iter()
            .any(|&(cmd, _)| Effect::is_portamento_to_note(cmd));
        let speed = self.speed;
        let mt = &mut self.tracks[track];
        let octave = i32::from(entry.octave);
        let note = i32::from(entry.note);

        let (pitch, target) = match module.creator {
            Creator::DigiBooster2 => {
                let index = (octave - 1) * 12 + note;
                let period = usize::try_from(index)
                    .ok()
                    .and_then(|i| tables.periods.get(i))
                    .copied()
                    .unwrap_or(0);
                if !porta {
                    mt.note = index;
                }
                (period, period)
            }
            Creator::DigiBooster3 => {
                let fine_tune = (octave * 12 + note) << 3;
                (fine_tune * speed, fine_tune)
            }
        };

        if porta {
            mt.porta3_target = target;
        } else {
            mt.pitch = pitch;
            // Triggers at tick 0 unless an effect delays it.
            mt.trigger_counter = 0;
        }
    }

    /// Key off releases the first hold point of both envelopes. Without any
    /// envelope the note stops.
    fn key_off(&mut self, track: usize) {
        let mt = &mut self.tracks[track];
        if mt.volume_envelope.index.is_none() && mt.panning_envelope.index.is_none() {
            mt.is_on = false;
        }
        if mt.volume_envelope.index.is_some() {
            mt.volume_envelope.key_off();
        }
        if mt.panning_envelope.index.is_some() {
            mt.panning_envelope.key_off();
        }
    }

    /// Switches the track to instrument `number`. Missing instruments and
    /// empty samples leave the track without an instrument.
    pub(crate) fn select_instrument(&mut self, module: &Module, track: usize, number: i32) {
        let mt = &mut self.tracks[track];
        mt.instrument = 0;
        mt.is_on = false;

        let Some(instrument) = module.instrument(number) else {
            return;
        };
        mt.volume_envelope.index = instrument.volume_envelope;
        mt.panning_envelope.index = instrument.panning_envelope;

        let Some(sample) = module.samples.get(instrument.sample) else {
            return;
        };
        if sample.frames() == 0 {
            return;
        }
        mt.sample = Some(instrument.sample);
        mt.sample_length = sample.frames() as u32;
        match instrument.loop_type {
            InstrumentLoop::None => {
                mt.sample_loop_start = 0;
                mt.sample_loop_length = 0;
            }
            InstrumentLoop::Forward | InstrumentLoop::PingPong => {
                mt.sample_loop_start = instrument.loop_start;
                mt.sample_loop_length = instrument.loop_length;
                mt.sample_loop_type = if instrument.loop_type == InstrumentLoop::PingPong {
                    LoopType::PingPong
                } else {
                    LoopType::Normal
                };
            }
        }
        mt.instrument = number;
    }

    /// Instrument volume and panning; also restarts both envelopes.
    fn default_volume(&mut self, module: &Module, track: usize) {
        let speed = self.speed;
        let mt = &mut self.tracks[track];
        let Some(instrument) = module.instrument(mt.instrument) else {
            return;
        };
        mt.volume = instrument.volume * speed;
        mt.panning = instrument.panning * speed;
        mt.volume_envelope.restart();
        mt.panning_envelope.restart();
    }
}
