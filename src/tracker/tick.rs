//! Per-tick sequencing: slides, triggers, envelopes, gains and pitch.

use alloc::vec::Vec;

use log::trace;

use super::channel::VirtualChannel;
use super::envelope::ENVELOPE_ONE;
use super::module::{Creator, Module};
use super::state::{ModuleSynth, MAX_GLOBAL_VOLUME, MAX_PATTERN_DELAY};
use super::tables::{PitchTables, FINE_TUNES, MAX_SPEED};
use super::PlayerEvent;

/// NTSC Amiga clock, converts periods to frequencies.
const AMIGA_NTSC_CLOCK: i32 = 3_579_545;
/// PAL Amiga clock used for the final DigiBooster 2 rate.
const AMIGA_PAL_CLOCK: i32 = 3_546_895;
/// Sample rate of C-3 in ProTracker.
const PROTRACKER_C3: i32 = 8363;

impl ModuleSynth {
    /// Runs one tick and pushes the results to `channels`.
    pub(crate) fn next_tick<C: VirtualChannel>(
        &mut self,
        module: &Module,
        tables: &PitchTables,
        channels: &mut [C],
        events: &mut Vec<PlayerEvent>,
    ) {
        self.post_tick(module);

        if self.tick == 0 {
            if self.pattern_delay > 0 {
                // EEx delays at most 15 rows, anything longer is F00 or a
                // song end.
                let delay = self.pattern_delay;
                self.pattern_delay -= 1;
                if delay > MAX_PATTERN_DELAY {
                    self.end_reached = true;
                    self.restart_song = true;
                }
            } else {
                self.apply_delayed(module);
                self.report_position(events);
                self.clear_slides(module);
                self.scan_for_speed(module);
                self.setup_slides(module);
                self.next_row(module, tables);
            }
        }

        self.do_triggers(module, channels);
        self.do_envelopes(module);
        self.tick_gains_and_pitch(module, tables, channels);

        self.arp_counter = (self.arp_counter + 1) % 3;
        self.tick += 1;
        if self.tick >= self.speed {
            self.tick = 0;
        }
    }

    fn report_position(&mut self, events: &mut Vec<PlayerEvent>) {
        if self.last_order == Some(self.order) {
            return;
        }
        self.last_order = Some(self.order);
        trace!("position {} pattern {} row {}", self.order, self.pattern, self.row);
        if !self.end_reached {
            events.push(PlayerEvent::PositionChanged(self.order));
        }
    }

    /// Accumulated slides, clamped to the speed scaled limits.
    fn post_tick(&mut self, module: &Module) {
        let db3 = module.creator == Creator::DigiBooster3;
        let speed = self.speed;
        for mt in self.tracks.iter_mut() {
            mt.volume = (mt.volume + mt.volume_delta).clamp(self.min_volume, self.max_volume);
            mt.panning =
                (mt.panning + mt.panning_delta).clamp(self.min_panning, self.max_panning);

            if mt.porta3_delta != 0 {
                let target = if db3 {
                    mt.porta3_target * speed
                } else {
                    mt.porta3_target
                };
                mt.pitch += mt.porta3_delta;
                mt.pitch = if mt.porta3_delta > 0 {
                    mt.pitch.min(target)
                } else {
                    mt.pitch.max(target)
                };
            }

            mt.pitch = (mt.pitch + mt.pitch_delta).clamp(self.min_pitch, self.max_pitch);
        }

        self.global_volume =
            (self.global_volume + self.global_volume_slide).clamp(0, MAX_GLOBAL_VOLUME);
    }

    /// Scales volume, panning and pitch back to row units and drops the
    /// per-row effects.
    fn clear_slides(&mut self, module: &Module) {
        let db3 = module.creator == Creator::DigiBooster3;
        let speed = self.speed;
        for mt in self.tracks.iter_mut() {
            mt.volume_delta = 0;
            mt.panning_delta = 0;
            mt.pitch_delta = 0;
            mt.porta3_delta = 0;
            mt.volume /= speed;
            mt.panning /= speed;
            if db3 {
                mt.pitch /= speed;
            }
            mt.arp_table[1] = 0;
            mt.arp_table[2] = 0;
            mt.vibrato_speed = 0;
            mt.vibrato_depth = 0;
        }
        self.global_volume_slide = 0;
        self.arp_counter = 0;
    }

    /// Scales by the (possibly new) speed and recomputes the limits.
    fn setup_slides(&mut self, module: &Module) {
        let db3 = module.creator == Creator::DigiBooster3;
        let speed = self.speed;
        for mt in self.tracks.iter_mut() {
            mt.volume *= speed;
            mt.panning *= speed;
            if db3 {
                mt.pitch *= speed;
            }
        }

        self.min_volume = 0;
        self.max_volume = speed << 6;
        self.min_panning = -(speed << 7);
        self.max_panning = speed << 7;
        if db3 {
            self.min_pitch = speed * 96;
            self.max_pitch = speed * 864;
        } else {
            self.min_pitch = 57;
            self.max_pitch = 13696;
        }
    }

    /// Fires pending triggers. A cut note keeps playing at volume 0.
    fn do_triggers<C: VirtualChannel>(&mut self, module: &Module, channels: &mut [C]) {
        for track in 0..self.tracks.len() {
            if self.tracks[track].instrument == 0 {
                continue;
            }
            if self.tracks[track].trigger_counter == 0 {
                self.trigger(module, track, channels.get_mut(track));
                let mt = &mut self.tracks[track];
                mt.trigger_counter = mt.retrigger;
            }
            let mt = &mut self.tracks[track];
            mt.trigger_counter -= 1;
            let cut = mt.cut_counter;
            mt.cut_counter -= 1;
            if cut <= 0 {
                mt.volume = 0;
            }
        }
    }

    /// Starts the sample and restarts the envelopes.
    fn trigger<C: VirtualChannel>(&mut self, module: &Module, track: usize, channel: Option<&mut C>) {
        let mt = &mut self.tracks[track];
        mt.volume_envelope_current = ENVELOPE_ONE;
        mt.panning_envelope_current = 0;

        mt.volume_envelope.restart();
        if let Some(envelope) = mt
            .volume_envelope
            .index
            .and_then(|i| module.volume_envelopes.get(i))
        {
            mt.volume_envelope.trigger(envelope);
        }
        mt.panning_envelope.restart();
        if let Some(envelope) = mt
            .panning_envelope
            .index
            .and_then(|i| module.panning_envelopes.get(i))
        {
            mt.panning_envelope.trigger(envelope);
        }

        mt.trigger_offset = mt.trigger_offset.clamp(0, mt.sample_length as i32);

        if let (Some(channel), Some(data)) = (channel, mt.sample.and_then(|s| module.samples.get(s))) {
            channel.play_sample(
                (mt.instrument - 1) as u16,
                data,
                mt.trigger_offset as u32,
                mt.sample_length,
                mt.play_backwards,
            );
            if mt.sample_loop_length > 0 {
                channel.set_loop(mt.sample_loop_start, mt.sample_loop_length, mt.sample_loop_type);
            }
        }

        mt.vibrato_counter = 0;
        mt.is_on = true;
    }

    fn do_envelopes(&mut self, module: &Module) {
        for mt in self.tracks.iter_mut().filter(|mt| mt.is_on) {
            if let Some(envelope) = mt
                .volume_envelope
                .index
                .and_then(|i| module.volume_envelopes.get(i))
            {
                mt.volume_envelope_current = mt.volume_envelope.next_volume(envelope);
            }
            if let Some(envelope) = mt
                .panning_envelope
                .index
                .and_then(|i| module.panning_envelopes.get(i))
            {
                mt.panning_envelope_current = mt.panning_envelope.next_panning(envelope);
            }
        }
    }

    /// Final gain and panning per track.
    ///
    /// The panning envelope is centered on the current panning and shrunk
    /// as that panning nears an extreme: `p = p0 + (1 - |p0|) * ev` in
    /// normalized units.
    fn tick_gains_and_pitch<C: VirtualChannel>(
        &mut self,
        module: &Module,
        tables: &PitchTables,
        channels: &mut [C],
    ) {
        let speed = self.speed;
        for track in 0..self.tracks.len() {
            let frequency = self.pitch(module, tables, track);
            let mt = &self.tracks[track];

            let mut volume = (mt.volume << 8) / speed;
            let mut pan = (mt.panning << 7) / speed;

            volume = (volume * mt.volume_envelope_current) >> 14;
            volume = (volume * self.global_volume) >> 6;

            let room = ENVELOPE_ONE - pan.abs();
            pan += (room * mt.panning_envelope_current) >> 14;

            if let Some(channel) = channels.get_mut(track) {
                if let Some(frequency) = frequency {
                    channel.set_frequency(frequency);
                }
                channel.set_volume((volume / 64).clamp(0, 256) as u16);
                channel.set_panning(((pan + ENVELOPE_ONE) / 128).clamp(0, 256) as u16);
            }
        }
    }

    /// Playback frequency of the track, advancing its vibrato.
    fn pitch(&mut self, module: &Module, tables: &PitchTables, track: usize) -> Option<u32> {
        let speed = self.speed;
        let arp_counter = self.arp_counter;
        let mt = &mut self.tracks[track];
        let instrument = module.instrument(mt.instrument)?;
        let vibrato = tables.vibrato[(mt.vibrato_counter & 0x3f) as usize];

        let frequency = match module.creator {
            Creator::DigiBooster2 => {
                let mut pitch = mt.pitch;
                let note = mt.note + mt.arp_table[arp_counter];
                if let Some(&period) = usize::try_from(note).ok().and_then(|n| tables.periods.get(n)) {
                    pitch = period;
                }
                if pitch > 0 {
                    let frequency = AMIGA_NTSC_CLOCK / pitch;
                    let ratio = ((instrument.c3_frequency as i32 * 256) / PROTRACKER_C3 * frequency) / 256;
                    pitch = AMIGA_NTSC_CLOCK / ratio.max(1);
                    pitch += ((vibrato * 5 / 3) * mt.vibrato_depth) / 128;
                }
                (pitch > 0).then(|| ((AMIGA_PAL_CLOCK / pitch) * 4) as u32)
            }
            Creator::DigiBooster3 => {
                let mut pitch = mt.pitch + mt.arp_table[arp_counter];
                pitch += (vibrato * mt.vibrato_depth) >> 8;
                let pitch = pitch.max(0);

                let speed = speed.clamp(1, MAX_SPEED as i32);
                let smooth = (pitch % speed) as usize;
                let fine = (pitch / speed - FINE_TUNES as i32).max(0) as usize;
                let octave = (fine / FINE_TUNES).min(19) as u32;
                let alpha = u64::from(tables.smooth_porta[speed as usize][smooth]);
                let beta = u64::from(tables.music_scale[fine % FINE_TUNES]);

                let frequency = (u64::from(instrument.c3_frequency) * beta * alpha) >> (19 - octave);
                Some((frequency / 65536) as u32)
            }
        };

        mt.vibrato_counter = (mt.vibrato_counter + mt.vibrato_speed) & 0x3f;
        frequency
    }
}
