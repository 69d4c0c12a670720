//! Effect commands, evaluated once per row at tick 0.
//!
//! Effects only set up deltas and counters; the per-tick work happens in
//! the tick module. Slides remember their last nonzero parameter per track
//! and per effect.

use super::effect_master::{EchoArguments, DEFAULT_EFFECT_GROUP};
use super::module::{Creator, Module};
use super::state::{ModuleSynth, ModuleTrack, IDLE_COUNTER};

/// Pattern commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Effect {
    Arpeggio = 0x00,
    PortamentoUp = 0x01,
    PortamentoDown = 0x02,
    PortamentoToNote = 0x03,
    Vibrato = 0x04,
    PortamentoToNoteVolumeSlide = 0x05,
    VibratoVolumeSlide = 0x06,
    SetPanning = 0x08,
    SampleOffset = 0x09,
    VolumeSlide = 0x0a,
    PositionJump = 0x0b,
    SetVolume = 0x0c,
    PatternBreak = 0x0d,
    Extra = 0x0e,
    SetTempo = 0x0f,
    SetGlobalVolume = 0x10,
    GlobalVolumeSlide = 0x11,
    PanningSlide = 0x19,
    EchoSwitch = 0x1f,
    EchoDelay = 0x20,
    EchoFeedback = 0x21,
    EchoMix = 0x22,
    EchoCross = 0x23,
}

impl Effect {
    pub fn from_u8(value: u8) -> Option<Effect> {
        use Effect::*;
        Some(match value {
            0x00 => Arpeggio,
            0x01 => PortamentoUp,
            0x02 => PortamentoDown,
            0x03 => PortamentoToNote,
            0x04 => Vibrato,
            0x05 => PortamentoToNoteVolumeSlide,
            0x06 => VibratoVolumeSlide,
            0x08 => SetPanning,
            0x09 => SampleOffset,
            0x0a => VolumeSlide,
            0x0b => PositionJump,
            0x0c => SetVolume,
            0x0d => PatternBreak,
            0x0e => Extra,
            0x0f => SetTempo,
            0x10 => SetGlobalVolume,
            0x11 => GlobalVolumeSlide,
            0x19 => PanningSlide,
            0x1f => EchoSwitch,
            0x20 => EchoDelay,
            0x21 => EchoFeedback,
            0x22 => EchoMix,
            0x23 => EchoCross,
            _ => return None,
        })
    }

    /// Portamento to note keeps the current pitch when a note is given.
    pub(crate) fn is_portamento_to_note(cmd: u8) -> bool {
        matches!(
            Effect::from_u8(cmd),
            Some(Effect::PortamentoToNote | Effect::PortamentoToNoteVolumeSlide)
        )
    }
}

/// Sub-commands of `Exy`, selected by `x`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExtraEffect {
    FinePortamentoUp,
    FinePortamentoDown,
    PlayBackwards,
    ChannelControl,
    SetLoop,
    SampleOffsetHigh,
    SetPanning,
    Retrigger,
    FineVolumeSlideUp,
    FineVolumeSlideDown,
    NoteCut,
    NoteDelay,
    PatternDelay,
}

impl ExtraEffect {
    fn from_nibble(x: u8) -> Option<ExtraEffect> {
        use ExtraEffect::*;
        Some(match x {
            0x1 => FinePortamentoUp,
            0x2 => FinePortamentoDown,
            0x3 => PlayBackwards,
            0x4 => ChannelControl,
            0x6 => SetLoop,
            0x7 => SampleOffsetHigh,
            0x8 => SetPanning,
            0x9 => Retrigger,
            0xa => FineVolumeSlideUp,
            0xb => FineVolumeSlideDown,
            0xc => NoteCut,
            0xd => NoteDelay,
            0xe => PatternDelay,
            _ => return None,
        })
    }
}

/// Old echo switches use the shared group, new ones a private group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EchoType {
    Old,
    New,
}

/// Decodes a BCD row number; invalid digits give row 0.
pub(crate) fn bcd_to_bin(x: u8) -> usize {
    let (hi, lo) = (x >> 4, x & 0x0f);
    if hi < 10 && lo < 10 {
        usize::from(hi * 10 + lo)
    } else {
        0
    }
}

/// Shared `x0`/`0x` slide decoding. With both nibbles set only the fine
/// forms `xF` and `Fx` apply, unscaled.
fn slide_delta(parameter: u8, speed: i32, fine: bool) -> i32 {
    let up = i32::from(parameter >> 4);
    let down = i32::from(parameter & 0x0f);
    if up == 0 || down == 0 {
        (up - down) * speed
    } else if !fine {
        0
    } else if down == 0x0f {
        up
    } else if up == 0x0f {
        -down
    } else {
        0
    }
}

/// Reuses `memory` when `parameter` is 0, else stores it.
#[inline]
fn remember(parameter: u8, memory: &mut u8) -> u8 {
    if parameter == 0 {
        *memory
    } else {
        *memory = parameter;
        parameter
    }
}

impl ModuleSynth {
    fn is_db2(module: &Module) -> bool {
        module.creator == Creator::DigiBooster2
    }

    /// Portamento to note step towards the target.
    fn porta_to_note_step(&mut self, module: &Module, track: usize, parameter: i32) {
        let speed = self.speed;
        let mt = &mut self.tracks[track];
        let (target, step) = if Self::is_db2(module) {
            (mt.porta3_target, parameter * 4)
        } else {
            (mt.porta3_target * speed, parameter * speed)
        };
        if target >= mt.pitch {
            mt.porta3_delta += step;
        } else {
            mt.porta3_delta -= step;
        }
    }

    fn set_vibrato_from(mt: &mut ModuleTrack, parameter: u8, module: &Module, speed: i32) {
        mt.vibrato_speed = i32::from(parameter >> 4);
        mt.vibrato_depth = i32::from(parameter & 0x0f);
        if !Self::is_db2(module) {
            mt.vibrato_depth *= speed;
        }
    }

    /// Evaluates one effect column of `track`.
    pub(crate) fn effect(&mut self, module: &Module, track: usize, cmd: u8, parameter: u8) {
        let Some(effect) = Effect::from_u8(cmd) else {
            return;
        };
        let db2 = Self::is_db2(module);
        let speed = self.speed;

        match effect {
            Effect::Arpeggio => {
                let mt = &mut self.tracks[track];
                let (x, y) = (i32::from(parameter >> 4), i32::from(parameter & 0x0f));
                mt.arp_table[1..].copy_from_slice(&if db2 {
                    [x, y]
                } else {
                    [(x << 3) * speed, (y << 3) * speed]
                });
            }
            // Parameters F0..FF are fine slides without speed scaling.
            Effect::PortamentoUp | Effect::PortamentoDown => {
                let mt = &mut self.tracks[track];
                let up = effect == Effect::PortamentoUp;
                let memory = if up {
                    &mut mt.old.portamento_up
                } else {
                    &mut mt.old.portamento_down
                };
                let parameter = remember(parameter, memory);
                let amount = match (parameter < 0xf0, db2) {
                    (true, true) => i32::from(parameter) * 4,
                    (true, false) => i32::from(parameter) * speed,
                    (false, _) => i32::from(parameter & 0x0f),
                };
                // Periods fall as the pitch rises.
                if up != db2 {
                    mt.pitch_delta += amount;
                } else {
                    mt.pitch_delta -= amount;
                }
            }
            Effect::PortamentoToNote => {
                let parameter = remember(parameter, &mut self.tracks[track].old.portamento_speed);
                self.porta_to_note_step(module, track, i32::from(parameter));
            }
            Effect::Vibrato => {
                let mt = &mut self.tracks[track];
                let mut parameter = parameter;
                if db2 {
                    // Each nibble is remembered on its own.
                    if parameter & 0xf0 == 0 {
                        parameter |= mt.old.vibrato & 0xf0;
                    }
                    if parameter & 0x0f == 0 {
                        parameter |= mt.old.vibrato & 0x0f;
                    }
                    mt.old.vibrato = parameter;
                } else {
                    parameter = remember(parameter, &mut mt.old.vibrato);
                }
                Self::set_vibrato_from(mt, parameter, module, speed);
            }
            Effect::PortamentoToNoteVolumeSlide => {
                let mt = &mut self.tracks[track];
                let parameter = remember(parameter, &mut mt.old.porta_volume_slide);
                let porta_speed = i32::from(mt.old.portamento_speed);
                self.porta_to_note_step(module, track, porta_speed);
                self.tracks[track].volume_delta += slide_delta(parameter, speed, true);
            }
            Effect::VibratoVolumeSlide => {
                let mt = &mut self.tracks[track];
                let parameter = remember(parameter, &mut mt.old.vibrato_volume_slide);
                let vibrato = mt.old.vibrato;
                Self::set_vibrato_from(mt, vibrato, module, speed);
                mt.volume_delta += slide_delta(parameter, speed, true);
            }
            Effect::SetPanning => {
                self.tracks[track].panning = (i32::from(parameter) - 128) * speed;
            }
            Effect::SampleOffset => {
                self.tracks[track].trigger_offset += i32::from(parameter) << 8;
            }
            Effect::VolumeSlide => {
                let mt = &mut self.tracks[track];
                let parameter = remember(parameter, &mut mt.old.volume_slide);
                mt.volume_delta += slide_delta(parameter, speed, true);
            }
            Effect::PositionJump => {
                self.delayed.pattern_jump = Some(usize::from(parameter));
            }
            Effect::SetVolume => {
                if parameter <= 0x40 {
                    self.tracks[track].volume = i32::from(parameter) * speed;
                }
            }
            Effect::PatternBreak => {
                self.delayed.pattern_break = Some(bcd_to_bin(parameter));
            }
            Effect::Extra => self.effect_exx(module, track, parameter),
            // Handled by the speed scan before the row is evaluated.
            Effect::SetTempo => {}
            Effect::SetGlobalVolume => {
                self.global_volume = i32::from(parameter).min(0x40);
            }
            Effect::GlobalVolumeSlide => {
                let parameter = remember(parameter, &mut self.old_global_volume_slide);
                self.global_volume_slide += slide_delta(parameter, 1, false);
            }
            Effect::PanningSlide => {
                let mt = &mut self.tracks[track];
                let parameter = remember(parameter, &mut mt.old.panning_slide);
                mt.panning_delta += slide_delta(parameter, speed, false);
            }
            Effect::EchoSwitch => {
                let (target, switch) = (parameter >> 4, parameter & 0x0f);
                match (switch, target) {
                    (0, 0) => self.echo_on_for_track(track, EchoType::Old),
                    (0, 1) => self.echo_on_for_all_tracks(),
                    (0, 2) => self.echo_on_for_track(track, EchoType::New),
                    (1, 0) => self.echo_off_for_track(track, EchoType::Old),
                    (1, 1) => self.echo_off_for_all_tracks(),
                    (1, 2) => self.echo_off_for_track(track, EchoType::New),
                    _ => {}
                }
            }
            Effect::EchoDelay => {
                self.tracks[track].echo.delay = parameter;
                self.change_echo_parameters(track);
            }
            Effect::EchoFeedback => {
                self.tracks[track].echo.feedback = parameter;
                self.change_echo_parameters(track);
            }
            Effect::EchoMix => {
                self.tracks[track].echo.mix = u16::from(parameter);
                self.change_echo_parameters(track);
            }
            Effect::EchoCross => {
                self.tracks[track].echo.cross = parameter;
                self.change_echo_parameters(track);
            }
        }
    }

    fn effect_exx(&mut self, module: &Module, track: usize, parameter: u8) {
        let Some(extra) = ExtraEffect::from_nibble(parameter >> 4) else {
            return;
        };
        let db2 = Self::is_db2(module);
        let speed = self.speed;
        let value = i32::from(parameter & 0x0f);
        let (min_pitch, max_pitch) = (self.min_pitch, self.max_pitch);
        let (min_volume, max_volume) = (self.min_volume, self.max_volume);
        let order = self.order;
        let row = self.row;
        let mt = &mut self.tracks[track];

        match extra {
            ExtraEffect::FinePortamentoUp => {
                if db2 {
                    mt.pitch_delta -= value;
                    mt.pitch = mt.pitch.max(min_pitch);
                } else {
                    mt.pitch = (mt.pitch + value * speed).min(max_pitch);
                }
            }
            ExtraEffect::FinePortamentoDown => {
                if db2 {
                    mt.pitch_delta += value;
                    mt.pitch = mt.pitch.min(max_pitch);
                } else {
                    mt.pitch = (mt.pitch - value * speed).max(min_pitch);
                }
            }
            ExtraEffect::PlayBackwards => {
                if mt.trigger_counter != IDLE_COUNTER {
                    mt.play_backwards = true;
                }
            }
            ExtraEffect::ChannelControl => {
                // E40 mutes the track.
                if parameter == 0x40 {
                    mt.is_on = false;
                }
            }
            ExtraEffect::SetLoop => {
                if value != 0 {
                    if mt.loop_counter == 0 {
                        mt.loop_counter = value;
                        self.delayed.loop_track = Some(track);
                    } else {
                        mt.loop_counter -= 1;
                        if mt.loop_counter > 0 {
                            self.delayed.loop_track = Some(track);
                        } else {
                            mt.reset_loop();
                            self.delayed.loop_track = None;
                        }
                    }
                } else if mt.loop_counter == 0 {
                    mt.loop_order = order;
                    mt.loop_row = row;
                }
            }
            ExtraEffect::SampleOffsetHigh => mt.trigger_offset += value << 16,
            ExtraEffect::SetPanning => mt.panning = ((value << 4) - 128) * speed,
            ExtraEffect::Retrigger => mt.retrigger = value,
            ExtraEffect::FineVolumeSlideUp => {
                mt.volume = (mt.volume + value * speed).min(max_volume);
            }
            ExtraEffect::FineVolumeSlideDown => {
                mt.volume = (mt.volume - value * speed).max(min_volume);
            }
            ExtraEffect::NoteCut => mt.cut_counter = value,
            ExtraEffect::NoteDelay => mt.trigger_counter = value,
            ExtraEffect::PatternDelay => self.pattern_delay = value,
        }
    }

    pub(crate) fn echo_on_for_track(&mut self, track: usize, echo_type: EchoType) {
        if self.echo.effect_group(track).is_some() {
            return;
        }
        match echo_type {
            EchoType::Old => self.echo.add_to_default(track),
            EchoType::New => {
                let args = self.tracks[track].echo;
                self.echo.add_to_effect_group(track, args);
            }
        }
    }

    fn echo_off_for_track(&mut self, track: usize, echo_type: EchoType) {
        let Some(group) = self.echo.effect_group(track) else {
            return;
        };
        let shared = group == DEFAULT_EFFECT_GROUP;
        if shared == (echo_type == EchoType::Old) {
            self.echo.remove_from_effect_group(track);
        }
    }

    fn echo_on_for_all_tracks(&mut self) {
        for track in 0..self.tracks.len() {
            self.echo_on_for_track(track, EchoType::Old);
        }
    }

    fn echo_off_for_all_tracks(&mut self) {
        for track in 0..self.tracks.len() {
            self.echo_off_for_track(track, EchoType::Old);
        }
    }

    /// Sends the track's echo parameters to its group, or to the shared
    /// group when the track has no echo.
    fn change_echo_parameters(&mut self, track: usize) {
        let args: EchoArguments = self.tracks[track].echo;
        let group = self.echo.effect_group(track).unwrap_or(DEFAULT_EFFECT_GROUP);
        self.echo.change_values(group, args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bcd_rows() {
        assert_eq!(bcd_to_bin(0x00), 0);
        assert_eq!(bcd_to_bin(0x16), 16);
        assert_eq!(bcd_to_bin(0x63), 63);
        assert_eq!(bcd_to_bin(0x1a), 0);
        assert_eq!(bcd_to_bin(0xa1), 0);
    }

    #[test]
    fn slide_nibbles() {
        assert_eq!(slide_delta(0x20, 6, true), 12);
        assert_eq!(slide_delta(0x03, 6, true), -18);
        assert_eq!(slide_delta(0x3f, 6, true), 3);
        assert_eq!(slide_delta(0xf2, 6, true), -2);
        assert_eq!(slide_delta(0x32, 6, true), 0);
        assert_eq!(slide_delta(0x3f, 6, false), 0);
    }

    #[test]
    fn effect_codes_round_trip() {
        for code in 0..=0xffu8 {
            if let Some(effect) = Effect::from_u8(code) {
                assert_eq!(effect as u8, code);
            }
        }
        assert_eq!(Effect::from_u8(0x07), None);
        assert!(Effect::is_portamento_to_note(0x05));
        assert!(!Effect::is_portamento_to_note(0x06));
    }
}
