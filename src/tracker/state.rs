//! Mutable sequencer state.
//!
//! Everything that changes during playback lives here as plain data so a
//! snapshot is a structural clone. Module data and pitch tables stay outside
//! behind `Arc` handles.

use alloc::vec::Vec;

use super::channel::LoopType;
use super::effect_master::{EchoArguments, EffectMaster};
use super::envelope::{EnvelopeInterpolator, ENVELOPE_ONE};
use super::module::Module;

/// Trigger and cut counters idle at this value; no row has so many ticks.
pub(crate) const IDLE_COUNTER: i32 = i32::MAX;
/// Pattern delays above this value stand for a song end.
pub(crate) const MAX_PATTERN_DELAY: i32 = 15;

pub(crate) const DEFAULT_SPEED: i32 = 6;
pub(crate) const DEFAULT_TEMPO: i32 = 125;
pub(crate) const MAX_GLOBAL_VOLUME: i32 = 64;

/// Last nonzero parameter per effect, reused when an effect repeats with 00.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EffectMemory {
    pub portamento_up: u8,
    pub portamento_down: u8,
    pub portamento_speed: u8,
    pub vibrato: u8,
    pub volume_slide: u8,
    pub porta_volume_slide: u8,
    pub vibrato_volume_slide: u8,
    pub panning_slide: u8,
}

/// Playback state of one track.
///
/// Volume, panning and (for DigiBooster 3 modules) pitch are kept multiplied
/// by the current speed between rows so slides can step once per tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleTrack {
    pub track_number: usize,
    /// 1-based instrument, 0 for none.
    pub instrument: i32,
    pub is_on: bool,

    pub note: i32,
    pub pitch: i32,
    pub pitch_delta: i32,
    pub porta3_target: i32,
    pub porta3_delta: i32,
    pub arp_table: [i32; 3],

    pub vibrato_counter: i32,
    pub vibrato_speed: i32,
    pub vibrato_depth: i32,

    pub volume: i32,
    pub volume_delta: i32,
    pub panning: i32,
    pub panning_delta: i32,

    pub trigger_counter: i32,
    pub trigger_offset: i32,
    pub cut_counter: i32,
    pub retrigger: i32,
    pub play_backwards: bool,

    pub loop_counter: i32,
    pub loop_order: usize,
    pub loop_row: usize,

    pub old: EffectMemory,
    pub echo: EchoArguments,

    pub volume_envelope: EnvelopeInterpolator,
    pub panning_envelope: EnvelopeInterpolator,
    pub volume_envelope_current: i32,
    pub panning_envelope_current: i32,

    /// Index into the module samples of the selected instrument.
    pub sample: Option<usize>,
    pub sample_length: u32,
    pub sample_loop_start: u32,
    pub sample_loop_length: u32,
    pub sample_loop_type: LoopType,
}

impl ModuleTrack {
    pub(crate) fn new(track_number: usize, echo: EchoArguments) -> Self {
        ModuleTrack {
            track_number,
            instrument: 0,
            is_on: false,
            note: 0,
            pitch: 0,
            pitch_delta: 0,
            porta3_target: 576,
            porta3_delta: 0,
            arp_table: [0; 3],
            vibrato_counter: 0,
            vibrato_speed: 0,
            vibrato_depth: 0,
            volume: 0,
            volume_delta: 0,
            panning: 0,
            panning_delta: 0,
            trigger_counter: IDLE_COUNTER,
            trigger_offset: 0,
            cut_counter: IDLE_COUNTER,
            retrigger: 0,
            play_backwards: false,
            loop_counter: 0,
            loop_order: 0,
            loop_row: 0,
            old: EffectMemory::default(),
            echo,
            volume_envelope: EnvelopeInterpolator::default(),
            panning_envelope: EnvelopeInterpolator::default(),
            volume_envelope_current: ENVELOPE_ONE,
            panning_envelope_current: 0,
            sample: None,
            sample_length: 0,
            sample_loop_start: 0,
            sample_loop_length: 0,
            sample_loop_type: LoopType::Normal,
        }
    }

    pub(crate) fn reset_loop(&mut self) {
        self.loop_counter = 0;
        self.loop_order = 0;
        self.loop_row = 0;
    }
}

/// Row transitions requested by effects, applied at the next row start.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Delayed {
    pub pattern_break: Option<usize>,
    pub pattern_jump: Option<usize>,
    /// Track whose pattern loop jumps back.
    pub loop_track: Option<usize>,
    pub module_end: bool,
}

/// Sequencer state of a whole module.
#[derive(Clone, Debug)]
pub struct ModuleSynth {
    pub(crate) song: usize,
    pub(crate) order: usize,
    pub(crate) pattern: usize,
    pub(crate) row: usize,
    pub(crate) tick: i32,
    pub(crate) speed: i32,
    pub(crate) tempo: i32,
    pub(crate) pattern_delay: i32,

    pub(crate) global_volume: i32,
    pub(crate) global_volume_slide: i32,
    pub(crate) old_global_volume_slide: u8,
    pub(crate) arp_counter: usize,

    pub(crate) min_volume: i32,
    pub(crate) max_volume: i32,
    pub(crate) min_panning: i32,
    pub(crate) max_panning: i32,
    pub(crate) min_pitch: i32,
    pub(crate) max_pitch: i32,

    pub(crate) delayed: Delayed,
    pub(crate) end_reached: bool,
    pub(crate) restart_song: bool,
    pub(crate) last_order: Option<usize>,

    pub(crate) tracks: Vec<ModuleTrack>,
    pub(crate) echo: EffectMaster,
}

impl ModuleSynth {
    /// Power-on state for `module`, echo set up from its DSP defaults.
    pub(crate) fn new(module: &Module) -> Self {
        let defaults = module.dsp_defaults.echo;
        let mut synth = ModuleSynth {
            song: 0,
            order: 0,
            pattern: 0,
            row: 0,
            tick: 0,
            speed: DEFAULT_SPEED,
            tempo: DEFAULT_TEMPO,
            pattern_delay: 0,
            global_volume: MAX_GLOBAL_VOLUME,
            global_volume_slide: 0,
            old_global_volume_slide: 0,
            arp_counter: 0,
            min_volume: 0,
            max_volume: 384,
            min_panning: -768,
            max_panning: 768,
            min_pitch: 576,
            // Start of octave 8.
            max_pitch: 4608,
            delayed: Delayed::default(),
            end_reached: false,
            restart_song: false,
            last_order: None,
            tracks: (0..module.num_tracks)
                .map(|t| ModuleTrack::new(t, defaults))
                .collect(),
            echo: EffectMaster::new(defaults),
        };
        synth.pattern = module
            .songs
            .first()
            .and_then(|s| s.play_list.first())
            .copied()
            .unwrap_or(0);
        for track in 0..module.num_tracks {
            if module.dsp_defaults.echo_tracks.get(track) == Some(&true) {
                synth.echo_on_for_track(track, super::effects::EchoType::Old);
            }
        }
        synth
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn tick(&self) -> i32 {
        self.tick
    }

    pub fn speed(&self) -> i32 {
        self.speed
    }

    pub fn tempo(&self) -> i32 {
        self.tempo
    }

    pub fn global_volume(&self) -> i32 {
        self.global_volume
    }

    pub fn tracks(&self) -> &[ModuleTrack] {
        &self.tracks
    }

    pub fn effect_master(&self) -> &EffectMaster {
        &self.echo
    }
}
