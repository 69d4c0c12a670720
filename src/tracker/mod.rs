//! DigiBooster Pro module playback.
//!
//! The [`Player`] runs the sequencer one tick at a time and drives one
//! [`VirtualChannel`] per track. Mixing is left to the host; the echo of each
//! effect group is rendered by the [`EffectMaster`] over the group's mixed
//! buffer.
//!
//! ```
//! use std::sync::Arc;
//! use resid_tracker::tracker::{ChannelLog, Module, Player, PlayerConfig};
//!
//! let module = Module {
//!     num_tracks: 4,
//!     ..Default::default()
//! };
//! let mut player = Player::new(Arc::new(module), PlayerConfig::default());
//! let mut channels = vec![ChannelLog::default(); 4];
//! player.initialize();
//! player.next_tick(&mut channels);
//! ```

mod channel;
mod effect_master;
mod effects;
mod envelope;
mod module;
mod row_processing;
mod state;
mod tables;
mod tick;

#[cfg(test)]
mod tests;

use alloc::sync::Arc;
use alloc::vec::Vec;

use log::debug;

pub use self::channel::{ChannelLog, LoopType, VirtualChannel};
pub use self::effect_master::{buffer_frames, EchoArguments, EffectMaster, DEFAULT_EFFECT_GROUP};
pub use self::effects::Effect;
pub use self::envelope::{EnvelopeInterpolator, ENVELOPE_ONE};
pub use self::module::{
    Creator, DspDefaults, Entry, Envelope, EnvelopePoint, Instrument, InstrumentLoop, Module,
    Pattern, SampleData, Song,
};
pub use self::state::{EffectMemory, ModuleSynth, ModuleTrack};
pub use self::tables::PitchTables;

/// Mixer settings the player renders for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayerConfig {
    /// Output rate in Hz.
    pub mixer_frequency: u32,
    pub stereo: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            mixer_frequency: 44100,
            stereo: true,
        }
    }
}

/// Notifications collected while ticking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerEvent {
    /// Playback entered a new order.
    PositionChanged(usize),
    /// The song ended, by wrapping, a backward jump or F00.
    ModuleEnded,
}

/// Complete mutable playback state, detached from the player.
#[derive(Clone, Debug)]
pub struct PlayerSnapshot {
    synth: ModuleSynth,
}

impl PlayerSnapshot {
    pub fn synth(&self) -> &ModuleSynth {
        &self.synth
    }
}

pub struct Player {
    module: Arc<Module>,
    tables: Arc<PitchTables>,
    config: PlayerConfig,
    synth: ModuleSynth,
    events: Vec<PlayerEvent>,
    ended: bool,
}

impl Player {
    pub fn new(module: Arc<Module>, config: PlayerConfig) -> Self {
        #[cfg(feature = "std")]
        let tables = PitchTables::shared();
        #[cfg(not(feature = "std"))]
        let tables = Arc::new(PitchTables::new());

        let synth = ModuleSynth::new(&module);
        Player {
            module,
            tables,
            config,
            synth,
            events: Vec::new(),
            ended: false,
        }
    }

    /// Resets the sequencer and the echo to the module defaults.
    pub fn initialize(&mut self) {
        self.synth = ModuleSynth::new(&self.module);
        self.ended = false;
        debug!(
            "tracker reset: {} tracks, {} orders",
            self.module.num_tracks,
            self.song_length()
        );
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn config(&self) -> PlayerConfig {
        self.config
    }

    /// Runs one sequencer tick, updating `channels` (one per track).
    ///
    /// Tracks that stopped are muted. When the song ends a
    /// [`PlayerEvent::ModuleEnded`] is queued; F00 restarts the song, a
    /// regular end restores the global volume.
    pub fn next_tick<C: VirtualChannel>(&mut self, channels: &mut [C]) {
        self.synth
            .next_tick(&self.module, &self.tables, channels, &mut self.events);

        for (mt, channel) in self.synth.tracks.iter().zip(channels.iter_mut()) {
            if !mt.is_on {
                channel.mute();
            }
        }

        if self.synth.end_reached {
            debug!("module ended at order {}", self.synth.order);
            self.events.push(PlayerEvent::ModuleEnded);
            self.ended = true;
            self.synth.end_reached = false;
            if self.synth.restart_song {
                self.synth.restart_song = false;
                self.restart();
            } else {
                if self.synth.global_volume == 0 {
                    channels.iter_mut().for_each(|c| c.mute());
                }
                self.synth.global_volume = state::MAX_GLOBAL_VOLUME;
            }
        }
    }

    /// Starts the song over, keeping the end flag.
    fn restart(&mut self) {
        debug!("restarting song");
        self.synth = ModuleSynth::new(&self.module);
    }

    /// Ticks per row.
    pub fn speed(&self) -> i32 {
        self.synth.speed
    }

    /// Tempo in BPM; a tick lasts 2.5 / tempo seconds.
    pub fn tempo(&self) -> i32 {
        self.synth.tempo
    }

    /// Output frames per tick at the configured mixer rate.
    pub fn frames_per_tick(&self) -> u32 {
        let tempo = self.synth.tempo.max(1) as u32;
        self.config.mixer_frequency * 5 / (tempo * 2)
    }

    /// `(order, row)` of the row evaluated next.
    pub fn position(&self) -> (usize, usize) {
        (self.synth.order, self.synth.row)
    }

    /// Jumps to the start of `order`. Orders past the song end are ignored.
    pub fn set_position(&mut self, order: usize) {
        let Some(&pattern) = self
            .module
            .songs
            .get(self.synth.song)
            .and_then(|s| s.play_list.get(order))
        else {
            return;
        };
        self.synth.order = order;
        self.synth.pattern = pattern;
        self.synth.row = 0;
        self.synth.tick = 0;
    }

    /// Orders in the current song.
    pub fn song_length(&self) -> usize {
        self.module.orders(self.synth.song)
    }

    pub fn create_snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            synth: self.synth.clone(),
        }
    }

    /// Continues from a copy of `snapshot`; the snapshot stays reusable.
    pub fn set_snapshot(&mut self, snapshot: &PlayerSnapshot) {
        self.synth = snapshot.synth.clone();
    }

    /// True once the song has ended since the last [`Player::initialize`].
    pub fn has_ended(&self) -> bool {
        self.ended
    }

    /// Drains the queued events.
    pub fn take_events(&mut self) -> Vec<PlayerEvent> {
        core::mem::take(&mut self.events)
    }

    pub fn synth(&self) -> &ModuleSynth {
        &self.synth
    }

    pub fn effect_master(&self) -> &EffectMaster {
        &self.synth.echo
    }

    /// Echo of `group` over a mixed buffer at the configured mixer rate.
    pub fn add_channel_group_effects(&mut self, group: i32, dest: &mut [i32], frames: usize) {
        let PlayerConfig {
            mixer_frequency,
            stereo,
        } = self.config;
        self.synth
            .echo
            .add_channel_group_effects(group, dest, frames, mixer_frequency, stereo);
    }
}
