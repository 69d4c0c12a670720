//! Read-only module data consumed by the player.
//!
//! A loader fills these structures once; the player never writes to them and
//! shares them behind an `Arc`. Structural validity (pattern sizes, play list
//! entries) is the loader's responsibility. Dangling instrument, sample or
//! envelope references are tolerated and silently disable the affected note.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use super::effect_master::EchoArguments;

/// Tracker that created the module. Selects the pitch model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Creator {
    /// Amiga period based pitch with the C3 frequency ratio.
    DigiBooster2,
    /// Linear fine tune scale, 8 fine tunes per semitone.
    #[default]
    DigiBooster3,
}

/// One pattern cell.
///
/// `octave == 0` means no note. A `note` of 12 or above with a nonzero octave
/// is a key off.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Entry {
    pub note: u8,
    pub octave: u8,
    /// 1-based instrument number, 0 for none.
    pub instrument: u16,
    pub cmd1: u8,
    pub param1: u8,
    pub cmd2: u8,
    pub param2: u8,
}

impl Entry {
    pub fn note(octave: u8, note: u8, instrument: u16) -> Self {
        Entry {
            note,
            octave,
            instrument,
            ..Default::default()
        }
    }

    pub fn key_off() -> Self {
        Entry {
            note: 12,
            octave: 1,
            ..Default::default()
        }
    }

    pub fn with_effect(mut self, cmd: u8, param: u8) -> Self {
        self.cmd1 = cmd;
        self.param1 = param;
        self
    }

    pub fn with_effect2(mut self, cmd: u8, param: u8) -> Self {
        self.cmd2 = cmd;
        self.param2 = param;
        self
    }

    pub(crate) fn effects(&self) -> [(u8, u8); 2] {
        [(self.cmd1, self.param1), (self.cmd2, self.param2)]
    }
}

/// Grid of entries, `entries[row][track]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    pub entries: Vec<Vec<Entry>>,
}

impl Pattern {
    /// Empty pattern of `rows` x `tracks`.
    pub fn new(rows: usize, tracks: usize) -> Self {
        Pattern {
            entries: vec![vec![Entry::default(); tracks]; rows],
        }
    }

    pub fn rows(&self) -> usize {
        self.entries.len()
    }

    /// Cell at `row`/`track`, an empty entry outside the grid.
    pub fn entry(&self, row: usize, track: usize) -> Entry {
        self.entries
            .get(row)
            .and_then(|r| r.get(track))
            .copied()
            .unwrap_or_default()
    }

    pub fn set(&mut self, row: usize, track: usize, entry: Entry) {
        if let Some(cell) = self.entries.get_mut(row).and_then(|r| r.get_mut(track)) {
            *cell = entry;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Song {
    pub name: String,
    /// Pattern index per order.
    pub play_list: Vec<usize>,
}

/// Sample loop mode stored with the instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum InstrumentLoop {
    #[default]
    None,
    Forward,
    PingPong,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instrument {
    pub name: String,
    /// Default volume, 0..=64.
    pub volume: i32,
    /// Default panning, -128..=128.
    pub panning: i32,
    /// Playback rate of C-3 in Hz.
    pub c3_frequency: u32,
    /// Index into [`Module::samples`].
    pub sample: usize,
    pub loop_start: u32,
    pub loop_length: u32,
    pub loop_type: InstrumentLoop,
    /// Index into [`Module::volume_envelopes`].
    pub volume_envelope: Option<usize>,
    /// Index into [`Module::panning_envelopes`].
    pub panning_envelope: Option<usize>,
}

impl Default for Instrument {
    fn default() -> Self {
        Instrument {
            name: String::new(),
            volume: 64,
            panning: 0,
            c3_frequency: 8363,
            sample: 0,
            loop_start: 0,
            loop_length: 0,
            loop_type: InstrumentLoop::None,
            volume_envelope: None,
            panning_envelope: None,
        }
    }
}

/// Sample frames in their stored bit depth.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SampleData {
    Bits8(Arc<[i8]>),
    Bits16(Arc<[i16]>),
}

impl SampleData {
    pub fn frames(&self) -> usize {
        match self {
            SampleData::Bits8(data) => data.len(),
            SampleData::Bits16(data) => data.len(),
        }
    }

    pub fn bits(&self) -> u8 {
        match self {
            SampleData::Bits8(_) => 8,
            SampleData::Bits16(_) => 16,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct EnvelopePoint {
    /// Position in ticks.
    pub position: u16,
    /// Volume 0..=64, or panning -128..=128.
    pub value: i16,
}

/// Breakpoint envelope. Loop and sustain markers index points.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Envelope {
    pub points: Vec<EnvelopePoint>,
    pub loop_first: Option<u16>,
    pub loop_last: Option<u16>,
    pub sustain_a: Option<u16>,
    pub sustain_b: Option<u16>,
}

impl Envelope {
    /// Number of interpolated sections between points.
    pub fn sections(&self) -> usize {
        self.points.len().saturating_sub(1)
    }
}

/// DSP settings applied when the player starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DspDefaults {
    /// Tracks with echo enabled from the start.
    pub echo_tracks: Vec<bool>,
    pub echo: EchoArguments,
}

impl Default for DspDefaults {
    fn default() -> Self {
        DspDefaults {
            echo_tracks: Vec::new(),
            echo: EchoArguments {
                delay: 0x40,
                feedback: 0x80,
                mix: 0x80,
                cross: 0xff,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Module {
    pub name: String,
    pub creator: Creator,
    pub num_tracks: usize,
    pub songs: Vec<Song>,
    pub patterns: Vec<Pattern>,
    pub instruments: Vec<Instrument>,
    pub samples: Vec<SampleData>,
    pub volume_envelopes: Vec<Envelope>,
    pub panning_envelopes: Vec<Envelope>,
    pub dsp_defaults: DspDefaults,
}

impl Module {
    /// Pattern played at `order` of `song`.
    pub(crate) fn pattern_at(&self, song: usize, order: usize) -> Option<&Pattern> {
        let index = *self.songs.get(song)?.play_list.get(order)?;
        self.patterns.get(index)
    }

    pub(crate) fn orders(&self, song: usize) -> usize {
        self.songs.get(song).map_or(0, |s| s.play_list.len())
    }

    /// Instrument by 1-based number.
    pub(crate) fn instrument(&self, number: i32) -> Option<&Instrument> {
        usize::try_from(number - 1)
            .ok()
            .and_then(|i| self.instruments.get(i))
    }
}
