use super::module::SampleData;

/// Loop mode of a playing sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LoopType {
    #[default]
    Normal,
    PingPong,
}

/// Mixer voice driven by one tracker track.
///
/// The player only writes to channels. Volume and panning use a 0..=256
/// scale, panning 128 is the center.
pub trait VirtualChannel {
    /// Starts `length` frames of `data` at `start_offset`.
    fn play_sample(
        &mut self,
        instrument: u16,
        data: &SampleData,
        start_offset: u32,
        length: u32,
        backwards: bool,
    );
    fn set_loop(&mut self, start: u32, length: u32, loop_type: LoopType);
    /// Playback rate in Hz.
    fn set_frequency(&mut self, frequency: u32);
    fn set_volume(&mut self, volume: u16);
    fn set_panning(&mut self, panning: u16);
    fn mute(&mut self);
}

/// Records every call. Useful for tests and for hosts that render later.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelLog {
    pub triggers: u32,
    pub start_offset: u32,
    pub length: u32,
    pub backwards: bool,
    pub instrument: Option<u16>,
    pub loop_range: Option<(u32, u32, LoopType)>,
    pub frequency: u32,
    pub volume: u16,
    pub panning: u16,
    pub muted: bool,
}

impl VirtualChannel for ChannelLog {
    fn play_sample(
        &mut self,
        instrument: u16,
        _data: &SampleData,
        start_offset: u32,
        length: u32,
        backwards: bool,
    ) {
        self.triggers += 1;
        self.instrument = Some(instrument);
        self.start_offset = start_offset;
        self.length = length;
        self.backwards = backwards;
        self.loop_range = None;
        self.muted = false;
    }

    fn set_loop(&mut self, start: u32, length: u32, loop_type: LoopType) {
        self.loop_range = Some((start, length, loop_type));
    }

    fn set_frequency(&mut self, frequency: u32) {
        self.frequency = frequency;
    }

    fn set_volume(&mut self, volume: u16) {
        self.volume = volume;
    }

    fn set_panning(&mut self, panning: u16) {
        self.panning = panning;
    }

    fn mute(&mut self) {
        self.muted = true;
    }
}
