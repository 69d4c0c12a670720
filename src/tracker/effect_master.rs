//! Per-group stereo echo.
//!
//! Tracks are mapped to effect groups; every group owns one delay line and
//! one set of coefficients. The mixer sums the tracks of a group into one
//! buffer and hands it to [`EffectMaster::add_channel_group_effects`].
//!
//! The shared group is used by old style echo switches and the module
//! defaults. A new style switch gives the track a private group keyed by the
//! track number.

use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use log::trace;

/// Group id of the shared echo.
pub const DEFAULT_EFFECT_GROUP: i32 = i32::MAX;

/// Echo parameters. Delay, feedback and cross are bytes; the mix runs up to
/// 256.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct EchoArguments {
    /// Delay in units of 2 ms.
    pub delay: u8,
    /// Share of the delayed signal fed back into the delay line.
    pub feedback: u8,
    /// Dry/wet balance, 0 fully dry and 256 fully wet. Larger values count
    /// as 256.
    pub mix: u16,
    /// Share of the opposite channel fed into the delay line.
    pub cross: u8,
}

/// Delay line and coefficients of one group.
#[derive(Clone, Debug)]
struct EffectGroup {
    args: EchoArguments,
    mixer_frequency: u32,
    stereo: bool,

    delay_line: Vec<i16>,
    /// Length in frames.
    buffer_size: usize,
    write_pos: usize,
    /// Delay in frames.
    delay_time: usize,

    p_mix: i32,
    n_mix: i32,
    p_cross_p_back: i32,
    p_cross_n_back: i32,
    n_cross_p_back: i32,
    n_cross_n_back: i32,
}

impl EffectGroup {
    fn new(args: EchoArguments) -> Self {
        EffectGroup {
            args,
            mixer_frequency: 0,
            stereo: false,
            delay_line: Vec::new(),
            buffer_size: 0,
            write_pos: 0,
            delay_time: 0,
            p_mix: 0,
            n_mix: 0,
            p_cross_p_back: 0,
            p_cross_n_back: 0,
            n_cross_p_back: 0,
            n_cross_n_back: 0,
        }
    }

    fn allocated(&self) -> bool {
        !self.delay_line.is_empty()
    }

    fn initialize_buffer(&mut self) {
        self.buffer_size = buffer_frames(self.mixer_frequency);
        let channels = if self.stereo { 2 } else { 1 };
        self.delay_line = vec![0; self.buffer_size * channels];
        self.write_pos = 0;
        trace!(
            "echo delay line of {} frames at {} Hz",
            self.buffer_size,
            self.mixer_frequency
        );
    }

    fn recalculate_coefficients(&mut self) {
        let delay = u64::from(self.args.delay);
        let frequency = u64::from(self.mixer_frequency);
        self.delay_time = ((delay * frequency + 250) / 500) as usize;

        let mix = i32::from(self.args.mix.min(256));
        let feedback = i32::from(self.args.feedback);
        let cross = i32::from(self.args.cross);
        self.p_mix = mix;
        self.n_mix = 256 - mix;
        self.p_cross_p_back = cross * feedback;
        self.p_cross_n_back = cross * (256 - feedback);
        self.n_cross_p_back = (cross - 256) * feedback;
        self.n_cross_n_back = (cross - 256) * (feedback - 256);
    }

    #[inline]
    fn read_pos(&self) -> usize {
        let delay = self.delay_time % self.buffer_size;
        (self.write_pos + self.buffer_size - delay) % self.buffer_size
    }

    #[inline]
    fn advance(&mut self) {
        self.write_pos += 1;
        if self.write_pos == self.buffer_size {
            self.write_pos = 0;
        }
    }

    fn echo_mono(&mut self, dest: &mut [i32]) {
        for out in dest.iter_mut() {
            let read_pos = self.read_pos();
            let sample = *out >> 16;
            let delayed = i32::from(self.delay_line[read_pos]);

            let a = i64::from(sample) * i64::from(self.n_cross_n_back)
                + i64::from(delayed) * i64::from(self.n_cross_p_back);
            self.delay_line[self.write_pos] = (a >> 16) as i16;
            self.advance();

            *out = ((sample * self.n_mix + delayed * self.p_mix) >> 8) << 16;
        }
    }

    fn echo_stereo(&mut self, dest: &mut [i32]) {
        for frame in dest.chunks_exact_mut(2) {
            let read_pos = self.read_pos() << 1;
            let left = frame[0] >> 16;
            let right = frame[1] >> 16;
            let left_delay = i32::from(self.delay_line[read_pos]);
            let right_delay = i32::from(self.delay_line[read_pos + 1]);

            let mix = |a: i32, b: i32, c: i32, d: i32| -> i16 {
                let acc = i64::from(a) * i64::from(self.n_cross_n_back)
                    + i64::from(b) * i64::from(self.p_cross_n_back)
                    + i64::from(c) * i64::from(self.n_cross_p_back)
                    + i64::from(d) * i64::from(self.p_cross_p_back);
                (acc >> 16) as i16
            };
            let al = mix(left, right, left_delay, right_delay);
            let ar = mix(right, left, right_delay, left_delay);

            let write_pos = self.write_pos << 1;
            self.delay_line[write_pos] = al;
            self.delay_line[write_pos + 1] = ar;
            self.advance();

            frame[0] = ((left * self.n_mix + left_delay * self.p_mix) >> 8) << 16;
            frame[1] = ((right * self.n_mix + right_delay * self.p_mix) >> 8) << 16;
        }
    }
}

/// Delay line length in frames for the longest echo (512 ms).
///
/// `(1/2 + 1/64) * f`, rounded up to a multiple of 4 frames.
pub fn buffer_frames(mixer_frequency: u32) -> usize {
    let f = mixer_frequency as usize;
    ((f >> 1) + (f >> 6) + 3) & !3
}

/// Track to group mapping and the groups' echo state.
#[derive(Clone, Debug)]
pub struct EffectMaster {
    track_groups: BTreeMap<usize, i32>,
    groups: BTreeMap<i32, EffectGroup>,
}

impl EffectMaster {
    /// Creates the shared group with `defaults`.
    pub fn new(defaults: EchoArguments) -> Self {
        let mut groups = BTreeMap::new();
        groups.insert(DEFAULT_EFFECT_GROUP, EffectGroup::new(defaults));
        EffectMaster {
            track_groups: BTreeMap::new(),
            groups,
        }
    }

    /// Group of `track`, if it has echo.
    pub fn effect_group(&self, track: usize) -> Option<i32> {
        self.track_groups.get(&track).copied()
    }

    pub fn add_to_default(&mut self, track: usize) {
        self.track_groups.insert(track, DEFAULT_EFFECT_GROUP);
    }

    /// Gives `track` a private group with its own delay line.
    pub fn add_to_effect_group(&mut self, track: usize, args: EchoArguments) {
        let group = track_group_id(track);
        self.groups.insert(group, EffectGroup::new(args));
        self.track_groups.insert(track, group);
    }

    /// Removes echo from `track` together with any group it owned.
    pub fn remove_from_effect_group(&mut self, track: usize) {
        self.track_groups.remove(&track);
        self.groups.remove(&track_group_id(track));
    }

    /// Replaces the parameters of `group`. Unknown groups are ignored.
    pub fn change_values(&mut self, group: i32, args: EchoArguments) {
        if let Some(info) = self.groups.get_mut(&group) {
            info.args = args;
            info.recalculate_coefficients();
        }
    }

    /// Current parameters of `group`.
    pub fn arguments(&self, group: i32) -> Option<EchoArguments> {
        self.groups.get(&group).map(|g| g.args)
    }

    /// `(track, group)` pairs, ordered by track.
    pub fn channel_groups(&self) -> impl Iterator<Item = (usize, i32)> + '_ {
        self.track_groups.iter().map(|(&t, &g)| (t, g))
    }

    /// Runs the echo of `group` over `frames` frames of `dest` in place.
    ///
    /// Samples carry 16 bits in the upper half of each `i32`. Stereo buffers
    /// are interleaved. The delay line is (re)allocated whenever the mixer
    /// frequency or channel layout changes.
    pub fn add_channel_group_effects(
        &mut self,
        group: i32,
        dest: &mut [i32],
        frames: usize,
        mixer_frequency: u32,
        stereo: bool,
    ) {
        let Some(info) = self.groups.get_mut(&group) else {
            return;
        };

        if !info.allocated() || info.mixer_frequency != mixer_frequency || info.stereo != stereo {
            info.mixer_frequency = mixer_frequency;
            info.stereo = stereo;
            info.initialize_buffer();
            info.recalculate_coefficients();
        }
        if info.buffer_size == 0 {
            return;
        }

        if stereo {
            let len = (frames * 2).min(dest.len() & !1);
            info.echo_stereo(&mut dest[..len]);
        } else {
            let len = frames.min(dest.len());
            info.echo_mono(&mut dest[..len]);
        }
    }
}

/// Private groups are keyed by their track.
fn track_group_id(track: usize) -> i32 {
    i32::try_from(track).unwrap_or(DEFAULT_EFFECT_GROUP - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(delay: u8, feedback: u8, mix: u16, cross: u8) -> EchoArguments {
        EchoArguments {
            delay,
            feedback,
            mix,
            cross,
        }
    }

    #[test]
    fn buffer_is_rounded_to_four_frames() {
        assert_eq!(buffer_frames(44100), 22740);
        assert_eq!(buffer_frames(48000) % 4, 0);
        assert!(buffer_frames(48000) as u32 >= 48000 * 512 / 1000);
    }

    #[test]
    fn track_membership() {
        let mut master = EffectMaster::new(EchoArguments::default());
        assert_eq!(master.effect_group(3), None);

        master.add_to_default(3);
        assert_eq!(master.effect_group(3), Some(DEFAULT_EFFECT_GROUP));

        master.add_to_effect_group(5, args(1, 2, 3, 4));
        assert_eq!(master.effect_group(5), Some(5));
        assert_eq!(master.arguments(5), Some(args(1, 2, 3, 4)));

        master.remove_from_effect_group(5);
        assert_eq!(master.effect_group(5), None);
        assert_eq!(master.arguments(5), None);
        // The shared group survives its members.
        master.remove_from_effect_group(3);
        assert!(master.arguments(DEFAULT_EFFECT_GROUP).is_some());
    }

    #[test]
    fn coefficients_follow_arguments() {
        let mut group = EffectGroup::new(args(0x40, 0x80, 0x80, 0xff));
        group.mixer_frequency = 1000;
        group.recalculate_coefficients();
        assert_eq!(group.delay_time, 128);
        assert_eq!(group.p_mix, 0x80);
        assert_eq!(group.n_mix, 0x80);
        assert_eq!(group.p_cross_p_back, 0xff * 0x80);
        assert_eq!(group.n_cross_n_back, (0xff - 256) * (0x80 - 256));
    }

    #[test]
    fn unknown_group_leaves_buffer_untouched() {
        let mut master = EffectMaster::new(EchoArguments::default());
        let mut buffer = [1 << 16; 8];
        master.add_channel_group_effects(7, &mut buffer, 8, 44100, false);
        assert_eq!(buffer, [1 << 16; 8]);
    }

    #[test]
    fn dry_mix_passes_input() {
        let mut master = EffectMaster::new(args(10, 0x80, 0, 0x80));
        let mut buffer: Vec<i32> = (0..64).map(|i| (i * 100) << 16).collect();
        let expected = buffer.clone();
        master.add_channel_group_effects(DEFAULT_EFFECT_GROUP, &mut buffer, 32, 8000, true);
        assert_eq!(buffer, expected);
    }
}
