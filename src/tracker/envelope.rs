//! Volume and panning envelope interpolation, one step per tick.

use super::module::Envelope;

/// Marker for a disabled loop or sustain point. Compares above every point.
pub(crate) const NO_POINT: u16 = 0xffff;

/// Envelope value scale, 1.0 == 16384.
pub const ENVELOPE_ONE: i32 = 16384;

/// Playback position inside one envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnvelopeInterpolator {
    /// Envelope of the current instrument.
    pub index: Option<usize>,
    pub section: u16,
    pub tick_counter: u16,
    pub sustain_a: u16,
    pub sustain_b: u16,
    pub loop_end: u16,
    y_start: i32,
    y_delta: i32,
    x_delta: i32,
    previous_value: i32,
}

impl Default for EnvelopeInterpolator {
    fn default() -> Self {
        EnvelopeInterpolator {
            index: None,
            section: 0,
            tick_counter: 0,
            sustain_a: NO_POINT,
            sustain_b: NO_POINT,
            loop_end: NO_POINT,
            y_start: 0,
            y_delta: 0,
            x_delta: 0,
            previous_value: 0,
        }
    }
}

impl EnvelopeInterpolator {
    /// Restarts at the first point.
    pub fn restart(&mut self) {
        self.section = 0;
        self.tick_counter = 0;
    }

    /// Restarts and reloads the release points of `envelope`.
    pub fn trigger(&mut self, envelope: &Envelope) {
        self.restart();
        self.sustain_a = envelope.sustain_a.unwrap_or(NO_POINT);
        self.sustain_b = envelope.sustain_b.unwrap_or(NO_POINT);
        self.loop_end = envelope.loop_last.unwrap_or(NO_POINT);
    }

    /// Releases the first active hold point: the loop if it comes first,
    /// else the earlier sustain point.
    pub fn key_off(&mut self) {
        if self.loop_end <= self.sustain_a && self.loop_end <= self.sustain_b {
            self.loop_end = NO_POINT;
        } else if self.sustain_a <= self.sustain_b {
            self.sustain_a = NO_POINT;
        } else {
            self.sustain_b = NO_POINT;
        }
    }

    /// Volume envelope step, 0..=16384.
    pub fn next_volume(&mut self, envelope: &Envelope) -> i32 {
        self.step(envelope, |value| i32::from(value) << 8, 0)
    }

    /// Panning envelope step, -16384..=16384.
    pub fn next_panning(&mut self, envelope: &Envelope) -> i32 {
        self.step(envelope, |value| (i32::from(value) + 128) << 7, ENVELOPE_ONE)
    }

    /// Linear interpolation of the current section. At a section start the
    /// next section is fetched; sustain points and the last point hold.
    fn step(&mut self, envelope: &Envelope, scale: impl Fn(i16) -> i32, offset: i32) -> i32 {
        if self.tick_counter == 0 {
            if self.section >= self.loop_end {
                self.section = envelope.loop_first.unwrap_or(0);
            }
            let section = usize::from(self.section);
            let Some(point) = envelope.points.get(section) else {
                return self.previous_value;
            };
            self.y_start = scale(point.value);
            if self.section == self.sustain_a
                || self.section == self.sustain_b
                || section >= envelope.sections()
            {
                return self.y_start - offset;
            }
            let next = envelope.points[section + 1];
            self.x_delta = i32::from(next.position) - i32::from(point.position);
            if self.x_delta <= 0 {
                // Coincident points jump straight to the next one.
                self.section += 1;
                self.previous_value = scale(next.value) - offset;
                return self.previous_value;
            }
            self.tick_counter = self.x_delta as u16;
            self.y_delta = scale(next.value) - self.y_start;
            self.section += 1;
        }

        let elapsed = self.x_delta - i32::from(self.tick_counter);
        self.tick_counter -= 1;
        self.previous_value = self.y_start + self.y_delta * elapsed / self.x_delta - offset;
        self.previous_value
    }
}
