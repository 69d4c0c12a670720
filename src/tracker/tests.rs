//! Sequencer behavior tests

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use super::*;

const SPEED: usize = 6;

fn sample(frames: usize) -> SampleData {
    SampleData::Bits8((0..frames).map(|i| (i % 64) as i8).collect())
}

/// One song over `orders` copies of an empty `rows` x `tracks` pattern,
/// with one looping instrument.
fn module(rows: usize, tracks: usize, orders: usize) -> Module {
    Module {
        name: String::from("test"),
        creator: Creator::DigiBooster3,
        num_tracks: tracks,
        songs: vec![Song {
            name: String::new(),
            play_list: (0..orders).collect(),
        }],
        patterns: vec![Pattern::new(rows, tracks); orders],
        instruments: vec![Instrument {
            volume: 64,
            loop_start: 100,
            loop_length: 400,
            loop_type: InstrumentLoop::Forward,
            ..Default::default()
        }],
        samples: vec![sample(1000)],
        ..Default::default()
    }
}

fn player(module: Module) -> (Player, Vec<ChannelLog>) {
    let channels = vec![ChannelLog::default(); module.num_tracks];
    let mut player = Player::new(Arc::new(module), PlayerConfig::default());
    player.initialize();
    (player, channels)
}

fn ticks(player: &mut Player, channels: &mut [ChannelLog], n: usize) {
    for _ in 0..n {
        player.next_tick(channels);
    }
}

#[test]
fn note_triggers_sample_at_c3_rate() {
    let mut m = module(4, 1, 1);
    m.patterns[0].set(0, 0, Entry::note(4, 0, 1));
    let (mut player, mut channels) = player(m);

    ticks(&mut player, &mut channels, 1);
    let ch = &channels[0];
    assert_eq!(ch.triggers, 1);
    assert_eq!(ch.instrument, Some(0));
    assert_eq!(ch.length, 1000);
    assert_eq!(ch.loop_range, Some((100, 400, LoopType::Normal)));
    assert_eq!(ch.frequency, 8363);
    assert_eq!(ch.volume, 256);
    assert_eq!(ch.panning, 128);
    assert!(!ch.muted);
}

#[test]
fn octave_doubles_frequency() {
    let mut m = module(4, 2, 1);
    m.patterns[0].set(0, 0, Entry::note(5, 0, 1));
    m.patterns[0].set(0, 1, Entry::note(3, 0, 1));
    let (mut player, mut channels) = player(m);
    ticks(&mut player, &mut channels, 1);
    assert_eq!(channels[0].frequency, 2 * 8363);
    assert_eq!(channels[1].frequency, 8363 / 2);
}

#[test]
fn digibooster2_uses_periods() {
    let mut m = module(4, 1, 1);
    m.creator = Creator::DigiBooster2;
    m.patterns[0].set(0, 0, Entry::note(4, 0, 1));
    let (mut player, mut channels) = player(m);
    ticks(&mut player, &mut channels, 1);
    // Period 1712 at C3 = 8363 Hz.
    assert_eq!(channels[0].frequency, (3_546_895 / 1712) * 4);
}

#[test]
fn missing_instrument_is_ignored() {
    let mut m = module(4, 1, 1);
    m.patterns[0].set(0, 0, Entry::note(4, 0, 9));
    let (mut player, mut channels) = player(m);
    ticks(&mut player, &mut channels, SPEED);
    assert_eq!(channels[0].triggers, 0);
    assert!(channels[0].muted);
}

#[test]
fn empty_sample_is_ignored() {
    let mut m = module(4, 1, 1);
    m.samples[0] = sample(0);
    m.patterns[0].set(0, 0, Entry::note(4, 0, 1));
    let (mut player, mut channels) = player(m);
    ticks(&mut player, &mut channels, SPEED);
    assert_eq!(channels[0].triggers, 0);
}

#[test]
fn jump_takes_priority_over_break() {
    let mut m = module(2, 1, 3);
    m.patterns[0].set(
        0,
        0,
        Entry::default()
            .with_effect(Effect::PositionJump as u8, 2)
            .with_effect2(Effect::PatternBreak as u8, 0x00),
    );
    let (mut player, mut channels) = player(m);

    ticks(&mut player, &mut channels, SPEED + 1);
    // Row 0 of order 2 has just been evaluated.
    assert_eq!(player.position(), (2, 1));
    let events = player.take_events();
    assert_eq!(
        events,
        vec![PlayerEvent::PositionChanged(0), PlayerEvent::PositionChanged(2)]
    );
    assert!(!player.has_ended());
}

#[test]
fn break_alone_moves_to_next_order() {
    let mut m = module(4, 1, 3);
    m.patterns[0].set(0, 0, Entry::default().with_effect(Effect::PatternBreak as u8, 0x02));
    let (mut player, mut channels) = player(m);
    ticks(&mut player, &mut channels, SPEED + 1);
    assert_eq!(player.position(), (1, 3));
}

#[test]
fn backward_jump_ends_module() {
    let mut m = module(2, 1, 2);
    m.patterns[1].set(0, 0, Entry::default().with_effect(Effect::PositionJump as u8, 0));
    let (mut player, mut channels) = player(m);
    ticks(&mut player, &mut channels, 3 * SPEED + 1);
    assert!(player.has_ended());
    assert!(player.take_events().contains(&PlayerEvent::ModuleEnded));
    assert_eq!(player.position(), (0, 1));
}

#[test]
fn song_wrap_ends_module() {
    let m = module(1, 1, 1);
    let (mut player, mut channels) = player(m);
    ticks(&mut player, &mut channels, SPEED);
    assert!(!player.has_ended());
    ticks(&mut player, &mut channels, 1);
    assert!(player.has_ended());
}

#[test]
fn f00_restarts_song() {
    let mut m = module(4, 1, 2);
    m.patterns[1].set(0, 0, Entry::default().with_effect(Effect::SetTempo as u8, 0));
    let (mut player, mut channels) = player(m);
    ticks(&mut player, &mut channels, 4 * SPEED + 1);
    assert_eq!(player.position().0, 1);
    assert!(!player.has_ended());
    ticks(&mut player, &mut channels, SPEED);
    assert!(player.has_ended());
    assert_eq!(player.position(), (0, 0));
}

#[test]
fn speed_and_tempo_scan() {
    let mut m = module(4, 2, 1);
    m.patterns[0].set(0, 0, Entry::default().with_effect(Effect::SetTempo as u8, 3));
    m.patterns[0].set(0, 1, Entry::default().with_effect2(Effect::SetTempo as u8, 0x96));
    let (mut player, mut channels) = player(m);
    ticks(&mut player, &mut channels, 1);
    assert_eq!(player.speed(), 3);
    assert_eq!(player.tempo(), 0x96);
    assert_eq!(player.frames_per_tick(), 44100 * 5 / (0x96 * 2));
    ticks(&mut player, &mut channels, 3);
    assert_eq!(player.position(), (0, 2));
}

#[test]
fn volume_slide_memory_matches_repeat() {
    let m = module(4, 1, 1);
    let mut synth = ModuleSynth::new(&m);
    let slide = Effect::VolumeSlide as u8;

    synth.effect(&m, 0, slide, 0x24);
    let first = synth.tracks[0].volume_delta;
    synth.effect(&m, 0, slide, 0x00);
    assert_eq!(synth.tracks[0].old.volume_slide, 0x24);
    assert_eq!(synth.tracks[0].volume_delta, 2 * first);

    let mut reused = ModuleSynth::new(&m);
    reused.effect(&m, 0, slide, 0x20);
    reused.effect(&m, 0, slide, 0x00);
    let mut repeated = ModuleSynth::new(&m);
    repeated.effect(&m, 0, slide, 0x20);
    repeated.effect(&m, 0, slide, 0x20);
    assert_eq!(reused.tracks[0].volume_delta, repeated.tracks[0].volume_delta);
    assert_eq!(reused.tracks[0].volume_delta, 2 * 2 * SPEED as i32);
}

#[test]
fn volume_slide_memory_during_playback() {
    let run = |second: u8| {
        let mut m = module(4, 1, 1);
        m.instruments[0].volume = 10;
        m.patterns[0].set(0, 0, Entry::note(4, 0, 1).with_effect(Effect::VolumeSlide as u8, 0x20));
        m.patterns[0].set(1, 0, Entry::default().with_effect(Effect::VolumeSlide as u8, second));
        let (mut player, mut channels) = player(m);
        ticks(&mut player, &mut channels, 2 * SPEED + 1);
        (player.synth().tracks()[0].volume, channels[0].volume)
    };
    assert_eq!(run(0x00), run(0x20));
    assert_ne!(run(0x00), run(0x10));
}

#[test]
fn effect_memories_are_per_effect() {
    let m = module(4, 1, 1);
    let mut synth = ModuleSynth::new(&m);
    synth.effect(&m, 0, Effect::VolumeSlide as u8, 0x30);
    synth.effect(&m, 0, Effect::PanningSlide as u8, 0x05);
    synth.effect(&m, 0, Effect::PortamentoUp as u8, 0x07);
    let old = synth.tracks[0].old;
    assert_eq!(old.volume_slide, 0x30);
    assert_eq!(old.panning_slide, 0x05);
    assert_eq!(old.portamento_up, 0x07);
    assert_eq!(old.portamento_down, 0);
}

#[test]
fn fine_volume_slide_is_unscaled() {
    let m = module(4, 1, 1);
    let mut synth = ModuleSynth::new(&m);
    synth.effect(&m, 0, Effect::VolumeSlide as u8, 0x3f);
    assert_eq!(synth.tracks[0].volume_delta, 3);
    synth.effect(&m, 0, Effect::VolumeSlide as u8, 0xf2);
    assert_eq!(synth.tracks[0].volume_delta, 1);
}

#[test]
fn volume_is_clamped() {
    let mut m = module(4, 1, 1);
    m.patterns[0].set(0, 0, Entry::note(4, 0, 1).with_effect(Effect::VolumeSlide as u8, 0xf0));
    let (mut player, mut channels) = player(m);
    ticks(&mut player, &mut channels, 2 * SPEED);
    assert_eq!(player.synth().tracks()[0].volume, 64 * SPEED as i32);
    assert_eq!(channels[0].volume, 256);
}

#[test]
fn set_volume_ignores_out_of_range() {
    let mut m = module(4, 1, 1);
    m.patterns[0].set(0, 0, Entry::note(4, 0, 1).with_effect(Effect::SetVolume as u8, 0x20));
    m.patterns[0].set(1, 0, Entry::default().with_effect(Effect::SetVolume as u8, 0x41));
    let (mut player, mut channels) = player(m);
    ticks(&mut player, &mut channels, 1);
    assert_eq!(channels[0].volume, 128);
    ticks(&mut player, &mut channels, SPEED);
    assert_eq!(channels[0].volume, 128);
}

#[test]
fn note_delay_and_cut() {
    let mut m = module(4, 1, 1);
    m.patterns[0].set(
        0,
        0,
        Entry::note(4, 0, 1)
            .with_effect(Effect::Extra as u8, 0xd2)
            .with_effect2(Effect::Extra as u8, 0xc4),
    );
    let (mut player, mut channels) = player(m);
    ticks(&mut player, &mut channels, 2);
    assert_eq!(channels[0].triggers, 0);
    ticks(&mut player, &mut channels, 1);
    assert_eq!(channels[0].triggers, 1);
    assert_eq!(channels[0].volume, 256);
    ticks(&mut player, &mut channels, 2);
    // Cut notes keep playing silently.
    assert_eq!(channels[0].volume, 0);
    assert!(!channels[0].muted);
}

#[test]
fn retrigger_repeats_note() {
    let mut m = module(4, 1, 1);
    m.patterns[0].set(0, 0, Entry::note(4, 0, 1).with_effect(Effect::Extra as u8, 0x92));
    let (mut player, mut channels) = player(m);
    ticks(&mut player, &mut channels, SPEED);
    assert_eq!(channels[0].triggers, 3);
}

#[test]
fn sample_offset_is_clamped() {
    let mut m = module(4, 2, 1);
    m.patterns[0].set(0, 0, Entry::note(4, 0, 1).with_effect(Effect::SampleOffset as u8, 0x02));
    m.patterns[0].set(0, 1, Entry::note(4, 0, 1).with_effect(Effect::SampleOffset as u8, 0x20));
    let (mut player, mut channels) = player(m);
    ticks(&mut player, &mut channels, 1);
    assert_eq!(channels[0].start_offset, 0x200);
    assert_eq!(channels[1].start_offset, 1000);
}

#[test]
fn key_off_without_envelope_mutes() {
    let mut m = module(4, 1, 1);
    m.patterns[0].set(0, 0, Entry::note(4, 0, 1));
    m.patterns[0].set(1, 0, Entry::key_off());
    let (mut player, mut channels) = player(m);
    ticks(&mut player, &mut channels, SPEED);
    assert!(!channels[0].muted);
    ticks(&mut player, &mut channels, 1);
    assert!(channels[0].muted);
}

#[test]
fn volume_envelope_shapes_gain() {
    let mut m = module(4, 1, 1);
    m.volume_envelopes.push(Envelope {
        points: vec![
            EnvelopePoint { position: 0, value: 64 },
            EnvelopePoint { position: 4, value: 0 },
        ],
        ..Default::default()
    });
    m.instruments[0].volume_envelope = Some(0);
    m.patterns[0].set(0, 0, Entry::note(4, 0, 1));
    let (mut player, mut channels) = player(m);
    let volumes: Vec<u16> = (0..6)
        .map(|_| {
            player.next_tick(&mut channels);
            channels[0].volume
        })
        .collect();
    assert_eq!(volumes, vec![256, 192, 128, 64, 0, 0]);
}

#[test]
fn panning_envelope_shrinks_near_edges() {
    let mut m = module(4, 2, 1);
    m.panning_envelopes.push(Envelope {
        points: vec![EnvelopePoint { position: 0, value: 128 }],
        ..Default::default()
    });
    m.instruments[0].panning_envelope = Some(0);
    m.patterns[0].set(0, 0, Entry::note(4, 0, 1));
    m.patterns[0].set(0, 1, Entry::note(4, 0, 1).with_effect(Effect::SetPanning as u8, 0));
    let (mut player, mut channels) = player(m);
    ticks(&mut player, &mut channels, 1);
    // Center panning follows the envelope fully.
    assert_eq!(channels[0].panning, 256);
    // Hard left leaves the envelope no room.
    assert_eq!(channels[1].panning, 0);
}

#[test]
fn pattern_loop_repeats_rows() {
    let mut m = module(4, 1, 1);
    m.patterns[0].set(0, 0, Entry::default().with_effect(Effect::Extra as u8, 0x60));
    m.patterns[0].set(1, 0, Entry::default().with_effect(Effect::Extra as u8, 0x62));
    let (mut player, mut channels) = player(m);

    let mut rows = Vec::new();
    for _ in 0..7 {
        player.next_tick(&mut channels);
        rows.push(player.position().1 - 1);
        ticks(&mut player, &mut channels, SPEED - 1);
    }
    assert_eq!(rows, vec![0, 1, 0, 1, 0, 1, 2]);
}

#[test]
fn pattern_delay_holds_row() {
    let mut m = module(4, 1, 1);
    m.patterns[0].set(0, 0, Entry::default().with_effect(Effect::Extra as u8, 0xe2));
    let (mut player, mut channels) = player(m);
    ticks(&mut player, &mut channels, 3 * SPEED);
    assert_eq!(player.position(), (0, 1));
    ticks(&mut player, &mut channels, 1);
    assert_eq!(player.position(), (0, 2));
}

#[test]
fn global_volume_slides_and_clamps() {
    let mut m = module(4, 1, 1);
    m.patterns[0].set(
        0,
        0,
        Entry::note(4, 0, 1)
            .with_effect(Effect::SetGlobalVolume as u8, 0x50)
            .with_effect2(Effect::GlobalVolumeSlide as u8, 0x08),
    );
    let (mut player, mut channels) = player(m);
    ticks(&mut player, &mut channels, 1);
    assert_eq!(player.synth().global_volume(), 64);
    ticks(&mut player, &mut channels, 2);
    assert_eq!(player.synth().global_volume(), 48);
}

#[test]
fn db3_portamento_to_note_stops_at_target() {
    let mut m = module(8, 1, 1);
    m.patterns[0].set(0, 0, Entry::note(4, 0, 1));
    m.patterns[0].set(
        1,
        0,
        Entry::note(4, 2, 0).with_effect(Effect::PortamentoToNote as u8, 0x40),
    );
    let (mut player, mut channels) = player(m);
    ticks(&mut player, &mut channels, 3 * SPEED);
    assert_eq!(channels[0].triggers, 1);
    let target = ((4 * 12 + 2) << 3) * SPEED as i32;
    assert_eq!(player.synth().tracks()[0].pitch, target);
}

#[test]
fn echo_switches() {
    let mut m = module(4, 3, 1);
    let v = Effect::EchoSwitch as u8;
    m.patterns[0].set(0, 0, Entry::default().with_effect(v, 0x00));
    m.patterns[0].set(
        0,
        1,
        Entry::default()
            .with_effect(Effect::EchoDelay as u8, 0x10)
            .with_effect2(v, 0x20),
    );
    m.patterns[0].set(1, 0, Entry::default().with_effect(v, 0x21));
    m.patterns[0].set(1, 1, Entry::default().with_effect(Effect::EchoMix as u8, 0x33));
    m.patterns[0].set(2, 2, Entry::default().with_effect(v, 0x10));
    m.patterns[0].set(3, 0, Entry::default().with_effect(v, 0x11));
    let (mut player, mut channels) = player(m);

    ticks(&mut player, &mut channels, 1);
    let echo = player.effect_master();
    assert_eq!(echo.effect_group(0), Some(DEFAULT_EFFECT_GROUP));
    assert_eq!(echo.effect_group(1), Some(1));
    assert_eq!(echo.arguments(1).map(|a| a.delay), Some(0x10));
    assert_eq!(echo.effect_group(2), None);

    ticks(&mut player, &mut channels, SPEED);
    let echo = player.effect_master();
    // New style off does not touch the shared group.
    assert_eq!(echo.effect_group(0), Some(DEFAULT_EFFECT_GROUP));
    assert_eq!(echo.arguments(1).map(|a| a.mix), Some(0x33));

    ticks(&mut player, &mut channels, SPEED);
    let echo = player.effect_master();
    assert_eq!(echo.effect_group(2), Some(DEFAULT_EFFECT_GROUP));
    assert_eq!(echo.effect_group(1), Some(1));

    ticks(&mut player, &mut channels, SPEED);
    let echo = player.effect_master();
    assert_eq!(echo.effect_group(0), None);
    assert_eq!(echo.effect_group(2), None);
    assert_eq!(echo.effect_group(1), Some(1));
}

#[test]
fn default_echo_tracks_start_in_shared_group() {
    let mut m = module(4, 2, 1);
    m.dsp_defaults.echo_tracks = vec![false, true];
    let (player, _) = player(m);
    let groups: Vec<_> = player.effect_master().channel_groups().collect();
    assert_eq!(groups, vec![(1, DEFAULT_EFFECT_GROUP)]);
}

#[test]
fn snapshot_is_isolated() {
    let mut m = module(8, 2, 1);
    m.volume_envelopes.push(Envelope {
        points: vec![
            EnvelopePoint { position: 0, value: 0 },
            EnvelopePoint { position: 20, value: 64 },
        ],
        ..Default::default()
    });
    m.instruments[0].volume_envelope = Some(0);
    m.patterns[0].set(0, 0, Entry::note(4, 0, 1).with_effect(Effect::Arpeggio as u8, 0x37));
    m.patterns[0].set(1, 0, Entry::default().with_effect(Effect::EchoSwitch as u8, 0x00));
    m.patterns[0].set(1, 1, Entry::note(5, 0, 1).with_effect(Effect::Arpeggio as u8, 0x47));
    let (mut player, mut channels) = player(m);

    ticks(&mut player, &mut channels, 2);
    let snapshot = player.create_snapshot();
    let tracks: Vec<ModuleTrack> = snapshot.synth().tracks().to_vec();
    let position = (snapshot.synth().order(), snapshot.synth().row());

    ticks(&mut player, &mut channels, SPEED + 3);
    assert_ne!(player.synth().tracks(), &tracks[..]);
    assert_eq!(player.effect_master().effect_group(0), Some(DEFAULT_EFFECT_GROUP));

    assert_eq!(snapshot.synth().tracks(), &tracks[..]);
    assert_eq!(snapshot.synth().tracks()[0].arp_table, [0, 3 * 8 * 6, 7 * 8 * 6]);
    assert_eq!((snapshot.synth().order(), snapshot.synth().row()), position);
    assert_eq!(snapshot.synth().effect_master().effect_group(0), None);

    player.set_snapshot(&snapshot);
    assert_eq!(player.synth().tracks(), &tracks[..]);
    assert_eq!(player.effect_master().effect_group(0), None);

    // Playing on from the restored state leaves the snapshot alone again.
    ticks(&mut player, &mut channels, SPEED);
    assert_eq!(snapshot.synth().tracks(), &tracks[..]);
}

#[test]
fn set_position_ignores_unknown_orders() {
    let m = module(4, 1, 3);
    let (mut player, _) = player(m);
    player.set_position(2);
    assert_eq!(player.position(), (2, 0));
    player.set_position(3);
    assert_eq!(player.position(), (2, 0));
    assert_eq!(player.song_length(), 3);
}
