// End-to-end chip tests through the register interface.
//
// Verify both sampling methods, oscillator hard sync, the voice 3 read
// back registers and configuration errors.

use std::collections::HashSet;
use std::sync::Arc;

use resid_tracker::filter::{FilterModelConfig6581, FilterModelConfig8580};
use resid_tracker::{clock, reg, ChipModel, SamplingMethod, Sid, SidConfig, SidError};

/// Plays a sawtooth on voice 1 for one second of PAL time.
fn play_tone(method: SamplingMethod, model: ChipModel) -> Vec<i16> {
    let mut sid = Sid::from_config(&SidConfig {
        chip_model: model,
        sampling_method: method,
        ..SidConfig::default()
    })
    .expect("valid config");
    sid.write(reg::MODVOL, 0x0f);
    sid.write(reg::AD1, 0x00);
    sid.write(reg::SR1, 0xf0);
    sid.write(reg::FREQLO1, 0x00);
    sid.write(reg::FREQHI1, 0x20);
    sid.write(reg::CR1, 0x21);

    let mut output = Vec::new();
    let mut buffer = [0i16; 4096];
    for _ in 0..100 {
        let n = sid.clock(clock::PAL / 100, &mut buffer);
        output.extend_from_slice(&buffer[..n]);
    }
    output
}

fn rms(samples: &[i16]) -> f64 {
    let sum: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum / samples.len() as f64).sqrt()
}

#[test]
fn both_sampling_methods_produce_the_tone() {
    for model in [ChipModel::Mos6581, ChipModel::Mos8580] {
        let decimated = play_tone(SamplingMethod::Decimate, model);
        let resampled = play_tone(SamplingMethod::Resample, model);

        assert!((decimated.len() as i64 - 44100).abs() <= 50, "{}", decimated.len());
        assert!((resampled.len() as i64 - 44100).abs() <= 450, "{}", resampled.len());

        // Skip the power-up transient.
        let a = rms(&decimated[4410..]);
        let b = rms(&resampled[4410..]);
        assert!(a > 100.0, "{:?} decimated rms {}", model, a);
        assert!(b > a / 2.0 && b < a * 2.0, "{:?} rms {} vs {}", model, a, b);
    }
}

#[test]
fn samples_beyond_buffer_are_dropped() {
    let mut sid = Sid::new();
    let mut buffer = [0i16; 16];
    assert_eq!(sid.clock(clock::PAL / 10, &mut buffer), 16);
}

/// Voice 2 restarts when voice 1's MSB rises.
#[test]
fn hard_sync_resets_destination() {
    let mut sid = Sid::new();
    sid.write(reg::FREQHI1, 0x10);
    sid.write(reg::FREQHI2, 0x01);
    sid.write(reg::CR2, 0x22);

    // Voice 1 starts at 0x555555 and crosses 0x800000 on cycle 683.
    let mut buffer = [0i16; 64];
    sid.clock(700, &mut buffer);

    let voice2 = sid.voice(1).expect("voice 2");
    assert_eq!(voice2.wave().read_accumulator(), 17 * 0x100);
}

/// A source that is itself synced on the same cycle does not sync its
/// destination.
#[test]
fn mutual_sync_on_same_cycle() {
    let mut sid = Sid::new();
    sid.write(reg::FREQHI1, 0x10);
    sid.write(reg::FREQHI2, 0x01);
    sid.write(reg::FREQHI3, 0x10);
    sid.write(reg::CR1, 0x02);
    sid.write(reg::CR2, 0x02);

    let mut buffer = [0i16; 64];
    sid.clock(700, &mut buffer);

    let v1 = sid.voice(0).expect("voice 1").wave().read_accumulator();
    let v2 = sid.voice(1).expect("voice 2").wave().read_accumulator();
    assert_eq!(v1, 17 * 0x1000);
    assert_eq!(v2, 0x55_5555 + 700 * 0x100);
}

#[test]
fn voice3_reads_back() {
    let mut sid = Sid::new();
    sid.write(reg::AD3, 0x00);
    sid.write(reg::SR3, 0xf0);
    sid.write(reg::FREQHI3, 0x10);
    sid.write(reg::CR3, 0x21);

    let mut buffer = [0i16; 64];
    let mut seen = HashSet::new();
    for _ in 0..100 {
        sid.clock(100, &mut buffer);
        let osc = sid.read(reg::OSC3);
        assert_eq!(osc, sid.voice(2).expect("voice 3").wave().read_osc());
        seen.insert(osc);
    }
    assert!(seen.len() > 4, "OSC3 stuck at {:?}", seen);
    assert_eq!(sid.read(reg::ENV3), 0xff);
}

#[test]
fn filter_tables_are_shared() {
    let shared6581 = FilterModelConfig6581::shared();
    let shared8580 = FilterModelConfig8580::shared();
    assert!(Arc::ptr_eq(&shared6581, &FilterModelConfig6581::shared()));
    assert!(Arc::ptr_eq(&shared8580, &FilterModelConfig8580::shared()));

    let explicit = Sid::with_filter_models(shared6581.clone(), shared8580.clone());
    let configured = Sid::from_config(&SidConfig {
        chip_model: ChipModel::Mos6581,
        ..SidConfig::default()
    })
    .expect("valid config");
    for sid in [&explicit, &Sid::new(), &configured] {
        let (models6581, models8580) = sid.filter_models();
        assert!(Arc::ptr_eq(models6581, &shared6581));
        assert!(Arc::ptr_eq(models8580, &shared8580));
    }

    // Clones keep pointing at the same tables.
    let copy = configured.clone();
    assert!(Arc::ptr_eq(copy.filter_models().0, &shared6581));
}

#[test]
fn config_errors() {
    let invalid_passband = SidConfig {
        sampling_method: SamplingMethod::Resample,
        sample_frequency: 22050.0,
        ..SidConfig::default()
    };
    assert_eq!(Sid::from_config(&invalid_passband).err(), Some(SidError::InvalidPassband));

    let narrow = SidConfig {
        highest_accurate_frequency: 10000.0,
        ..invalid_passband
    };
    assert!(Sid::from_config(&narrow).is_ok());

    let no_clock = SidConfig {
        clock_frequency: 0.0,
        ..SidConfig::default()
    };
    assert_eq!(Sid::from_config(&no_clock).err(), Some(SidError::ZeroClockFrequency));
}

#[test]
fn ntsc_rates() {
    for sample_frequency in [22050.0, 44100.0, 48000.0, 96000.0] {
        let mut sid = Sid::new();
        let passband = (sample_frequency * 0.45f64).min(20000.0);
        sid.set_sampling_parameters(
            f64::from(clock::NTSC),
            SamplingMethod::Resample,
            sample_frequency,
            passband,
        )
        .expect("valid parameters");
        sid.write(reg::CR1, 0x11);
        let mut buffer = [0i16; 256];
        assert!(sid.clock(1000, &mut buffer) > 0, "{} Hz", sample_frequency);
    }
}
