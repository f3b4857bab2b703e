use std::f32::consts::PI;

use approx::assert_abs_diff_eq;
use speakscore::audio::{decoder, encoder, window};
use speakscore::config::{fixed_window_len, N_MELS, TARGET_SAMPLE_RATE};
use speakscore::{SpectralTransform, Waveform};

fn sine(freq: f32, secs: f32, sample_rate: u32) -> Waveform {
    let len = (secs * sample_rate as f32) as usize;
    let samples: Vec<f32> = (0..len)
        .map(|i| 0.3 * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
        .collect();
    Waveform::new(samples, sample_rate).unwrap()
}

#[test]
fn every_input_becomes_a_fixed_window() {
    for waveform in [
        sine(300.0, 1.0, 16_000),
        sine(300.0, 9.0, 16_000),
        sine(300.0, 2.0, 44_100),
        sine(300.0, 7.5, 8_000),
        Waveform::new(Vec::<f32>::new(), 48_000).unwrap(),
    ] {
        let clip = window::fix_window(&waveform).unwrap();
        assert_eq!(clip.len(), fixed_window_len());
        assert_eq!(clip.sample_rate(), TARGET_SAMPLE_RATE);
    }
}

#[test]
fn short_input_is_zero_padded_on_the_right() {
    let clip = window::fix_window(&sine(300.0, 1.0, 16_000)).unwrap();
    assert!(clip.samples()[..16_000].iter().any(|&s| s != 0.0));
    assert!(clip.samples()[16_000..].iter().all(|&s| s == 0.0));
}

#[test]
fn spectrogram_shape_does_not_depend_on_duration() {
    let transform = SpectralTransform::new();
    let expected_steps = SpectralTransform::time_steps(fixed_window_len());
    assert_eq!(expected_steps, 157);
    for secs in [0.5, 5.0, 12.0] {
        let clip = window::fix_window(&sine(500.0, secs, 16_000)).unwrap();
        let mel = transform.transform(&clip).unwrap();
        assert_eq!(mel.shape(), (N_MELS, expected_steps));
        let max = mel.data().iter().copied().fold(f32::MIN, f32::max);
        let min = mel.data().iter().copied().fold(f32::MAX, f32::min);
        assert_abs_diff_eq!(max, 0.0, epsilon = 1e-4);
        assert!(min >= -80.0 - 1e-4);
    }
}

#[test]
fn written_window_decodes_back_to_same_length() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("window.wav");
    let clip = window::fix_window(&sine(440.0, 2.0, 22_050)).unwrap();
    encoder::write_window_wav(&clip, &path).unwrap();

    let decoded = decoder::decode_file(&path).unwrap();
    assert_eq!(decoded.sample_rate(), TARGET_SAMPLE_RATE);
    assert_eq!(decoded.samples().len(), fixed_window_len());
}
