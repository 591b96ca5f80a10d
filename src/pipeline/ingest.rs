//! # Audio Ingestion
//!
//! Decodes and validates an uploaded clip and applies the optional chorus
//! window. Supported containers are WAV and MP3, judged by filename
//! extension before any decode work. Window relationship checks
//! (`start >= 0`, `start < end`) also run before decoding so bad requests
//! fail cheaply; the `end <= duration` check runs as soon as the decoded
//! duration is known.
//!
//! The trimmed clip is written to a scratch WAV for the external feature
//! extractor, wrapped in a guard that removes the file on every exit path.

use crate::error::PredictionError;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::warn;

/// Supported upload containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    /// Judge the container from the filename extension.
    pub fn from_filename(filename: &str) -> Result<Self, PredictionError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some("wav") => Ok(AudioFormat::Wav),
            Some("mp3") => Ok(AudioFormat::Mp3),
            _ => Err(PredictionError::UnsupportedFormat(format!(
                "'{}': only WAV and MP3 files are supported",
                filename
            ))),
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }
}

/// Optional sub-interval of the clip, in seconds.
///
/// Invariant once constructed: `0 <= start < end`. The upper bound against
/// the clip duration is checked separately because the duration is only
/// known after decoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChorusWindow {
    pub start: f64,
    pub end: f64,
}

impl ChorusWindow {
    /// Build a window from the optional form fields.
    ///
    /// Both bounds present → validated window; neither → no window; exactly
    /// one → rejected, a half-open window is meaningless.
    pub fn from_options(
        start: Option<f64>,
        end: Option<f64>,
    ) -> Result<Option<Self>, PredictionError> {
        match (start, end) {
            (None, None) => Ok(None),
            (Some(start), Some(end)) => {
                if !start.is_finite() || !end.is_finite() {
                    return Err(PredictionError::InvalidTimeRange(
                        "chorus bounds must be finite numbers".to_string(),
                    ));
                }
                if start < 0.0 || end < 0.0 {
                    return Err(PredictionError::InvalidTimeRange(format!(
                        "chorus bounds must be non-negative (got start={}, end={})",
                        start, end
                    )));
                }
                if start >= end {
                    return Err(PredictionError::InvalidTimeRange(format!(
                        "chorus start {} must be before end {}",
                        start, end
                    )));
                }
                Ok(Some(Self { start, end }))
            }
            _ => Err(PredictionError::InvalidTimeRange(
                "chorus_start and chorus_end must be given together".to_string(),
            )),
        }
    }

    /// Check the window fits inside the decoded clip.
    pub fn check_within(&self, duration: f64) -> Result<(), PredictionError> {
        if self.end > duration {
            return Err(PredictionError::InvalidTimeRange(format!(
                "chorus end {}s exceeds clip duration {:.3}s",
                self.end, duration
            )));
        }
        Ok(())
    }
}

/// A decoded clip: mono PCM samples at the source sample rate.
/// Immutable once decoded; trimming produces a new clip.
#[derive(Debug, Clone)]
pub struct AudioClip {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Copy out the sub-range covered by the window. Caller must have
    /// validated the window against the duration already.
    pub fn trim(&self, window: &ChorusWindow) -> AudioClip {
        let start = (window.start * self.sample_rate as f64) as usize;
        let end = ((window.end * self.sample_rate as f64) as usize).min(self.samples.len());
        AudioClip {
            samples: self.samples[start..end].to_vec(),
            sample_rate: self.sample_rate,
        }
    }
}

/// Validate, decode and optionally trim an uploaded clip.
pub fn ingest(
    bytes: &[u8],
    filename: &str,
    window: Option<ChorusWindow>,
) -> Result<AudioClip, PredictionError> {
    let format = AudioFormat::from_filename(filename)?;
    let clip = decode(bytes, format)?;

    match window {
        Some(window) => {
            window.check_within(clip.duration_secs())?;
            Ok(clip.trim(&window))
        }
        None => Ok(clip),
    }
}

/// Decode the upload to mono f32 PCM with symphonia.
///
/// Stereo content is folded to mono by averaging channels, matching what the
/// feature toolkit would do with multichannel input anyway.
fn decode(bytes: &[u8], format: AudioFormat) -> Result<AudioClip, PredictionError> {
    let cursor = std::io::Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(format.extension());

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| PredictionError::CorruptAudio(format!("container probe failed: {}", e)))?;
    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| {
            PredictionError::CorruptAudio("no decodable audio track found".to_string())
        })?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| PredictionError::CorruptAudio(format!("decoder init failed: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_rate = 0u32;

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            // End of stream
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => {
                return Err(PredictionError::CorruptAudio(format!(
                    "failed reading packet: {}",
                    e
                )))
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                let channels = spec.channels.count();

                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);

                if channels == 1 {
                    samples.extend_from_slice(buf.samples());
                } else {
                    for frame in buf.samples().chunks(channels) {
                        let sum: f32 = frame.iter().sum();
                        samples.push(sum / channels as f32);
                    }
                }
            }
            Err(SymphoniaError::IoError(_)) => break,
            // Skip recoverable frame-level glitches, keep decoding
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(error = %e, "Skipping undecodable frame");
            }
            Err(e) => {
                return Err(PredictionError::CorruptAudio(format!(
                    "decode failed: {}",
                    e
                )))
            }
        }
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(PredictionError::CorruptAudio(
            "no audio samples could be decoded".to_string(),
        ));
    }

    Ok(AudioClip::new(samples, sample_rate))
}

/// A scratch file removed on drop, so temporary audio resources are released
/// on every exit path, whether success, validation failure or extractor failure.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Reserve a unique path in the system temp directory.
    pub fn reserve(extension: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "emotion-{}.{}",
            uuid::Uuid::new_v4(),
            extension
        ));
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "Failed to remove scratch file");
            }
        }
    }
}

/// Write the clip to a scratch 16-bit PCM WAV the feature toolkit can read.
pub fn write_scratch_wav(clip: &AudioClip) -> Result<ScratchFile, PredictionError> {
    let scratch = ScratchFile::reserve("wav");

    let spec = WavSpec {
        channels: 1,
        sample_rate: clip.sample_rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(scratch.path(), spec)
        .map_err(|e| PredictionError::Internal(format!("creating scratch wav: {}", e)))?;
    for &sample in clip.samples() {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(value)
            .map_err(|e| PredictionError::Internal(format!("writing scratch wav: {}", e)))?;
    }
    writer
        .finalize()
        .map_err(|e| PredictionError::Internal(format!("finalizing scratch wav: {}", e)))?;

    Ok(scratch)
}

/// In-memory 16-bit mono WAV with a 440 Hz tone, shared by pipeline tests.
#[cfg(test)]
pub(crate) fn wav_bytes(duration_secs: f64, sample_rate: u32) -> Vec<u8> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        let total = (duration_secs * sample_rate as f64) as usize;
        for i in 0..total {
            let t = i as f32 / sample_rate as f32;
            let sample = (t * 440.0 * 2.0 * std::f32::consts::PI).sin();
            writer
                .write_sample((sample * 0.5 * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_filename() {
        assert_eq!(AudioFormat::from_filename("song.wav").unwrap(), AudioFormat::Wav);
        assert_eq!(AudioFormat::from_filename("SONG.MP3").unwrap(), AudioFormat::Mp3);
        assert!(matches!(
            AudioFormat::from_filename("notes.txt"),
            Err(PredictionError::UnsupportedFormat(_))
        ));
        assert!(AudioFormat::from_filename("no_extension").is_err());
    }

    #[test]
    fn test_window_validation() {
        assert!(ChorusWindow::from_options(None, None).unwrap().is_none());

        let window = ChorusWindow::from_options(Some(1.0), Some(3.0))
            .unwrap()
            .unwrap();
        assert_eq!(window.start, 1.0);
        assert_eq!(window.end, 3.0);

        // start >= end
        assert!(matches!(
            ChorusWindow::from_options(Some(5.0), Some(3.0)),
            Err(PredictionError::InvalidTimeRange(_))
        ));
        // negative bound
        assert!(ChorusWindow::from_options(Some(-1.0), Some(3.0)).is_err());
        // half-open window
        assert!(ChorusWindow::from_options(Some(1.0), None).is_err());

        // beyond the clip
        let window = ChorusWindow { start: 0.0, end: 20.0 };
        assert!(window.check_within(10.0).is_err());
        assert!(window.check_within(20.0).is_ok());
    }

    #[test]
    fn test_decode_wav_and_trim() {
        let bytes = wav_bytes(2.0, 16000);
        let clip = ingest(&bytes, "clip.wav", None).unwrap();
        assert_eq!(clip.sample_rate(), 16000);
        assert!((clip.duration_secs() - 2.0).abs() < 0.01);

        let window = ChorusWindow { start: 0.5, end: 1.5 };
        let trimmed = ingest(&bytes, "clip.wav", Some(window)).unwrap();
        assert!((trimmed.duration_secs() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_window_beyond_duration_is_rejected() {
        let bytes = wav_bytes(1.0, 16000);
        let window = ChorusWindow { start: 0.5, end: 5.0 };
        assert!(matches!(
            ingest(&bytes, "clip.wav", Some(window)),
            Err(PredictionError::InvalidTimeRange(_))
        ));
    }

    #[test]
    fn test_garbage_bytes_are_corrupt_audio() {
        let garbage = vec![0x13u8; 512];
        assert!(matches!(
            ingest(&garbage, "clip.wav", None),
            Err(PredictionError::CorruptAudio(_))
        ));
        assert!(matches!(
            ingest(&garbage, "clip.mp3", None),
            Err(PredictionError::CorruptAudio(_))
        ));
    }

    #[test]
    fn test_scratch_wav_roundtrip_and_cleanup() {
        let bytes = wav_bytes(0.25, 8000);
        let clip = ingest(&bytes, "clip.wav", None).unwrap();

        let path;
        {
            let scratch = write_scratch_wav(&clip).unwrap();
            path = scratch.path().to_path_buf();
            assert!(path.exists());

            let reader = hound::WavReader::open(&path).unwrap();
            assert_eq!(reader.spec().sample_rate, 8000);
            assert_eq!(reader.spec().channels, 1);
        }
        // Guard dropped; file must be gone
        assert!(!path.exists());
    }
}
