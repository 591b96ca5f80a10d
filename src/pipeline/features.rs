//! # Feature Extraction
//!
//! Wraps the external openSMILE-style feature toolkit as a synchronous RPC
//! boundary. The toolkit runs with a fixed configuration (ComParE_2016
//! functionals) that turns variable-length audio into a fixed-length vector
//! of K spectral/prosodic statistics; K is the single hard invariant
//! protecting every downstream model and is checked explicitly on every
//! successful extraction.
//!
//! ## Failure modes:
//! - deadline exceeded → subprocess killed, kind `timeout`
//! - spawn failure or non-zero exit → kind `toolkit-failure`
//! - output that does not parse to exactly K floats → kind `malformed-output`
//!
//! No retries happen here; retry policy belongs to callers. Concurrent
//! extractions are bounded by a semaphore sized to the configured limit
//! (default: available CPU cores) so load cannot fan out subprocesses
//! without bound.

use crate::config::ExtractorConfig;
use crate::error::{FeatureExtractionKind, PredictionError};
use crate::pipeline::ingest::ScratchFile;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Ordered, fixed-dimension acoustic descriptor for one clip.
pub type FeatureVector = Vec<f32>;

/// Handle to the external feature toolkit.
pub struct FeatureExtractor {
    binary: PathBuf,
    config_file: PathBuf,
    timeout: Duration,
    dimension: usize,
    permits: Semaphore,
}

impl FeatureExtractor {
    pub fn new(config: &ExtractorConfig, concurrency: usize) -> Self {
        Self {
            binary: config.binary.clone(),
            config_file: config.config_file.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            dimension: config.feature_dimension,
            permits: Semaphore::new(concurrency.max(1)),
        }
    }

    /// K: the exact vector length every successful extraction produces.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Run the toolkit over a WAV file and parse its CSV output.
    pub async fn extract(&self, wav_path: &Path) -> Result<FeatureVector, PredictionError> {
        // Bound subprocess fan-out; a closed semaphore only happens during
        // shutdown.
        let _permit = self.permits.acquire().await.map_err(|_| {
            PredictionError::Internal("extraction semaphore closed".to_string())
        })?;

        let csv_out = ScratchFile::reserve("csv");

        let mut command = Command::new(&self.binary);
        command
            .arg("-C")
            .arg(&self.config_file)
            .arg("-I")
            .arg(wav_path)
            .arg("-csvoutput")
            .arg(csv_out.path())
            .arg("-instname")
            .arg("clip")
            .arg("-l")
            .arg("1")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            // If the timeout drops the wait future, the child dies with it
            .kill_on_drop(true);

        debug!(binary = %self.binary.display(), input = %wav_path.display(), "Spawning feature extractor");

        let child = command.spawn().map_err(|e| PredictionError::FeatureExtraction {
            kind: FeatureExtractionKind::ToolkitFailure,
            message: format!("failed to spawn '{}': {}", self.binary.display(), e),
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(PredictionError::FeatureExtraction {
                    kind: FeatureExtractionKind::ToolkitFailure,
                    message: format!("waiting on extractor failed: {}", e),
                })
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Feature extractor timed out");
                return Err(PredictionError::FeatureExtraction {
                    kind: FeatureExtractionKind::Timeout,
                    message: format!(
                        "extractor exceeded the {}s deadline and was killed",
                        self.timeout.as_secs()
                    ),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PredictionError::FeatureExtraction {
                kind: FeatureExtractionKind::ToolkitFailure,
                message: format!(
                    "extractor exited with {}: {}",
                    output.status,
                    stderr.trim().chars().take(500).collect::<String>()
                ),
            });
        }

        let contents = std::fs::read_to_string(csv_out.path()).map_err(|e| {
            PredictionError::FeatureExtraction {
                kind: FeatureExtractionKind::MalformedOutput,
                message: format!("extractor produced no readable output: {}", e),
            }
        })?;

        parse_feature_row(&contents, self.dimension)
    }
}

/// Parse the toolkit's CSV output into exactly `dimension` floats.
///
/// ## Expected shape (csvsink with the fixed configuration):
/// a header line, then one data line of `name;frameTime;<K values>`
/// separated by semicolons. Only the last non-empty line is read.
pub fn parse_feature_row(csv: &str, dimension: usize) -> Result<FeatureVector, PredictionError> {
    let row = csv
        .lines()
        .filter(|line| !line.trim().is_empty())
        .last()
        .ok_or_else(|| PredictionError::FeatureExtraction {
            kind: FeatureExtractionKind::MalformedOutput,
            message: "extractor output is empty".to_string(),
        })?;

    let fields: Vec<&str> = row.split(';').collect();
    if fields.len() != dimension + 2 {
        return Err(PredictionError::FeatureExtraction {
            kind: FeatureExtractionKind::MalformedOutput,
            message: format!(
                "expected {} feature columns (+ name and frameTime), got {} fields",
                dimension,
                fields.len()
            ),
        });
    }

    let mut features = Vec::with_capacity(dimension);
    for field in &fields[2..] {
        let value: f32 = field.trim().parse().map_err(|_| {
            PredictionError::FeatureExtraction {
                kind: FeatureExtractionKind::MalformedOutput,
                message: format!("non-numeric feature value '{}'", field),
            }
        })?;
        features.push(value);
    }

    // The dimension check is the hard invariant; keep it explicit even
    // though the field count above already implies it.
    if features.len() != dimension {
        return Err(PredictionError::FeatureExtraction {
            kind: FeatureExtractionKind::MalformedOutput,
            message: format!("expected {} features, parsed {}", dimension, features.len()),
        });
    }

    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractorConfig;
    use std::os::unix::fs::PermissionsExt;

    fn extractor_with_binary(binary: &Path, timeout_secs: u64, dimension: usize) -> FeatureExtractor {
        FeatureExtractor::new(
            &ExtractorConfig {
                binary: binary.to_path_buf(),
                config_file: PathBuf::from("conf/ComParE_2016.conf"),
                timeout_secs,
                feature_dimension: dimension,
            },
            2,
        )
    }

    /// Write an executable shell script standing in for the toolkit.
    fn fake_toolkit(script_body: &str) -> (tempdir::Dir, PathBuf) {
        let dir = tempdir::Dir::new();
        let path = dir.path.join("fake-smile");
        let script = format!(
            "#!/bin/sh\nout=\"\"\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"-csvoutput\" ]; then out=\"$2\"; fi\n  shift\ndone\n{}\n",
            script_body
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        (dir, path)
    }

    /// Minimal self-cleaning temp dir for the fake toolkit scripts.
    mod tempdir {
        use std::path::PathBuf;

        pub struct Dir {
            pub path: PathBuf,
        }

        impl Dir {
            pub fn new() -> Self {
                let path = std::env::temp_dir()
                    .join(format!("extractor-test-{}", uuid::Uuid::new_v4()));
                std::fs::create_dir_all(&path).unwrap();
                Self { path }
            }
        }

        impl Drop for Dir {
            fn drop(&mut self) {
                std::fs::remove_dir_all(&self.path).ok();
            }
        }
    }

    #[test]
    fn test_parse_feature_row() {
        let csv = "name;frameTime;f1;f2;f3\n'clip';0.0;1.5;-2.0;0.25\n";
        let features = parse_feature_row(csv, 3).unwrap();
        assert_eq!(features, vec![1.5, -2.0, 0.25]);
    }

    #[test]
    fn test_parse_rejects_wrong_dimension() {
        let csv = "'clip';0.0;1.0;2.0\n";
        let err = parse_feature_row(csv, 3).unwrap_err();
        assert!(matches!(
            err,
            PredictionError::FeatureExtraction {
                kind: FeatureExtractionKind::MalformedOutput,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_rejects_non_numeric_and_empty() {
        let csv = "'clip';0.0;1.0;oops;3.0\n";
        assert!(parse_feature_row(csv, 3).is_err());
        assert!(parse_feature_row("", 3).is_err());
        assert!(parse_feature_row("\n\n", 3).is_err());
    }

    #[tokio::test]
    async fn test_extract_happy_path() {
        let (_dir, binary) = fake_toolkit(
            "printf \"name;frameTime;a;b;c;d\\n'clip';0.0;1.0;2.0;3.0;4.0\\n\" > \"$out\"",
        );
        let extractor = extractor_with_binary(&binary, 10, 4);

        let features = extractor.extract(Path::new("/dev/null")).await.unwrap();
        assert_eq!(features, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn test_extract_wrong_dimension_is_malformed_output() {
        let (_dir, binary) =
            fake_toolkit("printf \"'clip';0.0;1.0;2.0\\n\" > \"$out\"");
        let extractor = extractor_with_binary(&binary, 10, 4);

        let err = extractor.extract(Path::new("/dev/null")).await.unwrap_err();
        assert!(matches!(
            err,
            PredictionError::FeatureExtraction {
                kind: FeatureExtractionKind::MalformedOutput,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_extract_nonzero_exit_is_toolkit_failure() {
        let (_dir, binary) = fake_toolkit("echo 'boom' >&2\nexit 3");
        let extractor = extractor_with_binary(&binary, 10, 4);

        let err = extractor.extract(Path::new("/dev/null")).await.unwrap_err();
        match err {
            PredictionError::FeatureExtraction {
                kind: FeatureExtractionKind::ToolkitFailure,
                message,
            } => assert!(message.contains("boom")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_extract_timeout_kills_subprocess() {
        let (_dir, binary) = fake_toolkit("sleep 30");
        let mut extractor = extractor_with_binary(&binary, 1, 4);
        // Sub-second deadline to keep the test fast
        extractor.timeout = Duration::from_millis(100);

        let err = extractor.extract(Path::new("/dev/null")).await.unwrap_err();
        assert!(matches!(
            err,
            PredictionError::FeatureExtraction {
                kind: FeatureExtractionKind::Timeout,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_toolkit_failure() {
        let extractor = extractor_with_binary(
            Path::new("/definitely/not/here/SMILExtract"),
            10,
            4,
        );
        let err = extractor.extract(Path::new("/dev/null")).await.unwrap_err();
        assert!(matches!(
            err,
            PredictionError::FeatureExtraction {
                kind: FeatureExtractionKind::ToolkitFailure,
                ..
            }
        ));
    }
}
