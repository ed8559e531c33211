//! `obd-logger replay`: print a recorded session

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use obd_protocol::ResponseDecoder;
use storage::{ReplayReader, StorageError};
use tracing::{info, warn};

/// Print every response in the log at `path` to `out`, one per line.
///
/// Returns the number of responses printed; a corrupt tail is an error after
/// the valid records before it were printed.
pub fn replay<W: Write>(path: &Path, out: &mut W) -> anyhow::Result<u64> {
    let reader = ReplayReader::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let decoder = ResponseDecoder::standard();

    let mut printed = 0;
    for item in reader.responses(&decoder) {
        match item {
            Ok(response) => {
                writeln!(out, "{}", response)?;
                printed += 1;
            }
            Err(StorageError::Decode(e)) => warn!("Skipping record: {}", e),
            Err(e) => {
                return Err(e).with_context(|| format!("Replay of {} stopped", path.display()))
            }
        }
    }

    info!("Replayed {} responses from {}", printed, path.display());
    Ok(printed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::{BinaryRecord, SessionRecorder};

    fn log_path(name: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.obd", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn test_prints_recorded_responses() {
        let path = log_path("obd-logger-replay");
        {
            let mut recorder = SessionRecorder::create(&path, 10).unwrap();
            recorder.record(&BinaryRecord::new(1024.0, b"410C0320".to_vec()).unwrap()).unwrap();
            recorder.record(&BinaryRecord::new(1025.0, b"410D32".to_vec()).unwrap()).unwrap();
            recorder.close().unwrap();
        }

        let mut out = Vec::new();
        let printed = replay(&path, &mut out).unwrap();
        std::fs::remove_file(&path).ok();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(printed, 2);
        assert!(lines[0].starts_with("Engine RPM: 200.00 rpm"));
        assert!(lines[1].starts_with("Vehicle speed: 50 km/h"));
    }

    #[test]
    fn test_corrupt_tail_stops_after_valid_records() {
        let path = log_path("obd-logger-replay-corrupt");
        {
            let mut file = std::fs::File::create(&path).unwrap();
            file.write_all(&BinaryRecord::new(1.0, b"410D32".to_vec()).unwrap().encode())
                .unwrap();
            file.write_all(b"tail").unwrap();
        }

        let mut out = Vec::new();
        let err = replay(&path, &mut out).unwrap_err();
        std::fs::remove_file(&path).ok();

        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
        assert_eq!(
            err.downcast_ref::<StorageError>(),
            Some(&StorageError::CorruptRecord { offset: 20, len: 4 })
        );
    }
}
