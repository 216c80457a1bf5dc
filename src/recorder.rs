/// Notification handling: decode each payload and append it to the CSV sink
use log::{error, info, warn};
use time::UtcOffset;

use crate::bluetooth::packet::decode_accel_packet;
use crate::models::Reading;
use crate::storage::CsvSink;
use crate::utils::now_at;

/// Packet counts for one streaming session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub accepted: u64,
    pub rejected: u64,
    pub write_failures: u64,
}

/// Handler invoked once per notification, strictly in arrival order
pub struct Recorder {
    sink: CsvSink,
    utc_offset: UtcOffset,
    stats: SessionStats,
}

impl Recorder {
    pub fn new(sink: CsvSink, utc_offset: UtcOffset) -> Self {
        Recorder {
            sink,
            utc_offset,
            stats: SessionStats::default(),
        }
    }

    /// Decode one payload and append the resulting reading
    ///
    /// Malformed payloads are reported and skipped. A failed write is logged
    /// and the record dropped; neither stops the stream.
    pub fn handle(&mut self, data: &[u8]) -> Option<Reading> {
        let packet = match decode_accel_packet(data) {
            Ok(packet) => packet,
            Err(diagnostic) => {
                warn!("{}", diagnostic);
                self.stats.rejected += 1;
                return None;
            }
        };

        let reading = Reading::from_packet(packet, now_at(self.utc_offset));
        info!("{}", reading.to_csv_line());

        if let Err(e) = self.sink.append(&reading) {
            error!(
                "Failed to append reading {} to {}: {}",
                reading.counter,
                self.sink.path().display(),
                e
            );
            self.stats.write_failures += 1;
            return None;
        }

        self.stats.accepted += 1;
        Some(reading)
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const HEADER_ONLY: &str = "timestamp,ctr,ax_g,ay_g,az_g\n";

    fn recorder(dir: &tempfile::TempDir) -> Recorder {
        let sink = CsvSink::open(dir.path().join("punch.csv")).unwrap();
        Recorder::new(sink, UtcOffset::UTC)
    }

    #[test]
    fn malformed_packets_never_reach_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(&dir);

        assert!(recorder.handle(&[]).is_none());
        assert!(recorder.handle(&[1, 2, 3, 4, 5, 6, 7]).is_none());
        assert!(recorder.handle(b"boot ok, 9 bytes").is_none());

        let contents = fs::read_to_string(dir.path().join("punch.csv")).unwrap();
        assert_eq!(contents, HEADER_ONLY);
        assert_eq!(
            recorder.stats(),
            SessionStats {
                accepted: 0,
                rejected: 3,
                write_failures: 0,
            }
        );
    }

    #[test]
    fn valid_packet_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(&dir);

        let reading = recorder
            .handle(&[0x01, 0x00, 0xF0, 0xFF, 0x00, 0x00, 0xE6, 0x03])
            .unwrap();
        assert_eq!(reading.counter, 1);

        let contents = fs::read_to_string(dir.path().join("punch.csv")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with(",1,-0.016,0.000,0.998"), "got {}", lines[1]);
        assert_eq!(recorder.stats().accepted, 1);
    }

    #[test]
    fn rejected_packet_does_not_disturb_stream() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(&dir);

        recorder.handle(&[0x01, 0x00, 0, 0, 0, 0, 0, 0]);
        recorder.handle(&[0xAA; 5]);
        recorder.handle(&[0x02, 0x00, 0, 0, 0, 0, 0, 0]);

        let contents = fs::read_to_string(dir.path().join("punch.csv")).unwrap();
        let counters: Vec<&str> = contents
            .lines()
            .skip(1)
            .map(|line| line.split(',').nth(1).unwrap())
            .collect();
        assert_eq!(counters, ["1", "2"]);
        assert_eq!(recorder.stats().rejected, 1);
    }

    #[test]
    fn write_failure_is_counted_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(&dir);
        // Replace the file with a directory so appends fail
        let path = dir.path().join("punch.csv");
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        assert!(recorder.handle(&[0u8; 8]).is_none());
        assert_eq!(recorder.stats().write_failures, 1);
        assert_eq!(recorder.stats().accepted, 0);
    }
}
