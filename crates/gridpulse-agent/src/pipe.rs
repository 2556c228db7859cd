//! The onboard sensor-board source: plain-text readings from a named
//! pipe.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use gridpulse_common::clock;
use gridpulse_common::measurement::{Measurement, VarId};
use tracing::warn;

/// Where the sensor daemon writes its readings.
pub const DEFAULT_FIFO: &str = "/var/run/spid/delta/out";

/// Longest accepted record, newline included.
const LINE_LIMIT: u64 = 128;

/// Back-off after a failed tick so a missing or silent producer does not
/// spin the free-running sampler.
const RETRY_DELAY_MS: u64 = 1000;

#[derive(thiserror::Error, Debug)]
pub enum PipeError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("end of input")]
    Eof,

    #[error("unparseable sensor record: {0:?}")]
    Malformed(String),
}

/// Reads one record per tick from the sensor FIFO. The FIFO is opened
/// lazily and reopened after any read failure.
pub struct PipeSampler {
    path: PathBuf,
    reader: Option<BufReader<File>>,
}

impl PipeSampler {
    pub fn new(path: Option<&str>) -> Self {
        Self {
            path: PathBuf::from(path.unwrap_or(DEFAULT_FIFO)),
            reader: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse one record.
    pub fn measure(&mut self) -> Result<Measurement, PipeError> {
        let reader = match self.reader.take() {
            Some(reader) => reader,
            None => match File::open(&self.path) {
                Ok(file) => BufReader::new(file),
                Err(e) => {
                    warn!("failed to open sensor fifo {}: {e}", self.path.display());
                    return Err(e.into());
                }
            },
        };
        let reader = self.reader.insert(reader);

        let mut line = String::new();
        match reader.by_ref().take(LINE_LIMIT).read_line(&mut line) {
            Ok(0) => {
                warn!("failed to read from sensor fifo: end of input");
                self.reader = None;
                Err(PipeError::Eof)
            }
            Err(e) => {
                warn!("failed to read from sensor fifo: {e}");
                self.reader = None;
                Err(e.into())
            }
            // a short read keeps the handle; only read failures reopen
            Ok(_) => parse_record(&line),
        }
    }

    /// One sampler tick; failure skips the tick after a delay.
    pub fn sample(&mut self) -> Option<Measurement> {
        match self.measure() {
            Ok(measurement) => Some(measurement),
            Err(_) => {
                clock::sleep_millis(RETRY_DELAY_MS);
                None
            }
        }
    }
}

/// Parse the 10-field record `timestamp phaseid0 counter0 powerL1
/// phaseid1 counter1 powerL2 phaseid2 counter2 powerL3`. At least the
/// first four fields must parse; the phase ids and counters are
/// validated but not used. Total power is synthesised from the phases.
fn parse_record(line: &str) -> Result<Measurement, PipeError> {
    let mut fields = [0f64; 10];
    let mut parsed = 0;

    for (slot, token) in fields.iter_mut().zip(line.split_whitespace()) {
        match token.parse::<f64>() {
            Ok(value) => {
                *slot = value;
                parsed += 1;
            }
            Err(_) => break,
        }
    }

    if parsed < 4 {
        let record = line.trim_end().to_string();
        warn!("failed to parse sensor record: {record:?}");
        return Err(PipeError::Malformed(record));
    }

    let mut measurement = Measurement::new();
    measurement[VarId::Timestamp] = fields[0];
    measurement[VarId::PowerL1] = fields[3];
    measurement[VarId::PowerL2] = fields[6];
    measurement[VarId::PowerL3] = fields[9];
    measurement[VarId::PowerAllPhases] = fields[3] + fields[6] + fields[9];

    Ok(measurement)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn sampler_over(content: &str) -> (PipeSampler, tempfile::TempPath) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let path = file.into_temp_path();

        let sampler = PipeSampler::new(Some(path.to_str().unwrap()));
        (sampler, path)
    }

    #[test]
    fn parses_full_records_line_by_line() {
        let (mut sampler, _path) = sampler_over(
            "1.0 0 0 10.0 1 0 20.0 2 0 30.0\n2.0 0 0 11.0 1 0 21.0 2 0 31.0\n",
        );

        let first = sampler.measure().unwrap();
        assert_eq!(first[VarId::Timestamp], 1.0);
        assert_eq!(first[VarId::PowerL1], 10.0);
        assert_eq!(first[VarId::PowerL2], 20.0);
        assert_eq!(first[VarId::PowerL3], 30.0);
        assert_eq!(first[VarId::PowerAllPhases], 60.0);

        let second = sampler.measure().unwrap();
        assert_eq!(second[VarId::Timestamp], 2.0);
        assert_eq!(second[VarId::PowerAllPhases], 63.0);
    }

    #[test]
    fn four_fields_suffice() {
        let (mut sampler, _path) = sampler_over("5.5 0 0 12.5\n");

        let m = sampler.measure().unwrap();
        assert_eq!(m[VarId::Timestamp], 5.5);
        assert_eq!(m[VarId::PowerL1], 12.5);
        assert_eq!(m[VarId::PowerL2], 0.0);
        assert_eq!(m[VarId::PowerAllPhases], 12.5);
    }

    #[test]
    fn malformed_records_fail_without_reopening() {
        let (mut sampler, _path) =
            sampler_over("bogus line\n1.0 0 0 10.0 1 0 20.0 2 0 30.0\n");

        assert!(matches!(
            sampler.measure(),
            Err(PipeError::Malformed(_))
        ));

        // the handle stayed open, so the next record is still there
        let m = sampler.measure().unwrap();
        assert_eq!(m[VarId::PowerAllPhases], 60.0);
    }

    #[test]
    fn eof_closes_the_handle_for_reopen() {
        let (mut sampler, _path) = sampler_over("1.0 0 0 10.0 1 0 20.0 2 0 30.0\n");

        sampler.measure().unwrap();
        assert!(matches!(sampler.measure(), Err(PipeError::Eof)));
        assert!(sampler.reader.is_none(), "handle closed after EOF");

        // reopening re-reads the file from the start
        let m = sampler.measure().unwrap();
        assert_eq!(m[VarId::Timestamp], 1.0);
    }

    #[test]
    fn missing_fifo_reports_io_error() {
        let mut sampler = PipeSampler::new(Some("/nonexistent/gridpulse/fifo"));
        assert!(matches!(sampler.measure(), Err(PipeError::Io(_))));
    }

    #[test]
    fn default_path_applies() {
        let sampler = PipeSampler::new(None);
        assert_eq!(sampler.path(), Path::new(DEFAULT_FIFO));
    }
}
