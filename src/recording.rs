//! CSV recording of decoded samples.
//!
//! One file per selected sensor per recording, named
//! `{prefix}_{SENSOR}_{yyyyMMdd_HHmmss}.csv`.  Every row is flushed as it is
//! written, so a crash or a pulled battery loses at most the row in flight.
//!
//! | Sensor | Columns |
//! |---|---|
//! | EEG | `Timestamp_ms,Ch1_Raw,Ch2_Raw,Channel1_uV,Channel2_uV,LeadOff` |
//! | PPG | `Timestamp_ms,Red,IR` |
//! | ACC | `Timestamp_ms,X,Y,Z` |
//!
//! `Timestamp_ms` is the device timestamp rounded to whole milliseconds and
//! `LeadOff` is `1` or `0`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::{debug, info, warn};

use crate::error::RecordingError;
use crate::types::{AccSample, EegSample, PpgSample, SensorType, Timestamped};

/// A sample type that has a CSV representation.
pub trait CsvRow: Timestamped {
    const SENSOR: SensorType;
    const HEADER: &'static [&'static str];

    /// Every column after `Timestamp_ms`.
    fn fields(&self) -> Vec<String>;

    fn record(&self) -> Vec<String> {
        let mut row = Vec::with_capacity(Self::HEADER.len());
        row.push(format!("{}", self.timestamp_ms().round() as i64));
        row.extend(self.fields());
        row
    }
}

impl CsvRow for EegSample {
    const SENSOR: SensorType = SensorType::Eeg;
    const HEADER: &'static [&'static str] = &[
        "Timestamp_ms",
        "Ch1_Raw",
        "Ch2_Raw",
        "Channel1_uV",
        "Channel2_uV",
        "LeadOff",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.ch1_raw.to_string(),
            self.ch2_raw.to_string(),
            self.channel1_uv.to_string(),
            self.channel2_uv.to_string(),
            u8::from(self.lead_off).to_string(),
        ]
    }
}

impl CsvRow for PpgSample {
    const SENSOR: SensorType = SensorType::Ppg;
    const HEADER: &'static [&'static str] = &["Timestamp_ms", "Red", "IR"];

    fn fields(&self) -> Vec<String> {
        vec![self.red.to_string(), self.ir.to_string()]
    }
}

impl CsvRow for AccSample {
    const SENSOR: SensorType = SensorType::Acc;
    const HEADER: &'static [&'static str] = &["Timestamp_ms", "X", "Y", "Z"];

    fn fields(&self) -> Vec<String> {
        vec![self.x.to_string(), self.y.to_string(), self.z.to_string()]
    }
}

fn header(sensor: SensorType) -> &'static [&'static str] {
    match sensor {
        SensorType::Eeg => EegSample::HEADER,
        SensorType::Ppg => PpgSample::HEADER,
        SensorType::Acc => AccSample::HEADER,
    }
}

/// File name for one sensor's stream of a recording started at `started_at`.
pub fn file_name(prefix: &str, sensor: SensorType, started_at: &DateTime<Local>) -> String {
    format!(
        "{prefix}_{}_{}.csv",
        sensor.label(),
        started_at.format("%Y%m%d_%H%M%S")
    )
}

#[derive(Debug)]
struct Stream {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: u64,
}

/// The set of open per-sensor streams.  Empty when not recording.
#[derive(Debug, Default)]
pub struct Recorder {
    streams: BTreeMap<SensorType, Stream>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        !self.streams.is_empty()
    }

    /// Sensors with an open stream.
    pub fn sensors(&self) -> impl Iterator<Item = SensorType> + '_ {
        self.streams.keys().copied()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.streams.values().map(|s| s.path.clone()).collect()
    }

    /// Open one stream per sensor in `selected` under `dir`, creating it if
    /// needed.  On any failure the streams opened so far are closed again.
    pub fn start(
        &mut self,
        dir: &Path,
        prefix: &str,
        selected: &BTreeSet<SensorType>,
        started_at: DateTime<Local>,
    ) -> Result<Vec<PathBuf>, RecordingError> {
        if self.is_recording() {
            return Err(RecordingError::AlreadyRecording);
        }
        if selected.is_empty() {
            return Err(RecordingError::NothingSelected);
        }
        fs::create_dir_all(dir).map_err(|source| RecordingError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;

        for &sensor in selected {
            let path = dir.join(file_name(prefix, sensor, &started_at));
            match open_stream(sensor, &path) {
                Ok(writer) => {
                    debug!("recording: {sensor} -> {}", path.display());
                    self.streams.insert(
                        sensor,
                        Stream {
                            path,
                            writer,
                            rows: 0,
                        },
                    );
                }
                Err(e) => {
                    self.stop();
                    return Err(e);
                }
            }
        }
        let paths = self.paths();
        info!("recording: started in {} ({} file(s))", dir.display(), paths.len());
        Ok(paths)
    }

    /// Append `samples` to the matching stream, if one is open.
    ///
    /// Returns the number of rows written.  A write failure is returned after
    /// the rows before it have been written; the stream stays open.
    pub fn write<T: CsvRow>(&mut self, samples: &[T]) -> Result<usize, RecordingError> {
        let Some(stream) = self.streams.get_mut(&T::SENSOR) else {
            return Ok(0);
        };
        for sample in samples {
            stream
                .writer
                .write_record(sample.record())
                .map_err(|source| RecordingError::Csv {
                    sensor: T::SENSOR,
                    source,
                })?;
            stream.writer.flush().map_err(|source| RecordingError::Io {
                sensor: T::SENSOR,
                source,
            })?;
            stream.rows += 1;
        }
        Ok(samples.len())
    }

    /// Flush and close every stream.  Returns how many were closed; closing
    /// again is a no-op returning 0.
    pub fn stop(&mut self) -> usize {
        let streams = std::mem::take(&mut self.streams);
        let n = streams.len();
        for (sensor, mut stream) in streams {
            if let Err(e) = stream.writer.flush() {
                warn!("recording: {sensor}: final flush failed: {e}");
            }
            info!(
                "recording: closed {} ({} rows)",
                stream.path.display(),
                stream.rows
            );
        }
        n
    }
}

fn open_stream(sensor: SensorType, path: &Path) -> Result<csv::Writer<File>, RecordingError> {
    let file = File::create(path).map_err(|source| RecordingError::Io { sensor, source })?;
    let mut writer = csv::Writer::from_writer(file);
    writer
        .write_record(header(sensor))
        .map_err(|source| RecordingError::Csv { sensor, source })?;
    writer
        .flush()
        .map_err(|source| RecordingError::Io { sensor, source })?;
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn when() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    fn selection(sensors: &[SensorType]) -> BTreeSet<SensorType> {
        sensors.iter().copied().collect()
    }

    #[test]
    fn names_follow_prefix_sensor_timestamp() {
        assert_eq!(
            file_name("LinkBand", SensorType::Ppg, &when()),
            "LinkBand_PPG_20240309_140507.csv"
        );
    }

    #[test]
    fn opens_one_file_per_selected_sensor_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = Recorder::new();
        let paths = rec
            .start(
                dir.path(),
                "LinkBand",
                &selection(&[SensorType::Eeg, SensorType::Acc]),
                when(),
            )
            .unwrap();
        assert_eq!(paths.len(), 2);
        assert!(rec.is_recording());

        let eeg = fs::read_to_string(dir.path().join("LinkBand_EEG_20240309_140507.csv")).unwrap();
        assert_eq!(eeg, "Timestamp_ms,Ch1_Raw,Ch2_Raw,Channel1_uV,Channel2_uV,LeadOff\n");
        assert!(!dir.path().join("LinkBand_PPG_20240309_140507.csv").exists());
    }

    #[test]
    fn rows_are_visible_on_disk_before_stop() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = Recorder::new();
        rec.start(dir.path(), "t", &selection(&[SensorType::Acc]), when())
            .unwrap();
        let samples = [
            AccSample { timestamp: 1.0, x: 1, y: -2, z: 3 },
            AccSample { timestamp: 1.0333, x: 4, y: 5, z: 6 },
        ];
        assert_eq!(rec.write(&samples).unwrap(), 2);
        // Not recording PPG: silently ignored.
        assert_eq!(rec.write(&[PpgSample { timestamp: 0.0, red: 1, ir: 2 }]).unwrap(), 0);

        let text = fs::read_to_string(&rec.paths()[0]).unwrap();
        assert_eq!(text, "Timestamp_ms,X,Y,Z\n1000,1,-2,3\n1033,4,5,6\n");
    }

    #[test]
    fn eeg_lead_off_is_written_as_digit() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = Recorder::new();
        rec.start(dir.path(), "t", &selection(&[SensorType::Eeg]), when())
            .unwrap();
        rec.write(&[EegSample {
            timestamp: 0.004,
            lead_off: true,
            channel1_uv: 1.5,
            channel2_uv: -0.25,
            ch1_raw: 3120,
            ch2_raw: -520,
        }])
        .unwrap();
        let text = fs::read_to_string(&rec.paths()[0]).unwrap();
        assert!(text.ends_with("4,3120,-520,1.5,-0.25,1\n"), "{text}");
    }

    #[test]
    fn start_is_refused_when_recording_or_nothing_selected() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = Recorder::new();
        assert!(matches!(
            rec.start(dir.path(), "t", &BTreeSet::new(), when()),
            Err(RecordingError::NothingSelected)
        ));
        rec.start(dir.path(), "t", &selection(&[SensorType::Ppg]), when())
            .unwrap();
        assert!(matches!(
            rec.start(dir.path(), "t", &selection(&[SensorType::Ppg]), when()),
            Err(RecordingError::AlreadyRecording)
        ));
    }

    #[test]
    fn stop_closes_each_stream_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = Recorder::new();
        rec.start(dir.path(), "t", &selection(&SensorType::ALL), when())
            .unwrap();
        assert_eq!(rec.stop(), 3);
        assert_eq!(rec.stop(), 0);
        assert!(!rec.is_recording());
    }

    #[test]
    fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let mut rec = Recorder::new();
        rec.start(&nested, "t", &selection(&[SensorType::Eeg]), when())
            .unwrap();
        assert!(nested.is_dir());
    }
}
