//! File sinks
//!
//! A session writes two files side by side:
//!
//! ```text
//! <dir>/<base>.clog    header (schema lines appended as signals register)
//! <dir>/<base>.cdata   data section (preamble, then one record per sample)
//! ```
//!
//! On close the header gets its `*end` line, the data file is appended to it
//! and removed, leaving one self-describing `<base>.clog`. The text variant
//! uses `<base>.text.clog` / `<base>.text.cdata`.

use crate::codec::{binary, header, text, Sample, Signal, SignalId, Value};
use crate::ingest::error::{SinkError, SinkResult};
use crate::ingest::sink::{now_micros, Sink};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Encoding of a file sink's data section
pub trait DataEncoding: Send {
    /// Sink name in logs and notices
    const NAME: &'static str;
    /// Inserted between the base name and `.clog`/`.cdata`
    const INFIX: &'static str;

    fn preamble(start_time: i64) -> Vec<u8>;
    fn record(buf: &mut Vec<u8>, sample: &Sample, epoch: i64);
}

/// Big-endian binary records
pub struct BinaryEncoding;

impl DataEncoding for BinaryEncoding {
    const NAME: &'static str = "binary";
    const INFIX: &'static str = "";

    fn preamble(start_time: i64) -> Vec<u8> {
        binary::write_preamble(start_time).to_vec()
    }

    fn record(buf: &mut Vec<u8>, sample: &Sample, epoch: i64) {
        binary::encode_sample(buf, sample, epoch);
    }
}

/// `Id:` / `time:` / `value` lines
pub struct TextEncoding;

impl DataEncoding for TextEncoding {
    const NAME: &'static str = "text";
    const INFIX: &'static str = ".text";

    fn preamble(start_time: i64) -> Vec<u8> {
        text::write_preamble(start_time).into_bytes()
    }

    fn record(buf: &mut Vec<u8>, sample: &Sample, epoch: i64) {
        buf.extend_from_slice(text::write_sample(sample, epoch).as_bytes());
    }
}

pub type BinaryFileSink = FileSink<BinaryEncoding>;
pub type TextFileSink = FileSink<TextEncoding>;

struct OpenSession {
    header: BufWriter<File>,
    data: BufWriter<File>,
    start_time: i64,
    scratch: Vec<u8>,
}

/// Sink writing a header file and a data file, merged on close
pub struct FileSink<E: DataEncoding> {
    dir: PathBuf,
    base_name: String,
    fixed_start: Option<i64>,
    session: Option<OpenSession>,
    _encoding: PhantomData<E>,
}

impl<E: DataEncoding> FileSink<E> {
    pub fn new(dir: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base_name: base_name.into(),
            fixed_start: None,
            session: None,
            _encoding: PhantomData,
        }
    }

    /// Use a fixed session start instead of the wall clock
    pub fn start_time(mut self, start_time: i64) -> Self {
        self.fixed_start = Some(start_time);
        self
    }

    /// Final log path (`<base>.clog` or `<base>.text.clog`)
    pub fn log_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", self.base_name, E::INFIX, crate::codec::reader::LOG_SUFFIX))
    }

    /// Data path, present only while a session is open
    pub fn data_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", self.base_name, E::INFIX, crate::codec::reader::DATA_SUFFIX))
    }

    fn session(&mut self) -> SinkResult<&mut OpenSession> {
        self.session
            .as_mut()
            .ok_or_else(|| SinkError::NotOpen(E::NAME.to_string()))
    }

    fn merge_files(log_path: &Path, data_path: &Path) -> SinkResult<u64> {
        let mut log = OpenOptions::new().append(true).open(log_path)?;
        let mut data = File::open(data_path)?;
        let copied = std::io::copy(&mut data, &mut log)?;
        log.sync_all()?;
        drop(data);
        std::fs::remove_file(data_path)?;
        Ok(copied)
    }
}

impl<E: DataEncoding> Sink for FileSink<E> {
    fn name(&self) -> &str {
        E::NAME
    }

    fn check_permissions(&self) -> SinkResult<()> {
        let meta = std::fs::metadata(&self.dir).map_err(|e| {
            SinkError::PermissionDenied(format!("{}: {}", self.dir.display(), e))
        })?;
        if !meta.is_dir() {
            return Err(SinkError::PermissionDenied(format!(
                "{} is not a directory",
                self.dir.display()
            )));
        }
        if meta.permissions().readonly() {
            return Err(SinkError::PermissionDenied(format!(
                "{} is read-only",
                self.dir.display()
            )));
        }
        Ok(())
    }

    fn open(&mut self) -> SinkResult<()> {
        if self.session.is_some() {
            tracing::warn!(sink = E::NAME, "Sink already open, reopening");
            self.close()?;
        }

        let start_time = self.fixed_start.unwrap_or_else(now_micros);
        let mut header = BufWriter::new(File::create(self.log_path())?);
        let mut data = BufWriter::new(File::create(self.data_path())?);

        header.write_all(header::preamble().as_bytes())?;
        header.flush()?;
        data.write_all(&E::preamble(start_time))?;

        tracing::info!(
            sink = E::NAME,
            path = %self.log_path().display(),
            start_time,
            "Log session opened"
        );

        self.session = Some(OpenSession {
            header,
            data,
            start_time,
            scratch: Vec::with_capacity(64),
        });
        Ok(())
    }

    fn register_signal(&mut self, signal: &Signal) -> SinkResult<()> {
        let session = self.session()?;
        session
            .header
            .write_all(header::signal_line(signal).as_bytes())?;
        session.header.flush()?;
        Ok(())
    }

    fn insert_log(&mut self, signal_id: SignalId, time: i64, value: &Value) -> SinkResult<()> {
        let session = self.session()?;
        let sample = Sample {
            time,
            signal_id,
            value: value.clone(),
        };

        session.scratch.clear();
        E::record(&mut session.scratch, &sample, session.start_time);
        session.data.write_all(&session.scratch)?;

        tracing::trace!(sink = E::NAME, signal_id, time, "Record written");
        Ok(())
    }

    fn close(&mut self) -> SinkResult<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        session.header.write_all(header::end_line().as_bytes())?;
        session.header.flush()?;
        session.data.flush()?;
        drop(session);

        let log_path = self.log_path();
        let data_bytes = Self::merge_files(&log_path, &self.data_path())?;

        tracing::info!(
            sink = E::NAME,
            path = %log_path.display(),
            data_bytes,
            "Log session closed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{read_log, LogFormat, ValueType};
    use tempfile::tempdir;

    fn drive<S: Sink>(sink: &mut S) {
        sink.open().unwrap();
        sink.register_signal(&Signal::new(0, "battery", ValueType::Int32))
            .unwrap();
        sink.register_signal(&Signal::new(1, "ssid", ValueType::Utf8))
            .unwrap();
        sink.insert_log(0, 5_010, &Value::Int32(80)).unwrap();
        sink.insert_log(1, 5_020, &Value::from("office")).unwrap();
        sink.insert_log(0, 5_030, &Value::Int32(79)).unwrap();
        sink.close().unwrap();
    }

    #[test]
    fn test_binary_sink_session() {
        let dir = tempdir().unwrap();
        let mut sink = BinaryFileSink::new(dir.path(), "session").start_time(5_000);
        sink.check_permissions().unwrap();
        drive(&mut sink);

        assert!(sink.log_path().exists());
        assert!(!sink.data_path().exists());

        let log = read_log(sink.log_path()).unwrap();
        assert_eq!(log.format, LogFormat::Binary);
        assert_eq!(log.start_time, 5_000);
        assert_eq!(log.signals.len(), 2);
        assert_eq!(
            log.samples,
            vec![
                Sample::new(0, 5_010, 80i32),
                Sample::new(1, 5_020, "office"),
                Sample::new(0, 5_030, 79i32),
            ]
        );
    }

    #[test]
    fn test_text_sink_session() {
        let dir = tempdir().unwrap();
        let mut sink = TextFileSink::new(dir.path(), "session").start_time(5_000);
        drive(&mut sink);

        let path = dir.path().join("session.text.clog");
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("*version\n1\n*logs\n0 1 battery\n1 5 ssid\n*end\nmagic: "));
        assert!(content.contains("Id: 1\ntime: 20\nvalue office\n"));

        let log = read_log(&path).unwrap();
        assert_eq!(log.format, LogFormat::Text);
        assert_eq!(log.samples.len(), 3);
    }

    #[test]
    fn test_unclosed_session_is_readable() {
        let dir = tempdir().unwrap();
        let mut sink = BinaryFileSink::new(dir.path(), "crash").start_time(0);
        sink.open().unwrap();
        sink.register_signal(&Signal::new(0, "battery", ValueType::Int32))
            .unwrap();
        sink.insert_log(0, 7, &Value::Int32(1)).unwrap();
        if let Some(session) = sink.session.as_mut() {
            session.data.flush().unwrap();
        }

        let log = read_log(sink.log_path()).unwrap();
        assert_eq!(log.samples, vec![Sample::new(0, 7, 1i32)]);
    }

    #[test]
    fn test_write_before_open_fails() {
        let dir = tempdir().unwrap();
        let mut sink = BinaryFileSink::new(dir.path(), "x");
        assert!(matches!(
            sink.insert_log(0, 1, &Value::Int32(1)),
            Err(SinkError::NotOpen(_))
        ));
        // Closing an unopened sink is a no-op
        sink.close().unwrap();
    }

    #[test]
    fn test_missing_directory_denied() {
        let dir = tempdir().unwrap();
        let sink = BinaryFileSink::new(dir.path().join("missing"), "x");
        assert!(matches!(
            sink.check_permissions(),
            Err(SinkError::PermissionDenied(_))
        ));
    }
}
