/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Append-only tick log.
//!
//! The file is `log_<unix_epoch_seconds>.csv` (`log_<secs>_<n>.csv` when a
//! run in the same second already took that name) and looks like this:
//! ```text
//! Time, TopicMessageDictionaries
//! 1718000000.125, {"encoders": "{\"left\": 12, \"right\": 12}, 1718000000.1251, 0.02", ...}
//! ```
//! Each record is the tick's start time followed by a JSON object mapping
//! every Topic that published to the string
//! `<json message>, <timestamp>, <delta_time>`.  Keys keep the topological
//! production order.
//!
//! JSON is written in the classic separator style (`", "` between items,
//! `": "` after keys) with every non-ASCII character `\uXXXX`-escaped, see
//! [`to_log_json`].
//!
//! Every record goes out in a single `write_all` on an unbuffered handle and
//! is flushed before [`TickLog::append`] returns.

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use tracing::{debug, info, warn};

use crate::scheduler::error::{InitError, TickError};
use crate::topic::TickFrame;

/// Suffixed names tried after `log_<epoch>.csv` before giving up.
const MAX_NAME_ATTEMPTS: u32 = 1_000;

/// Header line written at log creation.
pub const LOG_HEADER: &str = "Time, TopicMessageDictionaries";

/// Format seconds the way the log expects: shortest round-trip form that
/// always carries a decimal point (`1.0`, `0.25`).
pub fn format_seconds(secs: f64) -> String {
    format!("{secs:?}")
}

// ── JSON layout ───────────────────────────────────────────────────────────────

/// `", "` / `": "` separators and ASCII-only output.
struct LogJsonFormatter;

impl Formatter for LogJsonFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (i, c) in fragment.char_indices() {
            if c.is_ascii() && c != '\x7f' {
                continue;
            }
            writer.write_all(fragment[start..i].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = i + c.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// Serialize `value` the way the tick log writes JSON.
pub fn to_log_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, LogJsonFormatter);
    value.serialize(&mut ser)?;
    // Output is pure ASCII
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

// ── TickLog (writer) ──────────────────────────────────────────────────────────

/// Exclusive writer of one tick log file.
#[derive(Debug)]
pub struct TickLog {
    path: PathBuf,
    file: File,
    records: u64,
}

impl TickLog {
    /// File name for a log created at `epoch_secs`.
    pub fn file_name(epoch_secs: u64) -> String {
        format!("log_{epoch_secs}.csv")
    }

    /// Create `dir/log_<epoch_secs>.csv` and write the header.
    ///
    /// An existing file is never opened: if the name is taken (another run
    /// started in the same second), `log_<epoch_secs>_<n>.csv` is used with
    /// the smallest free `n`.  [`discard`](Self::discard) therefore only ever
    /// removes a file this log created.
    pub fn create(dir: &Path, epoch_secs: u64) -> Result<Self, InitError> {
        let mut path = dir.join(Self::file_name(epoch_secs));
        let mut attempt = 0u32;
        let mut file = loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS => {
                    attempt += 1;
                    debug!(taken = %path.display(), "tick log name taken");
                    path = dir.join(format!("log_{epoch_secs}_{attempt}.csv"));
                }
                Err(source) => return Err(InitError::LogCreate { path, source }),
            }
        };

        if let Err(source) = writeln!(file, "{LOG_HEADER}") {
            drop(file);
            let _ = std::fs::remove_file(&path);
            return Err(InitError::LogCreate { path, source });
        }

        info!(path = %path.display(), "tick log created");
        Ok(Self {
            path,
            file,
            records: 0,
        })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended since creation.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Append one record for `frame`, stamped with `present_time`.
    ///
    /// An empty frame writes nothing.
    ///
    /// # Errors
    /// [`TickError::Encode`] if a message cannot be encoded,
    /// [`TickError::LogWrite`] if the write fails.
    pub fn append(&mut self, present_time: f64, frame: &TickFrame) -> Result<(), TickError> {
        if frame.is_empty() {
            return Ok(());
        }
        let line = Self::render(present_time, frame)?;

        let log_write = |source| TickError::LogWrite {
            path: self.path.clone(),
            source,
        };
        self.file.write_all(line.as_bytes()).map_err(log_write)?;
        self.file.flush().map_err(log_write)?;
        self.records += 1;

        debug!(tick = frame.tick(), topics = frame.len(), "tick record appended");
        Ok(())
    }

    /// Remove the log file.  Used when startup fails after the log was
    /// created, so no artefact of an aborted start remains.
    pub fn discard(self) {
        let Self { path, file, .. } = self;
        drop(file);
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "tick log discarded"),
            Err(e) => warn!(path = %path.display(), error = %e, "cannot remove tick log"),
        }
    }

    fn render(present_time: f64, frame: &TickFrame) -> Result<String, TickError> {
        let mut dict = serde_json::Map::with_capacity(frame.len());
        for (topic, publication) in frame.iter() {
            let message = to_log_json(publication.message.payload()).map_err(|source| TickError::Encode {
                    topic: topic.to_string(),
                    source,
                })?;
            let value = format!(
                "{message}, {}, {}",
                format_seconds(publication.timestamp),
                format_seconds(publication.delta_time)
            );
            dict.insert(topic.to_string(), serde_json::Value::String(value));
        }

        let json = to_log_json(&dict).map_err(|source| TickError::Encode {
            topic: String::from("<record>"),
            source,
        })?;
        Ok(format!("{}, {json}\n", format_seconds(present_time)))
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// One topic entry of a parsed record.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedPublication {
    pub message: serde_json::Value,
    pub timestamp: f64,
    pub delta_time: f64,
}

/// One parsed log line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub time: f64,
    /// `(topic name, publication)` in the order they were written.
    pub entries: Vec<(String, LoggedPublication)>,
}

impl LogRecord {
    pub fn get(&self, topic: &str) -> Option<&LoggedPublication> {
        self.entries
            .iter()
            .find(|(name, _)| name == topic)
            .map(|(_, p)| p)
    }
}

/// Parse a tick log written by [`TickLog`] for offline inspection.
///
/// # Errors
/// Returns an error if the file cannot be read, the header is missing, or a
/// record is malformed (the error names the 1-based line number).
pub fn read_records(path: &Path) -> Result<Vec<LogRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot open tick log: {}", path.display()))?;
    let mut lines = content.lines();

    match lines.next() {
        Some(LOG_HEADER) => {}
        other => bail!(
            "{}: expected header '{LOG_HEADER}', found {other:?}",
            path.display()
        ),
    }

    lines
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, line)| {
            parse_record(line).with_context(|| format!("{}:{}: malformed record", path.display(), i + 2))
        })
        .collect()
}

fn parse_record(line: &str) -> Result<LogRecord> {
    let (time, json) = line.split_once(", ").context("missing ', ' separator")?;
    let time: f64 = time.trim().parse().context("invalid record time")?;

    let dict: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(json).context("record is not a JSON object")?;

    let mut entries = Vec::with_capacity(dict.len());
    for (topic, value) in dict {
        let text = value
            .as_str()
            .with_context(|| format!("entry '{topic}' is not a string"))?;
        entries.push((topic.clone(), parse_entry(text).with_context(|| format!("entry '{topic}'"))?));
    }

    Ok(LogRecord { time, entries })
}

/// Split `<json>, <timestamp>, <delta>` from the right: the message JSON may
/// itself contain `", "`.
fn parse_entry(text: &str) -> Result<LoggedPublication> {
    let mut parts = text.rsplitn(3, ", ");
    let (Some(delta), Some(timestamp), Some(message)) = (parts.next(), parts.next(), parts.next())
    else {
        bail!("expected '<message>, <timestamp>, <delta_time>'");
    };

    Ok(LoggedPublication {
        message: serde_json::from_str(message).context("invalid message JSON")?,
        timestamp: timestamp.parse().context("invalid timestamp")?,
        delta_time: delta.parse().context("invalid delta time")?,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::{Message, Publication};
    use serde_json::json;
    use tempfile::tempdir;

    fn frame_of(entries: &[(&str, serde_json::Value, f64, f64)]) -> TickFrame {
        let mut frame = TickFrame::new(0);
        for (name, v, t, dt) in entries {
            frame.push(
                name.to_string(),
                Publication::new(Message::from(v.clone()), *t, *dt),
            );
        }
        frame
    }

    #[test]
    fn format_seconds_always_has_decimal_point() {
        assert_eq!(format_seconds(1.0), "1.0");
        assert_eq!(format_seconds(0.25), "0.25");
        assert_eq!(format_seconds(1718000000.5), "1718000000.5");
    }

    #[test]
    fn create_writes_header_only() {
        let dir = tempdir().unwrap();
        let log = TickLog::create(dir.path(), 1_700_000_000).unwrap();
        assert_eq!(log.path(), dir.path().join("log_1700000000.csv"));
        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content, "Time, TopicMessageDictionaries\n");
    }

    #[test]
    fn create_in_missing_directory_fails() {
        let err = TickLog::create(Path::new("/nonexistent/pyros/logs"), 1).unwrap_err();
        assert!(matches!(err, InitError::LogCreate { .. }));
    }

    #[test]
    fn append_writes_one_line_in_production_order() {
        let dir = tempdir().unwrap();
        let mut log = TickLog::create(dir.path(), 1).unwrap();
        let frame = frame_of(&[
            ("t2", json!({"v": 2}), 10.5, 0.0),
            ("t1", json!([1, 2]), 10.75, 0.25),
        ]);
        log.append(10.0, &frame).unwrap();
        assert_eq!(log.records(), 1);

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[1],
            r#"10.0, {"t2": "{\"v\": 2}, 10.5, 0.0", "t1": "[1, 2], 10.75, 0.25"}"#
        );
    }

    #[test]
    fn log_json_uses_spaced_separators_and_ascii_escapes() {
        assert_eq!(
            to_log_json(&json!({"a": [1, 2.5, null], "b": {"c": true}})).unwrap(),
            r#"{"a": [1, 2.5, null], "b": {"c": true}}"#
        );
        assert_eq!(to_log_json(&json!([])).unwrap(), "[]");
        assert_eq!(to_log_json(&json!({})).unwrap(), "{}");
        assert_eq!(
            to_log_json(&json!({"name": "caf\u{e9} \u{1f642}", "q": "a\"b\n"})).unwrap(),
            r#"{"name": "caf\u00e9 \ud83d\ude42", "q": "a\"b\n"}"#
        );
    }

    #[test]
    fn non_ascii_message_reads_back() {
        let dir = tempdir().unwrap();
        let mut log = TickLog::create(dir.path(), 1).unwrap();
        log.append(1.0, &frame_of(&[("label", json!("gr\u{fc}n"), 1.0, 0.0)]))
            .unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.is_ascii());
        let records = read_records(log.path()).unwrap();
        assert_eq!(records[0].get("label").unwrap().message, json!("gr\u{fc}n"));
    }

    #[test]
    fn empty_frame_appends_nothing() {
        let dir = tempdir().unwrap();
        let mut log = TickLog::create(dir.path(), 1).unwrap();
        log.append(10.0, &TickFrame::new(0)).unwrap();
        assert_eq!(log.records(), 0);
        assert_eq!(read_records(log.path()).unwrap(), vec![]);
    }

    #[test]
    fn records_read_back() {
        let dir = tempdir().unwrap();
        let mut log = TickLog::create(dir.path(), 1).unwrap();
        log.append(
            10.0,
            &frame_of(&[("pose", json!({"x": 1.0, "note": "a, b"}), 10.0, 0.02)]),
        )
        .unwrap();
        log.append(11.0, &frame_of(&[("pose", json!({"x": 2.0, "note": ""}), 11.0, 1.0)]))
            .unwrap();

        let records = read_records(log.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].time, 10.0);
        let pose = records[0].get("pose").unwrap();
        assert_eq!(pose.message, json!({"x": 1.0, "note": "a, b"}));
        assert_eq!(pose.timestamp, 10.0);
        assert_eq!(pose.delta_time, 0.02);
        assert_eq!(records[1].get("pose").unwrap().delta_time, 1.0);
    }

    #[test]
    fn create_never_reuses_an_existing_file() {
        let dir = tempdir().unwrap();
        let mut first = TickLog::create(dir.path(), 42).unwrap();
        first
            .append(1.0, &frame_of(&[("t", json!(1), 1.0, 0.0)]))
            .unwrap();

        let second = TickLog::create(dir.path(), 42).unwrap();
        let third = TickLog::create(dir.path(), 42).unwrap();
        assert_eq!(second.path(), dir.path().join("log_42_1.csv"));
        assert_eq!(third.path(), dir.path().join("log_42_2.csv"));

        second.discard();
        third.discard();
        assert_eq!(read_records(first.path()).unwrap().len(), 1);
    }

    #[test]
    fn discard_removes_file() {
        let dir = tempdir().unwrap();
        let log = TickLog::create(dir.path(), 1).unwrap();
        let path = log.path().to_path_buf();
        log.discard();
        assert!(!path.exists());
    }

    #[test]
    fn reader_rejects_missing_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "1.0, {}\n").unwrap();
        assert!(read_records(&path).is_err());
    }

    #[test]
    fn reader_reports_malformed_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, format!("{LOG_HEADER}\nnot a record\n")).unwrap();
        let err = read_records(&path).unwrap_err();
        assert!(format!("{err:#}").contains(":2:"), "{err:#}");
    }
}
