// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

//! The persistent history variant (spec §4.3/§6): one event per line,
//! `RELAY ON_FLAG UNIX_MILLIS`, opened with append semantics and
//! synchronous (fsynced) writes.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use hydro_types::Event;

use super::{HistoryStore, InMemoryHistory};

/// File-backed [`HistoryStore`]. Queries are served from an in-memory
/// mirror; [`commit`](HistoryStore::commit) additionally appends the
/// buffered events to disk and fsyncs before returning.
#[derive(Debug)]
pub struct FileHistory {
    inner: InMemoryHistory,
    path: PathBuf,
    file: File,
}

impl FileHistory {
    /// Opens (creating if absent) the history file at `path`, discarding
    /// events older than `earliest` except that, per relay, the single
    /// most recent event before `earliest` is retained so the initial
    /// relay state stays reconstructable. Retained pre-cutoff events are
    /// logged but never written back to the file.
    pub fn open(path: impl AsRef<Path>, earliest: DateTime<Utc>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let text = if path.exists() {
            fs::read_to_string(&path).with_context(|| format!("reading history file {}", path.display()))?
        } else {
            String::new()
        };

        let mut loaded = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(line) {
                Ok(event) => loaded.push(event),
                Err(message) => {
                    tracing::warn!(line = lineno + 1, %message, "skipping malformed history line");
                }
            }
        }

        let mut retained_before: HashMap<u8, Event> = HashMap::new();
        let mut kept = Vec::new();
        for event in loaded {
            if event.time < earliest {
                retained_before
                    .entry(event.relay)
                    .and_modify(|existing| {
                        if event.time > existing.time {
                            *existing = event;
                        }
                    })
                    .or_insert(event);
            } else {
                kept.push(event);
            }
        }
        if !retained_before.is_empty() {
            tracing::info!(
                relays = retained_before.len(),
                "retaining one pre-cutoff event per relay for initial state"
            );
        }
        let mut events: Vec<Event> = retained_before.into_values().collect();
        events.sort_by_key(|e| e.time);
        events.extend(kept);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening history file {}", path.display()))?;

        Ok(Self { inner: InMemoryHistory::with_events(events), path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for FileHistory {
    fn append(&mut self, event: Event) {
        self.inner.append(event);
    }

    fn commit(&mut self) -> Result<()> {
        let pending: Vec<Event> = self.inner.pending_events().to_vec();
        if !pending.is_empty() {
            let mut buf = String::new();
            for event in &pending {
                buf.push_str(&format!("{} {} {}\n", event.relay, u8::from(event.on), event.time.timestamp_millis()));
            }
            self.file.write_all(buf.as_bytes()).context("writing history event")?;
            self.file.sync_all().context("fsyncing history file")?;
        }
        self.inner.commit()
    }

    fn on_duration(&self, relay: u8, t0: DateTime<Utc>, t1: DateTime<Utc>) -> std::time::Duration {
        self.inner.on_duration(relay, t0, t1)
    }

    fn latest_change(&self, relay: u8) -> (bool, DateTime<Utc>) {
        self.inner.latest_change(relay)
    }

    fn reverse_iter(&self) -> Box<dyn Iterator<Item = Event> + '_> {
        self.inner.reverse_iter()
    }
}

fn parse_line(line: &str) -> std::result::Result<Event, String> {
    let mut parts = line.split_whitespace();
    let relay: u8 = parts.next().ok_or("missing relay field")?.parse().map_err(|_| "invalid relay field")?;
    let flag: u8 = parts.next().ok_or("missing on-flag field")?.parse().map_err(|_| "invalid on-flag field")?;
    let millis: i64 = parts.next().ok_or("missing timestamp field")?.parse().map_err(|_| "invalid timestamp field")?;
    if flag > 1 {
        return Err("on-flag must be 0 or 1".to_string());
    }
    let time = DateTime::<Utc>::from_timestamp_millis(millis).ok_or("timestamp out of range")?;
    Ok(Event::new(relay, time, flag == 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(h)
    }

    #[test]
    fn commit_persists_and_reopen_recovers_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.log");

        {
            let mut h = FileHistory::open(&path, DateTime::<Utc>::UNIX_EPOCH).unwrap();
            h.append(Event::new(3, t(1), true));
            h.commit().unwrap();
        }

        let reopened = FileHistory::open(&path, DateTime::<Utc>::UNIX_EPOCH).unwrap();
        assert_eq!(reopened.latest_change(3), (true, t(1)));
    }

    #[test]
    fn load_retains_one_pre_cutoff_event_per_relay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.log");
        {
            let mut h = FileHistory::open(&path, DateTime::<Utc>::UNIX_EPOCH).unwrap();
            h.append(Event::new(0, t(1), true));
            h.append(Event::new(0, t(2), false));
            h.append(Event::new(0, t(3), true));
            h.commit().unwrap();
        }

        // cutoff after the first two events: only the most recent before it survives.
        let reopened = FileHistory::open(&path, t(3) - chrono::Duration::minutes(1)).unwrap();
        assert_eq!(reopened.latest_change(0), (false, t(2)));
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.log");
        fs::write(&path, "garbage line\n0 1 1000\n").unwrap();
        let h = FileHistory::open(&path, DateTime::<Utc>::UNIX_EPOCH).unwrap();
        assert_eq!(h.latest_change(0), (true, DateTime::<Utc>::from_timestamp_millis(1000).unwrap()));
    }
}
