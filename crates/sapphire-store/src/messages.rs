//! Discussion message board.
//!
//! Messages are append-only, stored in rotating log files
//! (`messages/NNNNNNNN.log`, a fixed number of messages per file). A
//! dedicated writer thread performs the log appends so callers never
//! block on log I/O; it owns the active file exclusively.
//!
//! In memory the board keeps only a tail window of recent messages plus
//! the global start index and total count, so old history stays counted
//! without being held in memory. Startup reconstructs the tail from the
//! newest file(s); older files are full by the rotation invariant, which
//! gives the historical count without reading them.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread::JoinHandle;

use chrono::Utc;
use crossbeam_channel::{bounded, unbounded, Sender};
use tracing::{debug, error, warn};

use sapphire_shared::constants::MAX_MESSAGE_LEN;
use sapphire_shared::UserId;

use crate::codec;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::events::MessageEvent;
use crate::models::Message;
use crate::storage::{lock, DataStorage};

/// Answer to a message query. `first` is the global index of
/// `messages[0]`; it is greater than the requested start when the
/// requested messages have already left the retention window, so the
/// caller can number the sequence correctly and detect the gap.
#[derive(Debug, Clone)]
pub struct MessageWindow {
    pub first: u64,
    pub messages: Vec<Message>,
    pub total: u64,
}

pub struct MessageBoard {
    state: Mutex<BoardState>,
    tx: Sender<WriterCmd>,
    writer: Mutex<Option<JoinHandle<()>>>,
    capacity: usize,
    retention: usize,
}

struct BoardState {
    /// Most recent messages, globally indexed from `start_index`.
    tail: VecDeque<Message>,
    /// Global index of `tail.front()`.
    start_index: u64,
    /// Messages ever appended.
    total: u64,
    /// Index of the active log file.
    active_file: u32,
    /// Messages already in the active log file.
    active_count: usize,
}

enum WriterCmd {
    Append { file: u32, payload: Vec<u8> },
    Flush(Sender<std::io::Result<()>>),
    Shutdown,
}

impl MessageBoard {
    pub(crate) fn open(dir: PathBuf, config: &StoreConfig) -> Result<Self> {
        let capacity = config.messages_per_file;
        let retention = config.message_retention;

        let mut file_indices = scan_log_files(&dir)?;
        file_indices.sort_unstable();

        let (state, tail_sources) = match file_indices.last() {
            None => (
                BoardState {
                    tail: VecDeque::new(),
                    start_index: 0,
                    total: 0,
                    active_file: 0,
                    active_count: 0,
                },
                Vec::new(),
            ),
            Some(&newest) => {
                let newest_messages = read_log_file(&log_path(&dir, newest));
                let active_count = newest_messages.len();
                // Older files are full by the rotation invariant.
                let total = (file_indices.len() as u64 - 1) * capacity as u64 + active_count as u64;

                let mut sources = vec![newest_messages];
                if active_count < retention && file_indices.len() >= 2 {
                    let previous = file_indices[file_indices.len() - 2];
                    sources.insert(0, read_log_file(&log_path(&dir, previous)));
                }

                (
                    BoardState {
                        tail: VecDeque::new(),
                        start_index: 0,
                        total,
                        active_file: newest,
                        active_count,
                    },
                    sources,
                )
            }
        };

        let mut state = state;
        let mut tail: VecDeque<Message> = tail_sources.into_iter().flatten().collect();
        while tail.len() > retention {
            tail.pop_front();
        }
        // When the per-file capacity was lowered between runs the older
        // files hold more than `capacity` frames each and the full-file
        // estimate undercounts; trust the frames actually read.
        state.total = state.total.max(tail.len() as u64);
        state.start_index = state.total - tail.len() as u64;
        state.tail = tail;

        let (tx, rx) = unbounded();
        let writer_dir = dir.clone();
        let handle = std::thread::Builder::new()
            .name("sapphire-msg-writer".into())
            .spawn(move || writer_loop(writer_dir, rx))?;

        Ok(Self {
            state: Mutex::new(state),
            tx,
            writer: Mutex::new(Some(handle)),
            capacity,
            retention,
        })
    }

    pub(crate) fn total(&self) -> u64 {
        lock(&self.state).total
    }

    /// Append a message: update the in-memory tail and counters, then
    /// hand the log write to the writer thread. Returns the message's
    /// global index.
    pub(crate) fn append(&self, message: Message) -> Result<u64> {
        let payload = bincode::serialize(&message)?;

        let mut state = lock(&self.state);
        if state.active_count >= self.capacity {
            state.active_file += 1;
            state.active_count = 0;
        }
        state.active_count += 1;

        let index = state.total;
        state.total += 1;
        state.tail.push_back(message);
        while state.tail.len() > self.retention {
            state.tail.pop_front();
            state.start_index += 1;
        }

        let file = state.active_file;
        drop(state);

        self.tx
            .send(WriterCmd::Append { file, payload })
            .map_err(|_| {
                StoreError::StorageUnavailable(std::io::Error::other("message writer stopped"))
            })?;
        Ok(index)
    }

    /// A contiguous window of messages starting at global index `first`,
    /// clamped to what is still held in memory. The returned `first` is
    /// the effective start index after clamping.
    pub(crate) fn query(&self, first: u64, max_count: usize) -> Result<MessageWindow> {
        let state = lock(&self.state);
        if first > state.total {
            return Err(StoreError::OutOfBounds);
        }

        let start = first.max(state.start_index);
        let skip = (start - state.start_index) as usize;
        let messages = state
            .tail
            .iter()
            .skip(skip)
            .take(max_count)
            .cloned()
            .collect();
        Ok(MessageWindow {
            first: start,
            messages,
            total: state.total,
        })
    }

    /// Wait for every queued append to reach disk, surfacing the first
    /// write error the writer hit since the last flush.
    pub(crate) fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = bounded(1);
        if self.tx.send(WriterCmd::Flush(ack_tx)).is_err() {
            return Ok(()); // Writer already stopped; nothing queued.
        }
        match ack_rx.recv() {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Ok(()),
        }
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.tx.send(WriterCmd::Shutdown);
        if let Some(handle) = lock(&self.writer).take() {
            let _ = handle.join();
        }
    }
}

impl DataStorage {
    /// Append a discussion message authored by a registered user.
    ///
    /// Errors: `FieldTooLong`, `UserNotFound`, `StorageUnavailable`.
    pub fn append_message(&self, author: UserId, text: &str) -> Result<u64> {
        if text.chars().count() > MAX_MESSAGE_LEN {
            return Err(StoreError::FieldTooLong("message"));
        }

        let author_name = {
            let users = lock(&self.users);
            users
                .get(author)
                .ok_or(StoreError::UserNotFound)?
                .name
                .clone()
        };

        let index = self.board.append(Message {
            author,
            author_name,
            text: text.to_string(),
            timestamp: Utc::now(),
        })?;

        debug!(index, %author, "message appended");
        self.listeners
            .message
            .notify(&MessageEvent { index, author });
        Ok(index)
    }

    /// Messages from global index `first`, at most `max_count`. Messages
    /// older than the retention window are only reflected in the total;
    /// when `first` falls before the window the result starts at the
    /// window instead and reports that index in [`MessageWindow::first`].
    ///
    /// Errors: `OutOfBounds` when `first` lies past the total.
    pub fn query_messages(&self, first: u64, max_count: usize) -> Result<MessageWindow> {
        self.board.query(first, max_count)
    }
}

// ---------------------------------------------------------------------------
// Log files
// ---------------------------------------------------------------------------

fn log_path(dir: &Path, index: u32) -> PathBuf {
    dir.join(format!("{index:08}.log"))
}

fn scan_log_files(dir: &Path) -> Result<Vec<u32>> {
    let mut indices = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        match name.strip_suffix(".log").and_then(|n| n.parse::<u32>().ok()) {
            Some(index) => indices.push(index),
            None => {
                warn!(file = %name, "unexpected file in messages directory, skipping");
            }
        }
    }
    Ok(indices)
}

/// Read every decodable message from one log file, stopping at the first
/// torn or corrupt frame.
fn read_log_file(path: &Path) -> Vec<Message> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot open message log");
            return Vec::new();
        }
    };

    let mut reader = BufReader::new(file);
    let mut messages = Vec::new();
    loop {
        match codec::read_frame(&mut reader) {
            Ok(Some(payload)) => match bincode::deserialize(&payload) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "undecodable message frame, stopping");
                    break;
                }
            },
            Ok(None) => break,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "torn message log tail, stopping");
                break;
            }
        }
    }
    messages
}

/// The writer thread: exclusive owner of the active log file. Appends
/// are flushed per command; errors are held and reported at the next
/// `Flush`.
fn writer_loop(dir: PathBuf, rx: crossbeam_channel::Receiver<WriterCmd>) {
    let mut open: Option<(u32, BufWriter<File>)> = None;
    let mut last_error: Option<std::io::Error> = None;

    for cmd in rx {
        match cmd {
            WriterCmd::Append { file, payload } => {
                if let Err(e) = append_to_log(&dir, &mut open, file, &payload) {
                    error!(file, error = %e, "message log append failed");
                    if last_error.is_none() {
                        last_error = Some(e);
                    }
                }
            }
            WriterCmd::Flush(ack) => {
                let result = match last_error.take() {
                    Some(e) => Err(e),
                    None => Ok(()),
                };
                let _ = ack.send(result);
            }
            WriterCmd::Shutdown => break,
        }
    }
}

fn append_to_log(
    dir: &Path,
    open: &mut Option<(u32, BufWriter<File>)>,
    file_index: u32,
    payload: &[u8],
) -> std::io::Result<()> {
    if open.as_ref().map(|(i, _)| *i) != Some(file_index) {
        *open = None;
    }
    let (_, writer) = match open {
        Some(pair) => pair,
        None => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path(dir, file_index))?;
            open.insert((file_index, BufWriter::new(file)))
        }
    };

    codec::write_frame(writer, payload).map_err(std::io::Error::other)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn test_config(root: &Path) -> StoreConfig {
        let mut config = StoreConfig::new(root);
        config.messages_per_file = 4;
        config.message_retention = 6;
        config
    }

    fn msg(n: u32) -> Message {
        Message {
            author: UserId(Uuid::from_bytes([1; 16])),
            author_name: "tester".into(),
            text: format!("message {n}"),
            timestamp: Utc::now(),
        }
    }

    fn open_board(dir: &Path) -> MessageBoard {
        let config = test_config(dir);
        MessageBoard::open(dir.to_path_buf(), &config).unwrap()
    }

    #[test]
    fn append_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let board = open_board(dir.path());

        for n in 0..3 {
            assert_eq!(board.append(msg(n)).unwrap(), n as u64);
        }
        board.flush().unwrap();

        let window = board.query(0, 10).unwrap();
        assert_eq!(window.total, 3);
        assert_eq!(window.first, 0);
        assert_eq!(window.messages.len(), 3);
        assert_eq!(window.messages[2].text, "message 2");
        board.shutdown();
    }

    #[test]
    fn rotation_starts_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let board = open_board(dir.path());

        // Capacity is 4; the fifth message must open file 1.
        for n in 0..5 {
            board.append(msg(n)).unwrap();
        }
        board.flush().unwrap();
        board.shutdown();

        assert!(log_path(dir.path(), 0).exists());
        assert!(log_path(dir.path(), 1).exists());
        assert_eq!(read_log_file(&log_path(dir.path(), 0)).len(), 4);
        assert_eq!(read_log_file(&log_path(dir.path(), 1)).len(), 1);
    }

    #[test]
    fn reopen_restores_counts_and_tail_across_rotation() {
        let dir = tempfile::tempdir().unwrap();
        {
            let board = open_board(dir.path());
            for n in 0..10 {
                board.append(msg(n)).unwrap();
            }
            board.flush().unwrap();
            board.shutdown();
        }

        let board = open_board(dir.path());
        assert_eq!(board.total(), 10);

        // Retention is 6: indices 4..10 stay queryable, the query spans
        // the rotation boundary with no gap or duplicate.
        let window = board.query(4, 10).unwrap();
        assert_eq!(window.total, 10);
        assert_eq!(window.first, 4);
        let texts: Vec<&str> = window.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "message 4",
                "message 5",
                "message 6",
                "message 7",
                "message 8",
                "message 9"
            ]
        );
        board.shutdown();
    }

    #[test]
    fn query_past_total_is_out_of_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let board = open_board(dir.path());
        board.append(msg(0)).unwrap();

        assert!(matches!(board.query(5, 1), Err(StoreError::OutOfBounds)));
        board.shutdown();
    }

    #[test]
    fn zero_window_still_reports_total() {
        let dir = tempfile::tempdir().unwrap();
        let board = open_board(dir.path());
        for n in 0..3 {
            board.append(msg(n)).unwrap();
        }

        let window = board.query(0, 0).unwrap();
        assert!(window.messages.is_empty());
        assert_eq!(window.total, 3);
        board.shutdown();
    }

    #[test]
    fn query_reports_effective_start_after_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.message_retention = 3;
        let board = MessageBoard::open(dir.path().to_path_buf(), &config).unwrap();

        for n in 0..10 {
            board.append(msg(n)).unwrap();
        }

        // Indices 0..7 were evicted; asking for 0 must not pretend the
        // answer starts there.
        let window = board.query(0, 10).unwrap();
        assert_eq!(window.total, 10);
        assert_eq!(window.first, 7);
        assert_eq!(window.messages.len(), 3);
        assert_eq!(window.messages[0].text, "message 7");
        board.shutdown();
    }

    #[test]
    fn lowered_capacity_between_runs_keeps_counts_consistent() {
        let dir = tempfile::tempdir().unwrap();
        {
            let board = open_board(dir.path());
            for n in 0..6 {
                board.append(msg(n)).unwrap();
            }
            board.flush().unwrap();
            board.shutdown();
        }

        // Reopen with a smaller per-file capacity: the older file now
        // holds more frames than one "full" file is assumed to, so the
        // full-file estimate undercounts what the tail actually read.
        let mut config = test_config(dir.path());
        config.messages_per_file = 2;
        let board = MessageBoard::open(dir.path().to_path_buf(), &config).unwrap();

        assert_eq!(board.total(), 6);
        let window = board.query(0, 10).unwrap();
        assert_eq!(window.first, 0);
        assert_eq!(window.messages.len(), 6);
        assert_eq!(window.messages[5].text, "message 5");
        board.shutdown();
    }

    #[test]
    fn torn_tail_is_dropped_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let board = open_board(dir.path());
            for n in 0..3 {
                board.append(msg(n)).unwrap();
            }
            board.flush().unwrap();
            board.shutdown();
        }

        // Truncate the last few bytes of the log to simulate a torn write.
        let path = log_path(dir.path(), 0);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        let board = open_board(dir.path());
        assert_eq!(board.total(), 2);
        board.shutdown();
    }
}
