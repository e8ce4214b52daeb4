// ===============================
// src/recorder.rs
// ===============================
//
// JSONL traffic log. One serialized `Event` per line, appended.
// The dispatcher is synchronous and only ever calls `FrameLog::record`
// (a `try_send`); the file side lives on a tokio task.
//
// ENV: `RECORD_FILE=/path/to/frames.jsonl` enables it (see main.rs).
//
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::codec::{Inbound, Outbound};

const QUEUE_DEPTH: usize = 8192;
const FLUSH_PERIOD: Duration = Duration::from_secs(1);
const FLUSH_BATCH: u32 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event { Sent(Outbound), Received(Inbound), Note(String) }

/// Sync-side handle. Events are dropped when the queue is full.
#[derive(Debug, Clone)]
pub struct FrameLog { tx: mpsc::Sender<Event> }

impl FrameLog {
    pub fn new(tx: mpsc::Sender<Event>) -> Self { Self { tx } }

    pub fn record(&self, ev: Event) {
        if let Err(e) = self.tx.try_send(ev) {
            debug!(?e, "recorder: event dropped");
        }
    }
}

/// Start the writer task. The task ends, after a last flush, once every
/// `FrameLog` clone is gone; await the handle to be sure the file is complete.
pub fn spawn(path: String) -> (FrameLog, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    (FrameLog::new(tx), tokio::spawn(run(rx, path)))
}

struct JsonlSink {
    path: PathBuf,
    out: BufWriter<File>,
    unflushed: u32,
}

impl JsonlSink {
    async fn open(path: PathBuf) -> io::Result<Self> {
        let out = Self::append_to(&path).await?;
        Ok(Self { path, out, unflushed: 0 })
    }

    async fn append_to(path: &Path) -> io::Result<BufWriter<File>> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path).await?;
        Ok(BufWriter::new(file))
    }

    /// A failed write gets one retry on a freshly opened file.
    async fn append(&mut self, ev: &Event) -> io::Result<()> {
        let mut line = serde_json::to_vec(ev)?;
        line.push(b'\n');
        if let Err(e) = self.out.write_all(&line).await {
            warn!(?e, path = %self.path.display(), "recorder: write failed, reopening");
            self.out = Self::append_to(&self.path).await?;
            self.out.write_all(&line).await?;
        }
        self.unflushed += 1;
        if self.unflushed >= FLUSH_BATCH {
            self.flush().await;
        }
        Ok(())
    }

    async fn flush(&mut self) {
        if let Err(e) = self.out.flush().await {
            warn!(?e, "recorder: flush failed");
        }
        self.unflushed = 0;
    }
}

pub async fn run(mut rx: mpsc::Receiver<Event>, path: String) {
    let mut sink = match JsonlSink::open(PathBuf::from(&path)).await {
        Ok(s) => s,
        Err(e) => {
            error!(?e, %path, "recorder: cannot open, recording disabled");
            return;
        }
    };
    info!(%path, "recorder: started");

    let mut timer = interval(FLUSH_PERIOD);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            ev = rx.recv() => {
                let Some(ev) = ev else { break };
                if let Err(e) = sink.append(&ev).await {
                    error!(?e, "recorder: file lost, stopped");
                    return;
                }
            }
            _ = timer.tick() => sink.flush().await,
        }
    }
    sink.flush().await;
    info!("recorder: all handles dropped, stopped");
}
