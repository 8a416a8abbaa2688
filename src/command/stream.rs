//! Line streaming from child pipes.

use std::io::{BufRead, BufReader, Read};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// One line of child output, without its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: Stream,
    pub text: String,
}

/// Merges several pipes into one channel, one reader thread per pipe.
///
/// Lines arrive in the order the readers produce them. The channel is a
/// rendezvous: a reader blocks on each line until the consumer takes it, so
/// at most one line per pipe is held beyond the pipe itself and a slow
/// consumer back-pressures the child. The channel closes once every pipe
/// has hit EOF.
pub struct LineStream {
    rx: Receiver<OutputLine>,
    handles: Vec<JoinHandle<()>>,
}

impl LineStream {
    pub fn new() -> (Self, SyncSender<OutputLine>) {
        let (tx, rx) = mpsc::sync_channel(0);
        (
            Self {
                rx,
                handles: Vec::new(),
            },
            tx,
        )
    }

    /// Start a reader thread for `pipe`.
    pub fn attach<R: Read + Send + 'static>(&mut self, pipe: R, stream: Stream, tx: SyncSender<OutputLine>) {
        self.handles.push(thread::spawn(move || read_lines(pipe, stream, tx)));
    }

    /// Next line, blocking. `None` once every reader has finished.
    pub fn next_line(&self) -> Option<OutputLine> {
        self.rx.recv().ok()
    }

    /// Wait for the reader threads.
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn read_lines<R: Read>(pipe: R, stream: Stream, tx: SyncSender<OutputLine>) {
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf)
                    .trim_end_matches(|c| c == '\n' || c == '\r')
                    .to_string();
                if tx.send(OutputLine { stream, text }).is_err() {
                    break;
                }
            }
        }
    }
}
