//! Line-oriented JSON control protocol.
//!
//! Inbound frames are one JSON object per line carrying a `cmd` field.
//! Outbound frames are tagged with `type`. Reads and writes never block the
//! control loop: a reader thread feeds complete lines into a queue that is
//! polled, and outbound lines go through a bounded queue that drops frames
//! once it is full or nobody is draining it.

use std::fs::OpenOptions;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};
use std::thread;

use anyhow::{Context, Result};

use crate::model::{Command, Event};

/// Depth of the outbound queue before frames start being dropped.
pub const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Raw line transport underneath the control channel.
pub trait ControlLink {
    /// Next complete inbound line, if one is already waiting.
    fn try_read_line(&mut self) -> Option<String>;

    /// Queue one outbound line (without the terminator). Must not block.
    fn send_line(&mut self, line: &str);
}

/// A byte stream pair serviced by two background threads.
pub struct StreamLink {
    inbound: Receiver<String>,
    outbound: SyncSender<String>,
    inbound_closed: bool,
    dropped: u64,
}

impl StreamLink {
    pub fn spawn<R, W>(reader: R, writer: W) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let (in_tx, in_rx) = mpsc::channel::<String>();
        let (out_tx, out_rx) = mpsc::sync_channel::<String>(OUTBOUND_QUEUE_DEPTH);

        thread::Builder::new()
            .name("link-reader".to_string())
            .spawn(move || {
                let mut reader = BufReader::new(reader);
                let mut buf = Vec::new();
                loop {
                    buf.clear();
                    match reader.read_until(b'\n', &mut buf) {
                        Ok(0) => break,
                        Ok(_) => {
                            let line = String::from_utf8_lossy(&buf);
                            let line = line.trim_end_matches(['\r', '\n']);
                            if in_tx.send(line.to_string()).is_err() {
                                break;
                            }
                        }
                        Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                        Err(err) => {
                            log::warn!("control link read failed: {err}");
                            break;
                        }
                    }
                }
                log::debug!("control link reader finished");
            })
            .context("failed to spawn control link reader thread")?;

        thread::Builder::new()
            .name("link-writer".to_string())
            .spawn(move || {
                let mut writer = writer;
                for line in out_rx {
                    let res = writer
                        .write_all(line.as_bytes())
                        .and_then(|_| writer.write_all(b"\n"))
                        .and_then(|_| writer.flush());
                    if let Err(err) = res {
                        // Nobody listening; keep draining so the queue never backs up.
                        log::debug!("control link write failed: {err}");
                    }
                }
            })
            .context("failed to spawn control link writer thread")?;

        Ok(Self {
            inbound: in_rx,
            outbound: out_tx,
            inbound_closed: false,
            dropped: 0,
        })
    }

    pub fn stdio() -> Result<Self> {
        Self::spawn(io::stdin(), io::stdout())
    }

    /// Open a character device such as a USB gadget serial port (`/dev/ttyGS0`).
    pub fn open_device(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("failed to open control device {}", path.display()))?;
        let writer = file
            .try_clone()
            .with_context(|| format!("failed to clone handle for {}", path.display()))?;
        Self::spawn(file, writer)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }
}

impl ControlLink for StreamLink {
    fn try_read_line(&mut self) -> Option<String> {
        if self.inbound_closed {
            return None;
        }
        match self.inbound.try_recv() {
            Ok(line) => Some(line),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                log::info!("control link closed by peer");
                self.inbound_closed = true;
                None
            }
        }
    }

    fn send_line(&mut self, line: &str) {
        match self.outbound.try_send(line.to_string()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                log::debug!("outbound frame dropped ({} so far)", self.dropped);
            }
        }
    }
}

/// Link for local runs: nothing comes in, outbound frames go to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogLink;

impl ControlLink for LogLink {
    fn try_read_line(&mut self) -> Option<String> {
        None
    }

    fn send_line(&mut self, line: &str) {
        log::info!("{line}");
    }
}

/// Parse one inbound line. Blank, malformed, or unknown frames yield `None`.
pub fn decode_frame(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<Command>(line) {
        Ok(cmd) => Some(cmd),
        Err(err) => {
            log::debug!("ignoring frame {line:?}: {err}");
            None
        }
    }
}

pub fn encode_frame(event: &Event) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(line) => Some(line),
        Err(err) => {
            log::error!("failed to encode {event:?}: {err}");
            None
        }
    }
}

pub struct ControlChannel {
    link: Box<dyn ControlLink>,
}

impl ControlChannel {
    pub fn new(link: Box<dyn ControlLink>) -> Self {
        Self { link }
    }

    /// Consume at most one inbound frame.
    pub fn poll(&mut self) -> Option<Command> {
        let line = self.link.try_read_line()?;
        decode_frame(&line)
    }

    pub fn emit(&mut self, event: &Event) {
        if let Some(line) = encode_frame(event) {
            self.link.send_line(&line);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::*;
    use crate::model::{ConfigUpdate, StatusState};

    #[derive(Default)]
    struct Queues {
        inbound: VecDeque<String>,
        sent: Vec<String>,
    }

    #[derive(Default, Clone)]
    struct QueueLink(Rc<RefCell<Queues>>);

    impl ControlLink for QueueLink {
        fn try_read_line(&mut self) -> Option<String> {
            self.0.borrow_mut().inbound.pop_front()
        }

        fn send_line(&mut self, line: &str) {
            self.0.borrow_mut().sent.push(line.to_string());
        }
    }

    #[test]
    fn decodes_known_commands() {
        assert_eq!(decode_frame(r#"{"cmd":"stop"}"#), Some(Command::Stop));
        assert_eq!(decode_frame(r#" {"cmd":"get"} "#), Some(Command::Get));
        assert_eq!(
            decode_frame(r#"{"cmd":"text","data":"abc"}"#),
            Some(Command::Text {
                data: "abc".to_string()
            })
        );
        assert_eq!(
            decode_frame(r#"{"cmd":"config","baseDelay":90,"startDelay":0}"#),
            Some(Command::Config(ConfigUpdate {
                base_delay: Some(90),
                start_delay: Some(0),
                ..Default::default()
            }))
        );
    }

    #[test]
    fn drops_garbage_and_fieldless_frames() {
        assert_eq!(decode_frame(""), None);
        assert_eq!(decode_frame("{\"cmd\":\"sto"), None);
        assert_eq!(decode_frame(r#"{"data":"no command"}"#), None);
        assert_eq!(decode_frame(r#"{"cmd":"reboot"}"#), None);
        assert_eq!(decode_frame(r#"{"cmd":"text"}"#), None);
        assert_eq!(decode_frame("[1,2,3]"), None);
    }

    #[test]
    fn poll_consumes_one_frame_at_a_time() {
        let link = QueueLink::default();
        {
            let mut queues = link.0.borrow_mut();
            queues.inbound.push_back("junk".to_string());
            queues.inbound.push_back(r#"{"cmd":"get"}"#.to_string());
        }

        let mut channel = ControlChannel::new(Box::new(link.clone()));
        assert_eq!(channel.poll(), None);
        assert_eq!(channel.poll(), Some(Command::Get));
        assert_eq!(channel.poll(), None);
        channel.emit(&Event::progress(StatusState::Typing, "Typing...", 40));

        assert_eq!(
            link.0.borrow().sent,
            vec![r#"{"type":"status","state":"TYPING","msg":"Typing...","progress":40}"#]
        );
    }

    #[test]
    fn stream_link_never_blocks_without_a_reader() {
        struct Stuck;
        impl Write for Stuck {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                std::thread::park();
                Ok(0)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut link = StreamLink::spawn(io::empty(), Stuck).unwrap();
        for i in 0..(OUTBOUND_QUEUE_DEPTH * 2) {
            link.send_line(&format!("frame {i}"));
        }
        assert!(link.dropped_frames() > 0);
    }
}
