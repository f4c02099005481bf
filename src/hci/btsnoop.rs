use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{spawn, JoinHandle};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{error, info};

const BTSNOOP_MAGIC: &[u8] = b"btsnoop\0";
const BTSNOOP_VERSION: u32 = 1;

// const BTSNOOP_FORMAT_HCI: u32 = 1001;
const BTSNOOP_FORMAT_MONITOR: u32 = 2001;

/// Environment variable consulted when no capture path is configured.
pub const BTSNOOP_LOG_ENV: &str = "BTSNOOP_LOG";

/// Writes a btsnoop capture of the HCI traffic on a background thread.
pub struct LogWriter {
    sender: Mutex<Option<Sender<(SystemTime, PacketType, Bytes)>>>,
    thread: Mutex<Option<JoinHandle<()>>>
}

impl LogWriter {
    /// Starts a capture at `path`, or at `$BTSNOOP_LOG` when `path` is `None`.
    /// Without either the writer is a no-op.
    pub fn new(path: Option<PathBuf>) -> Self {
        match path.or_else(|| std::env::var_os(BTSNOOP_LOG_ENV).map(PathBuf::from)) {
            Some(path) => {
                let (sender, receiver) = std::sync::mpsc::channel();
                let thread = spawn(move || {
                    Self::writer_thread(path, receiver).unwrap_or_else(|err| error!("Failed to write btsnoop log: {:?}", err));
                });

                Self {
                    sender: Mutex::new(Some(sender)),
                    thread: Mutex::new(Some(thread))
                }
            }
            None => Self::disabled()
        }
    }

    pub fn disabled() -> Self {
        Self { sender: Mutex::new(None), thread: Mutex::new(None) }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.lock().is_some()
    }

    fn writer_thread(path: PathBuf, receiver: Receiver<(SystemTime, PacketType, Bytes)>) -> std::io::Result<()> {
        let mut file = BufWriter::new(File::create(&path)?);
        info!("Writing btsnoop log to {:?}", path);
        file.write_all(BTSNOOP_MAGIC)?;
        file.write_all(&BTSNOOP_VERSION.to_be_bytes())?;
        file.write_all(&BTSNOOP_FORMAT_MONITOR.to_be_bytes())?;
        file.flush()?;

        while let Ok((timestamp, packet_type, data)) = receiver.recv() {
            const THIRTY_YEARS: Duration = Duration::from_secs(946684800);
            let timestamp = timestamp
                .duration_since(SystemTime::UNIX_EPOCH)
                .ok()
                .and_then(|d| d.checked_sub(THIRTY_YEARS))
                .unwrap_or_default()
                .as_micros() as i64;
            let size = data.len() as u32;
            file.write_all(&size.to_be_bytes())?;
            file.write_all(&size.to_be_bytes())?;
            file.write_all(&(packet_type as u32).to_be_bytes())?;
            file.write_all(&0u32.to_be_bytes())?; // dropped packets
            file.write_all(&(timestamp + 0x00E03AB44A676000).to_be_bytes())?;
            file.write_all(&data)?;
            file.flush()?;
        }

        Ok(())
    }

    pub fn write(&self, packet_type: PacketType, data: impl Into<Bytes>) {
        if let Some(sender) = &*self.sender.lock() {
            let _ = sender.send((SystemTime::now(), packet_type, data.into()));
        }
    }

    /// Flushes the pending records and stops the writer thread.
    pub fn close(&self) {
        self.sender.lock().take();
        if let Some(thread) = self.thread.lock().take() {
            let _ = thread.join();
        }
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        self.close();
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u32)]
pub enum PacketType {
    Command = 0x02,
    Event = 0x03,
    SystemNote = 0x0c
}
