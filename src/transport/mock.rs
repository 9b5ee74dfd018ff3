//! Scriptable in-memory transport for tests
//!
//! Tests play the broker: they inject inbound packets, observe what the
//! client wrote, and flip failure switches. Kept in the public API so
//! downstream users can exercise their own integration code against it.

use crate::encoding::RemainingLength;
use crate::error::{MqttError, Result};
use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex, Notify};

struct IncomingState {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    buffer: VecDeque<u8>,
}

/// Mock transport controlled by the test
pub struct MockTransport {
    tx: StdMutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    incoming: Mutex<IncomingState>,
    written: StdMutex<Vec<u8>>,
    written_notify: Notify,
    fail_writes: AtomicBool,
    short_writes: AtomicBool,
    closed: AtomicBool,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx: StdMutex::new(Some(tx)),
            incoming: Mutex::new(IncomingState {
                rx,
                buffer: VecDeque::new(),
            }),
            written: StdMutex::new(Vec::new()),
            written_notify: Notify::new(),
            fail_writes: AtomicBool::new(false),
            short_writes: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Queues bytes for the client to receive
    pub fn inject(&self, bytes: &[u8]) {
        let tx = self.tx.lock().expect("mock sender mutex poisoned");
        if let Some(tx) = tx.as_ref() {
            let _ = tx.send(bytes.to_vec());
        }
    }

    /// Everything the client has written so far
    #[must_use]
    pub fn written(&self) -> Vec<u8> {
        self.written.lock().expect("mock written mutex poisoned").clone()
    }

    /// The written byte stream split into complete MQTT packets
    #[must_use]
    pub fn written_packets(&self) -> Vec<Vec<u8>> {
        let written = self.written();
        let mut packets = Vec::new();
        let mut rest = &written[..];

        while rest.len() >= 2 {
            let Ok(Some((remaining, used))) = RemainingLength::peek(&rest[1..]) else {
                break;
            };
            let total = 1 + used + remaining as usize;
            if rest.len() < total {
                break;
            }
            packets.push(rest[..total].to_vec());
            rest = &rest[total..];
        }

        packets
    }

    /// Waits until the client has written at least `count` complete packets
    pub async fn wait_for_packets(&self, count: usize) -> Vec<Vec<u8>> {
        loop {
            // Register for the notification before checking, so a write
            // landing in between cannot be missed.
            let notified = self.written_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let packets = self.written_packets();
            if packets.len() >= count {
                return packets;
            }
            notified.await;
        }
    }

    /// Discards the written byte stream
    pub fn clear_written(&self) {
        self.written
            .lock()
            .expect("mock written mutex poisoned")
            .clear();
    }

    /// Makes subsequent writes fail with a network error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent writes accept one byte less than offered
    pub fn set_short_writes(&self, short: bool) {
        self.short_writes.store(short, Ordering::SeqCst);
    }

    /// Simulates the peer closing the stream
    pub fn close_peer(&self) {
        // Dropping the sender wakes a blocked receive with end-of-stream.
        self.tx.lock().expect("mock sender mutex poisoned").take();
    }

    /// Whether `close` has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, buf: &[u8]) -> Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MqttError::NetworkError);
        }

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MqttError::NetworkError);
        }

        let accepted = if self.short_writes.load(Ordering::SeqCst) && !buf.is_empty() {
            buf.len() - 1
        } else {
            buf.len()
        };

        self.written
            .lock()
            .expect("mock written mutex poisoned")
            .extend_from_slice(&buf[..accepted]);
        self.written_notify.notify_waiters();
        Ok(accepted)
    }

    async fn receive(&self, buf: &mut [u8]) -> Result<usize> {
        let mut incoming = self.incoming.lock().await;

        while incoming.buffer.is_empty() {
            match incoming.rx.recv().await {
                Some(chunk) => incoming.buffer.extend(chunk),
                None => return Ok(0), // peer closed
            }
        }

        let n = incoming.buffer.len().min(buf.len());
        for byte in buf.iter_mut().take(n) {
            *byte = incoming.buffer.pop_front().expect("buffer underflow");
        }
        Ok(n)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
