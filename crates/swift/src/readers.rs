//! Stream wrappers guarding against stalled peers
//!
//! Two wrappers with different jobs:
//!
//! - [`TimeoutReader`] bounds each read on a response body. If the inner read
//!   has made no progress by the deadline the read fails with
//!   `io::ErrorKind::TimedOut`.
//! - [`WatchdogReader`] wraps a request body and keeps a shared [`Watchdog`]
//!   deadline fresh while data flows. The pipeline races the in-flight
//!   request against [`Watchdog::expired`] and drops it when the deadline
//!   passes. Reads are clamped to 1 MiB: the transport can report progress at
//!   the syscall layer while no bytes move for seconds, and the clamp bounds
//!   that blind window.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant, Sleep};

/// Never read more than this many bytes between watchdog kicks
pub(crate) const WATCHDOG_CHUNK_SIZE: usize = 1 << 20;

/// An `AsyncRead` whose individual reads obey an idle timeout
pub(crate) struct TimeoutReader<R> {
    inner: R,
    timeout: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
    on_timeout: Option<Box<dyn Fn() + Send + Sync>>,
}

impl<R> TimeoutReader<R> {
    pub(crate) fn new(inner: R, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            sleep: None,
            on_timeout: None,
        }
    }

    /// Install a hook invoked once when a read times out
    ///
    /// The pipeline relies on drop semantics to tear the connection down;
    /// this is for callers that need to observe the abort.
    #[allow(dead_code)]
    pub(crate) fn with_cancel(mut self, cancel: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_timeout = Some(Box::new(cancel));
        self
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for TimeoutReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        // Arm the deadline at the start of each logical read
        if this.sleep.is_none() {
            this.sleep = Some(Box::pin(tokio::time::sleep(this.timeout)));
        }
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(res) => {
                this.sleep = None;
                Poll::Ready(res)
            }
            Poll::Pending => {
                let expired = this
                    .sleep
                    .as_mut()
                    .map(|s| s.as_mut().poll(cx).is_ready())
                    .unwrap_or(false);
                if expired {
                    this.sleep = None;
                    if let Some(cancel) = this.on_timeout.take() {
                        cancel();
                    }
                    tracing::debug!("read timed out waiting for response data");
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "no data received within the timeout",
                    )));
                }
                Poll::Pending
            }
        }
    }
}

/// Shared deadline a [`WatchdogReader`] keeps pushing forward
pub(crate) struct Watchdog {
    tx: watch::Sender<Instant>,
}

impl Watchdog {
    /// Create a watchdog armed `timeout` from now, and the receiver the
    /// monitor side waits on.
    pub(crate) fn new(timeout: Duration) -> (Self, watch::Receiver<Instant>) {
        let (tx, rx) = watch::channel(Instant::now() + timeout);
        (Self { tx }, rx)
    }

    /// Push the deadline `timeout` into the future
    pub(crate) fn kick(&self, timeout: Duration) {
        let _ = self.tx.send(Instant::now() + timeout);
    }

    /// Resolves when the deadline passes without being kicked again. If every
    /// sender is gone the last armed deadline still stands.
    pub(crate) async fn expired(mut rx: watch::Receiver<Instant>) {
        loop {
            let deadline = *rx.borrow_and_update();
            match tokio::time::timeout_at(deadline, rx.changed()).await {
                // Deadline passed; a kick may have landed while we slept
                Err(_) => {
                    if *rx.borrow() == deadline {
                        return;
                    }
                }
                // Kicked: pick up the new deadline
                Ok(Ok(())) => {}
                // Sender gone: the last armed deadline stands
                Ok(Err(_)) => {
                    sleep_until(deadline).await;
                    return;
                }
            }
        }
    }
}

/// An `AsyncRead` which kicks a watchdog whenever data is read
pub(crate) struct WatchdogReader<R> {
    inner: R,
    timeout: Duration,
    watchdog: Watchdog,
    in_read: bool,
    scratch: Vec<u8>,
}

impl<R> WatchdogReader<R> {
    pub(crate) fn new(inner: R, timeout: Duration, watchdog: Watchdog) -> Self {
        Self {
            inner,
            timeout,
            watchdog,
            in_read: false,
            scratch: Vec::new(),
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for WatchdogReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        // The deadline runs while the read is outstanding; kick once when it
        // starts and again when it completes, not on every poll.
        if !this.in_read {
            this.watchdog.kick(this.timeout);
            this.in_read = true;
        }

        let res = if buf.remaining() <= WATCHDOG_CHUNK_SIZE {
            Pin::new(&mut this.inner).poll_read(cx, buf)
        } else {
            if this.scratch.len() < WATCHDOG_CHUNK_SIZE {
                this.scratch.resize(WATCHDOG_CHUNK_SIZE, 0);
            }
            let mut clamped = ReadBuf::new(&mut this.scratch[..WATCHDOG_CHUNK_SIZE]);
            match Pin::new(&mut this.inner).poll_read(cx, &mut clamped) {
                Poll::Ready(Ok(())) => {
                    buf.put_slice(clamped.filled());
                    Poll::Ready(Ok(()))
                }
                other => other,
            }
        };

        if res.is_ready() {
            this.watchdog.kick(this.timeout);
            this.in_read = false;
        }
        res
    }
}
