//! Capture sources for the measurement loops.
//!
//! A capture source is a camera, accelerometer or positioning stream that the
//! core pulls samples from. Sessions hold the source through a [`CaptureGuard`]
//! so that it is closed on every exit path.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::VitalsError;

/// Result of one poll of a capture source
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent<T> {
    Sample(T),
    /// Nothing arrived within the timeout
    Idle,
    /// The source has gone away and will not produce more samples
    Closed,
}

/// A pull-based stream of timestamped samples.
pub trait CaptureSource {
    type Sample;

    /// Acquire the underlying device; fails with `CaptureUnavailable` when
    /// there is no sensor or no permission to use it.
    fn open(&mut self) -> Result<(), VitalsError>;

    /// Wait up to `timeout` for the next sample
    fn poll(&mut self, timeout: Duration) -> CaptureEvent<Self::Sample>;

    fn close(&mut self);

    /// Flash/torch control for optical sources
    fn set_torch(&mut self, _on: bool) {}
}

/// Scoped ownership of an opened capture source.
///
/// Dropping the guard turns the torch off (if it was turned on) and closes the
/// source, whether the session completed, was stopped, failed or panicked.
pub struct CaptureGuard<'a, S: CaptureSource + ?Sized> {
    source: &'a mut S,
    torch: bool,
}

impl<'a, S: CaptureSource + ?Sized> CaptureGuard<'a, S> {
    pub fn acquire(source: &'a mut S) -> Result<Self, VitalsError> {
        source.open()?;
        Ok(Self {
            source,
            torch: false,
        })
    }

    /// Open the source and switch its torch on for the lifetime of the guard
    pub fn acquire_with_torch(source: &'a mut S) -> Result<Self, VitalsError> {
        let mut guard = Self::acquire(source)?;
        guard.source.set_torch(true);
        guard.torch = true;
        Ok(guard)
    }

    pub fn poll(&mut self, timeout: Duration) -> CaptureEvent<S::Sample> {
        self.source.poll(timeout)
    }
}

impl<S: CaptureSource + ?Sized> Drop for CaptureGuard<'_, S> {
    fn drop(&mut self) {
        if self.torch {
            self.source.set_torch(false);
        }
        self.source.close();
        tracing::debug!("capture source released");
    }
}

/// Cooperative cancellation flag shared between a capture loop and its callers
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to finish before admitting another sample
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Capture source fed through a crossbeam channel.
///
/// Platform integrations push samples from their own callback thread into the
/// sender half; the measurement loop consumes them in arrival order.
pub struct ChannelSource<T> {
    receiver: Option<Receiver<T>>,
    unavailable: Option<String>,
    open: bool,
    torch: bool,
}

impl<T> ChannelSource<T> {
    pub fn new(receiver: Receiver<T>) -> Self {
        Self {
            receiver: Some(receiver),
            unavailable: None,
            open: false,
            torch: false,
        }
    }

    /// Create a bounded channel and the source reading from it
    pub fn channel(capacity: usize) -> (Sender<T>, Self) {
        let (sender, receiver) = bounded(capacity);
        (sender, Self::new(receiver))
    }

    /// A source whose `open` always fails, e.g. when permission was denied
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            receiver: None,
            unavailable: Some(reason.into()),
            open: false,
            torch: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn torch_on(&self) -> bool {
        self.torch
    }
}

impl<T> CaptureSource for ChannelSource<T> {
    type Sample = T;

    fn open(&mut self) -> Result<(), VitalsError> {
        if let Some(reason) = &self.unavailable {
            return Err(VitalsError::CaptureUnavailable(reason.clone()));
        }
        if self.receiver.is_none() {
            return Err(VitalsError::CaptureUnavailable("no receiver".to_string()));
        }
        self.open = true;
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> CaptureEvent<T> {
        let receiver = match (&self.receiver, self.open) {
            (Some(receiver), true) => receiver,
            _ => return CaptureEvent::Closed,
        };
        match receiver.recv_timeout(timeout) {
            Ok(sample) => CaptureEvent::Sample(sample),
            Err(RecvTimeoutError::Timeout) => CaptureEvent::Idle,
            Err(RecvTimeoutError::Disconnected) => CaptureEvent::Closed,
        }
    }

    fn close(&mut self) {
        self.open = false;
        self.torch = false;
    }

    fn set_torch(&mut self, on: bool) {
        self.torch = on && self.open;
    }
}
