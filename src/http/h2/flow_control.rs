//! HTTP/2 flow control
//!
//! This module implements flow control as defined in RFC 7540 Section 5.2.
//! The same [`FlowControl`] pair is used for the connection (stream 0) and
//! for every stream.

use super::error::{Error, Result};
use super::DEFAULT_INITIAL_WINDOW_SIZE;

const MAX_WINDOW_SIZE: i64 = 0x7FFF_FFFF;

/// Flow control window
#[derive(Debug, Clone)]
pub struct FlowControlWindow {
    initial_size: u32,
    /// Can go negative after a SETTINGS change shrinks the window
    current_size: i64,
}

impl FlowControlWindow {
    /// Create a new flow control window with default size
    pub fn new() -> Self {
        Self::with_initial_size(DEFAULT_INITIAL_WINDOW_SIZE)
    }

    /// Create a new flow control window with specified initial size
    pub fn with_initial_size(initial_size: u32) -> Self {
        FlowControlWindow {
            initial_size,
            current_size: initial_size as i64,
        }
    }

    /// Get current window size
    pub fn size(&self) -> i64 {
        self.current_size
    }

    /// Get initial window size
    pub fn initial_size(&self) -> u32 {
        self.initial_size
    }

    /// Take up to `amount` bytes of capacity; returns what was granted
    pub fn consume(&mut self, amount: usize) -> usize {
        if amount == 0 || self.current_size <= 0 {
            return 0;
        }

        let granted = std::cmp::min(amount as i64, self.current_size) as usize;
        self.current_size -= granted as i64;
        granted
    }

    /// Increase window size (WINDOW_UPDATE)
    pub fn increase(&mut self, increment: u32) -> Result<i64> {
        if increment == 0 {
            return Err(Error::FlowControl(
                "Window update increment must be non-zero".to_string(),
            ));
        }

        let new_size = self.current_size + increment as i64;
        if new_size > MAX_WINDOW_SIZE {
            return Err(Error::FlowControl(format!(
                "Window size {} exceeds maximum (2^31-1)",
                new_size
            )));
        }

        self.current_size = new_size;
        Ok(self.current_size)
    }

    /// Decrease window size (receiving data)
    pub fn decrease(&mut self, amount: usize) {
        self.current_size -= amount as i64;
    }

    /// Apply a new SETTINGS_INITIAL_WINDOW_SIZE, shifting the current size
    pub fn update_initial_size(&mut self, new_initial_size: u32) -> Result<()> {
        let diff = new_initial_size as i64 - self.initial_size as i64;
        let new_current = self.current_size + diff;

        if new_current > MAX_WINDOW_SIZE {
            return Err(Error::FlowControl(format!(
                "New window size {} exceeds maximum (2^31-1)",
                new_current
            )));
        }

        self.initial_size = new_initial_size;
        self.current_size = new_current;
        Ok(())
    }
}

impl Default for FlowControlWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Send and receive windows for one flow-controlled scope
#[derive(Debug, Clone, Default)]
pub struct FlowControl {
    send_window: FlowControlWindow,
    recv_window: FlowControlWindow,
}

impl FlowControl {
    pub fn new() -> Self {
        FlowControl::default()
    }

    pub fn with_initial_sizes(send_size: u32, recv_size: u32) -> Self {
        FlowControl {
            send_window: FlowControlWindow::with_initial_size(send_size),
            recv_window: FlowControlWindow::with_initial_size(recv_size),
        }
    }

    pub fn send_window(&self) -> &FlowControlWindow {
        &self.send_window
    }

    pub fn send_window_mut(&mut self) -> &mut FlowControlWindow {
        &mut self.send_window
    }

    pub fn recv_window(&self) -> &FlowControlWindow {
        &self.recv_window
    }

    /// Take send capacity for outbound DATA
    pub fn consume_send_window(&mut self, amount: usize) -> usize {
        self.send_window.consume(amount)
    }

    /// Peer granted more send capacity
    pub fn increase_send_window(&mut self, increment: u32) -> Result<i64> {
        self.send_window.increase(increment)
    }

    /// Account for inbound DATA; the peer must not overrun the window
    pub fn consume_recv_window(&mut self, amount: usize) -> Result<()> {
        self.recv_window.decrease(amount);
        if self.recv_window.size() < 0 {
            return Err(Error::FlowControl(format!(
                "peer overran receive window by {} bytes",
                -self.recv_window.size()
            )));
        }
        Ok(())
    }

    /// Increment to announce once less than half the receive window is left
    pub fn should_send_window_update(&self) -> Option<u32> {
        let recv_size = self.recv_window.size();
        let initial_size = self.recv_window.initial_size() as i64;

        if recv_size < initial_size / 2 {
            Some((initial_size - recv_size) as u32)
        } else {
            None
        }
    }

    /// Record a WINDOW_UPDATE we sent
    pub fn release_recv_window(&mut self, increment: u32) -> Result<i64> {
        self.recv_window.increase(increment)
    }
}
