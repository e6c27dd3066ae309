use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("admission gate is closed")]
pub struct GateClosed;

/// Counting semaphore that bounds how many units of work are in flight.
///
/// `acquire` blocks while every slot is taken. Closing the gate wakes all
/// waiters with [`GateClosed`] and refuses new admissions; permits already
/// handed out stay valid until dropped.
#[derive(Debug)]
pub struct AdmissionGate {
    capacity: usize,
    state: Mutex<GateState>,
    freed: Condvar,
}

#[derive(Debug)]
struct GateState {
    available: usize,
    closed: bool,
}

/// One admitted slot; released on drop.
#[derive(Debug)]
pub struct Permit {
    gate: Arc<AdmissionGate>,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            state: Mutex::new(GateState {
                available: capacity,
                closed: false,
            }),
            freed: Condvar::new(),
        })
    }

    pub fn acquire(self: &Arc<Self>) -> Result<Permit, GateClosed> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(GateClosed);
            }
            if state.available > 0 {
                state.available -= 1;
                return Ok(Permit {
                    gate: Arc::clone(self),
                });
            }
            self.freed.wait(&mut state);
        }
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        let mut state = self.state.lock();
        if state.closed || state.available == 0 {
            return None;
        }
        state.available -= 1;
        Some(Permit {
            gate: Arc::clone(self),
        })
    }

    pub fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            self.freed.notify_all();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn in_flight(&self) -> usize {
        self.capacity - self.state.lock().available
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.available += 1;
        self.freed.notify_one();
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.gate.release();
    }
}
