//! FIFO wait queue of parked callers
//!
//! Each parked caller owns the receiving half of a oneshot channel and the
//! queue keeps the sender. Hand-off pops from the head and skips callers that
//! went away without deregistering. A caller that times out removes its own
//! entry by ticket, under the same lock the pool mutates the queue with.

use std::collections::VecDeque;

use tokio::sync::oneshot;

struct Waiter<T> {
    ticket: u64,
    tx: oneshot::Sender<T>,
}

pub struct WaitQueue<T> {
    waiters: VecDeque<Waiter<T>>,
    next_ticket: u64,
}

impl<T> Default for WaitQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WaitQueue<T> {
    pub fn new() -> Self {
        Self {
            waiters: VecDeque::new(),
            next_ticket: 0,
        }
    }

    /// Park a caller at the tail. The ticket identifies it for `remove`.
    pub fn enqueue(&mut self) -> (u64, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.waiters.push_back(Waiter { ticket, tx });
        (ticket, rx)
    }

    /// Remove a parked caller. Returns false if it was already signalled.
    pub fn remove(&mut self, ticket: u64) -> bool {
        match self.waiters.iter().position(|w| w.ticket == ticket) {
            Some(index) => {
                self.waiters.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Deliver `signal` to the oldest caller still listening.
    ///
    /// Gives the signal back when nobody took it.
    pub fn hand_off(&mut self, mut signal: T) -> Result<(), T> {
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.tx.send(signal) {
                Ok(()) => return Ok(()),
                Err(returned) => signal = returned,
            }
        }
        Err(signal)
    }

    /// Wake every parked caller with a signal built per caller, oldest first.
    pub fn wake_all(&mut self, mut signal: impl FnMut() -> T) -> usize {
        let mut woken = 0;
        for waiter in self.waiters.drain(..) {
            if waiter.tx.send(signal()).is_ok() {
                woken += 1;
            }
        }
        woken
    }
}
