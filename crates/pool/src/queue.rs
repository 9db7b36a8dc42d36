//! First-come-first-served queue of callers waiting for a slot.
//!
//! A freed slot is staged for the longest-waiting caller by sending it
//! through that caller's oneshot channel while the pool lock is held. A
//! caller that gives up removes its own entry under the same lock, so a
//! grant is either delivered to exactly one live waiter or handed back.

use std::collections::VecDeque;

use tokio::sync::oneshot;

use crate::registry::Grant;

struct Waiter<T> {
    ticket: u64,
    tx: oneshot::Sender<Grant<T>>,
}

pub(crate) struct WaitQueue<T> {
    waiters: VecDeque<Waiter<T>>,
    next_ticket: u64,
}

impl<T> WaitQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            waiters: VecDeque::new(),
            next_ticket: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Join the back of the queue.
    pub(crate) fn push(&mut self) -> (u64, oneshot::Receiver<Grant<T>>) {
        let (tx, rx) = oneshot::channel();
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.waiters.push_back(Waiter { ticket, tx });
        (ticket, rx)
    }

    /// Leave the queue. Returns `false` if the ticket was already served.
    pub(crate) fn remove(&mut self, ticket: u64) -> bool {
        match self.waiters.iter().position(|w| w.ticket == ticket) {
            Some(index) => {
                self.waiters.remove(index);
                true
            }
            None => false,
        }
    }

    /// Stage a grant for the front-most waiter that is still listening.
    ///
    /// Hands the grant back when nobody is.
    pub(crate) fn hand_off(&mut self, mut grant: Grant<T>) -> Result<u64, Grant<T>> {
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.tx.send(grant) {
                Ok(()) => return Ok(waiter.ticket),
                Err(returned) => grant = returned,
            }
        }
        Err(grant)
    }

    /// Drop every waiter; their receivers observe a closed channel.
    pub(crate) fn close(&mut self) -> usize {
        let n = self.waiters.len();
        self.waiters.clear();
        n
    }
}
