//! In-process [`ProcessGroup`] running every rank on its own thread.
//!
//! Ranks exchange messages over crossbeam channels, one inbox per rank.
//! Every collective carries a sequence number; a message from a later
//! collective that arrives early is parked until its turn, and one from an
//! earlier collective is an ordering error.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use recap_core::{CommError, ProcessContext, ProcessGroup, Rank};

struct Message {
    from: u32,
    seq: u64,
    payload: Vec<u8>,
}

/// One rank of an in-process group.
pub struct ThreadGroup {
    rank: u32,
    peers: Vec<Sender<Message>>,
    inbox: Receiver<Message>,
    seq: Cell<u64>,
    parked: RefCell<Vec<Message>>,
}

impl ThreadGroup {
    /// Create the `size` ranks of a group, in rank order.
    pub fn group(size: usize) -> Vec<ThreadGroup> {
        let (senders, inboxes): (Vec<_>, Vec<_>) =
            (0..size).map(|_| crossbeam_channel::unbounded()).unzip();
        inboxes
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| ThreadGroup {
                rank: rank as u32,
                peers: senders.clone(),
                inbox,
                seq: Cell::new(0),
                parked: RefCell::new(Vec::new()),
            })
            .collect()
    }

    /// Run `f` on `size` threads, each with the [`ProcessContext`] of one
    /// rank, and return the results in rank order.
    ///
    /// A panicking rank is reported as `None`.
    pub fn run<T, F>(size: usize, f: F) -> Vec<Option<T>>
    where
        T: Send,
        F: Fn(ProcessContext) -> T + Sync,
    {
        let f = &f;
        thread::scope(|s| {
            let handles: Vec<_> = Self::group(size)
                .into_iter()
                .map(|g| s.spawn(move || f(ProcessContext::new(Rc::new(g)))))
                .collect();
            handles.into_iter().map(|h| h.join().ok()).collect()
        })
    }

    fn next_seq(&self) -> u64 {
        let seq = self.seq.get() + 1;
        self.seq.set(seq);
        seq
    }

    fn send(&self, to: usize, seq: u64, payload: Vec<u8>) -> Result<(), CommError> {
        let peer = self.peers.get(to).ok_or(CommError::Disconnected {
            peer: Some(to as u32),
        })?;
        peer.send(Message {
            from: self.rank,
            seq,
            payload,
        })
        .map_err(|_| CommError::Disconnected {
            peer: Some(to as u32),
        })
    }

    /// Receive the message of collective `seq` from `from`.
    fn recv(&self, seq: u64, from: u32) -> Result<Vec<u8>, CommError> {
        {
            let mut parked = self.parked.borrow_mut();
            if let Some(i) = parked.iter().position(|m| m.seq == seq && m.from == from) {
                return Ok(parked.remove(i).payload);
            }
        }
        loop {
            let msg = self
                .inbox
                .recv()
                .map_err(|_| CommError::Disconnected { peer: Some(from) })?;
            if msg.seq < seq {
                return Err(CommError::OutOfOrder {
                    expected: seq,
                    got: msg.seq,
                });
            }
            if msg.seq == seq && msg.from == from {
                return Ok(msg.payload);
            }
            self.parked.borrow_mut().push(msg);
        }
    }
}

impl ProcessGroup for ThreadGroup {
    fn rank(&self) -> Rank {
        Rank(self.rank)
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn gather(&self, payload: Vec<u8>) -> Result<Option<Vec<Vec<u8>>>, CommError> {
        let seq = self.next_seq();
        if !self.rank().is_coordinator() {
            self.send(0, seq, payload)?;
            return Ok(None);
        }
        let mut all = Vec::with_capacity(self.size());
        all.push(payload);
        for from in 1..self.size() as u32 {
            all.push(self.recv(seq, from)?);
        }
        Ok(Some(all))
    }

    fn broadcast(&self, payload: Option<Vec<u8>>) -> Result<Vec<u8>, CommError> {
        let seq = self.next_seq();
        if !self.rank().is_coordinator() {
            return self.recv(seq, 0);
        }
        let payload = payload.ok_or(CommError::Codec {
            reason: "coordinator broadcast without a payload".to_string(),
        })?;
        for to in 1..self.size() {
            self.send(to, seq, payload.clone())?;
        }
        Ok(payload)
    }
}
