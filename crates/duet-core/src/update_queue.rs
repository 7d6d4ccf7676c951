//! Bounded queue of pending model updates.
//!
//! The learner produces updates as input arrives; the engine applies at
//! most `updates_per_block` of them per block, oldest first. A full queue
//! drops the incoming update.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use smallvec::SmallVec;

/// One training step for the attribute models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelUpdate {
    /// A finalized chord (or single note).
    Onset {
        notes: SmallVec<[u8; 8]>,
        /// Mean velocity of the group.
        velocity: u8,
        /// Notes in the group.
        polyphony: usize,
        /// Samples since the previous group's onset, if trainable.
        ioi: Option<u64>,
    },
    /// A released note's duration in samples.
    Length { samples: u64 },
}

#[derive(Debug, Clone)]
pub struct UpdateSender {
    tx: Sender<ModelUpdate>,
}

impl UpdateSender {
    /// Returns false if the queue was full (or closed) and the update dropped.
    pub fn send(&self, update: ModelUpdate) -> bool {
        match self.tx.try_send(update) {
            Ok(()) => true,
            Err(TrySendError::Full(update)) => {
                tracing::warn!("Model update queue full, dropping {:?}", update);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

#[derive(Debug)]
pub struct UpdateReceiver {
    rx: Receiver<ModelUpdate>,
}

impl UpdateReceiver {
    /// Pop up to `max` updates, oldest first, handing each to `apply`.
    pub fn drain(&self, max: usize, mut apply: impl FnMut(ModelUpdate)) -> usize {
        let mut applied = 0;
        while applied < max {
            match self.rx.try_recv() {
                Ok(update) => {
                    apply(update);
                    applied += 1;
                }
                Err(_) => break,
            }
        }
        applied
    }

    /// Discard everything pending.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

pub fn update_queue(capacity: usize) -> (UpdateSender, UpdateReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    (UpdateSender { tx }, UpdateReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn length(samples: u64) -> ModelUpdate {
        ModelUpdate::Length { samples }
    }

    #[test]
    fn test_drains_oldest_first_with_limit() {
        let (tx, rx) = update_queue(8);
        for i in 1..=3 {
            assert!(tx.send(length(i)));
        }
        let mut seen = Vec::new();
        assert_eq!(rx.drain(1, |u| seen.push(u)), 1);
        assert_eq!(seen, vec![length(1)]);
        assert_eq!(rx.len(), 2);

        assert_eq!(rx.drain(10, |u| seen.push(u)), 2);
        assert_eq!(seen, vec![length(1), length(2), length(3)]);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_overflow_drops_incoming() {
        let (tx, rx) = update_queue(2);
        assert!(tx.send(length(1)));
        assert!(tx.send(length(2)));
        assert!(!tx.send(length(3)));

        let mut seen = Vec::new();
        rx.drain(usize::MAX, |u| seen.push(u));
        assert_eq!(seen, vec![length(1), length(2)]);
    }

    #[test]
    fn test_clear() {
        let (tx, rx) = update_queue(4);
        tx.send(length(1));
        tx.send(length(2));
        assert_eq!(rx.clear(), 2);
        assert!(rx.is_empty());
    }
}
