//! Lock-free hand-off of generated events to an output thread.

use crate::event::MidiEvent;
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};

const DEFAULT_CAPACITY: usize = 1024;

/// A generated event stamped with the absolute sample of its block start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedEvent {
    pub block_start: u64,
    pub event: MidiEvent,
}

impl TimedEvent {
    /// Absolute sample position of the event.
    #[inline]
    pub fn sample(&self) -> u64 {
        self.block_start + self.event.frame_offset as u64
    }
}

/// Audio-thread side. Never blocks or allocates.
pub struct OutputProducer {
    producer: HeapProd<TimedEvent>,
    dropped: u64,
}

impl OutputProducer {
    /// Returns false (and counts a drop) if the buffer is full.
    #[inline]
    pub fn push(&mut self, event: TimedEvent) -> bool {
        if self.producer.try_push(event).is_ok() {
            true
        } else {
            self.dropped += 1;
            false
        }
    }

    /// Push a block's events, returning how many fit.
    pub fn push_block(&mut self, block_start: u64, events: &[MidiEvent]) -> usize {
        events
            .iter()
            .take_while(|&&event| self.push(TimedEvent { block_start, event }))
            .count()
    }

    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Output-thread side.
pub struct OutputConsumer {
    consumer: HeapCons<TimedEvent>,
}

impl OutputConsumer {
    #[inline]
    pub fn pop(&mut self) -> Option<TimedEvent> {
        self.consumer.try_pop()
    }

    pub fn drain_all(&mut self) -> Vec<TimedEvent> {
        let mut events = Vec::with_capacity(self.consumer.occupied_len());
        while let Some(event) = self.consumer.try_pop() {
            events.push(event);
        }
        events
    }

    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.consumer.is_empty()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.consumer.occupied_len()
    }
}

pub fn output_channel() -> (OutputProducer, OutputConsumer) {
    output_channel_with_capacity(DEFAULT_CAPACITY)
}

pub fn output_channel_with_capacity(capacity: usize) -> (OutputProducer, OutputConsumer) {
    let rb = HeapRb::new(capacity.max(1));
    let (producer, consumer) = rb.split();
    (
        OutputProducer {
            producer,
            dropped: 0,
        },
        OutputConsumer { consumer },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_push_and_drain() {
        let (mut producer, mut consumer) = output_channel();
        let events = [MidiEvent::note_on(0, 0, 60, 100), MidiEvent::note_off(128, 0, 60)];
        assert_eq!(producer.push_block(1_024, &events), 2);

        assert!(consumer.has_pending());
        assert_eq!(consumer.pending_count(), 2);
        let drained = consumer.drain_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].sample(), 1_024);
        assert_eq!(drained[1].sample(), 1_152);
        assert!(!consumer.has_pending());
    }

    #[test]
    fn test_full_buffer_counts_drops() {
        let (mut producer, mut consumer) = output_channel_with_capacity(2);
        let events = [MidiEvent::note_on(0, 0, 60, 100); 3];
        assert_eq!(producer.push_block(0, &events), 2);
        assert_eq!(producer.dropped(), 1);
        assert!(consumer.pop().is_some());
    }
}
