//! Bounded history of the mappings used by recent generations.

use crate::Token;
use std::collections::VecDeque;

/// One generation step: the matched suffix and the token drawn from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
    pub context: Vec<Token>,
    pub observation: Token,
}

/// FIFO of the last `capacity` chain events, oldest first.
#[derive(Debug, Clone)]
pub struct ChainEventMemory {
    events: VecDeque<ChainEvent>,
    capacity: usize,
}

impl ChainEventMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(&mut self, context: Vec<Token>, observation: Token) {
        if self.capacity == 0 {
            return;
        }
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(ChainEvent {
            context,
            observation,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainEvent> {
        self.events.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
