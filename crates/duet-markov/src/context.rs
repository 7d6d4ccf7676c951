//! Fixed-capacity rolling window of recent tokens.

use crate::Token;

/// The most recent `capacity` tokens, oldest first.
///
/// Every slot starts as the sentinel, so a fresh context is "no history".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    slots: Vec<Token>,
}

impl Context {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Token::sentinel(); capacity],
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Shift left by one and append `token`: `[a, b, c] + d -> [b, c, d]`.
    pub fn push(&mut self, token: Token) {
        if self.slots.is_empty() {
            return;
        }
        self.slots.rotate_left(1);
        if let Some(last) = self.slots.last_mut() {
            *last = token;
        }
    }

    /// The last `order` tokens (clamped to the capacity).
    #[inline]
    pub fn suffix(&self, order: usize) -> &[Token] {
        let order = order.min(self.slots.len());
        &self.slots[self.slots.len() - order..]
    }

    #[inline]
    pub fn as_slice(&self) -> &[Token] {
        &self.slots
    }

    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = Token::sentinel();
        }
    }

    /// True while no real token has been pushed since the last reset.
    pub fn is_bootstrap(&self) -> bool {
        self.slots.iter().all(Token::is_sentinel)
    }
}
