//! Variable-order Markov sequence model.
//!
//! The table maps a context suffix (the last `order` tokens, `0..=max_order`)
//! to a weighted multiset of observed next tokens. Training records an
//! observation under every suffix at once; generation walks from the
//! longest suffix down and samples the first one that matches, so an unseen
//! long context falls back to shorter ones.

use crate::{Error, Result, Token};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Next-token weights for one context suffix. Weights are always > 0.
pub(crate) type Observations = BTreeMap<Token, u32>;

/// Result of one generation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub token: Token,
    /// Suffix length that matched, `None` when nothing matched at any order.
    pub order: Option<usize>,
    /// The matched suffix, i.e. the exact key feedback should target.
    pub context: Vec<Token>,
}

impl Generation {
    fn no_match() -> Self {
        Self {
            token: Token::sentinel(),
            order: None,
            context: Vec::new(),
        }
    }

    /// Matched order with `-1` for "no match".
    #[inline]
    pub fn order_or_negative(&self) -> i32 {
        self.order.map(|o| o as i32).unwrap_or(-1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceModel {
    pub(crate) max_order: usize,
    pub(crate) table: BTreeMap<Vec<Token>, Observations>,
}

impl SequenceModel {
    pub fn new(max_order: usize) -> Self {
        Self {
            max_order,
            table: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn max_order(&self) -> usize {
        self.max_order
    }

    /// Record `observation` under every suffix of `context` up to `max_order`.
    ///
    /// Suffixes that reach into bootstrap (sentinel) slots are skipped; the
    /// empty suffix is always recorded. The sentinel is never recorded.
    pub fn train(&mut self, context: &[Token], observation: Token) {
        if observation.is_sentinel() {
            return;
        }
        let usable = context.len().min(self.max_order);
        for order in 0..=usable {
            let suffix = &context[context.len() - order..];
            // a longer suffix contains this one, so it would hold the sentinel too
            if suffix.first().is_some_and(Token::is_sentinel) {
                break;
            }
            let weight = self
                .table
                .entry(suffix.to_vec())
                .or_default()
                .entry(observation.clone())
                .or_insert(0);
            *weight = weight.saturating_add(1);
        }
    }

    /// Sample the next token from the longest matching suffix of `context`.
    ///
    /// With `require_choices`, suffixes offering a single observation are
    /// passed over in favour of shorter ones with at least two; if none
    /// offers a choice, the longest single-choice match is used. Returns the
    /// sentinel with `order: None` when nothing matches at all.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        context: &[Token],
        require_choices: bool,
        rng: &mut R,
    ) -> Result<Generation> {
        let usable = context.len().min(self.max_order);
        let mut single_choice: Option<(&[Token], &Observations)> = None;

        for order in (0..=usable).rev() {
            let suffix = &context[context.len() - order..];
            let Some(observations) = self.table.get(suffix) else {
                continue;
            };
            if observations.is_empty() {
                continue;
            }
            if !require_choices || observations.len() >= 2 {
                return Self::draw(suffix, observations, rng);
            }
            if single_choice.is_none() {
                single_choice = Some((suffix, observations));
            }
        }

        match single_choice {
            Some((suffix, observations)) => Self::draw(suffix, observations, rng),
            None => Ok(Generation::no_match()),
        }
    }

    fn draw<R: Rng + ?Sized>(
        suffix: &[Token],
        observations: &Observations,
        rng: &mut R,
    ) -> Result<Generation> {
        let total: u64 = observations.values().map(|&w| u64::from(w)).sum();
        if total == 0 {
            return Err(Error::CorruptWeights(context_label(suffix)));
        }

        let mut target = rng.gen_range(0..total);
        for (token, &weight) in observations {
            let weight = u64::from(weight);
            if target < weight {
                return Ok(Generation {
                    token: token.clone(),
                    order: Some(suffix.len()),
                    context: suffix.to_vec(),
                });
            }
            target -= weight;
        }
        Err(Error::CorruptWeights(context_label(suffix)))
    }

    /// Decrement one mapping, removing it (and an emptied context) at zero.
    ///
    /// Returns false if the mapping does not exist.
    pub fn remove_mapping(&mut self, context: &[Token], observation: &Token) -> bool {
        let Some(observations) = self.table.get_mut(context) else {
            return false;
        };
        let Some(weight) = observations.get_mut(observation) else {
            return false;
        };
        if *weight > 1 {
            *weight -= 1;
        } else {
            observations.remove(observation);
            if observations.is_empty() {
                self.table.remove(context);
            }
        }
        true
    }

    /// Increment one existing mapping. Returns false if it does not exist.
    pub fn amplify_mapping(&mut self, context: &[Token], observation: &Token) -> bool {
        match self
            .table
            .get_mut(context)
            .and_then(|observations| observations.get_mut(observation))
        {
            Some(weight) => {
                *weight = weight.saturating_add(1);
                true
            }
            None => false,
        }
    }

    /// Weight of one mapping, 0 when absent.
    pub fn weight(&self, context: &[Token], observation: &Token) -> u32 {
        self.table
            .get(context)
            .and_then(|observations| observations.get(observation))
            .copied()
            .unwrap_or(0)
    }

    /// Number of distinct (context, observation) entries.
    pub fn size(&self) -> usize {
        self.table.values().map(|observations| observations.len()).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Every (context, observation, weight) entry in canonical order.
    pub fn entries(&self) -> impl Iterator<Item = (&[Token], &Token, u32)> {
        self.table.iter().flat_map(|(context, observations)| {
            observations
                .iter()
                .map(move |(token, &weight)| (context.as_slice(), token, weight))
        })
    }

    pub fn clear(&mut self) {
        self.table.clear();
    }
}

pub(crate) fn context_label(context: &[Token]) -> String {
    context
        .iter()
        .map(Token::as_str)
        .collect::<Vec<_>>()
        .join(",")
}
