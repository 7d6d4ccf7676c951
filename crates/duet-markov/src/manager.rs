//! Thread-safe wrapper around one [`SequenceModel`].
//!
//! A [`ModelManager`] owns the model together with two rolling contexts: the
//! input context (what the player just did) and the output context (what the
//! engine just generated). Training and generation run on different threads,
//! so every operation takes the manager's mutex for a short, O(order)
//! critical section.

use crate::{ChainEventMemory, Context, Result, SequenceModel, Token};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Which context keys a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GenerationContext {
    /// Lead: continue from the engine's own output.
    #[default]
    UseOwnOutput,
    /// Follow: respond to the live input.
    UseLiveInput,
}

impl GenerationContext {
    pub fn from_follow(follow: bool) -> Self {
        if follow {
            Self::UseLiveInput
        } else {
            Self::UseOwnOutput
        }
    }
}

/// Construction parameters for a [`ModelManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Maximum context order; also the capacity of both contexts.
    pub max_order: usize,
    /// Chain-event memory capacity.
    pub chain_memory: usize,
    /// Consecutive same-order generations before the contexts are reset (0 disables).
    pub max_same_order_repeats: usize,
    /// Fixed RNG seed, or `None` to seed from the OS.
    pub seed: Option<u64>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_order: 4,
            chain_memory: 20,
            max_same_order_repeats: 8,
            seed: None,
        }
    }
}

struct ManagerState {
    model: SequenceModel,
    input: Context,
    output: Context,
    memory: ChainEventMemory,
    last_order: Option<usize>,
    same_order_count: usize,
    max_same_order_repeats: usize,
    rng: StdRng,
}

impl ManagerState {
    fn reset_contexts(&mut self) {
        self.input.reset();
        self.output.reset();
        self.last_order = None;
        self.same_order_count = 0;
    }

    fn track_order(&mut self, order: Option<usize>) {
        if order == self.last_order {
            self.same_order_count += 1;
            if self.max_same_order_repeats > 0
                && self.same_order_count >= self.max_same_order_repeats
            {
                tracing::debug!(
                    "Same match order {:?} repeated {} times, resetting contexts",
                    order,
                    self.same_order_count
                );
                self.reset_contexts();
            }
        } else {
            self.last_order = order;
            self.same_order_count = 1;
        }
    }
}

pub struct ModelManager {
    state: Mutex<ManagerState>,
}

impl ModelManager {
    pub fn new(config: ManagerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            state: Mutex::new(ManagerState {
                model: SequenceModel::new(config.max_order),
                input: Context::new(config.max_order),
                output: Context::new(config.max_order),
                memory: ChainEventMemory::new(config.chain_memory),
                last_order: None,
                same_order_count: 0,
                max_same_order_repeats: config.max_same_order_repeats,
                rng,
            }),
        }
    }

    /// Train on `token` keyed by the input context, then shift it in.
    ///
    /// The sentinel carries no observation and is ignored.
    pub fn put_event(&self, token: Token) {
        if token.is_sentinel() {
            return;
        }
        let mut state = self.state.lock();
        let ManagerState { model, input, .. } = &mut *state;
        model.train(input.as_slice(), token.clone());
        input.push(token);
    }

    /// Generate the next token.
    ///
    /// The result is shifted into the output context whichever context keyed
    /// it. Returns the sentinel when the model has no match, or (after
    /// logging) when the model is corrupt.
    pub fn get_event(&self, require_choices: bool, source: GenerationContext) -> Token {
        let mut state = self.state.lock();
        let state = &mut *state;

        let context = match source {
            GenerationContext::UseOwnOutput => state.output.as_slice(),
            GenerationContext::UseLiveInput => state.input.as_slice(),
        };
        let generation = match state.model.generate(context, require_choices, &mut state.rng) {
            Ok(generation) => generation,
            Err(e) => {
                tracing::warn!("Generation failed, substituting sentinel: {}", e);
                return Token::sentinel();
            }
        };

        state.output.push(generation.token.clone());
        if generation.order.is_some() {
            state
                .memory
                .record(generation.context, generation.token.clone());
        }
        state.track_order(generation.order);
        generation.token
    }

    /// Un-reinforce every mapping in the chain-event memory.
    pub fn give_negative_feedback(&self) {
        let mut state = self.state.lock();
        let ManagerState { model, memory, .. } = &mut *state;
        for event in memory.iter() {
            model.remove_mapping(&event.context, &event.observation);
        }
    }

    /// Reinforce every mapping in the chain-event memory.
    pub fn give_positive_feedback(&self) {
        let mut state = self.state.lock();
        let ManagerState { model, memory, .. } = &mut *state;
        for event in memory.iter() {
            model.amplify_mapping(&event.context, &event.observation);
        }
    }

    /// Clear both contexts, the order counters, the chain memory and the model.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.reset_contexts();
        state.memory.clear();
        state.model.clear();
    }

    /// Clear both contexts and the order counters, keeping the model.
    pub fn reset_contexts(&self) {
        self.state.lock().reset_contexts();
    }

    pub fn set_max_same_order_repeats(&self, repeats: usize) {
        self.state.lock().max_same_order_repeats = repeats;
    }

    pub fn size(&self) -> usize {
        self.state.lock().model.size()
    }

    /// Order of the most recent match, `None` if it matched nothing.
    pub fn last_order(&self) -> Option<usize> {
        self.state.lock().last_order
    }

    pub fn input_context(&self) -> Vec<Token> {
        self.state.lock().input.as_slice().to_vec()
    }

    pub fn output_context(&self) -> Vec<Token> {
        self.state.lock().output.as_slice().to_vec()
    }

    pub fn chain_memory_len(&self) -> usize {
        self.state.lock().memory.len()
    }

    /// Copy of the current model.
    pub fn snapshot(&self) -> SequenceModel {
        self.state.lock().model.clone()
    }

    /// Swap in a fully-formed model. Contexts and chain memory are kept.
    pub fn install(&self, model: SequenceModel) {
        self.state.lock().model = model;
    }

    pub fn to_text(&self) -> String {
        self.state.lock().model.to_text()
    }

    pub fn to_binary(&self) -> Result<Vec<u8>> {
        self.state.lock().model.to_binary()
    }

    /// Parse outside the lock, then swap in. The model is unchanged on error.
    pub fn load_text(&self, text: &str) -> Result<()> {
        let model = SequenceModel::from_text(text)?;
        self.install(model);
        Ok(())
    }

    /// Parse outside the lock, then swap in. The model is unchanged on error.
    pub fn load_binary(&self, bytes: &[u8]) -> Result<()> {
        let model = SequenceModel::from_binary(bytes)?;
        self.install(model);
        Ok(())
    }
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl std::fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ModelManager")
            .field("max_order", &state.model.max_order())
            .field("size", &state.model.size())
            .field("last_order", &state.last_order)
            .finish()
    }
}
