//! Improviser variants.
//!
//! Both variants train from [`ModelUpdate`]s and hand the scheduler a model
//! set plus the context it should generate from. `LeadFollow` adds a
//! short-term set that forgets quickly, so follow mode answers what was
//! just played rather than the whole session.

use crate::config::{EngineConfig, ImproviserKind, PlayMode};
use crate::models::ModelSet;
use crate::update_queue::ModelUpdate;
use duet_markov::GenerationContext;
use std::sync::Arc;

/// Models needed before follow mode trusts the short-term set.
const SHORT_TERM_MIN_SIZE: usize = 2;

/// Salt separating the short-term seeds from the long-term ones.
const SHORT_TERM_SEED_SALT: u64 = 0x5107;

pub trait Improvise {
    /// Train from one update. `learning` gates the persistent models.
    fn train(&mut self, update: &ModelUpdate, learning: bool);

    /// Called for every note-on and note-off heard on the input channel.
    fn note_message(&mut self) {}

    /// Model set and context source to generate from in `mode`.
    fn models_for(&self, mode: PlayMode) -> (&ModelSet, GenerationContext);

    fn give_feedback(&self, positive: bool);

    fn reset(&mut self);

    /// The set that is saved and loaded.
    fn persistent(&self) -> &Arc<ModelSet>;
}

/// Single persistent model set.
#[derive(Debug)]
pub struct MarkovImproviser {
    models: Arc<ModelSet>,
}

impl MarkovImproviser {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            models: Arc::new(ModelSet::new(config)),
        }
    }
}

impl Improvise for MarkovImproviser {
    fn train(&mut self, update: &ModelUpdate, learning: bool) {
        if learning {
            self.models.apply(update);
        }
    }

    fn models_for(&self, mode: PlayMode) -> (&ModelSet, GenerationContext) {
        (&*self.models, mode.generation_context())
    }

    fn give_feedback(&self, positive: bool) {
        self.models.give_feedback(positive);
    }

    fn reset(&mut self) {
        self.models.reset();
    }

    fn persistent(&self) -> &Arc<ModelSet> {
        &self.models
    }
}

/// Long-term set for leading, short-term set for following.
#[derive(Debug)]
pub struct LeadFollowImproviser {
    long_term: Arc<ModelSet>,
    short_term: ModelSet,
    /// Note-on and note-off messages since the short-term set was cleared.
    messages_since_reset: usize,
    reset_after: usize,
}

impl LeadFollowImproviser {
    pub fn new(config: &EngineConfig) -> Self {
        let short_term_config = EngineConfig {
            seed: config.seed.map(|seed| seed.wrapping_add(SHORT_TERM_SEED_SALT)),
            ..config.clone()
        };
        Self {
            long_term: Arc::new(ModelSet::new(config)),
            short_term: ModelSet::new(&short_term_config),
            messages_since_reset: 0,
            reset_after: config.short_term_reset_notes,
        }
    }

    pub fn short_term(&self) -> &ModelSet {
        &self.short_term
    }

    pub fn messages_since_reset(&self) -> usize {
        self.messages_since_reset
    }
}

impl Improvise for LeadFollowImproviser {
    fn train(&mut self, update: &ModelUpdate, learning: bool) {
        self.short_term.apply(update);
        if learning {
            self.long_term.apply(update);
        }
    }

    fn note_message(&mut self) {
        self.messages_since_reset += 1;
        if self.reset_after > 0 && self.messages_since_reset > self.reset_after {
            tracing::debug!(
                "Clearing short-term models after {} note messages",
                self.messages_since_reset
            );
            self.short_term.reset();
            self.messages_since_reset = 0;
        }
    }

    fn models_for(&self, mode: PlayMode) -> (&ModelSet, GenerationContext) {
        match mode {
            PlayMode::Lead => (&*self.long_term, GenerationContext::UseOwnOutput),
            PlayMode::Follow if self.short_term.primary_size() >= SHORT_TERM_MIN_SIZE => {
                (&self.short_term, GenerationContext::UseLiveInput)
            }
            PlayMode::Follow => (&*self.long_term, GenerationContext::UseLiveInput),
        }
    }

    fn give_feedback(&self, positive: bool) {
        self.long_term.give_feedback(positive);
        self.short_term.give_feedback(positive);
    }

    fn reset(&mut self) {
        self.long_term.reset();
        self.short_term.reset();
        self.messages_since_reset = 0;
    }

    fn persistent(&self) -> &Arc<ModelSet> {
        &self.long_term
    }
}

/// Improviser selected by [`ImproviserKind`].
#[derive(Debug)]
pub enum Improviser {
    Markov(MarkovImproviser),
    LeadFollow(LeadFollowImproviser),
}

impl Improviser {
    pub fn new(config: &EngineConfig) -> Self {
        match config.improviser {
            ImproviserKind::Markov => Improviser::Markov(MarkovImproviser::new(config)),
            ImproviserKind::LeadFollow => Improviser::LeadFollow(LeadFollowImproviser::new(config)),
        }
    }

    pub fn kind(&self) -> ImproviserKind {
        match self {
            Improviser::Markov(_) => ImproviserKind::Markov,
            Improviser::LeadFollow(_) => ImproviserKind::LeadFollow,
        }
    }
}

impl Improvise for Improviser {
    fn train(&mut self, update: &ModelUpdate, learning: bool) {
        match self {
            Improviser::Markov(inner) => inner.train(update, learning),
            Improviser::LeadFollow(inner) => inner.train(update, learning),
        }
    }

    fn note_message(&mut self) {
        match self {
            Improviser::Markov(inner) => inner.note_message(),
            Improviser::LeadFollow(inner) => inner.note_message(),
        }
    }

    fn models_for(&self, mode: PlayMode) -> (&ModelSet, GenerationContext) {
        match self {
            Improviser::Markov(inner) => inner.models_for(mode),
            Improviser::LeadFollow(inner) => inner.models_for(mode),
        }
    }

    fn give_feedback(&self, positive: bool) {
        match self {
            Improviser::Markov(inner) => inner.give_feedback(positive),
            Improviser::LeadFollow(inner) => inner.give_feedback(positive),
        }
    }

    fn reset(&mut self) {
        match self {
            Improviser::Markov(inner) => inner.reset(),
            Improviser::LeadFollow(inner) => inner.reset(),
        }
    }

    fn persistent(&self) -> &Arc<ModelSet> {
        match self {
            Improviser::Markov(inner) => inner.persistent(),
            Improviser::LeadFollow(inner) => inner.persistent(),
        }
    }
}
