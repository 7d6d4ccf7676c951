//! Feedback integration tests
//!
//! Negative feedback must touch exactly the mappings used by recent
//! generations; positive feedback must only reinforce them.

use crate::helpers::*;
use duet::markov::ManagerConfig;
use duet::{GenerationContext, ModelManager, Token};
use std::collections::HashMap;

type Pair = (Vec<Token>, Token);

fn trained_manager() -> ModelManager {
    let manager = ModelManager::new(ManagerConfig {
        max_order: 3,
        chain_memory: 20,
        max_same_order_repeats: 0,
        seed: Some(17),
    });
    for value in [1, 2, 3, 1, 2, 4, 1, 3, 2, 1, 4, 3] {
        manager.put_event(Token::from_int(value));
    }
    manager
}

/// Generate `k` tokens, returning the (matched context, token) pairs used.
fn generate(manager: &ModelManager, k: usize) -> Vec<Pair> {
    (0..k)
        .filter_map(|_| {
            let context = manager.output_context();
            let token = manager.get_event(false, GenerationContext::UseOwnOutput);
            let order = manager.last_order()?;
            Some((context[context.len() - order..].to_vec(), token))
        })
        .collect()
}

fn weights(manager: &ModelManager) -> HashMap<Pair, u32> {
    manager
        .snapshot()
        .entries()
        .map(|(context, token, weight)| ((context.to_vec(), token.clone()), weight))
        .collect()
}

/// Test that negative feedback lowers exactly the used mappings.
#[test]
fn test_negative_feedback_is_local() {
    init_tracing();
    let manager = trained_manager();
    let before = weights(&manager);
    let used = generate(&manager, 6);
    assert_eq!(used.len(), 6);

    manager.give_negative_feedback();
    let after = weights(&manager);

    let mut uses: HashMap<&Pair, u32> = HashMap::new();
    for pair in &used {
        *uses.entry(pair).or_default() += 1;
    }
    for (pair, weight) in &before {
        let expected = weight.saturating_sub(uses.get(pair).copied().unwrap_or(0));
        assert_eq!(after.get(pair).copied().unwrap_or(0), expected, "{pair:?}");
    }
    assert!(after.keys().all(|pair| before.contains_key(pair)));
}

/// Test that positive feedback raises exactly the used mappings.
#[test]
fn test_positive_feedback_is_local() {
    let manager = trained_manager();
    let before = weights(&manager);
    let used = generate(&manager, 4);

    manager.give_positive_feedback();
    let after = weights(&manager);

    for (pair, weight) in &before {
        let uses = used.iter().filter(|p| *p == pair).count() as u32;
        assert_eq!(after[pair], weight + uses, "{pair:?}");
    }
    assert_eq!(after.len(), before.len());
}

/// Test that negative feedback through a playing engine only lowers weights.
#[test]
fn test_engine_feedback_touches_models() {
    let mut engine = trained_engine(3);
    engine.params().set_playing(true);
    idle(&mut engine, 100);

    let models = engine.persistent_models();
    let total_weights = || -> Vec<u64> {
        models
            .iter()
            .map(|(_, model)| model.snapshot().entries().map(|(_, _, w)| u64::from(w)).sum())
            .collect()
    };
    let before = total_weights();
    engine.give_feedback(false);
    let after = total_weights();

    assert!(before.iter().zip(&after).all(|(b, a)| a <= b));
    assert!(before.iter().zip(&after).any(|(b, a)| a < b));
}
