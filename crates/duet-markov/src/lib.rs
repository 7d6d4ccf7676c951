//! Variable-order Markov sequence model for real-time improvisation.
//!
//! # Primary API
//!
//! - [`ModelManager`]: thread-safe model with input/output contexts and feedback
//! - [`SequenceModel`]: the context → weighted observation table
//! - [`Token`]: symbolic observation (pitch set or scalar)
//!
//! # Example
//!
//! ```
//! use duet_markov::{GenerationContext, ModelManager, Token};
//!
//! let manager = ModelManager::default();
//! for notes in [[60u8, 64], [62, 65], [60, 64]] {
//!     manager.put_event(Token::from_notes(&notes));
//! }
//!
//! let next = manager.get_event(false, GenerationContext::UseLiveInput);
//! assert!(!next.is_sentinel());
//! ```

pub mod error;
pub use error::{Error, Result};

mod token;
pub use token::{Token, SENTINEL};

mod context;
pub use context::Context;

mod sequence;
pub use sequence::{Generation, SequenceModel};

mod codec;

mod memory;
pub use memory::{ChainEvent, ChainEventMemory};

mod manager;
pub use manager::{GenerationContext, ManagerConfig, ModelManager};
