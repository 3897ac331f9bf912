//! Context pipeline for Powergate.
//!
//! Three stages, leaves first:
//!
//! 1. **Tokenizer** — deterministic token cost estimation per model family
//! 2. **Assembler** — tiered, budget-aware trimming of a `ContextFrame`
//! 3. **Compiler** — flattening the frame into upstream wire messages

pub mod assembler;
pub mod compiler;
pub mod token;

pub use assembler::{ContextAssembler, TrimReport};
pub use compiler::compile;
pub use token::Tokenizer;
