//! Per-invocation context: the working memory scratchpad and the prompt
//! text the loop sends to the model.

pub mod prompt;
pub mod working_memory;

pub use working_memory::{TraceEntry, TraceKind, WorkingMemory};
