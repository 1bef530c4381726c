//! Model provider implementations for Weekend Wizard.
//!
//! All providers implement the `wizard_core::Provider` trait.
//! The router builds the configured provider at startup.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{build_from_config, default_base_url};
