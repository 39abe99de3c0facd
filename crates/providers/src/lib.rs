//! LLM Provider implementations for Toolwright.
//!
//! All providers implement the `toolwright_core::Provider` trait.
//! `build_from_config` selects the endpoint based on configuration.

pub mod factory;
pub mod openai_compat;

pub use factory::{build_from_config, default_base_url};
pub use openai_compat::OpenAiCompatProvider;
