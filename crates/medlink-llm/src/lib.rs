//! Model-facing layer for the MedLink pharmacy assistant.
//!
//! This crate owns everything that talks to, or interprets output from, the
//! hosted AI backends: the collaborator traits and their HTTP clients, the
//! prompts, the response normalizer and the vision/speech adapters. Domain
//! logic and fallback sequencing live in `medlink-core`.

pub mod client;
pub mod error;
pub mod extraction;
pub mod http;
pub mod normalizer;
pub mod prompts;
pub mod speech;
pub mod vision;

pub use client::*;
pub use error::{LlmError, LlmResult};
pub use extraction::*;
pub use normalizer::{normalize, normalize_value, Normalized, UpstreamFault};
pub use speech::SpeechAdapter;
pub use vision::VisionAdapter;
