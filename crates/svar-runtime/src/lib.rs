// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Shared per-request services: document retrieval, short-term history
//! formatting, guardrails, faithfulness scoring, and intent classification.
//! Everything here is immutable after construction and safe to share across
//! concurrent turns.
mod faithfulness;
mod guard;
mod history;
mod intent;
mod rag;

pub use faithfulness::{FaithfulnessScorer, FixedScorer, NullScorer, RemoteScorer};
pub use guard::{GuardVerdict, Guardrail};
pub use history::format_recent;
pub use intent::{IntentClassifier, KeywordClassifier, RemoteIntentClassifier};
pub use rag::{HttpRetriever, RetrievedChunk, Retriever, StaticRetriever};
