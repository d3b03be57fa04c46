// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Errors the frontend must tell apart.
///
/// Everything else inside a turn is contained: tool failures become tool
/// messages, invocation failures become escalations, handler failures are
/// logged.  What escapes is either overload (→ 503) or an internal error
/// that indicates a bug rather than a bad turn.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("agent '{0}' is at capacity, try again shortly")]
    Overload(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
