// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Thin HTTP/GraphQL frontend over the dispatcher core.
//!
//! Endpoints:
//! - `POST /chat` – one conversation turn (503 on per-agent overload)
//! - `GET /health` – circuit and tool-server status (503 when degraded)
//! - `GET /hitl/pending`, `POST /hitl/pending/{session_id}/clear`
//! - `POST /graphql` – conversation read API
//!
//! The frontend owns the conversation-store writes: one user turn and one
//! assistant turn per request, appended after the supervisor returns.
mod graphql;
mod http;

pub use graphql::{build_schema, GqlSchema, QueryRoot};
pub use http::{router, serve, AppState};
