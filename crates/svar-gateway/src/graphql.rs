// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_graphql::{Context, EmptyMutation, EmptySubscription, Object, Schema, SimpleObject};

use svar_core::ConversationStore;

pub type GqlSchema = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

/// Build the query schema with the conversation store injected as context
/// data.
pub fn build_schema(store: Arc<dyn ConversationStore>) -> GqlSchema {
    Schema::build(QueryRoot, EmptyMutation, EmptySubscription)
        .data(store)
        .finish()
}

/// One transcript turn as exposed over GraphQL.  `metadata_json` carries the
/// turn metadata serialized as a JSON string (empty when absent).
#[derive(SimpleObject)]
#[graphql(rename_fields = "snake_case")]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
    pub metadata_json: String,
}

#[derive(SimpleObject)]
#[graphql(rename_fields = "snake_case")]
pub struct Conversation {
    pub session_id: String,
    pub turns: Vec<ConversationTurn>,
}

#[derive(SimpleObject)]
#[graphql(rename_fields = "snake_case")]
pub struct SessionRef {
    pub session_id: String,
}

pub struct QueryRoot;

#[Object(rename_fields = "snake_case", rename_args = "snake_case")]
impl QueryRoot {
    /// A session's transcript, or null for an unknown session.
    async fn conversation(
        &self,
        ctx: &Context<'_>,
        session_id: String,
        limit: Option<i32>,
    ) -> async_graphql::Result<Option<Conversation>> {
        let store = ctx.data::<Arc<dyn ConversationStore>>()?;
        let limit = limit.map(|n| n.max(0) as usize);
        let turns = store
            .get_history(&session_id, limit)
            .await
            .map_err(|e| async_graphql::Error::new(e.to_string()))?;
        if turns.is_empty() {
            return Ok(None);
        }
        Ok(Some(Conversation {
            session_id,
            turns: turns
                .into_iter()
                .map(|t| ConversationTurn {
                    role: t.role,
                    content: t.content,
                    metadata_json: t.metadata.map(|m| m.to_string()).unwrap_or_default(),
                })
                .collect(),
        }))
    }

    /// Known sessions, oldest first.
    async fn sessions(
        &self,
        ctx: &Context<'_>,
        limit: Option<i32>,
    ) -> async_graphql::Result<Vec<SessionRef>> {
        let store = ctx.data::<Arc<dyn ConversationStore>>()?;
        let limit = limit.map(|n| n.max(0) as usize);
        let ids = store
            .list_sessions(limit)
            .await
            .map_err(|e| async_graphql::Error::new(e.to_string()))?;
        Ok(ids
            .into_iter()
            .map(|session_id| SessionRef { session_id })
            .collect())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
