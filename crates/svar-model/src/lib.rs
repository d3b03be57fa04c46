// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod mock;
mod openai_compat;
mod provider;
mod types;

pub use mock::{EchoProvider, FailingProvider, ScriptedProvider};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::ChatProvider;
pub use types::{
    last_assistant_text, last_user_text, ChatRequest, ChatResponse, Message, Role,
    ToolCallRequest, ToolSchema,
};
