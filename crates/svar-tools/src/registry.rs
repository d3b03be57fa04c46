// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::{Tool, ToolCall, ToolOutput};

/// A tool schema as advertised to the model.  Mirrors
/// `svar_model::ToolSchema` but keeps this crate independent from the model
/// crate.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Central registry holding all tools available to one agent.
///
/// Built once at startup and immutable afterwards, so it can be shared
/// across concurrent turns without locks.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Merge built-in and externally discovered tools.
    ///
    /// Names must be unique: on conflict the built-in wins and the external
    /// duplicate is dropped.
    pub fn build(builtin: Vec<Arc<dyn Tool>>, external: Vec<Arc<dyn Tool>>) -> Self {
        let mut tools: HashMap<String, Arc<dyn Tool>> = HashMap::new();
        for tool in builtin {
            tools.insert(tool.name().to_string(), tool);
        }
        for tool in external {
            let name = tool.name().to_string();
            if tools.contains_key(&name) {
                warn!(tool = %name, "external tool shadows a built-in; dropping the external one");
                continue;
            }
            tools.insert(name, tool);
        }
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Produce schemas for all registered tools, name-sorted for stable
    /// prompt construction.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Dispatch a call.  An unknown tool name yields an error output that is
    /// fed back to the model, never a crash.
    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.tools.get(&call.name) {
            Some(tool) => tool.execute(call).await,
            None => ToolOutput::err(&call.id, format!("unknown tool: {}", call.name)),
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
