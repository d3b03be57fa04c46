// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
pub mod registry;
pub mod remote;
pub mod tool;

pub use registry::{ToolRegistry, ToolSchema};
pub use remote::{
    discover_external_tools, HttpToolServerClient, MockToolServer, RemoteTool,
    RemoteToolDescriptor, ToolServerClient,
};
pub use tool::{Tool, ToolCall, ToolOutput};

pub use builtin::default_tools;
pub use builtin::invoice::{LookUpInvoiceTool, RefundStatusTool};
pub use builtin::ticket::CreateTicketTool;
