// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_yaml::Value;
use tracing::debug;

use crate::Config;

/// One configuration layer.  Discovered layers are optional; the layer named
/// with `--config` must exist.
struct Layer {
    path: PathBuf,
    required: bool,
}

/// Layers from lowest to highest precedence: system, then per-user, then
/// workspace, then the explicit `--config` file.
fn layers(explicit: Option<&Path>) -> Vec<Layer> {
    let mut out = vec![Layer {
        path: PathBuf::from("/etc/svar/config.yaml"),
        required: false,
    }];
    if let Some(dir) = dirs::config_dir() {
        out.push(Layer {
            path: dir.join("svar/config.yaml"),
            required: false,
        });
    }
    out.push(Layer {
        path: PathBuf::from(".svar.yaml"),
        required: false,
    });
    out.push(Layer {
        path: PathBuf::from("svar.yaml"),
        required: false,
    });
    if let Some(path) = explicit {
        out.push(Layer {
            path: path.to_path_buf(),
            required: true,
        });
    }
    out
}

/// Load configuration by folding all existing layers, highest precedence
/// last.  No layers at all yields the built-in defaults; an unreadable or
/// malformed layer is a startup error, not a silent fallback.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged: Option<Value> = None;
    for layer in layers(explicit) {
        let Some(value) = parse_layer(&layer)? else {
            continue;
        };
        debug!(path = %layer.path.display(), "applying config layer");
        merged = Some(match merged {
            None => value,
            Some(base) => overlay(base, value),
        });
    }
    match merged {
        None => Ok(Config::default()),
        Some(value) => serde_yaml::from_value(value).context("merged configuration is invalid"),
    }
}

/// Read and parse one layer.  Returns `Ok(None)` for an absent optional
/// layer; a missing required layer is an error.
fn parse_layer(layer: &Layer) -> anyhow::Result<Option<Value>> {
    if !layer.path.is_file() {
        if layer.required {
            anyhow::bail!("config file not found: {}", layer.path.display());
        }
        return Ok(None);
    }
    let text = std::fs::read_to_string(&layer.path)
        .with_context(|| format!("reading {}", layer.path.display()))?;
    let value = serde_yaml::from_str(&text)
        .with_context(|| format!("parsing {}", layer.path.display()))?;
    Ok(Some(value))
}

/// Apply `upper` on top of `base`: mappings combine key by key (recursively),
/// every other node kind (scalars, lists) is replaced wholesale.  List
/// replacement is deliberate so a layer can shrink the guardrail lists, not
/// only extend them.
fn overlay(base: Value, upper: Value) -> Value {
    match (base, upper) {
        (Value::Mapping(mut below), Value::Mapping(above)) => {
            for (key, value) in above {
                let combined = match below.remove(&key) {
                    Some(existing) => overlay(existing, value),
                    None => value,
                };
                below.insert(key, combined);
            }
            Value::Mapping(below)
        }
        (_, replacement) => replacement,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
