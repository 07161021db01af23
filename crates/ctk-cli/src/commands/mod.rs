//! Command handler modules for ctk-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod backtest;
pub mod db;
pub mod engine;
pub mod run;

use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;

/// Parse a comma-separated `--symbols` flag into a non-empty symbol list.
pub fn parse_symbols(symbols: &str) -> Result<Vec<String>> {
    let syms: Vec<String> = symbols
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();
    if syms.is_empty() {
        anyhow::bail!("--symbols must contain at least one symbol");
    }
    Ok(syms)
}

/// Load strategy params from either an inline JSON string or a file path,
/// defaulting to an empty object when neither is given.
pub fn load_params(params: Option<String>, params_file: Option<String>) -> Result<Value> {
    if let Some(p) = params_file {
        let bytes = fs::read(&p).with_context(|| format!("read params-file failed: {}", p))?;
        let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);
        let raw = String::from_utf8(bytes.to_vec()).context("params-file must be UTF-8 text")?;
        let v: Value = serde_json::from_str(raw.trim()).context("params-file must contain valid JSON")?;
        return Ok(v);
    }
    match params {
        Some(raw) => {
            let v: Value = serde_json::from_str(raw.trim()).context("--params must be valid JSON")?;
            Ok(v)
        }
        None => Ok(serde_json::json!({})),
    }
}
