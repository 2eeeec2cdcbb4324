/*
 * tags/mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The standard tags.

pub mod assign;
pub mod case;
pub mod conditional;
pub mod cycle;
pub mod for_loop;
pub mod ifchanged;
pub mod include;
pub mod inheritance;
pub mod interrupts;
pub mod raw;
pub mod tablerow;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::Context;
use crate::error::LiquidResult;
use crate::parser::TagConstructor;
use crate::value::Value;

/// A quoted string or a run of characters outside quotes, commas, pipes
/// and whitespace.
pub(crate) const QUOTED_FRAGMENT: &str =
    r#""[^"]*"|'[^']*'|(?:[^\s,|'"]|"[^"]*"|'[^']*')+"#;

static TAG_ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(\w+)\s*:\s*({})", QUOTED_FRAGMENT)).unwrap());
static FRAGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(QUOTED_FRAGMENT).unwrap());

/// `key: value` pairs in tag markup, in order of appearance.
pub(crate) fn attributes(markup: &str) -> Vec<(String, String)> {
    TAG_ATTRIBUTE
        .captures_iter(markup)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

/// The quoted fragments of `markup`, in order.
pub(crate) fn fragments(markup: &str) -> Vec<String> {
    FRAGMENT
        .find_iter(markup)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Resolve the attribute `name` as an integer, if present.
pub(crate) fn int_attribute(
    ctx: &mut Context,
    attributes: &[(String, String)],
    name: &str,
) -> LiquidResult<Option<i64>> {
    match attributes.iter().find(|(key, _)| key == name) {
        Some((_, markup)) => Ok(ctx.resolve(markup)?.to_int()),
        None => Ok(None),
    }
}

/// The items a loop iterates over. Maps yield `[key, value]` pairs; a
/// scalar yields nothing.
pub(crate) fn loop_items(collection: &Value) -> Vec<Value> {
    collection.iter_values().unwrap_or_default()
}

/// Tag constructors registered on every new registry.
pub fn standard_tags() -> Vec<(&'static str, TagConstructor)> {
    vec![
        ("assign", assign::parse),
        ("block", inheritance::parse_block),
        ("break", interrupts::parse),
        ("case", case::parse),
        ("comment", raw::parse_comment),
        ("continue", interrupts::parse),
        ("cycle", cycle::parse),
        ("extends", inheritance::parse_extends),
        ("for", for_loop::parse),
        ("if", conditional::parse),
        ("ifchanged", ifchanged::parse),
        ("include", include::parse),
        ("literal", raw::parse_raw),
        ("raw", raw::parse_raw),
        ("tablerow", tablerow::parse),
        ("unless", conditional::parse),
    ]
}
