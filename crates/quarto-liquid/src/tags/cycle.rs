/*
 * tags/cycle.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `{% cycle 'odd', 'even' %}` and `{% cycle group: 'a', 'b' %}`
//!
//! Each render outputs the next value of the list. The position is kept
//! per group in the `cycle` register; an unnamed cycle is grouped by its
//! value list.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::Context;
use crate::error::{LiquidError, LiquidResult};
use crate::parser::{Parser, RenderOutcome, Tag, TokenStream};
use crate::tags::{fragments, QUOTED_FRAGMENT};
use crate::value::Value;

static NAMED: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?s)^\s*({})\s*:\s*(.*)$", QUOTED_FRAGMENT)).unwrap());

#[derive(Debug)]
pub struct CycleTag {
    group: String,
    values: Vec<String>,
}

pub fn parse(
    _name: &str,
    markup: &str,
    _tokens: &mut TokenStream,
    _parser: &Parser,
) -> LiquidResult<Box<dyn Tag>> {
    let (group, values) = match NAMED.captures(markup) {
        Some(caps) => (caps[1].to_string(), fragments(&caps[2])),
        None => {
            let values = fragments(markup);
            (format!("'{}'", values.concat()), values)
        }
    };
    if values.is_empty() {
        return Err(LiquidError::syntax(
            "Syntax Error in 'cycle' - Valid syntax: cycle [name :] var [, var2, var3 ...]",
        ));
    }
    Ok(Box::new(CycleTag { group, values }))
}

impl Tag for CycleTag {
    fn name(&self) -> &str {
        "cycle"
    }

    fn render(&self, ctx: &mut Context, out: &mut String) -> LiquidResult<RenderOutcome> {
        let register = ctx.register("cycle");
        let key = ctx.resolve(&self.group)?.to_display(ctx.format());
        let position = register
            .get(&key)
            .and_then(|v| v.as_int())
            .and_then(|n| usize::try_from(n).ok())
            .filter(|n| *n < self.values.len())
            .unwrap_or(0);

        let value = ctx.resolve(&self.values[position])?;
        out.push_str(&value.to_display(ctx.format()));
        register.insert(key, Value::from((position + 1) % self.values.len()));
        Ok(RenderOutcome::Completed)
    }
}
