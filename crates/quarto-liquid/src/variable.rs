/*
 * variable.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Output expressions: a base key followed by a filter pipeline.
//!
//! `{{ price | plus: 1 | money: 'USD', true }}` parses into the base key
//! `price` and the calls `plus(1)` and `money('USD', true)`. Arguments are
//! kept as markup and resolved when the output renders.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::Context;
use crate::error::{LiquidError, LiquidResult};
use crate::value::Value;

static BASE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)^\s*("[^"]*"|'[^']*'|(?:[^\s|'"]|"[^"]*"|'[^']*')+)(.*)$"#).unwrap()
});
static FILTER_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\w+)").unwrap());
static FILTER_ARG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[:,]\s*("[^"]*"|'[^']*'|(?:[^\s,|'"]|"[^"]*"|'[^']*')+)"#).unwrap()
});

/// One filter call in an output pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<String>,
}

/// A parsed output expression.
#[derive(Debug, Clone)]
pub struct Variable {
    markup: String,
    name: Option<String>,
    filters: Vec<FilterCall>,
}

/// Split on `|` outside quoted strings.
fn split_pipes(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '|') => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            (None, _) => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

impl Variable {
    pub fn parse(markup: &str) -> Self {
        let Some(caps) = BASE_KEY.captures(markup) else {
            return Variable {
                markup: markup.to_string(),
                name: None,
                filters: Vec::new(),
            };
        };

        let rest = caps.get(2).map_or("", |m| m.as_str());
        let filters = match rest.find('|') {
            Some(pipe) => split_pipes(&rest[pipe + 1..])
                .into_iter()
                .filter_map(|segment| {
                    let name = FILTER_NAME.captures(segment)?;
                    let name_match = name.get(1)?;
                    let args = FILTER_ARG
                        .captures_iter(&segment[name_match.end()..])
                        .map(|arg| arg[1].to_string())
                        .collect();
                    Some(FilterCall {
                        name: name_match.as_str().to_string(),
                        args,
                    })
                })
                .collect(),
            None => Vec::new(),
        };

        Variable {
            markup: markup.to_string(),
            name: Some(caps[1].to_string()),
            filters,
        }
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn filters(&self) -> &[FilterCall] {
        &self.filters
    }

    /// Resolve the base key and thread it through the filters.
    pub fn evaluate(&self, ctx: &mut Context) -> LiquidResult<Value> {
        let Some(name) = &self.name else {
            return Ok(Value::Nil);
        };
        let mut output = ctx.resolve(name)?;

        for call in &self.filters {
            let mut args = Vec::with_capacity(call.args.len() + 1);
            args.push(output);
            for arg in &call.args {
                args.push(ctx.resolve(arg)?);
            }
            output = ctx.invoke(&call.name, args).map_err(|err| {
                if err.is_fatal() {
                    err
                } else {
                    LiquidError::FilterNotFound {
                        filter: call.name.clone(),
                        markup: self.markup.trim().to_string(),
                        source: Box::new(err),
                    }
                }
            })?;
        }

        Ok(output)
    }

    /// Evaluate and format for output.
    pub fn render(&self, ctx: &mut Context) -> LiquidResult<String> {
        let value = self.evaluate(ctx)?;
        Ok(value.to_display(ctx.format()))
    }
}
