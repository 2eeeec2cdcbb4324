/*
 * tags/for_loop.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `{% for item in collection [reversed] [limit: n] [offset: n|continue] %}`
//!
//! Inside the body `forloop` exposes `name`, `length`, `index`, `index0`,
//! `rindex`, `rindex0`, `first` and `last`. `offset: continue` resumes
//! where the previous loop over the same variable and collection stopped;
//! the stopping point is kept in the `for` register.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::Context;
use crate::error::{LiquidError, LiquidResult};
use crate::parser::{render_all, Node, Parser, RenderOutcome, Tag, TokenStream};
use crate::tags::{attributes, int_attribute, loop_items, QUOTED_FRAGMENT};
use crate::value::{Hash, Value};

static SYNTAX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?s)^\s*(\w+)\s+in\s+((?:{})+)\s*(reversed)?",
        QUOTED_FRAGMENT
    ))
    .unwrap()
});

#[derive(Debug)]
pub struct ForTag {
    variable: String,
    collection: String,
    /// Key of this loop in the `for` register.
    name: String,
    reversed: bool,
    attributes: Vec<(String, String)>,
    body: Vec<Node>,
}

pub fn parse(
    _name: &str,
    markup: &str,
    tokens: &mut TokenStream,
    parser: &Parser,
) -> LiquidResult<Box<dyn Tag>> {
    let caps = SYNTAX.captures(markup).ok_or_else(|| {
        LiquidError::syntax(
            "Syntax Error in 'for loop' - Valid syntax: for [item] in [collection]",
        )
    })?;
    let variable = caps[1].to_string();
    let collection = caps[2].to_string();
    let body = parser.parse_block(tokens, "for")?;

    Ok(Box::new(ForTag {
        name: format!("{}-{}", variable, collection),
        reversed: caps.get(3).is_some(),
        attributes: attributes(markup),
        variable,
        collection,
        body,
    }))
}

impl ForTag {
    fn offset(&self, ctx: &mut Context, register: &Hash) -> LiquidResult<usize> {
        let continued = self
            .attributes
            .iter()
            .any(|(key, value)| key == "offset" && value == "continue");
        let offset = if continued {
            register.get(&self.name).and_then(|v| v.as_int())
        } else {
            int_attribute(ctx, &self.attributes, "offset")?
        };
        Ok(offset.and_then(|n| usize::try_from(n).ok()).unwrap_or(0))
    }
}

impl Tag for ForTag {
    fn name(&self) -> &str {
        "for"
    }

    fn render(&self, ctx: &mut Context, out: &mut String) -> LiquidResult<RenderOutcome> {
        let register = ctx.register("for");
        let collection = ctx.resolve(&self.collection)?;
        let items = loop_items(&collection);

        let from = self.offset(ctx, &register)?;
        let limit = int_attribute(ctx, &self.attributes, "limit")?
            .map(|n| usize::try_from(n).unwrap_or(0));
        let mut segment: Vec<Value> = items
            .into_iter()
            .skip(from)
            .take(limit.unwrap_or(usize::MAX))
            .collect();

        register.insert(self.name.as_str(), Value::from(from + segment.len()));
        if segment.is_empty() {
            return Ok(RenderOutcome::Completed);
        }
        if self.reversed {
            segment.reverse();
        }

        let length = segment.len();
        let max_iterations = ctx.max_iterations();
        ctx.stack(Hash::new(), |ctx| {
            for (index, item) in segment.into_iter().enumerate() {
                if max_iterations > 0 && index >= max_iterations {
                    tracing::warn!(max_iterations, "Loop aborted by the iteration bound");
                    return Err(LiquidError::MaximumIterationsExceeded { max_iterations });
                }
                ctx.check_timeout()?;

                ctx.set(self.variable.as_str(), item);
                let forloop: Hash = [
                    ("name", Value::str(&self.name)),
                    ("length", Value::from(length)),
                    ("index", Value::from(index + 1)),
                    ("index0", Value::from(index)),
                    ("rindex", Value::from(length - index)),
                    ("rindex0", Value::from(length - index - 1)),
                    ("first", Value::Bool(index == 0)),
                    ("last", Value::Bool(index == length - 1)),
                ]
                .into_iter()
                .collect();
                ctx.set("forloop", forloop);

                match render_all(&self.body, ctx, out)? {
                    RenderOutcome::Break => break,
                    RenderOutcome::Continue | RenderOutcome::Completed => {}
                }
            }
            Ok(RenderOutcome::Completed)
        })
    }

    fn children(&self) -> Vec<&[Node]> {
        vec![self.body.as_slice()]
    }
}
