/*
 * tags/include.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `{% include 'name' [with|for expr] [key: value, ...] %}`
//!
//! The partial is loaded through the registry's template source and
//! rendered with the including context, inside a new scope holding the
//! attributes. The partial's name is bound to the `with`/`for` value, or
//! to the variable of the same name; a list value renders the partial
//! once per element.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::Context;
use crate::error::{LiquidError, LiquidResult};
use crate::file_system::load_template;
use crate::parser::{render_document, Parser, RenderOutcome, Tag, TokenStream};
use crate::tags::{attributes, QUOTED_FRAGMENT};
use crate::value::{Hash, Value};

static SYNTAX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?s)^\s*((?:{qf})+)(?:\s+(?:with|for)\s+((?:{qf})+))?",
        qf = QUOTED_FRAGMENT
    ))
    .unwrap()
});

#[derive(Debug)]
pub struct IncludeTag {
    template_name: String,
    variable: Option<String>,
    attributes: Vec<(String, String)>,
}

pub fn parse(
    _name: &str,
    markup: &str,
    _tokens: &mut TokenStream,
    _parser: &Parser,
) -> LiquidResult<Box<dyn Tag>> {
    let caps = SYNTAX.captures(markup).ok_or_else(|| {
        LiquidError::syntax(
            "Error in tag 'include' - Valid syntax: include '[template]' (with|for) [object|collection]",
        )
    })?;
    Ok(Box::new(IncludeTag {
        template_name: caps[1].to_string(),
        variable: caps.get(2).map(|m| m.as_str().to_string()),
        attributes: attributes(markup),
    }))
}

impl Tag for IncludeTag {
    fn name(&self) -> &str {
        "include"
    }

    fn render(&self, ctx: &mut Context, out: &mut String) -> LiquidResult<RenderOutcome> {
        let name = ctx.resolve(&self.template_name)?.to_display(ctx.format());
        tracing::debug!(template = %name, "Including template");
        let partial = load_template(ctx, &name)?;

        let variable = match &self.variable {
            Some(markup) => ctx.resolve(markup)?,
            None => ctx.resolve_quiet(&name)?,
        };

        ctx.stack(Hash::new(), |ctx| {
            for (key, markup) in &self.attributes {
                let value = ctx.resolve(markup)?;
                ctx.set(key.as_str(), value);
            }

            let items = match &variable {
                Value::List(items) => items.to_vec(),
                single => vec![single.clone()],
            };
            for item in items {
                ctx.set(name.as_str(), item);
                match render_document(partial.root(), ctx, out)? {
                    RenderOutcome::Completed => {}
                    interrupt => return Ok(interrupt),
                }
            }
            Ok(RenderOutcome::Completed)
        })
    }
}
