/*
 * tags/assign.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `{% assign name = expression | filters %}`
//!
//! The value is written to the outermost scope, so it stays visible after
//! the enclosing block has finished rendering.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::Context;
use crate::error::{LiquidError, LiquidResult};
use crate::parser::{Parser, RenderOutcome, Tag, TokenStream};
use crate::variable::Variable;

static SYNTAX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^\s*([^=\s]+)\s*=\s*(.+)$").unwrap());

#[derive(Debug)]
pub struct AssignTag {
    to: String,
    from: Variable,
}

pub fn parse(
    _name: &str,
    markup: &str,
    _tokens: &mut TokenStream,
    _parser: &Parser,
) -> LiquidResult<Box<dyn Tag>> {
    let caps = SYNTAX.captures(markup).ok_or_else(|| {
        LiquidError::syntax("Syntax Error in 'assign' tag - Valid syntax: assign [var] = [source]")
    })?;
    Ok(Box::new(AssignTag {
        to: caps[1].to_string(),
        from: Variable::parse(&caps[2]),
    }))
}

impl Tag for AssignTag {
    fn name(&self) -> &str {
        "assign"
    }

    fn render(&self, ctx: &mut Context, _out: &mut String) -> LiquidResult<RenderOutcome> {
        let value = self.from.evaluate(ctx)?;
        ctx.set_outermost(self.to.as_str(), value);
        Ok(RenderOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use crate::template::{RenderParameters, Template};
    use pretty_assertions::assert_eq;

    fn render(source: &str) -> String {
        Template::parse(source)
            .unwrap()
            .render(&RenderParameters::new())
            .unwrap()
    }

    #[test]
    fn test_assign_literal() {
        assert_eq!(render("{% assign a = 'hello' %}{{ a }}"), "hello");
    }

    #[test]
    fn test_assign_with_filters() {
        assert_eq!(render("{% assign a = 'hello' | upcase %}{{ a }}"), "HELLO");
    }

    #[test]
    fn test_assign_escapes_blocks() {
        assert_eq!(
            render("{% for i in (1..2) %}{% assign last = i %}{% endfor %}{{ last }}"),
            "2"
        );
    }

    #[test]
    fn test_invalid_assign() {
        assert!(Template::parse("{% assign %}").is_err());
    }
}
