/*
 * tags/raw.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Tags whose bodies are taken verbatim: `raw` and `literal` output the
//! body unparsed, `comment` drops it.

use crate::context::Context;
use crate::error::LiquidResult;
use crate::parser::{Parser, RenderOutcome, Tag, TokenStream};

#[derive(Debug)]
pub struct RawTag {
    name: String,
    text: String,
}

pub fn parse_raw(
    name: &str,
    _markup: &str,
    tokens: &mut TokenStream,
    parser: &Parser,
) -> LiquidResult<Box<dyn Tag>> {
    Ok(Box::new(RawTag {
        name: name.to_string(),
        text: parser.parse_raw(tokens, name)?,
    }))
}

pub fn parse_comment(
    name: &str,
    _markup: &str,
    tokens: &mut TokenStream,
    parser: &Parser,
) -> LiquidResult<Box<dyn Tag>> {
    parser.parse_raw(tokens, name)?;
    Ok(Box::new(RawTag {
        name: name.to_string(),
        text: String::new(),
    }))
}

impl Tag for RawTag {
    fn name(&self) -> &str {
        &self.name
    }

    fn render(&self, _ctx: &mut Context, out: &mut String) -> LiquidResult<RenderOutcome> {
        out.push_str(&self.text);
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
    fn test_raw() {
        assert_eq!(
            render("{% raw %}{% comment %} test {% endcomment %}{% endraw %}"),
            "{% comment %} test {% endcomment %}"
        );
        assert_eq!(render("{% raw %}{{ test }}{% endraw %}"), "{{ test }}");
    }

    #[test]
    fn test_literal() {
        assert_eq!(
            render("{% literal %}{{ x }}{% if %}{% endliteral %}"),
            "{{ x }}{% if %}"
        );
        assert_eq!(render("{{{ {{ x }} }}}"), "{{ x }}");
    }

    #[test]
    fn test_comment() {
        assert_eq!(render("a{% comment %} {{ hidden }} {% endcomment %}b"), "ab");
        assert_eq!(render("a{% comment %}{% if %}{% endcomment %}b"), "ab");
        assert_eq!(render("{# note #}"), "");
    }

    #[test]
    fn test_unclosed_raw() {
        assert!(Template::parse("{% raw %}never closed").is_err());
    }
}
