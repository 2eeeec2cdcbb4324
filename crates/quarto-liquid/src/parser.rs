/*
 * parser.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Building the node tree from a token stream.
//!
//! Tags are instantiated through constructors registered by name on the
//! [`Registry`]. A block tag keeps consuming tokens until it sees its end
//! tag (`end` + tag name). Tags the block does not recognize are first
//! offered to the block itself (this is how `if` collects `elsif` and
//! `else` branches) and otherwise dispatched as nested tags.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::Context;
use crate::error::{LiquidError, LiquidResult};
use crate::registry::Registry;
use crate::tags::inheritance::{BlockTag, ExtendsTag};
use crate::variable::Variable;

static FULL_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^\{%\s*(\w+)\s*(.*?)\s*%\}$").unwrap());
static FULL_OUTPUT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^\{\{(.*)\}\}$").unwrap());

/// How rendering a node list ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Completed,
    /// A `break` is unwinding to the nearest loop.
    Break,
    /// A `continue` is unwinding to the nearest loop.
    Continue,
}

/// A node in a parsed template.
#[derive(Debug)]
pub enum Node {
    Text(String),
    Output(Variable),
    Tag(Box<dyn Tag>),
}

impl Node {
    fn render(&self, ctx: &mut Context, out: &mut String) -> LiquidResult<RenderOutcome> {
        match self {
            Node::Text(text) => {
                out.push_str(text);
                Ok(RenderOutcome::Completed)
            }
            Node::Output(variable) => {
                out.push_str(&variable.render(ctx)?);
                Ok(RenderOutcome::Completed)
            }
            Node::Tag(tag) => tag.render(ctx, out),
        }
    }

    pub fn as_tag(&self) -> Option<&dyn Tag> {
        match self {
            Node::Tag(tag) => Some(tag.as_ref()),
            _ => None,
        }
    }
}

/// A parsed tag.
pub trait Tag: Debug + Send + Sync {
    fn name(&self) -> &str;

    fn render(&self, ctx: &mut Context, out: &mut String) -> LiquidResult<RenderOutcome>;

    /// The node lists nested in this tag.
    fn children(&self) -> Vec<&[Node]> {
        Vec::new()
    }

    fn as_block(&self) -> Option<&BlockTag> {
        None
    }

    fn as_extends(&self) -> Option<&ExtendsTag> {
        None
    }
}

/// Builds a tag from its name, its markup and the tokens that follow it.
pub type TagConstructor =
    fn(name: &str, markup: &str, tokens: &mut TokenStream, parser: &Parser) -> LiquidResult<Box<dyn Tag>>;

/// A cursor over tokens.
#[derive(Debug, Clone, Default)]
pub struct TokenStream {
    tokens: VecDeque<String>,
}

impl TokenStream {
    pub fn new(tokens: Vec<String>) -> Self {
        TokenStream {
            tokens: tokens.into(),
        }
    }

    pub fn shift(&mut self) -> Option<String> {
        self.tokens.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Splits a `{% name markup %}` token.
pub fn split_tag(token: &str) -> Option<(&str, &str)> {
    let caps = FULL_TAG.captures(token)?;
    Some((caps.get(1)?.as_str(), caps.get(2).map_or("", |m| m.as_str())))
}

/// Handles tags a block does not otherwise know. Receives the tag name,
/// its markup and the nodes collected since the block or its previous
/// branch started. Returns `true` if the tag was consumed.
pub type UnknownTagHook<'a> = dyn FnMut(&str, &str, &mut Vec<Node>) -> LiquidResult<bool> + 'a;

/// Parses token streams against a registry.
#[derive(Debug, Clone)]
pub struct Parser {
    registry: Arc<Registry>,
}

impl Parser {
    pub fn new(registry: Arc<Registry>) -> Self {
        Parser { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Parse a whole document; there is no end tag.
    pub fn parse_document(&self, tokens: &mut TokenStream) -> LiquidResult<Vec<Node>> {
        self.parse_nodes(tokens, None, &mut |_, _, _| Ok(false))
    }

    /// Parse the body of block `block_name` up to its end tag.
    pub fn parse_block(&self, tokens: &mut TokenStream, block_name: &str) -> LiquidResult<Vec<Node>> {
        self.parse_nodes(tokens, Some(block_name), &mut |_, _, _| Ok(false))
    }

    /// Parse the body of block `block_name`, offering unknown tags to `hook`.
    pub fn parse_block_with(
        &self,
        tokens: &mut TokenStream,
        block_name: &str,
        hook: &mut UnknownTagHook<'_>,
    ) -> LiquidResult<Vec<Node>> {
        self.parse_nodes(tokens, Some(block_name), hook)
    }

    /// Collect tokens verbatim until `end<block_name>`.
    pub fn parse_raw(&self, tokens: &mut TokenStream, block_name: &str) -> LiquidResult<String> {
        let delimiter = format!("end{}", block_name);
        let mut text = String::new();
        while let Some(token) = tokens.shift() {
            if let Some((name, _)) = split_tag(&token)
                && name == delimiter
            {
                return Ok(text);
            }
            text.push_str(&token);
        }
        Err(not_closed(block_name))
    }

    pub(crate) fn parse_nodes(
        &self,
        tokens: &mut TokenStream,
        block_name: Option<&str>,
        hook: &mut UnknownTagHook<'_>,
    ) -> LiquidResult<Vec<Node>> {
        let delimiter = block_name.map(|name| format!("end{}", name));
        let mut nodes = Vec::new();

        while let Some(token) = tokens.shift() {
            if token.starts_with("{%") {
                let Some((name, markup)) = split_tag(&token) else {
                    return Err(LiquidError::syntax(format!(
                        "Tag '{}' was not properly terminated with '%}}'",
                        token
                    )));
                };
                if delimiter.as_deref() == Some(name) {
                    return Ok(nodes);
                }
                if hook(name, markup, &mut nodes)? {
                    continue;
                }
                match self.registry.tag(name) {
                    Some(constructor) => {
                        let tag = constructor(name, markup, tokens, self)?;
                        tracing::trace!(tag = name, "Parsed tag");
                        nodes.push(Node::Tag(tag));
                    }
                    None => return Err(unknown_tag(name, block_name)),
                }
            } else if token.starts_with("{{") {
                let Some(caps) = FULL_OUTPUT.captures(&token) else {
                    return Err(LiquidError::syntax(format!(
                        "Variable '{}' was not properly terminated with '}}}}'",
                        token
                    )));
                };
                nodes.push(Node::Output(Variable::parse(&caps[1])));
            } else if !token.is_empty() {
                nodes.push(Node::Text(token));
            }
        }

        match block_name {
            Some(name) => Err(not_closed(name)),
            None => Ok(nodes),
        }
    }
}

fn not_closed(block_name: &str) -> LiquidError {
    LiquidError::syntax(format!("'{}' tag was never closed", block_name))
}

fn unknown_tag(name: &str, block_name: Option<&str>) -> LiquidError {
    match (name, block_name) {
        ("else", Some(block)) => {
            LiquidError::syntax(format!("'{}' tag does not expect 'else' tag", block))
        }
        (end, Some(block)) if end.starts_with("end") => LiquidError::syntax(format!(
            "'{}' is not a valid delimiter for '{}' tags. Use 'end{}'",
            end, block, block
        )),
        (end, None) if end.starts_with("end") => {
            LiquidError::syntax(format!("Unexpected '{}' tag outside of a block", end))
        }
        _ => LiquidError::syntax(format!("Unknown tag '{}'", name)),
    }
}

/// Render `nodes` in order. A node error is handed to
/// [`Context::handle_error`]; a `break` or `continue` stops the list and
/// is returned to the caller.
pub fn render_all(nodes: &[Node], ctx: &mut Context, out: &mut String) -> LiquidResult<RenderOutcome> {
    for node in nodes {
        let mut fragment = String::new();
        match node.render(ctx, &mut fragment) {
            Ok(RenderOutcome::Completed) => out.push_str(&fragment),
            Ok(interrupt) => {
                out.push_str(&fragment);
                return Ok(interrupt);
            }
            Err(err) => {
                let text = ctx.handle_error(err)?;
                out.push_str(&text);
            }
        }
    }
    Ok(RenderOutcome::Completed)
}

/// Render a template root. A document containing `extends` renders only
/// the extended template.
pub fn render_document(nodes: &[Node], ctx: &mut Context, out: &mut String) -> LiquidResult<RenderOutcome> {
    let extends = nodes
        .iter()
        .filter_map(Node::as_tag)
        .find_map(|tag| tag.as_extends());
    match extends {
        Some(extends) => match extends.render(ctx, out) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let text = ctx.handle_error(err)?;
                out.push_str(&text);
                Ok(RenderOutcome::Completed)
            }
        },
        None => render_all(nodes, ctx, out),
    }
}

/// Every `block` tag in `nodes`, including blocks nested in other tags.
pub fn collect_blocks(nodes: &[Node]) -> Vec<&BlockTag> {
    let mut blocks = Vec::new();
    for tag in nodes.iter().filter_map(Node::as_tag) {
        if let Some(block) = tag.as_block() {
            blocks.push(block);
        }
        for child in tag.children() {
            blocks.extend(collect_blocks(child));
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse(source: &str) -> LiquidResult<Vec<Node>> {
        let parser = Parser::new(Arc::new(Registry::new()));
        parser.parse_document(&mut TokenStream::new(tokenize(source)))
    }

    fn render(source: &str) -> String {
        let registry = Arc::new(Registry::new());
        let nodes = Parser::new(Arc::clone(&registry))
            .parse_document(&mut TokenStream::new(tokenize(source)))
            .unwrap();
        let mut ctx = Context::new(registry);
        let mut out = String::new();
        render_all(&nodes, &mut ctx, &mut out).unwrap();
        out
    }

    #[test]
    fn test_split_tag() {
        assert_eq!(split_tag("{% if a == b %}"), Some(("if", "a == b")));
        assert_eq!(split_tag("{%endif%}"), Some(("endif", "")));
        assert_eq!(split_tag("{% %}"), None);
    }

    #[test]
    fn test_parse_text_and_output() {
        let nodes = parse("hello {{ name }}!").unwrap();
        assert_eq!(nodes.len(), 3);
        assert!(matches!(&nodes[0], Node::Text(t) if t == "hello "));
        assert!(matches!(&nodes[1], Node::Output(v) if v.name() == Some("name")));
    }

    #[test]
    fn test_nested_blocks() {
        let nodes = parse("{% if a %}{% for x in y %}{{ x }}{% endfor %}{% endif %}").unwrap();
        assert_eq!(nodes.len(), 1);
        let tag = nodes[0].as_tag().unwrap();
        assert_eq!(tag.name(), "if");
        let inner = tag.children();
        assert_eq!(inner[0][0].as_tag().map(|t| t.name()), Some("for"));
    }

    #[test]
    fn test_unclosed_block() {
        let err = parse("{% if a %}never closed").unwrap_err();
        assert_eq!(err, LiquidError::syntax("'if' tag was never closed"));
    }

    #[test]
    fn test_unknown_tag() {
        let err = parse("{% frobnicate %}").unwrap_err();
        assert_eq!(err, LiquidError::syntax("Unknown tag 'frobnicate'"));
    }

    #[test]
    fn test_wrong_end_tag() {
        let err = parse("{% for x in y %}{% endif %}").unwrap_err();
        assert!(matches!(err, LiquidError::Syntax { .. }));
    }

    #[test]
    fn test_unterminated_tag_and_output() {
        assert!(matches!(parse("{% if a"), Err(LiquidError::Syntax { .. })));
        assert!(matches!(parse("{{ a"), Err(LiquidError::Syntax { .. })));
    }

    #[test]
    fn test_raw_consumes_tokens_verbatim() {
        assert_eq!(
            render("{% raw %}{{ x }}{% if %}{% endraw %}"),
            "{{ x }}{% if %}"
        );
    }

    #[test]
    fn test_render_all_stops_on_break() {
        let registry = Arc::new(Registry::new());
        let nodes = Parser::new(Arc::clone(&registry))
            .parse_document(&mut TokenStream::new(tokenize("a{% break %}b")))
            .unwrap();
        let mut ctx = Context::new(registry);
        let mut out = String::new();
        let outcome = render_all(&nodes, &mut ctx, &mut out).unwrap();
        assert_eq!(outcome, RenderOutcome::Break);
        assert_eq!(out, "a");
    }

    #[test]
    fn test_render_errors_are_inlined() {
        assert_eq!(
            render("a{% if 1 isMultipleOf 2 %}x{% endif %}b"),
            "aLiquid error: Unknown operator isMultipleOfb"
        );
    }
}
