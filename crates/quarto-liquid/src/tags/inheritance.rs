/*
 * tags/inheritance.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template inheritance: `extends`, `block` and `block.super`.
//!
//! A template starting with `{% extends 'parent' %}` renders as its parent,
//! with the parent's `block`s replaced by the child's blocks of the same
//! name. Inside an overriding block, `{{ block.super }}` renders the version
//! it overrides.
//!
//! Overrides travel through the render context as a map from block name to
//! the versions of that block, most derived first. Each `extends` on the way
//! up the chain appends its own blocks to the map it inherited, so when the
//! root template renders a block, the list of versions is ordered from the
//! outermost child down to the root. `block.super` steps one position along
//! that list.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::context::Context;
use crate::drop::LiquidDrop;
use crate::error::{LiquidError, LiquidResult};
use crate::file_system::load_template;
use crate::parser::{collect_blocks, render_all, render_document, Node, Parser, RenderOutcome, Tag, TokenStream};
use crate::tags::fragments;
use crate::value::{Hash, Value};

/// Block name to its versions, most derived first.
pub(crate) type BlockOverrides = HashMap<String, Vec<Arc<Vec<Node>>>>;

// ============================================================================
// block
// ============================================================================

#[derive(Debug)]
pub struct BlockTag {
    name: String,
    body: Arc<Vec<Node>>,
}

pub fn parse_block(
    _name: &str,
    markup: &str,
    tokens: &mut TokenStream,
    parser: &Parser,
) -> LiquidResult<Box<dyn Tag>> {
    let name = fragments(markup).into_iter().next().ok_or_else(|| {
        LiquidError::syntax("Syntax Error in 'block' tag - Valid syntax: block [name]")
    })?;
    let body = parser.parse_block(tokens, "block")?;
    Ok(Box::new(BlockTag {
        name,
        body: Arc::new(body),
    }))
}

impl BlockTag {
    pub fn block_name(&self) -> &str {
        &self.name
    }

    fn versions(&self, ctx: &Context) -> Vec<Arc<Vec<Node>>> {
        let mut versions = ctx
            .block_overrides
            .as_ref()
            .and_then(|overrides| overrides.get(&self.name))
            .cloned()
            .unwrap_or_default();
        if !versions.iter().any(|v| Arc::ptr_eq(v, &self.body)) {
            versions.push(Arc::clone(&self.body));
        }
        versions
    }
}

impl Tag for BlockTag {
    fn name(&self) -> &str {
        "block"
    }

    fn render(&self, ctx: &mut Context, out: &mut String) -> LiquidResult<RenderOutcome> {
        let versions = Arc::new(self.versions(ctx));
        render_version(ctx, &self.name, versions, 0, out)
    }

    fn children(&self) -> Vec<&[Node]> {
        vec![self.body.as_slice()]
    }

    fn as_block(&self) -> Option<&BlockTag> {
        Some(self)
    }
}

/// Render version `index` of a block with `block` bound to its drop.
fn render_version(
    ctx: &mut Context,
    name: &str,
    versions: Arc<Vec<Arc<Vec<Node>>>>,
    index: usize,
    out: &mut String,
) -> LiquidResult<RenderOutcome> {
    let Some(body) = versions.get(index).cloned() else {
        return Ok(RenderOutcome::Completed);
    };
    let drop = BlockDrop {
        name: name.to_string(),
        versions,
        index,
    };
    let scope = Hash::new();
    scope.insert("block", Value::Drop(Arc::new(drop)));
    ctx.stack(scope, |ctx| render_all(&body, ctx, out))
}

/// The `block` variable inside a block body.
#[derive(Debug)]
struct BlockDrop {
    name: String,
    versions: Arc<Vec<Arc<Vec<Node>>>>,
    index: usize,
}

impl LiquidDrop for BlockDrop {
    fn has(&self, name: &str, _ctx: &Context) -> bool {
        name == "super"
    }

    fn get(&self, name: &str, ctx: &mut Context) -> LiquidResult<Option<Value>> {
        if name != "super" || self.index + 1 >= self.versions.len() {
            return Ok(None);
        }
        let mut rendered = String::new();
        render_version(
            ctx,
            &self.name,
            Arc::clone(&self.versions),
            self.index + 1,
            &mut rendered,
        )?;
        Ok(Some(Value::Str(rendered)))
    }
}

// ============================================================================
// extends
// ============================================================================

#[derive(Debug)]
pub struct ExtendsTag {
    template_name: String,
    body: Vec<Node>,
}

pub fn parse_extends(
    _name: &str,
    markup: &str,
    tokens: &mut TokenStream,
    parser: &Parser,
) -> LiquidResult<Box<dyn Tag>> {
    let template_name = fragments(markup).into_iter().next().ok_or_else(|| {
        LiquidError::syntax(
            "Syntax Error in 'extends' tag - Valid syntax: extends [template]",
        )
    })?;
    // Everything after `extends` belongs to it.
    let body = parser.parse_document(tokens)?;
    Ok(Box::new(ExtendsTag {
        template_name,
        body,
    }))
}

impl ExtendsTag {
    /// The overrides map seen by the parent: the inherited map with this
    /// template's blocks appended.
    fn overrides(&self, inherited: Option<&BlockOverrides>) -> BlockOverrides {
        let mut overrides = inherited.cloned().unwrap_or_default();
        let mut seen = HashSet::new();
        for block in collect_blocks(&self.body) {
            if !seen.insert(block.name.as_str()) {
                continue;
            }
            let versions = overrides.entry(block.name.clone()).or_default();
            if !versions.iter().any(|v| Arc::ptr_eq(v, &block.body)) {
                versions.push(Arc::clone(&block.body));
            }
        }
        overrides
    }
}

impl Tag for ExtendsTag {
    fn name(&self) -> &str {
        "extends"
    }

    fn render(&self, ctx: &mut Context, out: &mut String) -> LiquidResult<RenderOutcome> {
        let name = ctx.resolve(&self.template_name)?.to_display(ctx.format());
        tracing::debug!(template = %name, "Extending template");
        let parent = load_template(ctx, &name)?;

        let previous = ctx.block_overrides.take();
        ctx.block_overrides = Some(Arc::new(self.overrides(previous.as_deref())));
        let result = ctx.stack(Hash::new(), |ctx| render_document(parent.root(), ctx, out));
        ctx.block_overrides = previous;
        result
    }

    fn children(&self) -> Vec<&[Node]> {
        vec![self.body.as_slice()]
    }

    fn as_extends(&self) -> Option<&ExtendsTag> {
        Some(self)
    }
}

/// `extends` may only be preceded by whitespace.
pub(crate) fn check_extends_position(nodes: &[Node]) -> LiquidResult<()> {
    let position = nodes
        .iter()
        .position(|node| node.as_tag().is_some_and(|tag| tag.as_extends().is_some()));
    let Some(position) = position else {
        return Ok(());
    };
    let preceded = nodes[..position].iter().any(|node| match node {
        Node::Text(text) => !text.trim().is_empty(),
        _ => true,
    });
    if preceded {
        return Err(LiquidError::syntax(
            "'extends' must be the first tag in a template",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_system::MemoryFileSystem;
    use crate::registry::Registry;
    use crate::template::{RenderParameters, Template};
    use pretty_assertions::assert_eq;

    fn registry(templates: &[(&str, &str)]) -> Arc<Registry> {
        let source = MemoryFileSystem::with_templates(templates.iter().copied());
        Arc::new(Registry::new().with_file_system(Arc::new(source)))
    }

    fn render(templates: &[(&str, &str)], source: &str) -> String {
        Template::parse_with(source, registry(templates))
            .unwrap()
            .render(&RenderParameters::new())
            .unwrap()
    }

    #[test]
    fn test_block_without_parent_renders_own_body() {
        assert_eq!(render(&[], "a{% block x %}b{% endblock %}c"), "abc");
    }

    #[test]
    fn test_extends_replaces_block() {
        let parent = ("parent", "<{% block x %}default{% endblock %}>");
        assert_eq!(
            render(&[parent], "{% extends 'parent' %}{% block x %}V{% endblock %}"),
            "<V>"
        );
    }

    #[test]
    fn test_unmatched_blocks_keep_default() {
        let parent = ("parent", "{% block a %}A{% endblock %}{% block b %}B{% endblock %}");
        assert_eq!(
            render(&[parent], "{% extends 'parent' %}{% block b %}b{% endblock %}"),
            "Ab"
        );
    }

    #[test]
    fn test_child_content_outside_blocks_is_dropped() {
        let parent = ("parent", "[{% block x %}{% endblock %}]");
        assert_eq!(
            render(&[parent], "{% extends 'parent' %}ignored{% block x %}V{% endblock %}ignored"),
            "[V]"
        );
    }

    #[test]
    fn test_block_super() {
        let parent = ("parent", "{% block x %}parent{% endblock %}");
        assert_eq!(
            render(
                &[parent],
                "{% extends 'parent' %}{% block x %}child+{{ block.super }}{% endblock %}"
            ),
            "child+parent"
        );
    }

    #[test]
    fn test_multi_level_super_chain() {
        let templates = [
            ("grandparent", "<{% block x %}gp{% endblock %}>"),
            ("parent", "{% extends 'grandparent' %}{% block x %}p({{ block.super }}){% endblock %}"),
        ];
        assert_eq!(
            render(
                &templates,
                "{% extends 'parent' %}{% block x %}c({{ block.super }}){% endblock %}"
            ),
            "<c(p(gp))>"
        );
    }

    #[test]
    fn test_middle_template_without_override() {
        let templates = [
            ("grandparent", "<{% block x %}gp{% endblock %}>"),
            ("parent", "{% extends 'grandparent' %}"),
        ];
        assert_eq!(
            render(&templates, "{% extends 'parent' %}{% block x %}c{% endblock %}"),
            "<c>"
        );
    }

    #[test]
    fn test_blocks_nested_in_other_tags_are_collected() {
        let parent = ("parent", "{% block x %}default{% endblock %}");
        assert_eq!(
            render(
                &[parent],
                "{% extends 'parent' %}{% if false %}{% block x %}found{% endblock %}{% endif %}"
            ),
            "found"
        );
    }

    #[test]
    fn test_nested_blocks() {
        let parent = (
            "parent",
            "{% block outer %}[{% block inner %}i{% endblock %}]{% endblock %}",
        );
        assert_eq!(
            render(&[parent], "{% extends 'parent' %}{% block inner %}I{% endblock %}"),
            "[I]"
        );
    }

    #[test]
    fn test_super_without_parent_is_empty() {
        assert_eq!(render(&[], "{% block x %}a{{ block.super }}b{% endblock %}"), "ab");
    }

    #[test]
    fn test_rendering_twice_is_identical() {
        let template = Template::parse_with(
            "{% extends 'parent' %}{% block x %}V{{ block.super }}{% endblock %}",
            registry(&[("parent", "{% block x %}P{% endblock %}")]),
        )
        .unwrap();
        let first = template.render(&RenderParameters::new()).unwrap();
        let second = template.render(&RenderParameters::new()).unwrap();
        assert_eq!(first, "VP");
        assert_eq!(first, second);
    }

    #[test]
    fn test_extends_must_come_first() {
        let result = Template::parse_with(
            "text{% extends 'parent' %}",
            registry(&[("parent", "")]),
        );
        assert!(matches!(result, Err(LiquidError::Syntax { .. })));
        assert!(
            Template::parse_with("  \n{% extends 'parent' %}", registry(&[("parent", "")])).is_ok()
        );
    }

    #[test]
    fn test_missing_parent_is_reported() {
        assert_eq!(
            render(&[], "{% extends 'missing' %}{% block x %}V{% endblock %}"),
            "Liquid error: No such template 'missing'"
        );
    }
}
