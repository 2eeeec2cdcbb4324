/*
 * tags/ifchanged.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `{% ifchanged %}...{% endifchanged %}` renders its body only when the
//! result differs from the previous rendering of any `ifchanged` block.

use crate::context::Context;
use crate::error::LiquidResult;
use crate::parser::{render_all, Node, Parser, RenderOutcome, Tag, TokenStream};
use crate::value::{Hash, Value};

const LAST_RENDERED: &str = "last";

#[derive(Debug)]
pub struct IfChangedTag {
    body: Vec<Node>,
}

pub fn parse(
    _name: &str,
    _markup: &str,
    tokens: &mut TokenStream,
    parser: &Parser,
) -> LiquidResult<Box<dyn Tag>> {
    Ok(Box::new(IfChangedTag {
        body: parser.parse_block(tokens, "ifchanged")?,
    }))
}

impl Tag for IfChangedTag {
    fn name(&self) -> &str {
        "ifchanged"
    }

    fn render(&self, ctx: &mut Context, out: &mut String) -> LiquidResult<RenderOutcome> {
        let register = ctx.register("ifchanged");
        ctx.stack(Hash::new(), |ctx| {
            let mut rendered = String::new();
            let outcome = render_all(&self.body, ctx, &mut rendered)?;
            let previous = register.get(LAST_RENDERED);
            if previous.as_ref().and_then(Value::as_str) != Some(rendered.as_str()) {
                out.push_str(&rendered);
                register.insert(LAST_RENDERED, Value::Str(rendered));
            }
            Ok(outcome)
        })
    }

    fn children(&self) -> Vec<&[Node]> {
        vec![self.body.as_slice()]
    }
}
