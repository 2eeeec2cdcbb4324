/*
 * tags/tablerow.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `{% tablerow item in collection cols: n [limit: n] [offset: n] %}`
//!
//! Renders HTML table rows, `cols` cells per row. Inside the body
//! `tablerowloop` exposes the loop position and the column position.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::Context;
use crate::error::{LiquidError, LiquidResult};
use crate::parser::{render_all, Node, Parser, RenderOutcome, Tag, TokenStream};
use crate::tags::{attributes, int_attribute, QUOTED_FRAGMENT};
use crate::value::{Hash, Value};

static SYNTAX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?s)^\s*(\w+)\s+in\s+((?:{})+)", QUOTED_FRAGMENT)).unwrap()
});

#[derive(Debug)]
pub struct TableRowTag {
    variable: String,
    collection: String,
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
            "Syntax Error in 'tablerow loop' - Valid syntax: tablerow [item] in [collection] cols=3",
        )
    })?;
    Ok(Box::new(TableRowTag {
        variable: caps[1].to_string(),
        collection: caps[2].to_string(),
        attributes: attributes(markup),
        body: parser.parse_block(tokens, "tablerow")?,
    }))
}

fn count(n: Option<i64>) -> Option<usize> {
    n.map(|n| usize::try_from(n).unwrap_or(0))
}

impl Tag for TableRowTag {
    fn name(&self) -> &str {
        "tablerow"
    }

    fn render(&self, ctx: &mut Context, out: &mut String) -> LiquidResult<RenderOutcome> {
        let collection = ctx.resolve(&self.collection)?;
        let Some(items) = collection.iter_values() else {
            return Ok(RenderOutcome::Completed);
        };

        let offset = count(int_attribute(ctx, &self.attributes, "offset")?).unwrap_or(0);
        let limit = count(int_attribute(ctx, &self.attributes, "limit")?).unwrap_or(usize::MAX);
        let items: Vec<Value> = items.into_iter().skip(offset).take(limit).collect();
        let cols = count(int_attribute(ctx, &self.attributes, "cols")?).unwrap_or(0);

        let length = items.len();
        let mut row = 1;
        let mut col = 0;
        out.push_str("<tr class=\"row1\">\n");

        let max_iterations = ctx.max_iterations();
        ctx.stack(Hash::new(), |ctx| {
            for (index, item) in items.into_iter().enumerate() {
                if max_iterations > 0 && index >= max_iterations {
                    tracing::warn!(max_iterations, "Table row loop aborted by the iteration bound");
                    return Err(LiquidError::MaximumIterationsExceeded { max_iterations });
                }
                ctx.check_timeout()?;
                ctx.set(self.variable.as_str(), item);
                let tablerowloop: Hash = [
                    ("length", Value::from(length)),
                    ("index", Value::from(index + 1)),
                    ("index0", Value::from(index)),
                    ("col", Value::from(col + 1)),
                    ("col0", Value::from(col)),
                    ("rindex", Value::from(length - index)),
                    ("rindex0", Value::from(length - index - 1)),
                    ("first", Value::Bool(index == 0)),
                    ("last", Value::Bool(index == length - 1)),
                    ("col_first", Value::Bool(col == 0)),
                    ("col_last", Value::Bool(cols > 0 && col == cols - 1)),
                ]
                .into_iter()
                .collect();
                ctx.set("tablerowloop", tablerowloop);

                col += 1;
                let mut cell = String::new();
                let outcome = render_all(&self.body, ctx, &mut cell)?;
                out.push_str(&format!("<td class=\"col{}\">{}</td>", col, cell));
                if outcome == RenderOutcome::Break {
                    break;
                }

                if col == cols && index != length - 1 {
                    col = 0;
                    row += 1;
                    out.push_str(&format!("</tr>\n<tr class=\"row{}\">", row));
                }
            }
            Ok(())
        })?;

        out.push_str("</tr>\n");
        Ok(RenderOutcome::Completed)
    }

    fn children(&self) -> Vec<&[Node]> {
        vec![self.body.as_slice()]
    }
}
