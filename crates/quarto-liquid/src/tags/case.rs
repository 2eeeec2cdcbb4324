/*
 * tags/case.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `{% case x %}{% when 1, 2 or 3 %}...{% else %}...{% endcase %}`
//!
//! Every `when` whose value list contains a match renders, in order. An
//! `else` renders only if no `when` before it matched, and ends the tag.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::condition::Condition;
use crate::context::Context;
use crate::error::{LiquidError, LiquidResult};
use crate::parser::{render_all, Node, Parser, RenderOutcome, Tag, TokenStream};
use crate::tags::{fragments, QUOTED_FRAGMENT};
use crate::value::Hash;

static SYNTAX: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?s)^\s*({})", QUOTED_FRAGMENT)).unwrap());

#[derive(Debug)]
enum Branch {
    When(Vec<String>),
    Else,
}

#[derive(Debug)]
pub struct CaseTag {
    left: String,
    branches: Vec<(Branch, Vec<Node>)>,
}

fn when_values(markup: &str) -> LiquidResult<Vec<String>> {
    let values: Vec<String> = fragments(markup)
        .into_iter()
        .filter(|fragment| fragment != "or")
        .collect();
    if values.is_empty() {
        return Err(LiquidError::syntax(
            "Syntax Error in 'case' tag - Valid when condition: {% when [condition] [or condition2...] %}",
        ));
    }
    Ok(values)
}

pub fn parse(
    _name: &str,
    markup: &str,
    tokens: &mut TokenStream,
    parser: &Parser,
) -> LiquidResult<Box<dyn Tag>> {
    let left = SYNTAX
        .captures(markup)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| {
            LiquidError::syntax("Syntax Error in 'case' - Valid syntax: case [condition]")
        })?;

    let mut branches = Vec::new();
    // Nodes before the first `when` are dropped.
    let mut current: Option<Branch> = None;

    let body = parser.parse_block_with(tokens, "case", &mut |tag, markup, nodes| {
        let next = match tag {
            "when" => Branch::When(when_values(markup)?),
            "else" if markup.trim().is_empty() => Branch::Else,
            "else" => {
                return Err(LiquidError::syntax(
                    "Syntax Error in 'case' tag - Valid else condition: {% else %} (no parameters)",
                ));
            }
            _ => return Ok(false),
        };
        let nodes = std::mem::take(nodes);
        if let Some(finished) = current.replace(next) {
            branches.push((finished, nodes));
        }
        Ok(true)
    })?;
    if let Some(finished) = current {
        branches.push((finished, body));
    }

    Ok(Box::new(CaseTag { left, branches }))
}

impl Tag for CaseTag {
    fn name(&self) -> &str {
        "case"
    }

    fn render(&self, ctx: &mut Context, out: &mut String) -> LiquidResult<RenderOutcome> {
        ctx.stack(Hash::new(), |ctx| {
            let mut matched = false;
            for (branch, nodes) in &self.branches {
                match branch {
                    Branch::Else if !matched => return render_all(nodes, ctx, out),
                    Branch::Else => {}
                    Branch::When(values) => {
                        let mut holds = false;
                        for value in values {
                            if Condition::new(self.left.as_str(), "==", value.as_str()).evaluate(ctx)? {
                                holds = true;
                                break;
                            }
                        }
                        if holds {
                            matched = true;
                            let outcome = render_all(nodes, ctx, out)?;
                            if outcome != RenderOutcome::Completed {
                                return Ok(outcome);
                            }
                        }
                    }
                }
            }
            Ok(RenderOutcome::Completed)
        })
    }

    fn children(&self) -> Vec<&[Node]> {
        self.branches.iter().map(|(_, nodes)| nodes.as_slice()).collect()
    }
}
