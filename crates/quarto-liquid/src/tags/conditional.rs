/*
 * tags/conditional.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `if`/`elsif`/`else` and `unless`.
//!
//! Each branch holds a condition and the nodes it renders. The first
//! branch whose condition holds is rendered; `else` always holds. `unless`
//! negates its first condition only. Conditions are evaluated quietly, so
//! testing an undefined variable is not reported as an error.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::condition::Condition;
use crate::context::Context;
use crate::error::{LiquidError, LiquidResult};
use crate::parser::{render_all, Node, Parser, RenderOutcome, Tag, TokenStream};
use crate::tags::QUOTED_FRAGMENT;
use crate::value::Hash;

static SYNTAX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?s)^\s*({qf})\s*(?:([=!<>a-zA-Z_]+)\s*({qf}))?\s*$",
        qf = QUOTED_FRAGMENT
    ))
    .unwrap()
});

#[derive(Debug)]
pub struct ConditionalTag {
    name: String,
    branches: Vec<(Condition, Vec<Node>)>,
}

/// Split condition markup on `and`/`or` keywords outside quotes.
fn split_logical(markup: &str) -> (Vec<String>, Vec<String>) {
    let mut expressions = Vec::new();
    let mut operators = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut word = String::new();
    let mut quote: Option<char> = None;

    let mut flush_word = |word: &mut String, current: &mut Vec<String>| {
        if word.is_empty() {
            return;
        }
        let taken = std::mem::take(word);
        if taken == "and" || taken == "or" {
            expressions.push(current.join(" "));
            current.clear();
            operators.push(taken);
        } else {
            current.push(taken);
        }
    };

    for c in markup.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                word.push(c);
            }
            (Some(_), c) => word.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                word.push(c);
            }
            (None, c) if c.is_whitespace() => flush_word(&mut word, &mut current),
            (None, c) => word.push(c),
        }
    }
    flush_word(&mut word, &mut current);
    expressions.push(current.join(" "));
    (expressions, operators)
}

/// Parse condition markup into a condition chain. Chains nest to the
/// right: `a or b and c` is `a or (b and c)`.
pub(crate) fn parse_condition(tag: &str, markup: &str) -> LiquidResult<Condition> {
    let syntax_error = || {
        LiquidError::syntax(format!(
            "Syntax Error in '{}' tag - Valid syntax: {} [expression]",
            tag, tag
        ))
    };

    let (expressions, operators) = split_logical(markup);
    let mut conditions = expressions
        .iter()
        .map(|expression| {
            let caps = SYNTAX.captures(expression).ok_or_else(syntax_error)?;
            Ok(Condition::from_parts(
                &caps[1],
                caps.get(2).map(|m| m.as_str()),
                caps.get(3).map(|m| m.as_str()),
            ))
        })
        .collect::<LiquidResult<Vec<_>>>()?;

    let mut condition = conditions.pop().ok_or_else(syntax_error)?;
    for (left, operator) in conditions.into_iter().zip(operators).rev() {
        condition = match operator.as_str() {
            "and" => left.and(condition),
            _ => left.or(condition),
        };
    }
    Ok(condition)
}

pub fn parse(
    name: &str,
    markup: &str,
    tokens: &mut TokenStream,
    parser: &Parser,
) -> LiquidResult<Box<dyn Tag>> {
    let mut branches = Vec::new();
    let mut current = parse_condition(name, markup)?;

    let body = parser.parse_block_with(tokens, name, &mut |tag, markup, nodes| {
        let next = match tag {
            "elsif" => parse_condition("elsif", markup)?,
            "else" => Condition::else_branch(),
            _ => return Ok(false),
        };
        let finished = std::mem::replace(&mut current, next);
        branches.push((finished, std::mem::take(nodes)));
        Ok(true)
    })?;
    branches.push((current, body));

    Ok(Box::new(ConditionalTag {
        name: name.to_string(),
        branches,
    }))
}

impl Tag for ConditionalTag {
    fn name(&self) -> &str {
        &self.name
    }

    fn render(&self, ctx: &mut Context, out: &mut String) -> LiquidResult<RenderOutcome> {
        let negate_first = self.name == "unless";
        ctx.stack(Hash::new(), |ctx| {
            for (index, (condition, nodes)) in self.branches.iter().enumerate() {
                let holds = ctx.quietly(|ctx| condition.evaluate(ctx))?;
                let holds = if index == 0 && negate_first { !holds } else { holds };
                if holds {
                    return render_all(nodes, ctx, out);
                }
            }
            Ok(RenderOutcome::Completed)
        })
    }

    fn children(&self) -> Vec<&[Node]> {
        self.branches.iter().map(|(_, nodes)| nodes.as_slice()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{RenderParameters, Template};
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn render(source: &str, assigns: &[(&str, Value)]) -> String {
        let locals: Hash = assigns.iter().map(|(k, v)| (*k, v.clone())).collect();
        Template::parse(source)
            .unwrap()
            .render(&RenderParameters::new().with_local_variables(locals))
            .unwrap()
    }

    // ========================================================================
    // Markup
    // ========================================================================

    #[test]
    fn test_split_logical() {
        let (expressions, operators) = split_logical("a == 'x and y' or b and c");
        assert_eq!(expressions, vec!["a == 'x and y'", "b", "c"]);
        assert_eq!(operators, vec!["or", "and"]);
    }

    #[test]
    fn test_invalid_condition() {
        assert!(Template::parse("{% if a == %}x{% endif %}").is_err());
        assert!(Template::parse("{% if %}x{% endif %}").is_err());
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    #[test]
    fn test_if() {
        let source = " {% if var %} YES {% endif %} ";
        assert_eq!(render(source, &[("var", Value::Bool(true))]), "  YES  ");
        assert_eq!(render(source, &[("var", Value::Bool(false))]), "  ");
        assert_eq!(render(source, &[]), "  ");
    }

    #[test]
    fn test_if_else() {
        assert_eq!(
            render("{% if false %} NO {% else %} YES {% endif %}", &[]),
            " YES "
        );
        assert_eq!(
            render("{% if 'foo' %} YES {% else %} NO {% endif %}", &[]),
            " YES "
        );
    }

    #[test]
    fn test_elsif() {
        let source = "{% if a == 1 %}one{% elsif a == 2 %}two{% else %}other{% endif %}";
        assert_eq!(render(source, &[("a", Value::Int(1))]), "one");
        assert_eq!(render(source, &[("a", Value::Int(2))]), "two");
        assert_eq!(render(source, &[("a", Value::Int(3))]), "other");
    }

    #[test]
    fn test_and_or_nest_to_the_right() {
        // true or (false and false)
        assert_eq!(
            render("{% if a or b and c %}yes{% else %}no{% endif %}", &[
                ("a", Value::Bool(true)),
                ("b", Value::Bool(false)),
                ("c", Value::Bool(false)),
            ]),
            "yes"
        );
        // false and (true or true)
        assert_eq!(
            render("{% if a and b or c %}yes{% else %}no{% endif %}", &[
                ("a", Value::Bool(false)),
                ("b", Value::Bool(true)),
                ("c", Value::Bool(true)),
            ]),
            "no"
        );
    }

    #[test]
    fn test_unless() {
        assert_eq!(render("{% unless true %} NO {% endunless %}", &[]), "");
        assert_eq!(render("{% unless false %} YES {% endunless %}", &[]), " YES ");
        assert_eq!(
            render("{% unless true %} NO {% else %} YES {% endunless %}", &[]),
            " YES "
        );
    }

    #[test]
    fn test_missing_variables_are_not_reported() {
        let template = Template::parse("{% if missing.deeply %}x{% endif %}").unwrap();
        template.render(&RenderParameters::new()).unwrap();
        assert!(template.errors().is_empty());
    }

    #[test]
    fn test_unknown_operator_is_reported_inline() {
        assert_eq!(
            render("{% if 1 =! 2 %}ok{% endif %}", &[]),
            "Liquid error: Unknown operator =!"
        );
    }
}
