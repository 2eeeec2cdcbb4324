/*
 * standard_filters.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The filters registered on every new registry.
//!
//! String filters render non-string inputs as text first and pass nil
//! through unchanged. Collection filters act on lists and return other
//! inputs unchanged.

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::condition::compare_values;
use crate::error::{LiquidError, LiquidResult};
use crate::format::{strftime, FormatProvider};
use crate::strainer::{Filter, FilterParam, FilterSet};
use crate::value::Value;

static NIL: Value = Value::Nil;

static HTML_BLOCKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script.*?</script>|<!--.*?-->|<style.*?</style>").unwrap()
});
static HTML_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<.*?>").unwrap());
static NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n").unwrap());
static ESCAPE_ONCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"&(?:[a-zA-Z]+|#\d+);|[<>"'&]"#).unwrap());

fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&NIL)
}

fn text(value: &Value) -> String {
    value.to_display(&FormatProvider::invariant())
}

fn count(value: &Value) -> usize {
    value
        .to_int()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0)
}

fn input() -> FilterParam {
    FilterParam::required("input")
}

/// A filter over the text of its input; nil passes through.
fn text_filter(name: &str, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Filter {
    Filter::new(name, vec![input()], move |args| match arg(args, 0) {
        Value::Nil => Ok(Value::Nil),
        value => Ok(Value::Str(f(&text(value)))),
    })
}

/// A filter over the text of its input and one text argument.
fn text_filter_with(
    name: &str,
    param: FilterParam,
    f: impl Fn(&str, &str) -> String + Send + Sync + 'static,
) -> Filter {
    Filter::new(name, vec![input(), param], move |args| match arg(args, 0) {
        Value::Nil => Ok(Value::Nil),
        value => Ok(Value::Str(f(&text(value), &text(arg(args, 1))))),
    })
}

/// A filter over list inputs; other inputs are returned unchanged.
fn list_filter(name: &str, f: impl Fn(Vec<Value>) -> Value + Send + Sync + 'static) -> Filter {
    Filter::new(name, vec![input()], move |args| match arg(args, 0) {
        Value::List(items) => Ok(f(items.to_vec())),
        other => Ok(other.clone()),
    })
}

// ============================================================================
// Strings
// ============================================================================

pub fn escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn escape_once(input: &str) -> String {
    ESCAPE_ONCE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let matched = &caps[0];
            if matched.len() > 1 {
                matched.to_string()
            } else {
                escape(matched)
            }
        })
        .into_owned()
}

fn capitalize(input: &str) -> String {
    let mut chars = input.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn truncate(input: &str, length: usize, ellipsis: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    if chars.len() <= length {
        return input.to_string();
    }
    let keep = length.saturating_sub(ellipsis.chars().count());
    let mut truncated: String = chars[..keep].iter().collect();
    truncated.push_str(ellipsis);
    truncated
}

fn truncate_words(input: &str, words: usize, ellipsis: &str) -> String {
    let all: Vec<&str> = input.split(' ').collect();
    let words = words.max(1);
    if all.len() <= words {
        return input.to_string();
    }
    format!("{}{}", all[..words].join(" "), ellipsis)
}

/// The half-open range selected by `slice`, or `None` when it is empty.
fn slice_range(len: usize, start: i64, length: i64) -> Option<(usize, usize)> {
    let len = i64::try_from(len).ok()?;
    let start = if start < 0 { start + len } else { start };
    if start < 0 || start >= len || length <= 0 {
        return None;
    }
    let end = start.saturating_add(length).min(len);
    Some((usize::try_from(start).ok()?, usize::try_from(end).ok()?))
}

fn slice(args: &[Value]) -> LiquidResult<Value> {
    let start = arg(args, 1)
        .to_int()
        .ok_or_else(|| LiquidError::argument("Filter 'slice' expects an integer start"))?;
    let length = arg(args, 2).to_int().unwrap_or(1);
    match arg(args, 0) {
        Value::Nil => Ok(Value::Nil),
        Value::List(items) => {
            let items = items.to_vec();
            Ok(match slice_range(items.len(), start, length) {
                Some((from, to)) => Value::list(items[from..to].iter().cloned()),
                None => Value::list([]),
            })
        }
        value => {
            let chars: Vec<char> = text(value).chars().collect();
            Ok(match slice_range(chars.len(), start, length) {
                Some((from, to)) => Value::Str(chars[from..to].iter().collect()),
                None => Value::str(""),
            })
        }
    }
}

// ============================================================================
// Collections
// ============================================================================

fn property(item: &Value, name: &str) -> Value {
    match item {
        Value::Map(hash) => hash.get(name).unwrap_or_default(),
        _ => Value::Nil,
    }
}

fn sort_key_order(a: &Value, b: &Value) -> Ordering {
    match (a.is_nil(), b.is_nil()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare_values(a, b).unwrap_or(Ordering::Equal),
    }
}

fn sort(args: &[Value]) -> LiquidResult<Value> {
    let Value::List(items) = arg(args, 0) else {
        return Ok(arg(args, 0).clone());
    };
    let mut items = items.to_vec();
    match arg(args, 1) {
        Value::Nil => items.sort_by(sort_key_order),
        key => {
            let key = text(key);
            items.sort_by(|a, b| sort_key_order(&property(a, &key), &property(b, &key)));
        }
    }
    Ok(Value::list(items))
}

fn uniq(items: Vec<Value>) -> Value {
    let mut unique: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.iter().any(|seen| seen.strict_eq(&item)) {
            unique.push(item);
        }
    }
    Value::list(unique)
}

// ============================================================================
// Numbers
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn of(value: &Value) -> Option<Number> {
        match value {
            Value::Nil => Some(Number::Int(0)),
            Value::Int(n) => Some(Number::Int(*n)),
            Value::Float(f) => Some(Number::Float(*f)),
            Value::Str(s) => {
                let s = s.trim();
                s.parse()
                    .map(Number::Int)
                    .ok()
                    .or_else(|| s.parse().map(Number::Float).ok())
            }
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(f) => f,
        }
    }
}

fn operands(name: &str, args: &[Value]) -> LiquidResult<(Number, Number)> {
    match (Number::of(arg(args, 0)), Number::of(arg(args, 1))) {
        (Some(left), Some(right)) => Ok((left, right)),
        _ => Err(LiquidError::argument(format!(
            "Filter '{}' expects numeric arguments",
            name
        ))),
    }
}

/// Integer arithmetic when both sides are integers, falling back to
/// floats on overflow or when either side is a float.
fn arithmetic(
    name: &str,
    args: &[Value],
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> LiquidResult<Value> {
    Ok(match operands(name, args)? {
        (Number::Int(a), Number::Int(b)) => match int_op(a, b) {
            Some(n) => Value::Int(n),
            None => Value::Float(float_op(a as f64, b as f64)),
        },
        (a, b) => Value::Float(float_op(a.as_f64(), b.as_f64())),
    })
}

fn division(
    name: &str,
    args: &[Value],
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> LiquidResult<Value> {
    let (left, right) = operands(name, args)?;
    if right.as_f64() == 0.0 {
        return Err(LiquidError::argument("divided by 0"));
    }
    match (left, right) {
        (Number::Int(a), Number::Int(b)) => int_op(a, b)
            .map(Value::Int)
            .ok_or_else(|| LiquidError::argument(format!("Filter '{}' overflowed", name))),
        (a, b) => Ok(Value::Float(float_op(a.as_f64(), b.as_f64()))),
    }
}

/// `plus` concatenates when the input is text that is not a number, or
/// when both sides are text.
fn plus(args: &[Value]) -> LiquidResult<Value> {
    match (arg(args, 0), arg(args, 1)) {
        (Value::Str(s), operand)
            if Number::of(arg(args, 0)).is_none() || matches!(operand, Value::Str(_)) =>
        {
            Ok(Value::Str(format!("{}{}", s, text(operand))))
        }
        _ => arithmetic("plus", args, i64::checked_add, |a, b| a + b),
    }
}

fn numeric(name: &'static str, f: fn(&[Value]) -> LiquidResult<Value>) -> Filter {
    Filter::new(name, vec![input(), FilterParam::required("operand")], f)
}

// ============================================================================
// Dates
// ============================================================================

fn to_datetime(value: &Value) -> Option<DateTime<FixedOffset>> {
    match value {
        Value::DateTime(dt) => Some(*dt),
        Value::Int(seconds) => DateTime::from_timestamp(*seconds, 0).map(|dt| dt.fixed_offset()),
        Value::Str(s) if s.eq_ignore_ascii_case("now") || s.eq_ignore_ascii_case("today") => {
            Some(Local::now().fixed_offset())
        }
        Value::Str(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                        .ok()
                        .map(|naive| naive.and_utc().fixed_offset())
                })
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|date| date.and_hms_opt(0, 0, 0))
                        .map(|naive| naive.and_utc().fixed_offset())
                })
        }
        _ => None,
    }
}

fn date_filter() -> Filter {
    Filter::with_context(
        "date",
        vec![input(), FilterParam::optional("format", Value::Nil)],
        |ctx, args| {
            let value = arg(args, 0);
            if value.is_nil() {
                return Ok(Value::Nil);
            }
            let Some(dt) = to_datetime(value) else {
                return Ok(value.clone());
            };
            let format = text(arg(args, 1));
            let formatted = if format.is_empty() {
                ctx.format().format_datetime(&dt)?
            } else {
                strftime(&dt, &format)?
            };
            Ok(Value::Str(formatted))
        },
    )
}

// ============================================================================
// Registration
// ============================================================================

/// Every standard filter.
pub fn standard_filters() -> FilterSet {
    FilterSet::new()
        // Strings
        .add(Filter::new("size", vec![input()], |args| {
            Ok(Value::from(match arg(args, 0) {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Map(hash) => hash.len(),
                _ => 0,
            }))
        }))
        .add(text_filter("downcase", str::to_lowercase))
        .add(text_filter("upcase", str::to_uppercase))
        .add(text_filter("capitalize", capitalize))
        .add(text_filter("escape", escape))
        .add(text_filter("escape_once", escape_once))
        .add(text_filter("strip_html", |s| {
            let without_blocks = HTML_BLOCKS.replace_all(s, "");
            HTML_TAGS.replace_all(&without_blocks, "").into_owned()
        }))
        .add(text_filter("strip_newlines", |s| NEWLINE.replace_all(s, "").into_owned()))
        .add(text_filter("newline_to_br", |s| {
            NEWLINE.replace_all(s, "<br />\n").into_owned()
        }))
        .add(text_filter("strip", |s| s.trim().to_string()))
        .add(text_filter("lstrip", |s| s.trim_start().to_string()))
        .add(text_filter("rstrip", |s| s.trim_end().to_string()))
        .add(Filter::new(
            "truncate",
            vec![
                input(),
                FilterParam::optional("length", 50),
                FilterParam::optional("truncate_string", "..."),
            ],
            |args| match arg(args, 0) {
                Value::Nil => Ok(Value::Nil),
                value => Ok(Value::Str(truncate(
                    &text(value),
                    count(arg(args, 1)),
                    &text(arg(args, 2)),
                ))),
            },
        ))
        .add(Filter::new(
            "truncatewords",
            vec![
                input(),
                FilterParam::optional("words", 15),
                FilterParam::optional("truncate_string", "..."),
            ],
            |args| match arg(args, 0) {
                Value::Nil => Ok(Value::Nil),
                value => Ok(Value::Str(truncate_words(
                    &text(value),
                    count(arg(args, 1)),
                    &text(arg(args, 2)),
                ))),
            },
        ))
        .add(Filter::new(
            "split",
            vec![input(), FilterParam::required("pattern")],
            |args| {
                let input = text(arg(args, 0));
                let pattern = text(arg(args, 1));
                let parts: Vec<Value> = if pattern.is_empty() {
                    input.chars().map(|c| Value::Str(c.to_string())).collect()
                } else {
                    input
                        .split(pattern.as_str())
                        .filter(|part| !part.is_empty())
                        .map(Value::str)
                        .collect()
                };
                Ok(Value::list(parts))
            },
        ))
        .add(text_filter_with("append", FilterParam::required("string"), |s, suffix| {
            format!("{}{}", s, suffix)
        }))
        .add(text_filter_with("prepend", FilterParam::required("string"), |s, prefix| {
            format!("{}{}", prefix, s)
        }))
        .add(text_filter_with("remove", FilterParam::required("string"), |s, pattern| {
            s.replace(pattern, "")
        }))
        .add(text_filter_with("remove_first", FilterParam::required("string"), |s, pattern| {
            s.replacen(pattern, "", 1)
        }))
        .add(Filter::new(
            "replace",
            vec![
                input(),
                FilterParam::required("string"),
                FilterParam::optional("replacement", ""),
            ],
            |args| match arg(args, 0) {
                Value::Nil => Ok(Value::Nil),
                value => Ok(Value::Str(
                    text(value).replace(&text(arg(args, 1)), &text(arg(args, 2))),
                )),
            },
        ))
        .add(Filter::new(
            "replace_first",
            vec![
                input(),
                FilterParam::required("string"),
                FilterParam::optional("replacement", ""),
            ],
            |args| match arg(args, 0) {
                Value::Nil => Ok(Value::Nil),
                value => Ok(Value::Str(text(value).replacen(
                    &text(arg(args, 1)),
                    &text(arg(args, 2)),
                    1,
                ))),
            },
        ))
        .add(Filter::new(
            "slice",
            vec![
                input(),
                FilterParam::required("start"),
                FilterParam::optional("length", 1),
            ],
            slice,
        ))
        // Collections
        .add(Filter::new(
            "join",
            vec![input(), FilterParam::optional("glue", " ")],
            |args| match arg(args, 0) {
                Value::List(items) => {
                    let glue = text(arg(args, 1));
                    let parts: Vec<String> = items.to_vec().iter().map(text).collect();
                    Ok(Value::Str(parts.join(&glue)))
                }
                other => Ok(other.clone()),
            },
        ))
        .add(Filter::new(
            "sort",
            vec![input(), FilterParam::optional("property", Value::Nil)],
            sort,
        ))
        .add(Filter::new(
            "map",
            vec![input(), FilterParam::required("property")],
            |args| match arg(args, 0) {
                Value::List(items) => {
                    let key = text(arg(args, 1));
                    Ok(Value::list(items.to_vec().iter().map(|item| property(item, &key))))
                }
                other => Ok(other.clone()),
            },
        ))
        .add(list_filter("reverse", |mut items| {
            items.reverse();
            Value::list(items)
        }))
        .add(list_filter("uniq", uniq))
        .add(Filter::new("first", vec![input()], |args| match arg(args, 0) {
            Value::List(items) => Ok(items.first().unwrap_or_default()),
            Value::Str(s) => Ok(s.chars().next().map(|c| Value::Str(c.to_string())).unwrap_or_default()),
            _ => Ok(Value::Nil),
        }))
        .add(Filter::new("last", vec![input()], |args| match arg(args, 0) {
            Value::List(items) => Ok(items.last().unwrap_or_default()),
            Value::Str(s) => Ok(s.chars().last().map(|c| Value::Str(c.to_string())).unwrap_or_default()),
            _ => Ok(Value::Nil),
        }))
        // Numbers
        .add(numeric("plus", plus))
        .add(numeric("minus", |args| {
            arithmetic("minus", args, i64::checked_sub, |a, b| a - b)
        }))
        .add(numeric("times", |args| {
            arithmetic("times", args, i64::checked_mul, |a, b| a * b)
        }))
        .add(numeric("divided_by", |args| {
            division("divided_by", args, i64::checked_div, |a, b| a / b)
        }))
        .add(numeric("modulo", |args| {
            division("modulo", args, i64::checked_rem, |a, b| a % b)
        }))
        // Defaults and dates
        .add(Filter::new(
            "default",
            vec![input(), FilterParam::required("default")],
            |args| {
                let value = arg(args, 0);
                let missing = matches!(value, Value::Nil | Value::Bool(false))
                    || value.is_empty_collection();
                Ok(if missing { arg(args, 1).clone() } else { value.clone() })
            },
        ))
        .add(date_filter())
}
