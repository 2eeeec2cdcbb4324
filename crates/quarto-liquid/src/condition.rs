/*
 * condition.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Condition evaluation for `if`, `unless` and `case`.
//!
//! A [`Condition`] compares two markup keys with a named operator. Both
//! keys are resolved at evaluation time. Conditions chain with `and`/`or`
//! onto a trailing condition.
//!
//! Ordering operators convert the right operand to the type of the left
//! operand before comparing, so `"10" < 9` compares strings while
//! `10 < "9"` compares integers.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime};
use indexmap::IndexMap;

use crate::context::Context;
use crate::error::{LiquidError, LiquidResult};
use crate::naming::NamingConvention;
use crate::value::Value;

/// A marker produced by the `empty` and `blank` keywords. Comparing a
/// value against it tests whether the value is an empty collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Empty,
}

impl Symbol {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Symbol::Empty => value.is_empty_collection(),
        }
    }
}

/// A resolved condition operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    Symbol(Symbol),
}

impl Operand {
    /// The operand as a plain value; symbols are nil.
    pub fn value(&self) -> Value {
        match self {
            Operand::Value(v) => v.clone(),
            Operand::Symbol(_) => Value::Nil,
        }
    }

    fn resolve(ctx: &mut Context, markup: &str) -> LiquidResult<Operand> {
        match markup {
            "empty" | "blank" => Ok(Operand::Symbol(Symbol::Empty)),
            _ => Ok(Operand::Value(ctx.resolve(markup)?)),
        }
    }
}

/// An operator implementation.
pub type OperatorFn = Arc<dyn Fn(&Operand, &Operand) -> LiquidResult<bool> + Send + Sync>;

/// The operator table, in registration order.
#[derive(Clone)]
pub struct Operators {
    table: IndexMap<String, OperatorFn>,
}

impl fmt::Debug for Operators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.table.keys()).finish()
    }
}

impl Default for Operators {
    fn default() -> Self {
        Self::standard()
    }
}

impl Operators {
    pub fn empty() -> Self {
        Operators {
            table: IndexMap::new(),
        }
    }

    /// The built-in operators.
    pub fn standard() -> Self {
        let mut ops = Self::empty();
        ops.register("==", |l, r| Ok(equal_operands(l, r)));
        ops.register("!=", |l, r| Ok(!equal_operands(l, r)));
        ops.register("<>", |l, r| Ok(!equal_operands(l, r)));
        ops.register("<", |l, r| ordered(l, r, Ordering::is_lt));
        ops.register(">", |l, r| ordered(l, r, Ordering::is_gt));
        ops.register("<=", |l, r| ordered(l, r, Ordering::is_le));
        ops.register(">=", |l, r| ordered(l, r, Ordering::is_ge));
        ops.register_values("contains", contains);
        ops.register_values("startsWith", |l, r| match l {
            Value::List(a) => a.first().is_some_and(|first| equal_values(&first, r)),
            Value::Str(s) => r.as_str().is_some_and(|prefix| s.starts_with(prefix)),
            _ => false,
        });
        ops.register_values("endsWith", |l, r| match l {
            Value::List(a) => a.last().is_some_and(|last| equal_values(&last, r)),
            Value::Str(s) => r.as_str().is_some_and(|suffix| s.ends_with(suffix)),
            _ => false,
        });
        ops.register_values("hasKey", |l, r| match (l, r) {
            (Value::Map(h), Value::Str(key)) => h.contains_key(key),
            _ => false,
        });
        ops.register_values("hasValue", |l, r| match l {
            Value::Map(h) => h.values().iter().any(|v| v.strict_eq(r)),
            _ => false,
        });
        ops
    }

    /// Register `name`, replacing an operator of the same name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&Operand, &Operand) -> LiquidResult<bool> + Send + Sync + 'static,
    ) {
        self.table.insert(name.into(), Arc::new(f));
    }

    /// Register an operator over plain values. `empty`/`blank` operands
    /// arrive as nil.
    pub fn register_values(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    ) {
        self.register(name, move |l, r| Ok(f(&l.value(), &r.value())));
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.table.shift_remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    /// Find the operator written as `op`: an exact name match, then a
    /// lowercase match, then the naming convention's rule.
    pub fn find(&self, op: &str, naming: &dyn NamingConvention) -> Option<OperatorFn> {
        if let Some(f) = self.table.get(op) {
            return Some(Arc::clone(f));
        }
        self.table
            .iter()
            .find(|(name, _)| name.to_lowercase() == op)
            .or_else(|| {
                self.table
                    .iter()
                    .find(|(name, _)| naming.operator_equals(name, op))
            })
            .map(|(_, f)| Arc::clone(f))
    }
}

/// Equality honoring `empty`/`blank` markers.
pub fn equal_operands(left: &Operand, right: &Operand) -> bool {
    match (left, right) {
        (Operand::Symbol(s), other) | (other, Operand::Symbol(s)) => s.matches(&other.value()),
        (Operand::Value(l), Operand::Value(r)) => equal_values(l, r),
    }
}

/// Equality converting the right value to the left value's type when the
/// types differ.
pub fn equal_values(left: &Value, right: &Value) -> bool {
    if left.is_nil() || right.is_nil() {
        return left.is_nil() && right.is_nil();
    }
    match convert_like(right, left) {
        Some(converted) => *left == converted,
        None => left == right,
    }
}

fn contains(left: &Value, right: &Value) -> bool {
    if right.is_nil() {
        return false;
    }
    match left {
        Value::List(a) => a.to_vec().iter().any(|item| item.strict_eq(right)),
        Value::Str(s) => right.as_str().is_some_and(|needle| s.contains(needle)),
        _ => false,
    }
}

fn ordered(
    left: &Operand,
    right: &Operand,
    accept: impl Fn(Ordering) -> bool,
) -> LiquidResult<bool> {
    let (left, right) = (left.value(), right.value());
    if left.is_nil() || right.is_nil() {
        return Ok(false);
    }
    compare_values(&left, &right).map(accept)
}

/// Total order over same-typed values after converting `right` to the
/// type of `left`.
pub fn compare_values(left: &Value, right: &Value) -> LiquidResult<Ordering> {
    let incomparable = || {
        LiquidError::argument(format!(
            "Cannot compare {} with {}",
            left.type_name(),
            right.type_name()
        ))
    };
    let right = convert_like(right, left).ok_or_else(incomparable)?;
    match (left, &right) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b).ok_or_else(incomparable),
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Ok(a.cmp(b)),
        _ => Err(incomparable()),
    }
}

/// Convert `value` to the type of `like`. Same-typed values convert to
/// themselves; `None` means no conversion exists.
fn convert_like(value: &Value, like: &Value) -> Option<Value> {
    match (like, value) {
        (Value::Int(_), Value::Int(_))
        | (Value::Float(_), Value::Float(_))
        | (Value::Str(_), Value::Str(_))
        | (Value::Bool(_), Value::Bool(_))
        | (Value::DateTime(_), Value::DateTime(_)) => Some(value.clone()),

        (Value::Int(_), Value::Float(f)) => Some(Value::Int(f.round_ties_even() as i64)),
        (Value::Int(_), Value::Str(s)) => s.trim().parse().ok().map(Value::Int),
        (Value::Int(_), Value::Bool(b)) => Some(Value::Int(i64::from(*b))),

        (Value::Float(_), Value::Int(n)) => Some(Value::Float(*n as f64)),
        (Value::Float(_), Value::Str(s)) => s.trim().parse().ok().map(Value::Float),
        (Value::Float(_), Value::Bool(b)) => Some(Value::Float(if *b { 1.0 } else { 0.0 })),

        (Value::Str(_), Value::Int(n)) => Some(Value::Str(n.to_string())),
        (Value::Str(_), Value::Float(f)) => Some(Value::Str(f.to_string())),
        (Value::Str(_), Value::Bool(b)) => Some(Value::Str(b.to_string())),
        (Value::Str(_), Value::DateTime(dt)) => Some(Value::Str(dt.to_rfc3339())),

        (Value::Bool(_), Value::Str(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        (Value::Bool(_), Value::Int(n)) => Some(Value::Bool(*n != 0)),
        (Value::Bool(_), Value::Float(f)) => Some(Value::Bool(*f != 0.0)),

        (Value::DateTime(_), Value::Str(s)) => parse_datetime(s).map(Value::DateTime),

        _ => None,
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<chrono::FixedOffset>> {
    DateTime::parse_from_rfc3339(s.trim()).ok().or_else(|| {
        NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc().fixed_offset())
    })
}

/// How a chained condition combines with its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    And,
    Or,
}

/// A comparison between two markup keys, optionally chained.
#[derive(Debug, Clone, Default)]
pub struct Condition {
    left: Option<String>,
    operator: Option<String>,
    right: Option<String>,
    child: Option<(Relation, Box<Condition>)>,
    is_else: bool,
}

impl Condition {
    pub fn new(left: impl Into<String>, operator: impl Into<String>, right: impl Into<String>) -> Self {
        Condition {
            left: Some(left.into()),
            operator: Some(operator.into()),
            right: Some(right.into()),
            ..Self::default()
        }
    }

    /// A condition testing the truthiness of `left`.
    pub fn truthy(left: impl Into<String>) -> Self {
        Condition {
            left: Some(left.into()),
            ..Self::default()
        }
    }

    /// The `else` branch of a conditional: always true.
    pub fn else_branch() -> Self {
        Condition {
            is_else: true,
            ..Self::default()
        }
    }

    pub(crate) fn from_parts(left: &str, operator: Option<&str>, right: Option<&str>) -> Self {
        Condition {
            left: Some(left.to_string()),
            operator: operator.map(str::to_string),
            right: right.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn is_else(&self) -> bool {
        self.is_else
    }

    /// Chain `other` with a logical or. Replaces any existing chain.
    pub fn or(mut self, other: Condition) -> Self {
        self.child = Some((Relation::Or, Box::new(other)));
        self
    }

    /// Chain `other` with a logical and. Replaces any existing chain.
    pub fn and(mut self, other: Condition) -> Self {
        self.child = Some((Relation::And, Box::new(other)));
        self
    }

    pub fn evaluate(&self, ctx: &mut Context) -> LiquidResult<bool> {
        if self.is_else {
            return Ok(true);
        }
        let result = self.interpret(ctx)?;
        match &self.child {
            None => Ok(result),
            Some((Relation::Or, child)) => Ok(result || child.evaluate(ctx)?),
            Some((Relation::And, child)) => Ok(result && child.evaluate(ctx)?),
        }
    }

    fn interpret(&self, ctx: &mut Context) -> LiquidResult<bool> {
        let left = self.left.as_deref().unwrap_or("");
        let Some(op) = self.operator.as_deref() else {
            return Ok(ctx.resolve_quiet(left)?.is_truthy());
        };

        let left = Operand::resolve(ctx, left)?;
        let right = Operand::resolve(ctx, self.right.as_deref().unwrap_or(""))?;

        let registry = Arc::clone(ctx.registry());
        let f = registry
            .find_operator(op)
            .ok_or_else(|| LiquidError::UnknownOperator {
                operator: op.to_string(),
            })?;
        tracing::trace!(operator = op, "Evaluating condition");
        f(&left, &right)
    }
}
