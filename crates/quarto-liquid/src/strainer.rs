/*
 * strainer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Filter registration and dispatch.
//!
//! A [`Filter`] is a named callable with declared parameters. The first
//! parameter receives the value flowing through the pipeline; trailing
//! parameters may carry defaults. Several filters may share a name, in
//! which case dispatch picks the candidate whose parameter count matches
//! the supplied arguments, falling back to the candidate with the most
//! parameters.
//!
//! Filters are grouped in a [`FilterSet`]. Adding a set to a table first
//! removes every existing filter with a name the set defines, so a later
//! set replaces an earlier one name by name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{LiquidError, LiquidResult};
use crate::naming::NamingConvention;
use crate::value::Value;

type PlainFn = dyn Fn(&[Value]) -> LiquidResult<Value> + Send + Sync;
type ContextualFn = dyn Fn(&mut Context, &[Value]) -> LiquidResult<Value> + Send + Sync;

#[derive(Clone)]
enum FilterBody {
    Plain(Arc<PlainFn>),
    /// Receives the active render context ahead of its arguments.
    Contextual(Arc<ContextualFn>),
}

/// A declared filter parameter.
#[derive(Debug, Clone)]
pub struct FilterParam {
    pub name: String,
    pub default: Option<Value>,
}

impl FilterParam {
    pub fn required(name: impl Into<String>) -> Self {
        FilterParam {
            name: name.into(),
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, default: impl Into<Value>) -> Self {
        FilterParam {
            name: name.into(),
            default: Some(default.into()),
        }
    }
}

/// A named filter callable.
#[derive(Clone)]
pub struct Filter {
    name: String,
    params: Vec<FilterParam>,
    body: FilterBody,
}

impl Filter {
    /// A filter over its arguments only. `params` includes the input.
    pub fn new(
        name: impl Into<String>,
        params: Vec<FilterParam>,
        f: impl Fn(&[Value]) -> LiquidResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Filter {
            name: name.into(),
            params,
            body: FilterBody::Plain(Arc::new(f)),
        }
    }

    /// A filter that also receives the active context. The context is not
    /// counted as a parameter.
    pub fn with_context(
        name: impl Into<String>,
        params: Vec<FilterParam>,
        f: impl Fn(&mut Context, &[Value]) -> LiquidResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Filter {
            name: name.into(),
            params,
            body: FilterBody::Contextual(Arc::new(f)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn takes_context(&self) -> bool {
        matches!(self.body, FilterBody::Contextual(_))
    }

    fn call(&self, ctx: &mut Context, args: &[Value]) -> LiquidResult<Value> {
        match &self.body {
            FilterBody::Plain(f) => f(args),
            FilterBody::Contextual(f) => f(ctx, args),
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("takes_context", &self.takes_context())
            .finish()
    }
}

/// A group of filters registered together.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: Vec<Filter>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn push(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

/// Filters by template name.
#[derive(Debug, Clone, Default)]
pub struct FilterTable {
    by_name: HashMap<String, Vec<Filter>>,
}

impl FilterTable {
    /// Add `set`, replacing every existing filter whose name it defines.
    pub fn extend(&mut self, set: &FilterSet, naming: &dyn NamingConvention) {
        let names: Vec<String> = set
            .filters
            .iter()
            .map(|f| naming.member_name(&f.name))
            .collect();
        for name in &names {
            self.by_name.remove(name);
        }
        for (name, filter) in names.into_iter().zip(&set.filters) {
            self.by_name.entry(name).or_default().push(filter.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&[Filter]> {
        self.by_name.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }
}

/// The filters available to one render: the global table with the
/// render's local sets applied on top.
#[derive(Debug, Clone, Default)]
pub struct Strainer {
    table: FilterTable,
}

impl Strainer {
    pub fn new(table: FilterTable) -> Self {
        Strainer { table }
    }

    pub fn extend(&mut self, set: &FilterSet, naming: &dyn NamingConvention) {
        self.table.extend(set, naming);
    }

    pub fn responds_to(&self, name: &str) -> bool {
        self.table.contains(name)
    }

    pub fn candidates(&self, name: &str) -> Option<Vec<Filter>> {
        self.table.get(name).map(<[Filter]>::to_vec)
    }

    /// Call the best candidate for `args`, filling trailing defaults.
    pub fn dispatch(
        ctx: &mut Context,
        name: &str,
        candidates: &[Filter],
        mut args: Vec<Value>,
    ) -> LiquidResult<Value> {
        let chosen = candidates
            .iter()
            .find(|f| f.arity() == args.len())
            .or_else(|| {
                candidates
                    .iter()
                    .fold(None, |best: Option<&Filter>, f| match best {
                        Some(b) if b.arity() >= f.arity() => Some(b),
                        _ => Some(f),
                    })
            })
            .ok_or_else(|| LiquidError::argument(format!("Filter '{}' has no definition", name)))?;

        if args.len() > chosen.arity() {
            return Err(LiquidError::argument(format!(
                "Filter '{}' expects at most {} arguments but {} were supplied",
                name,
                chosen.arity(),
                args.len()
            )));
        }

        for param in &chosen.params[args.len()..] {
            match &param.default {
                Some(default) => args.push(default.clone()),
                None => {
                    return Err(LiquidError::argument(format!(
                        "Filter '{}' does not have a default value for '{}' and no value was supplied",
                        name, param.name
                    )));
                }
            }
        }

        tracing::trace!(filter = name, args = args.len(), "Dispatching filter");
        chosen.call(ctx, &args)
    }
}
