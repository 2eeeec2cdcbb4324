/*
 * context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The render context: scoped variable resolution.
//!
//! A [`Context`] owns the scope stack, the environment maps supplied at
//! render start, the registers used by stateful tags, the errors
//! recorded so far, and the limits of the current render.
//!
//! Resolution of a markup key follows these rules, in order:
//!
//! 1. `nil`, `null` and the empty string are nil.
//! 2. `true` and `false` are booleans.
//! 3. `'...'` and `"..."` are string literals.
//! 4. Integer literals, then inclusive ranges `(a..b)`, then float literals.
//! 5. Anything else is a variable path such as `product.variants[0].title`.
//!
//! Variable paths look up their first segment in the scope stack (nearest
//! first), then in the environments. Each further segment is a map key, a
//! list index, a drop member, or one of the `size`/`first`/`last` keywords.

use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ErrorsOutputMode, LiquidError, LiquidResult};
use crate::format::FormatProvider;
use crate::registry::Registry;
use crate::strainer::{FilterSet, Strainer};
use crate::tags::inheritance::BlockOverrides;
use crate::value::{Array, Hash, Value};

/// Default bound on the number of scopes pushed on top of the outermost one.
pub const DEFAULT_MAX_DEPTH: usize = 80;

static SINGLE_QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^'(.*)'$").unwrap());
static DOUBLE_QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?s)^"(.*)"$"#).unwrap());
static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([+-]?\d+)$").unwrap());
static RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\((\S+)\.\.(\S+)\)$").unwrap());
static FLOAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([+-]?\d[\d\.|,]+)$").unwrap());
static VARIABLE_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]+\]|[\w\-]+\??").unwrap());

fn bracket_inner(segment: &str) -> Option<&str> {
    segment.strip_prefix('[')?.strip_suffix(']')
}

/// State for a single render.
pub struct Context {
    registry: Arc<Registry>,
    /// Outermost first; the last entry is the nearest scope.
    scopes: Vec<Hash>,
    environments: Vec<Hash>,
    registers: Hash,
    errors: Vec<LiquidError>,
    errors_output_mode: ErrorsOutputMode,
    max_depth: usize,
    max_iterations: usize,
    timeout: Option<Duration>,
    started: Instant,
    format: FormatProvider,
    strainer: Strainer,
    quiet: usize,
    pub(crate) block_overrides: Option<Arc<BlockOverrides>>,
}

impl Context {
    /// Create a context with one empty scope and the registry's global
    /// filters.
    pub fn new(registry: Arc<Registry>) -> Self {
        let strainer = Strainer::new(registry.filter_table());
        Context {
            registry,
            scopes: vec![Hash::new()],
            environments: Vec::new(),
            registers: Hash::new(),
            errors: Vec::new(),
            errors_output_mode: ErrorsOutputMode::default(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_iterations: 0,
            timeout: None,
            started: Instant::now(),
            format: FormatProvider::default(),
            strainer,
            quiet: 0,
            block_overrides: None,
        }
    }

    /// Set the read-only environments, consulted after the scope stack.
    pub fn with_environments(mut self, environments: Vec<Hash>) -> Self {
        self.environments = environments;
        self
    }

    /// Replace the outermost scope.
    pub fn with_outer_scope(mut self, scope: Hash) -> Self {
        self.scopes = vec![scope];
        self
    }

    pub fn with_registers(mut self, registers: Hash) -> Self {
        self.registers = registers;
        self
    }

    pub fn with_errors_output_mode(mut self, mode: ErrorsOutputMode) -> Self {
        self.errors_output_mode = mode;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Bound the iterations of each loop; 0 disables the bound.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Bound the wall-clock time of the render; zero disables the bound.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self.started = Instant::now();
        self
    }

    pub fn with_format(mut self, format: FormatProvider) -> Self {
        self.format = format;
        self
    }

    /// Add render-local filters. A local filter replaces every global
    /// filter of the same name.
    pub fn with_filters(mut self, sets: &[FilterSet]) -> Self {
        for set in sets {
            self.strainer.extend(set, self.registry.naming());
        }
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn format(&self) -> &FormatProvider {
        &self.format
    }

    pub fn errors(&self) -> &[LiquidError] {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<LiquidError> {
        std::mem::take(&mut self.errors)
    }

    pub fn errors_output_mode(&self) -> ErrorsOutputMode {
        self.errors_output_mode
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn registers(&self) -> &Hash {
        &self.registers
    }

    /// The map stored under `name` in the registers, created on first use.
    pub fn register(&self, name: &str) -> Hash {
        if let Some(Value::Map(hash)) = self.registers.get(name) {
            return hash;
        }
        let hash = Hash::new();
        self.registers.insert(name, hash.clone());
        hash
    }

    // ------------------------------------------------------------------
    // Scope stack
    // ------------------------------------------------------------------

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    pub fn innermost_scope(&self) -> &Hash {
        // The stack is never empty: pop refuses to remove the last scope.
        &self.scopes[self.scopes.len() - 1]
    }

    pub fn outermost_scope(&self) -> &Hash {
        &self.scopes[0]
    }

    /// Push a new nearest scope.
    pub fn push(&mut self, scope: Hash) -> LiquidResult<()> {
        if self.scopes.len() > self.max_depth {
            return Err(LiquidError::StackLevel {
                max_depth: self.max_depth,
            });
        }
        self.scopes.push(scope);
        Ok(())
    }

    /// Pop the nearest scope.
    pub fn pop(&mut self) -> LiquidResult<Hash> {
        if self.scopes.len() <= 1 {
            return Err(LiquidError::Context {
                message: "Cannot pop the outermost scope".to_string(),
            });
        }
        self.scopes.pop().ok_or_else(|| LiquidError::Context {
            message: "Scope stack is empty".to_string(),
        })
    }

    /// Run `f` with `scope` pushed, popping it afterwards even on error.
    pub fn stack<T>(
        &mut self,
        scope: Hash,
        f: impl FnOnce(&mut Self) -> LiquidResult<T>,
    ) -> LiquidResult<T> {
        self.push(scope)?;
        let result = f(self);
        self.scopes.pop();
        result
    }

    /// Merge `values` into the nearest scope, overwriting keys.
    pub fn merge(&mut self, values: &Hash) {
        self.innermost_scope().merge(values);
    }

    /// Bind `key` in the nearest scope.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.innermost_scope().insert(key, value);
    }

    /// Bind `key` in the outermost scope, as `assign` does.
    pub fn set_outermost(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.outermost_scope().insert(key, value);
    }

    /// Overwrite outermost-scope entries with the environment value bound
    /// to the same key, so render-time bindings win over values assigned
    /// by an earlier render.
    pub(crate) fn squash_instance_assigns(&mut self) -> LiquidResult<()> {
        let outer = self.outermost_scope().clone();
        for key in outer.keys() {
            let environments = self.environments.clone();
            for env in environments {
                if env.contains_key(&key) {
                    let value = self.lookup_and_evaluate(&env, &key)?;
                    outer.insert(key.clone(), value);
                    break;
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Resolve a markup key, recording a `VariableNotFound` error if a
    /// variable path does not resolve.
    pub fn resolve(&mut self, key: &str) -> LiquidResult<Value> {
        self.resolve_with(key, true)
    }

    /// Resolve a markup key without recording missing variables.
    pub fn resolve_quiet(&mut self, key: &str) -> LiquidResult<Value> {
        self.resolve_with(key, false)
    }

    /// Whether `key` resolves to a non-nil value.
    pub fn has_key(&mut self, key: &str) -> LiquidResult<bool> {
        Ok(!self.resolve_quiet(key)?.is_nil())
    }

    /// Run `f` without recording missing variables.
    pub fn quietly<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.quiet += 1;
        let result = f(self);
        self.quiet -= 1;
        result
    }

    fn resolve_with(&mut self, key: &str, notify: bool) -> LiquidResult<Value> {
        match key {
            "" | "nil" | "null" => return Ok(Value::Nil),
            "true" => return Ok(Value::Bool(true)),
            "false" => return Ok(Value::Bool(false)),
            // Only meaningful as condition operands.
            "empty" | "blank" => return Ok(Value::Nil),
            _ => {}
        }

        if let Some(caps) = SINGLE_QUOTED
            .captures(key)
            .or_else(|| DOUBLE_QUOTED.captures(key))
        {
            return Ok(Value::str(&caps[1]));
        }

        if INTEGER.is_match(key)
            && let Ok(n) = key.parse::<i64>()
        {
            return Ok(Value::Int(n));
        }

        if let Some(caps) = RANGE.captures(key) {
            let start = self.resolve_with(&caps[1], notify)?.to_int().unwrap_or(0);
            let end = self.resolve_with(&caps[2], notify)?.to_int().unwrap_or(0);
            return Ok(Value::List((start..=end).map(Value::Int).collect::<Array>()));
        }

        if FLOAT.is_match(key)
            && let Some(f) = self.format.parse_float(key)
        {
            return Ok(Value::Float(f));
        }

        self.variable(key, notify)
    }

    fn record_not_found(&mut self, markup: &str, notify: bool) {
        if notify && self.quiet == 0 {
            tracing::trace!(markup, "Variable not found");
            self.errors.push(LiquidError::VariableNotFound {
                markup: markup.to_string(),
            });
        }
    }

    fn variable(&mut self, markup: &str, notify: bool) -> LiquidResult<Value> {
        let segments: Vec<&str> = VARIABLE_SEGMENT
            .find_iter(markup)
            .map(|m| m.as_str())
            .collect();
        let Some((first, rest)) = segments.split_first() else {
            self.record_not_found(markup, notify);
            return Ok(Value::Nil);
        };

        let first_key = match bracket_inner(first) {
            Some(inner) => {
                let resolved = self.resolve_with(inner, notify)?;
                resolved.to_display(&self.format)
            }
            None => (*first).to_string(),
        };

        let mut object = self.find_variable(&first_key)?;
        if object.is_nil() {
            self.record_not_found(markup, notify);
            return Ok(Value::Nil);
        }

        for segment in rest {
            let (key, bracketed) = match bracket_inner(segment) {
                Some(inner) => (self.resolve_with(inner, notify)?, true),
                None => (Value::str(*segment), false),
            };

            if let Some(found) = self.lookup_segment(&object, &key)? {
                object = self.liquidize(found)?;
                continue;
            }

            if !bracketed && let Some(found) = keyword_accessor(&object, segment) {
                object = found;
                continue;
            }

            self.record_not_found(markup, notify);
            return Ok(Value::Nil);
        }

        Ok(object)
    }

    fn find_variable(&mut self, key: &str) -> LiquidResult<Value> {
        let case_insensitive = self.registry.naming().case_insensitive_keys();

        let hit = self
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.find_key(key, case_insensitive).map(|k| (scope.clone(), k)));
        if let Some((scope, found_key)) = hit {
            let value = self.lookup_and_evaluate(&scope, &found_key)?;
            return self.liquidize(value);
        }

        let environments = self.environments.clone();
        for env in &environments {
            let env_key = env
                .find_key(key, case_insensitive)
                .unwrap_or_else(|| key.to_string());
            let value = self.lookup_and_evaluate(env, &env_key)?;
            if !value.is_nil() {
                return self.liquidize(value);
            }
        }

        if environments.is_empty() {
            let outer = self.outermost_scope().clone();
            let value = self.lookup_and_evaluate(&outer, key)?;
            return self.liquidize(value);
        }

        Ok(Value::Nil)
    }

    /// Fetch `key` from `hash`, evaluating a deferred value and writing
    /// the result back in its place.
    fn lookup_and_evaluate(&mut self, hash: &Hash, key: &str) -> LiquidResult<Value> {
        match hash.lookup(key)? {
            Value::Proc(proc) => {
                let value = proc.call(self);
                hash.insert(key, value.clone());
                Ok(value)
            }
            value => Ok(value),
        }
    }

    fn lookup_segment(&mut self, object: &Value, key: &Value) -> LiquidResult<Option<Value>> {
        match (object, key) {
            (Value::Map(hash), Value::Str(k)) => {
                let case_insensitive = self.registry.naming().case_insensitive_keys();
                match hash.find_key(k, case_insensitive) {
                    Some(found) => Ok(Some(self.lookup_and_evaluate(hash, &found)?)),
                    None => Ok(None),
                }
            }
            (Value::List(array), Value::Int(index)) => {
                let Some(index) = usize::try_from(*index).ok().filter(|i| *i < array.len()) else {
                    return Ok(None);
                };
                match array.get(index) {
                    Some(Value::Proc(proc)) => {
                        let value = proc.call(self);
                        array.set(index, value.clone());
                        Ok(Some(value))
                    }
                    other => Ok(other),
                }
            }
            (Value::Drop(drop), key) => {
                let name = key.to_display(&self.format);
                if !drop.has(&name, self) {
                    return Ok(None);
                }
                let drop = Arc::clone(drop);
                match drop.get(&name, self)? {
                    Some(Value::Proc(proc)) => Ok(Some(proc.call(self))),
                    Some(value) => Ok(Some(value)),
                    None => Ok(Some(Value::Nil)),
                }
            }
            _ => Ok(None),
        }
    }

    /// Normalize a resolved value. Host objects are converted through their
    /// own hook or the exposure registered for their type.
    pub fn liquidize(&mut self, value: Value) -> LiquidResult<Value> {
        match value {
            Value::Object(object) => {
                if let Some(converted) = object.to_liquid() {
                    return Ok(converted);
                }
                match self.registry.exposure(object.value_type_id()) {
                    Some(exposure) => Ok(exposure.expose(&object)),
                    None => Err(LiquidError::syntax(format!(
                        "Object '{}' is invalid because it is neither a built-in type nor implements ToLiquid",
                        object.type_name()
                    ))),
                }
            }
            other => Ok(other),
        }
    }

    // ------------------------------------------------------------------
    // Filters, errors and limits
    // ------------------------------------------------------------------

    /// Whether a filter named `method` is available in this render.
    pub fn responds_to(&self, method: &str) -> bool {
        self.strainer.responds_to(method)
    }

    /// Invoke the filter `method`. An unregistered filter returns its first
    /// argument unchanged.
    pub fn invoke(&mut self, method: &str, args: Vec<Value>) -> LiquidResult<Value> {
        match self.strainer.candidates(method) {
            Some(candidates) => Strainer::dispatch(self, method, &candidates, args),
            None => Ok(args.into_iter().next().unwrap_or_default()),
        }
    }

    /// Record a non-fatal error and return the text to render in place of
    /// the failing node. Fatal errors, and every error in rethrow mode,
    /// are returned as `Err`.
    pub fn handle_error(&mut self, error: LiquidError) -> LiquidResult<String> {
        if error.is_fatal() {
            return Err(error);
        }
        tracing::debug!(error = %error, "Recording render error");
        self.errors.push(error.clone());
        match self.errors_output_mode {
            ErrorsOutputMode::Display => Ok(error.inline_message()),
            ErrorsOutputMode::Suppress => Ok(String::new()),
            ErrorsOutputMode::Rethrow => Err(error),
        }
    }

    pub fn restart_timeout(&mut self) {
        self.started = Instant::now();
    }

    /// Fail once the render has run longer than its timeout.
    pub fn check_timeout(&self) -> LiquidResult<()> {
        match self.timeout {
            Some(timeout) if self.started.elapsed() > timeout => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(timeout_ms, "Render aborted by timeout");
                Err(LiquidError::Timeout { timeout_ms })
            }
            _ => Ok(()),
        }
    }
}

/// The `size`, `first` and `last` keywords on strings, lists and maps.
fn keyword_accessor(object: &Value, keyword: &str) -> Option<Value> {
    match (object, keyword) {
        (Value::List(array), "size") => Some(Value::from(array.len())),
        (Value::List(array), "first") => Some(array.first().unwrap_or_default()),
        (Value::List(array), "last") => Some(array.last().unwrap_or_default()),
        (Value::Map(hash), "size") => Some(Value::from(hash.len())),
        (Value::Map(hash), "first") => Some(
            hash.entries()
                .into_iter()
                .next()
                .map(|(k, v)| Value::list([Value::Str(k), v]))
                .unwrap_or_default(),
        ),
        (Value::Map(hash), "last") => Some(
            hash.entries()
                .into_iter()
                .last()
                .map(|(k, v)| Value::list([Value::Str(k), v]))
                .unwrap_or_default(),
        ),
        (Value::Str(s), "size") => Some(Value::from(s.chars().count())),
        (Value::Str(s), "first") => Some(s.chars().next().map(String::from).into()),
        (Value::Str(s), "last") => Some(s.chars().last().map(String::from).into()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Proc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context() -> Context {
        Context::new(Arc::new(Registry::new()))
    }

    // ========================================================================
    // Literals
    // ========================================================================

    #[test]
    fn test_resolve_literals() {
        let mut ctx = context();
        assert_eq!(ctx.resolve("nil").unwrap(), Value::Nil);
        assert_eq!(ctx.resolve("null").unwrap(), Value::Nil);
        assert_eq!(ctx.resolve("").unwrap(), Value::Nil);
        assert_eq!(ctx.resolve("true").unwrap(), Value::Bool(true));
        assert_eq!(ctx.resolve("false").unwrap(), Value::Bool(false));
        assert_eq!(ctx.resolve("'hello'").unwrap(), Value::str("hello"));
        assert_eq!(ctx.resolve("\"hello\"").unwrap(), Value::str("hello"));
        assert_eq!(ctx.resolve("42").unwrap(), Value::Int(42));
        assert_eq!(ctx.resolve("-7").unwrap(), Value::Int(-7));
        assert_eq!(ctx.resolve("4.5").unwrap(), Value::Float(4.5));
        assert!(ctx.errors().is_empty());
    }

    #[test]
    fn test_resolve_range_with_variable_bound() {
        let mut ctx = context();
        ctx.set("n", 3);
        assert_eq!(
            ctx.resolve("(1..n)").unwrap(),
            Value::list([Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn test_resolve_float_with_local_separator() {
        let mut ctx = context().with_format(FormatProvider::with_decimal_separator(','));
        assert_eq!(ctx.resolve("2,5").unwrap(), Value::Float(2.5));
        assert_eq!(ctx.resolve("2.5").unwrap(), Value::Float(2.5));
    }

    // ========================================================================
    // Scopes
    // ========================================================================

    #[test]
    fn test_push_shadows_and_pop_restores() {
        let mut ctx = context();
        ctx.set("x", "outer");
        ctx.push(Hash::new()).unwrap();
        ctx.set("x", "inner");
        assert_eq!(ctx.resolve("x").unwrap(), Value::str("inner"));
        ctx.pop().unwrap();
        assert_eq!(ctx.resolve("x").unwrap(), Value::str("outer"));
    }

    #[test]
    fn test_pop_last_scope_fails() {
        let mut ctx = context();
        assert!(matches!(ctx.pop(), Err(LiquidError::Context { .. })));
    }

    #[test]
    fn test_push_past_max_depth_fails() {
        let mut ctx = context();
        for _ in 0..DEFAULT_MAX_DEPTH {
            ctx.push(Hash::new()).unwrap();
        }
        assert!(matches!(
            ctx.push(Hash::new()),
            Err(LiquidError::StackLevel { max_depth: 80 })
        ));
    }

    #[test]
    fn test_stack_pops_after_error() {
        let mut ctx = context();
        let result: LiquidResult<()> =
            ctx.stack(Hash::new(), |_| Err(LiquidError::argument("boom")));
        assert!(result.is_err());
        assert_eq!(ctx.scope_count(), 1);
    }

    #[test]
    fn test_merge_into_nearest_scope() {
        let mut ctx = context();
        ctx.push(Hash::new()).unwrap();
        let values: Hash = [("a", 1), ("b", 2)].into_iter().collect();
        ctx.merge(&values);
        assert_eq!(ctx.innermost_scope().get("a"), Some(Value::Int(1)));
        assert!(ctx.outermost_scope().is_empty());
    }

    #[test]
    fn test_environments_consulted_after_scopes() {
        let env: Hash = [("x", "env"), ("y", "env")].into_iter().collect();
        let mut ctx = context().with_environments(vec![env]);
        ctx.set("x", "scope");
        assert_eq!(ctx.resolve("x").unwrap(), Value::str("scope"));
        assert_eq!(ctx.resolve("y").unwrap(), Value::str("env"));
    }

    // ========================================================================
    // Paths
    // ========================================================================

    #[test]
    fn test_nested_paths() {
        let mut ctx = context();
        let product = Value::from(serde_json::json!({
            "variants": [{"title": "draft"}, {"title": "final"}],
            "size": 1000
        }));
        ctx.set("product", product);
        assert_eq!(ctx.resolve("product.variants[1].title").unwrap(), Value::str("final"));
        assert_eq!(ctx.resolve("product.variants.size").unwrap(), Value::Int(2));
        assert_eq!(ctx.resolve("product.variants.first.title").unwrap(), Value::str("draft"));
        assert_eq!(ctx.resolve("product.size").unwrap(), Value::Int(1000));
    }

    #[test]
    fn test_bracket_segment_is_resolved() {
        let mut ctx = context();
        ctx.set("hash", Value::from(serde_json::json!({"a": "found"})));
        ctx.set("key", "a");
        assert_eq!(ctx.resolve("hash[key]").unwrap(), Value::str("found"));
        assert_eq!(ctx.resolve("hash['a']").unwrap(), Value::str("found"));
    }

    #[test]
    fn test_bracketed_keyword_is_a_literal_key() {
        let mut ctx = context();
        ctx.set("array", Value::list([Value::Int(1), Value::Int(2)]));
        ctx.set("hash", Value::from(serde_json::json!({"first": "literal"})));
        assert_eq!(ctx.resolve("array.first").unwrap(), Value::Int(1));
        assert_eq!(ctx.resolve("array['first']").unwrap(), Value::Nil);
        assert_eq!(ctx.resolve("hash['first']").unwrap(), Value::str("literal"));
    }

    #[test]
    fn test_string_keywords() {
        let mut ctx = context();
        ctx.set("word", "abcd");
        assert_eq!(ctx.resolve("word.size").unwrap(), Value::Int(4));
        assert_eq!(ctx.resolve("word.first").unwrap(), Value::str("a"));
    }

    #[test]
    fn test_missing_variable_records_error() {
        let mut ctx = context();
        assert_eq!(ctx.resolve("missing.path").unwrap(), Value::Nil);
        assert_eq!(
            ctx.errors(),
            &[LiquidError::VariableNotFound {
                markup: "missing.path".to_string()
            }]
        );
    }

    #[test]
    fn test_missing_segment_records_error() {
        let mut ctx = context();
        ctx.set("hash", Hash::new());
        assert_eq!(ctx.resolve("hash.nothing").unwrap(), Value::Nil);
        assert_eq!(ctx.errors().len(), 1);
    }

    #[test]
    fn test_quiet_resolution_records_nothing() {
        let mut ctx = context();
        assert_eq!(ctx.resolve_quiet("missing").unwrap(), Value::Nil);
        let value = ctx.quietly(|ctx| ctx.resolve("missing"));
        assert_eq!(value.unwrap(), Value::Nil);
        assert!(ctx.errors().is_empty());
    }

    #[test]
    fn test_keys_compare_case_insensitively_by_default() {
        let mut ctx = context();
        ctx.set("Name", "x");
        assert_eq!(ctx.resolve("name").unwrap(), Value::str("x"));
    }

    // ========================================================================
    // Deferred values
    // ========================================================================

    #[test]
    fn test_proc_in_scope_is_evaluated_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut ctx = context();
        ctx.set(
            "lazy",
            Proc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Value::str("computed")
            }),
        );
        assert_eq!(ctx.resolve("lazy").unwrap(), Value::str("computed"));
        assert_eq!(ctx.resolve("lazy").unwrap(), Value::str("computed"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_proc_in_list_is_written_back() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let array = Array::from_vec(vec![
            Value::Int(0),
            Value::Proc(Proc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Value::Int(1)
            })),
        ]);
        let mut ctx = context();
        ctx.set("array", array.clone());
        assert_eq!(ctx.resolve("array[1]").unwrap(), Value::Int(1));
        assert_eq!(ctx.resolve("array[1]").unwrap(), Value::Int(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(array.get(1), Some(Value::Int(1)));
    }

    #[test]
    fn test_proc_receives_context() {
        let mut ctx = context();
        ctx.set("base", 20);
        ctx.set(
            "derived",
            Proc::new(|ctx| {
                let base = ctx.resolve("base").unwrap_or_default().to_int().unwrap_or(0);
                Value::Int(base + 1)
            }),
        );
        assert_eq!(ctx.resolve("derived").unwrap(), Value::Int(21));
    }

    // ========================================================================
    // Errors and limits
    // ========================================================================

    #[test]
    fn test_handle_error_modes() {
        let mut display = context();
        assert_eq!(
            display.handle_error(LiquidError::argument("bad")).unwrap(),
            "Liquid error: bad"
        );

        let mut suppress = context().with_errors_output_mode(ErrorsOutputMode::Suppress);
        assert_eq!(suppress.handle_error(LiquidError::argument("bad")).unwrap(), "");
        assert_eq!(suppress.errors().len(), 1);

        let mut rethrow = context().with_errors_output_mode(ErrorsOutputMode::Rethrow);
        assert!(rethrow.handle_error(LiquidError::argument("bad")).is_err());
    }

    #[test]
    fn test_handle_error_propagates_fatal_errors() {
        let mut ctx = context();
        let result = ctx.handle_error(LiquidError::Timeout { timeout_ms: 1 });
        assert!(matches!(result, Err(LiquidError::Timeout { .. })));
        assert!(ctx.errors().is_empty());
    }

    #[test]
    fn test_check_timeout() {
        let ctx = context().with_timeout(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(ctx.check_timeout(), Err(LiquidError::Timeout { .. })));

        let disabled = context().with_timeout(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert!(disabled.check_timeout().is_ok());
    }

    #[test]
    fn test_invoke_unknown_filter_returns_input() {
        let mut ctx = context();
        let result = ctx.invoke("no_such_filter", vec![Value::str("input")]).unwrap();
        assert_eq!(result, Value::str("input"));
    }

    #[test]
    fn test_register_is_created_once() {
        let ctx = context();
        ctx.register("cycle").insert("a", 1);
        assert_eq!(ctx.register("cycle").get("a"), Some(Value::Int(1)));
    }
}
