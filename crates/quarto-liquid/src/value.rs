/*
 * value.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Values flowing through template evaluation.
//!
//! [`Value`] is a closed sum type. Lists and maps are shared handles
//! ([`Array`], [`Hash`]): cloning a value clones the handle, not the
//! contents, so a deferred [`Proc`] evaluated through one handle is
//! memoized for every other holder of the same container.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;

use crate::context::Context;
use crate::drop::LiquidDrop;
use crate::error::LiquidResult;
use crate::format::{FormatProvider, INVARIANT_DATETIME_FORMAT};

/// A dynamically typed template value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Array),
    Map(Hash),
    DateTime(DateTime<FixedOffset>),
    /// An opaque host value, normalized on resolution.
    Object(HostObject),
    /// A capability-restricted object.
    Drop(Arc<dyn LiquidDrop>),
    /// A deferred value, evaluated at most once per binding site.
    Proc(Proc),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Array::from_vec(items.into_iter().collect()))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Template truthiness: nil is false, a boolean is itself, everything
    /// else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "hash",
            Value::DateTime(_) => "datetime",
            Value::Object(obj) => obj.type_name(),
            Value::Drop(_) => "drop",
            Value::Proc(_) => "proc",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Integer view used by tag attributes such as `limit:` and `cols:`.
    pub fn to_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(f) => Some(f.trunc() as i64),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Numeric view used by the arithmetic filters.
    pub fn to_float(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Whether this value is an empty string, list or map.
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::Str(s) => s.is_empty(),
            Value::List(a) => a.is_empty(),
            Value::Map(h) => h.is_empty(),
            _ => false,
        }
    }

    /// Elements visited by iteration tags and the `join`-style output
    /// rendering. Maps iterate as `[key, value]` pairs.
    pub fn iter_values(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(a) => Some(a.to_vec()),
            Value::Map(h) => Some(
                h.entries()
                    .into_iter()
                    .map(|(k, v)| Value::list([Value::Str(k), v]))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Render this value as output text.
    pub fn to_display(&self, format: &FormatProvider) -> String {
        match self {
            Value::Nil => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => format.format_float(*f),
            Value::Str(s) => s.clone(),
            Value::List(a) => a.to_vec().iter().map(|v| v.to_display(format)).collect(),
            Value::Map(h) => h
                .entries()
                .iter()
                .map(|(k, v)| format!("[{}, {}]", k, v.to_display(format)))
                .collect(),
            Value::DateTime(dt) => format
                .format_datetime(dt)
                .unwrap_or_else(|_| dt.format(INVARIANT_DATETIME_FORMAT).to_string()),
            Value::Object(_) | Value::Drop(_) | Value::Proc(_) => String::new(),
        }
    }

    /// Equality without any type coercion: `Int(1)` is not `Str("1")`
    /// and not `Float(1.0)`.
    pub fn strict_eq(&self, other: &Value) -> bool {
        self == other
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a.ptr_eq(b) || a.to_vec() == b.to_vec(),
            (Value::Map(a), Value::Map(b)) => a.ptr_eq(b) || a.entries() == b.entries(),
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(&a.value, &b.value),
            (Value::Drop(a), Value::Drop(b)) => Arc::ptr_eq(a, b),
            (Value::Proc(a), Value::Proc(b)) => Arc::ptr_eq(&a.0, &b.0),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({:?})", b),
            Value::Int(n) => write!(f, "Int({:?})", n),
            Value::Float(x) => write!(f, "Float({:?})", x),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::List(a) => f.debug_tuple("List").field(&a.to_vec()).finish(),
            Value::Map(h) => f.debug_tuple("Map").field(&h.entries()).finish(),
            Value::DateTime(dt) => write!(f, "DateTime({})", dt.to_rfc3339()),
            Value::Object(obj) => write!(f, "Object({})", obj.type_name()),
            Value::Drop(d) => write!(f, "Drop({:?})", d),
            Value::Proc(_) => write!(f, "Proc"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(Array::from_vec(items))
    }
}

impl From<Hash> for Value {
    fn from(h: Hash) -> Self {
        Value::Map(h)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::List(a)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<Proc> for Value {
    fn from(p: Proc) -> Self {
        Value::Proc(p)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Nil, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(Array::from_vec(items.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(obj) => {
                Value::Map(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A shared, growable list of values.
#[derive(Clone, Default)]
pub struct Array(Arc<RwLock<Vec<Value>>>);

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Array(Arc::new(RwLock::new(items)))
    }

    pub fn len(&self) -> usize {
        read_lock(&self.0).len()
    }

    pub fn is_empty(&self) -> bool {
        read_lock(&self.0).is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        read_lock(&self.0).get(index).cloned()
    }

    pub fn first(&self) -> Option<Value> {
        read_lock(&self.0).first().cloned()
    }

    pub fn last(&self) -> Option<Value> {
        read_lock(&self.0).last().cloned()
    }

    /// Replace the element at `index`; out-of-range writes are ignored.
    pub fn set(&self, index: usize, value: Value) {
        if let Some(slot) = write_lock(&self.0).get_mut(index) {
            *slot = value;
        }
    }

    pub fn push(&self, value: Value) {
        write_lock(&self.0).push(value);
    }

    /// A snapshot of the current elements.
    pub fn to_vec(&self) -> Vec<Value> {
        read_lock(&self.0).clone()
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Array::from_vec(iter.into_iter().collect())
    }
}

/// Computes the value of a missing key for a [`Hash`].
pub type DefaultFn = dyn Fn(&Hash, &str) -> LiquidResult<Value> + Send + Sync;

#[derive(Clone)]
enum HashDefault {
    Value(Value),
    Func(Arc<DefaultFn>),
}

#[derive(Default)]
struct HashInner {
    entries: IndexMap<String, Value>,
    default: Option<HashDefault>,
}

/// A shared, insertion-ordered map with string keys.
///
/// A hash may carry a default value or a default function consulted by
/// [`Hash::lookup`] for missing keys.
#[derive(Clone, Default)]
pub struct Hash(Arc<RwLock<HashInner>>);

impl Hash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_value(value: Value) -> Self {
        let hash = Hash::new();
        write_lock(&hash.0).default = Some(HashDefault::Value(value));
        hash
    }

    pub fn with_default_fn(
        f: impl Fn(&Hash, &str) -> LiquidResult<Value> + Send + Sync + 'static,
    ) -> Self {
        let hash = Hash::new();
        write_lock(&hash.0).default = Some(HashDefault::Func(Arc::new(f)));
        hash
    }

    pub fn len(&self) -> usize {
        read_lock(&self.0).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        read_lock(&self.0).entries.is_empty()
    }

    /// Exact-key lookup without defaults.
    pub fn get(&self, key: &str) -> Option<Value> {
        read_lock(&self.0).entries.get(key).cloned()
    }

    /// Find the stored key matching `key`, optionally ignoring case.
    pub fn find_key(&self, key: &str, case_insensitive: bool) -> Option<String> {
        let inner = read_lock(&self.0);
        if inner.entries.contains_key(key) {
            return Some(key.to_string());
        }
        if case_insensitive {
            return inner
                .entries
                .keys()
                .find(|k| k.eq_ignore_ascii_case(key))
                .cloned();
        }
        None
    }

    pub fn contains_key(&self, key: &str) -> bool {
        read_lock(&self.0).entries.contains_key(key)
    }

    /// Indexer semantics: the stored value, else the default value or
    /// the result of the default function, else nil.
    pub fn lookup(&self, key: &str) -> LiquidResult<Value> {
        let default = {
            let inner = read_lock(&self.0);
            if let Some(v) = inner.entries.get(key) {
                return Ok(v.clone());
            }
            inner.default.clone()
        };
        match default {
            None => Ok(Value::Nil),
            Some(HashDefault::Value(v)) => Ok(v),
            Some(HashDefault::Func(f)) => f(self, key),
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        write_lock(&self.0).entries.insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        write_lock(&self.0).entries.shift_remove(key)
    }

    /// Copy every entry of `other` into this hash, overwriting keys.
    pub fn merge(&self, other: &Hash) {
        if self.ptr_eq(other) {
            return;
        }
        let entries = other.entries();
        let mut inner = write_lock(&self.0);
        for (k, v) in entries {
            inner.entries.insert(k, v);
        }
    }

    pub fn keys(&self) -> Vec<String> {
        read_lock(&self.0).entries.keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<Value> {
        read_lock(&self.0).entries.values().cloned().collect()
    }

    /// A snapshot of the current entries in insertion order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        read_lock(&self.0)
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn ptr_eq(&self, other: &Hash) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Hash {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let hash = Hash::new();
        {
            let mut inner = write_lock(&hash.0);
            for (k, v) in iter {
                inner.entries.insert(k.into(), v.into());
            }
        }
        hash
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries()).finish()
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_vec()).finish()
    }
}

/// A deferred value. The function runs when the value is first resolved
/// and the result replaces the proc in the container it was fetched from.
#[derive(Clone)]
pub struct Proc(Arc<dyn Fn(&mut Context) -> Value + Send + Sync>);

impl Proc {
    pub fn new(f: impl Fn(&mut Context) -> Value + Send + Sync + 'static) -> Self {
        Proc(Arc::new(f))
    }

    pub fn call(&self, ctx: &mut Context) -> Value {
        (self.0)(ctx)
    }
}

impl fmt::Debug for Proc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Proc")
    }
}

/// Conversion hook for host types that know their own template form.
pub trait ToLiquid {
    fn to_liquid(&self) -> Value;
}

type LiquidHook = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Value + Send + Sync>;

/// An opaque host value.
///
/// Host objects are never rendered directly: on resolution they are
/// normalized through their own [`ToLiquid`] hook or through a rule
/// registered for their type on the registry.
#[derive(Clone)]
pub struct HostObject {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    hook: Option<LiquidHook>,
}

impl HostObject {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        HostObject {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
            hook: None,
        }
    }

    /// Wrap a value whose template form comes from its [`ToLiquid`] impl.
    pub fn liquidizable<T: ToLiquid + Any + Send + Sync>(value: T) -> Self {
        let hook: LiquidHook = Arc::new(|any| {
            any.downcast_ref::<T>()
                .map_or(Value::Nil, |value| value.to_liquid())
        });
        HostObject {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
            hook: Some(hook),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn value_type_id(&self) -> TypeId {
        (*self.value).type_id()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub(crate) fn as_any(&self) -> &(dyn Any + Send + Sync) {
        &*self.value
    }

    pub(crate) fn to_liquid(&self) -> Option<Value> {
        self.hook.as_ref().map(|hook| hook(&*self.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::str("").is_truthy());
    }

    #[test]
    fn test_strict_equality_does_not_coerce() {
        assert!(!Value::Int(1).strict_eq(&Value::str("1")));
        assert!(!Value::Int(1).strict_eq(&Value::Float(1.0)));
        assert!(Value::list([Value::Int(1)]).strict_eq(&Value::list([Value::Int(1)])));
    }

    #[test]
    fn test_array_clone_shares_contents() {
        let a = Array::from_vec(vec![Value::Int(1)]);
        let b = a.clone();
        b.set(0, Value::Int(2));
        assert_eq!(a.get(0), Some(Value::Int(2)));
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn test_hash_preserves_insertion_order() {
        let h: Hash = [("b", 1), ("a", 2), ("c", 3)].into_iter().collect();
        assert_eq!(h.keys(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_hash_default_value() {
        let h = Hash::with_default_value(Value::str("fallback"));
        h.insert("present", "here");
        assert_eq!(h.lookup("present").unwrap(), Value::str("here"));
        assert_eq!(h.lookup("missing").unwrap(), Value::str("fallback"));
        assert_eq!(h.get("missing"), None);
    }

    #[test]
    fn test_hash_find_key_case_insensitive() {
        let h = Hash::new();
        h.insert("Name", "x");
        assert_eq!(h.find_key("name", false), None);
        assert_eq!(h.find_key("name", true), Some("Name".to_string()));
    }

    #[test]
    fn test_from_json() {
        let json = serde_json::json!({"a": [1, 2.5, "x", null, true]});
        let value = Value::from(json);
        let Value::Map(h) = value else {
            panic!("expected map");
        };
        assert_eq!(
            h.get("a"),
            Some(Value::list([
                Value::Int(1),
                Value::Float(2.5),
                Value::str("x"),
                Value::Nil,
                Value::Bool(true),
            ]))
        );
    }

    #[test]
    fn test_display_of_lists_joins_without_separator() {
        let format = FormatProvider::default();
        let v = Value::list([Value::Int(1), Value::str("a"), Value::Bool(true)]);
        assert_eq!(v.to_display(&format), "1atrue");
    }

    #[test]
    fn test_display_of_float_uses_decimal_separator() {
        let format = FormatProvider::with_decimal_separator(',');
        assert_eq!(Value::Float(3.145).to_display(&format), "3,145");
        assert_eq!(Value::Float(100.0).to_display(&format), "100");
    }

    struct Cents(i64);

    impl ToLiquid for Cents {
        fn to_liquid(&self) -> Value {
            Value::Int(self.0 * 100)
        }
    }

    #[test]
    fn test_display_of_datetime_with_invalid_pattern_uses_invariant() {
        use chrono::TimeZone;
        let dt = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
            .unwrap();
        let format = FormatProvider {
            datetime_format: "%Q".to_string(),
            ..FormatProvider::invariant()
        };
        assert_eq!(Value::DateTime(dt).to_display(&format), "2024-01-02 03:04:05");
    }

    #[test]
    fn test_host_object_hook() {
        let obj = HostObject::liquidizable(Cents(1));
        assert_eq!(obj.to_liquid(), Some(Value::Int(100)));
        assert!(HostObject::new(5u8).to_liquid().is_none());
        assert_eq!(HostObject::new(5u8).downcast_ref::<u8>(), Some(&5));
    }
}
