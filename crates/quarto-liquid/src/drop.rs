/*
 * drop.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Capability-restricted objects exposed to templates.
//!
//! A drop answers member lookups by name. Lookups receive the active
//! [`Context`], so a drop can resolve other variables of the render it
//! takes part in.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::LiquidResult;
use crate::value::{HostObject, Value};

/// An object that exposes a named set of members to templates.
pub trait LiquidDrop: fmt::Debug + Send + Sync {
    /// Whether `name` is a member of this drop. Names that are not members
    /// are reported as missing variables.
    fn has(&self, name: &str, ctx: &Context) -> bool;

    /// The value of member `name`. `None` renders as nil.
    fn get(&self, name: &str, ctx: &mut Context) -> LiquidResult<Option<Value>>;
}

/// The members a [`DropProxy`] lets through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowList {
    All,
    Names(Vec<String>),
}

impl AllowList {
    pub fn names(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.iter().any(|n| n == "*") {
            AllowList::All
        } else {
            AllowList::Names(names)
        }
    }

    /// Whether the template name `name` refers to an allowed member. Host
    /// member names are mapped through the active naming convention.
    pub fn permits(&self, name: &str, ctx: &Context) -> bool {
        match self {
            AllowList::All => true,
            AllowList::Names(names) => {
                let naming = ctx.registry().naming();
                names.iter().any(|allowed| {
                    let mapped = naming.member_name(allowed);
                    if naming.case_insensitive_keys() {
                        mapped.eq_ignore_ascii_case(name)
                    } else {
                        mapped == name
                    }
                })
            }
        }
    }
}

/// Restricts another drop to an allow-list of members.
#[derive(Debug, Clone)]
pub struct DropProxy {
    inner: Arc<dyn LiquidDrop>,
    allowed: AllowList,
}

impl DropProxy {
    pub fn new(inner: Arc<dyn LiquidDrop>, allowed: AllowList) -> Self {
        DropProxy { inner, allowed }
    }
}

impl LiquidDrop for DropProxy {
    fn has(&self, name: &str, ctx: &Context) -> bool {
        self.allowed.permits(name, ctx) && self.inner.has(name, ctx)
    }

    fn get(&self, name: &str, ctx: &mut Context) -> LiquidResult<Option<Value>> {
        if !self.allowed.permits(name, ctx) {
            return Ok(None);
        }
        self.inner.get(name, ctx)
    }
}

/// Reads a named member of a host value.
pub type MemberAccessor = Arc<dyn Fn(&(dyn Any + Send + Sync), &str) -> Option<Value> + Send + Sync>;

/// Exposes the members of a host object through an accessor function.
#[derive(Clone)]
pub struct HostDrop {
    object: HostObject,
    accessor: MemberAccessor,
}

impl HostDrop {
    pub fn new(object: HostObject, accessor: MemberAccessor) -> Self {
        HostDrop { object, accessor }
    }
}

impl fmt::Debug for HostDrop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostDrop")
            .field("type", &self.object.type_name())
            .finish()
    }
}

impl LiquidDrop for HostDrop {
    fn has(&self, _name: &str, _ctx: &Context) -> bool {
        true
    }

    fn get(&self, name: &str, _ctx: &mut Context) -> LiquidResult<Option<Value>> {
        Ok((self.accessor)(self.object.as_any(), name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LiquidError;
    use crate::registry::Registry;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[derive(Debug)]
    struct ProductDrop;

    impl LiquidDrop for ProductDrop {
        fn has(&self, name: &str, _ctx: &Context) -> bool {
            matches!(name, "name" | "secret" | "context_sensitive")
        }

        fn get(&self, name: &str, ctx: &mut Context) -> LiquidResult<Option<Value>> {
            Ok(match name {
                "name" => Some(Value::str("shirt")),
                "secret" => Some(Value::str("hidden")),
                "context_sensitive" => Some(ctx.resolve("test")?),
                _ => None,
            })
        }
    }

    #[derive(Debug, Default)]
    struct CounterDrop {
        count: AtomicI64,
    }

    impl LiquidDrop for CounterDrop {
        fn has(&self, name: &str, _ctx: &Context) -> bool {
            name == "count"
        }

        fn get(&self, _name: &str, _ctx: &mut Context) -> LiquidResult<Option<Value>> {
            Ok(Some(Value::Int(self.count.fetch_add(1, Ordering::SeqCst) + 1)))
        }
    }

    fn context() -> Context {
        Context::new(Arc::new(Registry::new()))
    }

    #[test]
    fn test_drop_members_resolve() {
        let mut ctx = context();
        ctx.set("product", Value::Drop(Arc::new(ProductDrop)));
        assert_eq!(ctx.resolve("product.name").unwrap(), Value::str("shirt"));
    }

    #[test]
    fn test_drop_is_context_aware() {
        let mut ctx = context();
        ctx.set("test", "123");
        ctx.set("product", Value::Drop(Arc::new(ProductDrop)));
        assert_eq!(
            ctx.resolve("product.context_sensitive").unwrap(),
            Value::str("123")
        );
    }

    #[test]
    fn test_unknown_drop_member_is_not_found() {
        let mut ctx = context();
        ctx.set("product", Value::Drop(Arc::new(ProductDrop)));
        assert_eq!(ctx.resolve("product.price").unwrap(), Value::Nil);
        assert_eq!(ctx.errors().len(), 1);
    }

    #[test]
    fn test_drop_member_is_invoked_per_lookup() {
        let mut ctx = context();
        ctx.set("counter", Value::Drop(Arc::new(CounterDrop::default())));
        assert_eq!(ctx.resolve("counter.count").unwrap(), Value::Int(1));
        assert_eq!(ctx.resolve("counter['count']").unwrap(), Value::Int(2));
    }

    #[test]
    fn test_proxy_restricts_members() {
        let mut ctx = context();
        let proxy = DropProxy::new(Arc::new(ProductDrop), AllowList::names(["Name"]));
        ctx.set("product", Value::Drop(Arc::new(proxy)));
        assert_eq!(ctx.resolve("product.name").unwrap(), Value::str("shirt"));
        assert_eq!(ctx.resolve("product.secret").unwrap(), Value::Nil);
        assert_eq!(ctx.errors().len(), 1);
        assert!(matches!(ctx.errors()[0], LiquidError::VariableNotFound { .. }));
    }

    #[test]
    fn test_wildcard_allows_everything() {
        assert_eq!(AllowList::names(["*"]), AllowList::All);
    }
}
