/*
 * registry.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Everything a template is parsed and rendered against.
//!
//! A [`Registry`] holds the tag constructors, the global filters, the
//! condition operators, the template source used by `include` and
//! `extends`, and the rules that expose host types to templates. Templates
//! keep an `Arc<Registry>`, so two registries configured differently can
//! be used side by side. [`Registry::global`] is a shared default.
//!
//! The tables can be extended after construction; each sits behind its own
//! lock so that registration and rendering may happen from any thread.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::condition::{OperatorFn, Operand, Operators};
use crate::drop::{AllowList, DropProxy, HostDrop, MemberAccessor};
use crate::error::LiquidResult;
use crate::file_system::{BlankFileSystem, TemplateSource};
use crate::naming::{NamingConvention, RubyNamingConvention};
use crate::parser::TagConstructor;
use crate::standard_filters::standard_filters;
use crate::strainer::{FilterSet, FilterTable};
use crate::tags::standard_tags;
use crate::value::{read_lock, write_lock, HostObject, Value};

static GLOBAL: Lazy<Arc<Registry>> = Lazy::new(|| Arc::new(Registry::new()));

type Transform = Arc<dyn Fn(&HostObject) -> Value + Send + Sync>;

/// How values of a registered host type appear in templates.
#[derive(Clone)]
pub enum Exposure {
    /// Members readable through `accessor`, limited to `allowed`.
    SafeType {
        allowed: AllowList,
        accessor: MemberAccessor,
    },
    /// Converted to a template value by a function.
    Transformer(Transform),
}

impl Exposure {
    pub fn expose(&self, object: &HostObject) -> Value {
        match self {
            Exposure::SafeType { allowed, accessor } => {
                let host = HostDrop::new(object.clone(), Arc::clone(accessor));
                Value::Drop(Arc::new(DropProxy::new(Arc::new(host), allowed.clone())))
            }
            Exposure::Transformer(transform) => transform(object),
        }
    }
}

impl fmt::Debug for Exposure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exposure::SafeType { allowed, .. } => {
                f.debug_struct("SafeType").field("allowed", allowed).finish()
            }
            Exposure::Transformer(_) => write!(f, "Transformer"),
        }
    }
}

#[derive(Debug)]
pub struct Registry {
    naming: Arc<dyn NamingConvention>,
    tags: RwLock<HashMap<String, TagConstructor>>,
    filters: RwLock<FilterTable>,
    operators: RwLock<Operators>,
    file_system: RwLock<Arc<dyn TemplateSource>>,
    exposures: RwLock<HashMap<TypeId, Exposure>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// A registry with the standard tags, filters and operators and Ruby
    /// naming.
    pub fn new() -> Self {
        Self::with_naming(Arc::new(RubyNamingConvention))
    }

    /// A registry with the standard content, named by `naming`.
    pub fn with_naming(naming: Arc<dyn NamingConvention>) -> Self {
        let mut filters = FilterTable::default();
        filters.extend(&standard_filters(), naming.as_ref());
        let tags = standard_tags()
            .into_iter()
            .map(|(name, constructor)| (name.to_string(), constructor))
            .collect();

        Registry {
            naming,
            tags: RwLock::new(tags),
            filters: RwLock::new(filters),
            operators: RwLock::new(Operators::standard()),
            file_system: RwLock::new(Arc::new(BlankFileSystem)),
            exposures: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide default registry.
    pub fn global() -> Arc<Registry> {
        Arc::clone(&GLOBAL)
    }

    pub fn with_file_system(self, source: Arc<dyn TemplateSource>) -> Self {
        self.set_file_system(source);
        self
    }

    pub fn naming(&self) -> &dyn NamingConvention {
        self.naming.as_ref()
    }

    // ------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------

    pub fn register_tag(&self, name: impl Into<String>, constructor: TagConstructor) {
        write_lock(&self.tags).insert(name.into(), constructor);
    }

    pub fn tag(&self, name: &str) -> Option<TagConstructor> {
        read_lock(&self.tags).get(name).copied()
    }

    // ------------------------------------------------------------------
    // Filters
    // ------------------------------------------------------------------

    /// Add `set` to the global filters, replacing filters of the same
    /// names.
    pub fn register_filters(&self, set: &FilterSet) {
        tracing::debug!(count = set.len(), "Registering global filters");
        write_lock(&self.filters).extend(set, self.naming.as_ref());
    }

    /// A snapshot of the global filters.
    pub fn filter_table(&self) -> FilterTable {
        read_lock(&self.filters).clone()
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    pub fn register_operator(
        &self,
        name: impl Into<String>,
        f: impl Fn(&Operand, &Operand) -> LiquidResult<bool> + Send + Sync + 'static,
    ) {
        write_lock(&self.operators).register(name, f);
    }

    pub fn remove_operator(&self, name: &str) -> bool {
        write_lock(&self.operators).remove(name)
    }

    pub fn find_operator(&self, op: &str) -> Option<OperatorFn> {
        read_lock(&self.operators).find(op, self.naming.as_ref())
    }

    // ------------------------------------------------------------------
    // Template source
    // ------------------------------------------------------------------

    pub fn set_file_system(&self, source: Arc<dyn TemplateSource>) {
        *write_lock(&self.file_system) = source;
    }

    pub fn file_system(&self) -> Arc<dyn TemplateSource> {
        Arc::clone(&read_lock(&self.file_system))
    }

    // ------------------------------------------------------------------
    // Host types
    // ------------------------------------------------------------------

    /// Expose values of type `T` as drops whose members are read by
    /// `accessor`, limited to `allowed`.
    pub fn register_safe_type<T: Any + Send + Sync>(
        &self,
        allowed: AllowList,
        accessor: impl Fn(&T, &str) -> Option<Value> + Send + Sync + 'static,
    ) {
        let accessor: MemberAccessor = Arc::new(move |any: &(dyn Any + Send + Sync), name: &str| {
            any.downcast_ref::<T>().and_then(|value| accessor(value, name))
        });
        self.insert_exposure::<T>(Exposure::SafeType { allowed, accessor });
    }

    /// Expose values of type `T` through a conversion function.
    pub fn register_transformer<T: Any + Send + Sync>(
        &self,
        transform: impl Fn(&T) -> Value + Send + Sync + 'static,
    ) {
        let transform: Transform = Arc::new(move |object: &HostObject| {
            object.downcast_ref::<T>().map_or(Value::Nil, &transform)
        });
        self.insert_exposure::<T>(Exposure::Transformer(transform));
    }

    fn insert_exposure<T: Any>(&self, exposure: Exposure) {
        tracing::debug!(host_type = std::any::type_name::<T>(), "Registering host type");
        write_lock(&self.exposures).insert(TypeId::of::<T>(), exposure);
    }

    pub fn exposure(&self, type_id: TypeId) -> Option<Exposure> {
        read_lock(&self.exposures).get(&type_id).cloned()
    }
}
