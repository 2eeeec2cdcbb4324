/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Liquid template engine for Quarto.
//!
//! This crate parses and renders [Liquid](https://shopify.github.io/liquid/)
//! templates. It supports:
//!
//! - Output markup with filter chains: `{{ product.title | upcase }}`
//! - Conditionals: `if`/`elsif`/`else`, `unless`, `case`/`when`
//! - Loops: `for` (with `limit`, `offset`, `reversed`, `break`, `continue`)
//!   and `tablerow`
//! - Assignment and state: `assign`, `cycle`, `ifchanged`
//! - Partials through a pluggable template source: `include`
//! - Template inheritance: `extends`, `block` and `{{ block.super }}`
//! - Verbatim and comment blocks: `raw`, `literal`, `comment`
//!
//! # Architecture
//!
//! Source text is split into tokens by the [`lexer`], and the [`parser`]
//! builds a tree of [`Node`]s using the tag constructors of a [`Registry`].
//! Rendering walks the tree with a [`Context`], which resolves variable
//! paths through a stack of scopes and dispatches filters through the
//! [`strainer`]. Tags, filters, operators, the naming convention, the
//! template source and host-type exposure rules all live on the registry,
//! so independent registries can coexist in one process.
//!
//! # Example
//!
//! ```ignore
//! use quarto_liquid::{Hash, RenderParameters, Template};
//!
//! let template = Template::parse("Hello, {{ name | capitalize }}!")?;
//!
//! let locals = Hash::new();
//! locals.insert("name", "world");
//!
//! let output = template.render(&RenderParameters::new().with_local_variables(locals))?;
//! assert_eq!(output, "Hello, World!");
//! ```

pub mod condition;
pub mod context;
pub mod drop;
pub mod error;
pub mod file_system;
pub mod format;
pub mod lexer;
pub mod naming;
pub mod parser;
pub mod registry;
pub mod standard_filters;
pub mod strainer;
pub mod tags;
pub mod template;
pub mod value;
pub mod variable;

// Re-export main types at crate root
pub use condition::{Condition, Operand, OperatorFn, Operators};
pub use context::Context;
pub use drop::{AllowList, DropProxy, HostDrop, LiquidDrop, MemberAccessor};
pub use error::{ErrorsOutputMode, LiquidError, LiquidResult};
pub use file_system::{BlankFileSystem, LocalFileSystem, MemoryFileSystem, TemplateSource};
pub use format::FormatProvider;
pub use naming::{CSharpNamingConvention, NamingConvention, RubyNamingConvention};
pub use parser::{Node, Parser, RenderOutcome, Tag, TagConstructor, TokenStream};
pub use registry::{Exposure, Registry};
pub use strainer::{Filter, FilterParam, FilterSet};
pub use template::{RenderOutput, RenderParameters, Template};
pub use value::{Array, Hash, HostObject, Proc, ToLiquid, Value};
pub use variable::Variable;
