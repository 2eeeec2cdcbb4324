/*
 * template.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Parsed templates and the render entry point.
//!
//! A [`Template`] is parsed once and rendered any number of times. The
//! node tree is immutable after parsing. By default a template also owns
//! mutable state that carries over between renders: `assigns` (consulted
//! as an environment), `instance_assigns` (the outermost scope, written
//! by `assign`) and `registers`. Call [`Template::make_thread_safe`] to
//! give every render fresh state instead.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::context::Context;
use crate::error::{ErrorsOutputMode, LiquidError, LiquidResult};
use crate::format::FormatProvider;
use crate::lexer::tokenize;
use crate::parser::{render_document, Node, Parser, RenderOutcome, TokenStream};
use crate::registry::Registry;
use crate::strainer::FilterSet;
use crate::tags::inheritance::check_extends_position;
use crate::value::Hash;

/// Options for a single render.
#[derive(Debug, Clone, Default)]
pub struct RenderParameters {
    local_variables: Hash,
    registers: Hash,
    filters: Vec<FilterSet>,
    errors_output_mode: ErrorsOutputMode,
    max_iterations: usize,
    timeout: Duration,
    format: FormatProvider,
}

impl RenderParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bindings consulted before the template's own assigns.
    pub fn with_local_variables(mut self, locals: Hash) -> Self {
        self.local_variables = locals;
        self
    }

    /// Entries merged into the registers before rendering.
    pub fn with_registers(mut self, registers: Hash) -> Self {
        self.registers = registers;
        self
    }

    /// Filters available to this render only. They replace global filters
    /// of the same name.
    pub fn with_filters(mut self, set: FilterSet) -> Self {
        self.filters.push(set);
        self
    }

    pub fn with_errors_output_mode(mut self, mode: ErrorsOutputMode) -> Self {
        self.errors_output_mode = mode;
        self
    }

    /// Bound the iterations of each loop; 0 leaves loops unbounded.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Bound the wall-clock time of the render; zero disables the bound.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_format(mut self, format: FormatProvider) -> Self {
        self.format = format;
        self
    }
}

/// Rendered text together with the errors recorded while producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub text: String,
    pub errors: Vec<LiquidError>,
}

/// A parsed template.
#[derive(Debug)]
pub struct Template {
    root: Vec<Node>,
    registry: Arc<Registry>,
    assigns: Hash,
    instance_assigns: Hash,
    registers: Hash,
    thread_safe: bool,
    last_errors: Mutex<Vec<LiquidError>>,
}

impl Template {
    /// Parse `source` against the global registry.
    pub fn parse(source: &str) -> LiquidResult<Template> {
        Self::parse_with(source, Registry::global())
    }

    /// Parse `source` against `registry`, whose tags, filters, operators
    /// and template source are used for this template and its renders.
    pub fn parse_with(source: &str, registry: Arc<Registry>) -> LiquidResult<Template> {
        let tokens = tokenize(source);
        tracing::debug!(tokens = tokens.len(), "Parsing template");
        let root = Parser::new(Arc::clone(&registry)).parse_document(&mut TokenStream::new(tokens))?;
        check_extends_position(&root)?;
        Ok(Template {
            root,
            registry,
            assigns: Hash::new(),
            instance_assigns: Hash::new(),
            registers: Hash::new(),
            thread_safe: false,
            last_errors: Mutex::new(Vec::new()),
        })
    }

    pub fn root(&self) -> &[Node] {
        &self.root
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Bindings owned by the template, consulted after the render's local
    /// variables.
    pub fn assigns(&self) -> &Hash {
        &self.assigns
    }

    /// Values written by `assign` during earlier renders.
    pub fn instance_assigns(&self) -> &Hash {
        &self.instance_assigns
    }

    pub fn registers(&self) -> &Hash {
        &self.registers
    }

    /// Stop sharing template-owned state between renders.
    pub fn make_thread_safe(mut self) -> Self {
        self.thread_safe = true;
        self
    }

    pub fn is_thread_safe(&self) -> bool {
        self.thread_safe
    }

    /// The errors recorded by the most recent render.
    pub fn errors(&self) -> Vec<LiquidError> {
        self.last_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Render to text. Recorded errors are rendered inline or suppressed
    /// according to the output mode and remain available from
    /// [`Template::errors`].
    pub fn render(&self, params: &RenderParameters) -> LiquidResult<String> {
        self.render_output(params).map(|output| output.text)
    }

    /// Render to text and return the recorded errors alongside it.
    pub fn render_output(&self, params: &RenderParameters) -> LiquidResult<RenderOutput> {
        let mut ctx = self.context(params);
        tracing::debug!(thread_safe = self.thread_safe, "Rendering template");

        let mut text = String::new();
        let result = ctx
            .squash_instance_assigns()
            .and_then(|()| render_document(&self.root, &mut ctx, &mut text));

        let errors = ctx.take_errors();
        *self
            .last_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = errors.clone();
        tracing::debug!(errors = errors.len(), "Rendered template");

        match result? {
            RenderOutcome::Completed => Ok(RenderOutput { text, errors }),
            RenderOutcome::Break => Err(LiquidError::Interrupt {
                tag: "break".to_string(),
            }),
            RenderOutcome::Continue => Err(LiquidError::Interrupt {
                tag: "continue".to_string(),
            }),
        }
    }

    fn context(&self, params: &RenderParameters) -> Context {
        let (environments, outer_scope, registers) = if self.thread_safe {
            (vec![params.local_variables.clone()], Hash::new(), Hash::new())
        } else {
            (
                vec![params.local_variables.clone(), self.assigns.clone()],
                self.instance_assigns.clone(),
                self.registers.clone(),
            )
        };
        registers.merge(&params.registers);

        Context::new(Arc::clone(&self.registry))
            .with_environments(environments)
            .with_outer_scope(outer_scope)
            .with_registers(registers)
            .with_errors_output_mode(params.errors_output_mode)
            .with_max_iterations(params.max_iterations)
            .with_timeout(params.timeout)
            .with_format(params.format.clone())
            .with_filters(&params.filters)
    }
}
