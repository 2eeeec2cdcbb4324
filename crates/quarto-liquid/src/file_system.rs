/*
 * file_system.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template sources for `include` and `extends`.
//!
//! A [`TemplateSource`] turns a template name into template text. Sources
//! may also hand out already parsed templates, which lets a source cache
//! parses across renders.

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::Context;
use crate::error::{LiquidError, LiquidResult};
use crate::template::Template;
use crate::value::{read_lock, write_lock};

static TEMPLATE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^./][a-zA-Z0-9_/]+$").unwrap());

/// Trait for loading templates by name.
pub trait TemplateSource: Debug + Send + Sync {
    /// Load the source text of the template called `name`.
    fn read_template(&self, ctx: &Context, name: &str) -> LiquidResult<String>;

    /// Load a parsed template. Sources that do not cache return `None`,
    /// and the caller parses the text from [`read_template`].
    ///
    /// [`read_template`]: TemplateSource::read_template
    fn load_template(&self, _ctx: &Context, _name: &str) -> Option<LiquidResult<Arc<Template>>> {
        None
    }
}

/// Load and parse `name` through the context's template source.
pub(crate) fn load_template(ctx: &Context, name: &str) -> LiquidResult<Arc<Template>> {
    let source = ctx.registry().file_system();
    if let Some(loaded) = source.load_template(ctx, name) {
        return loaded;
    }
    let text = source.read_template(ctx, name)?;
    tracing::debug!(template = name, "Parsing loaded template");
    Ok(Arc::new(Template::parse_with(&text, Arc::clone(ctx.registry()))?))
}

/// Source that refuses every load. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlankFileSystem;

impl TemplateSource for BlankFileSystem {
    fn read_template(&self, _ctx: &Context, _name: &str) -> LiquidResult<String> {
        Err(LiquidError::file_system(
            "This liquid context does not allow includes.",
        ))
    }
}

/// Source that serves templates from an in-memory map and caches each
/// parse.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    templates: HashMap<String, String>,
    parsed: RwLock<HashMap<String, Arc<Template>>>,
    parses: AtomicUsize,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, content: impl Into<String>) -> &mut Self {
        let name = name.into();
        write_lock(&self.parsed).remove(&name);
        self.templates.insert(name, content.into());
        self
    }

    /// Create a source with the given templates.
    pub fn with_templates(
        templates: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        let mut source = Self::new();
        for (name, content) in templates {
            source.add(name, content);
        }
        source
    }

    /// How many templates have been parsed by this source.
    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::Relaxed)
    }
}

impl TemplateSource for MemoryFileSystem {
    fn read_template(&self, _ctx: &Context, name: &str) -> LiquidResult<String> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| LiquidError::file_system(format!("No such template '{}'", name)))
    }

    fn load_template(&self, ctx: &Context, name: &str) -> Option<LiquidResult<Arc<Template>>> {
        if let Some(template) = read_lock(&self.parsed).get(name) {
            return Some(Ok(Arc::clone(template)));
        }
        let loaded = self.read_template(ctx, name).and_then(|text| {
            Template::parse_with(&text, Arc::clone(ctx.registry())).map(Arc::new)
        });
        if let Ok(template) = &loaded {
            self.parses.fetch_add(1, Ordering::Relaxed);
            write_lock(&self.parsed).insert(name.to_string(), Arc::clone(template));
        }
        Some(loaded)
    }
}

/// Source that reads `_name.liquid` files below a root directory.
///
/// A name containing `/` selects a subdirectory: `shop/cart` maps to
/// `<root>/shop/_cart.liquid`.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalFileSystem { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The file a template name maps to. Names with dots, a leading slash
    /// or characters outside `[a-zA-Z0-9_/]` are rejected.
    pub fn full_path(&self, name: &str) -> LiquidResult<PathBuf> {
        if !TEMPLATE_NAME.is_match(name) {
            return Err(LiquidError::file_system(format!(
                "Illegal template name '{}'",
                name
            )));
        }

        let path = match name.rsplit_once('/') {
            Some((dir, base)) => self.root.join(dir).join(format!("_{}.liquid", base)),
            None => self.root.join(format!("_{}.liquid", name)),
        };

        if !path.starts_with(&self.root) {
            return Err(LiquidError::file_system(format!(
                "Illegal template path '{}'",
                path.display()
            )));
        }
        Ok(path)
    }
}

impl TemplateSource for LocalFileSystem {
    fn read_template(&self, _ctx: &Context, name: &str) -> LiquidResult<String> {
        let path = self.full_path(name)?;
        std::fs::read_to_string(&path).map_err(|err| {
            tracing::debug!(path = %path.display(), error = %err, "Template file not readable");
            LiquidError::file_system(format!("No such template '{}'", name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn context() -> Context {
        Context::new(Arc::new(Registry::new()))
    }

    #[test]
    fn test_blank_file_system_refuses() {
        let err = BlankFileSystem.read_template(&context(), "anything").unwrap_err();
        assert_eq!(
            err,
            LiquidError::file_system("This liquid context does not allow includes.")
        );
    }

    #[test]
    fn test_memory_file_system() {
        let source = MemoryFileSystem::with_templates([("header", "<h1>{{ title }}</h1>")]);
        let ctx = context();
        assert_eq!(
            source.read_template(&ctx, "header").unwrap(),
            "<h1>{{ title }}</h1>"
        );
        assert!(source.read_template(&ctx, "footer").is_err());
    }

    #[test]
    fn test_memory_file_system_caches_parses() {
        let source = MemoryFileSystem::with_templates([("header", "{{ title }}")]);
        let ctx = context();
        let first = source.load_template(&ctx, "header").unwrap().unwrap();
        let second = source.load_template(&ctx, "header").unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.parse_count(), 1);
    }

    #[test]
    fn test_local_paths() {
        let source = LocalFileSystem::new("/some/path");
        assert_eq!(
            source.full_path("mypartial").unwrap(),
            PathBuf::from("/some/path/_mypartial.liquid")
        );
        assert_eq!(
            source.full_path("dir/mypartial").unwrap(),
            PathBuf::from("/some/path/dir/_mypartial.liquid")
        );
    }

    #[test]
    fn test_local_rejects_illegal_names() {
        let source = LocalFileSystem::new("/some/path");
        assert!(source.full_path("../dir/mypartial").is_err());
        assert!(source.full_path("/dir/../../dir/mypartial").is_err());
        assert!(source.full_path("/etc/passwd").is_err());
        assert!(source.full_path("a.b").is_err());
    }

    #[test]
    fn test_local_reads_files() {
        let root = std::env::temp_dir().join(format!("quarto-liquid-fs-{}", std::process::id()));
        std::fs::create_dir_all(root.join("shop")).unwrap();
        std::fs::write(root.join("shop").join("_cart.liquid"), "cart").unwrap();

        let source = LocalFileSystem::new(&root);
        assert_eq!(source.read_template(&context(), "shop/cart").unwrap(), "cart");
        assert!(source.read_template(&context(), "shop/missing").is_err());

        std::fs::remove_dir_all(&root).unwrap();
    }
}
