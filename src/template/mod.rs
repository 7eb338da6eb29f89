//! Directive-driven template engine.
//!
//! `Template::compile` turns a source string into a reusable
//! `CompiledTemplate`; `CompiledTemplate::evaluate` renders it against a
//! variable scope. `Engine` adds view-file resolution under a views
//! directory plus a compile cache, so repeated renders of the same view skip
//! the parse.

pub mod parser;
pub mod renderer;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::TemplateError;
use parser::Node;
pub use renderer::{html_escape, Scope};

/// Entry point for one-off template strings.
pub struct Template;

impl Template {
    /// Compile a template source into its node list.
    pub fn compile(source: &str) -> Result<CompiledTemplate, TemplateError> {
        let nodes = parser::parse_template(source)?;
        Ok(CompiledTemplate { nodes })
    }
}

/// A parsed template, ready to render any number of times.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    nodes: Vec<Node>,
}

impl CompiledTemplate {
    pub fn evaluate(&self, scope: &Scope) -> Result<String, TemplateError> {
        renderer::render_nodes(&self.nodes, scope)
    }
}

/// View loader: resolves names under a views directory, caches compiled
/// templates by name.
pub struct Engine {
    views_dir: PathBuf,
    cache: Mutex<HashMap<String, Arc<CompiledTemplate>>>,
}

impl Engine {
    pub fn new(views_dir: impl Into<PathBuf>) -> Self {
        Self {
            views_dir: views_dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Return a view file verbatim, without compiling it.
    pub fn render(&self, name: &str) -> Result<String, TemplateError> {
        let path = self.resolve_view(name)?;
        Ok(std::fs::read_to_string(path)?)
    }

    /// Compile (or fetch from cache) and evaluate a view.
    pub fn render_template(&self, name: &str, scope: &Scope) -> Result<String, TemplateError> {
        if let Some(compiled) = self.cached(name) {
            return compiled.evaluate(scope);
        }

        let path = self.resolve_view(name)?;
        let source = std::fs::read_to_string(path)?;
        let compiled = Arc::new(Template::compile(&source)?);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(name.to_string(), Arc::clone(&compiled));
        }
        compiled.evaluate(scope)
    }

    fn cached(&self, name: &str) -> Option<Arc<CompiledTemplate>> {
        self.cache.lock().ok()?.get(name).cloned()
    }

    /// Map a view name to a file. Dots and backslashes act as path
    /// separators; `name.html` is tried before the raw name.
    fn resolve_view(&self, name: &str) -> Result<PathBuf, TemplateError> {
        let normalized = name.replace(['\\', '.'], "/");

        let with_ext = self.views_dir.join(format!("{normalized}.html"));
        if with_ext.is_file() {
            return Ok(with_ext);
        }
        let raw = self.views_dir.join(&normalized);
        if raw.is_file() {
            return Ok(raw);
        }

        Err(TemplateError::ViewNotFound(
            name.to_string(),
            self.views_dir.display().to_string(),
        ))
    }
}

/// Hide the cache mutex from debug output.
impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("views_dir", &self.views_dir)
            .finish()
    }
}
