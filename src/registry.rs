use std::sync::{Arc, LazyLock, RwLock};

use dashmap::DashMap;
use log::{debug, trace, warn};

use crate::Result;
use crate::config::RenderConfig;
use crate::error::{Error, RenderError};
use crate::tpl::helpers::{FnHelper, Helper, HelperDef, html_escape};
use crate::tpl::render_context::RenderContext;
use crate::tpl::template::Template;
use crate::value::{ToValue, Value};

/// Function used to escape `{{expr}}` output.
pub type EscapeFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// The process-wide registry behind [`crate::compile`] and [`crate::render`],
/// and the one `templates!` registers into.
pub static ENGINE: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Named templates and helpers, plus the default render configuration.
///
/// All methods take `&self`; the maps are internally guarded so a registry can
/// be shared across threads. Rendering clones the template's `Arc` out of the
/// map first and holds no lock while it runs.
pub struct Registry {
    templates: DashMap<String, Arc<Template>>,
    helpers: DashMap<String, Arc<dyn HelperDef>>,
    escape: RwLock<EscapeFn>,
    config: RenderConfig,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates an empty registry with the default (non-strict) configuration.
    pub fn new() -> Self {
        Self::with_config(RenderConfig::default())
    }

    pub fn with_config(config: RenderConfig) -> Self {
        Self {
            templates: DashMap::new(),
            helpers: DashMap::new(),
            escape: RwLock::new(Arc::new(html_escape)),
            config,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /* ------------------------------- templates ------------------------------- */

    /// Compiles `source` and stores it under `name`, replacing any previous
    /// template of that name.
    ///
    /// # Errors
    /// Returns the `SyntaxError` for malformed source. Nothing is stored in that
    /// case and a previous template of the same name stays in place.
    pub fn compile(&self, name: &str, source: &str) -> Result<()> {
        let template = Template::compile(name, source).inspect_err(|e| {
            debug!("Failed to compile template `{}`: {}", name, e);
        })?;
        debug!(
            "Compiled template `{}` ({} bytes, {} nodes)",
            name,
            source.len(),
            template.nodes.len()
        );
        self.templates.insert(name.to_string(), Arc::new(template));
        Ok(())
    }

    /// Partials are ordinary templates referenced by name.
    pub fn register_partial(&self, name: &str, source: &str) -> Result<()> {
        self.compile(name, source)
    }

    /// Stores an already compiled template under its own name.
    pub fn register_template(&self, template: Template) {
        self.templates
            .insert(template.name.clone(), Arc::new(template));
    }

    /// Compiles a batch of `(name, source)` pairs.
    ///
    /// Every asset is attempted. Those that compile are registered even when
    /// others fail.
    ///
    /// # Errors
    /// `Error::Assets` listing each failure, in input order.
    pub fn compile_assets(&self, assets: &[(&str, &str)]) -> Result<()> {
        let mut failures = Vec::new();
        for (name, source) in assets {
            match Template::compile(name, source) {
                Ok(template) => {
                    debug!("Loaded template asset `{}` ({} bytes)", name, source.len());
                    self.templates.insert(name.to_string(), Arc::new(template));
                }
                Err(e) => {
                    warn!("Failed to load template asset `{}`: {}", name, e);
                    failures.push(e);
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Assets(failures))
        }
    }

    pub fn unregister_template(&self, name: &str) -> Option<Arc<Template>> {
        self.templates.remove(name).map(|(_, t)| t)
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn get_template(&self, name: &str) -> Option<Arc<Template>> {
        self.templates.get(name).map(|t| t.value().clone())
    }

    pub fn template_names(&self) -> Vec<String> {
        self.templates.iter().map(|t| t.key().clone()).collect()
    }

    pub fn clear_templates(&self) {
        self.templates.clear();
    }

    /* -------------------------------- helpers -------------------------------- */

    /// Registers a helper. A later registration under the same name wins, and
    /// a helper named like a builtin replaces it.
    pub fn register_helper(&self, name: &str, helper: impl HelperDef + 'static) {
        self.helpers.insert(name.to_string(), Arc::new(helper));
    }

    /// Registers a closure as a value helper.
    pub fn register_fn<F>(&self, name: &str, f: F)
    where
        F: Fn(&Helper<'_, '_>) -> std::result::Result<Value, RenderError> + Send + Sync + 'static,
    {
        self.register_helper(name, FnHelper(f));
    }

    pub fn unregister_helper(&self, name: &str) -> bool {
        self.helpers.remove(name).is_some()
    }

    pub fn has_helper(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }

    pub(crate) fn helper(&self, name: &str) -> Option<Arc<dyn HelperDef>> {
        self.helpers.get(name).map(|h| h.value().clone())
    }

    /* -------------------------------- escaping ------------------------------- */

    /// Replaces the function applied to `{{expr}}` output.
    pub fn set_escape_fn(&self, f: impl Fn(&str) -> String + Send + Sync + 'static) {
        let mut escape = self.escape.write().unwrap_or_else(|e| e.into_inner());
        *escape = Arc::new(f);
    }

    /// Restores [`html_escape`].
    pub fn reset_escape_fn(&self) {
        self.set_escape_fn(html_escape);
    }

    pub(crate) fn escape_fn(&self) -> EscapeFn {
        self.escape
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /* ------------------------------- rendering ------------------------------- */

    /// A renderer over this registry with a configuration other than its default.
    pub fn renderer(&self, config: RenderConfig) -> Renderer<'_> {
        Renderer {
            registry: self,
            config,
        }
    }

    fn default_renderer(&self) -> Renderer<'_> {
        self.renderer(self.config.clone())
    }

    /// Renders the template registered as `name`.
    ///
    /// # Errors
    /// `RenderError::TemplateNotFound` if `name` was never compiled successfully;
    /// other render errors only in strict mode or when partials nest too deep.
    pub fn render<T: ToValue + ?Sized>(&self, name: &str, data: &T) -> Result<String> {
        self.default_renderer().render(name, data)
    }

    pub fn render_value(&self, name: &str, data: &Value) -> Result<String> {
        self.default_renderer().render_value(name, data)
    }

    /// Renders a template that need not be registered; partials still resolve here.
    pub fn render_template(&self, template: &Template, data: &Value) -> Result<String> {
        self.default_renderer().render_template(template, data)
    }

    /// Compiles and renders `source` without storing it.
    pub fn render_source<T: ToValue + ?Sized>(&self, source: &str, data: &T) -> Result<String> {
        self.default_renderer().render_source(source, data)
    }
}

/// A registry paired with one render configuration.
pub struct Renderer<'r> {
    registry: &'r Registry,
    config: RenderConfig,
}

impl Renderer<'_> {
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn render<T: ToValue + ?Sized>(&self, name: &str, data: &T) -> Result<String> {
        self.render_value(name, &data.to_value())
    }

    pub fn render_value(&self, name: &str, data: &Value) -> Result<String> {
        let template = self
            .registry
            .get_template(name)
            .ok_or_else(|| RenderError::TemplateNotFound(name.to_string()))?;
        self.render_template(&template, data)
    }

    pub fn render_template(&self, template: &Template, data: &Value) -> Result<String> {
        trace!("Rendering template `{}`", template.name);
        let mut rc = RenderContext::new(self.registry, &self.config, data, template.source_len);
        rc.render(&template.nodes).map_err(Error::from)?;
        Ok(rc.into_output())
    }

    pub fn render_source<T: ToValue + ?Sized>(&self, source: &str, data: &T) -> Result<String> {
        let template = Template::compile("", source)?;
        self.render_template(&template, &data.to_value())
    }
}

/// Compiles `source` into [`ENGINE`] under `name`.
pub fn compile(name: &str, source: &str) -> Result<()> {
    ENGINE.compile(name, source)
}

/// Renders the template registered in [`ENGINE`] as `name`.
pub fn render<T: ToValue + ?Sized>(name: &str, data: &T) -> Result<String> {
    ENGINE.render(name, data)
}
