//! View rendering.
//!
//! Templates are addressed by dotted names (`users.show`). The default renderer maps
//! them onto files below the configured view directory (`users/show.html`) and renders
//! them with `minijinja`. Data comes from the application-wide [`ViewData`] merged with
//! the data passed to each render call.

use anyhow::{anyhow, Context as _, Result};
use minijinja::Environment;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Template data.
pub type ViewMap = serde_json::Map<String, Value>;

/// Anything that can turn a template name plus data into a string.
pub trait ViewRenderer: Send + Sync {
    /// # Errors
    ///
    /// Missing templates and template errors.
    fn render(&self, template: &str, data: &ViewMap) -> Result<String>;
}

/// Key/value data shared with every template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewData {
    data: ViewMap,
}

impl ViewData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.data.insert(key.to_string(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Merge `data` in, overwriting existing keys.
    pub fn append(&mut self, data: ViewMap) {
        self.data.extend(data);
    }

    /// Replace everything.
    pub fn replace(&mut self, data: ViewMap) {
        self.data = data;
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    #[must_use]
    pub fn all(&self) -> &ViewMap {
        &self.data
    }

    /// Shared data overlaid with per-call data.
    ///
    /// Non-object `extra` values are exposed under `data`.
    #[must_use]
    pub fn merged(&self, extra: Value) -> ViewMap {
        let mut merged = self.data.clone();
        match extra {
            Value::Object(map) => merged.extend(map),
            Value::Null => {}
            other => {
                merged.insert("data".to_string(), other);
            }
        }
        merged
    }
}

/// Renders `<base>/<name with dots as slashes>.<extension>` with minijinja.
#[derive(Debug, Clone)]
pub struct MinijinjaRenderer {
    base_dir: PathBuf,
    extension: String,
}

impl MinijinjaRenderer {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            base_dir: base_dir.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// File for a template name; `None` if the name tries to leave the view directory.
    #[must_use]
    pub fn template_path(&self, template: &str) -> Option<PathBuf> {
        let relative = template.trim_start_matches('/').replace('.', "/");
        let mut path = self.base_dir.clone();
        for comp in Path::new(&relative).components() {
            match comp {
                Component::Normal(s) => path.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        if path == self.base_dir {
            return None;
        }
        path.set_extension(&self.extension);
        Some(path)
    }
}

impl ViewRenderer for MinijinjaRenderer {
    fn render(&self, template: &str, data: &ViewMap) -> Result<String> {
        let path = self
            .template_path(template)
            .ok_or_else(|| anyhow!("invalid template name `{template}`"))?;
        let source = fs::read_to_string(&path)
            .with_context(|| format!("failed to read template {}", path.display()))?;
        // registered under the file name so `.html` templates are auto-escaped
        let name = path.display().to_string();
        let mut env = Environment::new();
        env.add_template(&name, &source)?;
        let rendered = env.get_template(&name)?.render(data)?;
        Ok(rendered)
    }
}

/// In-memory templates, handy for small applications and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryTemplates {
    templates: HashMap<String, String>,
}

impl MemoryTemplates {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: &str, source: &str) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: &str, source: &str) {
        self.templates.insert(name.to_string(), source.to_string());
    }
}

impl ViewRenderer for MemoryTemplates {
    fn render(&self, template: &str, data: &ViewMap) -> Result<String> {
        let mut env = Environment::new();
        for (name, source) in &self.templates {
            env.add_template(name, source)?;
        }
        let rendered = env
            .get_template(template)
            .with_context(|| format!("unknown template `{template}`"))?
            .render(data)?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_template_path_maps_dots() {
        let renderer = MinijinjaRenderer::new("views", "html");
        assert_eq!(
            renderer.template_path("users.show"),
            Some(PathBuf::from("views/users/show.html"))
        );
        assert!(renderer.template_path("../secrets").is_none());
        assert!(renderer.template_path("").is_none());
    }

    #[test]
    fn test_merged_overlays_call_data() {
        let mut shared = ViewData::new();
        shared.set("title", "Home");
        shared.set("user", "guest");
        let merged = shared.merged(json!({ "user": "ada" }));
        assert_eq!(merged["title"], "Home");
        assert_eq!(merged["user"], "ada");
        let merged = shared.merged(json!([1, 2]));
        assert_eq!(merged["data"], json!([1, 2]));
    }

    #[test]
    fn test_memory_templates_render() {
        let views = MemoryTemplates::new().with("hello", "<p>Hello {{ name }}</p>");
        let mut data = ViewMap::new();
        data.insert("name".into(), json!("<b>you</b>"));
        let out = views.render("hello", &data).unwrap();
        assert_eq!(out, "<p>Hello <b>you</b></p>");
        assert!(views.render("missing", &data).is_err());
    }
}
