//! Template lookup and rendering.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use strsim::levenshtein;
use tera::{Context as TeraContext, Tera};

use super::filters;
use crate::core::FwError;
use crate::manifest::ExtensionDescriptor;
use crate::pins::PinEntry;

/// Header declaring the native libraries (and pins).
pub const NATIVE_LIBRARIES_TEMPLATE: &str = "native_libraries.h";

/// Firmware entry point registering every native library.
pub const MAIN_SOURCE_TEMPLATE: &str = "main.cpp";

/// Makefile placed in the build directory, delegating to the runtime's board port.
pub const MAKEFILE_TEMPLATE: &str = "Makefile";

/// Ignore file keeping non-source build directories out of the native build.
pub const IGNORE_FILE_TEMPLATE: &str = ".mbedignore";

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (NATIVE_LIBRARIES_TEMPLATE, include_str!("builtin/native_libraries.h.tera")),
    (MAIN_SOURCE_TEMPLATE, include_str!("builtin/main.cpp.tera")),
    (MAKEFILE_TEMPLATE, include_str!("builtin/Makefile.tera")),
    (IGNORE_FILE_TEMPLATE, include_str!("builtin/mbedignore.tera")),
];

/// Names the templates can reference, used for "did you mean" hints.
const CONTEXT_FIELDS: &[&str] = &[
    "libraries",
    "pins",
    "lib.name",
    "lib.source_dirs",
    "lib.config",
    "lib.owner",
    "pin.name",
    "pin.value",
    "target",
    "toolchain",
    "runtime_dir",
    "source_dir",
    "js_data_dir",
    "ignored",
];

fn variable_regex() -> &'static Regex {
    static VARIABLE: OnceLock<Regex> = OnceLock::new();
    VARIABLE.get_or_init(|| {
        Regex::new(r"(?:Variable|Field) `([^`]+)` not found")
            .unwrap_or_else(|_| unreachable!("variable regex is valid"))
    })
}

/// Data available to templates.
///
/// `pins` is omitted from the context entirely when absent, so templates test it with
/// `{% if pins is defined %}`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RenderContext {
    pub libraries: Vec<ExtensionDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pins: Option<Vec<PinEntry>>,
}

impl RenderContext {
    pub fn new(libraries: Vec<ExtensionDescriptor>, pins: Option<Vec<PinEntry>>) -> Self {
        Self {
            libraries,
            pins,
        }
    }
}

/// Data available to the build directory templates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildFilesContext {
    pub target: String,
    pub toolchain: String,
    pub runtime_dir: String,
    pub source_dir: String,
    pub js_data_dir: String,
    /// Build-relative directories the native build must skip.
    pub ignored: Vec<String>,
}

/// Renders built-in or user-supplied templates with the C filters registered.
///
/// A template found in the override directory takes precedence over the built-in one
/// of the same name.
#[derive(Clone)]
pub struct TemplateRenderer {
    tera: Tera,
    template_dir: Option<PathBuf>,
}

impl TemplateRenderer {
    pub fn new(template_dir: Option<PathBuf>) -> Self {
        let mut tera = Tera::default();
        tera.register_filter("c_ident", filters::c_ident_filter);
        tera.register_filter("c_string", filters::c_string_filter);
        Self {
            tera,
            template_dir,
        }
    }

    /// Returns the source of template `name`.
    pub fn template_source(&self, name: &str) -> Result<String, FwError> {
        if let Some(dir) = &self.template_dir {
            for candidate in [dir.join(name), dir.join(format!("{name}.tera"))] {
                if candidate.is_file() {
                    tracing::debug!(target: "templating", "Using template override {}", candidate.display());
                    return std::fs::read_to_string(&candidate).map_err(|e| {
                        FwError::TemplateSyntaxError {
                            template: name.to_string(),
                            reason: format!("cannot read {}: {e}", candidate.display()),
                        }
                    });
                }
            }
        }

        BUILTIN_TEMPLATES
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .map(|(_, source)| (*source).to_string())
            .ok_or_else(|| FwError::TemplateNotFound {
                name: name.to_string(),
            })
    }

    /// Renders template `name` with `context`.
    pub fn render<C: Serialize>(&self, name: &str, context: &C) -> Result<String, FwError> {
        let source = self.template_source(name)?;

        let mut tera = self.tera.clone();
        tera.add_raw_template(name, &source).map_err(|e| FwError::TemplateSyntaxError {
            template: name.to_string(),
            reason: format_tera_error(&e),
        })?;

        let tera_context =
            TeraContext::from_serialize(context).map_err(|e| FwError::TemplateSyntaxError {
                template: name.to_string(),
                reason: format_tera_error(&e),
            })?;

        tera.render(name, &tera_context).map_err(|e| classify_render_error(name, &e))
    }

    /// Renders template `name` into `dest`, leaving `dest` untouched when the output is
    /// unchanged. Returns whether the file was written.
    pub fn render_to_file<C: Serialize>(&self, name: &str, dest: &Path, context: &C) -> Result<bool> {
        let rendered = self.render(name, context)?;
        let written = crate::utils::write_if_changed(dest, &rendered)
            .with_context(|| format!("Failed to write rendered template to {}", dest.display()))?;
        if written {
            tracing::debug!(target: "templating", "Rendered {} -> {}", name, dest.display());
        }
        Ok(written)
    }
}

fn classify_render_error(template: &str, error: &tera::Error) -> FwError {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(err) = current {
        let message = err.to_string();
        if let Some(caps) = variable_regex().captures(&message)
            && let Some(field) = caps.get(1)
        {
            let field = field.as_str().to_string();
            if let Some(similar) = similar_field(&field) {
                tracing::warn!(target: "templating", "Template '{}': did you mean `{}`?", template, similar);
            }
            return FwError::TemplateBindingError {
                template: template.to_string(),
                field,
            };
        }
        current = err.source();
    }

    FwError::TemplateSyntaxError {
        template: template.to_string(),
        reason: format_tera_error(error),
    }
}

fn similar_field(field: &str) -> Option<&'static str> {
    CONTEXT_FIELDS
        .iter()
        .map(|known| (*known, levenshtein(field, known)))
        .filter(|(known, distance)| *distance > 0 && *distance <= known.len() / 3 + 1)
        .min_by_key(|(_, distance)| *distance)
        .map(|(known, _)| known)
}

/// Flattens a tera error chain into one line.
pub fn format_tera_error(error: &tera::Error) -> String {
    use std::error::Error;

    let mut messages = vec![error.to_string()];
    let mut current = error.source();
    while let Some(err) = current {
        messages.push(err.to_string());
        current = err.source();
    }
    messages.retain(|m| !m.trim().is_empty());
    messages.join(": ")
}
