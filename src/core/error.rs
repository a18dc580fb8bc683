//! Error handling for fwbundle
//!
//! This module provides the strongly-typed error taxonomy of the firmware build and the
//! user-facing error reporting built on top of it. The design follows two rules:
//! 1. **Strongly-typed errors** so callers (and tests) can discriminate failure modes
//! 2. **User-friendly messages** with an actionable suggestion when printed by the CLI
//!
//! # Error Categories
//!
//! - **Usage and configuration**: [`FwError::UsageError`], [`FwError::ConfigError`]
//! - **Discovery**: [`FwError::ManifestReadError`], [`FwError::InvalidManifest`],
//!   [`FwError::DuplicateExtension`], [`FwError::CyclicDependencyTree`],
//!   [`FwError::PackageTreeError`]
//! - **Graph construction**: [`FwError::DuplicateTask`], [`FwError::UnknownDependency`],
//!   [`FwError::CircularDependency`], [`FwError::OverlappingOutput`]
//! - **Rendering**: [`FwError::TemplateNotFound`], [`FwError::TemplateBindingError`],
//!   [`FwError::TemplateSyntaxError`]
//! - **Execution**: [`FwError::ExternalProcessError`], [`FwError::TaskFailed`]
//!
//! Discovery and graph-construction errors are raised before any task produces output.
//! Execution errors are raised by the task that failed and wrapped by the scheduler into
//! [`FwError::TaskFailed`] so the failing task is always named.
//!
//! # Examples
//!
//! ```rust,no_run
//! use fwbundle_cli::core::{FwError, user_friendly_error};
//!
//! let error = FwError::UsageError {
//!     message: "no target given".to_string(),
//! };
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for fwbundle operations.
///
/// Each variant names the component (or task) that raised it so the CLI can report
/// where the build stopped.
#[derive(Error, Debug)]
pub enum FwError {
    /// A required parameter is missing; raised before any task runs.
    #[error("Usage error: {message}")]
    UsageError {
        /// What is missing or inconsistent
        message: String,
    },

    /// Project configuration file is invalid
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// A located manifest could not be read from disk
    ///
    /// Fatal to the whole discovery pass: continuing would build firmware that silently
    /// lacks a native extension.
    #[error("Failed to read manifest {path}: {reason}")]
    ManifestReadError {
        /// Path to the manifest that could not be read
        path: String,
        /// Underlying I/O reason
        reason: String,
    },

    /// A manifest was read but its content is malformed or lacks a required field
    #[error("Invalid manifest {path}: {reason}")]
    InvalidManifest {
        /// Path to the offending manifest
        path: String,
        /// Why the manifest was rejected
        reason: String,
    },

    /// Two discovered extensions declare the same name
    #[error("Duplicate native extension '{name}' (declared by {first} and {second})")]
    DuplicateExtension {
        /// Extension name declared twice
        name: String,
        /// Owner directory of the first declaration
        first: String,
        /// Owner directory of the rejected declaration
        second: String,
    },

    /// The package tree reported by the package manager references itself
    #[error("Cyclic package tree: {chain}")]
    CyclicDependencyTree {
        /// Chain of install paths forming the cycle
        chain: String,
    },

    /// The package tree could not be obtained or parsed
    #[error("Failed to read package tree: {reason}")]
    PackageTreeError {
        /// Reason the tree is unusable
        reason: String,
    },

    /// The pin artifact could not be read
    #[error("Failed to read pin table {path}: {reason}")]
    PinReadError {
        /// Path to the pin artifact
        path: String,
        /// Underlying I/O reason
        reason: String,
    },

    /// A task id was registered twice in one graph
    #[error("Task '{id}' is already registered")]
    DuplicateTask {
        /// The duplicated task id
        id: String,
    },

    /// A task depends on an id that is not part of the graph
    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency {
        /// Task declaring the dependency
        task: String,
        /// Missing dependency id
        dependency: String,
    },

    /// The task graph contains a cycle
    #[error("Circular dependency detected: {chain}")]
    CircularDependency {
        /// String representation of the circular chain
        chain: String,
    },

    /// Two tasks declare the same output path
    #[error("Tasks '{first}' and '{second}' both write {path}")]
    OverlappingOutput {
        /// Output path claimed twice
        path: String,
        /// First task claiming the path
        first: String,
        /// Second task claiming the path
        second: String,
    },

    /// A template identifier resolved to no template
    #[error("Template '{name}' not found")]
    TemplateNotFound {
        /// The template identifier
        name: String,
    },

    /// A template references a context field that the render context does not provide
    #[error("Template '{template}' references missing field '{field}'")]
    TemplateBindingError {
        /// Template being rendered
        template: String,
        /// The unresolved field
        field: String,
    },

    /// A template failed to parse or render for a reason other than a missing field
    #[error("Template '{template}' failed to render: {reason}")]
    TemplateSyntaxError {
        /// Template being rendered
        template: String,
        /// Tera's explanation
        reason: String,
    },

    /// An external tool could not be spawned or exited unsuccessfully
    #[error("{tool} failed: {status}")]
    ExternalProcessError {
        /// Logical tool or task name (e.g. "bundle", "compile")
        tool: String,
        /// Exit status description or spawn failure reason
        status: String,
        /// Captured standard error, if any
        stderr: String,
    },

    /// A task of the build graph failed; the overall build result
    #[error("Task '{task}' failed: {reason}")]
    TaskFailed {
        /// Id of the first task that failed
        task: String,
        /// Underlying error chain, flattened
        reason: String,
    },

    /// File system error
    #[error("File system error: {operation} ({path})")]
    FileSystemError {
        /// The file system operation that failed
        operation: String,
        /// Path where the error occurred
        path: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Other error
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

/// Error wrapper that carries a suggestion and details for CLI display.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: FwError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: FwError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Flatten an error chain into a single `a: b: c` line.
pub fn format_error_chain(error: &anyhow::Error) -> String {
    error.chain().map(ToString::to_string).collect::<Vec<_>>().join(": ")
}

/// Convert any error to a user-friendly [`ErrorContext`].
///
/// Recognized [`FwError`]s get a tailored suggestion. Anything else is reported with its
/// full `Caused by` chain.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    // Context layers added on top of a typed error are kept as details
    let outer: Vec<String> = error.chain().map(ToString::to_string).collect();

    match error.downcast::<FwError>() {
        Ok(fw_error) => {
            let typed_message = fw_error.to_string();
            let mut ctx = create_error_context(fw_error);
            let extra: Vec<&String> = outer.iter().filter(|m| **m != typed_message).collect();
            if ctx.details.is_none() && !extra.is_empty() {
                ctx.details =
                    Some(extra.iter().map(|s| s.as_str()).collect::<Vec<_>>().join("\n  "));
            }
            ctx
        }
        Err(error) => {
            if let Some(io_error) = error.downcast_ref::<std::io::Error>()
                && io_error.kind() == std::io::ErrorKind::PermissionDenied
            {
                return ErrorContext::new(FwError::FileSystemError {
                    operation: "file access".to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion("Check ownership and permissions of the project and build directories");
            }

            let mut message = error.to_string();
            let chain: Vec<String> =
                error.chain().skip(1).map(std::string::ToString::to_string).collect();

            if !chain.is_empty() {
                message.push_str("\n\nCaused by:");
                for (i, cause) in chain.iter().enumerate() {
                    message.push_str(&format!("\n  {}: {}", i + 1, cause));
                }
            }

            ErrorContext::new(FwError::Other {
                message,
            })
        }
    }
}

fn create_error_context(error: FwError) -> ErrorContext {
    match &error {
        FwError::UsageError { .. } => ErrorContext::new(error)
            .with_suggestion("Pass --target <TARGET> (and --entry <ENTRY> when package.json has no \"main\"), or set them in fwbundle.toml"),

        FwError::ConfigError { .. } | FwError::TomlError(_) => ErrorContext::new(error)
            .with_suggestion("Check fwbundle.toml: keys are documented in the project README"),

        FwError::ManifestReadError { path, .. } => {
            let suggestion = format!("Check that {path} is readable; reinstall the package if it is broken");
            ErrorContext::new(error)
                .with_suggestion(suggestion)
                .with_details("A native extension that cannot be read would be missing from the firmware, so the build stops")
        }

        FwError::InvalidManifest { path, .. } => {
            let suggestion = format!(
                "Fix {path}: it must be JSON with a non-empty \"name\" string and a non-empty \"source\" array"
            );
            ErrorContext::new(error).with_suggestion(suggestion)
        }

        FwError::DuplicateExtension { name, .. } => {
            let suggestion = format!(
                "Only one installed package may provide native extension '{name}'. Deduplicate your dependencies"
            );
            ErrorContext::new(error).with_suggestion(suggestion)
        }

        FwError::CyclicDependencyTree { .. } | FwError::PackageTreeError { .. } => ErrorContext::new(error)
            .with_suggestion("Reinstall dependencies with your package manager, or use discovery = \"filesystem\""),

        FwError::UnknownDependency { .. }
        | FwError::DuplicateTask { .. }
        | FwError::CircularDependency { .. }
        | FwError::OverlappingOutput { .. } => ErrorContext::new(error)
            .with_details("The build graph is validated before any task runs; no outputs were written"),

        FwError::TemplateNotFound { name } => {
            let suggestion = format!("Add '{name}' to the configured template_dir or remove the override");
            ErrorContext::new(error).with_suggestion(suggestion)
        }

        FwError::TemplateBindingError { field, .. } => {
            let suggestion = format!(
                "The render context provides `libraries` and optionally `pins`; use `{{% if {field} is defined %}}` for optional data"
            );
            ErrorContext::new(error).with_suggestion(suggestion)
        }

        FwError::ExternalProcessError { tool, stderr, .. } => {
            let suggestion = format!("Check the [tools.{tool}] command in fwbundle.toml and that the program is on PATH");
            let details = if stderr.trim().is_empty() { None } else { Some(stderr.trim().to_string()) };
            let ctx = ErrorContext::new(error).with_suggestion(suggestion);
            match details {
                Some(d) => ctx.with_details(d),
                None => ctx,
            }
        }

        FwError::TaskFailed { .. } => ErrorContext::new(error)
            .with_details("Outputs of tasks that completed were left in the build directory and are reused by the next run"),

        _ => ErrorContext::new(error),
    }
}
