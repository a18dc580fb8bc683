//! Code generation from templates.
//!
//! Four templates are built in. Two generate native sources:
//!
//! - `native_libraries.h`: declares one setup function per native library, a table of
//!   library names and, when pin data is available, one `#define` per pin
//! - `main.cpp`: the firmware entry point, registering every native library before
//!   starting the script runtime
//!
//! The other two, `Makefile` and `.mbedignore`, are written to the build directory and
//! rendered with [`BuildFilesContext`].
//!
//! The source templates are rendered with [`RenderContext`]:
//!
//! - `libraries`: the discovered extensions, each with `name`, `source_dirs`, `owner` and
//!   the full manifest as `config`
//! - `pins`: `[{ name, value }]`, present only when the pin table was generated
//!
//! A `template_dir` may override any of them or add new ones. Two filters are
//! registered for emitting C: `c_ident` and `c_string`.
//!
//! Rendering is deterministic, and generated files are only rewritten when their content
//! changes.

pub mod filters;
mod renderer;

pub use renderer::{
    BuildFilesContext, IGNORE_FILE_TEMPLATE, MAIN_SOURCE_TEMPLATE, MAKEFILE_TEMPLATE,
    NATIVE_LIBRARIES_TEMPLATE, RenderContext, TemplateRenderer, format_tera_error,
};
