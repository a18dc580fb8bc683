//! The firmware build pipeline.
//!
//! Wires the build steps into a [`TaskGraph`]:
//!
//! ```text
//! make-build-dir ─┬─ fetch-runtime ─ get-libs ─┐
//!                 ├─ bundle ───────────────────┴─ cppify ──┐
//!                 ├─ generate-pins ─┐                      │
//!                 ├─ discover ──────┴─ codegen ────────────┼─ compile
//!                 └─ build-files ──────────────────────────┘
//! ```
//!
//! `fetch-runtime` and `get-libs` are left out when `prepare_runtime` is off, and
//! `fetch-runtime` does nothing when the runtime checkout already exists.
//!
//! Steps only communicate through files in the build directory. In particular the
//! extension list is written to `extensions.json` by `discover` and read back by
//! `codegen` and `compile`, and the pin table is read from `out/pins.js`.

mod clean;

pub use clean::{CleanScope, clean};

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;

use crate::config::BuildConfig;
use crate::constants::JS_OUT_DIR;
use crate::core::FwError;
use crate::discovery;
use crate::graph::{BuildGraph, BuildReport, Scheduler, TaskGraph, TaskKind, TaskNode};
use crate::manifest::ExtensionSet;
use crate::pins::load_pins;
use crate::templating::{
    BuildFilesContext, IGNORE_FILE_TEMPLATE, MAIN_SOURCE_TEMPLATE, MAKEFILE_TEMPLATE,
    NATIVE_LIBRARIES_TEMPLATE, RenderContext, TemplateRenderer,
};
use crate::utils::{ensure_dir, normalize_path_for_storage};

pub const MAKE_BUILD_DIR: &str = "make-build-dir";
pub const BUILD_FILES: &str = "build-files";
pub const FETCH_RUNTIME: &str = "fetch-runtime";
pub const GET_LIBS: &str = "get-libs";
pub const BUNDLE: &str = "bundle";
pub const GENERATE_PINS: &str = "generate-pins";
pub const DISCOVER: &str = "discover";
pub const CPPIFY: &str = "cppify";
pub const CODEGEN: &str = "codegen";
pub const COMPILE: &str = "compile";

/// Builds and validates the task graph for `config`.
///
/// Tool argument templates are expanded once up front so a bad `[tools]` entry is
/// reported before anything runs.
pub fn build_graph(config: Arc<BuildConfig>) -> Result<BuildGraph> {
    validate_tools(&config)?;

    let renderer = Arc::new(TemplateRenderer::new(config.template_dir.clone()));
    let mut graph = TaskGraph::new();

    graph.add_task(make_build_dir_task(Arc::clone(&config)))?;
    graph.add_task(build_files_task(Arc::clone(&config), Arc::clone(&renderer)))?;
    if config.prepare_runtime {
        graph.add_task(fetch_runtime_task(Arc::clone(&config)))?;
        graph.add_task(get_libs_task(Arc::clone(&config)))?;
    }
    graph.add_task(bundle_task(Arc::clone(&config)))?;
    if config.pins {
        graph.add_task(generate_pins_task(Arc::clone(&config)))?;
    }
    graph.add_task(discover_task(Arc::clone(&config)))?;
    graph.add_task(cppify_task(Arc::clone(&config)))?;
    graph.add_task(codegen_task(Arc::clone(&config), renderer))?;
    graph.add_task(compile_task(config))?;

    Ok(graph.build()?)
}

/// Task ids in an order the build could run them.
pub fn plan(config: Arc<BuildConfig>) -> Result<Vec<String>> {
    Ok(build_graph(config)?.topological_order())
}

/// Runs the full build.
pub async fn build(config: BuildConfig, show_progress: bool) -> Result<BuildReport> {
    let start = Instant::now();
    let config = Arc::new(config);
    tracing::info!(
        target: "pipeline",
        "Building {} for {} ({})",
        config.package_name,
        config.target,
        config.toolchain
    );

    let graph = build_graph(Arc::clone(&config))?;
    let report = Scheduler::new(config.max_parallel)
        .with_progress(show_progress)
        .execute(graph)
        .await?;

    tracing::info!(
        target: "pipeline",
        "Build finished in {:.2}s, compiler log at {}",
        start.elapsed().as_secs_f64(),
        config.build_log_path().display()
    );
    Ok(report)
}

fn validate_tools(config: &BuildConfig) -> Result<(), FwError> {
    let values = config.placeholders().scalar("extras", "").list("sources", Vec::new());
    let tools = &config.tools;
    let mut checked = vec![
        ("bundler", &tools.bundler),
        ("converter", &tools.converter),
        ("pin_generator", &tools.pin_generator),
        ("compiler", &tools.compiler),
    ];
    if config.prepare_runtime {
        checked.push(("runtime_fetch", &tools.runtime_fetch));
        checked.push(("runtime_libs", &tools.runtime_libs));
    }
    for (name, tool) in checked {
        tool.expand(&values).map_err(|e| FwError::ConfigError {
            message: format!("tools.{name}: {e}"),
        })?;
    }
    Ok(())
}

fn make_build_dir_task(config: Arc<BuildConfig>) -> TaskNode {
    TaskNode::new(MAKE_BUILD_DIR, TaskKind::Filesystem, move || async move {
        for dir in [config.build_dir.clone(), config.js_dir(), config.source_dir()] {
            ensure_dir(&dir)?;
        }
        Ok(())
    })
}

fn build_files_task(config: Arc<BuildConfig>, renderer: Arc<TemplateRenderer>) -> TaskNode {
    let makefile = config.build_dir.join(MAKEFILE_TEMPLATE);
    let ignore_file = config.build_dir.join(IGNORE_FILE_TEMPLATE);
    TaskNode::new(BUILD_FILES, TaskKind::Render, move || async move {
        let context = BuildFilesContext {
            target: config.target.clone(),
            toolchain: config.toolchain.clone(),
            runtime_dir: normalize_path_for_storage(&config.runtime_dir),
            source_dir: normalize_path_for_storage(config.source_dir()),
            js_data_dir: normalize_path_for_storage(config.js_data_dir()),
            ignored: vec![JS_OUT_DIR.to_string()],
        };
        for template in [MAKEFILE_TEMPLATE, IGNORE_FILE_TEMPLATE] {
            renderer.render_to_file(template, &config.build_dir.join(template), &context)?;
        }
        Ok(())
    })
    .depends_on(MAKE_BUILD_DIR)
    .output(makefile)
    .output(ignore_file)
}

fn fetch_runtime_task(config: Arc<BuildConfig>) -> TaskNode {
    let output = config.runtime_dir.clone();
    TaskNode::new(FETCH_RUNTIME, TaskKind::Process, move || async move {
        if config.runtime_dir.exists() {
            tracing::info!(
                target: "pipeline",
                "Using existing runtime checkout at {}",
                config.runtime_dir.display()
            );
            return Ok(());
        }

        config
            .tools
            .runtime_fetch
            .command(&config.placeholders(), FETCH_RUNTIME)?
            .current_dir(&config.build_dir)
            .execute_success()
            .await?;

        if !config.runtime_dir.is_dir() {
            return Err(FwError::FileSystemError {
                operation: "runtime fetch left no checkout".to_string(),
                path: config.runtime_dir.display().to_string(),
            }
            .into());
        }
        Ok(())
    })
    .depends_on(MAKE_BUILD_DIR)
    .output(output)
}

fn get_libs_task(config: Arc<BuildConfig>) -> TaskNode {
    TaskNode::new(GET_LIBS, TaskKind::Process, move || async move {
        config
            .tools
            .runtime_libs
            .command(&config.placeholders(), GET_LIBS)?
            .current_dir(&config.build_dir)
            .execute_success()
            .await
    })
    .depends_on(FETCH_RUNTIME)
}

fn bundle_task(config: Arc<BuildConfig>) -> TaskNode {
    let output = config.bundle_path();
    TaskNode::new(BUNDLE, TaskKind::Process, move || async move {
        if !config.entry.is_file() {
            return Err(FwError::UsageError {
                message: format!("entry script {} does not exist", config.entry.display()),
            }
            .into());
        }
        config
            .tools
            .bundler
            .command(&config.placeholders(), BUNDLE)?
            .current_dir(&config.project_dir)
            .execute_success()
            .await
    })
    .depends_on(MAKE_BUILD_DIR)
    .output(output)
}

fn generate_pins_task(config: Arc<BuildConfig>) -> TaskNode {
    let output = config.pins_path();
    TaskNode::new(GENERATE_PINS, TaskKind::Process, move || async move {
        config
            .tools
            .pin_generator
            .command(&config.placeholders(), GENERATE_PINS)?
            .current_dir(config.js_dir())
            .execute_success()
            .await?;

        let pins = config.pins_path();
        if !pins.is_file() {
            return Err(FwError::PinReadError {
                path: pins.display().to_string(),
                reason: "the pin generator did not write it".to_string(),
            }
            .into());
        }
        Ok(())
    })
    .depends_on(MAKE_BUILD_DIR)
    .output(output)
}

fn discover_task(config: Arc<BuildConfig>) -> TaskNode {
    let output = config.extensions_path();
    TaskNode::new(DISCOVER, TaskKind::Discovery, move || async move {
        let extensions = discovery::discover(&config.discovery).await?;
        extensions.save(&config.extensions_path())
    })
    .depends_on(MAKE_BUILD_DIR)
    .output(output)
}

fn cppify_task(config: Arc<BuildConfig>) -> TaskNode {
    let output = config.js_data_dir();
    let after_runtime = config.prepare_runtime;
    let node = TaskNode::new(CPPIFY, TaskKind::Process, move || async move {
        ensure_dir(&config.js_data_dir())?;
        config
            .tools
            .converter
            .command(&config.placeholders(), CPPIFY)?
            .current_dir(&config.build_dir)
            .execute_success()
            .await
    })
    .depends_on(BUNDLE)
    .output(output);

    if after_runtime { node.depends_on(GET_LIBS) } else { node }
}

fn codegen_task(config: Arc<BuildConfig>, renderer: Arc<TemplateRenderer>) -> TaskNode {
    let source_dir = config.source_dir();
    let with_pins = config.pins;
    let node = TaskNode::new(CODEGEN, TaskKind::Render, move || async move {
        let extensions = load_extensions(&config)?;
        let pins = if config.pins { Some(load_pins(&config.pins_path())?) } else { None };
        let context = RenderContext::new(extensions.as_slice().to_vec(), pins);

        let source_dir = config.source_dir();
        for template in [NATIVE_LIBRARIES_TEMPLATE, MAIN_SOURCE_TEMPLATE] {
            renderer.render_to_file(template, &source_dir.join(template), &context)?;
        }
        Ok(())
    })
    .depends_on(DISCOVER)
    .output(source_dir.join(NATIVE_LIBRARIES_TEMPLATE))
    .output(source_dir.join(MAIN_SOURCE_TEMPLATE));

    if with_pins { node.depends_on(GENERATE_PINS) } else { node }
}

fn compile_task(config: Arc<BuildConfig>) -> TaskNode {
    let output = config.build_log_path();
    TaskNode::new(COMPILE, TaskKind::Process, move || async move {
        let extensions = load_extensions(&config)?;

        let mut sources = extensions.source_dirs();
        if let Some(extras) = &config.native_extras {
            sources.push(normalize_path_for_storage(extras));
        }

        let values = config
            .placeholders()
            .scalar("extras", sources.join(":"))
            .list("sources", sources);

        config
            .tools
            .compiler
            .command(&values, COMPILE)?
            .current_dir(&config.build_dir)
            .log_to(config.build_log_path())
            .execute_success()
            .await
    })
    .depends_on(CPPIFY)
    .depends_on(CODEGEN)
    .depends_on(BUILD_FILES)
    .output(output)
}

fn load_extensions(config: &BuildConfig) -> Result<ExtensionSet> {
    let path = config.extensions_path();
    ExtensionSet::load(&path)
        .with_context(|| format!("Extension list {} is unreadable; run discovery again", path.display()))
}
