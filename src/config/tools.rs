//! External tool commands and `{placeholder}` expansion in their arguments.
//!
//! Every external program the build runs is configurable under `[tools]`:
//!
//! ```toml
//! [tools.compiler]
//! program = "mbed"
//! args = ["compile", "-m", "{target}", "-t", "{toolchain}", "--source={sources}"]
//! ```
//!
//! Scalar placeholders are substituted in place. List placeholders (`sources`,
//! `no_parse`) repeat the whole argument once per item, and drop it when the list is
//! empty, so `--noparse={no_parse}` becomes one flag per module.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::core::FwError;
use crate::process::ToolCommand;

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{([a-z_]+)\}").unwrap_or_else(|_| unreachable!("placeholder regex is valid"))
    })
}

/// One external program and its argument template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Expands placeholders in the program name and arguments.
    pub fn expand(&self, values: &Placeholders) -> Result<(String, Vec<String>), FwError> {
        let program = values.expand_scalar(&self.program)?;
        let mut args = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            args.extend(values.expand_arg(arg)?);
        }
        Ok((program, args))
    }

    /// Builds a ready-to-run command, named `context` in logs and errors.
    pub fn command(&self, values: &Placeholders, context: &str) -> Result<ToolCommand, FwError> {
        let (program, args) = self.expand(values)?;
        Ok(ToolCommand::new(program).args(args).with_context(context))
    }
}

/// Values available to tool argument templates.
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    scalars: BTreeMap<String, String>,
    lists: BTreeMap<String, Vec<String>>,
}

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn scalar(mut self, name: &str, value: impl Into<String>) -> Self {
        self.scalars.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn list(mut self, name: &str, values: Vec<String>) -> Self {
        self.lists.insert(name.to_string(), values);
        self
    }

    fn unknown(&self, name: &str, template: &str) -> FwError {
        let known: Vec<&str> =
            self.scalars.keys().chain(self.lists.keys()).map(String::as_str).collect();
        FwError::ConfigError {
            message: format!(
                "unknown placeholder {{{name}}} in '{template}' (available: {})",
                known.join(", ")
            ),
        }
    }

    fn substitute(&self, template: &str, list_item: Option<(&str, &str)>) -> Result<String, FwError> {
        let mut result = String::with_capacity(template.len());
        let mut last = 0;
        for caps in placeholder_regex().captures_iter(template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            result.push_str(&template[last..whole.start()]);
            let name = name.as_str();
            match (self.scalars.get(name), list_item) {
                (Some(value), _) => result.push_str(value),
                (None, Some((list_name, item))) if list_name == name => result.push_str(item),
                _ => return Err(self.unknown(name, template)),
            }
            last = whole.end();
        }
        result.push_str(&template[last..]);
        Ok(result)
    }

    /// Expands a template that may only contain scalar placeholders.
    pub fn expand_scalar(&self, template: &str) -> Result<String, FwError> {
        self.substitute(template, None)
    }

    /// Expands one argument into zero or more arguments.
    pub fn expand_arg(&self, template: &str) -> Result<Vec<String>, FwError> {
        let list_names: Vec<&str> = placeholder_regex()
            .captures_iter(template)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
            .filter(|name| self.lists.contains_key(*name))
            .collect();

        match list_names.as_slice() {
            [] => Ok(vec![self.substitute(template, None)?]),
            [name] => {
                let items = self.lists.get(*name).map(Vec::as_slice).unwrap_or_default();
                items.iter().map(|item| self.substitute(template, Some((*name, item.as_str())))).collect()
            }
            _ => Err(FwError::ConfigError {
                message: format!("argument '{template}' uses more than one list placeholder"),
            }),
        }
    }
}

/// The external programs driven by the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolsConfig {
    /// Bundles the entry script with its dependencies.
    pub bundler: ToolSpec,
    /// Converts bundled scripts into native data sources.
    pub converter: ToolSpec,
    /// Generates the pin table for the target.
    pub pin_generator: ToolSpec,
    /// Compiles the firmware image.
    pub compiler: ToolSpec,
    /// Prints the installed package tree as JSON.
    pub package_manager: ToolSpec,
    /// Checks out the script runtime into `{runtime_dir}`.
    pub runtime_fetch: ToolSpec,
    /// Fetches the native libraries the runtime's board port needs.
    pub runtime_libs: ToolSpec,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            bundler: ToolSpec::new(
                "browserify",
                ["{entry}", "--no-builtins", "--noparse={no_parse}", "-g", "uglifyify", "-o", "{output}"],
            ),
            converter: ToolSpec::new(
                "python",
                [
                    "{runtime_dir}/targets/tools/js2c.py",
                    "--ignore",
                    "pins.js",
                    "--no-main",
                    "--dest",
                    "{js_data_dir}",
                    "--js-source",
                    "{build_dir}",
                ],
            ),
            pin_generator: ToolSpec::new(
                "python",
                ["{project_dir}/tools/generate_pins.py", "{target}"],
            ),
            compiler: ToolSpec::new(
                "make",
                [
                    "BOARD={target}",
                    "TOOLCHAIN={toolchain}",
                    "EXTRAS={extras}",
                ],
            ),
            package_manager: ToolSpec::new("npm", ["ls", "--json", "--long", "--production"]),
            runtime_fetch: ToolSpec::new(
                "sh",
                [
                    "-c",
                    "git clone https://github.com/jerryscript-project/jerryscript \"$1\" \
                     && git -C \"$1\" checkout {runtime_revision} \
                     && pip install -r \"$1/targets/mbedos5/tools/requirements.txt\"",
                    "fetch-runtime",
                    "{runtime_dir}",
                ],
            ),
            runtime_libs: ToolSpec::new("make", ["-C", "{runtime_dir}/targets/mbedos5", "getlibs"]),
        }
    }
}

/// Per-tool overrides from the `[tools]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolOverrides {
    pub bundler: Option<ToolSpec>,
    pub converter: Option<ToolSpec>,
    pub pin_generator: Option<ToolSpec>,
    pub compiler: Option<ToolSpec>,
    pub package_manager: Option<ToolSpec>,
    pub runtime_fetch: Option<ToolSpec>,
    pub runtime_libs: Option<ToolSpec>,
}

impl ToolsConfig {
    /// Defaults with any configured overrides applied.
    pub fn with_overrides(overrides: &ToolOverrides) -> Self {
        let defaults = Self::default();
        Self {
            bundler: overrides.bundler.clone().unwrap_or(defaults.bundler),
            converter: overrides.converter.clone().unwrap_or(defaults.converter),
            pin_generator: overrides.pin_generator.clone().unwrap_or(defaults.pin_generator),
            compiler: overrides.compiler.clone().unwrap_or(defaults.compiler),
            package_manager: overrides.package_manager.clone().unwrap_or(defaults.package_manager),
            runtime_fetch: overrides.runtime_fetch.clone().unwrap_or(defaults.runtime_fetch),
            runtime_libs: overrides.runtime_libs.clone().unwrap_or(defaults.runtime_libs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> Placeholders {
        Placeholders::new()
            .scalar("target", "K64F")
            .scalar("entry", "/p/main.js")
            .list("no_parse", vec!["/p/node_modules/bleno".into(), "/p/node_modules/x".into()])
            .list("sources", Vec::new())
    }

    #[test]
    fn test_scalar_substitution() {
        assert_eq!(values().expand_arg("BOARD={target}").unwrap(), vec!["BOARD=K64F"]);
        assert_eq!(values().expand_arg("plain").unwrap(), vec!["plain"]);
    }

    #[test]
    fn test_list_repeats_argument() {
        assert_eq!(
            values().expand_arg("--noparse={no_parse}").unwrap(),
            vec!["--noparse=/p/node_modules/bleno", "--noparse=/p/node_modules/x"]
        );
    }

    #[test]
    fn test_empty_list_drops_argument() {
        assert!(values().expand_arg("--source={sources}").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_placeholder() {
        let err = values().expand_arg("{nope}").unwrap_err();
        assert!(matches!(err, FwError::ConfigError { ref message } if message.contains("{nope}")));
    }

    #[test]
    fn test_two_lists_rejected() {
        assert!(values().expand_arg("{sources}:{no_parse}").is_err());
    }

    #[test]
    fn test_default_bundler_expansion() {
        let values = values().scalar("output", "/p/build/app.bundle.min.js");
        let (program, args) = ToolsConfig::default().bundler.expand(&values).unwrap();
        assert_eq!(program, "browserify");
        assert_eq!(args[0], "/p/main.js");
        assert_eq!(args.iter().filter(|a| a.starts_with("--noparse=")).count(), 2);
        assert_eq!(args.last().map(String::as_str), Some("/p/build/app.bundle.min.js"));
    }

    #[test]
    fn test_default_runtime_fetch_pins_revision() {
        let values = Placeholders::new()
            .scalar("runtime_dir", "/p/build/jerryscript")
            .scalar("runtime_revision", "abc123");
        let (program, args) = ToolsConfig::default().runtime_fetch.expand(&values).unwrap();
        assert_eq!(program, "sh");
        assert!(args[1].contains("checkout abc123"));
        assert!(args[1].contains("\"$1\""));
        assert_eq!(args.last().map(String::as_str), Some("/p/build/jerryscript"));
    }

    #[test]
    fn test_overrides_replace_single_tool() {
        let overrides = ToolOverrides {
            compiler: Some(ToolSpec::new("mbed", ["compile"])),
            ..ToolOverrides::default()
        };
        let tools = ToolsConfig::with_overrides(&overrides);
        assert_eq!(tools.compiler.program, "mbed");
        assert_eq!(tools.bundler, ToolsConfig::default().bundler);
    }
}
