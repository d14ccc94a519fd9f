//! TOML-based run configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::description::{Causality, DescriptionHeader};
use crate::driver::{
    InstantiateOptions, StatusPolicy, VariableKind, VariableTable, fmu_binary_path,
};
use crate::session::{Injection, SessionPlan};

/// Top-level run configuration parsed from TOML.
///
/// Every section is optional and falls back to a dry run of the built-in
/// scripted component. Load with [`RunConfig::from_toml_file`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Header written into generated model descriptions.
    #[serde(default)]
    pub description: DescriptionHeader,
    /// Which component to drive and how to instantiate it.
    #[serde(default)]
    pub component: ComponentConfig,
    /// Stepping interval and scheduled injections.
    #[serde(default)]
    pub session: SessionConfig,
}

/// Component backend and instantiation parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComponentConfig {
    /// Backend: `"scripted"` (in-process) or `"library"` (shared library).
    pub backend: String,
    /// Shared library to load when `backend = "library"`.
    pub library_path: Option<PathBuf>,
    /// Unpacked FMU directory; the library is looked up under `binaries/`
    /// when `library_path` is not set.
    pub fmu_root: Option<PathBuf>,
    /// Instance name passed at instantiation.
    pub instance_name: String,
    /// Resource directory passed at instantiation.
    pub resource_path: Option<String>,
    pub visible: bool,
    pub logging_on: bool,
    /// `"strict"` or `"tolerate_warnings"`.
    pub status_policy: StatusPolicy,
    /// Delivery delay of the scripted component (s, must be >= 0).
    pub transport_delay: f64,
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            backend: "scripted".to_string(),
            library_path: None,
            fmu_root: None,
            instance_name: "pipeline".to_string(),
            resource_path: None,
            visible: false,
            logging_on: false,
            status_policy: StatusPolicy::Strict,
            transport_delay: 0.0,
        }
    }
}

impl ComponentConfig {
    /// Shared library to load: `library_path` if set, otherwise the
    /// platform binary of `model_identifier` under `fmu_root`.
    pub fn resolve_library_path(&self, model_identifier: &str) -> Option<PathBuf> {
        self.library_path.clone().or_else(|| {
            self.fmu_root
                .as_deref()
                .map(|root| fmu_binary_path(root, model_identifier))
        })
    }
}

/// Session timing and scheduled writes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Start time (s).
    pub start_time: f64,
    /// Stop time (s, must be >= start_time).
    pub stop_time: f64,
    /// Communication step size (s, must be > 0).
    pub step_size: f64,
    /// Time tolerance handed to the component, if any.
    pub tolerance: Option<f64>,
    /// Values written to inputs at scheduled times.
    pub injections: Vec<Injection>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            stop_time: 10.0,
            step_size: 1.0,
            tolerance: None,
            injections: Vec::new(),
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"session.step_size"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl RunConfig {
    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("config", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let d = &self.description;
        for (field, value) in [
            ("description.fmi_version", &d.fmi_version),
            ("description.model_name", &d.model_name),
            ("description.model_identifier", &d.model_identifier),
            ("description.instantiation_token", &d.instantiation_token),
        ] {
            if value.is_empty() {
                errors.push(ConfigError::new(field, "must not be empty"));
            }
        }

        let c = &self.component;
        match c.backend.as_str() {
            "scripted" => {}
            "library" => {
                if c.library_path.is_none() && c.fmu_root.is_none() {
                    errors.push(ConfigError::new(
                        "component.library_path",
                        "library_path or fmu_root required when component.backend = \"library\"",
                    ));
                }
            }
            other => errors.push(ConfigError::new(
                "component.backend",
                format!("must be \"scripted\" or \"library\", got \"{other}\""),
            )),
        }
        if c.instance_name.is_empty() {
            errors.push(ConfigError::new("component.instance_name", "must not be empty"));
        }
        if c.transport_delay < 0.0 {
            errors.push(ConfigError::new("component.transport_delay", "must be >= 0"));
        }

        let s = &self.session;
        if s.step_size <= 0.0 {
            errors.push(ConfigError::new("session.step_size", "must be > 0"));
        }
        if s.stop_time < s.start_time {
            errors.push(ConfigError::new(
                "session.stop_time",
                "must be >= session.start_time",
            ));
        }
        if let Some(tolerance) = s.tolerance {
            if tolerance <= 0.0 {
                errors.push(ConfigError::new("session.tolerance", "must be > 0"));
            }
        }
        for (i, injection) in s.injections.iter().enumerate() {
            if injection.time < s.start_time || injection.time > s.stop_time {
                errors.push(ConfigError::new(
                    format!("session.injections[{i}].time"),
                    "must lie within [session.start_time, session.stop_time]",
                ));
            }
        }

        errors
    }

    /// Checks that every injection targets a declared input signal.
    pub fn validate_injections(&self, variables: &VariableTable) -> Vec<ConfigError> {
        self.session
            .injections
            .iter()
            .enumerate()
            .filter(|(_, injection)| {
                !variables.get(&injection.variable).is_some_and(|e| {
                    e.kind == VariableKind::Int32 && e.causality == Causality::Input
                })
            })
            .map(|(i, injection)| {
                ConfigError::new(
                    format!("session.injections[{i}].variable"),
                    format!("\"{}\" is not an input signal", injection.variable),
                )
            })
            .collect()
    }

    /// Instantiation options for the configured component.
    pub fn instantiate_options(&self) -> InstantiateOptions {
        let mut options = InstantiateOptions::new(
            &self.component.instance_name,
            &self.description.instantiation_token,
        );
        options.resource_path = self.component.resource_path.clone();
        options.visible = self.component.visible;
        options.logging_on = self.component.logging_on;
        options
    }

    /// Session plan built from the `[session]` section.
    pub fn session_plan(&self) -> SessionPlan {
        SessionPlan {
            options: self.instantiate_options(),
            start_time: self.session.start_time,
            stop_time: self.session.stop_time,
            step_size: self.session.step_size,
            tolerance: self.session.tolerance,
            injections: self.session.injections.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_valid() {
        let cfg = RunConfig::default();
        let errors = cfg.validate();
        assert!(errors.is_empty(), "default should be valid: {errors:?}");
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[description]
model_name = "Grid"
model_identifier = "Grid"

[component]
backend = "library"
library_path = "/opt/fmu/binaries/x86_64-linux/Grid.so"
instance_name = "grid"
status_policy = "tolerate_warnings"

[session]
start_time = 0.0
stop_time = 20.0
step_size = 0.5
tolerance = 1e-6

[[session.injections]]
time = 1.0
variable = "A"
value = 5
"#;
        let cfg = RunConfig::from_toml_str(toml).expect("valid TOML");
        assert_eq!(cfg.description.model_name, "Grid");
        assert_eq!(cfg.description.fmi_version, "3.0-beta.1");
        assert_eq!(cfg.component.status_policy, StatusPolicy::TolerateWarnings);
        assert_eq!(cfg.session.injections.len(), 1);
        assert!(cfg.validate().is_empty());

        let plan = cfg.session_plan();
        assert_eq!(plan.options.instance_name, "grid");
        assert_eq!(plan.tolerance, Some(1e-6));
    }

    #[test]
    fn unknown_field_rejected() {
        let err = RunConfig::from_toml_str("[session]\nstep = 1.0\n");
        assert!(err.is_err());
        assert_eq!(err.unwrap_err().field, "toml");
    }

    #[test]
    fn validation_reports_field_paths() {
        let toml = r#"
[component]
backend = "library"

[session]
start_time = 5.0
stop_time = 1.0
step_size = 0.0

[[session.injections]]
time = 9.0
variable = "A"
value = 1
"#;
        let cfg = RunConfig::from_toml_str(toml).expect("valid TOML");
        let fields: Vec<_> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "component.library_path",
                "session.step_size",
                "session.stop_time",
                "session.injections[0].time",
            ]
        );
    }

    #[test]
    fn unknown_status_policy_rejected_at_parse() {
        let err = RunConfig::from_toml_str("[component]\nstatus_policy = \"lenient\"\n")
            .expect_err("unknown policy");
        assert_eq!(err.field, "toml");
        assert!(err.message.contains("lenient"));
    }

    #[test]
    fn injections_must_target_inputs() {
        use crate::description::emit;
        use crate::network::{TopologyBuilder, Transport};

        let mut builder = TopologyBuilder::new();
        builder
            .register_pipe("p", "A", "B", Transport::default())
            .expect("register");
        let desc = emit(&builder.classify_and_allocate(), &DescriptionHeader::default());
        let table = VariableTable::from_description(&desc);

        let mut cfg = RunConfig::default();
        cfg.session.injections = vec![
            Injection {
                time: 0.0,
                variable: "A".into(),
                value: 1,
            },
            Injection {
                time: 0.0,
                variable: "B".into(),
                value: 1,
            },
        ];
        let errors = cfg.validate_injections(&table);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "session.injections[1].variable");
    }

    #[test]
    fn library_found_under_fmu_root() {
        let cfg = RunConfig::from_toml_str(
            "[component]\nbackend = \"library\"\nfmu_root = \"/opt/fmu\"\n",
        )
        .expect("valid TOML");
        assert!(cfg.validate().is_empty());
        let path = cfg
            .component
            .resolve_library_path("Pipeline_configurable")
            .expect("path from fmu_root");
        assert!(path.starts_with("/opt/fmu/binaries"));
        assert!(
            path.file_stem()
                .is_some_and(|stem| stem == "Pipeline_configurable")
        );

        let mut explicit = cfg.clone();
        explicit.component.library_path = Some(PathBuf::from("/tmp/custom.so"));
        assert_eq!(
            explicit.component.resolve_library_path("Pipeline_configurable"),
            Some(PathBuf::from("/tmp/custom.so"))
        );
    }

    #[test]
    fn config_error_display() {
        let e = ConfigError::new("session.step_size", "must be > 0");
        assert_eq!(e.to_string(), "config error: session.step_size: must be > 0");
    }
}
