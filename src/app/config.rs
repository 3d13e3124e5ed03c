//! Normalised application configuration
//!
//! Application files are YAML. Legacy keys (`toolstack`,
//! `web.document_root`, string-form mounts) are folded into the current
//! shape while parsing, so the rest of the crate only sees one form.

use crate::error::{PlatformError, PlatformResult};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Document root used when an app declares none
pub const DEFAULT_DOCUMENT_ROOT: &str = "public";

/// Lifecycle hooks, each a shell script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hooks {
    pub build: Option<String>,
    pub deploy: Option<String>,
    pub post_deploy: Option<String>,
}

/// A mount whose files live in the local shared directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedMount {
    /// Mount path relative to the app's build directory
    pub path: String,
    /// Path below the app's shared directory
    pub source_path: String,
}

/// An application's configuration after normalisation
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Explicit application name
    pub name: Option<String>,
    /// Runtime type, e.g. `php:8.2`
    pub stack: Option<String>,
    /// Declared build flavor
    pub flavor: Option<String>,
    /// Disk size in MB
    pub disk: Option<u64>,
    /// Document root relative to the app root, without leading slash
    pub document_root: String,
    /// Whether the document root was declared explicitly
    pub document_root_declared: bool,
    pub move_to_root: bool,
    pub mounts: Vec<SharedMount>,
    pub hooks: Hooks,
    /// Build dependencies: stack to package to version constraint
    pub dependencies: BTreeMap<String, BTreeMap<String, String>>,
    /// Raw `caches` section, validated by the build cache collection
    pub caches: Value,
    /// Explicit `source.root`
    pub source_root: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAppConfig {
    name: Option<String>,
    #[serde(rename = "type")]
    stack: Option<String>,
    toolstack: Option<String>,
    build: RawBuild,
    disk: Option<u64>,
    web: RawWeb,
    move_to_root: bool,
    mounts: Mapping,
    hooks: RawHooks,
    dependencies: BTreeMap<String, Mapping>,
    caches: Value,
    source: RawSource,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBuild {
    flavor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawWeb {
    document_root: Option<String>,
    locations: Mapping,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawHooks {
    build: Option<Script>,
    deploy: Option<Script>,
    post_deploy: Option<Script>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSource {
    root: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Script {
    Text(String),
    Lines(Vec<String>),
}

impl Script {
    fn into_text(self) -> Option<String> {
        let text = match self {
            Script::Text(text) => text,
            Script::Lines(lines) => lines.join("\n"),
        };
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

impl AppConfig {
    /// Parse an application file
    pub fn from_file(path: &Path) -> PlatformResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PlatformError::io(format!("reading {}", path.display()), e))?;
        let value: Value = serde_yaml::from_str(&content)
            .map_err(|e| PlatformError::invalid_config(format!("{}: {}", path.display(), e)))?;
        Self::from_value(value).map_err(|e| match e {
            PlatformError::InvalidConfig(reason) => {
                PlatformError::invalid_config(format!("{}: {}", path.display(), reason))
            }
            other => other,
        })
    }

    /// Normalise an already-parsed configuration document
    pub fn from_value(value: Value) -> PlatformResult<Self> {
        let value = match value {
            Value::Null => Value::Mapping(Mapping::new()),
            Value::Mapping(map) => Value::Mapping(map),
            other => {
                return Err(PlatformError::invalid_config(format!(
                    "application config must be a map, found {}",
                    type_name(&other)
                )))
            }
        };
        let raw: RawAppConfig = serde_yaml::from_value(value)
            .map_err(|e| PlatformError::invalid_config(e.to_string()))?;

        let (stack, flavor) = match raw.toolstack {
            Some(toolstack) => match toolstack.split_once(':') {
                Some((stack, flavor)) if !stack.is_empty() => {
                    (Some(stack.to_string()), Some(flavor.to_string()))
                }
                _ => {
                    return Err(PlatformError::invalid_config(format!(
                        "invalid value for 'toolstack': {}",
                        toolstack
                    )))
                }
            },
            None => (raw.stack, raw.build.flavor),
        };

        let declared_root = raw
            .web
            .document_root
            .or_else(|| location_root(&raw.web.locations));
        let document_root_declared = declared_root.is_some();
        let document_root = declared_root
            .map(|root| root.trim_start_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_DOCUMENT_ROOT.to_string());

        let mut dependencies = BTreeMap::new();
        for (stack_name, packages) in raw.dependencies {
            let mut versions = BTreeMap::new();
            for (package, version) in packages {
                let Some(package) = package.as_str() else {
                    continue;
                };
                versions.insert(package.to_string(), scalar_string(&version));
            }
            dependencies.insert(stack_name, versions);
        }

        Ok(Self {
            name: raw.name.filter(|n| !n.is_empty()),
            stack,
            flavor: flavor.filter(|f| !f.is_empty()),
            disk: raw.disk,
            document_root,
            document_root_declared,
            move_to_root: raw.move_to_root,
            mounts: shared_mounts(&raw.mounts),
            hooks: Hooks {
                build: raw.hooks.build.and_then(Script::into_text),
                deploy: raw.hooks.deploy.and_then(Script::into_text),
                post_deploy: raw.hooks.post_deploy.and_then(Script::into_text),
            },
            dependencies,
            caches: raw.caches,
            source_root: raw
                .source
                .root
                .map(|root| root.trim_matches(|c: char| c == '/' || c == '\\').to_string()),
        })
    }

    /// Runtime type without version, e.g. `php`
    pub fn stack_type(&self) -> Option<&str> {
        self.stack
            .as_deref()
            .map(|s| s.split_once(':').map(|(t, _)| t).unwrap_or(s))
            .filter(|t| !t.is_empty())
    }

    /// Runtime version, e.g. `8.2`
    pub fn stack_version(&self) -> Option<&str> {
        self.stack
            .as_deref()
            .and_then(|s| s.split_once(':'))
            .map(|(_, v)| v)
            .filter(|v| !v.is_empty())
    }
}

/// Root of the `/` location, else of the last location declaring one
fn location_root(locations: &Mapping) -> Option<String> {
    let mut root = None;
    for (path, location) in locations {
        if let Some(r) = location.get("root").and_then(Value::as_str) {
            root = Some(r.to_string());
        }
        if path.as_str() == Some("/") {
            break;
        }
    }
    root
}

/// Mounts backed by local files.
///
/// Accepts the current map form (`source: local`, `source_path: x`) and
/// the legacy string form (`shared:files/x`).
fn shared_mounts(mounts: &Mapping) -> Vec<SharedMount> {
    let mut shared = Vec::new();
    for (path, definition) in mounts {
        let Some(path) = path.as_str() else {
            continue;
        };
        let source_path = match definition {
            Value::String(legacy) => legacy.strip_prefix("shared:files").map(|rest| rest.to_string()),
            Value::Mapping(_) => {
                let source = definition.get("source").and_then(Value::as_str);
                match source {
                    Some("local") => definition
                        .get("source_path")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                }
            }
            _ => None,
        };
        if let Some(source_path) = source_path {
            let source_path = source_path.trim_matches('/').to_string();
            if source_path.is_empty() {
                continue;
            }
            shared.push(SharedMount {
                path: path.trim_matches('/').to_string(),
                source_path,
            });
        }
    }
    shared
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => "*".to_string(),
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "map",
        Value::Tagged(_) => "tagged value",
    }
}
