//! The staging context shared by every extension of a build.
//!
//! The host creates one [`Context`] before any extension runs and hands it to
//! each of them in turn. Extensions read build facts from it and may write
//! their own defaults back.

use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Context keys this extension reads or writes.
pub mod keys {
    /// Root of the application being staged.
    pub const BUILD_DIR: &str = "BUILD_DIR";
    /// Service catalog, keyed by service type.
    pub const VCAP_SERVICES: &str = "VCAP_SERVICES";
    /// Presence forces the install regardless of bound services.
    pub const CODIZY_INSTALL: &str = "CODIZY_INSTALL";
    /// Target architecture override.
    pub const XHPROF_ARCH: &str = "XHPROF_ARCH";
    /// Version of the package to fetch.
    pub const XHPROF_VERSION: &str = "XHPROF_VERSION";
    /// Archive file name template.
    pub const XHPROF_PACKAGE: &str = "XHPROF_PACKAGE";
    /// Download URL template.
    pub const XHPROF_DOWNLOAD_URL: &str = "XHPROF_DOWNLOAD_URL";
    /// Whether to strip the archive's top-level directory.
    pub const XHPROF_STRIP: &str = "XHPROF_STRIP";
}

const MAX_TEMPLATE_DEPTH: usize = 8;

/// String-keyed staging configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    values: Map<String, Value>,
}

impl Context {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a context from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if `json` is not a JSON object.
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json).map(|values| Self { values })
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns the value stored under `key` if it is a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Checks whether `key` is present, whatever its value.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    /// Stores `value` under `key` unless the key is already present.
    ///
    /// Returns `true` if the value was inserted.
    pub fn insert_default(&mut self, key: &str, value: impl Into<Value>) -> bool {
        if self.contains_key(key) {
            return false;
        }
        self.values.insert(key.to_owned(), value.into());
        true
    }

    /// Returns `BUILD_DIR` as a path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingBuildDir`] if the key is absent or not a
    /// string.
    pub fn build_dir(&self) -> Result<PathBuf> {
        self.get_str(keys::BUILD_DIR)
            .map(PathBuf::from)
            .ok_or(Error::MissingBuildDir)
    }

    /// Returns the bindings declared for `service_type` in `VCAP_SERVICES`.
    ///
    /// The catalog may be stored as an object or as the JSON text the
    /// platform exports. A non-empty object in place of the list counts as
    /// one binding. Anything else unreadable counts as no bindings.
    #[must_use]
    pub fn service_bindings(&self, service_type: &str) -> Vec<ServiceBinding> {
        let parsed;
        let catalog = match self.get(keys::VCAP_SERVICES) {
            Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
                Ok(value) => {
                    parsed = value;
                    &parsed
                }
                Err(err) => {
                    tracing::debug!(%err, "VCAP_SERVICES is not valid JSON");
                    return Vec::new();
                }
            },
            Some(value) => value,
            None => return Vec::new(),
        };

        match catalog.get(service_type) {
            Some(Value::Array(bindings)) => bindings.iter().cloned().map(ServiceBinding).collect(),
            // A lone record stands for a single binding.
            Some(record) if record.as_object().is_some_and(|fields| !fields.is_empty()) => {
                vec![ServiceBinding(record.clone())]
            }
            _ => Vec::new(),
        }
    }

    /// Expands `{KEY}` placeholders in `template` from this context.
    ///
    /// Substituted values are expanded in turn, so a default such as
    /// `{XHPROF_PACKAGE}` resolves through `{XHPROF_VERSION}`. Doubled braces
    /// (`{{`, `}}`) produce literal braces.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedKey`] for an unknown key and
    /// [`Error::TemplateTooDeep`] if expansion does not settle.
    pub fn format(&self, template: &str) -> Result<String> {
        self.expand(template, 0)
    }

    fn expand(&self, template: &str, depth: usize) -> Result<String> {
        if depth > MAX_TEMPLATE_DEPTH {
            return Err(Error::TemplateTooDeep(template.to_owned()));
        }

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(pos) = rest.find(['{', '}']) {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if tail.starts_with("{{") || tail.starts_with("}}") {
                out.push_str(&tail[..1]);
                rest = &tail[2..];
                continue;
            }
            let Some(end) = tail.find('}').filter(|_| tail.starts_with('{')) else {
                out.push_str(&tail[..1]);
                rest = &tail[1..];
                continue;
            };
            let key = &tail[1..end];
            let value = self
                .get(key)
                .ok_or_else(|| Error::UnresolvedKey(key.to_owned()))?;
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out.push_str(&self.expand(&text, depth + 1)?);
            rest = &tail[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

impl From<Map<String, Value>> for Context {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

/// One binding record of a bound service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceBinding(Value);

impl ServiceBinding {
    /// Instance name given when the service was created.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    /// Service offering label.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.0.get("label").and_then(Value::as_str)
    }

    /// Credentials block, if the binding carries one.
    #[must_use]
    pub fn credentials(&self) -> Option<&Map<String, Value>> {
        self.0.get("credentials").and_then(Value::as_object)
    }

    /// The raw record.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}
