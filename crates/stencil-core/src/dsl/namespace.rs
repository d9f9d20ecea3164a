use crate::catalog::Provider;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

/// A node class exposed to scripts, e.g. `azure.compute.FunctionApps`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeClass {
    pub provider: &'static str,
    pub service: &'static str,
    pub name: &'static str,
}

impl NodeClass {
    pub fn qualified(&self) -> String {
        format!("{}.{}.{}", self.provider, self.service, self.name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider {provider} declares class {class} more than once")]
    DuplicateClass { provider: String, class: String },
    #[error("provider {provider} has an invalid class name {class:?}")]
    InvalidClass { provider: String, class: String },
}

/// Names available to a diagram script besides the built-in primitives.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    classes: HashMap<String, NodeClass>,
    providers: Vec<&'static str>,
    icon_dir: Option<PathBuf>,
}

fn provider_classes(provider: &Provider) -> Result<Vec<NodeClass>, ProviderError> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for service in provider.services {
        for &class in service.classes {
            let valid = class.chars().next().is_some_and(|c| c.is_ascii_uppercase())
                && class.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return Err(ProviderError::InvalidClass {
                    provider: provider.name.to_string(),
                    class: class.to_string(),
                });
            }
            if !seen.insert(class) {
                return Err(ProviderError::DuplicateClass {
                    provider: provider.name.to_string(),
                    class: class.to_string(),
                });
            }
            out.push(NodeClass {
                provider: provider.name,
                service: service.name,
                name: class,
            });
        }
    }
    Ok(out)
}

impl Namespace {
    /// Register every provider that validates. Providers later in the list
    /// shadow earlier ones on name collisions.
    pub fn from_catalog(providers: &[Provider]) -> Self {
        let mut ns = Namespace::default();
        for provider in providers {
            match provider_classes(provider) {
                Ok(classes) => {
                    debug!(provider = provider.name, count = classes.len(), "registered provider");
                    for class in classes {
                        ns.classes.insert(class.name.to_string(), class);
                    }
                    ns.providers.push(provider.name);
                }
                Err(e) => warn!(provider = provider.name, error = %e, "skipping provider"),
            }
        }
        ns
    }

    pub fn with_icon_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.icon_dir = dir;
        self
    }

    pub fn lookup(&self, name: &str) -> Option<&NodeClass> {
        self.classes.get(name)
    }

    pub fn providers(&self) -> &[&'static str] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// `<icon_dir>/<provider>/<service>/<class>.png`, lowercased, when it exists.
    pub fn icon_for(&self, class: &NodeClass) -> Option<String> {
        let dir = self.icon_dir.as_ref()?;
        let path = dir
            .join(class.provider)
            .join(class.service)
            .join(format!("{}.png", class.name.to_ascii_lowercase()));
        path.is_file().then(|| path.to_string_lossy().into_owned())
    }
}
