//! Backend registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use sortkit_spec::{BackendDescriptor, DescriptorInfo, SortError, SortResult};

/// Identifier or direct descriptor reference of a backend.
#[derive(Debug, Clone, Copy)]
pub enum BackendRef<'a> {
    Name(&'a str),
    Descriptor(&'a BackendDescriptor),
}

impl BackendRef<'_> {
    /// Identifier the reference points at.
    pub fn name(&self) -> &str {
        match self {
            BackendRef::Name(name) => name,
            BackendRef::Descriptor(descriptor) => descriptor.name(),
        }
    }
}

impl<'a> From<&'a str> for BackendRef<'a> {
    fn from(name: &'a str) -> Self {
        BackendRef::Name(name)
    }
}

impl<'a> From<&'a String> for BackendRef<'a> {
    fn from(name: &'a String) -> Self {
        BackendRef::Name(name)
    }
}

impl<'a> From<&'a BackendDescriptor> for BackendRef<'a> {
    fn from(descriptor: &'a BackendDescriptor) -> Self {
        BackendRef::Descriptor(descriptor)
    }
}

/// Errors that can occur while building a registry.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// Backend with this name already registered.
    AlreadyRegistered(String),
    /// Backend registered without a name.
    EmptyName,
    /// Backend declares the same parameter twice.
    DuplicateParameter { backend: String, name: String },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyRegistered(name) => write!(f, "Sorter already registered: {}", name),
            Self::EmptyName => write!(f, "Sorter registered with an empty name"),
            Self::DuplicateParameter { backend, name } => {
                write!(f, "Sorter '{}' declares parameter '{}' twice", backend, name)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Immutable catalog of backends, keyed by identifier.
#[derive(Debug, Default)]
pub struct Registry {
    descriptors: BTreeMap<String, BackendDescriptor>,
}

impl Registry {
    /// Starts an empty registry builder.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry of the built-in sorters.
    ///
    /// # Panics
    ///
    /// Panics if the built-in catalog has a duplicate or malformed entry.
    pub fn builtin() -> Registry {
        Registry::builder()
            .with_builtin()
            .build()
            .expect("built-in catalog should be a valid registry")
    }

    /// Resolves an identifier or descriptor reference.
    ///
    /// A descriptor reference must be the registered descriptor of its name,
    /// or a name that is not registered at all. A reference that shares its
    /// name with a different registered descriptor is rejected.
    pub fn resolve<'a>(&'a self, backend: BackendRef<'a>) -> SortResult<&'a BackendDescriptor> {
        match backend {
            BackendRef::Name(name) => self
                .descriptors
                .get(name)
                .ok_or_else(|| SortError::unknown_backend(name)),
            BackendRef::Descriptor(descriptor) => match self.descriptors.get(descriptor.name()) {
                Some(registered) if registered.same_backend(descriptor) => Ok(registered),
                Some(_) => Err(SortError::AmbiguousBackend {
                    name: descriptor.name().to_string(),
                }),
                None => Err(SortError::unknown_backend(descriptor.name())),
            },
        }
    }

    /// Looks up a backend by identifier.
    pub fn get(&self, name: &str) -> Option<&BackendDescriptor> {
        self.descriptors.get(name)
    }

    /// Every registered identifier, sorted.
    pub fn list_available(&self) -> Vec<&str> {
        self.descriptors.keys().map(String::as_str).collect()
    }

    /// Identifiers of installed backends, sorted.
    pub fn list_installed(&self) -> Vec<&str> {
        self.descriptors
            .values()
            .filter(|d| d.is_installed())
            .map(BackendDescriptor::name)
            .collect()
    }

    /// Introspection summary of one backend.
    pub fn describe(&self, name: &str) -> SortResult<DescriptorInfo> {
        self.resolve(BackendRef::Name(name)).map(BackendDescriptor::info)
    }

    /// Version of every installed backend.
    pub fn versions(&self) -> Vec<(String, String)> {
        self.descriptors
            .values()
            .filter(|d| d.is_installed())
            .map(|d| {
                (
                    d.name().to_string(),
                    d.version().unwrap_or_else(|| "unknown".to_string()),
                )
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.descriptors.values()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Shares the registry.
    pub fn into_shared(self) -> Arc<Registry> {
        Arc::new(self)
    }
}

/// Builder for [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    descriptors: Vec<BackendDescriptor>,
}

impl RegistryBuilder {
    /// Adds a backend.
    pub fn register(mut self, descriptor: BackendDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Adds the built-in backends.
    pub fn with_builtin(mut self) -> Self {
        self.descriptors.extend(sortkit_backends::builtin_descriptors());
        self
    }

    /// Validates and freezes the registry.
    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut descriptors = BTreeMap::new();
        for descriptor in self.descriptors {
            if descriptor.name().is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if let Some(name) = descriptor.schema().duplicate_names().first() {
                return Err(RegistryError::DuplicateParameter {
                    backend: descriptor.name().to_string(),
                    name: name.to_string(),
                });
            }
            if descriptors.contains_key(descriptor.name()) {
                return Err(RegistryError::AlreadyRegistered(
                    descriptor.name().to_string(),
                ));
            }
            descriptors.insert(descriptor.name().to_string(), descriptor);
        }
        Ok(Registry { descriptors })
    }
}
