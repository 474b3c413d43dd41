//! Factory registry.
//!
//! Factories are keyed by plugin base interface and class name. The registry
//! guards its map with its own lock; each factory guards its owner set
//! separately, so ownership queries never contend with unrelated lookups.
//!
//! A factory registered from a dynamic library keeps a handle to that library
//! in its registry entry. The library can therefore only be unmapped after the
//! entry (and the factory code it points into) has been dropped.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use libloading::Library;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::config::{OrphanPolicy, RegistryConfig};
use crate::error::{FactoryError, Result};
use crate::factory::{AnyFactory, NamedFactory};
use crate::handle::{FactoryHandle, LoadedInstance};
use crate::ownership::LoaderId;

static GLOBAL_REGISTRY: Lazy<Arc<FactoryRegistry>> = Lazy::new(|| {
    let config = RegistryConfig::from_env().unwrap_or_else(|e| {
        tracing::warn!("Ignoring registry environment configuration: {}", e);
        RegistryConfig::default()
    });
    Arc::new(FactoryRegistry::new(config))
});

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FactoryKey {
    base: TypeId,
    name: String,
}

impl FactoryKey {
    fn of<B: ?Sized + 'static>(name: &str) -> Self {
        Self {
            base: TypeId::of::<B>(),
            name: name.to_string(),
        }
    }
}

// Field order is drop order: the factory goes before the library it lives in.
struct RegistryEntry {
    factory: Arc<dyn AnyFactory>,
    /// `Arc<dyn NamedFactory<B>>` for the entry's base interface
    typed: Box<dyn Any + Send + Sync>,
    library: Option<Arc<Library>>,
}

/// Registry of plugin factories for all base interfaces.
pub struct FactoryRegistry {
    config: RegistryConfig,
    entries: RwLock<HashMap<FactoryKey, RegistryEntry>>,
}

impl FactoryRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Process-wide registry, configured from the environment on first use.
    pub fn global() -> Arc<FactoryRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register `factory` as owned by `owner` and produced from `library_path`.
    ///
    /// The path and first owner are recorded before the factory becomes
    /// visible to lookups. Registering a name that already exists for the same
    /// library only adds `owner` to the existing factory.
    pub fn register<B, F>(&self, factory: Arc<F>, owner: LoaderId, library_path: &str) -> Result<()>
    where
        B: ?Sized + 'static,
        F: NamedFactory<B> + 'static,
    {
        self.register_from_library::<B, F>(factory, owner, library_path, None)
    }

    pub(crate) fn register_from_library<B, F>(
        &self,
        factory: Arc<F>,
        owner: LoaderId,
        library_path: &str,
        library: Option<Arc<Library>>,
    ) -> Result<()>
    where
        B: ?Sized + 'static,
        F: NamedFactory<B> + 'static,
    {
        let key = FactoryKey::of::<B>(factory.name());
        let mut entries = self.entries.write();

        if let Some(existing) = entries.get(&key) {
            let existing_path = existing.factory.library_path();
            if existing_path == library_path {
                existing.factory.add_owner(owner);
                tracing::debug!(
                    "Class '{}' from {} re-registered by {}",
                    key.name,
                    library_path,
                    owner
                );
                return Ok(());
            }
            if existing.factory.has_any_owner() {
                tracing::warn!(
                    "Class '{}' for base {} already provided by {}, ignoring {}",
                    key.name,
                    existing.factory.base_type(),
                    existing_path,
                    library_path
                );
                return Err(FactoryError::Conflict {
                    name: key.name,
                    existing: existing_path,
                    incoming: library_path.to_string(),
                });
            }
        }

        factory.set_library_path(library_path);
        factory.add_owner(owner);

        let typed: Arc<dyn NamedFactory<B>> = factory.clone();
        let entry = RegistryEntry {
            factory,
            typed: Box::new(typed),
            library,
        };
        tracing::debug!(
            "Registered class '{}' for base {} from {}",
            key.name,
            std::any::type_name::<B>(),
            library_path
        );
        let replaced = entries.insert(key, entry);
        drop(entries);
        drop(replaced);
        Ok(())
    }

    /// Look up an owned factory by class name.
    ///
    /// The handle shares the entry's library, so the factory stays callable
    /// after its loaders unload. Orphaned factories kept under
    /// [`OrphanPolicy::Retain`] are reported as [`FactoryError::Orphaned`]
    /// rather than returned.
    pub fn lookup<B: ?Sized + 'static>(&self, name: &str) -> Result<FactoryHandle<B>> {
        let entries = self.entries.read();
        let entry = entries
            .get(&FactoryKey::of::<B>(name))
            .ok_or_else(|| not_found::<B>(name))?;

        if !entry.factory.has_any_owner() {
            return Err(FactoryError::Orphaned {
                name: name.to_string(),
            });
        }

        match entry.typed.downcast_ref::<Arc<dyn NamedFactory<B>>>() {
            Some(factory) => Ok(FactoryHandle::new(
                Arc::clone(factory),
                entry.library.clone(),
            )),
            None => {
                tracing::error!(
                    "Registry entry '{}' does not match base {}",
                    name,
                    std::any::type_name::<B>()
                );
                Err(not_found::<B>(name))
            }
        }
    }

    /// Look up a factory only if `owner` is one of its owners.
    pub fn lookup_owned_by<B: ?Sized + 'static>(
        &self,
        name: &str,
        owner: LoaderId,
    ) -> Result<FactoryHandle<B>> {
        let factory = self.lookup::<B>(name)?;
        if factory.is_owned_by(owner) {
            Ok(factory)
        } else {
            Err(not_found::<B>(name))
        }
    }

    /// Create an instance of class `name`.
    ///
    /// The instance keeps the factory's library mapped. The registry lock is
    /// not held while the plugin constructor runs.
    pub fn create<B: ?Sized + 'static>(&self, name: &str) -> Result<LoadedInstance<B>> {
        self.lookup::<B>(name)?.create()
    }

    pub fn contains<B: ?Sized + 'static>(&self, name: &str) -> bool {
        self.entries.read().contains_key(&FactoryKey::of::<B>(name))
    }

    /// Names of owned classes implementing `B`, sorted.
    pub fn class_names<B: ?Sized + 'static>(&self) -> Vec<String> {
        self.collect_names::<B>(|factory| factory.has_any_owner())
    }

    /// Names of classes implementing `B` that `owner` still owns, sorted.
    pub fn class_names_owned_by<B: ?Sized + 'static>(&self, owner: LoaderId) -> Vec<String> {
        self.collect_names::<B>(|factory| factory.is_owned_by(owner))
    }

    fn collect_names<B: ?Sized + 'static>(
        &self,
        keep: impl Fn(&dyn AnyFactory) -> bool,
    ) -> Vec<String> {
        let base = TypeId::of::<B>();
        let entries = self.entries.read();
        let mut names: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| key.base == base && keep(entry.factory.as_ref()))
            .map(|(key, _)| key.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Remove `owner` from every factory.
    ///
    /// Returns the names of factories this left orphaned. Under
    /// [`OrphanPolicy::Purge`] those factories are destroyed immediately.
    pub fn release_owner(&self, owner: LoaderId) -> Vec<String> {
        let mut entries = self.entries.write();

        let mut orphaned = Vec::new();
        for (key, entry) in entries.iter() {
            if !entry.factory.is_owned_by(owner) {
                continue;
            }
            entry.factory.remove_owner(owner);
            if !entry.factory.has_any_owner() {
                orphaned.push(key.clone());
            }
        }

        let removed: Vec<RegistryEntry> = match self.config.orphan_policy {
            OrphanPolicy::Purge => orphaned.iter().filter_map(|key| entries.remove(key)).collect(),
            OrphanPolicy::Retain => Vec::new(),
        };
        drop(entries);

        if !orphaned.is_empty() {
            tracing::debug!(
                "{} released {} factories ({} destroyed)",
                owner,
                orphaned.len(),
                removed.len()
            );
        }
        drop(removed);

        let mut names: Vec<String> = orphaned.into_iter().map(|key| key.name).collect();
        names.sort();
        names
    }

    /// Destroy every orphaned factory. Returns how many were removed.
    pub fn purge_orphans(&self) -> usize {
        let mut entries = self.entries.write();
        let stale: Vec<FactoryKey> = entries
            .iter()
            .filter(|(_, entry)| !entry.factory.has_any_owner())
            .map(|(key, _)| key.clone())
            .collect();
        let removed: Vec<RegistryEntry> =
            stale.iter().filter_map(|key| entries.remove(key)).collect();
        drop(entries);

        let count = removed.len();
        drop(removed);
        if count > 0 {
            tracing::debug!("Purged {} orphaned factories", count);
        }
        count
    }

    /// Whether `owner` owns at least one factory, for any base interface.
    pub fn is_owner_of_any(&self, owner: LoaderId) -> bool {
        self.entries
            .read()
            .values()
            .any(|entry| entry.factory.is_owned_by(owner))
    }

    /// Whether any owned factory still comes from `library_path`.
    pub fn is_library_in_use(&self, library_path: &str) -> bool {
        self.entries.read().values().any(|entry| {
            entry.factory.has_any_owner() && entry.factory.library_path() == library_path
        })
    }

    /// Number of registered factories, orphaned ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for FactoryRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

fn not_found<B: ?Sized>(name: &str) -> FactoryError {
    FactoryError::NotFound {
        base: std::any::type_name::<B>().to_string(),
        name: name.to_string(),
    }
}
