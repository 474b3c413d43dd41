//! Handles that keep a plugin library mapped.
//!
//! Factories and instances produced by a dynamically loaded library point into
//! that library's code. Everything the registry hands out therefore travels
//! with a clone of the library handle, declared after the value so the value is
//! dropped first.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use libloading::Library;

use crate::error::Result;
use crate::factory::{AnyFactory, NamedFactory};

/// Factory returned by registry lookups.
///
/// Derefs to the factory. [`create`](FactoryHandle::create) wraps the new
/// instance in a [`LoadedInstance`] sharing this handle's library.
pub struct FactoryHandle<B: ?Sized> {
    factory: Arc<dyn NamedFactory<B>>,
    library: Option<Arc<Library>>,
}

impl<B: ?Sized + 'static> FactoryHandle<B> {
    pub(crate) fn new(factory: Arc<dyn NamedFactory<B>>, library: Option<Arc<Library>>) -> Self {
        Self { factory, library }
    }

    /// Create an instance, refusing if no loader owns the factory.
    pub fn create(&self) -> Result<LoadedInstance<B>> {
        let instance = self.factory.create()?;
        Ok(LoadedInstance {
            instance,
            class_name: self.factory.name().to_string(),
            _library: self.library.clone(),
        })
    }

    /// Whether this factory came from a dynamically loaded library.
    pub fn is_dynamic(&self) -> bool {
        self.library.is_some()
    }
}

impl<B: ?Sized> Clone for FactoryHandle<B> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            library: self.library.clone(),
        }
    }
}

impl<B: ?Sized> Deref for FactoryHandle<B> {
    type Target = dyn NamedFactory<B>;

    fn deref(&self) -> &Self::Target {
        self.factory.as_ref()
    }
}

impl<B: ?Sized> fmt::Debug for FactoryHandle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryHandle")
            .field("name", &self.factory.name())
            .field("dynamic", &self.library.is_some())
            .finish()
    }
}

/// Plugin instance that keeps its originating library mapped.
///
/// Derefs to `B`. The instance is dropped before the library handle.
pub struct LoadedInstance<B: ?Sized> {
    instance: Box<B>,
    class_name: String,
    _library: Option<Arc<Library>>,
}

impl<B: ?Sized> LoadedInstance<B> {
    pub fn class_name(&self) -> &str {
        &self.class_name
    }
}

impl<B: ?Sized> Deref for LoadedInstance<B> {
    type Target = B;

    fn deref(&self) -> &B {
        &self.instance
    }
}

impl<B: ?Sized> DerefMut for LoadedInstance<B> {
    fn deref_mut(&mut self) -> &mut B {
        &mut self.instance
    }
}

impl<B: ?Sized> fmt::Debug for LoadedInstance<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedInstance")
            .field("class_name", &self.class_name)
            .finish_non_exhaustive()
    }
}
