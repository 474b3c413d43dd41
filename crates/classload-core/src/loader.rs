//! Loader contexts.
//!
//! A [`ClassLoader`] is one loading session for one shared library. It opens
//! the library, lets the library register its factories under the loader's
//! [`LoaderId`], and withdraws that ownership again when the library is
//! unloaded or the loader is dropped.
//!
//! # Plugin entry point
//!
//! A plugin library exports a Rust function named by
//! [`LoaderConfig::register_symbol`] with the signature
//! `fn(&mut Registrar<'_>)`, normally generated by
//! [`export_factories!`](crate::export_factories). Host and plugin must be
//! built with the same toolchain and the same version of this crate, since
//! Rust types cross the boundary as-is.
//!
//! The entry point runs with no loader lock held other than the (reentrant)
//! load lock, so it may query its loader through [`Registrar::loader`].

use std::fmt;
use std::sync::Arc;

use libloading::Library;
use parking_lot::{Mutex, ReentrantMutex};

use crate::config::LoaderConfig;
use crate::error::{FactoryError, Result};
use crate::factory::NamedFactory;
use crate::handle::LoadedInstance;
use crate::ownership::LoaderId;
use crate::registry::FactoryRegistry;

/// Signature of the registration entry point exported by plugin libraries.
pub type RegisterFn = for<'a> fn(&mut Registrar<'a>);

#[derive(Default)]
struct LoaderState {
    load_count: usize,
    library: Option<Arc<Library>>,
}

/// One dynamic-library loading session.
pub struct ClassLoader {
    id: LoaderId,
    library_path: String,
    config: LoaderConfig,
    registry: Arc<FactoryRegistry>,
    /// Serializes load and unload; held across the plugin entry point.
    load_lock: ReentrantMutex<()>,
    state: Mutex<LoaderState>,
}

impl ClassLoader {
    /// Create a loader for `library_path` using the default configuration.
    pub fn new(library_path: impl Into<String>, registry: Arc<FactoryRegistry>) -> Self {
        Self {
            id: LoaderId::new(),
            library_path: library_path.into(),
            config: LoaderConfig::default(),
            registry,
            load_lock: ReentrantMutex::new(()),
            state: Mutex::new(LoaderState::default()),
        }
    }

    pub fn with_config(
        library_path: impl Into<String>,
        registry: Arc<FactoryRegistry>,
        config: LoaderConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut loader = Self::new(library_path, registry);
        loader.config = config;
        Ok(loader)
    }

    pub fn id(&self) -> LoaderId {
        self.id
    }

    pub fn library_path(&self) -> &str {
        &self.library_path
    }

    pub fn registry(&self) -> &Arc<FactoryRegistry> {
        &self.registry
    }

    /// Open the library and register its factories.
    ///
    /// Loads are counted: only the first call opens the library, later calls
    /// just bump the count. The load is recorded before the entry point runs,
    /// so registration code sees [`is_library_loaded`](Self::is_library_loaded)
    /// as `true`.
    pub fn load_library(&self) -> Result<()> {
        let _load = self.load_lock.lock();
        {
            let mut state = self.state.lock();
            if state.load_count > 0 {
                state.load_count += 1;
                tracing::debug!(
                    "{} already loaded by {} (count {})",
                    self.library_path,
                    self.id,
                    state.load_count
                );
                return Ok(());
            }
        }

        let library = Arc::new(self.open_library()?);
        let register = self.resolve_entry_point(&library)?;
        {
            let mut state = self.state.lock();
            state.library = Some(Arc::clone(&library));
            state.load_count = 1;
        }

        let registered = self.run_entry_point(register, Some(library));
        tracing::info!(
            "Loaded {} for {} ({} factories registered)",
            self.library_path,
            self.id,
            registered
        );
        Ok(())
    }

    /// Run a registration entry point linked into the host, as if it had been
    /// exported by this loader's library. Returns how many factories were
    /// registered.
    pub fn register_with(&self, register: RegisterFn) -> usize {
        let _load = self.load_lock.lock();
        let library = self.state.lock().library.clone();
        self.run_entry_point(register, library)
    }

    fn run_entry_point(&self, register: RegisterFn, library: Option<Arc<Library>>) -> usize {
        let mut registrar = Registrar::new(self, library);
        register(&mut registrar);
        registrar.finish()
    }

    fn open_library(&self) -> Result<Library> {
        // SAFETY: loading runs the library's initializers. Libraries handed to a
        // ClassLoader are trusted plugin binaries built against this crate.
        unsafe { Library::new(&self.library_path) }.map_err(|e| FactoryError::LoadFailed {
            path: self.library_path.clone(),
            reason: e.to_string(),
        })
    }

    fn resolve_entry_point(&self, library: &Library) -> Result<RegisterFn> {
        let symbol = self.config.register_symbol.as_bytes();
        // SAFETY: the exported symbol is declared by `export_factories!` with
        // exactly the `RegisterFn` signature.
        let register = unsafe { library.get::<RegisterFn>(symbol) }.map_err(|_| {
            FactoryError::SymbolNotFound {
                path: self.library_path.clone(),
                symbol: self.config.register_symbol.clone(),
            }
        })?;
        Ok(*register)
    }

    /// Decrement the load count; at zero, release every factory this loader
    /// owns and drop the library handle. Returns the remaining count.
    ///
    /// The library stays mapped while a registry entry, a
    /// [`FactoryHandle`](crate::FactoryHandle) or a live [`LoadedInstance`]
    /// still needs it.
    pub fn unload_library(&self) -> Result<usize> {
        let _load = self.load_lock.lock();
        let mut state = self.state.lock();
        if state.load_count > 1 {
            state.load_count -= 1;
            return Ok(state.load_count);
        }

        state.load_count = 0;
        let library = state.library.take();
        drop(state);

        let orphaned = self.registry.release_owner(self.id);
        drop(library);
        tracing::info!(
            "Unloaded {} for {} ({} factories orphaned)",
            self.library_path,
            self.id,
            orphaned.len()
        );
        Ok(0)
    }

    /// Whether this loader currently holds the library open.
    pub fn is_library_loaded(&self) -> bool {
        self.state.lock().load_count > 0
    }

    /// Whether any loader still owns a factory from this library.
    pub fn is_library_loaded_by_any_loader(&self) -> bool {
        self.registry.is_library_in_use(&self.library_path)
    }

    /// Register a factory owned by this loader without going through a
    /// dynamic library, for plugins linked into the host.
    pub fn register_factory<B, F>(&self, factory: F) -> Result<()>
    where
        B: ?Sized + 'static,
        F: NamedFactory<B> + 'static,
    {
        let library = self.state.lock().library.clone();
        self.registry.register_from_library::<B, F>(
            Arc::new(factory),
            self.id,
            &self.library_path,
            library,
        )
    }

    /// Classes implementing `B` this loader owns.
    pub fn class_names<B: ?Sized + 'static>(&self) -> Vec<String> {
        self.registry.class_names_owned_by::<B>(self.id)
    }

    pub fn is_class_available<B: ?Sized + 'static>(&self, name: &str) -> bool {
        self.registry.lookup_owned_by::<B>(name, self.id).is_ok()
    }

    /// Create an instance of class `name` through a factory this loader owns.
    ///
    /// With `load_on_demand`, the library is opened first if needed. Without
    /// it, asking a loader that was never loaded and owns nothing fails with
    /// [`FactoryError::LibraryNotLoaded`].
    pub fn create_instance<B: ?Sized + 'static>(&self, name: &str) -> Result<LoadedInstance<B>> {
        if self.config.load_on_demand {
            self.ensure_loaded()?;
        }

        let factory = match self.registry.lookup_owned_by::<B>(name, self.id) {
            Ok(factory) => factory,
            Err(FactoryError::NotFound { .. })
                if !self.is_library_loaded() && !self.registry.is_owner_of_any(self.id) =>
            {
                return Err(FactoryError::LibraryNotLoaded(self.library_path.clone()));
            }
            Err(e) => return Err(e),
        };
        let instance = factory.create()?;
        tracing::debug!("{} created instance of '{}'", self.id, name);
        Ok(instance)
    }

    fn ensure_loaded(&self) -> Result<()> {
        let _load = self.load_lock.lock();
        if self.is_library_loaded() {
            return Ok(());
        }
        self.load_library()
    }
}

impl fmt::Debug for ClassLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassLoader")
            .field("id", &self.id)
            .field("library_path", &self.library_path)
            .field("load_count", &self.state.lock().load_count)
            .finish()
    }
}

impl Drop for ClassLoader {
    fn drop(&mut self) {
        let orphaned = self.registry.release_owner(self.id);
        if !orphaned.is_empty() {
            tracing::debug!(
                "{} dropped, orphaning {:?} from {}",
                self.id,
                orphaned,
                self.library_path
            );
        }
    }
}

/// Handle given to a plugin's registration entry point.
pub struct Registrar<'a> {
    loader: &'a ClassLoader,
    library: Option<Arc<Library>>,
    registered: usize,
    failed: usize,
}

impl<'a> Registrar<'a> {
    fn new(loader: &'a ClassLoader, library: Option<Arc<Library>>) -> Self {
        Self {
            loader,
            library,
            registered: 0,
            failed: 0,
        }
    }

    /// Register `factory` as owned by the loading session.
    pub fn register<B, F>(&mut self, factory: F)
    where
        B: ?Sized + 'static,
        F: NamedFactory<B> + 'static,
    {
        let name = factory.name().to_string();
        let result = self.loader.registry.register_from_library::<B, F>(
            Arc::new(factory),
            self.loader.id,
            &self.loader.library_path,
            self.library.clone(),
        );
        match result {
            Ok(()) => self.registered += 1,
            Err(e) => {
                self.failed += 1;
                tracing::warn!(
                    "Factory '{}' from {} not registered: {}",
                    name,
                    self.loader.library_path,
                    e
                );
            }
        }
    }

    /// Report a factory the plugin could not construct.
    pub fn report_error(&mut self, error: FactoryError) {
        self.failed += 1;
        tracing::warn!("Plugin {} failed to register a factory: {}", self.loader.library_path, error);
    }

    pub fn library_path(&self) -> &str {
        &self.loader.library_path
    }

    /// Loader running this registration.
    pub fn loader(&self) -> &'a ClassLoader {
        self.loader
    }

    fn finish(self) -> usize {
        if self.failed > 0 {
            tracing::warn!(
                "{}: {} factories failed to register",
                self.loader.library_path,
                self.failed
            );
        }
        self.registered
    }
}
