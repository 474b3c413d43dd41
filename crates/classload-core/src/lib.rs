//! Ownership-tracked plugin factories for dynamically loaded libraries.
//!
//! A plugin library exports one factory per concrete class. Each factory
//! records which loader contexts currently depend on it and which library it
//! came from; it refuses to create instances once no loader owns it, and its
//! library stays mapped until the factory, every [`FactoryHandle`] to it and
//! every [`LoadedInstance`] it created are gone.
//!
//! # Architecture
//!
//! ```text
//! ClassLoader ──registers──▶ FactoryRegistry ──holds──▶ NamedFactory<B>
//!  (LoaderId, Library)        (base, name) → entry        │
//!                                                          ▼
//!                                          ConcreteFactory<C, B> ── OwnershipTracker
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use classload_core::{ClassLoader, FactoryRegistry};
//!
//! let registry = FactoryRegistry::global();
//! let loader = ClassLoader::new("/plugins/libanimals.so", registry);
//! loader.load_library()?;
//!
//! let dog = loader.create_instance::<dyn Animal>("Dog")?;
//! println!("{}", dog.speak());
//!
//! loader.unload_library()?;
//! ```

pub mod config;
pub mod error;
pub mod factory;
pub mod handle;
pub mod loader;
#[macro_use]
pub mod macros;
pub mod ownership;
pub mod registry;

pub use config::{LoaderConfig, OrphanPolicy, RegistryConfig, UNKNOWN_LIBRARY_PATH};
pub use error::{FactoryError, Result};
pub use factory::{AnyFactory, ConcreteFactory, NamedFactory};
pub use handle::{FactoryHandle, LoadedInstance};
pub use loader::{ClassLoader, RegisterFn, Registrar};
pub use ownership::{FactoryState, LoaderId, OwnershipTracker};
pub use registry::FactoryRegistry;

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::config::{LoaderConfig, OrphanPolicy, RegistryConfig};
    pub use crate::error::{FactoryError, Result};
    pub use crate::factory::{AnyFactory, ConcreteFactory, NamedFactory};
    pub use crate::handle::{FactoryHandle, LoadedInstance};
    pub use crate::loader::{ClassLoader, Registrar};
    pub use crate::ownership::{FactoryState, LoaderId};
    pub use crate::registry::FactoryRegistry;
}
