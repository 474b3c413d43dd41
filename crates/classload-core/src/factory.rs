//! Plugin factories.
//!
//! [`AnyFactory`] is the interface-agnostic view of a factory used for
//! ownership bookkeeping. [`NamedFactory`] adds the creation contract for a
//! plugin base interface `B`, and [`ConcreteFactory`] binds that contract to a
//! concrete plugin type `C`.
//!
//! Factories are neither `Clone` nor `Default`: duplicating one would split
//! its owner set from the loaders that actually depend on it.

use std::fmt;
use std::marker::PhantomData;

use crate::error::{FactoryError, Result};
use crate::ownership::{FactoryState, LoaderId, OwnershipTracker};

/// Factory view without the plugin interface type.
pub trait AnyFactory: Send + Sync {
    /// Display name of the concrete class.
    fn name(&self) -> &str;

    /// Type name of the plugin base interface.
    fn base_type(&self) -> &'static str;

    fn ownership(&self) -> &OwnershipTracker;

    fn library_path(&self) -> String {
        self.ownership().library_path()
    }

    fn set_library_path(&self, path: &str) {
        let previous = self.ownership().replace_library_path(path);
        if previous != crate::config::UNKNOWN_LIBRARY_PATH && previous != path {
            tracing::warn!(
                "Overwriting library path of factory '{}' ({} -> {})",
                self.name(),
                previous,
                path
            );
        }
        tracing::debug!("Factory '{}' associated with library {}", self.name(), path);
    }

    fn add_owner(&self, owner: LoaderId) {
        if self.ownership().add_owner(owner) {
            tracing::debug!("Factory '{}' now owned by {}", self.name(), owner);
        }
    }

    fn remove_owner(&self, owner: LoaderId) {
        if self.ownership().remove_owner(owner) {
            tracing::debug!("Factory '{}' released by {}", self.name(), owner);
        }
    }

    fn is_owned_by(&self, owner: LoaderId) -> bool {
        self.ownership().is_owned_by(owner)
    }

    fn has_any_owner(&self) -> bool {
        self.ownership().has_any_owner()
    }

    fn state(&self) -> FactoryState {
        self.ownership().state()
    }
}

/// Factory producing instances behind the plugin base interface `B`.
pub trait NamedFactory<B: ?Sized>: AnyFactory {
    /// Construct a new instance without consulting the owner set.
    fn instantiate(&self) -> Box<B>;

    /// Construct a new instance, refusing if no loader owns this factory.
    ///
    /// The ownership lock is released before the plugin constructor runs, so
    /// slow constructors never serialize ownership changes. A library unloaded
    /// between the check and the call is prevented by the loader holding its
    /// library handle, not by this method.
    fn create(&self) -> Result<Box<B>> {
        if !self.has_any_owner() {
            tracing::warn!(
                "create() called on orphaned factory '{}' (library {})",
                self.name(),
                self.library_path()
            );
            return Err(FactoryError::Orphaned {
                name: self.name().to_string(),
            });
        }
        Ok(self.instantiate())
    }
}

/// Factory for concrete plugin type `C` exposed as `B`.
///
/// `C` is default-constructible; `upcast` is the unsizing coercion from
/// `Box<C>` to `Box<B>`, usually written `|c| c` or produced by
/// [`concrete_factory!`](crate::concrete_factory).
pub struct ConcreteFactory<C, B: ?Sized> {
    name: String,
    ownership: OwnershipTracker,
    upcast: fn(Box<C>) -> Box<B>,
    _concrete: PhantomData<fn() -> C>,
}

impl<C, B> ConcreteFactory<C, B>
where
    C: Default + 'static,
    B: ?Sized + 'static,
{
    /// Create an orphaned factory named `name`.
    pub fn new(name: impl Into<String>, upcast: fn(Box<C>) -> Box<B>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(FactoryError::EmptyName);
        }
        tracing::debug!(
            "Created factory for class type = {} (base {})",
            name,
            std::any::type_name::<B>()
        );
        Ok(Self {
            name,
            ownership: OwnershipTracker::new(),
            upcast,
            _concrete: PhantomData,
        })
    }

    /// Create a factory already owned by `owner`.
    pub fn with_owner(
        name: impl Into<String>,
        upcast: fn(Box<C>) -> Box<B>,
        owner: LoaderId,
    ) -> Result<Self> {
        let factory = Self::new(name, upcast)?;
        factory.ownership.add_owner(owner);
        Ok(factory)
    }
}

impl<C, B> AnyFactory for ConcreteFactory<C, B>
where
    C: Default + 'static,
    B: ?Sized + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn base_type(&self) -> &'static str {
        std::any::type_name::<B>()
    }

    fn ownership(&self) -> &OwnershipTracker {
        &self.ownership
    }
}

impl<C, B> NamedFactory<B> for ConcreteFactory<C, B>
where
    C: Default + 'static,
    B: ?Sized + 'static,
{
    fn instantiate(&self) -> Box<B> {
        (self.upcast)(Box::new(C::default()))
    }
}

impl<C, B: ?Sized> fmt::Debug for ConcreteFactory<C, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcreteFactory")
            .field("name", &self.name)
            .field("ownership", &self.ownership)
            .finish()
    }
}

impl<C, B: ?Sized> Drop for ConcreteFactory<C, B> {
    fn drop(&mut self) {
        tracing::debug!("Destructor for factory for class type = {}", self.name);
    }
}

/// Build a [`ConcreteFactory`] for `Concrete => Base`.
///
/// The display name defaults to the stringified concrete type.
///
/// ```rust,ignore
/// let factory = concrete_factory!(Dog => dyn Animal)?;
/// let named = concrete_factory!(Dog => dyn Animal, "animals/Dog")?;
/// ```
#[macro_export]
macro_rules! concrete_factory {
    ($concrete:ty => $base:ty) => {
        $crate::concrete_factory!($concrete => $base, stringify!($concrete))
    };
    ($concrete:ty => $base:ty, $name:expr) => {
        $crate::ConcreteFactory::<$concrete, $base>::new(
            $name,
            |instance: ::std::boxed::Box<$concrete>| -> ::std::boxed::Box<$base> { instance },
        )
    };
}
