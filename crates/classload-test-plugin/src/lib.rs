//! Test plugin library exporting two animal factories.
//!
//! Built as a `cdylib` for dynamic loading tests and as an `rlib` so the
//! tests share the `Animal` interface with the library.

/// Plugin interface implemented by every class in this library.
pub trait Animal: Send {
    fn name(&self) -> &'static str;
    fn speak(&self) -> String;
}

#[derive(Default)]
pub struct Dog;

impl Animal for Dog {
    fn name(&self) -> &'static str {
        "Dog"
    }

    fn speak(&self) -> String {
        "woof".to_string()
    }
}

#[derive(Default)]
pub struct Cat {
    lives: u8,
}

impl Animal for Cat {
    fn name(&self) -> &'static str {
        "Cat"
    }

    fn speak(&self) -> String {
        format!("meow ({} lives)", 9 - self.lives)
    }
}

classload_core::export_factories! {
    Dog => dyn Animal,
    Cat => dyn Animal,
}

/// Entry point that consults its loader before registering `Dog`.
#[no_mangle]
pub fn classload_register_checked(registrar: &mut classload_core::Registrar<'_>) {
    if !registrar.loader().is_library_loaded() {
        registrar.report_error(classload_core::FactoryError::LibraryNotLoaded(
            registrar.library_path().to_string(),
        ));
        return;
    }
    match classload_core::concrete_factory!(Dog => dyn Animal) {
        Ok(factory) => registrar.register::<dyn Animal, _>(factory),
        Err(e) => registrar.report_error(e),
    }
}
