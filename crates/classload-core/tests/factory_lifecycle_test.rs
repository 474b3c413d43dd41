//! Factory lifecycle tests
//!
//! Walks factories through their ownership lifecycle:
//! - construction with the unknown library path
//! - activation by a loader and instance creation
//! - orphaning and the usage error on `create()`
//! - survival while other loaders still own the factory

use std::sync::Arc;

use classload_core::prelude::*;
use classload_core::{concrete_factory, UNKNOWN_LIBRARY_PATH};

trait Animal: Send {
    fn speak(&self) -> String;
    fn kind(&self) -> &'static str;
}

#[derive(Default)]
struct Dog;

impl Animal for Dog {
    fn speak(&self) -> String {
        "woof".to_string()
    }
    fn kind(&self) -> &'static str {
        "Dog"
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("classload_core=debug")
        .with_test_writer()
        .try_init();
}

#[test]
fn test_end_to_end_scenario() {
    init_tracing();
    let loader1 = LoaderId::new();
    let factory = concrete_factory!(Dog => dyn Animal).unwrap();

    assert_eq!(factory.name(), "Dog");
    assert_eq!(factory.library_path(), UNKNOWN_LIBRARY_PATH);

    factory.set_library_path("/plugins/libdog.so");
    factory.add_owner(loader1);
    assert!(factory.has_any_owner());

    let animal: Box<dyn Animal> = factory.create().unwrap();
    assert_eq!(animal.kind(), "Dog");
    assert_eq!(animal.speak(), "woof");

    factory.remove_owner(loader1);
    assert!(!factory.has_any_owner());

    let err = factory.create().err().unwrap();
    assert!(err.is_usage_error());
    assert_eq!(factory.name(), "Dog");
    assert_eq!(factory.library_path(), "/plugins/libdog.so");
}

#[test]
fn test_idempotent_ownership_changes() {
    let factory = concrete_factory!(Dog => dyn Animal).unwrap();
    let a = LoaderId::new();
    let b = LoaderId::new();

    factory.add_owner(a);
    factory.add_owner(a);
    assert_eq!(factory.ownership().owners(), vec![a]);

    factory.remove_owner(b);
    assert_eq!(factory.ownership().owners(), vec![a]);
    assert_eq!(factory.state(), FactoryState::Active);
}

#[test]
fn test_multi_owner_survival() {
    let factory = concrete_factory!(Dog => dyn Animal).unwrap();
    let a = LoaderId::new();
    let b = LoaderId::new();

    factory.add_owner(a);
    factory.add_owner(b);
    factory.remove_owner(a);

    assert!(factory.has_any_owner());
    assert!(factory.is_owned_by(b));
    assert!(!factory.is_owned_by(a));
    assert!(factory.create().is_ok());
}

#[test]
fn test_state_transitions() {
    let factory = concrete_factory!(Dog => dyn Animal).unwrap();
    let a = LoaderId::new();
    let b = LoaderId::new();

    factory.add_owner(a);
    assert_eq!(factory.state(), FactoryState::Active);
    factory.remove_owner(a);
    assert_eq!(factory.state(), FactoryState::Orphaned);
    factory.add_owner(b);
    assert_eq!(factory.state(), FactoryState::Active);
}

#[test]
fn test_loader_lifecycle_through_registry() {
    init_tracing();
    let registry = Arc::new(FactoryRegistry::default());
    let loader = ClassLoader::new("/plugins/libdog.so", registry.clone());

    loader
        .register_factory::<dyn Animal, _>(concrete_factory!(Dog => dyn Animal).unwrap())
        .unwrap();
    let factory = registry.lookup::<dyn Animal>("Dog").unwrap();
    assert!(factory.is_owned_by(loader.id()));

    let instance = loader.create_instance::<dyn Animal>("Dog").unwrap();
    assert_eq!(instance.speak(), "woof");

    drop(loader);
    assert!(!factory.has_any_owner());
    assert!(matches!(
        factory.create(),
        Err(FactoryError::Orphaned { .. })
    ));
    assert!(matches!(
        registry.lookup::<dyn Animal>("Dog"),
        Err(FactoryError::NotFound { .. })
    ));
    assert_eq!(instance.kind(), "Dog");
}
