//! Registry concurrency tests
//!
//! Loaders register, create and release from several threads at once; the
//! owner sets must end up exactly reflecting who is still loaded.

use std::sync::{Arc, Barrier};

use classload_core::prelude::*;

trait Counter: Send {
    fn value(&self) -> u64;
}

#[derive(Default)]
struct Zero;

impl Counter for Zero {
    fn value(&self) -> u64 {
        0
    }
}

fn zero_factory() -> ConcreteFactory<Zero, dyn Counter> {
    ConcreteFactory::<Zero, dyn Counter>::new("Zero", |z| z).unwrap()
}

#[test]
fn test_concurrent_loaders_share_one_factory() {
    let registry = Arc::new(FactoryRegistry::new(
        RegistryConfig::default().with_orphan_policy(OrphanPolicy::Retain),
    ));
    let loaders: Vec<ClassLoader> = (0..8)
        .map(|_| ClassLoader::new("/plugins/libcounter.so", registry.clone()))
        .collect();

    std::thread::scope(|scope| {
        for loader in &loaders {
            scope.spawn(move || {
                loader
                    .register_factory::<dyn Counter, _>(zero_factory())
                    .unwrap();
                for _ in 0..50 {
                    let counter = loader.create_instance::<dyn Counter>("Zero").unwrap();
                    assert_eq!(counter.value(), 0);
                }
            });
        }
    });

    assert_eq!(registry.len(), 1);
    let factory = registry.lookup::<dyn Counter>("Zero").unwrap();
    assert_eq!(factory.ownership().owner_count(), loaders.len());

    let (released, kept) = loaders.split_at(loaders.len() - 1);
    std::thread::scope(|scope| {
        for loader in released {
            scope.spawn(move || {
                loader.unload_library().unwrap();
            });
        }
    });

    assert!(factory.has_any_owner());
    assert!(factory.is_owned_by(kept[0].id()));
    assert_eq!(factory.ownership().owner_count(), 1);

    kept[0].unload_library().unwrap();
    assert!(!factory.has_any_owner());
    assert_eq!(registry.purge_orphans(), 1);
}

#[test]
fn test_create_races_with_release() {
    let registry = Arc::new(FactoryRegistry::default());
    let loader = ClassLoader::new("/plugins/libcounter.so", registry.clone());
    loader
        .register_factory::<dyn Counter, _>(zero_factory())
        .unwrap();
    let started = Barrier::new(2);

    let (created, refused) = std::thread::scope(|scope| {
        let creator = scope.spawn(|| {
            let mut created = 0usize;
            let mut refused = 0usize;
            for round in 0..1000 {
                match registry.create::<dyn Counter>("Zero") {
                    Ok(counter) => {
                        assert_eq!(counter.value(), 0);
                        assert_eq!(refused, 0, "created after the factory was released");
                        created += 1;
                    }
                    Err(FactoryError::NotFound { .. }) | Err(FactoryError::Orphaned { .. }) => {
                        refused += 1;
                    }
                    Err(e) => panic!("unexpected error: {}", e),
                }
                if round == 0 {
                    started.wait();
                }
            }
            (created, refused)
        });
        scope.spawn(|| {
            started.wait();
            loader.unload_library().unwrap();
        });
        creator.join().unwrap()
    });

    assert!(created >= 1);
    assert_eq!(created + refused, 1000);
    assert!(registry.is_empty());
    assert!(matches!(
        registry.create::<dyn Counter>("Zero"),
        Err(FactoryError::NotFound { .. })
    ));
}
