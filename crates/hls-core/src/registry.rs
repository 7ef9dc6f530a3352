//! C2 — type-keyed service registry.
//!
//! Not a process-wide singleton (spec §9 redesign note #1): the orchestrator
//! holds an owned `Arc<Services>` built once at startup; this registry exists
//! for test substitution, the way the teacher's `DownloaderConfig`-consuming
//! components take concrete dependencies via constructor injection rather
//! than a global lookup.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::ConfigurationError;

type Factory = Box<dyn Fn() -> Box<dyn Any + Send + Sync> + Send + Sync>;

enum Slot {
    Transient(Factory),
    Singleton(Factory, Option<Box<dyn Any + Send + Sync>>),
}

/// Serializes all registration/resolution through a single lock.
///
/// Factories run while the lock is held. They must not call back into the
/// same registry synchronously — doing so deadlocks. This mirrors the
/// contract spec.md §4.2/§9 note 6 calls out explicitly rather than
/// silently risking it.
pub struct ServiceRegistry {
    slots: Mutex<HashMap<TypeId, Slot>>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn register<T, F>(&self, factory: F)
    where
        T: Any + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let boxed: Factory = Box::new(move || Box::new(factory()));
        self.slots
            .lock()
            .expect("service registry lock poisoned")
            .insert(TypeId::of::<T>(), Slot::Transient(boxed));
    }

    pub fn register_singleton<T, F>(&self, factory: F)
    where
        T: Any + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let boxed: Factory = Box::new(move || Box::new(factory()));
        self.slots
            .lock()
            .expect("service registry lock poisoned")
            .insert(TypeId::of::<T>(), Slot::Singleton(boxed, None));
    }

    pub fn resolve<T>(&self) -> Result<T, ConfigurationError>
    where
        T: Any + Send + Sync + Clone + 'static,
    {
        let type_id = TypeId::of::<T>();
        let mut slots = self.slots.lock().expect("service registry lock poisoned");
        let slot = slots
            .get_mut(&type_id)
            .ok_or(ConfigurationError::MissingService {
                type_name: std::any::type_name::<T>(),
            })?;

        match slot {
            Slot::Transient(factory) => {
                let value = factory();
                value
                    .downcast::<T>()
                    .map(|boxed| *boxed)
                    .map_err(|_| ConfigurationError::TypeMismatch {
                        type_name: std::any::type_name::<T>(),
                    })
            }
            Slot::Singleton(factory, cached) => {
                if cached.is_none() {
                    *cached = Some(factory());
                }
                cached
                    .as_ref()
                    .expect("just populated")
                    .downcast_ref::<T>()
                    .cloned()
                    .ok_or(ConfigurationError::TypeMismatch {
                        type_name: std::any::type_name::<T>(),
                    })
            }
        }
    }

    pub fn reset(&self) {
        self.slots.lock().expect("service registry lock poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_service_is_reported_by_type() {
        let registry = ServiceRegistry::new();
        let err = registry.resolve::<u32>().unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingService { .. }));
    }

    #[test]
    fn transient_yields_fresh_instance_each_time() {
        let registry = ServiceRegistry::new();
        let counter = std::sync::atomic::AtomicU32::new(0);
        registry.register::<u32, _>(move || counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst));
        assert_eq!(registry.resolve::<u32>().unwrap(), 0);
        assert_eq!(registry.resolve::<u32>().unwrap(), 1);
    }

    #[test]
    fn singleton_is_cached_after_first_resolve() {
        let registry = ServiceRegistry::new();
        let counter = std::sync::atomic::AtomicU32::new(0);
        registry.register_singleton::<u32, _>(move || counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst));
        assert_eq!(registry.resolve::<u32>().unwrap(), 0);
        assert_eq!(registry.resolve::<u32>().unwrap(), 0);
    }

    #[test]
    fn reset_drops_registrations() {
        let registry = ServiceRegistry::new();
        registry.register::<u32, _>(|| 7);
        registry.reset();
        assert!(registry.resolve::<u32>().is_err());
    }
}
