use std::sync::Mutex;

use crate::type_id::TypeId;

/// Sorted, deduplicated set of managed entity types.
///
/// Backed by a `Vec` kept in qualified-name order so lookups are binary
/// searches and enumeration is deterministic. A single mutex guards every
/// mutation and snapshot; it is never held across a call out of this type.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: Mutex<Vec<TypeId>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `type_id`. Returns `false` if it was already registered.
    pub fn register(&self, type_id: TypeId) -> bool {
        let mut types = self.types.lock().expect("registry lock poisoned");
        match types.binary_search(&type_id) {
            Ok(_) => false,
            Err(pos) => {
                types.insert(pos, type_id);
                true
            }
        }
    }

    /// Remove `type_id`. Returns `false` if it was not registered.
    pub fn unregister(&self, type_id: &TypeId) -> bool {
        let mut types = self.types.lock().expect("registry lock poisoned");
        match types.binary_search(type_id) {
            Ok(pos) => {
                types.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    pub fn contains(&self, type_id: &TypeId) -> bool {
        self.types
            .lock()
            .expect("registry lock poisoned")
            .binary_search(type_id)
            .is_ok()
    }

    /// Sorted copy of the registered types.
    pub fn snapshot(&self) -> Vec<TypeId> {
        self.types.lock().expect("registry lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.types.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_keeps_sorted_and_unique() {
        let reg = TypeRegistry::new();
        assert!(reg.register(TypeId::new("b.Order")));
        assert!(reg.register(TypeId::new("a.Customer")));
        assert!(!reg.register(TypeId::new("b.Order")));
        assert_eq!(
            reg.snapshot(),
            vec![TypeId::new("a.Customer"), TypeId::new("b.Order")]
        );
    }

    #[test]
    fn unregister_missing_is_noop() {
        let reg = TypeRegistry::new();
        reg.register(TypeId::new("a.X"));
        assert!(!reg.unregister(&TypeId::new("a.Y")));
        assert!(reg.unregister(&TypeId::new("a.X")));
        assert!(reg.is_empty());
    }

    #[test]
    fn contains_uses_qualified_name() {
        let reg = TypeRegistry::new();
        reg.register(TypeId::new("a.X"));
        assert!(reg.contains(&TypeId::from("a.X")));
        assert!(!reg.contains(&TypeId::from("a.x")));
    }

    #[test]
    fn concurrent_registration() {
        use std::sync::Arc;
        use std::thread;

        let reg = Arc::new(TypeRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || {
                    for i in 0..25 {
                        reg.register(TypeId::new(format!("t{}.T{i:02}", t % 2)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        let snapshot = reg.snapshot();
        assert_eq!(snapshot.len(), 50);
        assert!(snapshot.windows(2).all(|w| w[0] < w[1]));
    }
}
