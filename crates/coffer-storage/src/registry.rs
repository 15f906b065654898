//! Named registry of lazily instantiated components.
//!
//! Each entry is a [`Slot`]: either the configuration a component will be
//! built from, or the live component itself. The first lookup of an
//! unresolved slot builds the component and stores it in place, so every
//! later lookup returns the same instance.

use crate::traits::{StorageError, StorageResult};
use std::sync::Arc;
use tokio::sync::RwLock;

pub enum Slot<C, T: ?Sized> {
    Unresolved(C),
    Resolved(Arc<T>),
}

impl<C, T: ?Sized> Slot<C, T> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Slot::Resolved(_))
    }
}

/// Ordered registry of slots.
///
/// Registration order is kept; registering an existing name replaces its slot
/// in place. Slot resolution happens under the write lock, so concurrent
/// first lookups build the component exactly once.
pub struct Registry<C, T: ?Sized> {
    kind: &'static str,
    slots: RwLock<Vec<(String, Slot<C, T>)>>,
}

impl<C: Clone, T: ?Sized> Registry<C, T> {
    /// Create an empty registry; `kind` names the entries in error messages.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            slots: RwLock::new(Vec::new()),
        }
    }

    pub fn from_entries<I>(kind: &'static str, entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Slot<C, T>)>,
    {
        let mut slots = Vec::new();
        for (name, slot) in entries {
            put(&mut slots, name, slot);
        }
        Self {
            kind,
            slots: RwLock::new(slots),
        }
    }

    pub async fn insert(&self, name: impl Into<String>, slot: Slot<C, T>) {
        let mut slots = self.slots.write().await;
        put(&mut slots, name.into(), slot);
    }

    /// Drop every registration and register `entries` instead, under one write lock.
    pub async fn replace_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, Slot<C, T>)>,
    {
        let mut slots = self.slots.write().await;
        slots.clear();
        for (name, slot) in entries {
            put(&mut slots, name, slot);
        }
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.slots.read().await.iter().any(|(n, _)| n == name)
    }

    pub async fn is_resolved(&self, name: &str) -> bool {
        self.slots
            .read()
            .await
            .iter()
            .any(|(n, slot)| n == name && slot.is_resolved())
    }

    /// Registered names in registration order
    pub async fn names(&self) -> Vec<String> {
        self.slots
            .read()
            .await
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub async fn first_name(&self) -> Option<String> {
        self.slots.read().await.first().map(|(name, _)| name.clone())
    }

    /// Get the component registered under `name`, building it with `create`
    /// if the slot is still unresolved.
    ///
    /// A failed build leaves the slot unresolved.
    pub async fn resolve<F>(&self, name: &str, create: F) -> StorageResult<Arc<T>>
    where
        F: FnOnce(&str, C) -> StorageResult<Arc<T>>,
    {
        {
            let slots = self.slots.read().await;
            match slots.iter().find(|(n, _)| n == name) {
                Some((_, Slot::Resolved(instance))) => return Ok(instance.clone()),
                Some((_, Slot::Unresolved(_))) => {}
                None => return Err(self.not_found(name)),
            }
        }

        let mut slots = self.slots.write().await;
        let slot = match slots.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => slot,
            None => return Err(self.not_found(name)),
        };

        let config = match slot {
            // another caller resolved it between the two locks
            Slot::Resolved(instance) => return Ok(instance.clone()),
            Slot::Unresolved(config) => config.clone(),
        };

        let instance = create(name, config)?;
        *slot = Slot::Resolved(instance.clone());

        tracing::debug!(kind = self.kind, name = %name, "Registry slot resolved");

        Ok(instance)
    }

    /// Resolve every slot and return the instances in registration order.
    pub async fn resolve_all<F>(&self, create: F) -> StorageResult<Vec<(String, Arc<T>)>>
    where
        F: Fn(&str, C) -> StorageResult<Arc<T>>,
    {
        let mut resolved = Vec::new();
        for name in self.names().await {
            let instance = self.resolve(&name, &create).await?;
            resolved.push((name, instance));
        }
        Ok(resolved)
    }

    fn not_found(&self, name: &str) -> StorageError {
        StorageError::NotFound(format!("{} named '{}' is not registered", self.kind, name))
    }
}

fn put<C, T: ?Sized>(slots: &mut Vec<(String, Slot<C, T>)>, name: String, slot: Slot<C, T>) {
    match slots.iter_mut().find(|(n, _)| *n == name) {
        Some(entry) => entry.1 = slot,
        None => slots.push((name, slot)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    struct Widget {
        label: String,
    }

    fn build(name: &str, label: String) -> StorageResult<Arc<Widget>> {
        Ok(Arc::new(Widget {
            label: format!("{}:{}", name, label),
        }))
    }

    #[tokio::test]
    async fn test_resolve_returns_same_instance() {
        let registry: Registry<String, Widget> = Registry::new("widget");
        registry
            .insert("a", Slot::Unresolved("first".to_string()))
            .await;

        let first = registry.resolve("a", build).await.unwrap();
        let second = registry.resolve("a", build).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.label, "a:first");
        assert!(registry.is_resolved("a").await);
    }

    #[tokio::test]
    async fn test_unknown_name_not_found() {
        let registry: Registry<String, Widget> = Registry::new("widget");
        let result = registry.resolve("missing", build).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_reinsert_resets_slot_and_keeps_position() {
        let registry: Registry<String, Widget> = Registry::from_entries(
            "widget",
            vec![
                ("a".to_string(), Slot::Unresolved("one".to_string())),
                ("b".to_string(), Slot::Unresolved("two".to_string())),
            ],
        );
        let before = registry.resolve("a", build).await.unwrap();

        registry
            .insert("a", Slot::Unresolved("three".to_string()))
            .await;
        assert!(!registry.is_resolved("a").await);
        assert_eq!(registry.names().await, vec!["a", "b"]);

        let after = registry.resolve("a", build).await.unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.label, "a:three");
    }

    #[tokio::test]
    async fn test_failed_build_leaves_slot_unresolved() {
        let registry: Registry<String, Widget> = Registry::new("widget");
        registry.insert("a", Slot::Unresolved("x".to_string())).await;

        let result = registry
            .resolve("a", |_, _| {
                Err(StorageError::InvalidArgument("broken".to_string()))
            })
            .await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));
        assert!(!registry.is_resolved("a").await);

        assert!(registry.resolve("a", build).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_first_lookup_builds_once() {
        let registry: Arc<Registry<String, Widget>> = Arc::new(Registry::new("widget"));
        registry.insert("a", Slot::Unresolved("x".to_string())).await;
        let builds = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            let builds = builds.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .resolve("a", |name, label| {
                        builds.fetch_add(1, Ordering::SeqCst);
                        build(name, label)
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut instances = Vec::new();
        for handle in handles {
            instances.push(handle.await.unwrap());
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(instances.iter().all(|w| Arc::ptr_eq(w, &instances[0])));
    }

    #[tokio::test]
    async fn test_replace_all_drops_previous_entries() {
        let registry: Registry<String, Widget> = Registry::new("widget");
        registry.insert("old", Slot::Unresolved("1".to_string())).await;
        registry.resolve("old", build).await.unwrap();

        registry
            .replace_all(vec![
                ("b".to_string(), Slot::Unresolved("2".to_string())),
                ("a".to_string(), Slot::Unresolved("3".to_string())),
            ])
            .await;

        assert_eq!(registry.names().await, vec!["b", "a"]);
        assert!(!registry.contains("old").await);
        assert!(matches!(
            registry.resolve("old", build).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_all_in_order() {
        let registry: Registry<String, Widget> = Registry::new("widget");
        registry.insert("b", Slot::Unresolved("2".to_string())).await;
        registry
            .insert(
                "a",
                Slot::Resolved(Arc::new(Widget {
                    label: "live".to_string(),
                })),
            )
            .await;

        let all = registry.resolve_all(build).await.unwrap();
        let names: Vec<&str> = all.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(all[1].1.label, "live");
        assert_eq!(registry.first_name().await.as_deref(), Some("b"));
    }
}
