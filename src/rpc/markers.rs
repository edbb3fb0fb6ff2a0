//! Supplemental markers attached to handlers.
//!
//! A marker is any `Send + Sync` value keyed by its type, e.g. a
//! `RequireRole("admin")` struct a middleware checks before calling `next`.
//! Handlers declare class-level markers through
//! [`RpcHandler::markers`](super::RpcHandler::markers) and method-level
//! markers on the binding; method-level wins per marker type.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::types::TypeInfo;

/// Insertion-ordered map from marker type to marker instance.
#[derive(Clone, Default)]
pub struct Markers {
    entries: Vec<(TypeInfo, Arc<dyn Any + Send + Sync>)>,
}

impl Markers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a marker, replacing an existing one of the same type in place.
    pub fn insert<M: Any + Send + Sync>(&mut self, marker: M) {
        self.insert_erased(TypeInfo::of::<M>(), Arc::new(marker));
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with<M: Any + Send + Sync>(mut self, marker: M) -> Self {
        self.insert(marker);
        self
    }

    fn insert_erased(&mut self, key: TypeInfo, marker: Arc<dyn Any + Send + Sync>) {
        match self.entries.iter_mut().find(|(ty, _)| *ty == key) {
            Some(slot) => slot.1 = marker,
            None => self.entries.push((key, marker)),
        }
    }

    /// The marker of type `M`, if present.
    pub fn get<M: Any + Send + Sync>(&self) -> Option<&M> {
        self.entries
            .iter()
            .find(|(ty, _)| ty.is::<M>())
            .and_then(|(_, marker)| marker.downcast_ref::<M>())
    }

    pub fn contains<M: Any + Send + Sync>(&self) -> bool {
        self.entries.iter().any(|(ty, _)| ty.is::<M>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Short type names of the markers, in order.
    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(ty, _)| ty.short_name())
    }

    /// Combine class-level and method-level markers.
    ///
    /// Class-level entries keep their position; a method-level marker of the
    /// same type replaces the instance. Method-only markers follow in order.
    pub fn merge(class_level: &Markers, method_level: &Markers) -> Markers {
        let mut merged = class_level.clone();
        for (ty, marker) in &method_level.entries {
            merged.insert_erased(*ty, marker.clone());
        }
        merged
    }
}

impl fmt::Debug for Markers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.type_names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct RequireRole(&'static str);

    #[derive(Debug, PartialEq)]
    struct CacheFor(u64);

    #[derive(Debug, PartialEq)]
    struct Audited;

    #[test]
    fn test_insert_replaces_same_type() {
        let mut markers = Markers::new();
        markers.insert(RequireRole("reader"));
        markers.insert(CacheFor(30));
        markers.insert(RequireRole("admin"));

        assert_eq!(markers.len(), 2);
        assert_eq!(markers.get::<RequireRole>(), Some(&RequireRole("admin")));
        assert_eq!(
            markers.type_names().collect::<Vec<_>>(),
            vec!["RequireRole", "CacheFor"]
        );
    }

    #[test]
    fn test_merge_method_level_wins() {
        let class_level = Markers::new().with(RequireRole("reader")).with(CacheFor(60));
        let method_level = Markers::new().with(Audited).with(RequireRole("admin"));

        let merged = Markers::merge(&class_level, &method_level);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get::<RequireRole>(), Some(&RequireRole("admin")));
        assert_eq!(merged.get::<CacheFor>(), Some(&CacheFor(60)));
        assert!(merged.contains::<Audited>());
        assert_eq!(
            merged.type_names().collect::<Vec<_>>(),
            vec!["RequireRole", "CacheFor", "Audited"]
        );
    }

    #[test]
    fn test_missing_marker() {
        let markers = Markers::new();
        assert!(markers.is_empty());
        assert!(markers.get::<Audited>().is_none());
    }
}
