//! Resource Manager - identifier-keyed registries owning loaded resources
//!
//! Two flavours share one set of rules:
//!
//! - [`TypedResourceManager<R>`]: one registry per resource type, chosen at
//!   compile time.
//! - [`AnyResourceManager`]: a single registry holding every resource type,
//!   keyed by `(TypeId, identifier)`, with checked downcasts on retrieval.
//!
//! Entries are boxed, so a reference returned by `find` points at the same
//! resource until that entry is replaced or removed. What happens when an
//! identifier is loaded twice is decided by [`ReloadPolicy`].
//!
//! **Ownership**: the `Engine` owns its registries; nothing here is global.

use std::any::{type_name, Any, TypeId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ops::Index;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::foundation::fatal::Reported;

/// Anything a registry can own
pub trait Resource: Any {
    /// Whether loading produced usable data
    fn is_complete(&self) -> bool {
        true
    }
}

/// Behaviour of `load` for an identifier that is already taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadPolicy {
    /// Drop the old resource and store the new one (logged at Warn)
    #[default]
    Replace,
    /// Keep the old resource and discard the new one
    KeepExisting,
    /// Fail with [`ResourceError::AlreadyLoaded`]
    Reject,
}

/// Resource Manager errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// No entry for this identifier
    #[error("Resource '{id}' of type {type_name} not found")]
    NotFound {
        /// Resource type
        type_name: &'static str,
        /// Requested identifier
        id: String,
    },

    /// Nothing of this type was ever loaded
    #[error("No resources of type {type_name} are registered")]
    UnknownType {
        /// Resource type
        type_name: &'static str,
    },

    /// Identifier taken and the policy forbids reloading
    #[error("Resource '{id}' of type {type_name} is already loaded")]
    AlreadyLoaded {
        /// Resource type
        type_name: &'static str,
        /// Conflicting identifier
        id: String,
    },

    /// Empty string used as identifier
    #[error("Empty identifier for resource of type {type_name}")]
    EmptyIdentifier {
        /// Resource type
        type_name: &'static str,
    },
}

impl Reported for ResourceError {
    fn already_logged(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::UnknownType { .. })
    }
}

/// Registry of one resource type keyed by string identifier
pub struct TypedResourceManager<R: Resource> {
    entries: HashMap<String, Box<R>>,
    policy: ReloadPolicy,
}

impl<R: Resource> Default for TypedResourceManager<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resource> TypedResourceManager<R> {
    /// Create an empty registry with [`ReloadPolicy::Replace`]
    pub fn new() -> Self {
        Self::with_policy(ReloadPolicy::default())
    }

    /// Create an empty registry with an explicit reload policy
    pub fn with_policy(policy: ReloadPolicy) -> Self {
        Self {
            entries: HashMap::new(),
            policy,
        }
    }

    /// Current reload policy
    pub fn policy(&self) -> ReloadPolicy {
        self.policy
    }

    /// Change the reload policy for later loads
    pub fn set_policy(&mut self, policy: ReloadPolicy) {
        self.policy = policy;
    }

    /// Store `resource` under `id` and return a reference to the stored entry
    pub fn load(&mut self, id: impl Into<String>, resource: R) -> Result<&mut R, ResourceError> {
        self.load_with(id, move || resource)
    }

    /// Like [`load`](Self::load), constructing the resource only if it will
    /// be stored
    pub fn load_with<F>(&mut self, id: impl Into<String>, create: F) -> Result<&mut R, ResourceError>
    where
        F: FnOnce() -> R,
    {
        let id = id.into();
        if id.is_empty() {
            log::warn!("Refusing to load {} with an empty identifier", type_name::<R>());
            return Err(ResourceError::EmptyIdentifier {
                type_name: type_name::<R>(),
            });
        }

        let policy = self.policy;
        match self.entries.entry(id) {
            Entry::Vacant(slot) => {
                log::debug!("Loaded {} '{}'", type_name::<R>(), slot.key());
                Ok(&mut **slot.insert(Box::new(create())))
            }
            Entry::Occupied(mut slot) => match policy {
                ReloadPolicy::Replace => {
                    log::warn!("Replacing {} '{}'", type_name::<R>(), slot.key());
                    slot.insert(Box::new(create()));
                    Ok(&mut **slot.into_mut())
                }
                ReloadPolicy::KeepExisting => {
                    log::debug!("Keeping existing {} '{}'", type_name::<R>(), slot.key());
                    Ok(&mut **slot.into_mut())
                }
                ReloadPolicy::Reject => {
                    log::warn!("{} '{}' is already loaded", type_name::<R>(), slot.key());
                    Err(ResourceError::AlreadyLoaded {
                        type_name: type_name::<R>(),
                        id: slot.key().clone(),
                    })
                }
            },
        }
    }

    /// Look up `id`; a miss is logged at Error
    pub fn find(&self, id: &str) -> Result<&R, ResourceError> {
        self.entries
            .get(id)
            .map(Box::as_ref)
            .ok_or_else(|| Self::not_found(id))
    }

    /// Mutable lookup; a miss is logged at Error
    pub fn find_mut(&mut self, id: &str) -> Result<&mut R, ResourceError> {
        match self.entries.get_mut(id) {
            Some(entry) => Ok(&mut **entry),
            None => Err(Self::not_found(id)),
        }
    }

    /// Look up `id` without logging
    pub fn get(&self, id: &str) -> Option<&R> {
        self.entries.get(id).map(Box::as_ref)
    }

    /// Whether `id` is registered
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Remove and return the entry for `id`
    pub fn remove(&mut self, id: &str) -> Option<R> {
        self.entries.remove(id).map(|entry| *entry)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered identifiers, in no particular order
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn not_found(id: &str) -> ResourceError {
        let error = ResourceError::NotFound {
            type_name: type_name::<R>(),
            id: id.to_string(),
        };
        log::error!("{error}");
        error
    }
}

impl<R: Resource> Index<&str> for TypedResourceManager<R> {
    type Output = R;

    /// Panics if `id` is not registered
    fn index(&self, id: &str) -> &R {
        match self.find(id) {
            Ok(resource) => resource,
            Err(error) => panic!("{error}"),
        }
    }
}

impl<R: Resource> std::fmt::Debug for TypedResourceManager<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedResourceManager")
            .field("type", &type_name::<R>())
            .field("entries", &self.entries.len())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Registry holding resources of any type
///
/// Each resource type gets its own [`TypedResourceManager`], stored type-erased
/// and recovered with a checked downcast.
#[derive(Default)]
pub struct AnyResourceManager {
    stores: HashMap<TypeId, Box<dyn Any>>,
    policy: ReloadPolicy,
}

impl AnyResourceManager {
    /// Create an empty registry with [`ReloadPolicy::Replace`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry with an explicit reload policy
    pub fn with_policy(policy: ReloadPolicy) -> Self {
        Self {
            stores: HashMap::new(),
            policy,
        }
    }

    /// Store `resource` under `(R, id)`
    pub fn load<R: Resource>(
        &mut self,
        id: impl Into<String>,
        resource: R,
    ) -> Result<&mut R, ResourceError> {
        self.store_or_insert::<R>()?.load(id, resource)
    }

    /// Like [`load`](Self::load), constructing the resource only if stored
    pub fn load_with<R, F>(&mut self, id: impl Into<String>, create: F) -> Result<&mut R, ResourceError>
    where
        R: Resource,
        F: FnOnce() -> R,
    {
        self.store_or_insert::<R>()?.load_with(id, create)
    }

    /// Look up `(R, id)`; an unknown type and an unknown identifier are
    /// reported separately, both at Error
    pub fn find<R: Resource>(&self, id: &str) -> Result<&R, ResourceError> {
        match self.store::<R>() {
            Some(store) => store.find(id),
            None => Err(Self::unknown_type::<R>()),
        }
    }

    /// Mutable variant of [`find`](Self::find)
    pub fn find_mut<R: Resource>(&mut self, id: &str) -> Result<&mut R, ResourceError> {
        match self.store_mut::<R>() {
            Some(store) => store.find_mut(id),
            None => Err(Self::unknown_type::<R>()),
        }
    }

    /// Look up `(R, id)` without logging
    pub fn get<R: Resource>(&self, id: &str) -> Option<&R> {
        self.store::<R>().and_then(|store| store.get(id))
    }

    /// Whether `(R, id)` is registered
    pub fn contains<R: Resource>(&self, id: &str) -> bool {
        self.store::<R>().is_some_and(|store| store.contains(id))
    }

    /// Remove and return `(R, id)`
    pub fn remove<R: Resource>(&mut self, id: &str) -> Option<R> {
        self.store_mut::<R>().and_then(|store| store.remove(id))
    }

    /// Number of `R` entries
    pub fn count<R: Resource>(&self) -> usize {
        self.store::<R>().map_or(0, TypedResourceManager::len)
    }

    /// Number of distinct resource types seen
    pub fn type_count(&self) -> usize {
        self.stores.len()
    }

    /// Drop every entry of every type
    pub fn clear(&mut self) {
        self.stores.clear();
    }

    fn store<R: Resource>(&self) -> Option<&TypedResourceManager<R>> {
        self.stores
            .get(&TypeId::of::<R>())
            .and_then(|store| store.downcast_ref())
    }

    fn store_mut<R: Resource>(&mut self) -> Option<&mut TypedResourceManager<R>> {
        self.stores
            .get_mut(&TypeId::of::<R>())
            .and_then(|store| store.downcast_mut())
    }

    fn store_or_insert<R: Resource>(&mut self) -> Result<&mut TypedResourceManager<R>, ResourceError> {
        let policy = self.policy;
        self.stores
            .entry(TypeId::of::<R>())
            .or_insert_with(|| Box::new(TypedResourceManager::<R>::with_policy(policy)))
            .downcast_mut()
            .ok_or(ResourceError::UnknownType {
                type_name: type_name::<R>(),
            })
    }

    fn unknown_type<R: Resource>() -> ResourceError {
        let error = ResourceError::UnknownType {
            type_name: type_name::<R>(),
        };
        log::error!("{error}");
        error
    }
}

impl std::fmt::Debug for AnyResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyResourceManager")
            .field("types", &self.stores.len())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::logging::{capture, Level};

    #[derive(Debug, PartialEq)]
    struct Texture {
        width: u32,
    }

    impl Resource for Texture {}

    #[derive(Debug, PartialEq)]
    struct Sound(&'static str);

    impl Resource for Sound {}

    #[test]
    fn test_load_then_find() {
        let mut textures = TypedResourceManager::new();
        textures.load("grass", Texture { width: 64 }).unwrap();

        assert_eq!(textures.find("grass").unwrap().width, 64);
        assert_eq!(textures["grass"].width, 64);
        assert!(textures.contains("grass"));
        assert_eq!(textures.len(), 1);
    }

    #[test]
    fn test_find_returns_same_instance() {
        let mut textures = TypedResourceManager::new();
        textures.load("a", Texture { width: 1 }).unwrap();
        let first: *const Texture = textures.find("a").unwrap();
        textures.load("b", Texture { width: 2 }).unwrap();
        let second: *const Texture = textures.find("a").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_identifier_logs_one_error() {
        capture::start();
        let textures = TypedResourceManager::<Texture>::new();
        let result = textures.find("missing");

        assert!(matches!(result, Err(ResourceError::NotFound { .. })));
        let records = capture::take();
        assert_eq!(capture::count_at_least(&records, Level::Error, "missing"), 1);
    }

    #[test]
    fn test_get_is_silent() {
        capture::start();
        let textures = TypedResourceManager::<Texture>::new();
        assert!(textures.get("missing").is_none());
        assert!(capture::take().is_empty());
    }

    #[test]
    #[should_panic(expected = "not found")]
    fn test_index_panics_on_miss() {
        let textures = TypedResourceManager::<Texture>::new();
        let _ = &textures["nope"];
    }

    #[test]
    fn test_reload_policies() {
        capture::start();
        let mut replace = TypedResourceManager::new();
        replace.load("t", Texture { width: 1 }).unwrap();
        replace.load("t", Texture { width: 2 }).unwrap();
        assert_eq!(replace["t"].width, 2);
        let records = capture::take();
        assert_eq!(capture::count_at_least(&records, Level::Warn, "Replacing"), 1);

        let mut keep = TypedResourceManager::with_policy(ReloadPolicy::KeepExisting);
        keep.load("t", Texture { width: 1 }).unwrap();
        let kept = keep
            .load_with("t", || unreachable!("constructor must not run"))
            .unwrap();
        assert_eq!(kept.width, 1);

        let mut reject = TypedResourceManager::with_policy(ReloadPolicy::Reject);
        reject.load("t", Texture { width: 1 }).unwrap();
        assert!(matches!(
            reject.load("t", Texture { width: 2 }),
            Err(ResourceError::AlreadyLoaded { .. })
        ));
        assert_eq!(reject["t"].width, 1);
    }

    #[test]
    fn test_empty_identifier_rejected() {
        capture::start();
        let mut textures = TypedResourceManager::new();
        assert!(matches!(
            textures.load("", Texture { width: 1 }),
            Err(ResourceError::EmptyIdentifier { .. })
        ));
        assert!(textures.is_empty());
        let records = capture::take();
        assert_eq!(capture::count_at_least(&records, Level::Warn, "empty identifier"), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut textures = TypedResourceManager::new();
        textures.load("a", Texture { width: 1 }).unwrap();
        textures.load("b", Texture { width: 2 }).unwrap();

        assert_eq!(textures.remove("a"), Some(Texture { width: 1 }));
        assert!(textures.remove("a").is_none());
        let ids: Vec<_> = textures.identifiers().collect();
        assert_eq!(ids, vec!["b"]);

        textures.clear();
        assert!(textures.is_empty());
    }

    #[test]
    fn test_find_mut_edits_in_place() {
        let mut textures = TypedResourceManager::new();
        textures.load("a", Texture { width: 1 }).unwrap();
        textures.find_mut("a").unwrap().width = 9;
        assert_eq!(textures["a"].width, 9);
    }

    #[test]
    fn test_any_manager_separates_types() {
        let mut resources = AnyResourceManager::new();
        resources.load("hit", Texture { width: 8 }).unwrap();
        resources.load("hit", Sound("boom")).unwrap();

        assert_eq!(resources.find::<Texture>("hit").unwrap().width, 8);
        assert_eq!(resources.find::<Sound>("hit").unwrap(), &Sound("boom"));
        assert_eq!(resources.type_count(), 2);
        assert_eq!(resources.count::<Texture>(), 1);
        assert!(resources.contains::<Sound>("hit"));
    }

    #[test]
    fn test_any_manager_distinguishes_misses() {
        let mut resources = AnyResourceManager::new();
        assert!(matches!(
            resources.find::<Texture>("x"),
            Err(ResourceError::UnknownType { .. })
        ));

        resources.load("y", Texture { width: 1 }).unwrap();
        assert!(matches!(
            resources.find::<Texture>("x"),
            Err(ResourceError::NotFound { .. })
        ));
        assert!(resources.get::<Sound>("y").is_none());
    }

    #[test]
    fn test_any_manager_policy_and_remove() {
        let mut resources = AnyResourceManager::with_policy(ReloadPolicy::Reject);
        resources.load("a", Sound("one")).unwrap();
        assert!(resources.load("a", Sound("two")).is_err());
        resources.find_mut::<Sound>("a").unwrap().0 = "three";
        assert_eq!(resources.remove::<Sound>("a"), Some(Sound("three")));
        assert_eq!(resources.count::<Sound>(), 0);

        resources.clear();
        assert_eq!(resources.type_count(), 0);
    }
}
