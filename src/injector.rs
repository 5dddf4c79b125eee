//! Per-connection dependency injection.

use crate::error::{WsError, WsResult};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// A typed provider map handed to event handlers.
///
/// The host builds one per connection before [`accept`] — typically
/// carrying request-scoped values such as the authenticated user or a
/// database pool — and it is frozen from then on, so handlers can read
/// it without locking.
///
/// [`accept`]: crate::WsService::accept
///
/// ```
/// use ws_master::Injector;
///
/// struct CurrentUser { id: u64 }
///
/// let injector = Injector::new().provide(CurrentUser { id: 7 });
/// assert_eq!(injector.get::<CurrentUser>().unwrap().id, 7);
/// ```
#[derive(Default)]
pub struct Injector {
    providers: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Injector {
    /// Create an empty injector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider instance, keyed by its type.
    pub fn provide<T: Send + Sync + 'static>(self, value: T) -> Self {
        self.provide_arc(Arc::new(value))
    }

    /// Register an already-shared provider instance.
    pub fn provide_arc<T: Send + Sync + 'static>(mut self, value: Arc<T>) -> Self {
        self.providers.insert(TypeId::of::<T>(), value);
        self
    }

    /// Resolve a provider by type.
    ///
    /// Fails with [`WsError::ProviderNotFound`] when no provider of the
    /// requested type was registered.
    pub fn get<T: Send + Sync + 'static>(&self) -> WsResult<Arc<T>> {
        self.providers
            .get(&TypeId::of::<T>())
            .and_then(|provider| Arc::clone(provider).downcast::<T>().ok())
            .ok_or_else(|| WsError::ProviderNotFound(std::any::type_name::<T>()))
    }

    /// Whether a provider of type `T` is registered.
    pub fn has<T: Send + Sync + 'static>(&self) -> bool {
        self.providers.contains_key(&TypeId::of::<T>())
    }
}

impl std::fmt::Debug for Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injector")
            .field("providers", &self.providers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Db {
        url: String,
    }

    #[test]
    fn resolves_registered_provider() {
        let injector = Injector::new().provide(Db {
            url: "postgres://localhost".to_string(),
        });
        assert!(injector.has::<Db>());
        assert_eq!(injector.get::<Db>().unwrap().url, "postgres://localhost");
    }

    #[test]
    fn missing_provider_is_an_error() {
        let injector = Injector::new();
        assert!(matches!(
            injector.get::<Db>(),
            Err(WsError::ProviderNotFound(_))
        ));
    }

    #[test]
    fn later_registration_wins() {
        let injector = Injector::new()
            .provide(1u32)
            .provide(2u32);
        assert_eq!(*injector.get::<u32>().unwrap(), 2);
    }
}
