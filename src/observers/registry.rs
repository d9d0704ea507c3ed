//! # Observer registry — explicit plugin factories.
//!
//! Maps plugin names to factories and resolves a list of names into observer
//! instances. How factories get registered (static list, config file, ...) is
//! up to the embedder.
//!
//! ```text
//! register("latency", || Arc::new(Latency::default()))
//! register("errors",  || Arc::new(Errors::default()))
//!
//! resolve(["errors", "latency"]) ──► [Arc<Errors>, Arc<Latency>]   (requested order)
//! resolve(["nope"])              ──► Err(RegistryError::Unknown)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::observers::Observer;

/// Shared handle to an observer.
pub type ObserverRef = Arc<dyn Observer>;

type Factory = Box<dyn Fn() -> ObserverRef + Send + Sync>;

/// Name → factory map used to instantiate observers before a session starts.
#[derive(Default)]
pub struct ObserverRegistry {
    factories: HashMap<String, Factory>,
}

impl ObserverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> ObserverRef + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(RegistryError::Duplicate { name });
        }
        self.factories.insert(name, Box::new(factory));
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Result<Self, RegistryError>
    where
        F: Fn() -> ObserverRef + Send + Sync + 'static,
    {
        self.register(name, factory)?;
        Ok(self)
    }

    /// Returns true if a factory is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Returns sorted list of registered names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Instantiates one observer per requested name, in the requested order.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<ObserverRef>, RegistryError> {
        names
            .iter()
            .map(|n| {
                let name = n.as_ref();
                self.factories
                    .get(name)
                    .map(|f| f())
                    .ok_or_else(|| RegistryError::Unknown {
                        name: name.to_string(),
                    })
            })
            .collect()
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait::async_trait]
    impl Observer for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn registry() -> ObserverRegistry {
        ObserverRegistry::new()
            .with("a", || Arc::new(Named("a")))
            .and_then(|r| r.with("b", || Arc::new(Named("b"))))
            .unwrap()
    }

    #[test]
    fn resolve_keeps_requested_order() {
        let obs = registry().resolve(&["b", "a"]).unwrap();
        let names: Vec<&str> = obs.iter().map(|o| o.name()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = registry().resolve(&["a", "zzz"]).err().unwrap();
        assert_eq!(
            err,
            RegistryError::Unknown {
                name: "zzz".into()
            }
        );
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut r = registry();
        let err = r.register("a", || Arc::new(Named("a"))).unwrap_err();
        assert_eq!(err.as_label(), "registry_duplicate");
        assert_eq!(r.names(), vec!["a".to_string(), "b".to_string()]);
    }
}
