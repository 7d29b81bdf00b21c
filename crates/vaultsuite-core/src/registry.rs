//! Named driver resolution.
//!
//! Drivers are built on first request from their configuration block and
//! cached for the life of the registry. Custom constructors registered with
//! [`DriverRegistry::extend`] are consulted before the built-ins.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use tracing::info;

use crate::config::{DriverConfig, SecretsConfig};
use crate::driver::SecretsDriver;
use crate::error::{Result, SecretsError};
use crate::vault::VaultDriver;
use crate::{OPENBAO_DRIVER, VAULT_DRIVER};

/// Constructor for a named driver.
pub type DriverFactory =
    Arc<dyn Fn(&DriverConfig) -> Result<Arc<dyn SecretsDriver>> + Send + Sync>;

/// Per-name cache slot, initialized at most once.
type DriverSlot = Arc<Mutex<Option<Arc<dyn SecretsDriver>>>>;

/// Resolves driver names to shared, lazily-built driver instances.
pub struct DriverRegistry {
    config: SecretsConfig,
    factories: RwLock<HashMap<String, DriverFactory>>,
    drivers: Mutex<HashMap<String, DriverSlot>>,
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut custom: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .keys()
            .cloned()
            .collect();
        custom.sort();
        f.debug_struct("DriverRegistry")
            .field("default", &self.config.default)
            .field("custom", &custom)
            .finish()
    }
}

impl DriverRegistry {
    pub fn new(config: SecretsConfig) -> Self {
        Self {
            config,
            factories: RwLock::new(HashMap::new()),
            drivers: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SecretsConfig {
        &self.config
    }

    /// Name used when no driver is requested explicitly.
    pub fn default_driver(&self) -> &str {
        &self.config.default
    }

    /// Register a custom constructor for `name`. It takes precedence over a
    /// built-in of the same name for drivers not yet built.
    ///
    /// A factory may resolve other drivers through the registry, but not the
    /// name it is building.
    pub fn extend<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&DriverConfig) -> Result<Arc<dyn SecretsDriver>> + Send + Sync + 'static,
    {
        let mut factories = self.factories.write().unwrap_or_else(|p| p.into_inner());
        factories.insert(name.into(), Arc::new(factory));
    }

    fn slot(&self, name: &str) -> DriverSlot {
        let mut drivers = self.drivers.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(drivers.entry(name.to_owned()).or_default())
    }

    /// Resolve `name` (or the default driver) to its shared instance.
    ///
    /// Construction holds only that name's slot, so concurrent first
    /// requests for one name build a single instance while other names
    /// stay resolvable.
    pub fn driver(&self, name: Option<&str>) -> Result<Arc<dyn SecretsDriver>> {
        let name = name.unwrap_or(&self.config.default);

        let slot = self.slot(name);
        let mut cached = slot.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(driver) = cached.as_ref() {
            return Ok(Arc::clone(driver));
        }

        let driver = self.create(name)?;
        *cached = Some(Arc::clone(&driver));
        Ok(driver)
    }

    fn create(&self, name: &str) -> Result<Arc<dyn SecretsDriver>> {
        let config = self.config.driver(name).ok_or_else(|| {
            SecretsError::Configuration(format!("secrets driver [{name}] is not configured"))
        })?;

        let custom = self
            .factories
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
            .cloned();

        let driver = match custom {
            Some(factory) => factory(config)?,
            None => match name {
                VAULT_DRIVER | OPENBAO_DRIVER => {
                    Arc::new(VaultDriver::new(config)?) as Arc<dyn SecretsDriver>
                }
                _ => {
                    return Err(SecretsError::Configuration(format!(
                        "secrets driver [{name}] is not supported"
                    )));
                }
            },
        };

        info!(driver = name, address = %config.address, "secrets driver initialized");
        Ok(driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config_with(names: &[&str]) -> SecretsConfig {
        let mut config = SecretsConfig::default();
        for name in names {
            config
                .drivers
                .insert((*name).to_owned(), DriverConfig::default());
        }
        config
    }

    #[test]
    fn default_driver_is_cached() {
        let registry = DriverRegistry::new(config_with(&["vault"]));
        let a = registry.driver(None).unwrap();
        let b = registry.driver(Some("vault")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn openbao_reuses_vault_driver() {
        let registry = DriverRegistry::new(config_with(&["vault", "openbao"]));
        let bao = registry.driver(Some("openbao")).unwrap();
        assert!(format!("{bao:?}").contains("VaultDriver"));
        let vault = registry.driver(Some("vault")).unwrap();
        assert!(!Arc::ptr_eq(&bao, &vault));
    }

    #[test]
    fn missing_config_block_is_configuration_error() {
        let registry = DriverRegistry::new(config_with(&["vault"]));
        let err = registry.driver(Some("openbao")).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("[openbao] is not configured"));
    }

    #[test]
    fn unknown_driver_is_configuration_error() {
        let registry = DriverRegistry::new(config_with(&["aws"]));
        let err = registry.driver(Some("aws")).unwrap_err();
        assert!(err.to_string().contains("[aws] is not supported"));
    }

    #[test]
    fn custom_factory_checked_before_builtins() {
        let registry = DriverRegistry::new(config_with(&["vault", "edge"]));
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        registry.extend("edge", move |config| {
            counter.fetch_add(1, Ordering::SeqCst);
            let config = config.clone().with_token("edge-token");
            Ok(Arc::new(VaultDriver::new(&config)?) as Arc<dyn SecretsDriver>)
        });
        let counter = Arc::clone(&calls);
        registry.extend("vault", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(SecretsError::Configuration("vault disabled".into()))
        });

        registry.driver(Some("edge")).unwrap();
        registry.driver(Some("edge")).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let err = registry.driver(Some("vault")).unwrap_err();
        assert!(err.to_string().contains("vault disabled"));
    }

    #[test]
    fn custom_factory_still_requires_config_block() {
        let registry = DriverRegistry::new(config_with(&["vault"]));
        registry.extend("edge", |config| {
            Ok(Arc::new(VaultDriver::new(config)?) as Arc<dyn SecretsDriver>)
        });
        assert!(registry.driver(Some("edge")).unwrap_err().is_configuration());
    }

    #[test]
    fn factory_may_resolve_another_driver() {
        let registry = Arc::new(DriverRegistry::new(config_with(&["vault", "primary"])));
        let weak = Arc::downgrade(&registry);
        registry.extend("primary", move |_| {
            let registry = weak
                .upgrade()
                .ok_or_else(|| SecretsError::Configuration("registry dropped".into()))?;
            registry.driver(Some("vault"))
        });

        let primary = registry.driver(Some("primary")).unwrap();
        let vault = registry.driver(Some("vault")).unwrap();
        assert!(Arc::ptr_eq(&primary, &vault));
    }

    #[test]
    fn failed_build_is_retried() {
        let registry = DriverRegistry::new(config_with(&["vault"]));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        registry.extend("vault", move |config| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(SecretsError::Configuration("not yet".into()));
            }
            Ok(Arc::new(VaultDriver::new(config)?) as Arc<dyn SecretsDriver>)
        });

        assert!(registry.driver(None).is_err());
        assert!(registry.driver(None).is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_first_access_builds_one_instance() {
        let registry = Arc::new(DriverRegistry::new(config_with(&["vault"])));
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        registry.extend("vault", move |config| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(VaultDriver::new(config)?) as Arc<dyn SecretsDriver>)
        });

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.driver(None).unwrap())
            })
            .collect();
        let drivers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(drivers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
