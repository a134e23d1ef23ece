//! Deferred session hooks and session finalization.
//!
//! Nodes only record `(hook type, config)` descriptors. Once a tree ends in
//! `TRUE`, [`SessionHookRegistry::finalize_session`] builds the session and runs
//! the recorded hooks against it in order.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::core::action::IdentifiedIdentity;
use crate::core::context::RequestMetadata;
use crate::core::error::EngineError;
use crate::core::state::{Outcome, TreeResult};

pub const SET_SESSION_PROPERTY_HOOK: &str = "set-session-property";
const DEFAULT_CACHE_CAPACITY: usize = 32;

/// The session created for a successful authentication.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub identity: Option<IdentifiedIdentity>,
    pub properties: BTreeMap<String, String>,
}

/// A hook bound to its config, run once against a freshly created session.
pub trait SessionHook {
    fn run(&self, session: &mut Session, request: &RequestMetadata) -> anyhow::Result<()>;
}

/// Builds hooks of one type from their opaque config.
pub trait SessionHookFactory: Send + Sync {
    fn create(&self, config: &Value) -> anyhow::Result<Box<dyn SessionHook>>;
}

type FactoryProvider = Arc<dyn Fn() -> Arc<dyn SessionHookFactory> + Send + Sync>;

/// Hook-type registry with a bounded cache of instantiated factories.
pub struct SessionHookRegistry {
    providers: BTreeMap<String, FactoryProvider>,
    cache: Mutex<LruCache<String, Arc<dyn SessionHookFactory>>>,
}

impl SessionHookRegistry {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            providers: BTreeMap::new(),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Registry with the built-in hooks, sized `capacity` (0 falls back to the default).
    pub fn with_builtins(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or_else(|| NonZeroUsize::new(DEFAULT_CACHE_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        let mut registry = Self::new(capacity);
        registry.register(SET_SESSION_PROPERTY_HOOK, || {
            Arc::new(SetSessionPropertyFactory) as Arc<dyn SessionHookFactory>
        });
        registry
    }

    pub fn register<F>(&mut self, hook_type: impl Into<String>, provider: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn SessionHookFactory> + Send + Sync + 'static,
    {
        let hook_type = hook_type.into();
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop(&hook_type);
        self.providers.insert(hook_type, Arc::new(provider));
        self
    }

    pub fn contains(&self, hook_type: &str) -> bool {
        self.providers.contains_key(hook_type)
    }

    /// Factory for `hook_type`, instantiated on first use and cached.
    pub fn factory(&self, hook_type: &str) -> Result<Arc<dyn SessionHookFactory>, EngineError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(factory) = cache.get(hook_type) {
            return Ok(Arc::clone(factory));
        }
        let provider = self.providers.get(hook_type).ok_or_else(|| EngineError::Hook {
            hook_type: hook_type.to_string(),
            message: "no factory registered".to_string(),
        })?;
        debug!(hook_type, "instantiating session hook factory");
        let factory = provider();
        cache.put(hook_type.to_string(), Arc::clone(&factory));
        Ok(factory)
    }

    /// Build the session for a `TRUE` result and run its hooks in order.
    ///
    /// Returns `None` for any other outcome; nothing is run in that case.
    pub fn finalize_session(
        &self,
        result: &TreeResult,
        request: &RequestMetadata,
    ) -> Result<Option<Session>, EngineError> {
        if result.outcome != Outcome::True {
            return Ok(None);
        }
        let mut session = Session {
            identity: result.state.identity.clone(),
            properties: result
                .state
                .resolved_session_properties()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        };
        for descriptor in &result.state.session_hooks {
            let hook_error = |err: anyhow::Error| EngineError::Hook {
                hook_type: descriptor.hook_type.clone(),
                message: format!("{err:#}"),
            };
            let factory = self.factory(&descriptor.hook_type)?;
            let hook = factory.create(&descriptor.config).map_err(hook_error)?;
            hook.run(&mut session, request).map_err(hook_error)?;
        }
        info!(
            properties = session.properties.len(),
            hooks = result.state.session_hooks.len(),
            "session finalized"
        );
        Ok(Some(session))
    }
}

impl Default for SessionHookRegistry {
    fn default() -> Self {
        Self::with_builtins(DEFAULT_CACHE_CAPACITY)
    }
}

#[derive(Debug, Deserialize)]
struct SetSessionPropertyConfig {
    key: String,
    value: String,
}

struct SetSessionPropertyFactory;

impl SessionHookFactory for SetSessionPropertyFactory {
    fn create(&self, config: &Value) -> anyhow::Result<Box<dyn SessionHook>> {
        let config: SetSessionPropertyConfig =
            serde_json::from_value(config.clone()).context("parse set-session-property config")?;
        Ok(Box::new(SetSessionProperty(config)))
    }
}

struct SetSessionProperty(SetSessionPropertyConfig);

impl SessionHook for SetSessionProperty {
    fn run(&self, session: &mut Session, _request: &RequestMetadata) -> anyhow::Result<()> {
        session
            .properties
            .insert(self.0.key.clone(), self.0.value.clone());
        Ok(())
    }
}
