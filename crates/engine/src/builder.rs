//! ProviderBuilder for fluent provider construction
//!
//! # Two Ways to Build
//!
//! ```ignore
//! // One thread, one long-lived session
//! let provider = ProviderBuilder::new()
//!     .client(store)
//!     .connection("Database=orders")
//!     .register::<Order>()
//!     .build_single()?;
//!
//! // Shared across threads, one session per thread
//! let provider = ProviderBuilder::from_config(ProviderConfig::from_file(path)?)
//!     .client(store)
//!     .register::<Order>()
//!     .build_concurrent()?;
//! ```

use crate::concurrent::ConcurrentProvider;
use crate::config::ProviderConfig;
use crate::provider::ProviderCore;
use crate::single::SessionProvider;
use arbor_concurrency::{CommitDispatcher, SessionFactory, SessionRegistry, StatementLog};
use arbor_core::{ConnectionId, Entity, EntityDescriptor, Error, Result};
use arbor_storage::{configure_model, ModelBuilder, StoreClient};
use std::sync::Arc;
use tracing::debug;

/// Builder for [`SessionProvider`] and [`ConcurrentProvider`]
pub struct ProviderBuilder {
    config: ProviderConfig,
    client: Option<Arc<dyn StoreClient>>,
    model: ModelBuilder,
    statement_log: Option<StatementLog>,
    registry: Option<Arc<SessionRegistry>>,
}

impl Default for ProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderBuilder {
    /// Builder with default configuration and no connection
    pub fn new() -> Self {
        Self::from_config(ProviderConfig::default())
    }

    /// Builder seeded from a loaded configuration
    pub fn from_config(config: ProviderConfig) -> Self {
        Self {
            config,
            client: None,
            model: ModelBuilder::new(),
            statement_log: None,
            registry: None,
        }
    }

    // ========================================================================
    // Store
    // ========================================================================

    /// Store client used to open connections (required)
    pub fn client(mut self, client: Arc<dyn StoreClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Raw connection string
    pub fn connection(mut self, raw: impl Into<String>) -> Self {
        self.config.connection = raw.into();
        self
    }

    // ========================================================================
    // Model
    // ========================================================================

    /// Schema name
    pub fn schema(mut self, name: impl Into<String>) -> Self {
        self.config.schema = name.into();
        self
    }

    /// Map an entity type
    pub fn register<T: Entity>(mut self) -> Self {
        self.model = self.model.register::<T>();
        self
    }

    /// Leave a registered type unmapped
    pub fn ignore<T: Entity>(mut self) -> Self {
        self.model = self.model.ignore::<T>();
        self
    }

    /// Classify which registered types are entities
    pub fn entity_filter(
        mut self,
        filter: impl Fn(&EntityDescriptor) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.model = self.model.entity_filter(filter);
        self
    }

    // ========================================================================
    // Behaviour
    // ========================================================================

    /// Initial actor for audit stamping
    pub fn current_user(mut self, actor: impl Into<String>) -> Self {
        self.config.current_user = Some(actor.into());
        self
    }

    /// Receive a description of every statement sent to the store
    pub fn statement_log(mut self, log: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.statement_log = Some(Arc::new(log));
        self
    }

    /// Share a registry with other providers (concurrent variant only)
    pub fn registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use the process-wide registry (concurrent variant only)
    pub fn global_registry(self) -> Self {
        self.registry(SessionRegistry::global())
    }

    /// Fire-and-forget worker threads
    pub fn dispatcher_workers(mut self, workers: usize) -> Self {
        self.config.dispatcher_workers = workers;
        self
    }

    /// Entities per commit in `save_all`
    pub fn save_batch_size(mut self, size: usize) -> Self {
        self.config.save_batch_size = size;
        self
    }

    // ========================================================================
    // Build
    // ========================================================================

    fn factory(&mut self) -> Result<SessionFactory> {
        self.config.validate()?;
        let client = self
            .client
            .clone()
            .ok_or_else(|| Error::Config("no store client configured".to_string()))?;

        let model = std::mem::take(&mut self.model).schema(self.config.schema.clone());
        let model = configure_model(model)?;
        let connection_id = ConnectionId::normalize(&self.config.connection);
        let dispatcher = CommitDispatcher::new(
            self.config.dispatcher_workers,
            self.config.dispatcher_queue_depth,
        )?;

        let mut factory = SessionFactory::new(client, connection_id, model)
            .with_dispatcher(Arc::new(dispatcher));
        let log = match self.statement_log.take() {
            Some(log) => Some(log),
            None if self.config.log_statements => Some(Arc::new(|statement: &str| {
                debug!(target: "arbor::provider", statement, "Statement");
            }) as StatementLog),
            None => None,
        };
        if let Some(log) = log {
            factory = factory.with_statement_log(log);
        }
        Ok(factory)
    }

    /// Build a single-session provider.
    ///
    /// # Errors
    ///
    /// - `Error::Config` for invalid configuration or a missing client
    /// - `Error::Mapping` if the entity model is inconsistent
    /// - connection failures opening the session
    pub fn build_single(mut self) -> Result<SessionProvider> {
        let factory = Arc::new(self.factory()?);
        SessionProvider::new(ProviderCore::new(factory, self.config))
    }

    /// Build a thread-affinitized provider.
    ///
    /// Registers the session factory with the configured registry, or with a
    /// registry private to this provider. If the registry already has a
    /// factory for the same connection, that factory is used.
    ///
    /// # Errors
    ///
    /// Same as [`build_single`](Self::build_single), minus connection
    /// failures: no session is opened until first use.
    pub fn build_concurrent(mut self) -> Result<ConcurrentProvider> {
        let factory = self.factory()?;
        let registry = self
            .registry
            .take()
            .unwrap_or_else(|| Arc::new(SessionRegistry::new()));
        let factory = registry.register(factory);
        Ok(ConcurrentProvider::new(
            ProviderCore::new(factory, self.config),
            registry,
        ))
    }
}
