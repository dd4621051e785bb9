//! Where marshallers, strategies and acceptors come from.
//!
//! Callers go through [`MarshallerFactory`], which delegates everything to a
//! process-wide [`MarshallerProvider`]. The provider is looked up by a
//! well-known name in a registry of constructors the first time it is needed
//! and cached for the rest of the process. Registering a different
//! constructor under [`DEFAULT_PROVIDER_NAME`] before that first use swaps the
//! implementation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use lazy_static::lazy_static;
use tracing::info;

use crate::acceptor::ClassFilterAcceptor;
use crate::chain::StrategyChain;
use crate::error::{MarshalError, Result};
use crate::marshaller::Marshaller;
use crate::session::KnowledgeBase;
use crate::settings::MarshallerConfig;
use crate::strategy::{ContentStrategy, IdentityStrategy, IdentityTable, Strategy};

pub const DEFAULT_PROVIDER_NAME: &str = "session_marshal::provider::DefaultMarshallerProvider";

pub trait MarshallerProvider: Send + Sync + fmt::Debug {
    fn new_marshaller(&self, knowledge_base: Arc<KnowledgeBase>) -> Marshaller;
    fn new_marshaller_with_strategies(
        &self,
        knowledge_base: Arc<KnowledgeBase>,
        strategies: Vec<Strategy>,
    ) -> Marshaller;
    /// Accepts everything when no acceptor is given.
    fn new_identity_strategy(&self, acceptor: Option<ClassFilterAcceptor>) -> Strategy;
    /// Accepts everything when no acceptor is given.
    fn new_content_strategy(&self, acceptor: Option<ClassFilterAcceptor>) -> Strategy;
    fn new_class_filter_acceptor(&self, patterns: &[&str]) -> Result<ClassFilterAcceptor>;
}

// ------------- DefaultMarshallerProvider -------------
#[derive(Debug, Clone, Default)]
pub struct DefaultMarshallerProvider {
    config: MarshallerConfig,
}

impl DefaultMarshallerProvider {
    pub fn new(config: MarshallerConfig) -> Self {
        Self { config }
    }
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(MarshallerConfig::from_env()?))
    }
    pub fn config(&self) -> &MarshallerConfig {
        &self.config
    }
}

impl MarshallerProvider for DefaultMarshallerProvider {
    fn new_marshaller(&self, knowledge_base: Arc<KnowledgeBase>) -> Marshaller {
        Marshaller::with_chain(knowledge_base, StrategyChain::default(), self.config.clone())
    }
    fn new_marshaller_with_strategies(
        &self,
        knowledge_base: Arc<KnowledgeBase>,
        strategies: Vec<Strategy>,
    ) -> Marshaller {
        Marshaller::with_chain(
            knowledge_base,
            StrategyChain::new(strategies),
            self.config.clone(),
        )
    }
    fn new_identity_strategy(&self, acceptor: Option<ClassFilterAcceptor>) -> Strategy {
        Strategy::Identity(IdentityStrategy::with_table(
            acceptor.unwrap_or_default(),
            IdentityTable::new(self.config.identity_id_base),
        ))
    }
    fn new_content_strategy(&self, acceptor: Option<ClassFilterAcceptor>) -> Strategy {
        Strategy::Content(ContentStrategy::new(acceptor.unwrap_or_default()))
    }
    fn new_class_filter_acceptor(&self, patterns: &[&str]) -> Result<ClassFilterAcceptor> {
        ClassFilterAcceptor::new(patterns)
    }
}

// ------------- Registry -------------
pub type ProviderConstructor = fn() -> Result<Arc<dyn MarshallerProvider>>;

fn default_provider() -> Result<Arc<dyn MarshallerProvider>> {
    Ok(Arc::new(DefaultMarshallerProvider::from_env()?))
}

lazy_static! {
    static ref PROVIDERS: RwLock<HashMap<String, ProviderConstructor>> = {
        let mut providers: HashMap<String, ProviderConstructor> = HashMap::new();
        providers.insert(DEFAULT_PROVIDER_NAME.to_owned(), default_provider);
        RwLock::new(providers)
    };
}

/// Returns the constructor previously registered under `name`, if any.
/// Slots that already resolved `name` keep their provider.
pub fn register_provider(name: &str, constructor: ProviderConstructor) -> Result<Option<ProviderConstructor>> {
    let mut providers = PROVIDERS
        .write()
        .map_err(|e| MarshalError::Lock(e.to_string()))?;
    Ok(providers.insert(name.to_owned(), constructor))
}

fn construct_provider(name: &str) -> Result<Arc<dyn MarshallerProvider>> {
    let constructor = PROVIDERS
        .read()
        .map_err(|e| MarshalError::Lock(e.to_string()))?
        .get(name)
        .copied()
        .ok_or_else(|| MarshalError::ProviderInitialization {
            name: name.to_owned(),
            reason: "no provider registered under this name".to_owned(),
        })?;
    constructor().map_err(|e| MarshalError::ProviderInitialization {
        name: name.to_owned(),
        reason: e.to_string(),
    })
}

// ------------- ProviderSlot -------------
/// Resolves a provider by name once and hands out the cached instance after
/// that. A failed resolution is reported and nothing is cached.
#[derive(Debug)]
pub struct ProviderSlot {
    name: &'static str,
    resolved: OnceLock<Arc<dyn MarshallerProvider>>,
    init: Mutex<()>,
}

impl ProviderSlot {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            resolved: OnceLock::new(),
            init: Mutex::new(()),
        }
    }
    pub fn name(&self) -> &'static str {
        self.name
    }
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }
    pub fn get(&self) -> Result<Arc<dyn MarshallerProvider>> {
        if let Some(provider) = self.resolved.get() {
            return Ok(Arc::clone(provider));
        }
        let _guard = self
            .init
            .lock()
            .map_err(|e| MarshalError::Lock(e.to_string()))?;
        if let Some(provider) = self.resolved.get() {
            return Ok(Arc::clone(provider));
        }
        let provider = construct_provider(self.name)?;
        info!(name = self.name, "marshaller provider resolved");
        Ok(Arc::clone(self.resolved.get_or_init(|| provider)))
    }
}

static PROVIDER: ProviderSlot = ProviderSlot::new(DEFAULT_PROVIDER_NAME);

// ------------- MarshallerFactory -------------
/// Entry point for callers; every method delegates to the process-wide provider.
///
/// ```
/// use std::sync::Arc;
/// use session_marshal::provider::MarshallerFactory;
/// use session_marshal::session::{KnowledgeBase, StatefulSession};
///
/// let kbase = Arc::new(KnowledgeBase::new("example"));
/// let session = StatefulSession::new(Arc::clone(&kbase));
/// let mut marshaller = MarshallerFactory::new_marshaller(Arc::clone(&kbase)).unwrap();
/// let mut bytes = Vec::new();
/// marshaller.marshal(&session, &mut bytes).unwrap();
/// let restored = marshaller.unmarshal(bytes.as_slice(), kbase).unwrap();
/// assert_eq!(restored.fact_count(), 0);
/// ```
pub struct MarshallerFactory;

impl MarshallerFactory {
    pub fn provider() -> Result<Arc<dyn MarshallerProvider>> {
        PROVIDER.get()
    }
    pub fn new_class_filter_acceptor(patterns: &[&str]) -> Result<ClassFilterAcceptor> {
        Self::provider()?.new_class_filter_acceptor(patterns)
    }
    pub fn new_identity_strategy() -> Result<Strategy> {
        Ok(Self::provider()?.new_identity_strategy(None))
    }
    pub fn new_identity_strategy_with(acceptor: ClassFilterAcceptor) -> Result<Strategy> {
        Ok(Self::provider()?.new_identity_strategy(Some(acceptor)))
    }
    pub fn new_content_strategy() -> Result<Strategy> {
        Ok(Self::provider()?.new_content_strategy(None))
    }
    pub fn new_content_strategy_with(acceptor: ClassFilterAcceptor) -> Result<Strategy> {
        Ok(Self::provider()?.new_content_strategy(Some(acceptor)))
    }
    /// Content strategy for everything.
    pub fn new_marshaller(knowledge_base: Arc<KnowledgeBase>) -> Result<Marshaller> {
        Ok(Self::provider()?.new_marshaller(knowledge_base))
    }
    /// Strategies are consulted in the order given.
    pub fn new_marshaller_with_strategies(
        knowledge_base: Arc<KnowledgeBase>,
        strategies: Vec<Strategy>,
    ) -> Result<Marshaller> {
        Ok(Self::provider()?.new_marshaller_with_strategies(knowledge_base, strategies))
    }
}
