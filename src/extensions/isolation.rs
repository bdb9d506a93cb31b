//! Per-extension isolation context.
//!
//! Every extension runs inside exactly one [`IsolationContext`]. The context
//! is installed for the duration of each callback (thread scope) and for the
//! lifetime of each managed task (task scope), so ambient lookups through
//! [`current`] always find the extension that is executing. Outside of any
//! scope the lookup fails instead of guessing.

use super::executor::ManagedExecutor;
use super::namespace::ExtensionNamespace;
use super::services::BrokerServices;
use crate::interceptor::{
    interceptor_fn, ErasedProvider, Input, Interceptor, InterceptorProvider, Output,
    ProviderInput, TypedProvider,
};
use crate::packets::{Direction, Interceptable, PacketKind};
use parking_lot::RwLock;
use std::cell::RefCell;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::AbortHandle;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IsolationError {
    #[error("no extension isolation context is active on this thread or task")]
    NoContext,
    #[error("extension {0} is stopped")]
    ExtensionStopped(String),
    #[error("{kind} can not be intercepted in the {direction} direction")]
    DirectionNotSupported {
        kind: PacketKind,
        direction: Direction,
    },
    #[error("no async runtime available to run tasks of extension {0}")]
    NoRuntime(String),
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<IsolationContext>>> = const { RefCell::new(None) };
}

tokio::task_local! {
    static TASK_CONTEXT: Arc<IsolationContext>;
}

/// Restores the previously installed context when dropped, including
/// during unwinding.
struct ScopeGuard {
    previous: Option<Arc<IsolationContext>>,
}

impl ScopeGuard {
    fn install(context: Arc<IsolationContext>) -> Self {
        let previous = CURRENT.with(|current| current.borrow_mut().replace(context));
        Self { previous }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

/// The context of the extension currently executing.
pub fn current() -> Result<Arc<IsolationContext>, IsolationError> {
    let context = CURRENT
        .with(|current| current.borrow().clone())
        .or_else(|| TASK_CONTEXT.try_with(Arc::clone).ok())
        .ok_or(IsolationError::NoContext)?;
    if !context.is_enabled() {
        return Err(IsolationError::ExtensionStopped(context.id.clone()));
    }
    Ok(context)
}

/// Service facade of the extension currently executing.
pub fn services() -> Result<Arc<BrokerServices>, IsolationError> {
    current().map(|context| Arc::clone(&context.services))
}

pub struct IsolationContext {
    id: String,
    name: String,
    version: String,
    priority: i32,
    settings: toml::Table,
    enabled: AtomicBool,
    namespace: ExtensionNamespace,
    services: Arc<BrokerServices>,
    providers: RwLock<Vec<Arc<dyn ErasedProvider>>>,
    executor: ManagedExecutor,
}

impl IsolationContext {
    pub(crate) fn new(
        manifest: &super::ExtensionManifest,
        services: Arc<BrokerServices>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: manifest.id.clone(),
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            priority: manifest.priority,
            settings: manifest.settings.clone(),
            enabled: AtomicBool::new(true),
            namespace: ExtensionNamespace::new(services.shared_namespace()),
            services,
            providers: RwLock::new(Vec::new()),
            executor: ManagedExecutor::new(&manifest.id),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// The `[settings]` table of the extension manifest.
    pub fn settings(&self) -> &toml::Table {
        &self.settings
    }

    pub fn services(&self) -> &Arc<BrokerServices> {
        &self.services
    }

    pub fn namespace(&self) -> &ExtensionNamespace {
        &self.namespace
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Runs `f` with this context installed on the current thread.
    pub fn enter<R>(self: &Arc<Self>, f: impl FnOnce() -> R) -> R {
        let _guard = ScopeGuard::install(Arc::clone(self));
        f()
    }

    /// Runs `future` with this context installed for the task.
    pub fn scope<F: Future>(self: &Arc<Self>, future: F) -> impl Future<Output = F::Output> {
        TASK_CONTEXT.scope(Arc::clone(self), future)
    }

    /// Spawns a managed task that runs inside this context and is aborted
    /// when the extension stops.
    pub fn spawn<F>(self: &Arc<Self>, future: F) -> Result<AbortHandle, IsolationError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.is_enabled() {
            return Err(IsolationError::ExtensionStopped(self.id.clone()));
        }
        self.executor.spawn(self.scope(future))
    }

    pub fn running_tasks(&self) -> usize {
        self.executor.running()
    }

    pub fn add_provider<P: Interceptable>(
        &self,
        direction: Direction,
        provider: Arc<dyn InterceptorProvider<P>>,
    ) -> Result<(), IsolationError> {
        if !P::KIND.supports(direction) {
            return Err(IsolationError::DirectionNotSupported {
                kind: P::KIND,
                direction,
            });
        }
        if !self.is_enabled() {
            return Err(IsolationError::ExtensionStopped(self.id.clone()));
        }
        self.providers
            .write()
            .push(Arc::new(TypedProvider::new(direction, provider)));
        Ok(())
    }

    /// Registers a provider closure, asked once per new connection.
    pub fn register_provider<P, F>(&self, direction: Direction, provider: F) -> Result<(), IsolationError>
    where
        P: Interceptable,
        F: Fn(&ProviderInput) -> Option<Arc<dyn Interceptor<P>>> + Send + Sync + 'static,
    {
        self.add_provider::<P>(direction, Arc::new(provider))
    }

    /// Registers one interceptor shared by every connection.
    pub fn register_interceptor<P, F>(&self, direction: Direction, f: F) -> Result<(), IsolationError>
    where
        P: Interceptable,
        F: Fn(&Input<P>, &Output<P>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let interceptor = interceptor_fn(f);
        self.register_provider::<P, _>(direction, move |_: &ProviderInput| {
            Some(Arc::clone(&interceptor))
        })
    }

    pub(crate) fn providers(&self) -> Vec<Arc<dyn ErasedProvider>> {
        self.providers.read().clone()
    }

    pub fn provider_count(&self) -> usize {
        self.providers.read().len()
    }

    /// Stops the extension's participation: interceptors are skipped from
    /// now on, providers are dropped and managed tasks are aborted.
    pub(crate) fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        self.providers.write().clear();
        self.executor.shutdown();
    }
}

impl std::fmt::Debug for IsolationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolationContext")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::ExtensionManifest;
    use crate::packets::{ConnackPacket, PublishPacket};

    fn context(id: &str) -> Arc<IsolationContext> {
        IsolationContext::new(
            &ExtensionManifest::new(id, id, "1.0.0"),
            Arc::new(BrokerServices::default()),
        )
    }

    #[test]
    fn test_lookup_without_scope_fails() {
        assert_eq!(current().unwrap_err(), IsolationError::NoContext);
        assert!(services().is_err());
    }

    #[test]
    fn test_nested_scopes_restore_previous() {
        let outer = context("outer");
        let inner = context("inner");
        outer.enter(|| {
            assert_eq!(current().unwrap().id(), "outer");
            inner.enter(|| assert_eq!(current().unwrap().id(), "inner"));
            assert_eq!(current().unwrap().id(), "outer");
        });
        assert!(current().is_err());
    }

    #[test]
    fn test_scope_restored_after_panic() {
        let ctx = context("panicky");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            ctx.enter(|| panic!("boom"));
        }));
        assert!(result.is_err());
        assert!(current().is_err());
    }

    #[test]
    fn test_disabled_context_is_not_current() {
        let ctx = context("stopped");
        ctx.disable();
        assert_eq!(
            ctx.enter(current).unwrap_err(),
            IsolationError::ExtensionStopped("stopped".into())
        );
    }

    #[tokio::test]
    async fn test_task_scope() {
        let ctx = context("tasked");
        let id = ctx
            .scope(async { current().map(|c| c.id().to_owned()) })
            .await
            .unwrap();
        assert_eq!(id, "tasked");
    }

    #[test]
    fn test_direction_checked_at_registration() {
        let ctx = context("dir");
        let err = ctx
            .register_interceptor::<ConnackPacket, _>(Direction::Inbound, |_, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, IsolationError::DirectionNotSupported { .. }));
        ctx.register_interceptor::<PublishPacket, _>(Direction::Outbound, |_, _| Ok(()))
            .unwrap();
        assert_eq!(ctx.provider_count(), 1);
    }
}
