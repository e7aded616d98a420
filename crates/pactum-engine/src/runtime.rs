//! Lazy, load-once holder for the compiled policy module.
//!
//! The module bytes arrive over the network and instantiation is not free,
//! so loading is deferred to the first evaluation and performed at most once
//! per process. A race to first-load collapses to a single load; every
//! waiter receives the same handle, or the same load error.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};
use tracing::{error, info};

use pactum_contracts::error::{AuthzError, AuthzResult};
use pactum_contracts::policy::Entrypoint;

/// An instantiated compiled policy module.
///
/// The module format and rule semantics are opaque to this crate; the trait
/// only fixes the calling convention. Implementations are stateful: the data
/// context applied by `set_data` is the one the next `evaluate` uses, which
/// is why the runtime hands the module out behind an async mutex.
pub trait CompiledPolicy: Send {
    /// Apply the persistent data context (role hierarchy, field path map).
    fn set_data(&mut self, data: &Value) -> AuthzResult<()>;

    /// Run the rule-set named by `entrypoint` against `input`.
    ///
    /// The raw response is a sequence of result records; parsing it is the
    /// evaluation service's job.
    fn evaluate(&mut self, input: &Value, entrypoint: Entrypoint) -> AuthzResult<Value>;
}

/// Fetches and instantiates the compiled policy module.
///
/// A production implementation fetches the binary artifact over HTTP (the
/// fetch path must be exempt from policy enforcement to avoid a circular
/// wait) and hands the bytes to the embedded engine. Failures map to
/// `AuthzError::EngineLoad`.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self) -> AuthzResult<Box<dyn CompiledPolicy>>;
}

/// Shared handle to the loaded module.
///
/// The mutex guarantees a `set_data`/`evaluate` pair is never interleaved
/// with another caller's.
pub type PolicyHandle = Arc<Mutex<Box<dyn CompiledPolicy>>>;

/// Loads the compiled module on first use and caches the outcome for the
/// remainder of the process.
pub struct PolicyRuntime {
    loader: Box<dyn ModuleLoader>,
    module: OnceCell<Result<PolicyHandle, AuthzError>>,
}

impl PolicyRuntime {
    pub fn new(loader: Box<dyn ModuleLoader>) -> Self {
        Self { loader, module: OnceCell::new() }
    }

    /// The loaded module, loading it first if no caller has before.
    ///
    /// Concurrent first calls all wait on the same load. The outcome is
    /// cached either way: a load failure is fatal for the process and every
    /// later call receives the same error.
    pub async fn handle(&self) -> AuthzResult<PolicyHandle> {
        let outcome = self
            .module
            .get_or_init(|| async {
                info!("loading compiled policy module");
                match self.loader.load().await {
                    Ok(policy) => {
                        info!("compiled policy module loaded");
                        Ok(Arc::new(Mutex::new(policy)))
                    }
                    Err(e) => {
                        error!(
                            error = %e,
                            "compiled policy module failed to load; no authorization \
                             decision can be made for the remainder of the process"
                        );
                        Err(e)
                    }
                }
            })
            .await;
        outcome.clone()
    }

    /// True once a load attempt has completed successfully.
    pub fn is_loaded(&self) -> bool {
        matches!(self.module.get(), Some(Ok(_)))
    }
}
