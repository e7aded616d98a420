//! # pactum-engine
//!
//! The policy-evaluation subsystem of Pactum: a lazily-loaded compiled
//! policy module ([`PolicyRuntime`]), a write-once broadcast cell for the
//! engine's data context ([`PolicyDataChannel`]), and the rendezvous point
//! combining the two into one evaluation per request
//! ([`PolicyEvaluationService`]).
//!
//! ## Overview
//!
//! The compiled module is an opaque binary artifact fetched once at startup;
//! the [`CompiledPolicy`] and [`ModuleLoader`] traits keep its format and
//! rule semantics out of this crate. Evaluation callers may race the load
//! and the data write freely: the service suspends on whichever is slower
//! and every waiter shares the single load outcome.

pub mod channel;
pub mod runtime;
pub mod service;

pub use channel::PolicyDataChannel;
pub use runtime::{CompiledPolicy, ModuleLoader, PolicyHandle, PolicyRuntime};
pub use service::PolicyEvaluationService;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::time::timeout;

    use pactum_contracts::error::{AuthzError, AuthzResult};
    use pactum_contracts::policy::{
        Decision, Entrypoint, FieldPathMap, PolicyData, PolicyInput,
    };
    use pactum_contracts::subject::RoleHierarchy;

    use crate::{
        CompiledPolicy, ModuleLoader, PolicyDataChannel, PolicyEvaluationService, PolicyRuntime,
    };

    // ── Test doubles ─────────────────────────────────────────────────────────

    /// A compiled module that answers every evaluation with a fixed response
    /// and records the order of calls made against it.
    struct ScriptedPolicy {
        response: Value,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl CompiledPolicy for ScriptedPolicy {
        fn set_data(&mut self, _data: &Value) -> AuthzResult<()> {
            self.calls.lock().unwrap().push("set_data");
            Ok(())
        }

        fn evaluate(&mut self, _input: &Value, _entrypoint: Entrypoint) -> AuthzResult<Value> {
            self.calls.lock().unwrap().push("evaluate");
            Ok(self.response.clone())
        }
    }

    struct ScriptedLoader {
        response: Value,
        delay: Duration,
        fail: bool,
        loads: Arc<AtomicUsize>,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ScriptedLoader {
        fn answering(response: Value) -> Self {
            Self {
                response,
                delay: Duration::ZERO,
                fail: false,
                loads: Arc::new(AtomicUsize::new(0)),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl ModuleLoader for ScriptedLoader {
        async fn load(&self) -> AuthzResult<Box<dyn CompiledPolicy>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(AuthzError::EngineLoad { reason: "scripted failure".to_string() });
            }
            Ok(Box::new(ScriptedPolicy {
                response: self.response.clone(),
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    fn service_with(
        loader: ScriptedLoader,
    ) -> (Arc<PolicyEvaluationService>, Arc<PolicyDataChannel>) {
        let runtime = Arc::new(PolicyRuntime::new(Box::new(loader)));
        let channel = Arc::new(PolicyDataChannel::new());
        let service = Arc::new(PolicyEvaluationService::new(runtime, Arc::clone(&channel)));
        (service, channel)
    }

    fn data() -> PolicyData {
        PolicyData {
            roles_hierarchy: RoleHierarchy::default(),
            input_data_mapping: FieldPathMap::default(),
        }
    }

    fn input() -> PolicyInput {
        PolicyInput::for_feature(None, "ContractsView")
    }

    // ── Response parsing ─────────────────────────────────────────────────────

    /// `[{result: true}]` parses to an allow decision.
    #[tokio::test]
    async fn evaluate_takes_the_first_records_result() {
        let (service, channel) = service_with(ScriptedLoader::answering(json!([
            { "result": true },
            { "result": false }
        ])));
        channel.set(data());

        let decision = service
            .evaluate(&input(), Entrypoint::FeatureAllow, "parsing test")
            .await
            .unwrap();

        assert_eq!(decision, Some(Decision::Allowed(true)));
    }

    /// An empty response sequence is a null decision, not an error.
    #[tokio::test]
    async fn empty_response_yields_null_decision() {
        let (service, channel) = service_with(ScriptedLoader::answering(json!([])));
        channel.set(data());

        let decision = service
            .evaluate(&input(), Entrypoint::FeatureAllow, "parsing test")
            .await
            .unwrap();

        assert_eq!(decision, None);
    }

    /// A record without a usable `result` field is a null decision too.
    #[tokio::test]
    async fn missing_result_field_yields_null_decision() {
        let (service, channel) = service_with(ScriptedLoader::answering(json!([{}])));
        channel.set(data());

        let decision = service
            .evaluate(&input(), Entrypoint::FeatureAllow, "parsing test")
            .await
            .unwrap();

        assert_eq!(decision, None);
    }

    /// A value-set result passes through exactly.
    #[tokio::test]
    async fn value_set_result_passes_through() {
        let (service, channel) = service_with(ScriptedLoader::answering(json!([
            { "result": ["Draft", "Signed"] }
        ])));
        channel.set(data());

        let decision = service
            .evaluate(&input(), Entrypoint::ContractAvailableStates, "parsing test")
            .await
            .unwrap();

        assert_eq!(
            decision,
            Some(Decision::Values(vec!["Draft".to_string(), "Signed".to_string()]))
        );
    }

    // ── Rendezvous semantics ─────────────────────────────────────────────────

    /// Evaluation must not complete before the data channel holds a value;
    /// once set, the blocked call and all later calls complete with it.
    #[tokio::test(start_paused = true)]
    async fn evaluation_waits_for_the_data_channel() {
        let (service, channel) = service_with(ScriptedLoader::answering(json!([
            { "result": true }
        ])));
        assert!(channel.get().is_none());

        let blocked = tokio::spawn({
            let service = Arc::clone(&service);
            async move {
                service.evaluate(&input(), Entrypoint::FeatureAllow, "rendezvous test").await
            }
        });

        // With no data set the call hangs; the paused clock makes the
        // timeout deterministic.
        let mut blocked = blocked;
        assert!(timeout(Duration::from_secs(1), &mut blocked).await.is_err());

        channel.set(data());
        assert!(channel.get().is_some());
        let decision = blocked.await.unwrap().unwrap();
        assert_eq!(decision, Some(Decision::Allowed(true)));

        // A newly-issued call resolves immediately against the same data.
        let decision = service
            .evaluate(&input(), Entrypoint::FeatureAllow, "rendezvous test")
            .await
            .unwrap();
        assert_eq!(decision, Some(Decision::Allowed(true)));
    }

    // ── One-time load ────────────────────────────────────────────────────────

    /// A race to first-load collapses to a single load shared by all waiters.
    #[tokio::test(start_paused = true)]
    async fn concurrent_first_use_loads_the_module_once() {
        let mut loader = ScriptedLoader::answering(json!([{ "result": true }]));
        loader.delay = Duration::from_millis(200);
        let loads = Arc::clone(&loader.loads);

        let runtime = Arc::new(PolicyRuntime::new(Box::new(loader)));
        let channel = Arc::new(PolicyDataChannel::new());
        let service = Arc::new(PolicyEvaluationService::new(
            Arc::clone(&runtime),
            Arc::clone(&channel),
        ));
        channel.set(data());
        assert!(!runtime.is_loaded());

        let a = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.evaluate(&input(), Entrypoint::FeatureAllow, "load race").await }
        });
        let b = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.evaluate(&input(), Entrypoint::FeatureAllow, "load race").await }
        });

        assert_eq!(a.await.unwrap().unwrap(), Some(Decision::Allowed(true)));
        assert_eq!(b.await.unwrap().unwrap(), Some(Decision::Allowed(true)));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(runtime.is_loaded());
    }

    /// A failed load is cached: every pending and future evaluation fails
    /// identically, without retrying the loader.
    #[tokio::test]
    async fn load_failure_replays_to_every_caller() {
        let mut loader = ScriptedLoader::answering(json!([]));
        loader.fail = true;
        let loads = Arc::clone(&loader.loads);

        let (service, channel) = service_with(loader);
        channel.set(data());

        for _ in 0..2 {
            let err = service
                .evaluate(&input(), Entrypoint::FeatureAllow, "load failure")
                .await
                .unwrap_err();
            assert!(matches!(err, AuthzError::EngineLoad { .. }));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    // ── Data application ─────────────────────────────────────────────────────

    /// The data context is re-applied immediately before each evaluation,
    /// never shared or interleaved across calls.
    #[tokio::test]
    async fn data_is_reapplied_before_every_evaluation() {
        let loader = ScriptedLoader::answering(json!([{ "result": true }]));
        let calls = Arc::clone(&loader.calls);

        let (service, channel) = service_with(loader);
        channel.set(data());

        for _ in 0..2 {
            service
                .evaluate(&input(), Entrypoint::FeatureAllow, "pairing test")
                .await
                .unwrap();
        }

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["set_data", "evaluate", "set_data", "evaluate"]
        );
    }
}
