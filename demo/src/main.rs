//! Pactum — Contract-Management Authorization Demo CLI
//!
//! Wires the full authorization layer together in one process: the demo
//! policy module, the in-memory contract backend behind a policy-enforced
//! transport, and the orchestrator on top. Each subcommand walks one
//! scenario.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- feature-gate
//!   cargo run -p demo -- lifecycle
//!   cargo run -p demo -- enforcement

mod backend;
mod policy;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use url::Url;

use pactum_authz::{
    AuthorizationOrchestrator, AuthzConfig, ContractField, ContractService,
    FieldValidator, IdentityChannel, PolicyEnforcedTransport,
};
use pactum_contracts::error::{AuthzError, AuthzResult};
use pactum_contracts::subject::{Department, Role, Subject};
use pactum_engine::{PolicyDataChannel, PolicyEvaluationService, PolicyRuntime};
use pactum_mapping::build_policy_data;

use crate::backend::InMemoryContractApi;
use crate::policy::DemoModuleLoader;

// ── CLI definition ────────────────────────────────────────────────────────────

/// Pactum — client-side authorization for contract management.
///
/// Every decision in the demo is made by the policy module; the application
/// code only asks questions and renders answers.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "Pactum contract-management authorization demo",
    long_about = "Walks through feature gating, live lifecycle decisions, and\n\
                  outbound request enforcement, all driven by one policy module."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all three scenarios in sequence.
    RunAll,
    /// Scenario 1: role-based feature gating across four users.
    FeatureGate,
    /// Scenario 2: live lifecycle decisions while a draft is edited.
    Lifecycle,
    /// Scenario 3: blocked requests and denied writes.
    Enforcement,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Set RUST_LOG=info to watch every evaluation go by.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = match cli.command {
        Command::RunAll => run_all().await,
        Command::FeatureGate => run_feature_gate().await,
        Command::Lifecycle => run_lifecycle().await,
        Command::Enforcement => run_enforcement().await,
    };

    match result {
        Ok(()) => println!("All selected scenarios completed."),
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_all() -> AuthzResult<()> {
    run_feature_gate().await?;
    run_lifecycle().await?;
    run_enforcement().await?;
    Ok(())
}

// ── Wiring ────────────────────────────────────────────────────────────────────

struct App {
    orchestrator: AuthorizationOrchestrator,
    service: ContractService,
    evaluation: Arc<PolicyEvaluationService>,
    identity: IdentityChannel,
    backend: Arc<InMemoryContractApi>,
}

fn build_app() -> AuthzResult<App> {
    let runtime = Arc::new(PolicyRuntime::new(Box::new(DemoModuleLoader)));
    let data = Arc::new(PolicyDataChannel::new());
    data.set(build_policy_data(Default::default())?);
    let evaluation = Arc::new(PolicyEvaluationService::new(runtime, data));

    let identity = IdentityChannel::new();
    let config = AuthzConfig::default();

    let backend = InMemoryContractApi::seeded();
    let transport = Arc::new(PolicyEnforcedTransport::new(
        backend.clone(),
        Arc::clone(&evaluation),
        identity.clone(),
        &config,
    ));
    let collection = Url::parse("http://backend.local/api/contracts")
        .map_err(|e| AuthzError::Config { reason: format!("bad collection url: {}", e) })?;
    let service = ContractService::new(
        transport,
        Arc::clone(&evaluation),
        identity.clone(),
        collection,
    );
    let orchestrator = AuthorizationOrchestrator::new(
        Arc::clone(&evaluation),
        identity.clone(),
        config,
    );

    Ok(App { orchestrator, service, evaluation, identity, backend })
}

fn users() -> Vec<Subject> {
    vec![
        Subject {
            id: "alice".to_string(),
            name: "Alice".to_string(),
            department: Some(Department::Sales),
            roles: vec![Role::Employee],
        },
        Subject {
            id: "bob".to_string(),
            name: "Bob".to_string(),
            department: Some(Department::It),
            roles: vec![Role::Employee, Role::ContractAdmin],
        },
        Subject {
            id: "carol".to_string(),
            name: "Carol".to_string(),
            department: None,
            roles: vec![Role::Ceo],
        },
        Subject {
            id: "eve".to_string(),
            name: "Eve".to_string(),
            department: None,
            roles: vec![Role::External],
        },
    ]
}

/// Long enough for a decision stream to settle past its quiet window.
async fn let_streams_settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

// ── Scenario 1: feature gating ────────────────────────────────────────────────

async fn run_feature_gate() -> AuthzResult<()> {
    println!("--- Scenario 1: feature gating ---");
    let app = build_app()?;

    for user in users() {
        app.identity.set(user.clone());
        let contracts = app.orchestrator.feature_access("contracts").await?;
        let administration = app.orchestrator.feature_access("administration").await?;
        println!(
            "  {:<6} {:?}: contracts={}, administration={}",
            user.name, user.roles, contracts, administration
        );
    }

    println!();
    Ok(())
}

// ── Scenario 2: live lifecycle decisions ──────────────────────────────────────

async fn run_lifecycle() -> AuthzResult<()> {
    println!("--- Scenario 2: lifecycle decisions while editing ---");
    let app = build_app()?;

    let alice = users().remove(0);
    app.identity.set(alice);

    let mut contract = app.service.create("Partnership agreement").await?;
    println!("  created draft '{}' ({})", contract.title, contract.id);

    let (editor, contract_rx) = watch::channel(Some(contract.clone()));
    let states = app.orchestrator.available_states(contract_rx.clone());
    let body_validator = FieldValidator::for_field(
        ContractField::Body,
        contract_rx,
        Arc::clone(&app.evaluation),
    );

    let_streams_settle().await;
    println!("  fresh draft states:        {:?}", *states.borrow());

    let empty_check = body_validator.validate("").await?;
    println!("  empty body validates as:   {:?}", empty_check);

    contract.body = "The parties agree to cooperate.".to_string();
    contract.signature = "Jane Doe".to_string();
    editor.send(Some(contract.clone())).map_err(|_| AuthzError::Config {
        reason: "contract stream closed".to_string(),
    })?;
    let_streams_settle().await;
    println!("  filled and signed states:  {:?}", *states.borrow());

    let updated = app.service.update(&contract).await?;
    println!("  persisted update to '{}'", updated.title);
    println!("  may delete own draft:      {}", app.orchestrator.can_delete(&updated).await?);

    println!();
    Ok(())
}

// ── Scenario 3: enforcement ───────────────────────────────────────────────────

async fn run_enforcement() -> AuthzResult<()> {
    println!("--- Scenario 3: request enforcement and denied writes ---");
    let app = build_app()?;

    // An external user's requests never leave the client.
    let eve = users().pop().ok_or_else(|| AuthzError::Config {
        reason: "demo user set changed".to_string(),
    })?;
    app.identity.set(eve);
    let visible = app.service.contracts().await;
    println!("  eve (External) sees {} contracts", visible.len());

    // Alice may read but not rewrite a signed contract.
    let alice = users().remove(0);
    app.identity.set(alice);
    if let Some(mut signed) = app.backend.signed_contract_of("alice") {
        signed.body = "Retroactively improved terms.".to_string();
        match app.service.update(&signed).await {
            Err(AuthzError::DeniedByPolicy { reason }) => {
                println!("  update of signed contract: denied ({})", reason)
            }
            Err(other) => return Err(other),
            Ok(_) => println!("  update of signed contract: unexpectedly allowed"),
        }
    }

    // Admins see the unrestricted listing.
    let bob = users().remove(1);
    app.identity.set(bob);
    let all = app.service.contracts().await;
    println!("  bob (ContractAdmin) sees {} contracts", all.len());

    println!();
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("Pactum — Client-Side Authorization Layer");
    println!("Contract Management Demo");
    println!("========================================");
    println!();
    println!("Decision path per question:");
    println!("  [1] Policy module loads once, on first use");
    println!("  [2] Data context (role hierarchy + discovered field paths) applied");
    println!("  [3] Entrypoint evaluated against the typed policy input");
    println!("  [4] Streams debounce their inputs; stale evaluations are dropped");
    println!("  [5] Outbound requests pass http/allow or are blocked client-side");
    println!();
}
