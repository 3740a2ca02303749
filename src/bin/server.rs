//! orgchart HTTP service.
//!
//! Run with: cargo run --features server --bin orgchart-server
//!
//! Configuration (environment):
//!   ORGCHART_DB      snapshot directory (default ./data/orgchart.mdb)
//!   ORGCHART_CHART   chart definition JSON, used when no snapshot exists
//!   PORT             listen port (default 3000)
//!
//! Endpoints:
//!   GET  /health        - Service status and block height
//!   POST /blocks        - Seal the next block hash
//!   GET  /roles         - List active roles
//!   GET  /check         - Membership query (?user=&role=&strict=)
//!   POST /grant         - Grant a role under an approval
//!   POST /revoke        - Revoke a role under an approval
//!   POST /roles/add     - Add a role under an admin approval
//!   POST /roles/remove  - Remove a role under an admin approval

use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tracing::info;

use orgchart::server::{router, AppState};
use orgchart::{Action, Atom, Chart, ChartBuilder, Deployment, Rule, Store};

// ============================================================================
// Chart definition file
// ============================================================================

#[derive(Deserialize)]
struct ChartFile {
    #[serde(default)]
    dynamic: bool,
    deployment: Deployment,
    roles: Vec<RoleEntry>,
    #[serde(default)]
    rules: Vec<RuleEntry>,
    #[serde(default)]
    admin_rules: Vec<RuleEntry>,
    #[serde(default)]
    seeds: Vec<SeedEntry>,
}

#[derive(Deserialize)]
struct RoleEntry {
    name: String,
    #[serde(default)]
    juniors: Vec<String>,
}

#[derive(Deserialize)]
struct RuleEntry {
    /// Role the rule governs; ignored for admin rules.
    #[serde(default)]
    role: Option<String>,
    action: String,
    #[serde(default)]
    self_sign: bool,
    atoms: Vec<AtomEntry>,
}

#[derive(Deserialize)]
struct AtomEntry {
    role: String,
    quantity: u8,
    #[serde(default)]
    strict: bool,
    #[serde(default)]
    relative: bool,
}

fn parse_action(name: &str) -> Result<Action, String> {
    match name {
        "grant" => Ok(Action::Grant),
        "revoke" => Ok(Action::Revoke),
        "admin" => Ok(Action::Admin),
        other => Err(format!("unknown action {other:?}")),
    }
}

fn parse_rule(entry: &RuleEntry) -> Result<Rule, String> {
    let action = parse_action(&entry.action)?;
    let mut atoms = Vec::with_capacity(entry.atoms.len());
    for atom in &entry.atoms {
        atoms.push(
            Atom::new(
                orgchart::RoleId::named(&atom.role),
                atom.quantity,
                atom.strict,
                atom.relative,
            )
            .map_err(|e| e.to_string())?,
        );
    }
    Ok(Rule::new(action, entry.self_sign, atoms))
}

#[derive(Deserialize)]
struct SeedEntry {
    user: orgchart::Address,
    role: String,
}

fn build_from_file(path: &str) -> Result<Chart, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| format!("read {path}: {e}"))?;
    let file: ChartFile = serde_json::from_str(&raw).map_err(|e| format!("parse {path}: {e}"))?;

    let mut builder = if file.dynamic {
        ChartBuilder::new_dynamic(file.deployment.clone())
    } else {
        ChartBuilder::new_static(file.deployment.clone())
    };
    for role in &file.roles {
        let juniors: Vec<&str> = role.juniors.iter().map(String::as_str).collect();
        builder = builder.role(&role.name, &juniors);
    }
    for entry in &file.rules {
        let role = entry.role.as_deref().ok_or("rule entry is missing its role")?;
        builder = builder.rule(role, parse_rule(entry)?);
    }
    for entry in &file.admin_rules {
        builder = builder.admin_rule(parse_rule(entry)?);
    }
    for seed in &file.seeds {
        builder = builder.seed(seed.user, &seed.role);
    }
    builder.build().map_err(|e| e.to_string())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let db_path = std::env::var("ORGCHART_DB").unwrap_or_else(|_| "./data/orgchart.mdb".into());
    let store = Store::open(Path::new(&db_path)).expect("open snapshot store");

    let chart = match store.load().expect("load snapshot") {
        Some(chart) => {
            info!(height = chart.height(), "resumed chart from snapshot");
            chart
        }
        None => {
            let chart_path = std::env::var("ORGCHART_CHART")
                .expect("no snapshot found; set ORGCHART_CHART to a chart definition file");
            let chart = build_from_file(&chart_path).expect("build chart");
            store.save(&chart).expect("save initial snapshot");
            info!(roles = chart.registry().len(), "built chart from definition");
            chart
        }
    };

    let state = Arc::new(AppState { chart: Mutex::new(chart), store: Some(store) });
    let app = router(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());
    let addr = format!("0.0.0.0:{port}");
    info!("orgchart server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await.expect("bind");
    axum::serve(listener, app).await.expect("serve");
}
