//! HTTP host for the chart engine.
//!
//! A thin REST surface over a chart held behind a single writer lock. Every
//! successful mutation is snapshotted before the response goes out, so a
//! restarted host resumes from the last accepted operation.

use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::approval::Approval;
use crate::atom::{Atom, RoleId};
use crate::chart::{Chart, RoleDef};
use crate::error::ChartError;
use crate::events::Event;
use crate::rule::RuleHash;
use crate::sig::{Address, Signature};
use crate::store::Store;

pub struct AppState {
    pub chart: Mutex<Chart>,
    pub store: Option<Store>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/blocks", post(post_block))
        .route("/roles", get(get_roles))
        .route("/check", get(get_check))
        .route("/grant", post(post_grant))
        .route("/revoke", post(post_revoke))
        .route("/roles/add", post(post_add_role))
        .route("/roles/remove", post(post_remove_role))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
struct ApprovalReq {
    /// 65-byte signatures, hex, ordered by recovered signer.
    signatures: Vec<String>,
    /// Canonical atom words, hex.
    atoms: Vec<String>,
    assignment: Vec<usize>,
    self_sign_required: bool,
    base_block_hash: String,
}

#[derive(Deserialize)]
struct SealBlockReq {
    hash: String,
}

#[derive(Deserialize)]
struct UserMgtReq {
    approval: ApprovalReq,
    nominee: String,
    role: String,
}

#[derive(Deserialize)]
struct AddRoleReq {
    approval: ApprovalReq,
    role_id: String,
    flag: String,
    senior_flags: String,
    junior_flags: String,
    rule_hashes: Vec<String>,
}

#[derive(Deserialize)]
struct RemoveRoleReq {
    approval: ApprovalReq,
    role: String,
}

#[derive(Deserialize)]
struct CheckQuery {
    user: String,
    role: String,
    strict: Option<bool>,
}

#[derive(Serialize)]
struct HealthRes {
    status: &'static str,
    version: &'static str,
    height: u64,
}

#[derive(Serialize)]
struct HeightRes {
    height: u64,
}

#[derive(Serialize)]
struct CheckRes {
    has_role: bool,
}

#[derive(Serialize)]
struct RoleInfo {
    role_id: String,
    flag: String,
    structure_mask: String,
    junior_mask: String,
    assignment_count: u64,
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    fn err(message: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(message.into()) }
    }
}

type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

fn ok<T>(data: T) -> Reply<T> {
    (StatusCode::OK, Json(ApiResponse::ok(data)))
}

fn bad_request<T>(message: impl Into<String>) -> Reply<T> {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::err(message)))
}

fn engine_error<T>(error: ChartError) -> Reply<T> {
    let status = match &error {
        ChartError::UnknownRole => StatusCode::NOT_FOUND,
        ChartError::InvalidRule
        | ChartError::InvalidAdminRule
        | ChartError::PermissionDenied(_)
        | ChartError::NotEnoughSigners(_)
        | ChartError::MissingSelfSign
        | ChartError::UnexpectedSelfSign => StatusCode::FORBIDDEN,
        ChartError::ImmutableChart => StatusCode::CONFLICT,
        ChartError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(ApiResponse::err(error.to_string())))
}

// ============================================================================
// Parsing helpers
// ============================================================================

fn hex_bytes(text: &str) -> Result<Vec<u8>, String> {
    hex::decode(text.strip_prefix("0x").unwrap_or(text))
        .map_err(|_| format!("bad hex: {text}"))
}

fn hex32(text: &str) -> Result<[u8; 32], String> {
    hex_bytes(text)?.try_into().map_err(|_| format!("expected 32 bytes: {text}"))
}

fn hex_word(text: &str) -> Result<U256, String> {
    Ok(U256::from_big_endian(&hex32(text)?))
}

fn parse_address(text: &str) -> Result<Address, String> {
    Address::parse(text).ok_or_else(|| format!("bad address: {text}"))
}

/// Role references are hex ids, or names resolved through the id derivation.
fn parse_role(text: &str) -> Result<RoleId, String> {
    if text.starts_with("0x") {
        RoleId::from_bytes(hex32(text)?).map_err(|e| e.to_string())
    } else {
        Ok(RoleId::named(text))
    }
}

fn parse_approval(req: &ApprovalReq) -> Result<Approval, String> {
    let mut signatures = Vec::with_capacity(req.signatures.len());
    for raw in &req.signatures {
        let bytes = hex_bytes(raw)?;
        signatures.push(Signature::from_slice(&bytes).map_err(|e| e.to_string())?);
    }
    let mut atoms = Vec::with_capacity(req.atoms.len());
    for raw in &req.atoms {
        let word = hex_word(raw)?;
        atoms.push(Atom::decode(word).map_err(|e| e.to_string())?);
    }
    Ok(Approval {
        signatures,
        atoms,
        assignment: req.assignment.clone(),
        self_sign_required: req.self_sign_required,
        base_block_hash: hex32(&req.base_block_hash)?,
    })
}

/// Persist after a successful mutation; a failed snapshot is a hard error so
/// the caller never sees state the host would lose on restart.
fn snapshot(state: &AppState, chart: &Chart) -> Result<(), ChartError> {
    match &state.store {
        Some(store) => store.save(chart),
        None => Ok(()),
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthRes> {
    let chart = state.chart.lock().expect("chart lock");
    Json(HealthRes {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        height: chart.height(),
    })
}

async fn post_block(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SealBlockReq>,
) -> Reply<HeightRes> {
    let hash = match hex32(&req.hash) {
        Ok(hash) => hash,
        Err(message) => return bad_request(message),
    };
    let mut chart = state.chart.lock().expect("chart lock");
    chart.seal_block(hash);
    if let Err(error) = snapshot(&state, &chart) {
        return engine_error(error);
    }
    ok(HeightRes { height: chart.height() })
}

async fn get_roles(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<RoleInfo>>> {
    let chart = state.chart.lock().expect("chart lock");
    let registry = chart.registry();
    let roles = registry
        .index()
        .iter()
        .filter_map(|&flag| {
            let role_id = registry.role_id_of(flag)?;
            Some(RoleInfo {
                role_id: role_id.to_string(),
                flag: format!("0x{:x}", flag),
                structure_mask: format!("0x{:x}", registry.structure_mask(flag)),
                junior_mask: format!("0x{:x}", registry.junior_mask(flag)),
                assignment_count: chart.assignment_count(&role_id),
            })
        })
        .collect();
    Json(ApiResponse::ok(roles))
}

async fn get_check(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CheckQuery>,
) -> Reply<CheckRes> {
    let (user, role) = match (parse_address(&query.user), parse_role(&query.role)) {
        (Ok(user), Ok(role)) => (user, role),
        (Err(message), _) | (_, Err(message)) => return bad_request(message),
    };
    let chart = state.chart.lock().expect("chart lock");
    let result = if query.strict.unwrap_or(false) {
        chart.strictly_has_role(&user, &role)
    } else {
        chart.has_role(&user, &role)
    };
    match result {
        Ok(has_role) => ok(CheckRes { has_role }),
        Err(error) => engine_error(error),
    }
}

async fn post_grant(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UserMgtReq>,
) -> Reply<Event> {
    user_management(&state, &req, Chart::grant_role)
}

async fn post_revoke(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UserMgtReq>,
) -> Reply<Event> {
    user_management(&state, &req, Chart::revoke_role)
}

fn user_management(
    state: &AppState,
    req: &UserMgtReq,
    operation: fn(&mut Chart, &Approval, &Address, &RoleId) -> crate::error::Result<Event>,
) -> Reply<Event> {
    let parsed = parse_approval(&req.approval)
        .and_then(|approval| Ok((approval, parse_address(&req.nominee)?, parse_role(&req.role)?)));
    let (approval, nominee, role) = match parsed {
        Ok(parts) => parts,
        Err(message) => return bad_request(message),
    };
    let mut chart = state.chart.lock().expect("chart lock");
    match operation(&mut chart, &approval, &nominee, &role) {
        Ok(event) => match snapshot(state, &chart) {
            Ok(()) => ok(event),
            Err(error) => engine_error(error),
        },
        Err(error) => engine_error(error),
    }
}

async fn post_add_role(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddRoleReq>,
) -> Reply<Event> {
    let parsed = (|| -> Result<(Approval, RoleDef), String> {
        let approval = parse_approval(&req.approval)?;
        let mut rule_hashes: Vec<RuleHash> = Vec::with_capacity(req.rule_hashes.len());
        for raw in &req.rule_hashes {
            rule_hashes.push(hex32(raw)?);
        }
        let def = RoleDef {
            role_id: RoleId::from_bytes(hex32(&req.role_id)?).map_err(|e| e.to_string())?,
            flag: hex_word(&req.flag)?,
            senior_flags: hex_word(&req.senior_flags)?,
            junior_flags: hex_word(&req.junior_flags)?,
            rule_hashes,
        };
        Ok((approval, def))
    })();
    let (approval, def) = match parsed {
        Ok(parts) => parts,
        Err(message) => return bad_request(message),
    };
    let mut chart = state.chart.lock().expect("chart lock");
    match chart.add_role(&approval, &def) {
        Ok(event) => match snapshot(&state, &chart) {
            Ok(()) => ok(event),
            Err(error) => engine_error(error),
        },
        Err(error) => engine_error(error),
    }
}

async fn post_remove_role(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RemoveRoleReq>,
) -> Reply<Event> {
    let parsed = parse_approval(&req.approval)
        .and_then(|approval| Ok((approval, parse_role(&req.role)?)));
    let (approval, role) = match parsed {
        Ok(parts) => parts,
        Err(message) => return bad_request(message),
    };
    let mut chart = state.chart.lock().expect("chart lock");
    match chart.remove_role(&approval, &role) {
        Ok(event) => match snapshot(&state, &chart) {
            Ok(()) => ok(event),
            Err(error) => engine_error(error),
        },
        Err(error) => engine_error(error),
    }
}
