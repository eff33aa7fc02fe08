//! objperm REST API Server
//!
//! Run with: cargo run --features server --bin objperm-server -- --config objperm.toml
//!
//! Endpoints:
//!   GET    /health                      - Health check
//!   GET    /permissions                 - List object permissions
//!   POST   /permissions                 - Create object permission
//!   GET    /permissions/:id             - Get object permission
//!   PUT    /permissions/:id             - Replace object permission
//!   DELETE /permissions/:id             - Delete object permission
//!   GET    /object-types                - List object types
//!   POST   /object-types                - Register object type
//!   POST   /members                     - Add user to group
//!   DELETE /members/:user/:group        - Remove user from group
//!   GET    /users/:id/permissions       - Permission names held by a user
//!   POST   /check                       - Check a permission for a user

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use objperm::{
    add_member, delete_permission, get_permission, init, list_object_types, list_permissions,
    register_object_type, remove_member, save_permission, Authorizer, FilterSet, ObjectPermission,
    ObjectPermissionBackend, ObjectType, ObjpermError, Restriction, Settings, User,
};

/// Object permission administration server
#[derive(Parser, Debug)]
#[command(name = "objperm-server")]
#[command(version)]
struct Args {
    /// TOML settings file
    #[arg(short, long)]
    config: Option<String>,

    /// LMDB directory (overrides the settings file and OBJPERM_DB)
    #[arg(short, long)]
    db_path: Option<String>,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// HTTP server port
    #[arg(short, long, default_value = "3000")]
    port: u16,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ObjectTypeRequest {
    object_type: String,
}

#[derive(Debug, Deserialize)]
struct MemberRequest {
    user: u64,
    group: u64,
}

#[derive(Debug, Deserialize)]
struct CheckRequest {
    user: User,
    permission: String,
}

#[derive(Debug, Serialize)]
struct CheckResponse {
    allowed: bool,
    /// "unrestricted", "filtered" or "denied"
    scope: &'static str,
    constraints: Vec<FilterSet>,
}

#[derive(Debug, Serialize)]
struct IdResponse {
    id: u64,
}

#[derive(Debug, Serialize, PartialEq)]
struct MemberResponse {
    user: u64,
    group: u64,
}

#[derive(Debug, Serialize)]
struct DeletedResponse {
    deleted: bool,
}

#[derive(Debug, Serialize)]
struct ObjectTypeInfo {
    id: u64,
    object_type: ObjectType,
}

#[derive(Debug, Serialize)]
struct PermissionNamesResponse {
    permissions: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

fn fail(e: ObjpermError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match e {
        ObjpermError::NotFound(_) => StatusCode::NOT_FOUND,
        ObjpermError::InvalidArgument(_) | ObjpermError::Validation { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %e, "request failed");
    }
    (status, Json(ErrorResponse { error: e.to_string() }))
}

// ============================================================================
// App State
// ============================================================================

#[derive(Clone)]
struct AppState {
    backend: Arc<ObjectPermissionBackend>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// Permissions

async fn get_permissions() -> ApiResult<Vec<ObjectPermission>> {
    list_permissions().map(Json).map_err(fail)
}

async fn create_permission(Json(mut perm): Json<ObjectPermission>) -> ApiResult<ObjectPermission> {
    perm.id = 0;
    save_permission(&mut perm).map_err(fail)?;
    Ok(Json(perm))
}

async fn show_permission(Path(id): Path<u64>) -> ApiResult<ObjectPermission> {
    get_permission(id)
        .map_err(fail)?
        .map(Json)
        .ok_or_else(|| fail(ObjpermError::NotFound(format!("permission {}", id))))
}

async fn replace_permission(
    Path(id): Path<u64>,
    Json(mut perm): Json<ObjectPermission>,
) -> ApiResult<ObjectPermission> {
    perm.id = id;
    save_permission(&mut perm).map_err(fail)?;
    Ok(Json(perm))
}

async fn remove_permission(Path(id): Path<u64>) -> ApiResult<DeletedResponse> {
    let deleted = delete_permission(id).map_err(fail)?;
    Ok(Json(DeletedResponse { deleted }))
}

// Object types

async fn get_object_types() -> ApiResult<Vec<ObjectTypeInfo>> {
    let types = list_object_types().map_err(fail)?;
    Ok(Json(
        types
            .into_iter()
            .map(|(id, object_type)| ObjectTypeInfo { id, object_type })
            .collect(),
    ))
}

async fn create_object_type(Json(req): Json<ObjectTypeRequest>) -> ApiResult<IdResponse> {
    let object_type = ObjectType::parse(&req.object_type).map_err(fail)?;
    let id = register_object_type(&object_type).map_err(fail)?;
    Ok(Json(IdResponse { id }))
}

// Group membership

async fn create_member(
    Json(req): Json<MemberRequest>,
) -> Result<(StatusCode, Json<MemberResponse>), (StatusCode, Json<ErrorResponse>)> {
    add_member(req.user, req.group).map_err(fail)?;
    Ok((StatusCode::CREATED, Json(MemberResponse { user: req.user, group: req.group })))
}

async fn delete_member(Path((user, group)): Path<(u64, u64)>) -> ApiResult<DeletedResponse> {
    let deleted = remove_member(user, group).map_err(fail)?;
    Ok(Json(DeletedResponse { deleted }))
}

// Access checks

async fn user_permissions(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<PermissionNamesResponse> {
    let permissions = state.backend.permission_names(&User::new(id, "")).map_err(fail)?;
    Ok(Json(PermissionNamesResponse { permissions }))
}

async fn check(
    State(state): State<AppState>,
    Json(req): Json<CheckRequest>,
) -> ApiResult<CheckResponse> {
    let allowed = state.backend.has_perm(&req.user, &req.permission).map_err(fail)?;
    let restriction = state.backend.restriction(&req.user, &req.permission).map_err(fail)?;
    let (scope, constraints) = match restriction {
        Restriction::Unrestricted => ("unrestricted", Vec::new()),
        Restriction::Filtered(sets) => ("filtered", sets),
        Restriction::Denied => ("denied", Vec::new()),
    };
    Ok(Json(CheckResponse { allowed, scope, constraints }))
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => match Settings::from_file(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => Settings::default(),
    }
    .with_env();
    if let Some(path) = args.db_path {
        settings.db_path = path;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level)),
        )
        .init();

    if let Err(e) = init(&settings.db_path) {
        error!(error = %e, path = %settings.db_path, "failed to initialize database");
        std::process::exit(1);
    }

    let state = AppState {
        backend: Arc::new(ObjectPermissionBackend::new(settings.exempt.clone())),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/permissions", get(get_permissions).post(create_permission))
        .route(
            "/permissions/:id",
            get(show_permission).put(replace_permission).delete(remove_permission),
        )
        .route("/object-types", get(get_object_types).post(create_object_type))
        .route("/members", post(create_member))
        .route("/members/:user/:group", delete(delete_member))
        .route("/users/:id/permissions", get(user_permissions))
        .route("/check", post(check))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", args.bind, args.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, %addr, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(%addr, version = env!("CARGO_PKG_VERSION"), "objperm-server listening");

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objperm::{clear_all, groups_for_user, test_lock};
    use std::sync::Once;
    use tempfile::TempDir;

    static INIT: Once = Once::new();
    static mut TEST_DIR: Option<TempDir> = None;

    fn setup() -> std::sync::MutexGuard<'static, ()> {
        let lock = test_lock();
        INIT.call_once(|| {
            let dir = TempDir::new().unwrap();
            init(dir.path().to_str().unwrap()).unwrap();
            unsafe { TEST_DIR = Some(dir); }
        });
        clear_all().unwrap();
        lock
    }

    #[tokio::test]
    async fn create_member_returns_the_membership() {
        let _lock = setup();

        let (status, Json(body)) = create_member(Json(MemberRequest { user: 4, group: 9 }))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, MemberResponse { user: 4, group: 9 });
        assert_eq!(groups_for_user(4).unwrap(), vec![9]);

        let Json(removed) = delete_member(Path((4, 9))).await.unwrap();
        assert!(removed.deleted);
    }
}
