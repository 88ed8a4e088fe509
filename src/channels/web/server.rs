//! Axum HTTP server for the authority gateway.
//!
//! Routes are grouped by the role they require; each group carries its own
//! `auth_middleware` layer so handlers receive an already-authorized wallet.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tokio::sync::oneshot;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::channels::web::auth::{AuthState, AuthenticatedWallet, auth_middleware, bearer_token};
use crate::channels::web::error::ApiError;
use crate::channels::web::types::*;
use crate::db::{ReconcileReport, VoteRecord};
use crate::error::Error;
use crate::identity::{TxHash, WalletAddress};
use crate::privileged::{ConfirmOutcome, OperationKind};
use crate::roles::Role;
use crate::service::{AdminRoster, AuthorityService, InitStatus, PublicUser, UserState};

/// Shared state for all gateway handlers.
pub struct GatewayState {
    pub service: Arc<AuthorityService>,
    /// Shutdown signal sender, set once the server is listening.
    pub shutdown_tx: tokio::sync::RwLock<Option<oneshot::Sender<()>>>,
}

impl GatewayState {
    pub fn new(service: Arc<AuthorityService>) -> Arc<Self> {
        Arc::new(Self {
            service,
            shutdown_tx: tokio::sync::RwLock::new(None),
        })
    }

    /// Ask a running server to stop accepting connections.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.write().await.take() {
            let _ = tx.send(());
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Build the full router. `cors_origin` of `None` allows any origin.
pub fn router(state: Arc<GatewayState>, cors_origin: Option<&str>) -> Result<Router, Error> {
    let guarded = |required: Role| {
        middleware::from_fn_with_state(
            AuthState {
                service: state.service.clone(),
                required,
            },
            auth_middleware,
        )
    };

    // Public routes (no auth)
    let public = Router::new()
        .route("/health", get(health_handler))
        .route("/init", get(init_status_handler))
        .route("/auth/state", get(user_state_handler))
        .route("/auth/challenge", post(challenge_handler))
        .route("/auth/verify", post(verify_handler))
        .route("/auth/info", post(user_info_handler))
        .route("/contracts/nft", get(nft_contract_handler));

    // Any valid session, registered or not.
    let session = Router::new()
        .route("/init/build", post(init_build_handler))
        .route("/init/exec", post(init_exec_handler))
        .route("/auth/register", post(register_handler))
        .route_layer(guarded(Role::Void));

    let user = Router::new()
        .route("/auth/update", post(update_profile_handler))
        .route_layer(guarded(Role::User));

    let admin = Router::new()
        .route("/votes/create", post(create_vote_handler))
        .route_layer(guarded(Role::Admin));

    let root = Router::new()
        .route("/admin/list", get(admin_list_handler))
        .route("/admin/sync", post(admin_sync_handler))
        .route("/admin/add/build", post(admin_add_build_handler))
        .route("/admin/add/exec", post(admin_add_exec_handler))
        .route("/admin/remove/build", post(admin_remove_build_handler))
        .route("/admin/remove/exec", post(admin_remove_exec_handler))
        .route("/admin/session-epoch/rotate", post(rotate_epoch_handler))
        .route_layer(guarded(Role::Root));

    let origin = match cors_origin {
        Some(origin) => AllowOrigin::exact(origin.parse::<HeaderValue>().map_err(|e| {
            Error::Startup(format!("invalid CORS origin '{origin}': {e}"))
        })?),
        None => AllowOrigin::any(),
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
        ]));

    Ok(Router::new()
        .merge(public)
        .merge(session)
        .merge(user)
        .merge(admin)
        .merge(root)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB max request body
        .with_state(state))
}

/// Start the gateway HTTP server and return the bound address.
///
/// The server runs on a spawned task until `GatewayState::shutdown` is called.
pub async fn start_server(
    addr: SocketAddr,
    state: Arc<GatewayState>,
    cors_origin: Option<&str>,
) -> Result<SocketAddr, Error> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Startup(format!("Failed to bind to {}: {}", addr, e)))?;
    let bound_addr = listener
        .local_addr()
        .map_err(|e| Error::Startup(format!("Failed to get local addr: {}", e)))?;

    let app = router(state.clone(), cors_origin)?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    *state.shutdown_tx.write().await = Some(shutdown_tx);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Gateway shutting down");
            })
            .await
        {
            tracing::error!("Gateway server error: {}", e);
        }
    });

    tracing::info!(addr = %bound_addr, "Gateway listening");
    Ok(bound_addr)
}

// --- Public handlers ---

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "voteauth",
    })
}

async fn init_status_handler(State(state): State<Arc<GatewayState>>) -> ApiResult<InitStatus> {
    Ok(Json(state.service.init_status().await?))
}

async fn user_state_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> ApiResult<UserState> {
    Ok(Json(state.service.user_state(bearer_token(&headers)).await?))
}

async fn challenge_handler(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<ChallengeRequest>,
) -> Json<ChallengeResponse> {
    let nonce = state.service.issue_challenge(&req.wallet);
    Json(ChallengeResponse {
        wallet: req.wallet,
        nonce,
    })
}

async fn verify_handler(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<VerifyRequest>,
) -> ApiResult<VerifyResponse> {
    let token = state
        .service
        .verify_challenge_and_issue_session(&req.wallet, &req.signature)
        .await?;
    Ok(Json(VerifyResponse {
        wallet: req.wallet,
        token,
    }))
}

async fn user_info_handler(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<UserInfoRequest>,
) -> ApiResult<UserInfoResponse> {
    let users = state.service.user_info(&req.wallets).await?;
    Ok(Json(UserInfoResponse { users }))
}

async fn nft_contract_handler(
    State(state): State<Arc<GatewayState>>,
) -> ApiResult<ContractResponse> {
    let address = state.service.nft_contract_address().await?;
    Ok(Json(ContractResponse { address }))
}

// --- Session handlers ---

async fn init_build_handler(
    State(state): State<Arc<GatewayState>>,
    Extension(AuthenticatedWallet(caller)): Extension<AuthenticatedWallet>,
) -> ApiResult<BuildResponse> {
    build(&state, OperationKind::Bootstrap, &caller, &caller).await
}

async fn init_exec_handler(
    State(state): State<Arc<GatewayState>>,
    Extension(AuthenticatedWallet(caller)): Extension<AuthenticatedWallet>,
    Json(submission): Json<TxSubmission>,
) -> ApiResult<ConfirmOutcome> {
    confirm(&state, OperationKind::Bootstrap, &caller, submission).await
}

async fn register_handler(
    State(state): State<Arc<GatewayState>>,
    Extension(AuthenticatedWallet(caller)): Extension<AuthenticatedWallet>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<PublicUser> {
    let user = state
        .service
        .register_user(&caller, &req.email, &req.display_name)
        .await?;
    Ok(Json(user.into()))
}

async fn update_profile_handler(
    State(state): State<Arc<GatewayState>>,
    Extension(AuthenticatedWallet(caller)): Extension<AuthenticatedWallet>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<OkResponse> {
    state
        .service
        .update_display_name(&caller, &req.display_name)
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

// --- Admin handlers ---

async fn create_vote_handler(
    State(state): State<Arc<GatewayState>>,
    Extension(AuthenticatedWallet(caller)): Extension<AuthenticatedWallet>,
    Json(req): Json<CreateVoteRequest>,
) -> ApiResult<VoteRecord> {
    Ok(Json(state.service.create_vote(&caller, &req.vote_address).await?))
}

// --- Root handlers ---

async fn admin_list_handler(State(state): State<Arc<GatewayState>>) -> ApiResult<AdminRoster> {
    Ok(Json(state.service.get_admin_roster().await?))
}

async fn admin_sync_handler(
    State(state): State<Arc<GatewayState>>,
) -> ApiResult<ReconcileReport> {
    Ok(Json(state.service.reconcile_admin_roster().await?))
}

async fn admin_add_build_handler(
    State(state): State<Arc<GatewayState>>,
    Extension(AuthenticatedWallet(caller)): Extension<AuthenticatedWallet>,
    Json(req): Json<AdminTargetRequest>,
) -> ApiResult<BuildResponse> {
    build(&state, OperationKind::AddAdmin, &caller, &req.wallet).await
}

async fn admin_add_exec_handler(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<AdminExecRequest>,
) -> ApiResult<ConfirmOutcome> {
    confirm(&state, OperationKind::AddAdmin, &req.wallet, req.submission).await
}

async fn admin_remove_build_handler(
    State(state): State<Arc<GatewayState>>,
    Extension(AuthenticatedWallet(caller)): Extension<AuthenticatedWallet>,
    Json(req): Json<AdminTargetRequest>,
) -> ApiResult<BuildResponse> {
    build(&state, OperationKind::RemoveAdmin, &caller, &req.wallet).await
}

async fn admin_remove_exec_handler(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<AdminExecRequest>,
) -> ApiResult<ConfirmOutcome> {
    confirm(&state, OperationKind::RemoveAdmin, &req.wallet, req.submission).await
}

async fn rotate_epoch_handler(State(state): State<Arc<GatewayState>>) -> ApiResult<OkResponse> {
    state.service.rotate_session_epoch().await?;
    Ok(Json(OkResponse { ok: true }))
}

// --- Shared ---

async fn build(
    state: &GatewayState,
    kind: OperationKind,
    actor: &WalletAddress,
    target: &WalletAddress,
) -> ApiResult<BuildResponse> {
    let transaction = state
        .service
        .build_privileged_tx(kind, actor, target)
        .await?;
    Ok(Json(BuildResponse {
        operation: kind,
        transaction,
    }))
}

async fn confirm(
    state: &GatewayState,
    kind: OperationKind,
    target: &WalletAddress,
    submission: TxSubmission,
) -> ApiResult<ConfirmOutcome> {
    let tx_hash = resolve_submission(state, submission).await?;
    Ok(Json(
        state
            .service
            .confirm_privileged_tx(kind, target, &tx_hash)
            .await?,
    ))
}

/// Exactly one of `tx_hash` or `signed_tx`; a signed transaction is relayed
/// first and its hash confirmed.
async fn resolve_submission(
    state: &GatewayState,
    submission: TxSubmission,
) -> Result<TxHash, Error> {
    match (submission.tx_hash, submission.signed_tx) {
        (Some(hash), None) => Ok(hash),
        (None, Some(signed)) => state.service.relay_signed_transaction(&signed).await,
        (Some(_), Some(_)) => Err(Error::InvalidInput(
            "provide either tx_hash or signed_tx, not both".to_string(),
        )),
        (None, None) => Err(Error::InvalidInput(
            "tx_hash or signed_tx is required".to_string(),
        )),
    }
}
