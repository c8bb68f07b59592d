//! # REST API
//!
//! Builds the axum router that exposes the wallet server's HTTP interface.
//! All endpoints share application state through axum's `State` extractor;
//! authenticated routes resolve the caller with the [`AuthedUser`] and
//! [`AdminUser`] extractors before any handler body runs.
//!
//! ## Endpoints
//!
//! | Method | Path                             | Auth   | Description                      |
//! |--------|----------------------------------|--------|----------------------------------|
//! | GET    | `/health`                        | none   | Liveness probe                   |
//! | POST   | `/api/register`                  | none   | Create a user and wallet account |
//! | POST   | `/api/login`                     | none   | Open a session                   |
//! | POST   | `/api/logout`                    | bearer | Close the session                |
//! | GET    | `/api/profile`                   | bearer | Identity and balance             |
//! | PUT    | `/api/profile`                   | bearer | Change password                  |
//! | GET    | `/api/dashboard`                 | bearer | Balance and recent movements     |
//! | POST   | `/api/transfer`                  | bearer | Send money by username           |
//! | GET    | `/api/transactions`              | bearer | Filtered history, newest first   |
//! | POST   | `/api/qr/generate`               | bearer | Issue a QR charge                |
//! | POST   | `/api/qr/process`                | bearer | Redeem a scanned charge          |
//! | GET    | `/api/qr/:id`                    | bearer | Preview a charge before paying   |
//! | GET    | `/api/payment/payment-requests`  | bearer | Sent and received requests       |
//! | POST   | `/api/payment/request`           | bearer | Ask someone for money            |
//! | POST   | `/api/payment/accept/:id`        | bearer | Pay a pending request            |
//! | POST   | `/api/payment/decline/:id`       | bearer | Refuse a pending request         |
//! | GET    | `/api/admin/users`               | admin  | Directory listing                |
//! | POST   | `/api/admin/users/block/:id`     | admin  | Block an account                 |
//! | POST   | `/api/admin/users/unblock/:id`   | admin  | Unblock an account               |
//! | POST   | `/api/admin/deposit`             | admin  | Fund a user from the reserve     |
//! | GET    | `/api/admin/stats`               | admin  | Usage aggregates                 |
//!
//! All amounts on the wire are integer centavos, like everywhere else in
//! this codebase. Errors come back as `{ "error": "..." }` with the status
//! dictated by the error taxonomy (see `error.rs`).

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use vela_wallet::account::{AccountId, AccountStatus};
use vela_wallet::config::RESERVE_DISPLAY_NAME;
use vela_wallet::ledger::{
    HistoryFilter, Ledger, TransactionId, TransactionKind, TransactionRecord, TransactionStatus,
    Transfer,
};
use vela_wallet::money::Amount;
use vela_wallet::qr::{QrCodes, QrId};
use vela_wallet::request::{PaymentRequest, PaymentRequests, RequestId, RequestStatus};
use vela_wallet::store::WalletStore;

use crate::auth::{bearer_token, AdminUser, AuthedUser, Sessions};
use crate::directory::{Directory, Registration, Role};
use crate::error::{ServerError, ServerResult};
use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — every member is a handle over shared storage.
#[derive(Clone)]
pub struct AppState {
    /// The server's reported version string.
    pub version: String,
    /// Shared storage handle, for point lookups and aggregates.
    pub store: WalletStore,
    /// Money movement between accounts.
    pub ledger: Ledger,
    /// QR charge lifecycle.
    pub qr_codes: QrCodes,
    /// Payment request workflow.
    pub payment_requests: PaymentRequests,
    /// User identity records and unique-handle lookups.
    pub directory: Directory,
    /// Bearer token sessions.
    pub sessions: Sessions,
    /// The treasury account administrative deposits draw from.
    pub reserve: AccountId,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
///
/// The returned router is ready to be served on the configured HTTP port.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/register", post(register_handler))
        .route("/api/login", post(login_handler))
        .route("/api/logout", post(logout_handler))
        .route("/api/profile", get(profile_handler).put(change_password_handler))
        .route("/api/dashboard", get(dashboard_handler))
        .route("/api/transfer", post(transfer_handler))
        .route("/api/transactions", get(transactions_handler))
        .route("/api/qr/generate", post(qr_generate_handler))
        .route("/api/qr/process", post(qr_process_handler))
        .route("/api/qr/:id", get(qr_preview_handler))
        .route("/api/payment/payment-requests", get(payment_requests_handler))
        .route("/api/payment/request", post(payment_request_create_handler))
        .route("/api/payment/accept/:id", post(payment_accept_handler))
        .route("/api/payment/decline/:id", post(payment_decline_handler))
        .route("/api/admin/users", get(admin_users_handler))
        .route("/api/admin/users/block/:id", post(admin_block_handler))
        .route("/api/admin/users/unblock/:id", post(admin_unblock_handler))
        .route("/api/admin/deposit", post(admin_deposit_handler))
        .route("/api/admin/stats", get(admin_stats_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request Types
// ---------------------------------------------------------------------------

/// Body of `POST /api/register`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub username: String,
    pub cpf: String,
    pub password: String,
}

/// Body of `POST /api/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of `PUT /api/profile`.
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Body of `POST /api/transfer`. Amount in centavos.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub recipient_username: String,
    pub amount: Amount,
    #[serde(default)]
    pub description: Option<String>,
}

/// Query string of `GET /api/transactions`. Dates are `YYYY-MM-DD`,
/// both ends inclusive.
#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Body of `POST /api/qr/generate`. Amount in centavos.
#[derive(Debug, Deserialize)]
pub struct GenerateQrRequest {
    pub amount: Amount,
    #[serde(default)]
    pub description: Option<String>,
}

/// Body of `POST /api/qr/process`.
#[derive(Debug, Deserialize)]
pub struct ProcessQrRequest {
    pub qr_code_id: String,
}

/// Body of `POST /api/payment/request`. Amount in centavos.
#[derive(Debug, Deserialize)]
pub struct PaymentRequestInput {
    pub payer_username: String,
    pub amount: Amount,
    #[serde(default)]
    pub description: Option<String>,
}

/// Query string of `GET /api/admin/users`.
#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    pub status: Option<String>,
}

/// Body of `POST /api/admin/deposit`. Amount in centavos.
#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub username: String,
    pub amount: Amount,
    #[serde(default)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Generic acknowledgement body.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Response payload for `POST /api/login`.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Opaque bearer token for the `Authorization` header.
    pub token: String,
    /// The authenticated user's role.
    pub role: Role,
}

/// Response payload for `GET /api/profile`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub full_name: String,
    pub email: String,
    pub username: String,
    pub cpf: String,
    /// Balance in centavos.
    pub balance: Amount,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

/// Response payload for `GET /api/dashboard`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub user_id: AccountId,
    pub full_name: String,
    /// Balance in centavos.
    pub balance: Amount,
    /// Most recent movements, newest first.
    pub recent_transactions: Vec<TransactionView>,
}

/// Acknowledgement for endpoints that settle money, carrying the ledger
/// record id.
#[derive(Debug, Serialize, Deserialize)]
pub struct SettlementResponse {
    pub message: String,
    pub transaction_id: TransactionId,
}

/// One ledger record with usernames joined in for display.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionView {
    pub id: TransactionId,
    pub sender_username: String,
    pub recipient_username: String,
    /// Centavos.
    pub amount: Amount,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

/// Response payload for `POST /api/qr/generate`.
#[derive(Debug, Serialize, Deserialize)]
pub struct QrIssuedResponse {
    pub id: QrId,
    /// The opaque charge token. Rendering it as an image is the client's
    /// business.
    pub token: String,
    /// Centavos.
    pub amount: Amount,
    pub expires_at: DateTime<Utc>,
}

/// Response payload for `GET /api/qr/:id` — what a payer sees before
/// confirming.
#[derive(Debug, Serialize, Deserialize)]
pub struct QrPreviewResponse {
    pub id: QrId,
    /// Centavos.
    pub amount: Amount,
    pub owner_username: String,
    pub owner_name: String,
    pub expires_at: DateTime<Utc>,
}

/// One payment request with usernames joined in for display.
#[derive(Debug, Serialize, Deserialize)]
pub struct RequestView {
    pub id: RequestId,
    pub requester_username: String,
    pub payer_username: String,
    /// Centavos.
    pub amount: Amount,
    pub description: Option<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Response payload for `GET /api/payment/payment-requests`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentRequestsResponse {
    /// Requests this user sent (they are the requester).
    pub sent: Vec<RequestView>,
    /// Requests addressed to this user (they are the payer).
    pub received: Vec<RequestView>,
}

/// One row of `GET /api/admin/users`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdminUserView {
    pub id: AccountId,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

/// Response payload for `GET /api/admin/stats`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_users: u64,
    /// Sum of every ledger record ever written, in centavos.
    pub total_transaction_volume: Amount,
}

// ---------------------------------------------------------------------------
// View Helpers
// ---------------------------------------------------------------------------

/// Parse a path or body id, turning failures into a 400 instead of the
/// extractor's default rejection.
fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> ServerResult<T> {
    raw.parse()
        .map_err(|_| ServerError::InvalidIdentifier(format!("{what}: {raw}")))
}

/// Display name for an account id. The reserve has no directory record;
/// accounts that somehow lost theirs fall back to the raw id.
fn username_for(state: &AppState, id: &AccountId) -> ServerResult<String> {
    if *id == state.reserve {
        return Ok(RESERVE_DISPLAY_NAME.to_string());
    }
    Ok(state
        .directory
        .get(id)?
        .map(|record| record.username)
        .unwrap_or_else(|| id.to_string()))
}

fn transaction_view(state: &AppState, record: &TransactionRecord) -> ServerResult<TransactionView> {
    Ok(TransactionView {
        id: record.id,
        sender_username: username_for(state, &record.sender)?,
        recipient_username: username_for(state, &record.recipient)?,
        amount: record.amount,
        description: record.description.clone(),
        kind: record.kind,
        status: record.status,
        created_at: record.created_at,
    })
}

fn request_view(state: &AppState, request: &PaymentRequest) -> ServerResult<RequestView> {
    Ok(RequestView {
        id: request.id,
        requester_username: username_for(state, &request.requester)?,
        payer_username: username_for(state, &request.payer)?,
        amount: request.amount,
        description: request.description.clone(),
        status: request.status,
        created_at: request.created_at,
        updated_at: request.updated_at,
    })
}

fn parse_date(raw: &str) -> ServerResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ServerError::InvalidIdentifier(format!("date: {raw}")))
}

// ---------------------------------------------------------------------------
// Public Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the server is alive.
///
/// This is the liveness probe for orchestrators (k8s, systemd, etc.).
/// It intentionally does not touch storage.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "ok", "version": state.version })),
    )
}

/// `POST /api/register` — create a user and their wallet account.
async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ServerResult<Json<MessageResponse>> {
    let registration = Registration {
        full_name: req.full_name,
        email: req.email,
        username: req.username,
        cpf: req.cpf,
        password: req.password,
    };
    state.directory.register(&registration, Role::User)?;
    state.metrics.registered_users_total.inc();

    Ok(Json(MessageResponse {
        message: "User registered successfully".into(),
    }))
}

/// `POST /api/login` — verify credentials and open a session.
///
/// Blocked users are refused with 403 before any token is minted.
async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ServerResult<Json<LoginResponse>> {
    let record = state
        .directory
        .authenticate(&req.email, &req.password)
        .map_err(|err| {
            if matches!(err, ServerError::InvalidCredentials) {
                state.metrics.auth_failures_total.inc();
            }
            err
        })?;
    let account = state
        .store
        .account(&record.account)?
        .ok_or(ServerError::Unauthorized)?;
    if !account.status.is_active() {
        return Err(ServerError::Blocked);
    }

    let token = state.sessions.open(record.account)?;
    state.metrics.logins_total.inc();
    state.metrics.active_sessions.inc();

    Ok(Json(LoginResponse {
        token,
        role: record.role,
    }))
}

/// `POST /api/logout` — close the caller's session.
async fn logout_handler(
    _user: AuthedUser,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ServerResult<Json<MessageResponse>> {
    let token = bearer_token(&headers).ok_or(ServerError::Unauthorized)?;
    if state.sessions.close(token)? {
        state.metrics.active_sessions.dec();
    }
    Ok(Json(MessageResponse {
        message: "Logged out successfully".into(),
    }))
}

// ---------------------------------------------------------------------------
// Authenticated Handlers
// ---------------------------------------------------------------------------

/// `GET /api/profile` — the caller's identity and balance.
async fn profile_handler(user: AuthedUser) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        full_name: user.record.full_name,
        email: user.record.email,
        username: user.record.username,
        cpf: user.record.cpf,
        balance: user.account.balance,
        status: user.account.status,
        created_at: user.record.created_at,
    })
}

/// `PUT /api/profile` — change the caller's password. The old password
/// must verify.
async fn change_password_handler(
    user: AuthedUser,
    State(state): State<AppState>,
    Json(req): Json<ChangePasswordRequest>,
) -> ServerResult<Json<MessageResponse>> {
    state
        .directory
        .change_password(&user.record.account, &req.old_password, &req.new_password)?;
    Ok(Json(MessageResponse {
        message: "Password updated".into(),
    }))
}

/// `GET /api/dashboard` — balance plus the ten most recent movements.
async fn dashboard_handler(
    user: AuthedUser,
    State(state): State<AppState>,
) -> ServerResult<Json<DashboardResponse>> {
    let filter = HistoryFilter {
        limit: Some(10),
        ..HistoryFilter::default()
    };
    let records = state.ledger.history(&user.record.account, &filter)?;
    let recent_transactions = records
        .iter()
        .map(|record| transaction_view(&state, record))
        .collect::<ServerResult<Vec<_>>>()?;

    Ok(Json(DashboardResponse {
        user_id: user.record.account,
        full_name: user.record.full_name,
        balance: user.account.balance,
        recent_transactions,
    }))
}

/// `POST /api/transfer` — send money to another user by username.
async fn transfer_handler(
    user: AuthedUser,
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> ServerResult<Json<SettlementResponse>> {
    let recipient = state
        .directory
        .resolve_username(&req.recipient_username)?
        .ok_or_else(|| ServerError::UserNotFound(req.recipient_username.clone()))?;

    let order = Transfer {
        sender: user.record.account,
        recipient,
        amount: req.amount,
        description: req.description,
    };
    let started = Instant::now();
    let record = state.ledger.transfer(&order)?;
    state.metrics.transfers_total.inc();
    state
        .metrics
        .settlement_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    Ok(Json(SettlementResponse {
        message: "Transfer successful".into(),
        transaction_id: record.id,
    }))
}

/// `GET /api/transactions` — the caller's history, newest first.
///
/// `from_date` and `to_date` bound the window by calendar day, both ends
/// inclusive. `type` filters by record kind.
async fn transactions_handler(
    user: AuthedUser,
    State(state): State<AppState>,
    Query(query): Query<TransactionsQuery>,
) -> ServerResult<Json<Vec<TransactionView>>> {
    let mut filter = HistoryFilter::default();
    if let Some(raw) = &query.from_date {
        filter.from = Some(parse_date(raw)?.and_time(NaiveTime::MIN).and_utc());
    }
    if let Some(raw) = &query.to_date {
        let midnight = parse_date(raw)?.and_time(NaiveTime::MIN).and_utc();
        filter.to = Some(midnight + Duration::days(1) - Duration::nanoseconds(1));
    }
    if let Some(raw) = &query.kind {
        filter.kind = Some(parse_id::<TransactionKind>(raw, "transaction type")?);
    }

    let records = state.ledger.history(&user.record.account, &filter)?;
    let views = records
        .iter()
        .map(|record| transaction_view(&state, record))
        .collect::<ServerResult<Vec<_>>>()?;
    Ok(Json(views))
}

/// `POST /api/qr/generate` — issue a QR charge owned by the caller.
async fn qr_generate_handler(
    user: AuthedUser,
    State(state): State<AppState>,
    Json(req): Json<GenerateQrRequest>,
) -> ServerResult<Json<QrIssuedResponse>> {
    let qr = state
        .qr_codes
        .issue(&user.record.account, req.amount, req.description)?;
    Ok(Json(QrIssuedResponse {
        id: qr.id,
        token: qr.token,
        amount: qr.amount,
        expires_at: qr.expires_at,
    }))
}

/// `POST /api/qr/process` — redeem a scanned charge, paying its owner.
async fn qr_process_handler(
    user: AuthedUser,
    State(state): State<AppState>,
    Json(req): Json<ProcessQrRequest>,
) -> ServerResult<Json<SettlementResponse>> {
    let id = parse_id::<QrId>(&req.qr_code_id, "QR code id")?;

    let started = Instant::now();
    let (_qr, record) = state.qr_codes.redeem(&user.record.account, &id)?;
    state.metrics.qr_redemptions_total.inc();
    state.metrics.transfers_total.inc();
    state
        .metrics
        .settlement_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    Ok(Json(SettlementResponse {
        message: "Payment processed".into(),
        transaction_id: record.id,
    }))
}

/// `GET /api/qr/:id` — preview a charge before paying it.
///
/// Never mutates the charge; a dead one is reported expired without
/// being rewritten.
async fn qr_preview_handler(
    _user: AuthedUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<QrPreviewResponse>> {
    let id = parse_id::<QrId>(&id, "QR code id")?;
    let qr = state.qr_codes.read(&id)?;

    let owner = state
        .directory
        .get(&qr.owner)?
        .ok_or_else(|| ServerError::UserNotFound(qr.owner.to_string()))?;

    Ok(Json(QrPreviewResponse {
        id: qr.id,
        amount: qr.amount,
        owner_username: owner.username,
        owner_name: owner.full_name,
        expires_at: qr.expires_at,
    }))
}

/// `GET /api/payment/payment-requests` — the caller's requests, split by
/// direction.
async fn payment_requests_handler(
    user: AuthedUser,
    State(state): State<AppState>,
) -> ServerResult<Json<PaymentRequestsResponse>> {
    let me = user.record.account;
    let mut sent = Vec::new();
    let mut received = Vec::new();
    for request in state.payment_requests.involving(&me)? {
        let view = request_view(&state, &request)?;
        if request.requester == me {
            sent.push(view);
        } else {
            received.push(view);
        }
    }
    Ok(Json(PaymentRequestsResponse { sent, received }))
}

/// `POST /api/payment/request` — ask another user for money.
async fn payment_request_create_handler(
    user: AuthedUser,
    State(state): State<AppState>,
    Json(req): Json<PaymentRequestInput>,
) -> ServerResult<Json<RequestView>> {
    let payer = state
        .directory
        .resolve_username(&req.payer_username)?
        .ok_or_else(|| ServerError::UserNotFound(req.payer_username.clone()))?;

    let request =
        state
            .payment_requests
            .create(&user.record.account, &payer, req.amount, req.description)?;
    Ok(Json(request_view(&state, &request)?))
}

/// `POST /api/payment/accept/:id` — pay a pending request addressed to
/// the caller.
async fn payment_accept_handler(
    user: AuthedUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<SettlementResponse>> {
    let id = parse_id::<RequestId>(&id, "payment request id")?;

    let started = Instant::now();
    let (_request, record) = state.payment_requests.accept(&user.record.account, &id)?;
    state.metrics.requests_resolved_total.inc();
    state.metrics.transfers_total.inc();
    state
        .metrics
        .settlement_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    Ok(Json(SettlementResponse {
        message: "Request accepted".into(),
        transaction_id: record.id,
    }))
}

/// `POST /api/payment/decline/:id` — refuse a pending request. No money
/// moves.
async fn payment_decline_handler(
    user: AuthedUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<MessageResponse>> {
    let id = parse_id::<RequestId>(&id, "payment request id")?;
    state.payment_requests.decline(&user.record.account, &id)?;
    state.metrics.requests_resolved_total.inc();

    Ok(Json(MessageResponse {
        message: "Request declined".into(),
    }))
}

// ---------------------------------------------------------------------------
// Admin Handlers
// ---------------------------------------------------------------------------

/// `GET /api/admin/users` — every registered user, optionally filtered by
/// account status (`active`, `blocked`, or `all`).
async fn admin_users_handler(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<UsersQuery>,
) -> ServerResult<Json<Vec<AdminUserView>>> {
    let wanted = match query.status.as_deref() {
        None | Some("") | Some("all") => None,
        Some("active") => Some(AccountStatus::Active),
        Some("blocked") => Some(AccountStatus::Blocked),
        Some(other) => {
            return Err(ServerError::InvalidIdentifier(format!(
                "invalid status filter: {other}"
            )))
        }
    };

    let mut views = Vec::new();
    for record in state.directory.list()? {
        let account = state
            .store
            .account(&record.account)?
            .ok_or_else(|| ServerError::UserNotFound(record.username.clone()))?;
        if let Some(status) = wanted {
            if account.status != status {
                continue;
            }
        }
        views.push(AdminUserView {
            id: record.account,
            username: record.username,
            full_name: record.full_name,
            email: record.email,
            role: record.role,
            status: account.status,
            created_at: record.created_at,
        });
    }
    Ok(Json(views))
}

/// `POST /api/admin/users/block/:id` — freeze an account. The holder can
/// still be paid but can no longer log in or spend.
async fn admin_block_handler(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<MessageResponse>> {
    let id = parse_id::<AccountId>(&id, "user id")?;
    let record = state
        .directory
        .get(&id)?
        .ok_or_else(|| ServerError::UserNotFound(id.to_string()))?;

    state.store.set_account_status(&id, AccountStatus::Blocked)?;
    tracing::info!(user = %record.username, "account blocked");

    Ok(Json(MessageResponse {
        message: "User blocked successfully".into(),
    }))
}

/// `POST /api/admin/users/unblock/:id` — lift a block.
async fn admin_unblock_handler(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<MessageResponse>> {
    let id = parse_id::<AccountId>(&id, "user id")?;
    let record = state
        .directory
        .get(&id)?
        .ok_or_else(|| ServerError::UserNotFound(id.to_string()))?;

    state.store.set_account_status(&id, AccountStatus::Active)?;
    tracing::info!(user = %record.username, "account unblocked");

    Ok(Json(MessageResponse {
        message: "User unblocked successfully".into(),
    }))
}

/// `POST /api/admin/deposit` — fund a user from the treasury reserve.
///
/// An ordinary ledger movement with kind `deposit`: conservation holds,
/// and a drained reserve surfaces insufficient balance like any sender.
async fn admin_deposit_handler(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(req): Json<DepositRequest>,
) -> ServerResult<Json<SettlementResponse>> {
    let recipient = state
        .directory
        .resolve_username(&req.username)?
        .ok_or_else(|| ServerError::UserNotFound(req.username.clone()))?;

    let order = Transfer {
        sender: state.reserve,
        recipient,
        amount: req.amount,
        description: req.description,
    };
    let started = Instant::now();
    let record = state.ledger.deposit(&order)?;
    state.metrics.transfers_total.inc();
    state
        .metrics
        .settlement_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    Ok(Json(SettlementResponse {
        message: "Deposit completed".into(),
        transaction_id: record.id,
    }))
}

/// `GET /api/admin/stats` — usage aggregates for dashboards.
async fn admin_stats_handler(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> ServerResult<Json<StatsResponse>> {
    Ok(Json(StatsResponse {
        total_users: state.directory.user_count() as u64,
        total_transaction_volume: state.store.transaction_volume()?,
    }))
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

/// Ensures the treasury reserve account exists and is funded.
///
/// The account id is pinned in store metadata, so restarts reuse the same
/// account; the float is only consulted on first creation. Idempotent.
pub fn initialize_reserve(store: &WalletStore, float: Amount) -> ServerResult<AccountId> {
    if let Some(id) = store.reserve_account()? {
        tracing::info!(account = %id, "reserve account loaded");
        return Ok(id);
    }
    let account = store.create_funded_account(float)?;
    store.set_reserve_account(&account.id)?;
    tracing::info!(account = %account.id, float = %account.balance, "reserve account created");
    Ok(account.id)
}

/// Ensures at least one administrator exists, registering one with the
/// given credentials if not. Returns whether an administrator was created.
pub fn ensure_admin(directory: &Directory, username: &str, password: &str) -> ServerResult<bool> {
    if directory.has_admin()? {
        return Ok(false);
    }
    let registration = Registration {
        full_name: "Administrator".into(),
        email: format!("{username}@vela.local"),
        username: username.to_string(),
        cpf: "00000000000".into(),
        password: password.to_string(),
    };
    directory.register(&registration, Role::Admin)?;
    tracing::info!(user = username, "bootstrap administrator created");
    Ok(true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
