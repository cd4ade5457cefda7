use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::{ready, Ready};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::RedPacketError;
use crate::metrics;
use crate::models::{ClaimResponse, CreatePacketRequest, PageRequest, RechargeRequest};
use crate::services::RedPacketService;
use crate::store::Store;

/// Header carrying the caller id set by the upstream auth layer
pub const CALLER_HEADER: &str = "X-User-Id";

type ServiceData<S> = web::Data<Arc<RedPacketService<S>>>;
type HandlerResult = Result<HttpResponse, RedPacketError>;

/// Authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub Uuid);

impl FromRequest for CallerId {
    type Error = RedPacketError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let caller = req
            .headers()
            .get(CALLER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .map(CallerId)
            .ok_or(RedPacketError::Unauthorized);
        ready(caller)
    }
}

/// Success envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            code: 0,
            message: "success".to_string(),
            data,
        }
    }
}

fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::success(data))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
}

/// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "redpacket-engine",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Prometheus metrics endpoint
pub async fn metrics_endpoint() -> HttpResponse {
    match metrics::metrics_handler() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => HttpResponse::InternalServerError().json(json!({
            "error": "Failed to gather metrics",
            "details": e.to_string()
        })),
    }
}

/// Register account endpoint
pub async fn register<S: Store>(
    service: ServiceData<S>,
    request: web::Json<RegisterRequest>,
) -> HandlerResult {
    let account = service.register(&request.username).await?;
    Ok(ok(account))
}

/// Create red packet endpoint
pub async fn create_packet<S: Store>(
    service: ServiceData<S>,
    caller: CallerId,
    request: web::Json<CreatePacketRequest>,
) -> HandlerResult {
    let packet = service.create_packet(caller.0, request.into_inner()).await?;
    Ok(ok(packet))
}

/// Claim red packet endpoint
pub async fn claim_packet<S: Store>(
    service: ServiceData<S>,
    caller: CallerId,
    packet_id: web::Path<Uuid>,
) -> HandlerResult {
    let packet_id = packet_id.into_inner();
    let amount = service.claim_packet(packet_id, caller.0).await?;
    Ok(ok(ClaimResponse { packet_id, amount }))
}

/// Red packet detail endpoint
pub async fn get_detail<S: Store>(
    service: ServiceData<S>,
    caller: CallerId,
    packet_id: web::Path<Uuid>,
) -> HandlerResult {
    let detail = service.get_detail(packet_id.into_inner(), caller.0).await?;
    Ok(ok(detail))
}

/// Claim records of one packet
pub async fn list_records<S: Store>(
    service: ServiceData<S>,
    _caller: CallerId,
    packet_id: web::Path<Uuid>,
    page: web::Query<PageRequest>,
) -> HandlerResult {
    let records = service
        .list_records(packet_id.into_inner(), page.into_inner())
        .await?;
    Ok(ok(records))
}

/// Packets sent by the caller
pub async fn list_sent<S: Store>(
    service: ServiceData<S>,
    caller: CallerId,
    page: web::Query<PageRequest>,
) -> HandlerResult {
    let sent = service.list_sent(caller.0, page.into_inner()).await?;
    Ok(ok(sent))
}

/// Packets claimed by the caller
pub async fn list_received<S: Store>(
    service: ServiceData<S>,
    caller: CallerId,
    page: web::Query<PageRequest>,
) -> HandlerResult {
    let received = service.list_received(caller.0, page.into_inner()).await?;
    Ok(ok(received))
}

pub async fn profile<S: Store>(service: ServiceData<S>, caller: CallerId) -> HandlerResult {
    let account = service.profile(caller.0).await?;
    Ok(ok(account))
}

pub async fn recharge<S: Store>(
    service: ServiceData<S>,
    caller: CallerId,
    request: web::Json<RechargeRequest>,
) -> HandlerResult {
    validator::Validate::validate(&*request)?;
    let entry = service.recharge(caller.0, request.amount).await?;
    Ok(ok(entry))
}

pub async fn ledger_history<S: Store>(
    service: ServiceData<S>,
    caller: CallerId,
    page: web::Query<PageRequest>,
) -> HandlerResult {
    let history = service.ledger_history(caller.0, page.into_inner()).await?;
    Ok(ok(history))
}

/// Configure routes
pub fn configure_routes<S: Store>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/users", web::post().to(register::<S>))
            .route("/red-packets", web::post().to(create_packet::<S>))
            .route("/red-packets/{id}", web::get().to(get_detail::<S>))
            .route("/red-packets/{id}/claim", web::post().to(claim_packet::<S>))
            .route("/red-packets/{id}/records", web::get().to(list_records::<S>))
            .route("/user/red-packets/sent", web::get().to(list_sent::<S>))
            .route("/user/red-packets/received", web::get().to(list_received::<S>))
            .route("/user/profile", web::get().to(profile::<S>))
            .route("/user/recharge", web::post().to(recharge::<S>))
            .route("/user/ledger", web::get().to(ledger_history::<S>)),
    )
    .route("/metrics", web::get().to(metrics_endpoint))
    .route("/health", web::get().to(health_check));
}
