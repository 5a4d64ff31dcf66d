use axum::extract::multipart::Multipart;
use axum::extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Form, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::domain::aggregates::{CreateOrder, Order, OrderStatus, StatusExtra};
use crate::http::extract::client_ip;
use crate::http::AppState;
use crate::import::{ImportKind, ImportResult};
use crate::services::{BankTransferInstructions, BatchOutcome, BuyerInfo, CallbackOutcome, Caller, FailureReason, Initiated};
use crate::store::OrderFilter;
use crate::{CommerceError, Result};

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

type JsonBody<T> = std::result::Result<Json<T>, JsonRejection>;
type OrderId = std::result::Result<Path<Uuid>, PathRejection>;

// Admin handlers check the role before the path or body is parsed.

pub async fn create_order(State(s): State<AppState>, caller: Caller, body: JsonBody<CreateOrder>) -> Result<(StatusCode, Json<Order>)> {
    let Json(input) = body?;
    let order = s.orders.create_order(&caller.user_id, &input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_orders(State(s): State<AppState>, caller: Caller, query: std::result::Result<Query<OrderFilter>, QueryRejection>) -> Result<Json<Vec<Order>>> {
    let Query(filter) = query?;
    Ok(Json(s.orders.list_orders_for(&caller, filter).await?))
}

pub async fn get_order(State(s): State<AppState>, caller: Caller, id: OrderId) -> Result<Json<Order>> {
    let Path(id) = id?;
    Ok(Json(s.orders.get_order_for(&caller, id).await?))
}

pub async fn cancel_order(State(s): State<AppState>, caller: Caller, id: OrderId) -> Result<Json<Order>> {
    let Path(id) = id?;
    Ok(Json(s.orders.cancel_order(&caller, id).await?))
}

pub async fn initiate_gateway_payment(State(s): State<AppState>, caller: Caller, id: OrderId, headers: HeaderMap, body: JsonBody<BuyerInfo>) -> Result<Json<Initiated>> {
    let Path(id) = id?;
    let Json(mut buyer) = body?;
    if buyer.ip.is_none() { buyer.ip = client_ip(&headers); }
    Ok(Json(s.checkout.initiate(&caller, id, &buyer).await?))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery { pub order_id: Uuid }

#[derive(Debug, Deserialize)]
pub struct CallbackForm { pub token: String }

/// Gateway posts here from the buyer's browser; the buyer always ends up on
/// a storefront result page.
pub async fn payment_callback(
    State(s): State<AppState>,
    query: std::result::Result<Query<CallbackQuery>, QueryRejection>,
    form: std::result::Result<Form<CallbackForm>, FormRejection>,
) -> Result<Response> {
    let Query(CallbackQuery { order_id }) = query?;
    let outcome = match form {
        Ok(Form(CallbackForm { token })) => s.checkout.handle_callback(order_id, &token).await,
        Err(rejection) => Err(rejection.into()),
    };
    let outcome = outcome.unwrap_or_else(|e| {
        warn!(%order_id, error = %e, "payment callback could not be processed");
        CallbackOutcome::Failed { order_id, reason: FailureReason::ProcessError }
    });
    Ok(Redirect::to(&outcome.redirect_target(s.checkout.public_base_url())).into_response())
}

pub async fn initiate_bank_transfer(State(s): State<AppState>, caller: Caller, id: OrderId) -> Result<Json<BankTransferInstructions>> {
    let Path(id) = id?;
    Ok(Json(s.bank_transfers.initiate_bank_transfer(&caller, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmTransferRequest { pub decision: OrderStatus, pub notes: Option<String> }

pub async fn confirm_bank_transfer(State(s): State<AppState>, caller: Caller, id: OrderId, body: JsonBody<ConfirmTransferRequest>) -> Result<Json<Order>> {
    caller.require_admin()?;
    let Path(id) = id?;
    let Json(request) = body?;
    Ok(Json(s.bank_transfers.confirm_bank_transfer(&caller, id, request.decision, request.notes).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: OrderStatus,
    #[serde(flatten)]
    pub extra: StatusExtra,
}

pub async fn update_status(State(s): State<AppState>, caller: Caller, id: OrderId, body: JsonBody<StatusUpdateRequest>) -> Result<Json<Order>> {
    caller.require_admin()?;
    let Path(id) = id?;
    let Json(request) = body?;
    Ok(Json(s.admin.update_single(&caller, id, request.status, Some(&request.extra)).await?))
}

#[derive(Debug, Deserialize)]
pub struct BatchStatusRequest {
    pub order_ids: Vec<Uuid>,
    pub status: OrderStatus,
    #[serde(flatten)]
    pub extra: StatusExtra,
}

pub async fn update_status_batch(State(s): State<AppState>, caller: Caller, body: JsonBody<BatchStatusRequest>) -> Result<Json<BatchOutcome>> {
    caller.require_admin()?;
    let Json(request) = body?;
    Ok(Json(s.admin.update_batch(&caller, &request.order_ids, request.status, Some(&request.extra)).await?))
}

pub async fn import_spreadsheet(State(s): State<AppState>, caller: Caller, Path(kind): Path<String>, mut multipart: Multipart) -> Result<Json<ImportResult>> {
    caller.require_admin()?;
    let kind: ImportKind = kind.parse()?;

    while let Some(field) = multipart.next_field().await.map_err(|e| CommerceError::validation(e.body_text()))? {
        if field.name() != Some("file") { continue; }
        let filename = field.file_name().unwrap_or_default().to_string();
        crate::import::ensure_spreadsheet(&filename)?;
        let bytes = field.bytes().await.map_err(|e| CommerceError::validation(e.body_text()))?;
        return Ok(Json(s.importer.import(kind, &filename, bytes.to_vec()).await?));
    }
    Err(CommerceError::validation("multipart field 'file' is required"))
}

pub async fn download_template(State(s): State<AppState>, caller: Caller, Path(kind): Path<String>) -> Result<Response> {
    caller.require_admin()?;
    let kind: ImportKind = kind.parse()?;
    let bytes = s.importer.template(kind)?;
    let headers = [
        (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
        (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", kind.template_filename())),
    ];
    Ok((headers, bytes).into_response())
}
