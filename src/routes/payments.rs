use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::payments::{ConfirmPaymentRequest, ConfirmPaymentResponse},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/confirm", post(confirm_payment))
}

#[utoipa::path(
    post,
    path = "/api/payments/confirm",
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Payment and order marked paid/confirmed (idempotent)", body = ApiResponse<ConfirmPaymentResponse>),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Order or payment not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ConfirmPaymentRequest>,
) -> AppResult<Json<ApiResponse<ConfirmPaymentResponse>>> {
    let resp = payment_service::confirm_payment(&state, &user, payload.order_id).await?;
    Ok(Json(resp))
}
