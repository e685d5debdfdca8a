use chrono::Utc;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    dto::payments::ConfirmPaymentResponse,
    entity::{
        orders::{ActiveModel as OrderActive, Entity as Orders},
        payments::{ActiveModel as PaymentActive, Column as PaymentCol, Entity as Payments},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{OrderStatus, PaymentStatus},
    response::ApiResponse,
    state::AppState,
};

/// Mock stand-in for a payment gateway webhook: flips the Payment to PAID and
/// the Order to PAID/CONFIRMED in one transaction. Idempotent — a repeat call
/// finds the terminal state already applied and succeeds without touching
/// anything.
pub async fn confirm_payment(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<ConfirmPaymentResponse>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(order_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::not_found("Order not found")),
    };

    if order.user_id != user.user_id && !user.is_admin() {
        return Err(AppError::Forbidden);
    }

    let payment = Payments::find()
        .filter(PaymentCol::OrderId.eq(order_id))
        .one(&txn)
        .await?;
    let payment = match payment {
        Some(p) => p,
        None => return Err(AppError::not_found("Payment not found")),
    };

    let already_confirmed = payment.status == PaymentStatus::Paid.as_str()
        && order.payment_status == PaymentStatus::Paid.as_str()
        && order.order_status == OrderStatus::Confirmed.as_str();

    if !already_confirmed {
        let mut payment_active: PaymentActive = payment.into();
        payment_active.status = Set(PaymentStatus::Paid.as_str().to_string());
        payment_active.update(&txn).await?;

        let mut order_active: OrderActive = order.into();
        order_active.payment_status = Set(PaymentStatus::Paid.as_str().to_string());
        order_active.order_status = Set(OrderStatus::Confirmed.as_str().to_string());
        order_active.updated_at = Set(Utc::now().into());
        order_active.update(&txn).await?;
    }

    txn.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        AuditAction::PaymentConfirm,
        serde_json::json!({ "order_id": order_id }),
    )
    .await;

    Ok(ApiResponse::new(ConfirmPaymentResponse {
        confirmed: true,
        order_id,
    }))
}
