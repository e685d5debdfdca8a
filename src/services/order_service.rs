use std::collections::HashMap;

use chrono::Utc;
use rand::Rng;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseTransaction, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    dto::orders::{CreateOrderRequest, OrderList, UpdateOrderRequest},
    entity::{
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
        payments::ActiveModel as PaymentActive,
        product_variants::{Column as VariantCol, Entity as ProductVariants},
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{
        Order, OrderItem, OrderStatus, PaymentStatus, ProductStatus, ShippingAddress,
        effective_price,
    },
    response::{ApiResponse, Meta},
    routes::params::OrderListQuery,
    state::AppState,
};

const ORDER_NUMBER_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const ORDER_NUMBER_LEN: usize = 8;
const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Convert a validated set of order lines into an Order + PENDING Payment,
/// all inside one transaction.
///
/// Prices are re-derived server-side at this moment; the stock decrement is a
/// conditional update (`stock = stock - qty` guarded by `stock >= qty`), so
/// two concurrent checkouts of the last unit cannot both succeed. Any line
/// failure rolls the whole order back.
pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<Order>> {
    if payload.items.is_empty() {
        return Err(AppError::BadRequest(
            "Order must contain at least one item".into(),
        ));
    }
    if payload.items.iter().any(|line| line.quantity < 1) {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".into(),
        ));
    }

    let txn = state.orm.begin().await?;

    let mut subtotal: i64 = 0;
    let mut priced_lines = Vec::with_capacity(payload.items.len());

    for line in &payload.items {
        let product = Products::find_by_id(line.product_id).one(&txn).await?;
        let product = match product {
            Some(p) if p.status == ProductStatus::Active.as_str() => p,
            _ => return Err(AppError::not_found("Product not found or inactive")),
        };

        let variant = ProductVariants::find()
            .filter(
                Condition::all()
                    .add(VariantCol::ProductId.eq(line.product_id))
                    .add(VariantCol::VariantSku.eq(line.variant_sku.clone())),
            )
            .lock(LockType::Update)
            .one(&txn)
            .await?;
        let variant = match variant {
            Some(v) => v,
            None => {
                return Err(AppError::not_found(format!(
                    "Variant {} not found",
                    line.variant_sku
                )));
            }
        };

        // Atomic conditional decrement; zero rows affected means another
        // checkout took the stock first.
        let decremented = ProductVariants::update_many()
            .col_expr(
                VariantCol::Stock,
                Expr::col(VariantCol::Stock).sub(line.quantity),
            )
            .filter(
                Condition::all()
                    .add(VariantCol::Id.eq(variant.id))
                    .add(VariantCol::Stock.gte(line.quantity)),
            )
            .exec(&txn)
            .await?;
        if decremented.rows_affected == 0 {
            return Err(AppError::InsufficientStock(line.variant_sku.clone()));
        }

        let unit_price = effective_price(product.price, product.sale_price);
        subtotal += unit_price * line.quantity as i64;
        priced_lines.push((line, unit_price));
    }

    let shipping_fee = state.config.shipping_fee;
    let total_amount = subtotal + shipping_fee;

    let order_id = Uuid::new_v4();
    let order_number = generate_order_number(&txn).await?;

    let order = OrderActive {
        id: Set(order_id),
        order_number: Set(order_number.clone()),
        user_id: Set(user.user_id),
        full_name: Set(payload.shipping_address.full_name.clone()),
        phone: Set(payload.shipping_address.phone.clone()),
        street: Set(payload.shipping_address.street.clone()),
        city: Set(payload.shipping_address.city.clone()),
        state: Set(payload.shipping_address.state.clone()),
        postal_code: Set(payload.shipping_address.postal_code.clone()),
        country: Set(payload.shipping_address.country.clone()),
        payment_method: Set(payload.payment_method.as_str().to_string()),
        order_status: Set(OrderStatus::Pending.as_str().to_string()),
        payment_status: Set(PaymentStatus::Pending.as_str().to_string()),
        subtotal: Set(subtotal),
        shipping_fee: Set(shipping_fee),
        total_amount: Set(total_amount),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items = Vec::with_capacity(priced_lines.len());
    for (line, unit_price) in &priced_lines {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(line.product_id),
            variant_sku: Set(line.variant_sku.clone()),
            quantity: Set(line.quantity),
            unit_price: Set(*unit_price),
        }
        .insert(&txn)
        .await?;
        items.push(item);
    }

    PaymentActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        method: Set(payload.payment_method.as_str().to_string()),
        status: Set(PaymentStatus::Pending.as_str().to_string()),
        reference_number: Set(format!("MOCK-{}", order_number)),
        created_at: NotSet,
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        AuditAction::OrderCreate,
        serde_json::json!({ "order_id": order_id, "order_number": order_number }),
    )
    .await;

    let order = order_from_entity(order, items)?;
    Ok(ApiResponse::new(order))
}

pub async fn list_my_orders(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<OrderList>> {
    let orders = Orders::find()
        .filter(OrderCol::UserId.eq(user.user_id))
        .order_by_desc(OrderCol::CreatedAt)
        .all(&state.orm)
        .await?;

    let items = attach_items(state, orders).await?;
    Ok(ApiResponse::new(OrderList { items }))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    let order = Orders::find_by_id(id).one(&state.orm).await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::not_found("Order not found")),
    };

    if order.user_id != user.user_id && !user.is_admin() {
        return Err(AppError::Forbidden);
    }

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?;

    Ok(ApiResponse::new(order_from_entity(order, items)?))
}

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::OrderStatus.eq(status.as_str()));
    }

    let finder = Orders::find()
        .filter(condition)
        .order_by_desc(OrderCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let items = attach_items(state, orders).await?;
    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::paginated(OrderList { items }, meta))
}

/// Admin status update, validated against the transition tables. A request
/// may move either status or both; a disallowed transition rejects the whole
/// update.
pub async fn update_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;

    let existing = Orders::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(o) => o,
        None => return Err(AppError::not_found("Order not found")),
    };

    let current_order_status = parse_order_status(&existing.order_status)?;
    let current_payment_status = parse_payment_status(&existing.payment_status)?;

    if let Some(next) = payload.order_status {
        if !current_order_status.can_transition(next) {
            return Err(AppError::BadRequest(format!(
                "Invalid order status transition {} -> {}",
                current_order_status.as_str(),
                next.as_str()
            )));
        }
    }
    if let Some(next) = payload.payment_status {
        if !current_payment_status.can_transition(next) {
            return Err(AppError::BadRequest(format!(
                "Invalid payment status transition {} -> {}",
                current_payment_status.as_str(),
                next.as_str()
            )));
        }
    }

    let order_id = existing.id;
    let mut active: OrderActive = existing.into();
    if let Some(next) = payload.order_status {
        active.order_status = Set(next.as_str().to_string());
    }
    if let Some(next) = payload.payment_status {
        active.payment_status = Set(next.as_str().to_string());
    }
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        user.user_id,
        AuditAction::OrderStatusUpdate,
        serde_json::json!({
            "order_id": order_id,
            "order_status": &order.order_status,
            "payment_status": &order.payment_status,
        }),
    )
    .await;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .all(&state.orm)
        .await?;

    Ok(ApiResponse::new(order_from_entity(order, items)?))
}

async fn attach_items(state: &AppState, orders: Vec<OrderModel>) -> AppResult<Vec<Order>> {
    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();

    let item_models = OrderItems::find()
        .filter(OrderItemCol::OrderId.is_in(ids))
        .all(&state.orm)
        .await?;

    let mut by_order: HashMap<Uuid, Vec<OrderItemModel>> = HashMap::new();
    for item in item_models {
        by_order.entry(item.order_id).or_default().push(item);
    }

    orders
        .into_iter()
        .map(|order| {
            let items = by_order.remove(&order.id).unwrap_or_default();
            order_from_entity(order, items)
        })
        .collect()
}

fn random_order_number() -> String {
    let mut rng = rand::thread_rng();
    (0..ORDER_NUMBER_LEN)
        .map(|_| ORDER_NUMBER_ALPHABET[rng.gen_range(0..ORDER_NUMBER_ALPHABET.len())] as char)
        .collect()
}

/// 8 characters from a fixed alphabet, retried on collision. Collisions are
/// vanishingly rare; after five misses a timestamp-derived code is used,
/// itself re-checked (and bumped) so the UNIQUE constraint is never hit.
async fn generate_order_number(txn: &DatabaseTransaction) -> AppResult<String> {
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        let candidate = random_order_number();
        if !order_number_taken(txn, &candidate).await? {
            return Ok(candidate);
        }
    }

    let mut millis = Utc::now().timestamp_millis() as u64;
    loop {
        let candidate = format!("{:08X}", millis & 0xFFFF_FFFF);
        if !order_number_taken(txn, &candidate).await? {
            return Ok(candidate);
        }
        millis += 1;
    }
}

async fn order_number_taken(txn: &DatabaseTransaction, candidate: &str) -> AppResult<bool> {
    let existing = Orders::find()
        .filter(OrderCol::OrderNumber.eq(candidate))
        .one(txn)
        .await?;
    Ok(existing.is_some())
}

fn parse_order_status(s: &str) -> AppResult<OrderStatus> {
    OrderStatus::parse(s)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown order status {s}")))
}

fn parse_payment_status(s: &str) -> AppResult<PaymentStatus> {
    PaymentStatus::parse(s)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown payment status {s}")))
}

pub(crate) fn order_from_entity(
    model: OrderModel,
    items: Vec<OrderItemModel>,
) -> AppResult<Order> {
    let order_status = parse_order_status(&model.order_status)?;
    let payment_status = parse_payment_status(&model.payment_status)?;
    let payment_method = crate::models::PaymentMethod::parse(&model.payment_method)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown payment method")))?;

    Ok(Order {
        id: model.id,
        order_number: model.order_number,
        user_id: model.user_id,
        items: items.into_iter().map(order_item_from_entity).collect(),
        shipping_address: ShippingAddress {
            full_name: model.full_name,
            phone: model.phone,
            street: model.street,
            city: model.city,
            state: model.state,
            postal_code: model.postal_code,
            country: model.country,
        },
        payment_method,
        order_status,
        payment_status,
        subtotal: model.subtotal,
        shipping_fee: model.shipping_fee,
        total_amount: model.total_amount,
        created_at: model.created_at.with_timezone(&Utc),
    })
}

fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        product_id: model.product_id,
        variant_sku: model.variant_sku,
        quantity: model.quantity,
        unit_price: model.unit_price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_numbers_use_the_fixed_alphabet() {
        for _ in 0..100 {
            let number = random_order_number();
            assert_eq!(number.len(), ORDER_NUMBER_LEN);
            assert!(
                number
                    .bytes()
                    .all(|b| ORDER_NUMBER_ALPHABET.contains(&b)),
                "unexpected character in {number}"
            );
        }
    }
}
