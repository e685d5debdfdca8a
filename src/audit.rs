//! Write-behind audit trail. Mutations record what happened; a failed write
//! warns and never fails the request that triggered it.

use serde_json::Value;
use uuid::Uuid;

use crate::{db::DbPool, error::AppResult};

/// Closed set of recorded actions, so queries on `audit_logs.action` never
/// chase free-form strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    UserRegister,
    UserLogin,
    ProductCreate,
    ProductUpdate,
    ProductDelete,
    CollectionCreate,
    CollectionUpdate,
    CollectionDelete,
    CartUpdate,
    CartRemove,
    CartMerge,
    OrderCreate,
    OrderStatusUpdate,
    PaymentConfirm,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::UserRegister => "user_register",
            AuditAction::UserLogin => "user_login",
            AuditAction::ProductCreate => "product_create",
            AuditAction::ProductUpdate => "product_update",
            AuditAction::ProductDelete => "product_delete",
            AuditAction::CollectionCreate => "collection_create",
            AuditAction::CollectionUpdate => "collection_update",
            AuditAction::CollectionDelete => "collection_delete",
            AuditAction::CartUpdate => "cart_update",
            AuditAction::CartRemove => "cart_remove",
            AuditAction::CartMerge => "cart_merge",
            AuditAction::OrderCreate => "order_create",
            AuditAction::OrderStatusUpdate => "order_status_update",
            AuditAction::PaymentConfirm => "payment_confirm",
        }
    }

    /// Table the action touches; stored in `audit_logs.resource`.
    pub fn resource(self) -> &'static str {
        match self {
            AuditAction::UserRegister | AuditAction::UserLogin => "users",
            AuditAction::ProductCreate | AuditAction::ProductUpdate | AuditAction::ProductDelete => {
                "products"
            }
            AuditAction::CollectionCreate
            | AuditAction::CollectionUpdate
            | AuditAction::CollectionDelete => "collections",
            AuditAction::CartUpdate | AuditAction::CartRemove | AuditAction::CartMerge => {
                "cart_items"
            }
            AuditAction::OrderCreate | AuditAction::OrderStatusUpdate => "orders",
            AuditAction::PaymentConfirm => "payments",
        }
    }
}

/// Record an action, swallowing write failures with a warning.
pub async fn record(pool: &DbPool, user_id: Uuid, action: AuditAction, metadata: Value) {
    if let Err(err) = insert(pool, user_id, action, metadata).await {
        tracing::warn!(error = %err, action = action.as_str(), "audit log failed");
    }
}

async fn insert(
    pool: &DbPool,
    user_id: Uuid,
    action: AuditAction,
    metadata: Value,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_id, action, resource, metadata)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(action.as_str())
    .bind(action.resource())
    .bind(metadata)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_action_maps_to_its_table() {
        assert_eq!(AuditAction::CartMerge.resource(), "cart_items");
        assert_eq!(AuditAction::OrderCreate.resource(), "orders");
        assert_eq!(AuditAction::PaymentConfirm.resource(), "payments");
        assert_eq!(AuditAction::UserLogin.resource(), "users");
        assert_eq!(AuditAction::ProductDelete.resource(), "products");
        assert_eq!(AuditAction::CollectionUpdate.resource(), "collections");
    }

    #[test]
    fn action_names_are_snake_case_and_distinct() {
        let all = [
            AuditAction::UserRegister,
            AuditAction::UserLogin,
            AuditAction::ProductCreate,
            AuditAction::ProductUpdate,
            AuditAction::ProductDelete,
            AuditAction::CollectionCreate,
            AuditAction::CollectionUpdate,
            AuditAction::CollectionDelete,
            AuditAction::CartUpdate,
            AuditAction::CartRemove,
            AuditAction::CartMerge,
            AuditAction::OrderCreate,
            AuditAction::OrderStatusUpdate,
            AuditAction::PaymentConfirm,
        ];
        let names: std::collections::HashSet<&str> =
            all.iter().map(|a| a.as_str()).collect();
        assert_eq!(names.len(), all.len());
        for name in names {
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
