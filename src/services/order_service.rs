use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{CardConfirmation, CheckoutRequest, OrderDetail, OrderList, ShippingSource},
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        payments::{ActiveModel as PaymentActive, Column as PaymentCol, Entity as Payments, Model as PaymentModel},
        product_variants::{Column as VariantCol, Entity as ProductVariants},
        products::Entity as Products,
        user_addresses::{Column as AddressCol, Entity as UserAddresses},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatus, Payment, PaymentMethod, PaymentStatus},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::stock,
    state::AppState,
};

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        let status = OrderStatus::parse(status)
            .ok_or_else(|| AppError::BadRequest("Invalid order status".into()))?;
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderDetail>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?;
    let order = match order {
        Some(o) => order_from_entity(o)?,
        None => return Err(AppError::NotFound),
    };

    let detail = load_order_detail(&state.orm, order).await?;
    Ok(ApiResponse::success("OK", detail, Some(Meta::empty())))
}

/// Checkout: validate the whole cart against live variant stock, deduct,
/// snapshot the cart into an order + items + one payment row, and clear the
/// cart. Runs in a single transaction with the variant rows locked so a
/// concurrent checkout cannot oversell; any error rolls everything back.
pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<OrderDetail>> {
    let txn = state.orm.begin().await?;

    // Lock variants in a fixed order so concurrent checkouts over
    // overlapping carts cannot deadlock.
    let cart_rows = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .order_by_asc(CartCol::ProductVariantId)
        .lock(LockType::Update)
        .all(&txn)
        .await?;

    if cart_rows.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    // First pass: lock every variant and re-check live stock before any
    // mutation, so a shortfall anywhere aborts with nothing changed.
    let mut lines = Vec::with_capacity(cart_rows.len());
    for row in &cart_rows {
        if row.quantity <= 0 {
            return Err(AppError::BadRequest("Cart has invalid quantity".into()));
        }
        let variant = ProductVariants::find_by_id(row.product_variant_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                AppError::BadRequest("A cart item's variant no longer exists".into())
            })?;
        let product = Products::find_by_id(variant.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                AppError::BadRequest("A cart item's product no longer exists".into())
            })?;
        if variant.stock < row.quantity {
            return Err(AppError::BadRequest(format!(
                "Insufficient stock for {} ({}/{}): {} requested, {} available",
                product.name, variant.color, variant.size, row.quantity, variant.stock
            )));
        }
        lines.push((row.quantity, variant, product));
    }

    // Second pass: deduct stock and recompute each touched aggregate.
    let mut touched: Vec<Uuid> = Vec::new();
    for (quantity, variant, product) in &lines {
        ProductVariants::update_many()
            .col_expr(
                VariantCol::Stock,
                Expr::col(VariantCol::Stock).sub(*quantity),
            )
            .filter(VariantCol::Id.eq(variant.id))
            .exec(&txn)
            .await?;
        if !touched.contains(&product.id) {
            touched.push(product.id);
        }
    }
    for product_id in &touched {
        stock::recompute_aggregate(&txn, *product_id).await?;
    }

    // Checkout-time price: the product's current price, not a cart-add
    // snapshot.
    let total_amount: i64 = lines
        .iter()
        .map(|(quantity, _, product)| product.price * (*quantity as i64))
        .sum();

    let shipping = resolve_shipping(&txn, user, payload.shipping).await?;
    let payment_status = resolved_payment_status(
        payload.payment_method,
        payload.card_confirmation.as_ref(),
    );

    let order_id = Uuid::new_v4();
    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.user_id),
        total_amount: Set(total_amount),
        status: Set(OrderStatus::Processing.as_str().into()),
        payment_status: Set(payment_status.as_str().into()),
        payment_method: Set(payload.payment_method.as_str().into()),
        shipping_full_name: Set(shipping.full_name),
        shipping_phone: Set(shipping.phone),
        shipping_address_line: Set(shipping.address_line),
        shipping_city: Set(shipping.city),
        shipping_province: Set(shipping.province),
        shipping_postal_code: Set(shipping.postal_code),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items: Vec<OrderItem> = Vec::new();
    for (quantity, variant, product) in &lines {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(Some(product.id)),
            product_variant_id: Set(Some(variant.id)),
            quantity: Set(*quantity),
            price: Set(product.price),
            name: Set(product.name.clone()),
            color: Set(variant.color.clone()),
            size: Set(variant.size.clone()),
            image_url: Set(variant.image_url.clone().or_else(|| product.image_url.clone())),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        items.push(order_item_from_entity(item));
    }

    let payment = PaymentActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        amount: Set(total_amount),
        method: Set(payload.payment_method.as_str().into()),
        status: Set(payment_status.as_str().into()),
        transaction_id: Set(payload
            .card_confirmation
            .as_ref()
            .map(|c| c.transaction_id.clone())),
        created_at: NotSet,
    }
    .insert(&txn)
    .await?;

    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "checkout",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "total": total_amount })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Checkout success",
        OrderDetail {
            order: order_from_entity(order)?,
            items,
            payment: Some(payment_from_entity(payment)?),
        },
        Some(Meta::empty()),
    ))
}

/// Customer-facing cancel: allowed only while the order is still
/// `processing`; restores every item's variant stock in the same
/// transaction.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    let txn = state.orm.begin().await?;

    let existing = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let existing = match existing {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    match parse_status(&existing.status)? {
        OrderStatus::Processing => {}
        OrderStatus::Shipping => {
            return Err(AppError::BadRequest(
                "Order has already been shipped".into(),
            ));
        }
        OrderStatus::Delivered => {
            return Err(AppError::BadRequest(
                "Order has already been delivered".into(),
            ));
        }
        OrderStatus::Cancelled => {
            return Err(AppError::BadRequest("Order is already cancelled".into()));
        }
    }

    stock::restore_order_stock(&txn, existing.id).await?;

    let mut active: OrderActive = existing.into();
    active.status = Set(OrderStatus::Cancelled.as_str().into());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_cancel",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order cancelled",
        order_from_entity(order)?,
        Some(Meta::empty()),
    ))
}

struct ShippingSnapshot {
    full_name: Option<String>,
    phone: Option<String>,
    address_line: Option<String>,
    city: Option<String>,
    province: Option<String>,
    postal_code: Option<String>,
}

async fn resolve_shipping<C: ConnectionTrait>(
    conn: &C,
    user: &AuthUser,
    source: ShippingSource,
) -> AppResult<ShippingSnapshot> {
    match source {
        ShippingSource::SavedAddress { address_id } => {
            let address = UserAddresses::find()
                .filter(
                    Condition::all()
                        .add(AddressCol::Id.eq(address_id))
                        .add(AddressCol::UserId.eq(user.user_id)),
                )
                .one(conn)
                .await?
                .ok_or_else(|| AppError::BadRequest("Saved address not found".into()))?;
            Ok(ShippingSnapshot {
                full_name: Some(address.full_name),
                phone: Some(address.phone),
                address_line: Some(address.address_line),
                city: Some(address.city),
                province: Some(address.province),
                postal_code: Some(address.postal_code),
            })
        }
        ShippingSource::Inline {
            full_name,
            phone,
            address_line,
            city,
            province,
            postal_code,
        } => Ok(ShippingSnapshot {
            full_name: Some(full_name),
            phone: Some(phone),
            address_line: Some(address_line),
            city: Some(city),
            province: Some(province),
            postal_code: Some(postal_code),
        }),
        ShippingSource::None => Ok(ShippingSnapshot {
            full_name: None,
            phone: None,
            address_line: None,
            city: None,
            province: None,
            postal_code: None,
        }),
    }
}

/// An order is born `paid` only when a card confirmation reports a
/// succeeded charge; everything else (cod, missing or failed confirmation)
/// starts `pending`.
fn resolved_payment_status(
    method: PaymentMethod,
    confirmation: Option<&CardConfirmation>,
) -> PaymentStatus {
    match (method, confirmation) {
        (PaymentMethod::Card, Some(c)) if c.status == "succeeded" => PaymentStatus::Paid,
        _ => PaymentStatus::Pending,
    }
}

pub async fn load_order_detail<C: ConnectionTrait>(
    conn: &C,
    order: Order,
) -> AppResult<OrderDetail> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(conn)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    let payment = Payments::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .one(conn)
        .await?
        .map(payment_from_entity)
        .transpose()?;

    Ok(OrderDetail {
        order,
        items,
        payment,
    })
}

fn parse_status(raw: &str) -> AppResult<OrderStatus> {
    OrderStatus::parse(raw)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown order status {raw}")))
}

pub fn order_from_entity(model: OrderModel) -> AppResult<Order> {
    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        total_amount: model.total_amount,
        status: parse_status(&model.status)?,
        payment_status: PaymentStatus::parse(&model.payment_status).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "unknown payment status {}",
                model.payment_status
            ))
        })?,
        payment_method: PaymentMethod::parse(&model.payment_method).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "unknown payment method {}",
                model.payment_method
            ))
        })?,
        shipping_full_name: model.shipping_full_name,
        shipping_phone: model.shipping_phone,
        shipping_address_line: model.shipping_address_line,
        shipping_city: model.shipping_city,
        shipping_province: model.shipping_province,
        shipping_postal_code: model.shipping_postal_code,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

pub fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        product_variant_id: model.product_variant_id,
        quantity: model.quantity,
        price: model.price,
        name: model.name,
        color: model.color,
        size: model.size,
        image_url: model.image_url,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

pub fn payment_from_entity(model: PaymentModel) -> AppResult<Payment> {
    Ok(Payment {
        id: model.id,
        order_id: model.order_id,
        amount: model.amount,
        method: PaymentMethod::parse(&model.method).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("unknown payment method {}", model.method))
        })?,
        status: PaymentStatus::parse(&model.status).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("unknown payment status {}", model.status))
        })?,
        transaction_id: model.transaction_id,
        created_at: model.created_at.with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmation(status: &str) -> CardConfirmation {
        CardConfirmation {
            transaction_id: "pi_123".into(),
            status: status.into(),
        }
    }

    #[test]
    fn cod_orders_start_pending() {
        assert_eq!(
            resolved_payment_status(PaymentMethod::Cod, None),
            PaymentStatus::Pending
        );
        // A confirmation on a cod order is ignored.
        assert_eq!(
            resolved_payment_status(PaymentMethod::Cod, Some(&confirmation("succeeded"))),
            PaymentStatus::Pending
        );
    }

    #[test]
    fn card_orders_paid_only_on_succeeded_confirmation() {
        assert_eq!(
            resolved_payment_status(PaymentMethod::Card, Some(&confirmation("succeeded"))),
            PaymentStatus::Paid
        );
        assert_eq!(
            resolved_payment_status(PaymentMethod::Card, Some(&confirmation("requires_action"))),
            PaymentStatus::Pending
        );
        assert_eq!(
            resolved_payment_status(PaymentMethod::Card, None),
            PaymentStatus::Pending
        );
    }
}
