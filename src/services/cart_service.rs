use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::cart::{AddToCartRequest, CartLineDto, CartList},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::CartItem,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
};

#[derive(FromRow)]
struct CartLineRow {
    cart_id: Uuid,
    quantity: i32,
    product_id: Uuid,
    product_variant_id: Uuid,
    name: String,
    color: String,
    size: String,
    price: i64,
    stock: i32,
    image_url: Option<String>,
}

pub async fn list_cart(
    pool: &DbPool,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<CartList>> {
    let (page, limit, offset) = pagination.normalize();
    let rows = sqlx::query_as::<_, CartLineRow>(
        r#"
        SELECT ci.id AS cart_id, ci.quantity,
               p.id AS product_id, p.name, p.price,
               v.id AS product_variant_id, v.color, v.size, v.stock,
               COALESCE(v.image_url, p.image_url) AS image_url
        FROM cart_items ci
        JOIN product_variants v ON v.id = ci.product_variant_id
        JOIN products p ON p.id = v.product_id
        WHERE ci.user_id = $1
        ORDER BY ci.created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user.user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cart_items WHERE user_id = $1")
        .bind(user.user_id)
        .fetch_one(pool)
        .await?;

    let items = rows
        .into_iter()
        .map(|row| CartLineDto {
            id: row.cart_id,
            product_id: row.product_id,
            product_variant_id: row.product_variant_id,
            name: row.name,
            color: row.color,
            size: row.size,
            price: row.price,
            stock: row.stock,
            image_url: row.image_url,
            quantity: row.quantity,
        })
        .collect();

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success("OK", CartList { items }, Some(meta)))
}

pub async fn add_to_cart(
    pool: &DbPool,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let variant: Option<(Uuid, Uuid, i32)> =
        sqlx::query_as("SELECT id, product_id, stock FROM product_variants WHERE id = $1")
            .bind(payload.product_variant_id)
            .fetch_optional(pool)
            .await?;
    let (variant_id, product_id, stock) = match variant {
        Some(v) => v,
        None => return Err(AppError::BadRequest("variant not found".to_string())),
    };

    if payload.quantity > stock {
        return Err(AppError::BadRequest(format!(
            "only {stock} left in stock"
        )));
    }

    let exist: Option<CartItem> = sqlx::query_as(
        "SELECT * FROM cart_items WHERE user_id = $1 AND product_variant_id = $2",
    )
    .bind(user.user_id)
    .bind(variant_id)
    .fetch_optional(pool)
    .await?;

    let cart_item = if let Some(item) = exist {
        sqlx::query_as::<_, CartItem>(
            r#"
            UPDATE cart_items
            SET quantity = $3
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(item.id)
        .bind(user.user_id)
        .bind(payload.quantity)
        .fetch_one(pool)
        .await?
    } else {
        sqlx::query_as(
            r#"
            INSERT INTO cart_items (user_id, product_id, product_variant_id, quantity)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(user.user_id)
        .bind(product_id)
        .bind(variant_id)
        .bind(payload.quantity)
        .fetch_one(pool)
        .await?
    };

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "cart_update",
        Some("cart_items"),
        Some(serde_json::json!({ "variant_id": variant_id, "quantity": payload.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("OK", cart_item, None))
}

pub async fn remove_from_cart(
    pool: &DbPool,
    user: &AuthUser,
    variant_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result =
        sqlx::query("DELETE FROM cart_items WHERE product_variant_id = $1 AND user_id = $2")
            .bind(variant_id)
            .bind(user.user_id)
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "cart_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "variant_id": variant_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
