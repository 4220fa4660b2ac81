use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::{
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        product_variants::{Column as VariantCol, Entity as ProductVariants},
        products::{Column as ProdCol, Entity as Products},
    },
    error::AppResult,
};

/// Rewrite a product's aggregate stock as the sum of its variants' stock.
/// Must run inside the same transaction as the variant mutation it follows.
pub async fn recompute_aggregate<C: ConnectionTrait>(conn: &C, product_id: Uuid) -> AppResult<()> {
    let variants = ProductVariants::find()
        .filter(VariantCol::ProductId.eq(product_id))
        .all(conn)
        .await?;
    let total: i32 = variants.iter().map(|v| v.stock).sum();

    Products::update_many()
        .col_expr(ProdCol::Stock, Expr::value(total))
        .filter(ProdCol::Id.eq(product_id))
        .exec(conn)
        .await?;

    Ok(())
}

/// Put an order's quantities back onto their variants and recompute each
/// touched product's aggregate. Items whose variant was deleted since the
/// order was placed are skipped; there is nothing left to restore.
pub async fn restore_order_stock<C: ConnectionTrait>(conn: &C, order_id: Uuid) -> AppResult<()> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .all(conn)
        .await?;

    let mut touched: Vec<Uuid> = Vec::new();
    for item in items {
        let Some(variant_id) = item.product_variant_id else {
            continue;
        };
        ProductVariants::update_many()
            .col_expr(
                VariantCol::Stock,
                Expr::col(VariantCol::Stock).add(item.quantity),
            )
            .filter(VariantCol::Id.eq(variant_id))
            .exec(conn)
            .await?;

        if let Some(product_id) = item.product_id
            && !touched.contains(&product_id)
        {
            touched.push(product_id);
        }
    }

    for product_id in touched {
        recompute_aggregate(conn, product_id).await?;
    }

    Ok(())
}
