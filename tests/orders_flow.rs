use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use uuid::Uuid;

use storefront_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::{
        addresses::SaveAddressRequest,
        cart::AddToCartRequest,
        orders::{CardConfirmation, CheckoutRequest, ShippingSource},
        products::{CreateProductRequest, CreateVariantRequest, UpdateProductRequest, UpdateVariantRequest},
    },
    entity::users::ActiveModel as UserActive,
    error::AppError,
    middleware::auth::AuthUser,
    models::{OrderStatus, PaymentMethod, PaymentStatus, Product, ProductVariant},
    routes::admin::{LowStockQuery, UpdateOrderStatusRequest},
    routes::params::Pagination,
    services::{
        address_service, admin_service, cart_service, order_service, payment_service::StripeClient,
        product_service,
    },
    state::AppState,
};

// Full storefront flow: admin builds the catalog, a customer checks out,
// cancels, and the admin walks other orders through the lifecycle. Covers the
// stock-reconciliation invariants end to end.
#[tokio::test]
async fn checkout_and_lifecycle_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
                );
                return Ok(());
            }
        };

    let state = setup_state(&database_url).await?;

    let user_id = create_user(&state, "user", "user@example.com").await?;
    let admin_id = create_user(&state, "admin", "admin@example.com").await?;
    let auth_user = AuthUser {
        user_id,
        role: "user".into(),
    };
    let auth_admin = AuthUser {
        user_id: admin_id,
        role: "admin".into(),
    };

    // Catalog: one product, two variants. Aggregate stock must track the sum.
    let product = product_service::create_product(
        &state,
        &auth_admin,
        CreateProductRequest {
            name: "Test Hoodie".into(),
            description: Some("A hoodie for testing".into()),
            price: 1000,
            category: "apparel".into(),
            image_url: None,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(product.stock, 0);

    let variant_a = product_service::create_variant(
        &state,
        &auth_admin,
        product.id,
        CreateVariantRequest {
            color: "red".into(),
            size: "M".into(),
            stock: 5,
            image_url: None,
        },
    )
    .await?
    .data
    .unwrap();
    let variant_b = product_service::create_variant(
        &state,
        &auth_admin,
        product.id,
        CreateVariantRequest {
            color: "blue".into(),
            size: "L".into(),
            stock: 4,
            image_url: None,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(fetch_product(&state, product.id).await?.stock, 9);

    // Empty cart: rejected before any side effect.
    let err = order_service::checkout(&state, &auth_user, cod_checkout())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(ref msg) if msg.contains("Cart is empty")));

    // Shortfall: quantity passes the cart check, then stock drops before
    // checkout. The whole operation must abort with nothing mutated.
    cart_service::add_to_cart(
        &state.pool,
        &auth_user,
        AddToCartRequest {
            product_variant_id: variant_a.id,
            quantity: 2,
        },
    )
    .await?;
    cart_service::add_to_cart(
        &state.pool,
        &auth_user,
        AddToCartRequest {
            product_variant_id: variant_b.id,
            quantity: 4,
        },
    )
    .await?;
    set_variant_stock(&state, &auth_admin, variant_b.id, 1).await?;

    let err = order_service::checkout(&state, &auth_user, cod_checkout())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(ref msg) if msg.contains("Insufficient stock")));
    assert_eq!(fetch_variant(&state, product.id, variant_a.id).await?.stock, 5);
    assert_eq!(fetch_variant(&state, product.id, variant_b.id).await?.stock, 1);
    let orders = order_service::list_orders(&state, &auth_user, Default::default()).await?;
    assert!(orders.data.unwrap().items.is_empty());

    cart_service::remove_from_cart(&state.pool, &auth_user, variant_b.id).await?;
    set_variant_stock(&state, &auth_admin, variant_b.id, 4).await?;

    // Happy path: cod checkout with an inline shipping snapshot.
    let detail = order_service::checkout(&state, &auth_user, cod_checkout())
        .await?
        .data
        .unwrap();
    assert_eq!(detail.order.total_amount, 2000);
    assert_eq!(detail.order.status, OrderStatus::Processing);
    assert_eq!(detail.order.payment_status, PaymentStatus::Pending);
    assert_eq!(detail.order.shipping_city.as_deref(), Some("Springfield"));
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].quantity, 2);
    assert_eq!(detail.items[0].price, 1000);
    let payment = detail.payment.unwrap();
    assert_eq!(payment.amount, 2000);
    assert_eq!(payment.method, PaymentMethod::Cod);
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert!(payment.transaction_id.is_none());

    assert_eq!(fetch_variant(&state, product.id, variant_a.id).await?.stock, 3);
    assert_eq!(fetch_product(&state, product.id).await?.stock, 7);
    let cart = cart_service::list_cart(
        &state.pool,
        &auth_user,
        Pagination {
            page: None,
            per_page: None,
        },
    )
    .await?;
    assert!(cart.data.unwrap().items.is_empty());

    // Snapshot immutability: later catalog edits must not rewrite the order.
    product_service::update_product(
        &state,
        &auth_admin,
        product.id,
        UpdateProductRequest {
            name: Some("Renamed Hoodie".into()),
            description: None,
            price: Some(9999),
            category: None,
            image_url: None,
        },
    )
    .await?;
    let reloaded = order_service::get_order(&state, &auth_user, detail.order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(reloaded.items[0].name, "Test Hoodie");
    assert_eq!(reloaded.items[0].price, 1000);
    assert_eq!(reloaded.order.total_amount, 2000);

    // Customer cancel from processing restores stock; a second cancel fails.
    let cancelled = order_service::cancel_order(&state, &auth_user, detail.order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(fetch_variant(&state, product.id, variant_a.id).await?.stock, 5);
    assert_eq!(fetch_product(&state, product.id).await?.stock, 9);

    let err = order_service::cancel_order(&state, &auth_user, detail.order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(ref msg) if msg.contains("already cancelled")));

    // Card checkout with a succeeded confirmation is born paid.
    cart_service::add_to_cart(
        &state.pool,
        &auth_user,
        AddToCartRequest {
            product_variant_id: variant_a.id,
            quantity: 1,
        },
    )
    .await?;
    let card_order = order_service::checkout(
        &state,
        &auth_user,
        CheckoutRequest {
            payment_method: PaymentMethod::Card,
            shipping: ShippingSource::None,
            card_confirmation: Some(CardConfirmation {
                transaction_id: "pi_test_123".into(),
                status: "succeeded".into(),
            }),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(card_order.order.payment_status, PaymentStatus::Paid);
    assert_eq!(
        card_order.payment.unwrap().transaction_id.as_deref(),
        Some("pi_test_123")
    );
    assert_eq!(fetch_variant(&state, product.id, variant_a.id).await?.stock, 4);

    // Admin moves it to shipping (legacy spelling accepted), then cancels.
    // Cancelling from shipping must NOT restore stock.
    let shipped = admin_service::update_order_status(
        &state,
        &auth_admin,
        card_order.order.id,
        UpdateOrderStatusRequest {
            status: "shipped".into(),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(shipped.status, OrderStatus::Shipping);

    let admin_cancelled = admin_service::update_order_status(
        &state,
        &auth_admin,
        card_order.order.id,
        UpdateOrderStatusRequest {
            status: "cancelled".into(),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(admin_cancelled.status, OrderStatus::Cancelled);
    assert_eq!(fetch_variant(&state, product.id, variant_a.id).await?.stock, 4);
    assert_eq!(fetch_product(&state, product.id).await?.stock, 8);

    // Deleting a processing order restores stock first.
    cart_service::add_to_cart(
        &state.pool,
        &auth_user,
        AddToCartRequest {
            product_variant_id: variant_a.id,
            quantity: 1,
        },
    )
    .await?;
    let doomed = order_service::checkout(&state, &auth_user, cod_checkout())
        .await?
        .data
        .unwrap();
    assert_eq!(fetch_variant(&state, product.id, variant_a.id).await?.stock, 3);
    admin_service::delete_order(&state, &auth_admin, doomed.order.id).await?;
    assert_eq!(fetch_variant(&state, product.id, variant_a.id).await?.stock, 4);
    let err = order_service::get_order(&state, &auth_user, doomed.order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    // Saved-address checkout copies the snapshot from the stored row.
    let address = address_service::create_address(
        &state,
        &auth_user,
        SaveAddressRequest {
            label: "Home".into(),
            full_name: "Jamie Doe".into(),
            phone: "08123".into(),
            address_line: "1 Main St".into(),
            city: "Shelbyville".into(),
            province: "Central".into(),
            postal_code: "54321".into(),
        },
    )
    .await?
    .data
    .unwrap();
    cart_service::add_to_cart(
        &state.pool,
        &auth_user,
        AddToCartRequest {
            product_variant_id: variant_b.id,
            quantity: 1,
        },
    )
    .await?;
    let saved_order = order_service::checkout(
        &state,
        &auth_user,
        CheckoutRequest {
            payment_method: PaymentMethod::Cod,
            shipping: ShippingSource::SavedAddress {
                address_id: address.id,
            },
            card_confirmation: None,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(saved_order.order.shipping_city.as_deref(), Some("Shelbyville"));
    assert_eq!(
        saved_order.order.shipping_full_name.as_deref(),
        Some("Jamie Doe")
    );

    // Delivered is terminal: no cancel, no going back.
    admin_service::update_order_status(
        &state,
        &auth_admin,
        saved_order.order.id,
        UpdateOrderStatusRequest {
            status: "shipping".into(),
        },
    )
    .await?;
    admin_service::update_order_status(
        &state,
        &auth_admin,
        saved_order.order.id,
        UpdateOrderStatusRequest {
            status: "delivered".into(),
        },
    )
    .await?;
    let err = admin_service::update_order_status(
        &state,
        &auth_admin,
        saved_order.order.id,
        UpdateOrderStatusRequest {
            status: "cancelled".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // Low stock reflects the aggregate after everything above.
    let low = admin_service::list_low_stock(
        &state,
        &auth_admin,
        LowStockQuery {
            pagination: Pagination {
                page: Some(1),
                per_page: Some(20),
            },
            threshold: Some(10),
        },
    )
    .await?;
    assert!(
        low.data.unwrap().items.iter().any(|p| p.id == product.id),
        "expected product to appear in low-stock list"
    );

    // Concurrent checkouts over overlapping variants serialize on the
    // variant locks; the loser gets a stock error, never a database error.
    let rival_id = create_user(&state, "user", "rival@example.com").await?;
    let auth_rival = AuthUser {
        user_id: rival_id,
        role: "user".into(),
    };

    let contested = product_service::create_product(
        &state,
        &auth_admin,
        CreateProductRequest {
            name: "Test Cap".into(),
            description: None,
            price: 500,
            category: "apparel".into(),
            image_url: None,
        },
    )
    .await?
    .data
    .unwrap();
    let variant_c = product_service::create_variant(
        &state,
        &auth_admin,
        contested.id,
        CreateVariantRequest {
            color: "green".into(),
            size: "S".into(),
            stock: 5,
            image_url: None,
        },
    )
    .await?
    .data
    .unwrap();
    let variant_d = product_service::create_variant(
        &state,
        &auth_admin,
        contested.id,
        CreateVariantRequest {
            color: "green".into(),
            size: "M".into(),
            stock: 5,
            image_url: None,
        },
    )
    .await?
    .data
    .unwrap();

    // Carts filled in opposite order.
    for (who, ids) in [
        (&auth_user, [variant_c.id, variant_d.id]),
        (&auth_rival, [variant_d.id, variant_c.id]),
    ] {
        for id in ids {
            cart_service::add_to_cart(
                &state.pool,
                who,
                AddToCartRequest {
                    product_variant_id: id,
                    quantity: 3,
                },
            )
            .await?;
        }
    }

    let (first, second) = tokio::join!(
        order_service::checkout(&state, &auth_user, cod_checkout()),
        order_service::checkout(&state, &auth_rival, cod_checkout()),
    );
    let winners = [first, second]
        .into_iter()
        .filter(|result| match result {
            Ok(_) => true,
            Err(AppError::BadRequest(msg)) => {
                assert!(msg.contains("Insufficient stock"));
                false
            }
            Err(other) => panic!("unexpected checkout error: {other}"),
        })
        .count();
    assert_eq!(winners, 1);
    assert_eq!(
        fetch_variant(&state, contested.id, variant_c.id).await?.stock,
        2
    );
    assert_eq!(
        fetch_variant(&state, contested.id, variant_d.id).await?.stock,
        2
    );
    assert_eq!(fetch_product(&state, contested.id).await?.stock, 4);

    Ok(())
}

fn cod_checkout() -> CheckoutRequest {
    CheckoutRequest {
        payment_method: PaymentMethod::Cod,
        shipping: ShippingSource::Inline {
            full_name: "Jamie Doe".into(),
            phone: "08123".into(),
            address_line: "1 Main St".into(),
            city: "Springfield".into(),
            province: "Central".into(),
            postal_code: "12345".into(),
        },
        card_confirmation: None,
    }
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE payments, order_items, orders, cart_items, product_reviews, user_addresses, product_variants, products, audit_logs, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(AppState {
        pool,
        orm,
        stripe: StripeClient::new(None, "http://127.0.0.1:1"),
    })
}

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        role: Set(role.into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}

async fn fetch_product(state: &AppState, id: Uuid) -> anyhow::Result<Product> {
    Ok(product_service::get_product(state, id)
        .await?
        .data
        .unwrap()
        .product)
}

async fn fetch_variant(
    state: &AppState,
    product_id: Uuid,
    variant_id: Uuid,
) -> anyhow::Result<ProductVariant> {
    let detail = product_service::get_product(state, product_id)
        .await?
        .data
        .unwrap();
    detail
        .variants
        .into_iter()
        .find(|v| v.id == variant_id)
        .ok_or_else(|| anyhow::anyhow!("variant not found"))
}

async fn set_variant_stock(
    state: &AppState,
    admin: &AuthUser,
    variant_id: Uuid,
    stock: i32,
) -> anyhow::Result<()> {
    product_service::update_variant(
        state,
        admin,
        variant_id,
        UpdateVariantRequest {
            color: None,
            size: None,
            stock: Some(stock),
            image_url: None,
        },
    )
    .await?;
    Ok(())
}
