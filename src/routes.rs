// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::Config,
    handlers::{admin, auth, cart, order, product, profile, review, superadmin, webhook},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware, superadmin_middleware},
};

/// CORS for the configured storefront and admin origins. Credentials are
/// allowed so the session cookie travels with requests.
fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Assembles the main application router.
///
/// * Nests one sub-router per module under `/api`.
/// * Applies global middleware (Trace, CORS).
/// * Injects the shared `AppState`.
pub fn create_router(state: AppState) -> Router {
    let require_auth = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/admin/login", post(auth::admin_login))
        .route("/google", post(auth::google_login))
        .route("/logout", post(auth::logout))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        .route("/me", get(auth::me).route_layer(require_auth.clone()));

    // Browsing is public; writing reviews needs a session.
    let product_routes = Router::new()
        .route("/", get(product::list_products))
        .route("/{id}", get(product::get_product))
        .route(
            "/{id}/reviews",
            get(product::list_reviews)
                .merge(post(review::create_review).route_layer(require_auth.clone())),
        )
        .route(
            "/{id}/reviews/{review_id}",
            put(review::update_review)
                .delete(review::delete_review)
                .route_layer(require_auth.clone()),
        );

    let cart_routes = Router::new()
        .route("/", get(cart::get_cart).delete(cart::clear))
        .route("/add", post(cart::add_to_cart))
        .route("/update", put(cart::update_cart))
        .route("/{product_id}/{size}", delete(cart::remove_item))
        .route_layer(require_auth.clone());

    let order_routes = Router::new()
        .route("/", get(order::list_my_orders))
        .route("/{id}", get(order::get_my_order))
        .route("/cod", post(order::place_cod))
        .route("/razorpay", post(order::place_razorpay))
        .route("/razorpay/verify", post(order::verify_razorpay))
        .route_layer(require_auth.clone());

    let profile_routes = Router::new()
        .route("/", get(profile::get_profile).put(profile::update_profile))
        .route("/password", put(profile::change_password))
        .route(
            "/addresses",
            get(profile::list_addresses).post(profile::add_address),
        )
        .route(
            "/addresses/{id}",
            put(profile::update_address).delete(profile::delete_address),
        )
        .route("/addresses/{id}/default", put(profile::set_default_address))
        .route_layer(require_auth.clone());

    let admin_routes = Router::new()
        .route("/products", post(admin::create_product))
        .route(
            "/products/{id}",
            put(admin::update_product).delete(admin::delete_product),
        )
        .route("/products/{id}/inventory", put(admin::update_inventory))
        .route("/orders", get(admin::list_orders))
        .route("/orders/{id}/status", put(admin::update_order_status))
        .route("/users", get(admin::list_users))
        .route("/dashboard", get(admin::dashboard))
        // Double middleware protection: Auth first, then Admin check
        .route_layer(middleware::from_fn(admin_middleware))
        .route_layer(require_auth.clone());

    let superadmin_routes = Router::new()
        .route(
            "/users",
            get(admin::list_users).post(superadmin::create_user),
        )
        .route("/users/{id}", delete(superadmin::delete_user))
        .route("/users/{id}/role", put(superadmin::update_role))
        .route("/users/{id}/status", put(superadmin::update_status))
        .route_layer(middleware::from_fn(superadmin_middleware))
        .route_layer(require_auth);

    let cors = cors_layer(&state.config);

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/products", product_routes)
        .nest("/api/cart", cart_routes)
        .nest("/api/orders", order_routes)
        .nest("/api/profile", profile_routes)
        .nest("/api/admin", admin_routes)
        .nest("/api/superadmin", superadmin_routes)
        // Verified by signature, not by session.
        .route("/api/webhook/razorpay", post(webhook::razorpay_webhook))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
