// src/routes.rs

use std::sync::Arc;

use axum::{
    Router, http::Method, middleware,
    routing::{get, post, put},
};
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, quiz},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, quizzes, admin, subscribe).
/// * Applies global middleware (Trace, CORS) and rate limiting on auth.
/// * Injects global state (Database Pool, Config, Mailer).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    // Keyed by peer IP; the server must be driven with ConnectInfo.
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(1)
        .burst_size(20)
        .finish()
        .unwrap();

    let governor_conf = Arc::new(governor_conf);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route(
            "/send-verification-code",
            get(auth::send_verification_code).post(auth::send_verification_code),
        )
        .route("/verify-and-register", post(auth::verify_and_register))
        .layer(GovernorLayer::new(governor_conf));

    let quiz_routes = Router::new()
        .route("/", get(quiz::list_quizzes))
        .route("/leaderboard", get(quiz::get_leaderboard))
        // Protected quiz routes
        .merge(
            Router::new()
                .route("/create", post(quiz::create_quiz))
                .route("/get/{quiz_id}", post(quiz::take_quiz))
                .route("/submit", post(quiz::submit_quiz))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users))
        .route(
            "/users/{id}",
            get(admin::get_user)
                .put(admin::update_user)
                .delete(admin::delete_user),
        )
        .route("/promote/{id}", put(admin::promote_user))
        .route("/demote/{id}", put(admin::demote_user))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/quizzes", quiz_routes)
        .nest("/api/admin", admin_routes)
        .route("/api/subscribe", post(auth::subscribe))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
