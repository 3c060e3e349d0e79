// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{actions, auth, news, quiz, users},
    models::role::Permissions,
    state::AppState,
    utils::jwt::{auth_middleware, require_permission},
};

/// Assembles the main application router.
///
/// * Public: registration, login, reading news.
/// * Authenticated: everything else; management routes additionally
///   require a permission bit.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .merge(
            Router::new()
                .route("/me", get(auth::me))
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let news_routes = Router::new()
        .route("/", get(news::list_news))
        .route("/{id}", get(news::get_news))
        .merge(
            Router::new()
                .route("/", post(news::create_news))
                .route("/{id}", put(news::update_news).delete(news::delete_news))
                // Auth first, then the permission check
                .route_layer(middleware::from_fn_with_state(
                    Permissions::MANAGE_NEWS,
                    require_permission,
                ))
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let quiz_routes = Router::new()
        .route("/", get(quiz::list_quizzes))
        .route("/categories", get(quiz::list_categories))
        .route("/participate", post(quiz::submit))
        .route("/{id}/participate", get(quiz::participate))
        .route("/{id}/result", get(quiz::result))
        .merge(
            Router::new()
                .route("/", post(quiz::create_quiz))
                .route("/{id}", delete(quiz::delete_quiz))
                .route_layer(middleware::from_fn_with_state(
                    Permissions::MANAGE_QUIZZES,
                    require_permission,
                )),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .merge(
            Router::new()
                .route("/api/users", get(users::list_users))
                .route(
                    "/api/users/{id}",
                    get(users::get_user)
                        .put(users::update_user)
                        .delete(users::delete_user),
                )
                .route("/api/roles", get(users::list_roles))
                .route_layer(middleware::from_fn_with_state(
                    Permissions::MANAGE_USERS,
                    require_permission,
                )),
        )
        .merge(
            Router::new()
                .route("/api/actions", get(actions::list_actions))
                .route_layer(middleware::from_fn_with_state(
                    Permissions::VIEW_ACTIONS,
                    require_permission,
                )),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/news", news_routes)
        .nest("/api/quiz", quiz_routes)
        .merge(admin_routes)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
