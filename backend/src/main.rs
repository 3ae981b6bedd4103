//! Waste Collection Management Platform - Backend Server
//!
//! Back-office API for a waste-collection company: clients and contracts,
//! field agents and vehicles, collection rounds, invoices and payments.

use axum::{http::HeaderValue, routing::get, Router};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod handlers;
mod middleware;
mod routes;
mod services;

pub use config::Config;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "wcm_server=debug,tower_http=debug,sqlx=warn".into());
    let json_logs = std::env::var("WCM_LOG_FORMAT").is_ok_and(|f| f == "json");
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::load()?;

    tracing::info!("Starting Waste Collection Management Server");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.is_development() {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    // Create application state
    let state = AppState {
        db: db_pool,
        config: Arc::new(config.clone()),
    };

    // Build application
    let app = create_app(state);

    // Start server
    let host: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::from((host, config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes and middleware
fn create_app(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(if origins.is_empty() {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(origins)
        })
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Waste Collection Management Platform API v1.0"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use jsonwebtoken::{encode, EncodingKey, Header};
    use shared::models::UserType;
    use tower::ServiceExt;

    const SECRET: &str = "router-test-secret";

    fn test_state() -> AppState {
        let config = Config {
            environment: "test".to_string(),
            server: crate::config::ServerConfig {
                port: 0,
                host: "127.0.0.1".to_string(),
            },
            database: crate::config::DatabaseConfig {
                url: "postgres://localhost/wcm_test".to_string(),
                max_connections: 1,
                min_connections: 0,
            },
            jwt: crate::config::JwtConfig {
                secret: SECRET.to_string(),
                access_token_expiry: 3600,
                refresh_token_expiry: 604800,
            },
            billing: crate::config::BillingConfig {
                default_tax_rate: rust_decimal::Decimal::new(1800, 2),
                due_days: 30,
                currency: "XOF".to_string(),
            },
            receipts: crate::config::ReceiptConfig {
                signing_secret: "receipt-secret".to_string(),
            },
            cors: crate::config::CorsConfig {
                allowed_origins: vec![],
            },
        };
        // Lazy pool: nothing below reaches the database
        let db = PgPoolOptions::new()
            .connect_lazy(&config.database.url)
            .unwrap();
        AppState {
            db,
            config: Arc::new(config),
        }
    }

    fn bearer(user_type: UserType) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = services::auth::Claims {
            sub: uuid::Uuid::new_v4().to_string(),
            user_type,
            exp: now + 600,
            iat: now,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        format!("Bearer {}", token)
    }

    #[tokio::test]
    async fn test_protected_routes_require_a_token() {
        let app = create_app(test_state());
        let response = app
            .oneshot(Request::get("/api/v1/clients").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_garbage_token_is_rejected() {
        let app = create_app(test_state());
        let response = app
            .oneshot(
                Request::get("/api/v1/invoices")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_capability_denied_before_any_query() {
        let app = create_app(test_state());
        let response = app
            .oneshot(
                Request::get("/api/v1/users")
                    .header(header::AUTHORIZATION, bearer(UserType::Client))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_verify_token_endpoint() {
        let app = create_app(test_state());
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/auth/token/verify")
                    .header(header::AUTHORIZATION, bearer(UserType::Supervisor))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/auth/token/verify")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"token":"tampered"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
