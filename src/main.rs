use axum::{
    extract::ConnectInfo,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use axum_prometheus::PrometheusMetricLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use postflow_server::config::Config;
use postflow_server::notifications::email::SmtpEmailSender;
use postflow_server::notifications::i18n::EnglishTranslator;
use postflow_server::notifications::push::HttpPushProxyClient;
use postflow_server::notifications::NotificationDispatcher;
use postflow_server::posts::cache::ChannelPostCache;
use postflow_server::posts::PostService;
use postflow_server::state::AppState;
use postflow_server::store::pg::PgStore;
use postflow_server::webhooks::WebhookDispatcher;
use postflow_server::websocket::{ConnectionManager, GatewayEventBus};
use postflow_server::{db, handlers, websocket};

/// Restricts `/metrics` to loopback connections only.
async fn require_loopback(
    connect_info: Option<ConnectInfo<SocketAddr>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    match connect_info {
        Some(ConnectInfo(addr)) if addr.ip().is_loopback() => next.run(req).await,
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "postflow_server=info,tower_http=info,sqlx=warn"
            .parse()
            .unwrap()
    });

    if std::env::var("APP_ENV").as_deref() == Ok("production") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Postflow server starting...");

    let config = Config::from_env().expect("failed to load configuration");
    info!("configuration loaded");

    let pool = db::create_pool(&config.database_url)
        .await
        .expect("failed to create database pool");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run database migrations");
    info!("database migrations applied");

    db::health_check(&pool)
        .await
        .expect("database health check failed");
    info!("database health check passed");

    let cors = if config.is_dev {
        info!("CORS: permissive (dev mode)");
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        if origins.is_empty() {
            tracing::warn!(
                "CORS: no ALLOWED_ORIGINS configured — all cross-origin requests will be denied"
            );
        } else {
            info!("CORS: production mode, allowing origins: {:?}", config.allowed_origins);
        }
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
    };

    let addr = config.server_addr();
    let config = Arc::new(config);

    let http_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .danger_accept_invalid_certs(config.enable_insecure_outgoing_connections)
        .build()
        .expect("failed to build HTTP client");

    let store: Arc<dyn postflow_server::store::StoreFacade> = Arc::new(PgStore::new(pool.clone()));
    let connections = ConnectionManager::new();
    let events: Arc<dyn postflow_server::events::EventBus> =
        Arc::new(GatewayEventBus::new(connections.clone(), store.clone()));
    let cache: Arc<dyn postflow_server::posts::cache::ChannelCacheInvalidator> =
        Arc::new(ChannelPostCache::new());

    let email_sender = SmtpEmailSender::new(&config.smtp).expect("failed to build SMTP transport");
    let push_client = HttpPushProxyClient::new(http_client.clone(), config.push_notification_server.clone());
    let translator = EnglishTranslator;

    let notifications = Arc::new(NotificationDispatcher::new(
        store.clone(),
        events.clone(),
        Arc::new(email_sender),
        Arc::new(push_client),
        Arc::new(translator),
        config.clone(),
    ));

    let webhooks = Arc::new(WebhookDispatcher::new(
        store.clone(),
        cache.clone(),
        notifications.clone(),
        http_client.clone(),
        config.clone(),
    ));

    let posts = Arc::new(PostService::new(
        store.clone(),
        events.clone(),
        cache.clone(),
        notifications.clone(),
        webhooks.clone(),
    ));

    let app_state = AppState {
        pool,
        config: config.clone(),
        connections,
        store,
        events,
        cache,
        posts,
        notifications,
        webhooks,
        http_client,
    };

    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    // Global limit: 10 requests/second per IP, burst of 20.
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .finish()
            .expect("invalid global governor configuration"),
    );

    // Stricter limit for authentication endpoints: 2 requests/second per IP, burst of 5.
    let auth_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(2)
            .burst_size(5)
            .finish()
            .expect("invalid auth governor configuration"),
    );

    let auth_router = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/logout", post(handlers::auth::logout))
        .route_layer(GovernorLayer {
            config: auth_governor_conf,
        });

    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(move || async move { metric_handle.render() })
                .route_layer(middleware::from_fn(require_loopback)),
        )
        .merge(auth_router)
        .route(
            "/teams/:team_id/channels/:channel_id/posts/create",
            post(handlers::posts::create),
        )
        .route(
            "/teams/:team_id/channels/:channel_id/posts/update",
            post(handlers::posts::update),
        )
        .route(
            "/teams/:team_id/channels/:channel_id/posts/page/:offset/:limit",
            get(handlers::posts::page),
        )
        .route(
            "/teams/:team_id/channels/:channel_id/posts/since/:time_ms",
            get(handlers::posts::since),
        )
        .route(
            "/teams/:team_id/channels/:channel_id/posts/:id/get",
            get(handlers::posts::get),
        )
        .route(
            "/teams/:team_id/channels/:channel_id/posts/:id/delete",
            post(handlers::posts::delete),
        )
        .route(
            "/teams/:team_id/channels/:channel_id/posts/:id/before/:offset/:limit",
            get(handlers::posts::before),
        )
        .route(
            "/teams/:team_id/channels/:channel_id/posts/:id/after/:offset/:limit",
            get(handlers::posts::after),
        )
        .route(
            "/teams/:team_id/channels/:channel_id/posts/:id/get_file_infos",
            get(handlers::posts::file_infos),
        )
        .route("/teams/:team_id/posts/search", post(handlers::posts::search))
        .route(
            "/teams/:team_id/posts/flagged/:offset/:limit",
            get(handlers::posts::flagged),
        )
        .route("/teams/:team_id/posts/:id", get(handlers::posts::get_in_team))
        .route("/teams/:team_id/pltmp/:id", get(handlers::posts::permalink))
        // WebSocket gateway
        .route("/ws", get(websocket::websocket_handler))
        .layer(GovernorLayer {
            config: governor_conf,
        })
        .layer(SetResponseHeaderLayer::if_not_present(
            header::HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(prometheus_layer)
        .layer(cors)
        .with_state(app_state);

    info!("server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server failed to start");
}
