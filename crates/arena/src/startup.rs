use crate::{
    api::routes::{
        award_rewards, cancel_challenge, create_challenge, create_team, get_achievements,
        get_challenge, get_challenges, get_leaderboard, get_team_leaderboard,
        get_user_challenges, health, join_challenge, leave_challenge, record_activity,
        update_progress,
    },
    config::{Settings, StorageBackend},
    domain::{
        ChallengeEngine, ChallengeRepository, ChallengeStore, ChallengeWatcher, LeaderboardRanker,
        SqliteChallengeRepository, SystemClock,
    },
    infra::{
        db::{DBConnection, DatabasePoolConfig},
        file_utils::create_folder,
        MemoryChallengeRepository,
    },
};
use anyhow::anyhow;
use axum::{
    body::Body,
    extract::{connect_info::IntoMakeServiceWithConnectInfo, ConnectInfo, Request},
    http::HeaderValue,
    middleware::{self, AddExtension, Next},
    response::IntoResponse,
    routing::{get, post},
    serve::Serve,
    Router,
};
use hyper::{
    header::{ACCEPT, CONTENT_TYPE},
    Method,
};
use log::{error, info, warn};
use std::{collections::HashMap, net::SocketAddr, str::FromStr, sync::Arc, time::Duration};
use tokio::signal::unix::{signal, SignalKind};
use tokio::{net::TcpListener, select, task::JoinHandle};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower_http::cors::{AllowOrigin, CorsLayer};

pub struct Application {
    server: Serve<
        TcpListener,
        IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
        AddExtension<Router, ConnectInfo<SocketAddr>>,
    >,
    cancellation_token: CancellationToken,
    background_tasks: TaskTracker,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, anyhow::Error> {
        let address = format!(
            "{}:{}",
            config.api_settings.domain, config.api_settings.port
        );
        let listener = SocketAddr::from_str(&address)?;
        let (app_state, background_tasks, cancellation_token) = build_app(config.clone()).await?;
        let server = build_server(listener, app_state, config.api_settings.origins).await?;
        Ok(Self {
            server,
            cancellation_token,
            background_tasks,
        })
    }

    pub async fn run_until_stopped(self) -> Result<(), anyhow::Error> {
        info!("Starting server...");
        match self.server.with_graceful_shutdown(shutdown_signal()).await {
            Ok(_) => {
                info!("Server shutdown initiated");
                self.cancellation_token.cancel();

                let timeout = tokio::time::sleep(Duration::from_secs(10));
                select! {
                    _ = self.background_tasks.wait() => {
                        info!("Background tasks completed gracefully");
                    }
                    _ = timeout => {
                        warn!("Background tasks timed out during shutdown");
                    }
                }

                info!("Shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!("Server shutdown error: {}", e);
                self.cancellation_token.cancel();

                let _ =
                    tokio::time::timeout(Duration::from_secs(5), self.background_tasks.wait())
                        .await;

                Err(anyhow!("Error during server shutdown: {}", e))
            }
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ChallengeEngine>,
    pub background_threads: Arc<HashMap<String, JoinHandle<()>>>,
}

impl AppState {
    pub fn new(
        engine: Arc<ChallengeEngine>,
        background_threads: HashMap<String, JoinHandle<()>>,
    ) -> Self {
        Self {
            engine,
            background_threads: Arc::new(background_threads),
        }
    }
}

async fn build_repository(
    config: &Settings,
) -> Result<Arc<dyn ChallengeRepository>, anyhow::Error> {
    match config.engine_settings.storage {
        StorageBackend::Memory => {
            warn!("Using in-memory challenge storage, nothing will survive a restart");
            Ok(Arc::new(MemoryChallengeRepository::new()))
        }
        StorageBackend::Sqlite => {
            create_folder(&config.db_settings.data_folder)
                .map_err(|e| anyhow!("Error creating data folder: {}", e))?;

            let pool_config: DatabasePoolConfig = config.db_settings.clone().into();
            let challenges_db = DBConnection::new(
                &config.db_settings.data_folder,
                &config.db_settings.database_name,
                pool_config,
            )
            .await
            .map_err(|e| anyhow!("Error setting up challenges db: {}", e))?;

            info!(
                "Challenge database ready at {}",
                challenges_db.database_path
            );
            Ok(Arc::new(SqliteChallengeRepository::new(challenges_db)))
        }
    }
}

pub async fn build_app(
    config: Settings,
) -> Result<(AppState, TaskTracker, CancellationToken), anyhow::Error> {
    let repository = build_repository(&config).await?;
    let store = Arc::new(ChallengeStore::new(repository));
    let engine_settings = config.engine_settings;

    let engine = Arc::new(ChallengeEngine::new(
        store,
        LeaderboardRanker::new(engine_settings.leaderboard_batch_size),
        Arc::new(SystemClock),
        engine_settings.metric_mappings,
    ));
    engine.ping().await?;
    info!("Challenge engine configured");

    let tracker = TaskTracker::new();
    let mut threads = HashMap::new();
    let cancel_token = CancellationToken::new();

    let challenge_watcher = ChallengeWatcher::new(
        engine.clone(),
        cancel_token.clone(),
        Duration::from_secs(engine_settings.finalize_interval_secs.max(1)),
    );
    let challenge_watcher_task = tracker.spawn(async move {
        match challenge_watcher.watch().await {
            Ok(_) => {
                info!("Successfully shutdown challenge watcher")
            }
            Err(e) => {
                error!("Error in challenge watcher: {}", e)
            }
        }
    });
    tracker.close();
    threads.insert(String::from("challenge_watcher"), challenge_watcher_task);

    Ok((AppState::new(engine, threads), tracker, cancel_token))
}

pub async fn build_server(
    socket_addr: SocketAddr,
    app_state: AppState,
    origins: Vec<String>,
) -> Result<
    Serve<
        TcpListener,
        IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
        AddExtension<Router, ConnectInfo<SocketAddr>>,
    >,
    anyhow::Error,
> {
    let listener = TcpListener::bind(socket_addr).await?;

    info!("Setting up service");
    let app = app(app_state, origins);
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    info!(
        "Service running @: http://{}:{}",
        socket_addr.ip(),
        socket_addr.port()
    );
    Ok(server)
}

pub fn app(app_state: AppState, origins: Vec<String>) -> Router {
    let origins: Vec<HeaderValue> = origins
        .into_iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .allow_origin(AllowOrigin::list(origins));

    let challenge_endpoints = Router::new()
        .route("/", post(create_challenge).get(get_challenges))
        .route("/{challenge_id}", get(get_challenge))
        .route(
            "/{challenge_id}/teams",
            post(create_team).get(get_team_leaderboard),
        )
        .route("/{challenge_id}/join", post(join_challenge))
        .route("/{challenge_id}/leave", post(leave_challenge))
        .route("/{challenge_id}/cancel", post(cancel_challenge))
        .route("/{challenge_id}/progress", post(update_progress))
        .route("/{challenge_id}/rewards/{user_id}", post(award_rewards))
        .route("/{challenge_id}/leaderboard", get(get_leaderboard));

    let users_endpoints = Router::new()
        .route("/{user_id}/challenges", get(get_user_challenges))
        .route("/{user_id}/achievements", get(get_achievements));

    Router::new()
        .route("/api/v1/health_check", get(health))
        .route("/api/v1/activity", post(record_activity))
        .nest("/api/v1/challenges", challenge_endpoints)
        .nest("/api/v1/users", users_endpoints)
        .layer(middleware::from_fn(log_request))
        .with_state(Arc::new(app_state))
        .layer(cors)
}

async fn log_request(request: Request<Body>, next: Next) -> impl IntoResponse {
    let now = time::OffsetDateTime::now_utc();
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or_default()
        .to_string();
    info!(target: "http_request", "new request, {} {}", request.method().as_str(), path);

    let response = next.run(request).await;
    let response_time = time::OffsetDateTime::now_utc() - now;
    info!(target: "http_response", "response, code: {}, time: {}", response.status().as_str(), response_time);

    response
}

async fn shutdown_signal() {
    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        (Err(e), _) | (_, Err(e)) => {
            error!("Failed to install signal handlers: {}", e);
            std::future::pending::<()>().await;
            return;
        }
    };

    select! {
        _ = sigint.recv() => info!("Received SIGINT signal"),
        _ = sigterm.recv() => info!("Received SIGTERM signal"),
    }
}
