//! Listener assembly: the `/ws` upgrade route, admission control, the
//! connection lifecycle around [`run_connection`], and graceful shutdown.

use std::{net::SocketAddr, sync::Arc, time::Instant};

use {
    axum::{
        Router,
        extract::{ConnectInfo, State, WebSocketUpgrade, ws::WebSocket},
        http::StatusCode,
        response::IntoResponse,
        routing::get,
    },
    tower_http::trace::TraceLayer,
    tracing::{info, warn},
};

use {whisper_protocol::ServerMessage, whisper_store::SessionStore};

use crate::{
    connection::{ConnectionHandle, Job, close_reasons, run_connection},
    state::GatewayState,
};

#[derive(Clone)]
struct AppState {
    gateway: Arc<GatewayState>,
    sessions: Arc<dyn SessionStore>,
    jobs: flume::Sender<Job>,
}

/// Build the gateway router. The WebSocket endpoint is the only surface;
/// health, metrics and the rest of the fleet plumbing live elsewhere.
pub fn router(
    gateway: Arc<GatewayState>,
    sessions: Arc<dyn SessionStore>,
    jobs: flume::Sender<Job>,
) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState {
            gateway,
            sessions,
            jobs,
        })
}

/// Bind and serve until the gateway's shutdown token fires, then drain.
pub async fn serve(
    gateway: Arc<GatewayState>,
    sessions: Arc<dyn SessionStore>,
    jobs: flume::Sender<Job>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&gateway.config.listen_addr).await?;
    info!(addr = %gateway.config.listen_addr, server = %gateway.server_name, "gateway listening");

    // Upgraded sockets keep axum's graceful shutdown waiting; close them
    // once the token fires so serve() can actually return.
    let drain_gateway = Arc::clone(&gateway);
    tokio::spawn(async move {
        drain_gateway.shutdown.cancelled().await;
        drain_connections(&drain_gateway).await;
    });

    let app = router(Arc::clone(&gateway), sessions, jobs)
        .into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(gateway.shutdown.clone().cancelled_owned())
        .await?;
    Ok(())
}

/// Fan the shutdown close out to every live connection and wait for the
/// directory to empty, up to the drain grace period.
pub async fn drain_connections(gateway: &GatewayState) {
    let connections = gateway.all_connections().await;
    info!(count = connections.len(), "closing live connections");
    for conn in connections {
        conn.close(close_reasons::SERVER_SHUTDOWN);
    }

    let drained = tokio::time::timeout(gateway.config.shutdown_grace(), async {
        while gateway.connection_count().await > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    })
    .await;
    if drained.is_err() {
        let remaining = gateway.connection_count().await;
        warn!(remaining, "drain deadline elapsed with connections still open");
    }
}

async fn ws_upgrade(
    State(app): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> axum::response::Response {
    // Admission: shed load before the upgrade, not after.
    if app.gateway.connection_count().await >= app.gateway.config.max_connections {
        warn!(remote = %remote, "connection cap reached, refusing socket");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, app, remote))
}

/// One task per accepted socket: create the session, register, announce,
/// run the loops, clean up. The disconnect callback fires exactly once, on
/// the way out, after the directory entry is gone.
async fn handle_socket(socket: WebSocket, app: AppState, remote: SocketAddr) {
    let sid = uuid::Uuid::new_v4().to_string();
    info!(%sid, remote = %remote, "ws: connection accepted");

    let create = tokio::time::timeout(
        app.gateway.config.store_op_timeout(),
        app.sessions.create(&sid),
    )
    .await;
    if !matches!(create, Ok(Ok(()))) {
        warn!(%sid, "session create failed, dropping socket");
        return;
    }

    let (handle, outbound_rx) = ConnectionHandle::new(sid.clone(), app.gateway.config.outbound_queue);
    app.gateway.register_connection(Arc::clone(&handle)).await;
    handle.write_message(ServerMessage::SessionCreated {
        session_id: sid.clone(),
    });

    let started = Instant::now();
    run_connection(
        socket,
        Arc::clone(&handle),
        outbound_rx,
        app.jobs.clone(),
        &app.gateway.config,
    )
    .await;

    app.gateway.remove_connection(&sid).await;
    app.gateway.notify_disconnect(&sid).await;

    info!(
        %sid,
        duration_secs = started.elapsed().as_secs(),
        reason = handle.close_reason().unwrap_or(close_reasons::PEER_CLOSED),
        "ws: connection closed"
    );
}
