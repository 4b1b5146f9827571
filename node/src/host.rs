use std::{
    convert::Infallible,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::IntoResponse,
    Router,
};
use tokio::{net::TcpListener, sync::Mutex};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use homenode_common::{
    render_status_page, AnalogSource, DisplayFrame, MatrixFrame, NodeAction, NodeEngine,
    ProximitySample, RangingMonitor, RangingTransition, RuntimeConfig, TelemetryReader,
    STATUS_PAGE_CONTENT_TYPE,
};

const STATUS_LOG_EVERY_TICKS: u64 = 50;
const DEFAULT_HTTP_PORT: u16 = 8080;

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<NodeEngine>>,
    telemetry: Arc<Mutex<TelemetryReader<SimulatedAdc>>>,
    outputs: Arc<Mutex<SimulatedOutputs>>,
}

#[derive(Debug, Default)]
struct SimulatedAdc {
    samples: u64,
}

impl AnalogSource for SimulatedAdc {
    type Error = Infallible;

    fn read_raw(&mut self) -> Result<u16, Self::Error> {
        self.samples = self.samples.wrapping_add(1);
        Ok(860 + (self.samples % 8) as u16 * 4)
    }
}

#[derive(Debug, Default)]
struct SimulatedSensors {
    tick: u64,
}

impl SimulatedSensors {
    fn sample(&mut self) -> ProximitySample {
        self.tick = self.tick.wrapping_add(1);

        // Hardware integration point:
        // the ESP32 build replaces this with the HC-SR04 and LDR reads.
        let distance_cm = if self.tick % 97 == 0 {
            None
        } else {
            Some(5.0 + (self.tick % 40) as f32)
        };
        let dark = (self.tick / 100) % 2 == 0;
        ProximitySample::new(distance_cm, dark)
    }
}

#[derive(Debug, Default)]
struct SimulatedOutputs {
    front_lights: Option<bool>,
    indicator: Option<bool>,
    matrix: Option<MatrixFrame>,
    display: Option<DisplayFrame>,
}

impl SimulatedOutputs {
    fn apply(&mut self, action: NodeAction) {
        match action {
            NodeAction::SetFrontLights(on) => {
                if self.front_lights.replace(on) != Some(on) {
                    info!("front lights {}", if on { "on" } else { "off" });
                }
            }
            NodeAction::SetIndicator(on) => {
                if self.indicator.replace(on) != Some(on) {
                    info!("indicator LED {}", if on { "on" } else { "off" });
                }
            }
            NodeAction::WriteMatrix(frame) => {
                if self.matrix.replace(frame) != Some(frame) {
                    info!("matrix rows {}", describe_rows(&frame));
                }
            }
            NodeAction::DrawDisplay(frame) => {
                if self.display.replace(frame) != Some(frame) {
                    let text: Vec<&str> = frame.lines().iter().map(|line| line.text).collect();
                    info!("display frame {} {:?}", frame.as_str(), text);
                }
            }
        }
    }
}

impl AppState {
    fn new(runtime: &RuntimeConfig) -> Self {
        Self {
            engine: Arc::new(Mutex::new(NodeEngine::new(runtime.node.clone()))),
            telemetry: Arc::new(Mutex::new(TelemetryReader::new(
                SimulatedAdc::default(),
                runtime.node.temperature,
            ))),
            outputs: Arc::new(Mutex::new(SimulatedOutputs::default())),
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var_os("HOMENODE_CONFIG").map(PathBuf::from);
    let file_config = load_runtime_config(config_path).await.unwrap_or_else(|err| {
        warn!("failed to load runtime config: {err:#}");
        None
    });
    let runtime = file_config.clone().unwrap_or_default();

    let app_state = AppState::new(&runtime);

    let boot_actions = { app_state.engine.lock().await.boot_actions() };
    execute_node_actions(&app_state, boot_actions).await;

    spawn_control_loop(app_state.clone(), runtime.node.loop_interval_ms);

    let app = build_router(app_state);

    let env_port = std::env::var("HOMENODE_HTTP_PORT").ok();
    let port = resolve_port(env_port.as_deref(), file_config.as_ref());
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind node server at {addr}"))?;

    info!("node simulator listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn build_router(app_state: AppState) -> Router {
    // Every path answers with the status page; routing happens on the path.
    Router::new()
        .fallback(handle_request)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

fn spawn_control_loop(app_state: AppState, interval_ms: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
        let mut sensors = SimulatedSensors::default();
        let mut ticks: u64 = 0;
        let mut ranging = RangingMonitor::default();

        loop {
            interval.tick().await;
            ticks = ticks.wrapping_add(1);
            let sample = sensors.sample();
            let failures = ranging.consecutive_failures();
            match ranging.observe(sample.distance_cm.is_some()) {
                Some(RangingTransition::Lost) => {
                    warn!("ultrasonic ranging timed out; treating as no reading");
                }
                Some(RangingTransition::Recovered) => {
                    info!("ultrasonic ranging recovered after {failures} failed reads");
                }
                None => {}
            }

            let status = {
                let mut engine = app_state.engine.lock().await;
                let actions = engine.tick(monotonic_ms(), sample);
                execute_node_actions(&app_state, actions).await;
                engine.status()
            };

            if ticks % STATUS_LOG_EVERY_TICKS == 0 {
                match serde_json::to_string(&status) {
                    Ok(body) => debug!("node status {body}"),
                    Err(err) => warn!("node status serialization failed: {err}"),
                }
            }
        }
    });
}

async fn execute_node_actions(app_state: &AppState, actions: Vec<NodeAction>) {
    let mut outputs = app_state.outputs.lock().await;
    for action in actions {
        outputs.apply(action);
    }
}

async fn handle_request(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
) -> impl IntoResponse {
    let path = uri.path();
    // The engine guard spans the output writes so a request never lands
    // inside a render cycle.
    let command = {
        let mut engine = state.engine.lock().await;
        let (command, actions) = engine.handle_request(method.as_str(), path);
        execute_node_actions(&state, actions).await;
        command
    };
    info!("request {method} {path} -> {}", command.as_str());

    let temperature_c = state.telemetry.lock().await.read_celsius().ok();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, STATUS_PAGE_CONTENT_TYPE)],
        render_status_page(temperature_c),
    )
}

async fn load_runtime_config(path: Option<PathBuf>) -> anyhow::Result<Option<RuntimeConfig>> {
    let Some(path) = path else {
        return Ok(None);
    };

    match tokio::fs::read(&path).await {
        Ok(raw) => RuntimeConfig::from_json(&raw)
            .map(Some)
            .with_context(|| format!("failed to parse {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!("config file {} not found, using defaults", path.display());
            Ok(None)
        }
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

fn resolve_port(env_port: Option<&str>, file_config: Option<&RuntimeConfig>) -> u16 {
    let from_env = env_port
        .and_then(|value| value.trim().parse::<u16>().ok())
        .filter(|port| *port != 0);

    from_env
        .or_else(|| file_config.map(|runtime| runtime.network.http_port))
        .unwrap_or(DEFAULT_HTTP_PORT)
}

fn describe_rows(frame: &MatrixFrame) -> String {
    frame
        .chunks(homenode_common::render::MATRIX_SIDE)
        .map(|row| if row.iter().any(|pixel| *pixel != 0) { '#' } else { '.' })
        .collect()
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use homenode_common::Flag;
    use tower::ServiceExt;

    use super::*;

    async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, String, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    fn test_state() -> AppState {
        AppState::new(&RuntimeConfig::default())
    }

    #[tokio::test]
    async fn sequential_toggles_over_http() {
        let state = test_state();
        let app = build_router(state.clone());

        for uri in [
            "/mudar_estado_luz_sala",
            "/mudar_estado_luz_sala",
            "/mudar_estado_luz_cozinha",
        ] {
            let (status, content_type, body) = send(&app, Method::GET, uri).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(content_type, "text/html");
            assert!(body.contains("Temperatura Interna:"));
        }

        let engine = state.engine.lock().await;
        for flag in Flag::ALL {
            assert_eq!(engine.state().get(flag), flag == Flag::Cozinha, "{flag:?}");
        }
    }

    #[tokio::test]
    async fn unknown_path_still_serves_page() {
        let state = test_state();
        let app = build_router(state.clone());

        let (status, _, body) = send(&app, Method::GET, "/favicon.ico").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.matches("<button>").count(), 6);
        assert_eq!(*state.engine.lock().await.state(), Default::default());
    }

    #[tokio::test]
    async fn form_query_string_still_toggles() {
        let state = test_state();
        let app = build_router(state.clone());

        send(&app, Method::GET, "/mudar_estado_display?").await;

        assert!(state.engine.lock().await.state().get(Flag::Display));
    }

    #[tokio::test]
    async fn non_get_requests_do_not_mutate() {
        let state = test_state();
        let app = build_router(state.clone());

        let (status, _, _) = send(&app, Method::POST, "/mudar_estado_luz_quarto").await;

        assert_eq!(status, StatusCode::OK);
        assert!(!state.engine.lock().await.state().get(Flag::Quarto));
    }

    #[tokio::test]
    async fn indicator_paths_drive_output() {
        let state = test_state();
        let app = build_router(state.clone());

        send(&app, Method::GET, "/on").await;
        assert_eq!(state.outputs.lock().await.indicator, Some(true));

        send(&app, Method::GET, "/off").await;
        assert_eq!(state.outputs.lock().await.indicator, Some(false));
        assert_eq!(*state.engine.lock().await.state(), Default::default());
    }

    #[test]
    fn port_prefers_env_then_config_then_default() {
        let config = RuntimeConfig::from_json(br#"{"network":{"http_port":8081}}"#).unwrap();

        assert_eq!(resolve_port(Some("9090"), Some(&config)), 9090);
        assert_eq!(resolve_port(None, Some(&config)), 8081);
        assert_eq!(resolve_port(Some("not-a-port"), Some(&config)), 8081);
        assert_eq!(resolve_port(Some("0"), None), DEFAULT_HTTP_PORT);
        assert_eq!(resolve_port(None, None), DEFAULT_HTTP_PORT);
    }

    #[tokio::test]
    async fn config_file_port_is_used() {
        let path = std::env::temp_dir().join(format!(
            "homenode-config-{}-{}.json",
            std::process::id(),
            monotonic_ms()
        ));
        tokio::fs::write(&path, br#"{"network":{"http_port":8081}}"#)
            .await
            .unwrap();

        let loaded = load_runtime_config(Some(path.clone())).await.unwrap();
        let _ = tokio::fs::remove_file(&path).await;

        assert_eq!(resolve_port(None, loaded.as_ref()), 8081);
    }

    #[tokio::test]
    async fn missing_config_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("homenode-config-does-not-exist.json");

        let loaded = load_runtime_config(Some(path)).await.unwrap();

        assert!(loaded.is_none());
        assert_eq!(resolve_port(None, loaded.as_ref()), DEFAULT_HTTP_PORT);
    }

    #[test]
    fn simulated_temperature_is_plausible() {
        let mut reader = TelemetryReader::new(
            SimulatedAdc::default(),
            RuntimeConfig::default().node.temperature,
        );
        let celsius = reader.read_celsius().unwrap();
        assert!((20.0..40.0).contains(&celsius), "got {celsius}");
    }
}
