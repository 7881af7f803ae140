// =============================================================================
// Meridian Risk Engine — Main Entry Point
// =============================================================================
//
// Boots the decision core from the config directory, wires the hot-reload
// watchers, and serves the REST binding until Ctrl+C.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use meridian_engine::app_state::AppState;
use meridian_engine::config::{Config, ConfigStore};
use meridian_engine::error::ErrorKind;
use meridian_engine::metrics::EngineMetrics;
use meridian_engine::patterns::{BackendPreference, PatternMatcher};
use meridian_engine::rules::RuleEngine;
use meridian_engine::{api, logging};

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    let config_path = env_or("MERIDIAN_CONFIG", "config/server.toml");

    let config = match ConfigStore::open(&config_path) {
        Ok(store) => store,
        Err(e) => {
            // Logging is not up yet; stderr is all we have here.
            eprintln!("failed to load {config_path}: {e} — using defaults");
            ConfigStore::with_config(Config::default())
        }
    };

    let _log_guard = logging::init(&config.logging())?;

    // Decision workers are sized from the server section (bounded 1..=64 at
    // validation).
    let threads = config.server().threads as usize;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads)
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: Arc<ConfigStore>) -> anyhow::Result<()> {
    let rules_path = env_or("MERIDIAN_RULES", "config/rules.json");
    let blacklist_path = env_or("MERIDIAN_BLACKLIST", "config/blacklist.txt");
    let whitelist_path = env_or("MERIDIAN_WHITELIST", "config/whitelist.txt");

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Meridian Risk Engine — Starting Up                ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let snapshot = config.snapshot();
    info!(
        model_version = %snapshot.model_version,
        threads = snapshot.server.threads,
        target_p99_ms = snapshot.performance.target_p99_ms,
        target_qps = snapshot.performance.target_qps,
        "system configuration active"
    );

    // ── 2. Metrics registry ──────────────────────────────────────────────
    let metrics = Arc::new(EngineMetrics::new()?);

    // ── 3. Rule engine ───────────────────────────────────────────────────
    let rules = Arc::new(RuleEngine::new());
    if let Err(e) = rules.load_rules(&rules_path) {
        error!(path = %rules_path, error = %e, "failed to load rules — engine starts not_ready");
        metrics.record_error("rule_engine", ErrorKind::Config.as_str());
    }

    // ── 4. Pattern matcher ───────────────────────────────────────────────
    let backend: BackendPreference = env_or("MERIDIAN_MATCHER_BACKEND", "auto")
        .parse()
        .unwrap_or_else(|e| {
            warn!(error = %e, "bad MERIDIAN_MATCHER_BACKEND — falling back to auto");
            BackendPreference::Auto
        });

    let patterns = Arc::new(PatternMatcher::new(backend));
    if let Err(e) = patterns.load_file(&blacklist_path, "blacklist") {
        warn!(path = %blacklist_path, error = %e, "no blacklist loaded");
        metrics.record_error("pattern_matcher", ErrorKind::Config.as_str());
    }
    if let Err(e) = patterns.load_file(&whitelist_path, "whitelist") {
        warn!(path = %whitelist_path, error = %e, "no whitelist loaded");
        metrics.record_error("pattern_matcher", ErrorKind::Config.as_str());
    }
    if let Err(e) = patterns.compile() {
        error!(error = %e, "pattern compile failed — matcher starts not_ready");
        metrics.record_error("pattern_matcher", ErrorKind::PatternCompile.as_str());
    }

    // ── 5. Hot reload watchers ───────────────────────────────────────────
    let reload_interval = Duration::from_secs(snapshot.reload_interval_seconds.max(1));

    let config_metrics = metrics.clone();
    config.enable_watch(
        reload_interval,
        Some(Box::new(move |_| {
            config_metrics.record_reload("config", true);
        })),
    );

    if rules.is_initialized() {
        let rule_metrics = metrics.clone();
        rules.enable_hot_reload(
            reload_interval,
            Some(Box::new(move |config| {
                info!(version = %config.version, rules = config.rules.len(), "rule config hot-reloaded");
                rule_metrics.record_reload("rules", true);
            })),
        )?;
    }
    patterns.enable_hot_reload(reload_interval);
    info!(interval_s = reload_interval.as_secs(), "hot reload watchers running");

    // ── 6. Shared state ──────────────────────────────────────────────────
    let state = Arc::new(AppState::new(
        config.clone(),
        rules.clone(),
        patterns.clone(),
        metrics,
    ));

    // ── 7. Serve the REST binding ────────────────────────────────────────
    let bind_addr = format!("{}:{}", snapshot.server.host, snapshot.server.port);
    let app = api::rest::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "API server listening");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 8. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    rules.disable_hot_reload();
    patterns.disable_hot_reload();
    config.disable_watch();
    server.abort();

    info!("Meridian Risk Engine shut down complete.");
    Ok(())
}
