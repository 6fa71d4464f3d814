use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub mongodb_uri: String,
    pub mongodb_db: String,
    pub store_backend: StoreBackend,

    pub catalog_url: String,

    pub line_channel_token: String,
    pub line_api_base: String,

    pub tracking_interval: Duration,
    pub sweep_interval: Duration,
    pub cleanup_interval: Duration,
    pub report_interval: Duration,

    // hundredths of a percent; 1000 = 10.00%
    pub volatility_threshold_bps: i64,
    pub volatility_window_days: i64,
    pub retention_days: i64,

    pub store_timeout: Duration,
    pub transport_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mongodb_uri: "mongodb://localhost:27017".to_string(),
            mongodb_db: "pricewatch".to_string(),
            store_backend: StoreBackend::Mongo,
            catalog_url: String::new(),
            line_channel_token: String::new(),
            line_api_base: "https://api.line.me".to_string(),
            tracking_interval: Duration::from_secs(12 * 60 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
            cleanup_interval: Duration::from_secs(24 * 60 * 60),
            report_interval: Duration::from_secs(24 * 60 * 60),
            volatility_threshold_bps: 1_000,
            volatility_window_days: 3,
            retention_days: 30,
            store_timeout: Duration::from_millis(5_000),
            transport_timeout: Duration::from_millis(10_000),
        }
    }
}

// ten years; longer windows are treated as this
pub const MAX_WINDOW_DAYS: i64 = 3_650;

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

pub fn load() -> Settings {
    // Loads .env if present (no crash if missing)
    dotenvy::dotenv().ok();

    let d = Settings::default();

    let mongodb_uri = env::var("MONGODB_URI").unwrap_or(d.mongodb_uri);
    let mongodb_db = env::var("MONGODB_DB").unwrap_or(d.mongodb_db);

    let store_backend = match env::var("STORE_BACKEND").as_deref() {
        Ok("memory") => StoreBackend::Memory,
        _ => StoreBackend::Mongo,
    };

    let catalog_url = env::var("CATALOG_URL").unwrap_or_default();
    let line_channel_token = env::var("LINE_CHANNEL_TOKEN").unwrap_or_default();
    let line_api_base = env::var("LINE_API_BASE").unwrap_or(d.line_api_base);

    let threshold_pct: f64 = parsed("VOLATILITY_THRESHOLD_PCT", 10.0);
    let volatility_threshold_bps = if threshold_pct.is_finite() && threshold_pct > 0.0 {
        (threshold_pct * 100.0).round() as i64
    } else {
        d.volatility_threshold_bps
    };

    Settings {
        mongodb_uri,
        mongodb_db,
        store_backend,
        catalog_url,
        line_channel_token,
        line_api_base,
        tracking_interval: Duration::from_secs(parsed("TRACKING_INTERVAL_SECS", 43_200)),
        sweep_interval: Duration::from_secs(parsed("SWEEP_INTERVAL_SECS", 300)),
        cleanup_interval: Duration::from_secs(parsed("CLEANUP_INTERVAL_SECS", 86_400)),
        report_interval: Duration::from_secs(parsed("REPORT_INTERVAL_SECS", 86_400)),
        volatility_threshold_bps,
        volatility_window_days: parsed("VOLATILITY_WINDOW_DAYS", d.volatility_window_days)
            .clamp(0, MAX_WINDOW_DAYS),
        retention_days: parsed("RETENTION_DAYS", d.retention_days).clamp(1, MAX_WINDOW_DAYS),
        store_timeout: Duration::from_millis(parsed("STORE_TIMEOUT_MS", 5_000)),
        transport_timeout: Duration::from_millis(parsed("TRANSPORT_TIMEOUT_MS", 10_000)),
    }
}
