use chrono::NaiveTime;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    MySql,
    Memory,
}

/// What happens when an employee with no active authorized area checks in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZeroAreaPolicy {
    RequireApproval,
    Block,
}

/// Time-of-day cutoffs and anomaly thresholds. All of it is policy, not physics.
#[derive(Clone, Debug)]
pub struct AttendancePolicy {
    pub work_start: NaiveTime,
    pub late_cutoff: NaiveTime,
    pub min_reason_len: usize,
    pub zero_area_policy: ZeroAreaPolicy,
    pub low_accuracy_meters: f64,
    pub half_day_hours: f64,

    // Movement trail anomaly rules
    pub max_speed_kmh: f64,
    pub max_plausible_speed_kmh: f64,
    pub location_jump_min_meters: f64,
    pub location_jump_accuracy_ratio: f64,
    pub missing_route_gap_secs: i64,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            work_start: hm(9, 0),
            late_cutoff: hm(9, 15),
            min_reason_len: 10,
            zero_area_policy: ZeroAreaPolicy::RequireApproval,
            low_accuracy_meters: 100.0,
            half_day_hours: 4.0,
            max_speed_kmh: 120.0,
            max_plausible_speed_kmh: 900.0,
            location_jump_min_meters: 500.0,
            location_jump_accuracy_ratio: 0.25,
            missing_route_gap_secs: 4 * 3600,
        }
    }
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

impl AttendancePolicy {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            work_start: env_time("WORK_START", d.work_start),
            late_cutoff: env_time("LATE_CUTOFF", d.late_cutoff),
            min_reason_len: env_or("MIN_REASON_LEN", d.min_reason_len),
            zero_area_policy: match env::var("ZERO_AREA_POLICY").as_deref() {
                Ok("block") => ZeroAreaPolicy::Block,
                Ok("require_approval") | Err(_) => ZeroAreaPolicy::RequireApproval,
                Ok(other) => {
                    tracing::warn!(value = other, "Unknown ZERO_AREA_POLICY, using require_approval");
                    ZeroAreaPolicy::RequireApproval
                }
            },
            low_accuracy_meters: env_or("LOW_ACCURACY_METERS", d.low_accuracy_meters),
            half_day_hours: env_or("HALF_DAY_HOURS", d.half_day_hours),
            max_speed_kmh: env_or("MAX_SPEED_KMH", d.max_speed_kmh),
            max_plausible_speed_kmh: env_or("MAX_PLAUSIBLE_SPEED_KMH", d.max_plausible_speed_kmh),
            location_jump_min_meters: env_or("LOCATION_JUMP_MIN_METERS", d.location_jump_min_meters),
            location_jump_accuracy_ratio: env_or(
                "LOCATION_JUMP_ACCURACY_RATIO",
                d.location_jump_accuracy_ratio,
            ),
            missing_route_gap_secs: env_or("MISSING_ROUTE_GAP_SECS", d.missing_route_gap_secs),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub server_addr: String,
    pub storage_backend: StorageBackend,

    // Rate limiting
    pub rate_checkin_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,
    pub log_level: String,

    // Notifications
    pub notify_webhook_url: Option<String>,
    pub notify_timeout: Duration,

    pub area_cache_ttl: Duration,
    /// JSON directory snapshot used by the memory backend
    pub directory_file: Option<String>,
    pub policy: AttendancePolicy,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        Self {
            server_addr: env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            database_url: env::var("DATABASE_URL").ok(),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_default(),
            storage_backend: match env::var("STORAGE_BACKEND").as_deref() {
                Ok("memory") => StorageBackend::Memory,
                _ => StorageBackend::MySql,
            },

            rate_checkin_per_min: env_or("RATE_CHECKIN_PER_MIN", 30),
            rate_protected_per_min: env_or("RATE_PROTECTED_PER_MIN", 1000),

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "debug".to_string()),

            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").ok().filter(|u| !u.is_empty()),
            notify_timeout: Duration::from_millis(env_or("NOTIFY_TIMEOUT_MS", 3000)),

            area_cache_ttl: Duration::from_secs(env_or("AREA_CACHE_TTL_SECS", 300)),
            directory_file: env::var("DIRECTORY_FILE").ok().filter(|p| !p.is_empty()),
            policy: AttendancePolicy::from_env(),
        }
    }
}

/// Reads and parses an env var, falling back to `default` when unset or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Malformed config value, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_time(key: &str, default: NaiveTime) -> NaiveTime {
    match env::var(key) {
        Ok(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M").unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Malformed time of day, expected HH:MM");
            default
        }),
        Err(_) => default,
    }
}
