use std::env;
use std::time::Duration;

use crate::rides::BookingConfig;

/// Which backend holds the ride records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl StoreBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Some(StoreBackend::Postgres),
            "memory" | "mem" => Some(StoreBackend::Memory),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub server_host: String,
    pub server_port: u16,
    pub ride_store: StoreBackend,
    pub store_timeout_ms: u64,
    pub booking_max_attempts: u32,
    pub booking_retry_backoff_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database_url: env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set"),
            jwt_secret: env::var("JWT_SECRET")
                .expect("JWT_SECRET must be set"),
            jwt_expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .expect("JWT_EXPIRATION_HOURS must be a number"),
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("SERVER_PORT must be a number"),
            ride_store: StoreBackend::parse(
                &env::var("RIDE_STORE").unwrap_or_else(|_| "postgres".to_string()),
            )
            .expect("RIDE_STORE must be 'postgres' or 'memory'"),
            store_timeout_ms: env::var("STORE_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .expect("STORE_TIMEOUT_MS must be a number"),
            booking_max_attempts: env::var("BOOKING_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .expect("BOOKING_MAX_ATTEMPTS must be a number"),
            booking_retry_backoff_ms: env::var("BOOKING_RETRY_BACKOFF_MS")
                .unwrap_or_else(|_| "25".to_string())
                .parse()
                .expect("BOOKING_RETRY_BACKOFF_MS must be a number"),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn booking(&self) -> BookingConfig {
        BookingConfig {
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            max_attempts: self.booking_max_attempts.max(1),
            retry_backoff: Duration::from_millis(self.booking_retry_backoff_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_backend_names() {
        assert_eq!(StoreBackend::parse("postgres"), Some(StoreBackend::Postgres));
        assert_eq!(StoreBackend::parse(" Memory "), Some(StoreBackend::Memory));
        assert_eq!(StoreBackend::parse("redis"), None);
    }

    #[test]
    fn test_booking_settings_never_disable_retries() {
        let config = Config {
            database_url: String::new(),
            jwt_secret: String::new(),
            jwt_expiration_hours: 24,
            server_host: "127.0.0.1".into(),
            server_port: 3000,
            ride_store: StoreBackend::Memory,
            store_timeout_ms: 1500,
            booking_max_attempts: 0,
            booking_retry_backoff_ms: 10,
        };
        let booking = config.booking();
        assert_eq!(booking.store_timeout, Duration::from_millis(1500));
        assert_eq!(booking.max_attempts, 1);
        assert_eq!(config.server_addr(), "127.0.0.1:3000");
    }
}
