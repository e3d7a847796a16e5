use anyhow::Result;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_host: String,
    pub api_port: u16,

    pub database_url: String,

    pub vip_digest_hours: i64,

    pub phase2_extraction_enabled: bool,
    pub phase2_batch_size: i64,
    pub phase2_lease_seconds: i64,
    pub phase2_scheduler_lock_seconds: i64,
    pub phase2_admin_token: String,
    pub phase2_requires_evidence_enabled: bool,

    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_timeout_seconds: f64,
    pub openai_max_retries: u32,

    pub digest_bot_token: Option<String>,
    pub digest_chat_id: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            api_host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: std::env::var("API_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),

            database_url: std::env::var("DATABASE_URL")?,

            vip_digest_hours: std::env::var("VIP_DIGEST_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),

            phase2_extraction_enabled: std::env::var("PHASE2_EXTRACTION_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            phase2_batch_size: std::env::var("PHASE2_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(25),
            phase2_lease_seconds: std::env::var("PHASE2_LEASE_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            phase2_scheduler_lock_seconds: std::env::var("PHASE2_SCHEDULER_LOCK_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(600),
            phase2_admin_token: std::env::var("PHASE2_ADMIN_TOKEN")?,
            phase2_requires_evidence_enabled: std::env::var("PHASE2_REQUIRES_EVIDENCE_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),

            openai_api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            openai_timeout_seconds: std::env::var("OPENAI_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30.0),
            openai_max_retries: std::env::var("OPENAI_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),

            digest_bot_token: std::env::var("DIGEST_BOT_TOKEN").ok(),
            digest_chat_id: std::env::var("DIGEST_CHAT_ID").ok(),
        };

        config.log_redacted();
        Ok(config)
    }

    fn log_redacted(&self) {
        fn preview(val: &str) -> String {
            if val.is_empty() {
                return "<not set>".to_string();
            }
            let n = val.len().min(5);
            format!("{}...({} chars)", &val[..n], val.len())
        }
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => preview(v),
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  API_HOST:PORT: {}:{}", self.api_host, self.api_port);
        tracing::info!("  OPENAI_API_KEY: {}", preview(&self.openai_api_key));
        tracing::info!("  OPENAI_MODEL: {}", self.openai_model);
        tracing::info!("  PHASE2_EXTRACTION_ENABLED: {}", self.phase2_extraction_enabled);
        tracing::info!(
            "  PHASE2_REQUIRES_EVIDENCE_ENABLED: {}",
            self.phase2_requires_evidence_enabled
        );
        tracing::info!("  PHASE2_ADMIN_TOKEN: {}", preview(&self.phase2_admin_token));
        tracing::info!("  DIGEST_BOT_TOKEN: {}", preview_opt(&self.digest_bot_token));
    }
}
