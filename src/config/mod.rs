use std::env;

/// `PushNotificationContents` (spec §6.5): `full` includes message text with
/// mention tags stripped; `generic` uses locale-parameterised templates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushContentSetting {
    Full,
    Generic,
}

/// The hosted push relay this deployment would otherwise use by default.
/// Sending through it requires a license that permits it (spec §4.D step 7,
/// `original_source/app/notification.go`'s `pushServer == model.MHPNS`
/// gate) — a self-hosted `push_notification_server` needs no such license.
pub const MANAGED_PUSH_SERVER: &str = "https://push.postflow.io";

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

/// Every key in spec §6.5, loaded the way the teacher's `Config::from_env`
/// loads its own: fatal if a truly required key is missing, a documented
/// default otherwise.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_host: String,
    pub server_port: u16,
    pub is_dev: bool,
    pub allowed_origins: Vec<String>,

    pub send_email_notifications: bool,
    pub send_push_notifications: bool,
    pub push_notification_server: String,
    pub push_notification_contents: PushContentSetting,
    pub enable_email_batching: bool,

    /// Whether this deployment carries any license at all.
    pub is_licensed: bool,
    /// Whether the license (if any) permits sending through
    /// [`MANAGED_PUSH_SERVER`]. Meaningless when `push_notification_server`
    /// points at a self-hosted relay.
    pub license_has_managed_push: bool,

    pub max_notifications_per_channel: usize,
    pub site_name: String,

    pub enable_outgoing_webhooks: bool,
    pub enable_insecure_outgoing_connections: bool,
    pub enable_post_username_override: bool,
    pub enable_post_icon_override: bool,

    pub smtp: SmtpConfig,
    /// Diagnostic tag attached to every outbound `PushNotification` (spec §3).
    pub server_id: String,
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenvy::dotenv().ok();

        let push_notification_contents = match env_or("PUSH_NOTIFICATION_CONTENTS", "generic")
            .as_str()
        {
            "full" => PushContentSetting::Full,
            _ => PushContentSetting::Generic,
        };

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            jwt_secret: env_or("JWT_SECRET", "dev_secret_change_in_production"),
            server_host: env_or("SERVER_HOST", "127.0.0.1"),
            server_port: env_or("SERVER_PORT", "8080").parse().unwrap_or(8080),
            is_dev: env_or("APP_ENV", "development") != "production",
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|v| v.split(',').map(str::trim).map(String::from).collect())
                .unwrap_or_default(),

            send_email_notifications: env_bool("SEND_EMAIL_NOTIFICATIONS", true),
            send_push_notifications: env_bool("SEND_PUSH_NOTIFICATIONS", true),
            push_notification_server: env_or(
                "PUSH_NOTIFICATION_SERVER",
                "https://push.example.com",
            ),
            push_notification_contents,
            enable_email_batching: env_bool("ENABLE_EMAIL_BATCHING", false),
            is_licensed: env_bool("IS_LICENSED", false),
            license_has_managed_push: env_bool("LICENSE_HAS_MANAGED_PUSH", false),

            max_notifications_per_channel: env_or("MAX_NOTIFICATIONS_PER_CHANNEL", "1000")
                .parse()
                .unwrap_or(1000),
            site_name: env_or("SITE_NAME", "Postflow"),

            enable_outgoing_webhooks: env_bool("ENABLE_OUTGOING_WEBHOOKS", true),
            enable_insecure_outgoing_connections: env_bool(
                "ENABLE_INSECURE_OUTGOING_CONNECTIONS",
                false,
            ),
            enable_post_username_override: env_bool("ENABLE_POST_USERNAME_OVERRIDE", false),
            enable_post_icon_override: env_bool("ENABLE_POST_ICON_OVERRIDE", false),

            smtp: SmtpConfig {
                host: env_or("SMTP_HOST", "localhost"),
                port: env_or("SMTP_PORT", "587").parse().unwrap_or(587),
                username: env_or("SMTP_USERNAME", ""),
                password: env_or("SMTP_PASSWORD", ""),
                from_address: env_or("SMTP_FROM_ADDRESS", "notifications@postflow.local"),
            },
            server_id: env_or("SERVER_ID", "postflow-server"),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Spec §4.D step 7: push is skipped if `send_push_notifications` is
    /// false, or if the configured push server is the managed relay and
    /// licensing doesn't permit sending through it.
    pub fn push_notifications_enabled(&self) -> bool {
        if !self.send_push_notifications {
            return false;
        }
        if self.push_notification_server == MANAGED_PUSH_SERVER {
            return self.is_licensed && self.license_has_managed_push;
        }
        true
    }
}
