use crate::{env_lookup, parse_or};

/// SMTP settings for the mail event sink.
///
/// `notify_email` is the office inbox that receives event notifications.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_email: String,
    pub from_name: String,
    pub notify_email: String,
}

impl EmailConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Self {
            enabled: lookup("SMTP_ENABLED")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),
            smtp_host: or("SMTP_HOST", "localhost"),
            smtp_port: parse_or(&lookup, "SMTP_PORT", 1025),
            smtp_username: or("SMTP_USERNAME", ""),
            smtp_password: or("SMTP_PASSWORD", ""),
            from_email: or("FROM_EMAIL", "noreply@academy.local"),
            from_name: or("FROM_NAME", "Academy"),
            notify_email: or("NOTIFY_EMAIL", "office@academy.local"),
        }
    }
}
