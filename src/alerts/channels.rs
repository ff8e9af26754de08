//! Delivery gateway seams: SMS/voice and email.
//!
//! Production uses the HTTP SMS gateway; without configured credentials
//! the log-only gateways record the message and succeed, so the rest of
//! the delivery pipeline (templates, retries, acks) behaves identically
//! in development.

use async_trait::async_trait;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::info;

use crate::error::{AppError, Result};

/// E.164: leading `+`, country code 1-9, 11-15 digits total.
pub fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\+[1-9]\d{10,14}$").unwrap_or_else(|_| Regex::new("x").expect("static regex"))
    })
}

pub fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
            .unwrap_or_else(|_| Regex::new("x").expect("static regex"))
    })
}

pub fn validate_phone(phone: &str) -> Result<()> {
    if phone_re().is_match(phone) {
        Ok(())
    } else {
        Err(AppError::validation(format!("phone '{phone}' is not E.164")))
    }
}

pub fn validate_email(email: &str) -> Result<()> {
    if email_re().is_match(email) {
        Ok(())
    } else {
        Err(AppError::validation(format!("email '{email}' does not parse")))
    }
}

/// SMS + voice delivery through one provider.
#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send_sms(&self, phone: &str, message: &str) -> Result<()>;
    async fn place_call(&self, phone: &str, message: &str) -> Result<()>;
}

/// Email delivery.
#[async_trait]
pub trait EmailGateway: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

// ============================================================================
// HTTP SMS gateway
// ============================================================================

/// POSTs `{to, body, channel}` to the configured gateway with a bearer
/// token. 5xx responses map to `UPSTREAM` so the retry layer engages.
pub struct HttpSmsGateway {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpSmsGateway {
    pub fn new(url: String, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::internal(format!("sms client: {e}")))?;
        Ok(Self { client, url, token })
    }

    async fn post(&self, channel: &str, to: &str, body: &str) -> Result<()> {
        let mut request = self.client.post(&self.url).json(&serde_json::json!({
            "to": to,
            "body": body,
            "channel": channel,
        }));
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_server_error() {
            Err(AppError::upstream(format!("sms gateway returned {status}")))
        } else {
            Err(AppError::validation(format!(
                "sms gateway rejected message: {status}"
            )))
        }
    }
}

#[async_trait]
impl SmsGateway for HttpSmsGateway {
    async fn send_sms(&self, phone: &str, message: &str) -> Result<()> {
        self.post("sms", phone, message).await
    }

    async fn place_call(&self, phone: &str, message: &str) -> Result<()> {
        self.post("voice", phone, message).await
    }
}

// ============================================================================
// Log-only gateways (no credentials configured)
// ============================================================================

pub struct LogSmsGateway;

#[async_trait]
impl SmsGateway for LogSmsGateway {
    async fn send_sms(&self, phone: &str, message: &str) -> Result<()> {
        info!(to = phone, len = message.len(), "SMS (log-only gateway)");
        Ok(())
    }

    async fn place_call(&self, phone: &str, message: &str) -> Result<()> {
        info!(to = phone, len = message.len(), "voice call (log-only gateway)");
        Ok(())
    }
}

pub struct LogEmailGateway;

#[async_trait]
impl EmailGateway for LogEmailGateway {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        info!(to, subject, len = body.len(), "email (log-only gateway)");
        Ok(())
    }
}

// ============================================================================
// Test gateways
// ============================================================================

/// Scripted gateway for delivery-path tests: fails the first
/// `failures_before_success` attempts per destination, records traffic.
#[cfg(test)]
pub mod testing {
    use super::{EmailGateway, Result, SmsGateway};
    use crate::error::AppError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct ScriptedGateway {
        pub failures_before_success: u32,
        pub refuse_sms: bool,
        pub(crate) attempts: Mutex<HashMap<String, u32>>,
        pub sent: Mutex<Vec<(String, String, String)>>,
    }

    impl ScriptedGateway {
        pub fn deliveries(&self) -> Vec<(String, String, String)> {
            self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        fn attempt(&self, channel: &str, to: &str, body: &str) -> Result<()> {
            let key = format!("{channel}:{to}");
            let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
            let n = attempts.entry(key).or_insert(0);
            *n += 1;
            if channel == "sms" && self.refuse_sms {
                return Err(AppError::upstream("sms channel down"));
            }
            if *n <= self.failures_before_success {
                return Err(AppError::upstream("scripted 503"));
            }
            self.sent
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((channel.to_string(), to.to_string(), body.to_string()));
            Ok(())
        }
    }

    #[async_trait]
    impl SmsGateway for ScriptedGateway {
        async fn send_sms(&self, phone: &str, message: &str) -> Result<()> {
            self.attempt("sms", phone, message)
        }

        async fn place_call(&self, phone: &str, message: &str) -> Result<()> {
            self.attempt("voice", phone, message)
        }
    }

    #[async_trait]
    impl EmailGateway for ScriptedGateway {
        async fn send_email(&self, to: &str, _subject: &str, body: &str) -> Result<()> {
            self.attempt("email", to, body)
        }
    }
}
