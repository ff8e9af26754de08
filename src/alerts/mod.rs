//! Stage 5: multi-channel alert dispatch with acknowledgment tracking.
//!
//! Each recipient has an ordered channel list; delivery walks the list
//! until one channel succeeds. Gateway 5xx failures retry with capped
//! exponential backoff; SMS/voice traffic passes a token bucket unless
//! the send is an emergency broadcast. Every dispatched alert is an
//! immutable stored record, and `sent + failed` always equals the
//! recipient count.

pub mod channels;
pub mod rate_limiter;
pub mod retry;
pub mod templates;

pub use channels::{EmailGateway, SmsGateway};
pub use rate_limiter::TokenBucket;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tracing::{info, warn};

use crate::config::AlertsConfig;
use crate::error::{AppError, ErrorKind, Result};
use crate::store::{spatial, RequestFilter, Store};
use crate::types::{
    epoch_micros, Acknowledgment, Alert, AlertRecipient, AlertSeverity, AlertType, Channel,
    DeliveryRecord, DeliveryStatus, GeoPoint, RequestStatus,
};

/// Dispatch request for one alert.
#[derive(Debug, Clone)]
pub struct AlertRequest {
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub burn_request_id: Option<i64>,
    pub variables: HashMap<String, String>,
    pub recipients: Vec<AlertRecipient>,
}

/// Outcome of one `send`.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub alert_id: uuid::Uuid,
    pub sent: usize,
    pub failed: usize,
    pub deliveries: Vec<DeliveryRecord>,
}

/// Emergency broadcast outcome: per-channel counts survive partial
/// failure.
#[derive(Debug, Clone)]
pub struct EmergencyReport {
    pub alert_id: uuid::Uuid,
    pub cancelled_requests: Vec<i64>,
    pub sent: usize,
    pub failed: usize,
    /// channel -> (delivered, failed)
    pub per_channel: HashMap<&'static str, (u32, u32)>,
}

/// Region for an emergency halt.
#[derive(Debug, Clone, Copy)]
pub struct EmergencyRegion {
    pub center: GeoPoint,
    pub radius_km: f64,
}

/// See module docs.
pub struct AlertService {
    store: Arc<dyn Store>,
    sms: Arc<dyn SmsGateway>,
    email: Arc<dyn EmailGateway>,
    sms_bucket: TokenBucket,
    config: AlertsConfig,
}

impl AlertService {
    pub fn new(
        store: Arc<dyn Store>,
        sms: Arc<dyn SmsGateway>,
        email: Arc<dyn EmailGateway>,
        config: AlertsConfig,
    ) -> Self {
        Self {
            store,
            sms,
            email,
            sms_bucket: TokenBucket::new(
                config.rate_limits.sms_capacity,
                config.rate_limits.sms_refill_per_sec,
            ),
            config,
        }
    }

    /// Dispatch an alert to all recipients. Per recipient the channel
    /// list is walked in order (FIFO); across recipients deliveries run
    /// concurrently.
    pub async fn send(&self, request: AlertRequest) -> Result<DeliveryReport> {
        self.send_internal(request, false).await
    }

    async fn send_internal(
        &self,
        request: AlertRequest,
        bypass_limits: bool,
    ) -> Result<DeliveryReport> {
        if request.recipients.is_empty() {
            return Err(AppError::validation("alert has no recipients"));
        }

        // Render per language up front so a template failure rejects the
        // whole send before any delivery goes out.
        let mut rendered: HashMap<String, String> = HashMap::new();
        for r in &request.recipients {
            if !rendered.contains_key(&r.language) {
                let message =
                    templates::render(request.alert_type, &r.language, &request.variables)?;
                rendered.insert(r.language.clone(), message);
            }
        }

        let alert_id = uuid::Uuid::new_v4();
        let requires_ack = request.severity >= AlertSeverity::Urgent
            || matches!(
                request.alert_type,
                AlertType::EmergencyHalt | AlertType::DecisionRequired
            );

        let deliveries: Vec<DeliveryRecord> = join_all(request.recipients.iter().map(|r| {
            let message = rendered
                .get(&r.language)
                .cloned()
                .unwrap_or_default();
            async move {
                let deadline = Duration::from_secs(self.config.send_timeout_secs);
                match tokio::time::timeout(
                    deadline,
                    self.deliver_to_recipient(r, &message, bypass_limits),
                )
                .await
                {
                    Ok(record) => record,
                    Err(_) => DeliveryRecord {
                        recipient_id: r.id,
                        status: DeliveryStatus::Failed,
                        delivered_via: None,
                        attempts: 0,
                        last_error: Some("delivery deadline exceeded".to_string()),
                        completed_at: Some(epoch_micros(Utc::now())),
                    },
                }
            }
        }))
        .await;

        let sent = deliveries
            .iter()
            .filter(|d| d.status == DeliveryStatus::Sent)
            .count();
        let failed = deliveries.len() - sent;

        let default_message = rendered.values().next().cloned().unwrap_or_default();
        let alert = Alert {
            id: alert_id,
            alert_type: request.alert_type,
            severity: request.severity,
            burn_request_id: request.burn_request_id,
            message: default_message,
            deliveries: deliveries.clone(),
            requires_ack,
            created_at: epoch_micros(Utc::now()),
        };
        self.store.insert_alert(alert).await?;

        info!(
            alert_id = %alert_id,
            alert_type = request.alert_type.as_str(),
            severity = request.severity.as_str(),
            sent,
            failed,
            "alert dispatched"
        );

        Ok(DeliveryReport {
            alert_id,
            sent,
            failed,
            deliveries,
        })
    }

    /// Walk a recipient's channel list until one succeeds.
    async fn deliver_to_recipient(
        &self,
        recipient: &AlertRecipient,
        message: &str,
        bypass_limits: bool,
    ) -> DeliveryRecord {
        let mut attempts_total: u32 = 0;
        let mut last_error: Option<String> = None;

        for channel in &recipient.channels {
            match self
                .deliver_via(*channel, recipient, message, bypass_limits)
                .await
            {
                (Ok(()), attempts) => {
                    return DeliveryRecord {
                        recipient_id: recipient.id,
                        status: DeliveryStatus::Sent,
                        delivered_via: Some(*channel),
                        attempts: attempts_total + attempts,
                        last_error: None,
                        completed_at: Some(epoch_micros(Utc::now())),
                    };
                }
                (Err(e), attempts) => {
                    attempts_total += attempts;
                    warn!(
                        recipient = recipient.id,
                        channel = channel.as_str(),
                        error = %e,
                        "channel delivery failed — trying fallback"
                    );
                    last_error = Some(format!("{}: {e}", channel.as_str()));
                }
            }
        }

        DeliveryRecord {
            recipient_id: recipient.id,
            status: DeliveryStatus::Failed,
            delivered_via: None,
            attempts: attempts_total,
            last_error,
            completed_at: Some(epoch_micros(Utc::now())),
        }
    }

    /// One channel attempt (with retries). Returns the attempt count.
    async fn deliver_via(
        &self,
        channel: Channel,
        recipient: &AlertRecipient,
        message: &str,
        bypass_limits: bool,
    ) -> (Result<()>, u32) {
        // Contact validation happens before any provider traffic.
        let contact = match channel {
            Channel::Sms | Channel::Voice => match recipient.phone.as_deref() {
                Some(phone) => {
                    if let Err(e) = channels::validate_phone(phone) {
                        return (Err(e), 0);
                    }
                    phone.to_string()
                }
                None => return (Err(AppError::validation("recipient has no phone")), 0),
            },
            Channel::Email => match recipient.email.as_deref() {
                Some(email) => {
                    if let Err(e) = channels::validate_email(email) {
                        return (Err(e), 0);
                    }
                    email.to_string()
                }
                None => return (Err(AppError::validation("recipient has no email")), 0),
            },
        };

        // Rate-limited providers exert back-pressure unless this is an
        // emergency broadcast.
        if matches!(channel, Channel::Sms | Channel::Voice) && !bypass_limits {
            let max_wait = Duration::from_millis(self.config.rate_limits.max_wait_ms);
            if let Err(e) = self.sms_bucket.acquire_within(max_wait).await {
                return (Err(e), 0);
            }
        }

        retry::with_retries(&self.config.retry, |_| {
            let contact = contact.clone();
            async move {
                match channel {
                    Channel::Sms => self.sms.send_sms(&contact, message).await,
                    Channel::Voice => self.sms.place_call(&contact, message).await,
                    Channel::Email => {
                        self.email
                            .send_email(&contact, "Burn coordination notice", message)
                            .await
                    }
                }
            }
        })
        .await
    }

    /// Record a recipient's acknowledgment. Returns the ack and an
    /// optional follow-up action for decision alerts.
    pub async fn acknowledge(
        &self,
        alert_id: uuid::Uuid,
        recipient_id: i64,
        response: Option<String>,
    ) -> Result<(Acknowledgment, Option<&'static str>)> {
        let alert = self
            .store
            .get_alert(alert_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("alert {alert_id} not found")))?;

        if !alert.deliveries.iter().any(|d| d.recipient_id == recipient_id) {
            return Err(AppError::validation(format!(
                "recipient {recipient_id} was not a recipient of alert {alert_id}"
            )));
        }

        let existing = self.store.acks_for_alert(alert_id).await?;
        if existing.iter().any(|a| a.recipient_id == recipient_id) {
            return Err(AppError::conflict("alert already acknowledged"));
        }

        let ack = Acknowledgment {
            alert_id,
            recipient_id,
            response,
            acknowledged_at: epoch_micros(Utc::now()),
        };
        self.store.insert_ack(ack.clone()).await?;

        let follow_up = match alert.alert_type {
            AlertType::DecisionRequired => Some("coordinator_review"),
            AlertType::EmergencyHalt => Some("halt_confirmed"),
            _ => None,
        };
        Ok((ack, follow_up))
    }

    /// One cascade step: re-send the alert at escalated severity to every
    /// recipient that was reached but has not acknowledged. Returns the
    /// new report, or None when everyone has acknowledged.
    pub async fn escalate_unacknowledged(
        &self,
        alert_id: uuid::Uuid,
        variables: HashMap<String, String>,
    ) -> Result<Option<DeliveryReport>> {
        let alert = self
            .store
            .get_alert(alert_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("alert {alert_id} not found")))?;
        let acks = self.store.acks_for_alert(alert_id).await?;
        let acked: Vec<i64> = acks.iter().map(|a| a.recipient_id).collect();

        let pending: Vec<i64> = alert
            .deliveries
            .iter()
            .filter(|d| !acked.contains(&d.recipient_id))
            .map(|d| d.recipient_id)
            .collect();
        if pending.is_empty() {
            return Ok(None);
        }

        // Recipients are keyed by farm in the store; resolve the alert's
        // request to its farm, reload, and keep the pending ones.
        let farm_ids: Vec<i64> = match alert.burn_request_id {
            Some(request_id) => self
                .store
                .get_burn_request(request_id)
                .await?
                .map(|r| vec![r.farm_id])
                .unwrap_or_default(),
            None => Vec::new(),
        };
        let all = self.store.recipients_for_farms(&farm_ids).await?;
        let recipients: Vec<AlertRecipient> = all
            .into_iter()
            .filter(|r| pending.contains(&r.id))
            .collect();
        if recipients.is_empty() {
            return Ok(None);
        }

        let report = self
            .send_internal(
                AlertRequest {
                    alert_type: alert.alert_type,
                    severity: alert.severity.escalated(),
                    burn_request_id: alert.burn_request_id,
                    variables,
                    recipients,
                },
                false,
            )
            .await?;
        Ok(Some(report))
    }

    /// Cascade loop: wait the configured delay between escalation levels,
    /// stopping as soon as every recipient has acknowledged.
    pub async fn cascade(
        &self,
        alert_id: uuid::Uuid,
        variables: HashMap<String, String>,
        levels: u32,
    ) -> Result<u32> {
        let mut escalations = 0;
        for _ in 0..levels {
            tokio::time::sleep(Duration::from_secs(self.config.cascade_delay_secs)).await;
            match self
                .escalate_unacknowledged(alert_id, variables.clone())
                .await?
            {
                Some(_) => escalations += 1,
                None => break,
            }
        }
        Ok(escalations)
    }

    /// Emergency halt: cancel every scheduled burn inside the region and
    /// notify each owner over ALL channels, bypassing rate limits.
    pub async fn emergency_broadcast(
        &self,
        region: EmergencyRegion,
        reason: &str,
    ) -> Result<EmergencyReport> {
        // Collect scheduled burns inside the radius.
        let mut affected = Vec::new();
        let mut page = 1;
        loop {
            let filter = RequestFilter {
                status: Some(RequestStatus::Scheduled),
                page,
                limit: crate::config::defaults::MAX_PAGE_LIMIT,
                ..RequestFilter::default()
            };
            let batch = self.store.list_burn_requests(&filter).await?;
            let fetched = batch.data.len();
            for request in batch.data {
                let km = spatial::distance_meters(region.center, request.centroid) / 1_000.0;
                if km <= region.radius_km {
                    affected.push(request);
                }
            }
            if (u64::from(page) * u64::from(filter.limit)) >= batch.total || fetched == 0 {
                break;
            }
            page += 1;
        }

        let mut cancelled = Vec::with_capacity(affected.len());
        for request in &affected {
            match self
                .store
                .update_request_status(request.id, RequestStatus::Scheduled, RequestStatus::Cancelled)
                .await
            {
                Ok(_) => cancelled.push(request.id),
                Err(e) if e.kind == ErrorKind::Conflict => {
                    // Raced with an operational transition; the halt still
                    // reaches the owner below.
                    warn!(request_id = request.id, error = %e, "emergency cancel skipped");
                }
                Err(e) => return Err(e),
            }
        }

        let farm_ids: Vec<i64> = {
            let mut ids: Vec<i64> = affected.iter().map(|r| r.farm_id).collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };
        let mut recipients = self.store.recipients_for_farms(&farm_ids).await?;
        for farm_id in &farm_ids {
            if !recipients.iter().any(|r| r.farm_id == Some(*farm_id)) {
                if let Some(farm) = self.store.get_farm(*farm_id).await? {
                    let recipient = self
                        .store
                        .insert_recipient(AlertRecipient {
                            id: 0,
                            farm_id: Some(farm.id),
                            name: farm.owner_name.clone(),
                            phone: Some(farm.phone.clone()),
                            email: Some(farm.email.clone()),
                            channels: vec![Channel::Sms, Channel::Voice, Channel::Email],
                            language: "en".to_string(),
                        })
                        .await?;
                    recipients.push(recipient);
                }
            }
        }

        let mut variables = HashMap::new();
        variables.insert("reason".to_string(), reason.to_string());

        let alert_id = uuid::Uuid::new_v4();
        let mut per_channel: HashMap<&'static str, (u32, u32)> = HashMap::new();
        let mut deliveries = Vec::with_capacity(recipients.len());

        for recipient in &recipients {
            let message =
                templates::render(AlertType::EmergencyHalt, &recipient.language, &variables)?;
            let mut delivered_via = None;
            let mut attempts = 0;
            let mut last_error = None;

            // All channels, not first-success fallback.
            for channel in [Channel::Sms, Channel::Voice, Channel::Email] {
                let (result, n) = self.deliver_via(channel, recipient, &message, true).await;
                attempts += n;
                let entry = per_channel.entry(channel.as_str()).or_insert((0, 0));
                match result {
                    Ok(()) => {
                        entry.0 += 1;
                        if delivered_via.is_none() {
                            delivered_via = Some(channel);
                        }
                    }
                    Err(e) => {
                        entry.1 += 1;
                        last_error = Some(format!("{}: {e}", channel.as_str()));
                    }
                }
            }

            deliveries.push(DeliveryRecord {
                recipient_id: recipient.id,
                status: if delivered_via.is_some() {
                    DeliveryStatus::Sent
                } else {
                    DeliveryStatus::Failed
                },
                delivered_via,
                attempts,
                last_error,
                completed_at: Some(epoch_micros(Utc::now())),
            });
        }

        let sent = deliveries
            .iter()
            .filter(|d| d.status == DeliveryStatus::Sent)
            .count();
        let failed = deliveries.len() - sent;

        self.store
            .insert_alert(Alert {
                id: alert_id,
                alert_type: AlertType::EmergencyHalt,
                severity: AlertSeverity::Emergency,
                burn_request_id: None,
                message: format!("EMERGENCY: halt all burning immediately. {reason}."),
                deliveries,
                requires_ack: true,
                created_at: epoch_micros(Utc::now()),
            })
            .await?;

        info!(
            alert_id = %alert_id,
            cancelled = cancelled.len(),
            recipients = recipients.len(),
            "emergency broadcast complete"
        );

        Ok(EmergencyReport {
            alert_id,
            cancelled_requests: cancelled,
            sent,
            failed,
            per_channel,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::channels::testing::ScriptedGateway;
    use super::*;
    use crate::store::MemStore;

    fn recipient(id_hint: i64, channels_list: Vec<Channel>) -> AlertRecipient {
        AlertRecipient {
            id: id_hint,
            farm_id: Some(1),
            name: format!("Recipient {id_hint}"),
            phone: Some("+15551230001".to_string()),
            email: Some("r@example.com".to_string()),
            channels: channels_list,
            language: "en".to_string(),
        }
    }

    fn approval_vars() -> HashMap<String, String> {
        [
            ("farm_name", "Johnson Ranch"),
            ("burn_date", "2026-08-04"),
            ("window", "09:00-13:00"),
            ("priority", "7"),
        ]
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
    }

    fn service_with(gateway: Arc<ScriptedGateway>) -> (AlertService, Arc<MemStore>) {
        let store = Arc::new(MemStore::new());
        let config = AlertsConfig {
            retry: crate::config::RetryConfig {
                base_secs: 1,
                cap_secs: 2,
                max_attempts: 3,
            },
            ..AlertsConfig::default()
        };
        (
            AlertService::new(store.clone(), gateway.clone(), gateway, config),
            store,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn sent_plus_failed_equals_recipients() {
        let gateway = Arc::new(ScriptedGateway::default());
        let (service, _) = service_with(gateway);
        let report = service
            .send(AlertRequest {
                alert_type: AlertType::Approval,
                severity: AlertSeverity::Info,
                burn_request_id: Some(1),
                variables: approval_vars(),
                recipients: vec![
                    recipient(1, vec![Channel::Sms]),
                    recipient(2, vec![Channel::Email]),
                ],
            })
            .await
            .expect("send");
        assert_eq!(report.sent + report.failed, 2);
        assert_eq!(report.sent, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sms_failure_falls_back_to_email() {
        let gateway = Arc::new(ScriptedGateway {
            refuse_sms: true,
            ..ScriptedGateway::default()
        });
        let (service, _) = service_with(gateway.clone());
        let report = service
            .send(AlertRequest {
                alert_type: AlertType::Approval,
                severity: AlertSeverity::Warning,
                burn_request_id: Some(1),
                variables: approval_vars(),
                recipients: vec![recipient(1, vec![Channel::Sms, Channel::Email])],
            })
            .await
            .expect("send");
        assert_eq!(report.sent, 1);
        let record = &report.deliveries[0];
        assert_eq!(record.delivered_via, Some(Channel::Email));
        // SMS retried to exhaustion before the fallback
        assert!(record.attempts > 3);
        let delivered = gateway.deliveries();
        assert!(delivered.iter().any(|(ch, _, _)| ch == "email"));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_5xx_retries_then_succeeds() {
        let gateway = Arc::new(ScriptedGateway {
            failures_before_success: 2,
            ..ScriptedGateway::default()
        });
        let (service, _) = service_with(gateway);
        let report = service
            .send(AlertRequest {
                alert_type: AlertType::Approval,
                severity: AlertSeverity::Info,
                burn_request_id: None,
                variables: approval_vars(),
                recipients: vec![recipient(1, vec![Channel::Sms])],
            })
            .await
            .expect("send");
        assert_eq!(report.sent, 1);
        assert_eq!(report.deliveries[0].attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_template_variable_rejects_whole_send() {
        let gateway = Arc::new(ScriptedGateway::default());
        let (service, _) = service_with(gateway.clone());
        let err = service
            .send(AlertRequest {
                alert_type: AlertType::Approval,
                severity: AlertSeverity::Info,
                burn_request_id: None,
                variables: HashMap::new(),
                recipients: vec![recipient(1, vec![Channel::Sms])],
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(gateway.deliveries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cascade_escalates_only_unacknowledged() {
        use crate::store::spatial;
        use crate::types::{BurnRequest, CropType, Farm, GeoPoint, RequestStatus, TimeWindow};

        let gateway = Arc::new(ScriptedGateway::default());
        let (service, store) = service_with(gateway);

        let farm = store
            .insert_farm(Farm {
                id: 0,
                name: "Johnson Ranch".to_string(),
                owner_name: "Dale".to_string(),
                phone: "+15551230001".to_string(),
                email: "dale@example.com".to_string(),
                location: GeoPoint::new(38.58, -121.49),
                permit_number: None,
                total_area_hectares: 100.0,
                created_at: 0,
            })
            .await
            .expect("farm");
        let field = store
            .insert_field(crate::types::Field {
                id: 0,
                farm_id: farm.id,
                name: "N".to_string(),
                boundary: spatial::square_around(GeoPoint::new(38.58, -121.49), 500.0),
                area_hectares: 25.0,
                crop_type: CropType::Rice,
                last_burn_date: None,
            })
            .await
            .expect("field");
        let request = store
            .insert_request_with_prediction(
                BurnRequest {
                    id: 0,
                    field_id: field.id,
                    farm_id: farm.id,
                    burn_date: chrono::Utc::now().date_naive(),
                    window: TimeWindow::from_hours(9, 13),
                    fuel_load_t_per_ha: 15.0,
                    area_hectares: 25.0,
                    crop_type: CropType::Rice,
                    centroid: GeoPoint::new(38.58, -121.49),
                    status: RequestStatus::Pending,
                    priority_score: 6,
                    terrain_vector: vec![0.0; 32],
                    created_at: 0,
                    updated_at: 0,
                },
                None,
            )
            .await
            .expect("request");

        let first = store
            .insert_recipient(recipient(0, vec![Channel::Sms]))
            .await
            .expect("recipient");
        let second = store
            .insert_recipient(recipient(0, vec![Channel::Sms]))
            .await
            .expect("recipient");

        let vars: HashMap<String, String> = [
            ("burn_date".to_string(), "2026-08-04".to_string()),
            ("question".to_string(), "Confirm the new window?".to_string()),
        ]
        .into_iter()
        .collect();

        let report = service
            .send(AlertRequest {
                alert_type: AlertType::DecisionRequired,
                severity: AlertSeverity::Warning,
                burn_request_id: Some(request.id),
                variables: vars.clone(),
                recipients: vec![first.clone(), second.clone()],
            })
            .await
            .expect("send");

        // One of the two acknowledges.
        service
            .acknowledge(report.alert_id, first.id, Some("ok".to_string()))
            .await
            .expect("ack");

        let escalation = service
            .escalate_unacknowledged(report.alert_id, vars.clone())
            .await
            .expect("escalate")
            .expect("one recipient still pending");
        assert_eq!(escalation.sent + escalation.failed, 1);
        assert_eq!(escalation.deliveries[0].recipient_id, second.id);

        // After the second ack there is nothing left to escalate.
        service
            .acknowledge(report.alert_id, second.id, None)
            .await
            .expect("ack");
        let done = service
            .escalate_unacknowledged(report.alert_id, vars)
            .await
            .expect("escalate");
        assert!(done.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledge_tracks_and_rejects_strangers() {
        let gateway = Arc::new(ScriptedGateway::default());
        let (service, _) = service_with(gateway);
        let report = service
            .send(AlertRequest {
                alert_type: AlertType::DecisionRequired,
                severity: AlertSeverity::Urgent,
                burn_request_id: Some(1),
                variables: [
                    ("burn_date".to_string(), "2026-08-04".to_string()),
                    ("question".to_string(), "Accept the new window?".to_string()),
                ]
                .into_iter()
                .collect(),
                recipients: vec![recipient(7, vec![Channel::Sms])],
            })
            .await
            .expect("send");

        let (ack, follow_up) = service
            .acknowledge(report.alert_id, 7, Some("yes".to_string()))
            .await
            .expect("ack");
        assert_eq!(ack.recipient_id, 7);
        assert_eq!(follow_up, Some("coordinator_review"));

        // Unknown recipient
        let err = service
            .acknowledge(report.alert_id, 99, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        // Double-ack
        let err = service
            .acknowledge(report.alert_id, 7, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        // Unknown alert id
        let err = service
            .acknowledge(uuid::Uuid::new_v4(), 7, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
