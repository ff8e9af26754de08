//! Process-wide orchestrator.
//!
//! Drives a submission through Coordinator → Weather → Predictor, batches
//! pending burns into optimizer runs, re-runs prediction when weather
//! shifts, and owns the component handles for the process lifetime.
//! The coordinator stage runs synchronously (the client gets its request
//! id and priority); weather + prediction complete asynchronously but are
//! backstopped at the start of every optimization cycle, so no request
//! enters a run without a prediction or a recorded failure.

pub mod change_detector;
pub mod state;

pub use state::{PipelineStats, ScheduleBoard, ScheduleSnapshot, StatsView};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Timelike, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::alerts::{AlertRequest, AlertService, EmergencyRegion, EmergencyReport};
use crate::config::defaults::{
    DEADLINE_OPTIMIZER_SECS, DEADLINE_SUBMISSION_SECS, OPTIMIZATION_CYCLE_SECS,
};
use crate::coordinator::{Coordinator, SubmissionOutcome, SubmitBurnRequest};
use crate::error::{AppError, Result};
use crate::optimizer::{OptimizationInput, Optimizer, WeatherTable};
use crate::predictor::Predictor;
use crate::store::Store;
use crate::types::{
    epoch_micros, AlertRecipient, AlertSeverity, AlertType, BurnRequest, Channel, Conflict,
    RequestStatus, ScheduleStatus,
};
use crate::weather::{suitability, WeatherService};

/// Outcome of one optimization cycle.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub run_id: uuid::Uuid,
    pub scheduled: usize,
    pub deferred: usize,
    pub rejected: usize,
    pub conflicts: usize,
    pub feasible: bool,
}

/// See module docs.
pub struct Pipeline {
    store: Arc<dyn Store>,
    coordinator: Coordinator,
    weather: Arc<WeatherService>,
    predictor: Arc<Predictor>,
    optimizer: Optimizer,
    alerts: Arc<AlertService>,
    pub stats: Arc<PipelineStats>,
    pub board: ScheduleBoard,
    shutdown: CancellationToken,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn Store>,
        coordinator: Coordinator,
        weather: Arc<WeatherService>,
        predictor: Arc<Predictor>,
        optimizer: Optimizer,
        alerts: Arc<AlertService>,
    ) -> Self {
        Self {
            store,
            coordinator,
            weather,
            predictor,
            optimizer,
            alerts,
            stats: Arc::new(PipelineStats::default()),
            board: ScheduleBoard::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn weather(&self) -> &Arc<WeatherService> {
        &self.weather
    }

    pub fn predictor(&self) -> &Arc<Predictor> {
        &self.predictor
    }

    pub fn alerts(&self) -> &Arc<AlertService> {
        &self.alerts
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    /// Submission entry point: coordinator synchronously, weather +
    /// prediction spawned behind the ack.
    pub async fn handle_submission(&self, request: SubmitBurnRequest) -> Result<SubmissionOutcome> {
        let cached = if request.field_boundary.is_empty() {
            None
        } else {
            self.weather
                .cached_current(request.field_boundary.centroid())
        };

        let outcome = tokio::time::timeout(
            Duration::from_secs(DEADLINE_SUBMISSION_SECS),
            self.coordinator.submit(request, cached.as_ref()),
        )
        .await
        .map_err(|_| AppError::timeout("submission deadline exceeded"))??;

        PipelineStats::bump(&self.stats.submissions);

        // Weather + prediction follow asynchronously; the cycle backstop
        // covers the window before the next run.
        let weather = Arc::clone(&self.weather);
        let predictor = Arc::clone(&self.predictor);
        let stats = Arc::clone(&self.stats);
        let stored = outcome.request.clone();
        tokio::spawn(async move {
            let result = match weather.fetch_current(stored.centroid).await {
                Ok((observation, _)) => predictor
                    .predict_and_store(&stored, &observation)
                    .await
                    .map(|_| ()),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => PipelineStats::bump(&stats.predictions),
                Err(e) => {
                    PipelineStats::bump(&stats.stage_failures);
                    warn!(request_id = stored.id, error = %e, "async prediction stage failed");
                }
            }
        });

        Ok(outcome)
    }

    /// Weather fetch + plume prediction for one request.
    async fn run_prediction_stage(&self, request: &BurnRequest) -> Result<()> {
        let (observation, _) = self.weather.fetch_current(request.centroid).await?;
        self.predictor
            .predict_and_store(request, &observation)
            .await?;
        PipelineStats::bump(&self.stats.predictions);
        Ok(())
    }

    /// One full optimization cycle over `horizon_days`.
    pub async fn run_optimization_cycle(&self, horizon_days: i64) -> Result<CycleOutcome> {
        let cancel = self.shutdown.child_token();
        let today = Utc::now().date_naive();
        let horizon_days = horizon_days.clamp(1, 7);

        // Collect the working set: pending + scheduled across the horizon.
        let mut requests: Vec<BurnRequest> = Vec::new();
        for offset in 0..horizon_days {
            let date = today + chrono::Duration::days(offset);
            requests.extend(self.store.requests_for_date(date).await?);
        }
        requests.sort_by_key(|r| r.id);

        if requests.is_empty() {
            debug!("optimization cycle: nothing to schedule");
            return Ok(CycleOutcome {
                run_id: uuid::Uuid::new_v4(),
                scheduled: 0,
                deferred: 0,
                rejected: 0,
                conflicts: 0,
                feasible: true,
            });
        }

        // Backstop: every request needs a prediction (or a recorded
        // failure) before the run sees it.
        let mut predicted_pm25: HashMap<i64, f64> = HashMap::new();
        for request in &requests {
            match self.store.latest_prediction_for(request.id).await? {
                Some(pred) => {
                    predicted_pm25.insert(request.id, pred.max_pm25);
                }
                None => match self.run_prediction_stage(request).await {
                    Ok(()) => {
                        if let Some(pred) =
                            self.store.latest_prediction_for(request.id).await?
                        {
                            predicted_pm25.insert(request.id, pred.max_pm25);
                        }
                    }
                    Err(e) => {
                        PipelineStats::bump(&self.stats.stage_failures);
                        warn!(request_id = request.id, error = %e, "prediction backstop failed");
                    }
                },
            }
        }

        // Conflict detection per horizon date.
        let mut conflicts: Vec<Conflict> = Vec::new();
        for offset in 0..horizon_days {
            let date = today + chrono::Duration::days(offset);
            match self.predictor.detect_all_conflicts_for(date, &cancel).await {
                Ok(found) => conflicts.extend(found),
                Err(e) if e.kind == crate::error::ErrorKind::Precondition => {
                    debug!(date = %date, error = %e, "conflict detection skipped");
                }
                Err(e) => return Err(e),
            }
        }
        PipelineStats::add(&self.stats.conflicts_detected, conflicts.len() as u64);

        let weather_table = self.build_weather_table(&requests, today, horizon_days).await;
        let input = OptimizationInput::new(
            requests.clone(),
            conflicts.clone(),
            weather_table,
            predicted_pm25,
            today,
            horizon_days,
        );

        // The SA loop is CPU-bound; run it off the async workers under the
        // optimizer deadline.
        let optimizer_params = self.optimizer.params().clone();
        let run_cancel = cancel.clone();
        let outcome = tokio::time::timeout(
            Duration::from_secs(DEADLINE_OPTIMIZER_SECS),
            tokio::task::spawn_blocking(move || {
                Optimizer::new(optimizer_params).optimize(&input, None, &run_cancel)
            }),
        )
        .await
        .map_err(|_| AppError::timeout("optimizer deadline exceeded"))?
        .map_err(|e| AppError::internal(format!("optimizer task: {e}")))??;

        // Persist schedule rows and apply status transitions.
        let entries = outcome.to_entries(epoch_micros(Utc::now()));
        self.store.replace_schedule_entries(entries).await?;

        let mut scheduled = 0;
        let mut deferred = 0;
        let mut rejected = 0;
        for assignment in &outcome.assignments {
            let Some(request) = requests.iter().find(|r| r.id == assignment.request_id) else {
                continue;
            };
            match assignment.status {
                ScheduleStatus::Scheduled => {
                    scheduled += 1;
                    if request.status == RequestStatus::Pending {
                        self.transition(request.id, RequestStatus::Pending, RequestStatus::Scheduled)
                            .await;
                    }
                }
                ScheduleStatus::Deferred => {
                    deferred += 1;
                    if request.status == RequestStatus::Scheduled {
                        self.transition(request.id, RequestStatus::Scheduled, RequestStatus::Pending)
                            .await;
                    }
                }
                ScheduleStatus::Rejected => {
                    rejected += 1;
                    if request.status == RequestStatus::Pending {
                        self.transition(request.id, RequestStatus::Pending, RequestStatus::Rejected)
                            .await;
                    }
                }
            }
        }

        let feasible = outcome.any_scheduled || requests.is_empty();
        self.board.publish(ScheduleSnapshot {
            run_id: outcome.run_id,
            generated_at: epoch_micros(Utc::now()),
            assignments: outcome.assignments.clone(),
            improvements: outcome.improvements.clone(),
            feasible,
        });
        PipelineStats::bump(&self.stats.cycles);

        self.notify_outcomes(&requests, &outcome.assignments, &conflicts)
            .await;

        info!(
            run_id = %outcome.run_id,
            scheduled,
            deferred,
            rejected,
            conflicts = conflicts.len(),
            "optimization cycle complete"
        );

        Ok(CycleOutcome {
            run_id: outcome.run_id,
            scheduled,
            deferred,
            rejected,
            conflicts: conflicts.len(),
            feasible,
        })
    }

    /// Weather-change scan: refetch current conditions per distinct site;
    /// significant deltas invalidate predictions and re-run the predictor.
    pub async fn check_weather_changes(&self) -> Result<usize> {
        let today = Utc::now().date_naive();
        let mut requests: Vec<BurnRequest> = Vec::new();
        for offset in 0..7 {
            let date = today + chrono::Duration::days(offset);
            requests.extend(self.store.requests_for_date(date).await?);
        }

        let mut rerun = 0;
        for request in &requests {
            let previous = self
                .weather
                .last_stored_near(request.centroid, Duration::from_secs(6 * 3_600))
                .await?;
            let (current, _) = match self.weather.fetch_current(request.centroid).await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(request_id = request.id, error = %e, "weather refresh failed");
                    continue;
                }
            };

            if let Some(prev) = previous {
                if let Some(kind) = change_detector::significant_change(&prev, &current) {
                    info!(
                        request_id = request.id,
                        change = kind.as_str(),
                        "weather change invalidates prediction"
                    );
                    self.store.invalidate_predictions(&[request.id]).await?;
                    if let Err(e) = self.predictor.predict_and_store(request, &current).await {
                        warn!(request_id = request.id, error = %e, "re-prediction failed");
                    } else {
                        rerun += 1;
                    }
                }
            }
        }
        Ok(rerun)
    }

    /// Emergency halt path: cancel scheduled burns in the region, notify
    /// everyone, and drop the schedule snapshot so the next cycle rebuilds.
    pub async fn emergency_halt(
        &self,
        region: EmergencyRegion,
        reason: &str,
    ) -> Result<EmergencyReport> {
        let report = self.alerts.emergency_broadcast(region, reason).await?;
        PipelineStats::add(&self.stats.alerts_sent, report.sent as u64);
        Ok(report)
    }

    /// Periodic driver: optimization cycles + weather-change scans until
    /// shutdown.
    pub fn spawn_periodic(self: Arc<Self>, horizon_days: i64) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(OPTIMIZATION_CYCLE_SECS));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        info!("pipeline periodic loop stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        self.weather.evict_stale_cache();
                        if let Err(e) = self.check_weather_changes().await {
                            error!(error = %e, "weather change scan failed");
                        }
                        if let Err(e) = self.run_optimization_cycle(horizon_days).await {
                            error!(error = %e, "optimization cycle failed");
                        }
                    }
                }
            }
        })
    }

    async fn transition(&self, id: i64, from: RequestStatus, to: RequestStatus) {
        if let Err(e) = self.store.update_request_status(id, from, to).await {
            PipelineStats::bump(&self.stats.stage_failures);
            warn!(request_id = id, error = %e, "status transition failed");
        }
    }

    /// Build the per-slot suitability table from the forecast at the
    /// working set's mean location.
    async fn build_weather_table(
        &self,
        requests: &[BurnRequest],
        today: NaiveDate,
        horizon_days: i64,
    ) -> WeatherTable {
        let (mut lat, mut lon) = (0.0, 0.0);
        for r in requests {
            lat += r.centroid.lat;
            lon += r.centroid.lon;
        }
        let n = requests.len().max(1) as f64;
        let center = crate::types::GeoPoint::new(lat / n, lon / n);

        match self.weather.fetch_forecast(center, horizon_days as u32).await {
            Ok((forecast, _)) => {
                let mut scores = HashMap::new();
                for obs in &forecast {
                    if let Some(t) = Utc.timestamp_micros(obs.observed_at).single() {
                        let date = t.date_naive();
                        if date < today {
                            continue;
                        }
                        // Slots are local solar hours; shift the UTC
                        // forecast hour by longitude (15° per hour).
                        let local_hour = ((f64::from(t.hour()) + center.lon / 15.0)
                            .rem_euclid(24.0)) as u32
                            % 24;
                        let verdict = suitability::analyze(obs);
                        scores.insert((date, local_hour), verdict.score);
                    }
                }
                WeatherTable::new(scores, 0.0)
            }
            Err(e) => {
                // With no forecast the optimizer falls back to a neutral
                // score rather than inventing good weather.
                warn!(error = %e, "forecast unavailable — using neutral weather table");
                WeatherTable::uniform(0.5)
            }
        }
    }

    /// Owner notifications after a cycle.
    async fn notify_outcomes(
        &self,
        requests: &[BurnRequest],
        assignments: &[crate::optimizer::AssignmentOutcome],
        conflicts: &[Conflict],
    ) {
        for assignment in assignments {
            let Some(request) = requests.iter().find(|r| r.id == assignment.request_id) else {
                continue;
            };
            let Some(recipients) = self.recipients_for_farm(request.farm_id).await else {
                continue;
            };
            let Some(farm) = self.store.get_farm(request.farm_id).await.ok().flatten() else {
                continue;
            };

            let (alert_type, severity, variables) = match assignment.status {
                ScheduleStatus::Scheduled => {
                    let window = assignment
                        .assigned_window
                        .map(|w| w.format())
                        .unwrap_or_else(|| request.window.format());
                    let date = assignment
                        .assigned_date
                        .unwrap_or(request.burn_date)
                        .to_string();
                    (
                        AlertType::Approval,
                        AlertSeverity::Info,
                        HashMap::from([
                            ("farm_name".to_string(), farm.name.clone()),
                            ("burn_date".to_string(), date),
                            ("window".to_string(), window),
                            ("priority".to_string(), request.priority_score.to_string()),
                        ]),
                    )
                }
                ScheduleStatus::Deferred
                    if assignment.reason.as_deref() == Some("weather_unsuitable") =>
                {
                    (
                        AlertType::WeatherUnsuitable,
                        AlertSeverity::Warning,
                        HashMap::from([
                            ("farm_name".to_string(), farm.name.clone()),
                            ("burn_date".to_string(), request.burn_date.to_string()),
                            (
                                "factors".to_string(),
                                "wind or humidity outside the safe band".to_string(),
                            ),
                        ]),
                    )
                }
                ScheduleStatus::Deferred | ScheduleStatus::Rejected => {
                    let reason = assignment
                        .reason
                        .clone()
                        .unwrap_or_else(|| "rescheduling".to_string());
                    (
                        AlertType::ScheduleChange,
                        AlertSeverity::Warning,
                        HashMap::from([
                            ("farm_name".to_string(), farm.name.clone()),
                            ("burn_date".to_string(), request.burn_date.to_string()),
                            ("window".to_string(), request.window.format()),
                            ("reason".to_string(), reason),
                        ]),
                    )
                }
            };

            match self
                .alerts
                .send(AlertRequest {
                    alert_type,
                    severity,
                    burn_request_id: Some(request.id),
                    variables,
                    recipients,
                })
                .await
            {
                Ok(report) => PipelineStats::add(&self.stats.alerts_sent, report.sent as u64),
                Err(e) => {
                    PipelineStats::bump(&self.stats.stage_failures);
                    warn!(request_id = request.id, error = %e, "outcome alert failed");
                }
            }
        }

        // Conflict notices go to both parties.
        for conflict in conflicts {
            for request_id in [conflict.request_a, conflict.request_b] {
                let Some(request) = requests.iter().find(|r| r.id == request_id) else {
                    continue;
                };
                let Some(recipients) = self.recipients_for_farm(request.farm_id).await else {
                    continue;
                };
                let variables = HashMap::from([
                    ("burn_date".to_string(), conflict.date.to_string()),
                    (
                        "combined_pm25".to_string(),
                        format!("{:.0}", conflict.max_combined_pm25),
                    ),
                    ("severity".to_string(), conflict.severity.to_string()),
                ]);
                if let Err(e) = self
                    .alerts
                    .send(AlertRequest {
                        alert_type: AlertType::ConflictNotice,
                        severity: AlertSeverity::Warning,
                        burn_request_id: Some(request_id),
                        variables,
                        recipients,
                    })
                    .await
                {
                    warn!(request_id, error = %e, "conflict notice failed");
                }
            }
        }
    }

    /// Farm recipients, synthesized from the farm contact when none are
    /// registered.
    async fn recipients_for_farm(&self, farm_id: i64) -> Option<Vec<AlertRecipient>> {
        match self.store.recipients_for_farms(&[farm_id]).await {
            Ok(recipients) if !recipients.is_empty() => Some(recipients),
            Ok(_) => {
                let farm = self.store.get_farm(farm_id).await.ok().flatten()?;
                let recipient = self
                    .store
                    .insert_recipient(AlertRecipient {
                        id: 0,
                        farm_id: Some(farm.id),
                        name: farm.owner_name.clone(),
                        phone: Some(farm.phone.clone()),
                        email: Some(farm.email.clone()),
                        channels: vec![Channel::Sms, Channel::Email],
                        language: "en".to_string(),
                    })
                    .await
                    .ok()?;
                Some(vec![recipient])
            }
            Err(e) => {
                warn!(farm_id, error = %e, "recipient lookup failed");
                None
            }
        }
    }

    /// Health summary for the API.
    pub async fn component_health(&self) -> HashMap<&'static str, bool> {
        let mut components = HashMap::new();
        components.insert("store", self.store.health_check().await.is_ok());
        components.insert("weather_provider", self.weather.probe().await.is_ok());
        components.insert("alerts", true);
        components
    }
}
