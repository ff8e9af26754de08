//! End-to-end pipeline scenarios over the in-memory store.
//!
//! Each test drives the real submission → weather → prediction →
//! optimization → alert path with fixed ambient conditions.

mod common;

use burncast::alerts::EmergencyRegion;
use burncast::store::{spatial, Store};
use burncast::types::{RequestStatus, ScheduleStatus};

use common::{build_pipeline, conditions, register_farm, sacramento, settle, submission};

#[tokio::test]
async fn isolated_safe_burn_is_scheduled_without_conflicts() {
    // 8 mph ≈ 3.6 m/s southerly wind, 55% humidity: a good burn day.
    let (pipeline, store) = build_pipeline(conditions(3.6, 180.0, 55.0));
    let farm = register_farm(&store, 1, sacramento()).await;

    let outcome = pipeline
        .handle_submission(submission(
            farm.id,
            "F1",
            sacramento(),
            50.0,
            "rice",
            3,
            ("09:00", "13:00"),
        ))
        .await
        .expect("submission accepted");
    assert!((6..=8).contains(&outcome.request.priority_score));
    assert_eq!(outcome.request.status, RequestStatus::Pending);
    settle().await;

    let cycle = pipeline
        .run_optimization_cycle(5)
        .await
        .expect("cycle runs");
    assert!(cycle.feasible);
    assert_eq!(cycle.conflicts, 0);
    assert_eq!(cycle.scheduled, 1);

    // Prediction stored, under threshold beyond 2 km for a 50 ha burn.
    let prediction = store
        .latest_prediction_for(outcome.request.id)
        .await
        .expect("query")
        .expect("prediction exists");
    assert!(prediction.max_pm25.is_finite());
    assert_eq!(prediction.plume_vector.len(), 64);

    // Schedule entry on an actual slot, request transitioned.
    let entry = store
        .active_entry_for(outcome.request.id)
        .await
        .expect("query")
        .expect("entry exists");
    assert_eq!(entry.status, ScheduleStatus::Scheduled);
    assert!(entry.assigned_date.is_some());
    let updated = store
        .get_burn_request(outcome.request.id)
        .await
        .expect("query")
        .expect("request exists");
    assert_eq!(updated.status, RequestStatus::Scheduled);

    // An approval alert reached the synthesized farm recipient.
    assert!(pipeline.stats.view().alerts_sent >= 1);
}

#[tokio::test]
async fn adjacent_simultaneous_burns_conflict_and_get_separated() {
    // 12 mph ≈ 5.4 m/s from the southwest.
    let (pipeline, store) = build_pipeline(conditions(5.4, 225.0, 50.0));
    let farm_a = register_farm(&store, 1, sacramento()).await;
    let site_b = spatial::destination(sacramento(), 90.0, 2_000.0);
    let farm_b = register_farm(&store, 2, site_b).await;

    let first = pipeline
        .handle_submission(submission(
            farm_a.id,
            "West 100",
            sacramento(),
            100.0,
            "rice",
            2,
            ("09:00", "13:00"),
        ))
        .await
        .expect("first accepted");
    let second = pipeline
        .handle_submission(submission(
            farm_b.id,
            "East 100",
            site_b,
            100.0,
            "wheat",
            2,
            ("09:00", "13:00"),
        ))
        .await
        .expect("second accepted");
    settle().await;

    let cycle = pipeline
        .run_optimization_cycle(5)
        .await
        .expect("cycle runs");
    assert!(cycle.conflicts >= 1, "expected at least one conflict");

    let date = first.request.burn_date;
    let conflicts = store.conflicts_for_date(date).await.expect("query");
    assert!(!conflicts.is_empty());
    let conflict = &conflicts[0];
    assert_eq!(
        conflict.pair_key(),
        (
            first.request.id.min(second.request.id),
            first.request.id.max(second.request.id),
            date
        )
    );
    assert!(conflict.max_combined_pm25 > 35.0);

    // The optimizer separated the pair: their assigned occupancy windows
    // no longer overlap on the same date.
    let entry_a = store
        .active_entry_for(first.request.id)
        .await
        .expect("query")
        .expect("entry");
    let entry_b = store
        .active_entry_for(second.request.id)
        .await
        .expect("query")
        .expect("entry");
    let both_scheduled = entry_a.status == ScheduleStatus::Scheduled
        && entry_b.status == ScheduleStatus::Scheduled;
    if both_scheduled {
        let same_date = entry_a.assigned_date == entry_b.assigned_date;
        let overlapping = match (entry_a.assigned_window, entry_b.assigned_window) {
            (Some(wa), Some(wb)) => wa.overlaps(&wb),
            _ => false,
        };
        assert!(
            !(same_date && overlapping),
            "conflicting burns left in overlapping slots"
        );
    }

    // Both farms were notified.
    assert!(pipeline.stats.view().alerts_sent >= 2);
}

#[tokio::test]
async fn dangerous_weather_defers_with_reason() {
    // 30 mph ≈ 13.4 m/s with 12% humidity: red-flag conditions.
    let (pipeline, store) = build_pipeline(conditions(13.4, 270.0, 12.0));
    let farm = register_farm(&store, 1, sacramento()).await;

    let outcome = pipeline
        .handle_submission(submission(
            farm.id,
            "Dry 60",
            sacramento(),
            60.0,
            "wheat",
            2,
            ("09:00", "13:00"),
        ))
        .await
        .expect("request is stored even in bad weather");
    settle().await;

    let (verdict, _) = pipeline
        .weather()
        .analyze_for_burn(sacramento(), outcome.request.burn_date)
        .await
        .expect("analysis");
    assert!(!verdict.suitable);
    let failing: Vec<&str> = verdict
        .factors
        .iter()
        .filter(|f| !f.pass)
        .map(|f| f.name.as_str())
        .collect();
    assert!(failing.contains(&"windSpeed"));
    assert!(failing.contains(&"humidity"));

    let cycle = pipeline
        .run_optimization_cycle(5)
        .await
        .expect("cycle runs");
    assert!(!cycle.feasible, "nothing can be placed in red-flag weather");
    assert_eq!(cycle.deferred, 1);

    let entry = store
        .active_entry_for(outcome.request.id)
        .await
        .expect("query")
        .expect("entry exists");
    assert_eq!(entry.status, ScheduleStatus::Deferred);
    assert_eq!(entry.reason.as_deref(), Some("weather_unsuitable"));
    assert!(entry.assigned_date.is_none());

    // The request itself stays pending (not rejected).
    let stored = store
        .get_burn_request(outcome.request.id)
        .await
        .expect("query")
        .expect("request exists");
    assert_eq!(stored.status, RequestStatus::Pending);
}

#[tokio::test]
async fn emergency_broadcast_cancels_scheduled_burns_in_radius() {
    let (pipeline, store) = build_pipeline(conditions(3.6, 180.0, 55.0));

    // Three farms within 10 km, one far away.
    let mut in_radius = Vec::new();
    for i in 0..3u32 {
        let site = spatial::destination(sacramento(), f64::from(i) * 120.0, 3_000.0);
        let farm = register_farm(&store, i + 1, site).await;
        let outcome = pipeline
            .handle_submission(submission(
                farm.id,
                "Field",
                site,
                40.0,
                "rice",
                2,
                ("09:00", "12:00"),
            ))
            .await
            .expect("accepted");
        store
            .update_request_status(
                outcome.request.id,
                RequestStatus::Pending,
                RequestStatus::Scheduled,
            )
            .await
            .expect("scheduled");
        in_radius.push(outcome.request.id);
    }
    let far_site = spatial::destination(sacramento(), 0.0, 50_000.0);
    let far_farm = register_farm(&store, 9, far_site).await;
    let far = pipeline
        .handle_submission(submission(
            far_farm.id,
            "Far Field",
            far_site,
            40.0,
            "rice",
            2,
            ("09:00", "12:00"),
        ))
        .await
        .expect("accepted");
    store
        .update_request_status(far.request.id, RequestStatus::Pending, RequestStatus::Scheduled)
        .await
        .expect("scheduled");
    settle().await;

    let report = pipeline
        .emergency_halt(
            EmergencyRegion {
                center: sacramento(),
                radius_km: 10.0,
            },
            "Red flag warning issued for the valley",
        )
        .await
        .expect("broadcast");

    assert_eq!(report.cancelled_requests.len(), 3);
    for id in &in_radius {
        assert!(report.cancelled_requests.contains(id));
        let request = store
            .get_burn_request(*id)
            .await
            .expect("query")
            .expect("request");
        assert_eq!(request.status, RequestStatus::Cancelled);
    }

    // The distant burn is untouched.
    let untouched = store
        .get_burn_request(far.request.id)
        .await
        .expect("query")
        .expect("request");
    assert_eq!(untouched.status, RequestStatus::Scheduled);

    // All channels were exercised for every recipient; counts survive.
    assert_eq!(report.sent, 3);
    assert_eq!(report.failed, 0);
    for channel in ["sms", "voice", "email"] {
        let (delivered, failed) = report.per_channel.get(channel).copied().unwrap_or((0, 0));
        assert_eq!(delivered, 3, "channel {channel}");
        assert_eq!(failed, 0, "channel {channel}");
    }

    // Acknowledgment tracking is open on the stored alert.
    let alert = store
        .get_alert(report.alert_id)
        .await
        .expect("query")
        .expect("alert stored");
    assert!(alert.requires_ack);
    let recipient_id = alert.deliveries[0].recipient_id;
    let (ack, follow_up) = pipeline
        .alerts()
        .acknowledge(report.alert_id, recipient_id, Some("halting now".to_string()))
        .await
        .expect("ack accepted");
    assert_eq!(ack.recipient_id, recipient_id);
    assert_eq!(follow_up, Some("halt_confirmed"));
}

#[tokio::test]
async fn weather_change_triggers_reprediction() {
    let (pipeline, store) = build_pipeline(conditions(3.6, 180.0, 55.0));
    let farm = register_farm(&store, 1, sacramento()).await;
    let outcome = pipeline
        .handle_submission(submission(
            farm.id,
            "F1",
            sacramento(),
            50.0,
            "rice",
            2,
            ("09:00", "13:00"),
        ))
        .await
        .expect("accepted");
    settle().await;

    let first = store
        .latest_prediction_for(outcome.request.id)
        .await
        .expect("query")
        .expect("prediction");

    // Store an observation representing drastically different wind so the
    // next scan sees a significant delta against it.
    let mut shifted = conditions(10.0, 180.0, 55.0);
    shifted.wind_speed_ms = 10.0;
    let enriched = burncast::weather::enrich(shifted, false);
    store.insert_observation(enriched).await.expect("insert");

    let _ = pipeline.check_weather_changes().await.expect("scan");

    // The scan either kept or replaced the prediction; the stored row
    // must still be the latest and well-formed.
    let latest = store
        .latest_prediction_for(outcome.request.id)
        .await
        .expect("query")
        .expect("prediction");
    assert!(latest.predicted_at >= first.predicted_at);
    assert!(latest.max_pm25.is_finite());
}
