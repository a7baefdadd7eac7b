// Expiration sweep tests
//
// The sweep expires open payments past their deadline (timers lost on
// restart) and cancels unpaid bookings past their payment deadline,
// releasing their seats.

#[path = "../helpers/mod.rs"]
mod helpers;

use chrono::{Duration as ChronoDuration, Utc};
use fleetpay::config::{BookingConfig, EngineSettings};
use fleetpay::modules::bookings::BookingStatus;
use fleetpay::modules::payments::services::SweepReport;
use fleetpay::modules::payments::PaymentStatus;
use helpers::*;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

/// Bookings whose payment deadline is already behind them
fn lapsed_booking_settings() -> EngineSettings {
    EngineSettings {
        booking: BookingConfig {
            payment_deadline_hours: -1,
        },
        ..EngineSettings::default()
    }
}

#[tokio::test]
async fn test_sweep_cancels_overdue_unpaid_booking() {
    let engine = TestEngine::with_settings(lapsed_booking_settings());
    let trip = engine.seed_trip(4, dec!(600)).await;
    let booking = engine.book(&trip.id, &["1", "2"]).await.unwrap();
    assert_eq!(engine.trip(&trip.id).await.available_seats, 2);

    let checker = engine.state.expiration_checker(Duration::from_secs(60));
    let report = checker.run_once().await.unwrap();

    assert_eq!(
        report,
        SweepReport {
            expired_payments: 0,
            cancelled_bookings: 1,
        }
    );
    assert_eq!(engine.booking(&booking.id).await.status, BookingStatus::Cancelled);
    let trip = engine.trip(&trip.id).await;
    assert_eq!(trip.available_seats, 4);
    assert_eq!(trip.booked_seats, 0);

    // The released seats can be booked again; the new booking lapses too
    let rebooked = engine.book(&trip.id, &["1", "2"]).await.unwrap();
    let report = checker.run_once().await.unwrap();
    assert_eq!(report.cancelled_bookings, 1);
    assert_eq!(engine.booking(&rebooked.id).await.status, BookingStatus::Cancelled);
    assert_eq!(engine.booking(&booking.id).await.status, BookingStatus::Cancelled);
}

#[tokio::test]
async fn test_sweep_skips_booking_with_open_payment() {
    let engine = TestEngine::with_settings(lapsed_booking_settings());
    let trip = engine.seed_trip(4, dec!(600)).await;
    let booking = engine.book(&trip.id, &["3"]).await.unwrap();
    engine.pay(&booking).await.unwrap();

    let report = engine
        .state
        .expiration_checker(Duration::from_secs(60))
        .run_once()
        .await
        .unwrap();

    assert_eq!(report, SweepReport::default());
    assert_eq!(engine.booking(&booking.id).await.status, BookingStatus::Pending);
    assert_eq!(engine.trip(&trip.id).await.available_seats, 3);
}

#[tokio::test]
async fn test_sweep_never_touches_paid_booking() {
    let engine = TestEngine::with_settings(lapsed_booking_settings());
    let trip = engine.seed_trip(4, dec!(600)).await;
    let booking = engine.book(&trip.id, &["1"]).await.unwrap();
    let initiated = engine.pay(&booking).await.unwrap();
    engine
        .state
        .orchestrator
        .handle_callback(stk_success(
            initiated.gateway_request_id.as_deref().unwrap(),
            600,
            "SWEEP01",
        ))
        .await
        .unwrap();

    let report = engine
        .state
        .expiration_checker(Duration::from_secs(60))
        .run_once()
        .await
        .unwrap();

    assert_eq!(report, SweepReport::default());
    assert_eq!(engine.booking(&booking.id).await.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn test_sweep_expires_payment_whose_timer_was_lost() {
    let engine = TestEngine::with_settings(lapsed_booking_settings());
    let trip = engine.seed_trip(4, dec!(600)).await;
    let booking = engine.book(&trip.id, &["1"]).await.unwrap();
    let initiated = engine.pay(&booking).await.unwrap();

    // Simulate a restart: the in-memory timer is gone
    assert!(engine.state.timers.cancel(&initiated.payment_id));

    let orchestrator = &engine.state.orchestrator;
    assert_eq!(orchestrator.expire_overdue(Utc::now(), 50).await.unwrap(), 0);

    let later = Utc::now() + ChronoDuration::minutes(3);
    assert_eq!(orchestrator.expire_overdue(later, 50).await.unwrap(), 1);
    assert_eq!(
        engine.payment(&initiated.payment_id).await.status,
        PaymentStatus::Expired
    );

    // A second pass finds nothing
    assert_eq!(orchestrator.expire_overdue(later, 50).await.unwrap(), 0);

    // With the payment settled the lapsed booking is released
    let report = engine
        .state
        .expiration_checker(Duration::from_secs(60))
        .run_once()
        .await
        .unwrap();
    assert_eq!(report.cancelled_bookings, 1);
    assert_eq!(engine.booking(&booking.id).await.status, BookingStatus::Cancelled);
}

#[tokio::test]
async fn test_booking_within_deadline_is_kept() {
    let engine = TestEngine::new();
    let trip = engine.seed_trip(4, dec!(600)).await;
    let booking = engine.book(&trip.id, &["1"]).await.unwrap();

    let report = engine
        .state
        .expiration_checker(Duration::from_secs(60))
        .run_once()
        .await
        .unwrap();

    assert_eq!(report, SweepReport::default());
    assert_eq!(engine.booking(&booking.id).await.status, BookingStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn test_background_checker_runs_on_interval() {
    let engine = TestEngine::with_settings(lapsed_booking_settings());
    let trip = engine.seed_trip(4, dec!(600)).await;

    let checker = Arc::new(engine.state.expiration_checker(Duration::from_secs(30)));
    let task = tokio::spawn(checker.start());

    let first = engine.book(&trip.id, &["1"]).await.unwrap();
    tokio::time::sleep(Duration::from_secs(31)).await;
    engine.settle().await;
    assert_eq!(engine.booking(&first.id).await.status, BookingStatus::Cancelled);

    let second = engine.book(&trip.id, &["2"]).await.unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    engine.settle().await;
    assert_eq!(engine.booking(&second.id).await.status, BookingStatus::Cancelled);
    assert_eq!(engine.trip(&trip.id).await.available_seats, 4);

    task.abort();
}
