// Property-based tests for seat allocation
//
// Random sequences of bookings and cancellations must keep the trip counters
// consistent and the seats of active bookings pairwise disjoint.

#[path = "../helpers/mod.rs"]
mod helpers;

use fleetpay::modules::bookings::models::{Booking, BookingStatus};
use fleetpay::modules::bookings::services::{normalize_seat_request, SeatLedger, SeatState};
use fleetpay::modules::bookings::BookingRepository;
use chrono::{Duration, Utc};
use fleetpay::modules::trips::Trip;
use helpers::*;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use rust_decimal_macros::dec;
use std::collections::BTreeSet;

const TOTAL_SEATS: u32 = 8;

#[derive(Debug, Clone)]
enum Op {
    Book(Vec<u32>),
    Cancel(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => prop::collection::vec(1..=TOTAL_SEATS, 1..4).prop_map(Op::Book),
        1 => any::<usize>().prop_map(Op::Cancel),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn check_invariants(trip_booked: u32, trip_available: u32, active: &[Booking]) -> Result<(), TestCaseError> {
    prop_assert_eq!(trip_booked + trip_available, TOTAL_SEATS);

    let held: u32 = active.iter().map(|b| b.seats_booked).sum();
    prop_assert_eq!(held, trip_booked);

    let mut seen = BTreeSet::new();
    for booking in active {
        prop_assert!(booking.status.is_active());
        prop_assert_eq!(booking.seat_numbers.len() as u32, booking.seats_booked);
        for seat in &booking.seat_numbers {
            prop_assert!(seen.insert(seat.clone()), "seat {} sold twice", seat);
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_bookings_never_double_sell(ops in prop::collection::vec(op_strategy(), 1..25)) {
        runtime().block_on(async {
            let engine = TestEngine::new();
            let trip = engine.seed_trip(TOTAL_SEATS, dec!(750)).await;
            let mut created: Vec<String> = Vec::new();

            for op in ops {
                match op {
                    Op::Book(seats) => {
                        let labels: Vec<String> = seats.iter().map(u32::to_string).collect();
                        let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
                        if let Ok(booking) = engine.book(&trip.id, &refs).await {
                            created.push(booking.id);
                        }
                    }
                    Op::Cancel(index) if !created.is_empty() => {
                        let id = &created[index % created.len()];
                        engine.state.bookings.cancel_booking(id).await.expect("cancel");
                    }
                    Op::Cancel(_) => {}
                }

                let current = engine.trip(&trip.id).await;
                let active = engine.repos.bookings.find_active_by_trip(&trip.id).await.expect("active");
                check_invariants(current.booked_seats, current.available_seats, &active)?;

                let view = engine.state.bookings.seat_availability(&trip.id).await.expect("view");
                let taken = view.seats.iter().filter(|s| s.state != SeatState::Available).count();
                prop_assert_eq!(taken as u32, current.booked_seats);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_normalized_request_is_sorted_unique_and_in_range(
        seats in prop::collection::btree_set(1..=TOTAL_SEATS, 1..=TOTAL_SEATS as usize)
    ) {
        // Reverse order plus leading zeros still names the same seats
        let labels: Vec<String> = seats.iter().rev().map(|s| format!("0{}", s)).collect();
        let normalized = normalize_seat_request(&labels, Some(labels.len() as u32), TOTAL_SEATS)
            .expect("valid request");

        prop_assert_eq!(normalized, seats.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn prop_trip_counters_survive_reserve_and_release(
        steps in prop::collection::vec((any::<bool>(), 1u32..4), 1..30)
    ) {
        let mut trip = Trip::new("NRB-KSM-01", dec!(1200), TOTAL_SEATS, Utc::now() + Duration::days(1))
            .expect("valid trip");
        let mut held: Vec<u32> = Vec::new();

        for (reserve, seats) in steps {
            if reserve {
                let fits = trip.available_seats >= seats;
                prop_assert_eq!(trip.reserve(seats).is_ok(), fits);
                if fits {
                    held.push(seats);
                }
            } else if let Some(seats) = held.pop() {
                trip.release(seats);
            }

            prop_assert!(trip.counters_consistent());
            prop_assert_eq!(trip.booked_seats, held.iter().sum::<u32>());
        }
    }
}

#[test]
fn test_duplicate_seat_in_request_is_rejected() {
    let labels = vec!["3".to_string(), "03".to_string()];
    assert!(normalize_seat_request(&labels, None, TOTAL_SEATS).is_err());
}

#[test]
fn test_cancelled_booking_frees_its_seats_in_the_ledger() {
    let mut booking = Booking::new_pending("trip-1", dec!(100), vec!["2".to_string()], passenger(), 24);
    booking.cancel().expect("cancel pending");

    let ledger = SeatLedger::from_bookings([&booking]);
    assert!(!ledger.is_taken(2));
    assert!(ledger.conflicts(&[2]).is_empty());
}
