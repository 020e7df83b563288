use bevy_ecs::prelude::{Commands, Query, Res, ResMut};

use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject};
use crate::config::SearchPolicy;
use crate::ecs::{Booking, BookingState, EngagedDrivers};
use crate::providers::CandidateProviderResource;
use crate::ranking::rank;
use crate::systems::finish_booking;
use crate::telemetry::DispatchTelemetry;
use crate::types::FailureReason;

/// Gathers candidates around the pickup, ranks them, and hands the booking to
/// the proposal pipeline. An empty pool widens the radius once before the
/// booking exhausts with `NoDriversFound`.
///
/// The provider already filters by online/available status and location
/// freshness; vehicle-type compatibility and exclusion of drivers this
/// coordinator already engaged are enforced here regardless.
pub fn candidate_search_system(
    mut clock: ResMut<DispatchClock>,
    event: Res<CurrentEvent>,
    policy: Res<SearchPolicy>,
    provider: Res<CandidateProviderResource>,
    engaged: Res<EngagedDrivers>,
    mut telemetry: ResMut<DispatchTelemetry>,
    mut commands: Commands,
    mut bookings: Query<&mut Booking>,
) {
    if event.0.kind != EventKind::CandidateSearch {
        return;
    }
    let Some(EventSubject::Booking(entity)) = event.0.subject.clone() else {
        return;
    };
    let Ok(mut booking) = bookings.get_mut(entity) else {
        return;
    };
    if booking.state != BookingState::Searching {
        return;
    }

    let now = clock.now();
    let required_vehicle = policy.required_vehicle(&booking.request);
    let found = match provider.find_available(
        booking.request.pickup,
        booking.search_radius_km,
        required_vehicle,
    ) {
        Ok(found) => found,
        Err(err) => {
            telemetry.provider_failures += 1;
            telemetry.bookings_exhausted += 1;
            finish_booking(
                &mut commands,
                &mut telemetry,
                entity,
                &mut booking,
                now,
                BookingState::Exhausted,
                Some(FailureReason::NoDriversFound),
                Some(err.to_string()),
            );
            return;
        }
    };

    let eligible: Vec<_> = found
        .into_iter()
        .filter(|candidate| {
            required_vehicle.map_or(true, |vehicle| candidate.vehicle_type == vehicle)
        })
        .filter(|candidate| !engaged.0.contains(&candidate.driver_id))
        .collect();

    if eligible.is_empty() {
        if !booking.radius_widened && policy.max_radius_km > booking.search_radius_km {
            booking.radius_widened = true;
            booking.search_radius_km = policy.max_radius_km;
            telemetry.radius_widenings += 1;
            clock.schedule_at(
                now,
                EventKind::CandidateSearch,
                Some(EventSubject::Booking(entity)),
            );
        } else {
            telemetry.bookings_exhausted += 1;
            finish_booking(
                &mut commands,
                &mut telemetry,
                entity,
                &mut booking,
                now,
                BookingState::Exhausted,
                Some(FailureReason::NoDriversFound),
                None,
            );
        }
        return;
    }

    booking.ranked = rank(&eligible, booking.request.pickup, booking.request.priority);
    booking.next_candidate = 0;
    clock.schedule_at(
        now,
        EventKind::ProposalDispatch,
        Some(EventSubject::Booking(entity)),
    );
}
