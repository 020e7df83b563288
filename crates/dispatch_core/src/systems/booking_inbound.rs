use bevy_ecs::prelude::{Query, Res, ResMut};

use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject};
use crate::ecs::Booking;
use crate::telemetry::DispatchTelemetry;

/// Accepts a freshly submitted booking into the pipeline and kicks off the
/// first candidate search. Validation already happened synchronously at
/// submit time.
pub fn booking_inbound_system(
    mut clock: ResMut<DispatchClock>,
    event: Res<CurrentEvent>,
    mut telemetry: ResMut<DispatchTelemetry>,
    bookings: Query<&Booking>,
) {
    if event.0.kind != EventKind::BookingInbound {
        return;
    }
    let Some(EventSubject::Booking(entity)) = event.0.subject.clone() else {
        return;
    };
    if bookings.get(entity).is_err() {
        return;
    }

    telemetry.bookings_submitted += 1;
    let now = clock.now();
    clock.schedule_at(
        now,
        EventKind::CandidateSearch,
        Some(EventSubject::Booking(entity)),
    );
}
