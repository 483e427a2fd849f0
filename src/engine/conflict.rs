use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::slots::{Slot, SlotAvailability, SlotStatus};

use super::EngineError;

/// Whether `r` blocks overlapping reservations at `now`. The only place
/// hold expiry is evaluated: a hold counts while `now - created_at <= hold_ttl`.
/// Expired holds stay in the ledger untouched.
pub fn is_active(r: &Reservation, now: Ms, hold_ttl: Ms) -> bool {
    match r.status {
        ReservationStatus::Confirmed
        | ReservationStatus::Blocked
        | ReservationStatus::UnderReview
        | ReservationStatus::Completed => true,
        ReservationStatus::Hold => now - r.created_at <= hold_ttl,
        ReservationStatus::Pending | ReservationStatus::Cancelled => false,
    }
}

pub fn overlaps(a: &Span, b: &Span) -> bool {
    a.overlaps(b)
}

/// First active reservation overlapping `span`, ignoring `exclude`.
pub fn find_conflict<'a>(
    ledger: &'a UnitLedger,
    span: &Span,
    now: Ms,
    hold_ttl: Ms,
    exclude: Option<Ulid>,
) -> Option<&'a Reservation> {
    ledger
        .overlapping(span)
        .filter(|r| Some(r.id) != exclude)
        .find(|r| is_active(r, now, hold_ttl) && overlaps(&r.span, span))
}

pub(crate) fn check_no_conflict(
    ledger: &UnitLedger,
    span: &Span,
    now: Ms,
    hold_ttl: Ms,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match find_conflict(ledger, span, now, hold_ttl, exclude) {
        Some(existing) => Err(EngineError::SlotConflict {
            unit_id: ledger.unit_id,
            reservation_id: existing.id,
        }),
        None => Ok(()),
    }
}

/// Mark each slot booked if any active reservation overlaps it. Read only.
pub fn annotate(
    slots: impl Iterator<Item = Slot>,
    ledger: &UnitLedger,
    now: Ms,
    hold_ttl: Ms,
) -> Vec<SlotAvailability> {
    slots
        .map(|slot| {
            let status = match find_conflict(ledger, &slot.span, now, hold_ttl, None) {
                Some(_) => SlotStatus::Booked,
                None => SlotStatus::Available,
            };
            SlotAvailability { slot, status }
        })
        .collect()
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::validation("start must be before end"));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("window too long"));
    }
    Ok(())
}
