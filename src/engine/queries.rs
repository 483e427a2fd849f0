use chrono::{Datelike, Days, NaiveDate};
use ulid::Ulid;

use crate::model::*;
use crate::slots::{SlotAvailability, generate_slots};

use super::conflict::{annotate, is_active};
use super::{Engine, EngineError, SharedLedger};

/// Which of a requester's reservations to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    All,
    /// Not yet started and not cancelled, soonest first.
    Upcoming,
    /// Already started, most recent first.
    History,
}

impl std::str::FromStr for Scope {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Scope::All),
            "upcoming" => Ok(Scope::Upcoming),
            "history" => Ok(Scope::History),
            _ => Err(UnknownLabel {
                kind: "Scope",
                value: s.to_string(),
            }),
        }
    }
}

pub const REVENUE_TREND_DAYS: u32 = 30;

/// Operator dashboard figures for one venue.
///
/// Revenue sums confirmed and completed reservations by the day they start.
/// Today's counts cover reservations that still claim their window (live
/// holds, pending requests, and confirmed, under-review or completed ones);
/// blocks, cancellations and lapsed holds are left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VenueStats {
    pub venue_id: Ulid,
    pub revenue_today: Cents,
    pub revenue_month: Cents,
    pub revenue_total: Cents,
    pub bookings_today: u64,
    /// Confirmed, under review or completed.
    pub confirmed_today: u64,
    /// Live holds and pending requests.
    pub pending_today: u64,
    pub walk_in_today: u64,
    pub online_today: u64,
    /// Revenue per day over the last `REVENUE_TREND_DAYS` days, oldest first.
    pub revenue_trend: Vec<(NaiveDate, Cents)>,
}

impl VenueStats {
    fn record(&mut self, r: &Reservation, today: NaiveDate, now: Ms, hold_ttl: Ms) {
        let Some(day) = ms_to_naive(r.span.start).map(|dt| dt.date()) else {
            return;
        };

        if matches!(r.status, ReservationStatus::Confirmed | ReservationStatus::Completed) {
            let price = r.total_price;
            self.revenue_total = self.revenue_total.saturating_add(price);
            if day.year() == today.year() && day.month() == today.month() {
                self.revenue_month = self.revenue_month.saturating_add(price);
            }
            if day == today {
                self.revenue_today = self.revenue_today.saturating_add(price);
            }
            if let Some((_, revenue)) = self.revenue_trend.iter_mut().find(|(d, _)| *d == day) {
                *revenue = revenue.saturating_add(price);
            }
        }

        if day != today {
            return;
        }
        let claims_window = r.status == ReservationStatus::Pending
            || (r.status != ReservationStatus::Blocked && is_active(r, now, hold_ttl));
        if !claims_window {
            return;
        }
        self.bookings_today += 1;
        match r.status {
            ReservationStatus::Hold | ReservationStatus::Pending => self.pending_today += 1,
            _ => self.confirmed_today += 1,
        }
        match r.source {
            Source::WalkIn => self.walk_in_today += 1,
            Source::Online => self.online_today += 1,
            Source::Blocked | Source::EventHost => {}
        }
    }
}

impl Engine {
    /// Every slot of `date` for the unit, marked available or booked.
    pub async fn slots(&self, unit_id: Ulid, date: NaiveDate) -> Result<Vec<SlotAvailability>, EngineError> {
        let view = self.unit(&unit_id).ok_or(EngineError::NotFound(unit_id))?;
        let ledger = self.ledger(&unit_id).ok_or(EngineError::NotFound(unit_id))?;
        let guard = ledger.read().await;
        let slots = generate_slots(&view, date, self.config().fallback_hours);
        Ok(annotate(slots, &guard, self.now(), self.config().hold_ttl_ms))
    }

    pub async fn get(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let unit_id = self.unit_of(&id).ok_or(EngineError::NotFound(id))?;
        let ledger = self.ledger(&unit_id).ok_or(EngineError::NotFound(id))?;
        let guard = ledger.read().await;
        guard.get(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// All reservations on a unit, by start time.
    pub async fn reservations_for_unit(&self, unit_id: Ulid) -> Result<Vec<Reservation>, EngineError> {
        let ledger = self.ledger(&unit_id).ok_or(EngineError::NotFound(unit_id))?;
        let guard = ledger.read().await;
        Ok(guard.reservations.clone())
    }

    pub async fn reservations_for_venue(&self, venue_id: Ulid) -> Result<Vec<Reservation>, EngineError> {
        self.catalog()
            .venue(&venue_id)
            .ok_or(EngineError::NotFound(venue_id))?;
        let mut out = Vec::new();
        for unit_id in self.catalog().units_for_venue(&venue_id) {
            if let Some(ledger) = self.ledger(&unit_id) {
                out.extend(ledger.read().await.reservations.iter().cloned());
            }
        }
        out.sort_by_key(|r| (r.span.start, r.id));
        Ok(out)
    }

    pub async fn reservations_for_requester(&self, requester: Ulid, scope: Scope) -> Vec<Reservation> {
        let now = self.now();
        let ledgers: Vec<SharedLedger> = self.ledgers.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for ledger in ledgers {
            let guard = ledger.read().await;
            out.extend(
                guard
                    .reservations
                    .iter()
                    .filter(|r| r.requester == requester)
                    .filter(|r| match scope {
                        Scope::All => true,
                        Scope::Upcoming => {
                            r.span.start >= now && r.status != ReservationStatus::Cancelled
                        }
                        Scope::History => r.span.start < now,
                    })
                    .cloned(),
            );
        }
        match scope {
            Scope::History => out.sort_by(|a, b| b.span.start.cmp(&a.span.start).then(b.id.cmp(&a.id))),
            _ => out.sort_by_key(|r| (r.span.start, r.id)),
        }
        out
    }

    /// Revenue and booking figures for a venue; its operator or an admin.
    pub async fn venue_stats(&self, venue_id: Ulid, actor: Actor) -> Result<VenueStats, EngineError> {
        self.require_operator(&actor, &venue_id)?;
        let now = self.now();
        let hold_ttl = self.config().hold_ttl_ms;
        let today = ms_to_naive(now)
            .map(|dt| dt.date())
            .ok_or_else(|| EngineError::validation("clock is outside the supported range"))?;
        let first_day = today
            .checked_sub_days(Days::new(u64::from(REVENUE_TREND_DAYS - 1)))
            .unwrap_or(today);

        let mut stats = VenueStats {
            venue_id,
            revenue_trend: first_day.iter_days().take_while(|d| *d <= today).map(|d| (d, 0)).collect(),
            ..Default::default()
        };
        for unit_id in self.catalog().units_for_venue(&venue_id) {
            if let Some(ledger) = self.ledger(&unit_id) {
                let guard = ledger.read().await;
                for r in &guard.reservations {
                    stats.record(r, today, now, hold_ttl);
                }
            }
        }
        Ok(stats)
    }
}
