use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{check_no_conflict, validate_span};
use super::{Engine, EngineError};

/// A multi-day booking of one unit: the same daily window on every date in
/// `start_date..=end_date`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPlan {
    pub unit_id: Ulid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub daily_start: NaiveTime,
    pub daily_end: NaiveTime,
    /// Falls back to the engine's configured policy.
    pub conflict_policy: Option<EventConflictPolicy>,
}

impl EventPlan {
    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    fn validate(&self) -> Result<Vec<Span>, EngineError> {
        if self.end_date < self.start_date {
            return Err(EngineError::validation("end_date is before start_date"));
        }
        if self.daily_start >= self.daily_end {
            return Err(EngineError::validation("daily_start must be before daily_end"));
        }
        if self.days() > MAX_EVENT_DAYS {
            return Err(EngineError::validation(format!(
                "events may span at most {MAX_EVENT_DAYS} days"
            )));
        }
        self.start_date
            .iter_days()
            .take_while(|d| *d <= self.end_date)
            .map(|date| {
                let span = Span::new(
                    at_date_time(date, self.daily_start),
                    at_date_time(date, self.daily_end),
                );
                validate_span(&span).map(|()| span)
            })
            .collect()
    }
}

impl Engine {
    /// Book `plan.unit_id` for every day of an event. The whole plan is one
    /// WAL record: either every day is reserved or none is.
    pub async fn plan_event(&self, plan: EventPlan, actor: Actor) -> Result<Vec<Reservation>, EngineError> {
        let _gate = self.begin_write().await;
        let view = self.unit(&plan.unit_id).ok_or(EngineError::NotFound(plan.unit_id))?;
        self.require_operator(&actor, &view.venue.id)?;
        let spans = plan.validate()?;

        let mut claims = Vec::with_capacity(spans.len());
        let mut ids = Vec::with_capacity(spans.len());
        for _ in &spans {
            let id = Ulid::new();
            claims.push(self.claim_id(id)?);
            ids.push(id);
        }

        let ledger = self
            .ledger(&plan.unit_id)
            .ok_or(EngineError::NotFound(plan.unit_id))?;
        let mut guard = ledger.write().await;
        if guard.len() + spans.len() > MAX_RESERVATIONS_PER_UNIT {
            return Err(EngineError::LimitExceeded("too many reservations on unit"));
        }

        let now = self.now();
        let policy = plan
            .conflict_policy
            .unwrap_or(self.config().event_conflict_policy);
        if policy == EventConflictPolicy::Reject {
            for span in &spans {
                if let Err(e) = check_no_conflict(&guard, span, now, self.config().hold_ttl_ms, None) {
                    metrics::counter!(observability::CONFLICTS_TOTAL, "operation" => "plan_event")
                        .increment(1);
                    debug!(unit_id = %plan.unit_id, error = %e, "event plan rejected");
                    return Err(e);
                }
            }
        }

        let reservations: Vec<Reservation> = spans
            .iter()
            .zip(&ids)
            .map(|(span, id)| Reservation {
                id: *id,
                unit_id: view.unit.id,
                venue_id: view.venue.id,
                requester: actor.id,
                span: *span,
                total_price: 0,
                status: ReservationStatus::Confirmed,
                payment: PaymentInfo {
                    mode: None,
                    status: PaymentStatus::Paid,
                },
                source: Source::EventHost,
                guest: None,
                note: None,
                created_at: now,
                updated_at: now,
            })
            .collect();

        let event = Event::EventPlanned {
            unit_id: plan.unit_id,
            reservations: reservations.clone(),
        };
        self.persist_and_apply(&mut guard, event).await?;
        claims.into_iter().for_each(|c| c.commit());

        metrics::counter!(observability::RESERVATIONS_CREATED_TOTAL, "source" => Source::EventHost.as_str())
            .increment(reservations.len() as u64);
        info!(
            unit_id = %plan.unit_id,
            days = reservations.len(),
            policy = %policy,
            "event planned"
        );
        Ok(reservations)
    }
}
