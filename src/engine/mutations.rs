use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{check_no_conflict, find_conflict, is_active, validate_span};
use super::registration::validate_price;
use super::{Engine, EngineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitSelection {
    Unit(Ulid),
    /// First free active unit of this sport configuration, in catalog order.
    AnyInSport(Ulid),
}

#[derive(Debug, Clone)]
pub struct HoldRequest {
    pub id: Ulid,
    pub selection: UnitSelection,
    pub span: Span,
    pub requester: Ulid,
}

/// An online request that waits for the operator to confirm it.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub id: Ulid,
    pub unit_id: Ulid,
    pub span: Span,
    pub requester: Ulid,
}

#[derive(Debug, Clone)]
pub struct WalkInRequest {
    pub id: Ulid,
    pub unit_id: Ulid,
    pub span: Span,
    /// Defaults to the unit's price for the window.
    pub price: Option<Cents>,
    pub payment: PaymentInfo,
    /// Defaults to "Walk-In Customer".
    pub guest: Option<Guest>,
}

#[derive(Debug, Clone)]
pub struct BlockRequest {
    pub id: Ulid,
    pub unit_id: Ulid,
    pub span: Span,
    /// Defaults to "Maintenance".
    pub reason: Option<String>,
}

pub const WALK_IN_GUEST: &str = "Walk-In Customer";
pub const DEFAULT_BLOCK_REASON: &str = "Maintenance";

fn record_created(source: Source) {
    metrics::counter!(observability::RESERVATIONS_CREATED_TOTAL, "source" => source.as_str())
        .increment(1);
}

fn record_transition(to: ReservationStatus) {
    metrics::counter!(observability::TRANSITIONS_TOTAL, "to" => to.as_str()).increment(1);
}

fn record_conflict(operation: &'static str) {
    metrics::counter!(observability::CONFLICTS_TOTAL, "operation" => operation).increment(1);
}

fn validate_text(value: &str, max: usize, what: &'static str) -> Result<(), EngineError> {
    if value.len() > max {
        return Err(EngineError::LimitExceeded(what));
    }
    Ok(())
}

impl Engine {
    pub(super) fn bookable_unit(&self, unit_id: &Ulid) -> Result<UnitView, EngineError> {
        let view = self.unit(unit_id).ok_or(EngineError::NotFound(*unit_id))?;
        if !view.is_bookable() {
            return Err(EngineError::validation(format!(
                "unit {} is not accepting reservations",
                view.unit.name
            )));
        }
        Ok(view)
    }

    pub(super) fn require_operator(&self, actor: &Actor, venue_id: &Ulid) -> Result<Venue, EngineError> {
        let venue = self
            .catalog()
            .venue(venue_id)
            .ok_or(EngineError::NotFound(*venue_id))?;
        if !actor.operates(&venue) {
            return Err(EngineError::Unauthorized("venue operator or admin only"));
        }
        Ok(venue)
    }

    fn new_reservation(
        &self,
        id: Ulid,
        view: &UnitView,
        span: Span,
        requester: Ulid,
        status: ReservationStatus,
        source: Source,
        now: Ms,
    ) -> Result<Reservation, EngineError> {
        let total_price = view
            .price_for(&span)
            .ok_or(EngineError::LimitExceeded("reservation price too large"))?;
        Ok(Reservation {
            id,
            unit_id: view.unit.id,
            venue_id: view.venue.id,
            requester,
            span,
            total_price,
            status,
            payment: PaymentInfo::default(),
            source,
            guest: None,
            note: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Check and insert under the unit's write lock.
    async fn insert_checked(
        &self,
        reservation: Reservation,
        operation: &'static str,
    ) -> Result<Reservation, EngineError> {
        let claim = self.claim_id(reservation.id)?;
        let ledger = self
            .ledger(&reservation.unit_id)
            .ok_or(EngineError::NotFound(reservation.unit_id))?;
        let mut guard = ledger.write().await;
        if guard.len() >= MAX_RESERVATIONS_PER_UNIT {
            return Err(EngineError::LimitExceeded("too many reservations on unit"));
        }
        let now = self.now();
        if let Err(e) = check_no_conflict(&guard, &reservation.span, now, self.config().hold_ttl_ms, None) {
            record_conflict(operation);
            debug!(unit_id = %reservation.unit_id, operation, error = %e, "conflict");
            return Err(e);
        }
        self.persist_and_apply(&mut guard, Event::ReservationCreated(reservation.clone()))
            .await?;
        claim.commit();
        record_created(reservation.source);
        info!(
            reservation_id = %reservation.id,
            unit_id = %reservation.unit_id,
            status = %reservation.status,
            source = %reservation.source,
            start = reservation.span.start,
            end = reservation.span.end,
            "reservation created"
        );
        Ok(reservation)
    }

    /// Place a self-expiring hold on a specific unit or the first free unit
    /// of a sport configuration.
    pub async fn hold(&self, req: HoldRequest) -> Result<HoldReceipt, EngineError> {
        let _gate = self.begin_write().await;
        validate_span(&req.span)?;

        let candidates = match req.selection {
            UnitSelection::Unit(unit_id) => vec![self.bookable_unit(&unit_id)?],
            UnitSelection::AnyInSport(sport_id) => {
                self.catalog()
                    .sport(&sport_id)
                    .ok_or(EngineError::NotFound(sport_id))?;
                self.catalog()
                    .units_for_sport(&sport_id)
                    .iter()
                    .filter_map(|id| self.unit(id))
                    .filter(UnitView::is_bookable)
                    .collect()
            }
        };

        let claim = self.claim_id(req.id)?;
        let ttl = self.config().hold_ttl_ms;
        for view in &candidates {
            let Some(ledger) = self.ledger(&view.unit.id) else { continue };
            let mut guard = ledger.write().await;
            let now = self.now();
            if let Some(existing) = find_conflict(&guard, &req.span, now, ttl, None) {
                debug!(unit_id = %view.unit.id, conflicting = %existing.id, "hold candidate taken");
                if let UnitSelection::Unit(unit_id) = req.selection {
                    record_conflict("hold");
                    return Err(EngineError::SlotConflict {
                        unit_id,
                        reservation_id: existing.id,
                    });
                }
                continue;
            }
            if guard.len() >= MAX_RESERVATIONS_PER_UNIT {
                return Err(EngineError::LimitExceeded("too many reservations on unit"));
            }

            let reservation = self.new_reservation(
                req.id,
                view,
                req.span,
                req.requester,
                ReservationStatus::Hold,
                Source::Online,
                now,
            )?;
            self.persist_and_apply(&mut guard, Event::ReservationCreated(reservation.clone()))
                .await?;
            claim.commit();
            record_created(Source::Online);
            info!(reservation_id = %reservation.id, unit_id = %view.unit.id, "hold placed");
            return Ok(HoldReceipt {
                unit_name: view.unit.name.clone(),
                expires_in_seconds: ttl / 1000,
                expires_at: now + ttl,
                reservation,
            });
        }

        record_conflict("hold");
        Err(EngineError::NoAvailableUnit)
    }

    /// Create a `pending` reservation awaiting operator confirmation.
    pub async fn request(&self, req: BookingRequest) -> Result<Reservation, EngineError> {
        let _gate = self.begin_write().await;
        validate_span(&req.span)?;
        let view = self.bookable_unit(&req.unit_id)?;
        let reservation = self.new_reservation(
            req.id,
            &view,
            req.span,
            req.requester,
            ReservationStatus::Pending,
            Source::Online,
            self.now(),
        )?;
        self.insert_checked(reservation, "request").await
    }

    pub async fn create_walk_in(
        &self,
        req: WalkInRequest,
        actor: Actor,
    ) -> Result<Reservation, EngineError> {
        let _gate = self.begin_write().await;
        validate_span(&req.span)?;
        let view = self.bookable_unit(&req.unit_id)?;
        self.require_operator(&actor, &view.venue.id)?;
        if let Some(price) = req.price {
            validate_price(price)?;
        }
        let guest = req.guest.unwrap_or_else(|| Guest {
            name: WALK_IN_GUEST.into(),
            phone: None,
        });
        validate_text(&guest.name, MAX_NAME_LEN, "guest name too long")?;
        if let Some(phone) = &guest.phone {
            validate_text(phone, MAX_PHONE_LEN, "guest phone too long")?;
        }

        let mut reservation = self.new_reservation(
            req.id,
            &view,
            req.span,
            actor.id,
            ReservationStatus::Confirmed,
            Source::WalkIn,
            self.now(),
        )?;
        if let Some(price) = req.price {
            reservation.total_price = price;
        }
        reservation.payment = req.payment;
        reservation.guest = Some(guest);
        self.insert_checked(reservation, "walk_in").await
    }

    /// Take a unit out of service for a window. Works on units in any status.
    pub async fn block(&self, req: BlockRequest, actor: Actor) -> Result<Reservation, EngineError> {
        let _gate = self.begin_write().await;
        validate_span(&req.span)?;
        let view = self.unit(&req.unit_id).ok_or(EngineError::NotFound(req.unit_id))?;
        self.require_operator(&actor, &view.venue.id)?;
        let reason = req
            .reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BLOCK_REASON.into());
        validate_text(&reason, MAX_NOTE_LEN, "block reason too long")?;

        let mut reservation = self.new_reservation(
            req.id,
            &view,
            req.span,
            actor.id,
            ReservationStatus::Blocked,
            Source::Blocked,
            self.now(),
        )?;
        reservation.total_price = 0;
        reservation.guest = Some(Guest {
            name: format!("Blocked: {reason}"),
            phone: None,
        });
        reservation.note = Some(reason);
        self.insert_checked(reservation, "block").await
    }

    /// `hold | pending | under_review → confirmed`, by the requester, the
    /// venue operator or an admin. A reservation that isn't currently
    /// blocking anything is re-checked against the ledger first.
    pub async fn confirm(&self, id: Ulid, actor: Actor) -> Result<Reservation, EngineError> {
        let _gate = self.begin_write().await;
        let mut guard = self.resolve_reservation_write(&id).await?;
        let current = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;

        let operates = self
            .catalog()
            .venue(&current.venue_id)
            .is_some_and(|v| actor.operates(&v));
        if actor.id != current.requester && !operates {
            return Err(EngineError::Unauthorized(
                "only the requester, the venue operator or an admin may confirm",
            ));
        }
        let to = ReservationStatus::Confirmed;
        if !current.status.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                to,
            });
        }

        let now = self.now();
        let ttl = self.config().hold_ttl_ms;
        if !is_active(&current, now, ttl)
            && let Err(e) = check_no_conflict(&guard, &current.span, now, ttl, Some(id))
        {
            record_conflict("confirm");
            return Err(e);
        }

        self.transition(&mut guard, &current, to, None, now).await
    }

    /// Record payment on a confirmed reservation and send it for review.
    /// Requester only.
    pub async fn submit_payment(
        &self,
        id: Ulid,
        actor: Actor,
        payment: PaymentInfo,
    ) -> Result<Reservation, EngineError> {
        let _gate = self.begin_write().await;
        let mut guard = self.resolve_reservation_write(&id).await?;
        let current = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;
        if actor.id != current.requester {
            return Err(EngineError::Unauthorized("only the requester may pay for a reservation"));
        }
        let to = ReservationStatus::UnderReview;
        if current.status != ReservationStatus::Confirmed {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                to,
            });
        }
        self.transition(&mut guard, &current, to, Some(payment), self.now())
            .await
    }

    /// `confirmed → completed`; venue operator or admin.
    pub async fn complete(&self, id: Ulid, actor: Actor) -> Result<Reservation, EngineError> {
        let _gate = self.begin_write().await;
        let mut guard = self.resolve_reservation_write(&id).await?;
        let current = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;
        self.require_operator(&actor, &current.venue_id)?;
        let to = ReservationStatus::Completed;
        if current.status != ReservationStatus::Confirmed {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                to,
            });
        }
        self.transition(&mut guard, &current, to, None, self.now()).await
    }

    /// Requester only, and no later than the window's start.
    pub async fn cancel(&self, id: Ulid, actor: Actor) -> Result<Reservation, EngineError> {
        let _gate = self.begin_write().await;
        let mut guard = self.resolve_reservation_write(&id).await?;
        let current = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;
        if actor.id != current.requester {
            return Err(EngineError::Unauthorized("only the requester may cancel a reservation"));
        }
        let to = ReservationStatus::Cancelled;
        if !current.status.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                to,
            });
        }
        let now = self.now();
        if current.span.start < now {
            return Err(EngineError::PastReservation);
        }
        self.transition(&mut guard, &current, to, None, now).await
    }

    /// Operator override. Follows the state machine, and may also release a
    /// block. Becoming active again re-runs the conflict check.
    pub async fn override_status(
        &self,
        id: Ulid,
        actor: Actor,
        to: ReservationStatus,
    ) -> Result<Reservation, EngineError> {
        let _gate = self.begin_write().await;
        let mut guard = self.resolve_reservation_write(&id).await?;
        let current = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;
        self.require_operator(&actor, &current.venue_id)?;
        if !current.status.can_override_to(to) {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                to,
            });
        }

        let now = self.now();
        let ttl = self.config().hold_ttl_ms;
        let mut next = current.clone();
        next.status = to;
        if is_active(&next, now, ttl)
            && !is_active(&current, now, ttl)
            && let Err(e) = check_no_conflict(&guard, &current.span, now, ttl, Some(id))
        {
            record_conflict("override");
            return Err(e);
        }
        self.transition(&mut guard, &current, to, None, now).await
    }

    /// Edit guest, price or payment fields; venue operator or admin.
    pub async fn update_details(
        &self,
        id: Ulid,
        actor: Actor,
        patch: ReservationPatch,
    ) -> Result<Reservation, EngineError> {
        if patch.is_empty() {
            return Err(EngineError::validation("nothing to update"));
        }
        if let Some(name) = &patch.guest_name {
            validate_text(name, MAX_NAME_LEN, "guest name too long")?;
        }
        if let Some(phone) = &patch.guest_phone {
            validate_text(phone, MAX_PHONE_LEN, "guest phone too long")?;
        }
        if let Some(price) = patch.total_price {
            validate_price(price)?;
        }

        let _gate = self.begin_write().await;
        let mut guard = self.resolve_reservation_write(&id).await?;
        let current = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;
        self.require_operator(&actor, &current.venue_id)?;

        let unit_id = current.unit_id;
        let at = self.now();
        self.persist_and_apply(&mut guard, Event::DetailsUpdated { id, unit_id, patch, at })
            .await?;
        info!(reservation_id = %id, "reservation details updated");
        guard.get(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Administrative hard delete. Bypasses the lifecycle entirely.
    pub async fn remove(&self, id: Ulid, actor: Actor) -> Result<Reservation, EngineError> {
        let _gate = self.begin_write().await;
        let mut guard = self.resolve_reservation_write(&id).await?;
        let current = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;
        self.require_operator(&actor, &current.venue_id)?;
        let unit_id = current.unit_id;
        self.persist_and_apply(&mut guard, Event::ReservationRemoved { id, unit_id })
            .await?;
        info!(reservation_id = %id, unit_id = %unit_id, "reservation removed");
        Ok(current)
    }

    async fn transition(
        &self,
        ledger: &mut UnitLedger,
        current: &Reservation,
        status: ReservationStatus,
        payment: Option<PaymentInfo>,
        at: Ms,
    ) -> Result<Reservation, EngineError> {
        let event = Event::StatusChanged {
            id: current.id,
            unit_id: current.unit_id,
            status,
            payment,
            at,
        };
        self.persist_and_apply(ledger, event).await?;
        record_transition(status);
        info!(
            reservation_id = %current.id,
            from = %current.status,
            to = %status,
            "reservation status changed"
        );
        ledger.get(current.id).cloned().ok_or(EngineError::NotFound(current.id))
    }
}
