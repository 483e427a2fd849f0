mod conflict;
mod error;
mod mutations;
mod planner;
mod queries;
mod registration;

pub use conflict::{annotate, find_conflict, is_active, overlaps};
pub use error::EngineError;
pub use mutations::{
    BlockRequest, BookingRequest, HoldRequest, UnitSelection, WALK_IN_GUEST, WalkInRequest,
};
pub use planner::EventPlan;
pub use queries::{REVENUE_TREND_DAYS, Scope, VenueStats};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Mutex, OwnedRwLockWriteGuard, RwLock, RwLockReadGuard};
use tracing::info;
use ulid::Ulid;

use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::model::*;
use crate::observability;
use crate::wal::{Wal, WalHandle};

pub type SharedLedger = Arc<RwLock<UnitLedger>>;

/// One tenant's reservation state: a ledger per unit, the catalog it books
/// against, and the WAL both are persisted to.
///
/// Lock order is `commit_gate` (shared) then unit ledgers in catalog order.
/// Compaction takes the gate exclusively so its snapshot can't miss a write.
pub struct Engine {
    ledgers: DashMap<Ulid, SharedLedger>,
    /// Reservation id → unit id.
    reservation_units: DashMap<Ulid, Ulid>,
    catalog: Arc<dyn Catalog>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    wal: WalHandle,
    commit_gate: RwLock<()>,
    /// Serializes catalog registration checks with their writes.
    catalog_lock: Mutex<()>,
}

impl Engine {
    /// Replay `wal_path` into `catalog` and fresh ledgers, then start the
    /// WAL writer. Must run inside a tokio runtime.
    pub fn new(
        wal_path: PathBuf,
        catalog: Arc<dyn Catalog>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> io::Result<Self> {
        let replay = Wal::replay(&wal_path)?;
        let reservation_units = DashMap::new();

        // Nothing else can see these ledgers yet, so replay into plain values
        // and wrap them afterwards.
        let mut ledgers: HashMap<Ulid, UnitLedger> = HashMap::new();
        for event in &replay.events {
            match event {
                Event::Catalog(change) => {
                    catalog.apply(change);
                    if let CatalogEvent::UnitRegistered(unit) = change {
                        ledgers.entry(unit.id).or_insert_with(|| UnitLedger::new(unit.id));
                    }
                }
                other => {
                    if let Some(unit_id) = other.unit_id() {
                        let ledger = ledgers.entry(unit_id).or_insert_with(|| UnitLedger::new(unit_id));
                        apply_to_ledger(ledger, other, &reservation_units);
                    }
                }
            }
        }

        info!(
            wal = %wal_path.display(),
            events = replay.events.len(),
            units = ledgers.len(),
            reservations = reservation_units.len(),
            "engine loaded"
        );

        let wal = WalHandle::spawn(Wal::open(&wal_path)?);
        Ok(Self {
            ledgers: ledgers
                .into_iter()
                .map(|(id, ledger)| (id, Arc::new(RwLock::new(ledger))))
                .collect(),
            reservation_units,
            catalog,
            clock,
            config,
            wal,
            commit_gate: RwLock::new(()),
            catalog_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }

    pub fn now(&self) -> Ms {
        self.clock.now_ms()
    }

    pub fn unit(&self, id: &Ulid) -> Option<UnitView> {
        self.catalog.unit(id)
    }

    pub(crate) fn ledger(&self, unit_id: &Ulid) -> Option<SharedLedger> {
        self.ledgers.get(unit_id).map(|e| e.value().clone())
    }

    pub(crate) fn unit_of(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_units.get(reservation_id).map(|e| *e.value())
    }

    /// Held for the whole of every mutation.
    pub(super) async fn begin_write(&self) -> RwLockReadGuard<'_, ()> {
        self.commit_gate.read().await
    }

    /// Durably log `event`, then apply it to the locked ledger.
    pub(super) async fn persist_and_apply(
        &self,
        ledger: &mut UnitLedger,
        event: Event,
    ) -> Result<(), EngineError> {
        self.wal.append(event.clone()).await?;
        apply_to_ledger(ledger, &event, &self.reservation_units);
        Ok(())
    }

    pub(super) async fn persist_catalog(&self, change: CatalogEvent) -> Result<(), EngineError> {
        self.wal.append(Event::Catalog(change.clone())).await?;
        self.catalog.apply(&change);
        if let CatalogEvent::UnitRegistered(unit) = &change {
            self.ledgers
                .entry(unit.id)
                .or_insert_with(|| Arc::new(RwLock::new(UnitLedger::new(unit.id))));
        }
        Ok(())
    }

    /// Lock the ledger holding `reservation_id` for writing.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<UnitLedger>, EngineError> {
        let unit_id = self
            .unit_of(reservation_id)
            .ok_or(EngineError::NotFound(*reservation_id))?;
        let ledger = self.ledger(&unit_id).ok_or(EngineError::NotFound(*reservation_id))?;
        let guard = ledger.write_owned().await;
        if guard.get(*reservation_id).is_none() {
            return Err(EngineError::NotFound(*reservation_id));
        }
        Ok(guard)
    }

    /// Reserve `id` so no concurrent create can reuse it. Released on drop
    /// unless the reservation was committed.
    pub(super) fn claim_id(&self, id: Ulid) -> Result<IdClaim<'_>, EngineError> {
        match self.reservation_units.entry(id) {
            Entry::Occupied(_) => Err(EngineError::AlreadyExists(id)),
            Entry::Vacant(slot) => {
                slot.insert(Ulid::nil());
                Ok(IdClaim {
                    index: &self.reservation_units,
                    id,
                    armed: true,
                })
            }
        }
    }

    pub async fn appends_since_compact(&self) -> Result<u64, EngineError> {
        Ok(self.wal.appends_since_compact().await?)
    }

    /// Rewrite the WAL as the catalog followed by every reservation in its
    /// current state. Expired holds are kept as they are.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;
        let mut events: Vec<Event> = self
            .catalog
            .snapshot()
            .into_iter()
            .map(Event::Catalog)
            .collect();
        let ledgers: Vec<SharedLedger> = self.ledgers.iter().map(|e| e.value().clone()).collect();
        for ledger in ledgers {
            let guard = ledger.read().await;
            events.extend(guard.reservations.iter().cloned().map(Event::ReservationCreated));
        }
        let count = events.len();
        self.wal.compact(events).await?;
        metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
        info!(events = count, "WAL compacted");
        Ok(())
    }
}

pub(super) struct IdClaim<'a> {
    index: &'a DashMap<Ulid, Ulid>,
    id: Ulid,
    armed: bool,
}

impl IdClaim<'_> {
    /// The reservation is in the ledger; `apply_to_ledger` has indexed it.
    pub(super) fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for IdClaim<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.index.remove_if(&self.id, |_, unit| unit.is_nil());
        }
    }
}

/// Apply a reservation record to its unit's ledger. Caller holds the lock.
fn apply_to_ledger(ledger: &mut UnitLedger, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::ReservationCreated(r) => {
            index.insert(r.id, r.unit_id);
            ledger.insert(r.clone());
        }
        Event::EventPlanned { reservations, .. } => {
            for r in reservations {
                index.insert(r.id, r.unit_id);
                ledger.insert(r.clone());
            }
        }
        Event::StatusChanged {
            id,
            status,
            payment,
            at,
            ..
        } => {
            if let Some(r) = ledger.get_mut(*id) {
                r.status = *status;
                if let Some(payment) = payment {
                    r.payment = *payment;
                }
                r.updated_at = *at;
            }
        }
        Event::DetailsUpdated { id, patch, at, .. } => {
            if let Some(r) = ledger.get_mut(*id) {
                patch.apply_to(r);
                r.updated_at = *at;
            }
        }
        Event::ReservationRemoved { id, .. } => {
            ledger.remove(*id);
            index.remove(id);
        }
        Event::Catalog(_) => {}
    }
}
