use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, UTC. The engine's only instant type.
pub type Ms = i64;

/// Prices in minor currency units.
pub type Cents = i64;

pub const MS_PER_MINUTE: Ms = 60_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Like `new`, but rejects empty or inverted windows instead of asserting.
    pub fn checked(start: Ms, end: Ms) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// The one overlap test: `s1 < e2 && e1 > s2`.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Venue wall-clock time is stored without a zone and treated as UTC.
pub fn at_date_time(date: NaiveDate, time: NaiveTime) -> Ms {
    date.and_time(time).and_utc().timestamp_millis()
}

/// Midnight of `date` plus `minutes`.
pub fn at_minute_of_day(date: NaiveDate, minutes: u32) -> Ms {
    at_date_time(date, NaiveTime::MIN) + Ms::from(minutes) * MS_PER_MINUTE
}

pub fn ms_to_naive(ms: Ms) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}

/// `2024-06-01T10:00:00`
pub fn ms_to_iso(ms: Ms) -> String {
    ms_to_naive(ms)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// Enums stored and exchanged by their snake_case label.
macro_rules! labelled_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownLabel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($label => Ok($name::$variant),)+
                    _ => Err(UnknownLabel {
                        kind: stringify!($name),
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub value: String,
}

labelled_enum!(VenueStatus {
    Active => "active",
    Inactive => "inactive",
});

labelled_enum!(UnitStatus {
    Active => "active",
    Maintenance => "maintenance",
    Disabled => "disabled",
});

labelled_enum!(
    /// Reservation lifecycle state. `Hold` self-expires; see `engine::is_active`.
    ReservationStatus {
        Hold => "hold",
        Pending => "pending",
        Confirmed => "confirmed",
        UnderReview => "under_review",
        Completed => "completed",
        Cancelled => "cancelled",
        Blocked => "blocked",
    }
);

labelled_enum!(PaymentStatus {
    Pending => "pending",
    Paid => "paid",
    Partial => "partial",
    Refunded => "refunded",
});

labelled_enum!(PaymentMode {
    Cash => "cash",
    Upi => "upi",
    Card => "card",
    Online => "online",
});

labelled_enum!(Source {
    Online => "online",
    WalkIn => "walk_in",
    Blocked => "blocked",
    EventHost => "event_host",
});

labelled_enum!(Role {
    Player => "player",
    Operator => "operator",
    Admin => "admin",
});

labelled_enum!(
    /// Whether multi-day event plans are checked against existing reservations.
    EventConflictPolicy {
        Reject => "reject",
        Unchecked => "unchecked",
    }
);

impl ReservationStatus {
    /// The lifecycle state machine. `Cancelled`, `Completed` and `Blocked`
    /// have no outgoing edges here; operators may still unblock through
    /// `can_override_to`.
    pub fn can_transition_to(self, to: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, to),
            (Hold, Confirmed)
                | (Hold, Cancelled)
                | (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, UnderReview)
                | (Confirmed, Completed)
                | (Confirmed, Cancelled)
                | (UnderReview, Confirmed)
                | (UnderReview, Cancelled)
        )
    }

    /// Operator manual override: the state machine plus leaving `Blocked`.
    /// Nothing leaves `Cancelled` or `Completed`, and nothing enters `Hold`.
    pub fn can_override_to(self, to: ReservationStatus) -> bool {
        use ReservationStatus::*;
        if self == to || to == Hold {
            return false;
        }
        match self {
            Cancelled | Completed => false,
            Blocked => true,
            _ => self.can_transition_to(to),
        }
    }
}

// ── Catalog ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub id: Ulid,
    pub name: String,
    pub operator_id: Ulid,
    pub location: Option<GeoPoint>,
    /// Raw `HH:MM`; parsed lazily by the slot generator.
    pub opens_at: String,
    pub closes_at: String,
    pub status: VenueStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SportConfig {
    pub id: Ulid,
    pub venue_id: Ulid,
    pub sport: String,
    pub base_price: Cents,
    pub slot_minutes: u32,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookableUnit {
    pub id: Ulid,
    pub sport_id: Ulid,
    pub name: String,
    pub capacity: u32,
    pub price_override: Option<Cents>,
    pub status: UnitStatus,
}

impl BookableUnit {
    pub fn effective_price(&self, sport: &SportConfig) -> Cents {
        self.price_override.unwrap_or(sport.base_price)
    }
}

/// A unit together with the configuration and venue it inherits from.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitView {
    pub unit: BookableUnit,
    pub sport: SportConfig,
    pub venue: Venue,
}

impl UnitView {
    pub fn effective_price(&self) -> Cents {
        self.unit.effective_price(&self.sport)
    }

    pub fn slot_ms(&self) -> Ms {
        Ms::from(self.sport.slot_minutes) * MS_PER_MINUTE
    }

    /// Static price for a window: one effective price per started slot length.
    /// `None` if the total doesn't fit in `Cents`.
    pub fn price_for(&self, span: &Span) -> Option<Cents> {
        let slot = self.slot_ms();
        if slot <= 0 {
            return Some(self.effective_price());
        }
        let slots = (span.duration_ms() + slot - 1) / slot;
        self.effective_price().checked_mul(slots.max(1))
    }

    pub fn is_bookable(&self) -> bool {
        self.unit.status == UnitStatus::Active
            && self.sport.active
            && self.venue.status == VenueStatus::Active
    }
}

// ── Actors ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Ulid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Ulid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn player(id: Ulid) -> Self {
        Self::new(id, Role::Player)
    }

    pub fn operator(id: Ulid) -> Self {
        Self::new(id, Role::Operator)
    }

    pub fn admin(id: Ulid) -> Self {
        Self::new(id, Role::Admin)
    }

    /// Admins, or the operator account that owns `venue`.
    pub fn operates(&self, venue: &Venue) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Operator => self.id == venue.operator_id,
            Role::Player => false,
        }
    }
}

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub mode: Option<PaymentMode>,
    pub status: PaymentStatus,
}

impl Default for PaymentInfo {
    fn default() -> Self {
        Self {
            mode: None,
            status: PaymentStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub unit_id: Ulid,
    pub venue_id: Ulid,
    pub requester: Ulid,
    pub span: Span,
    pub total_price: Cents,
    pub status: ReservationStatus,
    pub payment: PaymentInfo,
    pub source: Source,
    pub guest: Option<Guest>,
    pub note: Option<String>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

/// Operator edits to a reservation's bookkeeping fields. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationPatch {
    pub guest_name: Option<String>,
    pub guest_phone: Option<String>,
    pub total_price: Option<Cents>,
    pub payment_status: Option<PaymentStatus>,
}

impl ReservationPatch {
    pub fn is_empty(&self) -> bool {
        self.guest_name.is_none()
            && self.guest_phone.is_none()
            && self.total_price.is_none()
            && self.payment_status.is_none()
    }

    pub fn apply_to(&self, r: &mut Reservation) {
        if self.guest_name.is_some() || self.guest_phone.is_some() {
            let guest = r.guest.get_or_insert_with(|| Guest {
                name: String::new(),
                phone: None,
            });
            if let Some(name) = &self.guest_name {
                guest.name = name.clone();
            }
            if let Some(phone) = &self.guest_phone {
                guest.phone = Some(phone.clone());
            }
        }
        if let Some(price) = self.total_price {
            r.total_price = price;
        }
        if let Some(status) = self.payment_status {
            r.payment.status = status;
        }
    }
}

/// Returned by a successful hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldReceipt {
    pub reservation: Reservation,
    pub unit_name: String,
    pub expires_in_seconds: i64,
    pub expires_at: Ms,
}

/// All reservations of one unit, sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct UnitLedger {
    pub unit_id: Ulid,
    pub reservations: Vec<Reservation>,
}

impl UnitLedger {
    pub fn new(unit_id: Ulid) -> Self {
        Self {
            unit_id,
            reservations: Vec::new(),
        }
    }

    /// Insert maintaining sort order by span.start.
    pub fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Reservations whose window overlaps `query`, regardless of status.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }
}

// ── WAL records ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CatalogEvent {
    VenueRegistered(Venue),
    SportRegistered(SportConfig),
    UnitRegistered(BookableUnit),
    UnitStatusChanged { id: Ulid, status: UnitStatus },
}

/// One WAL record. A record is the unit of atomicity: an event plan is a
/// single record so it replays all-or-nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Catalog(CatalogEvent),
    ReservationCreated(Reservation),
    EventPlanned {
        unit_id: Ulid,
        reservations: Vec<Reservation>,
    },
    StatusChanged {
        id: Ulid,
        unit_id: Ulid,
        status: ReservationStatus,
        payment: Option<PaymentInfo>,
        at: Ms,
    },
    DetailsUpdated {
        id: Ulid,
        unit_id: Ulid,
        patch: ReservationPatch,
        at: Ms,
    },
    ReservationRemoved {
        id: Ulid,
        unit_id: Ulid,
    },
}

impl Event {
    /// The unit whose ledger this record touches.
    pub fn unit_id(&self) -> Option<Ulid> {
        match self {
            Event::Catalog(_) => None,
            Event::ReservationCreated(r) => Some(r.unit_id),
            Event::EventPlanned { unit_id, .. }
            | Event::StatusChanged { unit_id, .. }
            | Event::DetailsUpdated { unit_id, .. }
            | Event::ReservationRemoved { unit_id, .. } => Some(*unit_id),
        }
    }
}
