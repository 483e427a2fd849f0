use crate::model::{Cents, Ms};

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_NOTE_LEN: usize = 1024;
pub const MAX_PHONE_LEN: usize = 32;
pub const MAX_SPORT_LABEL_LEN: usize = 64;

pub const MAX_RESERVATIONS_PER_UNIT: usize = 100_000;
pub const MAX_UNITS_PER_SPORT: usize = 1_000;

/// Longest single reservation window: 7 days.
pub const MAX_SPAN_DURATION_MS: Ms = 7 * 24 * 3_600_000;
/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

pub const MIN_SLOT_MINUTES: u32 = 5;
pub const MAX_SLOT_MINUTES: u32 = 24 * 60;

/// Largest accepted price, in minor units.
pub const MAX_PRICE: Cents = 100_000_000_000;

pub const MAX_EVENT_DAYS: i64 = 366;

pub const DEFAULT_HOLD_TTL_MS: Ms = 480_000;

pub const MAX_TENANTS: usize = 1_024;
pub const MAX_TENANT_NAME_LEN: usize = 128;
