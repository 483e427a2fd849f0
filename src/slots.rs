use std::fmt;

use chrono::NaiveDate;
use tracing::warn;

use crate::model::*;

/// A venue's daily window as minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatingHours {
    pub opens_min: u32,
    pub closes_min: u32,
}

impl OperatingHours {
    /// 06:00 to 23:00.
    pub const FALLBACK: OperatingHours = OperatingHours {
        opens_min: 6 * 60,
        closes_min: 23 * 60,
    };

    pub fn parse(opens_at: &str, closes_at: &str) -> Option<Self> {
        Some(Self {
            opens_min: parse_hhmm(opens_at)?,
            closes_min: parse_hhmm(closes_at)?,
        })
    }

    /// The venue's hours, or `fallback` if either end is malformed.
    /// Availability wins over strictness here: a bad row still gets slots.
    pub fn resolve(venue: &Venue, fallback: OperatingHours) -> Self {
        match Self::parse(&venue.opens_at, &venue.closes_at) {
            Some(hours) => hours,
            None => {
                warn!(
                    venue_id = %venue.id,
                    opens_at = %venue.opens_at,
                    closes_at = %venue.closes_at,
                    "unparseable operating hours, using fallback"
                );
                fallback
            }
        }
    }
}

/// `HH:MM` (00:00 through 24:00) to minutes since midnight.
pub fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.trim().split_once(':')?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    match (h, m) {
        (24, 0) => Some(24 * 60),
        (0..=23, 0..=59) => Some(h * 60 + m),
        _ => None,
    }
}

/// `HH:MM`, zero padded.
pub fn slot_id(minute_of_day: u32) -> String {
    format!("{:02}:{:02}", minute_of_day / 60 % 24, minute_of_day % 60)
}

/// `6:00 AM`, `12:30 PM`.
pub fn time_label(minute_of_day: u32) -> String {
    let h = minute_of_day / 60 % 24;
    let m = minute_of_day % 60;
    let suffix = if h < 12 { "AM" } else { "PM" };
    let h12 = match h % 12 {
        0 => 12,
        h => h,
    };
    format!("{h12}:{m:02} {suffix}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub id: String,
    pub label: String,
    pub price: Cents,
    pub span: Span,
    pub start_iso: String,
    pub end_iso: String,
}

/// Lazily yields the full-length slots of one day.
#[derive(Debug, Clone)]
pub struct SlotIter {
    midnight: Ms,
    next_min: u32,
    closes_min: u32,
    slot_minutes: u32,
    price: Cents,
}

impl Iterator for SlotIter {
    type Item = Slot;

    fn next(&mut self) -> Option<Slot> {
        if self.slot_minutes == 0 {
            return None;
        }
        let start_min = self.next_min;
        let end_min = start_min.checked_add(self.slot_minutes)?;
        // No partial slots: the last one must end by closing time.
        if end_min > self.closes_min {
            return None;
        }
        self.next_min = end_min;

        let start = self.midnight + Ms::from(start_min) * MS_PER_MINUTE;
        let end = self.midnight + Ms::from(end_min) * MS_PER_MINUTE;
        Some(Slot {
            id: slot_id(start_min),
            label: time_label(start_min),
            price: self.price,
            span: Span::new(start, end),
            start_iso: ms_to_iso(start),
            end_iso: ms_to_iso(end),
        })
    }
}

/// Candidate windows for `unit` on `date`, from opening time in steps of the
/// sport's slot length. Pure: same inputs, same sequence.
pub fn generate_slots(unit: &UnitView, date: NaiveDate, fallback: OperatingHours) -> SlotIter {
    let hours = OperatingHours::resolve(&unit.venue, fallback);
    SlotIter {
        midnight: at_minute_of_day(date, 0),
        next_min: hours.opens_min,
        closes_min: hours.closes_min,
        slot_minutes: unit.sport.slot_minutes,
        price: unit.effective_price(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Available,
    Booked,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Available => "available",
            SlotStatus::Booked => "booked",
        }
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAvailability {
    pub slot: Slot,
    pub status: SlotStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use ulid::Ulid;

    fn view(opens: &str, closes: &str, slot_minutes: u32) -> UnitView {
        let venue = Venue {
            id: Ulid::new(),
            name: "Riverside".into(),
            operator_id: Ulid::new(),
            location: None,
            opens_at: opens.into(),
            closes_at: closes.into(),
            status: VenueStatus::Active,
        };
        let sport = SportConfig {
            id: Ulid::new(),
            venue_id: venue.id,
            sport: "Badminton".into(),
            base_price: 800,
            slot_minutes,
            active: true,
        };
        let unit = BookableUnit {
            id: Ulid::new(),
            sport_id: sport.id,
            name: "Court 1".into(),
            capacity: 4,
            price_override: None,
            status: UnitStatus::Active,
        };
        UnitView { unit, sport, venue }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn parse_hhmm_accepts_clock_times() {
        assert_eq!(parse_hhmm("06:00"), Some(360));
        assert_eq!(parse_hhmm("6:30"), Some(390));
        assert_eq!(parse_hhmm(" 23:59 "), Some(1439));
        assert_eq!(parse_hhmm("24:00"), Some(1440));
        assert_eq!(parse_hhmm("24:01"), None);
        assert_eq!(parse_hhmm("12:60"), None);
        assert_eq!(parse_hhmm("noon"), None);
        assert_eq!(parse_hhmm("1200"), None);
        assert_eq!(parse_hhmm("12:5"), None);
    }

    #[test]
    fn labels() {
        assert_eq!(time_label(0), "12:00 AM");
        assert_eq!(time_label(6 * 60), "6:00 AM");
        assert_eq!(time_label(12 * 60 + 30), "12:30 PM");
        assert_eq!(time_label(13 * 60), "1:00 PM");
        assert_eq!(slot_id(9 * 60 + 5), "09:05");
    }

    #[test]
    fn hourly_slots_cover_the_day() {
        let slots: Vec<_> = generate_slots(&view("06:00", "22:00", 60), date(), OperatingHours::FALLBACK).collect();
        assert_eq!(slots.len(), 16);
        assert_eq!(slots[0].id, "06:00");
        assert_eq!(slots[0].label, "6:00 AM");
        assert_eq!(slots[0].start_iso, "2024-06-01T06:00:00");
        assert_eq!(slots[0].end_iso, "2024-06-01T07:00:00");
        assert_eq!(slots[0].price, 800);
        assert_eq!(slots[15].id, "21:00");
        assert_eq!(slots[15].end_iso, "2024-06-01T22:00:00");
    }

    #[test]
    fn ninety_minute_slots_drop_the_partial_tail() {
        let v = view("06:00", "23:00", 90);
        let slots: Vec<_> = generate_slots(&v, date(), OperatingHours::FALLBACK).collect();
        // 17 hours fit 11 full 90-minute slots; the 12th would end at 24:00.
        assert_eq!(slots.len(), 11);
        let close = at_minute_of_day(date(), 23 * 60);
        let last = slots.last().unwrap();
        assert!(last.span.end <= close);
        assert_eq!(last.id, "21:00");
        assert!(slots.iter().all(|s| s.span.duration_ms() == 90 * MS_PER_MINUTE));
    }

    #[test]
    fn malformed_hours_use_fallback() {
        let slots: Vec<_> = generate_slots(&view("6am", "late", 60), date(), OperatingHours::FALLBACK).collect();
        assert_eq!(slots.len(), 17);
        assert_eq!(slots[0].id, "06:00");
        assert_eq!(slots[16].id, "22:00");
    }

    #[test]
    fn inverted_hours_yield_nothing() {
        let mut slots = generate_slots(&view("22:00", "06:00", 60), date(), OperatingHours::FALLBACK);
        assert!(slots.next().is_none());
    }

    #[test]
    fn zero_length_slots_yield_nothing() {
        let mut slots = generate_slots(&view("06:00", "22:00", 0), date(), OperatingHours::FALLBACK);
        assert!(slots.next().is_none());
    }

    #[test]
    fn price_override_applies_to_slots() {
        let mut v = view("08:00", "10:00", 60);
        v.unit.price_override = Some(1500);
        assert!(generate_slots(&v, date(), OperatingHours::FALLBACK).all(|s| s.price == 1500));
    }

    proptest! {
        #[test]
        fn slots_are_deterministic_and_whole(
            opens in 0u32..1440,
            len in 0u32..1440,
            slot_minutes in 5u32..240,
        ) {
            let closes = (opens + len).min(1440);
            let v = view(&slot_id_or_24(opens), &slot_id_or_24(closes), slot_minutes);
            let first: Vec<_> = generate_slots(&v, date(), OperatingHours::FALLBACK).collect();
            let second: Vec<_> = generate_slots(&v, date(), OperatingHours::FALLBACK).collect();
            prop_assert_eq!(&first, &second);

            let open_ms = at_minute_of_day(date(), opens);
            let close_ms = at_minute_of_day(date(), closes);
            for pair in first.windows(2) {
                prop_assert_eq!(pair[0].span.end, pair[1].span.start);
            }
            for s in &first {
                prop_assert!(s.span.start >= open_ms);
                prop_assert!(s.span.end <= close_ms);
                prop_assert_eq!(s.span.duration_ms(), Ms::from(slot_minutes) * MS_PER_MINUTE);
            }
            prop_assert_eq!(first.len() as u32, (closes - opens) / slot_minutes);
        }
    }

    fn slot_id_or_24(min: u32) -> String {
        if min == 1440 { "24:00".into() } else { slot_id(min) }
    }
}
