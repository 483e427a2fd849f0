use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

/// Read side of the venue → sport → unit hierarchy, plus the hook the engine
/// uses to apply registered changes. Implementations must keep children in
/// registration order: auto-assignment picks the first free unit.
pub trait Catalog: Send + Sync {
    fn venue(&self, id: &Ulid) -> Option<Venue>;
    fn sport(&self, id: &Ulid) -> Option<SportConfig>;
    fn unit_record(&self, id: &Ulid) -> Option<BookableUnit>;

    fn sports_for_venue(&self, venue_id: &Ulid) -> Vec<Ulid>;
    fn units_for_sport(&self, sport_id: &Ulid) -> Vec<Ulid>;

    fn apply(&self, event: &CatalogEvent);

    /// Minimal event list that rebuilds the current catalog, parents first.
    fn snapshot(&self) -> Vec<CatalogEvent>;

    /// The unit with everything it inherits.
    fn unit(&self, id: &Ulid) -> Option<UnitView> {
        let unit = self.unit_record(id)?;
        let sport = self.sport(&unit.sport_id)?;
        let venue = self.venue(&sport.venue_id)?;
        Some(UnitView { unit, sport, venue })
    }

    fn units_for_venue(&self, venue_id: &Ulid) -> Vec<Ulid> {
        self.sports_for_venue(venue_id)
            .iter()
            .flat_map(|sport_id| self.units_for_sport(sport_id))
            .collect()
    }
}

#[derive(Default)]
pub struct InMemoryCatalog {
    venues: DashMap<Ulid, Venue>,
    sports: DashMap<Ulid, SportConfig>,
    units: DashMap<Ulid, BookableUnit>,
    venue_sports: DashMap<Ulid, Vec<Ulid>>,
    sport_units: DashMap<Ulid, Vec<Ulid>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn venue_count(&self) -> usize {
        self.venues.len()
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }
}

impl Catalog for InMemoryCatalog {
    fn venue(&self, id: &Ulid) -> Option<Venue> {
        self.venues.get(id).map(|v| v.value().clone())
    }

    fn sport(&self, id: &Ulid) -> Option<SportConfig> {
        self.sports.get(id).map(|s| s.value().clone())
    }

    fn unit_record(&self, id: &Ulid) -> Option<BookableUnit> {
        self.units.get(id).map(|u| u.value().clone())
    }

    fn sports_for_venue(&self, venue_id: &Ulid) -> Vec<Ulid> {
        self.venue_sports
            .get(venue_id)
            .map(|kids| kids.value().clone())
            .unwrap_or_default()
    }

    fn units_for_sport(&self, sport_id: &Ulid) -> Vec<Ulid> {
        self.sport_units
            .get(sport_id)
            .map(|kids| kids.value().clone())
            .unwrap_or_default()
    }

    fn apply(&self, event: &CatalogEvent) {
        match event {
            CatalogEvent::VenueRegistered(venue) => {
                self.venues.insert(venue.id, venue.clone());
            }
            CatalogEvent::SportRegistered(sport) => {
                if self.sports.insert(sport.id, sport.clone()).is_none() {
                    self.venue_sports.entry(sport.venue_id).or_default().push(sport.id);
                }
            }
            CatalogEvent::UnitRegistered(unit) => {
                if self.units.insert(unit.id, unit.clone()).is_none() {
                    self.sport_units.entry(unit.sport_id).or_default().push(unit.id);
                }
            }
            CatalogEvent::UnitStatusChanged { id, status } => {
                if let Some(mut unit) = self.units.get_mut(id) {
                    unit.status = *status;
                }
            }
        }
    }

    fn snapshot(&self) -> Vec<CatalogEvent> {
        let mut events = Vec::with_capacity(self.venues.len() + self.sports.len() + self.units.len());
        let mut venues: Vec<Venue> = self.venues.iter().map(|v| v.value().clone()).collect();
        venues.sort_by_key(|v| v.id);
        for venue in venues {
            let venue_id = venue.id;
            events.push(CatalogEvent::VenueRegistered(venue));
            for sport_id in self.sports_for_venue(&venue_id) {
                let Some(sport) = self.sport(&sport_id) else { continue };
                events.push(CatalogEvent::SportRegistered(sport));
                for unit_id in self.units_for_sport(&sport_id) {
                    if let Some(unit) = self.unit_record(&unit_id) {
                        events.push(CatalogEvent::UnitRegistered(unit));
                    }
                }
            }
        }
        events
    }
}
