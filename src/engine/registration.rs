use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

fn validate_name(name: &str, max: usize, what: &'static str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::validation(format!("{what} must not be empty")));
    }
    if name.len() > max {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

pub(super) fn validate_price(price: Cents) -> Result<(), EngineError> {
    if price < 0 {
        return Err(EngineError::validation("price must not be negative"));
    }
    if price > MAX_PRICE {
        return Err(EngineError::LimitExceeded("price too large"));
    }
    Ok(())
}

impl Engine {
    /// Admins may register any venue; operators only their own.
    pub async fn register_venue(&self, venue: Venue, actor: Actor) -> Result<(), EngineError> {
        if !actor.operates(&venue) {
            return Err(EngineError::Unauthorized("operators may only register their own venues"));
        }
        validate_name(&venue.name, MAX_NAME_LEN, "venue name")?;
        if let Some(GeoPoint { latitude, longitude }) = venue.location
            && (!(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude))
        {
            return Err(EngineError::validation("location out of range"));
        }

        let _gate = self.begin_write().await;
        let _registering = self.catalog_lock.lock().await;
        if self.catalog().venue(&venue.id).is_some() {
            return Err(EngineError::AlreadyExists(venue.id));
        }
        let id = venue.id;
        self.persist_catalog(CatalogEvent::VenueRegistered(venue)).await?;
        info!(venue_id = %id, "venue registered");
        Ok(())
    }

    pub async fn register_sport(&self, sport: SportConfig, actor: Actor) -> Result<(), EngineError> {
        validate_name(&sport.sport, MAX_SPORT_LABEL_LEN, "sport")?;
        validate_price(sport.base_price)?;
        if !(MIN_SLOT_MINUTES..=MAX_SLOT_MINUTES).contains(&sport.slot_minutes) {
            return Err(EngineError::validation(format!(
                "slot_minutes must be between {MIN_SLOT_MINUTES} and {MAX_SLOT_MINUTES}"
            )));
        }

        let _gate = self.begin_write().await;
        let _registering = self.catalog_lock.lock().await;
        self.require_operator(&actor, &sport.venue_id)?;
        if self.catalog().sport(&sport.id).is_some() {
            return Err(EngineError::AlreadyExists(sport.id));
        }
        let id = sport.id;
        self.persist_catalog(CatalogEvent::SportRegistered(sport)).await?;
        info!(sport_id = %id, "sport registered");
        Ok(())
    }

    pub async fn register_unit(&self, unit: BookableUnit, actor: Actor) -> Result<(), EngineError> {
        validate_name(&unit.name, MAX_NAME_LEN, "unit name")?;
        if let Some(price) = unit.price_override {
            validate_price(price)?;
        }

        let _gate = self.begin_write().await;
        let _registering = self.catalog_lock.lock().await;
        let sport = self
            .catalog()
            .sport(&unit.sport_id)
            .ok_or(EngineError::NotFound(unit.sport_id))?;
        self.require_operator(&actor, &sport.venue_id)?;
        if self.catalog().unit_record(&unit.id).is_some() {
            return Err(EngineError::AlreadyExists(unit.id));
        }
        if self.catalog().units_for_sport(&sport.id).len() >= MAX_UNITS_PER_SPORT {
            return Err(EngineError::LimitExceeded("too many units for sport"));
        }
        let id = unit.id;
        self.persist_catalog(CatalogEvent::UnitRegistered(unit)).await?;
        info!(unit_id = %id, sport_id = %sport.id, "unit registered");
        Ok(())
    }

    /// Existing reservations are untouched; only new holds and requests
    /// need an active unit.
    pub async fn set_unit_status(
        &self,
        unit_id: Ulid,
        status: UnitStatus,
        actor: Actor,
    ) -> Result<(), EngineError> {
        let _gate = self.begin_write().await;
        let _registering = self.catalog_lock.lock().await;
        let view = self.unit(&unit_id).ok_or(EngineError::NotFound(unit_id))?;
        self.require_operator(&actor, &view.venue.id)?;
        self.persist_catalog(CatalogEvent::UnitStatusChanged { id: unit_id, status })
            .await?;
        info!(unit_id = %unit_id, status = %status, "unit status changed");
        Ok(())
    }
}
