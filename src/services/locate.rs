//! Moving a dwelling to a new address.

use crate::error::PipelineError;
use crate::geo::{nearest_monitored, to_grid};
use crate::geocode::Geocoder;
use crate::models::domain::{DwellingLocation, MonitoredCell, RiskAssessment};
use crate::services::aggregate;
use crate::store::{DwellingStore, ForecastStore, RiskStore};
use crate::utils::utc_to_local;
use chrono::{DateTime, FixedOffset, Utc};
use log::{info, warn};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relocation {
    pub location: DwellingLocation,
    /// Name of the monitored cell the dwelling was snapped to.
    pub cell_name: String,
    /// Fresh assessment, when today's forecast for the new cell is already stored.
    pub assessment: Option<RiskAssessment>,
}

/// Geocode `address`, snap it to the nearest monitored cell, store the new
/// location and recompute today's risk. Geocoding failures leave the dwelling
/// untouched.
pub fn relocate<S: ForecastStore + DwellingStore + RiskStore + ?Sized>(
    store: &mut S,
    geocoder: &dyn Geocoder,
    cells: &[MonitoredCell],
    user_id: i64,
    address: &str,
    now: DateTime<Utc>,
    tz: FixedOffset,
) -> Result<Relocation, PipelineError> {
    if store.dwelling(user_id)?.is_none() {
        return Err(PipelineError::Configuration(format!("no dwelling registered for user {}", user_id)));
    }

    let found = geocoder
        .geocode(address)
        .map_err(|e| PipelineError::ExternalFetch(format!("geocoding {:?} failed: {}", address, e)))?;
    if !(found.latitude.is_finite() && found.longitude.is_finite()) {
        return Err(PipelineError::ExternalFetch(format!(
            "geocoder returned unusable coordinates ({}, {}) for {:?}",
            found.latitude, found.longitude, address
        )));
    }
    let projected = to_grid(found.latitude, found.longitude);
    let nearest = nearest_monitored(projected, cells)
        .ok_or_else(|| PipelineError::Configuration("no monitored grid cells configured".to_string()))?;

    let location = DwellingLocation {
        address: address.to_string(),
        canonical_address: found.canonical_address,
        latitude: found.latitude,
        longitude: found.longitude,
        cell: nearest.cell,
    };
    store.set_location(user_id, &location)?;
    info!(
        "Locate: user {} moved to {:?} (grid {} -> {} {})",
        user_id, location.canonical_address, projected, nearest.name, nearest.cell
    );

    let today = utc_to_local(now, tz).date();
    let assessment = match aggregate::recompute_user(store, user_id, today, tz, now) {
        Ok(a) => Some(a),
        Err(e) => {
            warn!("Locate: risk for user {} not recomputed yet: {}", user_id, e);
            None
        }
    };

    Ok(Relocation {
        location,
        cell_name: nearest.name.clone(),
        assessment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::default_cells;
    use crate::geocode::{GeocodeError, GeocodedAddress};
    use crate::models::domain::GridCell;
    use crate::services::aggregate::tests::{dwelling, kst, local, seoul, winter_day};
    use crate::store::RiskRowMode;
    use crate::store::memory::MemoryStore;

    struct FixedGeocoder(Option<(f64, f64)>);

    impl Geocoder for FixedGeocoder {
        fn geocode(&self, address: &str) -> Result<GeocodedAddress, GeocodeError> {
            match self.0 {
                Some((latitude, longitude)) => Ok(GeocodedAddress {
                    latitude,
                    longitude,
                    canonical_address: format!("{} (canonical)", address),
                }),
                None => Err(GeocodeError::NotFound(address.to_string())),
            }
        }
    }

    #[test]
    fn relocation_snaps_to_monitored_cell_and_recomputes() {
        let mut store = MemoryStore::new(RiskRowMode::Current)
            .with_dwelling(dwelling(1, None))
            .with_samples(winter_day(seoul()));

        let city_hall = FixedGeocoder(Some((37.5668, 126.9786)));
        let moved =
            relocate(&mut store, &city_hall, &default_cells(), 1, "110 Sejong-daero", local(30, 9), kst()).unwrap();

        assert_eq!(moved.cell_name, "Seoul");
        assert_eq!(moved.location.cell, seoul());
        assert!(moved.assessment.is_some());
        let d = store.dwellings.get(&1).unwrap();
        assert_eq!(d.cell, Some(seoul()));
        assert_eq!(d.canonical_address.as_deref(), Some("110 Sejong-daero (canonical)"));
        assert!(store.current.contains_key(&1));
    }

    #[test]
    fn off_grid_points_snap_to_the_nearest_cell() {
        let mut store = MemoryStore::new(RiskRowMode::Current).with_dwelling(dwelling(1, None));
        let haeundae = FixedGeocoder(Some((35.1631, 129.1636)));
        let moved = relocate(&mut store, &haeundae, &default_cells(), 1, "Haeundae", local(30, 9), kst()).unwrap();
        assert_eq!(moved.location.cell, GridCell::new(98, 76));
        // no forecast stored for Busan yet
        assert!(moved.assessment.is_none());
    }

    #[test]
    fn geocoder_failure_leaves_dwelling_untouched() {
        let mut before = dwelling(1, Some(seoul()));
        before.address = Some("old address".into());
        let mut store = MemoryStore::new(RiskRowMode::Current).with_dwelling(before.clone());

        let err = relocate(&mut store, &FixedGeocoder(None), &default_cells(), 1, "nowhere", local(30, 9), kst())
            .unwrap_err();
        assert!(matches!(err, PipelineError::ExternalFetch(_)), "{}", err);
        assert_eq!(store.dwellings.get(&1), Some(&before));
    }

    #[test]
    fn unknown_user_is_rejected_before_geocoding() {
        let mut store = MemoryStore::new(RiskRowMode::Current);
        let err =
            relocate(&mut store, &FixedGeocoder(None), &default_cells(), 9, "x", local(30, 9), kst()).unwrap_err();
        assert!(err.is_skip());
    }

    #[test]
    fn non_finite_geocoder_result_leaves_dwelling_untouched() {
        let before = dwelling(1, Some(seoul()));
        let mut store = MemoryStore::new(RiskRowMode::Current).with_dwelling(before.clone());

        let broken = FixedGeocoder(Some((f64::NAN, f64::NAN)));
        let err = relocate(&mut store, &broken, &default_cells(), 1, "garbled", local(30, 9), kst()).unwrap_err();
        assert!(matches!(err, PipelineError::ExternalFetch(_)), "{}", err);
        assert_eq!(store.dwellings.get(&1), Some(&before));
        assert_eq!(store.dwellings.get(&1).and_then(|d| d.cell), Some(seoul()));
    }
}
