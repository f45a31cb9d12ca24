//! Sky positions with uncertainty and refinement semantics.
//!
//! A transient alert localizes a source as an RA/Dec pair with an error
//! radius. Later alerts for the same trigger usually localize better, so
//! positions carry an ordering: a position with a strictly smaller positive
//! uncertainty *refines* one with a larger (or absent) uncertainty. Group
//! state only ever moves down that ordering, which keeps localization
//! monotonic regardless of delivery order.
//!
//! Brokers occasionally emit an error radius of exactly `0.0` for events
//! with no real localization; that value is treated as absent rather than
//! as a perfect fix.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// An equatorial sky position with an optional error radius.
///
/// All angles are decimal degrees (J2000).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkyPosition {
    /// Right ascension in decimal degrees, `[0, 360)`.
    pub ra_deg: f64,
    /// Declination in decimal degrees, `[-90, 90]`.
    pub dec_deg: f64,
    /// Error radius in decimal degrees, if the alert localized at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncertainty_deg: Option<f64>,
}

impl SkyPosition {
    /// Creates a new sky position.
    #[must_use]
    pub const fn new(ra_deg: f64, dec_deg: f64, uncertainty_deg: Option<f64>) -> Self {
        Self {
            ra_deg,
            dec_deg,
            uncertainty_deg,
        }
    }

    /// Creates a position after validating coordinate ranges.
    ///
    /// # Errors
    ///
    /// Returns an error if RA is outside `[0, 360)` or Dec is outside
    /// `[-90, 90]`.
    pub fn checked(ra_deg: f64, dec_deg: f64, uncertainty_deg: Option<f64>) -> Result<Self> {
        if !(0.0..360.0).contains(&ra_deg) {
            return Err(Error::InvalidCoordinate {
                message: format!("right ascension {ra_deg} outside [0, 360)"),
            });
        }
        if !(-90.0..=90.0).contains(&dec_deg) {
            return Err(Error::InvalidCoordinate {
                message: format!("declination {dec_deg} outside [-90, 90]"),
            });
        }
        Ok(Self::new(ra_deg, dec_deg, uncertainty_deg))
    }

    /// Returns the uncertainty, with a `0.0` radius treated as absent.
    #[must_use]
    pub fn effective_uncertainty(&self) -> Option<f64> {
        self.uncertainty_deg.filter(|u| *u > 0.0)
    }

    /// Returns true if this position localizes strictly better than `other`.
    ///
    /// A position with no effective uncertainty never refines anything; any
    /// localized position refines an unlocalized one.
    #[must_use]
    pub fn is_more_precise_than(&self, other: &Self) -> bool {
        match (self.effective_uncertainty(), other.effective_uncertainty()) {
            (Some(mine), Some(theirs)) => mine < theirs,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Returns the angular separation to `other` in decimal degrees.
    ///
    /// Uses the haversine form, which is stable for the small separations
    /// repointing checks care about.
    #[must_use]
    pub fn separation_deg(&self, other: &Self) -> f64 {
        let ra1 = self.ra_deg.to_radians();
        let dec1 = self.dec_deg.to_radians();
        let ra2 = other.ra_deg.to_radians();
        let dec2 = other.dec_deg.to_radians();

        let sin_ddec = ((dec2 - dec1) / 2.0).sin();
        let sin_dra = ((ra2 - ra1) / 2.0).sin();
        let h = sin_ddec * sin_ddec + dec1.cos() * dec2.cos() * sin_dra * sin_dra;
        (2.0 * h.sqrt().min(1.0).asin()).to_degrees()
    }

    /// Formats the right ascension sexagesimally (`HH:MM:SS.ss`).
    ///
    /// Rounds to centiseconds first and carries, so a value just under a
    /// minute boundary formats as `:00` of the next minute rather than
    /// `:60.00`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn ra_hms(&self) -> String {
        let total_hours = (self.ra_deg.rem_euclid(360.0)) / 15.0;
        let total_centi = (total_hours * 360_000.0).round() as u64;
        let centi = total_centi % 100;
        let total_secs = total_centi / 100;
        let secs = total_secs % 60;
        let total_mins = total_secs / 60;
        let mins = total_mins % 60;
        let hours = (total_mins / 60) % 24;
        format!("{hours:02}:{mins:02}:{secs:02}.{centi:02}")
    }

    /// Formats the declination sexagesimally (`+DD:MM:SS.s`), with the same
    /// carry at minute and degree boundaries as [`Self::ra_hms`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn dec_dms(&self) -> String {
        let sign = if self.dec_deg < 0.0 { '-' } else { '+' };
        let total_deci = (self.dec_deg.abs() * 36_000.0).round() as u64;
        let deci = total_deci % 10;
        let total_secs = total_deci / 10;
        let secs = total_secs % 60;
        let total_mins = total_secs / 60;
        let mins = total_mins % 60;
        let degrees = total_mins / 60;
        format!("{sign}{degrees:02}:{mins:02}:{secs:02}.{deci}")
    }
}

impl fmt::Display for SkyPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.effective_uncertainty() {
            Some(u) => write!(
                f,
                "ra={:.4} dec={:.4} err={:.4}",
                self.ra_deg, self.dec_deg, u
            ),
            None => write!(f, "ra={:.4} dec={:.4} err=none", self.ra_deg, self.dec_deg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_rejects_out_of_range_coordinates() {
        assert!(SkyPosition::checked(370.0, 0.0, None).is_err());
        assert!(SkyPosition::checked(10.0, 91.0, None).is_err());
        assert!(SkyPosition::checked(10.0, -45.0, Some(1.0)).is_ok());
    }

    #[test]
    fn zero_uncertainty_is_treated_as_absent() {
        let pos = SkyPosition::new(10.0, 20.0, Some(0.0));
        assert_eq!(pos.effective_uncertainty(), None);

        let localized = SkyPosition::new(10.0, 20.0, Some(2.0));
        assert!(!pos.is_more_precise_than(&localized));
    }

    #[test]
    fn smaller_uncertainty_refines_larger() {
        let wide = SkyPosition::new(10.0, 20.0, Some(2.0));
        let narrow = SkyPosition::new(10.1, 20.1, Some(0.5));
        assert!(narrow.is_more_precise_than(&wide));
        assert!(!wide.is_more_precise_than(&narrow));
        assert!(!wide.is_more_precise_than(&wide));
    }

    #[test]
    fn localized_refines_unlocalized() {
        let unlocalized = SkyPosition::new(10.0, 20.0, None);
        let localized = SkyPosition::new(10.0, 20.0, Some(5.0));
        assert!(localized.is_more_precise_than(&unlocalized));
        assert!(!unlocalized.is_more_precise_than(&localized));
    }

    #[test]
    fn separation_of_identical_positions_is_zero() {
        let pos = SkyPosition::new(83.63, 22.01, Some(0.5));
        assert!(pos.separation_deg(&pos) < 1e-9);
    }

    #[test]
    fn separation_along_the_equator_matches_ra_difference() {
        let a = SkyPosition::new(10.0, 0.0, None);
        let b = SkyPosition::new(13.5, 0.0, None);
        assert!((a.separation_deg(&b) - 3.5).abs() < 1e-6);
    }

    #[test]
    fn sexagesimal_formatting() {
        let pos = SkyPosition::new(180.0, -45.5, None);
        assert_eq!(pos.ra_hms(), "12:00:00.00");
        assert_eq!(pos.dec_dms(), "-45:30:00.0");
    }

    #[test]
    fn sexagesimal_seconds_carry_at_minute_boundaries() {
        // Just under a minute boundary must not format as 60 seconds.
        let pos = SkyPosition::new(
            15.0 * (10.0 + 59.999_999 / 3600.0),
            -(45.0 + 59.999_999 / 3600.0),
            None,
        );
        assert_eq!(pos.ra_hms(), "10:01:00.00");
        assert_eq!(pos.dec_dms(), "-45:01:00.0");

        // The carry can ripple all the way up; 24h wraps to zero.
        let wrap = SkyPosition::new(359.999_999_9, 0.0, None);
        assert_eq!(wrap.ra_hms(), "00:00:00.00");
    }
}
