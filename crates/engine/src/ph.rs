//! pH correction: how much pH Up / pH Down to add to bring the reservoir
//! back inside the tolerance band.

use serde::Serialize;
use tracing::debug;

use crate::error::{ensure_finite, ensure_positive, Result};
use crate::model::{DosingSettings, Reading, Target};
use crate::{round1, within_tolerance};

/// ml of pH Down per pH unit per liter. Approximate; depends on product
/// strength and water hardness.
pub const PH_DOWN_STRENGTH: f64 = 1.2;

/// ml of pH Up per pH unit per liter. Approximate, like `PH_DOWN_STRENGTH`.
pub const PH_UP_STRENGTH: f64 = 1.0;

/// Smallest dose worth recommending.
pub const MIN_PH_DOSE_ML: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhAdjustment {
    pub direction: PhDirection,
    pub volume_ml: f64,
    pub deviation: f64,
}

/// Returns `None` when the reading is within `settings.ph_tolerance` of the
/// target (boundary inclusive).
pub fn evaluate_ph(
    current: &Reading,
    target: &Target,
    settings: &DosingSettings,
) -> Result<Option<PhAdjustment>> {
    ensure_finite("ph", current.ph)?;
    ensure_finite("ph_target", target.ph_target)?;
    ensure_positive("ph_tolerance", settings.ph_tolerance)?;
    ensure_positive("reservoir_liters", settings.reservoir_liters)?;

    let deviation = current.ph - target.ph_target;
    if within_tolerance(deviation, settings.ph_tolerance) {
        debug!(ph = current.ph, target = target.ph_target, "ph within tolerance");
        return Ok(None);
    }

    let (direction, strength) = if deviation > 0.0 {
        (PhDirection::Down, PH_DOWN_STRENGTH)
    } else {
        (PhDirection::Up, PH_UP_STRENGTH)
    };
    let volume_ml =
        round1(deviation.abs() * settings.reservoir_liters * strength).max(MIN_PH_DOSE_ML);

    debug!(?direction, volume_ml, deviation, "ph adjustment");
    Ok(Some(PhAdjustment {
        direction,
        volume_ml,
        deviation,
    }))
}
