//! Dosing and maintenance recommendations for a hydroponic reservoir.
//!
//! Every function here is a pure calculation over caller-supplied values:
//! no I/O, no shared state, no caching. Callers snapshot their measurements
//! and configuration and pass them in explicitly.

pub mod ec;
pub mod error;
pub mod model;
pub mod ph;
pub mod profiles;
pub mod recommend;
pub mod schedule;
pub mod temperature;

pub use ec::{
    calculate_nutrient_additions, dilution_water_liters, evaluate_ec, rank_products, EcAdjustment,
    NutrientAddition, RankedProduct,
};
pub use error::{EngineError, Result};
pub use model::{
    DosagePerLiter, DosingSettings, GrowthStage, HistoryPoint, NutrientLevel, Product,
    ProductStage, Reading, StrengthTier, SystemProfile, Target,
};
pub use ph::{evaluate_ph, PhAdjustment, PhDirection};
pub use profiles::Profiles;
pub use recommend::{
    recommend, ChangeProjection, EvaluationFailure, Evaluator, ReadingStatus, Recommendation,
    RecommendationInput,
};
pub use schedule::{
    days_since_last_change, evaluate_schedule, ChangeBasis, LastChange, ScheduleWarning,
};
pub use temperature::{evaluate_water_temp, temperature_range, TempRange, TempStatus, TempWarning};

/// Measurements are logged to two decimals; this absorbs float noise so a
/// deviation that equals the tolerance counts as in range.
const TOLERANCE_EPSILON: f64 = 1e-9;

pub(crate) fn within_tolerance(deviation: f64, tolerance: f64) -> bool {
    deviation.abs() <= tolerance + TOLERANCE_EPSILON
}

/// Round to one decimal place.
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
