//! Value types shared by every evaluator. Nothing here is mutated after
//! construction; each evaluation reads them fresh.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::Date;

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Ordinal enums
// ---------------------------------------------------------------------------

/// Relative demand (for targets) or content (for products) of one
/// macronutrient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NutrientLevel {
    VeryLow,
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

impl NutrientLevel {
    /// Position on the fixed 1..=5 scale used for all NPK comparisons.
    pub fn scale(self) -> i32 {
        match self {
            Self::VeryLow => 1,
            Self::Low => 2,
            Self::Medium => 3,
            Self::High => 4,
            Self::VeryHigh => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthStage {
    Seedling,
    Vegetative,
    Flowering,
    Fruiting,
    Harvest,
}

impl GrowthStage {
    /// Lifecycle order.
    pub const ALL: [GrowthStage; 5] = [
        Self::Seedling,
        Self::Vegetative,
        Self::Flowering,
        Self::Fruiting,
        Self::Harvest,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Seedling => "seedling",
            Self::Vegetative => "vegetative",
            Self::Flowering => "flowering",
            Self::Fruiting => "fruiting",
            Self::Harvest => "harvest",
        }
    }
}

impl fmt::Display for GrowthStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrowthStage {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == wanted)
            .ok_or_else(|| EngineError::InvalidInput(format!("unknown growth stage '{s}'")))
    }
}

/// Stage a product is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStage {
    #[default]
    All,
    Seedling,
    Vegetative,
    Flowering,
    Fruiting,
    Harvest,
}

impl ProductStage {
    pub fn applies_to(self, stage: GrowthStage) -> bool {
        match self {
            Self::All => true,
            Self::Seedling => stage == GrowthStage::Seedling,
            Self::Vegetative => stage == GrowthStage::Vegetative,
            Self::Flowering => stage == GrowthStage::Flowering,
            Self::Fruiting => stage == GrowthStage::Fruiting,
            Self::Harvest => stage == GrowthStage::Harvest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrengthTier {
    Light,
    #[default]
    Medium,
    Heavy,
}

impl FromStr for StrengthTier {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "medium" => Ok(Self::Medium),
            "heavy" => Ok(Self::Heavy),
            _ => Err(EngineError::InvalidInput(format!("unknown strength tier '{s}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// One measurement taken from the reservoir after adjustments were made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub date: Date,
    pub ph: f64,
    /// Conductivity in mS/cm, including whatever the source water carries.
    pub ec: f64,
    pub water_temp_c: Option<f64>,
}

/// Desired solution for one (plant type, growth stage) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub ph_target: f64,
    pub ec_target: f64,
    #[serde(default)]
    pub n: NutrientLevel,
    #[serde(default)]
    pub p: NutrientLevel,
    #[serde(default)]
    pub k: NutrientLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemProfile {
    pub description: String,
    /// Multiplier applied to every EC target (>0).
    pub ec_modifier: f64,
    pub change_frequency_days: i64,
}

impl Default for SystemProfile {
    fn default() -> Self {
        Self {
            description: "Unknown".to_string(),
            ec_modifier: 1.0,
            change_frequency_days: 14,
        }
    }
}

/// Manufacturer dose per liter of reservoir, per strength tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DosagePerLiter {
    #[serde(default = "default_ml_per_liter")]
    pub light: f64,
    #[serde(default = "default_ml_per_liter")]
    pub medium: f64,
    #[serde(default = "default_ml_per_liter")]
    pub heavy: f64,
}

fn default_ml_per_liter() -> f64 {
    2.0
}

impl Default for DosagePerLiter {
    fn default() -> Self {
        Self {
            light: default_ml_per_liter(),
            medium: default_ml_per_liter(),
            heavy: default_ml_per_liter(),
        }
    }
}

impl DosagePerLiter {
    pub fn for_tier(&self, tier: StrengthTier) -> f64 {
        match tier {
            StrengthTier::Light => self.light,
            StrengthTier::Medium => self.medium,
            StrengthTier::Heavy => self.heavy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    #[serde(default)]
    pub n: NutrientLevel,
    #[serde(default)]
    pub p: NutrientLevel,
    #[serde(default)]
    pub k: NutrientLevel,
    #[serde(default)]
    pub stage: ProductStage,
    #[serde(default)]
    pub ml_per_liter: DosagePerLiter,
}

/// Per-call reservoir settings. Passed explicitly into every evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DosingSettings {
    pub reservoir_liters: f64,
    /// EC of the source water, subtracted from every measurement.
    pub base_water_ec: f64,
    pub ph_tolerance: f64,
    pub ec_tolerance: f64,
    pub strength: StrengthTier,
}

impl Default for DosingSettings {
    fn default() -> Self {
        Self {
            reservoir_liters: 20.0,
            base_water_ec: 0.0,
            ph_tolerance: 0.3,
            ec_tolerance: 0.3,
            strength: StrengthTier::Medium,
        }
    }
}

/// What the schedule evaluator needs from one logged entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: Date,
    /// Sum of the tracked nutrient additives recorded in that entry.
    pub nutrient_added_ml: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nutrient_scale_is_one_to_five() {
        let scales: Vec<i32> = [
            NutrientLevel::VeryLow,
            NutrientLevel::Low,
            NutrientLevel::Medium,
            NutrientLevel::High,
            NutrientLevel::VeryHigh,
        ]
        .iter()
        .map(|l| l.scale())
        .collect();
        assert_eq!(scales, vec![1, 2, 3, 4, 5]);
        assert!(NutrientLevel::Low < NutrientLevel::High);
    }

    #[test]
    fn growth_stage_parses_case_insensitive() {
        assert_eq!("Flowering".parse::<GrowthStage>().unwrap(), GrowthStage::Flowering);
        assert_eq!(" seedling ".parse::<GrowthStage>().unwrap(), GrowthStage::Seedling);
        assert!("budding".parse::<GrowthStage>().is_err());
    }

    #[test]
    fn product_stage_all_matches_everything() {
        for stage in GrowthStage::ALL {
            assert!(ProductStage::All.applies_to(stage));
        }
        assert!(ProductStage::Flowering.applies_to(GrowthStage::Flowering));
        assert!(!ProductStage::Flowering.applies_to(GrowthStage::Vegetative));
    }

    #[test]
    fn product_defaults_fill_missing_fields() {
        let product: Product = serde_json::from_str(r#"{"name":"cal_mag"}"#).unwrap();
        assert_eq!(product.n, NutrientLevel::Medium);
        assert_eq!(product.stage, ProductStage::All);
        assert_eq!(product.ml_per_liter.for_tier(StrengthTier::Heavy), 2.0);
    }

    #[test]
    fn strength_tier_parse() {
        assert_eq!("HEAVY".parse::<StrengthTier>().unwrap(), StrengthTier::Heavy);
        assert!("extreme".parse::<StrengthTier>().is_err());
    }

    #[test]
    fn reading_date_serializes_as_iso() {
        let reading = Reading {
            date: time::macros::date!(2024 - 03 - 05),
            ph: 6.1,
            ec: 1.4,
            water_temp_c: None,
        };
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["date"], "2024-03-05");
    }
}
