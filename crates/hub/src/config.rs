//! TOML config file loading and validation for plant targets, system
//! profiles, the nutrient catalog and recommendation defaults.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;

use hydro_engine::{
    DosingSettings, GrowthStage, NutrientLevel, Product, Profiles, StrengthTier, SystemProfile,
    Target,
};

/// Upper bound for `lookback_days` and `change_frequency_days`. Keeps date
/// arithmetic on them well inside the calendar.
const MAX_DAYS: i64 = 3650;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub systems: Vec<SystemEntry>,
    #[serde(default)]
    pub profiles: Vec<ProfileEntry>,
    #[serde(default)]
    pub products: Vec<Product>,
}

/// Defaults for the recommendation endpoint. Any field can be overridden
/// per request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub enabled: bool,
    pub plant_type: String,
    pub growth_stage: String,
    pub system_type: String,
    pub reservoir_liters: f64,
    pub base_water_ec: f64,
    pub ph_tolerance: f64,
    pub ec_tolerance: f64,
    pub nutrient_strength: StrengthTier,
    /// How far back to look for the last nutrient change.
    pub lookback_days: i64,
}

impl Default for Settings {
    fn default() -> Self {
        let dosing = DosingSettings::default();
        Self {
            enabled: true,
            plant_type: "leafy_greens".to_string(),
            growth_stage: "vegetative".to_string(),
            system_type: "dwc".to_string(),
            reservoir_liters: dosing.reservoir_liters,
            base_water_ec: dosing.base_water_ec,
            ph_tolerance: dosing.ph_tolerance,
            ec_tolerance: dosing.ec_tolerance,
            nutrient_strength: dosing.strength,
            lookback_days: 7,
        }
    }
}

impl Settings {
    pub fn dosing(&self) -> DosingSettings {
        DosingSettings {
            reservoir_liters: self.reservoir_liters,
            base_water_ec: self.base_water_ec,
            ph_tolerance: self.ph_tolerance,
            ec_tolerance: self.ec_tolerance,
            strength: self.nutrient_strength,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SystemEntry {
    pub system_type: String,
    #[serde(default)]
    pub description: String,
    pub ec_modifier: f64,
    pub change_frequency_days: i64,
}

#[derive(Debug, Deserialize)]
pub struct ProfileEntry {
    pub plant_type: String,
    pub growth_stage: String,
    pub ph_target: f64,
    pub ec_target: f64,
    #[serde(default)]
    pub n: NutrientLevel,
    #[serde(default)]
    pub p: NutrientLevel,
    #[serde(default)]
    pub k: NutrientLevel,
}

/// Validated config in the shape the request handlers need.
#[derive(Debug)]
pub struct HubConfig {
    pub settings: Settings,
    pub profiles: Profiles,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_settings(&mut errors);
        self.validate_systems(&mut errors);
        self.validate_profiles(&mut errors);
        self.validate_products(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_settings(&self, errors: &mut Vec<String>) {
        let s = &self.settings;

        if s.plant_type.trim().is_empty() {
            errors.push("settings: plant_type is empty".to_string());
        }
        if s.growth_stage.parse::<GrowthStage>().is_err() {
            errors.push(format!(
                "settings: growth_stage '{}' is not a known stage",
                s.growth_stage
            ));
        }
        if !(s.reservoir_liters > 0.0) {
            errors.push(format!(
                "settings: reservoir_liters must be positive, got {}",
                s.reservoir_liters
            ));
        }
        if !(s.base_water_ec >= 0.0) {
            errors.push(format!(
                "settings: base_water_ec must not be negative, got {}",
                s.base_water_ec
            ));
        }
        if !(s.ph_tolerance > 0.0) {
            errors.push(format!(
                "settings: ph_tolerance must be positive, got {}",
                s.ph_tolerance
            ));
        }
        if !(s.ec_tolerance > 0.0) {
            errors.push(format!(
                "settings: ec_tolerance must be positive, got {}",
                s.ec_tolerance
            ));
        }
        if s.lookback_days <= 0 {
            errors.push(format!(
                "settings: lookback_days must be positive, got {}",
                s.lookback_days
            ));
        } else if s.lookback_days > MAX_DAYS {
            errors.push(format!(
                "settings: lookback_days must be at most {MAX_DAYS}, got {}",
                s.lookback_days
            ));
        }

        // Defaults only have to resolve once something is configured.
        if !self.systems.is_empty()
            && !self.systems.iter().any(|sys| sys.system_type == s.system_type)
        {
            errors.push(format!(
                "settings: system_type '{}' does not match any defined system",
                s.system_type
            ));
        }
        if !self.profiles.is_empty()
            && !self
                .profiles
                .iter()
                .any(|p| p.plant_type == s.plant_type && p.growth_stage == s.growth_stage)
        {
            errors.push(format!(
                "settings: no profile for plant_type '{}' at growth_stage '{}'",
                s.plant_type, s.growth_stage
            ));
        }
    }

    fn validate_systems(&self, errors: &mut Vec<String>) {
        let mut seen_ids: HashSet<&str> = HashSet::new();

        for (i, sys) in self.systems.iter().enumerate() {
            let ctx = || {
                if sys.system_type.is_empty() {
                    format!("systems[{i}]")
                } else {
                    format!("system '{}'", sys.system_type)
                }
            };

            if sys.system_type.trim().is_empty() {
                errors.push(format!("{}: system_type is empty", ctx()));
            } else if !seen_ids.insert(&sys.system_type) {
                errors.push(format!("{}: duplicate system_type", ctx()));
            }

            if !(sys.ec_modifier > 0.0) {
                errors.push(format!(
                    "{}: ec_modifier must be positive, got {}",
                    ctx(),
                    sys.ec_modifier
                ));
            }
            if sys.change_frequency_days <= 0 {
                errors.push(format!(
                    "{}: change_frequency_days must be positive, got {}",
                    ctx(),
                    sys.change_frequency_days
                ));
            } else if sys.change_frequency_days > MAX_DAYS {
                errors.push(format!(
                    "{}: change_frequency_days must be at most {MAX_DAYS}, got {}",
                    ctx(),
                    sys.change_frequency_days
                ));
            }
        }
    }

    fn validate_profiles(&self, errors: &mut Vec<String>) {
        let mut seen: HashSet<(&str, &str)> = HashSet::new();

        for (i, p) in self.profiles.iter().enumerate() {
            let ctx = || {
                if p.plant_type.is_empty() {
                    format!("profiles[{i}]")
                } else {
                    format!("profile '{}/{}'", p.plant_type, p.growth_stage)
                }
            };

            if p.plant_type.trim().is_empty() {
                errors.push(format!("{}: plant_type is empty", ctx()));
            }
            if p.growth_stage.parse::<GrowthStage>().is_err() {
                errors.push(format!(
                    "{}: growth_stage '{}' is not a known stage",
                    ctx(),
                    p.growth_stage
                ));
            } else if !seen.insert((p.plant_type.as_str(), p.growth_stage.as_str())) {
                errors.push(format!("{}: duplicate profile", ctx()));
            }

            if !(0.0..=14.0).contains(&p.ph_target) {
                errors.push(format!(
                    "{}: ph_target {} out of range [0.0, 14.0]",
                    ctx(),
                    p.ph_target
                ));
            }
            if !(p.ec_target >= 0.0) {
                errors.push(format!(
                    "{}: ec_target must not be negative, got {}",
                    ctx(),
                    p.ec_target
                ));
            }
        }
    }

    fn validate_products(&self, errors: &mut Vec<String>) {
        let mut seen_names: HashSet<&str> = HashSet::new();

        for (i, p) in self.products.iter().enumerate() {
            let ctx = || {
                if p.name.is_empty() {
                    format!("products[{i}]")
                } else {
                    format!("product '{}'", p.name)
                }
            };

            if p.name.trim().is_empty() {
                errors.push(format!("{}: name is empty", ctx()));
            } else if !seen_names.insert(&p.name) {
                errors.push(format!("{}: duplicate name", ctx()));
            }

            let doses = [
                ("light", p.ml_per_liter.light),
                ("medium", p.ml_per_liter.medium),
                ("heavy", p.ml_per_liter.heavy),
            ];
            for (tier, ml) in doses {
                if !(ml > 0.0) {
                    errors.push(format!(
                        "{}: ml_per_liter.{tier} must be positive, got {ml}",
                        ctx()
                    ));
                }
            }
        }
    }

    /// Convert into engine lookup tables. Call after `validate`.
    pub fn into_hub_config(self) -> Result<HubConfig> {
        let mut profiles = Profiles::new();

        for sys in self.systems {
            profiles = profiles.with_system(
                &sys.system_type,
                SystemProfile {
                    description: sys.description,
                    ec_modifier: sys.ec_modifier,
                    change_frequency_days: sys.change_frequency_days,
                },
            );
        }

        for p in self.profiles {
            let stage: GrowthStage = p
                .growth_stage
                .parse()
                .with_context(|| format!("profile '{}'", p.plant_type))?;
            profiles = profiles.with_target(
                &p.plant_type,
                stage,
                Target {
                    ph_target: p.ph_target,
                    ec_target: p.ec_target,
                    n: p.n,
                    p: p.p,
                    k: p.k,
                },
            );
        }

        for product in self.products {
            profiles = profiles.with_product(product);
        }

        Ok(HubConfig {
            settings: self.settings,
            profiles,
        })
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<HubConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config = parse(&contents).with_context(|| format!("invalid config: {path}"))?;

    tracing::info!(
        systems = config.profiles.system_count(),
        profiles = config.profiles.target_count(),
        products = config.profiles.catalog().len(),
        "config loaded"
    );

    Ok(config)
}

pub fn parse(contents: &str) -> Result<HubConfig> {
    let config: Config = toml::from_str(contents).context("failed to parse config")?;
    config.validate()?;
    config.into_hub_config()
}

// ===========================================================================
// Tests
// ===========================================================================
