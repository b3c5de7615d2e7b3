//! EC correction. Too concentrated means dilute with fresh water; too
//! dilute means pick nutrient products from the catalog and dose them.
//!
//! Product choice is a greedy heuristic: rank by NPK closeness, then split
//! the deficit 70/30 over the two best matches, capped at the
//! manufacturer's dose for the chosen strength tier.

use serde::Serialize;
use tracing::debug;

use crate::error::{ensure_finite, ensure_non_negative, ensure_positive, EngineError, Result};
use crate::model::{
    DosingSettings, GrowthStage, Product, Reading, StrengthTier, SystemProfile, Target,
};
use crate::{round1, within_tolerance};

/// Approximate EC increase per ml of concentrate in one liter of solution.
/// Needs calibration against real products.
pub const EC_PER_ML: f64 = 0.05;

/// Share of the remaining deficit assigned to the best-matching product.
pub const PRIMARY_SHARE: f64 = 0.7;

/// Share of the remaining deficit assigned to the runner-up.
pub const SECONDARY_SHARE: f64 = 0.3;

/// Doses smaller than this are dropped.
pub const MIN_NUTRIENT_DOSE_ML: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutrientAddition {
    pub product: String,
    pub volume_ml: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EcAdjustment {
    /// Solution is too strong: top up with plain water.
    Dilute { water_liters: f64 },
    /// Solution is too weak: dose these products.
    AddNutrients {
        deficit: f64,
        additions: Vec<NutrientAddition>,
    },
    /// Solution is too weak but no product in the catalog yields a usable
    /// dose.
    NoProductAvailable { deficit: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedProduct<'a> {
    pub product: &'a Product,
    pub score: f64,
}

/// Measured EC minus the source water's contribution, never below zero.
pub fn adjusted_ec(measured_ec: f64, base_water_ec: f64) -> f64 {
    (measured_ec - base_water_ec).max(0.0)
}

/// EC target scaled for the hydroponic system in use.
pub fn effective_ec_target(target: &Target, system: &SystemProfile) -> f64 {
    target.ec_target * system.ec_modifier
}

pub fn evaluate_ec(
    current: &Reading,
    target: &Target,
    system: &SystemProfile,
    settings: &DosingSettings,
    catalog: &[Product],
    stage: GrowthStage,
) -> Result<Option<EcAdjustment>> {
    ensure_non_negative("ec", current.ec)?;
    ensure_non_negative("ec_target", target.ec_target)?;
    ensure_non_negative("base_water_ec", settings.base_water_ec)?;
    ensure_positive("ec_modifier", system.ec_modifier)?;
    ensure_positive("ec_tolerance", settings.ec_tolerance)?;
    ensure_positive("reservoir_liters", settings.reservoir_liters)?;

    let adjusted = adjusted_ec(current.ec, settings.base_water_ec);
    let effective = effective_ec_target(target, system);
    let deviation = adjusted - effective;

    if within_tolerance(deviation, settings.ec_tolerance) {
        debug!(adjusted, effective, "ec within tolerance");
        return Ok(None);
    }

    if deviation > 0.0 {
        let water_liters = dilution_water_liters(adjusted, effective, settings.reservoir_liters)?;
        debug!(adjusted, effective, water_liters, "ec too high, diluting");
        return Ok(Some(EcAdjustment::Dilute { water_liters }));
    }

    let deficit = effective - adjusted;
    let additions = calculate_nutrient_additions(
        deficit,
        settings.reservoir_liters,
        target,
        catalog,
        stage,
        settings.strength,
    )?;

    debug!(deficit, products = additions.len(), "ec too low");
    if additions.is_empty() {
        Ok(Some(EcAdjustment::NoProductAvailable { deficit }))
    } else {
        Ok(Some(EcAdjustment::AddNutrients { deficit, additions }))
    }
}

/// Liters of fresh water that bring `current_ec` down to `target_ec`,
/// from `current * volume = target * final_volume`. Never more than the
/// reservoir already holds.
pub fn dilution_water_liters(
    current_ec: f64,
    target_ec: f64,
    reservoir_liters: f64,
) -> Result<f64> {
    ensure_positive("reservoir_liters", reservoir_liters)?;
    ensure_non_negative("current_ec", current_ec)?;
    ensure_finite("target_ec", target_ec)?;
    if target_ec <= 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "effective EC target must be positive to dilute, got {target_ec}"
        )));
    }
    if current_ec <= target_ec {
        return Ok(0.0);
    }

    let final_volume = current_ec * reservoir_liters / target_ec;
    Ok(round1(final_volume - reservoir_liters).min(reservoir_liters))
}

/// Catalog products ordered by how closely their NPK profile matches the
/// target's, best first. Products for other stages are skipped unless that
/// leaves nothing. Equal scores keep catalog order.
pub fn rank_products<'a>(
    catalog: &'a [Product],
    target: &Target,
    stage: GrowthStage,
) -> Vec<RankedProduct<'a>> {
    let mut candidates: Vec<&Product> = catalog
        .iter()
        .filter(|p| p.stage.applies_to(stage))
        .collect();
    if candidates.is_empty() {
        candidates = catalog.iter().collect();
    }

    let mut ranked: Vec<RankedProduct<'a>> = candidates
        .into_iter()
        .map(|product| RankedProduct {
            product,
            score: npk_score(product, target),
        })
        .collect();

    // sort_by is stable
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

/// Weighted average of per-nutrient closeness (5 = identical level), where
/// nutrients the target demands more of weigh more.
fn npk_score(product: &Product, target: &Target) -> f64 {
    let axes = [(product.n, target.n), (product.p, target.p), (product.k, target.k)];

    let mut weighted = 0;
    let mut weights = 0;
    for (have, want) in axes {
        let closeness = 5 - (have.scale() - want.scale()).abs();
        weighted += closeness * want.scale();
        weights += want.scale();
    }
    weighted as f64 / weights as f64
}

/// Greedy dosing plan for an EC deficit using at most two products.
pub fn calculate_nutrient_additions(
    ec_deficit: f64,
    reservoir_liters: f64,
    target: &Target,
    catalog: &[Product],
    stage: GrowthStage,
    strength: StrengthTier,
) -> Result<Vec<NutrientAddition>> {
    ensure_non_negative("ec_deficit", ec_deficit)?;
    ensure_positive("reservoir_liters", reservoir_liters)?;

    let ranked = rank_products(catalog, target, stage);
    let mut remaining = ec_deficit;
    let mut additions = Vec::new();

    for (rank, candidate) in ranked.iter().take(2).enumerate() {
        let share = if rank == 0 { PRIMARY_SHARE } else { SECONDARY_SHARE };
        let ec_share = remaining * share;

        let uncapped = round1(ec_share / EC_PER_ML * reservoir_liters / 10.0);
        let max_ml = candidate.product.ml_per_liter.for_tier(strength) * reservoir_liters;
        let volume_ml = uncapped.min(max_ml).max(0.0);

        if volume_ml < MIN_NUTRIENT_DOSE_ML {
            debug!(product = %candidate.product.name, volume_ml, "dose below noise floor");
            continue;
        }

        remaining -= volume_ml * EC_PER_ML * 10.0 / reservoir_liters;
        additions.push(NutrientAddition {
            product: candidate.product.name.clone(),
            volume_ml,
        });
    }

    Ok(additions)
}

// ===========================================================================
// Tests
// ===========================================================================
