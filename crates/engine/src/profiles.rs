//! Typed lookup tables for plant targets, system profiles and the product
//! catalog. Built once from validated configuration, then only read.

use std::collections::{BTreeMap, HashMap};

use crate::error::{EngineError, Result};
use crate::model::{GrowthStage, Product, SystemProfile, Target};

#[derive(Debug, Clone, Default)]
pub struct Profiles {
    targets: BTreeMap<(String, GrowthStage), Target>,
    systems: HashMap<String, SystemProfile>,
    catalog: Vec<Product>,
}

impl Profiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, plant_type: &str, stage: GrowthStage, target: Target) -> Self {
        self.targets.insert((plant_type.to_string(), stage), target);
        self
    }

    pub fn with_system(mut self, system_type: &str, profile: SystemProfile) -> Self {
        self.systems.insert(system_type.to_string(), profile);
        self
    }

    /// Appends to the catalog. Catalog order breaks ranking ties.
    pub fn with_product(mut self, product: Product) -> Self {
        self.catalog.push(product);
        self
    }

    pub fn target_for(&self, plant_type: &str, stage: GrowthStage) -> Result<&Target> {
        self.targets
            .get(&(plant_type.to_string(), stage))
            .ok_or_else(|| {
                EngineError::MissingConfiguration(format!(
                    "no target for plant type '{plant_type}' at stage '{stage}'"
                ))
            })
    }

    pub fn system(&self, system_type: &str) -> Result<&SystemProfile> {
        self.systems.get(system_type).ok_or_else(|| {
            EngineError::MissingConfiguration(format!("unknown system type '{system_type}'"))
        })
    }

    pub fn catalog(&self) -> &[Product] {
        &self.catalog
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Stages configured for a plant type, in lifecycle order.
    pub fn stages_for(&self, plant_type: &str) -> Vec<GrowthStage> {
        self.targets
            .keys()
            .filter(|(plant, _)| plant == plant_type)
            .map(|(_, stage)| *stage)
            .collect()
    }

    /// The configured stage that follows `stage` for this plant type.
    pub fn next_stage(&self, plant_type: &str, stage: GrowthStage) -> Option<GrowthStage> {
        self.stages_for(plant_type).into_iter().find(|s| *s > stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NutrientLevel;

    fn target(ec: f64) -> Target {
        Target {
            ph_target: 6.0,
            ec_target: ec,
            n: NutrientLevel::Medium,
            p: NutrientLevel::Medium,
            k: NutrientLevel::Medium,
        }
    }

    fn profiles() -> Profiles {
        Profiles::new()
            .with_target("leafy_greens", GrowthStage::Vegetative, target(1.2))
            .with_target("leafy_greens", GrowthStage::Seedling, target(0.6))
            .with_target("leafy_greens", GrowthStage::Harvest, target(1.0))
            .with_target("fruiting", GrowthStage::Flowering, target(2.0))
            .with_system("dwc", SystemProfile::default())
    }

    #[test]
    fn target_lookup() {
        let p = profiles();
        assert_eq!(p.target_for("leafy_greens", GrowthStage::Seedling).unwrap().ec_target, 0.6);
        assert!(matches!(
            p.target_for("leafy_greens", GrowthStage::Flowering),
            Err(EngineError::MissingConfiguration(_))
        ));
    }

    #[test]
    fn system_lookup_missing() {
        let err = profiles().system("aeroponic").unwrap_err();
        assert_eq!(
            err,
            EngineError::MissingConfiguration("unknown system type 'aeroponic'".into())
        );
    }

    #[test]
    fn stages_come_back_in_lifecycle_order() {
        assert_eq!(
            profiles().stages_for("leafy_greens"),
            vec![GrowthStage::Seedling, GrowthStage::Vegetative, GrowthStage::Harvest]
        );
    }

    #[test]
    fn next_stage_skips_unconfigured() {
        let p = profiles();
        assert_eq!(
            p.next_stage("leafy_greens", GrowthStage::Vegetative),
            Some(GrowthStage::Harvest)
        );
        assert_eq!(p.next_stage("leafy_greens", GrowthStage::Harvest), None);
        assert_eq!(p.next_stage("herbs", GrowthStage::Seedling), None);
    }
}
