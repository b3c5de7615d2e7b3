use serde::Serialize;

use crate::error::{ensure_finite, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TempRange {
    pub min_c: f64,
    pub max_c: f64,
    pub optimal_c: f64,
}

/// Used for any plant type not in the table.
pub const DEFAULT_TEMP_RANGE: TempRange = TempRange {
    min_c: 18.0,
    max_c: 24.0,
    optimal_c: 21.0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TempStatus {
    TooCold,
    TooWarm,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TempWarning {
    pub status: TempStatus,
    pub temp_c: f64,
    pub range: TempRange,
}

/// Acceptable water temperature for a plant type.
pub fn temperature_range(plant_type: &str) -> TempRange {
    match plant_type {
        "leafy_greens" => TempRange {
            min_c: 18.0,
            max_c: 23.0,
            optimal_c: 20.0,
        },
        "fruiting" => TempRange {
            min_c: 20.0,
            max_c: 26.0,
            optimal_c: 23.0,
        },
        "herbs" => TempRange {
            min_c: 18.0,
            max_c: 24.0,
            optimal_c: 21.0,
        },
        _ => DEFAULT_TEMP_RANGE,
    }
}

pub fn evaluate_water_temp(temp_c: f64, plant_type: &str) -> Result<Option<TempWarning>> {
    ensure_finite("water_temp_c", temp_c)?;

    let range = temperature_range(plant_type);
    let status = if temp_c < range.min_c {
        TempStatus::TooCold
    } else if temp_c > range.max_c {
        TempStatus::TooWarm
    } else {
        return Ok(None);
    };

    Ok(Some(TempWarning {
        status,
        temp_c,
        range,
    }))
}
