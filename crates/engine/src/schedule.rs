//! Reservoir change schedule: how long since nutrients were last mixed in,
//! and whether the system's change interval has run out.

use serde::Serialize;
use time::Date;

use crate::error::{EngineError, Result};
use crate::model::{HistoryPoint, SystemProfile};

/// Where a `LastChange` figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeBasis {
    /// An entry in the window recorded a nutrient addition.
    NutrientAddition,
    /// No addition in the window; age of the oldest entry instead.
    OldestEntry,
    /// The window was empty.
    NoEntries,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LastChange {
    pub days: i64,
    pub basis: ChangeBasis,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleWarning {
    pub days_since_change: i64,
    pub change_frequency_days: i64,
    pub days_overdue: i64,
}

/// Days between `today` and the latest entry that added nutrients. Falls
/// back to the oldest entry's age when none did. `history` need not be
/// sorted.
pub fn days_since_last_change(history: &[HistoryPoint], today: Date) -> LastChange {
    let last_addition = history
        .iter()
        .filter(|h| h.nutrient_added_ml > 0.0)
        .map(|h| h.date)
        .max();

    if let Some(date) = last_addition {
        return LastChange {
            days: (today - date).whole_days(),
            basis: ChangeBasis::NutrientAddition,
        };
    }

    match history.iter().map(|h| h.date).min() {
        Some(oldest) => LastChange {
            days: (today - oldest).whole_days(),
            basis: ChangeBasis::OldestEntry,
        },
        None => LastChange {
            days: 0,
            basis: ChangeBasis::NoEntries,
        },
    }
}

pub fn evaluate_schedule(
    days_since_last_change: i64,
    system: &SystemProfile,
) -> Result<Option<ScheduleWarning>> {
    if days_since_last_change < 0 {
        return Err(EngineError::InvalidInput(format!(
            "days since last change cannot be negative, got {days_since_last_change}"
        )));
    }
    if system.change_frequency_days <= 0 {
        return Err(EngineError::InvalidInput(format!(
            "change_frequency_days must be positive, got {}",
            system.change_frequency_days
        )));
    }

    if days_since_last_change < system.change_frequency_days {
        return Ok(None);
    }

    Ok(Some(ScheduleWarning {
        days_since_change: days_since_last_change,
        change_frequency_days: system.change_frequency_days,
        days_overdue: days_since_last_change - system.change_frequency_days,
    }))
}
