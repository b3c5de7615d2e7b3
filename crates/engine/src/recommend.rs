//! Composite evaluation. Each evaluator runs on its own; a failure in one
//! is reported alongside the results of the others.

use serde::Serialize;
use time::{Date, Duration};
use tracing::{debug, warn};

use crate::ec::{adjusted_ec, effective_ec_target, evaluate_ec, EcAdjustment};
use crate::error::{EngineError, Result};
use crate::model::{DosingSettings, GrowthStage, HistoryPoint, Reading, SystemProfile, Target};
use crate::ph::{evaluate_ph, PhAdjustment};
use crate::profiles::Profiles;
use crate::schedule::{days_since_last_change, evaluate_schedule, LastChange, ScheduleWarning};
use crate::temperature::{evaluate_water_temp, TempWarning};
use crate::within_tolerance;

/// Everything one recommendation is computed from.
#[derive(Debug, Clone)]
pub struct RecommendationInput<'a> {
    pub reading: &'a Reading,
    /// Entries inside the lookback window, any order.
    pub history: &'a [HistoryPoint],
    pub today: Date,
    pub plant_type: &'a str,
    pub stage: GrowthStage,
    pub system_type: &'a str,
    pub settings: &'a DosingSettings,
    pub profiles: &'a Profiles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Evaluator {
    Ph,
    Ec,
    Schedule,
    WaterTemp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationFailure {
    pub evaluator: Evaluator,
    pub error: EngineError,
}

/// Where the reading sits relative to its targets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingStatus {
    pub ph: f64,
    pub ph_target: f64,
    pub ph_deviation: f64,
    pub ph_in_range: bool,
    pub measured_ec: f64,
    pub adjusted_ec: f64,
    pub effective_ec_target: f64,
    pub ec_deviation: f64,
    pub ec_in_range: bool,
    pub all_in_range: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeProjection {
    /// Negative once the change is overdue.
    pub days_until_change: i64,
    /// `None` when the due date falls outside the calendar.
    pub next_change_due: Option<Date>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub reading_date: Date,
    pub ph: Option<PhAdjustment>,
    pub ec: Option<EcAdjustment>,
    pub schedule: Option<ScheduleWarning>,
    pub temperature: Option<TempWarning>,
    pub status: Option<ReadingStatus>,
    pub last_change: LastChange,
    pub next_change: Option<ChangeProjection>,
    pub next_stage: Option<GrowthStage>,
    pub failures: Vec<EvaluationFailure>,
}

impl Recommendation {
    /// True when nothing needs doing and nothing failed.
    pub fn is_all_clear(&self) -> bool {
        self.ph.is_none()
            && self.ec.is_none()
            && self.schedule.is_none()
            && self.temperature.is_none()
            && self.failures.is_empty()
    }
}

pub fn recommend(input: &RecommendationInput<'_>) -> Recommendation {
    let mut failures = Vec::new();

    let target = input.profiles.target_for(input.plant_type, input.stage);
    let system = input.profiles.system(input.system_type);

    let ph = settle(
        Evaluator::Ph,
        target
            .clone()
            .and_then(|t| evaluate_ph(input.reading, t, input.settings)),
        &mut failures,
    );

    let ec = settle(
        Evaluator::Ec,
        target.clone().and_then(|t| {
            let sys = system.clone()?;
            evaluate_ec(
                input.reading,
                t,
                sys,
                input.settings,
                input.profiles.catalog(),
                input.stage,
            )
        }),
        &mut failures,
    );

    let last_change = days_since_last_change(input.history, input.today);
    let schedule = settle(
        Evaluator::Schedule,
        system
            .clone()
            .and_then(|sys| evaluate_schedule(last_change.days, sys)),
        &mut failures,
    );

    let temperature = match input.reading.water_temp_c {
        Some(temp_c) => settle(
            Evaluator::WaterTemp,
            evaluate_water_temp(temp_c, input.plant_type),
            &mut failures,
        ),
        None => None,
    };

    let status = match (&target, &system) {
        (Ok(t), Ok(sys)) => Some(reading_status(input.reading, t, sys, input.settings)),
        _ => None,
    };

    let next_change = system.as_ref().ok().map(|sys| {
        let days_until_change = sys.change_frequency_days.saturating_sub(last_change.days);
        ChangeProjection {
            days_until_change,
            next_change_due: offset_date(input.today, days_until_change),
        }
    });

    let next_stage = input.profiles.next_stage(input.plant_type, input.stage);

    debug!(
        plant_type = input.plant_type,
        stage = %input.stage,
        system_type = input.system_type,
        failures = failures.len(),
        "recommendation computed"
    );

    Recommendation {
        reading_date: input.reading.date,
        ph,
        ec,
        schedule,
        temperature,
        status,
        last_change,
        next_change,
        next_stage,
        failures,
    }
}

const SECONDS_PER_DAY: i64 = 86_400;

/// `date` moved by `days`, or `None` if that leaves the calendar.
fn offset_date(date: Date, days: i64) -> Option<Date> {
    let seconds = days.checked_mul(SECONDS_PER_DAY)?;
    date.checked_add(Duration::seconds(seconds))
}

fn settle<T>(
    evaluator: Evaluator,
    result: Result<Option<T>>,
    failures: &mut Vec<EvaluationFailure>,
) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(error) => {
            warn!(?evaluator, %error, "evaluator failed");
            failures.push(EvaluationFailure { evaluator, error });
            None
        }
    }
}

fn reading_status(
    reading: &Reading,
    target: &Target,
    system: &SystemProfile,
    settings: &DosingSettings,
) -> ReadingStatus {
    let ph_deviation = reading.ph - target.ph_target;
    let adjusted = adjusted_ec(reading.ec, settings.base_water_ec);
    let effective = effective_ec_target(target, system);
    let ec_deviation = adjusted - effective;

    let ph_in_range = within_tolerance(ph_deviation, settings.ph_tolerance);
    let ec_in_range = within_tolerance(ec_deviation, settings.ec_tolerance);

    ReadingStatus {
        ph: reading.ph,
        ph_target: target.ph_target,
        ph_deviation,
        ph_in_range,
        measured_ec: reading.ec,
        adjusted_ec: adjusted,
        effective_ec_target: effective,
        ec_deviation,
        ec_in_range,
        all_in_range: ph_in_range && ec_in_range,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
