use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, Pool, Sqlite};
use std::str::FromStr;
use time::Date;

use hydro_engine::{HistoryPoint, Reading};

#[derive(Clone)]
pub struct Db {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Run {
    pub id: i64,
    pub name: String,
    pub start_date: Date,
    pub end_date: Option<Date>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRun {
    pub name: String,
    pub start_date: Date,
    #[serde(default)]
    pub end_date: Option<Date>,
    #[serde(default)]
    pub description: Option<String>,
}

/// One day's log for a run: readings before and after adjusting, what was
/// added, and growing conditions.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Entry {
    pub id: i64,
    pub run_id: i64,
    pub date: Date,

    pub ph_initial: f64,
    pub ec_initial: f64,
    pub ph_final: f64,
    pub ec_final: f64,

    // additions, ml
    pub ph_down_added: f64,
    pub ph_up_added: f64,
    pub hydro_vega_added: f64,
    pub hydro_flora_added: f64,
    pub rhizotonic_added: f64,
    pub boost_added: f64,

    pub light_hours: i64,
    pub light_intensity: i64,

    pub water_temp: Option<f64>, // °C
    pub water_added: f64,        // liters
    pub water_level: f64,        // cm from top
    pub humidity: Option<f64>,   // %
    pub air_temp: Option<f64>,   // °C

    pub other_actions: Option<String>,
    pub observations: Option<String>,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEntry {
    pub date: Date,

    pub ph_initial: f64,
    pub ec_initial: f64,
    pub ph_final: f64,
    pub ec_final: f64,

    #[serde(default)]
    pub ph_down_added: f64,
    #[serde(default)]
    pub ph_up_added: f64,
    #[serde(default)]
    pub hydro_vega_added: f64,
    #[serde(default)]
    pub hydro_flora_added: f64,
    #[serde(default)]
    pub rhizotonic_added: f64,
    #[serde(default)]
    pub boost_added: f64,

    pub light_hours: i64,
    pub light_intensity: i64,

    #[serde(default)]
    pub water_temp: Option<f64>,
    #[serde(default)]
    pub water_added: f64,
    #[serde(default)]
    pub water_level: f64,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub air_temp: Option<f64>,

    #[serde(default)]
    pub other_actions: Option<String>,
    #[serde(default)]
    pub observations: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
}

const ENTRY_COLUMNS: &str = r#"
    id, run_id, date,
    ph_initial, ec_initial, ph_final, ec_final,
    ph_down_added, ph_up_added, hydro_vega_added, hydro_flora_added, rhizotonic_added, boost_added,
    light_hours, light_intensity,
    water_temp, water_added, water_level, humidity, air_temp,
    other_actions, observations, comments
"#;

impl Entry {
    /// The reading after adjustments, which is what the reservoir holds now.
    pub fn to_reading(&self) -> Reading {
        Reading {
            date: self.date,
            ph: self.ph_final,
            ec: self.ec_final,
            water_temp_c: self.water_temp,
        }
    }

    /// Nutrient concentrates count as a solution change; pH adjusters and
    /// root stimulant do not.
    pub fn to_history_point(&self) -> HistoryPoint {
        HistoryPoint {
            date: self.date,
            nutrient_added_ml: self.hydro_vega_added + self.hydro_flora_added + self.boost_added,
        }
    }
}

impl NewRun {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("name is empty");
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                bail!("end_date {end} is before start_date {}", self.start_date);
            }
        }
        Ok(())
    }
}

impl NewEntry {
    /// Returns an error describing every out-of-range field.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        for (name, ph) in [("ph_initial", self.ph_initial), ("ph_final", self.ph_final)] {
            if !(0.0..=14.0).contains(&ph) {
                errors.push(format!("{name} {ph} out of range [0, 14]"));
            }
        }
        for (name, ec) in [("ec_initial", self.ec_initial), ("ec_final", self.ec_final)] {
            if !(ec >= 0.0) {
                errors.push(format!("{name} must not be negative, got {ec}"));
            }
        }

        let additions = [
            ("ph_down_added", self.ph_down_added),
            ("ph_up_added", self.ph_up_added),
            ("hydro_vega_added", self.hydro_vega_added),
            ("hydro_flora_added", self.hydro_flora_added),
            ("rhizotonic_added", self.rhizotonic_added),
            ("boost_added", self.boost_added),
            ("water_added", self.water_added),
        ];
        for (name, amount) in additions {
            if !(amount >= 0.0) {
                errors.push(format!("{name} must not be negative, got {amount}"));
            }
        }

        if !(0..=24).contains(&self.light_hours) {
            errors.push(format!("light_hours {} out of range [0, 24]", self.light_hours));
        }
        if self.light_intensity < 0 {
            errors.push(format!(
                "light_intensity must not be negative, got {}",
                self.light_intensity
            ));
        }
        if let Some(t) = self.water_temp {
            if !t.is_finite() {
                errors.push(format!("water_temp must be a number, got {t}"));
            }
        }
        if let Some(h) = self.humidity {
            if !(0.0..=100.0).contains(&h) {
                errors.push(format!("humidity {h} out of range [0, 100]"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!("{}", errors.join("; "));
        }
    }
}

impl Db {
    /// db_url examples:
    /// - "sqlite:/home/pi/hydro/hydro.db"
    /// - "sqlite::memory:" (tests)
    pub async fn connect(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("invalid sqlite connection string: {db_url}"))?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to sqlite db: {db_url}"))?;

        Ok(Self { pool })
    }

    /// Runs SQLx migrations from ./migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run migrations")?;
        Ok(())
    }

    // ----------------------------
    // Runs
    // ----------------------------

    pub async fn create_run(&self, run: &NewRun) -> Result<Run> {
        let id = sqlx::query(
            r#"
            INSERT INTO runs (name, start_date, end_date, description)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&run.name)
        .bind(run.start_date)
        .bind(run.end_date)
        .bind(&run.description)
        .execute(&self.pool)
        .await
        .context("create_run failed")?
        .last_insert_rowid();

        self.get_run(id)
            .await?
            .context("run vanished right after insert")
    }

    /// Newest first.
    pub async fn list_runs(&self) -> Result<Vec<Run>> {
        sqlx::query_as::<_, Run>(
            r#"
            SELECT id, name, start_date, end_date, description
            FROM runs
            ORDER BY start_date DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("list_runs failed")
    }

    pub async fn get_run(&self, run_id: i64) -> Result<Option<Run>> {
        sqlx::query_as::<_, Run>(
            r#"
            SELECT id, name, start_date, end_date, description
            FROM runs
            WHERE id = ?
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .context("get_run failed")
    }

    // ----------------------------
    // Entries
    // ----------------------------

    pub async fn insert_entry(&self, run_id: i64, e: &NewEntry) -> Result<Entry> {
        let id = sqlx::query(
            r#"
            INSERT INTO entries (
              run_id, date,
              ph_initial, ec_initial, ph_final, ec_final,
              ph_down_added, ph_up_added, hydro_vega_added, hydro_flora_added,
              rhizotonic_added, boost_added,
              light_hours, light_intensity,
              water_temp, water_added, water_level, humidity, air_temp,
              other_actions, observations, comments
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run_id)
        .bind(e.date)
        .bind(e.ph_initial)
        .bind(e.ec_initial)
        .bind(e.ph_final)
        .bind(e.ec_final)
        .bind(e.ph_down_added)
        .bind(e.ph_up_added)
        .bind(e.hydro_vega_added)
        .bind(e.hydro_flora_added)
        .bind(e.rhizotonic_added)
        .bind(e.boost_added)
        .bind(e.light_hours)
        .bind(e.light_intensity)
        .bind(e.water_temp)
        .bind(e.water_added)
        .bind(e.water_level)
        .bind(e.humidity)
        .bind(e.air_temp)
        .bind(&e.other_actions)
        .bind(&e.observations)
        .bind(&e.comments)
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert_entry failed for run {run_id}"))?
        .last_insert_rowid();

        let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?");
        sqlx::query_as::<_, Entry>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .context("failed to read back inserted entry")
    }

    /// Entries for a run in date order (oldest first), optionally only those
    /// on or after `since`.
    pub async fn entries_for_run(&self, run_id: i64, since: Option<Date>) -> Result<Vec<Entry>> {
        let rows = match since {
            Some(since) => {
                let sql = format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries
                     WHERE run_id = ? AND date >= ?
                     ORDER BY date ASC, id ASC"
                );
                sqlx::query_as::<_, Entry>(&sql)
                    .bind(run_id)
                    .bind(since)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let sql = format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries
                     WHERE run_id = ?
                     ORDER BY date ASC, id ASC"
                );
                sqlx::query_as::<_, Entry>(&sql)
                    .bind(run_id)
                    .fetch_all(&self.pool)
                    .await
            }
        };
        rows.context("entries_for_run failed")
    }

    /// Latest entry for a run (by date, then insertion order), optionally
    /// only among entries dated on or before `until`.
    pub async fn last_entry(&self, run_id: i64, until: Option<Date>) -> Result<Option<Entry>> {
        let row = match until {
            Some(until) => {
                let sql = format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries
                     WHERE run_id = ? AND date <= ?
                     ORDER BY date DESC, id DESC
                     LIMIT 1"
                );
                sqlx::query_as::<_, Entry>(&sql)
                    .bind(run_id)
                    .bind(until)
                    .fetch_optional(&self.pool)
                    .await
            }
            None => {
                let sql = format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries
                     WHERE run_id = ?
                     ORDER BY date DESC, id DESC
                     LIMIT 1"
                );
                sqlx::query_as::<_, Entry>(&sql)
                    .bind(run_id)
                    .fetch_optional(&self.pool)
                    .await
            }
        };
        row.context("last_entry failed")
    }

    /// Latest entry across all runs.
    pub async fn last_entry_any(&self) -> Result<Option<Entry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries
             ORDER BY date DESC, id DESC
             LIMIT 1"
        );
        sqlx::query_as::<_, Entry>(&sql)
            .fetch_optional(&self.pool)
            .await
            .context("last_entry_any failed")
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use time::macros::date;

    pub(crate) async fn test_db() -> Db {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    pub(crate) fn new_run(name: &str, start: Date) -> NewRun {
        NewRun {
            name: name.into(),
            start_date: start,
            end_date: None,
            description: None,
        }
    }

    /// An entry with in-range readings and nothing added.
    pub(crate) fn new_entry(date: Date, ph: f64, ec: f64) -> NewEntry {
        NewEntry {
            date,
            ph_initial: ph,
            ec_initial: ec,
            ph_final: ph,
            ec_final: ec,
            ph_down_added: 0.0,
            ph_up_added: 0.0,
            hydro_vega_added: 0.0,
            hydro_flora_added: 0.0,
            rhizotonic_added: 0.0,
            boost_added: 0.0,
            light_hours: 16,
            light_intensity: 80,
            water_temp: Some(20.0),
            water_added: 0.0,
            water_level: 2.0,
            humidity: None,
            air_temp: None,
            other_actions: None,
            observations: None,
            comments: None,
        }
    }

    // -- Runs -------------------------------------------------------------

    #[tokio::test]
    async fn create_and_list_runs_newest_first() {
        let db = test_db().await;
        db.create_run(&new_run("spring lettuce", date!(2024 - 03 - 01))).await.unwrap();
        db.create_run(&new_run("summer basil", date!(2024 - 06 - 01))).await.unwrap();

        let runs = db.list_runs().await.unwrap();
        let names: Vec<&str> = runs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["summer basil", "spring lettuce"]);
        assert_eq!(runs[0].start_date, date!(2024 - 06 - 01));
    }

    #[tokio::test]
    async fn get_missing_run_is_none() {
        let db = test_db().await;
        assert!(db.get_run(42).await.unwrap().is_none());
    }

    #[test]
    fn run_validation() {
        assert!(new_run("", date!(2024 - 01 - 01)).validate().is_err());
        let mut run = new_run("r", date!(2024 - 02 - 01));
        run.end_date = Some(date!(2024 - 01 - 01));
        let msg = format!("{:#}", run.validate().unwrap_err());
        assert!(msg.contains("before start_date"), "{msg}");
    }

    // -- Entries ----------------------------------------------------------

    #[tokio::test]
    async fn insert_entry_round_trips_optional_fields() {
        let db = test_db().await;
        let run = db.create_run(&new_run("r", date!(2024 - 05 - 01))).await.unwrap();

        let mut e = new_entry(date!(2024 - 05 - 02), 6.1, 1.3);
        e.water_temp = None;
        e.observations = Some("new roots".into());
        let stored = db.insert_entry(run.id, &e).await.unwrap();

        assert_eq!(stored.run_id, run.id);
        assert_eq!(stored.water_temp, None);
        assert_eq!(stored.observations.as_deref(), Some("new roots"));
        assert_eq!(stored.date, date!(2024 - 05 - 02));
    }

    #[tokio::test]
    async fn insert_entry_unknown_run_fails() {
        let db = test_db().await;
        let e = new_entry(date!(2024 - 05 - 02), 6.1, 1.3);
        assert!(db.insert_entry(99, &e).await.is_err());
    }

    #[tokio::test]
    async fn entries_ordered_and_filtered_by_date() {
        let db = test_db().await;
        let run = db.create_run(&new_run("r", date!(2024 - 05 - 01))).await.unwrap();
        let other = db.create_run(&new_run("other", date!(2024 - 05 - 01))).await.unwrap();

        for day in [5u8, 1, 3] {
            let d = Date::from_calendar_date(2024, time::Month::May, day).unwrap();
            db.insert_entry(run.id, &new_entry(d, 6.0, 1.2)).await.unwrap();
        }
        db.insert_entry(other.id, &new_entry(date!(2024 - 05 - 04), 6.0, 1.2))
            .await
            .unwrap();

        let all = db.entries_for_run(run.id, None).await.unwrap();
        let days: Vec<u8> = all.iter().map(|e| e.date.day()).collect();
        assert_eq!(days, vec![1, 3, 5]);

        let recent = db
            .entries_for_run(run.id, Some(date!(2024 - 05 - 03)))
            .await
            .unwrap();
        let days: Vec<u8> = recent.iter().map(|e| e.date.day()).collect();
        assert_eq!(days, vec![3, 5]);
    }

    #[tokio::test]
    async fn last_entry_breaks_same_day_ties_by_insertion() {
        let db = test_db().await;
        let run = db.create_run(&new_run("r", date!(2024 - 05 - 01))).await.unwrap();

        db.insert_entry(run.id, &new_entry(date!(2024 - 05 - 03), 6.0, 1.0))
            .await
            .unwrap();
        db.insert_entry(run.id, &new_entry(date!(2024 - 05 - 03), 6.4, 1.4))
            .await
            .unwrap();
        db.insert_entry(run.id, &new_entry(date!(2024 - 05 - 02), 5.5, 0.9))
            .await
            .unwrap();

        let last = db.last_entry(run.id, None).await.unwrap().unwrap();
        assert_eq!(last.ph_final, 6.4);

        let any = db.last_entry_any().await.unwrap().unwrap();
        assert_eq!(any.id, last.id);
    }

    #[tokio::test]
    async fn last_entry_until_skips_later_entries() {
        let db = test_db().await;
        let run = db.create_run(&new_run("r", date!(2024 - 05 - 01))).await.unwrap();
        for (d, ph) in [(date!(2024 - 05 - 02), 5.8), (date!(2024 - 05 - 06), 6.3)] {
            db.insert_entry(run.id, &new_entry(d, ph, 1.2)).await.unwrap();
        }

        let last = db
            .last_entry(run.id, Some(date!(2024 - 05 - 05)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last.date, date!(2024 - 05 - 02));

        let same_day = db
            .last_entry(run.id, Some(date!(2024 - 05 - 06)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(same_day.ph_final, 6.3);

        assert!(db
            .last_entry(run.id, Some(date!(2024 - 05 - 01)))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn last_entry_empty_run_is_none() {
        let db = test_db().await;
        let run = db.create_run(&new_run("r", date!(2024 - 05 - 01))).await.unwrap();
        assert!(db.last_entry(run.id, None).await.unwrap().is_none());
        assert!(db.last_entry_any().await.unwrap().is_none());
    }

    // -- Validation + projections -----------------------------------------

    #[test]
    fn entry_validation_collects_errors() {
        let mut e = new_entry(date!(2024 - 05 - 02), 15.0, -1.0);
        e.light_hours = 25;
        e.boost_added = -2.0;
        let msg = format!("{:#}", e.validate().unwrap_err());
        assert!(msg.contains("ph_initial 15 out of range"), "{msg}");
        assert!(msg.contains("ec_final must not be negative"), "{msg}");
        assert!(msg.contains("light_hours 25"), "{msg}");
        assert!(msg.contains("boost_added must not be negative"), "{msg}");
    }

    #[test]
    fn valid_entry_passes() {
        new_entry(date!(2024 - 05 - 02), 6.0, 1.2).validate().unwrap();
    }

    #[tokio::test]
    async fn projections_for_engine() {
        let db = test_db().await;
        let run = db.create_run(&new_run("r", date!(2024 - 05 - 01))).await.unwrap();
        let mut e = new_entry(date!(2024 - 05 - 02), 6.0, 1.2);
        e.ph_final = 5.9;
        e.ec_final = 1.35;
        e.hydro_vega_added = 10.0;
        e.boost_added = 2.5;
        e.rhizotonic_added = 4.0;
        e.ph_down_added = 1.0;
        let stored = db.insert_entry(run.id, &e).await.unwrap();

        let reading = stored.to_reading();
        assert_eq!(reading.ph, 5.9);
        assert_eq!(reading.ec, 1.35);
        assert_eq!(reading.water_temp_c, Some(20.0));

        let point = stored.to_history_point();
        assert_eq!(point.nutrient_added_ml, 12.5);
    }

    #[tokio::test]
    async fn additives_outside_tracked_set_are_not_a_change() {
        let mut e = new_entry(date!(2024 - 05 - 02), 6.0, 1.2);
        e.rhizotonic_added = 5.0;
        e.ph_up_added = 2.0;
        let db = test_db().await;
        let run = db.create_run(&new_run("r", date!(2024 - 05 - 01))).await.unwrap();
        let stored = db.insert_entry(run.id, &e).await.unwrap();
        assert_eq!(stored.to_history_point().nutrient_added_ml, 0.0);
    }
}
