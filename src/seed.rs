use crate::error::{AgentError, Result};
use crate::store::Store;
use chrono::{Duration, NaiveDate};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

pub const DEFAULT_ROWS: usize = 100_000;
const BATCH_SIZE: usize = 5_000;
const MINUTES_PER_YEAR: i64 = 525_600;

const CITIES: &[&str] = &["Delhi", "Mumbai", "Bangalore", "London", "New York", "Berlin"];
const STATUSES: &[&str] = &["success", "failed", "pending"];

const CREATE_TRANSACTIONS: &str = "CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER,
    amount REAL,
    status TEXT,
    city TEXT,
    created_at TEXT
)";

const INSERT_TRANSACTION: &str =
    "INSERT INTO transactions (user_id, amount, status, city, created_at) VALUES (?, ?, ?, ?, ?)";

/// Fills `transactions` with random rows spread over 2023.
pub fn seed_transactions(store: &Store, rows: usize, rng: &mut impl Rng) -> Result<usize> {
    let failed = |e: rusqlite::Error| AgentError::StoreUnavailable(e.to_string());
    let mut conn = store.open_writable()?;
    conn.execute_batch(CREATE_TRANSACTIONS).map_err(failed)?;

    let start = NaiveDate::from_ymd_opt(2023, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| AgentError::Config("invalid seed epoch".to_string()))?;

    let mut inserted = 0;
    while inserted < rows {
        let batch = BATCH_SIZE.min(rows - inserted);
        let tx = conn.transaction().map_err(failed)?;
        {
            let mut stmt = tx.prepare_cached(INSERT_TRANSACTION).map_err(failed)?;
            for _ in 0..batch {
                let user_id: i64 = rng.gen_range(1..=5000);
                let amount = (rng.gen_range(10.0..5000.0_f64) * 100.0).round() / 100.0;
                let status = STATUSES.choose(rng).copied().unwrap_or("success");
                let city = CITIES.choose(rng).copied().unwrap_or("Delhi");
                let created_at = start + Duration::minutes(rng.gen_range(0..=MINUTES_PER_YEAR));
                stmt.execute(rusqlite::params![
                    user_id,
                    amount,
                    status,
                    city,
                    created_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
                ])
                .map_err(failed)?;
            }
        }
        tx.commit().map_err(failed)?;
        inserted += batch;
        info!(inserted, "seeded rows");
    }
    Ok(inserted)
}
