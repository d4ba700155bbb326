//! Per-userref configuration row.
//!
//! Persists the setup parameters the grid was built with, the
//! partial-fill salvage accumulators and the watchdog timestamps.

use rusqlite::params;
use rust_decimal::Decimal;

use crate::core::{unix_now, Result};
use crate::db::{decimal_from_sql, Database};

/// Snapshot of the configuration table for one userref.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationRow {
    pub amount_per_grid: Decimal,
    pub interval: Decimal,
    pub price_of_highest_buy: Decimal,
    pub vol_of_unfilled_remaining: Decimal,
    pub vol_of_unfilled_remaining_max_price: Decimal,
    pub last_price_time: i64,
    pub last_notification_time: i64,
}

#[derive(Clone)]
pub struct ConfigurationTable {
    db: Database,
    userref: i64,
}

impl ConfigurationTable {
    pub fn new(db: Database, userref: i64) -> Self {
        Self { db, userref }
    }

    pub fn get(&self) -> Result<ConfigurationRow> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT amount_per_grid, interval, price_of_highest_buy,
                        vol_of_unfilled_remaining, vol_of_unfilled_remaining_max_price,
                        last_price_time, last_notification_time
                 FROM configuration WHERE userref = ?1",
                params![self.userref],
                |row| {
                    Ok(ConfigurationRow {
                        amount_per_grid: decimal_from_sql(row.get::<_, String>(0)?)?,
                        interval: decimal_from_sql(row.get::<_, String>(1)?)?,
                        price_of_highest_buy: decimal_from_sql(row.get::<_, String>(2)?)?,
                        vol_of_unfilled_remaining: decimal_from_sql(row.get::<_, String>(3)?)?,
                        vol_of_unfilled_remaining_max_price: decimal_from_sql(
                            row.get::<_, String>(4)?,
                        )?,
                        last_price_time: row.get(5)?,
                        last_notification_time: row.get(6)?,
                    })
                },
            )
        })
    }

    fn set_text(&self, column: &str, value: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                &format!("UPDATE configuration SET {column} = ?1 WHERE userref = ?2"),
                params![value, self.userref],
            )?;
            Ok(())
        })
    }

    pub fn set_amount_per_grid(&self, value: Decimal) -> Result<()> {
        self.set_text("amount_per_grid", &value.to_string())
    }

    pub fn set_interval(&self, value: Decimal) -> Result<()> {
        self.set_text("interval", &value.to_string())
    }

    pub fn set_price_of_highest_buy(&self, value: Decimal) -> Result<()> {
        self.set_text("price_of_highest_buy", &value.to_string())
    }

    /// Accumulate executed volume salvaged from a canceled, partly
    /// filled buy order.
    pub fn add_unfilled_volume(&self, volume: Decimal) -> Result<()> {
        let current = self.get()?.vol_of_unfilled_remaining;
        self.set_text("vol_of_unfilled_remaining", &(current + volume).to_string())
    }

    pub fn set_unfilled_max_price(&self, price: Decimal) -> Result<()> {
        self.set_text("vol_of_unfilled_remaining_max_price", &price.to_string())
    }

    /// Reset both salvage accumulators to zero.
    pub fn reset_unfilled(&self) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE configuration
                 SET vol_of_unfilled_remaining = '0',
                     vol_of_unfilled_remaining_max_price = '0'
                 WHERE userref = ?1",
                params![self.userref],
            )?;
            Ok(())
        })
    }

    pub fn touch_last_price_time(&self) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE configuration SET last_price_time = ?1 WHERE userref = ?2",
                params![unix_now(), self.userref],
            )?;
            Ok(())
        })
    }

    pub fn set_last_notification_time(&self, when: i64) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE configuration SET last_notification_time = ?1 WHERE userref = ?2",
                params![when, self.userref],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;
    use rust_decimal_macros::dec;

    fn table() -> ConfigurationTable {
        let db = Database::open(&DbConfig {
            sqlite_file: None,
            in_memory: true,
        })
        .unwrap();
        db.init(1).unwrap();
        ConfigurationTable::new(db, 1)
    }

    #[test]
    fn test_defaults() {
        let row = table().get().unwrap();
        assert_eq!(row.amount_per_grid, Decimal::ZERO);
        assert_eq!(row.interval, Decimal::ZERO);
        assert_eq!(row.price_of_highest_buy, Decimal::ZERO);
        assert_eq!(row.vol_of_unfilled_remaining, Decimal::ZERO);
        assert!(row.last_price_time > 0);
        assert_eq!(row.last_notification_time, 0);
    }

    #[test]
    fn test_setters() {
        let t = table();
        t.set_amount_per_grid(dec!(100)).unwrap();
        t.set_interval(dec!(0.01)).unwrap();
        t.set_price_of_highest_buy(dec!(59405.9)).unwrap();
        let row = t.get().unwrap();
        assert_eq!(row.amount_per_grid, dec!(100));
        assert_eq!(row.interval, dec!(0.01));
        assert_eq!(row.price_of_highest_buy, dec!(59405.9));
    }

    #[test]
    fn test_salvage_accumulators() {
        let t = table();
        t.add_unfilled_volume(dec!(0.002)).unwrap();
        t.add_unfilled_volume(dec!(0.002)).unwrap();
        t.set_unfilled_max_price(dec!(49504.9)).unwrap();
        let row = t.get().unwrap();
        assert_eq!(row.vol_of_unfilled_remaining, dec!(0.004));
        assert_eq!(row.vol_of_unfilled_remaining_max_price, dec!(49504.9));
        t.reset_unfilled().unwrap();
        let row = t.get().unwrap();
        assert_eq!(row.vol_of_unfilled_remaining, Decimal::ZERO);
        assert_eq!(row.vol_of_unfilled_remaining_max_price, Decimal::ZERO);
    }
}
