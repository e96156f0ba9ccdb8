//! Local SQLite store of known vehicles
//!
//! Holds one flat row per (vehicle type, brand, model, generation, engine,
//! variant). It is only consulted when the remote catalog cannot answer, and
//! nothing read from the catalog is ever written here.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use directories::ProjectDirs;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use thiserror::Error;

use super::{FallbackVehicle, VehicleQuery};

/// File name of the fallback database inside the data directory
const DATABASE_FILE: &str = "fallback.db";

/// Columns selected for a full vehicle row, in `vehicle_from_row` order
const VEHICLE_COLUMNS: &str = "vehicle_type, brand, model, generation, engine, variant, \
     original_power, original_torque, stage1_power, stage1_torque, stage2_power, stage2_torque";

/// Errors from the fallback store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("fallback database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to prepare fallback database location: {0}")]
    Io(#[from] std::io::Error),
}

/// SQLite-backed table of fallback vehicles
#[derive(Debug)]
pub struct FallbackStore {
    conn: Mutex<Connection>,
}

impl FallbackStore {
    /// Default database location (`~/.local/share/ecutune/fallback.db` on Linux)
    ///
    /// Returns `None` if no home directory can be determined.
    pub fn default_path() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "ecutune")?;
        Some(project_dirs.data_dir().join(DATABASE_FILE))
    }

    /// Opens or creates the database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    /// Opens a private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS vehicles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                vehicle_type TEXT NOT NULL,
                brand TEXT NOT NULL,
                model TEXT NOT NULL,
                generation TEXT NOT NULL,
                engine TEXT NOT NULL,
                variant TEXT NOT NULL DEFAULT '',
                original_power INTEGER NOT NULL,
                original_torque INTEGER NOT NULL,
                stage1_power INTEGER NOT NULL,
                stage1_torque INTEGER NOT NULL,
                stage2_power INTEGER,
                stage2_torque INTEGER,
                UNIQUE (vehicle_type, brand, model, generation, engine, variant)
            );
            CREATE INDEX IF NOT EXISTS idx_vehicles_lookup
                ON vehicles(vehicle_type, brand, model, generation, engine);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Inserts a vehicle, replacing the figures of an existing identical row
    pub fn insert(&self, vehicle: &FallbackVehicle) -> Result<(), StoreError> {
        upsert(&self.lock(), vehicle)
    }

    /// Inserts many vehicles in one transaction, returning how many were written
    pub fn insert_all(&self, vehicles: &[FallbackVehicle]) -> Result<usize, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        for vehicle in vehicles {
            upsert(&tx, vehicle)?;
        }
        tx.commit()?;
        Ok(vehicles.len())
    }

    /// Number of stored vehicle rows
    pub fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM vehicles", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn brands(&self, vehicle_type: &str) -> Result<Vec<String>, StoreError> {
        self.distinct("brand", &[("vehicle_type", vehicle_type)])
    }

    pub fn models(&self, vehicle_type: &str, brand: &str) -> Result<Vec<String>, StoreError> {
        self.distinct("model", &[("vehicle_type", vehicle_type), ("brand", brand)])
    }

    pub fn generations(
        &self,
        vehicle_type: &str,
        brand: &str,
        model: &str,
    ) -> Result<Vec<String>, StoreError> {
        self.distinct(
            "generation",
            &[("vehicle_type", vehicle_type), ("brand", brand), ("model", model)],
        )
    }

    pub fn engines(
        &self,
        vehicle_type: &str,
        brand: &str,
        model: &str,
        generation: &str,
    ) -> Result<Vec<String>, StoreError> {
        self.distinct(
            "engine",
            &[
                ("vehicle_type", vehicle_type),
                ("brand", brand),
                ("model", model),
                ("generation", generation),
            ],
        )
    }

    /// Looks up a vehicle by exact match on all five query fields
    ///
    /// When several variants share those fields, the earliest inserted wins.
    pub fn find(&self, query: &VehicleQuery) -> Result<Option<FallbackVehicle>, StoreError> {
        let sql = format!(
            "SELECT {VEHICLE_COLUMNS} FROM vehicles \
             WHERE vehicle_type = ?1 AND brand = ?2 AND model = ?3 AND generation = ?4 AND engine = ?5 \
             ORDER BY id LIMIT 1"
        );

        let vehicle = self
            .lock()
            .query_row(
                &sql,
                params![
                    query.vehicle_type,
                    query.brand,
                    query.model,
                    query.generation,
                    query.engine
                ],
                vehicle_from_row,
            )
            .optional()?;
        Ok(vehicle)
    }

    /// Sorted distinct values of `column` among rows matching every filter
    fn distinct(
        &self,
        column: &'static str,
        filters: &[(&'static str, &str)],
    ) -> Result<Vec<String>, StoreError> {
        let conditions = filters
            .iter()
            .enumerate()
            .map(|(i, (name, _))| format!("{} = ?{}", name, i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!(
            "SELECT DISTINCT {column} FROM vehicles WHERE {conditions} ORDER BY {column}"
        );

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(filters.iter().map(|(_, value)| *value)), |row| {
            row.get::<_, String>(0)
        })?;
        let values = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(values)
    }
}

fn upsert(conn: &Connection, vehicle: &FallbackVehicle) -> Result<(), StoreError> {
    conn.execute(
        r#"INSERT INTO vehicles (vehicle_type, brand, model, generation, engine, variant,
               original_power, original_torque, stage1_power, stage1_torque, stage2_power, stage2_torque)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
           ON CONFLICT (vehicle_type, brand, model, generation, engine, variant) DO UPDATE SET
               original_power = excluded.original_power,
               original_torque = excluded.original_torque,
               stage1_power = excluded.stage1_power,
               stage1_torque = excluded.stage1_torque,
               stage2_power = excluded.stage2_power,
               stage2_torque = excluded.stage2_torque"#,
        params![
            vehicle.vehicle_type,
            vehicle.brand,
            vehicle.model,
            vehicle.generation,
            vehicle.engine,
            vehicle.variant,
            vehicle.original_power,
            vehicle.original_torque,
            vehicle.stage1_power,
            vehicle.stage1_torque,
            vehicle.stage2_power,
            vehicle.stage2_torque,
        ],
    )?;
    Ok(())
}

fn vehicle_from_row(row: &Row<'_>) -> rusqlite::Result<FallbackVehicle> {
    Ok(FallbackVehicle {
        vehicle_type: row.get(0)?,
        brand: row.get(1)?,
        model: row.get(2)?,
        generation: row.get(3)?,
        engine: row.get(4)?,
        variant: row.get(5)?,
        original_power: row.get(6)?,
        original_torque: row.get(7)?,
        stage1_power: row.get(8)?,
        stage1_torque: row.get(9)?,
        stage2_power: row.get(10)?,
        stage2_torque: row.get(11)?,
    })
}
