// 🗄️ Vehicle Store - SQLite persistence with an activity log
// Vehicles live in one table; every change is appended to an events table.

use crate::vehicles::Vehicle;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

// ============================================================================
// ACTIVITY LOG
// ============================================================================

pub const ADD_VEHICLE: &str = "ADD_VEHICLE";
pub const EDIT_VEHICLE: &str = "EDIT_VEHICLE";
pub const DELETE_VEHICLE: &str = "DELETE_VEHICLE";
pub const IMPORT_VEHICLE: &str = "IMPORT_VEHICLE";

const VEHICLE_ENTITY: &str = "vehicle";

/// One entry of the activity log ("who did what to which record")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Outcome of a bulk import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ImportSummary {
    pub inserted: usize,
    pub duplicates: usize,
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Open (or create) the database file and make sure the tables exist
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database at {:?}", path))?;
    setup_database(&conn)?;
    debug!("Database ready at {:?}", path);
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // import_hash is only set for bulk-imported rows; SQLite allows many NULLs under UNIQUE
    conn.execute(
        "CREATE TABLE IF NOT EXISTS vehicles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            vehicle_uuid TEXT UNIQUE NOT NULL,
            import_hash TEXT UNIQUE,
            make TEXT NOT NULL,
            model TEXT NOT NULL,
            year INTEGER NOT NULL,
            price REAL NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            owner TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_vehicles_make ON vehicles(make)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_vehicles_owner ON vehicles(owner)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_vehicles_created ON vehicles(created_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_actor ON events(actor, timestamp)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// CSV IMPORT
// ============================================================================

/// Read vehicles from a CSV with headers `make,model,year,price[,description][,owner]`
///
/// Rows that fail validation are skipped with a warning.
pub fn load_csv(csv_path: &Path) -> Result<Vec<Vehicle>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file {:?}", csv_path))?;

    let mut vehicles = Vec::new();

    for (index, result) in rdr.deserialize().enumerate() {
        // header is line 1
        let line = index + 2;
        let vehicle: Vehicle =
            result.with_context(|| format!("Failed to deserialize vehicle on line {}", line))?;

        match vehicle.validate() {
            Ok(()) => vehicles.push(vehicle),
            Err(errors) => {
                let reasons: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                warn!("Skipping line {}: {}", line, reasons.join(", "));
            }
        }
    }

    Ok(vehicles)
}

/// Bulk insert, skipping rows whose content was imported before
///
/// Each row commits together with its `IMPORT_VEHICLE` event.
pub fn insert_vehicles(conn: &Connection, vehicles: &[Vehicle], actor: &str) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for vehicle in vehicles {
        let hash = vehicle.import_hash();

        if import_hash_exists(conn, &hash)? {
            debug!("Skipping duplicate {} ({})", vehicle.label(), hash);
            summary.duplicates += 1;
            continue;
        }

        let tx = conn.unchecked_transaction()?;
        insert_row(&tx, vehicle, Some(&hash))
            .with_context(|| format!("Failed to import vehicle {}", vehicle.id))?;
        log_activity(
            &tx,
            actor,
            IMPORT_VEHICLE,
            &vehicle.id,
            serde_json::json!({
                "make": vehicle.make,
                "model": vehicle.model,
                "import_hash": hash,
            }),
        )?;
        tx.commit()?;

        summary.inserted += 1;
    }

    info!(
        "Imported {} vehicles, skipped {} duplicates",
        summary.inserted, summary.duplicates
    );

    Ok(summary)
}

fn import_hash_exists(conn: &Connection, hash: &str) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM vehicles WHERE import_hash = ?1)",
        params![hash],
        |row| row.get(0),
    )?;
    Ok(exists)
}

// ============================================================================
// CRUD
// ============================================================================

fn insert_row(conn: &Connection, vehicle: &Vehicle, import_hash: Option<&str>) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO vehicles (
            vehicle_uuid, import_hash, make, model, year, price, description, owner, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            vehicle.id,
            import_hash,
            vehicle.make,
            vehicle.model,
            vehicle.year,
            vehicle.price,
            vehicle.description,
            vehicle.owner,
            timestamp(&vehicle.created_at),
        ],
    )?;
    Ok(())
}

pub fn insert_vehicle(conn: &Connection, vehicle: &Vehicle, actor: &str) -> Result<()> {
    insert_row(conn, vehicle, None)
        .with_context(|| format!("Failed to insert vehicle {}", vehicle.id))?;

    log_activity(
        conn,
        actor,
        ADD_VEHICLE,
        &vehicle.id,
        serde_json::json!({ "make": vehicle.make, "model": vehicle.model }),
    )?;
    info!("Vehicle added: {} {}", vehicle.make, vehicle.model);

    Ok(())
}

/// Overwrite the editable fields of a stored vehicle; `false` if no such id
pub fn update_vehicle(conn: &Connection, vehicle: &Vehicle, actor: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE vehicles
         SET make = ?1, model = ?2, year = ?3, price = ?4, description = ?5, updated_at = ?6
         WHERE vehicle_uuid = ?7",
        params![
            vehicle.make,
            vehicle.model,
            vehicle.year,
            vehicle.price,
            vehicle.description,
            timestamp(&Utc::now()),
            vehicle.id,
        ],
    )?;

    if changed == 0 {
        return Ok(false);
    }

    log_activity(conn, actor, EDIT_VEHICLE, &vehicle.id, serde_json::json!({}))?;
    info!("Vehicle updated: {}", vehicle.id);

    Ok(true)
}

/// Remove a vehicle, returning what was deleted
pub fn delete_vehicle(conn: &Connection, id: &str, actor: &str) -> Result<Option<Vehicle>> {
    let Some(vehicle) = get_vehicle(conn, id)? else {
        return Ok(None);
    };

    conn.execute("DELETE FROM vehicles WHERE vehicle_uuid = ?1", params![id])?;

    log_activity(
        conn,
        actor,
        DELETE_VEHICLE,
        id,
        serde_json::json!({ "make": vehicle.make }),
    )?;
    info!("Vehicle deleted: {}", id);

    Ok(Some(vehicle))
}

const VEHICLE_COLUMNS: &str =
    "vehicle_uuid, make, model, year, price, description, owner, created_at";

fn vehicle_from_row(row: &Row) -> rusqlite::Result<Vehicle> {
    let created_at: String = row.get(7)?;

    Ok(Vehicle {
        id: row.get(0)?,
        make: row.get(1)?,
        model: row.get(2)?,
        year: row.get(3)?,
        price: row.get(4)?,
        description: row.get(5)?,
        owner: row.get(6)?,
        created_at: parse_timestamp(7, &created_at)?,
    })
}

pub fn get_vehicle(conn: &Connection, id: &str) -> Result<Option<Vehicle>> {
    let vehicle = conn
        .query_row(
            &format!("SELECT {} FROM vehicles WHERE vehicle_uuid = ?1", VEHICLE_COLUMNS),
            params![id],
            vehicle_from_row,
        )
        .optional()?;

    Ok(vehicle)
}

/// Every vehicle, newest first
pub fn get_all_vehicles(conn: &Connection) -> Result<Vec<Vehicle>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM vehicles ORDER BY created_at DESC, id DESC",
        VEHICLE_COLUMNS
    ))?;

    let vehicles = stmt
        .query_map([], vehicle_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(vehicles)
}

/// The `limit` most recently listed vehicles
pub fn get_recent_vehicles(conn: &Connection, limit: usize) -> Result<Vec<Vehicle>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM vehicles ORDER BY created_at DESC, id DESC LIMIT ?1",
        VEHICLE_COLUMNS
    ))?;

    let vehicles = stmt
        .query_map(params![limit as i64], vehicle_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(vehicles)
}

pub fn get_vehicles_by_owner(conn: &Connection, owner: &str) -> Result<Vec<Vehicle>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM vehicles WHERE owner = ?1 ORDER BY created_at DESC, id DESC",
        VEHICLE_COLUMNS
    ))?;

    let vehicles = stmt
        .query_map(params![owner], vehicle_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(vehicles)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM vehicles", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// EVENTS
// ============================================================================

/// Record an action against a vehicle
pub fn log_activity(
    conn: &Connection,
    actor: &str,
    action: &str,
    vehicle_id: &str,
    data: serde_json::Value,
) -> Result<Event> {
    let event = Event::new(action, VEHICLE_ENTITY, vehicle_id, data, actor);
    insert_event(conn, &event)?;
    Ok(event)
}

/// Insert event into the activity log
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            timestamp(&event.timestamp),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

fn event_from_row(row: &Row) -> rusqlite::Result<Event> {
    let timestamp_str: String = row.get(1)?;
    let data_json: String = row.get(5)?;

    Ok(Event {
        event_id: row.get(0)?,
        timestamp: parse_timestamp(1, &timestamp_str)?,
        event_type: row.get(2)?,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        data: serde_json::from_str(&data_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
        actor: row.get(6)?,
    })
}

/// Events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], event_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

/// The `limit` most recent events by one actor
pub fn get_activities_for_actor(conn: &Connection, actor: &str, limit: usize) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE actor = ?1
         ORDER BY timestamp DESC, id DESC
         LIMIT ?2",
    )?;

    let events = stmt
        .query_map(params![actor, limit as i64], event_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn write_csv(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "vehicle_valuation_{}_{}.csv",
            name,
            uuid::Uuid::new_v4()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = memory_db();
        setup_database(&conn).unwrap();
        assert_eq!(verify_count(&conn).unwrap(), 0);
    }

    #[test]
    fn test_insert_and_get_vehicle() {
        let conn = memory_db();
        let vehicle = Vehicle::new("Honda", "Civic", 2020, 19999.0, "One owner").with_owner("dana");

        insert_vehicle(&conn, &vehicle, "dana").unwrap();

        let stored = get_vehicle(&conn, &vehicle.id).unwrap().unwrap();
        assert_eq!(stored.make, "Honda");
        assert_eq!(stored.price, 19999.0);
        assert_eq!(stored.owner.as_deref(), Some("dana"));
        assert_eq!(
            stored.created_at.timestamp_micros(),
            vehicle.created_at.timestamp_micros()
        );
        assert!(get_vehicle(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_manual_inserts_are_not_deduplicated() {
        let conn = memory_db();
        insert_vehicle(&conn, &Vehicle::new("Ford", "Focus", 2019, 9000.0, ""), "cli").unwrap();
        insert_vehicle(&conn, &Vehicle::new("Ford", "Focus", 2019, 9000.0, ""), "cli").unwrap();
        assert_eq!(verify_count(&conn).unwrap(), 2);
    }

    #[test]
    fn test_update_vehicle() {
        let conn = memory_db();
        let mut vehicle = Vehicle::new("Audi", "A4", 2019, 24000.0, "");
        insert_vehicle(&conn, &vehicle, "cli").unwrap();

        vehicle.price = 22500.0;
        vehicle.description = "New tires".to_string();
        assert!(update_vehicle(&conn, &vehicle, "cli").unwrap());

        let stored = get_vehicle(&conn, &vehicle.id).unwrap().unwrap();
        assert_eq!(stored.price, 22500.0);
        assert_eq!(stored.description, "New tires");

        let ghost = Vehicle::new("Audi", "A6", 2019, 1.0, "");
        assert!(!update_vehicle(&conn, &ghost, "cli").unwrap());
    }

    #[test]
    fn test_delete_vehicle() {
        let conn = memory_db();
        let vehicle = Vehicle::new("BMW", "X3", 2017, 21000.0, "");
        insert_vehicle(&conn, &vehicle, "cli").unwrap();

        let deleted = delete_vehicle(&conn, &vehicle.id, "cli").unwrap();
        assert_eq!(deleted.map(|v| v.model), Some("X3".to_string()));
        assert_eq!(verify_count(&conn).unwrap(), 0);
        assert!(delete_vehicle(&conn, &vehicle.id, "cli").unwrap().is_none());
    }

    #[test]
    fn test_listing_order_and_owner_filter() {
        let conn = memory_db();
        for (i, model) in ["A", "B", "C", "D", "E", "F", "G"].iter().enumerate() {
            let mut vehicle = Vehicle::new("Kia", model, 2020, 10000.0, "");
            vehicle.created_at = Utc::now() + chrono::Duration::seconds(i as i64);
            if i % 2 == 0 {
                vehicle = vehicle.with_owner("sam");
            }
            insert_vehicle(&conn, &vehicle, "cli").unwrap();
        }

        let all = get_all_vehicles(&conn).unwrap();
        assert_eq!(all.len(), 7);
        assert_eq!(all[0].model, "G");

        let recent = get_recent_vehicles(&conn, 6).unwrap();
        let models: Vec<&str> = recent.iter().map(|v| v.model.as_str()).collect();
        assert_eq!(models, vec!["G", "F", "E", "D", "C", "B"]);

        let owned = get_vehicles_by_owner(&conn, "sam").unwrap();
        assert_eq!(owned.len(), 4);
        assert!(owned.iter().all(|v| v.owner.as_deref() == Some("sam")));
    }

    #[test]
    fn test_activity_log_records_mutations() {
        let conn = memory_db();
        let mut vehicle = Vehicle::new("Tesla", "Model 3", 2022, 35000.0, "");
        insert_vehicle(&conn, &vehicle, "jo").unwrap();
        vehicle.price = 33000.0;
        update_vehicle(&conn, &vehicle, "jo").unwrap();
        delete_vehicle(&conn, &vehicle.id, "jo").unwrap();

        let events = get_events_for_entity(&conn, "vehicle", &vehicle.id).unwrap();
        let mut kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        kinds.sort();
        assert_eq!(kinds, vec![ADD_VEHICLE, DELETE_VEHICLE, EDIT_VEHICLE]);

        let recent = get_activities_for_actor(&conn, "jo", 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert!(get_activities_for_actor(&conn, "nobody", 10).unwrap().is_empty());

        let added = events.iter().find(|e| e.event_type == ADD_VEHICLE).unwrap();
        assert_eq!(added.data["make"], "Tesla");
    }

    #[test]
    fn test_csv_import_skips_duplicates_and_invalid_rows() {
        let path = write_csv(
            "import",
            "make,model,year,price,description,owner\n\
             Toyota,Corolla,2018,14500,Clean title,\n\
             Ford,F-150,2021,38900,,lee\n\
             ,Nameless,2020,1000,,\n\
             Honda,Civic,1850,5000,,\n",
        );

        let vehicles = load_csv(&path).unwrap();
        assert_eq!(vehicles.len(), 2);
        assert_eq!(vehicles[0].owner, None);
        assert_eq!(vehicles[1].owner.as_deref(), Some("lee"));

        let conn = memory_db();
        let first = insert_vehicles(&conn, &vehicles, "importer").unwrap();
        assert_eq!(first, ImportSummary { inserted: 2, duplicates: 0 });

        // a second read of the same file yields fresh UUIDs but identical content
        let again = load_csv(&path).unwrap();
        let second = insert_vehicles(&conn, &again, "importer").unwrap();
        assert_eq!(second, ImportSummary { inserted: 0, duplicates: 2 });
        assert_eq!(verify_count(&conn).unwrap(), 2);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_import_id_collision_is_an_error() {
        let conn = memory_db();
        let first = Vehicle::new("Mazda", "3", 2020, 16000.0, "");
        insert_vehicles(&conn, &[first.clone()], "importer").unwrap();

        let mut clash = Vehicle::new("Mazda", "CX-5", 2022, 27000.0, "");
        clash.id = first.id.clone();

        assert!(insert_vehicles(&conn, &[clash], "importer").is_err());
        assert_eq!(verify_count(&conn).unwrap(), 1);
    }

    #[test]
    fn test_import_row_and_event_commit_together() {
        let conn = memory_db();
        conn.execute("DROP TABLE events", []).unwrap();

        let vehicle = Vehicle::new("Kia", "Rio", 2019, 8000.0, "");
        assert!(insert_vehicles(&conn, &[vehicle], "importer").is_err());
        assert_eq!(verify_count(&conn).unwrap(), 0);
    }

    #[test]
    fn test_load_csv_missing_file() {
        let err = load_csv(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(err.to_string().contains("Failed to open CSV file"));
    }
}
