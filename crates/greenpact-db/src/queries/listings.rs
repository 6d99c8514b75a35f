use anyhow::Result;
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use super::{OptionalExt, SNAPSHOT_COLUMNS, USER_COLUMNS, date_col, new_id, now, snapshot_at, time_col, user_at, uuid_col};
use crate::Database;
use crate::models::{CropChanges, CropRow, DemandChanges, DemandRow, NewCrop, NewDemand};

impl Database {
    // -- Crops --

    pub fn create_crop(&self, owner_id: Uuid, crop: &NewCrop) -> Result<CropRow> {
        self.with_conn(|conn| {
            let id = new_id();
            let ts = now();
            conn.execute(
                "INSERT INTO crops (id, owner_id, crop_name, image, price, quantity, description,
                                    harvested_time, location, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                params![
                    id,
                    owner_id.to_string(),
                    crop.crop_name,
                    crop.image,
                    crop.price,
                    crop.quantity,
                    crop.description,
                    crop.harvested_time.to_string(),
                    crop.location,
                    ts,
                ],
            )?;
            query_crops(conn, "c.id = ?1", &id)?
                .pop()
                .ok_or_else(|| anyhow::anyhow!("crop {} missing after insert", id))
        })
    }

    pub fn get_crop(&self, id: Uuid) -> Result<Option<CropRow>> {
        self.with_conn(|conn| Ok(query_crops(conn, "c.id = ?1", &id.to_string())?.pop()))
    }

    pub fn list_crops(&self) -> Result<Vec<CropRow>> {
        self.with_conn(|conn| query_crops(conn, "?1 = ?1", ""))
    }

    pub fn list_crops_by_owner(&self, username: &str) -> Result<Vec<CropRow>> {
        self.with_conn(|conn| query_crops(conn, "u.username = ?1", username))
    }

    pub fn update_crop(&self, id: Uuid, changes: &CropChanges) -> Result<Option<CropRow>> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE crops SET
                    crop_name = COALESCE(?2, crop_name),
                    image = COALESCE(?3, image),
                    price = COALESCE(?4, price),
                    quantity = COALESCE(?5, quantity),
                    description = COALESCE(?6, description),
                    harvested_time = COALESCE(?7, harvested_time),
                    location = COALESCE(?8, location),
                    updated_at = ?9
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    changes.crop_name,
                    changes.image,
                    changes.price,
                    changes.quantity,
                    changes.description,
                    changes.harvested_time.map(|d| d.to_string()),
                    changes.location,
                    now(),
                ],
            )?;
            if n == 0 {
                return Ok(None);
            }
            Ok(query_crops(conn, "c.id = ?1", &id.to_string())?.pop())
        })
    }

    pub fn delete_crop(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM crops WHERE id = ?1", [id.to_string()])? > 0))
    }

    // -- Demands --

    pub fn create_demand(&self, owner_id: Uuid, demand: &NewDemand) -> Result<DemandRow> {
        self.with_conn(|conn| {
            let id = new_id();
            let ts = now();
            conn.execute(
                "INSERT INTO demands (id, owner_id, crop_name, price, contact_no, quantity, description,
                                      location, harvested_time, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                params![
                    id,
                    owner_id.to_string(),
                    demand.crop_name,
                    demand.price,
                    demand.contact_no,
                    demand.quantity,
                    demand.description,
                    demand.location,
                    demand.harvested_time.to_string(),
                    ts,
                ],
            )?;
            query_demands(conn, "d.id = ?1", &id)?
                .pop()
                .ok_or_else(|| anyhow::anyhow!("demand {} missing after insert", id))
        })
    }

    pub fn get_demand(&self, id: Uuid) -> Result<Option<DemandRow>> {
        self.with_conn(|conn| Ok(query_demands(conn, "d.id = ?1", &id.to_string())?.pop()))
    }

    pub fn list_demands(&self) -> Result<Vec<DemandRow>> {
        self.with_conn(|conn| query_demands(conn, "?1 = ?1", ""))
    }

    pub fn list_demands_by_owner(&self, username: &str) -> Result<Vec<DemandRow>> {
        self.with_conn(|conn| query_demands(conn, "u.username = ?1", username))
    }

    pub fn update_demand(&self, id: Uuid, changes: &DemandChanges) -> Result<Option<DemandRow>> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE demands SET
                    crop_name = COALESCE(?2, crop_name),
                    price = COALESCE(?3, price),
                    contact_no = COALESCE(?4, contact_no),
                    quantity = COALESCE(?5, quantity),
                    description = COALESCE(?6, description),
                    location = COALESCE(?7, location),
                    harvested_time = COALESCE(?8, harvested_time),
                    updated_at = ?9
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    changes.crop_name,
                    changes.price,
                    changes.contact_no,
                    changes.quantity,
                    changes.description,
                    changes.location,
                    changes.harvested_time.map(|d| d.to_string()),
                    now(),
                ],
            )?;
            if n == 0 {
                return Ok(None);
            }
            Ok(query_demands(conn, "d.id = ?1", &id.to_string())?.pop())
        })
    }

    pub fn delete_demand(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM demands WHERE id = ?1", [id.to_string()])? > 0))
    }

    /// Owner id of a crop, without the joins.
    pub fn crop_owner(&self, id: Uuid) -> Result<Option<Uuid>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT owner_id FROM crops WHERE id = ?1", [id.to_string()], |row| uuid_col(row, 0))
                .optional()
        })
    }
}

// JOIN users and LEFT JOIN profiles so each listing carries its publisher in one query
fn query_crops(conn: &Connection, filter: &str, value: &str) -> Result<Vec<CropRow>> {
    let sql = format!(
        "SELECT c.id, c.crop_name, c.image, c.price, c.quantity, c.description, c.harvested_time,
                c.location, c.created_at, c.updated_at, {USER_COLUMNS}, {SNAPSHOT_COLUMNS}
         FROM crops c
         JOIN users u ON u.id = c.owner_id
         LEFT JOIN profiles p ON p.user_id = u.id
         WHERE {filter}
         ORDER BY c.created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([value], crop_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn crop_from_row(row: &Row<'_>) -> rusqlite::Result<CropRow> {
    Ok(CropRow {
        id: uuid_col(row, 0)?,
        crop_name: row.get(1)?,
        image: row.get(2)?,
        price: row.get(3)?,
        quantity: row.get(4)?,
        description: row.get(5)?,
        harvested_time: date_col(row, 6)?,
        location: row.get(7)?,
        created_at: time_col(row, 8)?,
        updated_at: time_col(row, 9)?,
        owner: user_at(row, 10)?,
        owner_profile: snapshot_at(row, 16)?,
    })
}

fn query_demands(conn: &Connection, filter: &str, value: &str) -> Result<Vec<DemandRow>> {
    let sql = format!(
        "SELECT d.id, d.crop_name, d.price, d.contact_no, d.quantity, d.description, d.location,
                d.harvested_time, d.created_at, d.updated_at, {USER_COLUMNS}, {SNAPSHOT_COLUMNS}
         FROM demands d
         JOIN users u ON u.id = d.owner_id
         LEFT JOIN profiles p ON p.user_id = u.id
         WHERE {filter}
         ORDER BY d.created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([value], |row| {
            Ok(DemandRow {
                id: uuid_col(row, 0)?,
                crop_name: row.get(1)?,
                price: row.get(2)?,
                contact_no: row.get(3)?,
                quantity: row.get(4)?,
                description: row.get(5)?,
                location: row.get(6)?,
                harvested_time: date_col(row, 7)?,
                created_at: time_col(row, 8)?,
                updated_at: time_col(row, 9)?,
                owner: user_at(row, 10)?,
                owner_profile: snapshot_at(row, 16)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
