use anyhow::Result;
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use super::{OptionalExt, new_id, now, opt_uuid_col, time_col, uuid_col};
use crate::Database;
use crate::models::{ComplaintChanges, ComplaintRow, NewComplaint};

const COMPLAINT_SELECT: &str = "
    SELECT c.id, c.complainant_id, cu.username, c.accused_id, au.username, c.category, c.description,
           c.proof, c.priority, c.status, c.admin_notes, c.created_at, c.updated_at
    FROM complaints c
    JOIN users cu ON cu.id = c.complainant_id
    LEFT JOIN users au ON au.id = c.accused_id";

impl Database {
    pub fn create_complaint(&self, complaint: &NewComplaint) -> Result<ComplaintRow> {
        self.with_conn(|conn| {
            let id = new_id();
            let ts = now();
            conn.execute(
                "INSERT INTO complaints (id, complainant_id, accused_id, category, description, proof,
                                         priority, created_at, updated_at)
                 VALUES (?1, ?2, ?3, COALESCE(?4, 'fraud'), ?5, ?6, COALESCE(?7, 'Low'), ?8, ?8)",
                params![
                    id,
                    complaint.complainant_id.to_string(),
                    complaint.accused_id.map(|u| u.to_string()),
                    complaint.category,
                    complaint.description,
                    complaint.proof,
                    complaint.priority,
                    ts,
                ],
            )?;
            query_complaint(conn, &id)?.ok_or_else(|| anyhow::anyhow!("complaint {} missing after insert", id))
        })
    }

    pub fn get_complaint(&self, id: Uuid) -> Result<Option<ComplaintRow>> {
        self.with_conn(|conn| query_complaint(conn, &id.to_string()))
    }

    /// Newest first. `viewer` limits the list to complaints the user filed or
    /// is accused in; `None` lists everything.
    pub fn list_complaints(&self, viewer: Option<Uuid>) -> Result<Vec<ComplaintRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{COMPLAINT_SELECT}
                 WHERE ?1 IS NULL OR c.complainant_id = ?1 OR c.accused_id = ?1
                 ORDER BY c.created_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([viewer.map(|u| u.to_string())], complaint_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_complaint(&self, id: Uuid, changes: &ComplaintChanges) -> Result<Option<ComplaintRow>> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE complaints SET
                    accused_id = COALESCE(?2, accused_id),
                    category = COALESCE(?3, category),
                    description = COALESCE(?4, description),
                    proof = COALESCE(?5, proof),
                    priority = COALESCE(?6, priority),
                    status = COALESCE(?7, status),
                    admin_notes = COALESCE(?8, admin_notes),
                    updated_at = ?9
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    changes.accused_id.map(|u| u.to_string()),
                    changes.category,
                    changes.description,
                    changes.proof,
                    changes.priority,
                    changes.status,
                    changes.admin_notes,
                    now(),
                ],
            )?;
            if n == 0 {
                return Ok(None);
            }
            query_complaint(conn, &id.to_string())
        })
    }

    pub fn delete_complaint(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM complaints WHERE id = ?1", [id.to_string()])? > 0))
    }
}

fn query_complaint(conn: &Connection, id: &str) -> Result<Option<ComplaintRow>> {
    let sql = format!("{COMPLAINT_SELECT} WHERE c.id = ?1");
    conn.query_row(&sql, [id], complaint_from_row).optional()
}

fn complaint_from_row(row: &Row<'_>) -> rusqlite::Result<ComplaintRow> {
    Ok(ComplaintRow {
        id: uuid_col(row, 0)?,
        complainant_id: uuid_col(row, 1)?,
        complainant_username: row.get(2)?,
        accused_id: opt_uuid_col(row, 3)?,
        accused_username: row.get(4)?,
        category: row.get(5)?,
        description: row.get(6)?,
        proof: row.get(7)?,
        priority: row.get(8)?,
        status: row.get(9)?,
        admin_notes: row.get(10)?,
        created_at: time_col(row, 11)?,
        updated_at: time_col(row, 12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures::{account, db};
    use greenpact_types::models::Role;

    fn complaint(complainant_id: Uuid, accused_id: Option<Uuid>) -> NewComplaint {
        NewComplaint {
            complainant_id,
            accused_id,
            category: None,
            description: "Payment never arrived".into(),
            proof: None,
            priority: None,
        }
    }

    #[test]
    fn defaults_fill_category_priority_and_status() {
        let db = db();
        let farmer = account(&db, "ravi", Role::Farmer);
        let buyer = account(&db, "kiran", Role::Contractor);
        let row = db.create_complaint(&complaint(farmer.id, Some(buyer.id))).unwrap();

        assert_eq!(row.category, "fraud");
        assert_eq!(row.priority, "Low");
        assert_eq!(row.status, "pending");
        assert_eq!(row.accused_username.as_deref(), Some("kiran"));
        assert!(row.involves(buyer.id));
    }

    #[test]
    fn listing_is_scoped_to_involved_users() {
        let db = db();
        let farmer = account(&db, "ravi", Role::Farmer);
        let buyer = account(&db, "kiran", Role::Contractor);
        let outsider = account(&db, "asha", Role::Farmer);
        db.create_complaint(&complaint(farmer.id, Some(buyer.id))).unwrap();
        db.create_complaint(&complaint(outsider.id, None)).unwrap();

        assert_eq!(db.list_complaints(Some(farmer.id)).unwrap().len(), 1);
        assert_eq!(db.list_complaints(Some(buyer.id)).unwrap().len(), 1);
        assert_eq!(db.list_complaints(Some(outsider.id)).unwrap().len(), 1);
        assert_eq!(db.list_complaints(None).unwrap().len(), 2);
    }

    #[test]
    fn self_complaint_violates_the_store_check() {
        let db = db();
        let farmer = account(&db, "ravi", Role::Farmer);
        assert!(db.create_complaint(&complaint(farmer.id, Some(farmer.id))).is_err());
    }

    #[test]
    fn removing_the_accused_keeps_the_complaint() {
        let db = db();
        let farmer = account(&db, "ravi", Role::Farmer);
        let buyer = account(&db, "kiran", Role::Contractor);
        let row = db.create_complaint(&complaint(farmer.id, Some(buyer.id))).unwrap();

        db.delete_user(buyer.id).unwrap();
        let kept = db.get_complaint(row.id).unwrap().unwrap();
        assert!(kept.accused_id.is_none());
        assert!(kept.accused_username.is_none());

        let changes = ComplaintChanges { status: Some("resolved".into()), ..Default::default() };
        assert_eq!(db.update_complaint(row.id, &changes).unwrap().unwrap().status, "resolved");
        assert!(db.delete_complaint(row.id).unwrap());
    }
}
