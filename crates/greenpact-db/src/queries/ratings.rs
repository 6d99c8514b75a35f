use anyhow::Result;
use rusqlite::{Connection, params};
use uuid::Uuid;

use super::{OptionalExt, new_id, now, time_col, uuid_col};
use crate::Database;
use crate::models::{RatingImageRow, RatingRow};

const RATING_SELECT: &str = "
    SELECT g.id, g.rated_id, ru.username, g.rater_id, au.username, g.rate, g.description, g.created_at
    FROM ratings g
    JOIN users ru ON ru.id = g.rated_id
    JOIN users au ON au.id = g.rater_id";

impl Database {
    pub fn create_rating(
        &self,
        rated_id: Uuid,
        rater_id: Uuid,
        rate: i64,
        description: &str,
        images: &[String],
    ) -> Result<RatingRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id = new_id();
            tx.execute(
                "INSERT INTO ratings (id, rated_id, rater_id, description, rate, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, rated_id.to_string(), rater_id.to_string(), description, rate, now()],
            )?;
            insert_images(&tx, &id, images)?;
            let rating = query_rating(&tx, &id)?.ok_or_else(|| anyhow::anyhow!("rating {} missing after insert", id))?;
            tx.commit()?;
            Ok(rating)
        })
    }

    pub fn get_rating(&self, id: Uuid) -> Result<Option<RatingRow>> {
        self.with_conn(|conn| query_rating(conn, &id.to_string()))
    }

    /// Ratings the user received, newest first.
    pub fn list_ratings_for(&self, username: &str) -> Result<Vec<RatingRow>> {
        self.with_conn(|conn| {
            let sql = format!("{RATING_SELECT} WHERE ru.username = ?1 ORDER BY g.created_at DESC");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map([username], rating_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            for rating in &mut rows {
                rating.images = query_images(conn, &rating.id.to_string())?;
            }
            Ok(rows)
        })
    }

    /// Updates score and text; `images` are appended to the existing ones.
    pub fn update_rating(
        &self,
        id: Uuid,
        rate: Option<i64>,
        description: Option<&str>,
        images: &[String],
    ) -> Result<Option<RatingRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let n = tx.execute(
                "UPDATE ratings SET rate = COALESCE(?2, rate), description = COALESCE(?3, description)
                 WHERE id = ?1",
                params![id.to_string(), rate, description],
            )?;
            if n == 0 {
                return Ok(None);
            }
            insert_images(&tx, &id.to_string(), images)?;
            let rating = query_rating(&tx, &id.to_string())?;
            tx.commit()?;
            Ok(rating)
        })
    }

    pub fn delete_rating(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM ratings WHERE id = ?1", [id.to_string()])? > 0))
    }

    pub fn get_rating_image(&self, id: Uuid) -> Result<Option<RatingImageRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, rating_id, image FROM rating_images WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok(RatingImageRow {
                        id: uuid_col(row, 0)?,
                        rating_id: uuid_col(row, 1)?,
                        image: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn delete_rating_image(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM rating_images WHERE id = ?1", [id.to_string()])? > 0))
    }
}

fn insert_images(conn: &Connection, rating_id: &str, images: &[String]) -> Result<()> {
    for image in images {
        conn.execute(
            "INSERT INTO rating_images (id, rating_id, image) VALUES (?1, ?2, ?3)",
            params![new_id(), rating_id, image],
        )?;
    }
    Ok(())
}

fn query_rating(conn: &Connection, id: &str) -> Result<Option<RatingRow>> {
    let sql = format!("{RATING_SELECT} WHERE g.id = ?1");
    let Some(mut rating) = conn.query_row(&sql, [id], rating_from_row).optional()? else {
        return Ok(None);
    };
    rating.images = query_images(conn, id)?;
    Ok(Some(rating))
}

fn query_images(conn: &Connection, rating_id: &str) -> Result<Vec<RatingImageRow>> {
    let mut stmt = conn.prepare("SELECT id, rating_id, image FROM rating_images WHERE rating_id = ?1 ORDER BY rowid")?;
    let rows = stmt
        .query_map([rating_id], |row| {
            Ok(RatingImageRow {
                id: uuid_col(row, 0)?,
                rating_id: uuid_col(row, 1)?,
                image: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn rating_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RatingRow> {
    Ok(RatingRow {
        id: uuid_col(row, 0)?,
        rated_id: uuid_col(row, 1)?,
        rated_username: row.get(2)?,
        rater_id: uuid_col(row, 3)?,
        rater_username: row.get(4)?,
        rate: row.get(5)?,
        description: row.get(6)?,
        images: Vec::new(),
        created_at: time_col(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures::{account, db};
    use greenpact_types::models::Role;

    #[test]
    fn rating_images_are_appended_on_update() {
        let db = db();
        let farmer = account(&db, "ravi", Role::Farmer);
        let buyer = account(&db, "kiran", Role::Contractor);

        let rating = db
            .create_rating(farmer.id, buyer.id, 4, "On time", &["rating/image/a.jpg".to_string()])
            .unwrap();
        assert_eq!(rating.rated_username, "ravi");
        assert_eq!(rating.rater_username, "kiran");
        assert_eq!(rating.images.len(), 1);

        let updated = db
            .update_rating(rating.id, Some(5), None, &["rating/image/b.jpg".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(updated.rate, 5);
        assert_eq!(updated.description, "On time");
        assert_eq!(updated.images.len(), 2);

        let first = updated.images[0].id;
        assert_eq!(db.get_rating_image(first).unwrap().unwrap().rating_id, rating.id);
        assert!(db.delete_rating_image(first).unwrap());
        assert_eq!(db.list_ratings_for("ravi").unwrap()[0].images.len(), 1);
    }

    #[test]
    fn score_outside_range_is_refused() {
        let db = db();
        let farmer = account(&db, "ravi", Role::Farmer);
        let buyer = account(&db, "kiran", Role::Contractor);
        assert!(db.create_rating(farmer.id, buyer.id, 6, "", &[]).is_err());
        assert!(db.list_ratings_for("ravi").unwrap().is_empty());
    }

    #[test]
    fn deleting_a_rating_drops_its_images() {
        let db = db();
        let farmer = account(&db, "ravi", Role::Farmer);
        let buyer = account(&db, "kiran", Role::Contractor);
        let rating = db
            .create_rating(farmer.id, buyer.id, 3, "", &["rating/image/a.jpg".to_string()])
            .unwrap();
        let image = rating.images[0].id;

        assert!(db.delete_rating(rating.id).unwrap());
        assert!(db.get_rating(rating.id).unwrap().is_none());
        assert!(db.get_rating_image(image).unwrap().is_none());
    }
}
