use anyhow::Result;
use greenpact_types::models::Role;
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use super::{OptionalExt, USER_COLUMNS, new_id, now, user_at};
use crate::Database;
use crate::models::{NewAccount, NewProfile, ProfileChanges, ProfileRow, UserRow};

const PROFILE_COLUMNS: &str = "p.name, p.address, p.phone, p.image, p.screenshot, p.aadhar_image, \
     p.signature, p.qr_code_image, p.gstin, p.is_verified";

impl Database {
    // -- Accounts --

    /// Inserts the user and, for farmers and contractors, its profile in one
    /// transaction. Either both rows exist afterwards or neither does.
    pub fn create_account(&self, account: &NewAccount<'_>, profile: Option<NewProfile>) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id = new_id();
            tx.execute(
                "INSERT INTO users (id, username, email, password, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, account.username, account.email, account.password_hash, account.role.as_str(), now()],
            )?;

            if let Some(p) = profile {
                tx.execute(
                    "INSERT INTO profiles (user_id, name, address, phone, image, screenshot, aadhar_image,
                                           signature, qr_code_image, gstin)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        id,
                        p.name,
                        p.address,
                        p.phone,
                        p.image,
                        p.screenshot,
                        p.aadhar_image,
                        p.signature,
                        p.qr_code_image,
                        p.gstin,
                    ],
                )?;
            }

            let user = query_user(&tx, "u.id = ?1", &id)?
                .ok_or_else(|| anyhow::anyhow!("account {} vanished inside its own transaction", id))?;
            tx.commit()?;
            Ok(user)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "u.username = ?1", username))
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "u.id = ?1", &id.to_string()))
    }

    /// Looks up the account owning a profile phone number.
    pub fn get_user_by_phone(&self, phone: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users u JOIN profiles p ON p.user_id = u.id WHERE p.phone = ?1"
            );
            conn.query_row(&sql, [phone], |row| user_at(row, 0)).optional()
        })
    }

    pub fn username_taken(&self, username: &str) -> Result<bool> {
        self.exists("SELECT 1 FROM users WHERE username = ?1", username)
    }

    pub fn phone_taken(&self, phone: &str) -> Result<bool> {
        self.exists("SELECT 1 FROM profiles WHERE phone = ?1", phone)
    }

    pub fn gstin_taken(&self, gstin: &str) -> Result<bool> {
        self.exists("SELECT 1 FROM profiles WHERE gstin = ?1", gstin)
    }

    fn exists(&self, sql: &str, value: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.query_row(sql, [value], |_| Ok(())).optional()?.is_some()))
    }

    pub fn any_admin(&self) -> Result<bool> {
        self.exists("SELECT 1 FROM users WHERE role = ?1", Role::Admin.as_str())
    }

    /// Removes the account. Listings, contracts, chats and ratings cascade;
    /// complaints against the user keep their row with no accused.
    pub fn delete_user(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM users WHERE id = ?1", [id.to_string()])?;
            Ok(n > 0)
        })
    }

    // -- Profiles --

    pub fn get_profile(&self, user_id: Uuid) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS}, {PROFILE_COLUMNS}
                 FROM users u JOIN profiles p ON p.user_id = u.id
                 WHERE u.id = ?1"
            );
            conn.query_row(&sql, [user_id.to_string()], profile_from_row).optional()
        })
    }

    /// Applies self-service changes. The verification flag is not touched here.
    pub fn update_profile(&self, user_id: Uuid, changes: &ProfileChanges) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE profiles SET
                    name = COALESCE(?2, name),
                    address = COALESCE(?3, address),
                    gstin = COALESCE(?4, gstin),
                    image = COALESCE(?5, image),
                    screenshot = COALESCE(?6, screenshot),
                    aadhar_image = COALESCE(?7, aadhar_image),
                    signature = COALESCE(?8, signature),
                    qr_code_image = COALESCE(?9, qr_code_image)
                 WHERE user_id = ?1",
                params![
                    user_id.to_string(),
                    changes.name,
                    changes.address,
                    changes.gstin,
                    changes.image,
                    changes.screenshot,
                    changes.aadhar_image,
                    changes.signature,
                    changes.qr_code_image,
                ],
            )?;
            Ok(n > 0)
        })
    }

    pub fn set_verified(&self, user_id: Uuid, verified: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE profiles SET is_verified = ?2 WHERE user_id = ?1",
                params![user_id.to_string(), verified],
            )?;
            Ok(n > 0)
        })
    }

    /// Profiles with the given verification state, oldest account first.
    pub fn list_profiles(&self, verified: bool) -> Result<Vec<ProfileRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS}, {PROFILE_COLUMNS}
                 FROM users u JOIN profiles p ON p.user_id = u.id
                 WHERE p.is_verified = ?1
                 ORDER BY u.created_at"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([verified], profile_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, filter: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE {filter}");
    conn.query_row(&sql, [value], |row| user_at(row, 0)).optional()
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        user: user_at(row, 0)?,
        name: row.get(6)?,
        address: row.get(7)?,
        phone: row.get(8)?,
        image: row.get(9)?,
        screenshot: row.get(10)?,
        aadhar_image: row.get(11)?,
        signature: row.get(12)?,
        qr_code_image: row.get(13)?,
        gstin: row.get(14)?,
        is_verified: row.get(15)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures::{account, db};
    use crate::unique_violation_column;

    fn farmer_profile(phone: &str) -> NewProfile {
        NewProfile {
            name: "Ravi Kumar".into(),
            address: "Nashik".into(),
            phone: phone.into(),
            qr_code_image: Some("qr_codes/ravi.png".into()),
            ..Default::default()
        }
    }

    #[test]
    fn signup_creates_user_and_profile_together() {
        let db = db();
        let account = NewAccount { username: "ravi", email: None, password_hash: "h", role: Role::Farmer };
        let user = db.create_account(&account, Some(farmer_profile("9876543210"))).unwrap();

        let profile = db.get_profile(user.id).unwrap().unwrap();
        assert_eq!(profile.user.username, "ravi");
        assert_eq!(profile.user.role, Role::Farmer);
        assert!(!profile.is_verified);
        assert_eq!(db.get_user_by_phone("9876543210").unwrap().unwrap().id, user.id);
    }

    #[test]
    fn failed_profile_insert_leaves_no_user_behind() {
        let db = db();
        let first = NewAccount { username: "ravi", email: None, password_hash: "h", role: Role::Farmer };
        db.create_account(&first, Some(farmer_profile("9876543210"))).unwrap();

        let second = NewAccount { username: "asha", email: None, password_hash: "h", role: Role::Farmer };
        let err = db.create_account(&second, Some(farmer_profile("9876543210"))).unwrap_err();

        assert_eq!(unique_violation_column(&err).as_deref(), Some("phone"));
        assert!(db.get_user_by_username("asha").unwrap().is_none());
        assert!(!db.username_taken("asha").unwrap());
    }

    #[test]
    fn duplicate_username_is_a_unique_violation() {
        let db = db();
        account(&db, "ravi", Role::Farmer);
        let again = NewAccount { username: "ravi", email: None, password_hash: "h", role: Role::Contractor };
        let err = db.create_account(&again, None).unwrap_err();
        assert_eq!(unique_violation_column(&err).as_deref(), Some("username"));
    }

    #[test]
    fn profile_update_keeps_unset_fields_and_verification() {
        let db = db();
        let user = account(&db, "ravi", Role::Farmer);

        let changes = ProfileChanges { address: Some("Pune".into()), ..Default::default() };
        assert!(db.update_profile(user.id, &changes).unwrap());

        let profile = db.get_profile(user.id).unwrap().unwrap();
        assert_eq!(profile.address, "Pune");
        assert_eq!(profile.name, "ravi name");
        assert!(profile.is_verified);
    }

    #[test]
    fn verification_listing_splits_on_flag() {
        let db = db();
        account(&db, "ravi", Role::Farmer);
        let pending = db
            .create_account(
                &NewAccount { username: "asha", email: None, password_hash: "h", role: Role::Farmer },
                Some(farmer_profile("9000000001")),
            )
            .unwrap();

        let unverified = db.list_profiles(false).unwrap();
        assert_eq!(unverified.len(), 1);
        assert_eq!(unverified[0].user.id, pending.id);

        db.set_verified(pending.id, true).unwrap();
        assert!(db.list_profiles(false).unwrap().is_empty());
        assert_eq!(db.list_profiles(true).unwrap().len(), 2);
    }

    #[test]
    fn admins_have_no_profile() {
        let db = db();
        let admin = account(&db, "root", Role::Admin);
        assert!(db.any_admin().unwrap());
        assert!(db.get_profile(admin.id).unwrap().is_none());
        assert!(db.delete_user(admin.id).unwrap());
        assert!(!db.any_admin().unwrap());
    }
}
