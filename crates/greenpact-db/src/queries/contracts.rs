use anyhow::Result;
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use super::{OptionalExt, date_col, new_id, now, opt_uuid_col, terms_col, time_col, uuid_col};
use crate::Database;
use crate::models::{
    ContractChanges, ContractRow, NewContract, NewProgress, NewTransaction, ProgressRow, TransactionChanges,
    TransactionRow,
};

const CONTRACT_SELECT: &str = "
    SELECT k.id, k.farmer_id, fu.username, COALESCE(fp.name, fu.username), fp.qr_code_image,
           k.buyer_id, bu.username, COALESCE(bp.name, bu.username),
           k.crop_id, c.crop_name, k.nego_price, k.quantity, k.delivery_address, k.delivery_date,
           k.terms, k.status, k.document, k.created_at
    FROM contracts k
    JOIN users fu ON fu.id = k.farmer_id
    LEFT JOIN profiles fp ON fp.user_id = fu.id
    JOIN users bu ON bu.id = k.buyer_id
    LEFT JOIN profiles bp ON bp.user_id = bu.id
    JOIN crops c ON c.id = k.crop_id";

const TRANSACTION_SELECT: &str = "
    SELECT t.id, t.contract_id, k.buyer_id, bu.username, fu.username, t.receipt, t.description,
           t.date, t.amount, t.reference_number
    FROM transactions t
    JOIN contracts k ON k.id = t.contract_id
    JOIN users bu ON bu.id = k.buyer_id
    JOIN users fu ON fu.id = k.farmer_id";

const PROGRESS_SELECT: &str = "
    SELECT g.id, g.farmer_id, u.username, g.contract_id, c.crop_name, g.current_status, g.date,
           g.notes, g.image
    FROM farmer_progress g
    JOIN users u ON u.id = g.farmer_id
    LEFT JOIN contracts k ON k.id = g.contract_id
    LEFT JOIN crops c ON c.id = k.crop_id";

impl Database {
    // -- Contracts --

    pub fn create_contract(&self, contract: &NewContract) -> Result<ContractRow> {
        let terms = serde_json::to_string(&contract.terms)?;
        self.with_conn(|conn| {
            let id = new_id();
            conn.execute(
                "INSERT INTO contracts (id, farmer_id, buyer_id, crop_id, nego_price, quantity,
                                        delivery_address, delivery_date, terms, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id,
                    contract.farmer_id.to_string(),
                    contract.buyer_id.to_string(),
                    contract.crop_id.to_string(),
                    contract.nego_price,
                    contract.quantity,
                    contract.delivery_address,
                    contract.delivery_date.to_string(),
                    terms,
                    now(),
                ],
            )?;
            query_contract(conn, &id)?.ok_or_else(|| anyhow::anyhow!("contract {} missing after insert", id))
        })
    }

    pub fn get_contract(&self, id: Uuid) -> Result<Option<ContractRow>> {
        self.with_conn(|conn| query_contract(conn, &id.to_string()))
    }

    /// Contracts where the user is the farmer or the buyer, newest first.
    pub fn list_contracts_for(&self, user_id: Uuid) -> Result<Vec<ContractRow>> {
        self.with_conn(|conn| {
            let sql = format!("{CONTRACT_SELECT} WHERE k.farmer_id = ?1 OR k.buyer_id = ?1 ORDER BY k.created_at DESC");
            collect(conn, &sql, &user_id.to_string(), contract_from_row)
        })
    }

    pub fn list_contracts(&self) -> Result<Vec<ContractRow>> {
        self.with_conn(|conn| {
            let sql = format!("{CONTRACT_SELECT} WHERE ?1 = ?1 ORDER BY k.created_at DESC");
            collect(conn, &sql, "", contract_from_row)
        })
    }

    pub fn count_contracts_for(&self, user_id: Uuid) -> Result<i64> {
        self.with_conn(|conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM contracts WHERE farmer_id = ?1 OR buyer_id = ?1",
                [user_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(n)
        })
    }

    /// Usernames on the other side of the user's contracts.
    pub fn contract_counterparties(&self, user_id: Uuid) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT u.username FROM contracts k
                 JOIN users u ON u.id = CASE WHEN k.farmer_id = ?1 THEN k.buyer_id ELSE k.farmer_id END
                 WHERE k.farmer_id = ?1 OR k.buyer_id = ?1
                 ORDER BY u.username",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_contract(&self, id: Uuid, changes: &ContractChanges) -> Result<Option<ContractRow>> {
        let terms = changes.terms.as_ref().map(serde_json::to_string).transpose()?;
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE contracts SET
                    nego_price = COALESCE(?2, nego_price),
                    quantity = COALESCE(?3, quantity),
                    delivery_address = COALESCE(?4, delivery_address),
                    delivery_date = COALESCE(?5, delivery_date),
                    terms = COALESCE(?6, terms)
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    changes.nego_price,
                    changes.quantity,
                    changes.delivery_address,
                    changes.delivery_date.map(|d| d.to_string()),
                    terms,
                ],
            )?;
            if n == 0 {
                return Ok(None);
            }
            query_contract(conn, &id.to_string())
        })
    }

    /// Flips the approval flag. Returns true only for the call that flipped it.
    pub fn approve_contract(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE contracts SET status = 1 WHERE id = ?1 AND status = 0",
                [id.to_string()],
            )?;
            Ok(n > 0)
        })
    }

    pub fn attach_contract_document(&self, id: Uuid, path: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE contracts SET document = ?2 WHERE id = ?1", params![id.to_string(), path])?;
            Ok(())
        })
    }

    pub fn delete_contract(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM contracts WHERE id = ?1", [id.to_string()])? > 0))
    }

    // -- Transactions --

    pub fn create_transaction(&self, tx: &NewTransaction) -> Result<TransactionRow> {
        self.with_conn(|conn| {
            let id = new_id();
            conn.execute(
                "INSERT INTO transactions (id, contract_id, receipt, description, date, amount,
                                           reference_number, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    tx.contract_id.to_string(),
                    tx.receipt,
                    tx.description,
                    tx.date.to_string(),
                    tx.amount,
                    tx.reference_number,
                    now(),
                ],
            )?;
            query_transaction(conn, &id)?.ok_or_else(|| anyhow::anyhow!("transaction {} missing after insert", id))
        })
    }

    pub fn get_transaction(&self, id: Uuid) -> Result<Option<TransactionRow>> {
        self.with_conn(|conn| query_transaction(conn, &id.to_string()))
    }

    pub fn list_transactions_for_contract(&self, contract_id: Uuid) -> Result<Vec<TransactionRow>> {
        self.with_conn(|conn| {
            let sql = format!("{TRANSACTION_SELECT} WHERE t.contract_id = ?1 ORDER BY t.date, t.created_at");
            collect(conn, &sql, &contract_id.to_string(), transaction_from_row)
        })
    }

    /// Transactions on any contract the user is a party to.
    pub fn list_transactions_for_user(&self, user_id: Uuid) -> Result<Vec<TransactionRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{TRANSACTION_SELECT} WHERE k.farmer_id = ?1 OR k.buyer_id = ?1 ORDER BY t.date DESC, t.created_at DESC"
            );
            collect(conn, &sql, &user_id.to_string(), transaction_from_row)
        })
    }

    pub fn list_transactions(&self) -> Result<Vec<TransactionRow>> {
        self.with_conn(|conn| {
            let sql = format!("{TRANSACTION_SELECT} WHERE ?1 = ?1 ORDER BY t.date DESC, t.created_at DESC");
            collect(conn, &sql, "", transaction_from_row)
        })
    }

    pub fn update_transaction(&self, id: Uuid, changes: &TransactionChanges) -> Result<Option<TransactionRow>> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE transactions SET
                    receipt = COALESCE(?2, receipt),
                    description = COALESCE(?3, description),
                    date = COALESCE(?4, date),
                    amount = COALESCE(?5, amount),
                    reference_number = COALESCE(?6, reference_number)
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    changes.receipt,
                    changes.description,
                    changes.date.map(|d| d.to_string()),
                    changes.amount,
                    changes.reference_number,
                ],
            )?;
            if n == 0 {
                return Ok(None);
            }
            query_transaction(conn, &id.to_string())
        })
    }

    pub fn delete_transaction(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM transactions WHERE id = ?1", [id.to_string()])? > 0))
    }

    pub fn total_paid(&self, contract_id: Uuid) -> Result<i64> {
        self.with_conn(|conn| {
            let total = conn.query_row(
                "SELECT COALESCE(SUM(amount), 0) FROM transactions WHERE contract_id = ?1",
                [contract_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(total)
        })
    }

    // -- Farmer progress --

    pub fn create_progress(&self, progress: &NewProgress) -> Result<ProgressRow> {
        self.with_conn(|conn| {
            let id = new_id();
            conn.execute(
                "INSERT INTO farmer_progress (id, farmer_id, contract_id, current_status, date, notes, image, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    progress.farmer_id.to_string(),
                    progress.contract_id.map(|c| c.to_string()),
                    progress.current_status,
                    progress.date.to_string(),
                    progress.notes,
                    progress.image,
                    now(),
                ],
            )?;
            let sql = format!("{PROGRESS_SELECT} WHERE g.id = ?1");
            conn.query_row(&sql, [&id], progress_from_row)
                .optional()?
                .ok_or_else(|| anyhow::anyhow!("progress {} missing after insert", id))
        })
    }

    pub fn get_progress(&self, id: Uuid) -> Result<Option<ProgressRow>> {
        self.with_conn(|conn| {
            let sql = format!("{PROGRESS_SELECT} WHERE g.id = ?1");
            conn.query_row(&sql, [id.to_string()], progress_from_row).optional()
        })
    }

    /// The delivery log of one contract, in date order.
    pub fn list_progress_for_contract(&self, contract_id: Uuid) -> Result<Vec<ProgressRow>> {
        self.with_conn(|conn| {
            let sql = format!("{PROGRESS_SELECT} WHERE g.contract_id = ?1 ORDER BY g.date, g.created_at");
            collect(conn, &sql, &contract_id.to_string(), progress_from_row)
        })
    }

    pub fn list_progress(&self) -> Result<Vec<ProgressRow>> {
        self.with_conn(|conn| {
            let sql = format!("{PROGRESS_SELECT} WHERE ?1 = ?1 ORDER BY g.date DESC, g.created_at DESC");
            collect(conn, &sql, "", progress_from_row)
        })
    }

    pub fn delete_progress(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM farmer_progress WHERE id = ?1", [id.to_string()])? > 0))
    }
}

fn collect<T>(
    conn: &Connection,
    sql: &str,
    value: &str,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([value], map)?.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_contract(conn: &Connection, id: &str) -> Result<Option<ContractRow>> {
    let sql = format!("{CONTRACT_SELECT} WHERE k.id = ?1");
    conn.query_row(&sql, [id], contract_from_row).optional()
}

fn query_transaction(conn: &Connection, id: &str) -> Result<Option<TransactionRow>> {
    let sql = format!("{TRANSACTION_SELECT} WHERE t.id = ?1");
    conn.query_row(&sql, [id], transaction_from_row).optional()
}

fn contract_from_row(row: &Row<'_>) -> rusqlite::Result<ContractRow> {
    Ok(ContractRow {
        id: uuid_col(row, 0)?,
        farmer_id: uuid_col(row, 1)?,
        farmer_username: row.get(2)?,
        farmer_name: row.get(3)?,
        farmer_qr: row.get(4)?,
        buyer_id: uuid_col(row, 5)?,
        buyer_username: row.get(6)?,
        buyer_name: row.get(7)?,
        crop_id: uuid_col(row, 8)?,
        crop_name: row.get(9)?,
        nego_price: row.get(10)?,
        quantity: row.get(11)?,
        delivery_address: row.get(12)?,
        delivery_date: date_col(row, 13)?,
        terms: terms_col(row, 14)?,
        status: row.get(15)?,
        document: row.get(16)?,
        created_at: time_col(row, 17)?,
    })
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<TransactionRow> {
    Ok(TransactionRow {
        id: uuid_col(row, 0)?,
        contract_id: uuid_col(row, 1)?,
        buyer_id: uuid_col(row, 2)?,
        buyer_username: row.get(3)?,
        farmer_username: row.get(4)?,
        receipt: row.get(5)?,
        description: row.get(6)?,
        date: date_col(row, 7)?,
        amount: row.get(8)?,
        reference_number: row.get(9)?,
    })
}

fn progress_from_row(row: &Row<'_>) -> rusqlite::Result<ProgressRow> {
    Ok(ProgressRow {
        id: uuid_col(row, 0)?,
        farmer_id: uuid_col(row, 1)?,
        farmer_username: row.get(2)?,
        contract_id: opt_uuid_col(row, 3)?,
        crop_name: row.get(4)?,
        current_status: row.get(5)?,
        date: date_col(row, 6)?,
        notes: row.get(7)?,
        image: row.get(8)?,
    })
}
