use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            email       TEXT,
            password    TEXT NOT NULL,
            role        TEXT NOT NULL CHECK (role IN ('farmer', 'contractor', 'admin')),
            created_at  TEXT NOT NULL
        );

        -- One row per farmer/contractor. Phone numbers are unique across roles.
        CREATE TABLE IF NOT EXISTS profiles (
            user_id        TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            name           TEXT NOT NULL,
            address        TEXT NOT NULL,
            phone          TEXT NOT NULL UNIQUE,
            image          TEXT,
            screenshot     TEXT,
            aadhar_image   TEXT,
            signature      TEXT,
            qr_code_image  TEXT,
            gstin          TEXT UNIQUE,
            is_verified    INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS crops (
            id              TEXT PRIMARY KEY,
            owner_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            crop_name       TEXT NOT NULL,
            image           TEXT,
            price           INTEGER NOT NULL,
            quantity        INTEGER NOT NULL,
            description     TEXT NOT NULL,
            harvested_time  TEXT NOT NULL,
            location        TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_crops_owner ON crops(owner_id);

        CREATE TABLE IF NOT EXISTS demands (
            id              TEXT PRIMARY KEY,
            owner_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            crop_name       TEXT NOT NULL,
            price           INTEGER NOT NULL,
            contact_no      TEXT NOT NULL,
            quantity        INTEGER NOT NULL,
            description     TEXT NOT NULL,
            location        TEXT NOT NULL,
            harvested_time  TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_demands_owner ON demands(owner_id);

        CREATE TABLE IF NOT EXISTS contracts (
            id                TEXT PRIMARY KEY,
            farmer_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            buyer_id          TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            crop_id           TEXT NOT NULL REFERENCES crops(id) ON DELETE CASCADE,
            nego_price        INTEGER NOT NULL,
            quantity          INTEGER NOT NULL,
            delivery_address  TEXT NOT NULL,
            delivery_date     TEXT NOT NULL,
            terms             TEXT NOT NULL DEFAULT '[]',
            status            INTEGER NOT NULL DEFAULT 0,
            document          TEXT,
            created_at        TEXT NOT NULL,
            CHECK (farmer_id <> buyer_id)
        );

        CREATE INDEX IF NOT EXISTS idx_contracts_farmer ON contracts(farmer_id);
        CREATE INDEX IF NOT EXISTS idx_contracts_buyer ON contracts(buyer_id);

        CREATE TABLE IF NOT EXISTS transactions (
            id                TEXT PRIMARY KEY,
            contract_id       TEXT NOT NULL REFERENCES contracts(id) ON DELETE CASCADE,
            receipt           TEXT NOT NULL,
            description       TEXT NOT NULL DEFAULT '',
            date              TEXT NOT NULL,
            amount            INTEGER NOT NULL,
            reference_number  TEXT NOT NULL,
            created_at        TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_transactions_contract ON transactions(contract_id);

        CREATE TABLE IF NOT EXISTS farmer_progress (
            id              TEXT PRIMARY KEY,
            farmer_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            contract_id     TEXT REFERENCES contracts(id) ON DELETE CASCADE,
            current_status  TEXT NOT NULL,
            date            TEXT NOT NULL,
            notes           TEXT NOT NULL DEFAULT '',
            image           TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_progress_contract ON farmer_progress(contract_id, date);

        CREATE TABLE IF NOT EXISTS chat_rooms (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS room_participants (
            room_id  TEXT NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
            user_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            PRIMARY KEY (room_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_user ON room_participants(user_id);

        CREATE TABLE IF NOT EXISTS chat_messages (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            room_id     TEXT NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
            sender_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room ON chat_messages(room_id, seq);

        CREATE TABLE IF NOT EXISTS notifications (
            seq           INTEGER PRIMARY KEY AUTOINCREMENT,
            recipient_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            sender_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            room_id       TEXT NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
            message       TEXT NOT NULL,
            is_read       INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_recipient
            ON notifications(recipient_id, is_read, room_id);

        CREATE TABLE IF NOT EXISTS ratings (
            id           TEXT PRIMARY KEY,
            rated_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            rater_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            description  TEXT NOT NULL DEFAULT '',
            rate         INTEGER NOT NULL CHECK (rate BETWEEN 1 AND 5),
            created_at   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_ratings_rated ON ratings(rated_id);

        CREATE TABLE IF NOT EXISTS rating_images (
            id         TEXT PRIMARY KEY,
            rating_id  TEXT NOT NULL REFERENCES ratings(id) ON DELETE CASCADE,
            image      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS complaints (
            id              TEXT PRIMARY KEY,
            complainant_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            accused_id      TEXT REFERENCES users(id) ON DELETE SET NULL,
            category        TEXT NOT NULL DEFAULT 'fraud',
            description     TEXT NOT NULL,
            proof           TEXT,
            priority        TEXT NOT NULL DEFAULT 'Low',
            status          TEXT NOT NULL DEFAULT 'pending',
            admin_notes     TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            CHECK (accused_id IS NULL OR accused_id <> complainant_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
