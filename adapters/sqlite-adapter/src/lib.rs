//! sqlite-adapter — SQLite implementation of every repository port.
//!
//! Purpose
//! - Provide a file-based store so the service runs without external
//!   infrastructure.
//! - Implements the user, credential, product, campaign, link and click
//!   repositories from the `domain` crate; `domain::Store` comes for free.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - Timestamps are stored as milliseconds since the UNIX epoch, prices as
//!   decimal text, ids as hyphenated UUID text.
//! - Multi-table deletes run inside a single transaction.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use domain::{
    Campaign, CampaignQuery, CampaignRepository, Click, ClickRepository, CoreError,
    CredentialInput, CredentialRepository, Email, Link, LinkRepository, Marketplace,
    MarketplaceCredential, MetricItem, NewUser, Offer, Product, ProductRepository, Resource,
    ShortCode, User, UserId, UserRepository,
};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

/// SQLite-backed store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        if let Some(dir) = path.as_ref().parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(map_sqerr)?;
            }
        }
        let conn = Connection::open(path.as_ref()).map_err(map_sqerr)?;
        init_schema(&conn)?;
        debug!(path = %path.as_ref().display(), "sqlite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        self.conn
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))
    }
}

fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS marketplace_credentials (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            marketplace TEXT NOT NULL,
            app_key TEXT NOT NULL DEFAULT '',
            app_secret TEXT NOT NULL DEFAULT '',
            app_id TEXT NOT NULL DEFAULT '',
            user_token TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE (user_id, marketplace)
        );
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            image_url TEXT NOT NULL,
            source_url TEXT NOT NULL,
            user_id INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_products_user ON products(user_id);
        CREATE TABLE IF NOT EXISTS offers (
            id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL REFERENCES products(id),
            marketplace TEXT NOT NULL,
            store_name TEXT NOT NULL,
            price TEXT NOT NULL,
            last_checked_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_offers_product ON offers(product_id);
        CREATE TABLE IF NOT EXISTS campaigns (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            utm_campaign TEXT NOT NULL,
            start_at INTEGER NOT NULL,
            end_at INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_campaigns_user ON campaigns(user_id);
        CREATE TABLE IF NOT EXISTS links (
            id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL REFERENCES products(id),
            campaign_id TEXT NOT NULL REFERENCES campaigns(id),
            short_code TEXT NOT NULL UNIQUE,
            target_url TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_links_campaign ON links(campaign_id);
        CREATE INDEX IF NOT EXISTS idx_links_product ON links(product_id);
        CREATE TABLE IF NOT EXISTS clicks (
            id TEXT PRIMARY KEY,
            link_id TEXT NOT NULL REFERENCES links(id),
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_clicks_link ON clicks(link_id);
        CREATE INDEX IF NOT EXISTS idx_clicks_created_at ON clicks(created_at);
        "#,
    )
    .map_err(map_sqerr)
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> CoreError {
    CoreError::Repository(format!("sqlite error: {e}"))
}

fn is_constraint(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation)
}

fn is_foreign_key(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _)
        if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY)
}

fn to_ms(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

fn from_ms(ms: i64) -> Result<DateTime<Utc>, CoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| CoreError::Repository(format!("bad timestamp in db: {ms}")))
}

fn parse_uuid(s: &str) -> Result<Uuid, CoreError> {
    Uuid::parse_str(s).map_err(|e| CoreError::Repository(format!("bad uuid in db: {e}")))
}

fn parse_marketplace(s: &str) -> Result<Marketplace, CoreError> {
    Marketplace::parse(s).ok_or_else(|| CoreError::Repository(format!("bad marketplace in db: {s}")))
}

fn ymd(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

const USER_COLS: &str = "id, email, password_hash, created_at, updated_at";

fn row_to_user(row: &rusqlite::Row) -> Result<User, CoreError> {
    Ok(User {
        id: row.get(0).map_err(map_sqerr)?,
        email: row.get(1).map_err(map_sqerr)?,
        password_hash: row.get(2).map_err(map_sqerr)?,
        created_at: from_ms(row.get(3).map_err(map_sqerr)?)?,
        updated_at: from_ms(row.get(4).map_err(map_sqerr)?)?,
    })
}

const CREDENTIAL_COLS: &str =
    "id, user_id, marketplace, app_key, app_secret, app_id, user_token, created_at, updated_at";

fn row_to_credential(row: &rusqlite::Row) -> Result<MarketplaceCredential, CoreError> {
    let marketplace: String = row.get(2).map_err(map_sqerr)?;
    Ok(MarketplaceCredential {
        id: row.get(0).map_err(map_sqerr)?,
        user_id: row.get(1).map_err(map_sqerr)?,
        marketplace: parse_marketplace(&marketplace)?,
        app_key: row.get(3).map_err(map_sqerr)?,
        app_secret: row.get(4).map_err(map_sqerr)?,
        app_id: row.get(5).map_err(map_sqerr)?,
        user_token: row.get(6).map_err(map_sqerr)?,
        created_at: from_ms(row.get(7).map_err(map_sqerr)?)?,
        updated_at: from_ms(row.get(8).map_err(map_sqerr)?)?,
    })
}

const PRODUCT_COLS: &str = "id, title, image_url, source_url, user_id, created_at, updated_at";

fn row_to_product(row: &rusqlite::Row) -> Result<Product, CoreError> {
    let id: String = row.get(0).map_err(map_sqerr)?;
    Ok(Product {
        id: parse_uuid(&id)?,
        title: row.get(1).map_err(map_sqerr)?,
        image_url: row.get(2).map_err(map_sqerr)?,
        source_url: row.get(3).map_err(map_sqerr)?,
        user_id: row.get(4).map_err(map_sqerr)?,
        created_at: from_ms(row.get(5).map_err(map_sqerr)?)?,
        updated_at: from_ms(row.get(6).map_err(map_sqerr)?)?,
    })
}

const OFFER_COLS: &str =
    "id, product_id, marketplace, store_name, price, last_checked_at, created_at";

fn row_to_offer(row: &rusqlite::Row) -> Result<Offer, CoreError> {
    let id: String = row.get(0).map_err(map_sqerr)?;
    let product_id: String = row.get(1).map_err(map_sqerr)?;
    let marketplace: String = row.get(2).map_err(map_sqerr)?;
    let price: String = row.get(4).map_err(map_sqerr)?;
    Ok(Offer {
        id: parse_uuid(&id)?,
        product_id: parse_uuid(&product_id)?,
        marketplace: parse_marketplace(&marketplace)?,
        store_name: row.get(3).map_err(map_sqerr)?,
        price: Decimal::from_str(&price)
            .map_err(|e| CoreError::Repository(format!("bad price in db: {e}")))?,
        last_checked_at: from_ms(row.get(5).map_err(map_sqerr)?)?,
        created_at: from_ms(row.get(6).map_err(map_sqerr)?)?,
    })
}

const CAMPAIGN_COLS: &str =
    "id, name, utm_campaign, start_at, end_at, user_id, created_at, updated_at";

fn row_to_campaign(row: &rusqlite::Row) -> Result<Campaign, CoreError> {
    let id: String = row.get(0).map_err(map_sqerr)?;
    Ok(Campaign {
        id: parse_uuid(&id)?,
        name: row.get(1).map_err(map_sqerr)?,
        utm_campaign: row.get(2).map_err(map_sqerr)?,
        start_at: from_ms(row.get(3).map_err(map_sqerr)?)?,
        end_at: from_ms(row.get(4).map_err(map_sqerr)?)?,
        user_id: row.get(5).map_err(map_sqerr)?,
        created_at: from_ms(row.get(6).map_err(map_sqerr)?)?,
        updated_at: from_ms(row.get(7).map_err(map_sqerr)?)?,
    })
}

const LINK_COLS: &str = "id, product_id, campaign_id, short_code, target_url, created_at, updated_at";

fn row_to_link(row: &rusqlite::Row) -> Result<Link, CoreError> {
    let id: String = row.get(0).map_err(map_sqerr)?;
    let product_id: String = row.get(1).map_err(map_sqerr)?;
    let campaign_id: String = row.get(2).map_err(map_sqerr)?;
    Ok(Link {
        id: parse_uuid(&id)?,
        product_id: parse_uuid(&product_id)?,
        campaign_id: parse_uuid(&campaign_id)?,
        short_code: row.get(3).map_err(map_sqerr)?,
        target_url: row.get(4).map_err(map_sqerr)?,
        created_at: from_ms(row.get(5).map_err(map_sqerr)?)?,
        updated_at: from_ms(row.get(6).map_err(map_sqerr)?)?,
    })
}

/// Run `sql` with `params` and collect every row through `map`.
fn query_all<T, P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: fn(&rusqlite::Row) -> Result<T, CoreError>,
) -> Result<Vec<T>, CoreError> {
    let mut stmt = conn.prepare(sql).map_err(map_sqerr)?;
    let mut rows = stmt.query(params).map_err(map_sqerr)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(map_sqerr)? {
        out.push(map(row)?);
    }
    Ok(out)
}

fn query_one<T, P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: fn(&rusqlite::Row) -> Result<T, CoreError>,
) -> Result<Option<T>, CoreError> {
    let mut stmt = conn.prepare(sql).map_err(map_sqerr)?;
    let mut rows = stmt.query(params).map_err(map_sqerr)?;
    match rows.next().map_err(map_sqerr)? {
        Some(row) => Ok(Some(map(row)?)),
        None => Ok(None),
    }
}

fn exists(conn: &Connection, sql: &str, id: &str) -> Result<bool, CoreError> {
    conn.query_row(sql, params![id], |_| Ok(()))
        .optional()
        .map(|r| r.is_some())
        .map_err(map_sqerr)
}

/// Delete clicks then links whose `column` equals `id`.
fn delete_clicks_of_link(conn: &Connection, link_id: &str) -> Result<usize, CoreError> {
    conn.execute("DELETE FROM clicks WHERE link_id = ?1", params![link_id])
        .map_err(map_sqerr)
}

fn delete_links_where(conn: &Connection, column: &str, id: &str) -> Result<(), CoreError> {
    conn.execute(
        &format!("DELETE FROM clicks WHERE link_id IN (SELECT id FROM links WHERE {column} = ?1)"),
        params![id],
    )
    .map_err(map_sqerr)?;
    conn.execute(&format!("DELETE FROM links WHERE {column} = ?1"), params![id])
        .map_err(map_sqerr)?;
    Ok(())
}

impl UserRepository for SqliteStore {
    fn create_user(&self, user: NewUser) -> Result<User, CoreError> {
        let conn = self.lock()?;
        let now = to_ms(user.created_at);
        let res = conn.execute(
            "INSERT INTO users(email, password_hash, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![user.email.as_str(), user.password_hash, now],
        );
        match res {
            Ok(_) => Ok(User {
                id: conn.last_insert_rowid(),
                email: user.email.as_str().to_string(),
                password_hash: user.password_hash,
                created_at: user.created_at,
                updated_at: user.created_at,
            }),
            Err(e) if is_constraint(&e) => Err(CoreError::AlreadyExists(Resource::User)),
            Err(e) => Err(map_sqerr(e)),
        }
    }

    fn get_user(&self, id: UserId) -> Result<Option<User>, CoreError> {
        let conn = self.lock()?;
        query_one(
            &conn,
            &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
            params![id],
            row_to_user,
        )
    }

    fn get_user_by_email(&self, email: &Email) -> Result<Option<User>, CoreError> {
        let conn = self.lock()?;
        query_one(
            &conn,
            &format!("SELECT {USER_COLS} FROM users WHERE email = ?1"),
            params![email.as_str()],
            row_to_user,
        )
    }
}

impl CredentialRepository for SqliteStore {
    fn upsert_credential(
        &self,
        user_id: UserId,
        marketplace: Marketplace,
        input: &CredentialInput,
        now: DateTime<Utc>,
    ) -> Result<MarketplaceCredential, CoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO marketplace_credentials(user_id, marketplace, app_key, app_secret, app_id, user_token, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(user_id, marketplace) DO UPDATE SET
                app_key = excluded.app_key,
                app_secret = excluded.app_secret,
                app_id = excluded.app_id,
                user_token = excluded.user_token,
                updated_at = excluded.updated_at",
            params![
                user_id,
                marketplace.as_str(),
                input.app_key,
                input.app_secret,
                input.app_id,
                input.user_token,
                to_ms(now),
            ],
        )
        .map_err(map_sqerr)?;
        query_one(
            &conn,
            &format!("SELECT {CREDENTIAL_COLS} FROM marketplace_credentials WHERE user_id = ?1 AND marketplace = ?2"),
            params![user_id, marketplace.as_str()],
            row_to_credential,
        )?
        .ok_or_else(|| CoreError::Repository("credential vanished after upsert".into()))
    }

    fn get_credential(
        &self,
        user_id: UserId,
        marketplace: Marketplace,
    ) -> Result<Option<MarketplaceCredential>, CoreError> {
        let conn = self.lock()?;
        query_one(
            &conn,
            &format!("SELECT {CREDENTIAL_COLS} FROM marketplace_credentials WHERE user_id = ?1 AND marketplace = ?2"),
            params![user_id, marketplace.as_str()],
            row_to_credential,
        )
    }

    fn delete_credential(
        &self,
        user_id: UserId,
        marketplace: Marketplace,
    ) -> Result<bool, CoreError> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "DELETE FROM marketplace_credentials WHERE user_id = ?1 AND marketplace = ?2",
                params![user_id, marketplace.as_str()],
            )
            .map_err(map_sqerr)?;
        Ok(n > 0)
    }
}

impl ProductRepository for SqliteStore {
    fn create_product(&self, product: &Product, offers: &[Offer]) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        let res = tx.execute(
            &format!("INSERT INTO products({PRODUCT_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                product.id.to_string(),
                product.title,
                product.image_url,
                product.source_url,
                product.user_id,
                to_ms(product.created_at),
                to_ms(product.updated_at),
            ],
        );
        match res {
            Ok(_) => {}
            Err(e) if is_constraint(&e) => return Err(CoreError::AlreadyExists(Resource::Product)),
            Err(e) => return Err(map_sqerr(e)),
        }
        for offer in offers {
            tx.execute(
                &format!("INSERT INTO offers({OFFER_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    offer.id.to_string(),
                    offer.product_id.to_string(),
                    offer.marketplace.as_str(),
                    offer.store_name,
                    offer.price.to_string(),
                    to_ms(offer.last_checked_at),
                    to_ms(offer.created_at),
                ],
            )
            .map_err(map_sqerr)?;
        }
        tx.commit().map_err(map_sqerr)
    }

    fn get_product(&self, id: Uuid) -> Result<Option<Product>, CoreError> {
        let conn = self.lock()?;
        query_one(
            &conn,
            &format!("SELECT {PRODUCT_COLS} FROM products WHERE id = ?1"),
            params![id.to_string()],
            row_to_product,
        )
    }

    fn list_products(&self, user_id: UserId) -> Result<Vec<Product>, CoreError> {
        let conn = self.lock()?;
        query_all(
            &conn,
            &format!("SELECT {PRODUCT_COLS} FROM products WHERE user_id = ?1 ORDER BY created_at DESC"),
            params![user_id],
            row_to_product,
        )
    }

    fn list_offers(&self, product_id: Uuid) -> Result<Vec<Offer>, CoreError> {
        let conn = self.lock()?;
        query_all(
            &conn,
            &format!("SELECT {OFFER_COLS} FROM offers WHERE product_id = ?1 ORDER BY created_at, id"),
            params![product_id.to_string()],
            row_to_offer,
        )
    }

    fn first_offer(&self, product_id: Uuid) -> Result<Option<Offer>, CoreError> {
        let conn = self.lock()?;
        query_one(
            &conn,
            &format!("SELECT {OFFER_COLS} FROM offers WHERE product_id = ?1 ORDER BY created_at, id LIMIT 1"),
            params![product_id.to_string()],
            row_to_offer,
        )
    }

    fn delete_product_cascade(&self, id: Uuid) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let id = id.to_string();
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        if !exists(&tx, "SELECT 1 FROM products WHERE id = ?1", &id)? {
            return Err(CoreError::NotFound(Resource::Product));
        }
        delete_links_where(&tx, "product_id", &id)?;
        tx.execute("DELETE FROM offers WHERE product_id = ?1", params![id])
            .map_err(map_sqerr)?;
        tx.execute("DELETE FROM products WHERE id = ?1", params![id])
            .map_err(map_sqerr)?;
        tx.commit().map_err(map_sqerr)
    }
}

impl CampaignRepository for SqliteStore {
    fn create_campaign(&self, campaign: &Campaign) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let res = conn.execute(
            &format!("INSERT INTO campaigns({CAMPAIGN_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                campaign.id.to_string(),
                campaign.name,
                campaign.utm_campaign,
                to_ms(campaign.start_at),
                to_ms(campaign.end_at),
                campaign.user_id,
                to_ms(campaign.created_at),
                to_ms(campaign.updated_at),
            ],
        );
        match res {
            Ok(_) => Ok(()),
            Err(e) if is_constraint(&e) => Err(CoreError::AlreadyExists(Resource::Campaign)),
            Err(e) => Err(map_sqerr(e)),
        }
    }

    fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, CoreError> {
        let conn = self.lock()?;
        query_one(
            &conn,
            &format!("SELECT {CAMPAIGN_COLS} FROM campaigns WHERE id = ?1"),
            params![id.to_string()],
            row_to_campaign,
        )
    }

    fn query_campaigns(
        &self,
        user_id: UserId,
        query: &CampaignQuery,
    ) -> Result<Vec<Campaign>, CoreError> {
        let conn = self.lock()?;
        query_all(
            &conn,
            &format!(
                "SELECT {CAMPAIGN_COLS} FROM campaigns
                 WHERE user_id = ?1
                   AND (?2 IS NULL OR instr(lower(name), lower(?2)) > 0)
                   AND (?3 IS NULL OR start_at >= ?3)
                   AND (?4 IS NULL OR end_at <= ?4)
                 ORDER BY created_at DESC, id
                 LIMIT ?5 OFFSET ?6"
            ),
            params![
                user_id,
                query.name,
                query.start_at.map(to_ms),
                query.end_at.map(to_ms),
                query.limit,
                query.offset(),
            ],
            row_to_campaign,
        )
    }

    fn list_available_campaigns(&self, today: NaiveDate) -> Result<Vec<Campaign>, CoreError> {
        let conn = self.lock()?;
        query_all(
            &conn,
            &format!(
                "SELECT {CAMPAIGN_COLS} FROM campaigns
                 WHERE date(start_at / 1000, 'unixepoch') <= ?1
                   AND date(end_at / 1000, 'unixepoch') >= ?1
                 ORDER BY start_at"
            ),
            params![ymd(today)],
            row_to_campaign,
        )
    }

    fn delete_campaign_cascade(&self, id: Uuid) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let id = id.to_string();
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        if !exists(&tx, "SELECT 1 FROM campaigns WHERE id = ?1", &id)? {
            return Err(CoreError::NotFound(Resource::Campaign));
        }
        delete_links_where(&tx, "campaign_id", &id)?;
        tx.execute("DELETE FROM campaigns WHERE id = ?1", params![id])
            .map_err(map_sqerr)?;
        tx.commit().map_err(map_sqerr)
    }
}

impl LinkRepository for SqliteStore {
    fn insert_link(&self, link: &Link) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let product_id = link.product_id.to_string();
        let campaign_id = link.campaign_id.to_string();
        if !exists(&conn, "SELECT 1 FROM products WHERE id = ?1", &product_id)? {
            return Err(CoreError::NotFound(Resource::Product));
        }
        if !exists(&conn, "SELECT 1 FROM campaigns WHERE id = ?1", &campaign_id)? {
            return Err(CoreError::NotFound(Resource::Campaign));
        }
        let res = conn.execute(
            &format!("INSERT INTO links({LINK_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                link.id.to_string(),
                product_id,
                campaign_id,
                link.short_code,
                link.target_url,
                to_ms(link.created_at),
                to_ms(link.updated_at),
            ],
        );
        match res {
            Ok(_) => Ok(()),
            Err(e) if is_constraint(&e) => Err(CoreError::AlreadyExists(Resource::Link)),
            Err(e) => Err(map_sqerr(e)),
        }
    }

    fn get_link(&self, id: Uuid) -> Result<Option<Link>, CoreError> {
        let conn = self.lock()?;
        query_one(
            &conn,
            &format!("SELECT {LINK_COLS} FROM links WHERE id = ?1"),
            params![id.to_string()],
            row_to_link,
        )
    }

    fn get_link_by_short_code(&self, code: &ShortCode) -> Result<Option<Link>, CoreError> {
        let conn = self.lock()?;
        query_one(
            &conn,
            &format!("SELECT {LINK_COLS} FROM links WHERE short_code = ?1"),
            params![code.as_str()],
            row_to_link,
        )
    }

    fn list_links_by_campaign(&self, campaign_id: Uuid) -> Result<Vec<Link>, CoreError> {
        let conn = self.lock()?;
        query_all(
            &conn,
            &format!("SELECT {LINK_COLS} FROM links WHERE campaign_id = ?1 ORDER BY created_at, id"),
            params![campaign_id.to_string()],
            row_to_link,
        )
    }

    fn delete_link_cascade(&self, id: Uuid) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let id = id.to_string();
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        if !exists(&tx, "SELECT 1 FROM links WHERE id = ?1", &id)? {
            return Err(CoreError::NotFound(Resource::Link));
        }
        delete_clicks_of_link(&tx, &id)?;
        tx.execute("DELETE FROM links WHERE id = ?1", params![id])
            .map_err(map_sqerr)?;
        tx.commit().map_err(map_sqerr)
    }
}

impl ClickRepository for SqliteStore {
    fn record_click(&self, click: &Click) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let res = conn.execute(
            "INSERT INTO clicks(id, link_id, created_at) VALUES (?1, ?2, ?3)",
            params![
                click.id.to_string(),
                click.link_id.to_string(),
                to_ms(click.created_at),
            ],
        );
        match res {
            Ok(_) => Ok(()),
            Err(e) if is_foreign_key(&e) => Err(CoreError::NotFound(Resource::Link)),
            Err(e) => Err(map_sqerr(e)),
        }
    }

    fn delete_clicks_by_link(&self, link_id: Uuid) -> Result<usize, CoreError> {
        let conn = self.lock()?;
        delete_clicks_of_link(&conn, &link_id.to_string())
    }

    fn count_clicks_by_date_range(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MetricItem>, CoreError> {
        let conn = self.lock()?;
        // A product is attributed to the lowest marketplace among its offers so
        // that products with several offers are not counted twice. Imports
        // always store at least one offer, so the inner join drops nothing
        // that top_product_by_date_range would count.
        let mut stmt = conn
            .prepare(
                "SELECT date(c.created_at / 1000, 'unixepoch') AS day, COUNT(*),
                        k.id, k.name, o.marketplace
                 FROM clicks c
                 JOIN links l ON l.id = c.link_id
                 JOIN products p ON p.id = l.product_id
                 JOIN campaigns k ON k.id = l.campaign_id
                 JOIN (SELECT product_id, MIN(marketplace) AS marketplace
                       FROM offers GROUP BY product_id) o ON o.product_id = l.product_id
                 WHERE p.user_id = ?1 AND c.created_at >= ?2 AND c.created_at <= ?3
                 GROUP BY day, k.id, o.marketplace
                 ORDER BY day, k.name, k.id, o.marketplace",
            )
            .map_err(map_sqerr)?;
        let mut rows = stmt
            .query(params![user_id, to_ms(start), to_ms(end)])
            .map_err(map_sqerr)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqerr)? {
            let day: String = row.get(0).map_err(map_sqerr)?;
            let campaign_id: String = row.get(2).map_err(map_sqerr)?;
            let marketplace: String = row.get(4).map_err(map_sqerr)?;
            out.push(MetricItem {
                date: NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                    .map_err(|e| CoreError::Repository(format!("bad day in db: {e}")))?,
                click_count: row.get(1).map_err(map_sqerr)?,
                campaign_id: parse_uuid(&campaign_id)?,
                campaign_name: row.get(3).map_err(map_sqerr)?,
                marketplace: parse_marketplace(&marketplace)?,
            });
        }
        Ok(out)
    }

    fn top_product_by_date_range(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<(Uuid, i64)>, CoreError> {
        let conn = self.lock()?;
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT l.product_id, COUNT(*) AS cnt
                 FROM clicks c
                 JOIN links l ON l.id = c.link_id
                 JOIN products p ON p.id = l.product_id
                 WHERE p.user_id = ?1 AND c.created_at >= ?2 AND c.created_at <= ?3
                 GROUP BY l.product_id
                 ORDER BY cnt DESC
                 LIMIT 1",
                params![user_id, to_ms(start), to_ms(end)],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .map_err(map_sqerr)?;
        match row {
            Some((id, clicks)) => Ok(Some((parse_uuid(&id)?, clicks))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn tmp_db() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let store = SqliteStore::open(path).unwrap();
        (store, dir)
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn product(store: &SqliteStore, user_id: UserId, marketplaces: &[Marketplace]) -> Product {
        let p = Product {
            id: Uuid::now_v7(),
            title: "Rice cooker".into(),
            image_url: "https://img.example/rc.jpg".into(),
            source_url: "https://shopee.co.th/product/11/22".into(),
            user_id,
            created_at: noon(),
            updated_at: noon(),
        };
        let offers: Vec<Offer> = marketplaces
            .iter()
            .map(|m| Offer {
                id: Uuid::now_v7(),
                product_id: p.id,
                marketplace: *m,
                store_name: format!("{m} store"),
                price: Decimal::new(129900, 2),
                last_checked_at: noon(),
                created_at: noon(),
            })
            .collect();
        store.create_product(&p, &offers).unwrap();
        p
    }

    fn campaign(store: &SqliteStore, user_id: UserId, name: &str) -> Campaign {
        let c = Campaign {
            id: Uuid::now_v7(),
            name: name.into(),
            utm_campaign: name.to_lowercase(),
            start_at: noon() - Duration::days(1),
            end_at: noon() + Duration::days(5),
            user_id,
            created_at: noon(),
            updated_at: noon(),
        };
        store.create_campaign(&c).unwrap();
        c
    }

    fn link(store: &SqliteStore, p: &Product, c: &Campaign, code: &str) -> Link {
        let l = Link {
            id: Uuid::now_v7(),
            product_id: p.id,
            campaign_id: c.id,
            short_code: code.into(),
            target_url: format!("https://s.shopee.co.th/{code}"),
            created_at: noon(),
            updated_at: noon(),
        };
        store.insert_link(&l).unwrap();
        l
    }

    fn click(store: &SqliteStore, l: &Link, at: DateTime<Utc>) {
        store
            .record_click(&Click {
                id: Uuid::now_v7(),
                link_id: l.id,
                created_at: at,
            })
            .unwrap();
    }

    #[test]
    fn user_roundtrip_and_duplicate_email() {
        let (store, _dir) = tmp_db();
        let new = || NewUser {
            email: Email::new("a@x.com").unwrap(),
            password_hash: "h".into(),
            created_at: noon(),
        };
        let user = store.create_user(new()).unwrap();
        assert_eq!(user.id, 1);
        let got = store
            .get_user_by_email(&Email::new("A@X.com").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(got, user);
        assert_eq!(
            store.create_user(new()).unwrap_err(),
            CoreError::AlreadyExists(Resource::User)
        );
        assert!(store.get_user(2).unwrap().is_none());
    }

    #[test]
    fn credential_upsert_keeps_identity() {
        let (store, _dir) = tmp_db();
        let mut input = CredentialInput {
            app_key: "k1".into(),
            app_secret: "s1".into(),
            ..Default::default()
        };
        let first = store
            .upsert_credential(1, Marketplace::Lazada, &input, noon())
            .unwrap();
        input.app_key = "k2".into();
        let later = noon() + Duration::minutes(5);
        let second = store
            .upsert_credential(1, Marketplace::Lazada, &input, later)
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.app_key, "k2");
        assert_eq!(second.created_at, noon());
        assert_eq!(second.updated_at, later);
        assert!(store.get_credential(1, Marketplace::Shopee).unwrap().is_none());
        assert!(store.delete_credential(1, Marketplace::Lazada).unwrap());
        assert!(!store.delete_credential(1, Marketplace::Lazada).unwrap());
    }

    #[test]
    fn product_with_offers_roundtrip() {
        let (store, _dir) = tmp_db();
        let p = product(&store, 1, &[Marketplace::Shopee, Marketplace::Lazada]);
        assert_eq!(store.get_product(p.id).unwrap().unwrap(), p);
        let offers = store.list_offers(p.id).unwrap();
        assert_eq!(offers.len(), 2);
        assert_eq!(offers[0].price, Decimal::new(129900, 2));
        assert_eq!(
            store.first_offer(p.id).unwrap().unwrap().id,
            offers[0].id
        );
        assert_eq!(store.list_products(1).unwrap().len(), 1);
        assert!(store.list_products(2).unwrap().is_empty());
    }

    #[test]
    fn link_constraints() {
        let (store, _dir) = tmp_db();
        let p = product(&store, 1, &[Marketplace::Shopee]);
        let c = campaign(&store, 1, "Payday");
        link(&store, &p, &c, "abc");

        let dup = Link {
            id: Uuid::now_v7(),
            ..store
                .get_link_by_short_code(&ShortCode::new("abc").unwrap())
                .unwrap()
                .unwrap()
        };
        assert_eq!(
            store.insert_link(&dup).unwrap_err(),
            CoreError::AlreadyExists(Resource::Link)
        );

        let orphan = Link {
            id: Uuid::now_v7(),
            short_code: "xyz".into(),
            campaign_id: Uuid::now_v7(),
            ..dup
        };
        assert_eq!(
            store.insert_link(&orphan).unwrap_err(),
            CoreError::NotFound(Resource::Campaign)
        );
        assert_eq!(store.list_links_by_campaign(c.id).unwrap().len(), 1);
    }

    #[test]
    fn click_on_missing_link_is_not_found() {
        let (store, _dir) = tmp_db();
        let err = store
            .record_click(&Click {
                id: Uuid::now_v7(),
                link_id: Uuid::now_v7(),
                created_at: noon(),
            })
            .unwrap_err();
        assert_eq!(err, CoreError::NotFound(Resource::Link));
    }

    #[test]
    fn cascades_remove_dependents() {
        let (store, _dir) = tmp_db();
        let p = product(&store, 1, &[Marketplace::Shopee]);
        let c1 = campaign(&store, 1, "First");
        let c2 = campaign(&store, 1, "Second");
        let l1 = link(&store, &p, &c1, "one");
        let l2 = link(&store, &p, &c2, "two");
        click(&store, &l1, noon());
        click(&store, &l2, noon());

        store.delete_campaign_cascade(c1.id).unwrap();
        assert!(store.get_link(l1.id).unwrap().is_none());
        assert_eq!(store.delete_clicks_by_link(l1.id).unwrap(), 0);
        assert!(store.get_link(l2.id).unwrap().is_some());

        store.delete_product_cascade(p.id).unwrap();
        assert!(store.get_link(l2.id).unwrap().is_none());
        assert!(store.list_offers(p.id).unwrap().is_empty());
        assert!(store.get_campaign(c2.id).unwrap().is_some());
        assert_eq!(
            store.delete_product_cascade(p.id).unwrap_err(),
            CoreError::NotFound(Resource::Product)
        );
        assert_eq!(
            store.delete_link_cascade(l2.id).unwrap_err(),
            CoreError::NotFound(Resource::Link)
        );
    }

    fn click_rows(store: &SqliteStore, l: &Link) -> i64 {
        store
            .lock()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM clicks WHERE link_id = ?1",
                params![l.id.to_string()],
                |r| r.get(0),
            )
            .unwrap()
    }

    #[test]
    fn failed_cascade_rolls_back() {
        let (store, _dir) = tmp_db();
        let p = product(&store, 1, &[Marketplace::Shopee]);
        let c = campaign(&store, 1, "Payday");
        let l = link(&store, &p, &c, "keep");
        click(&store, &l, noon());
        store
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER no_campaign_delete BEFORE DELETE ON campaigns
                 BEGIN SELECT RAISE(ABORT, 'boom'); END;
                 CREATE TRIGGER no_product_delete BEFORE DELETE ON products
                 BEGIN SELECT RAISE(ABORT, 'boom'); END;",
            )
            .unwrap();

        assert!(matches!(
            store.delete_campaign_cascade(c.id),
            Err(CoreError::Repository(_))
        ));
        assert!(store.get_link(l.id).unwrap().is_some());
        assert_eq!(click_rows(&store, &l), 1);

        assert!(matches!(
            store.delete_product_cascade(p.id),
            Err(CoreError::Repository(_))
        ));
        assert!(store.get_link(l.id).unwrap().is_some());
        assert_eq!(store.list_offers(p.id).unwrap().len(), 1);
        assert_eq!(click_rows(&store, &l), 1);
    }

    #[test]
    fn metrics_group_by_day_campaign_and_marketplace() {
        let (store, _dir) = tmp_db();
        let both = product(&store, 1, &[Marketplace::Shopee, Marketplace::Lazada]);
        let other = product(&store, 2, &[Marketplace::Shopee]);
        let c = campaign(&store, 1, "Payday");
        let foreign = campaign(&store, 2, "Theirs");
        let l = link(&store, &both, &c, "mine");
        let theirs = link(&store, &other, &foreign, "theirs");
        click(&store, &l, noon());
        click(&store, &l, noon() + Duration::hours(2));
        click(&store, &l, noon() - Duration::days(1));
        click(&store, &theirs, noon());

        let start = noon() - Duration::days(3);
        let end = noon() + Duration::days(1);
        let metrics = store.count_clicks_by_date_range(1, start, end).unwrap();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].date, NaiveDate::from_ymd_opt(2024, 5, 9).unwrap());
        assert_eq!(metrics[1].click_count, 2);
        assert_eq!(metrics[1].campaign_name, "Payday");
        assert_eq!(metrics[1].marketplace, Marketplace::Lazada);

        assert_eq!(
            store.top_product_by_date_range(1, start, end).unwrap(),
            Some((both.id, 3))
        );
        assert!(store
            .top_product_by_date_range(3, start, end)
            .unwrap()
            .is_none());
    }

    #[test]
    fn campaign_queries() {
        let (store, _dir) = tmp_db();
        campaign(&store, 1, "Summer sale");
        campaign(&store, 1, "Winter sale");
        let mut later = campaign(&store, 2, "Later");
        later.id = Uuid::now_v7();
        later.start_at = noon() + Duration::days(10);
        later.end_at = noon() + Duration::days(12);
        store.create_campaign(&later).unwrap();

        let q = CampaignQuery {
            name: Some("SUM".into()),
            ..Default::default()
        };
        let found = store.query_campaigns(1, &q).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Summer sale");

        let paged = CampaignQuery {
            page: 2,
            limit: 1,
            ..Default::default()
        };
        assert_eq!(store.query_campaigns(1, &paged).unwrap().len(), 1);

        let available = store
            .list_available_campaigns(noon().date_naive())
            .unwrap();
        assert_eq!(available.len(), 3);
        let last_day = (noon() + Duration::days(5)).date_naive();
        assert_eq!(store.list_available_campaigns(last_day).unwrap().len(), 3);
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("t.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            campaign(&store, 1, "Kept");
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(
            store
                .query_campaigns(1, &CampaignQuery::default())
                .unwrap()
                .len(),
            1
        );
    }
}
