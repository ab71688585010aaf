use rusqlite::Connection;

use dealtrack_core::{
    audit::{AuditAction, AuditEntry},
    field_value::FieldValue,
    ids::{EntryId, OpportunityId, UserId},
    opportunity::Opportunity,
    role::Role,
    user::User,
};

use crate::error::StorageError;
use crate::traits::Storage;

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

fn read_opportunity(row: &rusqlite::Row) -> Result<Opportunity, StorageError> {
    let record_bytes: Vec<u8> = row.get(0)?;
    Ok(Opportunity::from_msgpack(&record_bytes)?)
}

fn read_audit_entry(row: &rusqlite::Row) -> Result<AuditEntry, StorageError> {
    let entry_id_bytes: Vec<u8> = row.get(0)?;
    let opp_id_bytes: Vec<u8> = row.get(1)?;
    let ts: i64 = row.get(2)?;
    let user: String = row.get(3)?;
    let action_str: String = row.get(4)?;
    let field: Option<String> = row.get(5)?;
    let old_bytes: Option<Vec<u8>> = row.get(6)?;
    let new_bytes: Option<Vec<u8>> = row.get(7)?;
    let notes: Option<String> = row.get(8)?;

    let old_value = match old_bytes {
        Some(b) => Some(
            FieldValue::from_msgpack(&b)
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
        ),
        None => None,
    };
    let new_value = match new_bytes {
        Some(b) => Some(
            FieldValue::from_msgpack(&b)
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
        ),
        None => None,
    };

    Ok(AuditEntry {
        entry_id: EntryId::from_bytes(to_array::<16>(entry_id_bytes, "entry_id")?),
        opportunity_id: OpportunityId::from_bytes(to_array::<16>(opp_id_bytes, "opportunity_id")?),
        timestamp: ts,
        user,
        action: AuditAction::parse(&action_str)?,
        field,
        old_value,
        new_value,
        notes,
    })
}

fn read_user(row: &rusqlite::Row) -> Result<User, StorageError> {
    let user_id_bytes: Vec<u8> = row.get(0)?;
    let name: String = row.get(1)?;
    let email: String = row.get(2)?;
    let role_str: String = row.get(3)?;
    let active: bool = row.get(4)?;
    let approved: bool = row.get(5)?;
    let last_login: Option<i64> = row.get(6)?;
    let login_count: u32 = row.get(7)?;

    Ok(User {
        id: UserId::from_bytes(to_array::<16>(user_id_bytes, "user_id")?),
        name,
        email,
        role: Role::parse(&role_str),
        active,
        approved,
        last_login,
        login_count,
    })
}

fn upsert_opportunity_tx(
    conn: &Connection,
    opp: &Opportunity,
) -> Result<(), StorageError> {
    let record = opp.to_msgpack()?;
    conn.execute(
        "INSERT INTO opportunities (opportunity_id, sfdc_id, deal_id, stage, source, specialist, updated_date, record)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(opportunity_id) DO UPDATE SET
             sfdc_id = excluded.sfdc_id,
             deal_id = excluded.deal_id,
             stage = excluded.stage,
             source = excluded.source,
             specialist = excluded.specialist,
             updated_date = excluded.updated_date,
             record = excluded.record",
        rusqlite::params![
            opp.id.as_bytes().as_slice(),
            opp.sfdc_id,
            opp.deal_id,
            opp.stage.as_str(),
            opp.source.as_str(),
            opp.specialist,
            opp.updated_date,
            record,
        ],
    )?;
    Ok(())
}

impl Storage for SqliteStorage {
    fn load_opportunities(&self) -> Result<Vec<Opportunity>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT record FROM opportunities ORDER BY opportunity_id")?;
        let rows = stmt.query_map([], |row| Ok(row.get::<_, Vec<u8>>(0)?))?;
        let mut opps = Vec::new();
        for bytes in rows {
            opps.push(Opportunity::from_msgpack(&bytes?)?);
        }
        Ok(opps)
    }

    fn get_opportunity(
        &self,
        id: OpportunityId,
    ) -> Result<Option<Opportunity>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT record FROM opportunities WHERE opportunity_id = ?1")?;
        let mut rows = stmt.query(rusqlite::params![id.as_bytes().as_slice()])?;
        match rows.next()? {
            Some(row) => Ok(Some(read_opportunity(row)?)),
            None => Ok(None),
        }
    }

    fn upsert_opportunity(&mut self, opp: &Opportunity) -> Result<(), StorageError> {
        upsert_opportunity_tx(&self.conn, opp)
    }

    fn replace_opportunities(&mut self, opps: &[Opportunity]) -> Result<(), StorageError> {
        // Savepoint rather than BEGIN so this nests under a caller's
        // transaction during import apply.
        let sp = self.conn.savepoint()?;
        sp.execute("DELETE FROM opportunities", [])?;
        for opp in opps {
            upsert_opportunity_tx(&sp, opp)?;
        }
        sp.commit()?;
        Ok(())
    }

    fn opportunity_count(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM opportunities", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn append_audit(&mut self, entry: &AuditEntry) -> Result<(), StorageError> {
        let old_bytes = match &entry.old_value {
            Some(v) => Some(
                v.to_msgpack()
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
            ),
            None => None,
        };
        let new_bytes = match &entry.new_value {
            Some(v) => Some(
                v.to_msgpack()
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
            ),
            None => None,
        };
        self.conn.execute(
            "INSERT INTO audit_log (entry_id, opportunity_id, ts, user, action, field, old_value, new_value, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                entry.entry_id.as_bytes().as_slice(),
                entry.opportunity_id.as_bytes().as_slice(),
                entry.timestamp,
                entry.user,
                entry.action.as_str(),
                entry.field,
                old_bytes,
                new_bytes,
                entry.notes,
            ],
        )?;
        Ok(())
    }

    fn audit_for(&self, id: OpportunityId) -> Result<Vec<AuditEntry>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT entry_id, opportunity_id, ts, user, action, field, old_value, new_value, notes
             FROM audit_log WHERE opportunity_id = ?1 ORDER BY rowid",
        )?;
        let mut rows = stmt.query(rusqlite::params![id.as_bytes().as_slice()])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(read_audit_entry(row)?);
        }
        Ok(entries)
    }

    fn audit_count(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn put_user(&mut self, user: &User) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO users (user_id, name, email, role, active, approved, last_login, login_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(user_id) DO UPDATE SET
                 name = excluded.name,
                 email = excluded.email,
                 role = excluded.role,
                 active = excluded.active,
                 approved = excluded.approved,
                 last_login = excluded.last_login,
                 login_count = excluded.login_count",
            rusqlite::params![
                user.id.as_bytes().as_slice(),
                user.name,
                user.email,
                user.role.as_str(),
                user.active,
                user.approved,
                user.last_login,
                user.login_count,
            ],
        )?;
        Ok(())
    }

    fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, name, email, role, active, approved, last_login, login_count
             FROM users WHERE user_id = ?1",
        )?;
        let mut rows = stmt.query(rusqlite::params![id.as_bytes().as_slice()])?;
        match rows.next()? {
            Some(row) => Ok(Some(read_user(row)?)),
            None => Ok(None),
        }
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, name, email, role, active, approved, last_login, login_count
             FROM users WHERE email = ?1",
        )?;
        let mut rows = stmt.query(rusqlite::params![email])?;
        match rows.next()? {
            Some(row) => Ok(Some(read_user(row)?)),
            None => Ok(None),
        }
    }

    fn list_users(&self) -> Result<Vec<User>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, name, email, role, active, approved, last_login, login_count
             FROM users ORDER BY name",
        )?;
        let mut rows = stmt.query([])?;
        let mut users = Vec::new();
        while let Some(row) = rows.next()? {
            users.push(read_user(row)?);
        }
        Ok(users)
    }
}
