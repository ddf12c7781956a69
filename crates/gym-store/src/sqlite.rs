//! SQLite-backed gym store: plans, members, assignments and the audit log in one database.

use crate::audit::apply_list_opts;
use crate::SeedData;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use gym_types::{
    Assignment, AssignmentStore, AuditListOptions, AuditLog, AuditLogEntry, AuditLogError, Member,
    MemberRecordStore, MembershipPlan, PlanCatalog, StoreError, UnitOfWork, WriteBatch, WriteOp,
};
use rusqlite::OptionalExtension;
use std::path::Path;

const ASSIGNMENT_COLUMNS: &str = "id, member_id, plan_id, start_date, end_date, expires_on, \
     status, price_paid, notes, created_at, updated_at, version";

const MEMBER_COLUMNS: &str = "id, name, assigned_plan_ids, current_plan_id, access_role, \
     linked_role_id, membership_status, updated_at, version";

/// SQLite-backed store for persistence. A write batch runs in one SQL transaction.
pub struct SqliteGymStore {
    conn: std::sync::Mutex<rusqlite::Connection>,
}

impl SqliteGymStore {
    /// Open (or create) a database at the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = rusqlite::Connection::open(path).map_err(sql_err)?;
        Self::init(conn)
    }

    /// Private in-memory database, mostly for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = rusqlite::Connection::open_in_memory().map_err(sql_err)?;
        Self::init(conn)
    }

    fn init(conn: rusqlite::Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS plans (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                linked_role_id TEXT
            );

            CREATE TABLE IF NOT EXISTS members (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                assigned_plan_ids TEXT NOT NULL,
                current_plan_id TEXT,
                access_role TEXT NOT NULL,
                linked_role_id TEXT,
                membership_status TEXT NOT NULL,
                updated_at TEXT,
                version INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS assignments (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                member_id TEXT NOT NULL,
                plan_id TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT,
                expires_on TEXT,
                status TEXT NOT NULL,
                price_paid REAL NOT NULL,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                version INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                entry_id TEXT NOT NULL UNIQUE,
                member_id TEXT NOT NULL,
                logged_at TEXT NOT NULL,
                body TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_assignments_member ON assignments(member_id);
            CREATE INDEX IF NOT EXISTS idx_audit_member ON audit_log(member_id);
            "#,
        )
        .map_err(sql_err)?;

        Ok(Self {
            conn: std::sync::Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Other(format!("failed to acquire lock: {}", e)))
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self.lock()?;
        f(&conn).map_err(sql_err)
    }

    /// Load catalog plans and member records. Plans are replaced; members already in the
    /// database keep their derived state.
    pub fn seed(&self, seed: &SeedData) -> Result<(), StoreError> {
        for plan in &seed.plans {
            self.insert_plan(plan)?;
        }
        for member in &seed.members {
            self.write_member_row(member, "INSERT OR IGNORE")?;
        }
        Ok(())
    }

    pub fn insert_plan(&self, plan: &MembershipPlan) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO plans (id, name, category, linked_role_id) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![plan.id, plan.name, plan.category.as_str(), plan.linked_role_id],
            )
        })?;
        Ok(())
    }

    /// Add or replace a member record (outside the lifecycle).
    pub fn insert_member(&self, member: &Member) -> Result<(), StoreError> {
        self.write_member_row(member, "INSERT OR REPLACE")
    }

    fn write_member_row(&self, member: &Member, verb: &str) -> Result<(), StoreError> {
        let plan_ids = serde_json::to_string(&member.assigned_plan_ids)
            .map_err(|e| StoreError::Other(e.to_string()))?;
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "{} INTO members ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    verb, MEMBER_COLUMNS
                ),
                rusqlite::params![
                    member.id,
                    member.name,
                    plan_ids,
                    member.current_plan_id,
                    member.access_role.as_str(),
                    member.linked_role_id,
                    member.membership_status.as_str(),
                    member.updated_at.map(|t| t.to_rfc3339()),
                    member.version,
                ],
            )
        })?;
        Ok(())
    }
}

fn sql_err(e: rusqlite::Error) -> StoreError {
    StoreError::Other(e.to_string())
}

fn conversion_err(
    idx: usize,
    e: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
}

fn get_date(row: &rusqlite::Row, idx: usize) -> Result<NaiveDate, rusqlite::Error> {
    let s: String = row.get(idx)?;
    s.parse::<NaiveDate>().map_err(|e| conversion_err(idx, e))
}

fn get_opt_date(row: &rusqlite::Row, idx: usize) -> Result<Option<NaiveDate>, rusqlite::Error> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| s.parse::<NaiveDate>().map_err(|e| conversion_err(idx, e)))
        .transpose()
}

fn get_timestamp(row: &rusqlite::Row, idx: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn parse_assignment_row(row: &rusqlite::Row) -> Result<Assignment, rusqlite::Error> {
    let status: String = row.get(6)?;
    Ok(Assignment {
        id: row.get(0)?,
        member_id: row.get(1)?,
        plan_id: row.get(2)?,
        start_date: get_date(row, 3)?,
        end_date: get_opt_date(row, 4)?,
        expires_on: get_opt_date(row, 5)?,
        status: status.parse().map_err(|e: String| conversion_err(6, e))?,
        price_paid: row.get(7)?,
        notes: row.get(8)?,
        created_at: get_timestamp(row, 9)?,
        updated_at: get_timestamp(row, 10)?,
        version: row.get(11)?,
    })
}

fn parse_member_row(row: &rusqlite::Row) -> Result<Member, rusqlite::Error> {
    let plan_ids: String = row.get(2)?;
    let access_role: String = row.get(4)?;
    let status: String = row.get(6)?;
    let updated_at: Option<String> = row.get(7)?;
    Ok(Member {
        id: row.get(0)?,
        name: row.get(1)?,
        assigned_plan_ids: serde_json::from_str(&plan_ids).map_err(|e| conversion_err(2, e))?,
        current_plan_id: row.get(3)?,
        access_role: access_role
            .parse()
            .map_err(|e: String| conversion_err(4, e))?,
        linked_role_id: row.get(5)?,
        membership_status: status.parse().map_err(|e: String| conversion_err(6, e))?,
        updated_at: updated_at
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| conversion_err(7, e))
            })
            .transpose()?,
        version: row.get(8)?,
    })
}

fn current_version(
    tx: &rusqlite::Transaction<'_>,
    table: &str,
    id: &str,
) -> Result<Option<u32>, rusqlite::Error> {
    tx.query_row(
        &format!("SELECT version FROM {} WHERE id = ?1", table),
        [id],
        |row| row.get(0),
    )
    .optional()
}

fn write_assignment(
    tx: &rusqlite::Transaction<'_>,
    a: &Assignment,
    insert: bool,
) -> Result<(), rusqlite::Error> {
    let start_date = a.start_date.to_string();
    let end_date = a.end_date.map(|d| d.to_string());
    let expires_on = a.expires_on.map(|d| d.to_string());
    let created_at = a.created_at.to_rfc3339();
    let updated_at = a.updated_at.to_rfc3339();
    let status = a.status.as_str();
    let params = rusqlite::params![
        a.id,
        a.member_id,
        a.plan_id,
        start_date,
        end_date,
        expires_on,
        status,
        a.price_paid,
        a.notes,
        created_at,
        updated_at,
        a.version,
    ];
    if insert {
        tx.execute(
            &format!(
                "INSERT INTO assignments ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                ASSIGNMENT_COLUMNS
            ),
            params,
        )?;
    } else {
        tx.execute(
            "UPDATE assignments SET member_id = ?2, plan_id = ?3, start_date = ?4, end_date = ?5, \
             expires_on = ?6, status = ?7, price_paid = ?8, notes = ?9, created_at = ?10, \
             updated_at = ?11, version = ?12 WHERE id = ?1",
            params,
        )?;
    }
    Ok(())
}

fn write_member(tx: &rusqlite::Transaction<'_>, m: &Member) -> Result<(), StoreError> {
    let plan_ids =
        serde_json::to_string(&m.assigned_plan_ids).map_err(|e| StoreError::Other(e.to_string()))?;
    tx.execute(
        "UPDATE members SET name = ?2, assigned_plan_ids = ?3, current_plan_id = ?4, \
         access_role = ?5, linked_role_id = ?6, membership_status = ?7, updated_at = ?8, \
         version = ?9 WHERE id = ?1",
        rusqlite::params![
            m.id,
            m.name,
            plan_ids,
            m.current_plan_id,
            m.access_role.as_str(),
            m.linked_role_id,
            m.membership_status.as_str(),
            m.updated_at.map(|t| t.to_rfc3339()),
            m.version,
        ],
    )
    .map_err(sql_err)?;
    Ok(())
}

#[async_trait]
impl PlanCatalog for SqliteGymStore {
    async fn get_plan(&self, id: &str) -> Result<Option<MembershipPlan>, StoreError> {
        let row = self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, category, linked_role_id FROM plans WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()
        })?;
        match row {
            Some((id, name, category, linked_role_id)) => Ok(Some(MembershipPlan {
                id,
                name,
                category: category.parse().map_err(StoreError::Other)?,
                linked_role_id,
            })),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AssignmentStore for SqliteGymStore {
    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM assignments WHERE id = ?1", ASSIGNMENT_COLUMNS),
                [id],
                parse_assignment_row,
            )
            .optional()
        })
    }

    async fn list_assignments(&self, member_id: &str) -> Result<Vec<Assignment>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM assignments WHERE member_id = ?1 ORDER BY seq",
                ASSIGNMENT_COLUMNS
            ))?;
            let rows = stmt.query_map([member_id], parse_assignment_row)?;
            rows.collect()
        })
    }

    async fn list_active_assignments(
        &self,
        member_id: &str,
    ) -> Result<Vec<Assignment>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM assignments WHERE member_id = ?1 AND status = 'Active' ORDER BY seq",
                ASSIGNMENT_COLUMNS
            ))?;
            let rows = stmt.query_map([member_id], parse_assignment_row)?;
            rows.collect()
        })
    }
}

#[async_trait]
impl MemberRecordStore for SqliteGymStore {
    async fn get_member(&self, id: &str) -> Result<Option<Member>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM members WHERE id = ?1", MEMBER_COLUMNS),
                [id],
                parse_member_row,
            )
            .optional()
        })
    }
}

#[async_trait]
impl UnitOfWork for SqliteGymStore {
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(sql_err)?;
        for op in &batch.ops {
            match op {
                WriteOp::UpsertAssignment {
                    assignment,
                    expected_version,
                } => {
                    let found =
                        current_version(&tx, "assignments", &assignment.id).map_err(sql_err)?;
                    if found != *expected_version {
                        return Err(StoreError::Conflict(format!(
                            "assignment {}: expected version {:?}, found {:?}",
                            assignment.id, expected_version, found
                        )));
                    }
                    write_assignment(&tx, assignment, found.is_none()).map_err(sql_err)?;
                }
                WriteOp::DeleteAssignment {
                    id,
                    member_id,
                    expected_version,
                } => {
                    let found = tx
                        .query_row(
                            "SELECT version, member_id FROM assignments WHERE id = ?1",
                            [id],
                            |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?)),
                        )
                        .optional()
                        .map_err(sql_err)?;
                    match found {
                        None => {
                            return Err(StoreError::Conflict(format!(
                                "assignment {} no longer exists",
                                id
                            )))
                        }
                        Some((_, owner)) if owner != *member_id => {
                            return Err(StoreError::Conflict(format!(
                                "assignment {} does not belong to member {}",
                                id, member_id
                            )))
                        }
                        Some((found, _)) if found != *expected_version => {
                            return Err(StoreError::Conflict(format!(
                                "assignment {}: expected version {}, found {}",
                                id, expected_version, found
                            )))
                        }
                        Some(_) => {}
                    }
                    tx.execute("DELETE FROM assignments WHERE id = ?1", [id])
                        .map_err(sql_err)?;
                }
                WriteOp::PutMember {
                    member,
                    expected_version,
                } => {
                    let found = current_version(&tx, "members", &member.id).map_err(sql_err)?;
                    if found != Some(*expected_version) {
                        return Err(StoreError::Conflict(format!(
                            "member {}: expected version {}, found {:?}",
                            member.id, expected_version, found
                        )));
                    }
                    write_member(&tx, member)?;
                }
            }
        }
        tx.commit().map_err(sql_err)
    }
}

#[async_trait]
impl AuditLog for SqliteGymStore {
    async fn append(&self, entry: AuditLogEntry) -> Result<(), AuditLogError> {
        let body =
            serde_json::to_string(&entry).map_err(|e| AuditLogError::Other(e.to_string()))?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO audit_log (entry_id, member_id, logged_at, body) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![entry.entry_id, entry.member_id, entry.logged_at.to_rfc3339(), body],
            )
        })
        .map_err(|e| AuditLogError::Other(e.to_string()))?;
        Ok(())
    }

    async fn list(&self, opts: &AuditListOptions) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        let bodies: Vec<String> = self
            .with_conn(|conn| match opts.member_id.as_deref() {
                Some(member_id) => {
                    let mut stmt = conn
                        .prepare("SELECT body FROM audit_log WHERE member_id = ?1 ORDER BY seq")?;
                    let rows = stmt.query_map([member_id], |row| row.get(0))?;
                    rows.collect()
                }
                None => {
                    let mut stmt = conn.prepare("SELECT body FROM audit_log ORDER BY seq")?;
                    let rows = stmt.query_map([], |row| row.get(0))?;
                    rows.collect()
                }
            })
            .map_err(|e| AuditLogError::Other(e.to_string()))?;
        let mut out = bodies
            .iter()
            .map(|b| serde_json::from_str(b))
            .collect::<Result<Vec<AuditLogEntry>, _>>()
            .map_err(|e| AuditLogError::Other(e.to_string()))?;
        apply_list_opts(&mut out, opts);
        Ok(out)
    }
}
