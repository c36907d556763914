//! SQLite-backed persistence for users, sessions, and tasks.
//!
//! All task operations are scoped by owner: a task under someone else's
//! account is indistinguishable from a missing one. The completion path in
//! [`Database::update_task`] runs the progression award and the task write
//! in a single transaction, keyed on the task's stored `completed` flag, so
//! racing completions cannot award experience twice.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::auth;
use crate::error::Error;
use crate::models::{CreateTaskInput, Session, Task, UpdateTaskInput, User, DEFAULT_CATEGORY};
use crate::progression;

mod schema;

const USER_COLUMNS: &str = "id, username, password_hash, experience, level, created_at";
const TASK_COLUMNS: &str =
    "id, owner_id, title, description, completed, due_date, category, completed_at, created_at";

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (creating if necessary) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open the database at the platform data directory
    /// (e.g. `~/.local/share/questlog/questlog.db` on Linux).
    pub fn open_default() -> Result<Self, Error> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        tracing::debug!("opening database at {}", path.display());
        Self::open(path)
    }

    pub fn default_path() -> Result<PathBuf, Error> {
        let dirs = directories::ProjectDirs::from("com", "rocket-tycoon", "questlog")
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "could not determine a data directory",
                ))
            })?;
        Ok(dirs.data_dir().join("questlog.db"))
    }

    /// Apply the schema. Idempotent; runs at every startup.
    pub fn migrate(&self) -> Result<(), Error> {
        self.conn().execute_batch(schema::SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Users ---

    /// Insert a new user with zeroed progression. The username's UNIQUE
    /// constraint does the duplicate check, so two racing registrations
    /// cannot both succeed.
    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<User, Error> {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            experience: 0,
            level: 1,
            created_at: Utc::now(),
        };

        let result = self.conn().execute(
            "INSERT INTO users (id, username, password_hash, experience, level, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id.to_string(),
                user.username,
                user.password_hash,
                user.experience,
                user.level,
                to_ts(user.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(user),
            Err(e) if is_unique_violation(&e) => Err(Error::conflict("username already exists")),
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>, Error> {
        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>, Error> {
        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    // --- Sessions ---

    /// Issue a fresh session token for `user_id`.
    pub fn create_session(&self, user_id: Uuid) -> Result<Session, Error> {
        let now = Utc::now();
        let session = Session {
            token: auth::generate_token(),
            user_id,
            created_at: now,
            expires_at: now + Duration::days(auth::SESSION_TTL_DAYS),
        };

        self.conn().execute(
            "INSERT INTO sessions (token, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session.token,
                session.user_id.to_string(),
                to_ts(session.created_at),
                to_ts(session.expires_at),
            ],
        )?;
        Ok(session)
    }

    /// Resolve a bearer token. Expired sessions are removed on sight and
    /// reported as absent.
    pub fn find_session(&self, token: &str) -> Result<Option<Session>, Error> {
        let conn = self.conn();
        let session = conn
            .query_row(
                "SELECT token, user_id, created_at, expires_at FROM sessions WHERE token = ?1",
                params![token],
                session_from_row,
            )
            .optional()?;

        match session {
            Some(s) if s.is_expired(Utc::now()) => {
                conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Remove a session (logout). Returns whether a session existed.
    pub fn delete_session(&self, token: &str) -> Result<bool, Error> {
        let rows = self
            .conn()
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(rows > 0)
    }

    // --- Tasks ---

    /// All tasks for `owner_id`, newest first.
    pub fn list_tasks(&self, owner_id: Uuid) -> Result<Vec<Task>, Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE owner_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let tasks = stmt
            .query_map(params![owner_id.to_string()], task_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    pub fn create_task(&self, owner_id: Uuid, input: CreateTaskInput) -> Result<Task, Error> {
        if input.title.trim().is_empty() {
            return Err(Error::validation("title is required"));
        }

        let task = Task {
            id: Uuid::new_v4(),
            owner_id,
            title: input.title,
            description: input.description.unwrap_or_default(),
            completed: false,
            due_date: input.due_date,
            category: input
                .category
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            completed_at: None,
            created_at: Utc::now(),
        };

        self.conn().execute(
            &format!(
                "INSERT INTO tasks ({TASK_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                task.id.to_string(),
                task.owner_id.to_string(),
                task.title,
                task.description,
                task.completed,
                task.due_date,
                task.category,
                task.completed_at.map(to_ts),
                to_ts(task.created_at),
            ],
        )?;
        Ok(task)
    }

    /// Apply a partial update. Fields absent from the patch are left
    /// unchanged; id and owner are never touched.
    ///
    /// The whole call runs in one transaction. Experience is awarded only
    /// when the *stored* `completed` flag is false and the patch flips it to
    /// true, so two racing completions of the same task serialize: the
    /// second re-reads `completed = true` and awards nothing.
    ///
    /// Reopening a completed task does not clear `completed_at`; the stamp
    /// records the first completion and stays.
    pub fn update_task(
        &self,
        owner_id: Uuid,
        task_id: Uuid,
        patch: UpdateTaskInput,
    ) -> Result<Task, Error> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let stored = tx
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND owner_id = ?2"),
                params![task_id.to_string(), owner_id.to_string()],
                task_from_row,
            )
            .optional()?;
        let Some(mut task) = stored else {
            return Err(Error::not_found("task not found"));
        };

        let was_completed = task.completed;

        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(completed) = patch.completed {
            task.completed = completed;
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = Some(due_date);
        }
        if let Some(category) = patch.category {
            task.category = category;
        }

        if !was_completed && task.completed {
            let user = tx
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                    params![owner_id.to_string()],
                    user_from_row,
                )
                .optional()?;

            match user {
                Some(user) => {
                    if let Some(up) = progression::apply_completion(
                        user.experience,
                        user.level,
                        was_completed,
                        task.completed,
                    ) {
                        tx.execute(
                            "UPDATE users SET experience = ?1, level = ?2 WHERE id = ?3",
                            params![up.experience, up.level, user.id.to_string()],
                        )?;
                        task.completed_at = Some(Utc::now());
                        if up.leveled_up {
                            tracing::info!(
                                username = %user.username,
                                level = up.level,
                                "user leveled up"
                            );
                        }
                    }
                }
                // Owner row gone mid-update: the completion still commits,
                // just without an award. Kept from the reference behavior.
                None => tracing::warn!(
                    owner_id = %owner_id,
                    "completing task for a missing user; no experience awarded"
                ),
            }
        }

        tx.execute(
            "UPDATE tasks SET title = ?1, description = ?2, completed = ?3, due_date = ?4,
             category = ?5, completed_at = ?6 WHERE id = ?7 AND owner_id = ?8",
            params![
                task.title,
                task.description,
                task.completed,
                task.due_date,
                task.category,
                task.completed_at.map(to_ts),
                task.id.to_string(),
                task.owner_id.to_string(),
            ],
        )?;
        tx.commit()?;
        Ok(task)
    }

    /// Permanently remove a task. `NotFound` covers both a nonexistent id
    /// and an id owned by someone else.
    pub fn delete_task(&self, owner_id: Uuid, task_id: Uuid) -> Result<(), Error> {
        let rows = self.conn().execute(
            "DELETE FROM tasks WHERE id = ?1 AND owner_id = ?2",
            params![task_id.to_string(), owner_id.to_string()],
        )?;
        if rows == 0 {
            return Err(Error::not_found("task not found"));
        }
        Ok(())
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn to_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_ts(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_uuid(idx: usize, value: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        experience: row.get(3)?,
        level: row.get(4)?,
        created_at: parse_ts(5, &row.get::<_, String>(5)?)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        token: row.get(0)?,
        user_id: parse_uuid(1, &row.get::<_, String>(1)?)?,
        created_at: parse_ts(2, &row.get::<_, String>(2)?)?,
        expires_at: parse_ts(3, &row.get::<_, String>(3)?)?,
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let completed_at: Option<String> = row.get(7)?;
    Ok(Task {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        owner_id: parse_uuid(1, &row.get::<_, String>(1)?)?,
        title: row.get(2)?,
        description: row.get(3)?,
        completed: row.get(4)?,
        due_date: row.get(5)?,
        category: row.get(6)?,
        completed_at: completed_at.as_deref().map(|s| parse_ts(7, s)).transpose()?,
        created_at: parse_ts(8, &row.get::<_, String>(8)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db")).unwrap();
        db.migrate().unwrap();
        (db, dir)
    }

    fn make_user(db: &Database, username: &str) -> User {
        db.create_user(username, "$argon2id$fake$hash").unwrap()
    }

    fn task_titled(title: &str) -> CreateTaskInput {
        CreateTaskInput {
            title: title.to_string(),
            description: None,
            due_date: None,
            category: None,
        }
    }

    #[test]
    fn new_user_starts_at_level_one() {
        let (db, _dir) = test_db();
        let user = make_user(&db, "alice");
        assert_eq!(user.experience, 0);
        assert_eq!(user.level, 1);

        let reloaded = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(reloaded.username, "alice");
        assert_eq!(reloaded.level, 1);
    }

    #[test]
    fn duplicate_username_is_a_conflict() {
        let (db, _dir) = test_db();
        make_user(&db, "alice");
        let err = db.create_user("alice", "$argon2id$other$hash").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn created_task_gets_defaults() {
        let (db, _dir) = test_db();
        let user = make_user(&db, "alice");
        let task = db.create_task(user.id, task_titled("Buy milk")).unwrap();

        assert_eq!(task.title, "Buy milk");
        assert_eq!(task.description, "");
        assert_eq!(task.category, DEFAULT_CATEGORY);
        assert!(!task.completed);
        assert!(task.completed_at.is_none());

        let listed = db.list_tasks(user.id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, task.id);
        assert_eq!(listed[0].category, "General");
    }

    #[test]
    fn empty_title_is_rejected() {
        let (db, _dir) = test_db();
        let user = make_user(&db, "alice");
        for title in ["", "   "] {
            let err = db.create_task(user.id, task_titled(title)).unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }
    }

    #[test]
    fn list_is_newest_first() {
        let (db, _dir) = test_db();
        let user = make_user(&db, "alice");
        db.create_task(user.id, task_titled("first")).unwrap();
        db.create_task(user.id, task_titled("second")).unwrap();
        db.create_task(user.id, task_titled("third")).unwrap();

        let titles: Vec<_> = db
            .list_tasks(user.id)
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, ["third", "second", "first"]);
    }

    #[test]
    fn tasks_are_invisible_across_owners() {
        let (db, _dir) = test_db();
        let alice = make_user(&db, "alice");
        let bob = make_user(&db, "bob");
        let task = db.create_task(alice.id, task_titled("secret")).unwrap();

        assert!(db.list_tasks(bob.id).unwrap().is_empty());

        let err = db
            .update_task(bob.id, task.id, UpdateTaskInput::default())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = db.delete_task(bob.id, task.id).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        // Alice still sees it untouched.
        assert_eq!(db.list_tasks(alice.id).unwrap().len(), 1);
    }

    #[test]
    fn completion_awards_experience_and_stamps() {
        let (db, _dir) = test_db();
        let user = make_user(&db, "alice");
        let task = db.create_task(user.id, task_titled("Buy milk")).unwrap();

        let patch = UpdateTaskInput {
            completed: Some(true),
            ..Default::default()
        };
        let updated = db.update_task(user.id, task.id, patch).unwrap();
        assert!(updated.completed);
        assert!(updated.completed_at.is_some());

        let user = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(user.experience, 10);
        assert_eq!(user.level, 1);
    }

    #[test]
    fn recompletion_awards_nothing() {
        let (db, _dir) = test_db();
        let user = make_user(&db, "alice");
        let task = db.create_task(user.id, task_titled("Buy milk")).unwrap();

        let patch = UpdateTaskInput {
            completed: Some(true),
            ..Default::default()
        };
        let first = db.update_task(user.id, task.id, patch.clone()).unwrap();
        let second = db.update_task(user.id, task.id, patch).unwrap();

        let user = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(user.experience, 10);
        // The stamp is from the first transition.
        assert_eq!(second.completed_at, first.completed_at);
    }

    #[test]
    fn reopening_keeps_the_completion_stamp() {
        let (db, _dir) = test_db();
        let user = make_user(&db, "alice");
        let task = db.create_task(user.id, task_titled("Buy milk")).unwrap();

        db.update_task(
            user.id,
            task.id,
            UpdateTaskInput {
                completed: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        let reopened = db
            .update_task(
                user.id,
                task.id,
                UpdateTaskInput {
                    completed: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(!reopened.completed);
        assert!(reopened.completed_at.is_some());

        // Completing again is a fresh false→true transition and awards again.
        db.update_task(
            user.id,
            task.id,
            UpdateTaskInput {
                completed: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        let user = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(user.experience, 20);
    }

    #[test]
    fn patch_leaves_absent_fields_alone() {
        let (db, _dir) = test_db();
        let user = make_user(&db, "alice");
        let task = db
            .create_task(
                user.id,
                CreateTaskInput {
                    title: "Buy milk".to_string(),
                    description: Some("2 liters".to_string()),
                    due_date: Some("2026-09-01".to_string()),
                    category: Some("Errands".to_string()),
                },
            )
            .unwrap();

        let updated = db
            .update_task(
                user.id,
                task.id,
                UpdateTaskInput {
                    title: Some("Buy oat milk".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.title, "Buy oat milk");
        assert_eq!(updated.description, "2 liters");
        assert_eq!(updated.due_date.as_deref(), Some("2026-09-01"));
        assert_eq!(updated.category, "Errands");
        assert!(!updated.completed);
    }

    #[test]
    fn ten_completions_reach_level_two() {
        let (db, _dir) = test_db();
        let user = make_user(&db, "alice");
        for i in 0..10 {
            let task = db
                .create_task(user.id, task_titled(&format!("task {i}")))
                .unwrap();
            db.update_task(
                user.id,
                task.id,
                UpdateTaskInput {
                    completed: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        }

        // Tenth completion: 90 + 10 = 100 >= 100, level 2 with 0 remainder.
        let user = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(user.level, 2);
        assert_eq!(user.experience, 0);
    }

    #[test]
    fn delete_removes_the_task() {
        let (db, _dir) = test_db();
        let user = make_user(&db, "alice");
        let task = db.create_task(user.id, task_titled("Buy milk")).unwrap();

        db.delete_task(user.id, task.id).unwrap();
        assert!(db.list_tasks(user.id).unwrap().is_empty());

        let err = db.delete_task(user.id, task.id).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn sessions_resolve_until_deleted() {
        let (db, _dir) = test_db();
        let user = make_user(&db, "alice");
        let session = db.create_session(user.id).unwrap();

        let found = db.find_session(&session.token).unwrap().unwrap();
        assert_eq!(found.user_id, user.id);

        assert!(db.delete_session(&session.token).unwrap());
        assert!(db.find_session(&session.token).unwrap().is_none());
        assert!(!db.delete_session(&session.token).unwrap());
    }

    #[test]
    fn expired_sessions_do_not_resolve() {
        let (db, _dir) = test_db();
        let user = make_user(&db, "alice");
        let session = db.create_session(user.id).unwrap();

        // Backdate the expiry directly.
        let past = Utc::now() - Duration::hours(1);
        db.conn()
            .execute(
                "UPDATE sessions SET expires_at = ?1 WHERE token = ?2",
                params![to_ts(past), session.token],
            )
            .unwrap();

        assert!(db.find_session(&session.token).unwrap().is_none());
    }
}
