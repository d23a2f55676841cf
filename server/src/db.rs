use redb::{Database as RedbDatabase, ReadableTable, Table, TableDefinition};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Aircraft, AircraftRequest, Presentation, PresentationRequest, User};

// Records are stored as JSON keyed by id. Index tables map a unique field to
// the owning record id and are only written inside the same transaction.
const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
const USERS_BY_EMAIL: TableDefinition<&str, &str> = TableDefinition::new("users_by_email");
const USERS_BY_USERNAME: TableDefinition<&str, &str> = TableDefinition::new("users_by_username");
const AIRCRAFT: TableDefinition<&str, &[u8]> = TableDefinition::new("aircraft");
const AIRCRAFT_BY_TAIL: TableDefinition<&str, &str> = TableDefinition::new("aircraft_by_tail");
const PRESENTATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("presentations");

fn get_json<T, Tb>(table: &Tb, id: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
    Tb: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(id)? {
        Some(data) => Ok(Some(serde_json::from_slice(data.value())?)),
        None => Ok(None),
    }
}

fn all_json<T, Tb>(table: &Tb) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    Tb: ReadableTable<&'static str, &'static [u8]>,
{
    let mut records = Vec::new();
    for entry in table.iter()? {
        let (_, data) = entry?;
        records.push(serde_json::from_slice(data.value())?);
    }
    Ok(records)
}

fn put_json<T: Serialize>(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    id: &str,
    record: &T,
) -> Result<()> {
    let json = serde_json::to_vec(record)?;
    table.insert(id, json.as_slice())?;
    Ok(())
}

pub struct Database {
    db: RedbDatabase,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let db = RedbDatabase::create(path)?;

        // Initialize tables
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USERS_BY_EMAIL)?;
            let _ = write_txn.open_table(USERS_BY_USERNAME)?;
            let _ = write_txn.open_table(AIRCRAFT)?;
            let _ = write_txn.open_table(AIRCRAFT_BY_TAIL)?;
            let _ = write_txn.open_table(PRESENTATIONS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Opens a read transaction against the users table.
    pub fn ping(&self) -> Result<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(USERS)?;
        Ok(())
    }

    // === User operations ===

    pub fn create_user(&self, user: &User) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut by_email = write_txn.open_table(USERS_BY_EMAIL)?;
            let mut by_username = write_txn.open_table(USERS_BY_USERNAME)?;
            if by_email.get(user.email.as_str())?.is_some()
                || by_username.get(user.username.as_str())?.is_some()
            {
                return Err(AppError::Conflict(
                    "User with this email or username already exists".into(),
                ));
            }
            by_email.insert(user.email.as_str(), user.id.as_str())?;
            by_username.insert(user.username.as_str(), user.id.as_str())?;

            let mut users = write_txn.open_table(USERS)?;
            put_json(&mut users, &user.id, user)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(USERS)?;
        get_json(&users, id)
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let by_email = read_txn.open_table(USERS_BY_EMAIL)?;
        let Some(id) = by_email.get(email)? else {
            return Ok(None);
        };
        let users = read_txn.open_table(USERS)?;
        get_json(&users, id.value())
    }

    /// Newest first.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(USERS)?;
        let mut records: Vec<User> = all_json(&users)?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    // === Aircraft operations ===

    pub fn create_aircraft(&self, aircraft: &Aircraft) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut by_tail = write_txn.open_table(AIRCRAFT_BY_TAIL)?;
            if by_tail.get(aircraft.tail_number.as_str())?.is_some() {
                return Err(AppError::Conflict(
                    "Aircraft with this tail number already exists".into(),
                ));
            }
            by_tail.insert(aircraft.tail_number.as_str(), aircraft.id.as_str())?;

            let mut table = write_txn.open_table(AIRCRAFT)?;
            put_json(&mut table, &aircraft.id, aircraft)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_aircraft(&self, id: &str) -> Result<Option<Aircraft>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(AIRCRAFT)?;
        get_json(&table, id)
    }

    /// Aircraft owned by `owner`, newest first.
    pub fn list_aircraft(&self, owner: &str) -> Result<Vec<Aircraft>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(AIRCRAFT)?;
        let mut records: Vec<Aircraft> = all_json(&table)?;
        records.retain(|a| a.owner == owner);
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Applies already validated changes to an aircraft owned by `owner`.
    pub fn update_aircraft(
        &self,
        id: &str,
        owner: &str,
        changes: AircraftRequest,
    ) -> Result<Aircraft> {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(AIRCRAFT)?;
            let mut aircraft: Aircraft = get_json(&table, id)?
                .filter(|a: &Aircraft| a.owner == owner)
                .ok_or_else(|| AppError::NotFound("Aircraft not found".into()))?;

            let old_tail = aircraft.tail_number.clone();
            changes.apply_to(&mut aircraft);

            if aircraft.tail_number != old_tail {
                let mut by_tail = write_txn.open_table(AIRCRAFT_BY_TAIL)?;
                if by_tail.get(aircraft.tail_number.as_str())?.is_some() {
                    return Err(AppError::Conflict(
                        "Aircraft with this tail number already exists".into(),
                    ));
                }
                by_tail.remove(old_tail.as_str())?;
                by_tail.insert(aircraft.tail_number.as_str(), aircraft.id.as_str())?;
            }

            put_json(&mut table, &aircraft.id, &aircraft)?;
            aircraft
        };
        write_txn.commit()?;
        Ok(updated)
    }

    pub fn delete_aircraft(&self, id: &str, owner: &str) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(AIRCRAFT)?;
            let aircraft: Aircraft = get_json(&table, id)?
                .filter(|a: &Aircraft| a.owner == owner)
                .ok_or_else(|| AppError::NotFound("Aircraft not found".into()))?;

            table.remove(id)?;
            let mut by_tail = write_txn.open_table(AIRCRAFT_BY_TAIL)?;
            by_tail.remove(aircraft.tail_number.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    // === Presentation operations ===

    pub fn create_presentation(&self, presentation: &Presentation) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PRESENTATIONS)?;
            put_json(&mut table, &presentation.id, presentation)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_presentation(&self, id: &str) -> Result<Option<Presentation>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRESENTATIONS)?;
        get_json(&table, id)
    }

    /// Soonest first.
    pub fn list_presentations(&self) -> Result<Vec<Presentation>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRESENTATIONS)?;
        let mut records: Vec<Presentation> = all_json(&table)?;
        records.sort_by(|a, b| a.scheduled_date.cmp(&b.scheduled_date));
        Ok(records)
    }

    pub fn update_presentation(&self, id: &str, changes: PresentationRequest) -> Result<Presentation> {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(PRESENTATIONS)?;
            let mut presentation: Presentation = get_json(&table, id)?
                .ok_or_else(|| AppError::NotFound("Presentation not found".into()))?;

            changes.apply_to(&mut presentation);
            put_json(&mut table, &presentation.id, &presentation)?;
            presentation
        };
        write_txn.commit()?;
        Ok(updated)
    }

    pub fn delete_presentation(&self, id: &str) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PRESENTATIONS)?;
            if table.remove(id)?.is_none() {
                return Err(AppError::NotFound("Presentation not found".into()));
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{new_id, Role};
    use chrono::Utc;
    use tempfile::TempDir;

    fn open() -> (Database, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::open(path.to_str().unwrap()).unwrap();
        (db, dir)
    }

    fn user(username: &str, email: &str) -> User {
        User {
            id: new_id(),
            username: username.into(),
            email: email.into(),
            password_hash: "hash".into(),
            role: Role::Viewer,
            created_at: Utc::now(),
        }
    }

    fn aircraft(tail: &str, owner: &str) -> Aircraft {
        AircraftRequest {
            tail_number: Some(tail.into()),
            model: Some("172".into()),
            manufacturer: Some("Cessna".into()),
            year: Some(2001),
            ..Default::default()
        }
        .into_aircraft(owner)
        .unwrap()
    }

    #[test]
    fn test_user_email_and_username_are_unique() {
        let (db, _dir) = open();
        db.create_user(&user("alice", "alice@example.com")).unwrap();

        let same_email = db.create_user(&user("alice2", "alice@example.com"));
        assert!(matches!(same_email, Err(AppError::Conflict(_))));

        let same_name = db.create_user(&user("alice", "other@example.com"));
        assert!(matches!(same_name, Err(AppError::Conflict(_))));

        assert_eq!(db.list_users().unwrap().len(), 1);
    }

    #[test]
    fn test_find_user_by_email() {
        let (db, _dir) = open();
        let alice = user("alice", "alice@example.com");
        db.create_user(&alice).unwrap();

        let found = db.find_user_by_email("alice@example.com").unwrap().unwrap();
        assert_eq!(found.id, alice.id);
        assert!(db.find_user_by_email("bob@example.com").unwrap().is_none());
    }

    #[test]
    fn test_aircraft_is_scoped_to_owner() {
        let (db, _dir) = open();
        let plane = aircraft("N1", "alice");
        db.create_aircraft(&plane).unwrap();

        assert_eq!(db.list_aircraft("alice").unwrap().len(), 1);
        assert!(db.list_aircraft("bob").unwrap().is_empty());

        let update = db.update_aircraft(&plane.id, "bob", AircraftRequest::default());
        assert!(matches!(update, Err(AppError::NotFound(_))));
        let delete = db.delete_aircraft(&plane.id, "bob");
        assert!(matches!(delete, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_tail_number_index_follows_updates_and_deletes() {
        let (db, _dir) = open();
        let first = aircraft("N1", "alice");
        let second = aircraft("N2", "alice");
        db.create_aircraft(&first).unwrap();
        db.create_aircraft(&second).unwrap();

        let clash = AircraftRequest {
            tail_number: Some("N2".into()),
            ..Default::default()
        };
        assert!(matches!(
            db.update_aircraft(&first.id, "alice", clash),
            Err(AppError::Conflict(_))
        ));

        let rename = AircraftRequest {
            tail_number: Some("N3".into()),
            ..Default::default()
        };
        db.update_aircraft(&first.id, "alice", rename).unwrap();
        // N1 is free again after the rename
        db.create_aircraft(&aircraft("N1", "bob")).unwrap();

        db.delete_aircraft(&second.id, "alice").unwrap();
        db.create_aircraft(&aircraft("N2", "bob")).unwrap();
    }

    #[test]
    fn test_delete_missing_presentation() {
        let (db, _dir) = open();
        assert!(matches!(
            db.delete_presentation("missing"),
            Err(AppError::NotFound(_))
        ));
    }
}
