/*!
The user relation.

A single SQLite table holds the registered users:

```sql
CREATE TABLE users (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL,
    password TEXT NOT NULL     /* auth::hash_password() output */
);
```

The connection lives behind a `Mutex`, making every operation a
single-writer critical section; that is all the coordination this
storage model promises.
*/
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, params};

use crate::auth::{self, AuthResult};

static SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS users (
        id       INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT UNIQUE NOT NULL,
        password TEXT NOT NULL
    )";

#[derive(Debug, PartialEq)]
pub enum DbError {
    DuplicateUname(String),
    Other(String),
}

impl DbError {
    /// Prepend some contextual `annotation` for the error.
    fn annotate(self, annotation: &str) -> Self {
        match self {
            DbError::Other(s) => DbError::Other(format!("{}: {}", annotation, &s)),
            dup => dup,
        }
    }
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DbError::DuplicateUname(uname) => write!(
                f, "User name {:?} already exists.", uname
            ),
            DbError::Other(s) => write!(f, "{}", s),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> DbError {
        DbError::Other(format!("User DB: {}", &e))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct User {
    pub id: i64,
    pub uname: String,
    pub password_hash: String,
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Store, DbError> {
        log::trace!("Store::open( {:?} ) called.", path.as_ref().display());

        let conn = Connection::open(path.as_ref())
            .map_err(|e| DbError::from(e).annotate("Unable to open user DB"))?;
        Ok(Store { conn: Mutex::new(conn) })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Store {
        let conn = Connection::open_in_memory().unwrap();
        Store { conn: Mutex::new(conn) }
    }

    fn lock(&self) -> MutexGuard<Connection> {
        self.conn.lock().expect("User DB lock poisoned")
    }

    pub fn ensure_db_schema(&self) -> Result<(), DbError> {
        log::trace!("Store::ensure_db_schema() called.");

        self.lock().execute_batch(SCHEMA)
            .map_err(|e| DbError::from(e).annotate("Unable to ensure users table"))?;
        Ok(())
    }

    /// Register a new user, hashing the password before storage.
    ///
    /// The existence check gives a clean `DuplicateUname` in the common
    /// case; the UNIQUE constraint backstops racing writers.
    pub fn create(&self, uname: &str, password: &str) -> Result<(), DbError> {
        log::trace!("Store::create( {:?}, [password] ) called.", uname);

        let hash = auth::hash_password(password);
        let conn = self.lock();

        let preexisting = match conn.query_row(
            "SELECT id FROM users WHERE username = ?1",
            params![uname],
            |row| row.get::<_, i64>(0),
        ) {
            Ok(_) => true,
            Err(rusqlite::Error::QueryReturnedNoRows) => false,
            Err(e) => {
                return Err(DbError::from(e)
                    .annotate("Error querying for preexisting username"));
            },
        };
        if preexisting {
            return Err(DbError::DuplicateUname(uname.to_owned()));
        }

        match conn.execute(
            "INSERT INTO users (username, password) VALUES (?1, ?2)",
            params![uname, hash],
        ) {
            Ok(_) => {
                log::trace!("Inserted user {:?}.", uname);
                Ok(())
            },
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(DbError::DuplicateUname(uname.to_owned()))
            },
            Err(e) => Err(DbError::from(e).annotate("Error inserting new user")),
        }
    }

    pub fn find(&self, uname: &str) -> Result<Option<User>, DbError> {
        log::trace!("Store::find( {:?} ) called.", uname);

        match self.lock().query_row(
            "SELECT id, username, password FROM users WHERE username = ?1",
            params![uname],
            |row| Ok(User {
                id: row.get(0)?,
                uname: row.get(1)?,
                password_hash: row.get(2)?,
            }),
        ) {
            Ok(u) => Ok(Some(u)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DbError::from(e).annotate("Error looking up user")),
        }
    }

    /// Check a uname/password pair against the stored hash.
    pub fn verify(&self, uname: &str, password: &str) -> Result<AuthResult, DbError> {
        log::trace!("Store::verify( {:?}, [password] ) called.", uname);

        let user = match self.find(uname)? {
            Some(u) => u,
            None => { return Ok(AuthResult::NoSuchUser); },
        };

        if auth::check_password(&user.password_hash, password) {
            Ok(AuthResult::Ok)
        } else {
            Ok(AuthResult::BadPassword)
        }
    }
}
