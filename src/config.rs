/*!
Structs to hold configuration data and global variables.
*/
use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use crate::{
    auth,
    bank::Bank,
    inter,
    session::Sessions,
    store::Store,
    studylog::StudyLog,
};

#[derive(Deserialize)]
struct ConfigFile {
    host: Option<String>,
    port: Option<u16>,
    question_file: Option<String>,
    user_db_file: Option<String>,
    study_log_file: Option<String>,
    template_dir: Option<String>,
    static_dir: Option<String>,
    session_secret: Option<String>,
    session_expiry_hours: Option<i64>,
}

#[derive(Debug)]
pub struct Cfg {
    pub addr: SocketAddr,
    pub question_file: String,
    pub user_db_file: String,
    pub study_log_file: String,
    pub template_dir: String,
    pub static_dir: String,
    pub session_secret: Option<String>,
    pub session_expiry_hours: i64,
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            addr: SocketAddr::new(
                "0.0.0.0".parse().unwrap(),
                8002
            ),
            question_file: "data/question.csv".to_owned(),
            user_db_file: "data/users.db".to_owned(),
            study_log_file: "data/study_log.csv".to_owned(),
            template_dir: "templates".to_owned(),
            static_dir: "static".to_owned(),
            session_secret: None,
            session_expiry_hours: 24,
        }
    }
}

impl Cfg {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file: {}", &e))?;
        let cf: ConfigFile = toml::from_str(&file_contents)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(s) = cf.host {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Some(n) = cf.port {
            c.addr.set_port(n);
        }
        if let Some(s) = cf.question_file {
            c.question_file = s;
        }
        if let Some(s) = cf.user_db_file {
            c.user_db_file = s;
        }
        if let Some(s) = cf.study_log_file {
            c.study_log_file = s;
        }
        if let Some(s) = cf.template_dir {
            c.template_dir = s;
        }
        if let Some(s) = cf.static_dir {
            c.static_dir = s;
        }
        if let Some(s) = cf.session_secret {
            c.session_secret = Some(s);
        }
        if let Some(n) = cf.session_expiry_hours {
            c.session_expiry_hours = n;
        }

        Ok(c)
    }
}

/// The cookie-signing secret: environment first, then the config file.
/// With neither set, a random one is generated, which works but
/// invalidates every session on restart.
fn resolve_session_secret(from_file: Option<String>) -> String {
    if let Ok(s) = std::env::var("CRAM_SESSION_SECRET") {
        if !s.is_empty() {
            return s;
        }
    }
    if let Some(s) = from_file {
        if !s.is_empty() {
            return s;
        }
    }

    log::warn!(
        "No session secret configured (CRAM_SESSION_SECRET or session_secret); \
        generating a random one. Sessions will not survive a restart."
    );
    auth::random_token(32)
}

/**
This guy will haul around the global resources and be passed in an
`axum::Extension` to the handlers who need him.
*/
pub struct Glob {
    pub bank: Bank,
    pub users: Store,
    pub study_log: StudyLog,
    pub sessions: Sessions,
    pub session_secret: String,
    pub addr: SocketAddr,
    pub static_dir: String,
}

/// Loads system configuration, the question bank, and the user store,
/// ensures the users table exists, and registers the page templates.
pub fn load_configuration<P: AsRef<Path>>(path: P) -> Result<Glob, String> {
    let path = path.as_ref();
    let cfg = if path.exists() {
        let cfg = Cfg::from_file(path)?;
        log::info!("Configuration file read:\n{:#?}", &cfg);
        cfg
    } else {
        log::info!(
            "No configuration file at {}; using defaults.",
            path.display()
        );
        Cfg::default()
    };

    log::trace!("Loading question bank...");
    let bank = Bank::from_file(&cfg.question_file)
        .map_err(|e| format!(
            "Unable to load question bank {}: {}",
            &cfg.question_file, &e
        ))?;
    if bank.is_empty() {
        return Err(format!(
            "Question bank {} contains no questions.",
            &cfg.question_file
        ));
    }
    log::info!(
        "Loaded {} questions across {} subjects.",
        bank.len(), bank.subjects().len()
    );

    log::trace!("Checking state of user DB...");
    let users = Store::open(&cfg.user_db_file)
        .map_err(|e| format!(
            "Unable to open user DB {}: {}",
            &cfg.user_db_file, &e
        ))?;
    users.ensure_db_schema()
        .map_err(|e| format!("Unable to ensure state of user DB: {}", &e))?;
    log::trace!("...user DB okay.");

    let study_log = StudyLog::new(&cfg.study_log_file);
    let sessions = Sessions::new(cfg.session_expiry_hours);
    let session_secret = resolve_session_secret(cfg.session_secret);

    inter::init(&cfg.template_dir)?;

    let glob = Glob {
        bank,
        users,
        study_log,
        sessions,
        session_secret,
        addr: cfg.addr,
        static_dir: cfg.static_dir,
    };

    Ok(glob)
}
