/*!
The append-only study log.

One row per completed attempt, kept as a CSV file that is read in full,
extended, and rewritten on every append. That cycle is not safe under
concurrent writers; a `Mutex` serializes the writers in this process,
and the file is documented single-writer beyond that.

`summary()` reports raw per-subject means of `score`, deliberately not
normalized by `total_questions`, so short and long quizzes weigh the
same. Known simplification, kept as observed.
*/
use std::collections::BTreeMap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

/// How many attempts the study-pattern page shows.
pub const RECENT_ATTEMPTS: usize = 10;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Entry {
    pub username: String,
    pub subject: String,
    pub score: u32,
    pub total_questions: u32,
    pub time_taken: String,
    pub date: String,
}

#[derive(Debug, PartialEq)]
pub struct LogError(String);

impl LogError {
    /// Prepend some contextual `annotation` for the error.
    fn annotate(self, annotation: &str) -> Self {
        let s = format!("{}: {}", annotation, &self.0);
        Self(s)
    }
}

impl std::fmt::Display for LogError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl From<csv::Error> for LogError {
    fn from(e: csv::Error) -> LogError {
        LogError(format!("Study log: {}", &e))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubjectMean {
    pub subject: String,
    pub mean_score: f64,
}

pub struct StudyLog {
    path: PathBuf,
    write_guard: Mutex<()>,
}

impl StudyLog {
    pub fn new<P: AsRef<Path>>(path: P) -> StudyLog {
        log::trace!("StudyLog::new( {:?} ) called.", path.as_ref().display());

        StudyLog {
            path: path.as_ref().to_path_buf(),
            write_guard: Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<()> {
        self.write_guard.lock().expect("Study log lock poisoned")
    }

    /// Read every row of the log. An absent file is an empty log, not
    /// an error.
    fn read_all(&self) -> Result<Vec<Entry>, LogError> {
        let f = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::trace!(
                    "Study log {} doesn't exist yet; no history.",
                    self.path.display()
                );
                return Ok(Vec::new());
            },
            Err(e) => {
                return Err(LogError(format!(
                    "Unable to open study log {}: {}",
                    self.path.display(), &e
                )));
            },
        };

        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .has_headers(true)
            .from_reader(f);

        let mut entries: Vec<Entry> = Vec::new();
        for (n, res) in csv_reader.deserialize::<Entry>().enumerate() {
            match res {
                Ok(entry) => { entries.push(entry); },
                Err(e) => {
                    let estr = match e.position() {
                        Some(p) => format!("Error on line {}: {}", p.line(), &e),
                        None => format!("Error in CSV record {}: {}", &n, &e),
                    };
                    return Err(LogError(estr));
                },
            }
        }

        Ok(entries)
    }

    /// Append one attempt: read the whole log, add the row, rewrite the
    /// whole file. Creates the log if absent.
    pub fn append(&self, entry: Entry) -> Result<(), LogError> {
        log::trace!("StudyLog::append( {:?} ) called.", &entry);

        let _guard = self.lock();

        let mut entries = self.read_all()
            .map_err(|e| e.annotate("Unable to read log before append"))?;
        entries.push(entry);

        let f = File::create(&self.path).map_err(|e| LogError(format!(
            "Unable to write study log {}: {}",
            self.path.display(), &e
        )))?;
        let mut csv_writer = csv::Writer::from_writer(f);
        for entry in entries.iter() {
            csv_writer.serialize(entry)
                .map_err(|e| LogError::from(e).annotate("Error writing log row"))?;
        }
        csv_writer.flush().map_err(|e| LogError(format!(
            "Error flushing study log: {}", &e
        )))?;

        log::trace!("    ...appended; log now has {} entries.", entries.len());
        Ok(())
    }

    /// Per-subject mean score over all of `uname`'s attempts, subjects
    /// sorted.
    pub fn summary(&self, uname: &str) -> Result<Vec<SubjectMean>, LogError> {
        log::trace!("StudyLog::summary( {:?} ) called.", uname);

        let entries = self.read_all()?;

        let mut sums: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
        for entry in entries.iter().filter(|e| e.username == uname) {
            let slot = sums.entry(entry.subject.as_str()).or_insert((0, 0));
            slot.0 += entry.score as u64;
            slot.1 += 1;
        }

        let means = sums.into_iter()
            .map(|(subject, (sum, count))| SubjectMean {
                subject: subject.to_owned(),
                mean_score: sum as f64 / count as f64,
            })
            .collect();
        Ok(means)
    }

    /// The most recent `limit` of `uname`'s attempts, newest first.
    ///
    /// The stored date format sorts chronologically as text; the sort
    /// is stable, so same-second attempts keep insertion order.
    pub fn recent(&self, uname: &str, limit: usize) -> Result<Vec<Entry>, LogError> {
        log::trace!("StudyLog::recent( {:?}, {} ) called.", uname, &limit);

        let mut entries: Vec<Entry> = self.read_all()?
            .into_iter()
            .filter(|e| e.username == uname)
            .collect();
        entries.sort_by(|a, b| b.date.cmp(&a.date));
        entries.truncate(limit);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ensure_logging;

    fn entry(
        username: &str,
        subject: &str,
        score: u32,
        total: u32,
        date: &str
    ) -> Entry {
        Entry {
            username: username.to_owned(),
            subject: subject.to_owned(),
            score,
            total_questions: total,
            time_taken: "0:03:25".to_owned(),
            date: date.to_owned(),
        }
    }

    fn temp_log() -> (tempfile::TempDir, StudyLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = StudyLog::new(dir.path().join("study_log.csv"));
        (dir, log)
    }

    #[test]
    fn absent_log_is_empty_history() {
        ensure_logging();

        let (_dir, log) = temp_log();
        assert_eq!(log.summary("alice").unwrap(), vec![]);
        assert_eq!(log.recent("alice", RECENT_ATTEMPTS).unwrap(), vec![]);
    }

    #[test]
    fn append_recent_round_trip() {
        ensure_logging();

        let (_dir, log) = temp_log();
        let e = entry("alice", "math", 7, 8, "2024-05-01 10:33:25");
        log.append(e.clone()).unwrap();

        let recent = log.recent("alice", 1).unwrap();
        assert_eq!(recent, vec![e]);
    }

    #[test]
    fn recent_is_newest_first_and_limited() {
        ensure_logging();

        let (_dir, log) = temp_log();
        for n in 0..12 {
            log.append(entry(
                "alice", "math", n, 12,
                &format!("2024-05-01 10:{:02}:00", n)
            )).unwrap();
        }
        log.append(entry("bob", "math", 10, 10, "2024-05-01 23:00:00")).unwrap();

        let recent = log.recent("alice", RECENT_ATTEMPTS).unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].score, 11);
        assert_eq!(recent[9].score, 2);
        assert!(recent.iter().all(|e| e.username == "alice"));
    }

    #[test]
    fn recent_ties_keep_insertion_order() {
        ensure_logging();

        let (_dir, log) = temp_log();
        for n in 0..3 {
            log.append(entry("alice", "math", n, 10, "2024-05-01 10:00:00")).unwrap();
        }

        let recent = log.recent("alice", RECENT_ATTEMPTS).unwrap();
        let scores: Vec<u32> = recent.iter().map(|e| e.score).collect();
        assert_eq!(scores, vec![0, 1, 2]);
    }

    #[test]
    fn summary_groups_and_averages() {
        ensure_logging();

        let (_dir, log) = temp_log();
        log.append(entry("alice", "math", 7, 8, "2024-05-01 10:00:00")).unwrap();
        log.append(entry("alice", "math", 9, 10, "2024-05-01 11:00:00")).unwrap();
        log.append(entry("alice", "history", 4, 10, "2024-05-01 12:00:00")).unwrap();
        log.append(entry("bob", "math", 1, 10, "2024-05-01 13:00:00")).unwrap();

        let summary = log.summary("alice").unwrap();
        assert_eq!(summary, vec![
            SubjectMean { subject: "history".to_owned(), mean_score: 4.0 },
            SubjectMean { subject: "math".to_owned(), mean_score: 8.0 },
        ]);
    }

    #[test]
    fn summary_is_idempotent() {
        ensure_logging();

        let (_dir, log) = temp_log();
        log.append(entry("alice", "math", 7, 8, "2024-05-01 10:00:00")).unwrap();

        let first = log.summary("alice").unwrap();
        let second = log.summary("alice").unwrap();
        assert_eq!(first, second);
    }
}
