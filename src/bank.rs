/*!
The static question bank.

Questions are loaded once at startup from a CSV file and never change
afterward. The file carries a header row:

```csv
id, subject,                          text,                choices, correct
 1,    math, What is the value of 2 + 2?, 3|4|5|None of the above,       1
```

`choices` is a `|`-separated list and `correct` is a zero-based index
into it.
*/
use std::io::Read;
use std::path::Path;

use rand::seq::SliceRandom;

#[derive(Clone, Debug, PartialEq)]
pub struct Question {
    pub id: i64,
    pub subject: String,
    pub text: String,
    pub choices: Vec<String>,
    pub correct: usize,
}

#[derive(Debug, PartialEq)]
pub enum BankError {
    InsufficientQuestions {
        subject: String,
        available: usize,
        requested: usize,
    },
    NoSuchSubject(String),
}

impl std::fmt::Display for BankError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            BankError::InsufficientQuestions { subject, available, requested } => write!(
                f,
                "Subject {:?} has only {} questions; {} requested.",
                subject, available, requested
            ),
            BankError::NoSuchSubject(subject) => write!(
                f,
                "There is no subject {:?} in the question bank.",
                subject
            ),
        }
    }
}

impl Question {
    pub fn from_csv_line(row: &csv::StringRecord) -> Result<Question, String> {
        log::trace!("Question::from_csv_line( {:?} ) called.", row);

        let id: i64 = match row.get(0) {
            Some(s) => s.parse()
                .map_err(|_| format!("unable to parse {:?} as question id", s))?,
            None => { return Err("no question id".to_owned()); },
        };
        let subject = match row.get(1) {
            Some(s) if !s.is_empty() => s.to_owned(),
            _ => { return Err("no subject".to_owned()); },
        };
        let text = match row.get(2) {
            Some(s) if !s.is_empty() => s.to_owned(),
            _ => { return Err("no question text".to_owned()); },
        };
        let choices: Vec<String> = match row.get(3) {
            Some(s) => s.split('|')
                .map(|c| c.trim().to_owned())
                .filter(|c| !c.is_empty())
                .collect(),
            None => { return Err("no choices".to_owned()); },
        };
        if choices.len() < 2 {
            return Err(format!("{} choices is too few", choices.len()));
        }
        let correct: usize = match row.get(4) {
            Some(s) => s.parse()
                .map_err(|_| format!("unable to parse {:?} as correct-choice index", s))?,
            None => { return Err("no correct-choice index".to_owned()); },
        };
        if correct >= choices.len() {
            return Err(format!(
                "correct-choice index {} out of range ({} choices)",
                correct, choices.len()
            ));
        }

        Ok(Question { id, subject, text, choices, correct })
    }
}

#[derive(Debug)]
pub struct Bank {
    questions: Vec<Question>,
}

impl Bank {
    pub fn from_csv_reader<R: Read>(r: R) -> Result<Bank, String> {
        log::trace!("Bank::from_csv_reader(...) called.");

        let mut csv_reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .flexible(false)
            .has_headers(true)
            .from_reader(r);

        let mut questions: Vec<Question> = Vec::with_capacity(256);

        for (n, res) in csv_reader.records().enumerate() {
            match res {
                Ok(record) => match Question::from_csv_line(&record) {
                    Ok(q) => { questions.push(q); },
                    Err(e) => {
                        let estr = match record.position() {
                            Some(p) => format!(
                                "Error on line {}: {}",
                                p.line(), &e
                            ),
                            None => format!(
                                "Error in CSV record {}: {}", &n, &e
                            ),
                        };
                        return Err(estr);
                    },
                },
                Err(e) => {
                    let estr = match e.position() {
                        Some(p) => format!(
                            "Error on line {}: {}", p.line(), &e
                        ),
                        None => format!(
                            "Error in CSV record {}: {}", &n, &e
                        ),
                    };
                    return Err(estr);
                }
            }
        }

        questions.shrink_to_fit();
        log::trace!(
            "Bank::from_csv_reader() returns {} Questions.",
            questions.len()
        );
        Ok(Bank { questions })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Bank, String> {
        let path = path.as_ref();
        let f = std::fs::File::open(path)
            .map_err(|e| format!("Unable to open {}: {}", path.display(), &e))?;
        Bank::from_csv_reader(f)
    }

    pub fn len(&self) -> usize { self.questions.len() }

    pub fn is_empty(&self) -> bool { self.questions.is_empty() }

    /// All subjects appearing in the bank, sorted, deduplicated.
    pub fn subjects(&self) -> Vec<&str> {
        let mut subjects: Vec<&str> = self.questions.iter()
            .map(|q| q.subject.as_str())
            .collect();
        subjects.sort_unstable();
        subjects.dedup();
        subjects
    }

    /// All of a subject's questions, in bank order.
    pub fn questions_for<'a>(
        &'a self,
        subject: &'a str
    ) -> impl Iterator<Item = &'a Question> {
        self.questions.iter().filter(move |q| q.subject == subject)
    }

    /// Draw `n` of `subject`'s questions uniformly at random without
    /// replacement.
    pub fn sample<'a>(&'a self, subject: &'a str, n: usize) -> Result<Vec<&'a Question>, BankError> {
        log::trace!("Bank::sample( {:?}, {} ) called.", subject, &n);

        let pool: Vec<&Question> = self.questions_for(subject).collect();
        if pool.is_empty() {
            return Err(BankError::NoSuchSubject(subject.to_owned()));
        }
        if pool.len() < n {
            return Err(BankError::InsufficientQuestions {
                subject: subject.to_owned(),
                available: pool.len(),
                requested: n,
            });
        }

        let mut rng = rand::thread_rng();
        let sampled: Vec<&Question> = pool.choose_multiple(&mut rng, n)
            .copied()
            .collect();
        Ok(sampled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ensure_logging;

    use std::collections::HashSet;
    use std::fs;

    fn test_bank() -> Bank {
        let f = fs::File::open("test/questions_good.csv").unwrap();
        Bank::from_csv_reader(f).unwrap()
    }

    #[test]
    fn load_good_bank() {
        ensure_logging();

        let bank = test_bank();
        assert_eq!(bank.len(), 15);
        assert_eq!(bank.subjects(), vec!["math", "science"]);
        assert_eq!(bank.questions_for("math").count(), 12);
        assert_eq!(bank.questions_for("science").count(), 3);
    }

    #[test]
    fn sample_is_distinct_and_on_subject() {
        ensure_logging();

        let bank = test_bank();
        let sample = bank.sample("math", 10).unwrap();
        assert_eq!(sample.len(), 10);

        let ids: HashSet<i64> = sample.iter().map(|q| q.id).collect();
        assert_eq!(ids.len(), 10);
        assert!(sample.iter().all(|q| q.subject == "math"));
    }

    #[test]
    fn sample_too_few_is_recoverable() {
        ensure_logging();

        let bank = test_bank();
        assert_eq!(
            bank.sample("science", 10),
            Err(BankError::InsufficientQuestions {
                subject: "science".to_owned(),
                available: 3,
                requested: 10,
            })
        );
        assert_eq!(
            bank.sample("underwater basket weaving", 10),
            Err(BankError::NoSuchSubject("underwater basket weaving".to_owned()))
        );
    }

    #[test]
    fn bad_rows_are_load_errors() {
        ensure_logging();

        static HEADER: &str = "id,subject,text,choices,correct\n";

        let bad_correct = format!("{}1,math,What is 2+2?,3|4|5,7\n", HEADER);
        let e = Bank::from_csv_reader(bad_correct.as_bytes()).unwrap_err();
        assert!(e.contains("out of range"));

        let bad_id = format!("{}one,math,What is 2+2?,3|4|5,1\n", HEADER);
        let e = Bank::from_csv_reader(bad_id.as_bytes()).unwrap_err();
        assert!(e.contains("question id"));

        let one_choice = format!("{}1,math,What is 2+2?,4,0\n", HEADER);
        let e = Bank::from_csv_reader(one_choice.as_bytes()).unwrap_err();
        assert!(e.contains("too few"));

        let no_subject = format!("{}1,,What is 2+2?,3|4|5,1\n", HEADER);
        let e = Bank::from_csv_reader(no_subject.as_bytes()).unwrap_err();
        assert!(e.contains("no subject"));
    }

    #[test]
    fn comments_and_whitespace_tolerated() {
        ensure_logging();

        static CSV: &str = "\
id,subject,text,choices,correct
# this line is a comment
 1 , math ,  What is 2+2? , 3 | 4 | 5 , 1
";
        let bank = Bank::from_csv_reader(CSV.as_bytes()).unwrap();
        assert_eq!(bank.len(), 1);
        let q = bank.questions_for("math").next().unwrap();
        assert_eq!(q.text, "What is 2+2?");
        assert_eq!(q.choices, vec!["3", "4", "5"]);
        assert_eq!(q.correct, 1);
    }
}
