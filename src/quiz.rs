/*!
Scoring submitted answers and timing attempts.

An attempt's start time is whatever the client reported when the quiz
page loaded, normalized to a naive local timestamp; a missing or
unparsable report falls back to the server's receipt time, which
degrades time-taken to roughly zero. Known imprecision, kept.
*/
use std::collections::HashMap;

use time::{
    Duration, OffsetDateTime, PrimitiveDateTime,
    format_description::FormatItem,
    format_description::well_known::Iso8601,
    macros::format_description,
};

use crate::bank::Bank;

/// Number of questions dealt per quiz.
pub const QUESTIONS_PER_QUIZ: usize = 10;

const LOG_DATE_FMT: &[FormatItem] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// The local wall-clock time as a naive datetime, falling back to UTC
/// when the local offset can't be determined.
pub fn now_naive() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc());
    PrimitiveDateTime::new(now.date(), now.time())
}

/// The start time an attempt is charged from.
///
/// A trailing `Z` is stripped before parsing; client clocks report UTC
/// but the whole system runs on naive-local timestamps.
pub fn effective_start(
    start_time: Option<&str>,
    receipt: PrimitiveDateTime
) -> PrimitiveDateTime {
    let s = match start_time {
        Some(s) if !s.trim().is_empty() => s.trim(),
        _ => { return receipt; },
    };
    let s = s.strip_suffix('Z').unwrap_or(s);

    match PrimitiveDateTime::parse(s, &Iso8601::DEFAULT) {
        Ok(t) => t,
        Err(e) => {
            log::warn!(
                "Unparsable start_time {:?} ({}); substituting receipt time.",
                s, &e
            );
            receipt
        },
    }
}

/// Score the submitted answer map against `subject`'s questions.
///
/// Returns `(score, total)`. Every bank question of the subject that
/// appears in `answers` counts toward `total`; questions absent from
/// the map are skipped entirely, not counted as wrong.
pub fn score(
    bank: &Bank,
    subject: &str,
    answers: &HashMap<i64, usize>
) -> (u32, u32) {
    log::trace!(
        "quiz::score( {:?}, [ {} answers ] ) called.",
        subject, answers.len()
    );

    let mut score: u32 = 0;
    let mut total: u32 = 0;
    for q in bank.questions_for(subject) {
        if let Some(choice) = answers.get(&q.id) {
            total += 1;
            if *choice == q.correct {
                score += 1;
            }
        }
    }

    (score, total)
}

/// Format an elapsed duration as `H:MM:SS`, growing a day count at 24
/// hours. Truncated to whole seconds; negative durations (client clock
/// ahead of the server's) clamp to zero.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.whole_seconds().max(0);
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    let seconds = secs % 60;

    match days {
        0 => format!("{}:{:02}:{:02}", hours, minutes, seconds),
        1 => format!("1 day, {}:{:02}:{:02}", hours, minutes, seconds),
        n => format!("{} days, {}:{:02}:{:02}", n, hours, minutes, seconds),
    }
}

/// Format a timestamp the way the study log stores dates:
/// `YYYY-MM-DD HH:MM:SS` (which sorts chronologically as text).
pub fn format_log_date(t: PrimitiveDateTime) -> String {
    t.format(&LOG_DATE_FMT).unwrap_or_else(|e| {
        log::error!("Error formatting log date {:?}: {}", &t, &e);
        String::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ensure_logging;

    use time::macros::datetime;

    fn test_bank() -> Bank {
        let f = std::fs::File::open("test/questions_good.csv").unwrap();
        Bank::from_csv_reader(f).unwrap()
    }

    #[test]
    fn score_counts_only_answered() {
        ensure_logging();

        let bank = test_bank();

        // The fixture's math questions 1-12 are all correct at choice 1.
        // Answer eight of them, seven correctly.
        let mut answers: HashMap<i64, usize> = HashMap::new();
        for id in 1..=7 {
            answers.insert(id, 1);
        }
        answers.insert(8, 0);

        let (score, total) = score(&bank, "math", &answers);
        assert_eq!((score, total), (7, 8));
    }

    #[test]
    fn score_ignores_other_subjects_and_unknown_ids() {
        ensure_logging();

        let bank = test_bank();

        let mut answers: HashMap<i64, usize> = HashMap::new();
        answers.insert(1, 1);      // math
        answers.insert(13, 1);     // science id, scored under "science" only
        answers.insert(9_999, 1);  // not in the bank at all

        {
            let (score, total) = score(&bank, "math", &answers);
            assert_eq!((score, total), (1, 1));
        }

        let (score, total) = score(&bank, "science", &answers);
        assert_eq!((score, total), (1, 1));
    }

    #[test]
    fn score_empty_map_is_zero_of_zero() {
        let bank = test_bank();
        let answers = HashMap::new();
        assert_eq!(score(&bank, "math", &answers), (0, 0));
    }

    #[test]
    fn effective_start_parses_and_falls_back() {
        ensure_logging();

        let receipt = datetime!(2024-05-01 10:30:00);

        assert_eq!(
            effective_start(Some("2024-05-01T10:00:00Z"), receipt),
            datetime!(2024-05-01 10:00:00)
        );
        assert_eq!(
            effective_start(Some("2024-05-01T10:00:00.123Z"), receipt),
            datetime!(2024-05-01 10:00:00.123)
        );
        assert_eq!(effective_start(Some("not a timestamp"), receipt), receipt);
        assert_eq!(effective_start(Some(""), receipt), receipt);
        assert_eq!(effective_start(None, receipt), receipt);
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::seconds(0)), "0:00:00");
        assert_eq!(format_elapsed(Duration::seconds(42)), "0:00:42");
        assert_eq!(format_elapsed(Duration::seconds(3_600 + 70)), "1:01:10");
        assert_eq!(
            format_elapsed(Duration::seconds(86_400 + 2 * 3_600 + 3 * 60 + 4)),
            "1 day, 2:03:04"
        );
        assert_eq!(
            format_elapsed(Duration::seconds(2 * 86_400)),
            "2 days, 0:00:00"
        );
        // Sub-second truncation and clock-skew clamping.
        assert_eq!(format_elapsed(Duration::milliseconds(1_999)), "0:00:01");
        assert_eq!(format_elapsed(Duration::seconds(-5)), "0:00:00");
    }

    #[test]
    fn log_date_format() {
        let t = datetime!(2024-05-01 09:05:07);
        assert_eq!(format_log_date(t), "2024-05-01 09:05:07");
    }
}
