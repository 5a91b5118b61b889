/*!
The HTTP-facing route handlers.

Every handler recovers its own failure modes into a redirect or a short
user-visible message; nothing here should ever take the process down.
*/
use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Form,
    extract::{Extension, Query},
    http::StatusCode,
    http::header::HeaderMap,
    response::Response,
};
use serde_json::{Value, json};

use crate::{
    auth::AuthResult,
    config::Glob,
    quiz,
    store::DbError,
    studylog,
};

use super::*;

/// GET `/`: the subject list, the entry point for logged-in users.
pub async fn home(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    let (_, uname) = match authenticated(&headers, &glob) {
        Some(x) => x,
        None => { return redirect_to_login(); },
    };

    let data = json!({
        "uname": uname,
        "subjects": glob.bank.subjects(),
    });

    serve_template(StatusCode::OK, "home", &data, vec![])
}

/// GET `/register`
pub async fn register_page() -> Response {
    serve_template(StatusCode::OK, "register", &json!({}), vec![])
}

/// POST `/register`: create the user, then bounce to the login page.
pub async fn register(
    Extension(glob): Extension<Arc<Glob>>,
    Form(form): Form<LoginData>,
) -> Response {
    match glob.users.create(&form.uname, &form.password) {
        Ok(()) => {
            log::info!("Registered new user {:?}.", &form.uname);
            redirect_to_login()
        },
        Err(DbError::DuplicateUname(uname)) => {
            log::info!("Registration conflict for uname {:?}.", &uname);
            respond_duplicate_uname(&uname)
        },
        Err(e) => {
            log::error!("Error creating user {:?}: {}", &form.uname, &e);
            html_500()
        },
    }
}

/// GET `/login`
pub async fn login_page() -> Response {
    serve_template(StatusCode::OK, "login", &json!({}), vec![])
}

/// POST `/login`: authenticate and open a session.
pub async fn login(
    Extension(glob): Extension<Arc<Glob>>,
    Form(form): Form<LoginData>,
) -> Response {
    let res = match glob.users.verify(&form.uname, &form.password) {
        Ok(res) => res,
        Err(e) => {
            log::error!("Error verifying credentials for {:?}: {}", &form.uname, &e);
            return html_500();
        },
    };

    match res {
        AuthResult::Ok => {
            let session_id = glob.sessions.open(&form.uname);
            let cookie = match session_cookie_header(&glob.session_secret, &session_id) {
                Some(c) => c,
                None => { return html_500(); },
            };
            log::info!("User {:?} logged in.", &form.uname);
            redirect_home().add_headers(vec![cookie])
        },
        AuthResult::NoSuchUser | AuthResult::BadPassword => {
            // The two cases are deliberately indistinguishable to the
            // client.
            log::info!("Failed login for uname {:?}.", &form.uname);
            respond_invalid_credentials()
        },
    }
}

/// GET `/logout`: close the session (if any) and wipe the cookie.
pub async fn logout(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    if let Some((session_id, uname)) = authenticated(&headers, &glob) {
        glob.sessions.close(&session_id);
        log::info!("User {:?} logged out.", &uname);
    }

    redirect_to_login().add_headers(vec![clear_cookie_header()])
}

/// GET `/quiz?subject=S`: deal a quiz of random questions.
pub async fn quiz_page(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    let (_, uname) = match authenticated(&headers, &glob) {
        Some(x) => x,
        None => { return redirect_to_login(); },
    };

    let subject = match params.get("subject") {
        Some(s) if !s.is_empty() => s,
        _ => { return redirect_home(); },
    };

    let questions = match glob.bank.sample(subject, quiz::QUESTIONS_PER_QUIZ) {
        Ok(qs) => qs,
        Err(e) => {
            log::warn!("Can't deal a {:?} quiz: {}", subject, &e);
            return respond_message(
                StatusCode::OK,
                "No quiz available",
                &format!("{}", &e),
            );
        },
    };

    let qdata: Vec<Value> = questions.iter()
        .map(|q| json!({
            "id": q.id,
            "text": &q.text,
            "choices": q.choices.iter()
                .enumerate()
                .map(|(n, choice)| json!({ "n": n, "text": choice }))
                .collect::<Vec<Value>>(),
        }))
        .collect();

    let data = json!({
        "uname": uname,
        "subject": subject,
        "questions": qdata,
    });

    serve_template(StatusCode::OK, "quiz", &data, vec![])
}

/// POST `/submit`: score the attempt, stash the result in the session,
/// and append it to the study log.
///
/// The form carries `subject`, `start_time`, and one `q{id}=choice`
/// field per answered question, so it arrives as a free-form map.
pub async fn submit(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<Glob>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let (session_id, uname) = match authenticated(&headers, &glob) {
        Some(x) => x,
        None => { return redirect_to_login(); },
    };

    let receipt = quiz::now_naive();

    let subject = match form.get("subject") {
        Some(s) if !s.is_empty() => s.clone(),
        _ => { return redirect_home(); },
    };
    let start = quiz::effective_start(
        form.get("start_time").map(|s| s.as_str()),
        receipt,
    );

    let mut answers: HashMap<i64, usize> = HashMap::new();
    for (key, value) in form.iter() {
        let id_str = match key.strip_prefix('q') {
            Some(s) => s,
            None => { continue; },
        };
        let id: i64 = match id_str.parse() {
            Ok(n) => n,
            Err(_) => { continue; },
        };
        let choice: usize = match value.parse() {
            Ok(n) => n,
            Err(_) => {
                log::warn!(
                    "Discarding unparsable choice {:?} for question {}.",
                    value, &id
                );
                continue;
            },
        };
        answers.insert(id, choice);
    }

    let (score, total) = quiz::score(&glob.bank, &subject, &answers);
    let time_taken = quiz::format_elapsed(receipt - start);

    glob.sessions.record_result(&session_id, &subject, score);

    let entry = studylog::Entry {
        username: uname,
        subject: subject.clone(),
        score,
        total_questions: total,
        time_taken: time_taken.clone(),
        date: quiz::format_log_date(receipt),
    };
    if let Err(e) = glob.study_log.append(entry) {
        // The attempt is already scored; a dead log loses history, not
        // the result.
        log::error!("Error appending study log entry: {}", &e);
    }

    let data = json!({
        "subject": subject,
        "score": score,
        "total": total,
        "time_taken": time_taken,
    });

    serve_template(StatusCode::OK, "result", &data, vec![])
}

/// GET `/results`: this session's per-subject scores and their sum.
pub async fn results(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    let (session_id, uname) = match authenticated(&headers, &glob) {
        Some(x) => x,
        None => { return redirect_to_login(); },
    };

    let results: Vec<Value> = glob.sessions.results(&session_id)
        .iter()
        .map(|(subject, score)| json!({ "subject": subject, "score": score }))
        .collect();
    let total_score = glob.sessions.totals(&session_id);

    let data = json!({
        "uname": uname,
        "results": results,
        "total_score": total_score,
    });

    serve_template(StatusCode::OK, "results", &data, vec![])
}

/// GET `/study-pattern`: per-subject mean scores and the ten most
/// recent attempts, from the whole history of the study log.
pub async fn study_pattern(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    let (_, uname) = match authenticated(&headers, &glob) {
        Some(x) => x,
        None => { return redirect_to_login(); },
    };

    let summary = match glob.study_log.summary(&uname) {
        Ok(s) => s,
        Err(e) => {
            log::error!("Error summarizing study log for {:?}: {}", &uname, &e);
            return html_500();
        },
    };
    let recent = match glob.study_log.recent(&uname, studylog::RECENT_ATTEMPTS) {
        Ok(r) => r,
        Err(e) => {
            log::error!("Error reading recent attempts for {:?}: {}", &uname, &e);
            return html_500();
        },
    };

    let summary_data: Vec<Value> = summary.iter()
        .map(|s| json!({
            "subject": &s.subject,
            "mean_score": format!("{:.2}", s.mean_score),
        }))
        .collect();
    let recent_data: Vec<Value> = recent.iter()
        .map(|e| json!({
            "subject": &e.subject,
            "score": e.score,
            "total_questions": e.total_questions,
            "time_taken": &e.time_taken,
            "date": &e.date,
        }))
        .collect();

    let data = json!({
        "uname": uname,
        "summary": summary_data,
        "recent": recent_data,
    });

    serve_template(StatusCode::OK, "study_pattern", &data, vec![])
}
