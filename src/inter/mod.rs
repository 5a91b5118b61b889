/*!
Interoperation between the client (user) and server.

(Not the application and the storage; that's covered by `store` and
`studylog`.)
*/
use std::fmt::Debug;
use std::path::Path;

use axum::{
    http::StatusCode,
    http::header::{self, HeaderMap, HeaderName, HeaderValue},
    response::{Html, IntoResponse, Redirect, Response},
};
use handlebars::Handlebars;
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::json;

use crate::auth;
use crate::config::Glob;

pub mod pages;

static TEMPLATES: OnceCell<Handlebars> = OnceCell::new();

/// Name of the cookie carrying the signed session id.
pub const SESSION_COOKIE: &str = "cram_session";

static HTML_500: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>cram | Error</title>
<link rel="stylesheet" href="/static/cram.css">
</head>
<body>
<h1>Internal Server Error</h1>
<p>(Error 500)</p>
<p>Something went wrong on our end. No further or more
helpful information is available about the problem.</p>
</body>
</html>"#;

trait AddHeaders: IntoResponse + Sized {
    fn add_headers(self, mut new_headers: Vec<(HeaderName, HeaderValue)>) -> Response {
        let mut r = self.into_response();
        let r_headers = r.headers_mut();
        for (name, value) in new_headers.drain(..) {
            r_headers.insert(name, value);
        }

        r
    }
}

impl<T: IntoResponse + Sized> AddHeaders for T {}

/// Data type to read the form data from a login or registration request.
#[derive(serde::Deserialize, Debug)]
pub struct LoginData {
    pub uname: String,
    pub password: String,
}

/**
Initializes the resources used in this module. This function should be
called before any functionality of this module or any of its submodules
is used.

Currently the only thing that happens here is loading the templates used
by `serve_template()`, which will panic unless `init()` has been called
first.

The argument is the path to the directory where the templates used by
`serve_template()` can be found.
*/
pub fn init<P: AsRef<Path>>(template_dir: P) -> Result<(), String> {
    if TEMPLATES.get().is_some() {
        log::warn!("Templates directory already initialized; ignoring.");
        return Ok(())
    }

    let template_dir = template_dir.as_ref();

    let mut h = Handlebars::new();
    #[cfg(debug_assertions)]
    h.set_dev_mode(true);
    h.register_templates_directory(".html", template_dir)
        .map_err(|e| format!(
            "Error registering templates directory {}: {}",
            template_dir.display(), &e
        ))?;

    TEMPLATES.set(h)
        .map_err(|old_h| {
            let mut estr = String::from("Templates directory already registered w/templates:");
            for template_name in old_h.get_templates().keys() {
                estr.push('\n');
                estr.push_str(template_name.as_str());
            }
            estr
        })?;

    Ok(())
}

/**
Return an HTML response in the case of an unrecoverable* error.

(*"Unrecoverable" from the perspective of fielding the current request,
not from the perspective of the program crashing.)
*/
pub fn html_500() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(HTML_500)
    ).into_response()
}

pub fn serve_template<S>(
    code: StatusCode,
    template_name: &str,
    data: &S,
    addl_headers: Vec<(HeaderName, HeaderValue)>
) -> Response
where
    S: Serialize + Debug
{
    log::trace!("serve_template( {}, {:?}, ... ) called.", &code, template_name);

    match TEMPLATES.get().unwrap().render(template_name, data) {
        Ok(response_body) => (
            code,
            Html(response_body)
        ).add_headers(addl_headers),
        Err(e) => {
            log::error!(
                "Error rendering template {:?} with data {:?}:\n{}",
                template_name, data, &e
            );
            html_500()
        },
    }
}

pub fn redirect_to_login() -> Response {
    Redirect::to("/login").into_response()
}

pub fn redirect_home() -> Response {
    Redirect::to("/").into_response()
}

pub fn respond_invalid_credentials() -> Response {
    log::trace!("respond_invalid_credentials() called.");

    let data = json!({
        "title": "Invalid credentials",
        "message": "Invalid username/password combination.",
        "back_href": "/login",
        "back_text": "Back to login",
    });

    serve_template(
        StatusCode::UNAUTHORIZED,
        "message",
        &data,
        vec![]
    )
}

pub fn respond_duplicate_uname(uname: &str) -> Response {
    log::trace!("respond_duplicate_uname( {:?} ) called.", uname);

    let data = json!({
        "title": "Username taken",
        "message": format!("The username {:?} already exists.", uname),
        "back_href": "/register",
        "back_text": "Back to registration",
    });

    serve_template(
        StatusCode::CONFLICT,
        "message",
        &data,
        vec![]
    )
}

pub fn respond_message(code: StatusCode, title: &str, message: &str) -> Response {
    log::trace!("respond_message( {}, {:?}, ... ) called.", &code, title);

    let data = json!({
        "title": title,
        "message": message,
        "back_href": "/",
        "back_text": "Back to subjects",
    });

    serve_template(code, "message", &data, vec![])
}

/// The Set-Cookie header establishing a signed session cookie.
fn session_cookie_header(secret: &str, session_id: &str) -> Option<(HeaderName, HeaderValue)> {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE,
        auth::sign_session_id(secret, session_id)
    );
    match HeaderValue::from_str(&cookie) {
        Ok(v) => Some((header::SET_COOKIE, v)),
        Err(e) => {
            log::error!("Error converting session cookie into header value: {}", &e);
            None
        },
    }
}

/// The Set-Cookie header that wipes the session cookie.
fn clear_cookie_header() -> (HeaderName, HeaderValue) {
    let v = HeaderValue::from_static(
        "cram_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
    );
    (header::SET_COOKIE, v)
}

/**
Pull the live session out of a request's Cookie header.

Returns the session id and the logged-in uname. A missing cookie, a bad
signature, and an expired or closed session are all the same thing:
not authenticated.
*/
pub fn authenticated(headers: &HeaderMap, glob: &Glob) -> Option<(String, String)> {
    let raw = match headers.get(header::COOKIE) {
        Some(v) => match v.to_str() {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Cookie header value unrecognizable: {}", &e);
                return None;
            },
        },
        None => { return None; },
    };

    for chunk in raw.split(';') {
        let (name, value) = match chunk.trim().split_once('=') {
            Some(x) => x,
            None => { continue; },
        };
        if name != SESSION_COOKIE { continue; }

        if let Some(id) = auth::verify_session_id(&glob.session_secret, value) {
            if let Some(uname) = glob.sessions.uname(id) {
                return Some((id.to_owned(), uname));
            }
        }
    }

    None
}
