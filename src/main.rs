/*!
The cram server executable.
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    Router,
    routing::{get, get_service, post},
};
use simplelog::{ColorChoice, TerminalMode, TermLogger};
use tower_http::services::fs::ServeDir;

use cram::config;
use cram::inter::pages;

async fn catchall_error_handler(e: std::io::Error) -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Unhandled internal error: {}", &e)
    )
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("cram")
        .build();
    TermLogger::init(
        cram::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ).unwrap();
    log::info!("Logging started.");

    let config_path = std::env::var("CRAM_CONFIG")
        .unwrap_or_else(|_| "cram.toml".to_owned());
    let glob = match config::load_configuration(&config_path) {
        Ok(glob) => glob,
        Err(e) => {
            log::error!("Error loading configuration: {}", &e);
            std::process::exit(1);
        },
    };
    let addr = glob.addr;
    let glob = Arc::new(glob);

    let serve_static = get_service(ServeDir::new(&glob.static_dir))
        .handle_error(catchall_error_handler);

    let app = Router::new()
        .route("/", get(pages::home))
        .route("/register", get(pages::register_page).post(pages::register))
        .route("/login", get(pages::login_page).post(pages::login))
        .route("/logout", get(pages::logout))
        .route("/quiz", get(pages::quiz_page))
        .route("/submit", post(pages::submit))
        .route("/results", get(pages::results))
        .route("/study-pattern", get(pages::study_pattern))
        .nest_service("/static", serve_static)
        .layer(Extension(glob));

    log::info!("Listening on {}", &addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
