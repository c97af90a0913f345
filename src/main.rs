pub mod auth;
pub mod config;
pub mod err;
pub mod models;
pub mod session;
pub mod students;

use axum::handler::Handler;
use axum::routing::{delete, get, patch, post};
use axum::{Extension, Json, Router};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;

use crate::config::Config;
use crate::err::Error;
use crate::session::SessionRegistry;
use crate::students::StudentQueryService;

pub type Payload<T> = Result<Json<T>, Error>;
pub type Confirmation = Result<String, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(value))
}

pub fn confirms<S: Into<String>>(message: S) -> Confirmation {
    Ok(message.into())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = Config::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    let sessions = SessionRegistry::new();
    let service = StudentQueryService::new(pool);

    let app = Router::new()
        .route("/", get(students::student_count))
        .route("/createUser", post(auth::create_user))
        .route("/login", post(auth::login))
        .route("/getStudent", get(students::get_student))
        .route("/getStudents/thirties", get(students::students_in_thirties))
        .route("/getStudents/oldies", get(students::students_thirty_or_older))
        .route("/getStudentAddress", get(students::get_student_address))
        .route("/deleteStudent", delete(students::delete_student))
        .route("/addCourses", patch(students::add_courses))
        .route("/getPassedCourses", get(students::get_passed_courses))
        .fallback(err::handler404.into_service())
        .layer(
            ServiceBuilder::new()
                .layer(Extension(sessions))
                .layer(Extension(service)),
        );

    log::info!(
        "Starting student records HTTP server on http://{}",
        config.bind_addr
    );
    axum::Server::bind(&config.bind_addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
