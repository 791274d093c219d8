#[macro_use]
extern crate rocket;

mod analytics;
mod auth;
mod db;
mod error;
mod models;
mod routes;

#[cfg(test)]
mod db_tests;

use std::path::PathBuf;

use db::DbPool;
use error::ErrorBody;
use rocket::serde::json::Json;
use rocket::{Build, Rocket};

const DEFAULT_DB_PATH: &str = "data/keeper.sqlite";

#[catch(400)]
fn bad_request() -> Json<ErrorBody> {
    Json(ErrorBody {
        error: "Bad request".to_string(),
    })
}

#[catch(401)]
fn unauthorized() -> Json<ErrorBody> {
    Json(ErrorBody {
        error: "Authentication required".to_string(),
    })
}

#[catch(403)]
fn forbidden() -> Json<ErrorBody> {
    Json(ErrorBody {
        error: "Invalid or expired token".to_string(),
    })
}

#[catch(404)]
fn not_found() -> Json<ErrorBody> {
    Json(ErrorBody {
        error: "Resource not found".to_string(),
    })
}

#[catch(422)]
fn unprocessable() -> Json<ErrorBody> {
    Json(ErrorBody {
        error: "Invalid request body".to_string(),
    })
}

#[catch(500)]
fn internal_error() -> Json<ErrorBody> {
    Json(ErrorBody {
        error: "Server error".to_string(),
    })
}

fn build_rocket(pool: DbPool) -> Rocket<Build> {
    rocket::build()
        .manage(pool)
        .mount(
            "/api",
            routes![
                auth::register,
                auth::login,
                auth::logout,
                auth::me,
                routes::list_expenses,
                routes::create_expense,
                routes::update_expense,
                routes::delete_expense,
                routes::list_categories,
                routes::create_category,
                routes::update_category,
                routes::delete_category,
                routes::monthly_totals,
                routes::category_totals,
                routes::summary,
            ],
        )
        .register(
            "/",
            catchers![
                bad_request,
                unauthorized,
                forbidden,
                not_found,
                unprocessable,
                internal_error
            ],
        )
}

#[launch]
fn rocket() -> _ {
    let db_path: String = rocket::Config::figment()
        .extract_inner("database_path")
        .unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
    let db_path = PathBuf::from(db_path);
    if let Some(dir) = db_path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).expect("create data directory");
        }
    }
    let pool = db::init_db(&db_path);
    build_rocket(pool)
}
