use chrono::{Datelike, Local, NaiveDate};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::analytics;
use crate::auth::AuthUser;
use crate::db::{self, DbPool};
use crate::error::ApiError;
use crate::models::{Category, CategoryTotal, Expense, MonthlyTotal};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpenseRequest {
    pub amount: Decimal,
    pub description: String,
    pub date: String,
    pub category_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExpenseRequest {
    pub amount: Option<Decimal>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub category_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct NewCategoryRequest {
    pub name: String,
    pub color: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub total: Decimal,
    pub month: String,
    pub month_total: Decimal,
    pub previous_month: String,
    pub previous_month_total: Decimal,
    pub change_percent: Decimal,
    pub largest_category: Option<LargestCategory>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LargestCategory {
    pub category_id: i64,
    pub name: String,
    pub amount: Decimal,
}

fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest("Date must be formatted YYYY-MM-DD"))
}

fn check_amount(amount: Decimal) -> Result<(), ApiError> {
    if amount < Decimal::ZERO {
        return Err(ApiError::BadRequest("Amount must not be negative"));
    }
    Ok(())
}

/// Missing rows map to 404 while rows held by another owner map to 403,
/// so callers learn nothing about other tenants beyond bare existence.
fn require_owner(owner: Option<i64>, caller: i64, missing: &'static str) -> Result<(), ApiError> {
    match owner {
        None => Err(ApiError::NotFound(missing)),
        Some(id) if id != caller => Err(ApiError::Forbidden),
        Some(_) => Ok(()),
    }
}

fn current_month() -> String {
    Local::now().date_naive().format("%Y-%m").to_string()
}

fn previous_month(today: NaiveDate) -> String {
    let (year, month) = if today.month() == 1 {
        (today.year() - 1, 12)
    } else {
        (today.year(), today.month() - 1)
    };
    format!("{year:04}-{month:02}")
}

// Expenses

#[get("/expenses?<search>")]
pub fn list_expenses(
    pool: &State<DbPool>,
    auth: AuthUser,
    search: Option<String>,
) -> Result<Json<Vec<Expense>>, ApiError> {
    let conn = pool.get()?;
    let expenses = db::list_expenses(&conn, auth.user.id)?;
    match search {
        Some(query) => {
            let categories = db::list_categories(&conn, auth.user.id)?;
            Ok(Json(analytics::search(&expenses, &categories, &query)))
        }
        None => Ok(Json(expenses)),
    }
}

#[post("/expenses", data = "<payload>", format = "json")]
pub fn create_expense(
    pool: &State<DbPool>,
    auth: AuthUser,
    payload: Json<NewExpenseRequest>,
) -> Result<(Status, Json<Expense>), ApiError> {
    let payload = payload.into_inner();
    check_amount(payload.amount)?;
    let date = parse_date(&payload.date)?;

    let conn = pool.get()?;
    if db::get_category(&conn, auth.user.id, payload.category_id)?.is_none() {
        return Err(ApiError::NotFound("Category not found"));
    }
    let expense = db::insert_expense(
        &conn,
        auth.user.id,
        payload.category_id,
        payload.amount,
        &payload.description,
        date,
    )?;
    Ok((Status::Created, Json(expense)))
}

#[put("/expenses/<id>", data = "<payload>", format = "json")]
pub fn update_expense(
    pool: &State<DbPool>,
    auth: AuthUser,
    id: i64,
    payload: Json<UpdateExpenseRequest>,
) -> Result<Json<Expense>, ApiError> {
    let payload = payload.into_inner();
    let conn = pool.get()?;
    require_owner(db::expense_owner(&conn, id)?, auth.user.id, "Expense not found")?;
    let current = db::get_expense(&conn, auth.user.id, id)?
        .ok_or(ApiError::NotFound("Expense not found"))?;

    let amount = payload.amount.unwrap_or(current.amount);
    check_amount(amount)?;
    let description = payload.description.unwrap_or(current.description);
    let date = match payload.date {
        Some(raw) => parse_date(&raw)?,
        None => current.date,
    };
    let category_id = payload.category_id.unwrap_or(current.category_id);
    if db::get_category(&conn, auth.user.id, category_id)?.is_none() {
        return Err(ApiError::NotFound("Category not found"));
    }

    db::update_expense(&conn, auth.user.id, id, category_id, amount, &description, date)?;
    Ok(Json(Expense {
        id,
        owner_id: auth.user.id,
        category_id,
        amount,
        description,
        date,
    }))
}

#[delete("/expenses/<id>")]
pub fn delete_expense(
    pool: &State<DbPool>,
    auth: AuthUser,
    id: i64,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = pool.get()?;
    require_owner(db::expense_owner(&conn, id)?, auth.user.id, "Expense not found")?;
    db::delete_expense(&conn, auth.user.id, id)?;
    Ok(Json(serde_json::json!({ "message": "Expense deleted successfully" })))
}

// Categories

#[get("/categories")]
pub fn list_categories(
    pool: &State<DbPool>,
    auth: AuthUser,
) -> Result<Json<Vec<Category>>, ApiError> {
    let conn = pool.get()?;
    Ok(Json(db::list_categories(&conn, auth.user.id)?))
}

#[post("/categories", data = "<payload>", format = "json")]
pub fn create_category(
    pool: &State<DbPool>,
    auth: AuthUser,
    payload: Json<NewCategoryRequest>,
) -> Result<(Status, Json<Category>), ApiError> {
    let payload = payload.into_inner();
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Category name is required"));
    }

    let conn = pool.get()?;
    let category = db::insert_category(
        &conn,
        auth.user.id,
        name,
        payload.color.as_deref().unwrap_or_default(),
    )?;
    Ok((Status::Created, Json(category)))
}

#[put("/categories/<id>", data = "<payload>", format = "json")]
pub fn update_category(
    pool: &State<DbPool>,
    auth: AuthUser,
    id: i64,
    payload: Json<UpdateCategoryRequest>,
) -> Result<Json<Category>, ApiError> {
    let payload = payload.into_inner();
    let conn = pool.get()?;
    require_owner(db::category_owner(&conn, id)?, auth.user.id, "Category not found")?;
    let current = db::get_category(&conn, auth.user.id, id)?
        .ok_or(ApiError::NotFound("Category not found"))?;

    let name = match payload.name {
        Some(name) => {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ApiError::BadRequest("Category name is required"));
            }
            name
        }
        None => current.name,
    };
    let color = payload.color.unwrap_or(current.color);

    db::update_category(&conn, auth.user.id, id, &name, &color)?;
    Ok(Json(Category {
        id,
        owner_id: auth.user.id,
        name,
        color,
    }))
}

#[delete("/categories/<id>")]
pub fn delete_category(
    pool: &State<DbPool>,
    auth: AuthUser,
    id: i64,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = pool.get()?;
    require_owner(db::category_owner(&conn, id)?, auth.user.id, "Category not found")?;
    if db::expense_count_for_category(&conn, id)? > 0 {
        return Err(ApiError::BadRequest("Category is in use by expenses"));
    }
    db::delete_category(&conn, auth.user.id, id)?;
    Ok(Json(serde_json::json!({ "message": "Category deleted successfully" })))
}

// Analytics

#[get("/analytics/monthly?<category>")]
pub fn monthly_totals(
    pool: &State<DbPool>,
    auth: AuthUser,
    category: Option<i64>,
) -> Result<Json<Vec<MonthlyTotal>>, ApiError> {
    let conn = pool.get()?;
    let expenses = db::list_expenses(&conn, auth.user.id)?;
    let totals = match category {
        Some(category_id) => analytics::monthly_totals_for_category(&expenses, category_id),
        None => analytics::monthly_totals(&expenses),
    };
    Ok(Json(totals))
}

#[get("/analytics/categories")]
pub fn category_totals(
    pool: &State<DbPool>,
    auth: AuthUser,
) -> Result<Json<Vec<CategoryTotal>>, ApiError> {
    let conn = pool.get()?;
    let categories = db::list_categories(&conn, auth.user.id)?;
    let expenses = db::list_expenses(&conn, auth.user.id)?;
    Ok(Json(analytics::category_totals(&categories, &expenses)))
}

#[get("/analytics/summary")]
pub fn summary(pool: &State<DbPool>, auth: AuthUser) -> Result<Json<SummaryResponse>, ApiError> {
    let conn = pool.get()?;
    let expenses = db::list_expenses(&conn, auth.user.id)?;

    let month = current_month();
    let previous = previous_month(Local::now().date_naive());
    let month_total = analytics::total_by_month(&expenses, &month);
    let previous_total = analytics::total_by_month(&expenses, &previous);

    let largest_category = match analytics::largest_category(&expenses) {
        Some((category_id, amount)) => {
            let name = db::get_category(&conn, auth.user.id, category_id)?
                .map(|category| category.name)
                .unwrap_or_default();
            Some(LargestCategory {
                category_id,
                name,
                amount,
            })
        }
        None => None,
    };

    Ok(Json(SummaryResponse {
        total: analytics::total_all(&expenses),
        month,
        month_total,
        previous_month: previous,
        previous_month_total: previous_total,
        change_percent: analytics::month_over_month_change(month_total, previous_total).round_dp(2),
        largest_category,
    }))
}
