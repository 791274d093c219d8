#![allow(clippy::unwrap_used)]

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use crate::db::{
    self, category_owner, create_session, delete_category, delete_expense, delete_session,
    email_taken, expense_count_for_category, expense_owner, get_category, get_expense, init_db,
    insert_category, insert_expense, insert_user, is_unique_violation, list_categories,
    list_expenses, prune_sessions, seed_default_categories, update_category, update_expense,
    user_by_session, user_credentials, username_taken, DbPool,
};

fn scratch_pool() -> (TempDir, DbPool) {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_db(&dir.path().join("test.sqlite"));
    (dir, pool)
}

fn add_user(conn: &rusqlite::Connection, name: &str) -> i64 {
    insert_user(
        conn,
        name,
        &format!("{name}@example.com"),
        "hash",
        "2024-01-15T10:00:00+00:00",
    )
    .unwrap()
}

fn d(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
}

// ── Migrations and users ──────────────────────────────────────

#[test]
fn test_init_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.sqlite");

    let pool = init_db(&path);
    let user_id = add_user(&pool.get().unwrap(), "alice");
    drop(pool);

    let pool = init_db(&path);
    let conn = pool.get().unwrap();
    assert!(email_taken(&conn, "alice@example.com").unwrap());
    assert!(get_category(&conn, user_id, 1).unwrap().is_none());
}

#[test]
fn test_user_lookups() {
    let (_dir, pool) = scratch_pool();
    let conn = pool.get().unwrap();
    let user_id = add_user(&conn, "alice");

    assert!(email_taken(&conn, "alice@example.com").unwrap());
    assert!(!email_taken(&conn, "bob@example.com").unwrap());
    assert!(username_taken(&conn, "alice").unwrap());
    assert!(!username_taken(&conn, "bob").unwrap());

    let (user, hash) = user_credentials(&conn, "alice@example.com").unwrap().unwrap();
    assert_eq!(user.id, user_id);
    assert_eq!(user.username, "alice");
    assert_eq!(user.email, "alice@example.com");
    assert_eq!(hash, "hash");
    assert!(user_credentials(&conn, "missing@example.com").unwrap().is_none());
}

#[test]
fn test_insert_user_duplicate_is_unique_violation() {
    let (_dir, pool) = scratch_pool();
    let conn = pool.get().unwrap();
    add_user(&conn, "alice");

    let err = insert_user(
        &conn,
        "alice2",
        "alice@example.com",
        "hash",
        "2024-01-15T10:00:00+00:00",
    )
    .unwrap_err();
    assert!(is_unique_violation(&err, "users.email"));
    assert!(!is_unique_violation(&err, "users.username"));

    let err = insert_user(
        &conn,
        "alice",
        "fresh@example.com",
        "hash",
        "2024-01-15T10:00:00+00:00",
    )
    .unwrap_err();
    assert!(is_unique_violation(&err, "users.username"));
}

// ── Sessions ──────────────────────────────────────────────────

#[test]
fn test_session_roundtrip() {
    let (_dir, pool) = scratch_pool();
    let conn = pool.get().unwrap();
    let user_id = add_user(&conn, "alice");

    create_session(&conn, user_id, "token-1", "2024-01-15T10:05:00+00:00").unwrap();
    let (user, created_at) = user_by_session(&conn, "token-1").unwrap().unwrap();
    assert_eq!(user.id, user_id);
    assert_eq!(created_at, "2024-01-15T10:05:00+00:00");

    delete_session(&conn, "token-1").unwrap();
    assert!(user_by_session(&conn, "token-1").unwrap().is_none());
}

#[test]
fn test_prune_sessions_keeps_newest() {
    let (_dir, pool) = scratch_pool();
    let conn = pool.get().unwrap();
    let user_id = add_user(&conn, "alice");

    for i in 1..=7 {
        let created_at = format!("2024-01-15T10:00:0{i}+00:00");
        create_session(&conn, user_id, &format!("token-{i}"), &created_at).unwrap();
    }
    prune_sessions(&conn, user_id, 5).unwrap();

    assert!(user_by_session(&conn, "token-1").unwrap().is_none());
    assert!(user_by_session(&conn, "token-2").unwrap().is_none());
    for i in 3..=7 {
        assert!(user_by_session(&conn, &format!("token-{i}")).unwrap().is_some());
    }
}

#[test]
fn test_prune_sessions_scoped_to_user() {
    let (_dir, pool) = scratch_pool();
    let conn = pool.get().unwrap();
    let alice = add_user(&conn, "alice");
    let bob = add_user(&conn, "bob");

    create_session(&conn, alice, "alice-token", "2024-01-15T10:00:01+00:00").unwrap();
    for i in 1..=6 {
        let created_at = format!("2024-01-15T10:00:0{i}+00:00");
        create_session(&conn, bob, &format!("bob-{i}"), &created_at).unwrap();
    }
    prune_sessions(&conn, bob, 5).unwrap();

    assert!(user_by_session(&conn, "alice-token").unwrap().is_some());
    assert!(user_by_session(&conn, "bob-1").unwrap().is_none());
    assert!(user_by_session(&conn, "bob-6").unwrap().is_some());
}

// ── Categories ────────────────────────────────────────────────

#[test]
fn test_seed_default_categories_per_owner() {
    let (_dir, pool) = scratch_pool();
    let mut conn = pool.get().unwrap();
    let alice = add_user(&conn, "alice");
    let bob = add_user(&conn, "bob");

    seed_default_categories(&mut conn, alice).unwrap();
    seed_default_categories(&mut conn, bob).unwrap();

    let alice_cats = list_categories(&conn, alice).unwrap();
    let bob_cats = list_categories(&conn, bob).unwrap();
    assert_eq!(alice_cats.len(), db::DEFAULT_CATEGORIES.len());
    assert_eq!(bob_cats.len(), db::DEFAULT_CATEGORIES.len());
    assert!(alice_cats.iter().any(|c| c.name == "Food" && c.color == "#FF5733"));
    assert!(alice_cats.iter().all(|c| c.owner_id == alice));
    assert!(bob_cats.iter().all(|c| c.owner_id == bob));
}

#[test]
fn test_list_categories_sorted_by_name() {
    let (_dir, pool) = scratch_pool();
    let conn = pool.get().unwrap();
    let alice = add_user(&conn, "alice");

    insert_category(&conn, alice, "Travel", "#111111").unwrap();
    insert_category(&conn, alice, "Books", "#222222").unwrap();
    insert_category(&conn, alice, "Pets", "#333333").unwrap();

    let names: Vec<String> = list_categories(&conn, alice)
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["Books", "Pets", "Travel"]);
}

#[test]
fn test_category_crud_scoped_to_owner() {
    let (_dir, pool) = scratch_pool();
    let conn = pool.get().unwrap();
    let alice = add_user(&conn, "alice");
    let bob = add_user(&conn, "bob");

    let category = insert_category(&conn, alice, "Books", "#222222").unwrap();
    assert_eq!(get_category(&conn, alice, category.id).unwrap().unwrap().name, "Books");
    assert!(get_category(&conn, bob, category.id).unwrap().is_none());
    assert_eq!(category_owner(&conn, category.id).unwrap(), Some(alice));
    assert_eq!(category_owner(&conn, 9999).unwrap(), None);

    update_category(&conn, alice, category.id, "Novels", "#444444").unwrap();
    let updated = get_category(&conn, alice, category.id).unwrap().unwrap();
    assert_eq!(updated.name, "Novels");
    assert_eq!(updated.color, "#444444");

    // an update keyed to the wrong owner changes nothing
    update_category(&conn, bob, category.id, "Stolen", "#000000").unwrap();
    assert_eq!(get_category(&conn, alice, category.id).unwrap().unwrap().name, "Novels");

    delete_category(&conn, bob, category.id).unwrap();
    assert!(get_category(&conn, alice, category.id).unwrap().is_some());
    delete_category(&conn, alice, category.id).unwrap();
    assert!(get_category(&conn, alice, category.id).unwrap().is_none());
}

// ── Expenses ──────────────────────────────────────────────────

#[test]
fn test_expense_crud_scoped_to_owner() {
    let (_dir, pool) = scratch_pool();
    let conn = pool.get().unwrap();
    let alice = add_user(&conn, "alice");
    let bob = add_user(&conn, "bob");
    let category = insert_category(&conn, alice, "Food", "#FF5733").unwrap();

    let expense = insert_expense(
        &conn,
        alice,
        category.id,
        dec!(25.50),
        "Weekly groceries",
        d("2023-11-15"),
    )
    .unwrap();

    let fetched = get_expense(&conn, alice, expense.id).unwrap().unwrap();
    assert_eq!(fetched.amount, dec!(25.50));
    assert_eq!(fetched.description, "Weekly groceries");
    assert_eq!(fetched.date, d("2023-11-15"));
    assert!(get_expense(&conn, bob, expense.id).unwrap().is_none());
    assert_eq!(expense_owner(&conn, expense.id).unwrap(), Some(alice));
    assert_eq!(expense_owner(&conn, 9999).unwrap(), None);

    update_expense(
        &conn,
        alice,
        expense.id,
        category.id,
        dec!(30),
        "Groceries and snacks",
        d("2023-11-16"),
    )
    .unwrap();
    let updated = get_expense(&conn, alice, expense.id).unwrap().unwrap();
    assert_eq!(updated.amount, dec!(30));
    assert_eq!(updated.description, "Groceries and snacks");

    delete_expense(&conn, bob, expense.id).unwrap();
    assert!(get_expense(&conn, alice, expense.id).unwrap().is_some());
    delete_expense(&conn, alice, expense.id).unwrap();
    assert!(get_expense(&conn, alice, expense.id).unwrap().is_none());
}

#[test]
fn test_list_expenses_newest_first() {
    let (_dir, pool) = scratch_pool();
    let conn = pool.get().unwrap();
    let alice = add_user(&conn, "alice");
    let category = insert_category(&conn, alice, "Food", "#FF5733").unwrap();

    let first = insert_expense(&conn, alice, category.id, dec!(1), "a", d("2023-11-15")).unwrap();
    let second = insert_expense(&conn, alice, category.id, dec!(2), "b", d("2023-11-20")).unwrap();
    let third = insert_expense(&conn, alice, category.id, dec!(3), "c", d("2023-11-15")).unwrap();

    let ids: Vec<i64> = list_expenses(&conn, alice)
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec![second.id, third.id, first.id]);
}

#[test]
fn test_list_expenses_scoped_to_owner() {
    let (_dir, pool) = scratch_pool();
    let conn = pool.get().unwrap();
    let alice = add_user(&conn, "alice");
    let bob = add_user(&conn, "bob");
    let alice_cat = insert_category(&conn, alice, "Food", "#FF5733").unwrap();
    let bob_cat = insert_category(&conn, bob, "Food", "#FF5733").unwrap();

    insert_expense(&conn, alice, alice_cat.id, dec!(10), "alice lunch", d("2023-11-15")).unwrap();
    insert_expense(&conn, bob, bob_cat.id, dec!(20), "bob lunch", d("2023-11-15")).unwrap();

    let alice_expenses = list_expenses(&conn, alice).unwrap();
    assert_eq!(alice_expenses.len(), 1);
    assert_eq!(alice_expenses[0].description, "alice lunch");
}

#[test]
fn test_expense_count_for_category() {
    let (_dir, pool) = scratch_pool();
    let conn = pool.get().unwrap();
    let alice = add_user(&conn, "alice");
    let food = insert_category(&conn, alice, "Food", "#FF5733").unwrap();
    let bills = insert_category(&conn, alice, "Bills", "#FF9933").unwrap();

    insert_expense(&conn, alice, food.id, dec!(10), "a", d("2023-11-15")).unwrap();
    insert_expense(&conn, alice, food.id, dec!(20), "b", d("2023-11-16")).unwrap();

    assert_eq!(expense_count_for_category(&conn, food.id).unwrap(), 2);
    assert_eq!(expense_count_for_category(&conn, bills.id).unwrap(), 0);
}

#[test]
fn test_amount_survives_storage_exactly() {
    let (_dir, pool) = scratch_pool();
    let conn = pool.get().unwrap();
    let alice = add_user(&conn, "alice");
    let category = insert_category(&conn, alice, "Food", "#FF5733").unwrap();

    insert_expense(&conn, alice, category.id, dec!(0.10), "dime", d("2023-11-15")).unwrap();
    insert_expense(&conn, alice, category.id, dec!(1999.99), "laptop", d("2023-11-16")).unwrap();

    let amounts: Vec<String> = list_expenses(&conn, alice)
        .unwrap()
        .into_iter()
        .map(|e| e.amount.to_string())
        .collect();
    assert_eq!(amounts, vec!["1999.99", "0.10"]);
}
