use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::models::{Category, CategoryTotal, Expense, MonthlyTotal};

/// Sum of every expense amount.
pub fn total_all(expenses: &[Expense]) -> Decimal {
    expenses.iter().map(|expense| expense.amount).sum()
}

/// Sum of the amounts falling in the given "YYYY-MM" month.
pub fn total_by_month(expenses: &[Expense], month: &str) -> Decimal {
    expenses
        .iter()
        .filter(|expense| expense.month() == month)
        .map(|expense| expense.amount)
        .sum()
}

/// Per-month totals in ascending month order. Months without expenses
/// do not appear.
pub fn monthly_totals(expenses: &[Expense]) -> Vec<MonthlyTotal> {
    let mut groups: BTreeMap<String, Decimal> = BTreeMap::new();
    for expense in expenses {
        *groups.entry(expense.month()).or_insert(Decimal::ZERO) += expense.amount;
    }
    groups
        .into_iter()
        .map(|(month, amount)| MonthlyTotal { month, amount })
        .collect()
}

pub fn monthly_totals_for_category(expenses: &[Expense], category_id: i64) -> Vec<MonthlyTotal> {
    let filtered: Vec<Expense> = expenses
        .iter()
        .filter(|expense| expense.category_id == category_id)
        .cloned()
        .collect();
    monthly_totals(&filtered)
}

/// Percentage change from `previous` to `current`. A zero previous month
/// reports 0 rather than a division error or an infinity.
pub fn month_over_month_change(current: Decimal, previous: Decimal) -> Decimal {
    if previous.is_zero() {
        return Decimal::ZERO;
    }
    (current - previous) / previous * Decimal::ONE_HUNDRED
}

/// Category carrying the highest spend, with its total. Ties keep the
/// category encountered first in the slice. None when there are no
/// expenses or every total is zero.
pub fn largest_category(expenses: &[Expense]) -> Option<(i64, Decimal)> {
    let mut totals: Vec<(i64, Decimal)> = Vec::new();
    for expense in expenses {
        if let Some(entry) = totals.iter_mut().find(|(id, _)| *id == expense.category_id) {
            entry.1 += expense.amount;
        } else {
            totals.push((expense.category_id, expense.amount));
        }
    }

    let mut best: Option<(i64, Decimal)> = None;
    for (category_id, amount) in totals {
        if amount > best.map_or(Decimal::ZERO, |(_, total)| total) {
            best = Some((category_id, amount));
        }
    }
    best
}

/// Spend per category, one entry per category in the given order,
/// including categories with no expenses.
pub fn category_totals(categories: &[Category], expenses: &[Expense]) -> Vec<CategoryTotal> {
    categories
        .iter()
        .map(|category| CategoryTotal {
            category_id: category.id,
            name: category.name.clone(),
            color: category.color.clone(),
            amount: expenses
                .iter()
                .filter(|expense| expense.category_id == category.id)
                .map(|expense| expense.amount)
                .sum(),
        })
        .collect()
}

/// Case-insensitive filter over description, category name, and the
/// string forms of amount and date. An empty query matches everything.
pub fn search(expenses: &[Expense], categories: &[Category], query: &str) -> Vec<Expense> {
    if query.is_empty() {
        return expenses.to_vec();
    }
    let needle = query.to_lowercase();
    expenses
        .iter()
        .filter(|expense| {
            expense.description.to_lowercase().contains(&needle)
                || category_name(categories, expense.category_id)
                    .is_some_and(|name| name.to_lowercase().contains(&needle))
                || expense.amount.to_string().contains(&needle)
                || expense.date.to_string().contains(&needle)
        })
        .cloned()
        .collect()
}

fn category_name(categories: &[Category], id: i64) -> Option<&str> {
    categories
        .iter()
        .find(|category| category.id == id)
        .map(|category| category.name.as_str())
}
