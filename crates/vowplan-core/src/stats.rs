//! Dashboard figures computed from the planning document.

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Serialize;

use crate::{Budget, GuestStatus, PlanningState};

/// Expenses without a category are grouped under this name.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Actual spending for one expense category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySpend {
    pub name: String,
    pub value: f64,
}

/// Actual spending summed per category, in order of first appearance.
pub fn spending_by_category(budget: &Budget) -> Vec<CategorySpend> {
    let mut totals: IndexMap<&str, f64> = IndexMap::new();
    for expense in &budget.expenses {
        let category = match expense.category.trim() {
            "" => UNCATEGORIZED,
            c => c,
        };
        *totals.entry(category).or_default() += expense.actual;
    }
    totals
        .into_iter()
        .map(|(name, value)| CategorySpend {
            name: name.to_string(),
            value,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// Days until the wedding; negative once it has passed.
    pub countdown_days: Option<i64>,
    pub guests_attending: usize,
    pub total_guests: usize,
    pub actual_spending: f64,
    pub estimated_budget: f64,
    pub tasks_completed: usize,
    pub total_tasks: usize,
    pub seated_guests: usize,
    pub spending_by_category: Vec<CategorySpend>,
}

impl DashboardStats {
    pub fn compute(state: &PlanningState, today: NaiveDate) -> Self {
        let seated = state.seating_plan.seated();
        Self {
            countdown_days: state
                .wedding_date
                .map(|date| date.signed_duration_since(today).num_days()),
            guests_attending: state
                .guest_list
                .iter()
                .filter(|g| g.status == GuestStatus::Attending)
                .count(),
            total_guests: state.guest_list.len(),
            actual_spending: state.budget.actual_spending(),
            estimated_budget: state.budget.estimated,
            tasks_completed: state.todo_list.iter().filter(|t| t.completed).count(),
            total_tasks: state.todo_list.len(),
            seated_guests: state.guest_ids().filter(|id| seated.contains(id)).count(),
            spending_by_category: spending_by_category(&state.budget),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Expense, GuestRecord, SeatTarget, TodoItem};

    #[test]
    fn stats_from_state() {
        let today: NaiveDate = "2026-10-19".parse().unwrap();
        let mut state = PlanningState::initial(today);
        let mut ada = GuestRecord::new(1, "Ada");
        ada.status = GuestStatus::Attending;
        state.guest_list.push(ada);
        state.guest_list.push(GuestRecord::new(2, "Grace"));
        state
            .seating_plan
            .move_guest(2, &SeatTarget::table("Table 3"))
            .unwrap();
        for (id, actual) in [(10, 120.5), (11, 79.5)] {
            state.budget.expenses.push(Expense {
                id,
                actual,
                ..Default::default()
            });
        }
        state.todo_list.push(TodoItem {
            id: 20,
            task: "Book DJ".to_string(),
            due_date: today,
            completed: true,
        });

        let stats = DashboardStats::compute(&state, today);
        assert_eq!(stats.countdown_days, Some(365));
        assert_eq!(stats.guests_attending, 1);
        assert_eq!(stats.total_guests, 2);
        assert_eq!(stats.actual_spending, 200.0);
        assert_eq!(stats.estimated_budget, 10_000.0);
        assert_eq!((stats.tasks_completed, stats.total_tasks), (1, 1));
        assert_eq!(stats.seated_guests, 1);
        assert_eq!(
            stats.spending_by_category,
            vec![CategorySpend {
                name: UNCATEGORIZED.to_string(),
                value: 200.0,
            }]
        );
    }

    #[test]
    fn spending_grouped_by_category_in_first_seen_order() {
        let expense = |id, category: &str, actual| Expense {
            id,
            category: category.to_string(),
            actual,
            ..Default::default()
        };
        let budget = Budget {
            estimated: 5_000.0,
            expenses: vec![
                expense(1, "Venue", 2_000.0),
                expense(2, "", 50.0),
                expense(3, "Food", 300.0),
                expense(4, "Venue", 500.0),
                expense(5, "  ", 25.0),
            ],
        };
        let by_category: Vec<(String, f64)> = spending_by_category(&budget)
            .into_iter()
            .map(|c| (c.name, c.value))
            .collect();
        assert_eq!(
            by_category,
            vec![
                ("Venue".to_string(), 2_500.0),
                (UNCATEGORIZED.to_string(), 75.0),
                ("Food".to_string(), 300.0),
            ]
        );
        assert!(spending_by_category(&Budget::default()).is_empty());
    }
}
