//! Month and week day grids.
//!
//! Grids are recomputed from `(view, reference date)` on every call. Weeks
//! start on Sunday (weekday index 0).

use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};

pub const DAYS_PER_WEEK: usize = 7;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CalendarView {
    #[default]
    Month,
    Week,
}

/// Index of `date` within its week, Sunday = 0.
pub fn weekday_index(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_sunday()
}

pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(weekday_index(date)))
}

/// Seven consecutive dates covering the week that contains `date`.
pub fn week_grid(date: NaiveDate) -> Vec<NaiveDate> {
    let start = week_start(date);
    (0..DAYS_PER_WEEK as i64)
        .map(|offset| start + Duration::days(offset))
        .collect()
}

/// Visible days for a month view: back-filled from the previous month and
/// forward-filled into the next so the grid is whole weeks.
///
/// Returns `None` when `year`/`month` do not name a real month.
pub fn month_grid(year: i32, month: u32) -> Option<Vec<NaiveDate>> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let last = first.checked_add_months(Months::new(1))? - Duration::days(1);

    let grid_start = week_start(first);
    let trailing = (DAYS_PER_WEEK as u32 - 1) - weekday_index(last);
    let grid_end = last + Duration::days(i64::from(trailing));

    Some(
        grid_start
            .iter_days()
            .take_while(|day| *day <= grid_end)
            .collect(),
    )
}

pub fn is_in_month(day: NaiveDate, year: i32, month: u32) -> bool {
    day.year() == year && day.month() == month
}

pub fn visible_dates(view: CalendarView, reference: NaiveDate) -> Vec<NaiveDate> {
    match view {
        CalendarView::Week => week_grid(reference),
        CalendarView::Month => {
            month_grid(reference.year(), reference.month()).unwrap_or_else(|| week_grid(reference))
        }
    }
}

/// Moves the reference date by `step` months or weeks. Month steps clamp the
/// day to the end of the target month. A step that leaves the representable
/// date range returns `reference` unchanged.
pub fn navigate(view: CalendarView, reference: NaiveDate, step: i32) -> NaiveDate {
    match view {
        CalendarView::Week => Duration::try_weeks(i64::from(step))
            .and_then(|delta| reference.checked_add_signed(delta))
            .unwrap_or(reference),
        CalendarView::Month => {
            let months = Months::new(step.unsigned_abs());
            let shifted = if step >= 0 {
                reference.checked_add_months(months)
            } else {
                reference.checked_sub_months(months)
            };
            shifted.unwrap_or(reference)
        }
    }
}
