// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::BTreeSet;

/// Answers whether a market trades on a given business date.
pub trait MarketCalendar: Send + Sync {
    fn is_open(&self, market: &str, date: NaiveDate) -> bool;
}

/// Monday to Friday, minus a shared holiday list.
#[derive(Debug, Clone, Default)]
pub struct WeekdayCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl WeekdayCalendar {
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }
}

impl MarketCalendar for WeekdayCalendar {
    fn is_open(&self, _market: &str, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }
}

/// Every day is a trading day.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOpen;

impl MarketCalendar for AlwaysOpen {
    fn is_open(&self, _market: &str, _date: NaiveDate) -> bool {
        true
    }
}
