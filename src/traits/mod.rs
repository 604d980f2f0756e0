pub mod calendar;
pub mod report;
pub mod worker;

pub use calendar::{AlwaysOpen, MarketCalendar, WeekdayCalendar};
pub use report::ReportAggregator;
pub use worker::{TaskPayload, WorkerCapability};
