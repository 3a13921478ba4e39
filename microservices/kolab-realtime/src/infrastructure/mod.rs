//! Infrastructure: persistence and notification adapters

mod report_store;

pub use report_store::{LumaDbReportStore, SkipDispatcher};
