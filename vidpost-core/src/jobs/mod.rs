mod model;
mod sheet;

pub use model::{Job, JobFields, SaveMode};
pub use sheet::{JobSheet, RawJob, RowIssue, ScheduleFlag, SheetError, SCHEDULE_TIME_FORMAT};
