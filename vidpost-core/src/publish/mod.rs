//! Publishing jobs on the upload surface.

mod dispatcher;
mod error;
mod fields;
mod navigate;
mod pipeline;
mod probe;
mod schedule;
mod session;

pub use dispatcher::{worker_count, DispatchMode, Dispatcher};
pub use error::{Phase, PhaseFailure, PublishError, PublishResult};
pub use pipeline::{JobPipeline, PageLease};
pub use schedule::{parse_panel_label, parse_year_label, YearMonth};
pub use session::{filter_storage, AuthState, SessionManager};
