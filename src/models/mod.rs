mod visit;

pub use visit::{IpCount, NewVisit, RecordOutcome, Visit, VisitCounts};
