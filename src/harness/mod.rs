//! The assessment itself: records, budgets, evaluation and the coordinator
//! that ties them to live probes.

mod budget;
mod coordinator;
mod evaluate;
mod record;
mod report;

pub use budget::{ViolationBudget, ViolationKind};
pub use coordinator::{Coordinator, Phase};
pub use evaluate::{Evaluation, evaluate, static_page};
pub use record::ConnectionRecord;
pub use report::{Assertion, Category, Report, Summary};
