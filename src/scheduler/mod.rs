pub mod assignment;
pub mod planner;

pub use assignment::{Assignment, PreviousAssignment};
pub use planner::{plan_dynamic, plan_static, ShardAssignmentPlanner};
