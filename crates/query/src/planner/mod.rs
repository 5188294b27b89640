//! Binding and physical planning.

mod binder;
mod explain;
mod physical;
mod query_planner;

pub use explain::explain;
pub use physical::{
    AggSpec, Field, LeafFilter, PhysExpr, PhysExprId, PlanId, PlanNode, PlanOp, PlanOutcome, Schema, SortKey,
    WindowOrder, WindowSpec,
};
pub use query_planner::{DmlBinding, QueryPlanner};
