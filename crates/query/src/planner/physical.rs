//! Physical plan definitions.
//!
//! A plan is a tree of [`PlanNode`]s in the arena. Nodes are immutable once
//! built; runtime state lives in the executor created for each node.
//! Expressions are bound to input column positions ([`PhysExpr`]).

use crate::arena::{Idx, IdxRange};
use crate::ast::{AggFunc, BinaryOp, CompareOp, JoinKind, ScalarFunc, SetOpKind, WindowFrame, WindowFunc};
use alloc::string::String;
use alloc::vec::Vec;
use strata_core::{DataType, Value};

pub type PlanId = Idx<PlanNode>;
pub type PhysExprId = Idx<PhysExpr>;

/// One output column of a plan node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    /// Table name or alias the column can be qualified with.
    pub qualifier: Option<String>,
    pub name: String,
    pub data_type: DataType,
}

impl Field {
    pub fn new(qualifier: Option<&str>, name: &str, data_type: DataType) -> Self {
        Self {
            qualifier: qualifier.map(String::from),
            name: String::from(name),
            data_type,
        }
    }
}

/// Output columns of a plan node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    #[inline]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[inline]
    pub fn field(&self, i: usize) -> Option<&Field> {
        self.fields.get(i)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn types(&self) -> Vec<DataType> {
        self.fields.iter().map(|f| f.data_type).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Same columns, all qualified by `alias`.
    pub fn requalify(&self, alias: &str) -> Schema {
        Schema::new(
            self.fields
                .iter()
                .map(|f| Field::new(Some(alias), &f.name, f.data_type))
                .collect(),
        )
    }

    /// Columns of `self` followed by those of `other`.
    pub fn join(&self, other: &Schema) -> Schema {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().cloned());
        Schema::new(fields)
    }

    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }
}

/// An expression bound to input positions.
#[derive(Clone, Debug, PartialEq)]
pub enum PhysExpr {
    /// Column of the current input row.
    Column(usize),
    /// Column of an enclosing query's current row; `depth` 1 is the nearest.
    Outer { depth: usize, column: usize },
    Literal(Value),
    Binary {
        op: BinaryOp,
        left: PhysExprId,
        right: PhysExprId,
    },
    Negate(PhysExprId),
    Function {
        func: ScalarFunc,
        args: IdxRange<PhysExprId>,
    },
    Case {
        operand: Option<PhysExprId>,
        branches: IdxRange<PhysExprId>,
        otherwise: Option<PhysExprId>,
    },
    Cast {
        expr: PhysExprId,
        to: DataType,
    },
    Compare {
        op: CompareOp,
        left: PhysExprId,
        right: PhysExprId,
    },
    And(PhysExprId, PhysExprId),
    Or(PhysExprId, PhysExprId),
    Not(PhysExprId),
    IsNull {
        expr: PhysExprId,
        negated: bool,
    },
    Between {
        expr: PhysExprId,
        low: PhysExprId,
        high: PhysExprId,
        negated: bool,
    },
    InList {
        expr: PhysExprId,
        list: IdxRange<PhysExprId>,
        negated: bool,
    },
    InSubquery {
        expr: PhysExprId,
        plan: PlanId,
        negated: bool,
        correlated: bool,
    },
    Exists {
        plan: PlanId,
        negated: bool,
        correlated: bool,
    },
    ScalarSubquery {
        plan: PlanId,
        correlated: bool,
    },
    Like {
        expr: PhysExprId,
        pattern: PhysExprId,
        case_insensitive: bool,
        negated: bool,
    },
}

/// A sort key over an input column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub column: usize,
    pub descending: bool,
    pub nulls_first: bool,
}

impl SortKey {
    /// Key with the default null placement for the direction.
    pub fn new(column: usize, descending: bool) -> Self {
        Self {
            column,
            descending,
            nulls_first: descending,
        }
    }
}

/// `column <op> literal`, evaluated inside the scan.
#[derive(Clone, Debug, PartialEq)]
pub struct LeafFilter {
    pub column: usize,
    pub op: CompareOp,
    pub value: Value,
}

/// One aggregate computed by an aggregate node.
#[derive(Clone, Debug, PartialEq)]
pub struct AggSpec {
    pub func: AggFunc,
    pub arg: Option<PhysExprId>,
    pub distinct: bool,
    pub separator: Option<PhysExprId>,
    /// Type of the argument (output type of MIN/MAX).
    pub input_type: DataType,
    pub output_type: DataType,
}

/// An ORDER BY key of a window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowOrder {
    pub expr: PhysExprId,
    pub descending: bool,
    pub nulls_first: bool,
}

/// One window function computed by a window node.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowSpec {
    pub func: WindowFunc,
    pub args: Vec<PhysExprId>,
    pub partition_by: Vec<PhysExprId>,
    pub order_by: Vec<WindowOrder>,
    /// Effective frame (defaults already applied).
    pub frame: WindowFrame,
    pub output_type: DataType,
}

/// Operator kind and parameters of a plan node.
#[derive(Clone, Debug, PartialEq)]
pub enum PlanOp {
    SeqScan {
        table: String,
        leaf_filters: Vec<LeafFilter>,
    },
    /// Point lookup on an indexed column.
    IndexScan {
        table: String,
        column: usize,
        key: Value,
    },
    /// Scan of a materialized common table expression.
    CteScan { slot: usize, name: String },
    /// Constant rows.
    Values { rows: Vec<Vec<Value>> },
    /// `generate_series(start, stop, step)`.
    TableFunction {
        start: PhysExprId,
        stop: PhysExprId,
        step: Option<PhysExprId>,
    },
    Filter { predicate: PhysExprId },
    /// Column subset, shares input columns.
    Project { columns: Vec<usize> },
    /// Computed columns.
    ExprProject { exprs: Vec<PhysExprId> },
    Sort { keys: Vec<SortKey> },
    /// Sort fused with LIMIT/OFFSET.
    TopN {
        keys: Vec<SortKey>,
        limit: u64,
        offset: u64,
    },
    Limit { limit: Option<u64>, offset: u64 },
    HashJoin {
        kind: JoinKind,
        left_keys: Vec<PhysExprId>,
        right_keys: Vec<PhysExprId>,
        /// Common type of each key pair.
        key_types: Vec<DataType>,
        /// Extra match condition over the joined row.
        residual: Option<PhysExprId>,
        build_left: bool,
    },
    NestedLoopJoin {
        kind: JoinKind,
        condition: Option<PhysExprId>,
    },
    /// Keeps probe (left) rows whose key is (or, when `anti`, is not) in the right input.
    HashSemiJoin {
        probe_key: PhysExprId,
        key_type: DataType,
        anti: bool,
    },
    Aggregate {
        group_by: Vec<PhysExprId>,
        /// Grouping-set mask; inactive keys output NULL.
        active: Vec<bool>,
        aggregates: Vec<AggSpec>,
    },
    /// Appends one column per function to its input.
    Window { functions: Vec<WindowSpec> },
    SetOp { op: SetOpKind, all: bool },
    Distinct,
    /// Materializes the right child into CTE `slot`, then streams the left child.
    CteMaterialize {
        slot: usize,
        name: String,
        /// Recursive step, re-run until no new rows appear.
        step: Option<PlanId>,
        union_all: bool,
    },
}

impl PlanOp {
    /// Operator name used by EXPLAIN.
    pub fn name(&self) -> &'static str {
        match self {
            PlanOp::SeqScan { .. } => "SeqScan",
            PlanOp::IndexScan { .. } => "IndexScan",
            PlanOp::CteScan { .. } => "CteScan",
            PlanOp::Values { .. } => "Values",
            PlanOp::TableFunction { .. } => "TableFunction",
            PlanOp::Filter { .. } => "Filter",
            PlanOp::Project { .. } => "Project",
            PlanOp::ExprProject { .. } => "ExprProject",
            PlanOp::Sort { .. } => "Sort",
            PlanOp::TopN { .. } => "TopN",
            PlanOp::Limit { .. } => "Limit",
            PlanOp::HashJoin { .. } => "HashJoin",
            PlanOp::NestedLoopJoin { .. } => "NestedLoopJoin",
            PlanOp::HashSemiJoin { .. } => "HashSemiJoin",
            PlanOp::Aggregate { .. } => "Aggregate",
            PlanOp::Window { .. } => "Window",
            PlanOp::SetOp { .. } => "SetOp",
            PlanOp::Distinct => "Distinct",
            PlanOp::CteMaterialize { .. } => "CteMaterialize",
        }
    }
}

/// A node of the physical plan.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanNode {
    pub op: PlanOp,
    pub left: Option<PlanId>,
    pub right: Option<PlanId>,
    pub schema: Schema,
    pub estimated_rows: f64,
}

/// Result of planning.
#[derive(Clone, Debug, PartialEq)]
pub enum PlanOutcome {
    Planned(PlanId),
    /// The query uses a construct the block engine does not support; the
    /// caller should fall back to another execution path.
    NotImplemented { reason: String },
}

impl PlanOutcome {
    pub fn plan(&self) -> Option<PlanId> {
        match self {
            PlanOutcome::Planned(id) => Some(*id),
            PlanOutcome::NotImplemented { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_schema_join_and_requalify() {
        let left = Schema::new(vec![Field::new(Some("a"), "x", DataType::Int32)]);
        let right = Schema::new(vec![Field::new(Some("b"), "y", DataType::Text)]);
        let joined = left.join(&right);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.types(), vec![DataType::Int32, DataType::Text]);
        let derived = joined.requalify("d");
        assert!(derived.fields().iter().all(|f| f.qualifier.as_deref() == Some("d")));
    }

    #[test]
    fn test_default_null_order() {
        assert!(!SortKey::new(0, false).nulls_first);
        assert!(SortKey::new(0, true).nulls_first);
    }
}
