//! Text rendering of physical plans.

use super::physical::{PhysExpr, PlanId, PlanOp};
use crate::arena::QueryArena;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

/// Renders the plan rooted at `plan` as an indented operator tree, one node
/// per line with its row estimate.
pub fn explain(arena: &QueryArena, plan: PlanId) -> String {
    let mut out = String::new();
    render(arena, plan, 0, &mut out);
    out
}

fn render(arena: &QueryArena, id: PlanId, depth: usize, out: &mut String) {
    let node = &arena.plan_nodes[id];
    for _ in 0..depth {
        out.push_str("  ");
    }
    let _ = writeln!(out, "{} (rows={})", describe(arena, id), libm::round(node.estimated_rows) as u64);
    if let PlanOp::CteMaterialize { step: Some(step), .. } = &node.op {
        render(arena, *step, depth + 1, out);
    }
    for child in [node.left, node.right].into_iter().flatten() {
        render(arena, child, depth + 1, out);
    }
}

fn describe(arena: &QueryArena, id: PlanId) -> String {
    let node = &arena.plan_nodes[id];
    let column = |plan: Option<PlanId>, c: usize| -> String {
        plan.and_then(|p| arena.plan_nodes[p].schema.field(c).map(|f| f.name.clone()))
            .unwrap_or_else(|| alloc::format!("#{}", c))
    };
    let own = |c: usize| -> String { node.schema.field(c).map_or_else(|| alloc::format!("#{}", c), |f| f.name.clone()) };
    let mut s = String::from(node.op.name());
    match &node.op {
        PlanOp::SeqScan { table, leaf_filters } => {
            let _ = write!(s, " on {}", table);
            if !leaf_filters.is_empty() {
                let filters: Vec<String> = leaf_filters
                    .iter()
                    .map(|f| alloc::format!("{} {} {}", own(f.column), f.op.symbol(), f.value))
                    .collect();
                let _ = write!(s, " [{}]", filters.join(" AND "));
            }
        }
        PlanOp::IndexScan { table, column: c, key } => {
            let _ = write!(s, " on {} ({} = {})", table, own(*c), key);
        }
        PlanOp::CteScan { name, .. } => {
            let _ = write!(s, " on {}", name);
        }
        PlanOp::Values { rows } => {
            let _ = write!(s, " ({} rows)", rows.len());
        }
        PlanOp::Project { .. } | PlanOp::ExprProject { .. } => {
            let _ = write!(s, " [{}]", node.schema.names().join(", "));
        }
        PlanOp::Sort { keys } | PlanOp::TopN { keys, .. } => {
            let keys: Vec<String> = keys
                .iter()
                .map(|k| {
                    let dir = if k.descending { "DESC" } else { "ASC" };
                    alloc::format!("{} {}", column(node.left, k.column), dir)
                })
                .collect();
            let _ = write!(s, " [{}]", keys.join(", "));
            if let PlanOp::TopN { limit, offset, .. } = &node.op {
                let _ = write!(s, " limit={} offset={}", limit, offset);
            }
        }
        PlanOp::Limit { limit, offset } => {
            match limit {
                Some(l) => {
                    let _ = write!(s, " limit={}", l);
                }
                None => s.push_str(" limit=all"),
            }
            let _ = write!(s, " offset={}", offset);
        }
        PlanOp::HashJoin {
            kind,
            left_keys,
            build_left,
            residual,
            ..
        } => {
            let side = if *build_left { "left" } else { "right" };
            let _ = write!(s, " {} keys={} build={}", kind.name(), left_keys.len(), side);
            if residual.is_some() {
                s.push_str(" +residual");
            }
        }
        PlanOp::NestedLoopJoin { kind, .. } => {
            let _ = write!(s, " {}", kind.name());
        }
        PlanOp::HashSemiJoin { anti, probe_key, .. } => {
            if *anti {
                s = String::from("HashAntiJoin");
            }
            if let PhysExpr::Column(c) = arena.phys_exprs[*probe_key] {
                let _ = write!(s, " on {}", column(node.left, c));
            }
        }
        PlanOp::Aggregate {
            active, aggregates, ..
        } => {
            let names: Vec<&str> = aggregates.iter().map(|a| a.func.name()).collect();
            let _ = write!(
                s,
                " keys={}/{} [{}]",
                active.iter().filter(|a| **a).count(),
                active.len(),
                names.join(", ")
            );
        }
        PlanOp::Window { functions } => {
            let names: Vec<&str> = functions.iter().map(|f| f.func.name()).collect();
            let _ = write!(s, " [{}]", names.join(", "));
        }
        PlanOp::SetOp { op, all } => {
            let _ = write!(s, " {}{}", op.name(), if *all { " all" } else { "" });
        }
        PlanOp::CteMaterialize { name, step, .. } => {
            let _ = write!(s, " {}", name);
            if step.is_some() {
                s.push_str(" (recursive)");
            }
        }
        PlanOp::TableFunction { .. } | PlanOp::Filter { .. } | PlanOp::Distinct => {}
    }
    s
}
