//! Limit executor.

use super::{BlockOperator, ExecContext};
use alloc::boxed::Box;
use strata_core::block::{RowBlock, SelectionVector};
use strata_core::Result;

/// Skips `offset` visible rows, then passes at most `limit` rows.
///
/// Stops pulling from its input once the limit is reached.
pub struct LimitExecutor {
    input: Box<dyn BlockOperator>,
    limit: Option<u64>,
    offset: u64,
    skipped: u64,
    emitted: u64,
}

impl LimitExecutor {
    pub fn new(input: Box<dyn BlockOperator>, limit: Option<u64>, offset: u64) -> Self {
        Self {
            input,
            limit,
            offset,
            skipped: 0,
            emitted: 0,
        }
    }

    fn exhausted(&self) -> bool {
        self.limit.is_some_and(|l| self.emitted >= l)
    }
}

impl BlockOperator for LimitExecutor {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.skipped = 0;
        self.emitted = 0;
        if self.limit == Some(0) {
            return Ok(());
        }
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<RowBlock>> {
        if self.exhausted() {
            return Ok(None);
        }
        loop {
            let Some(block) = self.input.next(ctx)? else {
                return Ok(None);
            };
            let visible = block.row_count() as u64;
            let skip = (self.offset - self.skipped).min(visible);
            self.skipped += skip;
            let available = visible - skip;
            if available == 0 {
                continue;
            }
            let take = match self.limit {
                Some(l) => available.min(l - self.emitted),
                None => available,
            };
            self.emitted += take;
            if skip == 0 && take == visible {
                return Ok(Some(block));
            }
            let mut selection: SelectionVector = match block.selection() {
                Some(sel) => sel.skip(skip as usize),
                None => SelectionVector::all(block.physical_len()).skip(skip as usize),
            };
            selection.truncate(take as usize);
            return Ok(Some(block.with_selection(selection)));
        }
    }

    fn close(&mut self) {
        if self.limit != Some(0) {
            self.input.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::QueryArena;
    use crate::config::EngineConfig;
    use crate::executor::test_util::{ints, run, BlocksSource};
    use alloc::vec::Vec;
    use strata_core::DataType;
    use strata_storage::Database;

    fn run_limit(n: i64, limit: Option<u64>, offset: u64) -> Vec<Vec<strata_core::Value>> {
        let db = Database::new();
        let arena = QueryArena::new();
        let config = EngineConfig::default();
        let ctx = ExecContext::new(&db, &arena, &config);
        let values: Vec<i64> = (0..n).collect();
        let source = BlocksSource::rows(&[DataType::Int64], &ints(&values));
        let mut limit_exec = LimitExecutor::new(Box::new(source), limit, offset);
        run(&mut limit_exec, &ctx)
    }

    #[test]
    fn test_limit_offset() {
        assert_eq!(run_limit(10, Some(3), 2), ints(&[2, 3, 4]));
        assert_eq!(run_limit(10, None, 8), ints(&[8, 9]));
        assert_eq!(run_limit(10, Some(5), 20), ints(&[]));
        assert_eq!(run_limit(10, Some(0), 0), ints(&[]));
        assert_eq!(run_limit(3, Some(10), 0), ints(&[0, 1, 2]));
    }

    #[test]
    fn test_limit_offset_extremes() {
        assert_eq!(run_limit(4, Some(u64::MAX), 1), ints(&[1, 2, 3]));
        assert_eq!(run_limit(4, Some(u64::MAX), u64::MAX), ints(&[]));
        assert_eq!(run_limit(4, None, u64::MAX), ints(&[]));
        assert_eq!(run_limit(4, Some(1), u64::MAX - 1), ints(&[]));
        assert_eq!(run_limit(4, Some(u64::MAX - 1), 3), ints(&[3]));
    }
}
