//! Stage 1: peeling.
//!
//! Columns move through three states: unmarked, peeled (solved by a single
//! row), or deferred (left for Gaussian elimination).  Each arriving row
//! registers itself in the reference list of every column it touches and
//! counts how many of them are still unmarked; a count of one solves that
//! column and triggers an avalanche through every row referencing it.
//! Greedy peeling then defers the columns most likely to unlock further
//! avalanches until nothing is unmarked.

use super::{Codec, Mark, LIST_TERM};
use crate::tables::REF_LIST_MAX;

impl Codec {
    /// Register a new row and peel opportunistically.
    ///
    /// The row value must already sit in the input staging area.  Returns
    /// false when a column's reference list overflows; the row is fully
    /// unregistered in that case and the caller must wait for a row that
    /// touches different columns.
    pub(super) fn opportunistic_peeling(&mut self, row_i: u16, row_seed: u32) -> bool {
        let params = self.row_params(row_seed);
        {
            let row = &mut self.peel_rows[row_i as usize];
            row.recovery_id = row_seed;
            row.params = params;
            row.is_copied = false;
            row.peel_column = LIST_TERM;
        }

        let mut unmarked_count = 0usize;
        let mut unmarked = [0u16; 2];

        for column_i in self.peel_iter(&params) {
            let refs = &mut self.peel_col_refs[column_i as usize];
            if refs.row_count as usize >= REF_LIST_MAX {
                self.fix_peel_failure(row_i, column_i);
                return false;
            }
            refs.rows[refs.row_count as usize] = row_i;
            refs.row_count += 1;

            if self.peel_cols[column_i as usize].mark == Mark::Todo {
                unmarked[unmarked_count & 1] = column_i;
                unmarked_count += 1;
            }
        }

        self.peel_rows[row_i as usize].unmarked_count = unmarked_count as u16;

        match unmarked_count {
            0 => {
                // Nothing left to solve: defer for Gaussian elimination
                self.peel_rows[row_i as usize].next_row = self.defer_head_rows;
                self.defer_head_rows = row_i;
            }
            1 => self.solve_with_peel(row_i, unmarked[0]),
            2 => {
                let row = &mut self.peel_rows[row_i as usize];
                row.unmarked = unmarked;
                self.peel_cols[unmarked[0] as usize].w2_refs += 1;
                self.peel_cols[unmarked[1] as usize].w2_refs += 1;
            }
            _ => {}
        }

        true
    }

    /// Unregister the columns a failed row already touched, stopping at the
    /// column whose reference list overflowed.
    fn fix_peel_failure(&mut self, row_i: u16, fail_column_i: u16) {
        let params = self.peel_rows[row_i as usize].params;
        for column in self.peel_iter(&params) {
            if column == fail_column_i {
                break;
            }
            self.peel_col_refs[column as usize].row_count -= 1;
        }
    }

    /// Propagate a newly solved column through every row that references
    /// it, recursively solving columns whose rows drop to one unmarked.
    pub(super) fn peel_avalanche_on_solve(&mut self, column_i: u16) {
        // The reference list cannot grow during the avalanche
        let refs = self.peel_col_refs[column_i as usize];

        for k in 0..refs.row_count as usize {
            let ref_row_i = refs.rows[k];

            let unmarked_count = {
                let ref_row = &mut self.peel_rows[ref_row_i as usize];
                // Rows already solved or force-retired may wrap past zero;
                // only the values 1 and 2 are meaningful.
                ref_row.unmarked_count = ref_row.unmarked_count.wrapping_sub(1);
                ref_row.unmarked_count
            };

            if unmarked_count == 1 {
                let ref_row = &self.peel_rows[ref_row_i as usize];
                let mut new_column_i = ref_row.unmarked[0];
                if new_column_i == column_i {
                    new_column_i = ref_row.unmarked[1];
                }

                if self.peel_cols[new_column_i as usize].mark == Mark::Todo {
                    self.solve_with_peel(ref_row_i, new_column_i);
                    continue;
                }

                // Both remaining columns already handled: defer the row
                self.peel_rows[ref_row_i as usize].next_row = self.defer_head_rows;
                self.defer_head_rows = ref_row_i;
            } else if unmarked_count == 2 {
                // Regenerate the columns to discover which two are unmarked
                let params = self.peel_rows[ref_row_i as usize].params;
                let mut store_count = 0usize;
                let mut stored = [0u16; 2];

                for ref_column_i in self.peel_iter(&params) {
                    let col = &mut self.peel_cols[ref_column_i as usize];
                    if col.mark == Mark::Todo {
                        if store_count < 2 {
                            stored[store_count] = ref_column_i;
                        }
                        store_count += 1;
                        col.w2_refs += 1;
                    }
                }

                self.peel_rows[ref_row_i as usize].unmarked = stored;

                // The count can run ahead of the truth for rows seen here
                // before; with fewer than two really unmarked, resolve now.
                if store_count <= 1 {
                    self.peel_rows[ref_row_i as usize].unmarked_count = 0;

                    if store_count == 1 {
                        self.solve_with_peel(ref_row_i, stored[0]);
                        continue;
                    }

                    self.peel_rows[ref_row_i as usize].next_row = self.defer_head_rows;
                    self.defer_head_rows = ref_row_i;
                }
            }
        }
    }

    /// Mark `column_i` solved by `row_i` and run the avalanche.
    fn solve_with_peel(&mut self, row_i: u16, column_i: u16) {
        self.peel_cols[column_i as usize].mark = Mark::Peel;

        {
            let row = &mut self.peel_rows[row_i as usize];
            row.peel_column = column_i;
            row.is_copied = false;
        }

        // Link at the back of the peeled list: forward solution order
        if self.peel_tail_rows != LIST_TERM {
            self.peel_rows[self.peel_tail_rows as usize].next_row = row_i;
        } else {
            self.peel_head_rows = row_i;
        }
        self.peel_rows[row_i as usize].next_row = LIST_TERM;
        self.peel_tail_rows = row_i;

        self.peel_avalanche_on_solve(column_i);

        self.peel_cols[column_i as usize].peel_row = row_i;
    }

    /// Stage 1 completion: repeatedly defer the unmarked column with the
    /// most weight-2 references (ties broken on total references) and
    /// avalanche as if it had been solved, until no column is unmarked.
    pub(super) fn greedy_peeling(&mut self) {
        self.defer_head_columns = LIST_TERM;
        self.defer_count = 0;

        let block_count = self.block_count as usize;

        loop {
            let mut best_column_i = LIST_TERM;
            let mut best_w2_refs = 0usize;
            let mut best_row_count = 0usize;

            for column_i in 0..block_count {
                let column = &self.peel_cols[column_i];
                if column.mark != Mark::Todo {
                    continue;
                }
                let w2_refs = column.w2_refs as usize;
                if w2_refs >= best_w2_refs {
                    let row_count = self.peel_col_refs[column_i].row_count as usize;
                    if w2_refs > best_w2_refs || row_count >= best_row_count {
                        best_column_i = column_i as u16;
                        best_w2_refs = w2_refs;
                        best_row_count = row_count;
                    }
                }
            }

            if best_column_i == LIST_TERM {
                break;
            }

            {
                let best = &mut self.peel_cols[best_column_i as usize];
                best.mark = Mark::Defer;
                best.next = self.defer_head_columns;
            }
            self.defer_count += 1;
            self.defer_head_columns = best_column_i;

            self.peel_avalanche_on_solve(best_column_i);
        }
    }
}
