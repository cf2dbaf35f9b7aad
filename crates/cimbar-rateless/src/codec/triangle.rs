//! Stage 3: triangularization.
//!
//! Gaussian elimination over the GE matrix, pivoting by swapping indices
//! in the pivot array rather than moving row memory.  Heavy rows are kept
//! at the tail of the pivot array so they are only chosen when no binary
//! row has the needed bit; eliminating with a heavy pivot normalizes via
//! GF(256) division.  Elimination deliberately leaves a record of every
//! row addition in the sub-diagonal bits (and eliminator bytes in the
//! heavy matrix) so the substitution stage can replay the same operations
//! on block values.
//!
//! When no pivot exists the current column is checkpointed in
//! `next_pivot`; a later row can resume the search without redoing any
//! completed work.

use super::{Codec, DecodeStatus, Mark};
use crate::tables::HEAVY_ROWS;
use crate::CodecError;

impl Codec {
    /// Initialize the pivot array with the non-heavy rows.
    pub(super) fn setup_triangle(&mut self) {
        let pivot_count = (self.defer_count + self.dense_count) as usize;
        for (pivot_i, pivot) in self.pivots.iter_mut().enumerate().take(pivot_count) {
            *pivot = pivot_i as u16;
        }

        self.next_pivot = 0;
        self.pivot_count = pivot_count;
        self.first_heavy_pivot = pivot_count;

        // Tiny matrices may need heavy rows from the first column
        if self.first_heavy_column == 0 {
            self.insert_heavy_rows();
        }
    }

    /// Convert remaining extra rows to heavy form and append the heavy
    /// rows to the pivot list, so they are always tried last.
    pub(super) fn insert_heavy_rows(&mut self) {
        let mut first_heavy_pivot = self.pivot_count;
        let column_count = (self.defer_count + self.mix_count) as usize;
        let first_heavy_row = (self.defer_count + self.dense_count) as usize;

        for pivot_j in (0..self.pivot_count).rev() {
            let ge_row_j = self.pivots[pivot_j] as usize;

            // Only extra rows move into the heavy region
            if ge_row_j < first_heavy_row {
                continue;
            }

            // Unused extra pivots swap to the heavy end of the list
            if pivot_j >= self.next_pivot {
                first_heavy_pivot -= 1;
                self.pivots[pivot_j] = self.pivots[first_heavy_pivot];
                self.pivots[first_heavy_pivot] = ge_row_j as u16;
            }

            // Copy the row's heavy-region bits into the heavy matrix
            let h_off = self.heavy_pitch * (ge_row_j - first_heavy_row);
            let g_off = self.ge_pitch * ge_row_j;
            for ge_column_j in self.first_heavy_column..column_count {
                let bit = (self.ge_matrix[g_off + (ge_column_j >> 6)] >> (ge_column_j & 63)) & 1;
                self.heavy_matrix[h_off + ge_column_j - self.first_heavy_column] = bit as u8;
            }
        }

        self.first_heavy_pivot = first_heavy_pivot;

        for heavy_i in 0..HEAVY_ROWS {
            self.pivots[self.pivot_count + heavy_i] =
                (first_heavy_row + self.extra_count as usize + heavy_i) as u16;
        }
        self.pivot_count += HEAVY_ROWS;
    }

    /// Triangularize the columns left of the heavy region.  Returns false
    /// with `next_pivot` checkpointed when no pivot is found.
    fn triangle_non_heavy(&mut self) -> bool {
        let pivot_count = self.pivot_count;
        let first_heavy_column = self.first_heavy_column;
        let pitch = self.ge_pitch;

        let mut pivot_i = self.next_pivot;

        while pivot_i < first_heavy_column {
            let word_offset = pivot_i >> 6;
            let ge_mask = 1u64 << (pivot_i & 63);

            let mut found = false;

            for pivot_j in pivot_i..pivot_count {
                let ge_row_j = self.pivots[pivot_j] as usize;
                let off_j = pitch * ge_row_j + word_offset;

                if self.ge_matrix[off_j] & ge_mask == 0 {
                    continue;
                }
                found = true;

                self.pivots[pivot_j] = self.pivots[pivot_i];
                self.pivots[pivot_i] = ge_row_j as u16;

                // Masked first word: clears the pivot bit in this row's
                // image so the remaining rows keep it as an op record
                let row0 = (self.ge_matrix[off_j] & !(ge_mask - 1)) ^ ge_mask;

                for pivot_k in (pivot_j + 1)..pivot_count {
                    let ge_row_k = self.pivots[pivot_k] as usize;
                    let off_k = pitch * ge_row_k + word_offset;

                    if self.ge_matrix[off_k] & ge_mask != 0 {
                        self.ge_matrix[off_k] ^= row0;
                        for ii in 1..(pitch - word_offset) {
                            let v = self.ge_matrix[off_j + ii];
                            self.ge_matrix[off_k + ii] ^= v;
                        }
                    }
                }
                break;
            }

            if !found {
                self.next_pivot = pivot_i;
                return false;
            }

            pivot_i += 1;
        }

        self.next_pivot = pivot_i;
        self.insert_heavy_rows();
        true
    }

    /// Full triangularization; resumable at `next_pivot`.
    pub(super) fn triangle(&mut self) -> bool {
        let first_heavy_column = self.first_heavy_column;

        if self.next_pivot < first_heavy_column && !self.triangle_non_heavy() {
            return false;
        }

        let pivot_count = self.pivot_count;
        let column_count = (self.defer_count + self.mix_count) as usize;
        let first_heavy_row = (self.defer_count + self.dense_count) as usize;
        let pitch = self.ge_pitch;
        let mut first_heavy_pivot = self.first_heavy_pivot;

        let mut pivot_i = self.next_pivot;

        while pivot_i < column_count {
            let heavy_col_i = pivot_i - first_heavy_column;
            let word_offset = pivot_i >> 6;
            let ge_mask = 1u64 << (pivot_i & 63);

            let mut found = false;
            let mut pivot_j = pivot_i;

            // Light rows first
            while pivot_j < first_heavy_pivot {
                let ge_row_j = self.pivots[pivot_j] as usize;
                let off_j = pitch * ge_row_j + word_offset;

                if self.ge_matrix[off_j] & ge_mask == 0 {
                    pivot_j += 1;
                    continue;
                }
                found = true;

                self.pivots[pivot_j] = self.pivots[pivot_i];
                self.pivots[pivot_i] = ge_row_j as u16;

                let row0 = (self.ge_matrix[off_j] & !(ge_mask - 1)) ^ ge_mask;

                let mut pivot_k = pivot_j + 1;

                // Remaining light rows: plain word XOR
                while pivot_k < first_heavy_pivot {
                    let ge_row_k = self.pivots[pivot_k] as usize;
                    let off_k = pitch * ge_row_k + word_offset;

                    if self.ge_matrix[off_k] & ge_mask != 0 {
                        self.ge_matrix[off_k] ^= row0;
                        for ii in 1..(pitch - word_offset) {
                            let v = self.ge_matrix[off_j + ii];
                            self.ge_matrix[off_k + ii] ^= v;
                        }
                    }
                    pivot_k += 1;
                }

                // Remaining heavy rows: scatter the binary pivot row into
                // the heavy bytes, scaled by each row's column value
                while pivot_k < pivot_count {
                    let heavy_row_k = self.pivots[pivot_k] as usize - first_heavy_row;
                    let h_off = self.heavy_pitch * heavy_row_k;
                    let code_value = self.heavy_matrix[h_off + heavy_col_i];

                    if code_value != 0 {
                        let p_off = pitch * ge_row_j;
                        for ge_column in (pivot_i + 1)..column_count {
                            let mask = 1u64 << (ge_column & 63);
                            if self.ge_matrix[p_off + (ge_column >> 6)] & mask != 0 {
                                self.heavy_matrix[h_off + ge_column - first_heavy_column] ^=
                                    code_value;
                            }
                        }
                    }
                    pivot_k += 1;
                }
                break;
            }

            // Heavy rows as a pivot fallback
            if !found {
                while pivot_j < pivot_count {
                    let ge_row_j = self.pivots[pivot_j] as usize;
                    let heavy_row_j = ge_row_j - first_heavy_row;
                    let code_value = self.heavy_at(heavy_row_j, heavy_col_i);

                    if code_value == 0 {
                        pivot_j += 1;
                        continue;
                    }
                    found = true;

                    self.pivots[pivot_j] = self.pivots[pivot_i];
                    self.pivots[pivot_i] = ge_row_j as u16;

                    // Keep the heavy region contiguous at the list tail
                    if pivot_i < first_heavy_pivot {
                        let temp = self.pivots[first_heavy_pivot];
                        self.pivots[first_heavy_pivot] = self.pivots[pivot_j];
                        self.pivots[pivot_j] = temp;
                        first_heavy_pivot += 1;
                    }

                    // All remaining rows are heavy by list organization
                    for pivot_k in (pivot_j + 1)..pivot_count {
                        let heavy_row_k = self.pivots[pivot_k] as usize - first_heavy_row;
                        let rem_off = self.heavy_pitch * heavy_row_k;
                        let rem_value = self.heavy_matrix[rem_off + heavy_col_i];

                        if rem_value == 0 {
                            continue;
                        }

                        let x = self.gf.div(rem_value, code_value);

                        // Eliminator recorded for the substitution stage
                        self.heavy_matrix[rem_off + heavy_col_i] = x;

                        let offset = heavy_col_i + 1;
                        let hc = self.heavy_columns;
                        let gf = self.gf;
                        let (rem, piv) = self.heavy2(heavy_row_k, heavy_row_j);
                        gf.muladd_mem(&mut rem[offset..hc], x, &piv[offset..hc]);
                    }
                    break;
                }
            }

            if !found {
                self.next_pivot = pivot_i;
                self.first_heavy_pivot = first_heavy_pivot;
                return false;
            }

            pivot_i += 1;
        }

        true
    }

    /// Feed a post-N row into the GE solver.
    ///
    /// The row is staged in the GE matrix (or recycled into an unused
    /// extra slot), pre-eliminated against every pivot already found, and
    /// then triangularization resumes at the checkpoint.
    pub(super) fn resume_solve_matrix(
        &mut self,
        id: u32,
        data: &[u8],
    ) -> Result<DecodeStatus, CodecError> {
        let first_heavy_row = (self.defer_count + self.dense_count) as usize;
        let pitch = self.ge_pitch;

        let (row_i, ge_row_i, new_pivot_i);

        if self.row_count >= self.block_count + self.extra_count {
            // Recycle an extra slot that never became a pivot
            let mut reuse = None;
            for pivot_i in self.next_pivot..self.pivot_count {
                let ge_row_k = self.pivots[pivot_i] as usize;
                if ge_row_k >= first_heavy_row
                    && ge_row_k < first_heavy_row + self.extra_count as usize
                {
                    reuse = Some(pivot_i);
                    break;
                }
            }
            let Some(pivot_i) = reuse else {
                return Err(CodecError::ExtraInsufficient);
            };
            new_pivot_i = pivot_i;
            ge_row_i = self.pivots[pivot_i] as usize;
            row_i = self.ge_row_map[ge_row_i] as usize;
        } else {
            new_pivot_i = self.pivot_count;
            self.pivot_count += 1;
            row_i = self.row_count as usize;
            self.row_count += 1;
            ge_row_i = first_heavy_row + row_i - self.block_count as usize;
            self.ge_row_map[ge_row_i] = row_i as u16;
            self.pivots[new_pivot_i] = ge_row_i as u16;
        }

        self.peel_rows[row_i].recovery_id = id;

        // Stage the block data
        let bb = self.block_bytes;
        let final_bytes = self.output_final_bytes;
        {
            let dest = &mut self.input_blocks[row_i * bb..(row_i + 1) * bb];
            if id != self.block_count as u32 - 1 {
                dest.copy_from_slice(&data[..bb]);
            } else {
                dest[..final_bytes].copy_from_slice(&data[..final_bytes]);
                dest[final_bytes..].fill(0);
            }
        }

        // Regenerate the row's GE image
        let off = pitch * ge_row_i;
        for j in 0..pitch {
            self.ge_matrix[off + j] = 0;
        }

        let params = self.row_params(id);
        self.peel_rows[row_i].params = params;

        for c in self.mix_cols(&params) {
            let col = c as usize + self.defer_count as usize;
            self.ge_matrix[off + (col >> 6)] ^= 1u64 << (col & 63);
        }

        for column in self.peel_iter(&params) {
            let col = self.peel_cols[column as usize];
            if col.mark == Mark::Peel {
                self.xor_compress_into_ge(ge_row_i, col.peel_row as usize);
            } else {
                let gc = col.ge_column as usize;
                self.ge_matrix[off + (gc >> 6)] ^= 1u64 << (gc & 63);
            }
        }

        // Pre-eliminate against found pivots below the heavy region
        let light_limit = self.next_pivot.min(self.first_heavy_column);
        for pivot_j in 0..light_limit {
            let word_offset = pivot_j >> 6;
            let mask = 1u64 << (pivot_j & 63);

            if self.ge_matrix[off + word_offset] & mask != 0 {
                let ge_row_j = self.pivots[pivot_j] as usize;
                let src = pitch * ge_row_j + word_offset;
                let row0 = (self.ge_matrix[src] & !(mask - 1)) ^ mask;

                self.ge_matrix[off + word_offset] ^= row0;
                for ii in 1..(pitch - word_offset) {
                    let v = self.ge_matrix[src + ii];
                    self.ge_matrix[off + word_offset + ii] ^= v;
                }
            }
        }

        if self.next_pivot < self.first_heavy_column {
            // The next missing pivot must appear on this row
            let bit = self.ge_matrix[off + (self.next_pivot >> 6)]
                & (1u64 << (self.next_pivot & 63));
            if bit == 0 {
                return Ok(DecodeStatus::NeedMore);
            }

            self.pivots[new_pivot_i] = self.pivots[self.next_pivot];
            self.pivots[self.next_pivot] = ge_row_i as u16;
        } else {
            // Stage into the heavy matrix and pre-eliminate with GF(256)
            let column_count = (self.defer_count + self.mix_count) as usize;
            let heavy_row_i = ge_row_i - first_heavy_row;
            let h_off = self.heavy_pitch * heavy_row_i;

            for ge_column_j in self.first_heavy_column..column_count {
                let bit =
                    ((self.ge_matrix[off + (ge_column_j >> 6)] >> (ge_column_j & 63)) & 1) as u8;
                self.heavy_matrix[h_off + ge_column_j - self.first_heavy_column] = bit;
            }

            for pivot_j in self.first_heavy_column..self.next_pivot {
                let heavy_col_j = pivot_j - self.first_heavy_column;
                let code_value = self.heavy_matrix[h_off + heavy_col_j];
                if code_value == 0 {
                    continue;
                }

                let ge_row_j = self.pivots[pivot_j] as usize;

                if ge_row_j >= first_heavy_row {
                    let heavy_row_j = ge_row_j - first_heavy_row;
                    let pivot_code = self.heavy_at(heavy_row_j, heavy_col_j);
                    let start_column = heavy_col_j + 1;

                    let eliminator = if pivot_code == 1 {
                        code_value
                    } else {
                        let e = self.gf.div(code_value, pivot_code);
                        self.heavy_matrix[h_off + heavy_col_j] = e;
                        e
                    };

                    let hc = self.heavy_columns;
                    let gf = self.gf;
                    let (dst, src) = self.heavy2(heavy_row_i, heavy_row_j);
                    gf.muladd_mem(&mut dst[start_column..hc], eliminator, &src[start_column..hc]);
                } else {
                    let src = pitch * ge_row_j;
                    for ge_column_k in (pivot_j + 1)..column_count {
                        let mask = 1u64 << (ge_column_k & 63);
                        if self.ge_matrix[src + (ge_column_k >> 6)] & mask != 0 {
                            self.heavy_matrix[h_off + ge_column_k - self.first_heavy_column] ^=
                                code_value;
                        }
                    }
                }
            }

            let next_heavy_col = self.next_pivot - self.first_heavy_column;
            if self.heavy_matrix[h_off + next_heavy_col] == 0 {
                return Ok(DecodeStatus::NeedMore);
            }

            if self.next_pivot < self.first_heavy_pivot {
                // A non-heavy pivot slot is being taken by a heavy row
                self.pivots[new_pivot_i] = self.pivots[self.first_heavy_pivot];
                self.pivots[self.first_heavy_pivot] = self.pivots[self.next_pivot];
                self.first_heavy_pivot += 1;
            } else {
                self.pivots[new_pivot_i] = self.pivots[self.next_pivot];
            }
            self.pivots[self.next_pivot] = ge_row_i as u16;
        }

        // The pivot is set nowhere else, so no other row needs clearing
        self.next_pivot += 1;
        if self.next_pivot == self.first_heavy_column {
            self.insert_heavy_rows();
        }

        Ok(if self.triangle() {
            DecodeStatus::Decoded
        } else {
            DecodeStatus::NeedMore
        })
    }
}
