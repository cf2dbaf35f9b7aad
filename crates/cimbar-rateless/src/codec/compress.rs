//! Stage 2: compression.
//!
//! Collapses the peeled sparse matrix into a small dense GE matrix.  The
//! peeled submatrix is diagonalized in solution order, scattering deferred
//! and mixing column bits through the compression matrix; deferred rows
//! are then copied into the GE matrix, the Shuffle-2 dense rows are
//! multiplied in, and the heavy GF(256) rows are installed at the bottom.

use super::{Codec, Mark, LIST_TERM};
use crate::gf256;
use crate::prng::Pcg;
use crate::tables::{shuffle_deck16, HEAVY_MATRIX, HEAVY_ROWS};

impl Codec {
    /// Scatter a bit into the compression matrix for every row touching a
    /// deferred column, and map GE columns to matrix columns.
    pub(super) fn set_deferred_columns(&mut self) {
        let mut ge_column_i = 0u16;
        let mut defer_i = self.defer_head_columns;

        while defer_i != LIST_TERM {
            let word = (ge_column_i >> 6) as usize;
            let mask = 1u64 << (ge_column_i & 63);

            let refs = self.peel_col_refs[defer_i as usize];
            for i in 0..refs.row_count as usize {
                let row_i = refs.rows[i] as usize;
                self.compress_matrix[self.ge_pitch * row_i + word] |= mask;
            }

            self.ge_col_map[ge_column_i as usize] = defer_i;

            let column = &mut self.peel_cols[defer_i as usize];
            column.ge_column = ge_column_i;
            defer_i = column.next;
            ge_column_i += 1;
        }

        // Mixing columns sit after the deferred columns
        for added_i in 0..self.mix_count {
            let ge_column_i = (self.defer_count + added_i) as usize;
            let column_i = self.block_count + added_i;
            self.ge_col_map[ge_column_i] = column_i;
        }
    }

    /// Set the three mixing column bits for every deferred row, and tag the
    /// row as deferred so later passes can tell it from peeled rows.
    pub(super) fn set_mixing_columns_for_deferred_rows(&mut self) {
        let mut defer_row_i = self.defer_head_rows;

        while defer_row_i != LIST_TERM {
            let (params, next_row) = {
                let row = &mut self.peel_rows[defer_row_i as usize];
                row.peel_column = LIST_TERM;
                (row.params, row.next_row)
            };

            let off = self.ge_pitch * defer_row_i as usize;
            for c in self.mix_cols(&params) {
                let col = self.defer_count as usize + c as usize;
                self.compress_matrix[off + (col >> 6)] ^= 1u64 << (col & 63);
            }

            defer_row_i = next_row;
        }
    }

    /// Diagonalize the peeled rows in forward solution order.
    ///
    /// Each peeled row's block value lands in its solved column's recovery
    /// slot; the first write merges the copy with the first XOR via the
    /// `is_copied` flag.  The row's dense column pattern is then folded
    /// into every other row referencing the solved column.
    pub(super) fn peel_diagonal(&mut self) {
        let mut peel_row_i = self.peel_head_rows;

        while peel_row_i != LIST_TERM {
            let (params, peel_column_i, is_copied, next_row) = {
                let row = &self.peel_rows[peel_row_i as usize];
                (row.params, row.peel_column, row.is_copied, row.next_row)
            };

            // Mixing column bits for this row
            let off = self.ge_pitch * peel_row_i as usize;
            for c in self.mix_cols(&params) {
                let col = self.defer_count as usize + c as usize;
                self.compress_matrix[off + (col >> 6)] ^= 1u64 << (col & 63);
            }

            // First write of this row's block value, if no referencing row
            // provided it already
            if !is_copied {
                let input_final = self.input_final_bytes;
                let last = peel_row_i == self.block_count - 1;
                let (dst, src) = self.rb_mut_and_input(peel_column_i as usize, peel_row_i as usize);
                if !last {
                    dst.copy_from_slice(src);
                } else {
                    dst[..input_final].copy_from_slice(&src[..input_final]);
                    dst[input_final..].fill(0);
                }
                // No need to set is_copied: nothing references this row later
            }

            // Fold into every row that references the solved column
            let refs = self.peel_col_refs[peel_column_i as usize];
            for i in 0..refs.row_count as usize {
                let ref_row_i = refs.rows[i];
                if ref_row_i == peel_row_i {
                    continue;
                }

                let dst_off = self.ge_pitch * ref_row_i as usize;
                let src_off = self.ge_pitch * peel_row_i as usize;
                Codec::xor_words(&mut self.compress_matrix, dst_off, src_off, self.ge_pitch);

                let (ref_column_i, ref_is_copied) = {
                    let r = &self.peel_rows[ref_row_i as usize];
                    (r.peel_column, r.is_copied)
                };

                // Only peeled referencing rows accumulate block values here
                if ref_column_i == LIST_TERM {
                    continue;
                }

                if ref_is_copied {
                    let (dst, src) = self.rb2(ref_column_i as usize, peel_column_i as usize);
                    gf256::add_mem(dst, src);
                } else {
                    let input_final = self.input_final_bytes;
                    let last = ref_row_i == self.block_count - 1;
                    let (dst, temp_src, inp) = self.rb2_and_input(
                        ref_column_i as usize,
                        peel_column_i as usize,
                        ref_row_i as usize,
                    );
                    if !last {
                        gf256::addset_mem(dst, temp_src, inp);
                    } else {
                        gf256::addset_mem(
                            &mut dst[..input_final],
                            &temp_src[..input_final],
                            &inp[..input_final],
                        );
                        dst[input_final..].copy_from_slice(&temp_src[input_final..]);
                    }
                    self.peel_rows[ref_row_i as usize].is_copied = true;
                }
            }

            peel_row_i = next_row;
        }
    }

    /// Copy deferred rows from the compression matrix into the GE matrix,
    /// after the dense rows.
    pub(super) fn copy_deferred_rows(&mut self) {
        let mut ge_row_i = self.dense_count as usize;
        let mut defer_row_i = self.defer_head_rows;

        while defer_row_i != LIST_TERM {
            let src = self.ge_pitch * defer_row_i as usize;
            let dst = self.ge_pitch * ge_row_i;
            for j in 0..self.ge_pitch {
                self.ge_matrix[dst + j] = self.compress_matrix[src + j];
            }

            self.ge_row_map[ge_row_i] = defer_row_i;

            defer_row_i = self.peel_rows[defer_row_i as usize].next_row;
            ge_row_i += 1;
        }
    }

    /// XOR one dense-matrix bit position into the scratch GE row: peeled
    /// columns contribute their compression row, deferred columns a single
    /// GE bit.
    fn add_dense_bit(&mut self, column: usize, temp_off: usize) {
        let col = self.peel_cols[column];
        if col.mark == Mark::Peel {
            let src_off = self.ge_pitch * col.peel_row as usize;
            for j in 0..self.ge_pitch {
                let v = self.compress_matrix[src_off + j];
                self.ge_matrix[temp_off + j] ^= v;
            }
        } else {
            let ge_column_i = col.ge_column as usize;
            self.ge_matrix[temp_off + (ge_column_i >> 6)] ^= 1u64 << (ge_column_i & 63);
        }
    }

    /// Multiply the Shuffle-2 dense rows by the peeling matrix to produce
    /// GE rows.  Works one `D x D` block of columns at a time: a random
    /// half-weight first row, then derivative rows differing by two bit
    /// flips each, with the flip order reshuffled between the two halves.
    /// Row values are not touched here; they are regenerated with the same
    /// deck order once pivot destinations are known.
    pub(super) fn multiply_dense_rows(&mut self) {
        let mut prng = Pcg::new(self.d_seed as u64, 0);

        let dense_count = self.dense_count as usize;
        let block_count = self.block_count as usize;
        let pitch = self.ge_pitch;
        let temp_off = pitch * (dense_count + self.defer_count as usize);

        let mut rows = vec![0u16; dense_count];
        let mut bits = vec![0u16; dense_count];

        let mut column_i = 0usize;
        while column_i < block_count {
            let max_x = dense_count.min(block_count - column_i);

            // Shuffle destination row order and bit flip order
            shuffle_deck16(&mut prng, &mut rows, dense_count as u32);
            shuffle_deck16(&mut prng, &mut bits, dense_count as u32);

            let set_count = (dense_count + 1) >> 1;

            for j in 0..pitch {
                self.ge_matrix[temp_off + j] = 0;
            }

            // First row: half of the bits set
            for ii in 0..set_count {
                let bit_i = bits[ii] as usize;
                if bit_i < max_x {
                    self.add_dense_bit(column_i + bit_i, temp_off);
                }
            }

            let mut row_idx = 0usize;
            let dest = pitch * rows[row_idx] as usize;
            row_idx += 1;
            Codec::xor_words(&mut self.ge_matrix, dest, temp_off, pitch);

            // Reshuffle bit order, then flip two bits per derivative row
            shuffle_deck16(&mut prng, &mut bits, dense_count as u32);

            let loop_count = dense_count >> 1;
            for ii in 0..loop_count {
                let bit0 = bits[ii] as usize;
                let bit1 = bits[set_count + ii] as usize;
                if bit0 < max_x {
                    self.add_dense_bit(column_i + bit0, temp_off);
                }
                if bit1 < max_x {
                    self.add_dense_bit(column_i + bit1, temp_off);
                }
                let dest = pitch * rows[row_idx] as usize;
                row_idx += 1;
                Codec::xor_words(&mut self.ge_matrix, dest, temp_off, pitch);
            }

            shuffle_deck16(&mut prng, &mut bits, dense_count as u32);

            let second_loop_count = loop_count - 1 + (dense_count & 1);
            for ii in 0..second_loop_count {
                let bit0 = bits[ii] as usize;
                let bit1 = bits[set_count + ii] as usize;
                if bit0 < max_x {
                    self.add_dense_bit(column_i + bit0, temp_off);
                }
                if bit1 < max_x {
                    self.add_dense_bit(column_i + bit1, temp_off);
                }
                let dest = pitch * rows[row_idx] as usize;
                row_idx += 1;
                Codec::xor_words(&mut self.ge_matrix, dest, temp_off, pitch);
            }

            column_i += dense_count;
        }
    }

    /// Install the fixed Cauchy-derived GF(256) rows after any extra-row
    /// staging slots.  Stacked binary perturbations from above do not spoil
    /// this matrix's invertibility.
    pub(super) fn set_heavy_rows(&mut self) {
        let extra = self.extra_count as usize;
        for (row_i, heavy_row) in HEAVY_MATRIX.iter().enumerate().take(HEAVY_ROWS) {
            let off = self.heavy_pitch * (extra + row_i);
            self.heavy_matrix[off..off + self.heavy_columns]
                .copy_from_slice(&heavy_row[..self.heavy_columns]);
        }
    }
}
