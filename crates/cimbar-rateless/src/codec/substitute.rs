//! Stage 4: substitution.
//!
//! With the matrix triangularized, four passes materialize the recovery
//! set: seed each GE column's block value, re-run the dense generator to
//! fold peeled values into the dense rows, eliminate below the diagonal
//! following the op records Triangle left behind, back-substitute above
//! the diagonal, and finally regenerate every peeled column from the
//! completed mixing columns.
//!
//! The two elimination passes switch to a windowed method when enough
//! columns remain: 2^w combination blocks are built in recovery slots of
//! already-peeled columns (dead at this point, regenerated later) and each
//! row then costs a single XOR per window instead of one per bit.

use super::{Codec, Mark, LIST_TERM};
use crate::gf256;
use crate::prng::Pcg;
use crate::tables::shuffle_deck16;

impl Codec {
    /// Seed each solved GE column's block value: zero for dense and heavy
    /// rows, the input block minus its peeled columns for deferred and
    /// extra rows.
    pub(super) fn initialize_column_values(&mut self) {
        let first_heavy_row = (self.defer_count + self.dense_count) as usize;
        let column_count = (self.defer_count + self.mix_count) as usize;
        let extra = self.extra_count as usize;

        for pivot_i in 0..column_count {
            let dest_column_i = self.ge_col_map[pivot_i] as usize;
            let ge_row_i = self.pivots[pivot_i] as usize;

            // Dense and heavy (non-extra) rows sum to zero
            if ge_row_i < self.dense_count as usize || ge_row_i >= first_heavy_row + extra {
                self.rb_mut(dest_column_i).fill(0);
                self.ge_row_map[ge_row_i] = dest_column_i as u16;
                continue;
            }

            let row_i = self.ge_row_map[ge_row_i] as usize;
            let params = self.peel_rows[row_i].params;

            // The input block is merged into the first XOR when possible
            let mut combo_pending = true;

            if row_i == self.block_count as usize - 1 {
                let f = self.input_final_bytes;
                let (dst, inp) = self.rb_mut_and_input(dest_column_i, row_i);
                dst[..f].copy_from_slice(&inp[..f]);
                dst[f..].fill(0);
                combo_pending = false;
            }

            for column_i in self.peel_iter(&params) {
                if self.peel_cols[column_i as usize].mark != Mark::Peel {
                    continue;
                }
                if combo_pending {
                    let (dst, src, inp) =
                        self.rb2_and_input(dest_column_i, column_i as usize, row_i);
                    gf256::addset_mem(dst, inp, src);
                    combo_pending = false;
                } else {
                    let (dst, src) = self.rb2(dest_column_i, column_i as usize);
                    gf256::add_mem(dst, src);
                }
            }

            if combo_pending {
                let (dst, inp) = self.rb_mut_and_input(dest_column_i, row_i);
                dst.copy_from_slice(inp);
            }
        }

        // Unused dense rows must be skipped by the dense value pass
        for pivot_i in column_count..self.pivot_count {
            let ge_row_i = self.pivots[pivot_i] as usize;
            if ge_row_i < self.dense_count as usize
                || (ge_row_i >= first_heavy_row && ge_row_i < column_count)
            {
                self.ge_row_map[ge_row_i] = LIST_TERM;
            }
        }
    }

    /// XOR the peeled columns covered by two flipped bits into the scratch
    /// slot.
    fn flip_dense_bits(&mut self, base: usize, max_x: usize, bit0: usize, bit1: usize, temp: usize) {
        let p0 = bit0 < max_x && self.peel_cols[base + bit0].mark == Mark::Peel;
        let p1 = bit1 < max_x && self.peel_cols[base + bit1].mark == Mark::Peel;

        if p0 && p1 {
            let (dst, a, b) = self.rb3(temp, base + bit0, base + bit1);
            gf256::add2_mem(dst, a, b);
        } else if p0 {
            let (dst, src) = self.rb2(temp, base + bit0);
            gf256::add_mem(dst, src);
        } else if p1 {
            let (dst, src) = self.rb2(temp, base + bit1);
            gf256::add_mem(dst, src);
        }
    }

    /// Re-run the dense generator in the same deck order as the matrix
    /// pass, accumulating peeled block values into each dense row's solved
    /// column.
    pub(super) fn multiply_dense_values(&mut self) {
        let mut prng = Pcg::new(self.d_seed as u64, 0);

        let dense_count = self.dense_count as usize;
        let block_count = self.block_count as usize;
        let temp = block_count + self.mix_count as usize;

        let mut rows = vec![0u16; dense_count];
        let mut bits = vec![0u16; dense_count];

        let mut column_i = 0usize;
        while column_i < block_count {
            let max_x = dense_count.min(block_count - column_i);

            shuffle_deck16(&mut prng, &mut rows, dense_count as u32);
            shuffle_deck16(&mut prng, &mut bits, dense_count as u32);

            let set_count = (dense_count + 1) >> 1;
            let mut row_idx = 0usize;

            // First row: fold the set-bit peeled columns together lazily,
            // deferring the first copy until two sources exist
            let mut combo: Option<usize> = None;
            let mut combo_in_temp = false;

            for ii in 0..set_count {
                let bit_i = bits[ii] as usize;
                if bit_i >= max_x || self.peel_cols[column_i + bit_i].mark != Mark::Peel {
                    continue;
                }
                let src = column_i + bit_i;
                match combo {
                    None => combo = Some(src),
                    Some(_) if combo_in_temp => {
                        let (dst, s) = self.rb2(temp, src);
                        gf256::add_mem(dst, s);
                    }
                    Some(prev) => {
                        let (dst, a, b) = self.rb3(temp, prev, src);
                        gf256::addset_mem(dst, a, b);
                        combo = Some(temp);
                        combo_in_temp = true;
                    }
                }
            }

            let dest_row = rows[row_idx] as usize;
            row_idx += 1;

            match combo {
                None => self.rb_mut(temp).fill(0),
                Some(slot) => {
                    if !combo_in_temp {
                        let (dst, src) = self.rb2(temp, slot);
                        dst.copy_from_slice(src);
                    }
                    let dest_column_i = self.ge_row_map[dest_row];
                    if dest_column_i != LIST_TERM {
                        let (dst, src) = self.rb2(dest_column_i as usize, temp);
                        gf256::add_mem(dst, src);
                    }
                }
            }

            // Derivative rows flip two bits each
            shuffle_deck16(&mut prng, &mut bits, dense_count as u32);

            let loop_count = dense_count >> 1;
            for ii in 0..loop_count {
                let bit0 = bits[ii] as usize;
                let bit1 = bits[set_count + ii] as usize;
                self.flip_dense_bits(column_i, max_x, bit0, bit1, temp);

                let dest_column_i = self.ge_row_map[rows[row_idx] as usize];
                row_idx += 1;
                if dest_column_i != LIST_TERM {
                    let (dst, src) = self.rb2(dest_column_i as usize, temp);
                    gf256::add_mem(dst, src);
                }
            }

            shuffle_deck16(&mut prng, &mut bits, dense_count as u32);

            let second_loop_count = loop_count - 1 + (dense_count & 1);
            for ii in 0..second_loop_count {
                let bit0 = bits[ii] as usize;
                let bit1 = bits[set_count + ii] as usize;
                self.flip_dense_bits(column_i, max_x, bit0, bit1, temp);

                let dest_column_i = self.ge_row_map[rows[row_idx] as usize];
                row_idx += 1;
                if dest_column_i != LIST_TERM {
                    let (dst, src) = self.rb2(dest_column_i as usize, temp);
                    gf256::add_mem(dst, src);
                }
            }

            column_i += dense_count;
        }
    }

    /// Build one combination entry of the window table.
    fn win_combine(&mut self, win_table: &[usize; 128], dst: usize, a: usize, b: usize) {
        let (d, x, y) = self.rb3(win_table[dst], win_table[a], win_table[b]);
        gf256::addset_mem(d, x, y);
    }

    /// Fill combination entries above `base` (a power of two) from the
    /// entries below it.
    fn win_fill(&mut self, win_table: &[usize; 128], base: usize) {
        for ii in 1..base {
            self.win_combine(win_table, base + ii, ii, base);
        }
    }

    /// Collect scratch slots for a `2^w` window table from recovery slots
    /// of peeled columns; returns false when too few exist.
    fn win_scratch(&self, win_table: &mut [usize; 128], win_lim: usize) -> bool {
        let mut jj = 1usize;
        for column_i in 0..self.block_count as usize {
            if self.peel_cols[column_i].mark == Mark::Peel {
                win_table[jj] = column_i;
                jj += 1;
                if jj >= win_lim {
                    return true;
                }
            }
        }
        false
    }

    /// Eliminate bits below the diagonal, replaying the op records from
    /// triangularization onto the block values.
    pub(super) fn add_subdiagonal_values(&mut self) {
        const WIN_THRESH_4: usize = 45 + 4;
        const WIN_THRESH_5: usize = 65 + 5;
        const WIN_THRESH_6: usize = 85 + 6;
        const WIN_THRESH_7: usize = 138 + 7;

        let column_count = (self.defer_count + self.mix_count) as usize;
        let first_heavy_row = (self.defer_count + self.dense_count) as usize;
        let first_non_binary_row = first_heavy_row + self.extra_count as usize;
        let pitch = self.ge_pitch;

        let mut pivot_i = 0usize;

        if column_count >= WIN_THRESH_5 {
            let mut w;
            let mut next_check_i;
            if column_count >= WIN_THRESH_7 {
                w = 7;
                next_check_i = column_count - WIN_THRESH_7;
            } else if column_count >= WIN_THRESH_6 {
                w = 6;
                next_check_i = column_count - WIN_THRESH_6;
            } else {
                w = 5;
                next_check_i = column_count - WIN_THRESH_5;
            }
            let mut win_lim = 1usize << w;

            let mut win_table = [0usize; 128];

            if self.win_scratch(&mut win_table, win_lim) {
                loop {
                    let final_i = pivot_i + w - 1;

                    // Eliminate the small triangle inside the window
                    for src_pivot_i in pivot_i..final_i {
                        let src_col = self.ge_col_map[src_pivot_i] as usize;
                        for dest_pivot_i in (src_pivot_i + 1)..=final_i {
                            let dest_row_i = self.pivots[dest_pivot_i] as usize;
                            if self.ge_bit(dest_row_i, src_pivot_i) {
                                let dest_col = self.ge_col_map[dest_pivot_i] as usize;
                                let (dst, src) = self.rb2(dest_col, src_col);
                                gf256::add_mem(dst, src);
                            }
                        }
                    }

                    // Generate the window table
                    win_table[1] = self.ge_col_map[pivot_i] as usize;
                    win_table[2] = self.ge_col_map[pivot_i + 1] as usize;
                    self.win_combine(&win_table, 3, 1, 2);
                    win_table[4] = self.ge_col_map[pivot_i + 2] as usize;
                    self.win_combine(&win_table, 5, 1, 4);
                    self.win_combine(&win_table, 6, 2, 4);
                    self.win_combine(&win_table, 7, 1, 6);
                    win_table[8] = self.ge_col_map[pivot_i + 3] as usize;
                    self.win_fill(&win_table, 8);
                    if w >= 5 {
                        win_table[16] = self.ge_col_map[pivot_i + 4] as usize;
                        self.win_fill(&win_table, 16);
                        if w >= 6 {
                            win_table[32] = self.ge_col_map[pivot_i + 5] as usize;
                            self.win_fill(&win_table, 32);
                            if w >= 7 {
                                win_table[64] = self.ge_col_map[pivot_i + 6] as usize;
                                self.win_fill(&win_table, 64);
                            }
                        }
                    }

                    // Apply the window to every binary pivot row below it
                    let first_word = pivot_i >> 6;
                    let shift0 = pivot_i & 63;
                    let last_word = final_i >> 6;

                    for ge_below_i in (final_i + 1)..column_count {
                        let ge_row_i = self.pivots[ge_below_i] as usize;
                        if ge_row_i >= first_non_binary_row {
                            continue;
                        }
                        let off = pitch * ge_row_i + first_word;
                        let win_bits = if first_word == last_word {
                            ((self.ge_matrix[off] >> shift0) as usize) & (win_lim - 1)
                        } else {
                            let shift1 = 64 - shift0;
                            (((self.ge_matrix[off] >> shift0)
                                | (self.ge_matrix[off + 1] << shift1))
                                as usize)
                                & (win_lim - 1)
                        };
                        if win_bits != 0 {
                            let dest_col = self.ge_col_map[ge_below_i] as usize;
                            let (dst, src) = self.rb2(dest_col, win_table[win_bits]);
                            gf256::add_mem(dst, src);
                        }
                    }

                    pivot_i += w;
                    if pivot_i >= next_check_i {
                        let remaining = column_count - pivot_i;
                        if remaining >= WIN_THRESH_6 {
                            w = 6;
                            next_check_i = remaining - WIN_THRESH_6;
                        } else if remaining >= WIN_THRESH_5 {
                            w = 5;
                            next_check_i = remaining - WIN_THRESH_5;
                        } else if remaining >= WIN_THRESH_4 {
                            w = 4;
                            next_check_i = remaining - WIN_THRESH_4;
                        } else {
                            break;
                        }
                        win_lim = 1 << w;
                    }
                }
            }
        }

        // Plain elimination for the remaining pivots
        for ge_column_i in (pivot_i + 1)..column_count {
            let column_i = self.ge_col_map[ge_column_i] as usize;
            let ge_row_i = self.pivots[ge_column_i] as usize;
            let mut ge_limit = ge_column_i;

            if ge_row_i >= first_heavy_row {
                let heavy_row_i = ge_row_i - first_heavy_row;

                // Heavy-region records use GF(256) multiply-add
                for sub_i in self.first_heavy_column..ge_limit {
                    let code_value = self.heavy_at(heavy_row_i, sub_i - self.first_heavy_column);
                    if code_value == 0 {
                        continue;
                    }
                    let src_col = self.ge_col_map[sub_i] as usize;
                    let gf = self.gf;
                    let (dst, src) = self.rb2(column_i, src_col);
                    gf.muladd_mem(dst, code_value, src);
                }

                // Heavy rows have no binary image
                if heavy_row_i >= self.extra_count as usize {
                    continue;
                }
                if ge_limit > self.first_heavy_column {
                    ge_limit = self.first_heavy_column;
                }
            }

            let g_off = pitch * ge_row_i;
            for bit_j in pivot_i..ge_limit {
                if self.ge_matrix[g_off + (bit_j >> 6)] & (1u64 << (bit_j & 63)) != 0 {
                    let src_col = self.ge_col_map[bit_j] as usize;
                    let (dst, src) = self.rb2(column_i, src_col);
                    gf256::add_mem(dst, src);
                }
            }
        }
    }

    /// Normalize a heavy diagonal element to 1 by dividing its block value.
    fn normalize_heavy_diagonal(&mut self, pivot_i: usize, first_heavy_row: usize) {
        let ge_row_i = self.pivots[pivot_i] as usize;
        if ge_row_i >= first_heavy_row && pivot_i >= self.first_heavy_column {
            let heavy_row_i = ge_row_i - first_heavy_row;
            let heavy_col_i = pivot_i - self.first_heavy_column;
            let code_value = self.heavy_at(heavy_row_i, heavy_col_i);
            if code_value != 1 {
                let col = self.ge_col_map[pivot_i] as usize;
                let gf = self.gf;
                gf.div_mem_in_place(self.rb_mut(col), code_value);
            }
        }
    }

    /// Eliminate the upper triangular half, windowed from the right.
    pub(super) fn back_substitute_above_diagonal(&mut self) {
        const WIN_THRESH_4: usize = 20 + 4;
        const WIN_THRESH_5: usize = 40 + 5;
        const WIN_THRESH_6: usize = 64 + 6;
        const WIN_THRESH_7: usize = 128 + 7;

        let pivot_count = (self.defer_count + self.mix_count) as usize;
        let first_heavy_row = (self.defer_count + self.dense_count) as usize;
        let first_heavy_column = self.first_heavy_column;
        let pitch = self.ge_pitch;

        let mut pivot_i = pivot_count - 1;

        if pivot_i >= WIN_THRESH_5 {
            let mut w;
            let mut next_check_i;
            if pivot_i >= WIN_THRESH_7 {
                w = 7;
                next_check_i = WIN_THRESH_7;
            } else if pivot_i >= WIN_THRESH_6 {
                w = 6;
                next_check_i = WIN_THRESH_6;
            } else {
                w = 5;
                next_check_i = WIN_THRESH_5;
            }
            let mut win_lim = 1usize << w;

            let mut win_table = [0usize; 128];

            if self.win_scratch(&mut win_table, win_lim) {
                loop {
                    let backsub_i = pivot_i - w + 1;

                    // Diagonalize the small triangle inside the window
                    for src_pivot_i in ((backsub_i + 1)..=pivot_i).rev() {
                        self.normalize_heavy_diagonal(src_pivot_i, first_heavy_row);
                        let src_col = self.ge_col_map[src_pivot_i] as usize;

                        for dest_pivot_i in backsub_i..src_pivot_i {
                            let dest_row_i = self.pivots[dest_pivot_i] as usize;

                            if dest_row_i >= first_heavy_row && src_pivot_i >= first_heavy_column {
                                let heavy_row_i = dest_row_i - first_heavy_row;
                                let heavy_col_i = src_pivot_i - first_heavy_column;
                                let code_value = self.heavy_at(heavy_row_i, heavy_col_i);
                                if code_value == 0 {
                                    continue;
                                }
                                let dest_col = self.ge_col_map[dest_pivot_i] as usize;
                                let gf = self.gf;
                                let (dst, src) = self.rb2(dest_col, src_col);
                                gf.muladd_mem(dst, code_value, src);
                            } else if self.ge_bit(dest_row_i, src_pivot_i) {
                                let dest_col = self.ge_col_map[dest_pivot_i] as usize;
                                let (dst, src) = self.rb2(dest_col, src_col);
                                gf256::add_mem(dst, src);
                            }
                        }
                    }

                    self.normalize_heavy_diagonal(backsub_i, first_heavy_row);

                    // Generate the window table
                    win_table[1] = self.ge_col_map[backsub_i] as usize;
                    win_table[2] = self.ge_col_map[backsub_i + 1] as usize;
                    self.win_combine(&win_table, 3, 1, 2);
                    win_table[4] = self.ge_col_map[backsub_i + 2] as usize;
                    self.win_combine(&win_table, 5, 1, 4);
                    self.win_combine(&win_table, 6, 2, 4);
                    self.win_combine(&win_table, 7, 1, 6);
                    win_table[8] = self.ge_col_map[backsub_i + 3] as usize;
                    self.win_fill(&win_table, 8);
                    if w >= 5 {
                        win_table[16] = self.ge_col_map[backsub_i + 4] as usize;
                        self.win_fill(&win_table, 16);
                        if w >= 6 {
                            win_table[32] = self.ge_col_map[backsub_i + 5] as usize;
                            self.win_fill(&win_table, 32);
                            if w >= 7 {
                                win_table[64] = self.ge_col_map[backsub_i + 6] as usize;
                                self.win_fill(&win_table, 64);
                            }
                        }
                    }

                    // Heavy rows above the window need full elimination
                    if pivot_i >= first_heavy_column {
                        for ge_above_i in 0..backsub_i {
                            let ge_row_k = self.pivots[ge_above_i] as usize;
                            if ge_row_k < first_heavy_row {
                                continue;
                            }

                            let dest_col = self.ge_col_map[ge_above_i] as usize;
                            let mut ge_column_j = backsub_i;

                            // Binary columns of an extra row, if the window
                            // starts left of the heavy region
                            if ge_column_j < first_heavy_column {
                                let g_off = pitch * ge_row_k;
                                while ge_column_j < first_heavy_column && ge_column_j <= pivot_i {
                                    let mask = 1u64 << (ge_column_j & 63);
                                    if self.ge_matrix[g_off + (ge_column_j >> 6)] & mask != 0 {
                                        let src_col = self.ge_col_map[ge_column_j] as usize;
                                        let (dst, src) = self.rb2(dest_col, src_col);
                                        gf256::add_mem(dst, src);
                                    }
                                    ge_column_j += 1;
                                }
                            }

                            let heavy_row_i = ge_row_k - first_heavy_row;
                            let mut heavy_col_j = ge_column_j - first_heavy_column;
                            while ge_column_j <= pivot_i {
                                let code_value = self.heavy_at(heavy_row_i, heavy_col_j);
                                if code_value != 0 {
                                    let src_col = self.ge_col_map[ge_column_j] as usize;
                                    let gf = self.gf;
                                    let (dst, src) = self.rb2(dest_col, src_col);
                                    gf.muladd_mem(dst, code_value, src);
                                }
                                ge_column_j += 1;
                                heavy_col_j += 1;
                            }
                        }
                    }

                    // Apply the window table to binary rows above
                    let window_row_limit = if pivot_i >= first_heavy_column {
                        first_heavy_row
                    } else {
                        0x7fff
                    };
                    let first_word = backsub_i >> 6;
                    let shift0 = backsub_i & 63;
                    let last_word = pivot_i >> 6;

                    for above_pivot_i in 0..backsub_i {
                        let ge_row_k = self.pivots[above_pivot_i] as usize;
                        if ge_row_k >= window_row_limit {
                            continue;
                        }
                        let off = pitch * ge_row_k + first_word;
                        let win_bits = if first_word == last_word {
                            ((self.ge_matrix[off] >> shift0) as usize) & (win_lim - 1)
                        } else {
                            let shift1 = 64 - shift0;
                            (((self.ge_matrix[off] >> shift0)
                                | (self.ge_matrix[off + 1] << shift1))
                                as usize)
                                & (win_lim - 1)
                        };
                        if win_bits != 0 {
                            let dest_col = self.ge_col_map[above_pivot_i] as usize;
                            let (dst, src) = self.rb2(dest_col, win_table[win_bits]);
                            gf256::add_mem(dst, src);
                        }
                    }

                    pivot_i -= w;
                    if pivot_i < next_check_i {
                        if pivot_i >= WIN_THRESH_6 {
                            w = 6;
                            next_check_i = WIN_THRESH_6;
                        } else if pivot_i >= WIN_THRESH_5 {
                            w = 5;
                            next_check_i = WIN_THRESH_5;
                        } else if pivot_i >= WIN_THRESH_4 {
                            w = 4;
                            next_check_i = WIN_THRESH_4;
                        } else {
                            break;
                        }
                        win_lim = 1 << w;
                    }
                }
            }
        }

        // Plain back-substitution for the remaining pivots
        loop {
            self.normalize_heavy_diagonal(pivot_i, first_heavy_row);
            let src_col = self.ge_col_map[pivot_i] as usize;

            for ge_up_i in 0..pivot_i {
                let up_row_i = self.pivots[ge_up_i] as usize;

                if up_row_i >= first_heavy_row && ge_up_i >= first_heavy_column {
                    let heavy_row_i = up_row_i - first_heavy_row;
                    let heavy_col_i = pivot_i - first_heavy_column;
                    let code_value = self.heavy_at(heavy_row_i, heavy_col_i);
                    if code_value == 0 {
                        continue;
                    }
                    let dest_col = self.ge_col_map[ge_up_i] as usize;
                    let gf = self.gf;
                    let (dst, src) = self.rb2(dest_col, src_col);
                    gf.muladd_mem(dst, code_value, src);
                } else if self.ge_bit(up_row_i, pivot_i) {
                    let dest_col = self.ge_col_map[ge_up_i] as usize;
                    let (dst, src) = self.rb2(dest_col, src_col);
                    gf256::add_mem(dst, src);
                }
            }

            if pivot_i == 0 {
                break;
            }
            pivot_i -= 1;
        }
    }

    /// Regenerate each peeled column's value from the now-complete mixing
    /// columns and peel columns, in forward solution order.
    pub(super) fn substitute(&mut self) {
        let n = self.block_count as usize;
        let mut row_i = self.peel_head_rows;

        while row_i != LIST_TERM {
            let (params, dest_column_i, next_row) = {
                let row = &self.peel_rows[row_i as usize];
                (row.params, row.peel_column, row.next_row)
            };
            debug_assert_ne!(dest_column_i, LIST_TERM);

            let mix = self.mix_cols(&params);
            let input_final = self.input_final_bytes;
            let last = row_i == self.block_count - 1;

            // Input block plus the first mixing column
            {
                let (dst, src, inp) = self.rb2_and_input(
                    dest_column_i as usize,
                    n + mix[0] as usize,
                    row_i as usize,
                );
                if !last {
                    gf256::addset_mem(dst, src, inp);
                } else {
                    gf256::addset_mem(&mut dst[..input_final], &src[..input_final], &inp[..input_final]);
                    dst[input_final..].copy_from_slice(&src[input_final..]);
                }
            }

            // The remaining two mixing columns
            {
                let (dst, a, b) = self.rb3(
                    dest_column_i as usize,
                    n + mix[1] as usize,
                    n + mix[2] as usize,
                );
                gf256::add2_mem(dst, a, b);
            }

            // Peel columns, skipping the one this row solves
            if params.peel_count >= 2 {
                let mut iter = self.peel_iter(&params);
                let column_0 = iter.next().expect("at least one column");
                let column_1 = iter.next().expect("peel_count >= 2");

                if column_0 != dest_column_i {
                    if column_1 != dest_column_i {
                        let (dst, a, b) =
                            self.rb3(dest_column_i as usize, column_0 as usize, column_1 as usize);
                        gf256::add2_mem(dst, a, b);
                    } else {
                        let (dst, src) = self.rb2(dest_column_i as usize, column_0 as usize);
                        gf256::add_mem(dst, src);
                    }
                } else {
                    let (dst, src) = self.rb2(dest_column_i as usize, column_1 as usize);
                    gf256::add_mem(dst, src);
                }

                for column_x in iter {
                    if column_x != dest_column_i {
                        let (dst, src) = self.rb2(dest_column_i as usize, column_x as usize);
                        gf256::add_mem(dst, src);
                    }
                }
            }

            row_i = next_row;
        }
    }
}
