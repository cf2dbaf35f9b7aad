//! # Rateless Codec
//!
//! Hybrid sparse/dense/heavy matrix codec.  The conceptual matrix for `N`
//! input blocks has `N` sparse peel rows, `D` pseudo-random dense binary
//! rows tied to `D + 6` mixing columns, and 6 GF(256) heavy rows over the
//! last 18 columns.  Solving it yields a recovery set from which any block
//! id can be generated; feeding any (almost always) `N` received blocks
//! back through the same machinery reconstructs the message.
//!
//! The solver runs in four stages:
//!
//! 1. **Peeling** — opportunistic graph decoding over the sparse rows,
//!    completed greedily by deferring the most-connected columns.
//! 2. **Compression** — diagonalize the peeled submatrix and collapse the
//!    remainder into a small dense GE matrix.
//! 3. **Triangularization** — Gaussian elimination over the GE matrix,
//!    with the heavy GF(256) rows as a fallback pivot source; resumable
//!    when a pivot is missing and more blocks arrive.
//! 4. **Substitution** — windowed back-substitution to materialize the
//!    recovery set.
//!
//! All linked structures are arenas of `u16` indices; `LIST_TERM`
//! (`0xFFFF`) marks "none".

mod compress;
mod peel;
mod substitute;
mod triangle;

use std::collections::HashSet;

use crate::gf256::{self, Gf256};
use crate::row::{mix_columns, PeelColumnIter, RowParams};
use crate::tables::{
    self, next_prime16, HEAVY_COLS, HEAVY_ROWS, MAX_BLOCKS, MAX_EXTRA_ROWS, MIN_BLOCKS,
    REF_LIST_MAX,
};
use crate::{try_filled_u16, try_zeroed_u64, try_zeroed_u8, CodecError};

/// Arena list terminator.
pub(crate) const LIST_TERM: u16 = 0xffff;

/// Outcome of feeding one block to a [`Decoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// The message is fully solved; call [`Decoder::recover`].
    Decoded,
    /// More blocks are needed.
    NeedMore,
}

// ─── Peeling Arenas ─────────────────────────────────────────────────────────

/// Column state during peeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// Still deciding
    Todo,
    /// Solved by a single row during peeling
    Peel,
    /// Deferred to Gaussian elimination
    Defer,
}

/// Row of the sparse peel matrix.
#[derive(Debug, Clone, Copy)]
struct PeelRow {
    /// Block id that generates this row's column set
    recovery_id: u32,
    /// Linkage in the peeled / deferred row lists
    next_row: u16,
    /// Column generator parameters
    params: RowParams,
    /// Columns of this row not yet marked
    unmarked_count: u16,
    /// The final two unmarked columns, while `unmarked_count == 2`
    unmarked: [u16; 2],
    /// Column this row solves, or `LIST_TERM` when deferred
    peel_column: u16,
    /// Whether the row value has been copied into the recovery set
    is_copied: bool,
}

impl Default for PeelRow {
    fn default() -> Self {
        PeelRow {
            recovery_id: 0,
            next_row: LIST_TERM,
            params: RowParams::default(),
            unmarked_count: 0,
            unmarked: [0; 2],
            peel_column: LIST_TERM,
            is_copied: false,
        }
    }
}

/// Column of the sparse peel matrix.
#[derive(Debug, Clone, Copy)]
struct PeelColumn {
    /// Linkage in the deferred column list
    next: u16,
    /// Number of weight-2 rows containing this column
    w2_refs: u16,
    /// Row that solves this column, once peeled
    peel_row: u16,
    /// GE column a deferred column maps to
    ge_column: u16,
    mark: Mark,
}

impl Default for PeelColumn {
    fn default() -> Self {
        PeelColumn {
            next: LIST_TERM,
            w2_refs: 0,
            peel_row: LIST_TERM,
            ge_column: LIST_TERM,
            mark: Mark::Todo,
        }
    }
}

/// Rows referencing a column, bounded so peeling stays O(1) per row.
#[derive(Debug, Clone, Copy)]
struct PeelRefs {
    row_count: u16,
    rows: [u16; REF_LIST_MAX],
}

impl Default for PeelRefs {
    fn default() -> Self {
        PeelRefs {
            row_count: 0,
            rows: [0; REF_LIST_MAX],
        }
    }
}

// ─── Codec State ────────────────────────────────────────────────────────────

pub(crate) struct Codec {
    gf: &'static Gf256,

    // Parameters
    block_bytes: usize,
    message_bytes: u64,
    block_count: u16,
    block_next_prime: u16,
    seed_override: Option<(u16, u16, u16)>,
    dense_count: u16,
    p_seed: u32,
    d_seed: u32,
    extra_count: u16,
    row_count: u16,
    mix_count: u16,
    mix_next_prime: u16,

    // Buffers
    recovery_blocks: Vec<u8>,
    recovery_rows: usize,
    input_blocks: Vec<u8>,
    input_final_bytes: usize,
    output_final_bytes: usize,
    all_original: bool,
    original_out_of_order: bool,
    solved: bool,

    // Peeling state
    peel_rows: Vec<PeelRow>,
    peel_cols: Vec<PeelColumn>,
    peel_col_refs: Vec<PeelRefs>,
    peel_head_rows: u16,
    peel_tail_rows: u16,
    defer_head_columns: u16,
    defer_head_rows: u16,
    defer_count: u16,

    // Gaussian elimination state
    compress_matrix: Vec<u64>,
    ge_matrix: Vec<u64>,
    ge_pitch: usize,
    pivots: Vec<u16>,
    pivot_count: usize,
    ge_col_map: Vec<u16>,
    ge_row_map: Vec<u16>,
    next_pivot: usize,

    // Heavy submatrix
    heavy_matrix: Vec<u8>,
    heavy_pitch: usize,
    heavy_columns: usize,
    first_heavy_column: usize,
    first_heavy_pivot: usize,

    // Decoder duplicate-id guard
    seen_ids: HashSet<u32>,
}

impl Codec {
    fn new(seed_override: Option<(u16, u16, u16)>) -> Result<Codec, CodecError> {
        Ok(Codec {
            gf: gf256::ctx()?,
            block_bytes: 0,
            message_bytes: 0,
            block_count: 0,
            block_next_prime: 0,
            seed_override,
            dense_count: 0,
            p_seed: 0,
            d_seed: 0,
            extra_count: 0,
            row_count: 0,
            mix_count: 0,
            mix_next_prime: 0,
            recovery_blocks: Vec::new(),
            recovery_rows: 0,
            input_blocks: Vec::new(),
            input_final_bytes: 0,
            output_final_bytes: 0,
            all_original: false,
            original_out_of_order: false,
            solved: false,
            peel_rows: Vec::new(),
            peel_cols: Vec::new(),
            peel_col_refs: Vec::new(),
            peel_head_rows: LIST_TERM,
            peel_tail_rows: LIST_TERM,
            defer_head_columns: LIST_TERM,
            defer_head_rows: LIST_TERM,
            defer_count: 0,
            compress_matrix: Vec::new(),
            ge_matrix: Vec::new(),
            ge_pitch: 0,
            pivots: Vec::new(),
            pivot_count: 0,
            ge_col_map: Vec::new(),
            ge_row_map: Vec::new(),
            next_pivot: 0,
            heavy_matrix: Vec::new(),
            heavy_pitch: 0,
            heavy_columns: 0,
            first_heavy_column: 0,
            first_heavy_pivot: 0,
            seen_ids: HashSet::new(),
        })
    }

    /// Validate sizes and pick the matrix parameters for this message.
    fn choose_matrix(&mut self, message_bytes: u64, block_bytes: usize) -> Result<(), CodecError> {
        if message_bytes < 1 || block_bytes < 1 {
            return Err(CodecError::InvalidInput);
        }

        self.block_bytes = block_bytes;
        self.message_bytes = message_bytes;
        let block_count = message_bytes.div_ceil(block_bytes as u64);

        if block_count < MIN_BLOCKS as u64 {
            return Err(CodecError::TooFewBlocks);
        }
        if block_count > MAX_BLOCKS as u64 {
            return Err(CodecError::TooManyBlocks);
        }

        self.block_count = block_count as u16;
        self.block_next_prime = next_prime16(self.block_count);

        match self.seed_override {
            Some((dense_count, p_seed, d_seed)) => {
                self.dense_count = dense_count;
                self.p_seed = p_seed as u32;
                self.d_seed = d_seed as u32;
            }
            None => {
                self.dense_count = tables::dense_count(self.block_count as usize);
                self.d_seed =
                    tables::dense_seed(self.block_count as usize, self.dense_count) as u32;
                self.p_seed = tables::peel_seed(self.block_count as usize) as u32;
            }
        }

        self.mix_count = self.dense_count + HEAVY_ROWS as u16;
        self.mix_next_prime = next_prime16(self.mix_count);

        self.peel_head_rows = LIST_TERM;
        self.peel_tail_rows = LIST_TERM;
        self.defer_head_rows = LIST_TERM;

        Ok(())
    }

    fn allocate_workspace(&mut self) -> Result<(), CodecError> {
        let recovery_rows = self.block_count as usize + self.mix_count as usize + 1;
        self.recovery_blocks = try_zeroed_u8(recovery_rows * self.block_bytes)?;
        self.recovery_rows = recovery_rows;

        let row_count = self.block_count as usize + self.extra_count as usize;
        let column_count = self.block_count as usize;

        let mut rows = Vec::new();
        rows.try_reserve_exact(row_count).map_err(|_| CodecError::Oom)?;
        rows.resize(row_count, PeelRow::default());
        self.peel_rows = rows;

        let mut cols = Vec::new();
        cols.try_reserve_exact(column_count)
            .map_err(|_| CodecError::Oom)?;
        cols.resize(column_count, PeelColumn::default());
        self.peel_cols = cols;

        let mut refs = Vec::new();
        refs.try_reserve_exact(column_count)
            .map_err(|_| CodecError::Oom)?;
        refs.resize(column_count, PeelRefs::default());
        self.peel_col_refs = refs;

        Ok(())
    }

    fn allocate_input(&mut self) -> Result<(), CodecError> {
        let rows = self.block_count as usize + self.extra_count as usize;
        self.input_blocks = try_zeroed_u8(rows * self.block_bytes)?;
        Ok(())
    }

    /// Allocate the GE, compression, heavy, and pivot structures.  Only
    /// possible once peeling has fixed `defer_count`.
    fn allocate_matrix(&mut self) -> Result<(), CodecError> {
        let defer = self.defer_count as usize;
        let dense = self.dense_count as usize;
        let mix = self.mix_count as usize;
        let extra = self.extra_count as usize;

        let ge_cols = defer + mix;
        let ge_rows = defer + dense + extra + 1; // One extra for workspace
        let ge_pitch = ge_cols.div_ceil(64);

        self.ge_pitch = ge_pitch;
        self.compress_matrix = try_zeroed_u64(self.block_count as usize * ge_pitch)?;
        self.ge_matrix = try_zeroed_u64(ge_rows * ge_pitch)?;

        let pivot_count = ge_cols + extra;
        self.pivots = try_filled_u16(pivot_count, 0)?;
        self.ge_row_map = try_filled_u16(pivot_count, LIST_TERM)?;
        self.ge_col_map = try_filled_u16(ge_cols, LIST_TERM)?;

        let heavy_rows = HEAVY_ROWS + extra;
        let heavy_cols = mix.min(HEAVY_COLS);
        // Row stride rounded so every heavy row is a multiple of 4 bytes
        let heavy_pitch = (heavy_cols + 3 + 3) & !3;
        self.heavy_matrix = try_zeroed_u8(heavy_pitch * heavy_rows)?;
        self.heavy_pitch = heavy_pitch;
        self.heavy_columns = heavy_cols;
        self.first_heavy_column = defer + mix - heavy_cols;

        Ok(())
    }

    // ─── Buffer Accessors ───────────────────────────────────────────────────

    #[inline]
    fn rb(&self, slot: usize) -> &[u8] {
        debug_assert!(slot < self.recovery_rows);
        &self.recovery_blocks[slot * self.block_bytes..(slot + 1) * self.block_bytes]
    }

    #[inline]
    fn rb_mut(&mut self, slot: usize) -> &mut [u8] {
        debug_assert!(slot < self.recovery_rows);
        &mut self.recovery_blocks[slot * self.block_bytes..(slot + 1) * self.block_bytes]
    }

    /// Disjoint mutable/shared views of two recovery slots.
    #[inline]
    fn rb2(&mut self, dst: usize, src: usize) -> (&mut [u8], &[u8]) {
        let bb = self.block_bytes;
        split_two(&mut self.recovery_blocks, bb, dst, src)
    }

    /// Disjoint views of three recovery slots: one mutable, two shared.
    #[inline]
    fn rb3(&mut self, dst: usize, a: usize, b: usize) -> (&mut [u8], &[u8], &[u8]) {
        debug_assert!(dst != a && dst != b);
        debug_assert!(dst < self.recovery_rows && a < self.recovery_rows && b < self.recovery_rows);
        let bb = self.block_bytes;
        let base = self.recovery_blocks.as_mut_ptr();
        // Slots are disjoint block_bytes-sized ranges of one buffer; only
        // `dst` is handed out mutably.
        unsafe {
            (
                std::slice::from_raw_parts_mut(base.add(dst * bb), bb),
                std::slice::from_raw_parts(base.add(a * bb) as *const u8, bb),
                std::slice::from_raw_parts(base.add(b * bb) as *const u8, bb),
            )
        }
    }

    #[inline]
    fn input_row(&self, row: usize) -> &[u8] {
        &self.input_blocks[row * self.block_bytes..(row + 1) * self.block_bytes]
    }

    /// A recovery slot mutably plus an input row.
    #[inline]
    fn rb_mut_and_input(&mut self, slot: usize, row: usize) -> (&mut [u8], &[u8]) {
        let bb = self.block_bytes;
        let dst = &mut self.recovery_blocks[slot * bb..(slot + 1) * bb];
        let src = &self.input_blocks[row * bb..(row + 1) * bb];
        (dst, src)
    }

    /// Two disjoint recovery slots (one mutable) plus an input row.
    #[inline]
    fn rb2_and_input(&mut self, dst: usize, src: usize, row: usize) -> (&mut [u8], &[u8], &[u8]) {
        let bb = self.block_bytes;
        let (d, s) = split_two(&mut self.recovery_blocks, bb, dst, src);
        let inp = &self.input_blocks[row * bb..(row + 1) * bb];
        (d, s, inp)
    }

    /// XOR compress/GE matrix row `src` into row `dst` (word offsets).
    #[inline]
    fn xor_words(matrix: &mut [u64], dst_off: usize, src_off: usize, words: usize) {
        for j in 0..words {
            let v = matrix[src_off + j];
            matrix[dst_off + j] ^= v;
        }
    }

    /// XOR a compress-matrix row into a GE-matrix row.
    #[inline]
    fn xor_compress_into_ge(&mut self, ge_row: usize, compress_row: usize) {
        let pitch = self.ge_pitch;
        let src = &self.compress_matrix[compress_row * pitch..(compress_row + 1) * pitch];
        let dst = &mut self.ge_matrix[ge_row * pitch..(ge_row + 1) * pitch];
        for (d, s) in dst.iter_mut().zip(src.iter()) {
            *d ^= *s;
        }
    }

    /// Disjoint mutable/shared views of two heavy matrix rows.
    #[inline]
    fn heavy2(&mut self, dst_row: usize, src_row: usize) -> (&mut [u8], &[u8]) {
        let pitch = self.heavy_pitch;
        split_two(&mut self.heavy_matrix, pitch, dst_row, src_row)
    }

    #[inline]
    fn heavy_at(&self, row: usize, col: usize) -> u8 {
        self.heavy_matrix[row * self.heavy_pitch + col]
    }

    #[inline]
    fn ge_bit(&self, row: usize, column: usize) -> bool {
        self.ge_matrix[row * self.ge_pitch + (column >> 6)] & (1u64 << (column & 63)) != 0
    }

    // ─── Row Parameter Helpers ──────────────────────────────────────────────

    fn row_params(&self, row_seed: u32) -> RowParams {
        RowParams::new(row_seed, self.p_seed, self.block_count, self.mix_count)
    }

    fn peel_iter(&self, params: &RowParams) -> PeelColumnIter {
        PeelColumnIter::new(params, self.block_count, self.block_next_prime)
    }

    fn mix_cols(&self, params: &RowParams) -> [u16; 3] {
        mix_columns(params, self.mix_count, self.mix_next_prime)
    }

    // ─── Solve Driver ───────────────────────────────────────────────────────

    /// Run greedy peeling, build the GE matrix, and triangularize.
    ///
    /// `Ok(true)` means solved; `Ok(false)` means more rows are needed.
    fn solve_matrix(&mut self) -> Result<bool, CodecError> {
        // (1) Peeling
        self.greedy_peeling();

        // (2) Compression
        self.allocate_matrix()?;
        self.set_deferred_columns();
        self.set_mixing_columns_for_deferred_rows();
        self.peel_diagonal();
        self.copy_deferred_rows();
        self.multiply_dense_rows();
        self.set_heavy_rows();

        // Mathematically tie dense rows to the dense mixing columns
        tables::add_invertible_gf2_matrix(
            &mut self.ge_matrix,
            self.defer_count as usize,
            self.ge_pitch,
            self.dense_count as usize,
        );

        // (3) Gaussian elimination
        self.setup_triangle();
        Ok(self.triangle())
    }

    /// Stage 4: materialize the recovery set after triangularization.
    fn generate_recovery_blocks(&mut self) {
        self.initialize_column_values();
        self.multiply_dense_values();
        self.add_subdiagonal_values();
        self.back_substitute_above_diagonal();
        self.substitute();
    }

    // ─── Encoder Mode ───────────────────────────────────────────────────────

    fn initialize_encoder(
        &mut self,
        message_bytes: u64,
        block_bytes: usize,
    ) -> Result<(), CodecError> {
        self.choose_matrix(message_bytes, block_bytes)?;

        let mut partial = (message_bytes % block_bytes as u64) as usize;
        if partial == 0 {
            partial = block_bytes;
        }

        self.input_final_bytes = partial;
        self.output_final_bytes = block_bytes;
        self.extra_count = 0;
        self.original_out_of_order = false;

        self.allocate_workspace()
    }

    /// Split the message into rows, peel them all, solve, and build the
    /// recovery set.  The tables guarantee the matrix is invertible, so any
    /// failure here indicates a parameter-table defect.
    fn encode_feed(&mut self, message: &[u8]) -> Result<(), CodecError> {
        if message.is_empty() {
            return Err(CodecError::InvalidInput);
        }

        self.allocate_input()?;
        self.input_blocks[..message.len()].copy_from_slice(message);

        for id in 0..self.block_count {
            if !self.opportunistic_peeling(id, id as u32) {
                return Err(CodecError::BadPeelSeed);
            }
        }
        self.row_count = self.block_count;

        match self.solve_matrix()? {
            true => {
                self.generate_recovery_blocks();
                self.solved = true;
                Ok(())
            }
            false => Err(CodecError::BadPeelSeed),
        }
    }

    /// Generate block `block_id` into `out`.  Returns the bytes written:
    /// the partial final length for the last original id, the full block
    /// size otherwise.
    fn encode(&self, block_id: u32, out: &mut [u8]) -> Result<usize, CodecError> {
        let copy_bytes = if block_id == self.block_count as u32 - 1 {
            self.input_final_bytes
        } else {
            self.block_bytes
        };

        if out.len() < copy_bytes {
            return Err(CodecError::InvalidInput);
        }
        let out = &mut out[..copy_bytes];

        // Original message blocks copy straight from the input, unless the
        // input arrived out of order (decoder-turned-encoder).
        if block_id < self.block_count as u32 && !self.original_out_of_order {
            out.copy_from_slice(&self.input_row(block_id as usize)[..copy_bytes]);
            return Ok(copy_bytes);
        }

        let params = self.row_params(block_id);
        let mut iter = self.peel_iter(&params);
        let mix = self.mix_cols(&params);
        let n = self.block_count as usize;

        let peel_0 = iter.next().expect("row has at least one column") as usize;
        let first = &self.rb(peel_0)[..copy_bytes];
        let mix0 = &self.rb(n + mix[0] as usize)[..copy_bytes];

        if let Some(peel_1) = iter.next() {
            gf256::addset_mem(out, first, &self.rb(peel_1 as usize)[..copy_bytes]);

            for peel_x in iter {
                gf256::add_mem(out, &self.rb(peel_x as usize)[..copy_bytes]);
            }

            gf256::add_mem(out, mix0);
        } else {
            gf256::addset_mem(out, first, mix0);
        }

        gf256::add2_mem(
            out,
            &self.rb(n + mix[1] as usize)[..copy_bytes],
            &self.rb(n + mix[2] as usize)[..copy_bytes],
        );

        Ok(copy_bytes)
    }

    // ─── Decoder Mode ───────────────────────────────────────────────────────

    fn initialize_decoder(
        &mut self,
        message_bytes: u64,
        block_bytes: usize,
    ) -> Result<(), CodecError> {
        self.choose_matrix(message_bytes, block_bytes)?;

        let mut partial = (message_bytes % block_bytes as u64) as usize;
        if partial == 0 {
            partial = block_bytes;
        }

        self.row_count = 0;
        self.output_final_bytes = partial;

        // Input slots hold rows, not ids; a row that happens to land in the
        // final slot must still be treated as full-size.
        self.input_final_bytes = block_bytes;

        self.extra_count = MAX_EXTRA_ROWS as u16;
        self.all_original = true;
        self.original_out_of_order = true;

        self.allocate_input()?;
        self.allocate_workspace()
    }

    fn decode_feed(&mut self, block_id: u32, data: &[u8]) -> Result<DecodeStatus, CodecError> {
        if self.solved {
            return Ok(DecodeStatus::Decoded);
        }

        let is_final_block = block_id == self.block_count as u32 - 1;
        if is_final_block {
            if data.len() < self.output_final_bytes {
                return Err(CodecError::InvalidInput);
            }
        } else if data.len() != self.block_bytes {
            return Err(CodecError::InvalidInput);
        }

        // Each id may be offered at most once
        if !self.seen_ids.insert(block_id) {
            return Err(CodecError::InvalidInput);
        }

        if block_id >= self.block_count as u32 {
            self.all_original = false;
        }

        let row_i = self.row_count;

        // Rows beyond N feed the resume-GE path
        if row_i >= self.block_count {
            let status = self.resume_solve_matrix(block_id, data)?;
            if status == DecodeStatus::Decoded {
                self.generate_recovery_blocks();
                self.solved = true;
            }
            return Ok(status);
        }

        if !self.opportunistic_peeling(row_i, block_id) {
            // No room in the reference lists; wait for a different row
            return Ok(DecodeStatus::NeedMore);
        }

        let bb = self.block_bytes;
        let dest = &mut self.input_blocks[row_i as usize * bb..(row_i as usize + 1) * bb];
        if is_final_block {
            let final_bytes = self.output_final_bytes;
            dest[..final_bytes].copy_from_slice(&data[..final_bytes]);
            dest[final_bytes..].fill(0);
        } else {
            dest.copy_from_slice(data);
        }

        self.row_count += 1;
        debug_assert!(self.row_count <= self.block_count);

        if self.row_count != self.block_count {
            return Ok(DecodeStatus::NeedMore);
        }

        // All N original ids received: nothing to solve yet
        if self.all_original {
            if !self.is_all_original_data() {
                self.all_original = false;
                return Err(CodecError::InvalidInput);
            }
            self.solved = true;
            return Ok(DecodeStatus::Decoded);
        }

        match self.solve_matrix()? {
            true => {
                self.generate_recovery_blocks();
                self.solved = true;
                Ok(DecodeStatus::Decoded)
            }
            false => Ok(DecodeStatus::NeedMore),
        }
    }

    /// Verify that every original id 0..N was seen exactly once.
    fn is_all_original_data(&self) -> bool {
        let mut copied = vec![false; self.block_count as usize];
        let mut seen = 0usize;
        for row in self.peel_rows.iter().take(self.row_count as usize) {
            let id = row.recovery_id;
            if id < self.block_count as u32 && !copied[id as usize] {
                copied[id as usize] = true;
                seen += 1;
            }
        }
        seen >= self.block_count as usize
    }

    /// Copy received originals through and regenerate the rest.
    fn reconstruct_output(&self, message_out: &mut [u8]) -> Result<(), CodecError> {
        if !self.solved {
            return Err(CodecError::InvalidInput);
        }
        let expected =
            self.block_bytes as u64 * (self.block_count as u64 - 1) + self.output_final_bytes as u64;
        if message_out.len() as u64 != expected {
            return Err(CodecError::InvalidInput);
        }

        let n = self.block_count as usize;
        let bb = self.block_bytes;

        let mut copied = vec![false; n];

        // Copy any original message rows that were received
        for (row_i, row) in self.peel_rows.iter().enumerate().take(self.row_count as usize) {
            let block_id = row.recovery_id as usize;
            if block_id < n {
                let bytes = if block_id != n - 1 {
                    bb
                } else {
                    self.output_final_bytes
                };
                message_out[block_id * bb..block_id * bb + bytes]
                    .copy_from_slice(&self.input_row(row_i)[..bytes]);
                copied[block_id] = true;
            }
        }

        // Regenerate any rows that got lost
        for block_id in 0..n {
            if copied[block_id] {
                continue;
            }
            let bytes = if block_id + 1 == n {
                self.output_final_bytes
            } else {
                bb
            };
            let dest = &mut message_out[block_id * bb..block_id * bb + bytes];
            self.regenerate_block(block_id as u32, dest);
        }

        Ok(())
    }

    /// Reconstruct a single original block.
    fn reconstruct_block(&self, block_id: u32, out: &mut [u8]) -> Result<usize, CodecError> {
        if !self.solved || block_id >= self.block_count as u32 {
            return Err(CodecError::InvalidInput);
        }

        // If the decoder saw only original data, copy from the input rows
        if self.all_original {
            for (row_i, row) in self.peel_rows.iter().enumerate().take(self.row_count as usize) {
                if row.recovery_id == block_id {
                    let bytes = if block_id + 1 == self.block_count as u32 {
                        self.output_final_bytes
                    } else {
                        self.block_bytes
                    };
                    if out.len() < bytes {
                        return Err(CodecError::InvalidInput);
                    }
                    out[..bytes].copy_from_slice(&self.input_row(row_i)[..bytes]);
                    return Ok(bytes);
                }
            }
            return Err(CodecError::InvalidInput);
        }

        let bytes = if block_id + 1 == self.block_count as u32 {
            self.output_final_bytes
        } else {
            self.block_bytes
        };
        if out.len() < bytes {
            return Err(CodecError::InvalidInput);
        }
        self.regenerate_block(block_id, &mut out[..bytes]);
        Ok(bytes)
    }

    /// Regenerate one original block from the recovery set.
    fn regenerate_block(&self, block_id: u32, dest: &mut [u8]) {
        let bytes = dest.len();
        let n = self.block_count as usize;

        let params = self.row_params(block_id);
        let mut iter = self.peel_iter(&params);
        let mix = self.mix_cols(&params);

        let peel_0 = iter.next().expect("row has at least one column") as usize;
        let first = &self.rb(peel_0)[..bytes];

        if let Some(peel_1) = iter.next() {
            gf256::addset_mem(dest, first, &self.rb(peel_1 as usize)[..bytes]);
            for peel_x in iter {
                gf256::add_mem(dest, &self.rb(peel_x as usize)[..bytes]);
            }
            gf256::add_mem(dest, &self.rb(n + mix[0] as usize)[..bytes]);
        } else {
            gf256::addset_mem(dest, first, &self.rb(n + mix[0] as usize)[..bytes]);
        }

        gf256::add2_mem(
            dest,
            &self.rb(n + mix[1] as usize)[..bytes],
            &self.rb(n + mix[2] as usize)[..bytes],
        );
    }

    /// Convert decoder state so `encode` works for arbitrary ids.
    fn initialize_encoder_from_decoder(&mut self) -> Result<(), CodecError> {
        if !self.solved || self.row_count < self.block_count {
            return Err(CodecError::InvalidInput);
        }

        // All originals received: the peeler is primed but the solver was
        // skipped; run it now to build the recovery set.
        if self.all_original {
            match self.solve_matrix()? {
                true => self.generate_recovery_blocks(),
                false => return Err(CodecError::BadPeelSeed),
            }
        }

        self.input_final_bytes = self.output_final_bytes;
        Ok(())
    }
}

/// Disjoint (mutable, shared) views of two stride-sized rows of one buffer.
#[inline]
fn split_two<T>(buf: &mut [T], stride: usize, dst: usize, src: usize) -> (&mut [T], &[T]) {
    debug_assert_ne!(dst, src);
    if dst < src {
        let (lo, hi) = buf.split_at_mut(src * stride);
        (&mut lo[dst * stride..(dst + 1) * stride], &hi[..stride])
    } else {
        let (lo, hi) = buf.split_at_mut(dst * stride);
        (&mut hi[..stride], &lo[src * stride..(src + 1) * stride])
    }
}

// ─── Public Handles ─────────────────────────────────────────────────────────

/// Rateless encoder: owns a solved recovery set and produces blocks on
/// demand.
pub struct Encoder {
    codec: Codec,
}

impl Encoder {
    /// Build an encoder over `message`, split into blocks of `block_bytes`.
    pub fn new(message: &[u8], block_bytes: usize) -> Result<Encoder, CodecError> {
        Self::build(message, block_bytes, None)
    }

    /// Build with explicit `(dense_count, peel_seed, dense_seed)`, for
    /// table work and tests.
    pub fn with_seeds(
        message: &[u8],
        block_bytes: usize,
        dense_count: u16,
        peel_seed: u16,
        dense_seed: u16,
    ) -> Result<Encoder, CodecError> {
        Self::build(message, block_bytes, Some((dense_count, peel_seed, dense_seed)))
    }

    fn build(
        message: &[u8],
        block_bytes: usize,
        seeds: Option<(u16, u16, u16)>,
    ) -> Result<Encoder, CodecError> {
        let mut codec = Codec::new(seeds)?;
        codec.initialize_encoder(message.len() as u64, block_bytes)?;
        codec.encode_feed(message)?;
        Ok(Encoder { codec })
    }

    /// Generate block `block_id` into `out`; returns the bytes written.
    pub fn encode(&self, block_id: u32, out: &mut [u8]) -> Result<usize, CodecError> {
        self.codec.encode(block_id, out)
    }

    /// Number of blocks the message splits into.
    pub fn block_count(&self) -> u16 {
        self.codec.block_count
    }

    /// Size of every block except possibly the last original one.
    pub fn block_bytes(&self) -> usize {
        self.codec.block_bytes
    }

    /// Length of the last original block.
    pub fn final_bytes(&self) -> usize {
        self.codec.input_final_bytes
    }
}

/// Rateless decoder: accumulates blocks in any order and reconstructs the
/// message.
pub struct Decoder {
    codec: Codec,
}

impl Decoder {
    /// Build a decoder for a `message_bytes`-long message in blocks of
    /// `block_bytes`.
    pub fn new(message_bytes: u64, block_bytes: usize) -> Result<Decoder, CodecError> {
        Self::build(message_bytes, block_bytes, None)
    }

    /// Build with explicit `(dense_count, peel_seed, dense_seed)`.
    pub fn with_seeds(
        message_bytes: u64,
        block_bytes: usize,
        dense_count: u16,
        peel_seed: u16,
        dense_seed: u16,
    ) -> Result<Decoder, CodecError> {
        Self::build(message_bytes, block_bytes, Some((dense_count, peel_seed, dense_seed)))
    }

    fn build(
        message_bytes: u64,
        block_bytes: usize,
        seeds: Option<(u16, u16, u16)>,
    ) -> Result<Decoder, CodecError> {
        let mut codec = Codec::new(seeds)?;
        codec.initialize_decoder(message_bytes, block_bytes)?;
        Ok(Decoder { codec })
    }

    /// Feed one received block.  Each id may be offered at most once.
    pub fn decode(&mut self, block_id: u32, data: &[u8]) -> Result<DecodeStatus, CodecError> {
        self.codec.decode_feed(block_id, data)
    }

    /// Reconstruct the full message after [`DecodeStatus::Decoded`].
    pub fn recover(&self, message_out: &mut [u8]) -> Result<(), CodecError> {
        self.codec.reconstruct_output(message_out)
    }

    /// Reconstruct a single original block; returns the bytes written.
    pub fn recover_block(&self, block_id: u32, out: &mut [u8]) -> Result<usize, CodecError> {
        self.codec.reconstruct_block(block_id, out)
    }

    /// Convert into an encoder that can keep producing blocks.
    pub fn into_encoder(mut self) -> Result<Encoder, CodecError> {
        self.codec.initialize_encoder_from_decoder()?;
        Ok(Encoder { codec: self.codec })
    }

    /// Number of blocks the message splits into.
    pub fn block_count(&self) -> u16 {
        self.codec.block_count
    }

    /// Rows accepted so far.
    pub fn rows_accepted(&self) -> usize {
        self.codec.row_count as usize
    }

    /// Whether the message has been fully solved.
    pub fn is_decoded(&self) -> bool {
        self.codec.solved
    }
}
