//! # GF(256) Math Kernel
//!
//! Bulk XOR, scalar multiply and fused multiply-add over GF(2^8) with
//! generator polynomial `0x15F`, backed by log/exp/mul/div/inv/sqr tables
//! plus per-`y` nibble tables for the vectorized multiply-add.
//!
//! Addition is carried over the base field GF(2), i.e. XOR between memory
//! buffers.  Multiplication splits each byte into its high and low nibble
//! and combines two 16-entry table lookups:
//!
//! ```text
//! z = TABLE_LO_y(x[0..4]) ^ TABLE_HI_y(x[4..8])
//! ```
//!
//! which maps directly onto a byte-shuffle instruction.  Three backends are
//! provided: a scalar table loop, a 128-bit shuffle path (SSSE3), and a
//! 256-bit path (AVX2).  The backend is chosen once at [`init`] time and
//! every backend produces identical output; [`init`] verifies the whole
//! kernel with a self-test before publishing the context.

use crate::CodecError;
use once_cell::sync::OnceCell;

// ─── Generator Polynomial ───────────────────────────────────────────────────

/// The 16 irreducible polynomials for GF(2^8), sans leading/trailing bits.
const GEN_POLY: [u8; 16] = [
    0x8e, 0x95, 0x96, 0xa6, 0xaf, 0xb1, 0xb2, 0xb4, 0xb8, 0xc3, 0xc6, 0xd4, 0xe1, 0xe7, 0xf3,
    0xfa,
];

/// Index of the polynomial this codec is defined over: `(0xa6 << 1) | 1 = 0x15F`.
const POLY_INDEX: usize = 3;

/// Sentinel stored in `LOG[0]`; lands in the zero tail of the exp table.
const LOG_ZERO: u16 = 512;

// ─── Backend Selection ──────────────────────────────────────────────────────

/// Bulk-op implementation chosen at init time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Portable 64-bit word / table loop.
    Scalar,
    /// 128-bit nibble-shuffle lanes.
    #[cfg(target_arch = "x86_64")]
    Wide128,
    /// 256-bit nibble-shuffle lanes.
    #[cfg(target_arch = "x86_64")]
    Wide256,
}

fn detect_backend() -> Backend {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return Backend::Wide256;
        }
        if is_x86_feature_detected!("ssse3") {
            return Backend::Wide128;
        }
    }
    Backend::Scalar
}

// ─── Context ────────────────────────────────────────────────────────────────

/// Process-wide immutable GF(256) table context.
pub struct Gf256 {
    /// `MUL[y][x] = x * y`
    mul: Box<[[u8; 256]; 256]>,
    /// `DIV[y][x] = x / y` (`DIV[0]` is all zero)
    div: Box<[[u8; 256]; 256]>,
    /// `INV[x] = 1 / x` (`INV[0] = 0`)
    inv: [u8; 256],
    /// `SQR[x] = x * x`
    sqr: [u8; 256],
    /// `LOG[x]`, with `LOG[0] = 512` pointing into the zero tail of `EXP`
    log: [u16; 256],
    /// `EXP[i]`: one full cycle, a duplicate cycle for wrap-free addition of
    /// two logs, then zeros so the `LOG[0]` sentinel multiplies to zero
    exp: Box<[u8; 1025]>,
    /// Per-`y` partial products of the low nibble
    table_lo: Box<[[u8; 16]; 256]>,
    /// Per-`y` partial products of the high nibble
    table_hi: Box<[[u8; 16]; 256]>,
    backend: Backend,
}

static CTX: OnceCell<Box<Gf256>> = OnceCell::new();

/// One-shot initialization of the GF(256) context.
///
/// Builds every table, runs the kernel self-test, and publishes the context
/// for the rest of the process.  Idempotent; safe to call from multiple
/// threads.  Fails with [`CodecError::UnsupportedPlatform`] when the host
/// byte order is unexpected or the self-test does not pass.
pub fn init() -> Result<(), CodecError> {
    if CTX.get().is_some() {
        return Ok(());
    }

    // The wire formats above this kernel assume a little-endian host.
    if u32::from_ne_bytes([4, 3, 2, 1]) != 0x0102_0304 {
        return Err(CodecError::UnsupportedPlatform);
    }

    let ctx = Gf256::build(detect_backend());
    if !ctx.self_test() {
        return Err(CodecError::UnsupportedPlatform);
    }

    // A racing thread may have published first; either context is identical.
    let _ = CTX.set(ctx);
    Ok(())
}

/// Fetch the process-wide context, failing if [`init`] has not succeeded.
pub fn ctx() -> Result<&'static Gf256, CodecError> {
    CTX.get()
        .map(|b| b.as_ref())
        .ok_or(CodecError::UnsupportedPlatform)
}

impl Gf256 {
    fn build(backend: Backend) -> Box<Gf256> {
        let poly: u16 = ((GEN_POLY[POLY_INDEX] as u16) << 1) | 1;

        let mut exp = Box::new([0u8; 1025]);
        let mut log = [0u16; 256];

        log[0] = LOG_ZERO;
        exp[0] = 1;
        for jj in 1..255 {
            let mut next = (exp[jj - 1] as u16) * 2;
            if next >= 256 {
                next ^= poly;
            }
            exp[jj] = next as u8;
            log[exp[jj] as usize] = jj as u16;
        }
        exp[255] = exp[0];
        for jj in 256..2 * 255 {
            exp[jj] = exp[jj % 255];
        }
        exp[2 * 255] = 1;
        // Remaining entries stay zero so the LOG[0] sentinel maps to zero.

        let mut mul = Box::new([[0u8; 256]; 256]);
        let mut div = Box::new([[0u8; 256]; 256]);
        for y in 1..256usize {
            let log_y = log[y];
            let log_yn = 255 - log_y;
            for x in 1..256usize {
                let log_x = log[x];
                mul[y][x] = exp[(log_x + log_y) as usize];
                div[y][x] = exp[(log_x + log_yn) as usize];
            }
        }

        let mut inv = [0u8; 256];
        let mut sqr = [0u8; 256];
        for x in 0..256usize {
            inv[x] = div[x][1];
            sqr[x] = mul[x][x];
        }

        let mut table_lo = Box::new([[0u8; 16]; 256]);
        let mut table_hi = Box::new([[0u8; 16]; 256]);
        for y in 0..256usize {
            for x in 0..16usize {
                table_lo[y][x] = mul[y][x];
                table_hi[y][x] = mul[y][x << 4];
            }
        }

        Box::new(Gf256 {
            mul,
            div,
            inv,
            sqr,
            log,
            exp,
            table_lo,
            table_hi,
            backend,
        })
    }

    /// Active bulk-op backend.
    pub fn backend(&self) -> Backend {
        self.backend
    }

    // ─── Scalar Ops ─────────────────────────────────────────────────────────

    /// `x * y`
    #[inline]
    pub fn mul(&self, x: u8, y: u8) -> u8 {
        self.mul[y as usize][x as usize]
    }

    /// `x / y`; `DIV[0][x]` is defined as zero
    #[inline]
    pub fn div(&self, x: u8, y: u8) -> u8 {
        self.div[y as usize][x as usize]
    }

    /// `1 / x`; `INV[0]` is defined as zero
    #[inline]
    pub fn inv(&self, x: u8) -> u8 {
        self.inv[x as usize]
    }

    /// `x * x`
    #[inline]
    pub fn sqr(&self, x: u8) -> u8 {
        self.sqr[x as usize]
    }

    /// `log(x)`, with the out-of-band sentinel for zero
    #[inline]
    pub fn log(&self, x: u8) -> u16 {
        self.log[x as usize]
    }

    /// `exp(i)` over the doubled table
    #[inline]
    pub fn exp(&self, i: u16) -> u8 {
        self.exp[i as usize]
    }

    // ─── Bulk Ops ───────────────────────────────────────────────────────────

    /// `z[i] = x[i] * y`
    pub fn mul_mem(&self, z: &mut [u8], x: &[u8], y: u8) {
        debug_assert_eq!(z.len(), x.len());
        if y == 0 {
            z.fill(0);
            return;
        }
        if y == 1 {
            z.copy_from_slice(x);
            return;
        }
        let row = &self.mul[y as usize];
        for (zi, xi) in z.iter_mut().zip(x.iter()) {
            *zi = row[*xi as usize];
        }
    }

    /// `x[i] *= y` in place
    pub fn mul_mem_in_place(&self, x: &mut [u8], y: u8) {
        if y == 0 {
            x.fill(0);
            return;
        }
        if y == 1 {
            return;
        }
        let row = &self.mul[y as usize];
        for xi in x.iter_mut() {
            *xi = row[*xi as usize];
        }
    }

    /// `z[i] = x[i] / y`
    pub fn div_mem(&self, z: &mut [u8], x: &[u8], y: u8) {
        self.mul_mem(z, x, self.inv(y));
    }

    /// `x[i] /= y` in place
    pub fn div_mem_in_place(&self, x: &mut [u8], y: u8) {
        self.mul_mem_in_place(x, self.inv(y));
    }

    /// `z[i] ^= x[i] * y`
    pub fn muladd_mem(&self, z: &mut [u8], y: u8, x: &[u8]) {
        debug_assert_eq!(z.len(), x.len());
        match y {
            0 => return,
            1 => {
                add_mem(z, x);
                return;
            }
            _ => {}
        }

        match self.backend {
            #[cfg(target_arch = "x86_64")]
            Backend::Wide256 => unsafe { self.muladd_mem_avx2(z, y, x) },
            #[cfg(target_arch = "x86_64")]
            Backend::Wide128 => unsafe { self.muladd_mem_ssse3(z, y, x) },
            Backend::Scalar => self.muladd_mem_scalar(z, y, x),
        }
    }

    fn muladd_mem_scalar(&self, z: &mut [u8], y: u8, x: &[u8]) {
        let row = &self.mul[y as usize];
        for (zi, xi) in z.iter_mut().zip(x.iter()) {
            *zi ^= row[*xi as usize];
        }
    }

    #[cfg(target_arch = "x86_64")]
    #[target_feature(enable = "ssse3")]
    unsafe fn muladd_mem_ssse3(&self, z: &mut [u8], y: u8, x: &[u8]) {
        use std::arch::x86_64::*;

        let table_lo = _mm_loadu_si128(self.table_lo[y as usize].as_ptr() as *const __m128i);
        let table_hi = _mm_loadu_si128(self.table_hi[y as usize].as_ptr() as *const __m128i);
        let clr_mask = _mm_set1_epi8(0x0f);

        let lanes = z.len() / 16;
        let zp = z.as_mut_ptr();
        let xp = x.as_ptr();
        for i in 0..lanes {
            let xv = _mm_loadu_si128(xp.add(i * 16) as *const __m128i);
            let lo = _mm_shuffle_epi8(table_lo, _mm_and_si128(xv, clr_mask));
            let hi = _mm_shuffle_epi8(
                table_hi,
                _mm_and_si128(_mm_srli_epi64(xv, 4), clr_mask),
            );
            let prod = _mm_xor_si128(lo, hi);
            let zv = _mm_loadu_si128(zp.add(i * 16) as *const __m128i);
            _mm_storeu_si128(zp.add(i * 16) as *mut __m128i, _mm_xor_si128(zv, prod));
        }

        let done = lanes * 16;
        self.muladd_mem_scalar(&mut z[done..], y, &x[done..]);
    }

    #[cfg(target_arch = "x86_64")]
    #[target_feature(enable = "avx2")]
    unsafe fn muladd_mem_avx2(&self, z: &mut [u8], y: u8, x: &[u8]) {
        use std::arch::x86_64::*;

        let lo128 = _mm_loadu_si128(self.table_lo[y as usize].as_ptr() as *const __m128i);
        let hi128 = _mm_loadu_si128(self.table_hi[y as usize].as_ptr() as *const __m128i);
        let table_lo = _mm256_broadcastsi128_si256(lo128);
        let table_hi = _mm256_broadcastsi128_si256(hi128);
        let clr_mask = _mm256_set1_epi8(0x0f);

        let lanes = z.len() / 32;
        let zp = z.as_mut_ptr();
        let xp = x.as_ptr();
        for i in 0..lanes {
            let xv = _mm256_loadu_si256(xp.add(i * 32) as *const __m256i);
            let lo = _mm256_shuffle_epi8(table_lo, _mm256_and_si256(xv, clr_mask));
            let hi = _mm256_shuffle_epi8(
                table_hi,
                _mm256_and_si256(_mm256_srli_epi64(xv, 4), clr_mask),
            );
            let prod = _mm256_xor_si256(lo, hi);
            let zv = _mm256_loadu_si256(zp.add(i * 32) as *const __m256i);
            _mm256_storeu_si256(zp.add(i * 32) as *mut __m256i, _mm256_xor_si256(zv, prod));
        }

        let done = lanes * 32;
        if done < z.len() {
            self.muladd_mem_ssse3(&mut z[done..], y, &x[done..]);
        }
    }

    // ─── Self-Test ──────────────────────────────────────────────────────────

    /// Exercise the whole kernel before publishing the context.
    fn self_test(&self) -> bool {
        // Multiply/divide round-trip over the entire field.
        for i in 0..=255u16 {
            for j in 0..=255u16 {
                let (i, j) = (i as u8, j as u8);
                let prod = self.mul(i, j);
                if i != 0 && j != 0 {
                    if self.div(prod, i) != j || self.div(prod, j) != i {
                        return false;
                    }
                } else if prod != 0 {
                    return false;
                }
                if j == 1 && prod != i {
                    return false;
                }
            }
        }

        // Bulk ops on an awkward length, with guard bytes past the end.
        const LEN: usize = 32 + 16 + 8 + 4 + 2 + 1;
        let mut a = [0u8; LEN + 1];
        let mut b = [0u8; LEN + 1];
        let mut c = [0u8; LEN + 1];
        a[LEN] = 0x5a;
        b[LEN] = 0x5a;
        c[LEN] = 0x5a;

        a[..LEN].fill(0x1f);
        b[..LEN].fill(0xf7);
        add_mem(&mut a[..LEN], &b[..LEN]);
        if a[..LEN].iter().any(|&v| v != 0x1f ^ 0xf7) {
            return false;
        }

        a[..LEN].fill(0x1f);
        b[..LEN].fill(0xf7);
        c[..LEN].fill(0x71);
        add2_mem(&mut a[..LEN], &b[..LEN], &c[..LEN]);
        if a[..LEN].iter().any(|&v| v != 0x1f ^ 0xf7 ^ 0x71) {
            return false;
        }

        a[..LEN].fill(0x55);
        b[..LEN].fill(0xaa);
        c[..LEN].fill(0x6c);
        addset_mem(&mut a[..LEN], &b[..LEN], &c[..LEN]);
        if a[..LEN].iter().any(|&v| v != 0xaa ^ 0x6c) {
            return false;
        }

        a[..LEN].fill(0xff);
        b[..LEN].fill(0xaa);
        let expected = self.mul(0xaa, 0x6c) ^ 0xff;
        self.muladd_mem(&mut a[..LEN], 0x6c, &b[..LEN]);
        if a[..LEN].iter().any(|&v| v != expected) {
            return false;
        }

        a[..LEN].fill(0xff);
        b[..LEN].fill(0x55);
        let expected = self.mul(0xa2, 0x55);
        self.mul_mem(&mut a[..LEN], &b[..LEN], 0xa2);
        if a[..LEN].iter().any(|&v| v != expected) {
            return false;
        }

        a[LEN] == 0x5a && b[LEN] == 0x5a && c[LEN] == 0x5a
    }
}

// ─── Table-Free Bulk Ops ────────────────────────────────────────────────────

/// `x[i] ^= y[i]`
pub fn add_mem(x: &mut [u8], y: &[u8]) {
    debug_assert_eq!(x.len(), y.len());
    let mut xw = x.chunks_exact_mut(8);
    let mut yw = y.chunks_exact(8);
    for (a, b) in (&mut xw).zip(&mut yw) {
        let v = u64::from_ne_bytes(a.try_into().unwrap()) ^ u64::from_ne_bytes(b.try_into().unwrap());
        a.copy_from_slice(&v.to_ne_bytes());
    }
    for (a, b) in xw.into_remainder().iter_mut().zip(yw.remainder()) {
        *a ^= *b;
    }
}

/// `z[i] ^= x[i] ^ y[i]`
pub fn add2_mem(z: &mut [u8], x: &[u8], y: &[u8]) {
    debug_assert_eq!(z.len(), x.len());
    debug_assert_eq!(z.len(), y.len());
    let mut zw = z.chunks_exact_mut(8);
    let mut xw = x.chunks_exact(8);
    let mut yw = y.chunks_exact(8);
    for ((a, b), c) in (&mut zw).zip(&mut xw).zip(&mut yw) {
        let v = u64::from_ne_bytes(a.try_into().unwrap())
            ^ u64::from_ne_bytes(b.try_into().unwrap())
            ^ u64::from_ne_bytes(c.try_into().unwrap());
        a.copy_from_slice(&v.to_ne_bytes());
    }
    for ((a, b), c) in zw
        .into_remainder()
        .iter_mut()
        .zip(xw.remainder())
        .zip(yw.remainder())
    {
        *a ^= *b ^ *c;
    }
}

/// `z[i] = x[i] ^ y[i]`
pub fn addset_mem(z: &mut [u8], x: &[u8], y: &[u8]) {
    debug_assert_eq!(z.len(), x.len());
    debug_assert_eq!(z.len(), y.len());
    let mut zw = z.chunks_exact_mut(8);
    let mut xw = x.chunks_exact(8);
    let mut yw = y.chunks_exact(8);
    for ((a, b), c) in (&mut zw).zip(&mut xw).zip(&mut yw) {
        let v =
            u64::from_ne_bytes(b.try_into().unwrap()) ^ u64::from_ne_bytes(c.try_into().unwrap());
        a.copy_from_slice(&v.to_ne_bytes());
    }
    for ((a, b), c) in zw
        .into_remainder()
        .iter_mut()
        .zip(xw.remainder())
        .zip(yw.remainder())
    {
        *a = *b ^ *c;
    }
}

/// Swap two equal-length buffers in place.
pub fn memswap(x: &mut [u8], y: &mut [u8]) {
    debug_assert_eq!(x.len(), y.len());
    x.swap_with_slice(y);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel() -> &'static Gf256 {
        init().expect("gf256 init");
        ctx().unwrap()
    }

    #[test]
    fn mul_div_roundtrip_full_field() {
        let gf = kernel();
        for x in 0..=255u8 {
            for y in 1..=255u8 {
                assert_eq!(gf.div(gf.mul(x, y), y), x, "x={x} y={y}");
            }
            assert_eq!(gf.mul(x, 1), x);
            assert_eq!(gf.mul(x, 0), 0);
        }
    }

    #[test]
    fn inverse_is_multiplicative() {
        let gf = kernel();
        for x in 1..=255u8 {
            assert_eq!(gf.mul(x, gf.inv(x)), 1, "x={x}");
        }
    }

    #[test]
    fn square_matches_mul() {
        let gf = kernel();
        for x in 0..=255u8 {
            assert_eq!(gf.sqr(x), gf.mul(x, x));
        }
    }

    #[test]
    fn log_exp_recover_each_other() {
        let gf = kernel();
        for x in 1..=255u8 {
            assert_eq!(gf.exp(gf.log(x)), x);
        }
    }

    #[test]
    fn muladd_matches_scalar_reference() {
        let gf = kernel();
        let x: Vec<u8> = (0..193u32).map(|i| (i * 7 + 3) as u8).collect();
        let mut z: Vec<u8> = (0..193u32).map(|i| (i * 13 + 1) as u8).collect();
        let mut expected = z.clone();
        for y in [0u8, 1, 2, 0x8e, 0xff] {
            gf.muladd_mem(&mut z, y, &x);
            for (e, xi) in expected.iter_mut().zip(x.iter()) {
                *e ^= gf.mul(*xi, y);
            }
            assert_eq!(z, expected, "y={y}");
        }
    }

    #[test]
    fn mul_mem_fast_paths() {
        let gf = kernel();
        let x = vec![0x37u8; 41];
        let mut z = vec![0xEEu8; 41];
        gf.mul_mem(&mut z, &x, 0);
        assert!(z.iter().all(|&v| v == 0));
        gf.mul_mem(&mut z, &x, 1);
        assert_eq!(z, x);
    }

    #[test]
    fn div_mem_in_place_undoes_mul() {
        let gf = kernel();
        let orig: Vec<u8> = (0..100u32).map(|i| (i * 31) as u8).collect();
        let mut buf = orig.clone();
        gf.mul_mem_in_place(&mut buf, 0x42);
        gf.div_mem_in_place(&mut buf, 0x42);
        assert_eq!(buf, orig);
    }

    #[test]
    fn add_ops_are_xor() {
        let mut a = vec![0x0Fu8; 37];
        let b = vec![0xF0u8; 37];
        let c = vec![0x3Cu8; 37];
        add_mem(&mut a, &b);
        assert!(a.iter().all(|&v| v == 0xFF));
        add2_mem(&mut a, &b, &c);
        assert!(a.iter().all(|&v| v == 0xFF ^ 0xF0 ^ 0x3C));
        addset_mem(&mut a, &b, &c);
        assert!(a.iter().all(|&v| v == 0xF0 ^ 0x3C));
    }

    #[test]
    fn memswap_swaps() {
        let mut a = vec![1u8; 9];
        let mut b = vec![2u8; 9];
        memswap(&mut a, &mut b);
        assert!(a.iter().all(|&v| v == 2));
        assert!(b.iter().all(|&v| v == 1));
    }
}
