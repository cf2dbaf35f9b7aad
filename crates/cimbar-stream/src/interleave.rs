//! # Index Interleaver
//!
//! Partitioned round-robin permutation used to spread adjacent symbols
//! apart before they are laid out spatially.  Each partition is walked in
//! `num_chunks` strides, so neighbors end up `num_chunks` positions apart
//! while partitions stay contiguous.

/// Forward permutation: output position `i` reads input `indices[i]`.
///
/// `num_chunks == 0` yields the identity.  `partitions` must divide
/// `size`.
pub fn interleave_indices(size: usize, num_chunks: usize, partitions: usize) -> Vec<usize> {
    if num_chunks == 0 {
        return (0..size).collect();
    }

    let partition_size = size / partitions.max(1);
    if partition_size == 0 {
        return (0..size).collect();
    }

    let mut indices = Vec::with_capacity(size);
    let mut part = 0;
    while part < size {
        for chunk in 0..num_chunks {
            let mut i = chunk;
            while i < partition_size {
                indices.push(i + part);
                i += num_chunks;
            }
        }
        part += partition_size;
    }
    indices
}

/// Inverse permutation of [`interleave_indices`].
pub fn interleave_reverse(size: usize, num_chunks: usize, partitions: usize) -> Vec<usize> {
    let indices = interleave_indices(size, num_chunks, partitions);
    let mut inverted = vec![0usize; indices.len()];
    for (src, &dst) in indices.iter().enumerate() {
        inverted[dst] = src;
    }
    inverted
}

/// Apply the permutation to a slice.
pub fn interleave<T: Clone>(positions: &[T], num_chunks: usize, partitions: usize) -> Vec<T> {
    interleave_indices(positions.len(), num_chunks, partitions)
        .into_iter()
        .map(|i| positions[i].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_two_single_partition() {
        let pos = [0, 10, 20, 30, 40, 50, 60, 70, 80, 90];

        let indices = interleave_indices(pos.len(), 2, 1);
        assert_eq!(indices, [0, 2, 4, 6, 8, 1, 3, 5, 7, 9]);

        let actual = interleave(&pos, 2, 1);
        assert_eq!(actual, [0, 20, 40, 60, 80, 10, 30, 50, 70, 90]);
    }

    #[test]
    fn partitions_stay_contiguous() {
        let pos: Vec<usize> = (0..20).collect();

        let indices = interleave_indices(pos.len(), 5, 2);
        assert_eq!(
            indices,
            [0, 5, 1, 6, 2, 7, 3, 8, 4, 9, 10, 15, 11, 16, 12, 17, 13, 18, 14, 19]
        );

        let actual = interleave(&pos, 5, 2);
        assert_eq!(actual, indices);
    }

    #[test]
    fn reverse_inverts_forward() {
        let pos = [0, 10, 20, 30, 40, 50, 60, 70, 80, 90];

        let actual = interleave(&pos, 2, 1);
        let invert = interleave_reverse(pos.len(), 2, 1);
        assert_eq!(invert, [0, 5, 1, 6, 2, 7, 3, 8, 4, 9]);

        let reconstructed: Vec<i32> = (0..pos.len()).map(|i| actual[invert[i]]).collect();
        assert_eq!(reconstructed, pos);
    }

    #[test]
    fn forward_then_reverse_is_identity_across_shapes() {
        for &(size, chunks, parts) in &[
            (10usize, 2usize, 1usize),
            (20, 5, 2),
            (12400, 155, 1),
            (64, 7, 4),
            (100, 1, 1),
            (100, 0, 1),
        ] {
            let fwd = interleave_indices(size, chunks, parts);
            let rev = interleave_reverse(size, chunks, parts);
            for i in 0..size {
                assert_eq!(fwd[rev[i]], i, "size={size} chunks={chunks} parts={parts}");
            }
        }
    }

    #[test]
    fn identity_when_chunking_disabled() {
        let indices = interleave_indices(7, 0, 3);
        assert_eq!(indices, [0, 1, 2, 3, 4, 5, 6]);
    }
}
