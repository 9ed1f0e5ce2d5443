//! Longest increasing subsequence.

/// Indices of a longest strictly increasing subsequence of `seq`.
///
/// Zero entries are skipped: in the keyed diff they mark children with no
/// old counterpart, which are mounted rather than kept in place. Ties go to
/// the subsequence ending in the smallest values (patience sorting), so
/// `[4, 2, 1, 3]` yields `[2, 3]`.
///
/// Runs in `O(n log n)`.
pub fn longest_increasing_subsequence(seq: &[usize]) -> Vec<usize> {
    // tails[k]: index of the smallest tail of an increasing run of length k + 1
    let mut tails: Vec<usize> = Vec::with_capacity(seq.len());
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];

    for (i, &value) in seq.iter().enumerate() {
        if value == 0 {
            continue;
        }
        if let Some(&last) = tails.last() {
            if seq[last] < value {
                prev[i] = Some(last);
                tails.push(i);
                continue;
            }
        } else {
            tails.push(i);
            continue;
        }

        let slot = tails.partition_point(|&t| seq[t] < value);
        if slot > 0 {
            prev[i] = Some(tails[slot - 1]);
        }
        tails[slot] = i;
    }

    let mut result = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        result.push(i);
        cursor = prev[i];
    }
    result.reverse();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(seq: &[usize]) -> Vec<usize> {
        longest_increasing_subsequence(seq)
            .into_iter()
            .map(|i| seq[i])
            .collect()
    }

    #[test]
    fn reorder_mapping() {
        assert_eq!(longest_increasing_subsequence(&[4, 2, 1, 3]), vec![2, 3]);
    }

    #[test]
    fn empty_and_all_new() {
        assert!(longest_increasing_subsequence(&[]).is_empty());
        assert!(longest_increasing_subsequence(&[0, 0, 0]).is_empty());
    }

    #[test]
    fn already_sorted_keeps_everything() {
        assert_eq!(longest_increasing_subsequence(&[1, 2, 3, 4]), vec![0, 1, 2, 3]);
    }

    #[test]
    fn reversed_keeps_one() {
        assert_eq!(longest_increasing_subsequence(&[4, 3, 2, 1]).len(), 1);
    }

    #[test]
    fn zeros_are_skipped() {
        assert_eq!(values(&[2, 0, 3, 0, 1, 4]), vec![2, 3, 4]);
        assert_eq!(longest_increasing_subsequence(&[0, 1, 0, 2]), vec![1, 3]);
    }

    #[test]
    fn strictly_increasing() {
        let seq = [3, 1, 5, 2, 6, 4, 9, 7, 8];
        let picked = values(&seq);
        assert_eq!(picked.len(), 5);
        assert!(picked.windows(2).all(|w| w[0] < w[1]));
    }
}
