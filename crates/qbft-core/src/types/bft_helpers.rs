//! Byzantine thresholds. Every quorum in the protocol (prepare, commit, round change) uses
//! [`quorum_size`].

/// Number of faulty validators tolerated by a set of `validator_count`: `floor((N - 1) / 3)`.
pub fn byzantine_fault_tolerance(validator_count: usize) -> usize {
    validator_count.saturating_sub(1) / 3
}

/// `N - f`. Never exceeds `N`, and for `N = 3f + 1` equals `2f + 1`.
pub fn quorum_size(validator_count: usize) -> usize {
    validator_count - byzantine_fault_tolerance(validator_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_table() {
        let expected = [(1, 1), (2, 2), (3, 3), (4, 3), (5, 4), (6, 5), (7, 5), (10, 7), (100, 67)];
        for (n, quorum) in expected {
            assert_eq!(quorum_size(n), quorum, "quorum for {n} validators");
        }
    }

    #[test]
    fn quorum_is_monotonic_and_bounded() {
        let mut previous = 0;
        for n in 1..=500 {
            let quorum = quorum_size(n);
            assert!(quorum <= n);
            assert!(quorum >= previous);
            previous = quorum;
        }
    }

    #[test]
    fn two_quorums_overlap_in_an_honest_validator() {
        for n in 1..=200 {
            let f = byzantine_fault_tolerance(n);
            assert!(2 * quorum_size(n) > n + f, "n = {n}");
        }
    }
}
