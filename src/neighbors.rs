/// Every non-decreasing tuple of length `width` with entries in `[lower, upper]`,
/// in lexicographic order.
///
/// This is the candidate neighbourhood for one coordinate window of a run: a
/// window bounded by its neighbouring coordinates can take any of these
/// values without breaking the row's ordering.
#[derive(Debug, Clone)]
pub struct OrderedNeighbors {
    next: Option<Vec<usize>>,
    upper: usize,
}

impl OrderedNeighbors {
    pub fn new(width: usize, lower: usize, upper: usize) -> Self {
        let next = if width == 0 || lower > upper {
            None
        } else {
            Some(vec![lower; width])
        };
        Self { next, upper }
    }

    /// Number of tuples the enumeration yields, `C(upper - lower + width, width)`.
    pub fn neighborhood_size(width: usize, lower: usize, upper: usize) -> u128 {
        if width == 0 || lower > upper {
            return 0;
        }
        multiset_count((upper - lower + 1) as u128, width as u128)
    }
}

impl Iterator for OrderedNeighbors {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.next.take()?;
        // rightmost position that can still grow; everything after it restarts at its new value
        if let Some(pos) = current.iter().rposition(|&v| v < self.upper) {
            let mut following = current.clone();
            let bumped = following[pos] + 1;
            following[pos..].iter_mut().for_each(|v| *v = bumped);
            self.next = Some(following);
        }
        Some(current)
    }
}

/// Multisets of size `k` drawn from `n` values, `C(n + k - 1, k)`, saturating.
pub fn multiset_count(n: u128, k: u128) -> u128 {
    if n == 0 {
        return if k == 0 { 1 } else { 0 };
    }
    let (small, large) = if k < n - 1 { (k, n - 1) } else { (n - 1, k) };
    let mut out: u128 = 1;
    for i in 1..=small {
        // exact at every step: out * (large + i) is divisible by i
        out = match out.checked_mul(large + i) {
            Some(v) => v / i,
            None => return u128::MAX,
        };
    }
    out
}
