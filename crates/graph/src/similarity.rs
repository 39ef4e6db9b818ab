//! Title similarity
//!
//! Search is lexical and always returns its closest hit, so a hit must be
//! confirmed to be the same paper before a graph is built for it.

use std::collections::HashMap;

/// Default acceptance threshold for [`TitleMatcher`]
pub const DEFAULT_THRESHOLD: f64 = 0.78;

/// Accepts two titles as the same paper when their similarity exceeds a threshold
#[derive(Debug, Clone, Copy)]
pub struct TitleMatcher {
    threshold: f64,
}

impl Default for TitleMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl TitleMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// True iff `score(a, b)` is strictly above the threshold
    pub fn matches(&self, a: &str, b: &str) -> bool {
        score(a, b) > self.threshold
    }
}

/// Dice coefficient over character bigrams, in `0.0..=1.0`.
///
/// Case and whitespace are ignored. Bigrams are counted as a multiset so
/// repeated pairs only match as often as they occur in both titles.
pub fn score(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);

    if a == b {
        return 1.0;
    }
    if a.len() < 2 || b.len() < 2 {
        return 0.0;
    }

    let mut remaining: HashMap<(char, char), usize> = HashMap::new();
    for pair in a.windows(2) {
        *remaining.entry((pair[0], pair[1])).or_insert(0) += 1;
    }

    let mut shared = 0usize;
    for pair in b.windows(2) {
        if let Some(count) = remaining.get_mut(&(pair[0], pair[1])) {
            if *count > 0 {
                *count -= 1;
                shared += 1;
            }
        }
    }

    (2 * shared) as f64 / ((a.len() - 1) + (b.len() - 1)) as f64
}

fn normalize(title: &str) -> Vec<char> {
    title
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}
