//! Longest-matching-blocks similarity.
//!
//! `ratio = 2 * M / T` where `M` is the total length of the matching blocks
//! found by recursively taking the longest common substring and recursing on
//! both sides of it, and `T` is the combined length of both inputs. The block
//! search follows the classic Ratcliff/Obershelp formulation, including the
//! rule that characters making up more than 1% of a 200+ char second
//! sequence cannot start a match.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;

const POPULAR_MIN_LEN: usize = 200;

/// Scoring function used by the matcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    #[default]
    SequenceRatio,
    JaroWinkler,
}

impl SimilarityMetric {
    pub fn score(self, a: &str, b: &str) -> f64 {
        match self {
            SimilarityMetric::SequenceRatio => similarity(a, b),
            SimilarityMetric::JaroWinkler => jaro_winkler(a, b),
        }
    }
}

/// Similarity ratio in `[0, 1]` between two (already normalized) strings.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched = BlockMatcher::new(&a, &b).matched_len();
    2.0 * matched as f64 / total as f64
}

struct BlockMatcher<'a> {
    a: &'a [char],
    b: &'a [char],
    b2j: HashMap<char, Vec<usize>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    i: usize,
    j: usize,
    size: usize,
}

impl<'a> BlockMatcher<'a> {
    fn new(a: &'a [char], b: &'a [char]) -> Self {
        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, c) in b.iter().enumerate() {
            b2j.entry(*c).or_default().push(j);
        }
        if b.len() >= POPULAR_MIN_LEN {
            let limit = b.len() / 100 + 1;
            b2j.retain(|_, positions| positions.len() <= limit);
        }
        Self { a, b, b2j }
    }

    fn longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> Block {
        let mut best = Block {
            i: alo,
            j: blo,
            size: 0,
        };
        // j2len[j] = length of the match ending at a[i-1], b[j]
        let mut j2len: HashMap<usize, usize> = HashMap::new();
        for i in alo..ahi {
            let mut next: HashMap<usize, usize> = HashMap::new();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j
                        .checked_sub(1)
                        .and_then(|prev| j2len.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    next.insert(j, k);
                    if k > best.size {
                        best = Block {
                            i: i + 1 - k,
                            j: j + 1 - k,
                            size: k,
                        };
                    }
                }
            }
            j2len = next;
        }

        // Popular characters were left out of b2j; let the match grow over them.
        while best.i > alo && best.j > blo && self.a[best.i - 1] == self.b[best.j - 1] {
            best.i -= 1;
            best.j -= 1;
            best.size += 1;
        }
        while best.i + best.size < ahi
            && best.j + best.size < bhi
            && self.a[best.i + best.size] == self.b[best.j + best.size]
        {
            best.size += 1;
        }
        best
    }

    fn matched_len(&self) -> usize {
        let mut total = 0;
        let mut queue = vec![(0, self.a.len(), 0, self.b.len())];
        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let block = self.longest_match(alo, ahi, blo, bhi);
            if block.size == 0 {
                continue;
            }
            total += block.size;
            if alo < block.i && blo < block.j {
                queue.push((alo, block.i, blo, block.j));
            }
            if block.i + block.size < ahi && block.j + block.size < bhi {
                queue.push((block.i + block.size, ahi, block.j + block.size, bhi));
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn identical_and_disjoint_inputs() {
        assert_eq!(similarity("abc", "abc"), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
    }

    #[test]
    fn empty_inputs() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("", "abc"), 0.0);
        assert_eq!(similarity("abc", ""), 0.0);
    }

    #[test]
    fn matches_known_ratios() {
        // difflib.SequenceMatcher(None, "abcd", "bcde").ratio() == 0.75
        assert!(approx(similarity("abcd", "bcde"), 0.75));
        // difflib.SequenceMatcher(None, "iphone 12", "iphone 12 64gb").ratio()
        assert!(approx(similarity("iphone 12", "iphone 12 64gb"), 18.0 / 23.0));
        // two blocks: "ab" and "d"
        assert!(approx(similarity("abxd", "abyd"), 0.75));
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert!(approx(similarity("café", "cafe"), 0.75));
    }

    #[test]
    fn popular_characters_still_extend_matches() {
        // 'a' is popular in b, so it never seeds a match, but the empty match
        // at (0, 0) still grows forward over it.
        let long_b = "a".repeat(250);
        assert!(approx(similarity("aaaa", &long_b), 8.0 / 254.0));

        let mut b = String::from("xyz");
        b.push_str(&"a".repeat(250));
        assert!(approx(similarity("xyza", &b), 8.0 / 257.0));
    }

    #[test]
    fn jaro_winkler_metric_delegates_to_strsim() {
        let score = SimilarityMetric::JaroWinkler.score("iphone 12", "iphone 12 pro");
        assert!(score > 0.9);
        assert_eq!(SimilarityMetric::default(), SimilarityMetric::SequenceRatio);
    }
}
