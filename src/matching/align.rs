// SPDX-License-Identifier: MIT OR Apache-2.0

//! Literal overlap between two texts.
//!
//! Greedy block matching: take the longest common run of the current ranges,
//! then recurse on what lies strictly before and strictly after it. No
//! element is treated as junk, so the result is exact and deterministic.

use std::collections::HashMap;

/// A run of `length` equal characters at `a_start` in the first text and
/// `b_start` in the second. Offsets are in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AlignedBlock {
    pub a_start: usize,
    pub b_start: usize,
    pub length: usize,
}

impl AlignedBlock {
    pub fn a_end(&self) -> usize {
        self.a_start + self.length
    }
}

/// Aligns two strings; see [`align_chars`].
pub fn align(a: &str, b: &str, min_match_length: usize) -> Vec<AlignedBlock> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    align_chars(&a, &b, min_match_length)
}

/// Returns the matching blocks of at least `min_match_length` characters,
/// ordered by `a_start`.
pub fn align_chars(a: &[char], b: &[char], min_match_length: usize) -> Vec<AlignedBlock> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }

    let matcher = BlockMatcher::new(a, b);
    matcher
        .matching_blocks()
        .into_iter()
        .filter(|block| block.length >= min_match_length.max(1))
        .collect()
}

struct BlockMatcher<'a> {
    a: &'a [char],
    b: &'a [char],
    /// Positions of every character in `b`, ascending.
    b2j: HashMap<char, Vec<usize>>,
}

impl<'a> BlockMatcher<'a> {
    fn new(a: &'a [char], b: &'a [char]) -> Self {
        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, &ch) in b.iter().enumerate() {
            b2j.entry(ch).or_default().push(j);
        }
        Self { a, b, b2j }
    }

    /// Longest common run inside `a[alo..ahi]` and `b[blo..bhi]`. Ties go to
    /// the earliest run in `a`, then the earliest in `b`.
    fn longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> AlignedBlock {
        let mut best = AlignedBlock {
            a_start: alo,
            b_start: blo,
            length: 0,
        };
        // (j, length of the run ending at a[i - 1], b[j]), ascending by j.
        let mut prev: Vec<(usize, usize)> = Vec::new();
        let mut next: Vec<(usize, usize)> = Vec::new();

        for i in alo..ahi {
            next.clear();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                let mut cursor = 0;
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let mut k = 1;
                    if j > 0 {
                        while cursor < prev.len() && prev[cursor].0 < j - 1 {
                            cursor += 1;
                        }
                        if cursor < prev.len() && prev[cursor].0 == j - 1 {
                            k = prev[cursor].1 + 1;
                        }
                    }
                    next.push((j, k));
                    if k > best.length {
                        best = AlignedBlock {
                            a_start: i + 1 - k,
                            b_start: j + 1 - k,
                            length: k,
                        };
                    }
                }
            }
            std::mem::swap(&mut prev, &mut next);
        }

        best
    }

    fn matching_blocks(&self) -> Vec<AlignedBlock> {
        let mut queue = vec![(0, self.a.len(), 0, self.b.len())];
        let mut blocks = Vec::new();

        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let block = self.longest_match(alo, ahi, blo, bhi);
            if block.length == 0 {
                continue;
            }
            let (i, j, k) = (block.a_start, block.b_start, block.length);
            blocks.push(block);
            if alo < i && blo < j {
                queue.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                queue.push((i + k, ahi, j + k, bhi));
            }
        }

        blocks.sort();

        let mut merged: Vec<AlignedBlock> = Vec::with_capacity(blocks.len());
        for block in blocks {
            match merged.last_mut() {
                Some(last)
                    if last.a_start + last.length == block.a_start
                        && last.b_start + last.length == block.b_start =>
                {
                    last.length += block.length;
                }
                _ => merged.push(block),
            }
        }
        merged
    }
}
