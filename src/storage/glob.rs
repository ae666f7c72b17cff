//! Redis-style glob matching for `KEYS` and `SCAN ... MATCH`.
//!
//! Supported syntax:
//! - `*` matches any run of bytes, including none
//! - `?` matches exactly one byte
//! - `[abc]`, `[a-z]`, `[^a]` match one byte from (or outside) a class
//! - `\x` matches `x` literally
//!
//! Matching is byte-wise so binary key names work too.

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pattern: Vec<u8>,
}

impl GlobPattern {
    pub fn new(pattern: impl AsRef<[u8]>) -> Self {
        Self {
            pattern: pattern.as_ref().to_vec(),
        }
    }

    /// Returns true for the pattern `*`, which every key matches.
    pub fn is_match_all(&self) -> bool {
        self.pattern == b"*"
    }

    /// Iterative matcher: on mismatch it backtracks to the most recent `*`
    /// and lets it swallow one more byte, so `*` runs never recurse.
    pub fn matches(&self, text: &[u8]) -> bool {
        let p = &self.pattern;
        let mut pi = 0;
        let mut ti = 0;
        let mut star: Option<(usize, usize)> = None;

        while ti < text.len() {
            if pi < p.len() && p[pi] == b'*' {
                star = Some((pi, ti));
                pi += 1;
                continue;
            }
            if pi < p.len() {
                if let Some(next) = step(p, pi, text[ti]) {
                    pi = next;
                    ti += 1;
                    continue;
                }
            }
            match star {
                Some((star_pi, star_ti)) => {
                    pi = star_pi + 1;
                    ti = star_ti + 1;
                    star = Some((star_pi, star_ti + 1));
                }
                None => return false,
            }
        }

        while pi < p.len() && p[pi] == b'*' {
            pi += 1;
        }
        pi == p.len()
    }
}

/// Matches the single-byte token at `p[pi]` against `c`, returning the index
/// of the next token on success.
fn step(p: &[u8], pi: usize, c: u8) -> Option<usize> {
    match p[pi] {
        b'?' => Some(pi + 1),
        b'[' => {
            let mut i = pi + 1;
            let negate = p.get(i) == Some(&b'^');
            if negate {
                i += 1;
            }

            let mut matched = false;
            while i < p.len() && p[i] != b']' {
                if p[i] == b'\\' && i + 1 < p.len() {
                    matched |= p[i + 1] == c;
                    i += 2;
                    continue;
                }
                if i + 2 < p.len() && p[i + 1] == b'-' && p[i + 2] != b']' {
                    let (lo, hi) = if p[i] <= p[i + 2] {
                        (p[i], p[i + 2])
                    } else {
                        (p[i + 2], p[i])
                    };
                    matched |= (lo..=hi).contains(&c);
                    i += 3;
                    continue;
                }
                matched |= p[i] == c;
                i += 1;
            }

            // Unterminated class never matches.
            if i >= p.len() {
                return None;
            }
            (matched != negate).then_some(i + 1)
        }
        b'\\' if pi + 1 < p.len() => (p[pi + 1] == c).then_some(pi + 2),
        literal => (literal == c).then_some(pi + 1),
    }
}
