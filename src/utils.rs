use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Element and row counts of a classification run.
///
/// Logs a line at `info` each time the element count crosses a multiple of
/// the interval; workers may record concurrently.
pub struct ClassifyProgress {
    interval: u64,
    elements: AtomicU64,
    rows: AtomicU64,
    started: Instant,
}

impl ClassifyProgress {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            elements: AtomicU64::new(0),
            rows: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn record(&self, elements: u64, rows: u64) {
        let rows = self.rows.fetch_add(rows, Ordering::Relaxed) + rows;
        let before = self.elements.fetch_add(elements, Ordering::Relaxed);
        let after = before + elements;
        if before / self.interval < after / self.interval {
            tracing::info!(
                elements = after,
                rows,
                per_sec = self.rate(after),
                "classifying"
            );
        }
    }

    pub fn elements(&self) -> u64 {
        self.elements.load(Ordering::Relaxed)
    }

    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }

    fn rate(&self, elements: u64) -> u64 {
        let secs = self.started.elapsed().as_secs_f64();
        if secs > 0.0 {
            (elements as f64 / secs) as u64
        } else {
            0
        }
    }

    pub fn finish(&self) {
        let elements = self.elements();
        tracing::info!(
            elements,
            rows = self.rows(),
            secs = self.started.elapsed().as_secs_f64(),
            per_sec = self.rate(elements),
            "classified"
        );
    }
}

/// True if `pattern` contains glob metacharacters.
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Shell-style matching: `*`, `?`, and `[...]` classes with ranges and
/// `^`/`!` negation. An unterminated `[` matches itself.
pub fn glob_match(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();

    let (mut p, mut v) = (0, 0);
    // position after the last `*` and the value position it was tried at
    let mut backtrack: Option<(usize, usize)> = None;

    while v < value.len() {
        let step = match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p + 1, v));
                p += 1;
                continue;
            }
            Some('?') => Some(1),
            Some('[') => match match_class(&pattern[p..], value[v]) {
                Some((true, len)) => Some(len),
                Some((false, _)) => None,
                None => (value[v] == '[').then_some(1),
            },
            Some(&c) => (c == value[v]).then_some(1),
            None => None,
        };

        match step {
            Some(len) => {
                p += len;
                v += 1;
            }
            None => match backtrack {
                Some((star_p, star_v)) => {
                    p = star_p;
                    v = star_v + 1;
                    backtrack = Some((star_p, star_v + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// Match `c` against the class starting at `class[0] == '['`. Returns whether
/// it matched and the length of the class, or `None` if it is unterminated.
fn match_class(class: &[char], c: char) -> Option<(bool, usize)> {
    let mut i = 1;
    let negated = matches!(class.get(i), Some('^' | '!'));
    if negated {
        i += 1;
    }

    let mut matched = false;
    let mut first = true;
    loop {
        let &start = class.get(i)?;
        if start == ']' && !first {
            return Some((matched != negated, i + 1));
        }
        first = false;
        match (class.get(i + 1), class.get(i + 2)) {
            (Some('-'), Some(&end)) if end != ']' => {
                matched |= start <= c && c <= end;
                i += 3;
            }
            _ => {
                matched |= start == c;
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_sums_concurrent_records() {
        let progress = ClassifyProgress::new(10);
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        progress.record(3, 2);
                    }
                });
            }
        });
        assert_eq!(progress.elements(), 300);
        assert_eq!(progress.rows(), 200);
        progress.finish();
    }

    #[test]
    fn zero_interval_is_clamped() {
        let progress = ClassifyProgress::new(0);
        progress.record(1, 0);
        assert_eq!(progress.elements(), 1);
    }

    #[test]
    fn glob_match_supports_star_suffix() {
        assert!(glob_match("*_link", "motorway_link"));
        assert!(!glob_match("*_link", "motorway"));
        assert!(glob_match("note:*", "note:de"));
        assert!(glob_match("*", ""));
    }

    #[test]
    fn glob_match_question_mark_and_classes() {
        assert!(glob_match("name:??", "name:de"));
        assert!(!glob_match("name:??", "name:deu"));
        assert!(glob_match("tiger:[a-c]*", "tiger:county"));
        assert!(!glob_match("tiger:[a-c]*", "tiger:zip"));
        assert!(glob_match("x[^0-9]", "xa"));
        assert!(!glob_match("x[!0-9]", "x5"));
        assert!(glob_match("[]]", "]"));
    }

    #[test]
    fn unterminated_class_is_literal() {
        assert!(glob_match("a[b", "a[b"));
        assert!(!glob_match("a[b", "ab"));
    }

    #[test]
    fn literal_patterns_need_exact_match() {
        assert!(glob_match("created_by", "created_by"));
        assert!(!glob_match("created_by", "created_by_x"));
        assert!(!is_glob("created_by"));
        assert!(is_glob("tiger:*"));
    }
}
