use crate::{Result, SyntheticsError};
use futures::future::{BoxFuture, join_all};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use std::time::Instant;

static PROCESS_START: Lazy<Instant> = Lazy::new(Instant::now);

/// Wall clock timestamp in microseconds since the unix epoch.
pub fn get_timestamp() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

/// Wall clock time in fractional seconds, used by network entries.
pub fn epoch_time_in_seconds() -> f64 {
    get_timestamp() as f64 / 1e6
}

/// Monotonic clock in seconds. Journey and step start/end use it so
/// durations are immune to wall clock adjustments.
pub fn monotonic_time_in_seconds() -> f64 {
    PROCESS_START.elapsed().as_secs_f64()
}

pub fn duration_in_us(seconds: f64) -> i64 {
    (seconds * 1e6).trunc() as i64
}

pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("synthetics")
}

/// Runs every callback concurrently and waits for all of them. The first
/// error (in registration order) is returned once the whole phase settles.
pub async fn run_parallel<E>(
    futures: Vec<BoxFuture<'_, std::result::Result<(), E>>>,
) -> std::result::Result<(), E> {
    join_all(futures).await.into_iter().collect()
}

/// Glob matcher supporting `*`, `**`, `?`, character classes, `{a,b}`
/// alternation and leading `!` negation.
#[derive(Debug, Clone)]
pub struct GlobSet {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl GlobSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            match pattern.strip_prefix('!') {
                Some(negated) => exclude.push(glob_to_regex(negated)?),
                None => include.push(glob_to_regex(pattern)?),
            }
        }
        Ok(Self { include, exclude })
    }

    pub fn is_match(&self, value: &str) -> bool {
        if self.exclude.iter().any(|re| re.is_match(value)) {
            return false;
        }
        if self.include.is_empty() {
            return !self.exclude.is_empty();
        }
        self.include.iter().any(|re| re.is_match(value))
    }

    /// Returns the subset of `values` matched by the set.
    pub fn matches<'a, S: AsRef<str>>(&self, values: &'a [S]) -> Vec<&'a str> {
        values
            .iter()
            .map(|v| v.as_ref())
            .filter(|v| self.is_match(v))
            .collect()
    }
}

pub fn glob_match(value: &str, pattern: &str) -> bool {
    GlobSet::new(&[pattern])
        .map(|set| set.is_match(value))
        .unwrap_or(false)
}

fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut re = String::with_capacity(pattern.len() * 2 + 2);
    re.push('^');
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    let mut brace_depth = 0usize;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    re.push_str(".*");
                    i += 1;
                } else {
                    re.push_str("[^/]*");
                }
            }
            '?' => re.push_str("[^/]"),
            '[' => {
                if let Some(end) = chars[i + 1..].iter().position(|&ch| ch == ']') {
                    let class: String = chars[i + 1..i + 1 + end].iter().collect();
                    let class = class
                        .strip_prefix('!')
                        .map(|rest| format!("^{rest}"))
                        .unwrap_or(class);
                    re.push('[');
                    re.push_str(&class.replace('\\', "\\\\"));
                    re.push(']');
                    i += end + 1;
                } else {
                    re.push_str("\\[");
                }
            }
            '{' => {
                brace_depth += 1;
                re.push_str("(?:");
            }
            '}' if brace_depth > 0 => {
                brace_depth -= 1;
                re.push(')');
            }
            ',' if brace_depth > 0 => re.push('|'),
            '\\' => {
                if let Some(next) = chars.get(i + 1) {
                    re.push_str(&regex::escape(&next.to_string()));
                    i += 1;
                }
            }
            other => re.push_str(&regex::escape(&other.to_string())),
        }
        i += 1;
    }

    if brace_depth > 0 {
        return Err(SyntheticsError::General(format!(
            "Unbalanced braces in pattern: {pattern}"
        )));
    }

    re.push('$');
    Regex::new(&re).map_err(|e| SyntheticsError::General(format!("Invalid pattern {pattern}: {e}")))
}
