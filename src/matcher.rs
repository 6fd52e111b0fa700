//! Content matcher
//!
//! Pure evaluation of a `ContentExpectation` against a sequence of lines.
//! The same matcher judges stdout, stderr and file contents; `subject` only
//! names the source in descriptions and failure details.

use regex::Regex;
use similar::TextDiff;

use crate::outcome::Outcome;
use crate::spec::ContentExpectation;

/// Compile a pattern in multiline mode with a size limit to mitigate ReDoS.
pub(crate) fn compile_regex(pattern: &str) -> Result<Regex, regex::Error> {
    regex::RegexBuilder::new(&format!("(?m){}", pattern))
        .size_limit(1 << 20)
        .build()
}

/// Judge `actual` against `expectation`.
///
/// `Unset` always passes. Empty input is valid for every mode.
pub fn matches<I, S>(expectation: &ContentExpectation, subject: &str, actual: I) -> Outcome
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let actual: Vec<S> = actual.into_iter().collect();
    let actual: Vec<&str> = actual.iter().map(|s| s.as_ref()).collect();

    match expectation {
        ContentExpectation::Unset => Outcome::pass(format!("{} is not checked", subject)),
        ContentExpectation::Exact(expected) => match_exact(subject, expected, &actual),
        ContentExpectation::Contains(expected) => match_contains(subject, expected, &actual),
        ContentExpectation::MustNotContain(forbidden) => {
            match_must_not_contain(subject, forbidden, &actual)
        }
        ContentExpectation::Regex(pattern) => match_regex(subject, pattern, &actual),
    }
}

fn match_exact(subject: &str, expected: &[String], actual: &[&str]) -> Outcome {
    let description = format!("{} should be exactly {} line(s)", subject, expected.len());

    let first_diff = expected
        .iter()
        .zip(actual)
        .position(|(want, got)| want.as_str() != *got);

    if first_diff.is_none() && expected.len() == actual.len() {
        return Outcome::pass(description);
    }

    let mut detail = match first_diff {
        Some(i) => format!(
            "first difference in {} at line {}: expected '{}', observed '{}'",
            subject,
            i + 1,
            expected[i],
            actual[i]
        ),
        None => format!(
            "{} has {} line(s) while {} were expected",
            subject,
            actual.len(),
            expected.len()
        ),
    };

    let want = join_lines(expected.iter().map(String::as_str));
    let got = join_lines(actual.iter().copied());
    let diff = TextDiff::from_lines(&want, &got)
        .unified_diff()
        .header("expected", subject)
        .to_string();
    if !diff.is_empty() {
        detail.push('\n');
        detail.push_str(&diff);
    }
    Outcome::fail(description, detail)
}

/// Ordered, non-contiguous subsequence check. Each expected entry must be
/// found in a later line than the previous one, so duplicates need distinct
/// occurrences.
fn match_contains(subject: &str, expected: &[String], actual: &[&str]) -> Outcome {
    let description = format!("{} should contain {} entries in order", subject, expected.len());

    let mut next = 0;
    for (i, want) in expected.iter().enumerate() {
        match actual[next..].iter().position(|line| line.contains(want.as_str())) {
            Some(offset) => next += offset + 1,
            None => {
                let found_earlier = actual[..next].iter().any(|line| line.contains(want.as_str()));
                let detail = if found_earlier && i > 0 {
                    format!(
                        "'{}' was not found in {} after '{}' while it should be there",
                        want,
                        subject,
                        expected[i - 1]
                    )
                } else {
                    format!("'{}' was not found in {} while it should be there", want, subject)
                };
                return Outcome::fail(description, detail);
            }
        }
    }
    Outcome::pass(description)
}

fn match_must_not_contain(subject: &str, forbidden: &[String], actual: &[&str]) -> Outcome {
    let description = format!("{} should not contain {} entries", subject, forbidden.len());

    let found: Vec<String> = forbidden
        .iter()
        .filter(|s| actual.iter().any(|line| line.contains(s.as_str())))
        .map(|s| format!("'{}' was found in {} while it should not be there", s, subject))
        .collect();

    Outcome::check(description, found.is_empty(), || found.join("\n"))
}

fn match_regex(subject: &str, pattern: &str, actual: &[&str]) -> Outcome {
    let description = format!("{} should match /{}/", subject, pattern);

    let re = match compile_regex(pattern) {
        Ok(re) => re,
        Err(e) => return Outcome::fail(description, format!("invalid regex: {}", e)),
    };
    let content = join_lines(actual.iter().copied());
    Outcome::check(description, re.is_match(&content), || {
        format!("no match for pattern /{}/ in {}\ncontent:\n{}", pattern, subject, content)
    })
}

fn join_lines<'a>(lines: impl Iterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}
