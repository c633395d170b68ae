use std::borrow::Cow;
use std::fmt::Write;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use nom::bytes::complete::take_until;
use nom::sequence::delimited;
use nom_supreme::tag::complete::tag;

use crate::Map;
use crate::common::parser::NomResult;

pub const JOB_ID_PLACEHOLDER: &str = "JOB_ID";
pub const JOB_NAME_PLACEHOLDER: &str = "JOB_NAME";
pub const SUBMIT_DIR_PLACEHOLDER: &str = "SUBMIT_DIR";

type PlaceholderMap<'a> = Map<&'static str, Cow<'a, str>>;

/// Fills log target placeholders once the scheduler has assigned a job id.
pub fn fill_placeholders_log(value: &mut PathBuf, job_id: &str, job_name: &str, submit_dir: &Path) {
    let mut placeholders = PlaceholderMap::new();
    placeholders.insert(JOB_ID_PLACEHOLDER, job_id.into());
    placeholders.insert(JOB_NAME_PLACEHOLDER, job_name.into());
    placeholders.insert(SUBMIT_DIR_PLACEHOLDER, submit_dir.to_string_lossy());
    *value = resolve(&placeholders, &value.to_string_lossy()).into();
}

/// Translates a log target template into the pattern understood by `sbatch`
/// directives, where the job id and name are only known to the scheduler
/// (`%j` and `%x` respectively).
pub fn to_sbatch_pattern(value: &Path, submit_dir: &Path) -> String {
    let mut placeholders = PlaceholderMap::new();
    placeholders.insert(JOB_ID_PLACEHOLDER, "%j".into());
    placeholders.insert(JOB_NAME_PLACEHOLDER, "%x".into());
    placeholders.insert(SUBMIT_DIR_PLACEHOLDER, submit_dir.to_string_lossy());
    resolve(&placeholders, &value.to_string_lossy())
}

fn resolve(map: &PlaceholderMap, input: &str) -> String {
    let mut buffer = String::with_capacity(input.len());
    for part in parse_resolvable_string(input) {
        match part {
            StringPart::Verbatim(data) => buffer.write_str(data),
            StringPart::Placeholder(placeholder) => match map.get(placeholder) {
                Some(value) => buffer.write_str(value.deref()),
                None => {
                    log::warn!(
                        "Encountered an unknown placeholder `{}` in `{}`",
                        placeholder,
                        input
                    );
                    buffer.write_fmt(format_args!("%{{{placeholder}}}"))
                }
            },
        }
        .unwrap();
    }
    buffer
}

#[derive(Debug, Eq, PartialEq)]
pub enum StringPart<'a> {
    Verbatim(&'a str),
    Placeholder(&'a str),
}

fn parse_placeholder(data: &str) -> NomResult<&str> {
    delimited(tag("%{"), take_until("}"), tag("}"))(data)
}

/// Parses strings containing `%{...}` placeholders.
pub fn parse_resolvable_string(data: &str) -> Vec<StringPart> {
    let mut parts = vec![];
    let mut start = 0;
    let mut input = data;

    while start < input.len() {
        if let Ok((rest, placeholder)) = parse_placeholder(&input[start..]) {
            if start > 0 {
                parts.push(StringPart::Verbatim(&input[..start]));
            }
            input = rest;
            parts.push(StringPart::Placeholder(placeholder));
            start = 0;
        } else {
            // Advance by whole characters; templates may contain
            // multi-byte UTF-8 (accented paths, job names).
            start += input[start..]
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(1);
        }
    }

    if start > 0 {
        parts.push(StringPart::Verbatim(&input[..start]));
    }

    parts
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::{
        StringPart, fill_placeholders_log, parse_resolvable_string, to_sbatch_pattern,
    };

    #[test]
    fn test_parse_empty_string() {
        assert!(parse_resolvable_string("").is_empty());
    }

    #[test]
    fn test_parse_verbatim_only() {
        assert_eq!(
            parse_resolvable_string("foo"),
            vec![StringPart::Verbatim("foo")]
        );
    }

    #[test]
    fn test_parse_placeholder_only() {
        assert_eq!(
            parse_resolvable_string("%{FOO}"),
            vec![StringPart::Placeholder("FOO")]
        );
    }

    #[test]
    fn test_parse_placeholder_middle() {
        assert_eq!(
            parse_resolvable_string("BAZ%{FOO}BAR"),
            vec![
                StringPart::Verbatim("BAZ"),
                StringPart::Placeholder("FOO"),
                StringPart::Verbatim("BAR")
            ]
        );
    }

    #[test]
    fn test_parse_placeholder_multiple() {
        assert_eq!(
            parse_resolvable_string("A%{B}C%{D}E"),
            vec![
                StringPart::Verbatim("A"),
                StringPart::Placeholder("B"),
                StringPart::Verbatim("C"),
                StringPart::Placeholder("D"),
                StringPart::Verbatim("E")
            ]
        );
    }

    #[test]
    fn test_parse_percent() {
        assert_eq!(
            parse_resolvable_string("%"),
            vec![StringPart::Verbatim("%")]
        );
    }

    #[test]
    fn test_parse_non_ascii_template() {
        assert_eq!(
            parse_resolvable_string("café-%{JOB_ID}.out"),
            vec![
                StringPart::Verbatim("café-"),
                StringPart::Placeholder("JOB_ID"),
                StringPart::Verbatim(".out")
            ]
        );
        assert_eq!(
            parse_resolvable_string("žluťoučký"),
            vec![StringPart::Verbatim("žluťoučký")]
        );
    }

    #[test]
    fn test_fill_log_path_non_ascii() {
        let mut path = PathBuf::from("café-%{JOB_ID}.out");
        fill_placeholders_log(&mut path, "7", "switch", Path::new("/sub"));
        assert_eq!(path, PathBuf::from("café-7.out"));
    }

    #[test]
    fn test_fill_log_path() {
        let mut path = PathBuf::from("%{JOB_NAME}-%{JOB_ID}.out");
        fill_placeholders_log(&mut path, "123", "switch", Path::new("/sub"));
        assert_eq!(path, PathBuf::from("switch-123.out"));
    }

    #[test]
    fn test_fill_log_path_submit_dir() {
        let mut path = PathBuf::from("%{SUBMIT_DIR}/logs/%{JOB_ID}.err");
        fill_placeholders_log(&mut path, "7", "switch", Path::new("/sub"));
        assert_eq!(path, PathBuf::from("/sub/logs/7.err"));
    }

    #[test]
    fn test_unknown_placeholder_kept_verbatim() {
        let mut path = PathBuf::from("%{WHAT}-%{JOB_ID}.out");
        fill_placeholders_log(&mut path, "1", "switch", Path::new("/sub"));
        assert_eq!(path, PathBuf::from("%{WHAT}-1.out"));
    }

    #[test]
    fn test_sbatch_pattern() {
        assert_eq!(
            to_sbatch_pattern(Path::new("%{JOB_NAME}-%{JOB_ID}.out"), Path::new("/sub")),
            "%x-%j.out"
        );
        assert_eq!(
            to_sbatch_pattern(Path::new("%{SUBMIT_DIR}/out-%{JOB_ID}"), Path::new("/sub")),
            "/sub/out-%j"
        );
    }
}
