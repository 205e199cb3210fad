//! `%VAR%` placeholder scanning and expansion.
//!
//! A token is a pair of percent signs around a non-empty name without
//! whitespace or path separators. Anything else containing `%` is literal
//! text, so `100% done` and `%` on its own survive expansion untouched.
use crate::context::{MachineContext, Probe};
use crate::error::RuleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Variable(&'a str),
}

fn is_variable_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(|c: char| c.is_whitespace() || c == '\\' || c == '/')
}

fn segments(text: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some((head, tail)) = rest.split_once('%') {
        out.push(Segment::Literal(head));
        match tail.split_once('%') {
            Some((name, after)) if is_variable_name(name) => {
                out.push(Segment::Variable(name));
                rest = after;
            }
            _ => {
                out.push(Segment::Literal("%"));
                rest = tail;
            }
        }
    }
    out.push(Segment::Literal(rest));
    out
}

/// Variable names referenced by `text`, in order of appearance.
///
/// ```
/// use config_resolver::resolve::placeholder;
///
/// assert_eq!(
///     placeholder::variables("%USERPROFILE%\\AppData\\%APP%"),
///     vec!["USERPROFILE", "APP"]
/// );
/// assert!(placeholder::variables("100% done").is_empty());
/// ```
#[must_use]
pub fn variables(text: &str) -> Vec<&str> {
    segments(text)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Variable(name) => Some(name),
            Segment::Literal(_) => None,
        })
        .collect()
}

/// Replace every token in `text` with the machine's environment value.
///
/// # Errors
///
/// Returns [`RuleError::UnknownVariable`] for the first token the context
/// cannot answer. Nothing is partially expanded.
pub fn expand(text: &str, ctx: &dyn MachineContext) -> Result<String, RuleError> {
    let mut out = String::with_capacity(text.len());
    for segment in segments(text) {
        match segment {
            Segment::Literal(literal) => out.push_str(literal),
            Segment::Variable(name) => {
                let value = ctx
                    .resolve(&Probe::EnvVar(name.to_string()))
                    .map_err(|source| RuleError::UnknownVariable {
                        variable: name.to_string(),
                        path: text.to_string(),
                        source,
                    })?;
                out.push_str(&value);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::context::FixedContext;

    fn ctx() -> FixedContext {
        FixedContext::new()
            .with_env("SystemRoot", "C:\\Windows")
            .with_env("USERPROFILE", "C:\\Users\\gamer")
    }

    #[test]
    fn expands_known_variables() {
        assert_eq!(
            expand("%SystemRoot%\\System32\\drivers", &ctx()).unwrap(),
            "C:\\Windows\\System32\\drivers"
        );
    }

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(
            expand("%systemroot%\\Fonts", &ctx()).unwrap(),
            "C:\\Windows\\Fonts"
        );
    }

    #[test]
    fn text_without_tokens_is_unchanged() {
        assert_eq!(expand("C:\\Games", &ctx()).unwrap(), "C:\\Games");
        assert_eq!(expand("50% off", &ctx()).unwrap(), "50% off");
        assert_eq!(expand("%", &ctx()).unwrap(), "%");
    }

    #[test]
    fn stray_percent_before_token() {
        assert_eq!(
            expand("100% of %USERPROFILE%", &ctx()).unwrap(),
            "100% of C:\\Users\\gamer"
        );
        assert_eq!(variables("100% of %USERPROFILE%"), vec!["USERPROFILE"]);
    }

    #[test]
    fn unknown_variable_is_error() {
        let err = expand("%GAMEDIR%\\saves", &ctx()).unwrap_err();
        assert!(matches!(
            err,
            RuleError::UnknownVariable { ref variable, ref path, .. }
                if variable == "GAMEDIR" && path == "%GAMEDIR%\\saves"
        ));
    }

    #[test]
    fn separators_are_not_variable_names() {
        assert!(variables("%a\\b%").is_empty());
        assert!(variables("%%").is_empty());
    }
}
