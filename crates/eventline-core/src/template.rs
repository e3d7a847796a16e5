//! Minimal `{{var}}` placeholder substitution for prompt rendering.

use std::collections::HashMap;

use crate::error::{CoreError, CoreResult};

/// Replace every `{{var}}` placeholder in `template` with its value from
/// `vars`. Unlike a debugging-oriented renderer, any placeholder left
/// unresolved is a hard failure — a rendered prompt is never shipped to the
/// model with raw `{{...}}` markers in it.
pub fn render_template(template: &str, vars: &HashMap<&str, &str>) -> CoreResult<String> {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '{' && chars.peek() == Some(&'{') {
            chars.next();

            let mut var_name = String::new();
            loop {
                match chars.next() {
                    Some('}') if chars.peek() == Some(&'}') => {
                        chars.next();
                        break;
                    }
                    Some(ch) => var_name.push(ch),
                    None => {
                        return Err(CoreError::Configuration(format!(
                            "unclosed template placeholder: {{{{{var_name}"
                        )))
                    }
                }
            }

            let var_name = var_name.trim();
            match vars.get(var_name) {
                Some(value) => result.push_str(value),
                None => {
                    return Err(CoreError::Configuration(format!(
                        "unresolved template placeholder: {{{{{var_name}}}}}"
                    )))
                }
            }
        } else {
            result.push(c);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_all_placeholders() {
        let vars = HashMap::from([("raw_text", "oil rises"), ("taxonomy", "macro_econ, fx")]);
        let out = render_template("Text: {{raw_text}}\nTopics: {{taxonomy}}", &vars).unwrap();
        assert_eq!(out, "Text: oil rises\nTopics: macro_econ, fx");
    }

    #[test]
    fn fails_on_unresolved_placeholder() {
        let vars = HashMap::from([("raw_text", "oil rises")]);
        let err = render_template("Text: {{raw_text}} {{missing}}", &vars).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn fails_on_unclosed_placeholder() {
        let vars = HashMap::new();
        assert!(render_template("Text: {{oops", &vars).is_err());
    }
}
