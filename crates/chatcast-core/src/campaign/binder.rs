//! Template variable binding.
//!
//! A variable mapping is an ordered key -> recipient-field table; the n-th
//! binding fills placeholder `{{n}}` in the template body. Missing fields
//! bind to the empty string rather than failing, so a malformed mapping
//! never blocks a whole campaign.

use chatcast_common::types::VariableMapping;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*\d+\s*\}\}").unwrap())
}

/// Produce the ordered positional parameter list for one recipient.
pub fn bind(mapping: &VariableMapping, fields: &HashMap<String, String>) -> Vec<String> {
    mapping
        .bindings()
        .iter()
        .map(|binding| fields.get(&binding.field).cloned().unwrap_or_default())
        .collect()
}

/// Render a template body with positional parameters.
///
/// `{{1}}` is replaced by the first parameter and so on. Placeholders with
/// no corresponding parameter are blanked out, matching the binder's
/// empty-string default.
pub fn render_body(body: &str, parameters: &[String]) -> String {
    let mut rendered = body.to_string();
    for (i, value) in parameters.iter().enumerate() {
        rendered = rendered.replace(&format!("{{{{{}}}}}", i + 1), value);
    }
    placeholder_re().replace_all(&rendered, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatcast_common::types::VariableBinding;
    use pretty_assertions::assert_eq;

    fn mapping(fields: &[&str]) -> VariableMapping {
        VariableMapping(
            fields
                .iter()
                .enumerate()
                .map(|(i, field)| VariableBinding {
                    key: (i + 1).to_string(),
                    field: field.to_string(),
                })
                .collect(),
        )
    }

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_bind_in_mapping_order() {
        let params = bind(
            &mapping(&["name", "email"]),
            &fields(&[("name", "Alice"), ("email", "alice@example.com")]),
        );
        assert_eq!(params, vec!["Alice", "alice@example.com"]);
    }

    #[test]
    fn test_bind_missing_field_defaults_to_empty() {
        let params = bind(&mapping(&["company"]), &fields(&[("name", "Alice")]));
        assert_eq!(params, vec![""]);
    }

    #[test]
    fn test_bind_empty_mapping() {
        let params = bind(&VariableMapping::default(), &fields(&[("name", "Alice")]));
        assert!(params.is_empty());
    }

    #[test]
    fn test_render_body_substitutes_positionally() {
        let body = "Hi {{1}}, your order ships to {{2}}.";
        let rendered = render_body(body, &["Alice".to_string(), "Berlin".to_string()]);
        assert_eq!(rendered, "Hi Alice, your order ships to Berlin.");
    }

    #[test]
    fn test_render_body_blanks_unbound_placeholders() {
        let rendered = render_body("Hi {{1}}{{2}}!", &["Alice".to_string()]);
        assert_eq!(rendered, "Hi Alice!");
    }

    #[test]
    fn test_render_body_blank_parameter() {
        let rendered = render_body("Hello {{1}},", &["".to_string()]);
        assert_eq!(rendered, "Hello ,");
    }
}
