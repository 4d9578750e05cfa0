//! Deterministic renderer from an IntentSpec to capability source.
//!
//! Same spec in, byte-identical source out; this is what makes content
//! addressing meaningful. One definition per spec: the leading `self`
//! parameter is the bound-context slot, then the spec's args in order,
//! then each body line re-indented one level. A body line's own leading
//! indentation is preserved so nested blocks survive rendering.

use crate::core::spec::IntentSpec;

pub fn synthesize(spec: &IntentSpec) -> String {
    let mut params = Vec::with_capacity(spec.args.len() + 1);
    params.push("self".to_string());
    params.extend(spec.args.iter().cloned());

    let mut source = format!("def {}({}):\n", spec.name, params.join(", "));
    for line in &spec.body {
        source.push_str("    ");
        source.push_str(line.trim_end());
        source.push('\n');
    }
    source
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_single_line_body() {
        let spec = IntentSpec::new("add", &["num1", "num2"], &["return num1 + num2"]);
        assert_eq!(
            synthesize(&spec),
            "def add(self, num1, num2):\n    return num1 + num2\n"
        );
    }

    #[test]
    fn preserves_nested_indentation() {
        let spec = IntentSpec::new(
            "filter_list",
            &["input_list"],
            &[
                "kept = []",
                "for item in input_list:",
                "    if item > 0:",
                "        kept = kept + [item]",
                "return kept",
            ],
        );
        let source = synthesize(&spec);
        assert!(source.contains("\n    for item in input_list:\n"));
        assert!(source.contains("\n            kept = kept + [item]\n"));
    }

    #[test]
    fn rendering_is_byte_stable() {
        let spec = IntentSpec::new("sort_list", &["input_list"], &["return sorted(input_list)"]);
        assert_eq!(synthesize(&spec), synthesize(&spec.clone()));
    }
}
