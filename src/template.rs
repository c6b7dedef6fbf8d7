use crate::macros::ResolvedMacros;

/// Substitute resolved macros into URL templates.
///
/// Every `[NAME]` placeholder is replaced by the encoded macro value, or by
/// nothing when the macro is unknown. Empty templates are dropped.
pub fn expand<S: AsRef<str>>(templates: &[S], macros: &ResolvedMacros) -> Vec<String> {
    templates
        .iter()
        .map(AsRef::as_ref)
        .filter(|template| !template.is_empty())
        .map(|template| expand_one(template, macros))
        .collect()
}

/// Substitute resolved macros into a single URL template
pub fn expand_one(template: &str, macros: &ResolvedMacros) -> String {
    let mut url = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('[') {
        url.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        match after.find(']') {
            Some(close) if is_macro_name(&after[..close]) => {
                url.push_str(macros.get(&after[..close]).unwrap_or_default());
                rest = &after[close + 1..];
            }
            _ => {
                // Not a placeholder, keep the bracket literally
                url.push('[');
                rest = after;
            }
        }
    }
    url.push_str(rest);

    url
}

fn is_macro_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
