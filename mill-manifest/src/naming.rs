use std::collections::BTreeMap;

/// Convert a dashed dependency name into a camel-cased capability key.
///
/// `"coffee-script"` becomes `"coffeeScript"`; names without dashes pass
/// through unchanged.
pub fn camelize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for ch in name.chars() {
        if ch == '-' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Capability key for a raw dependency name.
///
/// Explicit `rename` entries take unconditional precedence over the
/// implicit prefix-strip-and-camelize derivation. The same policy applies
/// to plugins and recipes.
pub fn capability_name(raw: &str, prefix: &str, rename: &BTreeMap<String, String>) -> String {
    if let Some(renamed) = rename.get(raw) {
        return renamed.clone();
    }
    camelize(raw.strip_prefix(prefix).unwrap_or(raw))
}
