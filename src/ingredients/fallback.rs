/// Baseline ingredient extraction used when the collaborator cannot provide a
/// token list: split on commas and newlines, trim, drop blanks. Order and
/// duplicates are kept.
pub fn extract_ingredients(text: &str) -> Vec<String> {
    text.split([',', '\n'])
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}
