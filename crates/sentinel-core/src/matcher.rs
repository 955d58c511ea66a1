//! Literal, case-insensitive keyword matching.

/// Return the first keyword, in `keywords` order, whose lowercase form occurs
/// anywhere in the lowercase `text`.
///
/// This is the first keyword of the list that is present, not the keyword
/// whose occurrence comes earliest in the text.
///
/// # Examples
///
/// ```
/// use sentinel_core::matcher::find_keyword;
///
/// let keywords = vec!["hello".to_string()];
/// assert_eq!(find_keyword("HELLO world", &keywords), Some("hello"));
/// assert_eq!(find_keyword("", &keywords), None);
/// ```
pub fn find_keyword<'k, S: AsRef<str>>(text: &str, keywords: &'k [S]) -> Option<&'k str> {
    if text.is_empty() || keywords.is_empty() {
        return None;
    }

    let haystack = text.to_lowercase();
    keywords
        .iter()
        .map(|k| AsRef::<str>::as_ref(k))
        .filter(|k| !k.is_empty())
        .find(|k| haystack.contains(&k.to_lowercase()))
}
