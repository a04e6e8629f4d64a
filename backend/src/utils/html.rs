use ammonia;

/// Clean HTML content using the ammonia library.
///
/// Whitelist-based: safe formatting tags (like <b>, <p>) survive while
/// <script>, <iframe> and event-handler attributes are stripped, along with
/// the content of <script> and <style>.
///
/// Applied to quiz display text at authoring time. Never applied to text
/// that learners' answers are compared against.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Cleans every entry in place. Used for choice options, which are graded by
/// index and so never compared as text.
pub fn clean_all(items: &mut [String]) {
    for item in items.iter_mut() {
        *item = clean_html(item);
    }
}
