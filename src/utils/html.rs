// src/utils/html.rs

/// Sanitises user-authored news bodies.
///
/// Whitelist based: safe formatting tags (<b>, <p>, links) survive, while
/// <script> (with its content), <iframe> and event-handler attributes are removed.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
