use ammonia;

/// Clean user-supplied HTML with ammonia's whitelist.
///
/// Safe formatting tags survive; `<script>`, `<iframe>` and event-handler
/// attributes are stripped. Applied to review comments and product
/// descriptions before they are stored, since both are rendered by the
/// storefront and the admin panel.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

#[cfg(test)]
mod tests {
    use super::clean_html;

    #[test]
    fn strips_scripts_and_handlers() {
        let cleaned = clean_html(r#"<b onclick="x()">Great</b><script>alert(1)</script> fit"#);
        assert_eq!(cleaned, "<b>Great</b> fit");
    }
}
