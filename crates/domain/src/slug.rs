/// Lowercase, hyphen-separated form of `text` for use in URLs.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.trim().chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::slugify;

    #[test]
    fn collapses_separators() {
        assert_eq!(slugify("  Men's   Running Shoes! "), "men-s-running-shoes");
        assert_eq!(slugify("USB-C -- Cable"), "usb-c-cable");
    }

    #[test]
    fn empty_and_symbol_only_inputs() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!!"), "");
    }
}
