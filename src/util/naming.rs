use uuid::Uuid;

/// Filesystem-safe form of a product name: separators become `_`, lowercased.
pub fn slug(name: &str) -> String {
    slug_or(name, "product")
}

/// Like [`slug`], with `fallback` for names that leave no usable path segment.
/// The result is always a single component that stays inside its parent.
pub fn slug_or(name: &str, fallback: &str) -> String {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            other => other,
        })
        .collect::<String>()
        .to_lowercase();

    // "." and ".." would resolve to the parent directory.
    if slug.chars().all(|c| c == '.') {
        fallback.to_string()
    } else {
        slug
    }
}

/// First 8 characters of a fresh v4 uuid.
pub fn short_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_replaces_separators() {
        assert_eq!(slug("Trail Watch Pro"), "trail_watch_pro");
        assert_eq!(slug("AC/DC Speaker"), "ac_dc_speaker");
        assert_eq!(slug("   "), "product");
    }

    #[test]
    fn dot_names_never_escape_the_parent() {
        assert_eq!(slug(".."), "product");
        assert_eq!(slug(" . "), "product");
        assert_eq!(slug("..."), "product");
        assert_eq!(slug_or("..", "campaign"), "campaign");
        assert_eq!(slug("../etc"), ".._etc");
        assert_eq!(slug("v1.2 Watch"), "v1.2_watch");

        let parent = std::path::Path::new("/out/c1");
        for name in ["..", ".", "a/../b", "x\\..\\y"] {
            let joined = parent.join(slug(name));
            assert_eq!(joined.parent(), Some(parent), "{name}");
        }
    }

    #[test]
    fn reserved_path_characters_are_replaced() {
        assert_eq!(slug("What? <Pro>: \"Max\" | 2*"), "what___pro____max____2_");
        assert_eq!(slug("tab\tname"), "tab_name");
    }

    #[test]
    fn short_ids_are_unique() {
        let a = short_id();
        let b = short_id();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
    }
}
