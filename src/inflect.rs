//! English pluralisation heuristics used to derive nested-resource paths.
//!
//! Three suffix rules, applied symmetrically in both directions:
//!
//! | singular | plural |
//! |---|---|
//! | `city` | `cities` |
//! | `box`, `bus` | `boxes`, `buses` |
//! | `post` | `posts` |
//!
//! This is not a dictionary. Irregular nouns come out wrong
//! (`singularize("people") == "people"`, `pluralize("person") == "persons"`),
//! and so do words that merely end in `s` (`singularize("status") == "statu"`).
//! Name resources so the rules hold, or register routes by hand.

/// `city → cities`, `box → boxes`, `post → posts`.
pub fn pluralize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix('y') {
        format!("{stem}ies")
    } else if word.ends_with('s') || word.ends_with('x') {
        format!("{word}es")
    } else {
        format!("{word}s")
    }
}

/// `cities → city`, `boxes → box`, `posts → post`. Words without a plural
/// suffix are returned unchanged.
pub fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        format!("{stem}y")
    } else if word.ends_with("ses") || word.ends_with("xes") {
        word[..word.len() - 2].to_owned()
    } else if let Some(stem) = word.strip_suffix('s') {
        stem.to_owned()
    } else {
        word.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_nouns_round_trip() {
        for word in ["cat", "box", "city", "post", "comment", "category"] {
            assert_eq!(singularize(&pluralize(word)), word, "round trip of {word}");
        }
    }

    #[test]
    fn plural_forms() {
        assert_eq!(pluralize("cat"), "cats");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("bus"), "buses");
        assert_eq!(pluralize("city"), "cities");
    }

    #[test]
    fn singular_forms() {
        assert_eq!(singularize("posts"), "post");
        assert_eq!(singularize("addresses"), "address");
        assert_eq!(singularize("taxes"), "tax");
        assert_eq!(singularize("companies"), "company");
        assert_eq!(singularize("sheep"), "sheep");
        assert_eq!(singularize(""), "");
    }

    #[test]
    fn irregular_nouns_are_not_handled() {
        assert_eq!(singularize("people"), "people");
        assert_eq!(pluralize("person"), "persons");
    }
}
