//! Small shared helpers.

/// Converts a `snake_case` (or `kebab-case`) string to `camelCase`.
///
/// Used to normalize gateway event names (`PROFILE_UPDATE`, lowercased
/// first) into the emit names the library exposes (`profileUpdate`).
pub fn snake_to_camel_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut upper_next = false;
    for ch in input.chars() {
        match ch {
            '_' | '-' => upper_next = true,
            c if upper_next => {
                out.extend(c.to_uppercase());
                upper_next = false;
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_snake_to_camel() {
        assert_eq!(snake_to_camel_case("profile_update"), "profileUpdate");
        assert_eq!(snake_to_camel_case("total_viewing"), "totalViewing");
        assert_eq!(snake_to_camel_case("banner-update"), "bannerUpdate");
    }

    #[test]
    fn leaves_plain_words_alone() {
        assert_eq!(snake_to_camel_case("presence"), "presence");
        assert_eq!(snake_to_camel_case(""), "");
    }
}
