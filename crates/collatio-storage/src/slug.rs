/// Lowercase ASCII slug: accents folded, every other run of
/// non-alphanumerics collapsed to a single `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        let folded = if c.is_ascii_alphanumeric() {
            Some(c.to_ascii_lowercase())
        } else {
            fold_accent(c)
        };
        match folded {
            Some(c) => {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                slug.push(c);
            }
            None if c == '_' || c == '-' || c.is_whitespace() || c.is_ascii_punctuation() => {
                pending_dash = true;
            }
            None => {}
        }
    }
    slug
}

fn fold_accent(c: char) -> Option<char> {
    let folded = match c.to_lowercase().next()? {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        _ => return None,
    };
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Declaration of Arbroath"), "declaration-of-arbroath");
        assert_eq!(slugify("  Paris, BnF  lat. 1234 "), "paris-bnf-lat-1234");
        assert_eq!(slugify("Bibliothèque Sainte-Geneviève"), "bibliotheque-sainte-genevieve");
        assert_eq!(slugify("Manuscript"), "manuscript");
        assert_eq!(slugify("---"), "");
    }
}
