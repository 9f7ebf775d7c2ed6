/// Canonical form of a user-entered code: ASCII alphanumerics only, uppercased
///
/// Access codes and link codes are compared case- and punctuation-insensitively,
/// so `" a1-b2 c3"` and `"A1B2C3"` name the same code.
pub fn normalize_code(input: &str) -> String {
    input
        .trim()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

const CHUNK_SIZES: [usize; 3] = [5, 4, 3];

/// Group a code for display, e.g. `ABCDEF` as `ABC-DEF`
///
/// Uses the first chunk size out of 5, 4 and 3 that divides the code evenly.
/// Codes none of them divide come back unchanged.
pub fn format_code(code: &str, separator: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    let Some(size) = CHUNK_SIZES
        .iter()
        .copied()
        .find(|size| chars.len() % size == 0)
    else {
        return code.to_string();
    };

    chars
        .chunks(size)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code(" a1-b2 c3"), "A1B2C3");
        assert_eq!(normalize_code("abcdef"), "ABCDEF");
        assert_eq!(normalize_code("ABCD-EFGH_1234.5678"), "ABCDEFGH12345678");
        assert_eq!(normalize_code(" -- "), "");
        // non-ascii letters are not part of any code alphabet
        assert_eq!(normalize_code("äb"), "B");
    }

    #[test]
    fn test_format_code() {
        assert_eq!(format_code("ABCDEF", "-"), "ABC-DEF");
        assert_eq!(format_code("ABCDEFGHIJ", "-"), "ABCDE-FGHIJ");
        assert_eq!(format_code("ABCDEFGH", "-"), "ABCD-EFGH");
        assert_eq!(
            format_code("0123456789ABCDEF", " "),
            "0123 4567 89AB CDEF"
        );
        assert_eq!(format_code("ABCDEFG", "-"), "ABCDEFG");
        assert_eq!(format_code("", "-"), "");
    }

    #[test]
    fn test_formatted_code_normalizes_back() {
        let code = "0123456789ABCDEF";
        assert_eq!(normalize_code(&format_code(code, "-")), code);
    }
}
