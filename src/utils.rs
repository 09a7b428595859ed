/// Iterates viable phrase lengths in **descending order** using a starter bitmask,
/// stopping early if the callback returns `true`.
///
/// # Parameters
/// - `mask`: 64-bit mask of the key lengths that exist for the current starter:
///   bit 0 ⇒ length 1, …, bit 62 ⇒ length 63, bit 63 ⇒ **CAP bit** (length ≥ 64).
/// - `cap_here`: effective cap at the current position, usually
///   `min(round_max_len, remaining_chars)`.
/// - `f(len)`: invoked for each candidate length, longest first.
///
/// # CAP semantics
/// - `cap_here == 64`: the CAP bit is exactly length 64.
/// - `cap_here > 64`: the CAP bit only says "some length ≥ 64 exists", so every
///   length from `cap_here` down to 64 is tried.
/// - `cap_here < 64`: the CAP bit is ignored.
///
/// # Example
/// ```
/// use zhvariant::utils::for_each_len_dec;
/// let mask = (1u64 << 0) | (1u64 << 2) | (1u64 << 63);
///
/// let mut seen = Vec::new();
/// for_each_len_dec(mask, 5, |len| { seen.push(len); false });
/// assert_eq!(seen, vec![3, 1]);
/// ```
#[inline(always)]
pub fn for_each_len_dec(mask: u64, cap_here: usize, mut f: impl FnMut(usize) -> bool) {
    if mask == 0 || cap_here == 0 {
        return;
    }
    const CAP_BIT: u64 = 1u64 << 63;
    if cap_here > 64 && (mask & CAP_BIT) != 0 {
        for len in (65..=cap_here).rev() {
            if f(len) {
                return;
            }
        }
        if f(64) {
            return;
        }
    }

    let limit = cap_here.min(64);
    // Shift-safe when limit == 64.
    let range_mask = 1u64.wrapping_shl(limit as u32).wrapping_sub(1);
    let mut m = mask & range_mask & if cap_here > 64 { !CAP_BIT } else { !0 };
    while m != 0 {
        let bit_pos = 63 - m.leading_zeros() as usize;
        if f(bit_pos + 1) {
            return;
        }
        m &= !(1u64 << bit_pos);
    }
}

/// Maps a key length in characters to its bit in a length mask.
#[inline]
pub fn length_bit(len: usize) -> u64 {
    debug_assert!(len > 0, "length bit requested for empty key");
    if len >= 64 {
        1u64 << 63
    } else {
        1u64 << (len - 1)
    }
}

/// Returns `true` for CJK Unified Ideographs (base block, extension A,
/// compatibility ideographs and the supplementary ideographic planes).
#[inline]
pub fn is_han(c: char) -> bool {
    matches!(
        c as u32,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF | 0x20000..=0x323AF
    )
}

/// Fast pre-check: does `text` contain any character a Chinese table could map?
#[inline]
pub fn contains_han(text: &str) -> bool {
    // Pure-ASCII buffers are the common non-Chinese case.
    !text.is_ascii() && text.chars().any(is_han)
}

/// Finds a valid UTF-8 boundary within the given string, limited by a maximum byte count.
///
/// Slicing at the returned index never splits a character. Used to keep log
/// previews of converted fragments short.
///
/// ```
/// use zhvariant::utils::find_max_utf8_length;
///
/// let input = "汉字转换测试"; // 3 bytes per character
/// let safe_index = find_max_utf8_length(input, 7);
/// assert_eq!(&input[..safe_index], "汉字");
/// ```
pub fn find_max_utf8_length(sv: &str, max_byte_count: usize) -> usize {
    if sv.len() <= max_byte_count {
        return sv.len();
    }
    let mut byte_count = max_byte_count;
    while byte_count > 0 && !sv.is_char_boundary(byte_count) {
        byte_count -= 1;
    }
    byte_count
}

/// Short, boundary-safe prefix of `text` for log fields.
pub fn preview(text: &str) -> &str {
    &text[..find_max_utf8_length(text, 48)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_descend_and_respect_cap() {
        let mask = length_bit(1) | length_bit(2) | length_bit(4);
        let mut seen = Vec::new();
        for_each_len_dec(mask, 3, |len| {
            seen.push(len);
            false
        });
        assert_eq!(seen, vec![2, 1]);
    }

    #[test]
    fn stops_when_callback_matches() {
        let mask = length_bit(1) | length_bit(2) | length_bit(3);
        let mut seen = Vec::new();
        for_each_len_dec(mask, 8, |len| {
            seen.push(len);
            len == 2
        });
        assert_eq!(seen, vec![3, 2]);
    }

    #[test]
    fn han_detection() {
        assert!(contains_han("hello 世界"));
        assert!(contains_han("𠀀"));
        assert!(!contains_han("hello, world"));
        assert!(!contains_han("「」。"));
    }
}
