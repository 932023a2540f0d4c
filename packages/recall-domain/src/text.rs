/// Truncate a string to a maximum character count.
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
	if max_chars == 0 {
		return String::new();
	}
	if value.chars().count() <= max_chars {
		return value.to_string();
	}

	value.chars().take(max_chars).collect()
}

pub fn char_len(value: &str) -> usize {
	value.chars().count()
}
