use std::cmp::Ordering;

pub fn cosine_similarity(lhs: &[f32], rhs: &[f32]) -> Option<f32> {
	if lhs.is_empty() || lhs.len() != rhs.len() {
		return None;
	}

	let mut dot = 0.0_f32;
	let mut lhs_norm = 0.0_f32;
	let mut rhs_norm = 0.0_f32;

	for (l, r) in lhs.iter().zip(rhs.iter()) {
		dot += l * r;
		lhs_norm += l * l;
		rhs_norm += r * r;
	}

	if lhs_norm <= f32::EPSILON || rhs_norm <= f32::EPSILON {
		return None;
	}

	Some((dot / (lhs_norm.sqrt() * rhs_norm.sqrt())).clamp(-1.0, 1.0))
}

/// Descending by score, ties broken by key so identical inputs always produce one order.
pub fn cmp_ranked<K>(a: (&K, f32), b: (&K, f32)) -> Ordering
where
	K: Ord,
{
	match b.1.partial_cmp(&a.1) {
		Some(Ordering::Equal) | None => a.0.cmp(b.0),
		Some(order) => order,
	}
}

/// Keeps entries scoring at or above `threshold`, preserving their order.
///
/// Cosine scores can be negative, so a threshold of zero or below disables the filter and the
/// full top-k passes through.
pub fn retain_above_threshold<T, F>(items: Vec<T>, threshold: f32, score: F) -> Vec<T>
where
	F: Fn(&T) -> f32,
{
	if threshold <= 0.0 {
		return items;
	}

	items.into_iter().filter(|item| score(item) >= threshold).collect()
}

/// Cosine score used for ranking. Zero-norm vectors are valid input and score 0.0.
pub fn rank_score(lhs: &[f32], rhs: &[f32]) -> f32 {
	cosine_similarity(lhs, rhs).unwrap_or(0.0)
}

pub fn is_non_increasing(scores: &[f32]) -> bool {
	scores.windows(2).all(|pair| pair[0] >= pair[1])
}

pub fn threshold_valid(threshold: f32) -> bool {
	threshold.is_finite() && (0.0..=1.0).contains(&threshold)
}
