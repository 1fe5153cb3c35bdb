/// Cosine similarity; zero-magnitude vectors are similar to nothing
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[inline]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Pick up to `k` candidates balancing relevance to `query` against
/// similarity to candidates already picked.
///
/// Returns candidate positions in selection order. The first pick is the
/// candidate most similar to the query; each later pick maximises
/// `lambda * sim(query) - (1 - lambda) * max sim(selected)`. Ties go to the
/// earlier candidate.
pub fn maximal_marginal_relevance(
    query: &[f32],
    candidates: &[&[f32]],
    k: usize,
    lambda: f32,
) -> Vec<usize> {
    let target = k.min(candidates.len());
    if target == 0 {
        return Vec::new();
    }

    let query_similarity: Vec<f32> = candidates
        .iter()
        .map(|candidate| cosine_similarity(query, candidate))
        .collect();

    let mut selected: Vec<usize> = Vec::with_capacity(target);
    // highest similarity to any selected candidate, per candidate
    let mut redundancy = vec![f32::NEG_INFINITY; candidates.len()];

    while selected.len() < target {
        let mut best: Option<(usize, f32)> = None;
        for (i, relevance) in query_similarity.iter().enumerate() {
            if selected.contains(&i) {
                continue;
            }
            let score = if selected.is_empty() {
                *relevance
            } else {
                lambda * relevance - (1.0 - lambda) * redundancy[i]
            };
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((i, score));
            }
        }

        let Some((pick, _)) = best else {
            break;
        };
        selected.push(pick);

        for (i, candidate) in candidates.iter().enumerate() {
            let similarity = cosine_similarity(candidates[pick], candidate);
            if similarity > redundancy[i] {
                redundancy[i] = similarity;
            }
        }
    }

    selected
}
