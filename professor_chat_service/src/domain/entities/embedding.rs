pub type Embedding = Vec<f32>;

/// Scales `vector` to a unit L2 norm.
///
/// A zero vector has no direction and is returned unchanged.
pub fn l2_normalize(mut vector: Embedding) -> Embedding {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }

    vector
}
