use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

/// Splits sample indices into (train, held_out) while preserving class ratios.
///
/// Each class is shuffled with a single seeded RNG (classes visited in index
/// order) and `round(count * fraction)` of its members are held out, but every
/// class keeps at least one training sample. Both returned lists are sorted.
pub fn stratified_split(
    labels: &[usize],
    n_classes: usize,
    fraction: f64,
    seed: u64,
) -> (Vec<usize>, Vec<usize>) {
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (i, &label) in labels.iter().enumerate() {
        if label < n_classes {
            by_class[label].push(i);
        }
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut held_out = Vec::new();

    for members in by_class.iter_mut() {
        members.shuffle(&mut rng);
        let wanted = (members.len() as f64 * fraction).round() as usize;
        let n_held = wanted.min(members.len().saturating_sub(1));
        held_out.extend_from_slice(&members[..n_held]);
        train.extend_from_slice(&members[n_held..]);
    }

    train.sort_unstable();
    held_out.sort_unstable();
    (train, held_out)
}
