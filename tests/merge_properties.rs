//! Property-based tests for grid merging and syllable alignment using proptest.

use proptest::prelude::*;

use lt_attention::{align, FeatureField, FeatureGrid, FeatureRecord, StimulusCode};

fn record(v: f32) -> FeatureRecord {
    FeatureRecord {
        word_initial: v,
        word_final: v + 1.0,
        preceding: v + 2.0,
        syl0_sum: v + 3.0,
        syl0_vowel: v + 4.0,
        syl1_sum: v + 5.0,
        syl1_vowel: v + 6.0,
        syl2_sum: v + 7.0,
        syl2_vowel: v + 8.0,
    }
}

/// Single-example 2x2 grid tagged by `id` in every cell
fn single(id: u32) -> FeatureGrid {
    let mut grid = FeatureGrid::new(2, 2);
    for r in 0..2 {
        for c in 0..2 {
            grid.set(r, c, record(id as f32 * 16.0 + (r * 2 + c) as f32));
        }
    }
    grid
}

fn sorted(mut values: Vec<f32>) -> Vec<f32> {
    values.sort_by(f32::total_cmp);
    values
}

fn fold(grids: &[FeatureGrid]) -> FeatureGrid {
    let mut acc = FeatureGrid::new(2, 2);
    for g in grids {
        acc = acc.merge(g).unwrap();
    }
    acc
}

// --- Merge properties ---

proptest! {
    #[test]
    fn merge_empty_is_identity(n in 1usize..6) {
        let grids: Vec<FeatureGrid> = (0..n as u32).map(single).collect();
        let g = fold(&grids);
        let empty = FeatureGrid::new(2, 2);
        prop_assert_eq!(&empty.merge(&g).unwrap(), &g);
        prop_assert_eq!(&g.merge(&empty).unwrap(), &g);
    }

    #[test]
    fn batch_grows_by_one_per_example(n in 1usize..40) {
        let grids: Vec<FeatureGrid> = (0..n as u32).map(single).collect();
        let merged = fold(&grids);
        prop_assert_eq!(merged.batch_size(), Some(n));

        for field in FeatureField::ALL {
            let values = sorted(merged.get(1, 0).values(field));
            let expected = sorted(grids.iter().map(|g| g.get(1, 0).values(field)[0]).collect());
            prop_assert_eq!(values, expected);
        }
    }

    #[test]
    fn grouping_does_not_change_content(
        ids in prop::collection::vec(0u32..1000, 3..20),
        split_a in 0usize..20,
        split_b in 0usize..20,
    ) {
        let grids: Vec<FeatureGrid> = ids.iter().copied().map(single).collect();
        let n = grids.len();
        let (i, j) = {
            let a = split_a % (n + 1);
            let b = split_b % (n + 1);
            (a.min(b), a.max(b))
        };

        // ((A . B) . C) versus (A . (B . C)) over arbitrary chunks
        let a = fold(&grids[..i]);
        let b = fold(&grids[i..j]);
        let c = fold(&grids[j..]);
        let left = a.merge(&b).unwrap().merge(&c).unwrap();
        let right = a.merge(&b.merge(&c).unwrap()).unwrap();

        prop_assert_eq!(left.batch_size(), Some(n));
        prop_assert_eq!(&left, &right);

        // Reversed accumulation holds the same multiset
        let reversed: Vec<FeatureGrid> = grids.iter().rev().cloned().collect();
        let rev = fold(&reversed);
        for (r, col, cell) in left.iter() {
            for field in FeatureField::ALL {
                prop_assert_eq!(
                    sorted(cell.values(field)),
                    sorted(rev.get(r, col).values(field))
                );
            }
        }
    }

    #[test]
    fn mismatched_shapes_never_merge(rows in 1usize..6, cols in 1usize..4) {
        prop_assume!((rows, cols) != (2, 2));
        let g = single(1);
        let other = FeatureGrid::new(rows, cols);
        prop_assert!(g.merge(&other).is_err());
        prop_assert!(other.merge(&g).is_err());
        prop_assert_eq!(g, single(1));
    }
}

// --- Alignment properties ---

const SHAPES: [&str; 4] = ["CVC", "CV", "VC", "V"];

/// Concrete segments for a shape; `glide` adds a `w` before the vowel
fn spell(shape: &str, glide: bool) -> Vec<&'static str> {
    let mut segs = Vec::new();
    for (i, slot) in shape.chars().enumerate() {
        if slot == 'V' {
            if glide {
                segs.push("w");
            }
            segs.push("a");
        } else if i == 0 {
            segs.push("p");
        } else {
            segs.push("k");
        }
    }
    segs
}

proptest! {
    #[test]
    fn template_covers_segments_and_shift_counts_glides(
        class in prop::sample::select(vec!["A", "B", "C", "D"]),
        codes in prop::collection::vec(1usize..=4, 3),
        glides in prop::collection::vec(any::<bool>(), 3),
    ) {
        let code = StimulusCode::parse(&format!("{class}-{}-{}-{}", codes[0], codes[1], codes[2])).unwrap();

        let segments: Vec<&str> = codes
            .iter()
            .zip(&glides)
            .flat_map(|(c, g)| spell(SHAPES[c - 1], *g))
            .collect();

        let alignment = align("prop", &segments, &code).unwrap();
        prop_assert_eq!(alignment.template.segment_count(), segments.len());

        // Shift equals the glides strictly before the unshifted boundary
        let before = segments[..alignment.unshifted_boundary]
            .iter()
            .filter(|s| **s == "w")
            .count();
        prop_assert!(alignment.boundary >= alignment.unshifted_boundary);
        prop_assert_eq!(alignment.boundary - alignment.unshifted_boundary, before);
        prop_assert_eq!(alignment.glides_before, before);
    }
}
