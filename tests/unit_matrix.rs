// Unit tests for the matrix stages.
//
// Covers the food index bijection, row-sum conservation through every
// reduction (observation → augmented → clustered), partition exhaustiveness,
// and the two threshold scenarios on the three-day reference dataset.

use approx::assert_relative_eq;

use satiety::diary::schema::FoodRecord;
use satiety::matrix::clustered::ClusteredMatrix;
use satiety::matrix::observation::ObservationMatrix;
use satiety::matrix::significance::{AugmentedMatrix, SignificancePartition, OTHER_LABEL};

/// {A:200,B:300}, {A:150,C:500}, {B:400}
fn reference_records() -> Vec<FoodRecord> {
    vec![
        [("A", 200), ("B", 300)].into_iter().collect(),
        [("A", 150), ("C", 500)].into_iter().collect(),
        [("B", 400)].into_iter().collect(),
    ]
}

fn wide_records() -> Vec<FoodRecord> {
    let menu = [
        ("Oatmeal", 150),
        ("Banana", 105),
        ("Chicken Breast", 280),
        ("Brown Rice", 215),
        ("Broccoli", 55),
        ("Cheddar Cheese", 115),
        ("Chocolate Chip Cookie", 220),
        ("Greek Yogurt", 130),
    ];
    (0..12)
        .map(|day| {
            menu.iter()
                .enumerate()
                .filter(|(i, _)| (day + i) % 3 != 0)
                .map(|(i, &(name, cal))| (name, cal + (day as u32 * 7 + i as u32) % 40))
                .collect()
        })
        .collect()
}

// ============================================================
// FoodIndex
// ============================================================

#[test]
fn food_index_is_a_bijection() {
    let obs = ObservationMatrix::build(&wide_records()).unwrap();
    let index = &obs.index;
    assert_eq!(index.len(), 8);
    for i in 0..index.len() {
        let name = index.name(i).unwrap();
        assert_eq!(index.get(name), Some(i));
    }
    for record in wide_records() {
        for name in record.foods.keys() {
            let i = index.get(name).unwrap();
            assert_eq!(index.name(i), Some(name.as_str()));
        }
    }
    assert!(index.name(index.len()).is_none());
}

#[test]
fn food_index_is_independent_of_record_order() {
    let mut reversed = wide_records();
    reversed.reverse();
    let a = ObservationMatrix::build(&wide_records()).unwrap();
    let b = ObservationMatrix::build(&reversed).unwrap();
    assert_eq!(a.index.names(), b.index.names());
}

// ============================================================
// Conservation across reductions
// ============================================================

#[test]
fn observation_row_sums_match_record_totals() {
    let records = wide_records();
    let obs = ObservationMatrix::build(&records).unwrap();
    for (sum, record) in obs.matrix.row_sums().iter().zip(&records) {
        assert_eq!(*sum, record.total_calories() as f64);
    }
}

#[test]
fn partition_is_exhaustive_and_disjoint() {
    let obs = ObservationMatrix::build(&wide_records()).unwrap();
    for threshold in [0.0, 1000.0, 2000.0, 1e9] {
        let p = SignificancePartition::compute(&obs.matrix, threshold);
        let mut all: Vec<usize> = p.significant.iter().chain(&p.insignificant).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..obs.index.len()).collect::<Vec<_>>());
        for &c in &p.significant {
            assert!(p.column_sums[c] >= threshold);
            assert!(!p.insignificant.contains(&c));
        }
        for &c in &p.insignificant {
            assert!(p.column_sums[c] < threshold);
        }
    }
}

#[test]
fn augmented_and_clustered_row_sums_are_conserved() {
    let obs = ObservationMatrix::build(&wide_records()).unwrap();
    let partition = SignificancePartition::compute(&obs.matrix, 1500.0);
    assert!(!partition.significant.is_empty());
    assert!(!partition.insignificant.is_empty());

    let augmented = AugmentedMatrix::build(&obs, &partition).unwrap();
    let observed = obs.matrix.row_sums();
    for (a, o) in augmented.matrix.row_sums().iter().zip(&observed) {
        assert_relative_eq!(*a, *o);
    }

    let k = 2;
    let assignment: Vec<usize> = (0..augmented.food_count()).map(|j| j % k).collect();
    let clustered = ClusteredMatrix::build(&augmented, &assignment, k).unwrap();
    for (row, o) in clustered.data.rows().into_iter().zip(&observed) {
        assert_relative_eq!(row.sum(), *o);
    }
    assert_eq!(clustered.data.column(clustered.other_column()).to_vec(), augmented.other);
}

// ============================================================
// Reference scenarios
// ============================================================

#[test]
fn zero_threshold_keeps_every_food_and_a_zero_other_column() {
    let obs = ObservationMatrix::build(&reference_records()).unwrap();
    let partition = SignificancePartition::compute(&obs.matrix, 0.0);
    let augmented = AugmentedMatrix::build(&obs, &partition).unwrap();

    assert_eq!(augmented.matrix.nrows(), 3);
    assert_eq!(augmented.matrix.ncols(), 4);
    assert_eq!(augmented.labels, vec!["A", "B", "C", OTHER_LABEL]);
    assert_eq!(augmented.other, vec![0.0, 0.0, 0.0]);

    let dense = augmented.matrix.to_dense();
    assert_eq!(dense.row(0).to_vec(), vec![200.0, 300.0, 0.0, 0.0]);
    assert_eq!(dense.row(1).to_vec(), vec![150.0, 0.0, 500.0, 0.0]);
    assert_eq!(dense.row(2).to_vec(), vec![0.0, 400.0, 0.0, 0.0]);
    assert!(partition.degenerate_warning().is_some());
}

#[test]
fn high_threshold_collapses_everything_into_other() {
    let obs = ObservationMatrix::build(&reference_records()).unwrap();
    let partition = SignificancePartition::compute(&obs.matrix, 1000.0);
    assert_eq!(partition.column_sums, vec![350.0, 700.0, 500.0]);
    assert!(partition.significant.is_empty());

    let augmented = AugmentedMatrix::build(&obs, &partition).unwrap();
    assert_eq!(augmented.matrix.nrows(), 3);
    assert_eq!(augmented.matrix.ncols(), 1);
    assert_eq!(augmented.labels, vec![OTHER_LABEL]);
    assert_eq!(augmented.other, vec![500.0, 650.0, 400.0]);
    assert_eq!(augmented.matrix.to_dense().column(0).to_vec(), vec![500.0, 650.0, 400.0]);
    assert_eq!(partition.retained_fraction(), 0.0);
    assert!(partition.degenerate_warning().is_some());
}

#[test]
fn threshold_is_inclusive() {
    let obs = ObservationMatrix::build(&reference_records()).unwrap();
    let partition = SignificancePartition::compute(&obs.matrix, 700.0);
    let names: Vec<&str> = partition
        .significant
        .iter()
        .map(|&c| obs.index.name(c).unwrap())
        .collect();
    assert_eq!(names, vec!["B"]);
    assert_relative_eq!(partition.retained_fraction(), 700.0 / 1550.0);
}

#[test]
fn empty_record_is_an_all_zero_row() {
    let records = vec![
        [("A", 100)].into_iter().collect(),
        FoodRecord::default(),
    ];
    let obs = ObservationMatrix::build(&records).unwrap();
    assert_eq!(obs.nrows(), 2);
    assert_eq!(obs.matrix.row_sums(), vec![100.0, 0.0]);
    assert!(obs.check_goals(&[1.0, 2.0]).is_ok());
    assert!(obs.check_goals(&[1.0]).is_err());
}
