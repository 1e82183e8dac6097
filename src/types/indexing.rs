//! Mixed-radix helpers used to address feature vectors as flat indices.
//!
//! The first feature is the most significant digit: for dimensions `[2, 3]` the
//! values `[1, 0]` map to `3` and `[0, 2]` map to `2`.

/// Per-digit strides of a mixed-radix number with the given dimensions
pub fn step_sizes(dimensions: &[usize]) -> Vec<usize> {
    let mut steps = vec![1; dimensions.len()];
    for i in (0..dimensions.len().saturating_sub(1)).rev() {
        steps[i] = steps[i + 1] * dimensions[i + 1];
    }
    steps
}

/// Projects `values` onto a single index given their `dimensions`
pub fn project(values: &[usize], dimensions: &[usize]) -> usize {
    assert_eq!(values.len(), dimensions.len(), "value and dimension count differ");

    values
        .iter()
        .zip(dimensions)
        .fold(0, |index, (&value, &dim)| {
            debug_assert!(value < dim, "value {} out of range {}", value, dim);
            index * dim + value
        })
}

/// Splits a flat `index` back into its digits, given precomputed step sizes
pub fn project_using_step_sizes(index: usize, steps: &[usize]) -> Vec<usize> {
    let mut remainder = index;
    steps
        .iter()
        .map(|&step| {
            let digit = remainder / step;
            remainder %= step;
            digit
        })
        .collect()
}

/// Increments `values` as an odometer over `dimensions`
///
/// Returns `true` when the counter wrapped around to all zeros, which is the
/// signal that every configuration has been visited.
pub fn increment(values: &mut [usize], dimensions: &[usize]) -> bool {
    debug_assert_eq!(values.len(), dimensions.len());

    for i in (0..values.len()).rev() {
        values[i] += 1;
        if values[i] < dimensions[i] {
            return false;
        }
        values[i] = 0;
    }
    true
}

/// Product of the dimensions, `None` on overflow
pub fn checked_product(dimensions: &[usize]) -> Option<usize> {
    dimensions.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_sizes() {
        assert_eq!(step_sizes(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(step_sizes(&[5]), vec![1]);
        assert!(step_sizes(&[]).is_empty());
    }

    #[test]
    fn test_project_and_back() {
        let dims = [2, 3, 4];
        let steps = step_sizes(&dims);

        assert_eq!(project(&[1, 2, 3], &dims), 23);
        assert_eq!(project(&[0, 0, 1], &dims), 1);
        assert_eq!(project_using_step_sizes(23, &steps), vec![1, 2, 3]);
        assert_eq!(project(&[], &[]), 0);
    }

    #[test]
    fn test_increment_visits_every_configuration() {
        let dims = [2, 3];
        let mut values = vec![0, 0];
        let mut visited = vec![project(&values, &dims)];

        while !increment(&mut values, &dims) {
            visited.push(project(&values, &dims));
        }

        assert_eq!(visited, (0..6).collect::<Vec<_>>());
        assert_eq!(values, vec![0, 0]);
    }

    #[test]
    fn test_increment_empty_wraps_immediately() {
        let mut values: Vec<usize> = vec![];
        assert!(increment(&mut values, &[]));
    }

    #[test]
    fn test_checked_product() {
        assert_eq!(checked_product(&[2, 3, 4]), Some(24));
        assert_eq!(checked_product(&[usize::MAX, 2]), None);
    }
}
