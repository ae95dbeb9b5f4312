//! Evaluation metrics
//!
//! Confusion matrix and per-class accuracy used by the evaluation loop to
//! report more than a single test-set percentage.

use serde::{Deserialize, Serialize};

/// Confusion Matrix for multi-class classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes
    pub num_classes: usize,

    /// Matrix data (row = actual, column = predicted), row-major
    pub matrix: Vec<usize>,
}

impl Default for ConfusionMatrix {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Create confusion matrix from predictions and ground truth
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        let mut cm = Self::new(num_classes);
        cm.extend(predictions, ground_truth);
        cm
    }

    /// Accumulate a batch of predictions
    pub fn extend(&mut self, predictions: &[usize], ground_truth: &[usize]) {
        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            self.add(actual, pred);
        }
    }

    /// Add a single prediction to the matrix. Out-of-range indices are ignored.
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            let idx = actual * self.num_classes + predicted;
            self.matrix[idx] += 1;
        }
    }

    /// Get the count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Number of correct predictions (diagonal sum)
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    /// Overall accuracy as a percentage
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            100.0 * self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Actual class counts
    pub fn row_sums(&self) -> Vec<usize> {
        (0..self.num_classes)
            .map(|row| (0..self.num_classes).map(|col| self.get(row, col)).sum())
            .collect()
    }

    /// Per-class accuracy (recall) as percentages; `None` for classes with no samples
    pub fn per_class_accuracy(&self) -> Vec<Option<f64>> {
        self.row_sums()
            .into_iter()
            .enumerate()
            .map(|(class_idx, support)| {
                if support == 0 {
                    None
                } else {
                    Some(100.0 * self.get(class_idx, class_idx) as f64 / support as f64)
                }
            })
            .collect()
    }

    /// Render a per-class accuracy table
    pub fn per_class_table(&self, class_names: &[&str]) -> String {
        let mut output = String::new();
        let supports = self.row_sums();

        output.push_str(&format!("{:<14} {:>8} {:>10}\n", "class", "support", "accuracy"));
        for (class_idx, accuracy) in self.per_class_accuracy().iter().enumerate() {
            let name = class_names.get(class_idx).copied().unwrap_or("?");
            let accuracy = accuracy
                .map(|a| format!("{:.2}%", a))
                .unwrap_or_else(|| "-".to_string());
            output.push_str(&format!(
                "{:<14} {:>8} {:>10}\n",
                name, supports[class_idx], accuracy
            ));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_matrix_counts() {
        let predictions = vec![0, 1, 1, 2, 2, 2];
        let ground_truth = vec![0, 1, 2, 2, 2, 0];
        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 3);

        assert_eq!(cm.total(), 6);
        assert_eq!(cm.correct(), 4);
        assert_eq!(cm.get(2, 1), 1);
        assert_eq!(cm.get(0, 2), 1);
        assert!((cm.accuracy() - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_per_class_accuracy() {
        let cm = ConfusionMatrix::from_predictions(&[0, 0, 1], &[0, 1, 1], 3);
        let per_class = cm.per_class_accuracy();

        assert_eq!(per_class[0], Some(100.0));
        assert_eq!(per_class[1], Some(50.0));
        assert_eq!(per_class[2], None);
    }

    #[test]
    fn test_out_of_range_ignored() {
        let mut cm = ConfusionMatrix::new(2);
        cm.add(5, 0);
        cm.add(0, 7);
        assert_eq!(cm.total(), 0);
        assert_eq!(cm.accuracy(), 0.0);
    }

    #[test]
    fn test_per_class_table() {
        let cm = ConfusionMatrix::from_predictions(&[0, 1], &[0, 0], 2);
        let table = cm.per_class_table(&["cat", "dog"]);
        assert!(table.contains("cat"));
        assert!(table.contains("50.00%"));
        assert!(table.lines().any(|l| l.starts_with("dog") && l.trim_end().ends_with('-')));
    }
}
