use crate::error::AnalyticsError;
use crate::report::{AverageMetrics, ClassMetrics, ClassificationReport};
use smartcore::metrics::accuracy;

/// A stateless calculator for classification quality on a held-out split.
#[derive(Debug, Default)]
pub struct AnalyticsEngine {}

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scores `y_pred` against `y_true`.
    ///
    /// Both slices hold class indices into `labels`. A class that is never
    /// predicted gets precision 0 (likewise recall for a class with no true
    /// samples) instead of an undefined ratio.
    pub fn evaluate(
        &self,
        labels: &[String],
        y_true: &[usize],
        y_pred: &[usize],
    ) -> Result<ClassificationReport, AnalyticsError> {
        if y_true.len() != y_pred.len() {
            return Err(AnalyticsError::LengthMismatch {
                truth: y_true.len(),
                predicted: y_pred.len(),
            });
        }
        if y_true.is_empty() {
            return Err(AnalyticsError::NotEnoughData(
                "cannot evaluate on an empty split".to_string(),
            ));
        }
        let n_classes = labels.len();
        if let Some(&index) = y_true.iter().chain(y_pred).find(|&&i| i >= n_classes) {
            return Err(AnalyticsError::UnknownClass { index, n_classes });
        }

        let confusion_matrix = Self::confusion_matrix(n_classes, y_true, y_pred);

        let truth: Vec<i32> = y_true.iter().map(|&i| i as i32).collect();
        let predicted: Vec<i32> = y_pred.iter().map(|&i| i as i32).collect();
        let accuracy_score = accuracy(&truth, &predicted);

        let per_class: Vec<ClassMetrics> = labels
            .iter()
            .enumerate()
            .map(|(c, label)| {
                let true_positives = confusion_matrix[c][c];
                let predicted_c: usize = confusion_matrix.iter().map(|row| row[c]).sum();
                let support: usize = confusion_matrix[c].iter().sum();
                let precision = ratio(true_positives, predicted_c);
                let recall = ratio(true_positives, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    label: label.clone(),
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();

        let macro_avg = Self::average(&per_class, |_| 1.0);
        let weighted_avg = Self::average(&per_class, |m| m.support as f64);

        tracing::debug!(
            n_samples = y_true.len(),
            accuracy = accuracy_score,
            macro_f1 = macro_avg.f1,
            "Classification report computed"
        );

        Ok(ClassificationReport {
            n_samples: y_true.len(),
            accuracy: accuracy_score,
            per_class,
            macro_avg,
            weighted_avg,
            confusion_matrix,
        })
    }

    fn confusion_matrix(n_classes: usize, y_true: &[usize], y_pred: &[usize]) -> Vec<Vec<usize>> {
        let mut cm = vec![vec![0; n_classes]; n_classes];
        for (&t, &p) in y_true.iter().zip(y_pred) {
            cm[t][p] += 1;
        }
        cm
    }

    fn average(per_class: &[ClassMetrics], weight: impl Fn(&ClassMetrics) -> f64) -> AverageMetrics {
        let total: f64 = per_class.iter().map(&weight).sum();
        if total == 0.0 {
            return AverageMetrics::default();
        }
        let mean = |metric: fn(&ClassMetrics) -> f64| {
            per_class.iter().map(|m| weight(m) * metric(m)).sum::<f64>() / total
        };
        AverageMetrics {
            precision: mean(|m| m.precision),
            recall: mean(|m| m.recall),
            f1: mean(|m| m.f1),
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["BUY".into(), "HOLD".into(), "SELL".into()]
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn perfect_predictions_score_one_everywhere() {
        let y = [0, 1, 2, 2, 1, 0];
        let report = AnalyticsEngine::new().evaluate(&labels(), &y, &y).unwrap();
        assert!(approx(report.accuracy, 1.0));
        assert!(approx(report.macro_avg.f1, 1.0));
        assert_eq!(report.confusion_matrix[2][2], 2);
    }

    #[test]
    fn per_class_metrics_follow_the_confusion_matrix() {
        // BUY: 2 true, both predicted BUY. HOLD: 2 true, one predicted SELL.
        // SELL: 1 true, predicted SELL.
        let y_true = [0, 0, 1, 1, 2];
        let y_pred = [0, 0, 1, 2, 2];
        let report = AnalyticsEngine::new().evaluate(&labels(), &y_true, &y_pred).unwrap();

        assert!(approx(report.accuracy, 0.8));
        assert_eq!(report.confusion_matrix, vec![vec![2, 0, 0], vec![0, 1, 1], vec![0, 0, 1]]);

        let hold = report.class("HOLD").unwrap();
        assert!(approx(hold.precision, 1.0));
        assert!(approx(hold.recall, 0.5));
        assert!(approx(hold.f1, 2.0 / 3.0));
        assert_eq!(hold.support, 2);

        let sell = report.class("SELL").unwrap();
        assert!(approx(sell.precision, 0.5));
        assert!(approx(sell.recall, 1.0));

        let expected_weighted_recall = (2.0 * 1.0 + 2.0 * 0.5 + 1.0 * 1.0) / 5.0;
        assert!(approx(report.weighted_avg.recall, expected_weighted_recall));
    }

    #[test]
    fn never_predicted_class_has_zero_precision() {
        let y_true = [0, 1, 2];
        let y_pred = [0, 0, 0];
        let report = AnalyticsEngine::new().evaluate(&labels(), &y_true, &y_pred).unwrap();
        let hold = report.class("HOLD").unwrap();
        assert_eq!(hold.precision, 0.0);
        assert_eq!(hold.f1, 0.0);
    }

    #[test]
    fn rejects_mismatched_and_out_of_range_input() {
        let engine = AnalyticsEngine::new();
        assert!(matches!(
            engine.evaluate(&labels(), &[0, 1], &[0]),
            Err(AnalyticsError::LengthMismatch { .. })
        ));
        assert!(matches!(
            engine.evaluate(&labels(), &[0, 3], &[0, 1]),
            Err(AnalyticsError::UnknownClass { index: 3, .. })
        ));
        assert!(matches!(
            engine.evaluate(&labels(), &[], &[]),
            Err(AnalyticsError::NotEnoughData(_))
        ));
    }
}
