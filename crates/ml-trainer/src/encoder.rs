use crate::error::TrainerError;
use std::collections::BTreeSet;

/// Maps string labels to dense class indices, in sorted label order.
///
/// The sorted order is what gets recorded as the metadata's `classes`, so the
/// mapping is stable across runs on the same label set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<S: AsRef<str>>(labels: &[S]) -> Result<Self, TrainerError> {
        let classes: Vec<String> = labels
            .iter()
            .map(|l| l.as_ref().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if classes.len() < 2 {
            return Err(TrainerError::Labels(format!(
                "need at least 2 distinct labels, found {}",
                classes.len()
            )));
        }
        Ok(Self { classes })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn encode(&self, label: &str) -> Option<usize> {
        self.classes.binary_search_by(|c| c.as_str().cmp(label)).ok()
    }

    pub fn transform<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>, TrainerError> {
        labels
            .iter()
            .map(|l| {
                self.encode(l.as_ref())
                    .ok_or_else(|| TrainerError::Labels(format!("unknown label '{}'", l.as_ref())))
            })
            .collect()
    }

    pub fn decode(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_are_sorted_and_unique() {
        let encoder = LabelEncoder::fit(&["SELL", "BUY", "HOLD", "BUY"]).unwrap();
        assert_eq!(encoder.classes(), ["BUY", "HOLD", "SELL"]);
        assert_eq!(encoder.transform(&["HOLD", "SELL", "BUY"]).unwrap(), vec![1, 2, 0]);
        assert_eq!(encoder.decode(2), Some("SELL"));
    }

    #[test]
    fn single_class_is_rejected() {
        assert!(matches!(LabelEncoder::fit(&["BUY", "BUY"]), Err(TrainerError::Labels(_))));
    }

    #[test]
    fn unknown_label_is_an_error() {
        let encoder = LabelEncoder::fit(&["BUY", "SELL"]).unwrap();
        assert!(encoder.transform(&["HOLD"]).is_err());
    }
}
