/// Categorical cross-entropy against an integer class label, for use with a
/// Softmax output layer.
pub struct CrossEntropyLoss;

/// Keeps ln() finite when a probability underflows to zero.
const EPS: f64 = 1e-12;

impl CrossEntropyLoss {
    /// L = -ln(predicted[class] + ε)
    pub fn loss(predicted: &[f64], class: usize) -> f64 {
        -(predicted[class] + EPS).ln()
    }

    /// Gradient of Softmax + cross-entropy w.r.t. the pre-softmax logits:
    /// predicted − one_hot(class). The Softmax layer's own derivative is the
    /// identity, so this is passed into the backward pass unchanged.
    pub fn derivative(predicted: &[f64], class: usize) -> Vec<f64> {
        predicted.iter().enumerate()
            .map(|(i, p)| if i == class { p - 1.0 } else { *p })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confident_correct_prediction_has_small_loss() {
        assert!(CrossEntropyLoss::loss(&[0.99, 0.01], 0) < 0.02);
        assert!(CrossEntropyLoss::loss(&[0.01, 0.99], 0) > 4.0);
    }

    #[test]
    fn gradient_is_prediction_minus_one_hot() {
        assert_eq!(CrossEntropyLoss::derivative(&[0.25, 0.75], 1), vec![0.25, -0.25]);
    }
}
