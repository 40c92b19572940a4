use bist::train::Trainer;
use bist::{Error, ParserConfig};

#[test]
fn test_sgd_learning_rate_validation() {
    let mut trainer = Trainer::sgd();

    let result = trainer.params_mut().set_learning_rate(-1.0);
    assert!(result.is_err());
    assert_eq!(
        result.unwrap_err().to_string(),
        "invalid parameter: learning_rate must be positive"
    );

    // Zero is not a usable step size either
    assert!(trainer.params_mut().set_learning_rate(0.0).is_err());
    assert!(trainer.params_mut().set_learning_rate(f64::NAN).is_err());

    assert!(trainer.params_mut().set_learning_rate(0.1).is_ok());
    assert_eq!(trainer.params().learning_rate(), 0.1);
}

#[test]
fn test_sgd_iteration_validation() {
    let mut trainer = Trainer::sgd();

    let result = trainer.params_mut().set_max_iterations(0);
    assert!(result.is_err());
    assert_eq!(
        result.unwrap_err().to_string(),
        "invalid parameter: max_iterations must be at least 1"
    );

    assert!(trainer.params_mut().set_max_iterations(1).is_ok());
    assert!(trainer.params_mut().set_period(0).is_err());
    assert!(trainer.params_mut().set_period(5).is_ok());
    assert!(trainer.params_mut().set_delta(0.0).is_err());
    assert!(trainer.params_mut().set_delta(-1e-3).is_err());
    assert!(trainer.params_mut().set_delta(1e-4).is_ok());
}

#[test]
fn test_adam_moment_validation() {
    let mut trainer = Trainer::adam();

    assert!(trainer.params_mut().set_beta1(1.0).is_err());
    assert!(trainer.params_mut().set_beta1(-0.1).is_err());
    assert!(trainer.params_mut().set_beta1(0.0).is_ok());
    assert!(trainer.params_mut().set_beta1(0.95).is_ok());

    assert!(trainer.params_mut().set_beta2(1.5).is_err());
    assert!(trainer.params_mut().set_beta2(0.999).is_ok());

    assert!(trainer.params_mut().set_epsilon(0.0).is_err());
    assert!(trainer.params_mut().set_epsilon(-1e-8).is_err());
    assert!(trainer.params_mut().set_epsilon(1e-8).is_ok());

    assert!(trainer.params_mut().set_learning_rate(0.002).is_ok());
    assert_eq!(trainer.params().learning_rate(), 0.002);
}

#[test]
fn test_builder_chains() {
    let trainer = Trainer::sgd()
        .with_learning_rate(0.05)
        .unwrap()
        .with_max_iterations(20)
        .unwrap()
        .with_period(5)
        .unwrap()
        .with_delta(1e-5)
        .unwrap()
        .with_shuffle_seed(42);
    assert_eq!(trainer.params().learning_rate(), 0.05);
    assert_eq!(trainer.params().max_iterations(), 20);
    assert_eq!(trainer.params().shuffle_seed(), Some(42));

    let trainer = Trainer::adam()
        .with_learning_rate(0.001)
        .unwrap()
        .with_beta1(0.9)
        .unwrap()
        .with_beta2(0.999)
        .unwrap()
        .with_epsilon(1e-8)
        .unwrap();
    assert_eq!(trainer.params().beta1(), 0.9);
}

#[test]
fn test_config_dimension_validation() {
    assert!(ParserConfig::new().with_word_dim(0).is_err());
    assert!(ParserConfig::new().with_tag_dim(0).is_err());
    assert!(ParserConfig::new().with_hidden_dim(0).is_err());
    assert!(ParserConfig::new().with_lstm_layers(0).is_err());
    assert!(ParserConfig::new().with_scorer_hidden_dim(0).is_err());

    let err = ParserConfig::new().with_word_dim(0).unwrap_err();
    assert!(matches!(err, Error::InvalidParameter(_)));
    assert_eq!(
        err.to_string(),
        "invalid parameter: word_dim must be at least 1"
    );
}

#[test]
fn test_config_dropout_validation() {
    assert!(ParserConfig::new().with_dropout_alpha(-0.25).is_err());
    assert!(ParserConfig::new().with_dropout_alpha(f64::NAN).is_err());
    assert!(ParserConfig::new().with_dropout_alpha(f64::INFINITY).is_err());
    assert!(ParserConfig::new().with_dropout_alpha(0.0).is_ok());
    assert!(ParserConfig::new().with_dropout_alpha(0.25).is_ok());
}

#[test]
fn test_config_defaults() {
    let config = ParserConfig::default();
    assert_eq!(config.word_dim(), 100);
    assert_eq!(config.tag_dim(), 25);
    // Defaults to the embedding width
    assert_eq!(config.hidden_dim(), 125);
    assert_eq!(config.lstm_layers(), 2);
    assert_eq!(config.scorer_hidden_dim(), 100);
    assert!(config.word_dropout());
    assert_eq!(config.dropout_alpha(), 0.25);
    assert_eq!(config.seed(), None);

    let config = config.with_hidden_dim(64).unwrap();
    assert_eq!(config.hidden_dim(), 64);
}
