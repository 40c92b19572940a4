use bist::{Model, ParserConfig, Trainer, ROOT_ID, ROOT_TOKEN};

type Sentence = (Vec<&'static str>, Vec<&'static str>, Vec<usize>);

fn toy_treebank() -> Vec<Sentence> {
    vec![
        (
            vec!["the", "dog", "barks"],
            vec!["DT", "NN", "VB"],
            vec![2, 3, 0],
        ),
        (
            vec!["a", "cat", "sleeps"],
            vec!["DT", "NN", "VB"],
            vec![2, 3, 0],
        ),
        (
            vec!["the", "cat", "barks"],
            vec!["DT", "NN", "VB"],
            vec![2, 3, 0],
        ),
        (
            vec!["a", "dog", "sleeps", "quietly"],
            vec!["DT", "NN", "VB", "RB"],
            vec![2, 3, 0, 3],
        ),
    ]
}

fn small_config() -> ParserConfig {
    ParserConfig::default()
        .with_word_dim(12)
        .unwrap()
        .with_tag_dim(6)
        .unwrap()
        .with_hidden_dim(12)
        .unwrap()
        .with_lstm_layers(1)
        .unwrap()
        .with_scorer_hidden_dim(12)
        .unwrap()
        .with_word_dropout(false)
        .with_seed(5)
}

#[test]
fn test_train_save_load_predict() {
    // Train a parser on the toy treebank
    let mut trainer = Trainer::adam()
        .with_learning_rate(0.01)
        .unwrap()
        .with_max_iterations(40)
        .unwrap()
        .with_shuffle_seed(17)
        .with_config(small_config());
    for (words, tags, heads) in toy_treebank() {
        trainer.append(&words, &tags, &heads).unwrap();
    }
    let parser = trainer.train().unwrap();

    // Use NamedTempFile for automatic cleanup on panic
    let temp_file = tempfile::NamedTempFile::new().unwrap();
    parser.save(temp_file.path()).unwrap();
    assert!(temp_file.path().exists());

    // Load model
    let model = Model::load(temp_file.path()).unwrap();

    // Verify model metadata: 7 distinct words and 4 distinct tags plus
    // the two reserved entries
    assert_eq!(model.num_words(), 2 + 7);
    assert_eq!(model.num_tags(), 2 + 4);
    assert_eq!(model.config().word_dim(), 12);
    assert_eq!(model.config().lstm_layers(), 1);

    // Verify vocabulary mappings
    assert_eq!(model.to_word_id(ROOT_TOKEN), Some(ROOT_ID));
    let dog = model.to_word_id("dog").unwrap();
    assert_eq!(model.to_word(dog), Some("dog"));
    assert!(model.to_tag_id("DT").is_some());
    assert_eq!(model.to_word_id("zebra"), None);
    assert_eq!(model.vocab().word_frequency(model.to_word_id("the").unwrap()), 2);

    // The restored parser must predict exactly what the original does
    let restored = model.into_parser().unwrap();
    for (words, tags, _) in toy_treebank() {
        assert_eq!(
            restored.parse_tokens(&words, &tags).unwrap(),
            parser.parse_tokens(&words, &tags).unwrap()
        );
    }

    // Check accuracy on training data (should be high)
    let mut correct = 0usize;
    let mut total = 0usize;
    for (words, tags, heads) in toy_treebank() {
        let predicted = restored.parse_tokens(&words, &tags).unwrap();
        correct += predicted
            .iter()
            .zip(heads.iter())
            .filter(|(p, g)| p == g)
            .count();
        total += heads.len();
    }
    let accuracy = correct as f64 / total as f64;
    println!("Training accuracy: {:.2}%", accuracy * 100.0);
    assert!(accuracy > 0.5, "Training accuracy too low: {}", accuracy);

    // temp_file is automatically cleaned up when it goes out of scope
}

#[test]
fn test_model_bytes_round_trip() {
    let mut trainer = Trainer::sgd()
        .with_learning_rate(0.1)
        .unwrap()
        .with_max_iterations(3)
        .unwrap()
        .with_shuffle_seed(2)
        .with_config(small_config());
    for (words, tags, heads) in toy_treebank() {
        trainer.append(&words, &tags, &heads).unwrap();
    }
    let parser = trainer.train().unwrap();

    let bytes = parser.to_bytes().unwrap();
    let model = Model::from_bytes(&bytes).unwrap();
    assert_eq!(model.num_words() as usize, parser.vocab().num_words());

    let restored = model.into_parser().unwrap();
    let words = vec!["the", "dog", "barks"];
    let tags = vec!["DT", "NN", "VB"];
    assert_eq!(
        restored.parse_tokens(&words, &tags).unwrap(),
        parser.parse_tokens(&words, &tags).unwrap()
    );
}

#[test]
fn test_unknown_tokens_parse_cleanly() {
    let mut trainer = Trainer::sgd()
        .with_max_iterations(2)
        .unwrap()
        .with_config(small_config());
    for (words, tags, heads) in toy_treebank() {
        trainer.append(&words, &tags, &heads).unwrap();
    }
    let parser = trainer.train().unwrap();

    // Every word and the tag are out of vocabulary
    let words = vec!["zebras", "gallop", "fast"];
    let tags = vec!["NNS", "VBP", "XX"];
    let heads = parser.parse_tokens(&words, &tags).unwrap();
    assert_eq!(heads.len(), 3);
    for &head in &heads {
        assert!(head <= 3);
    }
}
