use bist::{unlabeled_attachment_score, Parser, ParserConfig, Trainer, ROOT_ID};
use tempfile::NamedTempFile;

type Sentence = (Vec<&'static str>, Vec<&'static str>, Vec<usize>);

fn toy_treebank() -> Vec<Sentence> {
    // Determiners attach to the noun, nouns and adverbs to the verb,
    // the verb to the root.
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
        (
            vec!["the", "bird", "sings", "loudly"],
            vec!["DT", "NN", "VB", "RB"],
            vec![2, 3, 0, 3],
        ),
        (
            vec!["a", "bird", "sings"],
            vec!["DT", "NN", "VB"],
            vec![2, 3, 0],
        ),
    ]
}

fn small_config() -> ParserConfig {
    ParserConfig::default()
        .with_word_dim(16)
        .unwrap()
        .with_tag_dim(8)
        .unwrap()
        .with_hidden_dim(16)
        .unwrap()
        .with_lstm_layers(1)
        .unwrap()
        .with_scorer_hidden_dim(16)
        .unwrap()
        .with_word_dropout(false)
        .with_seed(7)
}

fn fill(trainer: &mut Trainer<impl bist::train::TrainingAlgorithm>) {
    for (words, tags, heads) in toy_treebank() {
        trainer.append(&words, &tags, &heads).unwrap();
    }
}

fn corpus_loss(parser: &mut Parser, treebank: &[Sentence]) -> f64 {
    let mut total = 0.0;
    for (words, tags, heads) in treebank {
        let (word_ids, tag_ids) = {
            let vocab = parser.vocab();
            let mut word_ids = vec![ROOT_ID];
            word_ids.extend(words.iter().map(|&w| vocab.word_id(w)));
            let mut tag_ids = vec![ROOT_ID];
            tag_ids.extend(tags.iter().map(|&t| vocab.tag_id(t)));
            (word_ids, tag_ids)
        };
        let mut gold = vec![0usize];
        gold.extend_from_slice(heads);
        total += parser.forward(&word_ids, &tag_ids, &gold).unwrap().loss;
    }
    total
}

fn train_uas(parser: &Parser, treebank: &[Sentence]) -> f64 {
    let mut correct = 0.0;
    let mut total = 0.0;
    for (words, tags, heads) in treebank {
        let mut predicted = vec![0usize];
        predicted.extend(parser.parse_tokens(words, tags).unwrap());
        let mut gold = vec![0usize];
        gold.extend_from_slice(heads);
        correct += unlabeled_attachment_score(&predicted, &gold).unwrap() * words.len() as f64;
        total += words.len() as f64;
    }
    correct / total
}

#[test]
fn test_sgd_training_reduces_loss() {
    let treebank = toy_treebank();

    let mut short = Trainer::sgd()
        .with_learning_rate(0.1)
        .unwrap()
        .with_max_iterations(1)
        .unwrap()
        .with_shuffle_seed(42)
        .with_config(small_config());
    fill(&mut short);
    let mut parser_short = short.train().unwrap();

    let mut long = Trainer::sgd()
        .with_learning_rate(0.1)
        .unwrap()
        .with_max_iterations(25)
        .unwrap()
        .with_shuffle_seed(42)
        .with_config(small_config());
    fill(&mut long);
    let mut parser_long = long.train().unwrap();

    let loss_short = corpus_loss(&mut parser_short, &treebank);
    let loss_long = corpus_loss(&mut parser_long, &treebank);
    println!(
        "loss after 1 epoch = {:.6}, after 25 = {:.6}",
        loss_short, loss_long
    );
    assert!(loss_long.is_finite());
    assert!(
        loss_long < loss_short,
        "loss did not decrease: {} -> {}",
        loss_short,
        loss_long
    );
}

#[test]
fn test_adam_learns_toy_treebank() {
    let treebank = toy_treebank();
    let mut trainer = Trainer::adam()
        .with_learning_rate(0.01)
        .unwrap()
        .with_max_iterations(60)
        .unwrap()
        .with_shuffle_seed(3)
        .with_config(small_config());
    fill(&mut trainer);
    let parser = trainer.train().unwrap();

    let uas = train_uas(&parser, &treebank);
    println!("Training attachment score: {:.4}", uas);
    assert!(uas >= 0.6, "attachment score too low: {}", uas);
}

#[test]
fn test_verbose_training_completes() {
    let mut trainer = Trainer::sgd()
        .with_learning_rate(0.05)
        .unwrap()
        .with_max_iterations(3)
        .unwrap()
        .with_config(small_config());
    trainer.verbose(true);
    fill(&mut trainer);
    let parser = trainer.train().unwrap();
    assert_eq!(parser.vocab().num_tags(), 2 + 4);
}

#[test]
fn test_training_then_save() {
    let mut trainer = Trainer::sgd()
        .with_learning_rate(0.1)
        .unwrap()
        .with_max_iterations(2)
        .unwrap()
        .with_config(small_config());
    fill(&mut trainer);
    let parser = trainer.train().unwrap();

    let temp_file = NamedTempFile::new().unwrap();
    parser.save(temp_file.path()).unwrap();
    assert!(temp_file.path().exists());
    let written = std::fs::metadata(temp_file.path()).unwrap().len();
    assert!(written > 0);
}

#[test]
fn test_trained_parser_is_deterministic() {
    let mut trainer = Trainer::adam()
        .with_max_iterations(5)
        .unwrap()
        .with_shuffle_seed(11)
        .with_config(small_config());
    fill(&mut trainer);
    let parser = trainer.train().unwrap();

    let words = vec!["the", "dog", "sings"];
    let tags = vec!["DT", "NN", "VB"];
    let first = parser.parse_tokens(&words, &tags).unwrap();
    for _ in 0..3 {
        assert_eq!(parser.parse_tokens(&words, &tags).unwrap(), first);
    }
}
