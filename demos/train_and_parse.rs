use bist::{Model, ParserConfig, Trainer};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Dependency Parser Training Example");
    println!("==================================\n");

    // Create training data: words, part-of-speech tags and one head
    // position per token (1-based, 0 points at the root)
    let treebank = vec![
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
    ];

    println!("Training data:");
    println!("  Sentences: {}", treebank.len());
    for (words, _, heads) in &treebank {
        println!("  {:?} -> heads {:?}", words, heads);
    }
    println!();

    // Create and configure trainer
    println!("Creating trainer...");
    let config = ParserConfig::default()
        .with_word_dim(32)?
        .with_tag_dim(8)?
        .with_hidden_dim(32)?
        .with_lstm_layers(1)?
        .with_scorer_hidden_dim(32)?
        .with_word_dropout(false)
        .with_seed(42);
    let mut trainer = Trainer::adam()
        .with_learning_rate(0.01)?
        .with_max_iterations(60)?
        .with_shuffle_seed(42)
        .with_config(config);
    trainer.verbose(true);
    for (words, tags, heads) in &treebank {
        trainer.append(words, tags, heads)?;
    }

    println!("Parameters:");
    println!("  Learning rate: {}", trainer.params().learning_rate());
    println!("  Max iterations: {}\n", trainer.params().max_iterations());

    // Train
    println!("Training model...\n");
    let parser = trainer.train()?;

    let model_path = std::env::temp_dir().join("example_parser.bdep");
    parser.save(&model_path)?;
    println!("Model written to {}", model_path.display());

    println!("\n==================================");
    println!("Training completed successfully!");
    println!("==================================\n");

    // Load model and parse
    println!("Loading trained model...");
    let model = Model::load(&model_path)?;
    println!(
        "  Vocabulary: {} words, {} tags",
        model.num_words(),
        model.num_tags()
    );
    let parser = model.into_parser()?;

    println!("\nParsing test sentences:");
    let sentences = vec![
        (vec!["a", "bird", "barks"], vec!["DT", "NN", "VB"]),
        (
            vec!["the", "dog", "sings", "loudly"],
            vec!["DT", "NN", "VB", "RB"],
        ),
    ];
    for (words, tags) in &sentences {
        let heads = parser.parse_tokens(words, tags)?;
        println!("  Input: {}", words.join(" "));
        for (position, (word, head)) in words.iter().zip(heads.iter()).enumerate() {
            let head_word = if *head == 0 { "<root>" } else { words[head - 1] };
            println!("    {}: {} -> {}", position + 1, word, head_word);
        }
    }

    Ok(())
}
