use clap::{App, Arg};
use log_domain::LogDomain;
use sensem::{EMState, TableGrammar};
use std::error::Error;
use std::path::Path;
use std::process;

fn main() {
    let matches = App::new("sensem")
        .version("0.1.0")
        .about("Trains unigram/bigram sense statistics over a dependency treebank")
        .arg(
            Arg::with_name("grammar")
                .short("g")
                .long("grammar")
                .value_name("FILE")
                .help("Grammar file with cat:/fun:/word: declarations")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("language")
                .short("l")
                .long("language")
                .value_name("LANG")
                .help("Concrete language tag for morphological lookup")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("treebank")
                .short("t")
                .long("treebank")
                .value_name("FILE")
                .help("CoNLL treebank; read from stdin when omitted")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("iterations")
                .short("n")
                .long("iterations")
                .value_name("N")
                .help("Number of EM iterations")
                .default_value("10"),
        )
        .arg(
            Arg::with_name("unigram-smoothing")
                .long("unigram-smoothing")
                .value_name("COUNT")
                .help("Pseudocount added to every grammar function")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("bigram-smoothing")
                .long("bigram-smoothing")
                .value_name("PROB")
                .help("Smoothing mass blended into the bigram back-off priors")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("load-model")
                .long("load-model")
                .value_name("FILE")
                .help("Bigram model file to load before training")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("dump-unigrams")
                .long("dump-unigrams")
                .value_name("FILE")
                .requires("dump-bigrams")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("dump-bigrams")
                .long("dump-bigrams")
                .value_name("FILE")
                .requires("dump-unigrams")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("annotate")
                .long("annotate")
                .value_name("FILE")
                .help("Export the annotated treebank; stdout when FILE is omitted")
                .takes_value(true)
                .min_values(0)
                .max_values(1),
        )
        .get_matches();

    if let Err(err) = run(&matches) {
        eprintln!("sensem: {}", err);
        process::exit(1);
    }
}

fn run(matches: &clap::ArgMatches) -> Result<(), Box<dyn Error>> {
    let grammar = TableGrammar::from_path(Path::new(matches.value_of("grammar").unwrap()))?;
    let mut state = EMState::new(grammar);

    if matches.is_present("annotate") {
        state.setup_preserve_trees();
    }
    if let Some(count) = matches.value_of("unigram-smoothing") {
        state.setup_unigram_smoothing(count.parse()?);
    }
    if let Some(prob) = matches.value_of("bigram-smoothing") {
        let prob = LogDomain::new(prob.parse::<f64>()?)
            .map_err(|_| String::from("--bigram-smoothing takes a probability"))?;
        state.setup_bigram_smoothing(prob);
    }

    let lang = matches.value_of("language").unwrap();
    state.import_treebank(matches.value_of("treebank").map(Path::new), lang)?;
    eprintln!(
        "{} tokens, {} edges",
        state.unigram_count(),
        state.bigram_count()
    );

    if let Some(path) = matches.value_of("load-model") {
        state.load_model(Path::new(path))?;
    }

    let iterations: usize = matches.value_of("iterations").unwrap().parse()?;
    for i in 0..iterations {
        let corpus_prob = state.step();
        println!("{}\t{}", i + 1, corpus_prob);
    }

    if let (Some(uni), Some(bi)) = (
        matches.value_of("dump-unigrams"),
        matches.value_of("dump-bigrams"),
    ) {
        state.dump(Path::new(uni), Path::new(bi))?;
    }

    if matches.is_present("annotate") {
        let path = matches.value_of("annotate").map(Path::new);
        state.export_annotated_treebank(path)?;
    }
    Ok(())
}
