mod model;

use std::sync::Arc;
use fmbatch::{BatchPolicy, Orchestrator, Query, Response};
use crate::model::WordOverlap;

#[tokio::main]
async fn main() -> fmbatch::Result<()> {
    let orchestrator = Orchestrator::new(Arc::new(WordOverlap::new()));

    let questions = [
        "The sky on a clear day is blue",
        "Water freezes when it gets cold",
        "Cats like to chase mice around the house",
    ];
    let queries = questions
        .iter()
        .map(|prompt| Query::ranked(prompt.to_string(), ["blue sky", "cold water", "chase mice"]))
        .collect::<fmbatch::Result<Vec<_>>>()?;

    let responses = orchestrator.score(&queries, BatchPolicy::Dynamic, 4).await?;
    for (question, response) in questions.iter().zip(&responses) {
        if let Response::Ranked(ranked) = response {
            println!("{question}");
            for (candidate, score) in ranked.scores() {
                println!("  {candidate:>10}: {score:.3}");
            }
            println!("  -> {}", ranked.prediction());
        }
    }

    let completions: Vec<Query<String>> = questions.iter().map(|q| Query::from(*q)).collect();
    for response in orchestrator.generate(&completions, BatchPolicy::Static, 2).await? {
        println!("{}", response.prediction().unwrap_or_default());
    }
    Ok(())
}
