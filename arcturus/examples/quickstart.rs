//! Quick start example for Arcturus.
//!
//! Run with: RUST_LOG=debug cargo run --example quickstart

use arcturus::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Arcturus Quick Start Example\n");

    let db = Database::in_memory(SearchConfig::from_env());
    let docs = db.create_collection("docs", 4, "euclid")?;

    // Small "embeddings" for demonstration; real ones have hundreds of dimensions.
    let documents = [
        ("rust-intro", "Introduction to Rust programming", "programming", [0.9, 0.8, 0.1, 0.0]),
        ("rust-patterns", "Advanced Rust patterns and idioms", "programming", [0.85, 0.9, 0.15, 0.05]),
        ("python-ds", "Python for data science", "data", [0.1, 0.2, 0.9, 0.85]),
        ("ml-basics", "Machine learning fundamentals", "data", [0.2, 0.1, 0.7, 0.8]),
        ("rust-systems", "Systems programming with Rust", "programming", [0.8, 0.7, 0.2, 0.1]),
    ];

    docs.create_index("by_topic", "topic")?;

    println!("Inserting {} documents...", documents.len());
    for (id, title, topic, embedding) in &documents {
        let payload = Payload::new().with_field("title", *title).with_field("topic", *topic);
        docs.insert(*id, embedding.to_vec(), payload)?;
    }
    docs.sync_indexes()?;
    println!("Collection contains {} vectors\n", docs.len());

    let query = [0.88, 0.85, 0.12, 0.03];

    println!("Top 3 results for a 'Rust programming' query:");
    println!("{:-<60}", "");
    let results = docs.search(&query, &SearchParams::new(3).unrestricted())?;
    for (rank, result) in results.iter().enumerate() {
        let title = result.payload.get_str("title").unwrap_or("Unknown");
        println!("  {}. [{}] {} (distance: {:.4})", rank + 1, result.id, title, result.distance);
    }
    println!("{:-<60}\n", "");

    println!("Filtered search (title contains 'Rust'):");
    let params = SearchParams::all()
        .unrestricted()
        .with_filter(Filter::field("title").contains("Rust"));
    for result in docs.search(&query, &params)? {
        println!("  [{}] (distance: {:.4})", result.id, result.distance);
    }
    println!();

    println!("Index-scoped search (topic = data):");
    let results = docs.index_search("by_topic", "data", &query, &SearchParams::new(5).unrestricted())?;
    for result in &results {
        println!(
            "  {}",
            serde_json::to_string(result).unwrap_or_else(|e| format!("<unprintable: {}>", e))
        );
    }
    println!();

    println!("Deleting 'rust-intro' and searching again:");
    docs.delete("rust-intro")?;
    for result in docs.search(&query, &SearchParams::new(2).unrestricted())? {
        println!("  [{}] (distance: {:.4})", result.id, result.distance);
    }

    println!("\nDone.");
    Ok(())
}
