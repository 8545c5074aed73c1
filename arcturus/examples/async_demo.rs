//! Async API demo using AsyncCollection.
//!
//! Run with: cargo run --example async_demo --features async

use arcturus::prelude::*;
use arcturus::AsyncCollection;

#[tokio::main]
async fn main() -> Result<()> {
    println!("Async Arcturus Demo\n");

    let config = CollectionConfig::new("async", 8, "cosine");
    let collection = AsyncCollection::new(config, SearchConfig::default()).await?;
    collection.create_index("by_category", "category").await?;

    println!("Inserting 1000 vectors concurrently...");
    let start = std::time::Instant::now();

    let mut handles = vec![];
    for i in 0..1000 {
        let col = collection.clone();
        handles.push(tokio::spawn(async move {
            let vector: Vec<f64> = (0..8).map(|j| ((i * 8 + j) as f64).sin()).collect();
            let payload = Payload::new()
                .with_field("n", i as i64)
                .with_field("category", if i % 2 == 0 { "even" } else { "odd" });
            col.insert(format!("v{}", i), vector, payload).await
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| Error::TaskFailed(e.to_string()))??;
    }
    collection.sync_indexes().await?;

    println!("   Inserted in {:?}", start.elapsed());
    println!("   Total vectors: {}\n", collection.len());

    let query: Vec<f64> = (0..8).map(|i| (i as f64 * 0.1).cos()).collect();

    println!("Top 5 results:");
    let results = collection.search(query.clone(), SearchParams::new(5)).await?;
    for (i, r) in results.iter().enumerate() {
        println!("  {}. {} (distance: {:.4})", i + 1, r.id, r.distance);
    }

    println!("\nTop 5 'odd' results via the index:");
    let results = collection
        .index_search("by_category", "odd", query, SearchParams::new(5))
        .await?;
    for (i, r) in results.iter().enumerate() {
        println!("  {}. {} (distance: {:.4})", i + 1, r.id, r.distance);
    }

    Ok(())
}
