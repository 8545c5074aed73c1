//! Persistence demo: write a file-backed database, reopen it, search again.
//!
//! Run with: cargo run --example persistence_demo

use arcturus::prelude::*;
use rand::Rng;
use tracing_subscriber::EnvFilter;

const DIM: usize = 16;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let root = std::env::temp_dir().join("arcturus_persistence_demo");
    let _ = std::fs::remove_dir_all(&root);

    let mut rng = rand::thread_rng();
    let query: Vec<f64> = (0..DIM).map(|_| rng.gen_range(-1.0..1.0)).collect();

    let before = {
        let db = Database::open(&root, SearchConfig::default())?;
        let points = db.create_collection("points", DIM, "euclid")?;

        println!("Inserting 2000 vectors...");
        for i in 0..2000 {
            let data: Vec<f64> = (0..DIM).map(|_| rng.gen_range(-1.0..1.0)).collect();
            points.insert(format!("p{}", i), data, Payload::new().with_field("n", i as i64))?;
        }

        println!("Deleting every tenth vector...");
        for i in (0..2000).step_by(10) {
            points.delete(&format!("p{}", i))?;
        }

        db.flush()?;
        points.search(&query, &SearchParams::new(5).unrestricted())?
    };

    println!("Reopening {}...", root.display());
    let db = Database::open(&root, SearchConfig::default())?;
    let points = db.collection("points")?;
    println!("Recovered {} vectors", points.len());

    let after = points.search(&query, &SearchParams::new(5).unrestricted())?;
    for (a, b) in before.iter().zip(&after) {
        println!("  {} {:.4} | {} {:.4}", a.id, a.distance, b.id, b.distance);
    }
    assert_eq!(before, after);

    let _ = std::fs::remove_dir_all(&root);
    println!("\nDone.");
    Ok(())
}
