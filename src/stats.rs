//! Corpus statistics for the `stats` command.

use anyhow::Result;
use std::fs;

use crate::config::Config;
use crate::metadata::MetadataStore;
use crate::store::VectorIndex;

#[derive(Debug)]
pub struct Stats {
    pub files: u64,
    pub chunks: u64,
    pub by_category: Vec<(String, u64)>,
    pub db_bytes: u64,
}

pub async fn gather(
    config: &Config,
    metadata: &MetadataStore,
    index: &dyn VectorIndex,
) -> Result<Stats> {
    let db_bytes = fs::metadata(&config.db.path).map(|m| m.len()).unwrap_or(0);
    Ok(Stats {
        files: metadata.count().await?,
        chunks: index.count().await?,
        by_category: metadata.count_by_category().await?,
        db_bytes,
    })
}

pub fn print(stats: &Stats) {
    println!("Files:  {}", stats.files);
    println!("Chunks: {}", stats.chunks);
    println!("DB:     {}", human_bytes(stats.db_bytes));
    if !stats.by_category.is_empty() {
        println!("\nBy category:");
        for (category, count) in &stats.by_category {
            println!("  {:<16} {}", category, count);
        }
    }
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
